//! UDP tracker client (BEP 15).
//!
//! Every announce or scrape needs a connection ID obtained through a connect
//! handshake. IDs are cached per tracker and reused until they expire, so
//! concurrent announces to one tracker share a single handshake.

pub mod packets;
pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use url::{Host, Url};

use self::packets::{AnnouncePacket, ConnectionId, Response};
use self::transport::{Backoff, Exchange, UdpTransport};
use super::state::ConnectionCache;
use super::types::{
    AnnounceRequest, AnnounceResponse, ScrapeRequest, ScrapeResponse, TrackerClient,
};
use crate::config::TrackerConfig;
use crate::torrent::TrackerError;

/// UDP tracker client implementation
pub struct UdpTrackerClient {
    announce_url: String,
    host: String,
    port: u16,
    /// Random key identifying this client across IP changes
    key: u32,
    initial_timeout: Duration,
    max_attempts: u32,
    /// Current socket; replaced when its receive task has stopped
    transport: parking_lot::Mutex<Option<Arc<UdpTransport>>>,
    /// Serializes resolving and binding a new socket
    binding: Mutex<()>,
    connection: Mutex<ConnectionCache>,
}

impl UdpTrackerClient {
    /// Creates a client for a `udp://host:port` tracker URL.
    ///
    /// The host is resolved and the socket bound on first use.
    ///
    /// # Errors
    ///
    /// - `TrackerError::UnsupportedScheme` - URL scheme is not `udp`
    /// - `TrackerError::InvalidTrackerUrl` - Host or port missing
    /// - `TrackerError::UrlParsing` - URL is not parseable
    pub fn new(announce_url: String, config: &TrackerConfig) -> Result<Self, TrackerError> {
        let url = Url::parse(&announce_url)?;
        if url.scheme() != "udp" {
            return Err(TrackerError::UnsupportedScheme { url: announce_url });
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(TrackerError::InvalidTrackerUrl { url: announce_url }),
        };
        let Some(port) = url.port() else {
            return Err(TrackerError::InvalidTrackerUrl { url: announce_url });
        };

        Ok(Self {
            announce_url,
            host,
            port,
            key: rand::random(),
            initial_timeout: config.udp_initial_timeout,
            max_attempts: config.udp_max_attempts,
            transport: parking_lot::Mutex::new(None),
            binding: Mutex::new(()),
            connection: Mutex::new(ConnectionCache::new(config.connection_id_lifetime)),
        })
    }

    /// Number of requests currently waiting for a reply from this tracker.
    pub fn pending_transactions(&self) -> usize {
        self.transport
            .lock()
            .as_ref()
            .map_or(0, |transport| transport.pending_transactions())
    }

    fn open_transport(&self) -> Option<Arc<UdpTransport>> {
        self.transport
            .lock()
            .as_ref()
            .filter(|transport| transport.is_open())
            .cloned()
    }

    /// Returns the open transport, resolving the host and binding a fresh
    /// socket on first use or after the previous socket failed.
    async fn transport(&self) -> Result<Arc<UdpTransport>, TrackerError> {
        if let Some(transport) = self.open_transport() {
            return Ok(transport);
        }

        let _binding = self.binding.lock().await;
        if let Some(transport) = self.open_transport() {
            return Ok(transport);
        }

        let replacing = self.transport.lock().is_some();
        let address = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                tracing::debug!("Failed to resolve {}: {}", self.announce_url, e);
                self.unreachable()
            })?
            .next()
            .ok_or_else(|| self.unreachable())?;

        let transport = Arc::new(UdpTransport::connect(self.announce_url.clone(), address).await?);
        if replacing {
            tracing::debug!(
                "Replaced closed socket for {}, reconnecting from {}",
                self.announce_url,
                address
            );
            // Connection IDs are bound to the old source port
            self.connection.lock().await.invalidate();
        }
        *self.transport.lock() = Some(Arc::clone(&transport));

        Ok(transport)
    }

    /// Returns a valid connection ID, performing the connect handshake when
    /// the cached one is missing or expired.
    ///
    /// The cache lock is held across the handshake so concurrent callers
    /// wait for one exchange instead of each starting their own.
    async fn connection_id(
        &self,
        transport: &UdpTransport,
        backoff: &mut Backoff,
    ) -> Result<(ConnectionId, Instant), TrackerError> {
        let mut cache = self.connection.lock().await;
        if let Some(valid) = cache.valid_at(Instant::now()) {
            return Ok(valid);
        }

        let mut transaction = transport.register()?;
        let packet = packets::encode_connect(transaction.id());
        let reply = match transport
            .exchange(&mut transaction, &packet, backoff, None)
            .await?
        {
            Exchange::Reply(reply) => reply,
            Exchange::Expired => return Err(self.timeout()),
        };

        match Response::parse(&reply)? {
            Response::Connect { connection_id, .. } => {
                let expires = cache.store(connection_id, Instant::now());
                tracing::debug!(
                    "Connected to UDP tracker {} (connection id {:#018x})",
                    self.announce_url,
                    connection_id
                );
                Ok((connection_id, expires))
            }
            Response::Error { message, .. } => Err(TrackerError::ProtocolError {
                message: format!("Tracker error: {message}"),
            }),
            other => Err(unexpected_reply("connect", &other)),
        }
    }

    /// Runs one request that needs a connection ID, reconnecting when the ID
    /// expires between retransmits. `build` encodes the request for a given
    /// connection and transaction ID.
    async fn request<F>(&self, backoff: &mut Backoff, build: F) -> Result<Response, TrackerError>
    where
        F: Fn(ConnectionId, u32) -> bytes::Bytes,
    {
        let transport = self.transport().await?;

        loop {
            let (connection_id, expires) = self.connection_id(&transport, backoff).await?;
            let mut transaction = transport.register()?;
            let packet = build(connection_id, transaction.id());

            let outcome = transport
                .exchange(&mut transaction, &packet, backoff, Some(expires))
                .await;

            match outcome {
                Ok(Exchange::Reply(reply)) => {
                    return match Response::parse(&reply)? {
                        Response::Error { message, .. } => {
                            self.connection.lock().await.invalidate();
                            Err(TrackerError::ProtocolError {
                                message: format!("Tracker error: {message}"),
                            })
                        }
                        response => Ok(response),
                    };
                }
                Ok(Exchange::Expired) => {
                    tracing::debug!(
                        "Connection id for {} expired mid-request, reconnecting",
                        self.announce_url
                    );
                }
                Err(e) => {
                    self.connection.lock().await.invalidate();
                    return Err(e);
                }
            }
        }
    }

    fn unreachable(&self) -> TrackerError {
        TrackerError::TrackerUnreachable {
            url: self.announce_url.clone(),
        }
    }

    fn timeout(&self) -> TrackerError {
        TrackerError::Timeout {
            url: self.announce_url.clone(),
        }
    }
}

fn unexpected_reply(expected: &str, response: &Response) -> TrackerError {
    TrackerError::MalformedData {
        reason: format!("Expected {expected} reply, got {response:?}"),
    }
}

#[async_trait]
impl TrackerClient for UdpTrackerClient {
    /// Announces over UDP, connecting first when no valid connection ID is
    /// cached.
    ///
    /// # Errors
    /// - `TrackerError::Timeout` - No reply within the retransmit schedule
    /// - `TrackerError::TrackerUnreachable` - Resolution failed or ICMP refusal
    /// - `TrackerError::ProtocolError` - Tracker replied with an error action
    /// - `TrackerError::MalformedData` - Reply could not be decoded
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        tracing::debug!("Announcing to tracker: {}", self.announce_url);
        let mut backoff = Backoff::new(self.initial_timeout, self.max_attempts);

        let response = self
            .request(&mut backoff, |connection_id, transaction_id| {
                packets::encode_announce(&AnnouncePacket {
                    connection_id,
                    transaction_id,
                    info_hash: request.info_hash,
                    peer_id: request.peer_id,
                    downloaded: request.downloaded,
                    left: request.left,
                    uploaded: request.uploaded,
                    event: request.event.udp_code(),
                    ip: 0,
                    key: self.key,
                    num_want: request
                        .numwant
                        .map_or(-1, |n| i32::try_from(n).unwrap_or(i32::MAX)),
                    port: request.port,
                })
            })
            .await?;

        match response {
            Response::Announce {
                interval,
                leechers,
                seeders,
                peers,
                ..
            } => {
                tracing::debug!(
                    "Successfully announced to {}, received {} peers",
                    self.announce_url,
                    peers.len()
                );
                Ok(AnnounceResponse {
                    interval,
                    min_interval: None,
                    tracker_id: None,
                    seeders,
                    leechers,
                    peers,
                })
            }
            other => Err(unexpected_reply("announce", &other)),
        }
    }

    /// Scrapes over UDP, splitting requests larger than one packet allows.
    ///
    /// # Errors
    /// - `TrackerError::Timeout` - No reply within the retransmit schedule
    /// - `TrackerError::MalformedData` - Reply could not be decoded
    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeResponse, TrackerError> {
        let mut result = ScrapeResponse::default();

        for batch in request.info_hashes.chunks(packets::MAX_SCRAPE_HASHES) {
            let mut backoff = Backoff::new(self.initial_timeout, self.max_attempts);
            let response = self
                .request(&mut backoff, |connection_id, transaction_id| {
                    packets::encode_scrape(connection_id, transaction_id, batch)
                })
                .await?;

            let Response::Scrape { stats, .. } = response else {
                return Err(unexpected_reply("scrape", &response));
            };
            if stats.len() < batch.len() {
                return Err(TrackerError::MalformedData {
                    reason: format!(
                        "Scrape reply has {} entries for {} info hashes",
                        stats.len(),
                        batch.len()
                    ),
                });
            }
            result.files.extend(batch.iter().copied().zip(stats));
        }

        Ok(result)
    }

    fn tracker_url(&self) -> &str {
        &self.announce_url
    }
}
