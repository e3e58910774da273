//! HTTP tracker client implementation with URL building and response parsing

use async_trait::async_trait;

use super::protocol::{self, encoding};
use super::types::{
    AnnounceRequest, AnnounceResponse, ScrapeRequest, ScrapeResponse, ScrapeStats, TrackerClient,
};
use crate::bencode::{Decoder, Dictionary, Value};
use crate::config::TrackerConfig;
use crate::torrent::{InfoHash, TrackerError};

/// HTTP tracker client implementation
pub struct HttpTrackerClient {
    pub(super) announce_url: String,
    pub(super) scrape_url: Option<String>,
    pub(super) client: reqwest::Client,
    pub(super) default_numwant: u32,
}

impl HttpTrackerClient {
    /// Creates HTTP tracker client with its own connection pool.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Http` - If the HTTP client cannot be constructed
    pub fn new(announce_url: String, config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = Self::build_http_client(config)?;
        Ok(Self::with_client(announce_url, client, config))
    }

    /// Creates HTTP tracker client sharing an existing `reqwest::Client`.
    ///
    /// Derives the scrape URL by replacing the last "/announce" path segment
    /// with "/scrape" following BEP 48 convention.
    pub fn with_client(announce_url: String, client: reqwest::Client, config: &TrackerConfig) -> Self {
        let scrape_url = Self::derive_scrape_url(&announce_url);

        Self {
            announce_url,
            scrape_url,
            client,
            default_numwant: config.numwant,
        }
    }

    /// Builds the `reqwest::Client` used for tracker requests.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Http` - If TLS or client initialisation fails
    pub fn build_http_client(config: &TrackerConfig) -> Result<reqwest::Client, TrackerError> {
        Ok(reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()?)
    }

    fn derive_scrape_url(announce_url: &str) -> Option<String> {
        let path_end = announce_url.find('?').unwrap_or(announce_url.len());
        let (path, query) = announce_url.split_at(path_end);
        let slash = path.rfind('/')?;
        let last_segment = &path[slash + 1..];
        let rest = last_segment.strip_prefix("announce")?;
        Some(format!("{}/scrape{}{}", &path[..slash], rest, query))
    }

    fn separator(base: &str) -> char {
        if base.contains('?') { '&' } else { '?' }
    }

    /// Build announce URL with query parameters
    pub(super) fn build_announce_url(&self, request: &AnnounceRequest) -> String {
        // Binary fields are encoded by hand; a URL builder would escape them as text.
        let mut url = format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1&numwant={}",
            self.announce_url,
            Self::separator(&self.announce_url),
            encoding::url_encode_bytes(request.info_hash.as_bytes()),
            encoding::url_encode_bytes(request.peer_id.as_bytes()),
            request.port,
            request.uploaded,
            request.downloaded,
            request.left,
            request.numwant.unwrap_or(self.default_numwant),
        );

        if let Some(event) = request.event.as_query_value() {
            url.push_str("&event=");
            url.push_str(event);
        }

        if let Some(tracker_id) = request.tracker_id.as_deref() {
            url.push_str("&trackerid=");
            url.push_str(&encoding::url_encode_bytes(tracker_id.as_bytes()));
        }

        url
    }

    /// Build scrape URL from announce URL
    ///
    /// # Errors
    /// - `TrackerError::ProtocolError` - No scrape URL available
    pub(super) fn build_scrape_url(&self, request: &ScrapeRequest) -> Result<String, TrackerError> {
        let scrape_url = self
            .scrape_url
            .as_ref()
            .ok_or_else(|| TrackerError::ProtocolError {
                message: format!("Tracker {} does not support scrape", self.announce_url),
            })?;

        let query = request
            .info_hashes
            .iter()
            .map(|info_hash| format!("info_hash={}", encoding::url_encode_bytes(info_hash.as_bytes())))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("{scrape_url}{}{query}", Self::separator(scrape_url)))
    }

    /// Decodes a response body into its top-level dictionary.
    ///
    /// A `failure reason` key is surfaced as `ProtocolError` carrying the
    /// tracker's message.
    fn decode_body(&self, response_bytes: &[u8]) -> Result<Dictionary, TrackerError> {
        let parsed = Decoder::lenient().decode(response_bytes)?;

        let Value::Dictionary(dict) = parsed else {
            return Err(TrackerError::MalformedData {
                reason: "Tracker response is not a dictionary".to_string(),
            });
        };

        if let Some(failure_reason) = dict.get(b"failure reason".as_slice()) {
            let reason = failure_reason
                .as_bytes()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            return Err(TrackerError::ProtocolError {
                message: format!("Tracker error: {reason}"),
            });
        }

        if let Some(warning) = dict.get(b"warning message".as_slice()).and_then(Value::as_str) {
            tracing::warn!("Tracker {} warning: {}", self.announce_url, warning);
        }

        Ok(dict)
    }

    fn read_count(dict: &Dictionary, key: &[u8]) -> Result<Option<u32>, TrackerError> {
        match dict.get(key) {
            None => Ok(None),
            Some(Value::Integer(value)) => {
                u32::try_from(*value)
                    .map(Some)
                    .map_err(|_| TrackerError::ProtocolError {
                        message: format!(
                            "Field {:?} out of range: {value}",
                            String::from_utf8_lossy(key)
                        ),
                    })
            }
            Some(_) => Err(TrackerError::ProtocolError {
                message: format!("Field {:?} is not an integer", String::from_utf8_lossy(key)),
            }),
        }
    }

    /// Parse tracker response from bencode data
    pub(super) fn parse_announce_response(
        &self,
        response_bytes: &[u8],
    ) -> Result<AnnounceResponse, TrackerError> {
        let dict = self.decode_body(response_bytes)?;

        let interval =
            Self::read_count(&dict, b"interval")?.ok_or_else(|| TrackerError::ProtocolError {
                message: "Missing interval in tracker response".to_string(),
            })?;
        let min_interval = Self::read_count(&dict, b"min interval")?;
        let seeders = Self::read_count(&dict, b"complete")?.unwrap_or(0);
        let leechers = Self::read_count(&dict, b"incomplete")?.unwrap_or(0);

        let tracker_id = dict
            .get(b"tracker id".as_slice())
            .and_then(Value::as_bytes)
            .map(|id| String::from_utf8_lossy(id).into_owned());

        let mut peers = match dict.get(b"peers".as_slice()) {
            Some(Value::Bytes(compact)) => protocol::parse_compact_peers(compact)?,
            Some(Value::List(entries)) => protocol::parse_dictionary_peers(entries)?,
            Some(_) => {
                return Err(TrackerError::MalformedData {
                    reason: "Unsupported peers encoding".to_string(),
                });
            }
            None => Vec::new(),
        };

        if let Some(Value::Bytes(compact6)) = dict.get(b"peers6".as_slice()) {
            peers.extend(protocol::parse_compact_peers6(compact6)?);
        }

        Ok(AnnounceResponse {
            interval,
            min_interval,
            tracker_id,
            seeders,
            leechers,
            peers,
        })
    }

    /// Parse tracker scrape response from bencode data
    pub(super) fn parse_scrape_response(
        &self,
        response_bytes: &[u8],
    ) -> Result<ScrapeResponse, TrackerError> {
        let dict = self.decode_body(response_bytes)?;
        let mut files = std::collections::HashMap::new();

        if let Some(files_dict) = dict.get(b"files".as_slice()).and_then(Value::as_dictionary) {
            for (info_hash_bytes, file_data) in files_dict {
                let Some(info_hash) = InfoHash::from_slice(info_hash_bytes) else {
                    continue;
                };
                let Some(file_dict) = file_data.as_dictionary() else {
                    continue;
                };

                files.insert(
                    info_hash,
                    ScrapeStats {
                        complete: Self::read_count(file_dict, b"complete")?.unwrap_or(0),
                        downloaded: Self::read_count(file_dict, b"downloaded")?.unwrap_or(0),
                        incomplete: Self::read_count(file_dict, b"incomplete")?.unwrap_or(0),
                    },
                );
            }
        }

        Ok(ScrapeResponse { files })
    }

    fn map_send_error(&self, error: &reqwest::Error) -> TrackerError {
        tracing::warn!("HTTP request to {} failed: {}", self.announce_url, error);
        if error.is_timeout() {
            TrackerError::Timeout {
                url: self.announce_url.clone(),
            }
        } else {
            TrackerError::TrackerUnreachable {
                url: self.announce_url.clone(),
            }
        }
    }

    /// Performs a GET and returns the body of a successful response.
    async fn fetch(&self, url: &str) -> Result<bytes::Bytes, TrackerError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                "Tracker {} returned error status: {}",
                self.announce_url,
                status
            );
            return Err(TrackerError::ProtocolError {
                message: format!("Tracker {} returned HTTP {}", self.announce_url, status.as_u16()),
            });
        }

        response.bytes().await.map_err(|e| self.map_send_error(&e))
    }
}

#[async_trait]
impl TrackerClient for HttpTrackerClient {
    /// Announces client presence to tracker and retrieves peer list.
    ///
    /// # Errors
    /// - `TrackerError::TrackerUnreachable` - Connection or DNS failure
    /// - `TrackerError::Timeout` - Request exceeded the configured timeout
    /// - `TrackerError::ProtocolError` - Non-2xx status or `failure reason`
    /// - `TrackerError::MalformedData` - Body is not valid bencode
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        let url = self.build_announce_url(&request);
        tracing::debug!("Announcing to tracker: {}", self.announce_url);

        let response_bytes = self.fetch(&url).await?;

        let response = self.parse_announce_response(&response_bytes).map_err(|e| {
            tracing::warn!("Failed to parse response from {}: {}", self.announce_url, e);
            e
        })?;

        tracing::debug!(
            "Successfully announced to {}, received {} peers",
            self.announce_url,
            response.peers.len()
        );
        Ok(response)
    }

    /// Retrieves torrent statistics from tracker without announcing.
    ///
    /// # Errors
    /// - `TrackerError::ProtocolError` - No scrape URL or tracker rejection
    /// - `TrackerError::TrackerUnreachable` - Network or HTTP error
    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeResponse, TrackerError> {
        let url = self.build_scrape_url(&request)?;
        let response_bytes = self.fetch(&url).await?;
        self.parse_scrape_response(&response_bytes)
    }

    fn tracker_url(&self) -> &str {
        &self.announce_url
    }
}
