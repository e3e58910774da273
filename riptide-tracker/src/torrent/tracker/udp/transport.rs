//! Socket ownership and transaction routing for one UDP tracker

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::packets::{self, TransactionId};
use crate::torrent::TrackerError;

/// Largest datagram accepted from a tracker.
const MAX_DATAGRAM_SIZE: usize = 2048;

type PendingMap = Arc<Mutex<HashMap<TransactionId, oneshot::Sender<Bytes>>>>;

/// Retransmit schedule of one UDP operation.
///
/// The wait doubles after every transmission, starting from the configured
/// initial timeout. Connect and announce share one schedule so a reconnect
/// does not reset the attempt count.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    max_attempts: u32,
    initial: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            initial,
        }
    }

    /// Wait for the next transmission, or `None` once attempts are exhausted.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let wait = self
            .initial
            .saturating_mul(2u32.saturating_pow(self.attempt));
        self.attempt += 1;
        Some(wait)
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempt
    }
}

/// Result of waiting for a reply.
#[derive(Debug)]
pub enum Exchange {
    Reply(Bytes),
    /// The connection ID used by the request expired before a reply arrived
    Expired,
}

/// Registered transaction ID; deregistered when dropped.
pub struct PendingTransaction {
    id: TransactionId,
    reply: oneshot::Receiver<Bytes>,
    pending: PendingMap,
}

impl PendingTransaction {
    pub fn id(&self) -> TransactionId {
        self.id
    }
}

impl Drop for PendingTransaction {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Connected UDP socket plus the task routing replies to waiting requests.
pub struct UdpTransport {
    url: String,
    socket: Arc<UdpSocket>,
    pending: PendingMap,
    receiver: JoinHandle<()>,
}

impl UdpTransport {
    /// Binds an ephemeral socket of the tracker's address family and
    /// connects it to the tracker.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Io` - If the socket cannot be bound or connected
    pub async fn connect(url: String, tracker: SocketAddr) -> Result<Self, TrackerError> {
        let local: SocketAddr = if tracker.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(tracker).await?;
        let socket = Arc::new(socket);
        let pending = PendingMap::default();

        let receiver = tokio::spawn(receive_loop(
            url.clone(),
            Arc::clone(&socket),
            Arc::clone(&pending),
        ));

        tracing::debug!("UDP transport for {} bound to {:?}", url, socket.local_addr());

        Ok(Self {
            url,
            socket,
            pending,
            receiver,
        })
    }

    /// Reserves a transaction ID not used by any in-flight request.
    ///
    /// # Errors
    ///
    /// - `TrackerError::TrackerUnreachable` - If the socket has failed
    pub fn register(&self) -> Result<PendingTransaction, TrackerError> {
        if !self.is_open() {
            return Err(self.unreachable());
        }

        let (sender, reply) = oneshot::channel();
        let mut pending = self.pending.lock();
        let id = loop {
            let candidate = rand::random::<TransactionId>();
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        pending.insert(id, sender);

        Ok(PendingTransaction {
            id,
            reply,
            pending: Arc::clone(&self.pending),
        })
    }

    /// Sends `packet` and waits for the reply, retransmitting the same bytes
    /// after every timeout of `backoff`.
    ///
    /// When `expires` is set and passes before a reply, returns
    /// `Exchange::Expired` so the caller can reconnect.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Timeout` - Every attempt timed out
    /// - `TrackerError::TrackerUnreachable` - The tracker refused the datagram
    pub async fn exchange(
        &self,
        transaction: &mut PendingTransaction,
        packet: &Bytes,
        backoff: &mut Backoff,
        expires: Option<Instant>,
    ) -> Result<Exchange, TrackerError> {
        loop {
            if expires.is_some_and(|expires| Instant::now() >= expires) {
                return Ok(Exchange::Expired);
            }

            let Some(wait) = backoff.next_wait() else {
                tracing::debug!(
                    "UDP tracker {} gave no reply after {} attempts",
                    self.url,
                    backoff.attempts_made()
                );
                return Err(TrackerError::Timeout {
                    url: self.url.clone(),
                });
            };

            self.socket.send(packet).await.map_err(|e| self.send_error(e))?;

            match tokio::time::timeout(wait, &mut transaction.reply).await {
                Ok(Ok(reply)) => return Ok(Exchange::Reply(reply)),
                Ok(Err(_)) => return Err(self.unreachable()),
                Err(_) => {
                    tracing::trace!(
                        "No reply from {} for transaction {:#010x} within {:?}",
                        self.url,
                        transaction.id,
                        wait
                    );
                }
            }
        }
    }

    /// Number of transactions currently awaiting a reply.
    pub fn pending_transactions(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether replies are still being received. A closed transport must be
    /// replaced with a new socket.
    pub fn is_open(&self) -> bool {
        !self.receiver.is_finished()
    }

    #[cfg(test)]
    pub(crate) fn stop_receiving(&self) {
        self.receiver.abort();
    }

    fn unreachable(&self) -> TrackerError {
        TrackerError::TrackerUnreachable {
            url: self.url.clone(),
        }
    }

    fn send_error(&self, error: std::io::Error) -> TrackerError {
        if error.kind() == ErrorKind::ConnectionRefused {
            self.unreachable()
        } else {
            TrackerError::Io(error)
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

async fn receive_loop(url: String, socket: Arc<UdpSocket>, pending: PendingMap) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        match socket.recv(&mut buf).await {
            Ok(len) => {
                let datagram = &buf[..len];
                let Some(transaction_id) = packets::peek_transaction_id(datagram) else {
                    tracing::trace!("Dropping {}-byte datagram from {}", len, url);
                    continue;
                };

                match pending.lock().remove(&transaction_id) {
                    Some(sender) => {
                        let _ = sender.send(Bytes::copy_from_slice(datagram));
                    }
                    None => tracing::trace!(
                        "Dropping reply from {} for unknown transaction {:#010x}",
                        url,
                        transaction_id
                    ),
                }
            }
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                // ICMP port unreachable: fail everyone waiting, keep listening
                tracing::debug!("UDP tracker {} refused connection", url);
                pending.lock().clear();
            }
            Err(e) => {
                tracing::warn!("UDP socket for {} failed: {}", url, e);
                pending.lock().clear();
                break;
            }
        }
    }
}
