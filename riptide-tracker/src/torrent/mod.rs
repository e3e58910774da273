//! Torrent identity types and tracker announce machinery

pub mod metainfo;
pub mod tracker;

use std::fmt;
use std::time::Duration;

pub use metainfo::Metainfo;
pub use tracker::{
    AnnounceCoordinator, AnnounceEvent, AnnounceRequest, AnnounceResponse, HttpTrackerClient,
    ScrapeRequest, ScrapeResponse, ScrapeStats, TierList, TierPolicy, TrackerClient,
    TrackerManager, TrackerPool, UdpTrackerClient,
};

use crate::bencode::BencodeError;

/// Client prefix written into generated peer IDs.
pub const CLIENT_PREFIX: &[u8; 8] = b"-RT0001-";

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file.
/// Used to scope every tracker query to one swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Builds an info hash from a slice, if it is exactly 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Self)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Unique 20-byte identifier this client presents to trackers.
///
/// Fixed for the lifetime of a client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 20]);

impl PeerId {
    /// Creates peer ID from 20-byte array.
    pub fn new(id: [u8; 20]) -> Self {
        Self(id)
    }

    /// Returns peer ID as byte array reference.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Generate random peer ID for this client.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        id[..CLIENT_PREFIX.len()].copy_from_slice(CLIENT_PREFIX);
        for byte in &mut id[CLIENT_PREFIX.len()..] {
            *byte = rand::random();
        }
        Self(id)
    }
}

/// Errors that can occur while talking to trackers.
///
/// Per-tracker variants are recorded by the coordinator and never reach the
/// caller individually; only `NoTrackersReachable` and `AnnounceThrottled`
/// describe the outcome of a whole announce round.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Tracker unreachable: {url}")]
    TrackerUnreachable { url: String },

    #[error("Tracker timed out: {url}")]
    Timeout { url: String },

    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Malformed data: {reason}")]
    MalformedData { reason: String },

    #[error("No trackers reachable ({attempted} attempted)")]
    NoTrackersReachable { attempted: usize },

    #[error("Announce throttled by tracker min interval, retry in {retry_after:?}")]
    AnnounceThrottled { retry_after: Duration },

    #[error("Unsupported tracker scheme: {url}")]
    UnsupportedScheme { url: String },

    #[error("Invalid tracker URL: {url}")]
    InvalidTrackerUrl { url: String },

    #[error("Invalid torrent: {reason}")]
    InvalidTorrent { reason: String },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error")]
    UrlParsing(#[from] url::ParseError),

    #[error("HTTP client error")]
    Http(#[from] reqwest::Error),
}

impl TrackerError {
    /// Checks whether repeating the announce later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::TrackerUnreachable { .. }
                | TrackerError::Timeout { .. }
                | TrackerError::NoTrackersReachable { .. }
                | TrackerError::AnnounceThrottled { .. }
                | TrackerError::Io(_)
        )
    }
}

impl From<BencodeError> for TrackerError {
    fn from(error: BencodeError) -> Self {
        TrackerError::MalformedData {
            reason: error.to_string(),
        }
    }
}
