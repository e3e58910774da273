//! Core types and enumerations for BitTorrent tracker communication

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;

use crate::torrent::{InfoHash, PeerId, TrackerError};

// Type aliases for complex types
pub(super) type PeerList = Result<Vec<SocketAddr>, TrackerError>;

/// Ordered tiers of tracker URLs for one torrent.
///
/// Tier order and the order of URLs inside each tier are both significant:
/// earlier tiers have priority, and trackers in a tier are tried in order
/// when only some of them can be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierList {
    tiers: Vec<Vec<String>>,
}

impl TierList {
    pub fn new(tiers: Vec<Vec<String>>) -> Self {
        Self { tiers }
    }

    /// Creates a tier list with one tier holding one tracker.
    pub fn single(url: impl Into<String>) -> Self {
        Self {
            tiers: vec![vec![url.into()]],
        }
    }

    pub fn tiers(&self) -> &[Vec<String>] {
        &self.tiers
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Total number of tracker URLs across every tier.
    pub fn tracker_count(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker_count() == 0
    }

    /// Iterates URLs in priority order: tier by tier, then within each tier.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.tiers.iter().flatten().map(String::as_str)
    }
}

impl From<Vec<Vec<String>>> for TierList {
    fn from(tiers: Vec<Vec<String>>) -> Self {
        Self::new(tiers)
    }
}

/// BitTorrent announce events.
///
/// Indicates client state changes that should be reported to tracker
/// for proper swarm management and statistics tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnounceEvent {
    /// Regular periodic announce
    #[default]
    None,
    /// Client started downloading this torrent
    Started,
    /// Client stopped downloading this torrent
    Stopped,
    /// Client completed downloading this torrent
    Completed,
}

impl AnnounceEvent {
    /// Value of the HTTP `event` parameter; periodic announces omit it.
    pub fn as_query_value(self) -> Option<&'static str> {
        match self {
            AnnounceEvent::None => None,
            AnnounceEvent::Started => Some("started"),
            AnnounceEvent::Stopped => Some("stopped"),
            AnnounceEvent::Completed => Some("completed"),
        }
    }

    /// Event code carried in UDP announce packets.
    pub fn udp_code(self) -> u32 {
        match self {
            AnnounceEvent::None => 0,
            AnnounceEvent::Completed => 1,
            AnnounceEvent::Started => 2,
            AnnounceEvent::Stopped => 3,
        }
    }
}

/// Tracker announce request.
///
/// Immutable description of one announce. Each tracker contacted in a round
/// gets its own copy carrying that tracker's `tracker_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    /// Unique identifier for the torrent being announced
    pub info_hash: InfoHash,
    /// Client's unique 20-byte identifier
    pub peer_id: PeerId,
    /// TCP port client is listening on for peer connections
    pub port: u16,
    /// Total bytes uploaded to other peers
    pub uploaded: u64,
    /// Total bytes downloaded from other peers
    pub downloaded: u64,
    /// Bytes remaining to download (0 for seeders)
    pub left: u64,
    /// Current client state for this torrent
    pub event: AnnounceEvent,
    /// Requested peer count; `None` lets each protocol pick its default
    pub numwant: Option<u32>,
    /// `tracker id` this swarm last received from the target tracker
    pub tracker_id: Option<String>,
}

impl AnnounceRequest {
    /// Creates a `started` announce with zeroed counters.
    pub fn started(info_hash: InfoHash, peer_id: PeerId, port: u16, left: u64) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
            event: AnnounceEvent::Started,
            numwant: None,
            tracker_id: None,
        }
    }
}

/// Tracker announce response.
///
/// Contains peer list and swarm statistics returned by tracker
/// in response to announce requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    /// Seconds until next announce request should be sent
    pub interval: u32,
    /// Minimum allowed interval between announces
    pub min_interval: Option<u32>,
    /// Tracker-specific identifier for subsequent requests
    pub tracker_id: Option<String>,
    /// Number of seeders in the swarm
    pub seeders: u32,
    /// Number of leechers in the swarm
    pub leechers: u32,
    /// Peer endpoints, unordered and possibly containing duplicates
    pub peers: Vec<SocketAddr>,
}

/// Tracker scrape request.
///
/// Requests statistics for multiple torrents without announcing
/// client presence or affecting swarm participation.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    /// List of torrent info hashes to query statistics for
    pub info_hashes: Vec<InfoHash>,
}

/// Individual torrent statistics from scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeStats {
    /// Number of seeders (peers with complete file)
    pub complete: u32,
    /// Total number of completed downloads
    pub downloaded: u32,
    /// Number of leechers (peers downloading)
    pub incomplete: u32,
}

/// Tracker scrape response.
///
/// Contains statistics for all requested torrents indexed by info hash.
#[derive(Debug, Clone, Default)]
pub struct ScrapeResponse {
    /// Statistics for each torrent indexed by info hash
    pub files: HashMap<InfoHash, ScrapeStats>,
}

/// Abstract tracker communication interface for BitTorrent trackers.
///
/// Implementations handle protocol-specific details (HTTP/UDP) while
/// reporting failures through the shared `TrackerError` taxonomy.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Announces client presence to tracker and retrieves peer list.
    ///
    /// # Errors
    ///
    /// - `TrackerError::TrackerUnreachable` - If the tracker cannot be contacted
    /// - `TrackerError::Timeout` - If no reply arrives within the retry budget
    /// - `TrackerError::ProtocolError` - If the tracker rejects the announce
    /// - `TrackerError::MalformedData` - If the reply cannot be decoded
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TrackerError>;

    /// Retrieves torrent statistics from tracker without announcing.
    ///
    /// # Errors
    ///
    /// - `TrackerError::TrackerUnreachable` - If the tracker cannot be contacted
    /// - `TrackerError::ProtocolError` - If scrape is unsupported or rejected
    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeResponse, TrackerError>;

    /// Returns tracker URL for debugging and logging purposes.
    fn tracker_url(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_list_preserves_order() {
        let tiers = TierList::new(vec![
            vec!["udp://a:1".to_string(), "http://b/announce".to_string()],
            vec![],
            vec!["http://c/announce".to_string()],
        ]);

        assert_eq!(tiers.tier_count(), 3);
        assert_eq!(tiers.tracker_count(), 3);
        assert_eq!(
            tiers.urls().collect::<Vec<_>>(),
            vec!["udp://a:1", "http://b/announce", "http://c/announce"]
        );
        assert!(TierList::default().is_empty());
        assert!(!TierList::single("udp://a:1").is_empty());
    }

    #[test]
    fn test_event_encodings() {
        assert_eq!(AnnounceEvent::None.as_query_value(), None);
        assert_eq!(AnnounceEvent::Started.as_query_value(), Some("started"));
        assert_eq!(AnnounceEvent::None.udp_code(), 0);
        assert_eq!(AnnounceEvent::Completed.udp_code(), 1);
        assert_eq!(AnnounceEvent::Started.udp_code(), 2);
        assert_eq!(AnnounceEvent::Stopped.udp_code(), 3);
    }
}
