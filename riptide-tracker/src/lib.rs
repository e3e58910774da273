//! Riptide Tracker - BitTorrent tracker announce coordination
//!
//! Discovers peers for a swarm by announcing to its HTTP and UDP trackers
//! concurrently, walking the torrent's tier list and merging the answers
//! into one peer set and re-announce interval.

pub mod bencode;
pub mod config;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use bencode::{BencodeError, Value};
pub use config::TrackerConfig;
pub use torrent::tracker::{
    AnnounceCoordinator, AnnounceEvent, AnnounceRequest, AnnounceResponse, TierList, TierPolicy,
    TrackerPool,
};
pub use torrent::{InfoHash, Metainfo, PeerId, TrackerError};

pub type Result<T> = std::result::Result<T, TrackerError>;
