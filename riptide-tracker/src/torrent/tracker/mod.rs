//! BitTorrent tracker communication abstractions and implementations.
//!
//! HTTP (BEP 3) and UDP (BEP 15) tracker clients behind one `TrackerClient`
//! trait, a pool caching one client per tracker URL, and the coordinator that
//! announces a swarm to its tier list (BEP 12) and merges the answers.

pub mod client;
pub mod coordinator;
pub mod pool;
pub mod protocol;
pub mod simulated;
pub mod state;
pub mod types;
pub mod udp;

// Re-export public API
pub use client::HttpTrackerClient;
pub use coordinator::{AnnounceCoordinator, TierPolicy, TrackerManager};
pub use pool::{TrackerPool, TrackerProtocol};
pub use simulated::{ResponseConfig, SimulatedFailure, SimulatedTrackerClient};
pub use state::{ConnectionCache, TrackerSnapshot, TrackerState, TrackerStatus};
pub use types::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, ScrapeRequest, ScrapeResponse, ScrapeStats,
    TierList, TrackerClient,
};
pub use udp::UdpTrackerClient;
