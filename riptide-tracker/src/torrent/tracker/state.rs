//! Per-tracker bookkeeping kept across announce rounds

use std::time::{Duration, Instant};

use super::types::AnnounceResponse;
use crate::torrent::TrackerError;

/// Outcome of the most recent exchange with a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerStatus {
    /// Never contacted
    #[default]
    Untried,
    /// Last exchange succeeded
    Ok,
    /// Last exchange failed
    Failed,
}

/// Figures reported by a tracker in its last successful announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub interval: u32,
    pub seeders: u32,
    pub leechers: u32,
    pub peer_count: usize,
}

/// State the coordinator keeps for one tracker URL of one swarm.
///
/// Created on first use of the URL, updated after every exchange and dropped
/// together with the coordinator when the torrent is removed.
#[derive(Debug, Clone)]
pub struct TrackerState {
    pub url: String,
    pub status: TrackerStatus,
    pub last_announce: Option<Instant>,
    /// Periodic announces before this instant are suppressed
    pub next_allowed_announce: Option<Instant>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_response: Option<TrackerSnapshot>,
    pub tracker_id: Option<String>,
}

impl TrackerState {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: TrackerStatus::Untried,
            last_announce: None,
            next_allowed_announce: None,
            consecutive_failures: 0,
            last_error: None,
            last_response: None,
            tracker_id: None,
        }
    }

    /// Records a successful announce received at `now`.
    pub fn record_success(&mut self, response: &AnnounceResponse, now: Instant) {
        self.status = TrackerStatus::Ok;
        self.last_announce = Some(now);
        self.next_allowed_announce = response
            .min_interval
            .map(|seconds| now + Duration::from_secs(u64::from(seconds)));
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_response = Some(TrackerSnapshot {
            interval: response.interval,
            seeders: response.seeders,
            leechers: response.leechers,
            peer_count: response.peers.len(),
        });
        if response.tracker_id.is_some() {
            self.tracker_id.clone_from(&response.tracker_id);
        }
    }

    /// Records a failed exchange attempted at `now`.
    pub fn record_failure(&mut self, error: &TrackerError, now: Instant) {
        self.status = TrackerStatus::Failed;
        self.last_announce = Some(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.to_string());
    }

    /// Time left before a periodic announce is allowed, if any.
    pub fn throttled_for(&self, now: Instant) -> Option<Duration> {
        self.next_allowed_announce
            .filter(|allowed| *allowed > now)
            .map(|allowed| allowed - now)
    }
}

/// Cached UDP connection ID with its expiry.
///
/// Shared by every announce to one UDP tracker; callers serialize access so
/// only one connect handshake runs at a time.
#[derive(Debug, Clone)]
pub struct ConnectionCache {
    lifetime: Duration,
    current: Option<(u64, Instant)>,
}

impl ConnectionCache {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            current: None,
        }
    }

    /// Returns the cached ID and its expiry while it is still valid at `now`.
    pub fn valid_at(&self, now: Instant) -> Option<(u64, Instant)> {
        self.current.filter(|(_, expires)| *expires > now)
    }

    /// Stores an ID received at `received_at`, returning its expiry.
    pub fn store(&mut self, connection_id: u64, received_at: Instant) -> Instant {
        let expires = received_at + self.lifetime;
        self.current = Some((connection_id, expires));
        expires
    }

    pub fn invalidate(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(min_interval: Option<u32>) -> AnnounceResponse {
        AnnounceResponse {
            interval: 1800,
            min_interval,
            tracker_id: Some("abc".to_string()),
            seeders: 4,
            leechers: 2,
            peers: vec!["10.0.0.1:6881".parse().unwrap()],
        }
    }

    #[test]
    fn test_new_state_is_untried() {
        let state = TrackerState::new("udp://tracker:1337");
        assert_eq!(state.status, TrackerStatus::Untried);
        assert!(state.throttled_for(Instant::now()).is_none());
    }

    #[test]
    fn test_success_then_failure_transitions() {
        let now = Instant::now();
        let mut state = TrackerState::new("http://tracker/announce");

        state.record_failure(&TrackerError::Timeout { url: state.url.clone() }, now);
        state.record_failure(&TrackerError::Timeout { url: state.url.clone() }, now);
        assert_eq!(state.status, TrackerStatus::Failed);
        assert_eq!(state.consecutive_failures, 2);

        state.record_success(&response(None), now);
        assert_eq!(state.status, TrackerStatus::Ok);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_error.is_none());
        assert_eq!(state.tracker_id.as_deref(), Some("abc"));
        assert_eq!(state.last_response.unwrap().peer_count, 1);
    }

    #[test]
    fn test_min_interval_throttles_periodic_announces() {
        let now = Instant::now();
        let mut state = TrackerState::new("http://tracker/announce");
        state.record_success(&response(Some(300)), now);

        assert_eq!(state.throttled_for(now), Some(Duration::from_secs(300)));
        assert!(state.throttled_for(now + Duration::from_secs(301)).is_none());
    }

    #[test]
    fn test_connection_cache_expiry() {
        let now = Instant::now();
        let mut cache = ConnectionCache::new(Duration::from_secs(60));
        assert!(cache.valid_at(now).is_none());

        let expires = cache.store(0xDEAD_BEEF, now);
        assert_eq!(expires, now + Duration::from_secs(60));
        assert_eq!(cache.valid_at(now + Duration::from_secs(59)), Some((0xDEAD_BEEF, expires)));
        assert!(cache.valid_at(now + Duration::from_secs(60)).is_none());

        cache.invalidate();
        assert!(cache.valid_at(now).is_none());
    }
}
