//! Centralized configuration for tracker communication.
//!
//! All tunable parameters are defined here to avoid hard-coded timeouts
//! scattered through the HTTP and UDP clients.

use std::time::Duration;

use crate::torrent::tracker::TierPolicy;
use crate::torrent::tracker::protocol::constants;

/// Tracker communication configuration.
///
/// Controls request timeouts, the UDP retransmit schedule, announce
/// defaults and how tier lists are walked.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// HTTP request timeout for a single announce or scrape
    pub http_timeout: Duration,
    /// Wait before the first UDP retransmit; doubled on every retry
    pub udp_initial_timeout: Duration,
    /// Maximum UDP transmissions per exchange, retransmits included
    pub udp_max_attempts: u32,
    /// How long a UDP connection ID may be reused after receipt
    pub connection_id_lifetime: Duration,
    /// Overall bound on one tracker's exchange within an announce round
    pub announce_deadline: Duration,
    /// Peers requested when the caller does not specify numwant
    pub numwant: u32,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
    /// Whether tiers are walked in order or flattened into one round
    pub tier_policy: TierPolicy,
    /// Interval assumed when a tracker omits one
    pub default_announce_interval: Duration,
    /// Floor applied to tracker-supplied intervals
    pub min_announce_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            udp_initial_timeout: Duration::from_secs(15),
            udp_max_attempts: 8,
            connection_id_lifetime: Duration::from_secs(60),
            announce_deadline: Duration::from_secs(120),
            numwant: 50,
            user_agent: "riptide/0.1.0",
            tier_policy: TierPolicy::TierEscalation,
            default_announce_interval: Duration::from_secs(u64::from(
                constants::DEFAULT_ANNOUNCE_INTERVAL,
            )),
            min_announce_interval: Duration::from_secs(u64::from(constants::MIN_ANNOUNCE_INTERVAL)),
        }
    }
}

impl TrackerConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(seconds) = env_number::<u64>("RIPTIDE_TRACKER_TIMEOUT") {
            config.http_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_number::<u64>("RIPTIDE_UDP_TIMEOUT") {
            config.udp_initial_timeout = Duration::from_secs(seconds);
        }

        if let Some(attempts) = env_number::<u32>("RIPTIDE_UDP_MAX_ATTEMPTS") {
            config.udp_max_attempts = attempts.max(1);
        }

        if let Some(seconds) = env_number::<u64>("RIPTIDE_ANNOUNCE_DEADLINE") {
            config.announce_deadline = Duration::from_secs(seconds);
        }

        if let Some(numwant) = env_number::<u32>("RIPTIDE_NUMWANT") {
            config.numwant = numwant;
        }

        if let Ok(policy) = std::env::var("RIPTIDE_TIER_POLICY") {
            match policy.parse() {
                Ok(policy) => config.tier_policy = policy,
                Err(e) => tracing::warn!("Ignoring RIPTIDE_TIER_POLICY: {}", e),
            }
        }

        config
    }

    /// Creates a configuration with millisecond timeouts for loopback tests.
    pub fn for_testing() -> Self {
        Self {
            http_timeout: Duration::from_millis(500),
            udp_initial_timeout: Duration::from_millis(100),
            udp_max_attempts: 3,
            announce_deadline: Duration::from_secs(2),
            ..Default::default()
        }
    }

    /// Upper bound on time spent by one UDP exchange with every retransmit.
    pub fn udp_retry_budget(&self) -> Duration {
        (0..self.udp_max_attempts)
            .map(|attempt| {
                self.udp_initial_timeout
                    .saturating_mul(2u32.saturating_pow(attempt))
            })
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}
