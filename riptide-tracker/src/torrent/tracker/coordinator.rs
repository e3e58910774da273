//! Multi-tracker announce coordination for one swarm.
//!
//! The coordinator walks a torrent's tier list, announces to the selected
//! trackers concurrently and merges their answers. Individual tracker
//! failures are recorded in per-tracker state and only surface as
//! `NoTrackersReachable` when nothing in the round succeeded.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;

use super::pool::TrackerPool;
use super::state::TrackerState;
use super::types::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, ScrapeRequest, ScrapeResponse, TierList,
    TrackerClient,
};
use crate::torrent::TrackerError;

/// How a tier list is turned into announce rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierPolicy {
    /// Every tracker of every tier in one concurrent round
    FlattenAll,
    /// One tier at a time; the next tier is only tried when every tracker
    /// of the current one failed
    #[default]
    TierEscalation,
}

impl FromStr for TierPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flatten" | "flatten-all" => Ok(TierPolicy::FlattenAll),
            "escalate" | "tier-escalation" => Ok(TierPolicy::TierEscalation),
            _ => Err(format!("Unknown tier policy: {s}")),
        }
    }
}

impl fmt::Display for TierPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierPolicy::FlattenAll => write!(f, "flatten"),
            TierPolicy::TierEscalation => write!(f, "escalate"),
        }
    }
}

type Dispatch = (String, Arc<dyn TrackerClient>);

/// Trackers chosen for one round plus what was left out.
#[derive(Default)]
struct Selection {
    dispatch: Vec<Dispatch>,
    failed_early: usize,
    throttled_for: Option<Duration>,
}

/// Announce coordinator owned by one swarm.
///
/// Holds the `TrackerState` of every tracker the swarm has used. Clients
/// (and with them UDP sockets and connection IDs) come from a
/// `TrackerPool` that may be shared with other swarms.
pub struct AnnounceCoordinator {
    pool: Arc<TrackerPool>,
    policy: TierPolicy,
    announce_deadline: Duration,
    min_announce_interval: Duration,
    default_announce_interval: Duration,
    states: Mutex<HashMap<String, TrackerState>>,
    /// Tier index to the tracker that last answered for that tier
    preferred: Mutex<HashMap<usize, String>>,
}

impl AnnounceCoordinator {
    /// Creates a coordinator using the pool's configured tier policy.
    pub fn new(pool: Arc<TrackerPool>) -> Self {
        let policy = pool.config().tier_policy;
        Self::with_policy(pool, policy)
    }

    pub fn with_policy(pool: Arc<TrackerPool>, policy: TierPolicy) -> Self {
        let config = pool.config();
        Self {
            announce_deadline: config.announce_deadline,
            min_announce_interval: config.min_announce_interval,
            default_announce_interval: config.default_announce_interval,
            pool,
            policy,
            states: Mutex::new(HashMap::new()),
            preferred: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> TierPolicy {
        self.policy
    }

    /// Announces to the tier list and merges every successful answer.
    ///
    /// The result holds the union of all peers (duplicates kept), the
    /// largest interval reported, and the seeder/leecher counts of the
    /// highest-priority tracker that answered. The whole call, every tier
    /// included, is bounded by the announce deadline. Dropping the returned
    /// future cancels every in-flight tracker exchange.
    ///
    /// # Errors
    ///
    /// - `TrackerError::NoTrackersReachable` - No selected tracker succeeded
    /// - `TrackerError::AnnounceThrottled` - Nothing succeeded and at least one
    ///   tracker is still inside its min interval (periodic announces only)
    pub async fn announce(
        &self,
        tiers: &TierList,
        request: AnnounceRequest,
    ) -> Result<AnnounceResponse, TrackerError> {
        tracing::info!(
            "Announcing {:?} for torrent {} to {} trackers in {} tiers ({})",
            request.event,
            request.info_hash,
            tiers.tracker_count(),
            tiers.tier_count(),
            self.policy
        );

        let deadline = tokio::time::Instant::now() + self.announce_deadline;
        let rounds = self.rounds(tiers);
        let mut seen = HashSet::new();
        let mut attempted = 0;
        let mut throttled_for: Option<Duration> = None;
        let mut merged: Option<AnnounceResponse> = None;

        for (tier, urls) in &rounds {
            if tokio::time::Instant::now() >= deadline {
                tracing::debug!(
                    "Announce deadline reached for {}, not escalating further",
                    request.info_hash
                );
                break;
            }

            let selection = self.select(urls, &request, &mut seen);
            attempted += selection.dispatch.len() + selection.failed_early;
            if let Some(wait) = selection.throttled_for {
                throttled_for = Some(throttled_for.map_or(wait, |current| current.min(wait)));
            }

            let successes = self.dispatch(selection.dispatch, &request, deadline).await;

            if let (Some(tier), Some((url, _))) = (tier, successes.first()) {
                self.preferred.lock().insert(*tier, url.clone());
            }
            let answered = !successes.is_empty();
            for (_, response) in successes {
                merge(&mut merged, response);
            }

            // A throttled tracker answered recently, so its tier is healthy
            if tier.is_some() && (answered || selection.throttled_for.is_some()) {
                break;
            }
        }

        match merged {
            Some(mut response) => {
                if response.interval == 0 {
                    response.interval = duration_secs(self.default_announce_interval);
                }
                response.interval = response
                    .interval
                    .max(duration_secs(self.min_announce_interval));

                tracing::info!(
                    "Announce round for {} returned {} peers, next announce in {}s",
                    request.info_hash,
                    response.peers.len(),
                    response.interval
                );
                Ok(response)
            }
            None if throttled_for.is_some() => {
                let retry_after = throttled_for.unwrap_or_default();
                tracing::debug!(
                    "No answer for {} while {} trackers failed and others are throttled, retry in {:?}",
                    request.info_hash,
                    attempted,
                    retry_after
                );
                Err(TrackerError::AnnounceThrottled { retry_after })
            }
            None => {
                tracing::warn!(
                    "No trackers reachable for {} ({} attempted)",
                    request.info_hash,
                    attempted
                );
                Err(TrackerError::NoTrackersReachable { attempted })
            }
        }
    }

    /// Scrapes trackers one at a time in tier order, returning the first
    /// successful answer.
    ///
    /// # Errors
    ///
    /// - `TrackerError::NoTrackersReachable` - Every tracker failed
    pub async fn scrape(
        &self,
        tiers: &TierList,
        request: ScrapeRequest,
    ) -> Result<ScrapeResponse, TrackerError> {
        let mut attempted = 0;
        let mut seen = HashSet::new();

        for url in tiers.urls() {
            if !seen.insert(url) {
                continue;
            }
            let client = match self.pool.client_for_url(url) {
                Ok(client) => client,
                Err(TrackerError::UnsupportedScheme { .. }) => continue,
                Err(e) => {
                    attempted += 1;
                    tracing::warn!("Tracker scrape {} failed: {}", url, e);
                    continue;
                }
            };

            attempted += 1;
            match tokio::time::timeout(self.announce_deadline, client.scrape(request.clone())).await
            {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => tracing::warn!("Tracker scrape {} failed: {}", url, e),
                Err(_) => tracing::warn!("Tracker scrape {} timed out", url),
            }
        }

        Err(TrackerError::NoTrackersReachable { attempted })
    }

    /// Copy of the state of every tracker this swarm has used.
    pub fn tracker_states(&self) -> Vec<TrackerState> {
        let mut states: Vec<_> = self.states.lock().values().cloned().collect();
        states.sort_by(|a, b| a.url.cmp(&b.url));
        states
    }

    pub fn tracker_state(&self, url: &str) -> Option<TrackerState> {
        self.states.lock().get(url).cloned()
    }

    /// Splits the tier list into rounds. Escalation rounds carry their tier
    /// index so the answering tracker can be moved to the front.
    fn rounds(&self, tiers: &TierList) -> Vec<(Option<usize>, Vec<String>)> {
        let preferred = self.preferred.lock();
        let ordered = tiers.tiers().iter().enumerate().map(|(index, tier)| {
            let mut tier = tier.clone();
            if let Some(position) = preferred
                .get(&index)
                .and_then(|url| tier.iter().position(|candidate| candidate == url))
            {
                let url = tier.remove(position);
                tier.insert(0, url);
            }
            (index, tier)
        });

        match self.policy {
            TierPolicy::FlattenAll => vec![(None, ordered.flat_map(|(_, tier)| tier).collect())],
            TierPolicy::TierEscalation => ordered
                .filter(|(_, tier)| !tier.is_empty())
                .map(|(index, tier)| (Some(index), tier))
                .collect(),
        }
    }

    /// Resolves clients for a round, skipping repeated URLs, unsupported
    /// schemes and trackers still inside their min interval.
    fn select<'a>(
        &self,
        urls: &'a [String],
        request: &AnnounceRequest,
        seen: &mut HashSet<&'a str>,
    ) -> Selection {
        let now = Instant::now();
        let mut selection = Selection::default();
        let mut states = self.states.lock();

        for url in urls {
            if !seen.insert(url.as_str()) {
                continue;
            }

            if request.event == AnnounceEvent::None
                && let Some(wait) = states.get(url).and_then(|state| state.throttled_for(now))
            {
                tracing::debug!("Skipping {} for another {:?} (min interval)", url, wait);
                selection.throttled_for =
                    Some(selection.throttled_for.map_or(wait, |current| current.min(wait)));
                continue;
            }

            match self.pool.client_for_url(url) {
                Ok(client) => selection.dispatch.push((url.clone(), client)),
                Err(TrackerError::UnsupportedScheme { .. }) => {
                    tracing::debug!("Skipping tracker with unsupported scheme: {}", url);
                }
                Err(e) => {
                    tracing::warn!("Tracker {} failed: {}", url, e);
                    states
                        .entry(url.clone())
                        .or_insert_with(|| TrackerState::new(url.clone()))
                        .record_failure(&e, now);
                    selection.failed_early += 1;
                }
            }
        }

        selection
    }

    /// Gives each selected tracker its own copy of the request carrying the
    /// `tracker id` this swarm last received from it.
    fn with_tracker_ids(
        &self,
        selected: Vec<Dispatch>,
        request: &AnnounceRequest,
    ) -> Vec<(String, Arc<dyn TrackerClient>, AnnounceRequest)> {
        let states = self.states.lock();
        selected
            .into_iter()
            .map(|(url, client)| {
                let mut request = request.clone();
                request.tracker_id = states.get(&url).and_then(|state| state.tracker_id.clone());
                (url, client, request)
            })
            .collect()
    }

    /// Announces to every selected tracker concurrently until `deadline` and
    /// records the outcomes. Successes come back in dispatch order.
    async fn dispatch(
        &self,
        selected: Vec<Dispatch>,
        request: &AnnounceRequest,
        deadline: tokio::time::Instant,
    ) -> Vec<(String, AnnounceResponse)> {
        let selected = self.with_tracker_ids(selected, request);
        let exchanges = selected.into_iter().map(|(url, client, request)| async move {
            tracing::debug!("Dispatching announce to {}", url);
            let result = match tokio::time::timeout_at(deadline, client.announce(request)).await {
                Ok(result) => result,
                Err(_) => Err(TrackerError::Timeout { url: url.clone() }),
            };
            (url, result)
        });

        let outcomes = join_all(exchanges).await;

        let now = Instant::now();
        let mut states = self.states.lock();
        let mut successes = Vec::new();

        for (url, result) in outcomes {
            let state = states
                .entry(url.clone())
                .or_insert_with(|| TrackerState::new(url.clone()));
            match result {
                Ok(response) => {
                    tracing::debug!(
                        "Tracker {} responded with {} peers, seeders: {}, leechers: {}",
                        url,
                        response.peers.len(),
                        response.seeders,
                        response.leechers
                    );
                    state.record_success(&response, now);
                    successes.push((url, response));
                }
                Err(e) => {
                    tracing::warn!("Tracker {} failed: {}", url, e);
                    state.record_failure(&e, now);
                }
            }
        }

        successes
    }
}

/// Folds one tracker's answer into the round result.
fn merge(merged: &mut Option<AnnounceResponse>, response: AnnounceResponse) {
    let Some(current) = merged else {
        *merged = Some(AnnounceResponse {
            tracker_id: None,
            ..response
        });
        return;
    };

    current.interval = current.interval.max(response.interval);
    current.min_interval = match (current.min_interval, response.min_interval) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    current.peers.extend(response.peers);
}

fn duration_secs(duration: Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}

/// Trait for tracker management abstraction.
///
/// Lets the peer layer depend on "announce this swarm" without knowing how
/// trackers are chosen, so tests can substitute a scripted implementation.
#[async_trait]
pub trait TrackerManager: Send + Sync {
    /// Announces to the swarm's trackers and returns the merged result.
    ///
    /// # Errors
    ///
    /// - `TrackerError::NoTrackersReachable` - If all trackers failed
    async fn announce_to_trackers(
        &self,
        tiers: &TierList,
        request: AnnounceRequest,
    ) -> Result<AnnounceResponse, TrackerError>;

    /// Scrapes statistics from trackers.
    ///
    /// # Errors
    ///
    /// - `TrackerError::NoTrackersReachable` - If all trackers failed
    async fn scrape_from_trackers(
        &self,
        tiers: &TierList,
        request: ScrapeRequest,
    ) -> Result<ScrapeResponse, TrackerError>;
}

#[async_trait]
impl TrackerManager for AnnounceCoordinator {
    async fn announce_to_trackers(
        &self,
        tiers: &TierList,
        request: AnnounceRequest,
    ) -> Result<AnnounceResponse, TrackerError> {
        self.announce(tiers, request).await
    }

    async fn scrape_from_trackers(
        &self,
        tiers: &TierList,
        request: ScrapeRequest,
    ) -> Result<ScrapeResponse, TrackerError> {
        self.scrape(tiers, request).await
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::config::TrackerConfig;
    use crate::torrent::tracker::simulated::{ResponseConfig, SimulatedFailure, SimulatedTrackerClient};
    use crate::torrent::tracker::state::TrackerStatus;
    use crate::torrent::{InfoHash, PeerId};

    fn request(event: AnnounceEvent) -> AnnounceRequest {
        AnnounceRequest {
            event,
            ..AnnounceRequest::started(InfoHash::new([7; 20]), PeerId::new([1; 20]), 6881, 1000)
        }
    }

    fn response(interval: u32, peers: &[&str]) -> AnnounceResponse {
        AnnounceResponse {
            interval,
            min_interval: None,
            tracker_id: None,
            seeders: 3,
            leechers: 4,
            peers: peers.iter().map(|p| p.parse::<SocketAddr>().unwrap()).collect(),
        }
    }

    fn pool_with(trackers: &[(&str, ResponseConfig)]) -> Arc<TrackerPool> {
        pool_with_config(TrackerConfig::for_testing(), trackers)
    }

    fn pool_with_config(
        config: TrackerConfig,
        trackers: &[(&str, ResponseConfig)],
    ) -> Arc<TrackerPool> {
        let pool = Arc::new(TrackerPool::new(config).unwrap());
        for (url, behaviour) in trackers {
            pool.register(
                *url,
                Arc::new(SimulatedTrackerClient::new(*url, behaviour.clone())),
            );
        }
        pool
    }

    fn tiers(tiers: &[&[&str]]) -> TierList {
        TierList::new(
            tiers
                .iter()
                .map(|tier| tier.iter().map(|url| url.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_tier_policy_parsing() {
        assert_eq!("flatten".parse::<TierPolicy>().unwrap(), TierPolicy::FlattenAll);
        assert_eq!("Escalate".parse::<TierPolicy>().unwrap(), TierPolicy::TierEscalation);
        assert!("random".parse::<TierPolicy>().is_err());
        assert_eq!(TierPolicy::default(), TierPolicy::TierEscalation);
    }

    #[test]
    fn test_merge_keeps_duplicates_and_takes_max_interval() {
        let mut merged = None;
        merge(&mut merged, response(900, &["10.0.0.1:1", "10.0.0.2:2"]));
        merge(
            &mut merged,
            AnnounceResponse {
                seeders: 100,
                min_interval: Some(60),
                ..response(1800, &["10.0.0.1:1"])
            },
        );

        let merged = merged.unwrap();
        assert_eq!(merged.interval, 1800);
        assert_eq!(merged.min_interval, Some(60));
        assert_eq!(merged.peers.len(), 3);
        assert_eq!(merged.seeders, 3);
    }

    #[tokio::test]
    async fn test_flatten_announces_to_every_tier() {
        let pool = pool_with(&[
            ("http://a/announce", ResponseConfig::Succeed(response(900, &["10.0.0.1:1"]))),
            ("http://b/announce", ResponseConfig::Succeed(response(1200, &["10.0.0.2:2"]))),
        ]);
        let coordinator = AnnounceCoordinator::with_policy(pool, TierPolicy::FlattenAll);

        let result = coordinator
            .announce(
                &tiers(&[&["http://a/announce"], &["http://b/announce"]]),
                request(AnnounceEvent::Started),
            )
            .await
            .unwrap();

        assert_eq!(result.peers.len(), 2);
        assert_eq!(result.interval, 1200);
        assert_eq!(coordinator.tracker_states().len(), 2);
    }

    #[tokio::test]
    async fn test_escalation_stops_at_first_answering_tier() {
        let pool = pool_with(&[
            ("http://a/announce", ResponseConfig::Fail(SimulatedFailure::Unreachable)),
            ("http://b/announce", ResponseConfig::Succeed(response(900, &["10.0.0.2:2"]))),
            ("http://c/announce", ResponseConfig::Succeed(response(900, &["10.0.0.3:3"]))),
        ]);
        let coordinator = AnnounceCoordinator::with_policy(pool, TierPolicy::TierEscalation);
        let list = tiers(&[&["http://a/announce"], &["http://b/announce"], &["http://c/announce"]]);

        let result = coordinator.announce(&list, request(AnnounceEvent::Started)).await.unwrap();

        assert_eq!(result.peers, vec!["10.0.0.2:2".parse::<SocketAddr>().unwrap()]);
        assert_eq!(
            coordinator.tracker_state("http://a/announce").unwrap().status,
            TrackerStatus::Failed
        );
        assert!(coordinator.tracker_state("http://c/announce").is_none());
    }

    #[tokio::test]
    async fn test_answering_tracker_moves_to_front_of_tier() {
        let pool = pool_with(&[
            ("http://a/announce", ResponseConfig::Fail(SimulatedFailure::Timeout)),
            ("http://b/announce", ResponseConfig::Succeed(response(900, &["10.0.0.2:2"]))),
        ]);
        let coordinator = AnnounceCoordinator::with_policy(pool, TierPolicy::TierEscalation);
        let list = tiers(&[&["http://a/announce", "http://b/announce"]]);

        coordinator.announce(&list, request(AnnounceEvent::Started)).await.unwrap();

        let rounds = coordinator.rounds(&list);
        assert_eq!(
            rounds,
            vec![(
                Some(0),
                vec!["http://b/announce".to_string(), "http://a/announce".to_string()]
            )]
        );
    }

    #[tokio::test]
    async fn test_unsupported_schemes_and_duplicates_are_skipped() {
        let pool = pool_with(&[(
            "http://a/announce",
            ResponseConfig::Succeed(response(900, &["10.0.0.1:1"])),
        )]);
        let coordinator = AnnounceCoordinator::with_policy(pool, TierPolicy::FlattenAll);
        let list = tiers(&[&["wss://tracker", "http://a/announce"], &["http://a/announce"]]);

        let result = coordinator.announce(&list, request(AnnounceEvent::Started)).await.unwrap();
        assert_eq!(result.peers.len(), 1);

        let only_unsupported = tiers(&[&["wss://tracker"]]);
        assert!(matches!(
            coordinator.announce(&only_unsupported, request(AnnounceEvent::Started)).await,
            Err(TrackerError::NoTrackersReachable { attempted: 0 })
        ));
    }

    #[tokio::test]
    async fn test_min_interval_throttles_periodic_announce() {
        let pool = pool_with(&[(
            "http://a/announce",
            ResponseConfig::Succeed(AnnounceResponse {
                min_interval: Some(600),
                ..response(1800, &["10.0.0.1:1"])
            }),
        )]);
        let coordinator = AnnounceCoordinator::new(pool);
        let list = tiers(&[&["http://a/announce"]]);

        coordinator.announce(&list, request(AnnounceEvent::Started)).await.unwrap();

        let periodic = coordinator.announce(&list, request(AnnounceEvent::None)).await;
        assert!(matches!(periodic, Err(TrackerError::AnnounceThrottled { .. })));

        // Events are never held back
        coordinator.announce(&list, request(AnnounceEvent::Completed)).await.unwrap();
    }

    #[tokio::test]
    async fn test_throttled_tracker_beside_failing_one_reports_throttled() {
        let throttling = ResponseConfig::Succeed(AnnounceResponse {
            min_interval: Some(600),
            ..response(1800, &["10.0.0.1:1"])
        });
        let failing = Arc::new(SimulatedTrackerClient::new(
            "http://b/announce",
            ResponseConfig::Fail(SimulatedFailure::Unreachable),
        ));
        let pool = pool_with(&[("http://a/announce", throttling)]);
        pool.register("http://b/announce", failing.clone());
        let coordinator = AnnounceCoordinator::new(pool);
        let list = tiers(&[&["http://a/announce", "http://b/announce"]]);

        coordinator.announce(&list, request(AnnounceEvent::Started)).await.unwrap();
        assert_eq!(failing.announce_count(), 1);

        let periodic = coordinator.announce(&list, request(AnnounceEvent::None)).await;
        assert!(matches!(
            periodic,
            Err(TrackerError::AnnounceThrottled { retry_after }) if retry_after > Duration::from_secs(590)
        ));
        assert_eq!(failing.announce_count(), 2);
    }

    #[tokio::test]
    async fn test_escalation_shares_one_deadline_across_tiers() {
        let config = TrackerConfig {
            announce_deadline: Duration::from_millis(200),
            ..TrackerConfig::for_testing()
        };
        let pool = pool_with_config(config, &[]);
        let urls = ["udp://t1:1", "udp://t2:1", "udp://t3:1"];
        let clients: Vec<_> = urls
            .iter()
            .map(|url| {
                let client = Arc::new(SimulatedTrackerClient::new(*url, ResponseConfig::Hang));
                pool.register(*url, client.clone());
                client
            })
            .collect();
        let coordinator = AnnounceCoordinator::new(pool);
        assert_eq!(coordinator.policy(), TierPolicy::TierEscalation);

        let started = Instant::now();
        let result = coordinator
            .announce(
                &tiers(&[&[urls[0]], &[urls[1]], &[urls[2]]]),
                request(AnnounceEvent::Started),
            )
            .await;

        assert!(matches!(result, Err(TrackerError::NoTrackersReachable { .. })));
        assert!(started.elapsed() < Duration::from_millis(350));
        assert!(clients.iter().all(|client| client.in_flight() == 0));
        assert_eq!(clients[0].announce_count(), 1);
    }

    #[tokio::test]
    async fn test_tracker_id_stays_with_the_swarm_that_received_it() {
        let shared = Arc::new(SimulatedTrackerClient::new(
            "http://a/announce",
            ResponseConfig::Succeed(AnnounceResponse {
                tracker_id: Some("swarm-a".to_string()),
                ..response(900, &["10.0.0.1:1"])
            }),
        ));
        let pool = pool_with(&[]);
        pool.register("http://a/announce", shared.clone());
        let first_swarm = AnnounceCoordinator::new(Arc::clone(&pool));
        let second_swarm = AnnounceCoordinator::new(pool);
        let list = tiers(&[&["http://a/announce"]]);

        first_swarm.announce(&list, request(AnnounceEvent::Started)).await.unwrap();
        assert_eq!(shared.last_request().unwrap().tracker_id, None);

        second_swarm.announce(&list, request(AnnounceEvent::Started)).await.unwrap();
        assert_eq!(shared.last_request().unwrap().tracker_id, None);

        first_swarm.announce(&list, request(AnnounceEvent::Completed)).await.unwrap();
        assert_eq!(
            shared.last_request().unwrap().tracker_id.as_deref(),
            Some("swarm-a")
        );
        assert_eq!(
            first_swarm.tracker_state("http://a/announce").unwrap().tracker_id.as_deref(),
            Some("swarm-a")
        );
    }

    #[tokio::test]
    async fn test_interval_floor_applied() {
        let pool = pool_with(&[(
            "http://a/announce",
            ResponseConfig::Succeed(response(0, &[])),
        )]);
        let coordinator = AnnounceCoordinator::new(pool);

        let result = coordinator
            .announce(&tiers(&[&["http://a/announce"]]), request(AnnounceEvent::Started))
            .await
            .unwrap();
        assert_eq!(result.interval, 1800);
    }

    #[tokio::test]
    async fn test_scrape_returns_first_success() {
        let pool = pool_with(&[
            ("http://a/announce", ResponseConfig::Fail(SimulatedFailure::Unreachable)),
            ("http://b/announce", ResponseConfig::Succeed(response(900, &[]))),
        ]);
        let coordinator = AnnounceCoordinator::new(pool);
        let info_hash = InfoHash::new([7; 20]);

        let result = coordinator
            .scrape_from_trackers(
                &tiers(&[&["http://a/announce"], &["http://b/announce"]]),
                ScrapeRequest {
                    info_hashes: vec![info_hash],
                },
            )
            .await
            .unwrap();
        assert!(result.files.contains_key(&info_hash));
    }
}
