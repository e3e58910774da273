//! Scripted in-process tracker for deterministic tests.
//!
//! `SimulatedTrackerClient` answers from a configured `ResponseConfig`
//! instead of the network and counts how it was used, so coordinator
//! behaviour (fan-out, partial failure, cancellation) can be asserted
//! without real sockets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::types::{
    AnnounceRequest, AnnounceResponse, ScrapeRequest, ScrapeResponse, ScrapeStats, TrackerClient,
};
use crate::torrent::TrackerError;

/// Failure a simulated tracker reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedFailure {
    Timeout,
    Unreachable,
    /// Tracker-supplied `failure reason`
    Protocol(String),
}

/// How a simulated tracker answers.
#[derive(Debug, Clone)]
pub enum ResponseConfig {
    Succeed(AnnounceResponse),
    Fail(SimulatedFailure),
    /// Never answers; only a deadline or cancellation ends the exchange
    Hang,
}

/// Tracker client answering from a script.
pub struct SimulatedTrackerClient {
    url: String,
    response: Mutex<ResponseConfig>,
    delay: Option<Duration>,
    announces: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    last_request: Mutex<Option<AnnounceRequest>>,
}

impl SimulatedTrackerClient {
    pub fn new(url: impl Into<String>, response: ResponseConfig) -> Self {
        Self {
            url: url.into(),
            response: Mutex::new(response),
            delay: None,
            announces: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Delays every answer by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the scripted answer for later exchanges.
    pub fn set_response(&self, response: ResponseConfig) {
        *self.response.lock() = response;
    }

    /// Exchanges started so far.
    pub fn announce_count(&self) -> usize {
        self.announces.load(Ordering::SeqCst)
    }

    /// Exchanges started and neither finished nor dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Exchanges that ran to an answer.
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AnnounceRequest> {
        self.last_request.lock().clone()
    }

    async fn answer(&self) -> Result<AnnounceResponse, TrackerError> {
        let _guard = InFlightGuard::enter(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.response.lock().clone();
        let result = match response {
            ResponseConfig::Succeed(response) => Ok(response),
            ResponseConfig::Fail(SimulatedFailure::Timeout) => Err(TrackerError::Timeout {
                url: self.url.clone(),
            }),
            ResponseConfig::Fail(SimulatedFailure::Unreachable) => {
                Err(TrackerError::TrackerUnreachable {
                    url: self.url.clone(),
                })
            }
            ResponseConfig::Fail(SimulatedFailure::Protocol(reason)) => {
                Err(TrackerError::ProtocolError {
                    message: format!("Tracker error: {reason}"),
                })
            }
            ResponseConfig::Hang => futures::future::pending().await,
        };

        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrackerClient for SimulatedTrackerClient {
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        self.announces.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request);
        self.answer().await
    }

    /// Reports the scripted seeder/leecher counts for every requested hash.
    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeResponse, TrackerError> {
        let response = self.answer().await?;
        let stats = ScrapeStats {
            complete: response.seeders,
            downloaded: 0,
            incomplete: response.leechers,
        };

        Ok(ScrapeResponse {
            files: request
                .info_hashes
                .into_iter()
                .map(|info_hash| (info_hash, stats))
                .collect(),
        })
    }

    fn tracker_url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::{InfoHash, PeerId};

    fn request() -> AnnounceRequest {
        AnnounceRequest::started(InfoHash::new([1; 20]), PeerId::new([2; 20]), 6881, 0)
    }

    #[tokio::test]
    async fn test_scripted_answers_and_counters() {
        let client = SimulatedTrackerClient::new(
            "http://sim/announce",
            ResponseConfig::Fail(SimulatedFailure::Protocol("banned".to_string())),
        );

        let error = client.announce(request()).await.unwrap_err();
        assert!(error.to_string().contains("banned"));

        client.set_response(ResponseConfig::Fail(SimulatedFailure::Timeout));
        assert!(matches!(
            client.announce(request()).await,
            Err(TrackerError::Timeout { .. })
        ));

        assert_eq!(client.announce_count(), 2);
        assert_eq!(client.completed_count(), 2);
        assert_eq!(client.in_flight(), 0);
        assert_eq!(client.last_request().unwrap().port, 6881);
    }

    #[tokio::test]
    async fn test_hanging_tracker_releases_guard_when_dropped() {
        let client = SimulatedTrackerClient::new("http://sim/announce", ResponseConfig::Hang);

        let result =
            tokio::time::timeout(Duration::from_millis(20), client.announce(request())).await;

        assert!(result.is_err());
        assert_eq!(client.in_flight(), 0);
        assert_eq!(client.completed_count(), 0);
    }
}
