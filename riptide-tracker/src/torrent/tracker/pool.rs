//! URL-keyed cache of tracker clients shared by every swarm

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::client::HttpTrackerClient;
use super::types::TrackerClient;
use super::udp::UdpTrackerClient;
use crate::config::TrackerConfig;
use crate::torrent::TrackerError;

/// Wire protocol selected by a tracker URL's scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerProtocol {
    Http,
    Udp,
}

impl TrackerProtocol {
    /// Classifies a tracker URL; `None` for schemes no client speaks.
    pub fn classify(url: &str) -> Option<Self> {
        let (scheme, _) = url.split_once("://")?;
        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Some(TrackerProtocol::Http),
            "udp" => Some(TrackerProtocol::Udp),
            _ => None,
        }
    }
}

/// Creates and caches one client per tracker URL.
///
/// A UDP client owns the socket and cached connection ID for its tracker, so
/// sharing the pool between swarms lets concurrent torrents announcing to the
/// same host share one handshake. HTTP clients share a single connection pool.
pub struct TrackerPool {
    config: TrackerConfig,
    http: reqwest::Client,
    clients: Mutex<HashMap<String, Arc<dyn TrackerClient>>>,
}

impl TrackerPool {
    /// Creates an empty pool.
    ///
    /// # Errors
    ///
    /// - `TrackerError::Http` - If the shared HTTP client cannot be built
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        let http = HttpTrackerClient::build_http_client(&config)?;
        Ok(Self {
            config,
            http,
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Gets cached tracker client or creates new one for URL.
    ///
    /// # Errors
    ///
    /// - `TrackerError::UnsupportedScheme` - URL is neither http(s) nor udp
    /// - `TrackerError::InvalidTrackerUrl` - UDP URL without host or port
    pub fn client_for_url(&self, tracker_url: &str) -> Result<Arc<dyn TrackerClient>, TrackerError> {
        if let Some(client) = self.clients.lock().get(tracker_url) {
            return Ok(Arc::clone(client));
        }

        let client: Arc<dyn TrackerClient> = match TrackerProtocol::classify(tracker_url) {
            Some(TrackerProtocol::Http) => Arc::new(HttpTrackerClient::with_client(
                tracker_url.to_string(),
                self.http.clone(),
                &self.config,
            )),
            Some(TrackerProtocol::Udp) => {
                Arc::new(UdpTrackerClient::new(tracker_url.to_string(), &self.config)?)
            }
            None => {
                return Err(TrackerError::UnsupportedScheme {
                    url: tracker_url.to_string(),
                });
            }
        };

        // Another caller may have raced us here; keep whichever landed first.
        let mut clients = self.clients.lock();
        let client = clients
            .entry(tracker_url.to_string())
            .or_insert(client);
        Ok(Arc::clone(client))
    }

    /// Installs a client for `tracker_url`, replacing any cached one.
    pub fn register(&self, tracker_url: impl Into<String>, client: Arc<dyn TrackerClient>) {
        self.clients.lock().insert(tracker_url.into(), client);
    }

    /// Drops the cached client for one URL, closing its socket once idle.
    pub fn evict(&self, tracker_url: &str) -> bool {
        self.clients.lock().remove(tracker_url).is_some()
    }

    /// Clears cached tracker clients to free memory.
    pub fn clear_cache(&self) {
        self.clients.lock().clear();
    }

    /// Returns number of cached tracker clients.
    pub fn cached_trackers_count(&self) -> usize {
        self.clients.lock().len()
    }
}
