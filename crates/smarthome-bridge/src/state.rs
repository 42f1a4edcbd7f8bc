//! Application state shared by the bridge tasks and the HTTP API.
//!
//! # Lock Ordering
//!
//! When more than one lock is needed, acquire in this order:
//! 1. `config`
//! 2. `store`
//! 3. cache / status board (internal to their types, never held across calls)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};

use smarthome_store::Store;

use crate::cache::LatestReadingCache;
use crate::config::Config;
use crate::publisher::Publisher;
use crate::status_board::DeviceStatusBoard;
use crate::storage::Storage;

/// Shared application state.
pub struct AppState {
    /// The data store.
    pub store: Arc<Mutex<Store>>,
    /// Configuration.
    pub config: RwLock<Config>,
    /// Latest temperature and humidity awaiting flush.
    pub cache: Arc<LatestReadingCache>,
    /// Outbound publisher, attached once the broker connection exists.
    pub publisher: Arc<Publisher>,
    /// Last known output states.
    pub statuses: Arc<DeviceStatusBoard>,
    /// Bridge task control.
    pub bridge: BridgeState,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(Mutex::new(store)),
            config: RwLock::new(config),
            cache: Arc::new(LatestReadingCache::new()),
            publisher: Arc::new(Publisher::new()),
            statuses: Arc::new(DeviceStatusBoard::new()),
            bridge: BridgeState::new(),
        })
    }

    /// The store behind the storage seam used by handlers.
    pub fn storage(&self) -> Arc<dyn Storage> {
        self.store.clone()
    }
}

/// State for tracking and stopping the bridge tasks.
pub struct BridgeState {
    running: AtomicBool,
    /// Unix timestamp of the last start, 0 if never started.
    started_at: AtomicU64,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl BridgeState {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            stop_tx,
            stop_rx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the bridge as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    pub fn started_at(&self) -> Option<OffsetDateTime> {
        match self.started_at.load(Ordering::SeqCst) {
            0 => None,
            ts => OffsetDateTime::from_unix_timestamp(ts as i64).ok(),
        }
    }

    /// A receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal all bridge tasks to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_new() {
        let state = AppState::new(Store::open_in_memory().unwrap(), Config::default());
        assert!(!state.bridge.is_running());
        assert!(state.bridge.started_at().is_none());
        assert!(state.cache.is_empty().await);
        assert!(!state.publisher.is_connected());
        assert_eq!(state.config.read().await.bridge.flush_interval, 1800);
    }

    #[test]
    fn test_bridge_state_running() {
        let bridge = BridgeState::new();
        bridge.set_running(true);
        assert!(bridge.is_running());
        assert!(bridge.started_at().is_some());

        bridge.signal_stop();
        assert!(!bridge.is_running());
    }

    #[tokio::test]
    async fn test_stop_signal_reaches_subscribers() {
        let bridge = BridgeState::new();
        let mut rx = bridge.subscribe_stop();
        assert!(!*rx.borrow());

        bridge.signal_stop();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
