//! Wiring of the broker loop, the dispatch loop and the flusher.
//!
//! Three long-running tasks share the [`AppState`]:
//!
//! - the broker connection, which turns broker traffic into [`BrokerEvent`]s
//! - the dispatch loop, which spawns one router dispatch per message
//! - the flusher, which drains the cache on its interval
//!
//! All three watch the same stop signal. [`Bridge::stop`] waits, bounded, for
//! the broker and flush tasks so the broker disconnect goes out before the
//! runtime shuts down. In-flight dispatches are not awaited.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::{BrokerConnection, BrokerEvent, ConnectError, DISCONNECT_TIMEOUT};
use crate::cards::CardLookupService;
use crate::config::Config;
use crate::flusher::PeriodicFlusher;
use crate::handlers::{
    DeviceIds, GasAlertHandler, RfidValidationHandler, SensorDataHandler, StatusUpdateHandler,
};
use crate::router::MessageRouter;
use crate::state::AppState;

/// Buffer between the broker loop and the dispatch loop.
const EVENT_BUFFER: usize = 256;

/// Upper bound on waiting for the bridge tasks in [`Bridge::stop`].
const STOP_TIMEOUT: Duration = DISCONNECT_TIMEOUT.saturating_add(Duration::from_secs(1));

/// Build a router with the four standard handlers.
pub fn build_router(state: &AppState, config: &Config) -> MessageRouter {
    let storage = state.storage();
    let devices = DeviceIds::new(config.bridge.device_uuid.clone());

    let mut router = MessageRouter::new();
    router
        .register(SensorDataHandler::new(
            Arc::clone(&state.cache),
            Arc::clone(&storage),
            devices.clone(),
        ))
        .register(GasAlertHandler::new(Arc::clone(&storage), devices.clone()))
        .register(RfidValidationHandler::new(
            CardLookupService::new(Arc::clone(&storage)),
            Arc::clone(&state.publisher),
            Arc::clone(&storage),
            devices,
        ))
        .register(StatusUpdateHandler::new(Arc::clone(&state.statuses)));
    router
}

/// The running bridge.
pub struct Bridge {
    state: Arc<AppState>,
    /// Broker and flush tasks, awaited on stop.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the broker, dispatch and flush tasks.
    ///
    /// Returns once the tasks are spawned; connecting happens in the
    /// background.
    pub async fn start(&self) -> Result<(), ConnectError> {
        let config = self.state.config.read().await.clone();

        let router = Arc::new(build_router(&self.state, &config));
        let connection =
            BrokerConnection::connect(&config.broker, Arc::clone(&self.state.publisher)).await?;
        let flusher = PeriodicFlusher::new(
            Arc::clone(&self.state.cache),
            self.state.storage(),
            config.bridge.device_uuid.clone(),
            config.bridge.flush_interval(),
        );

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let stop_rx = self.state.bridge.subscribe_stop();

        info!(
            "Starting bridge with {} handlers, flush every {}s",
            router.len(),
            config.bridge.flush_interval
        );

        let broker_task = tokio::spawn(connection.run(events_tx, stop_rx.clone()));
        // Ends on its own once the broker task drops the sender
        tokio::spawn(dispatch_events(router, events_rx));
        let flush_task = tokio::spawn(flusher.run(stop_rx));
        self.tasks.lock().await.extend([broker_task, flush_task]);

        self.state.bridge.set_running(true);
        Ok(())
    }

    /// Signal every bridge task to stop and wait for the broker and flush
    /// tasks to finish.
    ///
    /// Returns `false` if they did not finish within the stop timeout.
    pub async fn stop(&self) -> bool {
        info!("Stopping bridge");
        self.state.bridge.signal_stop();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let wait_all = async {
            for task in tasks {
                if let Err(e) = task.await {
                    warn!("Bridge task ended abnormally: {}", e);
                }
            }
        };

        match tokio::time::timeout(STOP_TIMEOUT, wait_all).await {
            Ok(()) => {
                info!("Bridge stopped");
                true
            }
            Err(_) => {
                warn!("Bridge tasks did not stop within {:?}", STOP_TIMEOUT);
                false
            }
        }
    }
}

/// Spawn a dispatch per inbound message until the broker loop ends.
pub async fn dispatch_events(router: Arc<MessageRouter>, mut events: mpsc::Receiver<BrokerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            BrokerEvent::Message { topic, payload } => {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    router.dispatch(&topic, &payload).await;
                });
            }
            BrokerEvent::Connected => debug!("Broker connected, subscriptions issued"),
            BrokerEvent::Disconnected { reason } => debug!("Broker disconnected: {}", reason),
        }
    }
    debug!("Dispatch loop finished");
}
