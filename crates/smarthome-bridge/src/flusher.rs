//! Periodic flush of buffered readings to storage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use smarthome_types::SensorLog;

use crate::cache::LatestReadingCache;
use crate::storage::Storage;

/// Result of one flush tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Rows written.
    pub written: usize,
    /// Rows whose insert failed. These readings are gone.
    pub failed: usize,
    /// The tick was skipped without touching the cache.
    pub skipped: bool,
}

/// Drains the latest-reading cache into sensor logs on a fixed interval.
pub struct PeriodicFlusher {
    cache: Arc<LatestReadingCache>,
    storage: Arc<dyn Storage>,
    device_uuid: Option<String>,
    interval: Duration,
}

impl PeriodicFlusher {
    pub fn new(
        cache: Arc<LatestReadingCache>,
        storage: Arc<dyn Storage>,
        device_uuid: Option<String>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            storage,
            device_uuid,
            interval,
        }
    }

    /// Flush every interval until `stop_rx` flips to true.
    ///
    /// The first flush happens one full interval after start.
    pub async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        info!("Starting flusher (interval: {}s)", self.interval.as_secs());

        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.flush_once().await;
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        info!("Flusher received stop signal");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single flush.
    pub async fn flush_once(&self) -> FlushReport {
        let device_id = match self.device_uuid.as_deref().map(|s| Uuid::parse_str(s.trim())) {
            Some(Ok(id)) => id,
            _ => {
                warn!("Skipping flush: bridge.device_uuid is missing or not a UUID");
                return FlushReport {
                    skipped: true,
                    ..Default::default()
                };
            }
        };

        let readings = self.cache.take_all().await;
        if readings.is_empty() {
            debug!("Nothing to flush");
            return FlushReport::default();
        }

        let mut report = FlushReport::default();
        for reading in &readings {
            let log = SensorLog::from_reading(device_id, reading);
            match self.storage.insert_sensor_log(&log).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    error!("Failed to flush {} reading: {}", reading.sensor_type, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Flushed {} reading(s), {} failed",
            report.written, report.failed
        );
        report
    }
}
