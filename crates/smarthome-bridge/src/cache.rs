//! Latest-reading cache for buffered sensor types.

use std::collections::HashMap;

use tokio::sync::Mutex;

use smarthome_types::{SensorReading, SensorType};

/// Most recent reading per buffered sensor type.
///
/// Holds at most one entry per type. Every access goes through one lock and
/// copies readings out, so the lock is never held across an await point
/// outside this type.
#[derive(Debug, Default)]
pub struct LatestReadingCache {
    readings: Mutex<HashMap<SensorType, SensorReading>>,
}

impl LatestReadingCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for the reading's type.
    ///
    /// Returns `false` and leaves the cache unchanged for types that are not
    /// buffered.
    pub async fn update(&self, reading: SensorReading) -> bool {
        if !reading.sensor_type.is_buffered() {
            return false;
        }
        self.readings
            .lock()
            .await
            .insert(reading.sensor_type, reading);
        true
    }

    /// Copy of the entry for one type.
    pub async fn get(&self, sensor_type: SensorType) -> Option<SensorReading> {
        self.readings.lock().await.get(&sensor_type).cloned()
    }

    /// Copy of all entries, ordered by sensor type.
    pub async fn snapshot(&self) -> Vec<SensorReading> {
        let mut readings: Vec<SensorReading> =
            self.readings.lock().await.values().cloned().collect();
        readings.sort_by_key(|r| r.sensor_type);
        readings
    }

    /// Remove and return all entries in one critical section.
    ///
    /// A reading that arrives after this returns lands in the emptied cache
    /// and is picked up by the next call.
    pub async fn take_all(&self) -> Vec<SensorReading> {
        let drained: HashMap<SensorType, SensorReading> =
            std::mem::take(&mut *self.readings.lock().await);
        let mut readings: Vec<SensorReading> = drained.into_values().collect();
        readings.sort_by_key(|r| r.sensor_type);
        readings
    }

    /// Whether the cache holds no readings.
    pub async fn is_empty(&self) -> bool {
        self.readings.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::datetime;

    fn reading(sensor_type: SensorType, value: f64) -> SensorReading {
        SensorReading {
            sensor_type,
            value,
            detected: None,
            unit: None,
            timestamp: datetime!(2025-01-15 10:30:00 UTC),
        }
    }

    #[tokio::test]
    async fn test_update_overwrites() {
        let cache = LatestReadingCache::new();
        for v in [20.0, 21.0, 22.5] {
            assert!(cache.update(reading(SensorType::Temperature, v)).await);
        }
        let latest = cache.get(SensorType::Temperature).await.unwrap();
        assert_eq!(latest.value, 22.5);
        assert_eq!(cache.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_ignores_event_types() {
        let cache = LatestReadingCache::new();
        assert!(!cache.update(reading(SensorType::Motion, 1.0)).await);
        assert!(!cache.update(reading(SensorType::Gas, 0.0)).await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_take_all_clears() {
        let cache = LatestReadingCache::new();
        cache.update(reading(SensorType::Humidity, 45.0)).await;
        cache.update(reading(SensorType::Temperature, 21.0)).await;

        let taken = cache.take_all().await;
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].sensor_type, SensorType::Temperature);
        assert_eq!(taken[1].sensor_type, SensorType::Humidity);

        assert!(cache.is_empty().await);
        assert!(cache.take_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers_keep_one_entry_per_type() {
        let cache = Arc::new(LatestReadingCache::new());
        let mut tasks = Vec::new();
        for i in 0..50 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                let ty = if i % 2 == 0 {
                    SensorType::Temperature
                } else {
                    SensorType::Humidity
                };
                cache.update(reading(ty, f64::from(i))).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.snapshot().await.len(), 2);
    }
}
