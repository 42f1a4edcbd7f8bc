//! Last known state of each device output.

use std::collections::HashMap;

use tokio::sync::RwLock;

use smarthome_types::DeviceStatus;

/// In-memory board keyed by (device, output). Never persisted.
#[derive(Debug, Default)]
pub struct DeviceStatusBoard {
    entries: RwLock<HashMap<(String, String), DeviceStatus>>,
}

impl DeviceStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status, replacing the previous one for the same output.
    pub async fn record(&self, status: DeviceStatus) {
        let key = (status.device.clone(), status.output.clone());
        self.entries.write().await.insert(key, status);
    }

    pub async fn get(&self, device: &str, output: &str) -> Option<DeviceStatus> {
        self.entries
            .read()
            .await
            .get(&(device.to_string(), output.to_string()))
            .cloned()
    }

    /// All entries, sorted by device then output.
    pub async fn snapshot(&self) -> Vec<DeviceStatus> {
        let mut all: Vec<DeviceStatus> = self.entries.read().await.values().cloned().collect();
        all.sort_by(|a, b| (&a.device, &a.output).cmp(&(&b.device, &b.output)));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smarthome_types::OutputState;
    use time::macros::datetime;

    fn status(device: &str, output: &str, state: OutputState) -> DeviceStatus {
        DeviceStatus {
            device: device.to_string(),
            output: output.to_string(),
            state,
            updated_at: datetime!(2025-01-15 10:00:00 UTC),
        }
    }

    #[tokio::test]
    async fn test_record_replaces_per_output() {
        let board = DeviceStatusBoard::new();
        board.record(status("esp32_main", "door", OutputState::Open)).await;
        board.record(status("esp32_main", "fan", OutputState::On)).await;
        board.record(status("esp32_main", "door", OutputState::Closed)).await;

        let door = board.get("esp32_main", "door").await.unwrap();
        assert_eq!(door.state, OutputState::Closed);

        let all = board.snapshot().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].output, "door");
        assert_eq!(all[1].output, "fan");
    }
}
