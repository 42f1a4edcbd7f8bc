//! Storage seam used by the handlers and the flusher.

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use smarthome_store::{Result, Store};
use smarthome_types::{AuthorisedCard, GasAlert, RfidScan, SensorLog};

/// The subset of persistence the message path needs.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn insert_sensor_log(&self, log: &SensorLog) -> Result<()>;

    async fn insert_gas_alert(&self, alert: &GasAlert) -> Result<()>;

    /// Most recently started open alert for the device.
    async fn latest_open_gas_alert(&self, device_id: Uuid) -> Result<Option<GasAlert>>;

    async fn update_gas_alert(&self, alert: &GasAlert) -> Result<()>;

    async fn insert_rfid_scan(&self, scan: &RfidScan) -> Result<()>;

    async fn find_card_by_card_id(&self, card_id: &str) -> Result<Option<AuthorisedCard>>;
}

#[async_trait]
impl Storage for Mutex<Store> {
    async fn insert_sensor_log(&self, log: &SensorLog) -> Result<()> {
        self.lock().await.insert_sensor_log(log)
    }

    async fn insert_gas_alert(&self, alert: &GasAlert) -> Result<()> {
        self.lock().await.insert_gas_alert(alert)
    }

    async fn latest_open_gas_alert(&self, device_id: Uuid) -> Result<Option<GasAlert>> {
        self.lock().await.latest_open_gas_alert(device_id)
    }

    async fn update_gas_alert(&self, alert: &GasAlert) -> Result<()> {
        self.lock().await.update_gas_alert(alert)
    }

    async fn insert_rfid_scan(&self, scan: &RfidScan) -> Result<()> {
        self.lock().await.insert_rfid_scan(scan)
    }

    async fn find_card_by_card_id(&self, card_id: &str) -> Result<Option<AuthorisedCard>> {
        self.lock().await.find_card_by_card_id(card_id)
    }
}
