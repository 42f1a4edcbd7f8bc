//! Local persistence for the smart-home telemetry bridge.
//!
//! This crate provides SQLite-based storage for the rows the bridge writes
//! and the reference data it reads.
//!
//! # Features
//!
//! - Sensor logs (periodic temperature/humidity, motion events)
//! - Gas alerts with open/close lifecycle
//! - RFID scan log with access results
//! - Authorised cards (reference data)
//! - Query by sensor type, device, time range, with limits
//!
//! # Example
//!
//! ```no_run
//! use smarthome_store::{Store, SensorLogQuery};
//! use smarthome_types::SensorType;
//!
//! let store = Store::open_default()?;
//!
//! let query = SensorLogQuery::new()
//!     .sensor_type(SensorType::Temperature)
//!     .limit(10);
//! let logs = store.query_sensor_logs(&query)?;
//! # Ok::<(), smarthome_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::StoredRfidScan;
pub use queries::{GasAlertQuery, RfidScanQuery, SensorLogQuery};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/smarthome/data.db`
/// - macOS: `~/Library/Application Support/smarthome/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\smarthome\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("smarthome")
        .join("data.db")
}
