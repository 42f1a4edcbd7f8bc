//! Data models for joined query results.

use serde::Serialize;

use smarthome_types::RfidScan;

/// An RFID scan joined with the holder name of its authorised card.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRfidScan {
    /// The scan row.
    #[serde(flatten)]
    pub scan: RfidScan,
    /// Username of the matching authorised card, if any.
    pub username: Option<String>,
}
