//! Domain types for the smart-home telemetry bridge.
//!
//! This crate holds the types shared by the persistence layer
//! (smarthome-store) and the broker bridge (smarthome-bridge).
//!
//! # Features
//!
//! - Sensor readings with range validation for buffered sensor types
//! - Gas alert lifecycle (open/close)
//! - RFID scans and authorised cards
//! - Ephemeral device output status
//!
//! # Example
//!
//! ```
//! use smarthome_types::{SensorType, AccessResult};
//!
//! let ty: SensorType = "temperature".parse().unwrap();
//! assert!(ty.is_buffered());
//! assert_eq!(AccessResult::from_valid(false).as_str(), "denied");
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    AccessResult, AuthorisedCard, DeviceStatus, GasAlert, HUMIDITY_RANGE, OutputState,
    RfidScan, SensorLog, SensorReading, SensorType, TEMPERATURE_RANGE, format_timestamp,
    parse_timestamp,
};


/// Property tests for range validation.
///
/// ```bash
/// cargo test -p smarthome-types proptests
/// ```
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Temperature is accepted exactly on [-20, 60].
        #[test]
        fn temperature_accepted_iff_in_range(v in -1000.0f64..1000.0) {
            prop_assert_eq!(SensorType::Temperature.accepts(v), (-20.0..=60.0).contains(&v));
        }

        /// Humidity is accepted exactly on [0, 100].
        #[test]
        fn humidity_accepted_iff_in_range(v in -1000.0f64..1000.0) {
            prop_assert_eq!(SensorType::Humidity.accepts(v), (0.0..=100.0).contains(&v));
        }

        /// Event sensors are never range-checked.
        #[test]
        fn event_sensors_accept_any_finite_value(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            prop_assert!(SensorType::Motion.accepts(v));
            prop_assert!(SensorType::Gas.accepts(v));
        }
    }
}
