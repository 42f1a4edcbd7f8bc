//! Core types for smart-home telemetry.

use core::fmt;
use core::ops::RangeInclusive;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::error::{ParseError, ParseResult};

/// Accepted temperature range in degrees Celsius.
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = -20.0..=60.0;

/// Accepted relative humidity range in percent.
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// Kind of sensor a reading came from.
///
/// Serialized in lowercase (`"temperature"`, `"humidity"`, ...), matching the
/// `sensor_type` field devices put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SensorType {
    /// DHT11 temperature in degrees Celsius.
    Temperature,
    /// DHT11 relative humidity in percent.
    Humidity,
    /// PIR motion events.
    Motion,
    /// Gas detector events.
    Gas,
}

impl SensorType {
    /// Sensor types whose latest value is buffered in memory and written
    /// out periodically rather than on arrival.
    pub const BUFFERED: [SensorType; 2] = [SensorType::Temperature, SensorType::Humidity];

    /// Lowercase wire name of this sensor type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::Motion => "motion",
            SensorType::Gas => "gas",
        }
    }

    /// Whether readings of this type go through the latest-reading cache.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        matches!(self, SensorType::Temperature | SensorType::Humidity)
    }

    /// Inclusive range of plausible values, if this type is range-checked.
    #[must_use]
    pub fn valid_range(&self) -> Option<RangeInclusive<f64>> {
        match self {
            SensorType::Temperature => Some(TEMPERATURE_RANGE),
            SensorType::Humidity => Some(HUMIDITY_RANGE),
            SensorType::Motion | SensorType::Gas => None,
        }
    }

    /// Check a value against [`valid_range`](Self::valid_range).
    ///
    /// NaN never falls inside a range. Types without a range accept any value.
    ///
    /// ```
    /// use smarthome_types::SensorType;
    ///
    /// assert!(SensorType::Temperature.accepts(-20.0));
    /// assert!(SensorType::Temperature.accepts(60.0));
    /// assert!(!SensorType::Temperature.accepts(60.5));
    /// assert!(!SensorType::Humidity.accepts(-0.1));
    /// assert!(SensorType::Gas.accepts(4095.0));
    /// ```
    #[must_use]
    pub fn accepts(&self, value: f64) -> bool {
        match self.valid_range() {
            Some(range) => range.contains(&value),
            None => true,
        }
    }
}

impl FromStr for SensorType {
    type Err = ParseError;

    /// Parse a sensor type name. Surrounding whitespace and case are ignored.
    fn from_str(s: &str) -> ParseResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" => Ok(SensorType::Temperature),
            "humidity" => Ok(SensorType::Humidity),
            "motion" => Ok(SensorType::Motion),
            "gas" => Ok(SensorType::Gas),
            _ => Err(ParseError::UnknownSensorType(s.to_string())),
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated reading received from a device.
///
/// Readings are transient: buffered types live in the latest-reading cache
/// until flushed, event types are acted on immediately.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorReading {
    /// Kind of sensor.
    pub sensor_type: SensorType,
    /// Measured value. Event sensors that only report `detected` carry 0.
    pub value: f64,
    /// Detection flag for motion and gas sensors.
    pub detected: Option<bool>,
    /// Unit reported by the device, if any.
    pub unit: Option<String>,
    /// Device-supplied capture time.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

impl SensorReading {
    /// Whether the device reported `detected: true`.
    #[must_use]
    pub fn is_detected(&self) -> bool {
        self.detected == Some(true)
    }
}

/// A persisted sensor log row.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorLog {
    /// Row identifier.
    pub id: Uuid,
    /// Device the value belongs to.
    pub device_id: Uuid,
    /// Kind of sensor.
    pub sensor_type: SensorType,
    /// Logged value.
    pub value: f64,
    /// Capture time of the reading.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

impl SensorLog {
    /// Build a log row from a reading, with a fresh id and the reading's own timestamp.
    #[must_use]
    pub fn from_reading(device_id: Uuid, reading: &SensorReading) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            sensor_type: reading.sensor_type,
            value: reading.value,
            timestamp: reading.timestamp,
        }
    }

    /// A motion event row. Motion is logged as value 1.
    #[must_use]
    pub fn motion_event(device_id: Uuid, timestamp: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            sensor_type: SensorType::Motion,
            value: 1.0,
            timestamp,
        }
    }
}

/// A gas alert. Open while `alert_end` is `None`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GasAlert {
    /// Row identifier.
    pub id: Uuid,
    /// Device that raised the alert.
    pub device_id: Uuid,
    /// Raw sensor value at detection time.
    pub sensor_value: i64,
    /// When gas was first detected.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub alert_start: OffsetDateTime,
    /// When gas cleared, if it has.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub alert_end: Option<OffsetDateTime>,
}

impl GasAlert {
    /// Open a new alert starting at `alert_start`.
    #[must_use]
    pub fn open(device_id: Uuid, sensor_value: i64, alert_start: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            sensor_value,
            alert_start,
            alert_end: None,
        }
    }

    /// Whether the alert is still ongoing.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.alert_end.is_none()
    }

    /// Close the alert at `alert_end`. `alert_start` is left untouched.
    pub fn close(&mut self, alert_end: OffsetDateTime) {
        self.alert_end = Some(alert_end);
    }

    /// Time between start and end, for closed alerts.
    #[must_use]
    pub fn duration(&self) -> Option<time::Duration> {
        self.alert_end.map(|end| end - self.alert_start)
    }
}

/// Outcome of an RFID validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AccessResult {
    /// The card is known and active.
    Granted,
    /// The card is unknown or inactive.
    Denied,
}

impl AccessResult {
    /// `Granted` when `valid` is true, `Denied` otherwise.
    #[must_use]
    pub fn from_valid(valid: bool) -> Self {
        if valid {
            AccessResult::Granted
        } else {
            AccessResult::Denied
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessResult::Granted => "granted",
            AccessResult::Denied => "denied",
        }
    }

    /// Whether access was granted.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessResult::Granted)
    }
}

impl FromStr for AccessResult {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "granted" => Ok(AccessResult::Granted),
            "denied" => Ok(AccessResult::Denied),
            _ => Err(ParseError::UnknownAccessResult(s.to_string())),
        }
    }
}

impl fmt::Display for AccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logged RFID validation. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RfidScan {
    /// Row identifier.
    pub id: Uuid,
    /// Device the card was presented to.
    pub device_id: Uuid,
    /// Raw card identifier read by the device.
    pub card_id: String,
    /// Internal id of the matching authorised card, only set when granted.
    pub authorised_card_id: Option<Uuid>,
    /// Validation outcome.
    pub access_result: AccessResult,
    /// When the scan was validated.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

impl RfidScan {
    /// Record a validation outcome.
    ///
    /// `authorised_card_id` is dropped for denied scans so a denied row
    /// never points at a card.
    #[must_use]
    pub fn record(
        device_id: Uuid,
        card_id: &str,
        access_result: AccessResult,
        authorised_card_id: Option<Uuid>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            card_id: card_id.to_string(),
            authorised_card_id: authorised_card_id.filter(|_| access_result.is_granted()),
            access_result,
            timestamp,
        }
    }
}

/// A card allowed through the door, when active.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AuthorisedCard {
    /// Internal identifier.
    pub id: Uuid,
    /// Raw card identifier as read by the RFID reader.
    pub card_id: String,
    /// Owning user, if linked.
    pub user_id: Option<Uuid>,
    /// Display name of the card holder.
    pub username: Option<String>,
    /// Inactive cards are denied.
    pub is_active: bool,
    /// When the card was registered.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
}

impl AuthorisedCard {
    /// Create a new active card registered now.
    #[must_use]
    pub fn new(card_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id: card_id.to_string(),
            user_id: None,
            username: None,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Whether presenting this card grants access.
    #[must_use]
    pub fn grants_access(&self) -> bool {
        self.is_active
    }
}

/// State reported by a device output (door, window, fan, LED).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OutputState {
    Open,
    Closed,
    On,
    Off,
}

impl OutputState {
    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputState::Open => "open",
            OutputState::Closed => "closed",
            OutputState::On => "on",
            OutputState::Off => "off",
        }
    }
}

impl FromStr for OutputState {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(OutputState::Open),
            "closed" => Ok(OutputState::Closed),
            "on" => Ok(OutputState::On),
            "off" => Ok(OutputState::Off),
            _ => Err(ParseError::UnknownOutputState(s.to_string())),
        }
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known state of one device output. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceStatus {
    /// Device identifier from the topic (e.g. `esp32_main`).
    pub device: String,
    /// Output name from the topic (e.g. `door`).
    pub output: String,
    /// Reported state.
    pub state: OutputState,
    /// Device-supplied time, or receive time when absent.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub updated_at: OffsetDateTime,
}

/// Parse an RFC 3339 timestamp such as `2025-01-15T10:30:00Z`.
///
/// ```
/// use smarthome_types::parse_timestamp;
///
/// let ts = parse_timestamp("2025-01-15T10:30:00Z").unwrap();
/// assert_eq!(ts.year(), 2025);
/// assert!(parse_timestamp("yesterday").is_err());
/// ```
pub fn parse_timestamp(s: &str) -> ParseResult<OffsetDateTime> {
    OffsetDateTime::parse(s.trim(), &Rfc3339).map_err(|_| ParseError::InvalidTimestamp(s.to_string()))
}

/// Format a timestamp as RFC 3339.
#[must_use]
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_default()
}
