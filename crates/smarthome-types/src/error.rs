//! Error types for parsing smart-home domain values.

use thiserror::Error;

/// Errors that can occur when parsing domain values from strings.
///
/// This enum is marked `#[non_exhaustive]` so new variants can be added
/// without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The sensor type is not one of temperature, humidity, motion or gas.
    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),

    /// The access result is neither "granted" nor "denied".
    #[error("Unknown access result: {0}")]
    UnknownAccessResult(String),

    /// The output state is not one of open, closed, on or off.
    #[error("Unknown output state: {0}")]
    UnknownOutputState(String),

    /// The timestamp is not a valid RFC 3339 date-time.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result type alias using smarthome-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
