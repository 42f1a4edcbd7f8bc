//! Error types for smarthome-store.

use std::path::PathBuf;

/// Result type for smarthome-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in smarthome-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A gas alert update targeted a row that does not exist.
    #[error("Gas alert not found: {0}")]
    GasAlertNotFound(uuid::Uuid),

    /// A card with this card id is already registered.
    #[error("Card already registered: {0}")]
    DuplicateCard(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
