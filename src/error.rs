//! Error types for SMS Relay.

use crate::capability::Capability;

/// Top-level error type for the relay's user-facing operations.
///
/// Per-item failures (decode, send, remote fetch) never propagate; they are
/// recorded on the record, outcome or fetch status instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Key-value store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Write to {key} lost {attempts} compare-and-set races")]
    Contention { key: String, attempts: u32 },
}

/// Runtime capability (permission) errors.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Capability {0} not granted")]
    PermissionNotGranted(Capability),

    #[error("Capability {0} permanently denied; enable it in host settings")]
    PermissionPermanentlyDenied(Capability),
}

/// Remote configuration fetch failures. Never surfaced to callers as a hard
/// error; the resolver keeps the last persisted value.
#[derive(Debug, thiserror::Error)]
pub enum RemoteFetchError {
    #[error("Remote config request failed: {0}")]
    Request(String),

    #[error("Remote config returned HTTP {status}")]
    Status { status: u16 },

    #[error("Remote config body invalid: {0}")]
    InvalidBody(String),
}

/// A user-supplied destination address was rejected.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Address is empty")]
    Empty,

    #[error("Invalid phone number {value:?}: expected optional leading + and 10-13 digits")]
    InvalidPhoneNumber { value: String },
}

/// A single inbound unit could not be decoded.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unsupported unit format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed unit: {0}")]
    Malformed(String),
}

/// Outbound send failure for one relayed message.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Gateway request failed: {0}")]
    Transport(String),

    #[error("Gateway rejected message (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
