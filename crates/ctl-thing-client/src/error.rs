//! Thing client error types.
//!
//! These never cross the public surface of [`crate::ThingClient`]; public
//! operations log them and report `false`.

use ctl_mqtt_channel::MqttError;
use thiserror::Error;

/// Errors on the outbound publish/subscribe path.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport not connected")]
    NotConnected,

    #[error(transparent)]
    Mqtt(#[from] MqttError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors from the credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("credential file not found")]
    NotFound,

    #[error("malformed credential file: {0}")]
    Malformed(String),
}

/// Convenience alias for outbound results.
pub type ClientResult<T> = Result<T, ClientError>;

/// Convenience alias for credential store results.
pub type StoreResult<T> = Result<T, StoreError>;
