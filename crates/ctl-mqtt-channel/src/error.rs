//! MQTT channel error types.

use thiserror::Error;

/// Errors that can occur during MQTT operations.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("not connected")]
    NotConnected,

    #[error("publish error: {0}")]
    Publish(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Convenience alias for MQTT results.
pub type MqttResult<T> = Result<T, MqttError>;
