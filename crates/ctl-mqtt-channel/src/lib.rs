//! MQTT transport for the device-management client.
//!
//! Provides the transport collaborator the thing client publishes through:
//! - `Channel` trait for publish/subscribe plus connectivity (mockable in tests)
//! - `MqttChannel` over `rumqttc` with mTLS for production
//! - `MockChannel` for testing without a broker

pub mod channel;
pub mod config;
pub mod error;
pub mod mock;
pub mod tls;

// Re-exports for convenience.
pub use channel::{Channel, MqttChannel};
pub use config::MqttConfig;
pub use error::{MqttError, MqttResult};
pub use mock::{MockChannel, PublishedMessage};
pub use rumqttc::QoS;
