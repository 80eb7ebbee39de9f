//! Mock MQTT channel for testing without a real broker.
//!
//! Records all published messages and subscription filters for
//! assertion in tests. Connectivity can be toggled to exercise the
//! transport-unavailable paths.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use rumqttc::QoS;

use crate::channel::Channel;
use crate::error::{MqttError, MqttResult};

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl PublishedMessage {
    /// Decode the payload as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// Mock implementation of the `Channel` trait.
///
/// Stores all publishes and subscriptions in memory for test verification.
/// Thread-safe via `Mutex` (fine for test contexts). While disconnected,
/// publish fails with [`MqttError::NotConnected`] and records nothing;
/// subscriptions are still recorded, the way the real client queues them
/// until the session is up.
pub struct MockChannel {
    connected: AtomicBool,
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
}

impl MockChannel {
    /// A connected mock.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// A mock that starts without a broker session.
    pub fn disconnected() -> Self {
        let mock = Self::new();
        mock.set_connected(false);
        mock
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Get all subscription filters.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.published.lock().unwrap().last().cloned()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Check whether a subscription was made to the given filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .any(|(f, _)| f == filter)
    }

    /// Clear all recorded state (connectivity is left as is).
    pub fn reset(&self) {
        self.published.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for MockChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(())
    }

    fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((filter.to_string(), qos));
        Ok(())
    }
}
