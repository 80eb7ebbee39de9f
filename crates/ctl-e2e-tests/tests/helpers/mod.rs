//! Shared test harness for E2E integration tests.
//!
//! Plays the broker side against a real `ThingClient` through a
//! `MockChannel`: tests build clients from the harness, deliver replies
//! with [`deliver`] and inspect what the device published.

#![allow(dead_code)]

use ctl_mqtt_channel::{MockChannel, PublishedMessage};
use ctl_thing_client::{ManualClock, ThingClient};
use serde_json::Value;

pub const THING: &str = "dev1";

/// Broker-side view of one device.
pub struct TestHarness {
    /// Shared MQTT mock; everything the device publishes lands here.
    pub mqtt: MockChannel,
    /// Tick source driving shadow polling.
    pub clock: ManualClock,
}

impl TestHarness {
    /// A connected device at time zero.
    pub fn new() -> Self {
        Self {
            mqtt: MockChannel::new(),
            clock: ManualClock::new(0),
        }
    }

    /// A device whose broker session is not up yet.
    pub fn offline() -> Self {
        Self {
            mqtt: MockChannel::disconnected(),
            clock: ManualClock::new(0),
        }
    }

    pub fn client(&self) -> ThingClient<'_, MockChannel> {
        ThingClient::new(&self.mqtt, &self.clock, THING)
    }

    /// Messages published to `topic`, decoded as JSON.
    pub fn sent(&self, topic: &str) -> Vec<Value> {
        self.mqtt
            .published_to(topic)
            .iter()
            .map(PublishedMessage::json)
            .collect()
    }

    pub fn count(&self, topic: &str) -> usize {
        self.mqtt.published_to(topic).len()
    }

    pub fn last(&self) -> PublishedMessage {
        self.mqtt
            .last_published()
            .expect("device should have published something")
    }
}

/// Deliver a JSON message to the client as the broker would.
pub fn deliver(client: &mut ThingClient<'_, MockChannel>, topic: &str, payload: Value) -> bool {
    let bytes = serde_json::to_vec(&payload).expect("payload serializes");
    client.on_message(topic, &bytes)
}

/// A certificate-create reply carrying `certificate` and `key`.
pub fn certificate_created(certificate: &str, key: &str) -> Value {
    serde_json::json!({
        "certificateId": "cert-0001",
        "certificatePem": certificate,
        "privateKey": key,
        "certificateOwnershipToken": "ownership-token"
    })
}
