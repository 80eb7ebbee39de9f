//! MQTT channel: non-blocking client for the device-management broker.
//!
//! Wraps `rumqttc::AsyncClient`. Publishes and subscriptions are enqueued
//! with `try_publish`/`try_subscribe` so they never suspend the caller; the
//! event loop owner drains the queue while polling. Subscriptions that do
//! not fit in the queue are held back and retried on every tracked event.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};
use crate::tls;

/// Largest payload the broker accepts (128 KB), used for both directions.
const MAX_MQTT_PACKET: usize = 128 * 1024;

// ── Channel trait ─────────────────────────────────────────────

/// Abstraction for the publish/subscribe transport.
///
/// Every call is synchronous and must not block. Enables mocking in tests
/// without a real MQTT broker.
pub trait Channel: Send + Sync {
    /// Whether the transport currently holds a broker session.
    fn is_connected(&self) -> bool;

    /// Publish a raw payload to a topic.
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()>;

    /// Subscribe to a topic filter.
    fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()>;
}

// ── MqttChannel ───────────────────────────────────────────────

/// MQTT channel connected to the device-management broker.
///
/// Owns the `AsyncClient` for publishing/subscribing. The `EventLoop`
/// is returned separately from `new()`; the caller must poll it and
/// report each event through [`MqttChannel::track`] so `is_connected`
/// stays accurate.
#[derive(Clone)]
pub struct MqttChannel {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    /// Filters waiting for room in the request queue, in subscribe order.
    deferred: Arc<Mutex<VecDeque<(String, QoS)>>>,
}

impl MqttChannel {
    /// Create a new MQTT channel with TLS (production mode).
    pub fn new(config: &MqttConfig) -> MqttResult<(Self, EventLoop)> {
        let mut options = base_options(config);
        let transport = tls::load_tls_transport(config)?;
        options.set_transport(transport);

        Ok(Self::from_options(options, config.request_queue))
    }

    /// Create a channel for local development (no TLS).
    pub fn new_plaintext(config: &MqttConfig) -> (Self, EventLoop) {
        Self::from_options(base_options(config), config.request_queue)
    }

    fn from_options(options: MqttOptions, request_queue: usize) -> (Self, EventLoop) {
        let (client, eventloop) = AsyncClient::new(options, request_queue.max(1));
        (
            Self {
                client,
                connected: Arc::new(AtomicBool::new(false)),
                deferred: Arc::default(),
            },
            eventloop,
        )
    }

    /// Subscriptions still waiting for room in the request queue.
    pub fn deferred_subscriptions(&self) -> usize {
        self.deferred().len()
    }

    fn deferred(&self) -> MutexGuard<'_, VecDeque<(String, QoS)>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand deferred filters to the client until the queue is full again.
    fn flush_deferred(&self, deferred: &mut VecDeque<(String, QoS)>) {
        while let Some((filter, qos)) = deferred.front() {
            if let Err(e) = self.client.try_subscribe(filter.as_str(), *qos) {
                tracing::debug!(pending = deferred.len(), error = %e, "request queue full, subscriptions deferred");
                return;
            }
            deferred.pop_front();
        }
    }

    /// Update connectivity from an event produced by `eventloop.poll()`.
    pub fn track(&self, event: &Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                let accepted = ack.code == ConnectReturnCode::Success;
                if !accepted {
                    tracing::warn!(code = ?ack.code, "broker refused connection");
                }
                self.connected.store(accepted, Ordering::Release);
            }
            Event::Incoming(Packet::Disconnect) | Event::Outgoing(Outgoing::Disconnect) => {
                self.mark_disconnected();
            }
            _ => {}
        }
        // The loop has run since the last attempt, so there may be room now.
        let mut deferred = self.deferred();
        if !deferred.is_empty() {
            self.flush_deferred(&mut deferred);
        }
    }

    /// Record that the session was lost (event loop returned an error).
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Request a clean disconnect from the broker.
    pub fn disconnect(&self) -> MqttResult<()> {
        self.mark_disconnected();
        self.client
            .try_disconnect()
            .map_err(|e| MqttError::Publish(e.to_string()))
    }
}

fn base_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    options.set_keep_alive(Duration::from_secs(config.keepalive_secs.into()));
    options.set_max_packet_size(MAX_MQTT_PACKET, MAX_MQTT_PACKET);
    // Subscriptions are made once at startup and must survive reconnects.
    options.set_clean_session(!config.persistent_session);
    options
}

impl Channel for MqttChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        self.client
            .try_publish(topic, qos, false, payload)
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    /// Never fails for a full queue: the filter is deferred instead, so
    /// subscription order is preserved.
    fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        let mut deferred = self.deferred();
        deferred.push_back((filter.to_string(), qos));
        self.flush_deferred(&mut deferred);
        Ok(())
    }
}
