//! Named-shadow synchronization.
//!
//! Keeps one [`ShadowRecord`] per registered shadow, reconciles inbound
//! desired state through the shadow callback, and re-requests any shadow
//! that has not yet been loaded every [`POLL_INTERVAL_MS`]. Delivery on the
//! transport is not assumed reliable, so polling is the only recovery path
//! for a lost GET or a missed accepted reply.

use std::collections::HashMap;

use ctl_mqtt_channel::Channel;
use ctl_protocol::topics::{self, ShadowTopic};
use ctl_protocol::{
    ShadowDocument, ShadowDocuments, ShadowError, ShadowState, ShadowUpdate, is_non_empty_object,
};
use serde_json::{Value, json};

use crate::outbound::{publish_logged, subscribe_all};

/// Minimum gap between two GETs for a shadow that is still unloaded.
pub const POLL_INTERVAL_MS: u64 = 10_000;

/// Invoked with `(shadow_name, desired, should_mutate)`.
///
/// `should_mutate` is true when an update/delta arrived since the last
/// reconciliation. Returning true acknowledges the (possibly edited)
/// desired object: it is reported back unless local state already matches.
pub type ShadowCallback<'a> = Box<dyn FnMut(&str, &mut Value, bool) -> bool + 'a>;

/// Synchronization state of one named shadow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowRecord {
    /// Clock reading of the last outbound GET (or registration).
    pub last_request_at: u64,
    /// Reported/desired state has been established at least once.
    pub loaded: bool,
    /// The cloud confirmed the state, or the application vouched for a preload.
    pub validated: bool,
    /// An update/delta arrived since the last reconciliation.
    pub pending_delta: bool,
    /// Last known state object.
    pub state: Option<Value>,
}

#[derive(Debug, Clone, Default)]
struct Discovery {
    last_request_at: u64,
    received: bool,
}

pub struct ShadowSync<'a, C: Channel> {
    channel: &'a C,
    thing_name: String,
    records: HashMap<String, ShadowRecord>,
    callback: Option<ShadowCallback<'a>>,
    discovery: Option<Discovery>,
}

impl<'a, C: Channel> ShadowSync<'a, C> {
    pub fn new(channel: &'a C, thing_name: impl Into<String>) -> Self {
        Self {
            channel,
            thing_name: thing_name.into(),
            records: HashMap::new(),
            callback: None,
            discovery: None,
        }
    }

    pub fn set_callback(&mut self, callback: ShadowCallback<'a>) {
        self.callback = Some(callback);
    }

    /// Start tracking `name`: subscribe to its replies and request it.
    ///
    /// Registering a known name again replaces its record.
    pub fn register(&mut self, name: &str, now: u64) {
        self.records.insert(
            name.to_string(),
            ShadowRecord {
                last_request_at: now,
                ..ShadowRecord::default()
            },
        );

        let filters = ShadowTopic::SUBSCRIBED
            .into_iter()
            .map(|suffix| topics::shadow(&self.thing_name, name, suffix));
        subscribe_all(self.channel, filters);
        self.request(name);

        tracing::info!(thing = %self.thing_name, shadow = %name, "shadow registered");
    }

    /// Publish an empty GET for `name`. No-op while disconnected.
    pub fn request(&self, name: &str) -> bool {
        request_get(self.channel, &self.thing_name, name)
    }

    /// Report `payload` and apply it locally without waiting for the broker.
    pub fn update(&mut self, name: &str, payload: Value) -> bool {
        let topic = topics::shadow(&self.thing_name, name, ShadowTopic::Update);
        let update = ShadowUpdate::reported(payload.clone());
        let published = publish_logged(self.channel, &topic, &update);

        match self.records.get_mut(name) {
            Some(record) => {
                record.loaded = true;
                record.state = Some(payload);
            }
            None => tracing::warn!(shadow = %name, "update for unregistered shadow"),
        }
        published
    }

    /// Last known state, or `None` if it was never populated.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.records.get(name)?.state.as_ref()
    }

    pub fn record(&self, name: &str) -> Option<&ShadowRecord> {
        self.records.get(name)
    }

    /// Seed a registered shadow with locally cached state.
    ///
    /// The record stays unloaded, so it keeps being requested until the
    /// cloud answers or [`ShadowSync::mark_validated`] is called.
    pub fn preload(&mut self, name: &str, state: Value) -> bool {
        let Some(record) = self.records.get_mut(name) else {
            tracing::warn!(shadow = %name, "preload for unregistered shadow");
            return false;
        };
        record.state = Some(state);
        record.validated = false;
        true
    }

    pub fn is_validated(&self, name: &str) -> bool {
        self.records.get(name).is_some_and(|r| r.validated)
    }

    /// Accept the preloaded state as authoritative and stop polling.
    pub fn mark_validated(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.validated = true;
            record.loaded = true;
        }
    }

    /// Request the classic shadow, whose desired `shadows` list names the
    /// shadows to register.
    pub fn begin_discovery(&mut self, now: u64) {
        let filters = [ShadowTopic::GetAccepted, ShadowTopic::GetRejected]
            .into_iter()
            .map(|suffix| topics::classic_shadow(&self.thing_name, suffix));
        subscribe_all(self.channel, filters);
        request_classic(self.channel, &self.thing_name);
        self.discovery = Some(Discovery {
            last_request_at: now,
            received: false,
        });
    }

    /// Re-request every unloaded shadow whose last GET is older than the
    /// poll interval.
    pub fn poll(&mut self, now: u64) {
        for (name, record) in self.records.iter_mut() {
            if record.loaded || now.saturating_sub(record.last_request_at) <= POLL_INTERVAL_MS {
                continue;
            }
            tracing::debug!(shadow = %name, "shadow still unloaded, requesting again");
            request_get(self.channel, &self.thing_name, name);
            record.last_request_at = now;
        }

        if let Some(discovery) = self.discovery.as_mut() {
            if !discovery.received
                && now.saturating_sub(discovery.last_request_at) > POLL_INTERVAL_MS
            {
                request_classic(self.channel, &self.thing_name);
                discovery.last_request_at = now;
            }
        }
    }

    /// Route an inbound message. `None` means the topic is not a shadow
    /// reply for a registered shadow.
    pub fn handle(&mut self, topic: &str, payload: &mut Value, now: u64) -> Option<bool> {
        if let Some(suffix) = topics::parse_classic_shadow(&self.thing_name, topic) {
            self.discovery.as_ref()?;
            return Some(self.on_classic(suffix, payload, now));
        }

        let (name, suffix) = topics::parse_shadow(&self.thing_name, topic)?;
        if !self.records.contains_key(name) {
            tracing::debug!(shadow = %name, "message for unregistered shadow");
            return None;
        }

        match suffix {
            ShadowTopic::GetAccepted => {
                let doc: ShadowDocument = decode(payload);
                self.on_get_accepted(name, doc.state);
            }
            ShadowTopic::UpdateDocuments => {
                let docs: ShadowDocuments = decode(payload);
                self.on_documents(name, docs.current.state);
            }
            ShadowTopic::UpdateAccepted => {
                let doc: ShadowDocument = decode(payload);
                if let Some(record) = self.records.get_mut(name) {
                    record.loaded = true;
                    if record.state.is_none() {
                        record.state = doc.state.reported;
                    }
                }
            }
            ShadowTopic::UpdateDelta => {
                if let Some(record) = self.records.get_mut(name) {
                    record.pending_delta = true;
                }
            }
            ShadowTopic::GetRejected | ShadowTopic::UpdateRejected => {
                let err: ShadowError = decode(payload);
                tracing::warn!(
                    shadow = %name,
                    reply = ?suffix,
                    code = ?err.code,
                    message = ?err.message,
                    "shadow request rejected"
                );
            }
            ShadowTopic::Get | ShadowTopic::Update => return None,
        }
        Some(true)
    }

    fn on_get_accepted(&mut self, name: &str, state: ShadowState) {
        if let Some(record) = self.records.get_mut(name) {
            record.loaded = true;
            record.validated = true;
            match state.reported {
                Some(reported) if reported.is_object() => record.state = Some(reported),
                _ if record.state.is_none() => record.state = Some(json!({})),
                _ => {}
            }
        }
        self.reconcile(name, state.desired);
    }

    fn on_documents(&mut self, name: &str, state: ShadowState) {
        if let Some(record) = self.records.get_mut(name) {
            record.loaded = true;
            if let Some(reported) = state.reported.filter(Value::is_object) {
                record.state = Some(reported);
            }
        }
        self.reconcile(name, state.desired);
    }

    fn reconcile(&mut self, name: &str, desired: Option<Value>) {
        let Some(mut desired) = desired.filter(is_non_empty_object) else {
            return;
        };
        let Some(record) = self.records.get_mut(name) else {
            return;
        };
        let should_mutate = std::mem::take(&mut record.pending_delta);

        let Some(callback) = self.callback.as_mut() else {
            tracing::debug!(shadow = %name, "no shadow callback, desired state dropped");
            return;
        };
        tracing::debug!(shadow = %name, should_mutate, "dispatching desired state");
        if !callback(name, &mut desired, should_mutate) {
            return;
        }

        let converged = self
            .records
            .get(name)
            .and_then(|r| r.state.as_ref())
            .is_some_and(|state| is_converged(&desired, state));
        if !converged {
            self.update(name, desired);
        }
    }

    fn on_classic(&mut self, suffix: ShadowTopic, payload: &mut Value, now: u64) -> bool {
        if suffix == ShadowTopic::GetRejected {
            let err: ShadowError = decode(payload);
            tracing::warn!(code = ?err.code, message = ?err.message, "classic shadow rejected");
            return true;
        }

        if let Some(discovery) = self.discovery.as_mut() {
            discovery.received = true;
        }
        let names: Vec<String> = payload
            .pointer("/state/desired/shadows")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        for name in names {
            if !self.records.contains_key(&name) {
                self.register(&name, now);
            }
        }
        true
    }
}

fn request_get<C: Channel>(channel: &C, thing_name: &str, name: &str) -> bool {
    let topic = topics::shadow(thing_name, name, ShadowTopic::Get);
    publish_logged(channel, &topic, &json!({}))
}

fn request_classic<C: Channel>(channel: &C, thing_name: &str) -> bool {
    let topic = topics::classic_shadow(thing_name, ShadowTopic::Get);
    publish_logged(channel, &topic, &json!({}))
}

/// Take the payload and decode it, falling back to the empty document.
fn decode<T: serde::de::DeserializeOwned + Default>(payload: &mut Value) -> T {
    serde_json::from_value(std::mem::take(payload)).unwrap_or_default()
}

/// Every field of `desired` already holds the same value in `state`.
/// A null in `desired` (a deletion) counts as converged when the field is
/// absent or null.
fn is_converged(desired: &Value, state: &Value) -> bool {
    match (desired, state) {
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(key, value)| {
            match have.get(key) {
                Some(current) => is_converged(value, current),
                None => value.is_null(),
            }
        }),
        _ => desired == state,
    }
}
