//! One broker session: the MQTT event loop driver and the client tick.
//!
//! A single task alternates between polling the rumqttc event loop and the
//! tick interval. Inbound publishes are fed to the thing client, and the
//! actions its callbacks queued are performed before the next poll.

use std::time::Duration;

use ctl_mqtt_channel::{Channel, MqttChannel};
use ctl_thing_client::{ProvisioningState, ThingClient};
use rumqttc::{Event, EventLoop, Packet};
use tokio::time::MissedTickBehavior;

use crate::actions::{self, Inbox};
use crate::executor::OperationExecutor;

/// Pause before polling again after an event loop error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

enum Mode {
    /// Normal operation with the device certificate.
    Operate { shadows: Vec<String> },
    /// Claim-certificate session that ends once provisioning settles.
    Provision { aborted: bool },
}

pub struct Session<'a, C: Channel> {
    client: ThingClient<'a, C>,
    executor: OperationExecutor,
    inbox: Inbox,
    mode: Mode,
}

impl<'a, C: Channel> Session<'a, C> {
    /// Start the client and register `shadows`. Subscriptions are queued
    /// until the broker session is up.
    pub fn operate(mut client: ThingClient<'a, C>, shadows: Vec<String>) -> Self {
        let inbox = Inbox::default();
        actions::install(&mut client, &inbox);
        for name in &shadows {
            client.register_shadow(name);
        }
        client.begin();
        Self {
            executor: OperationExecutor::new(client.thing_name()),
            client,
            inbox,
            mode: Mode::Operate { shadows },
        }
    }

    /// Session driving the provisioning handshake of `client`, which must
    /// carry a provisioning template and completion callback.
    pub fn provision(client: ThingClient<'a, C>) -> Self {
        Self {
            executor: OperationExecutor::new(client.thing_name()),
            client,
            inbox: Inbox::default(),
            mode: Mode::Provision { aborted: false },
        }
    }

    pub fn client(&self) -> &ThingClient<'a, C> {
        &self.client
    }

    /// The broker accepted the connection.
    pub fn on_connected(&mut self) {
        match &mut self.mode {
            Mode::Operate { shadows } => {
                // Requests made before the session was up were skipped.
                for name in shadows.iter() {
                    let loaded = self
                        .client
                        .shadows()
                        .record(name)
                        .is_some_and(|r| r.loaded);
                    if !loaded {
                        self.client.request_shadow(name);
                    }
                }
                self.client.list_pending_jobs();
            }
            Mode::Provision { aborted } => {
                let idle = |client: &ThingClient<'a, C>| {
                    client.provisioning().map(|p| p.state()) == Some(ProvisioningState::Idle)
                };
                if idle(&self.client) {
                    self.client.begin_provisioning();
                    // Still idle means the credential directory is unusable.
                    *aborted = idle(&self.client);
                }
            }
        }
    }

    pub fn on_publish(&mut self, topic: &str, payload: &[u8]) {
        let handled = self.client.on_message(topic, payload);
        tracing::debug!(topic = %topic, handled, "inbound message");
        actions::drain(&mut self.client, &self.executor, &self.inbox);
    }

    pub fn on_tick(&mut self) {
        self.client.tick();
        actions::drain(&mut self.client, &self.executor, &self.inbox);
    }

    /// The provisioning handshake reached a terminal state or was aborted.
    pub fn finished(&self) -> bool {
        match self.mode {
            Mode::Operate { .. } => false,
            Mode::Provision { aborted } => {
                aborted
                    || matches!(
                        self.provisioning_state(),
                        Some(ProvisioningState::Accepted | ProvisioningState::Rejected) | None
                    )
            }
        }
    }

    pub fn provisioning_state(&self) -> Option<ProvisioningState> {
        self.client.provisioning().map(|p| p.state())
    }
}

/// Drive the session until it finishes. Operating sessions never do;
/// the caller cancels them.
pub async fn run(
    session: &mut Session<'_, MqttChannel>,
    channel: &MqttChannel,
    mut eventloop: EventLoop,
    tick_interval: Duration,
) {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !session.finished() {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(event) => {
                    channel.track(&event);
                    match event {
                        Event::Incoming(Packet::Publish(publish)) => {
                            session.on_publish(&publish.topic, &publish.payload);
                        }
                        Event::Incoming(Packet::ConnAck(_)) if channel.is_connected() => {
                            tracing::info!("broker session established");
                            session.on_connected();
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    channel.mark_disconnected();
                    tracing::error!(error = %e, "MQTT event loop error, reconnecting in 5s");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            },
            _ = ticker.tick() => session.on_tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctl_mqtt_channel::MockChannel;
    use ctl_protocol::topics::{self, JobsTopic, ProvisioningTopic, ShadowTopic};
    use ctl_thing_client::{CredentialStore, ManualClock, MemoryCredentialStore, POLL_INTERVAL_MS};
    use serde_json::json;

    fn bytes(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn operate_registers_before_connecting() {
        let mock = MockChannel::disconnected();
        let clock = ManualClock::new(0);
        let client = ThingClient::new(&mock, &clock, "dev1");
        let session = Session::operate(client, vec!["config".into()]);

        assert!(session.client().is_running());
        assert!(mock.is_subscribed_to("$ctl/things/dev1/shadow/name/config/get/accepted"));
        assert!(mock.published().is_empty());
        assert!(!session.finished());
    }

    #[test]
    fn connect_requests_unloaded_shadows_and_jobs() {
        let mock = MockChannel::disconnected();
        let clock = ManualClock::new(0);
        let client = ThingClient::new(&mock, &clock, "dev1");
        let mut session = Session::operate(client, vec!["config".into(), "led".into()]);

        mock.set_connected(true);
        session.on_publish(
            &topics::shadow("dev1", "led", ShadowTopic::GetAccepted),
            &bytes(json!({"state": {"reported": {"on": true}}})),
        );
        session.on_connected();

        assert_eq!(mock.published_to(&topics::shadow("dev1", "config", ShadowTopic::Get)).len(), 1);
        assert!(mock.published_to(&topics::shadow("dev1", "led", ShadowTopic::Get)).is_empty());
        assert_eq!(mock.published_to(&topics::jobs("dev1", JobsTopic::Get)).len(), 1);
    }

    #[test]
    fn tick_drives_shadow_polling() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let client = ThingClient::new(&mock, &clock, "dev1");
        let mut session = Session::operate(client, vec!["config".into()]);
        let get = topics::shadow("dev1", "config", ShadowTopic::Get);

        session.on_tick();
        assert_eq!(mock.published_to(&get).len(), 1);
        clock.advance(POLL_INTERVAL_MS + 1);
        session.on_tick();
        assert_eq!(mock.published_to(&get).len(), 2);
    }

    #[test]
    fn provisioning_session_runs_to_acceptance() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let store = MemoryCredentialStore::new();
        let mut client = ThingClient::new(&mock, &clock, "dev1").with_provisioning(&store, "fleet");
        client.set_provisioning_callback(Box::new(|_, _| true));
        let mut session = Session::provision(client);

        assert_eq!(session.provisioning_state(), Some(ProvisioningState::Idle));
        session.on_connected();
        assert_eq!(
            session.provisioning_state(),
            Some(ProvisioningState::CertificateRequested)
        );
        // A reconnect does not restart the handshake.
        session.on_connected();
        assert_eq!(mock.published_to("$ctl/certificates/create/json").len(), 1);

        session.on_publish(
            &topics::create_certificate(ProvisioningTopic::Accepted),
            &bytes(json!({
                "certificateId": "c1",
                "certificatePem": "A",
                "privateKey": "B",
                "certificateOwnershipToken": "t"
            })),
        );
        assert!(!session.finished());

        session.on_publish(
            &topics::provisioning_template("fleet", ProvisioningTopic::Accepted),
            &bytes(json!({"thingName": "dev1"})),
        );
        assert!(session.finished());
        assert_eq!(session.provisioning_state(), Some(ProvisioningState::Accepted));
        assert!(!store.exists());
    }

    #[test]
    fn provisioning_session_without_template_is_finished() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let session = Session::provision(ThingClient::new(&mock, &clock, "dev1"));
        assert!(session.finished());
    }
}
