//! Single entry point for inbound messages and the periodic tick.
//!
//! Every inbound message is offered to provisioning, shadows, commands and
//! jobs in that order; the first one to claim the topic decides the result.
//! Unclaimed messages go to the fallback callback.

use ctl_mqtt_channel::Channel;
use ctl_protocol::{CommandReply, JobReply};
use serde_json::Value;

use crate::clock::Clock;
use crate::command::{CommandCallback, CommandDispatcher};
use crate::job::{JobCallback, JobDispatcher};
use crate::provisioning::{FleetProvisioning, ProvisioningCallback};
use crate::shadow::{ShadowCallback, ShadowSync};
use crate::store::CredentialStore;

/// Invoked with `(topic, payload)` for messages no dispatcher claimed.
pub type MessageCallback<'a> = Box<dyn FnMut(&str, &mut Value) -> bool + 'a>;

pub struct ThingClient<'a, C: Channel> {
    channel: &'a C,
    clock: &'a dyn Clock,
    thing_name: String,
    running: bool,
    discover_shadows: bool,
    shadows: ShadowSync<'a, C>,
    commands: CommandDispatcher<'a, C>,
    jobs: JobDispatcher<'a, C>,
    provisioning: Option<FleetProvisioning<'a, C>>,
    callback: Option<MessageCallback<'a>>,
}

impl<'a, C: Channel> ThingClient<'a, C> {
    pub fn new(channel: &'a C, clock: &'a dyn Clock, thing_name: impl Into<String>) -> Self {
        let thing_name = thing_name.into();
        Self {
            channel,
            clock,
            shadows: ShadowSync::new(channel, thing_name.clone()),
            commands: CommandDispatcher::new(channel, thing_name.clone()),
            jobs: JobDispatcher::new(channel, thing_name.clone()),
            thing_name,
            running: false,
            discover_shadows: false,
            provisioning: None,
            callback: None,
        }
    }

    /// Attach a fleet provisioning handshake for `template_name`.
    pub fn with_provisioning(
        mut self,
        store: &'a dyn CredentialStore,
        template_name: impl Into<String>,
    ) -> Self {
        self.provisioning = Some(FleetProvisioning::new(
            self.channel,
            store,
            template_name,
            self.thing_name.clone(),
        ));
        self
    }

    /// Register shadows listed in the classic shadow at [`ThingClient::begin`].
    pub fn set_discover_shadows(&mut self, enabled: bool) {
        self.discover_shadows = enabled;
    }

    pub fn thing_name(&self) -> &str {
        &self.thing_name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Subscribe to command and job topics and start accepting messages.
    pub fn begin(&mut self) -> bool {
        self.running = true;
        let commands = self.commands.begin();
        let jobs = self.jobs.begin();
        if self.discover_shadows {
            self.shadows.begin_discovery(self.clock.now_millis());
        }
        tracing::info!(thing = %self.thing_name, "thing client started");
        commands && jobs
    }

    /// Stop handling messages. Provisioning keeps its own running flag.
    pub fn end(&mut self) {
        self.running = false;
        tracing::info!(thing = %self.thing_name, "thing client stopped");
    }

    // ── Callbacks ─────────────────────────────────────────────

    pub fn set_callback(&mut self, callback: MessageCallback<'a>) {
        self.callback = Some(callback);
    }

    pub fn set_shadow_callback(&mut self, callback: ShadowCallback<'a>) {
        self.shadows.set_callback(callback);
    }

    pub fn set_command_callback(&mut self, callback: CommandCallback<'a>) {
        self.commands.set_callback(callback);
    }

    pub fn set_jobs_callback(&mut self, callback: JobCallback<'a>) {
        self.jobs.set_callback(callback);
    }

    /// Returns false if no provisioning handshake is attached.
    pub fn set_provisioning_callback(&mut self, callback: ProvisioningCallback<'a>) -> bool {
        match self.provisioning.as_mut() {
            Some(provisioning) => {
                provisioning.set_callback(callback);
                true
            }
            None => false,
        }
    }

    // ── Provisioning ──────────────────────────────────────────

    pub fn begin_provisioning(&mut self) -> bool {
        match self.provisioning.as_mut() {
            Some(provisioning) => provisioning.begin(),
            None => {
                tracing::warn!("no provisioning template configured");
                false
            }
        }
    }

    pub fn end_provisioning(&mut self) {
        if let Some(provisioning) = self.provisioning.as_mut() {
            provisioning.end();
        }
    }

    pub fn provisioning(&self) -> Option<&FleetProvisioning<'a, C>> {
        self.provisioning.as_ref()
    }

    // ── Shadows ───────────────────────────────────────────────

    pub fn register_shadow(&mut self, name: &str) {
        self.shadows.register(name, self.clock.now_millis());
    }

    pub fn preload_shadow(&mut self, name: &str, state: Value) -> bool {
        self.shadows.preload(name, state)
    }

    pub fn is_validated(&self, name: &str) -> bool {
        self.shadows.is_validated(name)
    }

    pub fn preloaded_shadow_validated(&mut self, name: &str) {
        self.shadows.mark_validated(name);
    }

    pub fn request_shadow(&self, name: &str) -> bool {
        self.shadows.request(name)
    }

    pub fn update_shadow(&mut self, name: &str, payload: Value) -> bool {
        self.shadows.update(name, payload)
    }

    pub fn get_shadow(&self, name: &str) -> Option<&Value> {
        self.shadows.get(name)
    }

    pub fn shadows(&self) -> &ShadowSync<'a, C> {
        &self.shadows
    }

    // ── Commands and jobs ─────────────────────────────────────

    pub fn command_reply(&self, execution_id: &str, reply: &CommandReply) -> bool {
        self.commands.reply(execution_id, reply)
    }

    pub fn list_pending_jobs(&mut self) -> bool {
        self.jobs.list_pending_jobs()
    }

    pub fn start_pending_jobs(&self, step_timeout_minutes: u32) -> bool {
        self.jobs.start_pending_jobs(step_timeout_minutes)
    }

    pub fn job_reply(&self, job_id: &str, reply: &JobReply) -> bool {
        self.jobs.reply(job_id, reply)
    }

    pub fn request_job_detail(&self, job_id: &str) -> bool {
        self.jobs.request_detail(job_id)
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Route one inbound message. Returns whether it was handled.
    pub fn on_message(&mut self, topic: &str, payload: &[u8]) -> bool {
        let mut payload = match serde_json::from_slice::<Value>(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(topic = %topic, error = %e, "payload is not JSON");
                Value::Null
            }
        };

        if let Some(provisioning) = self.provisioning.as_mut() {
            if let Some(handled) = provisioning.handle(topic, &mut payload) {
                return handled;
            }
        }

        if !self.running {
            tracing::debug!(topic = %topic, "client stopped, message dropped");
            return false;
        }

        let now = self.clock.now_millis();
        if let Some(handled) = self.shadows.handle(topic, &mut payload, now) {
            return handled;
        }
        if let Some(handled) = self.commands.handle(topic, &payload) {
            return handled;
        }
        if let Some(handled) = self.jobs.handle(topic, &payload) {
            return handled;
        }

        match self.callback.as_mut() {
            Some(callback) => callback(topic, &mut payload),
            None => {
                tracing::debug!(topic = %topic, "unhandled message");
                false
            }
        }
    }

    /// Drive time-based re-requests. Call from the main loop.
    pub fn tick(&mut self) {
        if self.running {
            self.shadows.poll(self.clock.now_millis());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::shadow::POLL_INTERVAL_MS;
    use crate::store::MemoryCredentialStore;
    use ctl_mqtt_channel::MockChannel;
    use ctl_protocol::topics::{self, CommandDirection, JobsTopic, ShadowTopic};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn begin_subscribes_commands_and_jobs() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let mut client = ThingClient::new(&mock, &clock, "dev1");

        assert!(client.begin());
        assert!(client.is_running());
        assert!(mock.is_subscribed_to("$ctl/commands/things/dev1/executions/+/request/json"));
        assert!(mock.is_subscribed_to("$ctl/things/dev1/jobs/notify"));
        assert!(!mock.is_subscribed_to("$ctl/things/dev1/shadow/get/accepted"));
    }

    #[test]
    fn discovery_requests_classic_shadow() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        client.set_discover_shadows(true);
        client.begin();

        assert!(mock.is_subscribed_to("$ctl/things/dev1/shadow/get/accepted"));
        assert_eq!(mock.published_to("$ctl/things/dev1/shadow/get").len(), 1);

        let handled = client.on_message(
            "$ctl/things/dev1/shadow/get/accepted",
            &bytes(json!({"state": {"desired": {"shadows": ["config"]}}})),
        );
        assert!(handled);
        assert!(client.shadows().record("config").is_some());
    }

    #[test]
    fn routes_to_each_dispatcher() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let log = Rc::new(RefCell::new(Vec::<String>::new()));
        let mut client = ThingClient::new(&mock, &clock, "dev1");

        let sink = log.clone();
        client.set_shadow_callback(Box::new(move |name, _, _| {
            sink.borrow_mut().push(format!("shadow:{name}"));
            false
        }));
        let sink = log.clone();
        client.set_command_callback(Box::new(move |id, _| {
            sink.borrow_mut().push(format!("command:{id}"));
            true
        }));
        let sink = log.clone();
        client.set_jobs_callback(Box::new(move |id, _| {
            sink.borrow_mut().push(format!("job:{id}"));
            true
        }));
        let sink = log.clone();
        client.set_callback(Box::new(move |topic, _| {
            sink.borrow_mut().push(format!("other:{topic}"));
            true
        }));
        client.register_shadow("temp");
        client.begin();

        client.on_message(
            &topics::shadow("dev1", "temp", ShadowTopic::GetAccepted),
            &bytes(json!({"state": {"desired": {"t": 20}}})),
        );
        client.on_message(
            &topics::command("dev1", "exec-1", CommandDirection::Request),
            &bytes(json!({})),
        );
        client.on_message(
            &topics::job("dev1", "job-1", topics::JobTopic::GetAccepted),
            &bytes(json!({})),
        );
        client.on_message("app/custom", b"plain text");

        assert_eq!(
            log.borrow().as_slice(),
            &[
                "shadow:temp".to_string(),
                "command:exec-1".to_string(),
                "job:job-1".to_string(),
                "other:app/custom".to_string(),
            ]
        );
    }

    #[test]
    fn unclaimed_without_fallback_is_unhandled() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        client.begin();
        assert!(!client.on_message("app/custom", b"{}"));
    }

    #[test]
    fn non_json_payload_arrives_as_null() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        client.set_callback(Box::new(move |_, payload| {
            *sink.borrow_mut() = Some(payload.clone());
            true
        }));
        client.begin();

        assert!(client.on_message("app/raw", &[0xff, 0x00]));
        assert_eq!(*seen.borrow(), Some(Value::Null));
    }

    #[test]
    fn stopped_client_drops_messages() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        client.set_callback(Box::new(|_, _| true));
        client.begin();
        client.end();

        let notify = topics::jobs("dev1", JobsTopic::Notify);
        mock.reset();
        assert!(!client.on_message(&notify, b"{}"));
        assert!(!client.on_message("app/custom", b"{}"));
        assert!(mock.published().is_empty());
    }

    #[test]
    fn provisioning_routed_while_stopped() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let store = MemoryCredentialStore::new();
        let mut client = ThingClient::new(&mock, &clock, "dev1").with_provisioning(&store, "fleet");

        assert!(client.begin_provisioning());
        let handled = client.on_message(
            "$ctl/certificates/create/json/accepted",
            &bytes(json!({
                "certificateId": "c1",
                "certificatePem": "A",
                "privateKey": "B",
                "certificateOwnershipToken": "t"
            })),
        );
        assert!(handled);
        assert!(store.exists());
        assert!(!client.is_running());
    }

    #[test]
    fn provisioning_callback_requires_template() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        assert!(!client.set_provisioning_callback(Box::new(|_, _| true)));
        assert!(!client.begin_provisioning());
        assert!(client.provisioning().is_none());
    }

    #[test]
    fn tick_polls_unloaded_shadows_while_running() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(1_000);
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        client.register_shadow("temp");
        let get = topics::shadow("dev1", "temp", ShadowTopic::Get);
        assert_eq!(mock.published_to(&get).len(), 1);

        clock.advance(POLL_INTERVAL_MS + 1);
        client.tick();
        assert_eq!(mock.published_to(&get).len(), 1);

        client.begin();
        client.tick();
        assert_eq!(mock.published_to(&get).len(), 2);
        client.tick();
        assert_eq!(mock.published_to(&get).len(), 2);
    }

    #[test]
    fn shadow_state_round_trip_through_front_end() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        client.register_shadow("temp");
        assert!(client.get_shadow("temp").is_none());

        client.preload_shadow("temp", json!({"t": 18}));
        assert!(!client.is_validated("temp"));
        client.preloaded_shadow_validated("temp");
        assert!(client.is_validated("temp"));

        assert!(client.update_shadow("temp", json!({"t": 21})));
        assert_eq!(client.get_shadow("temp"), Some(&json!({"t": 21})));
    }
}
