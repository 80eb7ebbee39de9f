//! Zero-touch fleet provisioning.
//!
//! ```text
//! Idle -> CertificateRequested -> ProvisioningRequested -> Accepted
//!                                                       \-> Rejected
//! ```
//!
//! The issued certificate and key are written to the credential store as
//! soon as they arrive and read back on acceptance, so the handshake
//! survives a restart between the two events.

use ctl_mqtt_channel::Channel;
use ctl_protocol::topics::{self, PROVISIONING_SUCCESS, ProvisioningTopic};
use ctl_protocol::{CreateCertificateResponse, RegisterThingRequest};
use serde_json::{Value, json};

use crate::outbound::{publish_logged, subscribe_all};
use crate::store::{CredentialStore, load_credentials, save_credentials};

/// Invoked with `("provisioning/success", {"certificate", "privateKey"})`.
///
/// Return true once the credentials are durably adopted; the intermediate
/// file is deleted only then.
pub type ProvisioningCallback<'a> = Box<dyn FnMut(&str, &Value) -> bool + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Idle,
    CertificateRequested,
    ProvisioningRequested,
    Accepted,
    Rejected,
}

pub struct FleetProvisioning<'a, C: Channel> {
    channel: &'a C,
    store: &'a dyn CredentialStore,
    template_name: String,
    thing_name: String,
    running: bool,
    state: ProvisioningState,
    callback: Option<ProvisioningCallback<'a>>,
}

impl<'a, C: Channel> FleetProvisioning<'a, C> {
    pub fn new(
        channel: &'a C,
        store: &'a dyn CredentialStore,
        template_name: impl Into<String>,
        thing_name: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            store,
            template_name: template_name.into(),
            thing_name: thing_name.into(),
            running: false,
            state: ProvisioningState::Idle,
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: ProvisioningCallback<'a>) {
        self.callback = Some(callback);
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start the handshake by requesting a new certificate.
    ///
    /// Aborts, leaving the machine idle, if the credential directory cannot
    /// be created.
    pub fn begin(&mut self) -> bool {
        if let Err(e) = self.store.ensure_dir() {
            tracing::error!(error = %e, "cannot prepare credential directory, provisioning aborted");
            return false;
        }

        self.running = true;
        subscribe_all(
            self.channel,
            [
                topics::create_certificate(ProvisioningTopic::Accepted),
                topics::provisioning_template(&self.template_name, ProvisioningTopic::Accepted),
                topics::provisioning_template(&self.template_name, ProvisioningTopic::Rejected),
            ],
        );

        self.state = ProvisioningState::CertificateRequested;
        tracing::info!(template = %self.template_name, thing = %self.thing_name, "provisioning started");
        let topic = topics::create_certificate(ProvisioningTopic::Request);
        publish_logged(self.channel, &topic, &json!({}))
    }

    pub fn end(&mut self) {
        self.running = false;
        tracing::info!(state = ?self.state, "provisioning stopped");
    }

    /// Route an inbound message; `None` when stopped or for foreign topics.
    pub fn handle(&mut self, topic: &str, payload: &mut Value) -> Option<bool> {
        if !self.running {
            return None;
        }

        if topic == topics::create_certificate(ProvisioningTopic::Accepted) {
            return Some(self.on_certificate_created(payload));
        }
        if topic == topics::provisioning_template(&self.template_name, ProvisioningTopic::Accepted) {
            return Some(self.on_accepted());
        }
        if topic == topics::provisioning_template(&self.template_name, ProvisioningTopic::Rejected) {
            tracing::warn!(payload = %payload, "provisioning rejected");
            self.discard_credentials();
            self.state = ProvisioningState::Rejected;
            return Some(true);
        }
        None
    }

    /// Persist the new key material, then ask the template to provision it.
    fn on_certificate_created(&mut self, payload: &mut Value) -> bool {
        let created: CreateCertificateResponse =
            match serde_json::from_value(std::mem::take(payload)) {
                Ok(created) => created,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed certificate-create response");
                    return false;
                }
            };

        if let Err(e) = save_credentials(self.store, &(&created).into()) {
            tracing::warn!(error = %e, "failed to persist credentials");
            self.discard_credentials();
            return false;
        }
        self.state = ProvisioningState::ProvisioningRequested;
        if !created.can_register() {
            tracing::warn!("certificate saved but response carries no ownership token, provisioning not requested");
            return true;
        }
        tracing::info!(certificate_id = %created.certificate_id, "certificate saved, requesting provisioning");

        let request = RegisterThingRequest::new(&self.thing_name, &created);
        let topic = topics::provisioning_template(&self.template_name, ProvisioningTopic::Request);
        publish_logged(self.channel, &topic, &request)
    }

    fn on_accepted(&mut self) -> bool {
        let credentials = match load_credentials(self.store) {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!(error = %e, "stored credentials unreadable, provisioning failed");
                self.discard_credentials();
                self.state = ProvisioningState::Rejected;
                return false;
            }
        };

        let Some(callback) = self.callback.as_mut() else {
            tracing::warn!("no provisioning callback registered, keeping credentials");
            return false;
        };
        let payload = json!({
            "certificate": credentials.certificate,
            "privateKey": credentials.private_key,
        });
        if !callback(PROVISIONING_SUCCESS, &payload) {
            tracing::warn!("credentials not adopted, keeping them for a retry");
            return false;
        }

        self.discard_credentials();
        self.state = ProvisioningState::Accepted;
        tracing::info!(thing = %self.thing_name, "provisioning complete");
        true
    }

    fn discard_credentials(&self) {
        if let Err(e) = self.store.remove() {
            tracing::warn!(error = %e, "failed to delete credential file");
        }
    }
}
