//! Device-side device-management client.
//!
//! [`ThingClient`] multiplexes named-shadow synchronization, remote commands,
//! managed jobs and fleet provisioning over one [`Channel`]. Everything is
//! synchronous: the host pumps its transport, feeds each inbound message to
//! [`ThingClient::on_message`] and calls [`ThingClient::tick`] periodically.
//! Callbacks run inside `on_message` and must return quickly.

pub mod client;
pub mod clock;
pub mod command;
pub mod error;
pub mod job;
mod outbound;
pub mod provisioning;
pub mod shadow;
pub mod store;

pub use client::{MessageCallback, ThingClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{CommandCallback, CommandDispatcher};
pub use ctl_mqtt_channel::Channel;
pub use error::{ClientError, ClientResult, StoreError, StoreResult};
pub use job::{JobCallback, JobDispatcher};
pub use provisioning::{FleetProvisioning, ProvisioningCallback, ProvisioningState};
pub use shadow::{POLL_INTERVAL_MS, ShadowCallback, ShadowRecord, ShadowSync};
pub use store::{
    CredentialStore, DEFAULT_KEYSTORE_PATH, FileCredentialStore, MemoryCredentialStore,
    load_credentials, save_credentials,
};
