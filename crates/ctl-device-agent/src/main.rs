//! Device agent: keeps a thing's shadows, commands and jobs in sync with
//! the device-management broker, provisioning its certificate on first boot.

use std::time::Duration;

use anyhow::bail;
use ctl_device_agent::config::AgentConfig;
use ctl_device_agent::credentials;
use ctl_device_agent::session::{self, Session};
use ctl_mqtt_channel::{MqttChannel, MqttConfig};
use ctl_thing_client::{FileCredentialStore, ProvisioningState, SystemClock, ThingClient};
use rumqttc::EventLoop;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "ctl-device-agent starting"
    );

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/ctl/agent.toml".to_string());

    let config = AgentConfig::from_file(&config_path)?;
    tracing::info!(thing = %config.thing_name, "config loaded");

    let clock = SystemClock::new();
    let tick_interval = Duration::from_millis(config.tick_interval_ms);

    // ── Provisioning (first boot only) ──────────────────────────
    if config.needs_provisioning() && !provision(&config, &clock, tick_interval).await? {
        return Ok(());
    }

    // ── Operate ─────────────────────────────────────────────────
    let (channel, eventloop) = connect(&config.mqtt)?;
    let mut client = ThingClient::new(&channel, &clock, config.thing_name.as_str());
    client.set_discover_shadows(config.discover_shadows);
    let mut session = Session::operate(client, config.shadows.clone());

    tracing::info!("ctl-device-agent ready");

    tokio::select! {
        () = session::run(&mut session, &channel, eventloop, tick_interval) => {
            tracing::error!("session loop exited unexpectedly");
        }
        // Graceful shutdown on SIGINT
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    if let Err(e) = channel.disconnect() {
        tracing::warn!(error = %e, "disconnect failed");
    }
    tracing::info!("ctl-device-agent stopped");
    Ok(())
}

/// Run the provisioning handshake over a claim-certificate session.
///
/// Returns false if interrupted before it settled.
async fn provision(
    config: &AgentConfig,
    clock: &SystemClock,
    tick_interval: Duration,
) -> anyhow::Result<bool> {
    let (Some(provisioning), Some(claim)) = (config.provisioning.as_ref(), config.claim_mqtt())
    else {
        bail!("provisioning is not configured");
    };
    tracing::info!(template = %provisioning.template_name, "device certificate missing, provisioning");

    let store = FileCredentialStore::new(&provisioning.keystore_path);
    let (channel, eventloop) = connect(&claim)?;
    let mut client = ThingClient::new(&channel, clock, config.thing_name.as_str())
        .with_provisioning(&store, provisioning.template_name.as_str());
    client.set_provisioning_callback(credentials::adopt_into(
        &config.mqtt.client_cert_path,
        &config.mqtt.client_key_path,
    ));
    let mut session = Session::provision(client);

    let interrupted = tokio::select! {
        () = session::run(&mut session, &channel, eventloop, tick_interval) => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if let Err(e) = channel.disconnect() {
        tracing::warn!(error = %e, "disconnect failed");
    }
    if interrupted {
        tracing::info!("shutdown signal received during provisioning");
        return Ok(false);
    }

    match session.provisioning_state() {
        Some(ProvisioningState::Accepted) => Ok(true),
        state => bail!("provisioning did not complete (state: {state:?})"),
    }
}

fn connect(mqtt: &MqttConfig) -> anyhow::Result<(MqttChannel, EventLoop)> {
    if mqtt.use_tls {
        Ok(MqttChannel::new(mqtt)?)
    } else {
        tracing::info!("MQTT plaintext mode (no TLS)");
        Ok(MqttChannel::new_plaintext(mqtt))
    }
}
