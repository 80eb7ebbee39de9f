//! Device agent configuration, loadable from TOML.

use std::path::Path;

use ctl_mqtt_channel::MqttConfig;
use ctl_thing_client::DEFAULT_KEYSTORE_PATH;
use serde::Deserialize;

/// Top-level configuration for the device agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Thing name registered with the device-management service.
    pub thing_name: String,
    /// MQTT connection settings. The cert/key paths are the device's
    /// operating credentials, written by provisioning when absent.
    pub mqtt: MqttConfig,
    /// Named shadows registered at startup.
    #[serde(default)]
    pub shadows: Vec<String>,
    /// Also register the shadows listed in the classic shadow.
    #[serde(default)]
    pub discover_shadows: bool,
    /// Main-loop tick cadence in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Fleet provisioning. None means the device is provisioned out of band.
    #[serde(default)]
    pub provisioning: Option<ProvisioningConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    pub template_name: String,
    /// Intermediate credential file, kept until the new certificate is adopted.
    #[serde(default = "default_keystore_path")]
    pub keystore_path: String,
    /// Claim certificate used only for the provisioning session.
    pub claim_cert_path: String,
    pub claim_key_path: String,
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_keystore_path() -> String {
    DEFAULT_KEYSTORE_PATH.to_string()
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Provisioning is configured and the device certificate is missing.
    pub fn needs_provisioning(&self) -> bool {
        self.provisioning.is_some() && !Path::new(&self.mqtt.client_cert_path).is_file()
    }

    /// MQTT settings for the provisioning session: the device's broker,
    /// authenticated with the claim certificate.
    pub fn claim_mqtt(&self) -> Option<MqttConfig> {
        let provisioning = self.provisioning.as_ref()?;
        Some(MqttConfig {
            client_cert_path: provisioning.claim_cert_path.clone(),
            client_key_path: provisioning.claim_key_path.clone(),
            ..self.mqtt.clone()
        })
    }
}
