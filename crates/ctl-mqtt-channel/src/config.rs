use serde::Deserialize;

/// Broker session settings, loadable from TOML.
///
/// The same shape serves the operating session (device certificate) and
/// the provisioning session (claim certificate); only the cert/key paths
/// differ between the two.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Device-management endpoint.
    pub broker_host: String,
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// Usually the thing name; the broker allows one session per id.
    pub client_id: String,
    /// Mutual TLS. Plaintext is only for a local broker.
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// Client certificate (PEM).
    #[serde(default)]
    pub client_cert_path: String,
    /// Client private key (PEM).
    #[serde(default)]
    pub client_key_path: String,
    /// Root CA of the endpoint (PEM).
    #[serde(default)]
    pub ca_cert_path: String,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// Ask the broker to keep subscriptions across reconnects.
    #[serde(default = "default_persistent_session")]
    pub persistent_session: bool,
    /// Outgoing requests buffered before the event loop drains them.
    /// Registering a shadow queues six subscriptions and a GET.
    #[serde(default = "default_request_queue")]
    pub request_queue: usize,
}

fn default_use_tls() -> bool {
    true
}

fn default_port() -> u16 {
    8883
}

fn default_keepalive() -> u16 {
    30
}

fn default_persistent_session() -> bool {
    true
}

fn default_request_queue() -> usize {
    64
}
