//! TLS configuration for mTLS connections to the broker.
//!
//! Loads the device certificate, private key, and CA certificate from PEM
//! files and configures rumqttc's TLS transport.

use rumqttc::Transport;

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

/// Build a TLS transport from certificate file paths in the config.
///
/// Uses `TlsConfiguration::Simple` which reads PEM-encoded files:
/// - CA certificate
/// - Device certificate (or the claim certificate while provisioning)
/// - Device private key
pub fn load_tls_transport(config: &MqttConfig) -> MqttResult<Transport> {
    let ca = read_pem("CA cert", &config.ca_cert_path)?;
    let client_cert = read_pem("client cert", &config.client_cert_path)?;
    let client_key = read_pem("client key", &config.client_key_path)?;

    Ok(Transport::tls_with_config(
        rumqttc::TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: Some((client_cert, client_key)),
        },
    ))
}

fn read_pem(what: &str, path: &str) -> MqttResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| MqttError::Tls(format!("failed to read {what} '{path}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ca: &str, cert: &str, key: &str) -> MqttConfig {
        MqttConfig {
            broker_host: "localhost".into(),
            broker_port: 8883,
            client_id: "test".into(),
            use_tls: true,
            client_cert_path: cert.into(),
            client_key_path: key.into(),
            ca_cert_path: ca.into(),
            keepalive_secs: 30,
            persistent_session: true,
            request_queue: 64,
        }
    }

    #[test]
    fn missing_ca_cert_returns_error() {
        let config = config(
            "/nonexistent/ca.pem",
            "/nonexistent/cert.pem",
            "/nonexistent/key.pem",
        );
        let err = load_tls_transport(&config).err().expect("should fail");
        let msg = err.to_string();
        assert!(
            msg.contains("CA cert"),
            "error should mention CA cert: {msg}"
        );
    }

    #[test]
    fn missing_client_key_named_in_error() {
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.pem");
        let cert = dir.path().join("cert.pem");
        std::fs::write(&ca, "ca").unwrap();
        std::fs::write(&cert, "cert").unwrap();

        let config = config(
            ca.to_str().unwrap(),
            cert.to_str().unwrap(),
            "/nonexistent/key.pem",
        );
        let err = load_tls_transport(&config).err().expect("should fail");
        assert!(err.to_string().contains("client key"));
    }
}
