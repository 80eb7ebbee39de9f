//! Adoption of credentials issued by fleet provisioning.

use std::path::{Path, PathBuf};

use anyhow::Context;
use ctl_protocol::ProvisionedCredentials;
use ctl_thing_client::ProvisioningCallback;
use serde::Deserialize;
use serde_json::Value;

/// Provisioning callback that installs the issued certificate and key at
/// the device credential paths. Returns true only if both were written.
pub fn adopt_into<'a>(
    cert_path: impl Into<PathBuf>,
    key_path: impl Into<PathBuf>,
) -> ProvisioningCallback<'a> {
    let cert_path = cert_path.into();
    let key_path = key_path.into();
    Box::new(move |_topic, payload| {
        match write_device_credentials(&cert_path, &key_path, payload) {
            Ok(()) => {
                tracing::info!(cert = %cert_path.display(), "device credentials installed");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install device credentials");
                false
            }
        }
    })
}

pub fn write_device_credentials(
    cert_path: &Path,
    key_path: &Path,
    payload: &Value,
) -> anyhow::Result<()> {
    let credentials =
        ProvisionedCredentials::deserialize(payload).context("malformed credential payload")?;

    for path in [cert_path, key_path] {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    std::fs::write(key_path, &credentials.private_key)
        .with_context(|| format!("writing {}", key_path.display()))?;
    restrict_permissions(key_path)?;
    // The certificate goes last: its presence marks the device as provisioned.
    std::fs::write(cert_path, &credentials.certificate)
        .with_context(|| format!("writing {}", cert_path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("restricting {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_certificate_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("certs/device.pem");
        let key = dir.path().join("certs/device.key");

        let mut adopt = adopt_into(&cert, &key);
        assert!(adopt(
            "provisioning/success",
            &json!({"certificate": "CERT", "privateKey": "KEY"})
        ));
        assert_eq!(std::fs::read_to_string(&cert).unwrap(), "CERT");
        assert_eq!(std::fs::read_to_string(&key).unwrap(), "KEY");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&key).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn malformed_payload_is_declined() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("device.pem");
        let key = dir.path().join("device.key");

        let mut adopt = adopt_into(&cert, &key);
        assert!(!adopt("provisioning/success", &json!({"certificate": "CERT"})));
        assert!(!cert.exists());
        assert!(!key.exists());
    }

    #[test]
    fn unwritable_destination_is_declined() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let mut adopt = adopt_into(blocker.join("device.pem"), blocker.join("device.key"));
        assert!(!adopt(
            "provisioning/success",
            &json!({"certificate": "CERT", "privateKey": "KEY"})
        ));
    }
}
