//! Persistent storage for the provisioning credential file.
//!
//! The file holds `{"certificate": PEM, "privateKey": PEM}` between the
//! certificate-created and provisioning-accepted events, so it must survive a
//! restart in between.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ctl_protocol::ProvisionedCredentials;

use crate::error::{StoreError, StoreResult};

/// Default location of the intermediate credential file.
pub const DEFAULT_KEYSTORE_PATH: &str = "/tmp/ctl-provisioning-keystore.json";

/// A single well-known file slot.
pub trait CredentialStore {
    /// Make sure the file's parent directory exists.
    fn ensure_dir(&self) -> StoreResult<()>;

    /// Create the file if absent and replace its contents.
    fn write(&self, contents: &[u8]) -> StoreResult<()>;

    fn read(&self) -> StoreResult<Vec<u8>>;

    /// Delete the file. Deleting a missing file succeeds.
    fn remove(&self) -> StoreResult<()>;

    fn exists(&self) -> bool;
}

/// Serialize and persist credentials.
pub fn save_credentials(
    store: &dyn CredentialStore,
    credentials: &ProvisionedCredentials,
) -> StoreResult<()> {
    let bytes =
        serde_json::to_vec(credentials).map_err(|e| StoreError::Malformed(e.to_string()))?;
    store.write(&bytes)
}

/// Read back and parse persisted credentials.
pub fn load_credentials(store: &dyn CredentialStore) -> StoreResult<ProvisionedCredentials> {
    let bytes = store.read()?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed(e.to_string()))
}

// ── Filesystem ────────────────────────────────────────────────

/// Credential file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

impl Default for FileCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYSTORE_PATH)
    }
}

impl CredentialStore for FileCredentialStore {
    fn ensure_dir(&self) -> StoreResult<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))
            }
            _ => Ok(()),
        }
    }

    fn write(&self, contents: &[u8]) -> StoreResult<()> {
        std::fs::write(&self.path, contents).map_err(|e| self.io_error(e))
    }

    fn read(&self) -> StoreResult<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound,
            _ => self.io_error(e),
        })
    }

    fn remove(&self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }
}

// ── In-memory ─────────────────────────────────────────────────

/// In-memory store for tests and hosts without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    contents: Mutex<Option<Vec<u8>>>,
    read_only: bool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every write.
    pub fn read_only() -> Self {
        Self {
            contents: Mutex::new(None),
            read_only: true,
        }
    }

    /// A store pre-filled with raw bytes (e.g. a corrupted file).
    pub fn with_contents(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            read_only: false,
        }
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents.lock().unwrap().clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn ensure_dir(&self) -> StoreResult<()> {
        Ok(())
    }

    fn write(&self, contents: &[u8]) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::Io {
                path: "memory".into(),
                reason: "store is read-only".into(),
            });
        }
        *self.contents.lock().unwrap() = Some(contents.to_vec());
        Ok(())
    }

    fn read(&self) -> StoreResult<Vec<u8>> {
        self.contents
            .lock()
            .unwrap()
            .clone()
            .ok_or(StoreError::NotFound)
    }

    fn remove(&self) -> StoreResult<()> {
        self.contents.lock().unwrap().take();
        Ok(())
    }

    fn exists(&self) -> bool {
        self.contents.lock().unwrap().is_some()
    }
}
