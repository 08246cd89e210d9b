//! OS keyring backend.

use async_trait::async_trait;
use keyring::Entry;

use super::{Secret, SecretStore, StoreError};

/// Secrets in the platform keyring (Keychain, Secret Service, Credential Manager).
///
/// Every store key becomes one keyring entry with service `service` and the
/// store key as user name.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

fn backend_error(action: &str, err: keyring::Error) -> StoreError {
    StoreError::BackendError {
        message: format!("keyring {} failed: {}", action, err),
    }
}

impl KeyringStore {
    /// Open the keyring under `service`.
    ///
    /// Fails with [`StoreError::KeyringUnavailable`] unless a test entry can be
    /// written and read back, so a backend that silently drops writes is never
    /// mistaken for persistent storage.
    pub fn try_new(service: &str) -> Result<Self, StoreError> {
        let unavailable = |message: String| StoreError::KeyringUnavailable { message };

        let check = Entry::new(service, "__availability__").map_err(|e| unavailable(e.to_string()))?;
        let marker = format!("{}-{}", std::process::id(), chrono::Utc::now().timestamp_micros());
        check
            .set_password(&marker)
            .map_err(|e| unavailable(format!("write rejected: {}", e)))?;
        let read_back = check.get_password();
        let _ = check.delete_credential();

        match read_back {
            Ok(value) if value == marker => Ok(Self {
                service: service.to_owned(),
            }),
            Ok(_) | Err(keyring::Error::NoEntry) => Err(unavailable(
                "keyring accepted a write but did not keep it".to_string(),
            )),
            Err(e) => Err(unavailable(format!("read rejected: {}", e))),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service, key).map_err(|e| backend_error("entry lookup", e))
    }
}

#[async_trait]
impl SecretStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(Secret::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(backend_error("read", e)),
        }
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(secret.expose())
            .map_err(|e| backend_error("write", e))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(backend_error("delete", e)),
        }
    }

    async fn list_keys(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::BackendError {
            message: "the OS keyring cannot enumerate entries".to_string(),
        })
    }
}
