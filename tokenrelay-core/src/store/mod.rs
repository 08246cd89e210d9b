//! Where token material lives between requests.
//!
//! Backends implement [`SecretStore`], a flat async key/value map of
//! [`Secret`] values. Three ship with the crate:
//!
//! | backend          | survives restart | notes                              |
//! |------------------|------------------|------------------------------------|
//! | [`MemoryStore`]  | no               | tests and throwaway sessions       |
//! | [`FileStore`]    | yes              | JSON file, owner-only permissions  |
//! | `KeyringStore`   | yes (1)          | needs the `keyring-store` feature  |
//!
//! (1) Linux uses the kernel keyring, which is emptied on reboot. A keyring
//! that does not keep a test value is refused and [`create_store`] falls back.
//!
//! Keys look like `tokenrelay/{namespace}/{field}`; the layout is owned by
//! [`SecretCredentialStore`](crate::credentials::SecretCredentialStore).

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

mod file;
#[cfg(feature = "keyring-store")]
mod keyring;
mod memory;

pub use file::FileStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;
pub use memory::MemoryStore;

/// Token text that formats as `***` and is zeroed on drop.
///
/// Read it with [`expose`](Secret::expose) at the point where it goes on the
/// wire or into a backend, nowhere else.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// An empty secret is treated as "no token" by the request augmenter.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Failures reported by a [`SecretStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored value under {key:?}")]
    NotFound { key: String },

    #[error("the backend refused access to {key:?}")]
    AccessDenied { key: String },

    #[error("storage backend failed: {message}")]
    BackendError { message: String },

    #[error("stored value could not be (de)serialized: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// No usable OS keyring on this machine.
    #[error("OS keyring unusable: {message}")]
    KeyringUnavailable { message: String },

    #[error("credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Async key/value storage for [`Secret`]s.
///
/// Missing keys are not errors: `get` yields `None` and `delete` succeeds.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Insert or replace the value under `key`.
    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Every stored key beginning with `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.get(key).await.map(|value| value.is_some())
    }
}

#[async_trait]
impl<T: SecretStore + ?Sized> SecretStore for Box<T> {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        T::get(self, key).await
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        T::set(self, key, secret).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        T::delete(self, key).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        T::list_keys(self, prefix).await
    }
}

/// Backend named by the `store` configuration key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
    Keyring,
}

/// Build the store for `backend`.
///
/// A persistent backend that cannot be opened degrades to [`MemoryStore`]
/// with a warning, so a broken keyring never blocks a request. `file_path`
/// only matters for [`StoreBackend::File`].
pub fn create_store(backend: StoreBackend, file_path: Option<PathBuf>) -> Box<dyn SecretStore> {
    let degraded = match backend {
        StoreBackend::Memory => None,
        StoreBackend::File => {
            let opened = match file_path {
                Some(path) => FileStore::open(path),
                None => FileStore::open_default(),
            };
            match opened {
                Ok(store) => {
                    debug!(path = ?store.path(), "credential file store opened");
                    return Box::new(store);
                }
                Err(e) => Some(e.to_string()),
            }
        }
        StoreBackend::Keyring => match open_keyring() {
            Ok(store) => return store,
            Err(reason) => Some(reason),
        },
    };

    if let Some(reason) = degraded {
        warn!(
            ?backend,
            %reason,
            "credential backend unavailable, tokens will only last for this process"
        );
    }
    Box::new(MemoryStore::new())
}

#[cfg(feature = "keyring-store")]
fn open_keyring() -> Result<Box<dyn SecretStore>, String> {
    let store = KeyringStore::try_new("tokenrelay").map_err(|e| e.to_string())?;
    tracing::info!("credentials kept in the OS keyring");
    Ok(Box::new(store))
}

#[cfg(not(feature = "keyring-store"))]
fn open_keyring() -> Result<Box<dyn SecretStore>, String> {
    Err("built without the keyring-store feature".to_string())
}
