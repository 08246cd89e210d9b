//! JSON file-backed secret storage.
//!
//! Secrets are kept in a single JSON document in the platform data directory
//! (`~/.local/share/tokenrelay/credentials.json` on Linux). Every mutation is
//! written through to disk by staging the whole document in a sibling temp
//! file and renaming it over the old one, so readers see either the previous
//! or the new document and never a partial one.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{Secret, SecretStore, StoreError};

/// On-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialFile {
    /// Version of the file format (for future migrations).
    version: u32,

    secrets: BTreeMap<String, Secret>,
}

impl Default for CredentialFile {
    fn default() -> Self {
        Self {
            version: 1,
            secrets: BTreeMap::new(),
        }
    }
}

/// File-backed secret store.
///
/// On Unix the file is created with mode `0600` and never exists with wider
/// permissions.
pub struct FileStore {
    path: PathBuf,
    data: RwLock<CredentialFile>,
}

impl FileStore {
    /// Default location of the credentials file.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("dev", "tokenrelay", "tokenrelay").ok_or_else(
            || StoreError::BackendError {
                message: "no home directory available for credential file".to_string(),
            },
        )?;
        Ok(dirs.data_dir().join("credentials.json"))
    }

    /// Open the store at its default location.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(Self::default_path()?)
    }

    /// Open (or create) the store at `path`.
    ///
    /// Creates parent directories if they don't exist. The file itself is
    /// only written on the first mutation.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                CredentialFile::default()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            CredentialFile::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &CredentialFile) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(data)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // Same directory as the target so the rename stays on one filesystem.
        let mut staged = tempfile::Builder::new()
            .prefix(".credentials")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            staged
                .as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        staged.write_all(&json)?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("keys_count", &self.data.read().secrets.len())
            .finish()
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.data.read().secrets.get(key).cloned())
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        let mut data = self.data.write();
        data.secrets.insert(key.to_string(), secret.clone());
        self.persist(&data)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.write();
        if data.secrets.remove(key).is_some() {
            self.persist(&data)?;
        }
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .read()
            .secrets
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
