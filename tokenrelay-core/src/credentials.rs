//! Credential Store Adapter.
//!
//! The refresh machinery never talks to a [`SecretStore`] directly; it goes
//! through [`CredentialStore`], which knows about exactly one access/refresh
//! pair. [`SecretCredentialStore`] adapts any secret backend to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::{Secret, SecretStore, StoreError};

/// Access and refresh credential issued together by the remote service.
///
/// Created at login, replaced on every successful renewal, deleted on
/// logout or unrecoverable renewal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: Secret,
    pub refresh_token: Secret,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            refresh_token: Secret::new(refresh_token),
        }
    }
}

/// Read/write access to the current credential pair.
///
/// Empty stored values are reported as absent.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Current access credential, if any.
    async fn access_token(&self) -> Result<Option<Secret>, StoreError>;

    /// Current refresh credential, if any.
    async fn refresh_token(&self) -> Result<Option<Secret>, StoreError>;

    /// Replace both credentials.
    async fn set_credentials(&self, pair: &CredentialPair) -> Result<(), StoreError>;

    /// Remove both credentials. Succeeds when nothing is stored.
    async fn clear_credentials(&self) -> Result<(), StoreError>;

    /// Both credentials, or `None` if either is missing.
    async fn load_pair(&self) -> Result<Option<CredentialPair>, StoreError> {
        let access = self.access_token().await?;
        let refresh = self.refresh_token().await?;
        Ok(match (access, refresh) {
            (Some(access_token), Some(refresh_token)) => Some(CredentialPair {
                access_token,
                refresh_token,
            }),
            _ => None,
        })
    }
}

/// Field names under the namespace prefix.
const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";
const USER_ID: &str = "user_id";

/// [`CredentialStore`] on top of a [`SecretStore`].
///
/// Keys are `tokenrelay/{namespace}/access_token`, `.../refresh_token` and
/// `.../user_id`; the namespace separates independent sessions sharing one
/// backend.
#[derive(Debug)]
pub struct SecretCredentialStore<S: SecretStore> {
    store: S,
    namespace: String,
}

impl<S: SecretStore> SecretCredentialStore<S> {
    pub fn new(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// The underlying secret store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, field: &str) -> String {
        format!("tokenrelay/{}/{}", self.namespace, field)
    }

    async fn read(&self, field: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self
            .store
            .get(&self.key(field))
            .await?
            .filter(|secret| !secret.is_empty()))
    }

    /// Persist the identifier of the signed-in user next to the credentials.
    pub async fn set_user_id(&self, user_id: &str) -> Result<(), StoreError> {
        self.store.set(&self.key(USER_ID), &Secret::new(user_id)).await
    }

    /// The persisted user identifier, if any.
    pub async fn user_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read(USER_ID).await?.map(Secret::into_inner))
    }

    pub async fn forget_user_id(&self) -> Result<(), StoreError> {
        self.store.delete(&self.key(USER_ID)).await
    }
}

#[async_trait]
impl<S: SecretStore> CredentialStore for SecretCredentialStore<S> {
    async fn access_token(&self) -> Result<Option<Secret>, StoreError> {
        self.read(ACCESS_TOKEN).await
    }

    async fn refresh_token(&self) -> Result<Option<Secret>, StoreError> {
        self.read(REFRESH_TOKEN).await
    }

    async fn set_credentials(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        self.store
            .set(&self.key(ACCESS_TOKEN), &pair.access_token)
            .await?;
        self.store
            .set(&self.key(REFRESH_TOKEN), &pair.refresh_token)
            .await?;
        tracing::debug!("Stored credential pair for namespace {}", self.namespace);
        Ok(())
    }

    async fn clear_credentials(&self) -> Result<(), StoreError> {
        self.store.delete(&self.key(ACCESS_TOKEN)).await?;
        self.store.delete(&self.key(REFRESH_TOKEN)).await?;
        tracing::debug!("Cleared credential pair for namespace {}", self.namespace);
        Ok(())
    }
}
