//! Command implementations shared by the binary and its tests.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use tokenrelay_client::{ApiClient, ApiRequest, FormPart};
use tokenrelay_core::{
    CredentialPair, CredentialStore, SecretCredentialStore, SecretStore, SessionState, claims,
    create_store,
};
use tracing::debug;

use crate::config::CliConfig;

/// Credential store type used by the CLI.
pub type Store = SecretCredentialStore<Box<dyn SecretStore>>;

/// A client with its persisted session restored.
pub struct App {
    pub client: ApiClient,
    pub store: Arc<Store>,
    pub session: Arc<SessionState>,
}

impl App {
    /// Open the store named in `config` and restore the saved session.
    pub async fn open(config: &CliConfig) -> Result<Self> {
        let secrets = create_store(config.store, config.credentials_path.clone());
        Self::with_store(config, secrets).await
    }

    pub async fn with_store(config: &CliConfig, secrets: Box<dyn SecretStore>) -> Result<Self> {
        let store = Arc::new(SecretCredentialStore::new(secrets, config.namespace.clone()));
        let session = Arc::new(SessionState::new());

        if let Some(user_id) = store.user_id().await? {
            debug!("Restoring session for user {}", user_id);
            session.establish(user_id);
        }

        let client = ApiClient::new(config.client.clone(), store.clone(), session.clone())
            .context("Failed to create API client")?;

        Ok(Self {
            client,
            store,
            session,
        })
    }

    /// Store externally issued credentials as the current session.
    pub async fn import(&self, access: &str, refresh: &str, user_id: &str) -> Result<()> {
        if access.is_empty() || refresh.is_empty() {
            bail!("Both access and refresh tokens are required");
        }
        self.client
            .establish_session(CredentialPair::new(access, refresh), user_id)
            .await?;
        self.store.set_user_id(user_id).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let access = self.store.access_token().await?;
        let refresh = self.store.refresh_token().await?;
        let user_id = self.store.user_id().await?;

        let expires_at = access.as_ref().and_then(|t| claims::expires_at(t.expose()));
        let expires_in = access
            .as_ref()
            .filter(|_| expires_at.is_some())
            .map(|t| claims::format_time_until_expiry(t.expose()));

        Ok(StatusReport {
            signed_in: access.is_some() && refresh.is_some() && user_id.is_some(),
            user_id,
            has_access_token: access.is_some(),
            has_refresh_token: refresh.is_some(),
            expires_at,
            expires_in,
        })
    }

    pub async fn logout(&self) -> Result<()> {
        self.client.logout().await;
        self.store.forget_user_id().await?;
        Ok(())
    }

    /// Drop the saved user id after the session was ended by a failed renewal.
    pub async fn forget_session(&self) -> Result<()> {
        self.store.forget_user_id().await?;
        Ok(())
    }
}

/// Output of the `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub signed_in: bool,
    pub user_id: Option<String>,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in: Option<String>,
}

/// Parse `key=value`.
pub fn parse_key_value(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got {:?}", s))?;
    if key.is_empty() {
        bail!("empty key in {:?}", s);
    }
    Ok((key.to_string(), value.to_string()))
}

/// Arguments of the `request` command.
#[derive(Debug, Default)]
pub struct RequestSpec {
    pub method: String,
    pub path: String,
    pub json: Option<String>,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub files: Vec<(String, String)>,
}

/// Build the request described on the command line.
///
/// Form fields or files select the multipart channel; otherwise a `--json`
/// body is sent on the JSON channel.
pub fn build_request(spec: &RequestSpec) -> Result<ApiRequest> {
    let method = Method::from_bytes(spec.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method {:?}", spec.method))?;
    let mut request = ApiRequest::new(method, spec.path.clone());
    for (key, value) in &spec.query {
        request = request.with_query(key.clone(), value.clone());
    }

    if !spec.form.is_empty() || !spec.files.is_empty() {
        if spec.json.is_some() {
            bail!("--json cannot be combined with --form or --file");
        }
        let mut parts: Vec<FormPart> = spec
            .form
            .iter()
            .map(|(k, v)| FormPart::text(k.clone(), v.clone()))
            .collect();
        for (field, file) in &spec.files {
            parts.push(file_part(field, Path::new(file))?);
        }
        return Ok(request.with_multipart(parts));
    }

    if let Some(body) = &spec.json {
        let value: serde_json::Value =
            serde_json::from_str(body).context("--json is not valid JSON")?;
        request = request.with_json(value);
    }
    Ok(request)
}

fn file_part(field: &str, path: &Path) -> Result<FormPart> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| field.to_string());
    Ok(FormPart::file(field, file_name, bytes))
}
