//! The client applications talk to.
//!
//! [`ApiClient`] owns the two transport channels and wires the refresh
//! machinery around every call:
//!
//! 1. the request is augmented with the current bearer credential and sent;
//! 2. a failure is classified; anything but an eligible 401 goes straight back;
//! 3. an eligible 401 joins the shared [`RefreshCoordinator`], either leading
//!    the renewal or waiting for it;
//! 4. on success the request is replayed once with the new credential, on
//!    failure the session is torn down and the renewal error is returned.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokenrelay_core::{CredentialPair, CredentialStore, ExemptionSet, Secret, SessionSink, claims};
use tracing::{debug, error, info, trace, warn};

use crate::augment::{ChannelDefaults, augment_request, bearer_header};
use crate::classify::{Classification, classify};
use crate::config::ClientConfig;
use crate::coordinator::{Admission, LeaderGuard, RefreshCoordinator};
use crate::dispatch::replay;
use crate::error::{ClientError, HttpError, RenewalError, Result};
use crate::renewal::{build_renewal_request, parse_renewal_response};
use crate::request::{ApiRequest, Channel, FormPart};
use crate::response::ApiResponse;
use crate::teardown::teardown;
use crate::transport::{ReqwestTransport, Transport};

/// HTTP client with transparent single-flight credential renewal.
///
/// Cheap to clone; clones share channels, credentials and the renewal state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    exemptions: ExemptionSet,
    defaults: ChannelDefaults,
    store: Arc<dyn CredentialStore>,
    session: Arc<dyn SessionSink>,
    transport: Arc<dyn Transport>,
    coordinator: RefreshCoordinator,
    /// Held while credentials are written or the session changes hands.
    session_lock: tokio::sync::Mutex<()>,
}

impl ApiClient {
    /// Create a client sending over `reqwest` to `config.base_url`.
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        session: Arc<dyn SessionSink>,
    ) -> Result<Self> {
        let base_url = config.parsed_base_url()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

        let transport = Arc::new(ReqwestTransport::with_client(http, base_url));
        Ok(Self::with_transport(config, store, session, transport))
    }

    /// Create a client over a custom transport.
    pub fn with_transport(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        session: Arc<dyn SessionSink>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let exemptions = config.exemption_set();
        Self {
            inner: Arc::new(Inner {
                config,
                exemptions,
                defaults: ChannelDefaults::new(),
                store,
                session,
                transport,
                coordinator: RefreshCoordinator::new(),
                session_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    pub fn session(&self) -> &Arc<dyn SessionSink> {
        &self.inner.session
    }

    /// Whether a credential renewal is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.inner.coordinator.is_refreshing()
    }

    /// Default headers of `channel`.
    pub fn default_headers(&self, channel: Channel) -> HeaderMap {
        self.inner.defaults.get(channel)
    }

    /// Add a default header to `channel`. `Authorization` is managed by the
    /// client and overridden on every request.
    pub fn set_default_header(&self, channel: Channel, name: HeaderName, value: HeaderValue) {
        self.inner.defaults.insert(channel, name, value);
    }

    pub fn remove_default_header(&self, channel: Channel, name: &HeaderName) {
        self.inner.defaults.remove(channel, name);
    }

    /// Send a request, renewing credentials and replaying once on an eligible 401.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let inner = &self.inner;
        let defaults = inner.defaults.get(request.channel);
        augment_request(&mut request, &defaults, &inner.exemptions, inner.store.as_ref()).await;

        debug!(
            request_id = %request.id,
            channel = %request.channel,
            "{} {}", request.method, request.path
        );

        let err = match inner.transport.send(&request).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        self.log_failure(&request, &err);

        match classify(&err, Some(&request), &inner.exemptions) {
            Classification::Propagate => Err(err.into()),
            Classification::Renew => self.recover(request).await,
        }
    }

    /// Renew (or wait for a renewal) and replay `request` once.
    async fn recover(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        request.mark_retry();

        let access_token = match self.inner.coordinator.admit() {
            Admission::Leader(guard) => {
                debug!(request_id = %request.id, "Unauthorized, renewing credentials");
                self.lead_renewal(guard).await?
            }
            Admission::Waiter(handle) => {
                debug!(request_id = %request.id, ticket = handle.ticket(), "Unauthorized, waiting for renewal in flight");
                handle.wait().await?
            }
        };

        Ok(replay(self.inner.transport.as_ref(), request, &access_token).await?)
    }

    /// Run the renewal as leader and settle every waiter with its outcome.
    async fn lead_renewal(&self, guard: LeaderGuard<'_>) -> std::result::Result<Secret, RenewalError> {
        let inner = &self.inner;

        let outcome = match inner.config.renewal_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.renew())
                .await
                .unwrap_or(Err(RenewalError::Timeout(limit))),
            None => self.renew().await,
        };
        let outcome = match outcome {
            Ok(pair) => self.install(&guard, pair).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(access_token) => {
                let released = guard.resolve(access_token.clone());
                info!(released = released.len(), "Credentials renewed");
                Ok(access_token)
            }
            Err(e) => {
                if e.ends_session() {
                    let _session = inner.session_lock.lock().await;
                    if guard.is_current() {
                        error!("Credential renewal failed: {}", e);
                        teardown(inner.store.as_ref(), &inner.defaults, inner.session.as_ref()).await;
                    } else {
                        debug!("Renewal failed after the session changed: {}", e);
                    }
                }
                let rejected = guard.reject(e.clone());
                if !rejected.is_empty() {
                    debug!(rejected = rejected.len(), "Rejected requests waiting on renewal");
                }
                Err(e)
            }
        }
    }

    /// Call the renewal endpoint with the stored refresh token.
    async fn renew(&self) -> std::result::Result<CredentialPair, RenewalError> {
        let inner = &self.inner;

        let refresh_token = inner
            .store
            .refresh_token()
            .await?
            .ok_or(RenewalError::MissingRefreshToken)?;
        let user_id = self
            .current_user_id()
            .await
            .ok_or(RenewalError::MissingUserId)?;

        let mut request = build_renewal_request(&inner.config.routes.refresh_token, &user_id, &refresh_token)?;
        let defaults = inner.defaults.get(request.channel);
        augment_request(&mut request, &defaults, &inner.exemptions, inner.store.as_ref()).await;

        let response = inner
            .transport
            .send(&request)
            .await
            .map_err(RenewalError::Transport)?;
        parse_renewal_response(&response)
    }

    /// Persist a renewed pair and publish it as the default credential.
    async fn install(
        &self,
        guard: &LeaderGuard<'_>,
        pair: CredentialPair,
    ) -> std::result::Result<Secret, RenewalError> {
        let inner = &self.inner;
        let _session = inner.session_lock.lock().await;
        if !guard.is_current() {
            return Err(RenewalError::SessionReset);
        }

        inner.store.set_credentials(&pair).await?;

        match bearer_header(&pair.access_token) {
            Some(value) => inner.defaults.insert_all(AUTHORIZATION, value),
            None => warn!("Renewed access token is not a valid header value"),
        }
        Ok(pair.access_token)
    }

    /// User id for renewal: the session's, or the token's `sub` claim if enabled.
    async fn current_user_id(&self) -> Option<String> {
        if let Some(user_id) = self.inner.session.current_user_id() {
            return Some(user_id);
        }
        if !self.inner.config.user_id_from_token {
            return None;
        }
        let access = self.inner.store.access_token().await.ok().flatten()?;
        let subject = claims::subject(access.expose());
        if subject.is_some() {
            debug!("Using access token subject as user id");
        }
        subject
    }

    fn log_failure(&self, request: &ApiRequest, err: &HttpError) {
        if err.status == Some(404) && self.inner.config.is_quiet_not_found(&request.path) {
            trace!(request_id = %request.id, path = %request.path, "Expected 404");
        } else {
            debug!(request_id = %request.id, path = %request.path, "Request failed: {}", err);
        }
    }

    /// Store a freshly issued credential pair and mark the session active.
    ///
    /// A renewal still running for the previous session is disowned: its
    /// waiters get [`RenewalError::SessionReset`] and its result is dropped.
    pub async fn establish_session(&self, pair: CredentialPair, user_id: &str) -> Result<()> {
        let inner = &self.inner;
        let _session = inner.session_lock.lock().await;
        let rejected = inner.coordinator.reset();
        if rejected > 0 {
            debug!(rejected, "Cancelled requests waiting on the previous session's renewal");
        }
        inner.store.set_credentials(&pair).await?;

        if pair.access_token.is_empty() {
            warn!("Empty access token, default authorization header not set");
            inner.defaults.remove_all(&AUTHORIZATION);
        } else if let Some(value) = bearer_header(&pair.access_token) {
            inner.defaults.insert_all(AUTHORIZATION, value);
        } else {
            warn!("Access token is not a valid header value, default authorization header not set");
            inner.defaults.remove_all(&AUTHORIZATION);
        }

        inner.session.sign_in(user_id);
        info!("Session established");
        Ok(())
    }

    /// End the session: abort any renewal in flight and tear down.
    pub async fn logout(&self) {
        let inner = &self.inner;
        let _session = inner.session_lock.lock().await;
        let rejected = inner.coordinator.reset();
        if rejected > 0 {
            debug!(rejected, "Cancelled requests waiting on renewal");
        }
        teardown(inner.store.as_ref(), &inner.defaults, inner.session.as_ref()).await;
        info!("Logged out");
    }

    /// Renew ahead of time if the stored access token expires within `threshold`.
    ///
    /// Joins a renewal already in flight instead of starting another. Returns
    /// whether a renewal took place.
    pub async fn refresh_if_expiring(&self, threshold: chrono::Duration) -> Result<bool> {
        let Some(access) = self.inner.store.access_token().await? else {
            return Ok(false);
        };
        if !claims::should_refresh(access.expose(), threshold) {
            return Ok(false);
        }

        debug!(
            remaining = %claims::format_time_until_expiry(access.expose()),
            "Access token close to expiry, renewing"
        );
        match self.inner.coordinator.admit() {
            Admission::Leader(guard) => self.lead_renewal(guard).await?,
            Admission::Waiter(handle) => handle.wait().await?,
        };
        Ok(true)
    }

    /// `GET path`, decoding the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(ApiRequest::get(path)).await?;
        Ok(response.json()?)
    }

    /// `POST path` with a JSON body, decoding the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, body).await
    }

    /// `PUT path` with a JSON body, decoding the JSON response.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PUT, path, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    /// `POST path` as `multipart/form-data` on the multipart channel.
    pub async fn upload(&self, path: &str, parts: Vec<FormPart>) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path).with_multipart(parts)).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let response = self.send(ApiRequest::new(method, path).with_json(body)).await?;
        Ok(response.json()?)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url)
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}
