//! Request Augmenter: attaches the current bearer credential.

use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tokenrelay_core::{CredentialStore, ExemptionSet, Secret};
use tracing::{trace, warn};

use crate::request::{ApiRequest, Channel};

/// Per-channel default headers, merged into every request on that channel.
#[derive(Debug, Default)]
pub struct ChannelDefaults {
    maps: [RwLock<HeaderMap>; 2],
}

impl ChannelDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the defaults for `channel`.
    pub fn get(&self, channel: Channel) -> HeaderMap {
        self.maps[channel.index()].read().clone()
    }

    pub fn insert(&self, channel: Channel, name: HeaderName, value: HeaderValue) {
        self.maps[channel.index()].write().insert(name, value);
    }

    pub fn remove(&self, channel: Channel, name: &HeaderName) {
        self.maps[channel.index()].write().remove(name);
    }

    /// Set `name` on every channel.
    pub fn insert_all(&self, name: HeaderName, value: HeaderValue) {
        for map in &self.maps {
            map.write().insert(name.clone(), value.clone());
        }
    }

    /// Remove `name` from every channel.
    pub fn remove_all(&self, name: &HeaderName) {
        for map in &self.maps {
            map.write().remove(name);
        }
    }
}

/// `Bearer <token>` as a sensitive header value.
///
/// Returns `None` if the token contains bytes not allowed in a header.
pub(crate) fn bearer_header(token: &Secret) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose())).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Copy channel defaults into `request` without overriding headers it sets itself.
pub(crate) fn merge_defaults(request: &mut ApiRequest, defaults: &HeaderMap) {
    for (name, value) in defaults {
        if !request.headers.contains_key(name) {
            request.headers.insert(name.clone(), value.clone());
        }
    }
}

/// Prepare `request` for sending.
///
/// Channel defaults are merged first, then the `Authorization` header is
/// decided here and nowhere else:
/// - exempt endpoint: removed
/// - access credential stored: `Bearer <token>`
/// - no credential (or unreadable store): removed, so a default header from a
///   previous session cannot leak onto an unauthenticated request
pub async fn augment_request(
    request: &mut ApiRequest,
    defaults: &HeaderMap,
    exemptions: &ExemptionSet,
    store: &dyn CredentialStore,
) {
    merge_defaults(request, defaults);

    if exemptions.is_exempt(&request.path) {
        trace!(request_id = %request.id, path = %request.path, "exempt endpoint, no credential attached");
        request.headers.remove(AUTHORIZATION);
        return;
    }

    let token = match store.access_token().await {
        Ok(token) => token,
        Err(e) => {
            warn!(request_id = %request.id, error = %e, "could not read access token, sending without credential");
            None
        }
    };

    match token.as_ref().and_then(bearer_header) {
        Some(value) => {
            request.headers.insert(AUTHORIZATION, value);
        }
        None => {
            if token.is_some() {
                warn!(request_id = %request.id, "stored access token is not a valid header value");
            }
            request.headers.remove(AUTHORIZATION);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{ACCEPT, CONTENT_TYPE};
    use tokenrelay_core::{CredentialPair, MemoryStore, SecretCredentialStore};

    async fn store_with(access: Option<&str>) -> SecretCredentialStore<MemoryStore> {
        let store = SecretCredentialStore::new(MemoryStore::new(), "t");
        if let Some(access) = access {
            store
                .set_credentials(&CredentialPair::new(access, "rt"))
                .await
                .unwrap();
        }
        store
    }

    fn defaults_with_stale_auth() -> HeaderMap {
        let mut defaults = HeaderMap::new();
        defaults.insert(ACCEPT, HeaderValue::from_static("application/json"));
        defaults.insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        defaults
    }

    #[tokio::test]
    async fn test_attaches_current_token() {
        let store = store_with(Some("fresh")).await;
        let mut request = ApiRequest::get("/api/v1/courses");

        augment_request(&mut request, &defaults_with_stale_auth(), &ExemptionSet::default(), &store).await;

        assert_eq!(request.headers[AUTHORIZATION], "Bearer fresh");
        assert!(request.headers[AUTHORIZATION].is_sensitive());
        assert_eq!(request.headers[ACCEPT], "application/json");
    }

    #[tokio::test]
    async fn test_removes_stale_default_without_token() {
        let store = store_with(None).await;
        let mut request = ApiRequest::get("/api/v1/courses");

        augment_request(&mut request, &defaults_with_stale_auth(), &ExemptionSet::default(), &store).await;

        assert!(request.headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_exempt_endpoint_never_gets_credential() {
        let store = store_with(Some("fresh")).await;
        let mut request = ApiRequest::post("/api/v1/authentications/login")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer caller-set"));

        augment_request(&mut request, &defaults_with_stale_auth(), &ExemptionSet::default(), &store).await;

        assert!(request.headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_request_headers_win_over_defaults() {
        let store = store_with(None).await;
        let mut defaults = HeaderMap::new();
        defaults.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut request = ApiRequest::post("/x")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        augment_request(&mut request, &defaults, &ExemptionSet::default(), &store).await;

        assert_eq!(request.headers[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_channel_defaults_are_independent() {
        let defaults = ChannelDefaults::new();
        defaults.insert(Channel::Json, ACCEPT, HeaderValue::from_static("application/json"));
        assert!(defaults.get(Channel::Multipart).get(ACCEPT).is_none());

        defaults.insert_all(AUTHORIZATION, HeaderValue::from_static("Bearer a"));
        assert_eq!(defaults.get(Channel::Multipart)[AUTHORIZATION], "Bearer a");

        defaults.remove_all(&AUTHORIZATION);
        for channel in Channel::ALL {
            assert!(defaults.get(channel).get(AUTHORIZATION).is_none());
        }
        assert_eq!(defaults.get(Channel::Json)[ACCEPT], "application/json");
    }

    #[test]
    fn test_remove_only_touches_one_channel() {
        let defaults = ChannelDefaults::new();
        defaults.insert_all(ACCEPT, HeaderValue::from_static("application/json"));

        defaults.remove(Channel::Multipart, &ACCEPT);
        defaults.remove(Channel::Multipart, &ACCEPT);

        assert!(defaults.get(Channel::Multipart).get(ACCEPT).is_none());
        assert_eq!(defaults.get(Channel::Json)[ACCEPT], "application/json");
    }

    #[tokio::test]
    async fn test_unencodable_token_is_dropped() {
        let store = store_with(Some("bad\ntoken")).await;
        let mut request = ApiRequest::get("/x");

        augment_request(&mut request, &defaults_with_stale_auth(), &ExemptionSet::default(), &store).await;

        assert!(request.headers.get(AUTHORIZATION).is_none());
    }
}
