//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokenrelay_core::{AuthRoutes, ExemptionSet};
use url::Url;

use crate::error::ClientError;

/// Settings for an [`ApiClient`](crate::ApiClient).
///
/// Every field has a default, so a partial TOML table is enough:
///
/// ```
/// use tokenrelay_client::ClientConfig;
///
/// let config: ClientConfig = toml::from_str(r#"
///     base_url = "https://api.example.com"
///     renewal_timeout_secs = 15
///
///     [routes]
///     login = "/auth/login"
/// "#).unwrap();
///
/// assert_eq!(config.routes.login, "/auth/login");
/// assert_eq!(config.routes.refresh_token, "/api/v1/authentications/refresh-token");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix for every request path.
    pub base_url: String,

    /// Authentication endpoints; all of them are exempt from credential handling.
    pub routes: AuthRoutes,

    /// Further paths to exempt.
    pub extra_exempt: Vec<String>,

    /// Upper bound on a renewal call. Unset waits indefinitely.
    pub renewal_timeout_secs: Option<u64>,

    /// Per-request timeout of the HTTP client. Unset uses reqwest's default.
    pub request_timeout_secs: Option<u64>,

    /// Fall back to the access token's `sub` claim when the session has no user id.
    pub user_id_from_token: bool,

    /// Path fragments whose 404 answers are expected and logged at trace
    /// level. A request matches when its path contains any fragment, so
    /// `/cart/summary` also covers `/api/v1/cart/summary/42`.
    pub quiet_not_found: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            routes: AuthRoutes::default(),
            extra_exempt: Vec::new(),
            renewal_timeout_secs: None,
            request_timeout_secs: None,
            user_id_from_token: false,
            quiet_not_found: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// The parsed base URL.
    pub fn parsed_base_url(&self) -> Result<Url, ClientError> {
        Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base_url {:?}: {}", self.base_url, e)))
    }

    pub fn exemption_set(&self) -> ExemptionSet {
        ExemptionSet::from_routes(&self.routes).with_paths(&self.extra_exempt)
    }

    pub fn renewal_timeout(&self) -> Option<Duration> {
        self.renewal_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Whether a 404 from `path` is expected.
    pub fn is_quiet_not_found(&self, path: &str) -> bool {
        self.quiet_not_found
            .iter()
            .filter(|fragment| !fragment.is_empty())
            .any(|fragment| path.contains(fragment.as_str()))
    }
}
