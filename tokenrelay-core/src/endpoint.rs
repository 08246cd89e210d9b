//! Authentication routes and the Endpoint Exemption Set.
//!
//! Requests to these endpoints never carry a bearer credential, and an
//! unauthorized answer from them is never treated as renewable: they are the
//! authentication flow itself.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Paths of the remote authentication endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRoutes {
    pub login: String,
    pub refresh_token: String,
    pub forgot_password: String,
    pub reset_password: String,
}

impl Default for AuthRoutes {
    fn default() -> Self {
        Self {
            login: "/api/v1/authentications/login".to_string(),
            refresh_token: "/api/v1/authentications/refresh-token".to_string(),
            forgot_password: "/api/v1/accounts/forgot-password".to_string(),
            reset_password: "/api/v1/accounts/reset-password".to_string(),
        }
    }
}

/// Set of endpoint paths excluded from credential injection and renewal.
///
/// Matching is exact on the path; any query string is ignored.
///
/// # Examples
///
/// ```
/// use tokenrelay_core::endpoint::{AuthRoutes, ExemptionSet};
///
/// let exempt = ExemptionSet::from_routes(&AuthRoutes::default());
/// assert!(exempt.is_exempt("/api/v1/authentications/login"));
/// assert!(exempt.is_exempt("/api/v1/authentications/login?next=/home"));
/// assert!(!exempt.is_exempt("/api/v1/authentications/login/extra"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExemptionSet {
    paths: HashSet<String>,
}

impl ExemptionSet {
    /// The four authentication-flow endpoints.
    pub fn from_routes(routes: &AuthRoutes) -> Self {
        Self::from_paths([
            routes.login.as_str(),
            routes.refresh_token.as_str(),
            routes.forgot_password.as_str(),
            routes.reset_password.as_str(),
        ])
    }

    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| strip_query(p.as_ref()).to_string())
                .collect(),
        }
    }

    /// Add further exempt paths.
    pub fn with_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.paths
            .extend(paths.into_iter().map(|p| strip_query(p.as_ref()).to_string()));
        self
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.paths.contains(strip_query(path))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Default for ExemptionSet {
    fn default() -> Self {
        Self::from_routes(&AuthRoutes::default())
    }
}

fn strip_query(path: &str) -> &str {
    path.split_once('?').map(|(p, _)| p).unwrap_or(path)
}
