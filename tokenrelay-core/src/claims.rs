//! Access-token claim helpers.
//!
//! Reads the payload of a JWT access credential **without verifying its
//! signature**. Only use the result for client-side decisions such as "is it
//! time to renew", never for authorization.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The registered claims this crate cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject; the backend puts the user identifier here.
    pub sub: Option<String>,
    /// Expiry, seconds since the Unix epoch.
    pub exp: Option<i64>,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: Option<i64>,
}

/// Decode the payload segment of `token`.
///
/// Accepts both base64url and standard base64 alphabets, padded or not.
/// Returns `None` for anything that is not a three-part token with a JSON
/// object payload.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let mut parts = token.split('.');
    let (_, payload, _) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => {
            tracing::debug!("Token is not a three-part JWT");
            return None;
        }
    };

    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD.decode(normalized).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// The `sub` claim, if present and non-empty.
pub fn subject(token: &str) -> Option<String> {
    decode_claims(token)?.sub.filter(|s| !s.is_empty())
}

/// Absolute expiry of `token`.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(decode_claims(token)?.exp?, 0)
}

/// Whether `token` is expired. Tokens without a readable expiry count as expired.
pub fn is_expired(token: &str) -> bool {
    match expires_at(token) {
        Some(exp) => Utc::now() >= exp,
        None => true,
    }
}

/// Whether `token` expires within `threshold` (or already has).
///
/// Tokens without a readable expiry are never proactively refreshed.
pub fn should_refresh(token: &str, threshold: Duration) -> bool {
    match expires_at(token) {
        Some(exp) => exp - Utc::now() <= threshold,
        None => false,
    }
}

/// Time left before `token` expires; zero if expired or unreadable.
pub fn time_until_expiry(token: &str) -> Duration {
    expires_at(token)
        .map(|exp| exp - Utc::now())
        .filter(|left| *left > Duration::zero())
        .unwrap_or_else(Duration::zero)
}

/// Human-readable remaining lifetime: `"5m 30s"`, `"42s"` or `"Expired"`.
pub fn format_time_until_expiry(token: &str) -> String {
    let left = time_until_expiry(token);
    if left <= Duration::zero() {
        return "Expired".to_string();
    }

    let minutes = left.num_minutes();
    let seconds = left.num_seconds() % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}


#[cfg(test)]
mod tests {
    use super::test_tokens::*;
    use super::*;

    #[test]
    fn test_decode_claims() {
        let token = token_with(serde_json::json!({"sub": "abc", "exp": 100, "iat": 50}));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("abc"));
        assert_eq!(claims.exp, Some(100));
        assert_eq!(claims.iat, Some(50));
        assert_eq!(subject(&token).as_deref(), Some("abc"));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode_claims("").is_none());
        assert!(decode_claims("only.two").is_none());
        assert!(decode_claims("a.b.c.d").is_none());
        assert!(decode_claims("a.!!!.c").is_none());
        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("nope"));
        assert!(decode_claims(&not_json).is_none());
    }

    #[test]
    fn test_decode_tolerates_padding() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"x"}"#);
        let token = format!("h.{}.s", padded);
        assert_eq!(subject(&token).as_deref(), Some("x"));
    }

    #[test]
    fn test_expiry_checks() {
        assert!(!is_expired(&token_expiring_in(3600)));
        assert!(is_expired(&token_expiring_in(-10)));
        assert!(is_expired("garbage"));

        let no_exp = token_with(serde_json::json!({"sub": "x"}));
        assert!(is_expired(&no_exp));
        assert!(!should_refresh(&no_exp, Duration::minutes(5)));
    }

    #[test]
    fn test_should_refresh_threshold() {
        let token = token_expiring_in(120);
        assert!(should_refresh(&token, Duration::minutes(5)));
        assert!(!should_refresh(&token, Duration::seconds(30)));
        assert!(should_refresh(&token_expiring_in(-1), Duration::zero()));
    }

    #[test]
    fn test_time_until_expiry_never_negative() {
        assert_eq!(time_until_expiry(&token_expiring_in(-100)), Duration::zero());
        assert!(time_until_expiry(&token_expiring_in(100)) > Duration::seconds(90));
    }

    #[test]
    fn test_format_time_until_expiry() {
        assert_eq!(format_time_until_expiry(&token_expiring_in(-5)), "Expired");
        assert_eq!(format_time_until_expiry("garbage"), "Expired");

        let long = format_time_until_expiry(&token_expiring_in(330));
        assert!(long.starts_with("5m ") || long.starts_with("4m "), "{}", long);

        let short = format_time_until_expiry(&token_expiring_in(42));
        assert!(short.ends_with('s') && !short.contains('m'), "{}", short);
    }
}
