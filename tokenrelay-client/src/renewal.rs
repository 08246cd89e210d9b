//! Wire contract of the remote token-refresh endpoint.
//!
//! Request: `POST {refresh_token route}` with `{"userId": .., "refreshToken": ..}`.
//! Response: both `data.tokens.accessToken` and `data.tokens.refreshToken` must
//! be present and non-empty; anything else is a failed renewal.

use serde::{Deserialize, Serialize};
use tokenrelay_core::{CredentialPair, Secret};

use crate::error::{HttpError, RenewalError};
use crate::request::ApiRequest;
use crate::response::ApiResponse;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenewalRequest<'a> {
    user_id: &'a str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RenewalResponse {
    data: Option<RenewalData>,
}

#[derive(Debug, Deserialize)]
struct RenewalData {
    tokens: Option<RenewalTokens>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewalTokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Build the renewal call for `path`.
pub fn build_renewal_request(
    path: &str,
    user_id: &str,
    refresh_token: &Secret,
) -> Result<ApiRequest, RenewalError> {
    let body = serde_json::to_value(RenewalRequest {
        user_id,
        refresh_token: refresh_token.expose(),
    })
    .map_err(|e| RenewalError::Transport(HttpError::invalid_request(e.to_string())))?;
    Ok(ApiRequest::post(path).with_json(body))
}

/// Extract the new credential pair from a renewal response.
pub fn parse_renewal_response(response: &ApiResponse) -> Result<CredentialPair, RenewalError> {
    let parsed: RenewalResponse = response.json().map_err(|e| RenewalError::InvalidResponse {
        message: format!("malformed body: {}", e),
    })?;

    let tokens = parsed
        .data
        .and_then(|data| data.tokens)
        .ok_or_else(|| invalid("missing data.tokens"))?;

    let access = non_empty(tokens.access_token).ok_or_else(|| invalid("missing accessToken"))?;
    let refresh = non_empty(tokens.refresh_token).ok_or_else(|| invalid("missing refreshToken"))?;

    Ok(CredentialPair::new(access, refresh))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn invalid(message: &str) -> RenewalError {
    RenewalError::InvalidResponse {
        message: message.to_string(),
    }
}
