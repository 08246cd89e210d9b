//! Retry Dispatcher: replays a request once with a renewed credential.

use reqwest::header::AUTHORIZATION;
use tokenrelay_core::Secret;
use tracing::debug;

use crate::augment::bearer_header;
use crate::error::HttpError;
use crate::request::ApiRequest;
use crate::response::ApiResponse;
use crate::transport::Transport;

/// Re-issue `request` with `Bearer <access_token>` and return its outcome.
///
/// The retry marker is set before sending and the result is final: a replay
/// that fails, even with 401, is handed back as is.
pub async fn replay(
    transport: &dyn Transport,
    mut request: ApiRequest,
    access_token: &Secret,
) -> Result<ApiResponse, HttpError> {
    let header = bearer_header(access_token)
        .ok_or_else(|| HttpError::invalid_request("renewed access token is not a valid header value"))?;
    request.headers.insert(AUTHORIZATION, header);
    request.mark_retry();

    debug!(request_id = %request.id, method = %request.method, path = %request.path, "Replaying request with renewed credential");
    transport.send(&request).await
}
