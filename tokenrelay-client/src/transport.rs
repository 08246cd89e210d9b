//! Transport seam.
//!
//! The wire itself belongs to the surrounding application; the refresh layer
//! only needs "send this request, tell me what happened" with failures already
//! classified into [`HttpError`]. [`ReqwestTransport`] is the production
//! implementation; tests substitute scripted transports.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use url::Url;

use crate::error::HttpError;
use crate::request::{ApiRequest, FormPart, FormValue, RequestBody};
use crate::response::ApiResponse;

/// Sends one request and returns a success response or a typed failure.
///
/// Implementations must return `Err` for every non-2xx status, using
/// [`HttpError::from_status`] so 401 is recognizable.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, HttpError>;
}

/// [`Transport`] over a `reqwest::Client` and a base URL.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Use a preconfigured client (timeouts, proxies, TLS roots).
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append `path` to the base URL, keeping any path prefix the base has.
    fn url_for(&self, path: &str) -> Result<Url, HttpError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path))
            .map_err(|e| HttpError::invalid_request(format!("invalid path {:?}: {}", path, e)))
    }
}

fn build_form(parts: &[FormPart]) -> Result<Form, HttpError> {
    let mut form = Form::new();
    for part in parts {
        form = match &part.value {
            FormValue::Text(value) => form.text(part.name.clone(), value.clone()),
            FormValue::File {
                file_name,
                content_type,
                bytes,
            } => {
                let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = content_type {
                    file = file.mime_str(mime).map_err(|e| {
                        HttpError::invalid_request(format!("invalid content type {:?}: {}", mime, e))
                    })?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, HttpError> {
        let url = self.url_for(&request.path)?;

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        let response = builder.send().await.map_err(|e| {
            HttpError::network(format!("{} {} failed: {}", request.method, request.path, e))
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            HttpError::network(format!("reading response of {} failed: {}", request.path, e))
        })?;

        if !status.is_success() {
            return Err(HttpError::from_status(
                status.as_u16(),
                String::from_utf8_lossy(&body),
            ));
        }

        Ok(ApiResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
