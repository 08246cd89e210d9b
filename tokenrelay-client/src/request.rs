//! Outgoing request description.
//!
//! An [`ApiRequest`] is plain data: it can be inspected by the augmenter and
//! classifier, kept while a renewal is outstanding, and replayed verbatim.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

/// Transport channel a request travels on.
///
/// Both channels share the remote renewal endpoint and one refresh
/// coordinator; each keeps its own default headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// JSON request and response bodies.
    Json,
    /// `multipart/form-data` uploads.
    Multipart,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Json, Channel::Multipart];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Multipart => "multipart",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Json => 0,
            Self::Multipart => 1,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }

    pub fn file(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::File {
                file_name: file_name.into(),
                content_type: None,
                bytes,
            },
        }
    }

    /// Set the MIME type of a file part. No effect on text parts.
    pub fn with_content_type(mut self, mime: impl Into<String>) -> Self {
        if let FormValue::File { content_type, .. } = &mut self.value {
            *content_type = Some(mime.into());
        }
        self
    }
}

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormPart>),
}

/// A request as the client will send it, and as it will be replayed.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Correlates log lines for a request and its replay.
    pub id: Uuid,
    pub channel: Channel,
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/api/v1/courses`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: Channel::Json,
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Send a JSON body on the JSON channel.
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.channel = Channel::Json;
        self.body = RequestBody::Json(body);
        self
    }

    /// Send a multipart body on the multipart channel.
    pub fn with_multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.channel = Channel::Multipart;
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this request has already been replayed once after a renewal.
    pub fn is_retry(&self) -> bool {
        self.retried
    }

    /// Set the retry marker. Set before a replay is issued, never cleared.
    pub(crate) fn mark_retry(&mut self) {
        self.retried = true;
    }
}
