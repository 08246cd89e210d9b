//! tokenrelay client
//!
//! An HTTP client for APIs that issue short-lived bearer access tokens
//! alongside a long-lived refresh token. Every request carries the current
//! access token; when the server answers 401, the client renews the pair once,
//! no matter how many requests failed at the same time, and replays each
//! failed request once with the new token.
//!
//! # Overview
//!
//! - **Request Augmenter** ([`augment`]): attaches `Authorization: Bearer ..`,
//!   or removes it for authentication endpoints and signed-out sessions
//! - **Classifier** ([`classify`]): decides whether a failure is renewable
//! - **Refresh Coordinator** ([`coordinator`]): single-flight renewal with a
//!   FIFO queue of waiting requests
//! - **Retry Dispatcher** ([`dispatch`]): replays a request at most once
//! - **Session Teardown** ([`teardown`]): clears credentials and signals a
//!   forced logout when renewal fails
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokenrelay_client::{ApiClient, ClientConfig};
//! use tokenrelay_core::{CredentialPair, MemoryStore, SecretCredentialStore, SessionState};
//!
//! #[tokio::main]
//! async fn main() -> tokenrelay_client::Result<()> {
//!     let store = Arc::new(SecretCredentialStore::new(MemoryStore::new(), "default"));
//!     let session = Arc::new(SessionState::new());
//!     let client = ApiClient::new(
//!         ClientConfig::new("https://api.example.com"),
//!         store,
//!         session.clone(),
//!     )?;
//!
//!     client
//!         .establish_session(CredentialPair::new("access", "refresh"), "user-42")
//!         .await?;
//!
//!     let me: serde_json::Value = client.get_json("/api/v1/accounts/me").await?;
//!     println!("{me}");
//!
//!     if session.is_logged_out() {
//!         eprintln!("Session expired, please sign in again");
//!     }
//!     Ok(())
//! }
//! ```

pub mod augment;
pub mod classify;
mod client;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod renewal;
pub mod request;
pub mod response;
pub mod teardown;
pub mod transport;

pub use client::ApiClient;

pub use augment::ChannelDefaults;
pub use classify::Classification;
pub use config::ClientConfig;
pub use coordinator::RefreshCoordinator;
pub use error::{ClientError, ErrorKind, HttpError, RenewalError, Result};
pub use request::{ApiRequest, Channel, FormPart, FormValue, RequestBody};
pub use response::ApiResponse;
pub use transport::{ReqwestTransport, Transport};
