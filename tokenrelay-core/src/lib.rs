//! # tokenrelay core
//!
//! Leaf types shared by the tokenrelay HTTP client:
//! - Secret storage backends and the Credential Store Adapter
//! - The Session State Sink that receives forced-logout signals
//! - The Endpoint Exemption Set for authentication-flow endpoints
//! - Unverified JWT claim helpers for expiry and subject lookups
//!
//! ## Quick Start
//!
//! ```rust
//! use tokenrelay_core::{CredentialPair, CredentialStore, MemoryStore, SecretCredentialStore};
//!
//! # async fn example() -> Result<(), tokenrelay_core::StoreError> {
//! let store = SecretCredentialStore::new(MemoryStore::new(), "default");
//! store.set_credentials(&CredentialPair::new("access", "refresh")).await?;
//! assert!(store.access_token().await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod credentials;
pub mod endpoint;
pub mod session;
pub mod store;

// Re-export commonly used types at crate root
pub use credentials::{CredentialPair, CredentialStore, SecretCredentialStore};

pub use endpoint::{AuthRoutes, ExemptionSet};

pub use session::{SessionSink, SessionState, SessionStatus};

pub use store::{FileStore, MemoryStore, Secret, SecretStore, StoreBackend, StoreError, create_store};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;
