//! Session Teardown.

use reqwest::header::AUTHORIZATION;
use tokenrelay_core::{CredentialStore, SessionSink};
use tracing::{error, warn};

use crate::augment::ChannelDefaults;

/// End the session after an unrecoverable renewal failure or a logout.
///
/// Clears the stored credential pair (shared by every channel), drops the
/// default `Authorization` header on every channel and signals the session
/// sink. Safe to call repeatedly.
pub async fn teardown(
    store: &dyn CredentialStore,
    defaults: &ChannelDefaults,
    sink: &dyn SessionSink,
) {
    if let Err(e) = store.clear_credentials().await {
        error!("Failed to clear stored credentials: {}", e);
    }
    defaults.remove_all(&AUTHORIZATION);
    sink.force_logout();
    warn!("Session torn down, sign-in required");
}
