//! Session State Sink.
//!
//! The refresh layer reads the signed-in user's identifier from here and
//! reports a forced logout here; the surrounding application subscribes to
//! the logout signal to send the user back to a sign-in surface.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Whether the session is still usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    LoggedOut,
}

/// Consumer/producer interface for application session state.
pub trait SessionSink: Send + Sync {
    /// Identifier of the authenticated user, if known.
    fn current_user_id(&self) -> Option<String>;

    /// Record a sign-in for `user_id` and mark the session active.
    fn sign_in(&self, user_id: &str);

    /// Mark the session logged out. Must be idempotent.
    fn force_logout(&self);
}

/// In-process session state with a logout broadcast.
///
/// # Example
///
/// ```
/// use tokenrelay_core::session::{SessionSink, SessionState, SessionStatus};
///
/// let session = SessionState::new();
/// session.establish("user-42");
/// let mut updates = session.subscribe();
///
/// session.force_logout();
/// assert_eq!(*updates.borrow_and_update(), SessionStatus::LoggedOut);
/// ```
pub struct SessionState {
    user_id: RwLock<Option<String>>,
    status: watch::Sender<SessionStatus>,
}

impl SessionState {
    /// A session with no user and `Active` status.
    pub fn new() -> Self {
        let (status, _) = watch::channel(SessionStatus::Active);
        Self {
            user_id: RwLock::new(None),
            status,
        }
    }

    /// Record a successful sign-in: sets the user id and clears the logout flag.
    pub fn establish(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        tracing::info!("Session established for user {}", user_id);
        *self.user_id.write() = Some(user_id);
        self.status.send_replace(SessionStatus::Active);
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_logged_out(&self) -> bool {
        self.status() == SessionStatus::LoggedOut
    }

    /// Receive status changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("user_id", &*self.user_id.read())
            .field("status", &self.status())
            .finish()
    }
}

impl SessionSink for SessionState {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.read().clone().filter(|id| !id.is_empty())
    }

    fn sign_in(&self, user_id: &str) {
        self.establish(user_id);
    }

    fn force_logout(&self) {
        let changed = self.status.send_if_modified(|status| {
            if *status == SessionStatus::LoggedOut {
                false
            } else {
                *status = SessionStatus::LoggedOut;
                true
            }
        });
        if changed {
            tracing::warn!("Session forcibly logged out");
            *self.user_id.write() = None;
        }
    }
}
