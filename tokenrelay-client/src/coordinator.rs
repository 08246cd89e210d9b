//! Refresh Coordinator: single-flight credential renewal with a FIFO waiter queue.
//!
//! The first failed request to arrive becomes the leader and performs the
//! renewal; every request that fails while a renewal is outstanding is
//! queued and settled with the leader's outcome, in arrival order.
//!
//! The check-and-set of `is_refreshing` happens under one mutex, so admission
//! is single-flight on any runtime flavor. Settling takes the whole queue and
//! clears the flag in the same critical section; the waiters are then
//! notified after the lock is released.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokenrelay_core::Secret;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::RenewalError;

/// Outcome delivered to the leader's caller and to every waiter.
pub type RenewalOutcome = Result<Secret, RenewalError>;

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<RenewalOutcome>,
}

#[derive(Default)]
struct RefreshState {
    is_refreshing: bool,
    waiters: VecDeque<Waiter>,
    /// Bumped by [`RefreshCoordinator::reset`]; a leader from an older
    /// generation no longer owns the state.
    generation: u64,
    next_ticket: u64,
}

/// Single-flight renewal gate shared by every channel of a client.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

/// Result of [`RefreshCoordinator::admit`].
pub enum Admission<'a> {
    /// The caller must perform the renewal and settle the guard.
    Leader(LeaderGuard<'a>),
    /// A renewal is already outstanding; await its outcome.
    Waiter(WaitHandle),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the current renewal, or start one.
    pub fn admit(&self) -> Admission<'_> {
        let mut state = self.state.lock();
        if state.is_refreshing {
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { ticket, tx });
            trace!(ticket, queued = state.waiters.len(), "Renewal in flight, request queued");
            return Admission::Waiter(WaitHandle { ticket, rx });
        }

        state.is_refreshing = true;
        debug!(generation = state.generation, "Starting credential renewal");
        Admission::Leader(LeaderGuard {
            coordinator: self,
            generation: state.generation,
            settled: false,
        })
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().is_refreshing
    }

    /// Number of requests waiting on the outstanding renewal.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Abort the outstanding renewal, if any, on logout.
    ///
    /// Pending waiters are rejected with [`RenewalError::SessionReset`] and the
    /// current leader loses ownership: its later settle is a no-op and
    /// [`LeaderGuard::is_current`] turns false. Returns the number of waiters
    /// rejected.
    pub fn reset(&self) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.is_refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        let count = waiters.len();
        if count > 0 {
            debug!(count, "Rejecting queued requests after session reset");
        }
        for waiter in waiters {
            let _ = waiter.tx.send(Err(RenewalError::SessionReset));
        }
        count
    }

    /// Release every waiter with `outcome` if `generation` still owns the state.
    fn settle(&self, generation: u64, outcome: &RenewalOutcome) -> Vec<u64> {
        let waiters = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Vec::new();
            }
            state.is_refreshing = false;
            std::mem::take(&mut state.waiters)
        };

        let mut released = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            released.push(waiter.ticket);
            // A receiver that was dropped has nobody left to tell.
            let _ = waiter.tx.send(outcome.clone());
        }
        released
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("is_refreshing", &state.is_refreshing)
            .field("waiting", &state.waiters.len())
            .field("generation", &state.generation)
            .finish()
    }
}

/// Held by the request performing the renewal.
///
/// Dropping the guard without settling rejects every waiter with
/// [`RenewalError::Abandoned`].
pub struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    generation: u64,
    settled: bool,
}

impl LeaderGuard<'_> {
    /// False once the session was reset after this renewal started.
    pub fn is_current(&self) -> bool {
        self.coordinator.state.lock().generation == self.generation
    }

    /// Release all waiters with the new access token, in arrival order.
    /// Returns their tickets in release order.
    pub fn resolve(mut self, access_token: Secret) -> Vec<u64> {
        self.settled = true;
        self.coordinator.settle(self.generation, &Ok(access_token))
    }

    /// Reject all waiters with `error`, in arrival order.
    pub fn reject(mut self, error: RenewalError) -> Vec<u64> {
        self.settled = true;
        self.coordinator.settle(self.generation, &Err(error))
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Renewal leader dropped before settling");
            self.coordinator
                .settle(self.generation, &Err(RenewalError::Abandoned));
        }
    }
}

/// A queued request's view of the outstanding renewal.
pub struct WaitHandle {
    ticket: u64,
    rx: oneshot::Receiver<RenewalOutcome>,
}

impl WaitHandle {
    /// Position in the queue; lower tickets are released first.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Suspend until the leader settles.
    pub async fn wait(self) -> RenewalOutcome {
        // The sender is only dropped unsent if the coordinator itself is gone.
        self.rx.await.unwrap_or(Err(RenewalError::Abandoned))
    }
}
