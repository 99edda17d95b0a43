//! # Cancellation registry - one in-flight validation per uid.
//!
//! The registry maps a uid to the [`CancelSignal`] of its running validator.
//! It is the only structure touched by both the poller and validator tasks.
//!
//! ## Architecture
//! ```text
//! Poller ── register(uid) ──► Some(ValidationGuard) ──► moved into Validator task
//!        └─ register(uid) ──► None   (already pending → duplicate ignored)
//!
//! Poller ── set(uid) / get(uid).cancel() ──► token cancelled
//!                                               │
//! Validator ── signal.is_cancelled() ◄──────────┘  (checkpoint before emitting)
//!
//! Validator exits (any path, panics and aborts included)
//!        └─► ValidationGuard::drop ──► remove(uid)
//! ```
//!
//! ## Rules
//! - At most one entry per uid; duplicates are rejected, not queued.
//! - The entry is removed by the owning guard's `Drop`, so cleanup runs on every exit.
//! - Critical sections are a single map operation under a std mutex; no await while locked.
//!
//! ## Settling
//! A [`CancelSignal`] also carries a one-shot "settled" latch. Whoever settles
//! first (the validator with its verdict, or the poller when the removal
//! grace expires) is the only party allowed to emit the episode's terminal
//! event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::card::Uid;

/// Per-uid cancellation signal with a terminal-emission latch.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug)]
struct SignalInner {
    token: CancellationToken,
    settled: AtomicBool,
}

impl CancelSignal {
    fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                token: CancellationToken::new(),
                settled: AtomicBool::new(false),
            }),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Completes once cancellation was requested.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Claims the right to emit the terminal event. `true` exactly once.
    pub(crate) fn settle(&self) -> bool {
        !self.inner.settled.swap(true, Ordering::AcqRel)
    }

    /// Whether a terminal event was already claimed.
    pub fn is_settled(&self) -> bool {
        self.inner.settled.load(Ordering::Acquire)
    }

    fn same(&self, other: &CancelSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Registry of in-flight validations keyed by uid.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    entries: Mutex<HashMap<Uid, CancelSignal>>,
}

impl CancellationRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uid, CancelSignal>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a fresh signal for `uid`.
    ///
    /// Returns `None` if a validation for `uid` is already in flight.
    pub fn register(self: &Arc<Self>, uid: &Uid) -> Option<ValidationGuard> {
        let signal = {
            let mut entries = self.lock();
            if entries.contains_key(uid) {
                return None;
            }
            let signal = CancelSignal::new();
            entries.insert(uid.clone(), signal.clone());
            signal
        };
        trace!(uid = %uid, "cancellation signal registered");
        Some(ValidationGuard {
            registry: Arc::clone(self),
            uid: uid.clone(),
            signal,
        })
    }

    /// Returns the signal of the in-flight validation for `uid`, if any.
    pub fn get(&self, uid: &Uid) -> Option<CancelSignal> {
        self.lock().get(uid).cloned()
    }

    /// Requests cancellation for `uid`. Returns `false` if nothing is registered.
    pub fn set(&self, uid: &Uid) -> bool {
        match self.get(uid) {
            Some(signal) => {
                signal.cancel();
                true
            }
            None => false,
        }
    }

    /// Deletes the entry for `uid`. Normally only called by [`ValidationGuard`].
    pub fn remove(&self, uid: &Uid) -> bool {
        self.lock().remove(uid).is_some()
    }

    /// True if a validation for `uid` is in flight.
    pub fn is_pending(&self, uid: &Uid) -> bool {
        self.lock().contains_key(uid)
    }

    /// Sorted list of uids with an in-flight validation.
    pub fn pending(&self) -> Vec<Uid> {
        let mut uids: Vec<Uid> = self.lock().keys().cloned().collect();
        uids.sort_unstable();
        uids
    }

    /// Requests cancellation of every in-flight validation.
    pub fn cancel_all(&self) {
        let signals: Vec<CancelSignal> = self.lock().values().cloned().collect();
        for signal in signals {
            signal.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes `uid` only if it still maps to `signal`.
    fn release(&self, uid: &Uid, signal: &CancelSignal) {
        let mut entries = self.lock();
        if entries.get(uid).is_some_and(|s| s.same(signal)) {
            entries.remove(uid);
        }
    }
}

/// Ownership of one registry entry.
///
/// Moved into the validator task; dropping it deletes the entry.
#[derive(Debug)]
pub struct ValidationGuard {
    registry: Arc<CancellationRegistry>,
    uid: Uid,
    signal: CancelSignal,
}

impl ValidationGuard {
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }
}

impl Drop for ValidationGuard {
    fn drop(&mut self) {
        self.registry.release(&self.uid, &self.signal);
        trace!(uid = %self.uid, "cancellation signal released");
    }
}
