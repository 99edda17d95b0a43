//! # Validator: one validation call for one episode.
//!
//! Runs the validation service for a single uid with a timeout and panic
//! isolation, then emits **at most one** terminal event.
//!
//! ## Event flow
//!
//! ```text
//! card_progress(60)
//!   └─► service.validate(uid)       (bounded by timeout, panics caught)
//!         │
//!         ├─ token cancelled? ─► settle ─► card_processing_cancelled (unless the poller already sent it)
//!         │
//!         └─ settle won? ─┬─ Ok(true)  ─► card_progress(100), card_success
//!                         ├─ Ok(false) ─► card_progress(100), card_unauthorized
//!                         └─ Err(e)    ─► card_progress(100), card_validation_error  (fail-closed)
//!
//! guard dropped last ─► registry entry removed
//! ```
//!
//! ## Rules
//! - Cancellation is cooperative: an in-flight call is never aborted, its answer is discarded.
//! - No success/unauthorized after the token was observed cancelled.
//! - Errors are logged distinctly from denials so operators can tell network trouble from policy.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::card::{Uid, ValidationOutcome, ValidationResult};
use crate::core::progress;
use crate::core::registry::{CancelSignal, ValidationGuard};
use crate::error::ValidationError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::panic_message;
use crate::validation::ServiceRef;

/// Executes validation episodes against one service.
#[derive(Clone)]
pub struct Validator {
    service: ServiceRef,
    bus: Bus,
    timeout: Duration,
}

impl Validator {
    pub fn new(service: ServiceRef, bus: Bus, timeout: Duration) -> Self {
        Self {
            service,
            bus,
            timeout,
        }
    }

    /// Runs one episode. The guard is released as the very last step.
    pub async fn run(self, guard: ValidationGuard) -> ValidationOutcome {
        let uid = guard.uid().clone();
        self.bus.publish(
            Event::new(EventKind::CardProgress)
                .with_uid(uid.clone())
                .with_progress(progress::VALIDATING),
        );

        let verdict = self.call(&uid).await;
        let outcome = self.conclude(&uid, guard.signal(), verdict);

        drop(guard);
        outcome
    }

    async fn call(&self, uid: &Uid) -> Result<bool, ValidationError> {
        debug!(uid = %uid, service = self.service.name(), "validating");
        let fut = AssertUnwindSafe(self.service.validate(uid)).catch_unwind();
        match time::timeout(self.timeout, fut).await {
            Ok(Ok(res)) => res,
            Ok(Err(panic_err)) => Err(ValidationError::Panicked {
                info: panic_message(&*panic_err),
            }),
            Err(_elapsed) => Err(ValidationError::Timeout {
                timeout: self.timeout,
            }),
        }
    }

    fn conclude(
        &self,
        uid: &Uid,
        signal: &CancelSignal,
        verdict: Result<bool, ValidationError>,
    ) -> ValidationOutcome {
        if signal.is_cancelled() {
            if signal.settle() {
                self.publish(EventKind::CardProcessingCancelled, uid, None);
            }
            info!(uid = %uid, "card removed during validation; result discarded");
            return ValidationOutcome::new(uid.clone(), ValidationResult::Cancelled);
        }
        if !signal.settle() {
            // the poller closed this episode first
            return ValidationOutcome::new(uid.clone(), ValidationResult::Cancelled);
        }

        let (kind, result, reason) = match verdict {
            Ok(true) => {
                info!(uid = %uid, "card is valid");
                (EventKind::CardSuccess, ValidationResult::Valid, None)
            }
            Ok(false) => {
                warn!(uid = %uid, "card is not authorized");
                (EventKind::CardUnauthorized, ValidationResult::Invalid, None)
            }
            Err(e) => {
                error!(uid = %uid, label = e.as_label(), error = %e, "validation failed; failing closed");
                let message = e.to_string();
                (
                    EventKind::CardValidationError,
                    ValidationResult::Error {
                        message: message.clone(),
                    },
                    Some(message),
                )
            }
        };

        self.bus.publish(
            Event::new(EventKind::CardProgress)
                .with_uid(uid.clone())
                .with_progress(progress::DONE),
        );
        self.publish(kind, uid, reason);
        ValidationOutcome::new(uid.clone(), result)
    }

    fn publish(&self, kind: EventKind, uid: &Uid, reason: Option<String>) {
        let mut ev = Event::new(kind).with_uid(uid.clone());
        if let Some(reason) = reason {
            ev = ev.with_reason(reason);
        }
        self.bus.publish(ev);
    }
}
