//! # Per-slot card state machine.
//!
//! ```text
//! IDLE ─► DETECTED ─► STABILIZING ─┬─► VALIDATING ─┬─► VALID ──────┐
//!                        ▲   │     │               ├─► INVALID ────┤
//!                        └───┘     │               ├─► ERROR ──────┼─► IDLE
//!                      (retarget)  │               └─► CANCELLED ──┤
//!                                  └─► CANCELLED ──────────────────┘
//! ```
//!
//! ## Rules
//! - Terminal states (`Valid`, `Invalid`, `Error`, `Cancelled`) only lead back to `Idle`.
//! - A [`CardSession`] lives from detection to its terminal state; the poller
//!   drops it as soon as the terminal event is out.

use std::time::SystemTime;

use crate::card::Uid;
use crate::error::SessionError;

/// States of one card slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardState {
    Idle,
    Detected,
    Stabilizing,
    Validating,
    Valid,
    Invalid,
    Error,
    Cancelled,
}

impl CardState {
    /// True for the four single-emission end states.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CardState::Valid | CardState::Invalid | CardState::Error | CardState::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: CardState) -> bool {
        use CardState::*;
        match (self, next) {
            (Idle, Detected) => true,
            (Detected, Stabilizing) => true,
            (Stabilizing, Stabilizing | Validating | Cancelled) => true,
            (Validating, Valid | Invalid | Error | Cancelled) => true,
            (s, Idle) => s.is_terminal(),
            _ => false,
        }
    }
}

/// Verdict of one validation episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The service said the card is authorized.
    Valid,
    /// The service said the card is not authorized.
    Invalid,
    /// The card was removed before a verdict could be emitted.
    Cancelled,
    /// The call failed or timed out (fail-closed).
    Error { message: String },
}

impl ValidationResult {
    /// The terminal [`CardState`] this verdict maps to.
    pub fn state(&self) -> CardState {
        match self {
            ValidationResult::Valid => CardState::Valid,
            ValidationResult::Invalid => CardState::Invalid,
            ValidationResult::Cancelled => CardState::Cancelled,
            ValidationResult::Error { .. } => CardState::Error,
        }
    }

    /// Fail-closed view: only `Valid` grants access.
    #[inline]
    pub fn is_authorized(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Result of one validator run. Produced once per episode.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub uid: Uid,
    pub result: ValidationResult,
    pub at: SystemTime,
}

impl ValidationOutcome {
    pub fn new(uid: Uid, result: ValidationResult) -> Self {
        Self {
            uid,
            result,
            at: SystemTime::now(),
        }
    }
}

/// The single active detection episode.
#[derive(Debug, Clone)]
pub struct CardSession {
    uid: Uid,
    state: CardState,
    created_at: SystemTime,
}

impl CardSession {
    /// Starts a session in [`CardState::Detected`].
    pub fn detected(uid: Uid) -> Self {
        Self {
            uid,
            state: CardState::Detected,
            created_at: SystemTime::now(),
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn state(&self) -> CardState {
        self.state
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Moves to `next`, rejecting edges the state machine does not have.
    pub fn advance(&mut self, next: CardState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Swaps the candidate card while stabilizing (badge swap, not removal).
    pub fn retarget(&mut self, uid: Uid) -> Result<(), SessionError> {
        self.advance(CardState::Stabilizing)?;
        self.uid = uid;
        Ok(())
    }
}
