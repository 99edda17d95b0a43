//! Error types used by the cardwatch runtime and its collaborators.
//!
//! - [`RuntimeError`] - errors raised by the monitor runtime itself.
//! - [`ValidationError`] - failures of a validation service call (always fail-closed).
//! - [`ReaderError`] - failures reported by a reader adapter (never surfaced as events).
//! - [`UidError`] - malformed card identifiers.
//! - [`SessionError`] - illegal card state machine transitions.
//!
//! Every enum provides `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::card::CardState;

/// # Errors produced by the monitor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some validations were still in flight and were aborted.
    #[error("shutdown timeout {grace:?} exceeded; pending: {pending:?}; aborting validators")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Uids whose validation did not finish in time.
        pending: Vec<String>,
    },

    /// [`CardMonitor::run`](crate::CardMonitor::run) was called more than once.
    #[error("monitor is already running")]
    AlreadyRunning,

    /// The poller task died outside of its per-tick fault boundary.
    #[error("poller terminated unexpectedly: {info}")]
    PollerPanicked {
        /// Join error details.
        info: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use cardwatch::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), pending: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::AlreadyRunning => "runtime_already_running",
            RuntimeError::PollerPanicked { .. } => "runtime_poller_panicked",
        }
    }
}

/// # Errors produced by a validation service call.
///
/// Any of these is classified **fail-closed**: the card is treated as not
/// authorized, but reported as `card_validation_error` rather than
/// `card_unauthorized`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The call did not complete within the configured timeout.
    #[error("validation timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Network or transport failure talking to the service.
    #[error("transport failure: {error}")]
    Transport {
        /// The underlying error message.
        error: String,
    },

    /// The service client could not be constructed.
    #[error("client setup failed: {error}")]
    Client {
        /// The underlying error message.
        error: String,
    },

    /// The service implementation panicked.
    #[error("validation service panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl ValidationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use cardwatch::ValidationError;
    /// use std::time::Duration;
    ///
    /// let err = ValidationError::Timeout { timeout: Duration::from_secs(3) };
    /// assert_eq!(err.as_label(), "validation_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ValidationError::Timeout { .. } => "validation_timeout",
            ValidationError::Transport { .. } => "validation_transport",
            ValidationError::Client { .. } => "validation_client",
            ValidationError::Panicked { .. } => "validation_panicked",
        }
    }
}

/// # Errors reported by a reader adapter.
///
/// The poller never turns these into card events: a failing reader simply
/// yields "no card" for that sample.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    /// No reader device is attached or it refused the connection.
    #[error("reader unavailable: {reason}")]
    Unavailable {
        /// Human-readable reason.
        reason: String,
    },

    /// I/O failure while talking to the device.
    #[error("reader i/o error: {error}")]
    Io {
        /// The underlying error message.
        error: String,
    },

    /// The device answered with an unexpected status word or frame.
    #[error("reader protocol error: {detail}")]
    Protocol {
        /// Protocol detail (status bytes, frame dump, ...).
        detail: String,
    },
}

impl ReaderError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReaderError::Unavailable { .. } => "reader_unavailable",
            ReaderError::Io { .. } => "reader_io",
            ReaderError::Protocol { .. } => "reader_protocol",
        }
    }
}

/// # Malformed card identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UidError {
    /// Input contained no hex digits.
    #[error("uid is empty")]
    Empty,

    /// Input contained a character that is neither a hex digit nor a separator.
    #[error("uid {input:?} is not hexadecimal")]
    InvalidHex {
        /// The rejected input.
        input: String,
    },
}

/// # Illegal card state machine transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition { from: CardState, to: CardState },
}
