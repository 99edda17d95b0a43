//! # Validation service abstraction.
//!
//! A [`ValidationService`] answers one question: is this uid authorized?
//! The [`Validator`](crate::Validator) wraps every call with a timeout and panic
//! isolation, so implementations only report what the remote side said.

use std::sync::Arc;

use async_trait::async_trait;

use crate::card::Uid;
use crate::error::ValidationError;

/// Shared handle to a validation service.
pub type ServiceRef = Arc<dyn ValidationService>;

/// # External yes/no authorization check.
///
/// - `Ok(true)`  → `card_success`
/// - `Ok(false)` → `card_unauthorized`
/// - `Err(_)`    → `card_validation_error` (fail-closed)
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use cardwatch::{Uid, ValidationError, ValidationService};
///
/// struct AllowList(Vec<Uid>);
///
/// #[async_trait]
/// impl ValidationService for AllowList {
///     fn name(&self) -> &str { "allow-list" }
///
///     async fn validate(&self, uid: &Uid) -> Result<bool, ValidationError> {
///         Ok(self.0.contains(uid))
///     }
/// }
/// ```
#[async_trait]
pub trait ValidationService: Send + Sync + 'static {
    /// Returns a stable, human-readable service name.
    fn name(&self) -> &str {
        "validation"
    }

    /// Asks the service about `uid`.
    ///
    /// Cancellation is cooperative: the call is never aborted when the card
    /// leaves, its answer is just discarded.
    async fn validate(&self, uid: &Uid) -> Result<bool, ValidationError>;
}
