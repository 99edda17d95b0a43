//! # Function-backed validation service (`ValidateFn`)
//!
//! [`ValidateFn`] wraps a closure `F: Fn(Uid) -> Fut`, producing a fresh
//! future per call. Shared state goes into an explicit `Arc<...>` captured
//! by the closure.
//!
//! ## Example
//! ```rust
//! use cardwatch::{ServiceRef, Uid, ValidateFn, ValidationError, ValidationService};
//!
//! let svc: ServiceRef = ValidateFn::arc("even-tail", |uid: Uid| async move {
//!     Ok::<_, ValidationError>(uid.as_str().ends_with('0'))
//! });
//!
//! assert_eq!(svc.name(), "even-tail");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::card::Uid;
use crate::error::ValidationError;
use crate::validation::service::ValidationService;

/// Function-backed validation service.
#[derive(Debug)]
pub struct ValidateFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ValidateFn<F> {
    /// Creates a new function-backed service.
    ///
    /// Prefer [`ValidateFn::arc`] when you immediately need a [`ServiceRef`](crate::ServiceRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the service and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> ValidationService for ValidateFn<F>
where
    F: Fn(Uid) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, ValidationError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, uid: &Uid) -> Result<bool, ValidationError> {
        (self.f)(uid.clone()).await
    }
}
