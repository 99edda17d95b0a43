//! # Validation service abstractions.
//!
//! - [`ValidationService`] - async yes/no authorization check for one uid
//! - [`ValidateFn`] - closure-backed implementation
//! - [`ServiceRef`] - shared handle (`Arc<dyn ValidationService>`)
//! - [`HttpValidator`] - form-post implementation (feature `http`)

mod service;
mod service_fn;

#[cfg(feature = "http")]
mod http;

pub use service::{ServiceRef, ValidationService};
pub use service_fn::ValidateFn;

#[cfg(feature = "http")]
pub use http::{HttpValidator, HttpValidatorConfig};
