//! Reconnect pacing policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how reconnect delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization applied on top of the computed delay
//!
//! ## Quick wiring
//! ```text
//! Config { reconnect: BackoffPolicy, .. }
//!      └─► core::link::ReaderLink uses:
//!           - reconnect.next(failures - 1) to pick the next connect attempt
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
