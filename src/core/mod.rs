//! Runtime core: the card state machine and its lifecycle.
//!
//! Public API: [`CardMonitor`] (with [`MonitorBuilder`] and [`MonitorHandle`]),
//! plus the pieces that are useful on their own: [`CancellationRegistry`],
//! [`Stabilizer`] and [`Validator`].
//!
//! Internal modules:
//! - [`poller`]: the control loop that owns the reader and runs detection episodes;
//! - [`link`]: reader connection bookkeeping (backoff, availability, reinit);
//! - [`stabilizer`]: debounce of a freshly observed uid;
//! - [`validator`]: one validation call with timeout, panic isolation and settle arbitration;
//! - [`registry`]: one in-flight validation per uid;
//! - [`monitor`]: wiring and graceful shutdown;
//! - [`shutdown`]: OS termination signals.

mod builder;
mod handle;
mod link;
mod monitor;
mod poller;
mod registry;
mod shutdown;
mod stabilizer;
mod validator;

pub use builder::MonitorBuilder;
pub use handle::MonitorHandle;
pub use monitor::CardMonitor;
pub use registry::{CancelSignal, CancellationRegistry, ValidationGuard};
pub use stabilizer::{Sampler, Stabilizer, Verdict};
pub use validator::Validator;

/// Progress values of one episode.
pub(crate) mod progress {
    pub const DETECTED: u8 = 10;
    pub const STABLE: u8 = 40;
    pub const VALIDATING: u8 = 60;
    pub const DONE: u8 = 100;
}
