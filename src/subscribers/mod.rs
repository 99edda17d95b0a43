//! # Event subscribers (the Notifier boundary).
//!
//! ## Architecture
//! ```text
//! Poller / Validator ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                        │
//!                                                  SubscriberSet::emit
//!                                               ┌────────┼────────┐
//!                                               ▼        ▼        ▼
//!                                           LogWriter  Socket   Custom ...
//! ```
//!
//! Delivery is best-effort: a slow or failing subscriber loses events, the
//! poller never notices.

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;

pub(crate) use subscriber_set::panic_message;
