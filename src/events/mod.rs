//! Monitor events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the poller, validators, the
//! monitor runtime and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification, metadata and JSON payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Poller`, `Validator`, `CardMonitor`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `CardMonitor::subscriber_listener()` (fans out to `SubscriberSet`),
//!   and any raw receiver from [`MonitorHandle::subscribe`](crate::MonitorHandle::subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
