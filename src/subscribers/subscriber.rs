//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the Notifier boundary: a transport (websocket push,
//! display driver, door relay, ...) implements it to receive monitor events.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::SubscriberPanicked`)
//!
//! ## Rules
//! - A slow subscriber only affects its own queue; the poller never waits for it.
//! - Queue overflow drops the event **for this subscriber only** and publishes
//!   `EventKind::SubscriberOverflow`.
//! - Events are processed sequentially (FIFO) per subscriber.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use cardwatch::{Event, EventKind, Subscribe};
//!
//! struct Door;
//!
//! #[async_trait]
//! impl Subscribe for Door {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::CardSuccess) {
//!             // pulse the relay
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "door" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle delivery errors internally (log and drop); do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, not in the publisher context.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in logs and overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (min 1).
    ///
    /// Default: 256.
    fn queue_capacity(&self) -> usize {
        256
    }
}
