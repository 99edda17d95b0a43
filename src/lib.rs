//! # cardwatch
//!
//! **Cardwatch** watches a proximity-card reader, debounces what it reads and
//! drives a cancellable remote authorization check for every card that is
//! presented.
//!
//! The crate is the detection/validation core only. Hardware access
//! ([`CardReader`]), the authorization check ([`ValidationService`]) and the
//! transport that pushes events to clients ([`Subscribe`]) are plugged in.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐                              ┌──────────────────────┐
//!   │  CardReader  │◄──── owned exclusively ──────┤ Poller (1 task)      │
//!   └──────────────┘                              │  - ReaderLink        │
//!                                                 │  - Stabilizer        │
//!                                                 │  - tracked uid       │
//!                                                 └───┬──────────┬───────┘
//!                               register(uid) / cancel│          │ spawn
//!                                                     ▼          ▼
//!                                  ┌──────────────────────┐  ┌──────────────────┐
//!                                  │ CancellationRegistry │◄─┤ Validator (0..1) │──► ValidationService
//!                                  └──────────────────────┘  └────────┬─────────┘
//!                                                                     │
//!        Poller ─────────── publish(Event) ──────────────┐            │
//!                                                        ▼            ▼
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                            │
//! └──────────────────────────────────┬────────────────────────────────────────┘
//!                                    ▼
//!                        ┌────────────────────────┐
//!                        │  subscriber_listener   │
//!                        │   (in CardMonitor)     │
//!                        └───────────┬────────────┘
//!                                    ▼
//!                              SubscriberSet
//!                         ┌──────────┼──────────┐
//!                         ▼          ▼          ▼
//!                      worker1    worker2    workerN
//!                         ▼          ▼          ▼
//!                    sub1.on    sub2.on    subN.on
//!                     _event()   _event()   _event()
//! ```
//!
//! ### Episode
//! ```text
//! IDLE ─► DETECTED ─► STABILIZING ─► VALIDATING ─► VALID | INVALID | ERROR ─► IDLE
//!                          │              │
//!                          └──────────────┴──────► CANCELLED ─► IDLE
//!
//! card_processing ─► card_progress(10, 40, 60, 100) ─► exactly one of
//!   card_success | card_unauthorized | card_validation_error | card_processing_cancelled
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Runtime**       | Poll loop, graceful shutdown, control handle.                 | [`CardMonitor`], [`MonitorHandle`]              |
//! | **Reader**        | Hardware boundary, reconnect pacing.                          | [`CardReader`], [`BackoffPolicy`]               |
//! | **Validation**    | Yes/no authorization check, fail-closed on errors.            | [`ValidationService`], [`ValidateFn`]           |
//! | **Cancellation**  | One in-flight validation per uid, cooperative cancel.         | [`CancellationRegistry`], [`CancelSignal`]      |
//! | **Notifier**      | Best-effort event delivery to transports.                     | [`Subscribe`], [`Event`], [`EventKind`]         |
//! | **Errors**        | Typed errors with stable labels.                              | [`RuntimeError`], [`ValidationError`]           |
//! | **Configuration** | Every timing knob in one struct.                              | [`Config`]                                      |
//!
//! ## Optional features
//! - `http` (default): [`HttpValidator`], a form-post validation service on `reqwest`.
//! - `logging`: exports a built-in [`LogWriter`] subscriber that writes events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use cardwatch::{CardMonitor, CardReader, Config, ReaderError, Uid, ValidateFn, ValidationError};
//!
//! /// A reader with one card lying on it.
//! struct Desk(Uid);
//!
//! #[async_trait]
//! impl CardReader for Desk {
//!     async fn connect(&mut self) -> Result<(), ReaderError> { Ok(()) }
//!     async fn read_uid(&mut self) -> Result<Option<Uid>, ReaderError> {
//!         Ok(Some(self.0.clone()))
//!     }
//!     async fn close(&mut self) {}
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn cardwatch::Subscribe>> = vec![Arc::new(cardwatch::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn cardwatch::Subscribe>> = Vec::new();
//!
//!     let monitor = CardMonitor::builder(Config::default())
//!         .with_subscribers(subs)
//!         .build();
//!     let handle = monitor.handle();
//!     let mut events = handle.subscribe();
//!
//!     let service = ValidateFn::arc("allow-list", |uid: Uid| async move {
//!         Ok::<_, ValidationError>(uid.as_str() == "04A1B2C3")
//!     });
//!
//!     tokio::spawn(async move {
//!         while let Ok(ev) = events.recv().await {
//!             if ev.kind.is_terminal() {
//!                 println!("{} {}", ev.name(), ev.payload());
//!                 handle.stop();
//!             }
//!         }
//!     });
//!
//!     let card = Uid::parse("04:a1:b2:c3")?;
//!     monitor.run(Desk(card), service).await?;
//!     Ok(())
//! }
//! ```
mod card;
mod config;
mod core;
mod error;
mod events;
mod policies;
mod reader;
mod subscribers;
mod validation;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use card::{CardSession, CardState, Uid, ValidationOutcome, ValidationResult};
pub use config::Config;
pub use core::{
    CancelSignal, CancellationRegistry, CardMonitor, MonitorBuilder, MonitorHandle, Sampler,
    Stabilizer, ValidationGuard, Validator, Verdict,
};
pub use error::{ReaderError, RuntimeError, SessionError, UidError, ValidationError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use reader::CardReader;
pub use subscribers::{Subscribe, SubscriberSet};
pub use validation::{ServiceRef, ValidateFn, ValidationService};

// Form-post validation service.
// Enabled by default, disable with `default-features = false`.
#[cfg(feature = "http")]
pub use validation::{HttpValidator, HttpValidatorConfig};

// Optional: a built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
