//! # LogWriter: event logger
//!
//! A subscriber that writes every [`Event`] through `tracing` under the
//! `cardwatch::events` target. Useful for kiosks without a UI and for demos.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO cardwatch::events: card_processing uid=04A1B2C3
//! INFO cardwatch::events: card_progress uid=04A1B2C3 value=10
//! INFO cardwatch::events: card_success uid=04A1B2C3
//! WARN cardwatch::events: card_unauthorized uid=0411AA00
//! ERROR cardwatch::events: card_validation_error uid=04FF00AA reason="validation timed out after 3s"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let uid = e.uid.as_ref().map(|u| u.as_str()).unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let name = e.name();
        match e.kind {
            EventKind::CardProgress => {
                debug!(target: "cardwatch::events", uid, value = e.progress, "{name}");
            }
            EventKind::CardProcessing
            | EventKind::CardSuccess
            | EventKind::CardRemoved
            | EventKind::CardProcessingCancelled => {
                info!(target: "cardwatch::events", uid, "{name}");
            }
            EventKind::CardUnauthorized => {
                warn!(target: "cardwatch::events", uid, "{name}");
            }
            EventKind::CardValidationError => {
                error!(target: "cardwatch::events", uid, reason, "{name}");
            }
            EventKind::ReaderAvailable
            | EventKind::ReaderReinitialized
            | EventKind::ShutdownRequested
            | EventKind::AllStoppedWithin => {
                info!(target: "cardwatch::events", reason, "{name}");
            }
            EventKind::ReaderUnavailable
            | EventKind::GraceExceeded
            | EventKind::SubscriberOverflow
            | EventKind::SubscriberPanicked => {
                warn!(target: "cardwatch::events", subscriber = e.subscriber, reason, "{name}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
