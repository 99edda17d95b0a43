//! # Events emitted by the card monitor.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Card events**: one detection episode (`card_processing` → `card_progress`… → terminal)
//! - **Reader events**: reader availability and reinitialisation results
//! - **Runtime events**: shutdown flow and subscriber health
//!
//! The [`Event`] struct carries the metadata (uid, progress value, reason) and
//! renders the JSON payload a transport pushes to its clients.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use cardwatch::{Event, EventKind, Uid};
//!
//! let uid = Uid::parse("04A1B2C3").unwrap();
//! let ev = Event::new(EventKind::CardProgress).with_uid(uid).with_progress(40);
//!
//! assert_eq!(ev.name(), "card_progress");
//! assert_eq!(ev.payload()["value"], 40);
//! assert_eq!(ev.payload()["uid"], "04A1B2C3");
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::card::Uid;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of monitor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Card episode events ===
    /// A new card was seen and an episode started.
    ///
    /// Sets: `uid`
    CardProcessing,

    /// Episode progress, non-decreasing within an episode (0..=100).
    ///
    /// Sets: `uid`, `progress`
    CardProgress,

    /// Terminal: the validation service authorized the card.
    ///
    /// Sets: `uid`
    CardSuccess,

    /// Terminal: the validation service denied the card.
    ///
    /// Sets: `uid`
    CardUnauthorized,

    /// Terminal: the card left before a verdict could be emitted.
    ///
    /// Sets: `uid`
    CardProcessingCancelled,

    /// Terminal: the validation call failed (fail-closed).
    ///
    /// Sets: `uid`, `reason`
    CardValidationError,

    /// A card that is not being validated left the reader.
    ///
    /// Sets: `uid`
    CardRemoved,

    // === Reader events ===
    /// The reader connected (first time or after being unavailable).
    ReaderAvailable,

    /// The reader stopped accepting connections.
    ///
    /// Sets: `reason`
    ReaderUnavailable,

    /// Result of an explicit reinitialisation request.
    ///
    /// Sets: `reason` (`ok` or an error label)
    ReaderReinitialized,

    // === Runtime events ===
    /// Shutdown requested (OS signal or explicit stop).
    ShutdownRequested,

    /// All in-flight validations finished within the shutdown grace.
    AllStoppedWithin,

    /// Shutdown grace exceeded; pending validations were aborted.
    ///
    /// Sets: `reason` (pending uids)
    GraceExceeded,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `subscriber`, `reason`
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `subscriber`, `reason`
    SubscriberPanicked,
}

impl EventKind {
    /// Wire name used by transports (`emit(name, payload)`).
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::CardProcessing => "card_processing",
            EventKind::CardProgress => "card_progress",
            EventKind::CardSuccess => "card_success",
            EventKind::CardUnauthorized => "card_unauthorized",
            EventKind::CardProcessingCancelled => "card_processing_cancelled",
            EventKind::CardValidationError => "card_validation_error",
            EventKind::CardRemoved => "card_removed",
            EventKind::ReaderAvailable => "nfc_reader_available",
            EventKind::ReaderUnavailable => "nfc_reader_unavailable",
            EventKind::ReaderReinitialized => "nfc_reader_reinit_result",
            EventKind::ShutdownRequested => "shutdown_requested",
            EventKind::AllStoppedWithin => "all_stopped_within_grace",
            EventKind::GraceExceeded => "grace_exceeded",
            EventKind::SubscriberOverflow => "subscriber_overflow",
            EventKind::SubscriberPanicked => "subscriber_panicked",
        }
    }

    /// True for the four kinds that close an episode.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventKind::CardSuccess
                | EventKind::CardUnauthorized
                | EventKind::CardProcessingCancelled
                | EventKind::CardValidationError
        )
    }
}

/// Monitor event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Card the event is about, if any.
    pub uid: Option<Uid>,
    /// Progress value for `CardProgress`.
    pub progress: Option<u8>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Subscriber name for subscriber health events.
    pub subscriber: Option<&'static str>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            uid: None,
            progress: None,
            reason: None,
            subscriber: None,
        }
    }

    /// Attaches a card uid.
    #[inline]
    pub fn with_uid(mut self, uid: Uid) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Attaches a progress value (clamped to 100).
    #[inline]
    pub fn with_progress(mut self, value: u8) -> Self {
        self.progress = Some(value.min(100));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Wire name of this event.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// JSON payload for transports.
    ///
    /// Always carries `timestamp` (seconds since the Unix epoch); `uid`,
    /// `value` and `message` are present when they apply.
    pub fn payload(&self) -> Value {
        let mut map = Map::new();
        if let Some(uid) = &self.uid {
            map.insert("uid".into(), Value::from(uid.as_str()));
        }
        if let Some(value) = self.progress {
            map.insert("value".into(), Value::from(value));
        }
        let message = match self.kind {
            EventKind::CardSuccess => Some("Karte berechtigt"),
            EventKind::CardUnauthorized => Some("Karte nicht berechtigt"),
            _ => self.reason.as_deref(),
        };
        if let Some(message) = message {
            map.insert("message".into(), Value::from(message));
        }
        if let Some(subscriber) = self.subscriber {
            map.insert("subscriber".into(), Value::from(subscriber));
        }
        let ts = self
            .at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        map.insert("timestamp".into(), Value::from(ts));
        Value::Object(map)
    }
}
