//! # ReaderLink: the poller's exclusive handle on the reader.
//!
//! Wraps a [`CardReader`] with connection bookkeeping:
//! - `connect` once per tick, paced by [`BackoffPolicy`] after failures;
//! - availability announced on the bus and a `watch` channel, only on change;
//! - read failures and a down link both read as "no card".
//!
//! ```text
//! refresh() ── retry window open? ── no ──► skip (hardware untouched)
//!                 │
//!                yes ─► connect() ─┬─ Ok  ─► up   (nfc_reader_available on change)
//!                                  └─ Err ─► down (nfc_reader_unavailable on change,
//!                                                  retry_at = now + backoff.next(n))
//! ```

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::card::Uid;
use crate::core::stabilizer::Sampler;
use crate::error::ReaderError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::reader::CardReader;

pub(crate) struct ReaderLink<R> {
    reader: R,
    bus: Bus,
    status: watch::Sender<bool>,
    backoff: BackoffPolicy,
    connected: bool,
    announced: Option<bool>,
    failures: u32,
    retry_at: Option<Instant>,
}

impl<R: CardReader> ReaderLink<R> {
    pub(crate) fn new(
        reader: R,
        backoff: BackoffPolicy,
        bus: Bus,
        status: watch::Sender<bool>,
    ) -> Self {
        Self {
            reader,
            bus,
            status,
            backoff,
            connected: false,
            announced: None,
            failures: 0,
            retry_at: None,
        }
    }

    /// Re-checks the connection unless a backoff window is still running.
    pub(crate) async fn refresh(&mut self) {
        if self.retry_at.is_some_and(|at| Instant::now() < at) {
            return;
        }
        match self.reader.connect().await {
            Ok(()) => self.up(),
            Err(e) => self.down(&e),
        }
    }

    /// One uid read. `None` for no card, a failed read or a down link.
    pub(crate) async fn read(&mut self) -> Option<Uid> {
        if !self.connected {
            return None;
        }
        match self.reader.read_uid().await {
            Ok(uid) => uid,
            Err(e) => {
                debug!(reader = self.reader.name(), label = e.as_label(), error = %e, "read failed");
                None
            }
        }
    }

    /// `close` followed by an immediate `connect`, ignoring any backoff window.
    pub(crate) async fn reinitialize(&mut self) -> Result<(), ReaderError> {
        info!(reader = self.reader.name(), "reinitializing reader");
        self.reader.close().await;
        self.connected = false;
        self.failures = 0;
        self.retry_at = None;

        let res = self.reader.connect().await;
        let reason = match &res {
            Ok(()) => {
                self.up();
                "ok"
            }
            Err(e) => {
                self.down(e);
                e.as_label()
            }
        };
        self.bus
            .publish(Event::new(EventKind::ReaderReinitialized).with_reason(reason));
        res
    }

    pub(crate) async fn close(&mut self) {
        self.reader.close().await;
        self.connected = false;
    }

    fn up(&mut self) {
        self.connected = true;
        self.failures = 0;
        self.retry_at = None;
        if self.announced != Some(true) {
            info!(reader = self.reader.name(), "reader available");
            self.announced = Some(true);
            self.status.send_replace(true);
            self.bus.publish(Event::new(EventKind::ReaderAvailable));
        }
    }

    fn down(&mut self, err: &ReaderError) {
        self.connected = false;
        let delay = self.backoff.next(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.retry_at = Some(Instant::now() + delay);
        debug!(reader = self.reader.name(), failures = self.failures, ?delay, "connect failed");

        if self.announced != Some(false) {
            warn!(reader = self.reader.name(), label = err.as_label(), error = %err, "reader unavailable");
            self.announced = Some(false);
            self.status.send_replace(false);
            self.bus.publish(
                Event::new(EventKind::ReaderUnavailable).with_reason(err.to_string()),
            );
        }
    }
}

#[async_trait]
impl<R: CardReader> Sampler for ReaderLink<R> {
    async fn sample(&mut self) -> Option<Uid> {
        self.read().await
    }
}
