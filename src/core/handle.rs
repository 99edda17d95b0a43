//! # MonitorHandle: control surface of a running monitor.
//!
//! Cheap to clone; hand one to whatever owns the transport (HTTP routes,
//! a UI, a test) while [`CardMonitor::run`](crate::CardMonitor::run) drives the reader.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::poller::Command;
use super::registry::CancellationRegistry;
use crate::card::Uid;
use crate::error::ReaderError;
use crate::events::{Bus, Event};

/// Clonable handle to a [`CardMonitor`](crate::CardMonitor).
#[derive(Clone)]
pub struct MonitorHandle {
    pub(crate) stop: CancellationToken,
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) status: watch::Receiver<bool>,
    pub(crate) bus: Bus,
    pub(crate) registry: Arc<CancellationRegistry>,
}

impl MonitorHandle {
    /// Requests a graceful shutdown, same as an OS termination signal.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// True once [`stop`](Self::stop) was called.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// A receiver for every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Last known reader availability (`false` until the first successful connect).
    pub fn reader_available(&self) -> bool {
        *self.status.borrow()
    }

    /// A receiver that is notified on every availability change.
    pub fn watch_reader(&self) -> watch::Receiver<bool> {
        self.status.clone()
    }

    /// Closes and reconnects the reader between two poll ticks.
    ///
    /// The result is also published as `nfc_reader_reinit_result`. A request
    /// made before [`CardMonitor::run`](crate::CardMonitor::run) waits for the poller to start.
    pub async fn reinitialize_reader(&self) -> Result<(), ReaderError> {
        let (tx, rx) = oneshot::channel();
        let not_running = || ReaderError::Unavailable {
            reason: "monitor is not running".into(),
        };
        self.commands
            .send(Command::Reinitialize(tx))
            .await
            .map_err(|_| not_running())?;
        rx.await.map_err(|_| not_running())?
    }

    /// Uids whose validation is still in flight, sorted.
    pub fn pending_validations(&self) -> Vec<Uid> {
        self.registry.pending()
    }

    /// Shared cancellation registry.
    pub fn registry(&self) -> Arc<CancellationRegistry> {
        Arc::clone(&self.registry)
    }
}
