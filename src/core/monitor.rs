//! # CardMonitor: wires the poller, the notifier and graceful shutdown.
//!
//! The [`CardMonitor`] owns the event bus, the [`SubscriberSet`] and the
//! [`CancellationRegistry`]. [`CardMonitor::run`] hands a reader and a
//! validation service to the poller and blocks until shutdown.
//!
//! ## High-level architecture
//! ```text
//! run(reader, service)
//!   ├─ subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   └─ spawn Poller::run(stop)
//!          │
//!          ├─ publish(Event) ─► Bus ─► listener ─► [queue S1] [queue S2] ... ─► sub.on_event()
//!          └─ spawn Validator ─┘
//!
//! Shutdown path:
//!   OS signal | MonitorHandle::stop()
//!     └─► Bus.publish(ShutdownRequested)
//!     └─► stop.cancel()  → poller finishes its tick, closes the reader,
//!                          returns in-flight validators
//!     └─► wait_all_with_grace(cfg.shutdown_grace):
//!            ├─ all joined → Bus.publish(AllStoppedWithin)
//!            └─ timeout    → cancel + settle pending episodes, abort validators,
//!                            Bus.publish(GraceExceeded)
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use cardwatch::{CardMonitor, CardReader, Config, ReaderError, Uid, ValidateFn, ValidationError};
//!
//! struct NoCard;
//!
//! #[async_trait]
//! impl CardReader for NoCard {
//!     async fn connect(&mut self) -> Result<(), ReaderError> { Ok(()) }
//!     async fn read_uid(&mut self) -> Result<Option<Uid>, ReaderError> { Ok(None) }
//!     async fn close(&mut self) {}
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let monitor = CardMonitor::builder(Config::default()).build();
//!     let handle = monitor.handle();
//!
//!     let service = ValidateFn::arc("allow-all", |_uid: Uid| async {
//!         Ok::<_, ValidationError>(true)
//!     });
//!
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!         handle.stop();
//!     });
//!     monitor.run(NoCard, service).await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::builder::MonitorBuilder;
use super::handle::MonitorHandle;
use super::poller::{Command, Poller, PollerWiring};
use super::registry::CancellationRegistry;
use super::shutdown;
use crate::card::ValidationOutcome;
use crate::config::Config;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::reader::CardReader;
use crate::subscribers::SubscriberSet;
use crate::validation::ServiceRef;

/// Poller-side ends of the control channels, taken by the first `run`.
pub(crate) struct Pending {
    pub commands: mpsc::Receiver<Command>,
    pub status: watch::Sender<bool>,
}

/// Card monitor runtime.
pub struct CardMonitor {
    cfg: Config,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    registry: Arc<CancellationRegistry>,
    stop: CancellationToken,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<bool>,
    pending: Mutex<Option<Pending>>,
}

impl CardMonitor {
    /// Starts building a monitor.
    pub fn builder(cfg: Config) -> MonitorBuilder {
        MonitorBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        registry: Arc<CancellationRegistry>,
        stop: CancellationToken,
        commands: mpsc::Sender<Command>,
        status: watch::Receiver<bool>,
        pending: Pending,
    ) -> Self {
        Self {
            cfg,
            bus,
            subs,
            registry,
            stop,
            commands,
            status,
            pending: Mutex::new(Some(pending)),
        }
    }

    /// Handle for stopping, subscribing and reader control.
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            stop: self.stop.clone(),
            commands: self.commands.clone(),
            status: self.status.clone(),
            bus: self.bus.clone(),
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Drives `reader` until a termination signal or [`MonitorHandle::stop`].
    ///
    /// Returns `Ok(())` when every in-flight validation finished within
    /// `Config::shutdown_grace`, [`RuntimeError::GraceExceeded`] otherwise.
    /// A monitor runs once; later calls fail with [`RuntimeError::AlreadyRunning`].
    pub async fn run<R: CardReader>(&self, reader: R, service: ServiceRef) -> Result<(), RuntimeError> {
        let wiring = {
            let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take().ok_or(RuntimeError::AlreadyRunning)?
        };
        self.subscriber_listener();

        info!(reader = reader.name(), service = service.name(), "card monitor starting");
        let poller = Poller::new(
            &self.cfg,
            reader,
            service,
            PollerWiring {
                bus: self.bus.clone(),
                registry: Arc::clone(&self.registry),
                commands: wiring.commands,
                status: wiring.status,
            },
        );
        let mut poller = tokio::spawn(poller.run(self.stop.clone()));

        let early = tokio::select! {
            _ = shutdown::termination() => None,
            _ = self.stop.cancelled() => None,
            joined = &mut poller => Some(joined),
        };
        let joined = match early {
            Some(joined) => joined,
            None => {
                self.bus.publish(Event::new(EventKind::ShutdownRequested));
                self.stop.cancel();
                poller.await
            }
        };
        let mut validators = joined.map_err(|e| RuntimeError::PollerPanicked {
            info: e.to_string(),
        })?;
        self.wait_all_with_grace(&mut validators).await
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Waits for in-flight validators within `shutdown_grace`.
    ///
    /// On timeout every pending episode is cancelled; episodes nobody
    /// settled yet get their `card_processing_cancelled` here, then the
    /// validators are aborted.
    async fn wait_all_with_grace(
        &self,
        set: &mut JoinSet<ValidationOutcome>,
    ) -> Result<(), RuntimeError> {
        let grace = self.cfg.shutdown_grace;
        let done = async {
            while let Some(joined) = set.join_next().await {
                if let Ok(outcome) = joined {
                    debug!(uid = %outcome.uid, result = ?outcome.result, "validator drained");
                }
            }
        };

        if time::timeout(grace, done).await.is_ok() {
            info!("all validators stopped within grace");
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            return Ok(());
        }

        let pending = self.registry.pending();
        self.registry.cancel_all();
        for uid in &pending {
            if let Some(signal) = self.registry.get(uid) {
                if signal.settle() {
                    self.bus.publish(
                        Event::new(EventKind::CardProcessingCancelled).with_uid(uid.clone()),
                    );
                }
            }
        }
        set.abort_all();
        while set.join_next().await.is_some() {}

        let pending: Vec<String> = pending.iter().map(ToString::to_string).collect();
        warn!(?grace, ?pending, "shutdown grace exceeded; validators aborted");
        self.bus.publish(
            Event::new(EventKind::GraceExceeded).with_reason(pending.join(",")),
        );
        Err(RuntimeError::GraceExceeded { grace, pending })
    }
}
