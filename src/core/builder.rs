use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::monitor::{CardMonitor, Pending};
use super::registry::CancellationRegistry;
use crate::{
    config::Config,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`CardMonitor`].
pub struct MonitorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl MonitorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets the event subscribers (the notifier side).
    ///
    /// Each subscriber gets a dedicated worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the monitor: bus, subscriber workers, registry and control channels.
    ///
    /// Must be called from within a tokio runtime (subscriber workers are spawned here).
    pub fn build(self) -> Arc<CardMonitor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let (commands, commands_rx) = mpsc::channel(self.cfg.command_capacity_clamped());
        let (status_tx, status) = watch::channel(false);

        Arc::new(CardMonitor::new_internal(
            self.cfg,
            bus,
            subs,
            CancellationRegistry::new(),
            CancellationToken::new(),
            commands,
            status,
            Pending {
                commands: commands_rx,
                status: status_tx,
            },
        ))
    }
}
