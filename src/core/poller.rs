//! # Poller: the single control loop that owns the reader.
//!
//! Drives the card state machine on a fixed cadence. It is the only task that
//! touches the reader; validators run concurrently and talk back through the
//! [`CancellationRegistry`] and the bus.
//!
//! ## Tick
//! ```text
//! reap finished validators
//! link.refresh()            (connect, paced by backoff)
//! seen = link.read()
//!   ├─ seen == tracked ─────────────────────────► nothing
//!   ├─ seen != tracked, validator not reaped ───► ignored (one validator at a time)
//!   ├─ seen != tracked, seen still pending ─────► ignored (dedup)
//!   ├─ seen != tracked ─────────────────────────► detection protocol
//!   ├─ no card, tracked idle ───────────────────► card_removed
//!   └─ no card, tracked validating ─────────────► grace window
//! ```
//!
//! ## Detection protocol
//! ```text
//! card_processing, card_progress(10)
//! stabilizer.run_until(shared deadline)
//!   ├─ Stable   ─► register ─┬─ guard ─► card_progress(40), spawn Validator
//!   │                        └─ none  ─► card_processing_cancelled
//!   ├─ Retarget ─┬─ new uid pending ─► card_processing_cancelled (old uid)
//!   │            └─ otherwise ───────► card_processing(new), card_progress(10), stabilize again
//!   └─ Removed / TimedOut ─► card_processing_cancelled, tracking cleared
//! ```
//!
//! ## Grace window
//! Sample every `grace_sample_interval` for `removal_grace`:
//! - tracked card back → read flicker, nothing happens;
//! - validator reaped meanwhile → `card_removed`;
//! - window over → cancel the signal; if the poller settles first it sends
//!   `card_processing_cancelled`, otherwise the episode is kept and the
//!   removal is reported once the validator is reaped, after its verdict.
//!
//! ## Rules
//! - Each tick runs behind `catch_unwind`; a fault drops tracking and the
//!   loop goes on.
//! - At most one validator task exists; a cancelled one keeps the slot busy
//!   until it is reaped.
//! - Stop is checked between ticks; the reader is closed on the way out and
//!   the in-flight validators are handed back to the caller.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::card::{CardSession, CardState, Uid, ValidationOutcome};
use crate::config::Config;
use crate::core::link::ReaderLink;
use crate::core::progress;
use crate::core::registry::{CancelSignal, CancellationRegistry};
use crate::core::stabilizer::{Stabilizer, Verdict};
use crate::core::validator::Validator;
use crate::error::ReaderError;
use crate::events::{Bus, Event, EventKind};
use crate::reader::CardReader;
use crate::subscribers::panic_message;
use crate::validation::ServiceRef;

/// Requests served by the poller between ticks.
#[derive(Debug)]
pub(crate) enum Command {
    /// Close and reconnect the reader, replying with the connect result.
    Reinitialize(oneshot::Sender<Result<(), ReaderError>>),
}

/// Channels the poller shares with the monitor.
pub(crate) struct PollerWiring {
    pub bus: Bus,
    pub registry: Arc<CancellationRegistry>,
    pub commands: mpsc::Receiver<Command>,
    pub status: watch::Sender<bool>,
}

/// The validating episode of the tracked card.
struct Episode {
    session: CardSession,
    signal: CancelSignal,
}

pub(crate) struct Poller<R> {
    link: ReaderLink<R>,
    stabilizer: Stabilizer,
    validator: Validator,
    registry: Arc<CancellationRegistry>,
    bus: Bus,
    commands: mpsc::Receiver<Command>,
    poll_interval: Duration,
    removal_grace: Duration,
    grace_interval: Duration,
    tracked: Option<Uid>,
    episode: Option<Episode>,
    validators: JoinSet<ValidationOutcome>,
}

impl<R: CardReader> Poller<R> {
    pub(crate) fn new(cfg: &Config, reader: R, service: ServiceRef, wiring: PollerWiring) -> Self {
        Self {
            link: ReaderLink::new(reader, cfg.reconnect, wiring.bus.clone(), wiring.status),
            stabilizer: Stabilizer::from_config(cfg),
            validator: Validator::new(service, wiring.bus.clone(), cfg.validation_timeout),
            registry: wiring.registry,
            bus: wiring.bus,
            commands: wiring.commands,
            poll_interval: cfg.poll_interval_clamped(),
            removal_grace: cfg.removal_grace,
            grace_interval: cfg.grace_sample_interval_clamped(),
            tracked: None,
            episode: None,
            validators: JoinSet::new(),
        }
    }

    /// Polls until `stop` fires, then closes the reader.
    ///
    /// Returns the validators still in flight so the caller can wait for them.
    pub(crate) async fn run(mut self, stop: CancellationToken) -> JoinSet<ValidationOutcome> {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.poll_interval, "poller started");

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                Some(cmd) = self.commands.recv() => self.on_command(cmd).await,
                _ = ticker.tick() => self.guarded_tick().await,
            }
        }

        self.link.close().await;
        self.reap();
        info!(in_flight = self.validators.len(), "poller stopped");
        self.validators
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Reinitialize(reply) => {
                let res = self.link.reinitialize().await;
                let _ = reply.send(res);
            }
        }
    }

    async fn guarded_tick(&mut self) {
        if let Err(panic_err) = AssertUnwindSafe(self.tick()).catch_unwind().await {
            let info = panic_message(&*panic_err);
            error!(%info, "poll tick panicked; dropping tracked card");
            self.tracked = None;
            self.episode = None;
        }
    }

    async fn tick(&mut self) {
        self.reap();
        self.link.refresh().await;

        let seen = self.link.read().await;
        match (seen, self.tracked.clone()) {
            (Some(uid), Some(tracked)) if uid == tracked => {}
            (Some(uid), tracked) => {
                if self.registry.is_pending(&uid) {
                    debug!(uid = %uid, "earlier validation still pending; detection skipped");
                    return;
                }
                if self.busy() {
                    trace!(uid = %uid, ?tracked, "validator running; new card ignored");
                    return;
                }
                self.detect(uid).await;
            }
            (None, Some(tracked)) if self.in_flight() => self.grace(tracked).await,
            (None, Some(tracked)) => self.removed(tracked),
            (None, None) => {}
        }
    }

    /// True until the tracked card's validator has been reaped.
    fn in_flight(&self) -> bool {
        self.episode.is_some()
    }

    /// True while any validator task, cancelled ones included, is still running.
    fn busy(&self) -> bool {
        !self.validators.is_empty()
    }

    async fn detect(&mut self, first: Uid) {
        let deadline = Instant::now() + self.stabilizer.deadline();
        let mut session = CardSession::detected(first.clone());
        self.announce(&first);
        step(&mut session, CardState::Stabilizing);

        loop {
            let candidate = session.uid().clone();
            match self
                .stabilizer
                .run_until(&mut self.link, &candidate, deadline)
                .await
            {
                Verdict::Stable(uid) => return self.start_validation(session, uid),
                Verdict::Retarget(next) if self.registry.is_pending(&next) => {
                    debug!(from = %candidate, to = %next, "swapped to a card still pending");
                    return self.abandon(session, "swapped to a pending card");
                }
                Verdict::Retarget(next) => {
                    debug!(from = %candidate, to = %next, "card swapped during stabilization");
                    if let Err(e) = session.retarget(next.clone()) {
                        warn!(error = %e, "session retarget rejected");
                    }
                    self.announce(&next);
                }
                Verdict::Removed => return self.abandon(session, "removed during stabilization"),
                Verdict::TimedOut => return self.abandon(session, "not stable before deadline"),
            }
        }
    }

    fn start_validation(&mut self, mut session: CardSession, uid: Uid) {
        let Some(guard) = self.registry.register(&uid) else {
            return self.abandon(session, "validation already pending");
        };
        self.progress(&uid, progress::STABLE);
        step(&mut session, CardState::Validating);
        debug!(uid = %uid, "card stable; validating");

        let signal = guard.signal().clone();
        self.validators.spawn(self.validator.clone().run(guard));
        self.episode = Some(Episode { session, signal });
        self.tracked = Some(uid);
    }

    fn abandon(&mut self, mut session: CardSession, why: &'static str) {
        let uid = session.uid().clone();
        info!(uid = %uid, why, "detection cancelled");
        step(&mut session, CardState::Cancelled);
        step(&mut session, CardState::Idle);
        self.publish(EventKind::CardProcessingCancelled, &uid);
        self.tracked = None;
    }

    async fn grace(&mut self, uid: Uid) {
        let until = Instant::now() + self.removal_grace;
        debug!(uid = %uid, grace = ?self.removal_grace, "card lost during validation");

        loop {
            self.reap();
            if !self.in_flight() {
                return self.removed(uid);
            }
            let now = Instant::now();
            if now >= until {
                break;
            }
            time::sleep(self.grace_interval.min(until - now)).await;
            if self.link.read().await.as_ref() == Some(&uid) {
                debug!(uid = %uid, "card back within grace");
                return;
            }
        }
        self.expire(uid);
    }

    fn expire(&mut self, uid: Uid) {
        let Some(mut episode) = self.episode.take() else {
            return self.removed(uid);
        };
        episode.signal.cancel();
        if episode.signal.settle() {
            info!(uid = %uid, "card removed during validation; episode cancelled");
            step(&mut episode.session, CardState::Cancelled);
            step(&mut episode.session, CardState::Idle);
            self.publish(EventKind::CardProcessingCancelled, &uid);
            self.tracked = None;
        } else {
            debug!(uid = %uid, "validator settled first; removal follows its verdict");
            self.episode = Some(episode);
        }
    }

    fn removed(&mut self, uid: Uid) {
        info!(uid = %uid, "card removed");
        self.publish(EventKind::CardRemoved, &uid);
        self.tracked = None;
        self.episode = None;
    }

    fn reap(&mut self) {
        while let Some(joined) = self.validators.try_join_next() {
            match joined {
                Ok(outcome) => self.finish(outcome),
                Err(e) if e.is_panic() => error!(error = %e, "validator task panicked"),
                Err(e) => debug!(error = %e, "validator task aborted"),
            }
        }
    }

    fn finish(&mut self, outcome: ValidationOutcome) {
        debug!(uid = %outcome.uid, result = ?outcome.result, "validator finished");
        let ours = self
            .episode
            .as_ref()
            .is_some_and(|ep| ep.session.uid() == &outcome.uid);
        if !ours {
            return;
        }
        if let Some(mut episode) = self.episode.take() {
            step(&mut episode.session, outcome.result.state());
            step(&mut episode.session, CardState::Idle);
        }
    }

    fn announce(&mut self, uid: &Uid) {
        info!(uid = %uid, "card detected");
        self.tracked = Some(uid.clone());
        self.publish(EventKind::CardProcessing, uid);
        self.progress(uid, progress::DETECTED);
    }

    fn progress(&self, uid: &Uid, value: u8) {
        self.bus.publish(
            Event::new(EventKind::CardProgress)
                .with_uid(uid.clone())
                .with_progress(value),
        );
    }

    fn publish(&self, kind: EventKind, uid: &Uid) {
        self.bus.publish(Event::new(kind).with_uid(uid.clone()));
    }
}

/// Advances a session; an illegal edge is logged, never fatal.
fn step(session: &mut CardSession, next: CardState) {
    match session.advance(next) {
        Ok(()) => trace!(uid = %session.uid(), state = ?next, "card state"),
        Err(e) => warn!(uid = %session.uid(), error = %e, "card state machine"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;

    use crate::error::ValidationError;
    use crate::policies::{BackoffPolicy, JitterPolicy};
    use crate::testing::{ScriptedReader, count, drain, kinds_for, ms, progress_for, uid};
    use crate::validation::ValidationService;

    use EventKind::*;

    /// Records calls and answers after a fixed delay.
    struct Remote {
        delay: Duration,
        answer: Result<bool, ValidationError>,
        seen: Mutex<Vec<Uid>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Remote {
        fn new(delay: Duration, answer: Result<bool, ValidationError>) -> Arc<Self> {
            Arc::new(Self {
                delay,
                answer,
                seen: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<Uid> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ValidationService for Remote {
        async fn validate(&self, uid: &Uid) -> Result<bool, ValidationError> {
            self.seen.lock().unwrap().push(uid.clone());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    struct Rig {
        stop: CancellationToken,
        task: JoinHandle<JoinSet<ValidationOutcome>>,
        rx: broadcast::Receiver<Event>,
        registry: Arc<CancellationRegistry>,
        commands: mpsc::Sender<Command>,
        status: watch::Receiver<bool>,
    }

    impl Rig {
        fn start<R: CardReader>(reader: R, service: ServiceRef, cfg: Config) -> Self {
            let bus = Bus::new(1024);
            let rx = bus.subscribe();
            let registry = CancellationRegistry::new();
            let (commands, commands_rx) = mpsc::channel(4);
            let (status_tx, status) = watch::channel(false);
            let poller = Poller::new(
                &cfg,
                reader,
                service,
                PollerWiring {
                    bus,
                    registry: Arc::clone(&registry),
                    commands: commands_rx,
                    status: status_tx,
                },
            );
            let stop = CancellationToken::new();
            let task = tokio::spawn(poller.run(stop.clone()));
            Self {
                stop,
                task,
                rx,
                registry,
                commands,
                status,
            }
        }

        /// Stops the poller, waits for its validators and returns every event.
        async fn finish(mut self) -> Vec<Event> {
            self.stop.cancel();
            let mut validators = self.task.await.unwrap();
            while validators.join_next().await.is_some() {}
            drain(&mut self.rx)
        }
    }

    fn cfg(k: u32) -> Config {
        Config {
            stability_samples: k,
            reconnect: BackoffPolicy {
                jitter: JitterPolicy::None,
                ..BackoffPolicy::default()
            },
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_a_stable_card_is_authorized() {
        let a = uid("04A1B2C3");
        let reader = ScriptedReader::new().card("04A1B2C3", ms(2000));
        let remote = Remote::new(ms(100), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(3));

        time::sleep(ms(1000)).await;
        let events = rig.finish().await;

        assert_eq!(
            kinds_for(&events, &a),
            vec![
                CardProcessing,
                CardProgress,
                CardProgress,
                CardProgress,
                CardProgress,
                CardSuccess
            ]
        );
        let progress = progress_for(&events, &a);
        assert_eq!(progress, vec![10, 40, 60, 100]);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(remote.calls(), vec![a]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_b_removed_while_stabilizing() {
        let b = uid("0411AA00");
        let reader = ScriptedReader::new().card("0411AA00", ms(30));
        let remote = Remote::new(ms(100), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(3));

        time::sleep(ms(1000)).await;
        let events = rig.finish().await;

        assert_eq!(
            kinds_for(&events, &b),
            vec![CardProcessing, CardProgress, CardProcessingCancelled]
        );
        assert!(remote.calls().is_empty());
        assert_eq!(count(&events, CardSuccess), 0);
        assert_eq!(count(&events, CardUnauthorized), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_c_pulled_mid_call_result_discarded() {
        let c = uid("04FF00AA");
        let reader = ScriptedReader::new().card("04FF00AA", ms(200));
        let remote = Remote::new(ms(2000), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(1));

        time::sleep(ms(1000)).await;
        assert!(rig.registry.is_pending(&c), "call still running");

        time::sleep(ms(2000)).await;
        assert!(rig.registry.is_empty());
        let events = rig.finish().await;

        assert_eq!(
            kinds_for(&events, &c),
            vec![
                CardProcessing,
                CardProgress,
                CardProgress,
                CardProgress,
                CardProcessingCancelled
            ]
        );
        assert_eq!(progress_for(&events, &c), vec![10, 40, 60]);
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flicker_within_grace_is_ignored() {
        let a = uid("04A1B2C3");
        let reader = ScriptedReader::new()
            .card("04A1B2C3", ms(550))
            .empty(ms(100))
            .card("04A1B2C3", ms(5000));
        let remote = Remote::new(ms(1000), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(1));

        time::sleep(ms(2000)).await;
        let events = rig.finish().await;

        let kinds = kinds_for(&events, &a);
        assert_eq!(kinds.iter().filter(|k| **k == CardProcessing).count(), 1);
        assert!(!kinds.contains(&CardRemoved));
        assert!(!kinds.contains(&CardProcessingCancelled));
        assert_eq!(kinds.last(), Some(&CardSuccess));
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_uid_is_not_validated_twice() {
        let a = uid("04A1B2C3");
        let reader = ScriptedReader::new()
            .card("04A1B2C3", ms(350))
            .empty(ms(900))
            .card("04A1B2C3", ms(10_000));
        let remote = Remote::new(ms(2500), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(1));

        time::sleep(ms(2000)).await;
        assert_eq!(remote.calls().len(), 1, "re-presented card waits for the pending call");

        time::sleep(ms(4000)).await;
        let events = rig.finish().await;

        let kinds = kinds_for(&events, &a);
        assert_eq!(kinds.iter().filter(|k| **k == CardProcessing).count(), 2);
        assert_eq!(kinds.iter().filter(|k| **k == CardProcessingCancelled).count(), 1);
        assert_eq!(kinds.iter().filter(|k| **k == CardSuccess).count(), 1);
        assert_eq!(remote.calls().len(), 2);
        assert_eq!(remote.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registered_uid_skips_detection() {
        let a = uid("04A1B2C3");
        let reader = ScriptedReader::new().card("04A1B2C3", ms(10_000));
        let remote = Remote::new(ms(10), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(1));
        let pending = rig.registry.register(&a).unwrap();

        time::sleep(ms(1000)).await;
        assert!(remote.calls().is_empty());

        drop(pending);
        time::sleep(ms(1000)).await;
        let events = rig.finish().await;

        assert_eq!(remote.calls(), vec![a.clone()]);
        assert_eq!(kinds_for(&events, &a).last(), Some(&CardSuccess));
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_during_stabilization_retargets() {
        let a = uid("04A1B2C3");
        let b = uid("04FF00AA");
        let reader = ScriptedReader::new()
            .card("04A1B2C3", ms(30))
            .card("04FF00AA", ms(5000));
        let remote = Remote::new(ms(50), Ok(false));
        let rig = Rig::start(reader, remote.clone(), cfg(3));

        time::sleep(ms(1000)).await;
        let events = rig.finish().await;

        assert_eq!(kinds_for(&events, &a), vec![CardProcessing, CardProgress]);
        assert_eq!(
            kinds_for(&events, &b),
            vec![
                CardProcessing,
                CardProgress,
                CardProgress,
                CardProgress,
                CardProgress,
                CardUnauthorized
            ]
        );
        assert_eq!(remote.calls(), vec![b]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unstable_card_times_out() {
        let a = uid("04A1B2C3");
        let reader = ScriptedReader::new().card("04A1B2C3", ms(10_000));
        let remote = Remote::new(ms(10), Ok(true));
        let mut cfg = cfg(100);
        cfg.stabilize_deadline = ms(1000);
        let rig = Rig::start(reader, remote.clone(), cfg);

        time::sleep(ms(1100)).await;
        let events = rig.finish().await;

        let kinds = kinds_for(&events, &a);
        assert_eq!(
            kinds[..3],
            [CardProcessing, CardProgress, CardProcessingCancelled]
        );
        assert!(remote.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_service_fails_closed() {
        let a = uid("04A1B2C3");
        let reader = ScriptedReader::new().card("04A1B2C3", ms(10_000));
        let remote = Remote::new(ms(10_000), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(1));

        time::sleep(ms(4000)).await;
        let events = rig.finish().await;

        let kinds = kinds_for(&events, &a);
        assert_eq!(kinds.last(), Some(&CardValidationError));
        assert!(!kinds.contains(&CardSuccess));
        assert!(!kinds.contains(&CardUnauthorized));
        assert_eq!(progress_for(&events, &a), vec![10, 40, 60, 100]);
        let err = events.iter().find(|e| e.kind == CardValidationError).unwrap();
        assert_eq!(err.payload()["message"], "validation timed out after 3s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_card_leaving_is_plain_removal() {
        let a = uid("04A1B2C3");
        let reader = ScriptedReader::new().card("04A1B2C3", ms(500));
        let remote = Remote::new(ms(10), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(1));

        time::sleep(ms(1000)).await;
        let events = rig.finish().await;

        let kinds = kinds_for(&events, &a);
        assert_eq!(&kinds[kinds.len() - 2..], &[CardSuccess, CardRemoved]);
        assert_eq!(count(&events, CardProcessingCancelled), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verdict_during_grace_then_removal() {
        let a = uid("04A1B2C3");
        let reader = ScriptedReader::new().card("04A1B2C3", ms(250));
        let remote = Remote::new(ms(500), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(1));

        time::sleep(ms(1500)).await;
        let events = rig.finish().await;

        let kinds = kinds_for(&events, &a);
        assert_eq!(&kinds[kinds.len() - 2..], &[CardSuccess, CardRemoved]);
        let terminals = kinds.iter().filter(|k| k.is_terminal()).count();
        assert_eq!(terminals, 1);
    }

    struct FaultyReader {
        reads: u32,
    }

    #[async_trait]
    impl CardReader for FaultyReader {
        async fn connect(&mut self) -> Result<(), ReaderError> {
            Ok(())
        }

        async fn read_uid(&mut self) -> Result<Option<Uid>, ReaderError> {
            self.reads += 1;
            if self.reads == 1 {
                panic!("driver fault");
            }
            Ok(Some(uid("04A1B2C3")))
        }

        async fn close(&mut self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_fault_does_not_stop_the_loop() {
        let a = uid("04A1B2C3");
        let remote = Remote::new(ms(10), Ok(true));
        let rig = Rig::start(FaultyReader { reads: 0 }, remote.clone(), cfg(1));

        time::sleep(ms(1000)).await;
        let events = rig.finish().await;

        assert_eq!(kinds_for(&events, &a).last(), Some(&CardSuccess));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_outage_is_announced_and_recovered() {
        let a = uid("04A1B2C3");
        let reader = ScriptedReader::new()
            .refuse_connects(1)
            .card("04A1B2C3", ms(10_000));
        let remote = Remote::new(ms(10), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(1));

        time::sleep(ms(100)).await;
        assert!(!*rig.status.borrow());

        time::sleep(ms(900)).await;
        assert!(*rig.status.borrow());
        let events = rig.finish().await;

        let reader_events: Vec<_> = events
            .iter()
            .map(|e| e.kind)
            .filter(|k| matches!(k, ReaderAvailable | ReaderUnavailable))
            .collect();
        assert_eq!(reader_events, vec![ReaderUnavailable, ReaderAvailable]);
        assert_eq!(kinds_for(&events, &a).last(), Some(&CardSuccess));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinitialize_command_and_close_on_stop() {
        let reader = ScriptedReader::new();
        let stats = reader.stats();
        let remote = Remote::new(ms(10), Ok(true));
        let rig = Rig::start(reader, remote, cfg(1));

        time::sleep(ms(100)).await;
        let (tx, rx) = oneshot::channel();
        rig.commands.send(Command::Reinitialize(tx)).await.unwrap();
        assert_eq!(rx.await.unwrap(), Ok(()));
        assert_eq!(stats.closes(), 1);

        let events = rig.finish().await;
        assert_eq!(stats.closes(), 2);
        let reinit = events
            .iter()
            .find(|e| e.kind == ReaderReinitialized)
            .unwrap();
        assert_eq!(reinit.reason.as_deref(), Some("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_reported_after_settled_validator_is_reaped() {
        let a = uid("04A1B2C3");
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let registry = CancellationRegistry::new();
        let (_commands, commands_rx) = mpsc::channel(1);
        let (status, _status_rx) = watch::channel(false);
        let mut poller = Poller::new(
            &cfg(1),
            ScriptedReader::new(),
            Remote::new(ms(10), Ok(true)),
            PollerWiring {
                bus,
                registry: Arc::clone(&registry),
                commands: commands_rx,
                status,
            },
        );

        // a validator that has settled its episode but not returned yet
        let guard = registry.register(&a).unwrap();
        let signal = guard.signal().clone();
        assert!(signal.settle());
        let (release, held) = oneshot::channel::<()>();
        let outcome_uid = a.clone();
        poller.validators.spawn(async move {
            let _ = held.await;
            drop(guard);
            ValidationOutcome::new(outcome_uid, crate::card::ValidationResult::Valid)
        });
        let mut session = CardSession::detected(a.clone());
        step(&mut session, CardState::Stabilizing);
        step(&mut session, CardState::Validating);
        poller.episode = Some(Episode { session, signal });
        poller.tracked = Some(a.clone());

        poller.tick().await;
        assert!(kinds_for(&drain(&mut rx), &a).is_empty());
        assert!(poller.in_flight());

        release.send(()).unwrap();
        time::sleep(ms(1)).await;
        poller.tick().await;
        assert_eq!(kinds_for(&drain(&mut rx), &a), vec![CardRemoved]);
        assert!(!poller.busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_onto_pending_card_ends_quietly() {
        let a = uid("04A1B2C3");
        let b = uid("04FF00AA");
        let reader = ScriptedReader::new()
            .card("04A1B2C3", ms(30))
            .card("04FF00AA", ms(5000));
        let remote = Remote::new(ms(50), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(3));
        let pending = rig.registry.register(&b).unwrap();

        time::sleep(ms(1000)).await;
        drop(pending);
        let events = rig.finish().await;

        assert_eq!(
            kinds_for(&events, &a),
            vec![CardProcessing, CardProgress, CardProcessingCancelled]
        );
        assert!(kinds_for(&events, &b).is_empty());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_validator_keeps_slot_busy() {
        let a = uid("04A1B2C3");
        let b = uid("0411AA00");
        let reader = ScriptedReader::new()
            .card("04A1B2C3", ms(200))
            .empty(ms(800))
            .card("0411AA00", ms(5000));
        let remote = Remote::new(ms(2000), Ok(true));
        let rig = Rig::start(reader, remote.clone(), cfg(1));

        time::sleep(ms(1500)).await;
        assert_eq!(remote.calls(), vec![a.clone()], "second card waits for the slot");

        time::sleep(ms(3500)).await;
        let events = rig.finish().await;

        assert_eq!(kinds_for(&events, &a).last(), Some(&CardProcessingCancelled));
        assert_eq!(kinds_for(&events, &b).last(), Some(&CardSuccess));
        assert_eq!(remote.calls(), vec![a, b]);
        assert_eq!(remote.peak.load(Ordering::SeqCst), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        const CARDS: [&str; 3] = ["04A1B2C3", "0411AA00", "04FF00AA"];

        #[derive(Debug, Clone)]
        enum Segment {
            Card(usize, u64),
            Empty(u64),
            Failing(u64),
        }

        fn arb_segment() -> impl Strategy<Value = Segment> {
            prop_oneof![
                3 => (0..CARDS.len(), 10u64..1500).prop_map(|(i, d)| Segment::Card(i, d)),
                2 => (10u64..1200).prop_map(Segment::Empty),
                1 => (10u64..600).prop_map(Segment::Failing),
            ]
        }

        fn arb_answer() -> impl Strategy<Value = Result<bool, ValidationError>> {
            prop_oneof![
                Just(Ok(true)),
                Just(Ok(false)),
                Just(Err(ValidationError::Transport {
                    error: "connection reset".into()
                })),
            ]
        }

        /// Plays `timeline` against a poller on a paused clock.
        fn play(
            timeline: &[Segment],
            delay: u64,
            answer: Result<bool, ValidationError>,
            k: u32,
        ) -> (Vec<Event>, usize) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let mut reader = ScriptedReader::new();
                let mut total = 0;
                for seg in timeline {
                    reader = match *seg {
                        Segment::Card(i, d) => reader.card(CARDS[i], ms(d)),
                        Segment::Empty(d) => reader.empty(ms(d)),
                        Segment::Failing(d) => reader.failing(ms(d)),
                    };
                    total += match *seg {
                        Segment::Card(_, d) | Segment::Empty(d) | Segment::Failing(d) => d,
                    };
                }
                let remote = Remote::new(ms(delay), answer);
                let rig = Rig::start(reader, remote.clone(), cfg(k));

                time::sleep(ms(total + 6000)).await;
                let events = rig.finish().await;
                (events, remote.peak.load(Ordering::SeqCst))
            })
        }

        /// Checks every episode of one card; an episode starts at `card_processing`.
        fn check_card(events: &[Event], card: &Uid) -> Result<(), TestCaseError> {
            let own: Vec<&Event> = events.iter().filter(|e| e.uid.as_ref() == Some(card)).collect();
            let mut episodes: Vec<Vec<&Event>> = Vec::new();
            for ev in own {
                if ev.kind == CardProcessing || episodes.is_empty() {
                    episodes.push(Vec::new());
                }
                if let Some(current) = episodes.last_mut() {
                    current.push(ev);
                }
            }

            for episode in &episodes {
                let kinds: Vec<EventKind> = episode.iter().map(|e| e.kind).collect();
                let values: Vec<u8> = episode.iter().filter_map(|e| e.progress).collect();
                let terminals: Vec<EventKind> =
                    kinds.iter().copied().filter(|k| k.is_terminal()).collect();

                prop_assert_eq!(kinds.first(), Some(&CardProcessing), "{:?}", kinds);
                prop_assert!(terminals.len() <= 1, "{} {:?}", card, kinds);
                prop_assert!(values.windows(2).all(|w| w[0] <= w[1]), "{} {:?}", card, values);
                if values.contains(&progress::STABLE) {
                    prop_assert_eq!(terminals.len(), 1, "{} {:?}", card, kinds);
                }

                let done = values.iter().filter(|v| **v == progress::DONE).count();
                match terminals.first() {
                    Some(CardSuccess | CardUnauthorized | CardValidationError) => {
                        prop_assert_eq!(done, 1, "{} {:?}", card, values);
                        let at = kinds.iter().position(|k| k.is_terminal()).unwrap();
                        prop_assert_eq!(episode[at - 1].progress, Some(progress::DONE));
                    }
                    _ => {
                        prop_assert_eq!(done, 0, "{} {:?}", card, values);
                    }
                }
            }
            Ok(())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn episodes_hold_for_any_read_sequence(
                timeline in proptest::collection::vec(arb_segment(), 1..8),
                delay in 0u64..4000,
                answer in arb_answer(),
                k in 1u32..4,
            ) {
                let (events, peak) = play(&timeline, delay, answer, k);
                for card in CARDS {
                    check_card(&events, &uid(card))?;
                }
                prop_assert!(peak <= 1, "validators overlapped: {}", peak);
            }
        }
    }
}
