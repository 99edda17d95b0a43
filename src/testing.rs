//! Test helpers: a reader scripted against the tokio clock, and event collection.
//!
//! Tests run with `start_paused = true`, so a [`ScriptedReader`] timeline is
//! deterministic: the card on the reader is a function of virtual time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::Instant;

use crate::card::Uid;
use crate::error::ReaderError;
use crate::events::{Event, EventKind};
use crate::reader::CardReader;

pub(crate) fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub(crate) fn uid(s: &str) -> Uid {
    Uid::parse(s).unwrap()
}

enum Segment {
    Card(Uid),
    Empty,
    Fail,
}

/// Call counters shared with the test body.
#[derive(Default, Debug)]
pub(crate) struct ReaderStats {
    pub connects: AtomicU32,
    pub closes: AtomicU32,
    pub reads: AtomicU32,
}

impl ReaderStats {
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Reader whose presented card follows a timeline starting at construction.
///
/// After the last segment the reader is empty.
pub(crate) struct ScriptedReader {
    start: Instant,
    timeline: Vec<(Duration, Segment)>,
    refused_connects: u32,
    stats: Arc<ReaderStats>,
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            timeline: Vec::new(),
            refused_connects: 0,
            stats: Arc::new(ReaderStats::default()),
        }
    }

    fn push(mut self, dur: Duration, seg: Segment) -> Self {
        let end = self.timeline.last().map_or(Duration::ZERO, |(end, _)| *end) + dur;
        self.timeline.push((end, seg));
        self
    }

    /// `uid` lies on the reader for `dur`.
    pub fn card(self, uid: &str, dur: Duration) -> Self {
        let uid = Uid::parse(uid).unwrap();
        self.push(dur, Segment::Card(uid))
    }

    /// Nothing on the reader for `dur`.
    pub fn empty(self, dur: Duration) -> Self {
        self.push(dur, Segment::Empty)
    }

    /// Every read fails for `dur`.
    pub fn failing(self, dur: Duration) -> Self {
        self.push(dur, Segment::Fail)
    }

    /// The first `n` connect calls fail.
    pub fn refuse_connects(mut self, n: u32) -> Self {
        self.refused_connects = n;
        self
    }

    pub fn stats(&self) -> Arc<ReaderStats> {
        Arc::clone(&self.stats)
    }

    fn current(&self) -> Option<&Segment> {
        let offset = Instant::now().duration_since(self.start);
        self.timeline
            .iter()
            .find(|(end, _)| offset < *end)
            .map(|(_, seg)| seg)
    }
}

#[async_trait]
impl CardReader for ScriptedReader {
    async fn connect(&mut self) -> Result<(), ReaderError> {
        let n = self.stats.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.refused_connects {
            return Err(ReaderError::Unavailable {
                reason: "no reader attached".into(),
            });
        }
        Ok(())
    }

    async fn read_uid(&mut self) -> Result<Option<Uid>, ReaderError> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        match self.current() {
            Some(Segment::Card(uid)) => Ok(Some(uid.clone())),
            Some(Segment::Fail) => Err(ReaderError::Io {
                error: "frame lost".into(),
            }),
            Some(Segment::Empty) | None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Everything currently buffered in `rx`. Lag is skipped.
pub(crate) fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => out.push(ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

/// Card event kinds for one uid, in publish order.
pub(crate) fn kinds_for(events: &[Event], uid: &Uid) -> Vec<EventKind> {
    events
        .iter()
        .filter(|e| e.uid.as_ref() == Some(uid))
        .map(|e| e.kind)
        .collect()
}

/// Progress values for one uid, in publish order.
pub(crate) fn progress_for(events: &[Event], uid: &Uid) -> Vec<u8> {
    events
        .iter()
        .filter(|e| e.uid.as_ref() == Some(uid))
        .filter_map(|e| e.progress)
        .collect()
}

pub(crate) fn count(events: &[Event], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}
