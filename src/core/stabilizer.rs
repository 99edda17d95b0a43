//! # Stabilizer: debounce a freshly observed uid.
//!
//! Samples the reader up to K times at a short interval and reports a
//! [`Verdict`]. It never calls the validation service and never touches
//! tracking state; the poller decides what a verdict means.
//!
//! ```text
//! sample ─┬─ same uid ──► seen += 1 ──► seen == K ? Stable : sleep(interval) ─► sample
//!         ├─ other uid ─► Retarget(other)
//!         └─ no card ───► Removed
//! deadline hit anywhere ► TimedOut
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant};

use crate::card::Uid;
use crate::config::Config;

/// One read of "what card is on the reader right now".
///
/// Implemented by the poller's reader link; tests script it directly.
#[async_trait]
pub trait Sampler: Send {
    async fn sample(&mut self) -> Option<Uid>;
}

/// Outcome of one stabilization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The candidate was read K consecutive times.
    Stable(Uid),
    /// The reader reported no card.
    Removed,
    /// A different card showed up; stabilization should restart on it.
    Retarget(Uid),
    /// The deadline passed before K equal reads.
    TimedOut,
}

/// Sampling parameters.
#[derive(Debug, Clone, Copy)]
pub struct Stabilizer {
    samples: u32,
    interval: Duration,
    deadline: Duration,
}

impl Stabilizer {
    /// `samples` is clamped to at least 1.
    pub fn new(samples: u32, interval: Duration, deadline: Duration) -> Self {
        Self {
            samples: samples.max(1),
            interval,
            deadline,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.stability_samples_clamped(),
            cfg.sample_interval_clamped(),
            cfg.stabilize_deadline,
        )
    }

    /// Overall budget for one detection, retargets included.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs with a fresh deadline of `now + deadline`.
    pub async fn run<S>(&self, sampler: &mut S, candidate: &Uid) -> Verdict
    where
        S: Sampler + ?Sized,
    {
        self.run_until(sampler, candidate, Instant::now() + self.deadline)
            .await
    }

    /// Runs until `deadline`; the poller shares one deadline across retargets.
    pub async fn run_until<S>(&self, sampler: &mut S, candidate: &Uid, deadline: Instant) -> Verdict
    where
        S: Sampler + ?Sized,
    {
        let sampling = async {
            let mut seen = 0u32;
            loop {
                match sampler.sample().await {
                    Some(uid) if &uid == candidate => {
                        seen += 1;
                        if seen >= self.samples {
                            return Verdict::Stable(uid);
                        }
                    }
                    Some(other) => return Verdict::Retarget(other),
                    None => return Verdict::Removed,
                }
                time::sleep(self.interval).await;
            }
        };

        match time::timeout_at(deadline, sampling).await {
            Ok(verdict) => verdict,
            Err(_elapsed) => Verdict::TimedOut,
        }
    }
}
