//! # Monitor configuration.
//!
//! Provides [`Config`]: every timing knob of the poller, stabilizer,
//! validator and shutdown path in one place.
//!
//! ## Sentinel values
//! - `stability_samples = 0` → treated as 1 (at least one confirming read)
//! - `bus_capacity = 0` / `command_capacity = 0` → clamped to 1
//! - zero intervals are clamped to 1ms so no loop ever spins

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Configuration for the card monitor.
///
/// ## Field semantics
/// - `poll_interval`: cadence of the poller ticker
/// - `stability_samples`: consecutive equal reads (K) required before validation
/// - `sample_interval`: delay between stabilizer reads
/// - `stabilize_deadline`: overall budget for stabilization, retargets included
/// - `removal_grace`: how long a card may vanish mid-validation before the episode is cancelled
/// - `grace_sample_interval`: read cadence inside the removal grace window
/// - `validation_timeout`: bound on one validation service call
/// - `bus_capacity`: event bus ring buffer size
/// - `command_capacity`: queue size for [`MonitorHandle`](crate::MonitorHandle) commands
/// - `shutdown_grace`: how long shutdown waits for in-flight validations
/// - `reconnect`: pacing of `connect` attempts after the reader failed
///
/// ## Notes
/// All fields are public. Prefer the helper accessors to avoid sprinkling
/// sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    pub poll_interval: Duration,
    pub stability_samples: u32,
    pub sample_interval: Duration,
    pub stabilize_deadline: Duration,
    pub removal_grace: Duration,
    pub grace_sample_interval: Duration,
    pub validation_timeout: Duration,
    pub bus_capacity: usize,
    pub command_capacity: usize,
    pub shutdown_grace: Duration,
    pub reconnect: BackoffPolicy,
}

impl Config {
    /// Stability sample count, at least 1.
    #[inline]
    pub fn stability_samples_clamped(&self) -> u32 {
        self.stability_samples.max(1)
    }

    #[inline]
    pub fn poll_interval_clamped(&self) -> Duration {
        self.poll_interval.max(Duration::from_millis(1))
    }

    #[inline]
    pub fn sample_interval_clamped(&self) -> Duration {
        self.sample_interval.max(Duration::from_millis(1))
    }

    #[inline]
    pub fn grace_sample_interval_clamped(&self) -> Duration {
        self.grace_sample_interval.max(Duration::from_millis(1))
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    #[inline]
    pub fn command_capacity_clamped(&self) -> usize {
        self.command_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `poll_interval = 300ms`
    /// - `stability_samples = 1` (latency over debounce; raise for noisy readers)
    /// - `sample_interval = 20ms`
    /// - `stabilize_deadline = 1s`
    /// - `removal_grace = 600ms`
    /// - `grace_sample_interval = 50ms`
    /// - `validation_timeout = 3s`
    /// - `bus_capacity = 1024`
    /// - `command_capacity = 16`
    /// - `shutdown_grace = 5s`
    /// - `reconnect = BackoffPolicy::default()`
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            stability_samples: 1,
            sample_interval: Duration::from_millis(20),
            stabilize_deadline: Duration::from_secs(1),
            removal_grace: Duration::from_millis(600),
            grace_sample_interval: Duration::from_millis(50),
            validation_timeout: Duration::from_secs(3),
            bus_capacity: 1024,
            command_capacity: 16,
            shutdown_grace: Duration::from_secs(5),
            reconnect: BackoffPolicy::default(),
        }
    }
}
