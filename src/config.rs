//! Process-wide defaults, injected explicitly rather than read from globals.
//!
//! None of these are file-backed; the core owns no configuration file
//! format. Callers embedding this crate wire these structs up from whatever
//! configuration layer the surrounding operator uses.

use std::time::Duration;

/// Options for [`crate::backoff_registry::BackoffRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_elapsed: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(60),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_elapsed: None,
        }
    }
}

/// Options for [`crate::horizon`] calculations.
#[derive(Debug, Clone, Copy)]
pub struct HorizonConfig {
    /// Upper bound for `percent` clamping, as a whole-number percentage.
    pub percent_cap: f64,
    /// Floor below which a computed horizon is never returned (except the
    /// degenerate `percent = 0` case).
    pub min_horizon: Duration,
    /// Fraction of the base duration used as the jitter span in
    /// `compute_horizon_with_jitter`.
    pub jitter_fraction: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            percent_cap: 90.0,
            min_horizon: Duration::from_secs(1),
            jitter_fraction: 0.1,
        }
    }
}

/// Options for [`crate::event_stream::supervisor`].
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Consecutive stream errors before the supervisor gives up and requeues.
    pub error_threshold: u32,
    /// Bound on waiting for a superseded watcher's `stopped_rx` to close.
    pub stop_wait: Duration,
    /// Default jittered delay used by the event handler layer when none is
    /// supplied by the caller.
    pub max_requeue_after: Duration,
    /// Fan-out channel capacity used by the shared dispatcher (C7).
    pub dispatcher_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            stop_wait: Duration::from_secs(120),
            max_requeue_after: Duration::from_secs(1),
            dispatcher_capacity: 10,
        }
    }
}
