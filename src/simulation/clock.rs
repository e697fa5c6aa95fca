//! Virtual and wall clocks
//!
//! Virtual time is a count of seconds since the Unix epoch held as `f64`.
//! It only moves forward, and only when the scheduler dispatches an event.
//! The current value lives in an atomic so other threads can read it while
//! the scheduler runs.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::simulation::{SimulationError, SimulationResult};
use crate::types::TimeSpec;

/// Seconds in `n` minutes
pub fn minutes(n: f64) -> f64 {
    n * 60.0
}

/// Seconds in `n` hours
pub fn hours(n: f64) -> f64 {
    n * 60.0 * 60.0
}

/// Seconds in `n` days
pub fn days(n: f64) -> f64 {
    n * 60.0 * 60.0 * 24.0
}

/// Epoch seconds to epoch milliseconds
pub fn to_millis(t: f64) -> i64 {
    (t * 1000.0).round() as i64
}

/// Render epoch seconds as an RFC 3339 timestamp
pub fn format_time(t: f64) -> String {
    let millis = to_millis(t);
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        None => format!("{}", t),
    }
}

/// Source of real time
pub trait WallClock: Send + Sync + fmt::Debug {
    /// Current real time in epoch seconds
    fn now(&self) -> f64;
}

/// The operating system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> f64 {
        datetime_to_secs(Utc::now())
    }
}

fn datetime_to_secs(dt: DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1e6
}

/// A wall clock that only moves when told to
///
/// Used to drive live-mode behavior deterministically.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock reading `t`
    pub fn new(t: f64) -> Self {
        Self { now: Arc::new(AtomicU64::new(t.to_bits())) }
    }

    /// Set the reading
    pub fn set(&self, t: f64) {
        self.now.store(t.to_bits(), Ordering::SeqCst);
    }

    /// Move the reading forward by `dt` seconds
    pub fn advance(&self, dt: f64) {
        let t = f64::from_bits(self.now.load(Ordering::SeqCst)) + dt;
        self.set(t);
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.now.load(Ordering::SeqCst))
    }
}

/// Read-only view of a [`VirtualClock`] that can cross threads
#[derive(Debug, Clone)]
pub struct ClockReader {
    current: Arc<AtomicU64>,
}

impl ClockReader {
    /// Current virtual time
    pub fn now(&self) -> f64 {
        f64::from_bits(self.current.load(Ordering::Acquire))
    }
}

/// The simulation's notion of current time
#[derive(Debug, Clone)]
pub struct VirtualClock {
    current: Arc<AtomicU64>,
    end_time: Option<f64>,
    live: Arc<AtomicBool>,
    wall: Arc<dyn WallClock>,
}

impl VirtualClock {
    /// Create a clock at epoch 0 backed by the system clock
    pub fn new() -> Self {
        Self::with_wall_clock(Arc::new(SystemClock))
    }

    /// Create a clock at epoch 0 backed by the given wall clock
    pub fn with_wall_clock(wall: Arc<dyn WallClock>) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(0f64.to_bits())),
            end_time: None,
            live: Arc::new(AtomicBool::new(true)),
            wall,
        }
    }

    /// Set the current time from a time specification and return it
    pub fn set_start(&mut self, spec: TimeSpec) -> f64 {
        let t = self.resolve(spec);
        self.current.store(t.to_bits(), Ordering::Release);
        t
    }

    /// Set the end of the timeline; `None` means the run is live
    pub fn set_end(&mut self, spec: Option<TimeSpec>) {
        self.end_time = spec.map(|s| self.resolve(s));
        self.live.store(self.end_time.is_none(), Ordering::Release);
    }

    fn resolve(&self, spec: TimeSpec) -> f64 {
        match spec {
            TimeSpec::Now => self.wall.now(),
            TimeSpec::At(t) => t,
        }
    }

    /// Current virtual time
    pub fn now(&self) -> f64 {
        f64::from_bits(self.current.load(Ordering::Acquire))
    }

    /// Move virtual time forward to `t`
    ///
    /// Moving to the current time is allowed. Moving backward, or to a time
    /// that is not a number, is an ordering violation.
    pub fn advance_to(&self, t: f64) -> SimulationResult<()> {
        let current = self.now();
        if !(t >= current) {
            return Err(SimulationError::ordering_violation(t, current));
        }
        self.current.store(t.to_bits(), Ordering::Release);
        Ok(())
    }

    /// End of the timeline, if bounded
    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    /// Whether the run has no end time
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Current real time
    pub fn wall_now(&self) -> f64 {
        self.wall.now()
    }

    /// The wall clock backing this clock
    pub fn wall_clock(&self) -> Arc<dyn WallClock> {
        Arc::clone(&self.wall)
    }

    /// A cheap cross-thread reader of the current time
    pub fn reader(&self) -> ClockReader {
        ClockReader { current: Arc::clone(&self.current) }
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}
