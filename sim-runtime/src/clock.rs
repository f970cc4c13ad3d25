//! Clock flavors feeding a [`crate::Scheduler`]: wall-clock (real time, for
//! interactive runs), Timer-peripheral-backed (the emulated CPU's own timer,
//! which also owns drift/jitter semantics), and virtual (a pure counter
//! advanced explicitly by the driver loop — the only flavor that makes test
//! scenarios reproducible).
//!
//! Grounded in `runtime.py`'s `Clock` hierarchy and `vtimeloop.py`'s
//! `VirtualTimeLoop`, which replaces wall-clock waits with direct ticks
//! advancement so `asyncio.sleep` calls resolve instantly in test mode.

use std::any::Any;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::Tick;

/// Ticks per second used throughout the simulator's timebase (matches the
/// emulated Timer peripheral's native resolution).
pub const TICKS_PER_SEC: u64 = 32_768;

/// A source of "now" for the scheduler, in both ticks and seconds.
pub trait Clock: Send {
    /// Current time in ticks. `settle` is a hint that the caller is about to
    /// drain the scheduler and wants a stable snapshot rather than a value
    /// that might advance again within the same call (only meaningful for
    /// [`WallClock`]; other flavors ignore it).
    fn ticks(&self, settle: bool) -> Tick;

    /// Current time in fractional seconds.
    fn time(&self) -> f64 {
        self.ticks(false) as f64 / TICKS_PER_SEC as f64
    }

    fn ticks2time(&self, ticks: Tick) -> f64 {
        ticks as f64 / TICKS_PER_SEC as f64
    }

    fn time2ticks(&self, seconds: f64) -> Tick {
        (seconds * TICKS_PER_SEC as f64).round() as Tick
    }

    fn sec2ticks(&self, seconds: f64) -> Tick {
        self.time2ticks(seconds)
    }

    /// Downcast support so tests can drive a [`VirtualClock`] directly through
    /// the trait object stored in a `Scheduler`.
    fn as_any_virtual(&self) -> Option<&VirtualClock> {
        None
    }
}

/// Real wall-clock time, anchored at construction so ticks start at zero.
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        WallClock { epoch: Instant::now() }
    }

    /// Wall-clock ticks since the Unix epoch, for logging/correlation only.
    pub fn unix_ticks(&self) -> Tick {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        (now.as_secs_f64() * TICKS_PER_SEC as f64) as Tick
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn ticks(&self, _settle: bool) -> Tick {
        let elapsed = self.epoch.elapsed();
        (elapsed.as_secs_f64() * TICKS_PER_SEC as f64) as Tick
    }
}

/// A clock backed by the emulated Timer peripheral's free-running counter, so
/// scheduler time advances exactly in step with CPU-visible ticks (the value
/// a firmware image reads back from the Timer's COUNT register matches what
/// drove its own scheduled callbacks).
pub struct PeripheralClock {
    counter: AtomicI64,
}

impl PeripheralClock {
    pub fn new() -> Self {
        PeripheralClock { counter: AtomicI64::new(0) }
    }

    /// Called by the Timer peripheral after each CPU step to publish its
    /// free-running counter value.
    pub fn set_ticks(&self, ticks: Tick) {
        self.counter.store(ticks as i64, Ordering::Relaxed);
    }
}

impl Default for PeripheralClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for PeripheralClock {
    fn ticks(&self, _settle: bool) -> Tick {
        self.counter.load(Ordering::Relaxed).max(0) as Tick
    }
}

/// A pure counter, advanced only by explicit calls from the test driver.
/// This is the flavor that makes scenarios deterministic: `step()` never
/// observes time moving on its own, so a scenario's outcome depends only on
/// the sequence of `advance_to`/`advance_by` calls the test issues.
pub struct VirtualClock {
    now: AtomicI64,
}

impl VirtualClock {
    pub fn new() -> Self {
        VirtualClock { now: AtomicI64::new(0) }
    }

    pub fn advance_to(&self, ticks: Tick) {
        let ticks = ticks as i64;
        let mut current = self.now.load(Ordering::Relaxed);
        while ticks > current {
            match self.now.compare_exchange_weak(
                current,
                ticks,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn advance_by(&self, delta_ticks: Tick) {
        self.now.fetch_add(delta_ticks as i64, Ordering::Relaxed);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn ticks(&self, _settle: bool) -> Tick {
        self.now.load(Ordering::Relaxed).max(0) as Tick
    }

    fn as_any_virtual(&self) -> Option<&VirtualClock> {
        Some(self)
    }
}

/// Convenience so a boxed `dyn Clock` can still be matched against `Any` when
/// an owner needs the concrete type back (e.g. a CLI that built a
/// `VirtualClock` and wants to drive it after handing the trait object off).
pub trait ClockExt {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Clock + 'static> ClockExt for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_never_advances_on_its_own() {
        let clock = VirtualClock::new();
        assert_eq!(clock.ticks(false), 0);
        assert_eq!(clock.ticks(false), 0);
        clock.advance_by(5);
        assert_eq!(clock.ticks(false), 5);
    }

    #[test]
    fn virtual_clock_advance_to_is_monotonic() {
        let clock = VirtualClock::new();
        clock.advance_to(10);
        clock.advance_to(3);
        assert_eq!(clock.ticks(false), 10);
    }

    #[test]
    fn ticks_and_seconds_round_trip() {
        let clock = VirtualClock::new();
        clock.advance_to(TICKS_PER_SEC * 2);
        assert!((clock.time() - 2.0).abs() < 1e-9);
        assert_eq!(clock.sec2ticks(2.0), TICKS_PER_SEC * 2);
    }

    #[test]
    fn peripheral_clock_reflects_timer_counter() {
        let clock = PeripheralClock::new();
        clock.set_ticks(42);
        assert_eq!(clock.ticks(false), 42);
    }
}
