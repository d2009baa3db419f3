//! Millisecond countdown used by every bounded wait.
//!
//! There is one countdown per driver and it is shared between two contexts:
//! protocol code arms it and polls [`TimeoutClock::expired`], while a 1 kHz
//! periodic interrupt decrements it through [`TickDriver`]. The tick adapter
//! is the designated writer; protocol code never decrements. Plain
//! load/store atomics are enough because the interrupt cannot interleave
//! inside a single store on the main context.
//!
//! Bounded waits must not nest: arming overwrites any in-flight countdown.

use core::sync::atomic::{AtomicU32, Ordering};

/// Shared millisecond countdown.
pub struct TimeoutClock {
    remaining: AtomicU32,
}

impl TimeoutClock {
    /// Creates an expired clock.
    pub const fn new() -> Self {
        TimeoutClock {
            remaining: AtomicU32::new(0),
        }
    }

    /// Starts a countdown of `ms` milliseconds, replacing any previous one.
    pub fn arm(&self, ms: u32) {
        self.remaining.store(ms, Ordering::Relaxed);
    }

    /// Whether the countdown reached zero. Stays true until the next arm.
    pub fn expired(&self) -> bool {
        self.remaining.load(Ordering::Relaxed) == 0
    }
}

impl Default for TimeoutClock {
    fn default() -> Self {
        TimeoutClock::new()
    }
}

/// Interrupt-side adapter for a [`TimeoutClock`].
///
/// Call [`TickDriver::tick`] from the 1 kHz timer interrupt. Nothing else
/// may decrement the countdown.
pub struct TickDriver<'a> {
    clock: &'a TimeoutClock,
}

impl<'a> TickDriver<'a> {
    pub fn new(clock: &'a TimeoutClock) -> Self {
        TickDriver { clock }
    }

    /// One millisecond elapsed; decrement, stopping at zero.
    pub fn tick(&self) {
        let remaining = self.clock.remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.clock.remaining.store(remaining - 1, Ordering::Relaxed);
        }
    }
}
