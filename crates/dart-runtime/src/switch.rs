//! Admission-gating counter used to turn whole subsystems (the meta and
//! data tracing paths) on and off without a lock.
//!
//! A switch is a single `u32`: `0` means off, `1` means on and idle, and
//! any value above `1` means on with `value - 1` active acquirers. Turning
//! a switch on is a one-shot CAS from `0`; turning it off spins until all
//! acquirers have released and the count is back down to `1`. This mirrors
//! the original's `dart_switch(name)` macro and its four operations.

use std::sync::atomic::{AtomicU32, Ordering};

pub struct Switch(AtomicU32);

impl Switch {
    pub const fn new() -> Self {
        Switch(AtomicU32::new(0))
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::Acquire) != 0
    }

    /// Turns the switch on. Panics if it was already on, the same `BUG_ON`
    /// the original performs on a failed CAS.
    pub fn turn_on(&self) {
        self.0
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .expect("switch turned on twice");
    }

    /// Turns the switch off, waiting for any in-flight acquirers to
    /// release first.
    pub fn turn_off(&self) {
        loop {
            if self.0.compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return;
            }
            std::thread::yield_now();
        }
    }

    /// Attempts to acquire; fails (returns `false`) if the switch is off.
    pub fn acquire(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.0.compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases a previously successful `acquire`. Panics on an unbalanced
    /// release, matching the original's `BUG_ON(result <= 0)`.
    pub fn release(&self) {
        let previous = self.0.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 1, "switch released without a matching acquire");
    }
}

impl Default for Switch {
    fn default() -> Self {
        Self::new()
    }
}
