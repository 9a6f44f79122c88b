//! Lock-free open-addressed hash map.
//!
//! The original runtime generated one of these per (name, bit-width,
//! key-length) triple with a macro; here a single generic type plays that
//! role; see `DESIGN.md` for why that generalization is safe to make.
//!
//! Each slot has a tiny state machine carried in an atomic word:
//! `EMPTY -> CLAIMED -> FILLED`. A writer claims a slot with a single CAS,
//! writes the value behind it, then publishes the real key with a
//! release store. A reader that lands on a `CLAIMED` slot busy-waits
//! (yielding the thread) until the writer finishes or backs out, the same
//! probe-past-a-concurrent-insert behavior the macro-generated C map used.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

const EMPTY: u64 = 0;
const CLAIMED: u64 = u64::MAX;

/// Knuth's multiplicative hash, truncated to `bits` bits.
pub fn knuth_hash(key: u64, bits: u32) -> u64 {
    const GOLDEN_RATIO_64: u64 = 0x9E37_79B9_7F4A_7C15;
    key.wrapping_mul(GOLDEN_RATIO_64) >> (64 - bits)
}

/// Cantor pairing, used to fold two related keys (e.g. a PTID and an
/// instruction address) into one composite key for a chained lookup.
pub fn cantor_pair(a: u64, b: u64) -> u64 {
    let s = a.wrapping_add(b);
    s.wrapping_mul(s.wrapping_add(1)) / 2 + b
}

struct Slot<V> {
    state: AtomicU64,
    value: UnsafeCell<Option<V>>,
}

// SAFETY: access to `value` is gated by the `state` atomic's CLAIMED/FILLED
// protocol below; a slot is only read or written while holding the
// exclusive right to do so that the state transition grants.
unsafe impl<V: Send> Sync for Slot<V> {}

/// A fixed-capacity open-addressed map with `2^BITS` slots, keyed by a raw
/// `u64`. Keys equal to zero are not representable (zero means "empty"),
/// matching the original's convention that a real key is never zero.
pub struct OpenAddressedMap<V, const BITS: u32> {
    slots: Vec<Slot<V>>,
}

impl<V: Clone, const BITS: u32> OpenAddressedMap<V, BITS> {
    pub fn new() -> Self {
        let len = 1usize << BITS;
        let mut slots = Vec::with_capacity(len);
        for _ in 0..len {
            slots.push(Slot { state: AtomicU64::new(EMPTY), value: UnsafeCell::new(None) });
        }
        OpenAddressedMap { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn probe_sequence(&self, key: u64) -> impl Iterator<Item = usize> + '_ {
        let start = knuth_hash(key, BITS) as usize;
        let len = self.slots.len();
        (0..len).map(move |i| (start + i) % len)
    }

    /// Returns the existing value for `key`, or inserts `make()` and
    /// returns that. Never returns `None`: the table is sized generously
    /// enough (by its `BITS` parameter) that probing always finds either
    /// the key or free space before wrapping around.
    pub fn get_or_insert_with(&self, key: u64, make: impl FnOnce() -> V) -> V {
        debug_assert_ne!(key, EMPTY, "key 0 is reserved to mean empty");
        let mut make = Some(make);
        for idx in self.probe_sequence(key) {
            let slot = &self.slots[idx];
            loop {
                match slot.state.compare_exchange(EMPTY, CLAIMED, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(_) => {
                        let value = (make.take().unwrap())();
                        // SAFETY: this thread holds the CLAIMED state, which
                        // is the only state permitting a write to `value`.
                        unsafe { *slot.value.get() = Some(value.clone()) };
                        slot.state.store(key, Ordering::Release);
                        return value;
                    }
                    Err(CLAIMED) => {
                        std::thread::yield_now();
                        continue;
                    }
                    Err(existing) if existing == key => {
                        // SAFETY: state is FILLED (a real key), so `value`
                        // is fully written and safe to read.
                        return unsafe { (*slot.value.get()).clone().unwrap() };
                    }
                    Err(_) => break,
                }
            }
        }
        unreachable!("hash map probe exhausted without finding key or free slot");
    }

    /// Read-only lookup: never inserts, never busy-waits past a concurrent
    /// insert of a *different* key, only past one that might turn out to be
    /// this key.
    pub fn get(&self, key: u64) -> Option<V> {
        debug_assert_ne!(key, EMPTY);
        for idx in self.probe_sequence(key) {
            let slot = &self.slots[idx];
            loop {
                let state = slot.state.load(Ordering::Acquire);
                if state == EMPTY {
                    return None;
                }
                if state == CLAIMED {
                    std::thread::yield_now();
                    continue;
                }
                if state == key {
                    // SAFETY: FILLED state guarantees `value` is written.
                    return unsafe { (*slot.value.get()).clone() };
                }
                break;
            }
        }
        None
    }

    pub fn has(&self, key: u64) -> bool {
        self.get(key).is_some()
    }

    pub fn for_each(&self, mut f: impl FnMut(u64, &V)) {
        for slot in &self.slots {
            let state = slot.state.load(Ordering::Acquire);
            if state != EMPTY && state != CLAIMED {
                // SAFETY: FILLED state guarantees `value` is written; we
                // only take a shared reference, matching the `&V` contract.
                if let Some(v) = unsafe { (*slot.value.get()).as_ref() } {
                    f(state, v);
                }
            }
        }
    }
}

impl<V: Clone, const BITS: u32> Default for OpenAddressedMap<V, BITS> {
    fn default() -> Self {
        Self::new()
    }
}
