//! The runtime race-trace log: the host-visible record of every race
//! candidate [`crate::memory::MemoryTracker`] flags.
//!
//! Mirrors `struct dart_rtrace` — an atomic entry counter in front of a
//! fixed-capacity buffer of `{from_hash, into_hash, address, size}`
//! quadruples. `count` is bumped on every record, even once the buffer is
//! full, so a host reading the kernel region after the fact can tell "no
//! races" apart from "more races than `_RTRACE_ENTRY_MAX` could hold".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dart_protocol::layout::RTRACE_ENTRY_MAX;

use crate::memory::RaceEvent;

/// One race-trace record: the earlier context's ctxt hash, the later
/// (conflicting) context's ctxt hash, the racing address, and its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceTraceEntry {
    pub from_hash: u64,
    pub into_hash: u64,
    pub address: u64,
    pub size: u64,
}

impl RaceTraceEntry {
    fn from_event(event: &RaceEvent) -> Self {
        RaceTraceEntry {
            from_hash: event.earlier.ctxt,
            into_hash: event.later.ctxt,
            address: event.shadow_addr,
            size: crate::memory::SHADOW_SIZE,
        }
    }
}

pub struct RaceTraceLog {
    entries: Mutex<Vec<RaceTraceEntry>>,
    count: AtomicU64,
}

impl RaceTraceLog {
    pub fn new() -> Self {
        RaceTraceLog { entries: Mutex::new(Vec::new()), count: AtomicU64::new(0) }
    }

    /// Reserves the next entry slot and appends if it falls within
    /// `_RTRACE_ENTRY_MAX`; past the cap the entry is dropped but `count`
    /// still advances, matching `rtrace_record`'s `atomic64_fetch_inc`
    /// then bounds check before ever touching the buffer.
    pub fn record(&self, event: &RaceEvent) {
        let index = self.count.fetch_add(1, Ordering::AcqRel);
        if index >= RTRACE_ENTRY_MAX {
            return;
        }
        self.entries.lock().unwrap().push(RaceTraceEntry::from_event(event));
    }

    /// Total entries ever recorded, including ones dropped past the cap.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn entries(&self) -> Vec<RaceTraceEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl Default for RaceTraceLog {
    fn default() -> Self {
        Self::new()
    }
}
