//! Shadow-memory race detection.
//!
//! Every load/store the bytecode interpreter performs is reported here
//! keyed by its 8-byte-aligned "shadow" address (`addr & !0x7`, the same
//! granularity the original shadow tables used, since sub-word races are
//! still races at the cache-line level DART cares about). Two shadow
//! tables — one for the last writer, one for the last reader — record
//! which context touched a shadow word last. Unlike the control-block
//! table, a slot here is updated on *every* access: the map only
//! guarantees a cell is claimed once, but the cell's fields are plain
//! atomics this tracker overwrites in place, so `last_access` always
//! reflects the most recent touch rather than only the first.
//!
//! A new access conflicts with what's recorded if the recorded access
//! came from a different context and at least one side is a write;
//! that's reported as a race candidate.
//!
//! Stack-local addresses are masked out: a thread's own stack is private
//! to it, so two threads touching "the same" shadow address on their own,
//! unrelated stacks is not a race.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use dart_protocol::Ptid;

use crate::hashmap::OpenAddressedMap;

const SHADOW_TABLE_BITS: u32 = 20;

pub const SHADOW_SIZE: u64 = 8;

pub fn addr_to_shadow(addr: u64) -> u64 {
    addr & !(SHADOW_SIZE - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCell {
    pub ptid: Ptid,
    pub ctxt: u64,
    pub inst: u64,
    pub kind: AccessKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceEvent {
    pub shadow_addr: u64,
    pub earlier: MemoryCell,
    pub later: MemoryCell,
}

/// A mutable last-accessor slot. One exists per (table, shadow key) pair
/// once claimed; its fields are then overwritten on every subsequent
/// access to that shadow word, which is what lets `last_access` mean
/// "most recent" rather than "first ever".
struct AccessSlot {
    valid: AtomicBool,
    ptid: AtomicU32,
    ctxt: AtomicU64,
    inst: AtomicU64,
}

impl AccessSlot {
    fn new() -> Self {
        AccessSlot {
            valid: AtomicBool::new(false),
            ptid: AtomicU32::new(0),
            ctxt: AtomicU64::new(0),
            inst: AtomicU64::new(0),
        }
    }

    /// Reads the currently recorded access, if any has landed yet.
    fn load(&self, kind: AccessKind) -> Option<MemoryCell> {
        if !self.valid.load(Ordering::Acquire) {
            return None;
        }
        Some(MemoryCell {
            ptid: Ptid::from_raw(self.ptid.load(Ordering::Acquire)),
            ctxt: self.ctxt.load(Ordering::Acquire),
            inst: self.inst.load(Ordering::Acquire),
            kind,
        })
    }

    fn store(&self, cell: MemoryCell) {
        self.ptid.store(cell.ptid.raw(), Ordering::Release);
        self.ctxt.store(cell.ctxt, Ordering::Release);
        self.inst.store(cell.inst, Ordering::Release);
        self.valid.store(true, Ordering::Release);
    }
}

/// Shadow keys are `addr & !7`, which can legitimately be zero (address
/// zero is never a valid heap pointer in this interpreter, but the shadow
/// table's key space reserves zero as "unclaimed"). Fold that one case
/// onto a dedicated sentinel instead of `u64::MAX`: the map's own
/// `CLAIMED` marker *is* `u64::MAX`, so using it as a key would make every
/// lookup for shadow address 0 spin forever mistaking a real entry for an
/// in-progress insert. `u64::MAX - 1` is never produced by
/// `addr_to_shadow` (its low 3 bits are always clear; `u64::MAX - 1`'s
/// aren't) and isn't `EMPTY` or `CLAIMED`.
const ZERO_ADDRESS_SHADOW_KEY: u64 = u64::MAX - 1;

fn shadow_key(shadow_addr: u64) -> u64 {
    if shadow_addr == 0 {
        ZERO_ADDRESS_SHADOW_KEY
    } else {
        shadow_addr
    }
}

pub struct MemoryTracker {
    readers: OpenAddressedMap<Arc<AccessSlot>, SHADOW_TABLE_BITS>,
    writers: OpenAddressedMap<Arc<AccessSlot>, SHADOW_TABLE_BITS>,
    stack_ranges: RwLock<Vec<(Ptid, u64, u64)>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        MemoryTracker {
            readers: OpenAddressedMap::new(),
            writers: OpenAddressedMap::new(),
            stack_ranges: RwLock::new(Vec::new()),
        }
    }

    /// Registers `[base, base+size)` as `ptid`'s stack region. Accesses
    /// within it are exempt from race reporting.
    pub fn register_stack(&self, ptid: Ptid, base: u64, size: u64) {
        self.stack_ranges.write().unwrap().push((ptid, base, base + size));
    }

    fn is_stack_local(&self, ptid: Ptid, addr: u64) -> bool {
        self.stack_ranges
            .read()
            .unwrap()
            .iter()
            .any(|(p, lo, hi)| *p == ptid && addr >= *lo && addr < *hi)
    }

    fn conflicts(candidate: Option<MemoryCell>, ptid: Ptid, this_kind: AccessKind) -> Option<MemoryCell> {
        candidate.filter(|earlier| {
            earlier.ptid != ptid && (earlier.kind == AccessKind::Write || this_kind == AccessKind::Write)
        })
    }

    /// Records an access, returning a race candidate if this access
    /// conflicts with the last recorded access to the same shadow word.
    /// Mirrors §4.5: a reader checks the writer table only; a writer
    /// checks both tables, since a write conflicts with any prior reader
    /// or writer from a different context.
    pub fn record_access(
        &self,
        ptid: Ptid,
        ctxt: u64,
        inst: u64,
        addr: u64,
        kind: AccessKind,
    ) -> Option<RaceEvent> {
        if self.is_stack_local(ptid, addr) {
            return None;
        }
        let shadow_addr = addr_to_shadow(addr);
        let key = shadow_key(shadow_addr);
        let cell = MemoryCell { ptid, ctxt, inst, kind };

        let writer_slot = self.writers.get_or_insert_with(key, || Arc::new(AccessSlot::new()));
        let race_vs_writer = Self::conflicts(writer_slot.load(AccessKind::Write), ptid, kind);

        let race = match kind {
            AccessKind::Write => {
                let reader_slot = self.readers.get_or_insert_with(key, || Arc::new(AccessSlot::new()));
                let race_vs_reader = Self::conflicts(reader_slot.load(AccessKind::Read), ptid, kind);
                writer_slot.store(cell);
                race_vs_writer.or(race_vs_reader)
            }
            AccessKind::Read => {
                let reader_slot = self.readers.get_or_insert_with(key, || Arc::new(AccessSlot::new()));
                reader_slot.store(cell);
                race_vs_writer
            }
        };

        race.map(|earlier| RaceEvent { shadow_addr, earlier, later: cell })
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}
