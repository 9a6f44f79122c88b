//! Per-context control blocks and the admission check, `in_action`, that
//! every instrumented probe site calls before recording anything.
//!
//! One control block exists per PTID (user task, kernel task, or interrupt
//! context). It tracks whether that context currently wants to be traced
//! (`tracing`), whether tracing is temporarily suspended (`paused`, a
//! recursive counter incremented by `exec_pause` and decremented by
//! `exec_resume` so that nested pause regions don't resume each other
//! early), the syscall number or other context tag currently active
//! (`ctxt`), nested call depth (`stack_depth`), and the last basic block
//! id seen (`last_blk`), which feeds the CFG edge the next block closes.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dart_protocol::Ptid;

use crate::hashmap::OpenAddressedMap;
use crate::switch::Switch;

const CB_TABLE_BITS: u32 = 14;

pub struct ControlBlock {
    pub ptid: Ptid,
    pub tracing: AtomicBool,
    pub paused: AtomicI64,
    pub ctxt: AtomicU64,
    pub stack_depth: AtomicU64,
    pub last_blk: AtomicU64,
    pub info: AtomicU64,
}

impl ControlBlock {
    fn new(ptid: Ptid) -> Self {
        ControlBlock {
            ptid,
            tracing: AtomicBool::new(false),
            paused: AtomicI64::new(0),
            ctxt: AtomicU64::new(0),
            stack_depth: AtomicU64::new(0),
            last_blk: AtomicU64::new(0),
            info: AtomicU64::new(0),
        }
    }

    pub fn enter_ctxt(&self, ctxt: u64) {
        self.ctxt.store(ctxt, Ordering::Release);
        self.stack_depth.fetch_add(1, Ordering::AcqRel);
    }

    pub fn exit_ctxt(&self) {
        self.stack_depth.fetch_sub(1, Ordering::AcqRel);
    }

    /// `exec_pause`: increments the recursive pause counter. Hook bodies
    /// short-circuit while the counter is above zero.
    pub fn pause(&self) {
        self.paused.fetch_add(1, Ordering::AcqRel);
    }

    /// `exec_resume`: decrements the recursive pause counter.
    pub fn resume(&self) {
        self.paused.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn is_active(&self) -> bool {
        self.tracing.load(Ordering::Acquire) && self.paused.load(Ordering::Acquire) <= 0
    }
}

/// Registry of control blocks, gated by the data switch: no control block
/// lookup, creation, or `in_action` check does anything while the data
/// switch is off, matching `dart_in_action`'s acquire-then-find protocol.
pub struct ControlBlockTable {
    data_switch: Switch,
    blocks: OpenAddressedMap<Arc<ControlBlock>, CB_TABLE_BITS>,
}

impl ControlBlockTable {
    pub fn new() -> Self {
        ControlBlockTable { data_switch: Switch::new(), blocks: OpenAddressedMap::new() }
    }

    pub fn data_switch(&self) -> &Switch {
        &self.data_switch
    }

    /// Finds the control block for `ptid`, creating one (with tracing off)
    /// if this is the first time this context has been seen.
    pub fn create(&self, ptid: Ptid) -> Arc<ControlBlock> {
        self.blocks.get_or_insert_with(ptid.raw() as u64, || Arc::new(ControlBlock::new(ptid)))
    }

    pub fn find(&self, ptid: Ptid) -> Option<Arc<ControlBlock>> {
        self.blocks.get(ptid.raw() as u64)
    }

    /// The gate every probe site calls before recording a trace entry:
    /// acquires the data switch, looks up the calling context's control
    /// block, and asks whether it wants to be traced right now.
    pub fn in_action(&self, ptid: Ptid) -> bool {
        if !self.data_switch.acquire() {
            return false;
        }
        let active = self.find(ptid).map(|cb| cb.is_active()).unwrap_or(false);
        self.data_switch.release();
        active
    }
}

impl Default for ControlBlockTable {
    fn default() -> Self {
        Self::new()
    }
}
