//! The runtime handle: one value aggregating every piece of tracing
//! state a probe site might touch, replacing what the original kept as
//! a handful of independent global kernel statics.
//!
//! Bundling them behind one handle means the whole runtime can be
//! constructed fresh per test, per instance, or (in production) once at
//! module load — there is nothing implicitly global left to leak state
//! between instances.

use dart_protocol::Ptid;

use crate::async_event::{AsyncRegistry, HostSnapshot};
use crate::control_block::{ControlBlock, ControlBlockTable};
use crate::coverage::Coverage;
use crate::memory::{AccessKind, MemoryTracker, RaceEvent};
use crate::rtrace::RaceTraceLog;
use crate::switch::Switch;
use std::sync::Arc;

pub struct Runtime {
    pub control_blocks: ControlBlockTable,
    pub coverage: Coverage,
    pub memory: MemoryTracker,
    pub async_events: AsyncRegistry,
    /// The host-visible race-trace log every admitted memory access feeds.
    pub rtrace: RaceTraceLog,
    /// Gates whether metadata (control blocks, switches themselves) may be
    /// mutated; separate from the data switch gating trace recording.
    pub meta_switch: Switch,
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            control_blocks: ControlBlockTable::new(),
            coverage: Coverage::new(),
            memory: MemoryTracker::new(),
            async_events: AsyncRegistry::new(),
            rtrace: RaceTraceLog::new(),
            meta_switch: Switch::new(),
        }
    }

    /// Brings a fresh instance online: turns both switches on and creates
    /// the main thread's control block with tracing enabled.
    pub fn start_instance(&self, main_ptid: Ptid) -> Arc<ControlBlock> {
        self.meta_switch.turn_on();
        self.control_blocks.data_switch().turn_on();
        let cb = self.control_blocks.create(main_ptid);
        cb.tracing.store(true, std::sync::atomic::Ordering::Release);
        cb
    }

    pub fn stop_instance(&self) {
        self.control_blocks.data_switch().turn_off();
        self.meta_switch.turn_off();
    }

    /// `syscall_enter`: the user→kernel hook the interpreter fires just
    /// before issuing a syscall. A no-op while the meta switch is off (no
    /// new contexts may be entered); otherwise finds or creates this
    /// PTID's control block and marks it as actively tracing the given
    /// syscall, resetting the per-call state (`stack_depth`, `last_blk`)
    /// so a new syscall starts from a clean slate.
    pub fn syscall_enter(&self, ptid: Ptid, sysno: i64) {
        if !self.meta_switch.is_on() {
            return;
        }
        let cb = self.control_blocks.create(ptid);
        cb.ctxt.store(crate::hashmap::knuth_hash(sysno as u64, 64), std::sync::atomic::Ordering::Release);
        cb.stack_depth.store(0, std::sync::atomic::Ordering::Release);
        cb.last_blk.store(0, std::sync::atomic::Ordering::Release);
        cb.tracing.store(true, std::sync::atomic::Ordering::Release);
    }

    /// `syscall_exit`: the matching hook fired right after the syscall
    /// returns. Ignores a spurious exit (no CB, or the CB isn't currently
    /// tracing) rather than erroring — the normal case for code paths
    /// that never ran through `syscall_enter` to begin with. Asserts the
    /// function-call stack is balanced before clearing `tracing`: every
    /// `exec_func_enter` this syscall made must have been matched by an
    /// `exec_func_exit`.
    pub fn syscall_exit(&self, ptid: Ptid, sysno: i64) {
        let Some(cb) = self.control_blocks.find(ptid) else { return };
        if !cb.tracing.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
        let depth = cb.stack_depth.load(std::sync::atomic::Ordering::Acquire);
        assert_eq!(depth, 0, "control block for ptid {:#x} left syscall {sysno} with unbalanced stack depth {depth}", ptid.raw());
        cb.tracing.store(false, std::sync::atomic::Ordering::Release);
    }

    /// The hook every probe site calls on entering a basic block: checks
    /// admission, records the CFG edge from the context's last block, and
    /// advances `last_blk`.
    pub fn on_basic_block(&self, ptid: Ptid, blk_id: u64) {
        if !self.control_blocks.in_action(ptid) {
            return;
        }
        let Some(cb) = self.control_blocks.find(ptid) else { return };
        let prev = cb.last_blk.swap(blk_id, std::sync::atomic::Ordering::AcqRel);
        if prev != 0 {
            let _ = self.coverage.add_cfg_edge(prev, blk_id);
        }
    }

    /// The hook every probe site calls on a memory access. Any race
    /// candidate the tracker flags is also appended to `rtrace` as a
    /// `{from_hash,into_hash,address,size}` quadruple before being
    /// returned to the caller.
    pub fn on_memory_access(&self, ptid: Ptid, ctxt: u64, inst: u64, addr: u64, kind: AccessKind) -> Option<RaceEvent> {
        if !self.control_blocks.in_action(ptid) {
            return None;
        }
        let race = self.memory.record_access(ptid, ctxt, inst, addr, kind);
        if let Some(event) = &race {
            self.rtrace.record(event);
        }
        race
    }

    /// Schedules an async callback, snapshotting the calling context.
    pub fn schedule_async(&self, ptid: Ptid, event_id: u64, func: u64, info: u64) {
        let Some(cb) = self.control_blocks.find(ptid) else { return };
        let snapshot = HostSnapshot {
            ptid,
            ctxt: cb.ctxt.load(std::sync::atomic::Ordering::Acquire),
            last_blk: cb.last_blk.load(std::sync::atomic::Ordering::Acquire),
        };
        self.async_events.register(event_id, func, info, snapshot);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// The four `cmd` values the DART syscall (number 500) recognizes. Any
/// other value is `UnknownCommand` and the dispatcher returns `-1`
/// without touching runtime state, matching the original syscall's
/// "unknown commands return -1" contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DartSyscallCmd {
    Launch,
    Finish,
    SyscallEnter,
    SyscallExit,
}

impl DartSyscallCmd {
    pub fn from_raw(cmd: i64) -> Option<Self> {
        match cmd {
            1 => Some(DartSyscallCmd::Launch),
            2 => Some(DartSyscallCmd::Finish),
            3 => Some(DartSyscallCmd::SyscallEnter),
            4 => Some(DartSyscallCmd::SyscallExit),
            _ => None,
        }
    }
}

impl Runtime {
    /// Entry point for the DART syscall: `(cmd, arg)` dispatched to
    /// `start_instance`/`stop_instance`/`syscall_enter`/`syscall_exit`.
    /// `arg` is the calling task's `sysno` for the enter/exit commands and
    /// ignored otherwise. Returns `0` on success, `-1` for an unrecognized
    /// `cmd` — the caller (a real syscall handler) would surface that as
    /// `errno`, which this dispatcher models as a plain return value since
    /// there is no process boundary here to carry one across.
    pub fn dart_syscall(&self, ptid: Ptid, cmd: i64, arg: i64) -> i64 {
        match DartSyscallCmd::from_raw(cmd) {
            Some(DartSyscallCmd::Launch) => {
                self.start_instance(ptid);
                0
            }
            Some(DartSyscallCmd::Finish) => {
                self.stop_instance();
                0
            }
            Some(DartSyscallCmd::SyscallEnter) => {
                self.syscall_enter(ptid, arg);
                0
            }
            Some(DartSyscallCmd::SyscallExit) => {
                self.syscall_exit(ptid, arg);
                0
            }
            None => -1,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_basic_block_records_edge_after_first_block() {
        let rt = Runtime::new();
        let ptid = Ptid::user_task(1);
        rt.start_instance(ptid);

        rt.on_basic_block(ptid, 10);
        assert_eq!(rt.coverage.cfg_edges.covered_count(), 0);

        rt.on_basic_block(ptid, 20);
        assert_eq!(rt.coverage.cfg_edges.covered_count(), 1);
    }

    #[test]
    fn on_memory_access_is_noop_before_instance_starts() {
        let rt = Runtime::new();
        let ptid = Ptid::user_task(2);
        let race = rt.on_memory_access(ptid, 0, 0, 0x1000, AccessKind::Write);
        assert!(race.is_none());
    }

    #[test]
    fn on_memory_access_feeds_conflicts_into_the_rtrace_log() {
        let rt = Runtime::new();
        let a = Ptid::user_task(20);
        let b = Ptid::user_task(21);
        rt.start_instance(a);
        let cb_b = rt.control_blocks.create(b);
        cb_b.tracing.store(true, std::sync::atomic::Ordering::Release);

        assert!(rt.on_memory_access(a, 0xfeed, 1, 0x9000, AccessKind::Write).is_none());
        assert_eq!(rt.rtrace.count(), 0);

        let race = rt.on_memory_access(b, 0xc0de, 2, 0x9000, AccessKind::Write);
        assert!(race.is_some());
        assert_eq!(rt.rtrace.count(), 1);
        let entries = rt.rtrace.entries();
        assert_eq!(entries[0].from_hash, 0xfeed);
        assert_eq!(entries[0].into_hash, 0xc0de);
        assert_eq!(entries[0].address, 0x9000);
    }

    #[test]
    fn schedule_async_snapshots_caller_context() {
        let rt = Runtime::new();
        let ptid = Ptid::user_task(3);
        let cb = rt.start_instance(ptid);
        cb.last_blk.store(77, std::sync::atomic::Ordering::Release);

        rt.schedule_async(ptid, 1, 0xfeed, 0);
        let event = rt.async_events.find(1).unwrap();
        assert_eq!(event.host.last_blk, 77);
    }

    #[test]
    fn syscall_enter_is_noop_while_meta_switch_is_off() {
        let rt = Runtime::new();
        let ptid = Ptid::user_task(10);
        rt.syscall_enter(ptid, 0);
        assert!(rt.control_blocks.find(ptid).is_none());
    }

    #[test]
    fn syscall_enter_then_exit_toggles_tracing() {
        let rt = Runtime::new();
        let ptid = Ptid::user_task(11);
        rt.meta_switch.turn_on();

        rt.syscall_enter(ptid, 3);
        let cb = rt.control_blocks.find(ptid).unwrap();
        assert!(cb.tracing.load(std::sync::atomic::Ordering::Acquire));

        rt.syscall_exit(ptid, 3);
        assert!(!cb.tracing.load(std::sync::atomic::Ordering::Acquire));
    }

    #[test]
    #[should_panic(expected = "unbalanced stack depth")]
    fn syscall_exit_panics_on_unbalanced_stack_depth() {
        let rt = Runtime::new();
        let ptid = Ptid::user_task(12);
        rt.meta_switch.turn_on();

        rt.syscall_enter(ptid, 3);
        let cb = rt.control_blocks.find(ptid).unwrap();
        cb.enter_ctxt(0);
        rt.syscall_exit(ptid, 3);
    }

    #[test]
    fn syscall_exit_is_noop_for_spurious_exit() {
        let rt = Runtime::new();
        let ptid = Ptid::user_task(13);
        // No matching syscall_enter ever happened; must not panic.
        rt.syscall_exit(ptid, 9);
    }
}
