//! End-to-end scenarios exercising multiple crates together, the way a
//! real continuation run would touch protocol parsing, the runtime, the
//! strace ledger, and the scheduler all in one pass.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use dart_guest::disk::MockDiskMount;
use dart_guest::syscalls::MockSyscallBackend;
use dart_guest::ThreadScheduler;
use dart_protocol::bytecode::BytecodeRegion;
use dart_protocol::ledger::{Ledger, ReserveLedger};
use dart_protocol::ptid::Ptid;
use dart_runtime::async_event::HostSnapshot;
use dart_runtime::Runtime;
use dart_strace::{ConsoleLedger, FormatterTable};

use testing::dummy_stream;

/// S1: a well-formed bytecode region parses through every section, its
/// pointer table fixes up correctly against the heap, and its per-thread
/// code table reports the right offsets — the full parse pipeline a guest
/// runs once per bytecode region before interpreting anything.
#[test]
fn scenario_parses_region_and_fixes_up_pointers() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&dart_protocol::bytecode::MAGIC);
    let off_meta = 32u64;
    let off_code = off_meta + 8 + 3 * 8 + 8; // num_ptrs(1) + 3 off_ptrs + num_fds(0)
    let heap_base = 4096u64;
    bytes.extend_from_slice(&off_meta.to_le_bytes());
    bytes.extend_from_slice(&off_code.to_le_bytes());
    bytes.extend_from_slice(&heap_base.to_le_bytes());

    // region_meta_ptr: 3 pointer slots, one of them null.
    bytes.extend_from_slice(&3u64.to_le_bytes());
    bytes.extend_from_slice(&0x00u64.to_le_bytes());
    bytes.extend_from_slice(&0x20u64.to_le_bytes());
    bytes.extend_from_slice(&0x40u64.to_le_bytes());

    // region_meta_fd: empty.
    bytes.extend_from_slice(&0u64.to_le_bytes());

    // region_code: 2 threads.
    let code_header_len = 8 + 8 + 2 * 8;
    bytes.extend_from_slice(&2u64.to_le_bytes()); // num_threads
    bytes.extend_from_slice(&code_header_len.to_le_bytes()); // offset_main
    bytes.extend_from_slice(&10u64.to_le_bytes()); // offset_subs[0]
    bytes.extend_from_slice(&20u64.to_le_bytes()); // offset_subs[1]

    // Extend the region out to the heap and plant the pointer words the
    // fixup pass reads: slot 0 stays null, slots 1 and 2 hold relative
    // heap pointers that should come back with `heap_base` added in.
    bytes.resize(heap_base as usize + 0x48, 0);
    bytes[heap_base as usize + 0x20..heap_base as usize + 0x28].copy_from_slice(&0x1000u64.to_le_bytes());
    bytes[heap_base as usize + 0x40..heap_base as usize + 0x48].copy_from_slice(&0x2000u64.to_le_bytes());

    let region = BytecodeRegion::parse_and_fixup(&mut bytes).unwrap();
    assert_eq!(region.code.thread_offset(0).unwrap(), 10);
    assert_eq!(region.code.thread_offset(1).unwrap(), 20);
    assert_eq!(region.meta_ptr.off_ptrs, vec![0x00, 0x20, 0x40]);

    let word = |off: u64| {
        let start = (heap_base + off) as usize;
        u64::from_le_bytes(bytes[start..start + 8].try_into().unwrap())
    };
    assert_eq!(word(0x00), 0, "null pointer word must be left alone");
    assert_eq!(word(0x20), 0x1000 + heap_base);
    assert_eq!(word(0x40), 0x2000 + heap_base);
}

/// S2: a ledger that overflows mid-run still gets fully recovered through
/// a reserve transfer — the entries that fit are all present, the drop
/// past capacity is reflected in the entry count, not silently invisible.
#[test]
fn scenario_ledger_overflow_then_reserve_transfer_preserves_live_entries() {
    let (count, cursor, mut buf) = (AtomicU64::new(0), AtomicU64::new(0), vec![0u8; 16]);
    let mut ledger = Ledger::new(&count, &cursor, &mut buf);

    assert_eq!(ledger.append(b"abcdefgh").unwrap(), Some(0));
    assert_eq!(ledger.append(b"ijklmnop").unwrap(), Some(8));
    assert_eq!(ledger.append(b"overflow").unwrap(), None);
    assert_eq!(ledger.entry_count(), 3);

    let (rcursor, mut rbuf) = (AtomicU64::new(0), vec![0u8; 64]);
    let mut reserve = ReserveLedger::new(&rcursor, &mut rbuf);
    reserve.transfer_ro(1, &ledger).unwrap();

    assert_eq!(&rbuf[24..40], b"abcdefghijklmnop");
}

/// S3: worker threads never run any instruction before the scheduler
/// finishes the precall stream and explicitly releases them. We can't
/// observe thread scheduling order directly, but we can observe that the
/// precall's console line is always recorded before the scheduler returns
/// from `run_continuation`, and that every worker's lines are present
/// too — so the barrier didn't skip anyone and didn't let anyone jump
/// ahead of the single-threaded precall phase.
#[test]
fn scenario_precall_runs_before_worker_fanout_completes() {
    let runtime = Runtime::new();
    let formatters = FormatterTable::new();
    let console = ConsoleLedger::new();
    let scheduler = ThreadScheduler::new(&runtime, &formatters, &console);
    let mut disk = MockDiskMount::default();

    let precall = dummy_stream(1);
    let worker_streams = vec![dummy_stream(2), dummy_stream(3)];

    scheduler
        .run_continuation(
            &mut disk,
            Path::new("/dev/vda"),
            Path::new("/mnt/disk"),
            "ext4",
            &precall,
            &worker_streams,
            &[],
            |_| MockSyscallBackend::default(),
        )
        .unwrap();

    // 1 precall line + 2 + 3 worker lines, all present once the barrier
    // has let every thread finish and rejoin.
    assert_eq!(console.entry_count(), 1 + 2 + 3);
}

/// S4: the control-block admission check is false for every combination
/// except "data switch on, tracing on, not paused" — checked across every
/// context class a PTID can represent.
#[test]
fn scenario_cb_admission_invariant_holds_across_context_classes() {
    let runtime = Runtime::new();
    let ptids = [
        Ptid::user_task(1),
        Ptid::kernel_task(1),
        Ptid::softirq(0),
        Ptid::hardirq(0),
        Ptid::nmi(0),
    ];

    for ptid in ptids {
        // Before the instance starts (data switch off), nothing is active.
        assert!(!runtime.control_blocks.in_action(ptid));
    }

    runtime.start_instance(ptids[0]);
    for &ptid in &ptids[1..] {
        let cb = runtime.control_blocks.create(ptid);
        // Newly created control blocks default to not tracing.
        assert!(!runtime.control_blocks.in_action(ptid));
        cb.tracing.store(true, Ordering::Release);
        assert!(runtime.control_blocks.in_action(ptid));
        cb.pause();
        assert!(!runtime.control_blocks.in_action(ptid));
    }
}

/// S5: an async callback's host snapshot is unaffected by later mutation
/// of the scheduling context's live control block — the whole point of
/// storing the snapshot by value.
#[test]
fn scenario_async_snapshot_is_immune_to_later_cb_mutation() {
    let runtime = Runtime::new();
    let ptid = Ptid::user_task(9);
    let cb = runtime.start_instance(ptid);
    cb.last_blk.store(5, Ordering::Release);

    runtime.schedule_async(ptid, 1, 0xabc, 0);

    // The scheduling context keeps running and its last_blk moves on.
    cb.last_blk.store(999, Ordering::Release);

    let event = runtime.async_events.find(1).unwrap();
    assert_eq!(event.host, HostSnapshot { ptid, ctxt: 0, last_blk: 5 });
}

/// S6: fd-table teardown skips every zero slot and closes every nonzero
/// one exactly once, regardless of how many zero slots separate them. The
/// scheduler also closes stdin (fd 0) itself once, independent of the
/// fd-table loop.
#[test]
fn scenario_fd_teardown_closes_only_nonzero_slots() {
    use std::sync::{Arc, Mutex};

    let runtime = Runtime::new();
    let formatters = FormatterTable::new();
    let console = ConsoleLedger::new();
    let scheduler = ThreadScheduler::new(&runtime, &formatters, &console);
    let mut disk = MockDiskMount::default();

    let closed: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    let fd_table = vec![0, 3, 0, 0, 7, 0];
    scheduler
        .run_continuation(
            &mut disk,
            Path::new("/dev/vda"),
            Path::new("/mnt/disk"),
            "ext4",
            &[],
            &[],
            &fd_table,
            |_| CapturingBackend { closed: Arc::clone(&closed) },
        )
        .unwrap();

    let mut got = closed.lock().unwrap().clone();
    got.sort();
    assert_eq!(got, vec![0, 3, 7], "nonzero fd-table slots plus the separate stdin close");
}

/// A syscall backend whose only job is to record which fds get closed,
/// shared across the single main-thread backend instance teardown uses.
struct CapturingBackend {
    closed: std::sync::Arc<std::sync::Mutex<Vec<i32>>>,
}

impl dart_guest::syscalls::SyscallBackend for CapturingBackend {
    fn invoke(&mut self, _nr: i64, _args: [i64; 6]) -> i64 {
        0
    }

    fn close_fd(&mut self, fd: i32) -> Result<(), dart_guest::GuestError> {
        self.closed.lock().unwrap().push(fd);
        Ok(())
    }
}
