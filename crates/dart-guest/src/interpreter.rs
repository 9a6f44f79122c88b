//! Straight-line bytecode interpreter.
//!
//! Bytecode for one thread is a flat stream of instructions, each a
//! syscall number and up to six arguments already fixed up to real
//! pointers by [`dart_protocol::bytecode::fixup_pointers`]. The
//! interpreter has no branches or loops of its own — control flow, if the
//! fuzzer wants any, is expressed by the host compiler unrolling it into
//! the stream — so running one thread's code is simply walking the
//! stream issuing syscalls in order.
//!
//! Each instruction's syscall is sandwiched between a `syscall_enter` and
//! a `syscall_exit` hook, exactly as the reference interpreter wraps
//! every syscall it issues. Since `syscall_enter` resets the calling
//! context's `last_blk` to the boot sentinel, the basic-block coverage
//! hook never chains an edge across two instructions in this flat
//! model — only multiple basic blocks visited by the same kernel-side
//! syscall handler (not modeled here) would share a CFG context.

use dart_protocol::Ptid;
use dart_runtime::Runtime;
use dart_strace::{FormatterTable, ConsoleLedger};

use crate::error::GuestError;
use crate::syscalls::SyscallBackend;

#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub syscall_nr: i64,
    pub args: [i64; 6],
}

/// Argument sentinel substituted with the previous instruction's raw
/// return value at run time. Lets one instruction thread a value it
/// doesn't know ahead of time — most commonly a freshly opened fd — into
/// a later instruction's argument slot (e.g. `dup2(PREV_RESULT, 199)`
/// right after an `open`), without a full heap-based argument model.
/// `i64::MIN` is never a real syscall argument or fd, so it's safe to
/// reserve.
pub const PREV_RESULT: i64 = i64::MIN;

impl Instruction {
    /// Each encoded instruction is a syscall number followed by six
    /// register-width arguments, all little-endian `i64`s.
    pub const ENCODED_BYTES: usize = 8 * 7;

    /// Decodes a per-thread code stream: a leading `u64` instruction
    /// count, then that many fixed-width instructions back to back. The
    /// wire format (spec §6) describes `region_code` only down to
    /// per-thread byte offsets into the code section — it leaves the
    /// instruction encoding itself to the host compiler and guest to
    /// agree on out of band, which is what this convention is.
    pub fn decode_stream(bytes: &[u8]) -> Result<Vec<Instruction>, GuestError> {
        if bytes.len() < 8 {
            return Err(GuestError::TruncatedInstructionStream { needed: 8, have: bytes.len() });
        }
        let count = u64::from_le_bytes(bytes[0..8].try_into().unwrap()) as usize;
        let needed = 8 + count * Self::ENCODED_BYTES;
        if bytes.len() < needed {
            return Err(GuestError::TruncatedInstructionStream { needed, have: bytes.len() });
        }

        let mut out = Vec::with_capacity(count);
        let mut cursor = 8;
        for _ in 0..count {
            let syscall_nr = i64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;
            let mut args = [0i64; 6];
            for arg in args.iter_mut() {
                *arg = i64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
                cursor += 8;
            }
            out.push(Instruction { syscall_nr, args });
        }
        Ok(out)
    }
}

pub struct Interpreter<'a> {
    backend: &'a mut dyn SyscallBackend,
    runtime: &'a Runtime,
    formatters: &'a FormatterTable,
    console: &'a ConsoleLedger,
    ptid: Ptid,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        backend: &'a mut dyn SyscallBackend,
        runtime: &'a Runtime,
        formatters: &'a FormatterTable,
        console: &'a ConsoleLedger,
        ptid: Ptid,
    ) -> Self {
        Interpreter { backend, runtime, formatters, console, ptid }
    }

    /// Runs every instruction in `stream`, in order, returning each
    /// syscall's raw result. Any argument equal to [`PREV_RESULT`] is
    /// substituted with the immediately preceding instruction's result
    /// before the syscall is issued (0 for the first instruction).
    pub fn run(&mut self, stream: &[Instruction]) -> Vec<i64> {
        let mut results: Vec<i64> = Vec::with_capacity(stream.len());
        for (blk_id, instr) in stream.iter().enumerate() {
            self.runtime.syscall_enter(self.ptid, instr.syscall_nr);
            self.runtime.on_basic_block(self.ptid, blk_id as u64 + 1);

            let prev = results.last().copied().unwrap_or(0);
            let mut args = instr.args;
            for arg in args.iter_mut() {
                if *arg == PREV_RESULT {
                    *arg = prev;
                }
            }

            let result = self.backend.invoke(instr.syscall_nr, args);

            let args_u64: Vec<u64> = args.iter().map(|a| *a as u64).collect();
            let line = self.formatters.format_call(instr.syscall_nr as u32, &args_u64);
            self.console.record(format!("{line} = {result}"));

            self.runtime.syscall_exit(self.ptid, instr.syscall_nr);
            results.push(result);
        }
        results
    }
}
