//! Shared fixtures for the property and scenario tests in `tests/`.
//!
//! Kept as library code (rather than duplicated in every test file) the
//! same way the teacher's own test harness centralizes its backend mocks.

use dart_guest::{GuestCommand, Instruction};

/// Builds a short, deterministic instruction stream: `count` no-op reads
/// of fd 0, useful wherever a test needs "some bytecode" without caring
/// about its semantics.
pub fn dummy_stream(count: usize) -> Vec<Instruction> {
    (0..count).map(|_| Instruction { syscall_nr: 0, args: [0; 6] }).collect()
}

pub fn all_commands() -> [GuestCommand; 4] {
    [GuestCommand::Test, GuestCommand::Prep, GuestCommand::Cont, GuestCommand::Fuzz]
}
