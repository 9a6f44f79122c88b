use thiserror::Error;

/// Errors surfaced while parsing or walking the shared-memory protocol.
///
/// These mirror the fail-fast checks the original bytecode loader performs
/// with `panic("... corrupted")`: here they are recoverable values instead,
/// so the guest runtime can log and abort the current instance rather than
/// taking the whole process down.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("region head magic mismatch: expected {expected:?}, found {found:?}")]
    BadMagic { expected: &'static str, found: [u8; 8] },

    #[error("region head corrupted: cursor {cursor:#x} does not match computed offset {expected:#x}")]
    RegionCorrupted { cursor: u64, expected: u64 },

    #[error("bytecode region too small: need at least {needed} bytes, have {have}")]
    RegionTooSmall { needed: u64, have: u64 },

    #[error("thread index {index} out of range (max {max})")]
    ThreadIndexOutOfRange { index: u32, max: u32 },

    #[error("ledger entry of size {size} does not fit remaining capacity {remaining}")]
    LedgerOverflow { size: u64, remaining: u64 },

    #[error("reserve ledger transfer of {size} bytes exceeds reserve capacity")]
    ReserveOverflow { size: u64 },
}
