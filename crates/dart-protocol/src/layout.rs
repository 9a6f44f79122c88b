//! Fixed offsets and sizes of the shared-memory region.
//!
//! The region is a single contiguous byte-addressable segment mapped
//! read-write into the guest user process and mapped by the guest kernel
//! module at boot. No allocator is ever involved; every sub-region lives at
//! a fixed byte offset. See `dart_common.h` in the original implementation
//! for the byte math this mirrors.

/// One mebibyte, in bytes.
pub const MB: u64 = 1 << 20;

// ---- header (preceding the per-instance user/kernel split) ----

/// Total size of the global header carrying coverage bitmaps and the
/// reserve ledger.
pub const HEADER_SIZE: u64 = 256 * MB;

pub const HEADER_OFFSET_CFG_EDGE: u64 = 4 * MB;
pub const HEADER_OFFSET_DFG_EDGE: u64 = 8 * MB;
pub const HEADER_OFFSET_ALIAS_INST: u64 = 12 * MB;
pub const HEADER_OFFSET_RESERVE_LEDGER: u64 = 16 * MB;
pub const HEADER_RESERVE_LEDGER_SIZE: u64 = HEADER_SIZE - HEADER_OFFSET_RESERVE_LEDGER;

/// Each coverage bitmap addresses 2^24 distinct edges/pairs.
pub const COVERAGE_BITMAP_BITS: u32 = 24;

// ---- user sub-region ----

pub const USER_OFFSET_METADATA: u64 = 0;
pub const USER_SIZE_METADATA: u64 = 2 * MB;

pub const USER_OFFSET_BYTECODE: u64 = USER_OFFSET_METADATA + USER_SIZE_METADATA;
pub const USER_SIZE_BYTECODE: u64 = 48 * MB;

pub const USER_OFFSET_STRACE: u64 = USER_OFFSET_BYTECODE + USER_SIZE_BYTECODE;
pub const USER_SIZE_STRACE: u64 = 12 * MB;

pub const USER_SIZE: u64 = USER_SIZE_METADATA + USER_SIZE_BYTECODE + USER_SIZE_STRACE;

// ---- kernel sub-region ----

pub const KERN_OFFSET_RTINFO: u64 = 0;
pub const KERN_SIZE_RTINFO: u64 = 2 * MB;

pub const KERN_OFFSET_RTRACE: u64 = KERN_OFFSET_RTINFO + KERN_SIZE_RTINFO;
pub const KERN_SIZE_RTRACE: u64 = 64 * MB;

pub const KERN_SIZE: u64 = KERN_SIZE_RTINFO + KERN_SIZE_RTRACE;

/// Total size of one instance's user+kernel split (not counting the header).
pub const INSTANCE_SIZE: u64 = USER_SIZE + KERN_SIZE;

/// An active race-trace record is four 64-bit words:
/// `{from_hash, into_hash, address, size}`.
pub const RTRACE_ENTRY_WORDS: u64 = 4;
pub const RTRACE_ENTRY_BYTES: u64 = RTRACE_ENTRY_WORDS * 8;
pub const RTRACE_ENTRY_MAX: u64 = KERN_SIZE_RTRACE / RTRACE_ENTRY_BYTES;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_monotone_and_disjoint() {
        assert!(USER_OFFSET_BYTECODE >= USER_OFFSET_METADATA + USER_SIZE_METADATA);
        assert!(USER_OFFSET_STRACE >= USER_OFFSET_BYTECODE + USER_SIZE_BYTECODE);
        assert_eq!(USER_SIZE, USER_OFFSET_STRACE + USER_SIZE_STRACE);
        assert_eq!(KERN_OFFSET_RTRACE, KERN_SIZE_RTINFO);
        assert_eq!(KERN_SIZE, KERN_OFFSET_RTRACE + KERN_SIZE_RTRACE);
    }

    #[test]
    fn instance_matches_spec_budget() {
        assert_eq!(USER_SIZE, 62 * MB);
        assert_eq!(KERN_SIZE, 66 * MB);
        assert_eq!(INSTANCE_SIZE, 128 * MB);
    }
}
