//! Append-only event ledger and its reserve-region transfer.
//!
//! A `Ledger` is a fixed-capacity byte buffer preceded by two atomic
//! counters: `count` (how many entries have ever been appended, including
//! ones dropped for lack of space) and `cursor` (the next free byte
//! offset into `buffer`). Appending is lock-free: a thread reserves space
//! with a single `fetch_add` on `cursor` and, if the reservation overruns
//! the buffer, its entry is silently dropped — `count` still advances so
//! dropped entries are visible to a later reader, but no bytes are written
//! out of bounds.
//!
//! `ReserveLedger` is the crash/panic-safe sibling: when the kernel decides
//! to kill an instance (`DART_BUG`), any ledger content collected so far is
//! copied into a separate always-available reserve region before anything
//! else happens, so a reader with no running instance to talk to can still
//! recover what was traced.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ProtocolError;

/// Header-plus-buffer layout shared with the C ledger's
/// `struct dart_ledger { count; cursor; buffer[0]; }`.
pub struct Ledger<'a> {
    count: &'a AtomicU64,
    cursor: &'a AtomicU64,
    buffer: &'a mut [u8],
}

impl<'a> Ledger<'a> {
    /// Builds a view over an existing ledger header + buffer. The caller
    /// owns the backing memory (typically a slice of the shared region) and
    /// must ensure `count`/`cursor` sit immediately before `buffer` the way
    /// the wire layout expects, which is guaranteed by construction from
    /// `crate::layout` offsets.
    pub fn new(count: &'a AtomicU64, cursor: &'a AtomicU64, buffer: &'a mut [u8]) -> Self {
        Ledger { count, cursor, buffer }
    }

    pub fn capacity(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn entry_count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Reserves and fills `size` bytes with `fill`. Returns the offset the
    /// entry was written at, or `Ok(None)` if the ledger is full — in which
    /// case `count` has still been incremented to record the drop.
    pub fn append_with(
        &mut self,
        size: u64,
        fill: impl FnOnce(&mut [u8]),
    ) -> Result<Option<u64>, ProtocolError> {
        self.count.fetch_add(1, Ordering::AcqRel);
        let offset = self.cursor.fetch_add(size, Ordering::AcqRel);
        if offset + size > self.capacity() {
            return Ok(None);
        }
        let start = offset as usize;
        let end = (offset + size) as usize;
        fill(&mut self.buffer[start..end]);
        Ok(Some(offset))
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<Option<u64>, ProtocolError> {
        self.append_with(bytes.len() as u64, |dst| dst.copy_from_slice(bytes))
    }
}

/// The always-on reserve region a ledger is transferred into when an
/// instance is torn down abnormally.
pub struct ReserveLedger<'a> {
    cursor: &'a AtomicU64,
    buffer: &'a mut [u8],
}

impl<'a> ReserveLedger<'a> {
    pub fn new(cursor: &'a AtomicU64, buffer: &'a mut [u8]) -> Self {
        ReserveLedger { cursor, buffer }
    }

    pub fn capacity(&self) -> u64 {
        self.buffer.len() as u64
    }

    /// Copies `instance_id`, the ledger's own header, and its live buffer
    /// content into the reserve region at a reserved offset. The reserve
    /// offset is claimed with a single `fetch_add` so concurrent transfers
    /// from independent instances never overlap; a transfer that would
    /// overrun the reserve region is rejected before any bytes move.
    pub fn transfer_ro(
        &mut self,
        instance_id: u64,
        ledger: &Ledger<'_>,
    ) -> Result<u64, ProtocolError> {
        let live = ledger.cursor.load(Ordering::Acquire).min(ledger.capacity());
        let header_size = 8 + 8 + 8; // instance_id + count + cursor
        let total = header_size + live;

        let offset = self.cursor.fetch_add(total, Ordering::AcqRel);
        if offset + total > self.capacity() {
            return Err(ProtocolError::ReserveOverflow { size: total });
        }

        let mut w = offset as usize;
        self.buffer[w..w + 8].copy_from_slice(&instance_id.to_le_bytes());
        w += 8;
        self.buffer[w..w + 8].copy_from_slice(&ledger.entry_count().to_le_bytes());
        w += 8;
        self.buffer[w..w + 8].copy_from_slice(&live.to_le_bytes());
        w += 8;
        self.buffer[w..w + live as usize].copy_from_slice(&ledger.buffer[..live as usize]);

        Ok(offset)
    }
}
