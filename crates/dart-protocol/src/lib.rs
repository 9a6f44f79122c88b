//! Wire protocol for the shared-memory region connecting the host,
//! the guest user process, and the guest kernel tracer.
//!
//! This crate has no opinion on concurrency strategy or syscall semantics;
//! it only knows how bytes are laid out and how to read/write them
//! correctly. [`dart_runtime`](../dart_runtime/index.html) and
//! [`dart_guest`](../dart_guest/index.html) build behavior on top of it.

pub mod bytecode;
pub mod error;
pub mod ledger;
pub mod layout;
pub mod ptid;

pub use bytecode::{BytecodeRegion, CodeOffsets, LegoPack, MetaFdTable, MetaPtrTable, RegionHead};
pub use error::ProtocolError;
pub use ledger::{Ledger, ReserveLedger};
pub use ptid::Ptid;
