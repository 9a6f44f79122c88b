//! Lock-free tracing runtime shared by every probe site instrumented
//! into the guest: the control-block registry, admission switches,
//! coverage bitmaps, shadow-memory race detector, and async-callback
//! correlation table.

pub mod async_event;
pub mod control_block;
pub mod coverage;
pub mod error;
pub mod hashmap;
pub mod memory;
pub mod rtrace;
pub mod runtime;
pub mod switch;

pub use control_block::{ControlBlock, ControlBlockTable};
pub use coverage::Coverage;
pub use error::RuntimeError;
pub use memory::{AccessKind, MemoryTracker, RaceEvent};
pub use rtrace::{RaceTraceEntry, RaceTraceLog};
pub use runtime::{DartSyscallCmd, Runtime};
pub use switch::Switch;
