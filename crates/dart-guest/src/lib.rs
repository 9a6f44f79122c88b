//! Guest-side process: bytecode interpreter, thread scheduler, and the
//! single-byte command protocol shared with the host.

pub mod commands;
pub mod config;
pub mod disk;
pub mod error;
pub mod interpreter;
pub mod scheduler;
pub mod semaphore;
pub mod syscalls;

pub use commands::{GuestCommand, ShmemHeader};
pub use config::GuestConfig;
pub use error::GuestError;
pub use interpreter::{Instruction, Interpreter, PREV_RESULT};
pub use scheduler::ThreadScheduler;
