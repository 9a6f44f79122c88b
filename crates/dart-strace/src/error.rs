use thiserror::Error;

#[derive(Debug, Error)]
pub enum StraceError {
    #[error("syscall number {nr} out of range (max {max})")]
    SyscallNumberOutOfRange { nr: u32, max: u32 },

    #[error("no formatter registered for syscall {0}")]
    Unregistered(u32),
}
