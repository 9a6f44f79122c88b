use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuestError {
    #[error(transparent)]
    Protocol(#[from] dart_protocol::ProtocolError),

    #[error(transparent)]
    Runtime(#[from] dart_runtime::RuntimeError),

    #[error("mount of {path} failed: {source}")]
    Mount { path: String, #[source] source: nix::Error },

    #[error("unmount of {path} failed: {source}")]
    Unmount { path: String, #[source] source: nix::Error },

    #[error("worker thread {index} panicked before posting completion")]
    WorkerPanicked { index: u32 },

    #[error("unknown guest command byte {0:#x}")]
    UnknownCommand(u8),

    #[error("Invalid prep method: {0:?}")]
    InvalidPrepMethod(String),

    #[error("code stream of {have} bytes too short to hold its declared instruction count (need {needed})")]
    TruncatedInstructionStream { needed: usize, have: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
