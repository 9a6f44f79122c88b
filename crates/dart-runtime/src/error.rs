use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no control block registered for ptid {0:#x}")]
    UnknownPtid(u32),

    #[error("coverage bitmap index {index} out of range (max {max})")]
    CoverageIndexOutOfRange { index: u64, max: u64 },

    #[error(transparent)]
    Protocol(#[from] dart_protocol::ProtocolError),
}
