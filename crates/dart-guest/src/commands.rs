//! The single-byte command protocol the host uses to tell the guest init
//! process what to do once it has booted.
//!
//! Mirrors `struct shmem_hdr { command; desc[7]; status; }`: the host
//! writes a command byte and a short description, sets `status` to 0,
//! and waits for the guest to flip `status` back to 1 once it's done.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestCommand {
    /// Run the self-test bytecode region once and report pass/fail.
    Test,
    /// Prepare a fresh filesystem image snapshot for later `Cont` runs.
    Prep,
    /// Run one continuation: mount, precall, worker fan-out, teardown.
    Cont,
    /// Run the fuzzing loop: repeated `Cont`-like runs driven by the host.
    Fuzz,
}

use crate::error::GuestError;

impl GuestCommand {
    pub fn from_byte(b: u8) -> Result<Self, GuestError> {
        match b {
            b't' => Ok(GuestCommand::Test),
            b'p' => Ok(GuestCommand::Prep),
            b'c' => Ok(GuestCommand::Cont),
            b'f' => Ok(GuestCommand::Fuzz),
            other => Err(GuestError::UnknownCommand(other)),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            GuestCommand::Test => b't',
            GuestCommand::Prep => b'p',
            GuestCommand::Cont => b'c',
            GuestCommand::Fuzz => b'f',
        }
    }
}

/// The only prep method the guest's `prep` path currently recognizes.
/// Mirrors `racer_prep`'s literal `"000"` check in the reference
/// implementation; any other string is rejected outright rather than
/// silently treated as a no-op.
pub const PREP_METHOD_EMPTY: &str = "000";

/// Validates a prep-method string from the host. `"000"` denotes the
/// empty method (mount, do nothing, unmount); anything else is an error.
pub fn validate_prep_method(method: &str) -> Result<(), GuestError> {
    if method == PREP_METHOD_EMPTY {
        Ok(())
    } else {
        Err(GuestError::InvalidPrepMethod(method.to_string()))
    }
}

/// The shared header the host and guest poll to hand off one command.
#[derive(Debug, Clone, Copy)]
pub struct ShmemHeader {
    pub command: u8,
    pub desc: [u8; 7],
    pub status: u64,
}

impl ShmemHeader {
    pub const STATUS_PENDING: u64 = 0;
    pub const STATUS_DONE: u64 = 1;

    pub fn command(&self) -> Result<GuestCommand, GuestError> {
        GuestCommand::from_byte(self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_command_bytes() {
        for cmd in [GuestCommand::Test, GuestCommand::Prep, GuestCommand::Cont, GuestCommand::Fuzz] {
            assert_eq!(GuestCommand::from_byte(cmd.to_byte()).unwrap(), cmd);
        }
    }

    #[test]
    fn unknown_command_byte_is_rejected() {
        let err = GuestCommand::from_byte(b'z').unwrap_err();
        assert!(matches!(err, GuestError::UnknownCommand(b'z')));
    }

    #[test]
    fn header_resolves_its_command() {
        let header = ShmemHeader { command: b'c', desc: [0; 7], status: ShmemHeader::STATUS_PENDING };
        assert_eq!(header.command().unwrap(), GuestCommand::Cont);
    }

    #[test]
    fn prep_method_000_is_accepted() {
        assert!(validate_prep_method("000").is_ok());
    }

    #[test]
    fn other_prep_methods_are_rejected() {
        let err = validate_prep_method("001").unwrap_err();
        assert!(matches!(err, GuestError::InvalidPrepMethod(ref m) if m == "001"));
    }
}
