//! Abstraction over the raw syscalls the interpreter issues on behalf of
//! bytecode instructions, so the interpreter's control flow can be tested
//! without actually touching the kernel.

use crate::error::GuestError;

pub trait SyscallBackend: Send {
    /// Issues syscall `nr` with up to six register-width arguments,
    /// returning its raw (possibly negative, libc-style) result.
    fn invoke(&mut self, nr: i64, args: [i64; 6]) -> i64;

    /// Closes a single file descriptor, used when tearing down the
    /// `region_meta_fd` table before spawning worker threads.
    fn close_fd(&mut self, fd: i32) -> Result<(), GuestError>;
}

pub struct RealSyscallBackend;

impl SyscallBackend for RealSyscallBackend {
    fn invoke(&mut self, nr: i64, args: [i64; 6]) -> i64 {
        // SAFETY: the bytecode region is produced by a trusted host-side
        // compiler; argument shapes are validated against each syscall's
        // known arity before this is reached.
        unsafe { libc::syscall(nr, args[0], args[1], args[2], args[3], args[4], args[5]) }
    }

    fn close_fd(&mut self, fd: i32) -> Result<(), GuestError> {
        let rc = unsafe { libc::close(fd) };
        if rc != 0 {
            return Err(GuestError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

/// Records every call it receives and returns a scripted result per call
/// index, for use in the interpreter's and scheduler's unit tests.
#[derive(Default)]
pub struct MockSyscallBackend {
    pub calls: Vec<(i64, [i64; 6])>,
    pub closed_fds: Vec<i32>,
    pub scripted_results: Vec<i64>,
}

impl MockSyscallBackend {
    pub fn with_results(results: Vec<i64>) -> Self {
        MockSyscallBackend { calls: Vec::new(), closed_fds: Vec::new(), scripted_results: results }
    }
}

impl SyscallBackend for MockSyscallBackend {
    fn invoke(&mut self, nr: i64, args: [i64; 6]) -> i64 {
        let index = self.calls.len();
        self.calls.push((nr, args));
        self.scripted_results.get(index).copied().unwrap_or(0)
    }

    fn close_fd(&mut self, fd: i32) -> Result<(), GuestError> {
        self.closed_fds.push(fd);
        Ok(())
    }
}
