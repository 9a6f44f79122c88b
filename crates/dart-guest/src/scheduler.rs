//! Drives one bytecode region through to completion: mount the target
//! filesystem, `chdir` into it, run the precall stream single-threaded,
//! close the descriptors the host wants closed plus stdin, release every
//! worker thread, wait for them all to finish, `chdir` back to `/`, and
//! unmount.
//!
//! This is a direct translation of the native continuation runner's
//! control flow: `mount` once, `chdir` into the mount point, `interpret`
//! the precall stream before any thread exists, close every nonzero
//! slot the host populated in its fd table, close stdin, `sem_post` the
//! init semaphore once per worker and `sem_wait` the fini semaphore the
//! same number of times, `chdir` back to `/`, then tear down.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use dart_protocol::Ptid;
use dart_runtime::Runtime;
use dart_strace::{ConsoleLedger, FormatterTable};

use crate::commands::validate_prep_method;
use crate::disk::DiskMount;
use crate::error::GuestError;
use crate::interpreter::{Instruction, Interpreter};
use crate::semaphore::CountingSemaphore;
use crate::syscalls::SyscallBackend;

pub struct ThreadScheduler<'a> {
    runtime: &'a Runtime,
    formatters: &'a FormatterTable,
    console: &'a ConsoleLedger,
}

impl<'a> ThreadScheduler<'a> {
    pub fn new(runtime: &'a Runtime, formatters: &'a FormatterTable, console: &'a ConsoleLedger) -> Self {
        ThreadScheduler { runtime, formatters, console }
    }

    /// Runs a full continuation: mount, precall, worker fan-out, fd
    /// teardown, unmount. `backend_factory` builds a fresh syscall backend
    /// per thread (production code hands out `RealSyscallBackend`; tests
    /// hand out per-thread `MockSyscallBackend`s).
    pub fn run_continuation<B: SyscallBackend>(
        &self,
        disk: &mut dyn DiskMount,
        disk_image: &Path,
        disk_mount: &Path,
        fstype: &str,
        precall: &[Instruction],
        worker_streams: &[Vec<Instruction>],
        fd_table: &[u64],
        mut backend_factory: impl FnMut(u32) -> B,
    ) -> Result<(), GuestError> {
        disk.mount(disk_image, disk_mount, fstype, None)?;

        // PTID raw value 0 is the hashmap's EMPTY sentinel (dart_runtime's
        // OpenAddressedMap requires nonzero keys), so the precall/main
        // thread can't use `Ptid::user_task(0)`. It gets pid 1 instead;
        // worker pids are shifted up to start at 2 so the two ranges never
        // collide.
        let main_ptid = Ptid::user_task(1);
        self.runtime.start_instance(main_ptid);
        {
            let mut main_backend = backend_factory(0);

            self.chdir(&mut main_backend, main_ptid, disk_mount)?;

            let mut interp = Interpreter::new(&mut main_backend, self.runtime, self.formatters, self.console, main_ptid);
            interp.run(precall);

            for (slot, raw) in fd_table.iter().enumerate() {
                if *raw == 0 {
                    continue;
                }
                let fd = *raw as i32;
                self.runtime.syscall_enter(main_ptid, libc::SYS_close as i64);
                let result = main_backend.close_fd(fd).map_err(|_| GuestError::WorkerPanicked { index: slot as u32 });
                self.runtime.syscall_exit(main_ptid, libc::SYS_close as i64);
                result?;
            }

            // Close stdin before any worker thread is released: an
            // inherited stdin left open is what the original guest's
            // comment calls out as a source of hangs.
            self.runtime.syscall_enter(main_ptid, libc::SYS_close as i64);
            let stdin_result = main_backend.close_fd(0);
            self.runtime.syscall_exit(main_ptid, libc::SYS_close as i64);
            stdin_result?;
        }

        let init = CountingSemaphore::new(0);
        let fini = CountingSemaphore::new(0);
        let num_threads = worker_streams.len() as u32;

        std::thread::scope(|scope| {
            for (i, stream) in worker_streams.iter().enumerate() {
                let init = &init;
                let fini = &fini;
                let runtime = &*self.runtime;
                let formatters = &*self.formatters;
                let console = &*self.console;
                let mut backend = backend_factory(i as u32 + 1);
                scope.spawn(move || {
                    init.wait();
                    let ptid = Ptid::user_task(i as u32 + 2);
                    let mut interp = Interpreter::new(&mut backend, runtime, formatters, console, ptid);
                    interp.run(stream);
                    fini.post();
                });
            }

            for _ in 0..num_threads {
                init.post();
            }
            for _ in 0..num_threads {
                fini.wait();
            }
        });

        self.chdir(&mut backend_factory(0), main_ptid, Path::new("/"))?;

        self.runtime.stop_instance();
        disk.unmount(disk_mount)?;
        Ok(())
    }

    /// Issues `chdir(target)` wrapped in `syscall_enter`/`syscall_exit`,
    /// matching `racer_cont`'s `dart_ctxt_syscall_enter(SYS_chdir)` /
    /// `chdir` / `dart_ctxt_syscall_exit(SYS_chdir)` sequence around both
    /// the move into the mounted image and the move back to `/` before
    /// unmounting.
    fn chdir(&self, backend: &mut dyn SyscallBackend, ptid: Ptid, target: &Path) -> Result<(), GuestError> {
        let path = CString::new(target.as_os_str().as_bytes())
            .map_err(|_| GuestError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "chdir target contains a NUL byte")))?;

        self.runtime.syscall_enter(ptid, libc::SYS_chdir as i64);
        let rv = backend.invoke(libc::SYS_chdir, [path.as_ptr() as i64, 0, 0, 0, 0, 0]);
        self.runtime.syscall_exit(ptid, libc::SYS_chdir as i64);

        if rv < 0 {
            return Err(GuestError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Runs a `prep` command: validate the host-supplied prep method,
    /// mount the target image, (the only recognized method, `"000"`, does
    /// nothing further), then unmount. Any other method string aborts
    /// before touching the filesystem at all, matching
    /// `racer_prep`'s `"Invalid prep method"` rejection.
    pub fn run_prep(
        &self,
        disk: &mut dyn DiskMount,
        disk_image: &Path,
        disk_mount: &Path,
        fstype: &str,
        method: &str,
    ) -> Result<(), GuestError> {
        validate_prep_method(method)?;
        disk.mount(disk_image, disk_mount, fstype, None)?;
        disk.unmount(disk_mount)?;
        Ok(())
    }
}
