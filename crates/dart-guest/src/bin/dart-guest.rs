//! Guest entrypoint. Maps the shared-memory region, waits for the host to
//! post a command, dispatches it, and reports completion.
//!
//! Corresponds to the native init process's post-boot sequence: map
//! ivshmem, fork, dispatch on the command byte the host wrote in the
//! parent's stead, flip `status` back to 1 once the child returns, and
//! exit. There is no container around this process to restart it; on any
//! unrecoverable error the child logs and exits non-zero, and the host
//! is responsible for deciding whether to retry with a fresh VM.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::num::NonZeroUsize;

use anyhow::{Context, Result};
use nix::sys::mman::{mmap, MapFlags, ProtFlags};
use nix::sys::wait::waitpid;
use nix::unistd::{fork, ForkResult};
use tracing_subscriber::EnvFilter;

use dart_guest::disk::{DiskMount, RealDiskMount};
use dart_guest::syscalls::RealSyscallBackend;
use dart_guest::{GuestCommand, GuestConfig, GuestError, Instruction, ShmemHeader, ThreadScheduler, PREV_RESULT};
use dart_protocol::bytecode::BytecodeRegion;
use dart_protocol::layout::{HEADER_SIZE, INSTANCE_SIZE, USER_OFFSET_BYTECODE, USER_SIZE_BYTECODE};
use dart_runtime::Runtime;
use dart_strace::{ConsoleLedger, FormatterTable};

/// Byte offsets of `struct shmem_hdr { command; desc[7]; status; }` inside
/// the metadata section: command byte, then a 7-byte description, then an
/// 8-byte status word starting right after (no padding, matching the
/// native struct's packed layout).
const HEADER_COMMAND_OFFSET: usize = 0;
const HEADER_DESC_OFFSET: usize = 1;
const HEADER_DESC_LEN: usize = 7;
const HEADER_STATUS_OFFSET: usize = HEADER_DESC_OFFSET + HEADER_DESC_LEN;

fn main() -> Result<()> {
    let config = GuestConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(device = %config.shmem_device.display(), "opening shared memory device");

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&config.shmem_device)
        .with_context(|| format!("opening {}", config.shmem_device.display()))?;

    let region_len = HEADER_SIZE + INSTANCE_SIZE;
    // SAFETY: `file` is a uio device mapping the host-provided ivshmem
    // region; its length is fixed by the protocol and never resized.
    let region = unsafe {
        mmap(
            None,
            NonZeroUsize::new(region_len as usize).context("region length must be nonzero")?,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    }
    .context("mmap of shared memory region failed")?;

    tracing::info!(bytes = region_len, ptr = ?region.as_ptr(), "mapped shared memory region");

    // SAFETY: `region` is a valid mapping of `region_len` bytes for the
    // lifetime of this process; the metadata block for instance 0 sits at
    // the very start of the user sub-region, right after the global header.
    let region_bytes: &mut [u8] =
        unsafe { std::slice::from_raw_parts_mut(region.as_ptr() as *mut u8, region_len as usize) };

    let metadata_base = HEADER_SIZE as usize;
    let command_byte = region_bytes[metadata_base + HEADER_COMMAND_OFFSET];
    let mut desc = [0u8; HEADER_DESC_LEN];
    desc.copy_from_slice(&region_bytes[metadata_base + HEADER_DESC_OFFSET..metadata_base + HEADER_DESC_OFFSET + HEADER_DESC_LEN]);

    let command = GuestCommand::from_byte(command_byte).unwrap_or_else(|err| {
        tracing::warn!(%err, "unrecognized command byte, defaulting to Test");
        GuestCommand::Test
    });

    write_status(region_bytes, metadata_base, ShmemHeader::STATUS_PENDING);
    tracing::info!(?command, "dispatching guest command");

    // SAFETY: the child below only touches memory already owned by this
    // process (the mmap'd region and its own stack); it never returns
    // through this frame, only through `_exit`.
    match unsafe { fork() }.context("fork failed")? {
        ForkResult::Parent { child } => {
            waitpid(child, None).context("waiting for guest child")?;
            write_status(region_bytes, metadata_base, ShmemHeader::STATUS_DONE);
            tracing::info!("guest child finished, status flipped to done");
            Ok(())
        }
        ForkResult::Child => {
            match run_command(command, &config, region_bytes, desc) {
                Ok(()) => {
                    tracing::info!("guest command completed successfully");
                    // SAFETY: terminates the child without running
                    // destructors or returning into the parent's frame,
                    // matching the exit-code contract the host polls for.
                    unsafe { libc::_exit(0) }
                }
                Err(err) => {
                    tracing::error!(error = %err, "guest command failed");
                    unsafe { libc::_exit(1) }
                }
            }
        }
    }
}

fn write_status(region_bytes: &mut [u8], metadata_base: usize, status: u64) {
    let offset = metadata_base + HEADER_STATUS_OFFSET;
    region_bytes[offset..offset + 8].copy_from_slice(&status.to_le_bytes());
}

/// Dispatches one command to completion. Runs entirely inside the forked
/// child; the parent never touches the runtime machinery itself.
fn run_command(command: GuestCommand, config: &GuestConfig, region_bytes: &mut [u8], desc: [u8; 7]) -> anyhow::Result<()> {
    let runtime = Runtime::new();
    let formatters = FormatterTable::new();
    let console = ConsoleLedger::new();
    let scheduler = ThreadScheduler::new(&runtime, &formatters, &console);
    let mut disk = RealDiskMount;

    match command {
        GuestCommand::Prep => {
            let method = prep_method_from_desc(&desc);
            scheduler
                .run_prep(&mut disk, &config.disk_image, &config.disk_mount, "ext4", &method)
                .context("prep run failed")?;
        }
        GuestCommand::Cont | GuestCommand::Fuzz => {
            run_continuation_from_region(&scheduler, &mut disk, config, region_bytes)?;
        }
        GuestCommand::Test => {
            run_self_test(&scheduler, &mut disk, config)?;
        }
    }

    Ok(())
}

fn prep_method_from_desc(desc: &[u8; 7]) -> String {
    let end = desc.iter().position(|&b| b == 0).unwrap_or(desc.len());
    String::from_utf8_lossy(&desc[..end]).into_owned()
}

/// Parses the bytecode region the host wrote, decodes the precall and
/// per-thread instruction streams it points at, and runs one continuation.
fn run_continuation_from_region(
    scheduler: &ThreadScheduler<'_>,
    disk: &mut dyn DiskMount,
    config: &GuestConfig,
    region_bytes: &mut [u8],
) -> anyhow::Result<()> {
    let bytecode_base = (HEADER_SIZE + USER_OFFSET_BYTECODE) as usize;
    let bytecode_len = USER_SIZE_BYTECODE as usize;
    let bytecode_bytes = &mut region_bytes[bytecode_base..bytecode_base + bytecode_len];

    let region = BytecodeRegion::parse_and_fixup(bytecode_bytes).context("parsing bytecode region")?;
    let fd_table = region.read_fd_table(bytecode_bytes).context("reading fd table")?;

    let code_base = region.head.off_code as usize;
    let precall_bytes = &bytecode_bytes[code_base + region.code.offset_main as usize..];
    let precall = Instruction::decode_stream(precall_bytes).context("decoding precall stream")?;

    let mut worker_streams = Vec::with_capacity(region.code.per_thread.len());
    for i in 0..region.code.per_thread.len() as u32 {
        let offset = region.code.thread_offset(i).map_err(GuestError::from)?;
        let stream_bytes = &bytecode_bytes[code_base + offset as usize..];
        worker_streams.push(Instruction::decode_stream(stream_bytes).context("decoding worker stream")?);
    }

    scheduler
        .run_continuation(
            disk,
            &config.disk_image,
            &config.disk_mount,
            "ext4",
            &precall,
            &worker_streams,
            &fd_table,
            |_| RealSyscallBackend,
        )
        .context("continuation run failed")?;

    Ok(())
}

/// Runs a small fixed instruction stream exercising the filesystem and fd
/// plumbing without a host-supplied bytecode region: `mkdir`, `open`,
/// `dup2` the freshly opened fd to 199 and close it there, `creat` a
/// second file and write a known payload to it, then `chdir` back to
/// root. The `creat`'d fd is left for the process to close on exit rather
/// than threaded through a second `PREV_RESULT`-style slot, since the
/// interpreter only tracks one instruction's result at a time.
fn run_self_test(scheduler: &ThreadScheduler<'_>, disk: &mut dyn DiskMount, config: &GuestConfig) -> Result<(), GuestError> {
    let dir_path = CString::new("dir_foo").expect("no interior NUL");
    let file_path = CString::new("dir_foo/file_bar").expect("no interior NUL");
    let root_path = CString::new("/").expect("no interior NUL");
    let payload = b"HELLO FROM RACER\0";

    let precall = vec![
        Instruction { syscall_nr: libc::SYS_mkdir, args: [dir_path.as_ptr() as i64, 0o777, 0, 0, 0, 0] },
        Instruction { syscall_nr: libc::SYS_open, args: [dir_path.as_ptr() as i64, libc::O_RDONLY as i64, 0, 0, 0, 0] },
        Instruction { syscall_nr: libc::SYS_dup2, args: [PREV_RESULT, 199, 0, 0, 0, 0] },
        Instruction { syscall_nr: libc::SYS_close, args: [199, 0, 0, 0, 0, 0] },
        Instruction { syscall_nr: libc::SYS_creat, args: [file_path.as_ptr() as i64, 0o644, 0, 0, 0, 0] },
        Instruction { syscall_nr: libc::SYS_write, args: [PREV_RESULT, payload.as_ptr() as i64, payload.len() as i64, 0, 0, 0] },
        Instruction { syscall_nr: libc::SYS_chdir, args: [root_path.as_ptr() as i64, 0, 0, 0, 0, 0] },
    ];

    scheduler.run_continuation(disk, &config.disk_image, &config.disk_mount, "ext4", &precall, &[], &[], |_| RealSyscallBackend)
}
