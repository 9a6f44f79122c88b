//! Guest process configuration, read from the environment at startup.

use std::path::PathBuf;

const RACER_THREAD_MAX: u32 = 64;

#[derive(Debug, Clone)]
pub struct GuestConfig {
    /// `uio` device the shared memory region is mapped through.
    pub shmem_device: PathBuf,
    /// Mount point for the host-shared 9p filesystem.
    pub fsshare_mount: PathBuf,
    /// Disk image mounted as the filesystem under test.
    pub disk_image: PathBuf,
    /// Mount point for `disk_image`.
    pub disk_mount: PathBuf,
    /// Upper bound on worker threads a single bytecode region may spawn.
    pub thread_max: u32,
    /// `RUST_LOG`-style filter directive for the tracing subscriber.
    pub log_filter: String,
}

impl Default for GuestConfig {
    fn default() -> Self {
        GuestConfig {
            shmem_device: PathBuf::from("/dev/uio0"),
            fsshare_mount: PathBuf::from("/host"),
            disk_image: PathBuf::from("/dev/vda"),
            disk_mount: PathBuf::from("/mnt/disk"),
            thread_max: RACER_THREAD_MAX,
            log_filter: "info".to_string(),
        }
    }
}

impl GuestConfig {
    /// Builds a config from defaults, overridden by any `DART_*`
    /// environment variable that is set and parses cleanly. A variable
    /// that is set but fails to parse is ignored rather than rejected,
    /// the same permissive behavior the daemon's own `from_env` uses.
    pub fn from_env() -> Self {
        let mut config = GuestConfig::default();

        if let Ok(v) = std::env::var("DART_SHMEM_DEVICE") {
            config.shmem_device = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DART_FSSHARE_MOUNT") {
            config.fsshare_mount = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DART_DISK_IMAGE") {
            config.disk_image = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DART_DISK_MOUNT") {
            config.disk_mount = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DART_THREAD_MAX") {
            if let Ok(parsed) = v.parse() {
                config.thread_max = parsed;
            }
        }
        if let Ok(v) = std::env::var("DART_LOG") {
            config.log_filter = v;
        }

        config
    }
}
