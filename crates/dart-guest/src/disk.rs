//! Mounting the filesystem image under test and the host-shared 9p tree.
//!
//! Abstracted behind a trait the same way the teacher's NPU backends are:
//! a real implementation backed by `nix::mount`, and a mock used by tests
//! that don't run as root or don't have a loop device available.

use std::path::{Path, PathBuf};

use crate::error::GuestError;

pub trait DiskMount: Send + Sync {
    fn mount(&mut self, source: &Path, target: &Path, fstype: &str, options: Option<&str>) -> Result<(), GuestError>;
    fn unmount(&mut self, target: &Path) -> Result<(), GuestError>;
}

pub struct RealDiskMount;

impl DiskMount for RealDiskMount {
    fn mount(&mut self, source: &Path, target: &Path, fstype: &str, options: Option<&str>) -> Result<(), GuestError> {
        use nix::mount::{mount, MsFlags};
        mount(Some(source), target, Some(fstype), MsFlags::empty(), options).map_err(|e| GuestError::Mount {
            path: target.display().to_string(),
            source: e,
        })
    }

    fn unmount(&mut self, target: &Path) -> Result<(), GuestError> {
        use nix::mount::umount;
        umount(target).map_err(|e| GuestError::Unmount { path: target.display().to_string(), source: e })
    }
}

/// Records mount/unmount calls without touching the real filesystem, for
/// use in the scheduler's unit tests.
#[derive(Default)]
pub struct MockDiskMount {
    pub mounted: Vec<(PathBuf, PathBuf)>,
}

impl DiskMount for MockDiskMount {
    fn mount(&mut self, source: &Path, target: &Path, _fstype: &str, _options: Option<&str>) -> Result<(), GuestError> {
        self.mounted.push((source.to_path_buf(), target.to_path_buf()));
        Ok(())
    }

    fn unmount(&mut self, target: &Path) -> Result<(), GuestError> {
        self.mounted.retain(|(_, t)| t != target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_and_clears_mounts() {
        let mut mock = MockDiskMount::default();
        mock.mount(Path::new("/dev/vda"), Path::new("/mnt/disk"), "ext4", None).unwrap();
        assert_eq!(mock.mounted.len(), 1);
        mock.unmount(Path::new("/mnt/disk")).unwrap();
        assert!(mock.mounted.is_empty());
    }
}
