#![forbid(unsafe_op_in_unsafe_fn)]

use std::{
    io,
    os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd},
    path::{Path, PathBuf},
    sync::Arc,
};

use rustix::fs::{Mode, OFlags};

/// Ref-counted file descriptor of an open device node
#[derive(Debug, Clone)]
pub struct DeviceFd(Arc<OwnedFd>);

impl DeviceFd {
    /// Opens the device node at `path` for reading and writing.
    ///
    /// The descriptor is opened with `O_CLOEXEC`, so it does not leak into spawned processes.
    pub fn open(path: impl AsRef<Path>) -> io::Result<DeviceFd> {
        let fd = rustix::fs::open(
            path.as_ref(),
            OFlags::RDWR | OFlags::CLOEXEC | OFlags::NOCTTY,
            Mode::empty(),
        )?;
        Ok(DeviceFd::from(fd))
    }
}

impl PartialEq for DeviceFd {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.as_raw_fd() == other.0.as_raw_fd()
    }
}

impl AsFd for DeviceFd {
    #[inline]
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl AsRawFd for DeviceFd {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl From<OwnedFd> for DeviceFd {
    #[inline]
    fn from(fd: OwnedFd) -> Self {
        DeviceFd(Arc::new(fd))
    }
}

/// Trait representing open devices that *may* return a `Path`
pub trait DevPath {
    /// Returns the path of the open device if possible
    fn dev_path(&self) -> Option<PathBuf>;
}

impl<A: AsFd> DevPath for A {
    fn dev_path(&self) -> Option<PathBuf> {
        std::fs::read_link(format!("/proc/self/fd/{}", self.as_fd().as_raw_fd())).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_reports_its_path() {
        let fd = DeviceFd::open("/dev/null").unwrap();
        assert_eq!(fd.dev_path(), Some(PathBuf::from("/dev/null")));
    }

    #[test]
    fn clones_share_the_descriptor() {
        let fd = DeviceFd::open("/dev/null").unwrap();
        let other = fd.clone();
        assert_eq!(fd, other);
        assert_eq!(fd.as_raw_fd(), other.as_raw_fd());
    }

    #[test]
    fn open_missing_node_fails() {
        assert!(DeviceFd::open("/dev/does-not-exist-glhal").is_err());
    }
}
