//! Open DRM devices and their discovery

use std::{
    fs, io,
    os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use drm::{
    control::{Device as ControlDevice, ResourceHandles},
    Device as BasicDevice,
};
use tracing::{debug, error, info, trace};

use super::{
    error::Error,
    node::{primary_index, DrmNode, NodeType},
};
use crate::utils::{DevPath, DeviceFd};

/// Directory the DRM device nodes live in
pub const DRI_DIR: &str = "/dev/dri";
/// Maximum number of devices looked at during discovery
pub const MAX_DRM_DEVICES: usize = 64;

#[derive(Debug)]
struct InternalDrmDeviceFd {
    fd: DeviceFd,
    privileged: AtomicBool,
}

impl Drop for InternalDrmDeviceFd {
    fn drop(&mut self) {
        info!("Dropping device: {:?}", self.fd.dev_path());
        if self.privileged.load(Ordering::Acquire) {
            if let Err(err) = self.release_master_lock() {
                error!("Failed to drop drm master state. Error: {}", err);
            }
        }
    }
}

impl AsFd for InternalDrmDeviceFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
impl BasicDevice for InternalDrmDeviceFd {}
impl ControlDevice for InternalDrmDeviceFd {}

/// Ref-counted file descriptor of an open drm device
#[derive(Debug, Clone)]
pub struct DrmDeviceFd(Arc<InternalDrmDeviceFd>);

impl AsFd for DrmDeviceFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.fd.as_fd()
    }
}

impl AsRawFd for DrmDeviceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.fd.as_raw_fd()
    }
}

impl DrmDeviceFd {
    /// Wraps an open device.
    ///
    /// No master lock is taken here. Newer kernels grant mode-setting to the first process
    /// anyway, see [`DrmDeviceFd::acquire_master`] for the contested case.
    pub fn new(fd: DeviceFd) -> DrmDeviceFd {
        DrmDeviceFd(Arc::new(InternalDrmDeviceFd {
            fd,
            privileged: AtomicBool::new(false),
        }))
    }

    /// Tries to become drm master of the device.
    ///
    /// A successful lock is released again when the last clone is dropped.
    pub fn acquire_master(&self) -> io::Result<()> {
        self.0.acquire_master_lock()?;
        self.0.privileged.store(true, Ordering::Release);
        Ok(())
    }

    /// Returns whether this process took the master lock through this device.
    pub fn is_privileged(&self) -> bool {
        self.0.privileged.load(Ordering::Acquire)
    }

    /// Returns the underlying `DeviceFd`
    pub fn device_fd(&self) -> DeviceFd {
        self.0.fd.clone()
    }

    /// Returns the `dev_t` of the underlying device
    pub fn dev_id(&self) -> io::Result<rustix::fs::Dev> {
        Ok(rustix::fs::fstat(&self.0.fd)?.st_rdev)
    }
}

impl BasicDevice for DrmDeviceFd {}
impl ControlDevice for DrmDeviceFd {}

/// Primary nodes in `dir`, ordered by index and capped at [`MAX_DRM_DEVICES`].
pub fn primary_candidates(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut candidates = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let index = primary_index(entry.file_name().to_str()?)?;
            Some((index, entry.path()))
        })
        .collect::<Vec<_>>();
    candidates.sort_by_key(|(index, _)| *index);
    Ok(candidates
        .into_iter()
        .take(MAX_DRM_DEVICES)
        .map(|(_, path)| path)
        .collect())
}

/// Opens the first primary node that provides mode-setting resources.
///
/// On success exactly one device is left open, on failure none.
pub fn find_drm_device() -> Result<(DrmDeviceFd, ResourceHandles), Error> {
    let candidates = primary_candidates(Path::new(DRI_DIR)).map_err(|err| {
        error!("Failed to list {}: {}", DRI_DIR, err);
        Error::NoDeviceFound
    })?;

    for path in candidates {
        match DrmNode::from_path(&path) {
            Ok(node) if node.ty() == NodeType::Primary => {}
            Ok(node) => {
                trace!("Skipping {}, not a primary node ({:?})", path.display(), node.ty());
                continue;
            }
            Err(err) => {
                debug!("Skipping {}: {}", path.display(), err);
                continue;
            }
        }

        let fd = match DeviceFd::open(&path) {
            Ok(fd) => fd,
            Err(err) => {
                debug!("Failed to open {}: {}", path.display(), err);
                continue;
            }
        };
        let device = DrmDeviceFd::new(fd);
        match device.resource_handles() {
            Ok(resources) => {
                info!("Using device {}", path.display());
                return Ok((device, resources));
            }
            Err(err) => debug!("{} has no mode-setting resources: {}", path.display(), err),
        }
    }

    error!("No usable DRM device found");
    Err(Error::NoDeviceFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_sorted_primary_nodes() {
        let dir = std::env::temp_dir().join(format!("glhal-dri-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for name in ["card10", "renderD128", "card2", "card0", "by-path", "controlD64"] {
            fs::write(dir.join(name), b"").unwrap();
        }

        let candidates = primary_candidates(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        let names = candidates
            .iter()
            .map(|path| path.file_name().unwrap().to_str().unwrap().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["card0", "card2", "card10"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(primary_candidates(Path::new("/nonexistent/dri")).is_err());
    }

    #[test]
    fn plain_device_is_not_privileged() {
        let device = DrmDeviceFd::new(DeviceFd::open("/dev/null").unwrap());
        assert!(!device.is_privileged());
        assert_eq!(device.device_fd().as_raw_fd(), device.as_raw_fd());
        assert!(device.dev_id().is_ok());
    }
}
