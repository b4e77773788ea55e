//! Classification of DRM device nodes

use std::{
    fmt::{self, Display, Formatter},
    io,
    os::unix::io::AsFd,
    path::Path,
};

use rustix::fs::{fstat, major, minor, stat, Dev as dev_t, Stat};

const PRIMARY_NAME: &str = "card";
const CONTROL_NAME: &str = "controlD";
const RENDER_NAME: &str = "renderD";

/// A node which refers to a DRM device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrmNode {
    dev: dev_t,
    ty: NodeType,
}

impl DrmNode {
    /// Creates a DRM node from an open drm device.
    ///
    /// This function does not take ownership of the passed in file descriptor.
    pub fn from_file<A: AsFd>(file: A) -> Result<DrmNode, CreateDrmNodeError> {
        let stat = fstat(file).map_err(Into::<io::Error>::into)?;
        DrmNode::from_stat(stat)
    }

    /// Creates a DRM node from path.
    pub fn from_path<A: AsRef<Path>>(path: A) -> Result<DrmNode, CreateDrmNodeError> {
        let stat = stat(path.as_ref()).map_err(Into::<io::Error>::into)?;
        DrmNode::from_stat(stat)
    }

    /// Creates a DRM node from a file stat.
    pub fn from_stat(stat: Stat) -> Result<DrmNode, CreateDrmNodeError> {
        DrmNode::from_dev_id(stat.st_rdev)
    }

    /// Creates a DRM node from a dev_t
    pub fn from_dev_id(dev: dev_t) -> Result<DrmNode, CreateDrmNodeError> {
        if !is_device_drm(dev) {
            return Err(CreateDrmNodeError::NotDrmNode);
        }
        let ty = NodeType::from_minor(minor(dev)).ok_or(CreateDrmNodeError::NotDrmNode)?;
        Ok(DrmNode { dev, ty })
    }

    /// Returns the type of the DRM node.
    pub fn ty(&self) -> NodeType {
        self.ty
    }

    /// Returns the device_id of the underlying DRM node.
    pub fn dev_id(&self) -> dev_t {
        self.dev
    }

    /// Returns the minor device number of the DRM device.
    pub fn minor(&self) -> u32 {
        minor(self.dev)
    }
}

impl Display for DrmNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.ty.minor_name_prefix(), minor(self.dev))
    }
}

/// A type of node
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum NodeType {
    /// A primary node, the only kind mode-setting works on.
    Primary,
    /// A control node, unused by the kernel nowadays.
    Control,
    /// A render node, which can only allocate and render.
    Render,
}

impl NodeType {
    /// Classifies a DRM minor number.
    ///
    /// 0-63 are primary nodes, 64-127 control nodes and 128-255 render nodes.
    pub fn from_minor(minor: u32) -> Option<NodeType> {
        match minor >> 6 {
            0 => Some(NodeType::Primary),
            1 => Some(NodeType::Control),
            2 | 3 => Some(NodeType::Render),
            _ => None,
        }
    }

    /// Returns the prefix of the device file name, `card` for primary nodes.
    pub fn minor_name_prefix(&self) -> &'static str {
        match self {
            NodeType::Primary => PRIMARY_NAME,
            NodeType::Control => CONTROL_NAME,
            NodeType::Render => RENDER_NAME,
        }
    }
}

/// Parses the index out of a primary node file name like `card1`.
pub fn primary_index(file_name: &str) -> Option<u32> {
    let index = file_name.strip_prefix(PRIMARY_NAME)?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok()
}

/// An error that may occur when creating a DrmNode from a file descriptor.
#[derive(Debug, thiserror::Error)]
pub enum CreateDrmNodeError {
    /// Some underlying IO error occured while trying to create a DRM node.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// The provided file descriptor does not refer to a DRM node.
    #[error("the provided file descriptor does not refer to a DRM node.")]
    NotDrmNode,
}

/// Returns if the given device by major:minor pair is a drm device
pub fn is_device_drm(dev: dev_t) -> bool {
    let path = format!("/sys/dev/char/{}:{}/device/drm", major(dev), minor(dev));
    stat(path.as_str()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_ranges() {
        assert_eq!(NodeType::from_minor(0), Some(NodeType::Primary));
        assert_eq!(NodeType::from_minor(63), Some(NodeType::Primary));
        assert_eq!(NodeType::from_minor(64), Some(NodeType::Control));
        assert_eq!(NodeType::from_minor(128), Some(NodeType::Render));
        assert_eq!(NodeType::from_minor(255), Some(NodeType::Render));
        assert_eq!(NodeType::from_minor(256), None);
    }

    #[test]
    fn primary_file_names() {
        assert_eq!(primary_index("card0"), Some(0));
        assert_eq!(primary_index("card12"), Some(12));
        assert_eq!(primary_index("card"), None);
        assert_eq!(primary_index("card0-HDMI-A-1"), None);
        assert_eq!(primary_index("renderD128"), None);
    }

    #[test]
    fn regular_files_are_not_drm_nodes() {
        assert!(matches!(
            DrmNode::from_path("/dev/null"),
            Err(CreateDrmNodeError::NotDrmNode)
        ));
        assert!(matches!(
            DrmNode::from_path("/nonexistent/card0"),
            Err(CreateDrmNodeError::Io(_))
        ));
    }
}
