//! Various utilities used by the drivers

mod fd;
pub use fd::{DevPath, DeviceFd};
