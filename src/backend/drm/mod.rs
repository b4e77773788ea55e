//! DRM/KMS backend
//!
//! Presents directly on a display connector without a window system. The pieces, leaves first:
//!
//! - [`DrmNode`] and [`find_drm_device`] pick the first primary node (`/dev/dri/card*`) with
//!   mode-setting resources and wrap it in a ref-counted [`DrmDeviceFd`].
//! - [`DrmDisplay`] resolves a connected connector, its mode and a CRTC able to drive it.
//! - [`GbmFramebufferManager`] owns the GBM device and scanout surface, registers locked buffers as
//!   KMS framebuffers (once per buffer) and keeps the replaced buffer until its flip is confirmed.
//! - [`DrmDriver`] ties this together with EGL and blocks on every page flip until the kernel
//!   reports it done, pacing rendering to the display's refresh.
//!
//! Only one process can drive the display. If setting the CRTC fails, the driver tries to become
//! drm master once before giving up.

mod device;
mod display;
mod driver;
mod error;
mod flip;
mod gbm;
mod node;

pub use self::device::{find_drm_device, primary_candidates, DrmDeviceFd, DRI_DIR, MAX_DRM_DEVICES};
pub use self::display::{choose_mode, crtc_index, pick_crtc, select_connector, ConnectorState, DrmDisplay, ModeInfo};
pub use self::driver::{with_master_retry, DrmDriver};
pub use self::error::{AccessError, Error};
pub use self::flip::{wait_for_page_flip, PollOutcome};
pub use self::gbm::{
    add_framebuffer, explicit_modifier, framebuffer_from_bo, framebuffer_id, FlipChain, FramebufferCache,
    GbmFramebuffer, GbmFramebufferManager, SCANOUT_FORMAT,
};
pub use self::node::{CreateDrmNodeError, DrmNode, NodeType};
