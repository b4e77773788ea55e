use std::{io, path::PathBuf};

use crate::backend::{egl, gl};

/// Errors thrown by the DRM driver and its helpers
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Unable to acquire DRM master
    #[error("Failed to acquire DRM master: {0}")]
    DrmMasterFailed(#[source] io::Error),
    /// The underlying DRM device reported an error
    #[error(transparent)]
    Access(#[from] AccessError),
    /// No primary node could be opened with mode-setting resources
    #[error("No DRM device with mode-setting resources found")]
    NoDeviceFound,
    /// The requested connector does not exist or is not connected
    #[error("Connector {0} does not exist or is not connected")]
    InvalidConnector(usize),
    /// No connector is connected
    #[error("No connected connector found")]
    NoConnectorFound,
    /// The connector reports no modes
    #[error("The connector does not have any modes")]
    NoModeFound,
    /// The connector has no encoder
    #[error("The connector does not have any encoders")]
    NoEncoderFound,
    /// No CRTC can drive the connector
    #[error("No encoder with a usable CRTC found for the connector")]
    NoCrtcFound,
    /// Setting up GBM failed
    #[error("{errmsg}: {source}")]
    Gbm {
        /// Error message associated to the failure
        errmsg: &'static str,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// The GBM device of a buffer object is already gone
    #[error("Failed to access buffer userdata: {0}")]
    GbmDeviceDestroyed(#[from] gbm::DeviceDestroyedError),
    /// The GBM surface had no buffer ready after a swap
    #[error("Failed to lock the front buffer of the gbm surface")]
    FrontBufferLockFailed,
    /// A page flip was queued while the previous one was still waiting for its release
    #[error("Tried to queue a flip while another one is still pending")]
    FlipAlreadyPending,
    /// EGL error
    #[error(transparent)]
    Egl(#[from] egl::Error),
    /// GL loading error
    #[error(transparent)]
    Gl(#[from] gl::Error),
}

/// Error when trying to communicate with the DRM device
#[derive(thiserror::Error, Debug)]
#[error("{errmsg} on device `{dev:?}` ({source:})")]
pub struct AccessError {
    /// Error message associated to the access error
    pub errmsg: &'static str,
    /// Device on which the error was generated
    pub dev: Option<PathBuf>,
    /// Underlying device error
    #[source]
    pub source: io::Error,
}
