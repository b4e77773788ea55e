#[cfg(feature = "backend_glx")]
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};

use crate::backend::gl;

/// An error emitted by the X11 drivers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `XOpenDisplay` failed.
    #[error("Failed to open X display {0:?}")]
    DisplayOpenFailed(Option<String>),

    /// The display has no usable screen.
    #[error("The X display has no screen {0}")]
    NoScreen(usize),

    /// Creating the window failed.
    #[error("Failed to create the X window")]
    WindowCreationFailed,

    /// The display has no XCB connection.
    #[cfg(feature = "backend_glx")]
    #[error("Failed to get xcb connection from X")]
    NoXcbConnection,

    /// Wrapping the display's XCB connection failed.
    #[cfg(feature = "backend_glx")]
    #[error("Failed to get the XCB connection of the X display")]
    ConnectionFailed(#[from] ConnectError),

    /// Some protocol error occurred.
    #[cfg(feature = "backend_glx")]
    #[error("X11 protocol error")]
    Protocol(#[from] ReplyOrIdError),

    /// The server does not support GLX 1.3.
    #[cfg(feature = "backend_glx")]
    #[error("GLX {major}.{minor} is not supported, 1.3 is required")]
    GlxVersion {
        /// Major version reported by the server
        major: i32,
        /// Minor version reported by the server
        minor: i32,
    },

    /// No GLX framebuffer config matched.
    #[cfg(feature = "backend_glx")]
    #[error("No GLX configs available")]
    NoFbConfig,

    /// The framebuffer config has no X visual.
    #[cfg(feature = "backend_glx")]
    #[error("No X visual for the GLX config")]
    NoVisual,

    /// `glXCreateNewContext` failed.
    #[cfg(feature = "backend_glx")]
    #[error("Failed to create GLX context")]
    ContextCreationFailed,

    /// `glXCreateWindow` failed.
    #[cfg(feature = "backend_glx")]
    #[error("Failed to create GLX window")]
    GlxWindowCreationFailed,

    /// `glXMakeContextCurrent` failed.
    #[cfg(feature = "backend_glx")]
    #[error("Failed to make GLX context current")]
    MakeCurrentFailed,

    /// EGL error of the EGL-X11 driver.
    #[cfg(feature = "backend_egl_x11")]
    #[error(transparent)]
    Egl(#[from] crate::backend::egl::Error),

    /// Loading GL failed.
    #[error(transparent)]
    Gl(#[from] gl::Error),
}

#[cfg(feature = "backend_glx")]
impl From<ReplyError> for Error {
    fn from(err: ReplyError) -> Self {
        Self::Protocol(err.into())
    }
}

#[cfg(feature = "backend_glx")]
impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Self::Protocol(err.into())
    }
}
