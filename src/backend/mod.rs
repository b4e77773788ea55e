//! Presentation backends
//!
//! Three drivers implement the same small contract ([`gfx::Driver`]):
//!
//! - [`drm`] scans out GBM buffers rendered with EGL directly on a display connector,
//! - [`x11::EglX11Driver`] renders with EGL into an Xlib window,
//! - [`x11::GlxDriver`] renders with GLX into an XCB window.
//!
//! Which ones exist is decided at build time through the `backend_*` features, which one runs is
//! decided by the [`Hal`](crate::hal::Hal) configuration. [`gfx::Gfx`] binds the selected driver.

#[cfg(feature = "backend_drm")]
pub mod drm;
#[cfg(feature = "backend_egl")]
pub mod egl;
pub mod gfx;
pub mod gl;
pub mod window;
#[cfg(any(feature = "backend_egl_x11", feature = "backend_glx"))]
pub mod x11;
