//! Windowed drivers running as X11 clients
//!
//! Both drivers open the default display (`$DISPLAY`), create one top-level window with the
//! configured size and title and register `WM_DELETE_WINDOW`, so closing the window is reported by
//! `page_flip` instead of killing the connection.
//!
//! - [`EglX11Driver`] renders with EGL and reads events through Xlib.
//! - [`GlxDriver`] renders with GLX and hands the event queue to the display's XCB connection,
//!   read through `x11rb`.
//!
//! Neither blocks on presenting. Pending events are drained once per frame, resizes update the
//! reported size.

mod error;
mod xlib;

#[cfg(feature = "backend_egl_x11")]
mod egl;
#[cfg(feature = "backend_glx")]
mod glx;

pub use self::error::Error;
pub use self::xlib::XlibDisplay;

#[cfg(feature = "backend_egl_x11")]
pub use self::egl::{EglX11Driver, XlibWindow};
#[cfg(feature = "backend_glx")]
pub use self::glx::{Atoms, GlxDriver};
