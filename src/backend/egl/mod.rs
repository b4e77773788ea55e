//! Common traits and types for EGL rendering
//!
//! libEGL is loaded at runtime on first use. The drivers open an [`EGLDisplay`] on their native
//! display type (a GBM device or an Xlib display), create an [`EGLContext`] and an [`EGLSurface`] on
//! their native window and make them current. Every object releases its EGL handle when dropped.

use std::ffi::CString;

use libc::c_void;

pub mod context;
pub mod display;
mod error;
pub mod ffi;
pub mod native;
pub mod surface;

pub use self::context::EGLContext;
pub use self::display::EGLDisplay;
pub use self::error::*;
pub use self::native::{EGLNativeDisplay, EGLNativeSurface, EGLPlatform};
pub use self::surface::EGLSurface;

/// Returns the address of an OpenGL function.
///
/// Result is independent of displays and does not guarantee an extension is actually supported at
/// runtime. Unknown or invalid symbols yield a null pointer.
///
/// # Safety
///
/// libEGL has to be loaded, see [`ffi::make_sure_egl_is_loaded`].
pub unsafe fn get_proc_address(symbol: &str) -> *const c_void {
    match CString::new(symbol) {
        Ok(name) => unsafe { ffi::egl::GetProcAddress(name.as_ptr()) as *const _ },
        Err(_) => std::ptr::null(),
    }
}
