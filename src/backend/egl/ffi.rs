#![allow(missing_docs)]

use super::Error;
use libc::{c_long, c_void};

pub type khronos_utime_nanoseconds_t = khronos_uint64_t;
pub type khronos_uint64_t = u64;
pub type khronos_ssize_t = c_long;
pub type EGLint = i32;
pub type EGLNativeDisplayType = NativeDisplayType;
pub type EGLNativePixmapType = NativePixmapType;
pub type EGLNativeWindowType = NativeWindowType;
pub type NativeDisplayType = *const c_void;
pub type NativePixmapType = *const c_void;
pub type NativeWindowType = *const c_void;

const LIBEGL: &str = "libEGL.so.1";

/// Loads libEGL symbols, if not loaded already, and returns the client extensions.
///
/// This normally happens automatically during [`EGLDisplay`](super::EGLDisplay) initialization.
/// An implementation without `EGL_EXT_client_extensions` yields an empty list.
pub fn make_sure_egl_is_loaded() -> Result<Vec<String>, Error> {
    use std::{ffi::CStr, ptr};

    let lib = egl::LIB
        .get_or_try_init(|| unsafe { libloading::Library::new(LIBEGL) })
        .map_err(Error::LibraryLoad)?;

    egl::LOAD.call_once(|| unsafe {
        egl::load_with(|sym| match lib.get::<*mut c_void>(sym.as_bytes()) {
            Ok(x) => *x as *const _,
            Err(_) => ptr::null(),
        });
        // extension entry points are only reachable through eglGetProcAddress
        egl::GetPlatformDisplayEXT::load_with(|sym| super::get_proc_address(sym));
        egl::CreatePlatformWindowSurfaceEXT::load_with(|sym| super::get_proc_address(sym));
    });

    let extensions = unsafe {
        // eglQueryString on EGL_NO_DISPLAY raises EGL_BAD_DISPLAY without client extension support,
        // so the error is not interesting here
        let p = egl::QueryString(egl::NO_DISPLAY, egl::EXTENSIONS as i32);
        let _ = egl::GetError();
        if p.is_null() {
            Vec::new()
        } else {
            CStr::from_ptr(p)
                .to_string_lossy()
                .split_whitespace()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        }
    };
    tracing::debug!(?extensions, "Loaded {}", LIBEGL);

    Ok(extensions)
}

/// Module containing raw egl function bindings
#[allow(clippy::all, missing_debug_implementations)]
pub mod egl {
    use super::*;
    use libloading::Library;
    use once_cell::sync::OnceCell;
    use std::sync::Once;

    pub static LIB: OnceCell<Library> = OnceCell::new();
    pub static LOAD: Once = Once::new();

    include!(concat!(env!("OUT_DIR"), "/egl_bindings.rs"));
}
