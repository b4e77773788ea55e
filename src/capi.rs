//! C-callable HAL interface
//!
//! Mirrors the set-then-init protocol of the HAL: backends are selected on a pending
//! configuration, [`glhal_init`] freezes it. Graphics handles are opaque pointers created with
//! [`glhal_gfx_create`] and freed with [`glhal_gfx_destroy`].
//!
//! Every function reports failure with `-1` (or a null pointer) and logs the reason. Passing a null
//! handle is such a failure, never undefined behavior.
//!
//! Backend values: graphics `0` none, `1` DRM, `2` EGL-X11, `3` GLX; I2C `0` none, `1` I2C,
//! `2` simulated.

use std::{
    ffi::CString,
    os::raw::{c_char, c_int},
    ptr,
    sync::{Mutex, MutexGuard},
};

use once_cell::sync::Lazy;
use tracing::{debug, error};

use crate::{
    backend::gfx::{FrameStatus, Gfx, GfxError},
    hal::{GfxBackend, Hal, HalBuilder, I2cBackend},
};

#[derive(Debug, Default)]
struct CApiState {
    pending: HalBuilder,
    hal: Option<Hal>,
}

static STATE: Lazy<Mutex<CApiState>> = Lazy::new(Default::default);

fn state() -> MutexGuard<'static, CApiState> {
    STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Opaque graphics handle of the C interface
#[derive(Debug, Default)]
pub struct GlhalGfx {
    gfx: Option<Gfx>,
    version: Option<CString>,
}

impl GlhalGfx {
    fn gfx(&self) -> Result<&Gfx, GfxError> {
        self.gfx.as_ref().ok_or_else(|| {
            error!("Graphics not initialized");
            GfxError::NotInitialized
        })
    }

    fn gfx_mut(&mut self) -> Result<&mut Gfx, GfxError> {
        self.gfx.as_mut().ok_or_else(|| {
            error!("Graphics not initialized");
            GfxError::NotInitialized
        })
    }
}

unsafe fn handle<'a>(gfx: *mut GlhalGfx, function: &str) -> Option<&'a mut GlhalGfx> {
    let handle = unsafe { gfx.as_mut() };
    if handle.is_none() {
        error!("{}: graphics handle is null", function);
    }
    handle
}

fn to_c_int(value: u32) -> c_int {
    c_int::try_from(value).unwrap_or(c_int::MAX)
}

/// Selects the graphics backend. Fails after [`glhal_init`] succeeded.
#[no_mangle]
pub extern "C" fn glhal_set_gfx_backend(backend: c_int) -> c_int {
    let mut state = state();
    if state.hal.is_some() {
        error!("Cannot change the graphics backend, HAL is already initialized");
        return -1;
    }
    let res = GfxBackend::try_from(backend).and_then(|backend| state.pending.set_gfx_backend(backend).map(|_| ()));
    match res {
        Ok(()) => 0,
        Err(err) => {
            error!("{}", err);
            -1
        }
    }
}

/// Selects the I2C backend. Fails after [`glhal_init`] succeeded.
#[no_mangle]
pub extern "C" fn glhal_set_i2c_backend(backend: c_int) -> c_int {
    let mut state = state();
    if state.hal.is_some() {
        error!("Cannot change the I2C backend, HAL is already initialized");
        return -1;
    }
    let res = I2cBackend::try_from(backend).and_then(|backend| state.pending.set_i2c_backend(backend).map(|_| ()));
    match res {
        Ok(()) => 0,
        Err(err) => {
            error!("{}", err);
            -1
        }
    }
}

/// Freezes the selected backends. Fails if either is unset or the HAL is initialized.
#[no_mangle]
pub extern "C" fn glhal_init() -> c_int {
    let mut state = state();
    if state.hal.is_some() {
        error!("HAL is already initialized");
        return -1;
    }
    match state.pending.clone().init() {
        Ok(hal) => {
            state.hal = Some(hal);
            0
        }
        Err(_) => -1,
    }
}

/// Tears the HAL down, after which backends can be selected again.
///
/// Fails while an initialized graphics handle still uses the HAL.
#[no_mangle]
pub extern "C" fn glhal_deinit() -> c_int {
    let mut state = state();
    match state.hal.as_ref() {
        Some(hal) if hal.is_shared() => {
            error!("Cannot deinitialize the HAL, graphics handles are still initialized");
            -1
        }
        Some(_) => {
            state.hal = None;
            0
        }
        None => {
            error!("HAL is not initialized");
            -1
        }
    }
}

/// Allocates a graphics handle. It is bound to a driver by [`glhal_gfx_init`].
#[no_mangle]
pub extern "C" fn glhal_gfx_create() -> *mut GlhalGfx {
    Box::into_raw(Box::default())
}

/// Binds the handle to the driver of the configured backend.
///
/// # Safety
///
/// `gfx` has to be null or a handle returned by [`glhal_gfx_create`] and not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn glhal_gfx_init(gfx: *mut GlhalGfx) -> c_int {
    let Some(handle) = (unsafe { handle(gfx, "glhal_gfx_init") }) else {
        return -1;
    };
    if handle.gfx.is_some() {
        error!("Graphics already initialized");
        return -1;
    }

    let state = state();
    let Some(hal) = state.hal.as_ref() else {
        error!("HAL is not initialized");
        return -1;
    };
    let mut new = Gfx::new(hal);
    drop(state);

    // only initialized handles hold on to the HAL
    match new.init() {
        Ok(()) => {
            handle.gfx = Some(new);
            0
        }
        Err(_) => -1,
    }
}

/// Releases the driver of the handle and its hold on the HAL. Shutting down twice is allowed.
///
/// # Safety
///
/// `gfx` has to be null or a handle returned by [`glhal_gfx_create`] and not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn glhal_gfx_shutdown(gfx: *mut GlhalGfx) -> c_int {
    let Some(handle) = (unsafe { handle(gfx, "glhal_gfx_shutdown") }) else {
        return -1;
    };
    if let Some(mut gfx) = handle.gfx.take() {
        gfx.shutdown();
    }
    handle.version = None;
    0
}

/// Frees the handle, shutting it down first if needed. Null is ignored.
///
/// # Safety
///
/// `gfx` has to be null or a handle returned by [`glhal_gfx_create`] and not yet destroyed. It must
/// not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn glhal_gfx_destroy(gfx: *mut GlhalGfx) {
    if gfx.is_null() {
        debug!("glhal_gfx_destroy: graphics handle is null");
        return;
    }
    drop(unsafe { Box::from_raw(gfx) });
}

/// Returns the surface width in pixels, `-1` on failure.
///
/// # Safety
///
/// `gfx` has to be null or a handle returned by [`glhal_gfx_create`] and not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn glhal_gfx_get_width(gfx: *mut GlhalGfx) -> c_int {
    let Some(handle) = (unsafe { handle(gfx, "glhal_gfx_get_width") }) else {
        return -1;
    };
    handle
        .gfx()
        .and_then(Gfx::width)
        .map_or(-1, to_c_int)
}

/// Returns the surface height in pixels, `-1` on failure.
///
/// # Safety
///
/// `gfx` has to be null or a handle returned by [`glhal_gfx_create`] and not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn glhal_gfx_get_height(gfx: *mut GlhalGfx) -> c_int {
    let Some(handle) = (unsafe { handle(gfx, "glhal_gfx_get_height") }) else {
        return -1;
    };
    handle
        .gfx()
        .and_then(Gfx::height)
        .map_or(-1, to_c_int)
}

/// Presents the frame. Returns `0` when presented, `1` when the window was asked to close and `-1`
/// on failure.
///
/// # Safety
///
/// `gfx` has to be null or a handle returned by [`glhal_gfx_create`] and not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn glhal_gfx_page_flip(gfx: *mut GlhalGfx) -> c_int {
    let Some(handle) = (unsafe { handle(gfx, "glhal_gfx_page_flip") }) else {
        return -1;
    };
    match handle.gfx_mut().and_then(Gfx::page_flip) {
        Ok(FrameStatus::Presented) => 0,
        Ok(FrameStatus::CloseRequested) => 1,
        Err(err) => {
            error!("Page flip failed: {}", err);
            -1
        }
    }
}

/// Returns the `GL_VERSION` string of the context, null on failure.
///
/// The string stays valid until the handle is shut down or destroyed.
///
/// # Safety
///
/// `gfx` has to be null or a handle returned by [`glhal_gfx_create`] and not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn glhal_gfx_get_version_string(gfx: *mut GlhalGfx) -> *const c_char {
    let Some(handle) = (unsafe { handle(gfx, "glhal_gfx_get_version_string") }) else {
        return ptr::null();
    };
    if handle.version.is_none() {
        let version = match handle.gfx().and_then(Gfx::version_string) {
            Ok(version) => version.to_owned(),
            Err(_) => return ptr::null(),
        };
        handle.version = CString::new(version).ok();
    }
    handle.version.as_ref().map_or(ptr::null(), |version| version.as_ptr())
}
