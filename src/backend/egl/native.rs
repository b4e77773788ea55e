//! Native display and surface types EGL can be created on

use std::{marker::PhantomData, sync::Arc};

use libc::c_void;

use super::{display::EGLDisplayHandle, ffi, wrap_egl_call, EGLError};

#[cfg(feature = "backend_drm")]
use std::{os::unix::io::AsFd, ptr};

/// EGL platform a native display can be opened through
#[derive(Debug)]
pub struct EGLPlatform<'a> {
    pub(crate) platform: ffi::egl::types::EGLenum,
    pub(crate) native_display: *mut c_void,
    pub(crate) required_extensions: &'static [&'static str],
    _phantom: PhantomData<&'a c_void>,
}

impl<'a> EGLPlatform<'a> {
    /// Describes a platform display.
    ///
    /// At least one of `required_extensions` has to be advertised as client extension for the
    /// platform to be tried.
    pub fn new(
        platform: ffi::egl::types::EGLenum,
        native_display: *mut c_void,
        required_extensions: &'static [&'static str],
    ) -> Self {
        EGLPlatform {
            platform,
            native_display,
            required_extensions,
            _phantom: PhantomData,
        }
    }
}

/// Trait for types that can be turned into an [`EGLDisplay`](super::EGLDisplay)
pub trait EGLNativeDisplay {
    /// Platforms to try, in order of preference.
    fn supported_platforms(&self) -> Vec<EGLPlatform<'_>>;

    /// Display handle for the pre-1.5 `eglGetDisplay`, used when no platform works.
    fn legacy_display(&self) -> Option<ffi::NativeDisplayType> {
        None
    }
}

/// Trait for types that EGL window surfaces can be created on
///
/// ## Safety
///
/// The returned surface has to be valid for as long as `self` is alive.
pub unsafe trait EGLNativeSurface {
    /// Creates the raw `EGLSurface` for this native surface.
    fn create(
        &self,
        display: &Arc<EGLDisplayHandle>,
        config_id: ffi::egl::types::EGLConfig,
    ) -> Result<*const c_void, EGLError>;
}

#[cfg(feature = "backend_drm")]
impl<A: AsFd> EGLNativeDisplay for gbm::Device<A> {
    fn supported_platforms(&self) -> Vec<EGLPlatform<'_>> {
        use gbm::AsRaw;

        vec![
            EGLPlatform::new(
                ffi::egl::PLATFORM_GBM_KHR,
                self.as_raw() as *mut _,
                &["EGL_KHR_platform_gbm"],
            ),
            EGLPlatform::new(
                ffi::egl::PLATFORM_GBM_MESA,
                self.as_raw() as *mut _,
                &["EGL_MESA_platform_gbm"],
            ),
        ]
    }
}

#[cfg(feature = "backend_drm")]
unsafe impl<T: 'static> EGLNativeSurface for gbm::Surface<T> {
    fn create(
        &self,
        display: &Arc<EGLDisplayHandle>,
        config_id: ffi::egl::types::EGLConfig,
    ) -> Result<*const c_void, EGLError> {
        use gbm::AsRaw;

        let window = self.as_raw() as *mut c_void;
        wrap_egl_call(|| unsafe {
            if ffi::egl::CreatePlatformWindowSurfaceEXT::is_loaded() {
                ffi::egl::CreatePlatformWindowSurfaceEXT(display.handle, config_id, window, ptr::null())
            } else {
                ffi::egl::CreatePlatformWindowSurface(display.handle, config_id, window, ptr::null())
            }
        })
    }
}
