//! EGL window surfaces

use std::sync::Arc;

use super::{
    display::EGLDisplayHandle, ffi, native::EGLNativeSurface, wrap_egl_call, EGLDisplay, EGLError, Error,
};

/// EGL surface of a native window
#[derive(Debug)]
pub struct EGLSurface {
    display: Arc<EGLDisplayHandle>,
    surface: ffi::egl::types::EGLSurface,
}

impl EGLSurface {
    /// Creates a window surface on `native` for `config`.
    ///
    /// `native` has to outlive the returned surface.
    pub fn new<N: EGLNativeSurface>(
        display: &EGLDisplay,
        config_id: ffi::egl::types::EGLConfig,
        native: &N,
    ) -> Result<EGLSurface, Error> {
        let display = display.get_display_handle();
        let surface = native
            .create(&display, config_id)
            .map_err(Error::SurfaceCreationFailed)?;
        if surface == ffi::egl::NO_SURFACE {
            return Err(Error::SurfaceCreationFailed(EGLError::BadNativeWindow));
        }

        Ok(EGLSurface { display, surface })
    }

    /// Posts the back buffer.
    #[profiling::function]
    pub fn swap_buffers(&self) -> Result<(), Error> {
        let swapped = wrap_egl_call(|| unsafe { ffi::egl::SwapBuffers(self.display.handle, self.surface) })
            .map_err(Error::SwapBuffersFailed)?;
        if swapped == ffi::egl::FALSE {
            return Err(Error::SwapBuffersFailed(EGLError::BadSurface));
        }
        Ok(())
    }

    pub(crate) fn raw(&self) -> ffi::egl::types::EGLSurface {
        self.surface
    }
}

impl Drop for EGLSurface {
    fn drop(&mut self) {
        unsafe {
            ffi::egl::DestroySurface(self.display.handle, self.surface);
        }
    }
}
