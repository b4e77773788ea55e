//! EGL rendering contexts

use std::sync::Arc;

use tracing::warn;

use super::{display::EGLDisplayHandle, ffi, wrap_egl_call, EGLDisplay, EGLSurface, Error};
use crate::backend::gl::GlProfile;

/// EGL context for rendering
#[derive(Debug)]
pub struct EGLContext {
    context: ffi::egl::types::EGLContext,
    config_id: ffi::egl::types::EGLConfig,
    display: Arc<EGLDisplayHandle>,
}

impl EGLContext {
    /// Creates a context for `config`.
    ///
    /// GLES contexts request client version 2, desktop contexts take the implementation default.
    pub fn new(
        display: &EGLDisplay,
        config_id: ffi::egl::types::EGLConfig,
        profile: GlProfile,
    ) -> Result<EGLContext, Error> {
        let display = display.get_display_handle();

        let mut attributes = Vec::with_capacity(3);
        if profile == GlProfile::Gles {
            attributes.push(ffi::egl::CONTEXT_CLIENT_VERSION as i32);
            attributes.push(2);
        }
        attributes.push(ffi::egl::NONE as i32);

        let context = wrap_egl_call(|| unsafe {
            ffi::egl::CreateContext(
                display.handle,
                config_id,
                ffi::egl::NO_CONTEXT,
                attributes.as_ptr(),
            )
        })
        .map_err(Error::CreationFailed)?;

        Ok(EGLContext {
            context,
            config_id,
            display,
        })
    }

    /// Makes this context current on `surface` for reading and drawing.
    pub fn make_current_with_surface(&self, surface: &EGLSurface) -> Result<(), Error> {
        let surface = surface.raw();
        wrap_egl_call(|| unsafe {
            ffi::egl::MakeCurrent(self.display.handle, surface, surface, self.context)
        })
        .map(|_| ())
        .map_err(Error::MakeCurrentFailed)
    }

    /// Returns whether this context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        unsafe { ffi::egl::GetCurrentContext() == self.context as *const _ }
    }

    /// Releases the context from the calling thread.
    pub fn unbind(&self) -> Result<(), Error> {
        if self.is_current() {
            wrap_egl_call(|| unsafe {
                ffi::egl::MakeCurrent(
                    self.display.handle,
                    ffi::egl::NO_SURFACE,
                    ffi::egl::NO_SURFACE,
                    ffi::egl::NO_CONTEXT,
                )
            })
            .map_err(Error::MakeCurrentFailed)?;
        }
        Ok(())
    }

    /// Returns the config the context was created for.
    pub fn config_id(&self) -> ffi::egl::types::EGLConfig {
        self.config_id
    }
}

impl Drop for EGLContext {
    fn drop(&mut self) {
        if let Err(err) = self.unbind() {
            warn!("Failed to unbind EGL context: {}", err);
        }
        unsafe {
            ffi::egl::DestroyContext(self.display.handle, self.context);
        }
    }
}
