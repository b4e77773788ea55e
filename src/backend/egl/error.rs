use super::ffi;

/// EGL errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// `libEGL.so.1` could not be opened
    #[error("Failed to load libEGL: {0}")]
    LibraryLoad(#[source] libloading::Error),
    /// Unable to obtain a valid EGL Display
    #[error("Unable to obtain a valid EGL Display. Err: {0:}")]
    DisplayNotSupported(#[source] EGLError),
    /// The native display is not supported by any platform the implementation offers
    #[error("No EGL platform is available for the native display")]
    NoPlatform,
    /// `eglInitialize` returned an error
    #[error("Failed to initialize EGL. Err: {0:}")]
    InitFailed(#[source] EGLError),
    /// `eglBindAPI` failed for the requested GL flavor
    #[error("The EGL implementation does not support the requested client API. Err: {0:?}")]
    BindApiFailed(#[source] Option<EGLError>),
    /// Failed to query the EGL configs
    #[error("Failed to configure the EGL context")]
    ConfigFailed(#[source] EGLError),
    /// No available pixel format matched the criteria
    #[error("No available pixel format matched the criteria")]
    NoAvailablePixelFormat,
    /// Context creation failed as one or more requirements could not be met
    #[error("Context creation failed as one or more requirements could not be met. Err: {0:}")]
    CreationFailed(#[source] EGLError),
    /// Creating the window surface failed
    #[error("Failed to create the EGL window surface. Err: {0:}")]
    SurfaceCreationFailed(#[source] EGLError),
    /// The context could not be made current
    #[error("Failed to make the EGL context current. Err: {0:}")]
    MakeCurrentFailed(#[source] EGLError),
    /// Presenting the back buffer failed
    #[error("eglSwapBuffers failed. Err: {0:}")]
    SwapBuffersFailed(#[source] EGLError),
}

/// Raw EGL error
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EGLError {
    /// EGL is not initialized, or could not be initialized, for the specified EGL display connection.
    #[error("EGL is not initialized, or could not be initialized, for the specified display.")]
    NotInitialized,
    /// EGL cannot access a requested resource.
    #[error("EGL cannot access a requested resource.")]
    BadAccess,
    /// EGL failed to allocate resources for the requested operation.
    #[error("EGL failed to allocate resources for the requested operation.")]
    BadAlloc,
    /// An unrecognized attribute or attribute value was passed in the attribute list.
    #[error("An unrecognized attribute or attribute value was passed in the attribute list.")]
    BadAttribute,
    /// An EGLContext argument does not name a valid EGL rendering context.
    #[error("An EGLContext argument does not name a valid EGL rendering context.")]
    BadContext,
    /// An EGLConfig argument does not name a valid EGL frame buffer configuration.
    #[error("An EGLConfig argument does not name a valid EGL frame buffer configuration.")]
    BadConfig,
    /// The current surface of the calling thread is no longer valid.
    #[error("The current surface of the calling thread is no longer valid.")]
    BadCurrentSurface,
    /// An EGLDisplay argument does not name a valid EGL display connection.
    #[error("An EGLDisplay argument does not name a valid EGL display connection.")]
    BadDisplay,
    /// An EGLSurface argument does not name a valid surface configured for GL rendering.
    #[error("An EGLSurface argument does not name a valid surface configured for GL rendering.")]
    BadSurface,
    /// Arguments are inconsistent.
    #[error("Arguments are inconsistent.")]
    BadMatch,
    /// One or more argument values are invalid.
    #[error("One or more argument values are invalid.")]
    BadParameter,
    /// A NativePixmapType argument does not refer to a valid native pixmap.
    #[error("A NativePixmapType argument does not refer to a valid native pixmap.")]
    BadNativePixmap,
    /// A NativeWindowType argument does not refer to a valid native window.
    #[error("A NativeWindowType argument does not refer to a valid native window.")]
    BadNativeWindow,
    /// A power management event has occurred, the context is lost.
    #[error("A power management event has occurred, the context is lost.")]
    ContextLost,
    /// An unknown error
    #[error("An unknown error ({0:x})")]
    Unknown(u32),
}

impl From<u32> for EGLError {
    fn from(value: u32) -> Self {
        match value {
            ffi::egl::NOT_INITIALIZED => EGLError::NotInitialized,
            ffi::egl::BAD_ACCESS => EGLError::BadAccess,
            ffi::egl::BAD_ALLOC => EGLError::BadAlloc,
            ffi::egl::BAD_ATTRIBUTE => EGLError::BadAttribute,
            ffi::egl::BAD_CONTEXT => EGLError::BadContext,
            ffi::egl::BAD_CONFIG => EGLError::BadConfig,
            ffi::egl::BAD_CURRENT_SURFACE => EGLError::BadCurrentSurface,
            ffi::egl::BAD_DISPLAY => EGLError::BadDisplay,
            ffi::egl::BAD_SURFACE => EGLError::BadSurface,
            ffi::egl::BAD_MATCH => EGLError::BadMatch,
            ffi::egl::BAD_PARAMETER => EGLError::BadParameter,
            ffi::egl::BAD_NATIVE_PIXMAP => EGLError::BadNativePixmap,
            ffi::egl::BAD_NATIVE_WINDOW => EGLError::BadNativeWindow,
            ffi::egl::CONTEXT_LOST => EGLError::ContextLost,
            x => EGLError::Unknown(x),
        }
    }
}

impl EGLError {
    fn from_last_call() -> Result<(), EGLError> {
        match unsafe { ffi::egl::GetError() as u32 } {
            ffi::egl::SUCCESS => Ok(()),
            x => Err(EGLError::from(x)),
        }
    }
}

/// Runs `call` and checks `eglGetError` afterwards.
pub(crate) fn wrap_egl_call<R, F: FnOnce() -> R>(call: F) -> Result<R, EGLError> {
    let res = call();
    EGLError::from_last_call().map(|()| res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_variants() {
        assert_eq!(EGLError::from(ffi::egl::BAD_MATCH), EGLError::BadMatch);
        assert_eq!(EGLError::from(ffi::egl::BAD_CONFIG), EGLError::BadConfig);
        assert_eq!(EGLError::from(ffi::egl::CONTEXT_LOST), EGLError::ContextLost);
        assert_eq!(EGLError::from(0x1234), EGLError::Unknown(0x1234));
    }
}
