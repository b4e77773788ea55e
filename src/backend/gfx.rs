//! Backend dispatch facade
//!
//! [`Gfx`] is what applications draw through. It is created from the frozen [`Hal`] configuration
//! and binds exactly one [`Driver`] on [`Gfx::init`], chosen by the configured [`GfxBackend`].
//! All frame operations are routed to that driver; calling them before a successful init is an
//! error that gets logged and returned, never a crash.
//!
//! ```no_run
//! use glhal::{backend::gfx::{FrameStatus, Gfx}, hal::{GfxBackend, HalBuilder, I2cBackend}};
//!
//! let mut builder = HalBuilder::new();
//! builder.set_gfx_backend(GfxBackend::Drm)?.set_i2c_backend(I2cBackend::Simulated)?;
//! let hal = builder.init()?;
//!
//! let mut gfx = Gfx::new(&hal);
//! gfx.init()?;
//! println!("{}x{} {}", gfx.width()?, gfx.height()?, gfx.version_string()?);
//! while gfx.page_flip()? == FrameStatus::Presented {
//!     // draw the next frame
//! }
//! gfx.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;

use tracing::{error, info, info_span};

use crate::{
    backend::gl::GlProfile,
    hal::{GfxBackend, Hal},
};

/// Result of presenting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was presented
    Presented,
    /// The frame was presented and the window system asked to close the window
    CloseRequested,
}

/// Errors of the dispatch facade
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    /// The selected backend was not compiled into this build
    #[error("Backend {0} is not built")]
    BackendNotBuilt(GfxBackend),
    /// No usable backend was selected
    #[error("Invalid graphics backend")]
    BackendInvalid,
    /// The operation needs an initialized driver
    #[error("Graphics not initialized")]
    NotInitialized,
    /// A driver is already bound
    #[error("Graphics already initialized")]
    AlreadyInitialized,
    /// Neither GLES nor desktop GL support was compiled in
    #[error("No GL profile configured, enable the `gles` or `desktop_gl` feature")]
    NoGlProfile,
    /// The DRM driver failed
    #[cfg(feature = "backend_drm")]
    #[error("DRM backend: {0}")]
    Drm(#[source] crate::backend::drm::Error),
    /// The EGL-X11 driver failed
    #[cfg(feature = "backend_egl_x11")]
    #[error("EGL-X11 backend: {0}")]
    EglX11(#[source] crate::backend::x11::Error),
    /// The GLX driver failed
    #[cfg(feature = "backend_glx")]
    #[error("GLX backend: {0}")]
    Glx(#[source] crate::backend::x11::Error),
}

/// Contract every backend driver implements
///
/// A driver value only exists in its initialized state: creating it acquires all native resources,
/// dropping it releases them in reverse order.
pub trait Driver: fmt::Debug {
    /// Width of the presentation surface in pixels.
    fn width(&self) -> u32;
    /// Height of the presentation surface in pixels.
    fn height(&self) -> u32;
    /// `GL_VERSION` of the context.
    fn version_string(&self) -> &str;
    /// Clears the back buffer.
    fn clear(&mut self, color: [f32; 4]);
    /// Presents the back buffer.
    fn page_flip(&mut self) -> Result<FrameStatus, GfxError>;
}

/// Graphics handle, see the [module docs](self)
///
/// The handle shares the [`Hal`] it was created from. As long as it exists no other configuration
/// can be initialized, so two handles never drive different backends.
#[derive(Debug)]
pub struct Gfx {
    // the driver goes first, the configuration may only be released after it
    driver: Option<Box<dyn Driver>>,
    hal: Hal,
}

impl Gfx {
    /// Creates an unbound handle for the backend configured in `hal`.
    pub fn new(hal: &Hal) -> Gfx {
        Gfx {
            driver: None,
            hal: hal.share(),
        }
    }

    /// Returns the backend this handle binds to.
    pub fn backend(&self) -> GfxBackend {
        self.hal.gfx_backend()
    }

    /// Returns the configuration this handle was created from.
    pub fn hal(&self) -> &Hal {
        &self.hal
    }

    /// Returns whether a driver is bound.
    pub fn is_initialized(&self) -> bool {
        self.driver.is_some()
    }

    /// Creates and initializes the driver of the configured backend.
    ///
    /// Initializing twice without [`shutdown`](Gfx::shutdown) in between is rejected and leaves the
    /// bound driver untouched.
    pub fn init(&mut self) -> Result<(), GfxError> {
        if self.driver.is_some() {
            error!("Graphics already initialized");
            return Err(GfxError::AlreadyInitialized);
        }

        let driver = self.create_driver().map_err(|err| {
            error!(backend = %self.backend(), "Failed to initialize graphics: {}", err);
            err
        })?;
        info!(
            backend = %self.backend(),
            width = driver.width(),
            height = driver.height(),
            version = driver.version_string(),
            "Graphics initialized"
        );
        self.driver = Some(driver);
        Ok(())
    }

    fn create_driver(&self) -> Result<Box<dyn Driver>, GfxError> {
        let backend = self.backend();
        if backend == GfxBackend::None {
            return Err(GfxError::BackendInvalid);
        }
        if !backend.is_built() {
            return Err(GfxError::BackendNotBuilt(backend));
        }
        #[cfg_attr(
            not(any(feature = "backend_drm", feature = "backend_egl_x11", feature = "backend_glx")),
            allow(unused_variables)
        )]
        let profile = GlProfile::configured().ok_or(GfxError::NoGlProfile)?;

        let span = info_span!("gfx", backend = %backend);
        let _guard = span.enter();

        match backend {
            #[cfg(feature = "backend_drm")]
            GfxBackend::Drm => {
                let driver = crate::backend::drm::DrmDriver::new(self.hal.drm_connector(), profile)
                    .map_err(GfxError::Drm)?;
                Ok(Box::new(driver))
            }
            #[cfg(feature = "backend_egl_x11")]
            GfxBackend::EglX11 => {
                let driver = crate::backend::x11::EglX11Driver::new(self.hal.window(), profile)
                    .map_err(GfxError::EglX11)?;
                Ok(Box::new(driver))
            }
            #[cfg(feature = "backend_glx")]
            GfxBackend::Glx => {
                let driver =
                    crate::backend::x11::GlxDriver::new(self.hal.window(), profile).map_err(GfxError::Glx)?;
                Ok(Box::new(driver))
            }
            #[allow(unreachable_patterns)]
            backend => Err(GfxError::BackendNotBuilt(backend)),
        }
    }

    /// Releases the driver and all its native resources.
    ///
    /// Does nothing if no driver is bound.
    pub fn shutdown(&mut self) {
        if let Some(driver) = self.driver.take() {
            info!(backend = %self.backend(), "Shutting down graphics");
            drop(driver);
        }
    }

    fn driver(&self) -> Result<&dyn Driver, GfxError> {
        match self.driver.as_deref() {
            Some(driver) => Ok(driver),
            None => {
                error!("Graphics not initialized");
                Err(GfxError::NotInitialized)
            }
        }
    }

    /// Width of the presentation surface in pixels.
    pub fn width(&self) -> Result<u32, GfxError> {
        self.driver().map(|driver| driver.width())
    }

    /// Height of the presentation surface in pixels.
    pub fn height(&self) -> Result<u32, GfxError> {
        self.driver().map(|driver| driver.height())
    }

    /// `GL_VERSION` of the bound context.
    pub fn version_string(&self) -> Result<&str, GfxError> {
        self.driver().map(|driver| driver.version_string())
    }

    /// Clears the back buffer to `color`.
    pub fn clear(&mut self, color: [f32; 4]) -> Result<(), GfxError> {
        match self.driver.as_deref_mut() {
            Some(driver) => {
                driver.clear(color);
                Ok(())
            }
            None => {
                error!("Graphics not initialized");
                Err(GfxError::NotInitialized)
            }
        }
    }

    /// Presents the current frame.
    ///
    /// Blocks until the display took the frame for the DRM backend. The windowed backends report a
    /// close request of the window manager as [`FrameStatus::CloseRequested`].
    #[profiling::function]
    pub fn page_flip(&mut self) -> Result<FrameStatus, GfxError> {
        match self.driver.as_deref_mut() {
            Some(driver) => driver.page_flip(),
            None => {
                error!("Graphics not initialized");
                Err(GfxError::NotInitialized)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_driver(hal: &Hal, driver: Option<Box<dyn Driver>>) -> Gfx {
        Gfx {
            driver,
            hal: hal.share(),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(backend: GfxBackend, driver: Option<Box<dyn Driver>>) -> Gfx {
        Gfx::with_driver(&Hal::unregistered(backend), driver)
    }
}

impl Drop for Gfx {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{
        hal::{HalBuilder, HalError, I2cBackend},
        test_utils::{capture_logs, hal_lock},
    };

    #[derive(Debug)]
    pub(crate) struct FakeDriver {
        pub(crate) flips: Rc<Cell<u32>>,
        pub(crate) close_after: Option<u32>,
    }

    impl FakeDriver {
        pub(crate) fn new() -> FakeDriver {
            FakeDriver {
                flips: Rc::new(Cell::new(0)),
                close_after: None,
            }
        }
    }

    impl Driver for FakeDriver {
        fn width(&self) -> u32 {
            800
        }

        fn height(&self) -> u32 {
            600
        }

        fn version_string(&self) -> &str {
            "OpenGL ES 3.1 Mesa 23.0"
        }

        fn clear(&mut self, _color: [f32; 4]) {}

        fn page_flip(&mut self) -> Result<FrameStatus, GfxError> {
            self.flips.set(self.flips.get() + 1);
            Ok(match self.close_after {
                Some(n) if self.flips.get() >= n => FrameStatus::CloseRequested,
                _ => FrameStatus::Presented,
            })
        }
    }

    #[test]
    fn calls_before_init_fail_and_log() {
        let mut gfx = Gfx::from_parts(GfxBackend::Drm, None);
        let (res, logs) = capture_logs(|| gfx.width());
        assert!(matches!(res, Err(GfxError::NotInitialized)));
        assert!(logs.contains("Graphics not initialized"), "logs: {logs}");
        assert!(matches!(gfx.height(), Err(GfxError::NotInitialized)));
        assert!(matches!(gfx.version_string(), Err(GfxError::NotInitialized)));
        assert!(matches!(gfx.page_flip(), Err(GfxError::NotInitialized)));
        assert!(matches!(gfx.clear([0.0; 4]), Err(GfxError::NotInitialized)));
    }

    #[test]
    fn calls_are_routed_to_the_driver() {
        let driver = FakeDriver {
            close_after: Some(2),
            ..FakeDriver::new()
        };
        let flips = driver.flips.clone();
        let mut gfx = Gfx::from_parts(GfxBackend::Glx, Some(Box::new(driver)));

        assert_eq!(gfx.width().unwrap(), 800);
        assert_eq!(gfx.height().unwrap(), 600);
        assert_eq!(gfx.version_string().unwrap(), "OpenGL ES 3.1 Mesa 23.0");
        assert_eq!(gfx.page_flip().unwrap(), FrameStatus::Presented);
        assert_eq!(gfx.page_flip().unwrap(), FrameStatus::CloseRequested);
        assert_eq!(flips.get(), 2);
    }

    #[test]
    fn double_init_is_rejected() {
        let mut gfx = Gfx::from_parts(GfxBackend::Drm, Some(Box::new(FakeDriver::new())));
        let (res, logs) = capture_logs(|| gfx.init());
        assert!(matches!(res, Err(GfxError::AlreadyInitialized)));
        assert!(logs.contains("already initialized"), "logs: {logs}");
        assert!(gfx.is_initialized());
        assert_eq!(gfx.width().unwrap(), 800);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut gfx = Gfx::from_parts(GfxBackend::Drm, Some(Box::new(FakeDriver::new())));
        gfx.shutdown();
        assert!(!gfx.is_initialized());
        gfx.shutdown();
        assert!(matches!(gfx.width(), Err(GfxError::NotInitialized)));
    }

    #[test]
    fn none_backend_is_invalid() {
        let mut gfx = Gfx::from_parts(GfxBackend::None, None);
        assert!(matches!(gfx.init(), Err(GfxError::BackendInvalid)));
        assert!(!gfx.is_initialized());
    }

    #[test]
    fn missing_backends_are_reported() {
        for backend in [GfxBackend::Drm, GfxBackend::EglX11, GfxBackend::Glx] {
            if backend.is_built() {
                continue;
            }
            let mut gfx = Gfx::from_parts(backend, None);
            assert!(matches!(gfx.init(), Err(GfxError::BackendNotBuilt(b)) if b == backend));
        }
    }

    #[cfg(not(any(feature = "gles", feature = "desktop_gl")))]
    #[test]
    fn init_without_gl_profile_fails() {
        let built = [GfxBackend::Drm, GfxBackend::EglX11, GfxBackend::Glx]
            .into_iter()
            .find(|backend| backend.is_built());
        if let Some(backend) = built {
            let mut gfx = Gfx::from_parts(backend, None);
            assert!(matches!(gfx.init(), Err(GfxError::NoGlProfile)));
        }
    }

    #[test]
    fn handle_follows_hal_configuration() {
        let _guard = hal_lock();
        let mut builder = HalBuilder::new();
        builder
            .set_gfx_backend(GfxBackend::EglX11)
            .unwrap()
            .set_i2c_backend(I2cBackend::I2c)
            .unwrap();
        let hal = builder.init().unwrap();
        let gfx = Gfx::new(&hal);
        assert_eq!(gfx.backend(), GfxBackend::EglX11);
        assert!(!gfx.is_initialized());
    }

    #[test]
    fn handle_pins_the_backend() {
        let _guard = hal_lock();
        let mut builder = HalBuilder::new();
        builder
            .set_gfx_backend(GfxBackend::Drm)
            .unwrap()
            .set_i2c_backend(I2cBackend::Simulated)
            .unwrap();
        let hal = builder.init().unwrap();
        let gfx = Gfx::new(&hal);
        drop(hal);

        let mut other = HalBuilder::new();
        other
            .set_gfx_backend(GfxBackend::Glx)
            .unwrap()
            .set_i2c_backend(I2cBackend::Simulated)
            .unwrap();
        let (res, logs) = capture_logs(|| other.clone().init());
        assert_eq!(res.unwrap_err(), HalError::AlreadyInitialized);
        assert!(logs.contains("already initialized"), "logs: {logs}");
        assert_eq!(gfx.backend(), GfxBackend::Drm);
        assert!(Hal::is_initialized());

        drop(gfx);
        assert!(!Hal::is_initialized());
        let hal = other.init().unwrap();
        assert_eq!(Gfx::new(&hal).backend(), GfxBackend::Glx);
    }
}
