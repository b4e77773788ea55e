//! Process-wide HAL configuration
//!
//! The HAL is configured once, before any graphics object exists, and then frozen.
//! Configuration happens on a [`HalBuilder`]; [`HalBuilder::init`] validates it and consumes it into a
//! [`Hal`], which is the immutable context every other part of the crate is created from.
//!
//! Only one [`Hal`] can be alive in a process at a time. Graphics handles share it, so the active
//! backend cannot change under a live handle. Dropping the `Hal` and every handle created from it
//! tears the HAL down again, after which a new builder may be initialized.
//!
//! ```no_run
//! use glhal::hal::{GfxBackend, HalBuilder, I2cBackend};
//!
//! let mut builder = HalBuilder::new();
//! builder
//!     .set_gfx_backend(GfxBackend::Drm)?
//!     .set_i2c_backend(I2cBackend::Simulated)?;
//! let hal = builder.init()?;
//! # Ok::<(), glhal::hal::HalError>(())
//! ```

use std::{
    env, fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::{debug, error, info};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Environment variable selecting the graphics backend in [`HalBuilder::from_env`]
pub const GFX_BACKEND_ENV: &str = "GLHAL_GFX_BACKEND";
/// Environment variable selecting the I2C backend in [`HalBuilder::from_env`]
pub const I2C_BACKEND_ENV: &str = "GLHAL_I2C_BACKEND";
/// Environment variable selecting the DRM connector index in [`HalBuilder::from_env`]
pub const DRM_CONNECTOR_ENV: &str = "GLHAL_DRM_CONNECTOR";

/// Errors of the HAL configuration
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HalError {
    /// Another [`Hal`] is still alive
    #[error("The HAL is already initialized")]
    AlreadyInitialized,
    /// No graphics backend was selected before init
    #[error("graphics backend not set")]
    GfxBackendNotSet,
    /// No I2C backend was selected before init
    #[error("I2C backend not set")]
    I2cBackendNotSet,
    /// `None` or an out-of-range value was passed as graphics backend
    #[error("Invalid graphics backend {0}")]
    InvalidGfxBackend(String),
    /// `None` or an out-of-range value was passed as I2C backend
    #[error("Invalid I2C backend {0}")]
    InvalidI2cBackend(String),
    /// The configured DRM connector index could not be parsed
    #[error("Invalid DRM connector index {0:?}")]
    InvalidConnector(String),
}

/// Graphics backend driving the presentation surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GfxBackend {
    /// Nothing selected yet
    #[default]
    None,
    /// DRM/KMS mode-setting with GBM buffers and EGL
    Drm,
    /// EGL window surface on an Xlib window
    EglX11,
    /// GLX drawable on an XCB window
    Glx,
}

impl GfxBackend {
    /// Returns whether the driver for this backend was compiled in.
    pub fn is_built(self) -> bool {
        match self {
            GfxBackend::None => false,
            GfxBackend::Drm => cfg!(feature = "backend_drm"),
            GfxBackend::EglX11 => cfg!(feature = "backend_egl_x11"),
            GfxBackend::Glx => cfg!(feature = "backend_glx"),
        }
    }
}

impl fmt::Display for GfxBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GfxBackend::None => "none",
            GfxBackend::Drm => "drm",
            GfxBackend::EglX11 => "egl-x11",
            GfxBackend::Glx => "glx",
        })
    }
}

impl FromStr for GfxBackend {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(GfxBackend::None),
            "drm" => Ok(GfxBackend::Drm),
            "egl-x11" | "egl_x11" | "eglx11" => Ok(GfxBackend::EglX11),
            "glx" => Ok(GfxBackend::Glx),
            _ => Err(HalError::InvalidGfxBackend(s.to_owned())),
        }
    }
}

impl From<GfxBackend> for i32 {
    fn from(backend: GfxBackend) -> i32 {
        match backend {
            GfxBackend::None => 0,
            GfxBackend::Drm => 1,
            GfxBackend::EglX11 => 2,
            GfxBackend::Glx => 3,
        }
    }
}

impl TryFrom<i32> for GfxBackend {
    type Error = HalError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GfxBackend::None),
            1 => Ok(GfxBackend::Drm),
            2 => Ok(GfxBackend::EglX11),
            3 => Ok(GfxBackend::Glx),
            x => Err(HalError::InvalidGfxBackend(x.to_string())),
        }
    }
}

/// I2C backend
///
/// The I2C subsystem itself lives outside of this crate, only its selection is part of the HAL state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum I2cBackend {
    /// Nothing selected yet
    #[default]
    None,
    /// Real I2C bus
    I2c,
    /// Simulated bus
    Simulated,
}

impl fmt::Display for I2cBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            I2cBackend::None => "none",
            I2cBackend::I2c => "i2c",
            I2cBackend::Simulated => "sim",
        })
    }
}

impl FromStr for I2cBackend {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(I2cBackend::None),
            "i2c" => Ok(I2cBackend::I2c),
            "sim" | "simulated" => Ok(I2cBackend::Simulated),
            _ => Err(HalError::InvalidI2cBackend(s.to_owned())),
        }
    }
}

impl TryFrom<i32> for I2cBackend {
    type Error = HalError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(I2cBackend::None),
            1 => Ok(I2cBackend::I2c),
            2 => Ok(I2cBackend::Simulated),
            x => Err(HalError::InvalidI2cBackend(x.to_string())),
        }
    }
}

/// Window used by the windowed backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSettings {
    /// Initial width in pixels
    pub width: u32,
    /// Initial height in pixels
    pub height: u32,
    /// Window title
    pub title: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        WindowSettings {
            width: 1280,
            height: 720,
            title: String::from("Cardiac Monitor"),
        }
    }
}

/// Mutable HAL configuration, see the [module docs](self)
#[derive(Debug, Clone, Default)]
pub struct HalBuilder {
    gfx: GfxBackend,
    i2c: I2cBackend,
    window: WindowSettings,
    drm_connector: Option<usize>,
}

impl HalBuilder {
    /// Creates an empty configuration with no backend selected.
    pub fn new() -> HalBuilder {
        HalBuilder::default()
    }

    /// Creates a configuration from the `GLHAL_*` environment variables.
    ///
    /// Unset variables leave the corresponding setting untouched.
    pub fn from_env() -> Result<HalBuilder, HalError> {
        let mut builder = HalBuilder::new();
        if let Ok(value) = env::var(GFX_BACKEND_ENV) {
            builder.set_gfx_backend(value.parse()?)?;
        }
        if let Ok(value) = env::var(I2C_BACKEND_ENV) {
            builder.set_i2c_backend(value.parse()?)?;
        }
        if let Ok(value) = env::var(DRM_CONNECTOR_ENV) {
            let index = value
                .trim()
                .parse::<usize>()
                .map_err(|_| HalError::InvalidConnector(value.clone()))?;
            builder.drm_connector(Some(index));
        }
        debug!(?builder, "Read HAL configuration from environment");
        Ok(builder)
    }

    /// Selects the graphics backend.
    ///
    /// Selecting [`GfxBackend::None`] is rejected.
    pub fn set_gfx_backend(&mut self, backend: GfxBackend) -> Result<&mut Self, HalError> {
        if backend == GfxBackend::None {
            return Err(HalError::InvalidGfxBackend(backend.to_string()));
        }
        self.gfx = backend;
        Ok(self)
    }

    /// Selects the I2C backend.
    ///
    /// Selecting [`I2cBackend::None`] is rejected.
    pub fn set_i2c_backend(&mut self, backend: I2cBackend) -> Result<&mut Self, HalError> {
        if backend == I2cBackend::None {
            return Err(HalError::InvalidI2cBackend(backend.to_string()));
        }
        self.i2c = backend;
        Ok(self)
    }

    /// Sets the default window used by the windowed backends.
    pub fn window(&mut self, window: WindowSettings) -> &mut Self {
        self.window = window;
        self
    }

    /// Forces the DRM backend onto the connector with the given index.
    ///
    /// With `None` the first connected connector is used.
    pub fn drm_connector(&mut self, index: Option<usize>) -> &mut Self {
        self.drm_connector = index;
        self
    }

    /// Returns the currently selected graphics backend.
    pub fn gfx_backend(&self) -> GfxBackend {
        self.gfx
    }

    /// Returns the currently selected I2C backend.
    pub fn i2c_backend(&self) -> I2cBackend {
        self.i2c
    }

    /// Validates the configuration and freezes it.
    ///
    /// Fails if another [`Hal`] is alive or if either backend was never selected.
    pub fn init(self) -> Result<Hal, HalError> {
        if INITIALIZED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            error!("HAL is already initialized");
            return Err(HalError::AlreadyInitialized);
        }

        let res = if self.gfx == GfxBackend::None {
            Err(HalError::GfxBackendNotSet)
        } else if self.i2c == I2cBackend::None {
            Err(HalError::I2cBackendNotSet)
        } else {
            Ok(())
        };
        if let Err(err) = res {
            error!("{}", err);
            INITIALIZED.store(false, Ordering::Release);
            return Err(err);
        }

        info!(gfx = %self.gfx, i2c = %self.i2c, "HAL initialized");
        Ok(Hal(Arc::new(HalState {
            gfx: self.gfx,
            i2c: self.i2c,
            window: self.window,
            drm_connector: self.drm_connector,
            registered: true,
        })))
    }
}

#[derive(Debug)]
struct HalState {
    gfx: GfxBackend,
    i2c: I2cBackend,
    window: WindowSettings,
    drm_connector: Option<usize>,
    // false for configurations that never went through `HalBuilder::init`
    registered: bool,
}

impl Drop for HalState {
    fn drop(&mut self) {
        if self.registered {
            debug!("HAL deinitialized");
            INITIALIZED.store(false, Ordering::Release);
        }
    }
}

/// Frozen HAL configuration
///
/// Created by [`HalBuilder::init`]. Every [`Gfx`](crate::backend::gfx::Gfx) created from it keeps a
/// share of it, so the HAL stays initialized until the `Hal` and all graphics handles created from
/// it are dropped. Until then no other configuration can be initialized.
#[derive(Debug)]
pub struct Hal(Arc<HalState>);

impl Hal {
    /// Returns the selected graphics backend.
    pub fn gfx_backend(&self) -> GfxBackend {
        self.0.gfx
    }

    /// Returns the selected I2C backend.
    pub fn i2c_backend(&self) -> I2cBackend {
        self.0.i2c
    }

    /// Returns the default window of the windowed backends.
    pub fn window(&self) -> &WindowSettings {
        &self.0.window
    }

    /// Returns the requested DRM connector index, if any.
    pub fn drm_connector(&self) -> Option<usize> {
        self.0.drm_connector
    }

    /// Returns whether graphics handles still hold a share of this configuration.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }

    /// Returns whether a [`Hal`] is currently alive in this process.
    pub fn is_initialized() -> bool {
        INITIALIZED.load(Ordering::Acquire)
    }

    pub(crate) fn share(&self) -> Hal {
        Hal(Arc::clone(&self.0))
    }

    /// Configuration for tests that bypasses the process-wide guard.
    #[cfg(test)]
    pub(crate) fn unregistered(gfx: GfxBackend) -> Hal {
        Hal(Arc::new(HalState {
            gfx,
            i2c: I2cBackend::Simulated,
            window: WindowSettings::default(),
            drm_connector: None,
            registered: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{capture_logs, hal_lock};

    fn configured() -> HalBuilder {
        let mut builder = HalBuilder::new();
        builder
            .set_gfx_backend(GfxBackend::Drm)
            .unwrap()
            .set_i2c_backend(I2cBackend::Simulated)
            .unwrap();
        builder
    }

    #[test]
    fn init_without_gfx_backend_fails_and_logs() {
        let _guard = hal_lock();
        let (res, logs) = capture_logs(|| HalBuilder::new().init());
        assert_eq!(res.unwrap_err(), HalError::GfxBackendNotSet);
        assert!(logs.contains("graphics backend not set"), "logs: {logs}");
        assert!(!Hal::is_initialized());
    }

    #[test]
    fn init_without_i2c_backend_fails_and_logs() {
        let _guard = hal_lock();
        let mut builder = HalBuilder::new();
        builder.set_gfx_backend(GfxBackend::Drm).unwrap();
        let (res, logs) = capture_logs(|| builder.init());
        assert_eq!(res.unwrap_err(), HalError::I2cBackendNotSet);
        assert!(logs.contains("I2C backend not set"), "logs: {logs}");
    }

    #[test]
    fn init_succeeds_once_both_backends_are_set() {
        let _guard = hal_lock();
        let hal = configured().init().unwrap();
        assert_eq!(hal.gfx_backend(), GfxBackend::Drm);
        assert_eq!(hal.i2c_backend(), I2cBackend::Simulated);
        assert_eq!(hal.window(), &WindowSettings::default());
        assert!(Hal::is_initialized());
    }

    #[test]
    fn second_init_is_rejected_until_teardown() {
        let _guard = hal_lock();
        let hal = configured().init().unwrap();
        assert_eq!(configured().init().unwrap_err(), HalError::AlreadyInitialized);
        drop(hal);
        assert!(!Hal::is_initialized());
        let _hal = configured().init().unwrap();
    }

    #[test]
    fn shares_keep_the_hal_initialized() {
        let _guard = hal_lock();
        let hal = configured().init().unwrap();
        assert!(!hal.is_shared());
        let share = hal.share();
        assert!(hal.is_shared());
        drop(hal);
        assert!(Hal::is_initialized());
        assert_eq!(share.gfx_backend(), GfxBackend::Drm);
        assert!(!share.is_shared());
        drop(share);
        assert!(!Hal::is_initialized());
    }

    #[test]
    fn unregistered_configurations_leave_the_guard_alone() {
        let _guard = hal_lock();
        drop(Hal::unregistered(GfxBackend::Glx));
        assert!(!Hal::is_initialized());
        let hal = configured().init().unwrap();
        drop(Hal::unregistered(GfxBackend::Glx));
        assert!(Hal::is_initialized());
        drop(hal);
    }

    #[test]
    fn none_backends_are_rejected() {
        let mut builder = HalBuilder::new();
        assert!(builder.set_gfx_backend(GfxBackend::None).is_err());
        assert!(builder.set_i2c_backend(I2cBackend::None).is_err());
        assert_eq!(builder.gfx_backend(), GfxBackend::None);
    }

    #[test]
    fn backend_values_match_the_c_enums() {
        assert_eq!(GfxBackend::try_from(1), Ok(GfxBackend::Drm));
        assert_eq!(GfxBackend::try_from(3), Ok(GfxBackend::Glx));
        assert!(GfxBackend::try_from(4).is_err());
        assert!(GfxBackend::try_from(-1).is_err());
        assert_eq!(i32::from(GfxBackend::EglX11), 2);
        assert_eq!(I2cBackend::try_from(2), Ok(I2cBackend::Simulated));
        assert!(I2cBackend::try_from(3).is_err());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("DRM".parse::<GfxBackend>(), Ok(GfxBackend::Drm));
        assert_eq!("egl-x11".parse::<GfxBackend>(), Ok(GfxBackend::EglX11));
        assert_eq!("sim".parse::<I2cBackend>(), Ok(I2cBackend::Simulated));
        assert!("vulkan".parse::<GfxBackend>().is_err());
        assert_eq!(GfxBackend::Glx.to_string().parse::<GfxBackend>(), Ok(GfxBackend::Glx));
    }

    #[test]
    fn default_window_matches_the_monitor() {
        let window = WindowSettings::default();
        assert_eq!((window.width, window.height), (1280, 720));
        assert_eq!(window.title, "Cardiac Monitor");
    }
}
