//! EGL display initialization and config selection

use std::{ffi::CStr, sync::Arc};

use tracing::{debug, info, info_span, warn};

use super::{ffi, native::EGLNativeDisplay, wrap_egl_call, EGLError, Error};
use crate::backend::gl::GlProfile;

/// Raw `EGLDisplay`, terminated on drop
#[derive(Debug)]
pub struct EGLDisplayHandle {
    /// Raw handle
    pub handle: ffi::egl::types::EGLDisplay,
}

impl Drop for EGLDisplayHandle {
    fn drop(&mut self) {
        unsafe {
            ffi::egl::Terminate(self.handle);
        }
    }
}

/// An initialized EGL display
#[derive(Debug, Clone)]
pub struct EGLDisplay {
    display: Arc<EGLDisplayHandle>,
    egl_version: (i32, i32),
    extensions: Vec<String>,
}

impl EGLDisplay {
    /// Opens and initializes an EGL display on top of `native`.
    ///
    /// Platform displays are preferred (`eglGetPlatformDisplay`, then the EXT variant); the
    /// legacy `eglGetDisplay` is only used when the native type offers it and no platform works.
    pub fn new<N: EGLNativeDisplay + ?Sized>(native: &N) -> Result<EGLDisplay, Error> {
        let span = info_span!("backend_egl");
        let _guard = span.enter();

        let client_extensions = ffi::make_sure_egl_is_loaded()?;
        let handle = unsafe { get_display(native, &client_extensions)? };
        // wrap right away, so a failing init still terminates the display
        let display = Arc::new(EGLDisplayHandle { handle });

        let mut major: ffi::EGLint = 0;
        let mut minor: ffi::EGLint = 0;
        let initialized = wrap_egl_call(|| unsafe {
            ffi::egl::Initialize(display.handle, &mut major, &mut minor)
        })
        .map_err(Error::InitFailed)?;
        if initialized == ffi::egl::FALSE {
            return Err(Error::InitFailed(EGLError::NotInitialized));
        }
        info!("EGL Initialized");
        info!("EGL Version: {:?}", (major, minor));

        let extensions = unsafe {
            let p = ffi::egl::QueryString(display.handle, ffi::egl::EXTENSIONS as i32);
            if p.is_null() {
                Vec::new()
            } else {
                CStr::from_ptr(p)
                    .to_string_lossy()
                    .split_whitespace()
                    .map(str::to_owned)
                    .collect()
            }
        };
        debug!("Supported EGL display extensions: {:?}", extensions);

        Ok(EGLDisplay {
            display,
            egl_version: (major, minor),
            extensions,
        })
    }

    /// Binds the client API matching `profile` for this thread.
    pub fn bind_api(&self, profile: GlProfile) -> Result<(), Error> {
        let api = match profile {
            GlProfile::Gles => ffi::egl::OPENGL_ES_API,
            GlProfile::Gl => ffi::egl::OPENGL_API,
        };
        let bound = wrap_egl_call(|| unsafe { ffi::egl::BindAPI(api) })
            .map_err(|err| Error::BindApiFailed(Some(err)))?;
        if bound == ffi::egl::FALSE {
            return Err(Error::BindApiFailed(None));
        }
        Ok(())
    }

    /// Returns all configs matching `attributes`.
    ///
    /// The list is terminated with `EGL_NONE` here, callers only pass key/value pairs.
    pub fn choose_config(
        &self,
        attributes: &[ffi::EGLint],
    ) -> Result<Vec<ffi::egl::types::EGLConfig>, Error> {
        let mut attributes = attributes.to_vec();
        attributes.push(ffi::egl::NONE as ffi::EGLint);

        let mut num_configs = 0;
        wrap_egl_call(|| unsafe {
            ffi::egl::ChooseConfig(
                self.display.handle,
                attributes.as_ptr(),
                std::ptr::null_mut(),
                0,
                &mut num_configs,
            )
        })
        .map_err(Error::ConfigFailed)?;
        if num_configs <= 0 {
            return Err(Error::NoAvailablePixelFormat);
        }

        let mut configs = Vec::with_capacity(num_configs as usize);
        wrap_egl_call(|| unsafe {
            ffi::egl::ChooseConfig(
                self.display.handle,
                attributes.as_ptr(),
                configs.as_mut_ptr(),
                num_configs,
                &mut num_configs,
            )
        })
        .map_err(Error::ConfigFailed)?;
        unsafe {
            configs.set_len(num_configs.max(0) as usize);
        }

        if configs.is_empty() {
            return Err(Error::NoAvailablePixelFormat);
        }
        Ok(configs)
    }

    /// Queries a single attribute of `config`.
    pub fn config_attrib(
        &self,
        config: ffi::egl::types::EGLConfig,
        attribute: ffi::egl::types::EGLenum,
    ) -> Result<ffi::EGLint, Error> {
        let mut value = 0;
        wrap_egl_call(|| unsafe {
            ffi::egl::GetConfigAttrib(self.display.handle, config, attribute as ffi::EGLint, &mut value)
        })
        .map_err(Error::ConfigFailed)?;
        Ok(value)
    }

    /// Returns the reference-counted raw display.
    pub fn get_display_handle(&self) -> Arc<EGLDisplayHandle> {
        self.display.clone()
    }

    /// Returns the version reported by `eglInitialize`.
    pub fn get_egl_version(&self) -> (i32, i32) {
        self.egl_version
    }

    /// Returns the display extensions.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

unsafe fn get_display<N: EGLNativeDisplay + ?Sized>(
    native: &N,
    client_extensions: &[String],
) -> Result<ffi::egl::types::EGLDisplay, Error> {
    for platform in native.supported_platforms() {
        if !platform
            .required_extensions
            .iter()
            .any(|ext| client_extensions.iter().any(|e| e == ext))
        {
            debug!(
                "Skipping EGL platform {:#x}, none of {:?} is supported",
                platform.platform, platform.required_extensions
            );
            continue;
        }

        if ffi::egl::GetPlatformDisplay::is_loaded() {
            let attributes = [ffi::egl::NONE as ffi::egl::types::EGLAttrib];
            match wrap_egl_call(|| unsafe {
                ffi::egl::GetPlatformDisplay(platform.platform, platform.native_display, attributes.as_ptr())
            }) {
                Ok(display) if display != ffi::egl::NO_DISPLAY => return Ok(display),
                Ok(_) => {}
                Err(err) => warn!("eglGetPlatformDisplay failed: {}", err),
            }
        }

        if ffi::egl::GetPlatformDisplayEXT::is_loaded() {
            let attributes = [ffi::egl::NONE as ffi::EGLint];
            match wrap_egl_call(|| unsafe {
                ffi::egl::GetPlatformDisplayEXT(platform.platform, platform.native_display, attributes.as_ptr())
            }) {
                Ok(display) if display != ffi::egl::NO_DISPLAY => return Ok(display),
                Ok(_) => {}
                Err(err) => warn!("eglGetPlatformDisplayEXT failed: {}", err),
            }
        }
    }

    if let Some(native_display) = native.legacy_display() {
        let display = wrap_egl_call(|| unsafe { ffi::egl::GetDisplay(native_display) })
            .map_err(Error::DisplayNotSupported)?;
        if display != ffi::egl::NO_DISPLAY {
            return Ok(display);
        }
        return Err(Error::DisplayNotSupported(EGLError::BadDisplay));
    }

    Err(Error::NoPlatform)
}

/// Picks the config whose native visual matches `format`.
///
/// Without a format the first config wins. Configs for which `visual_of` returns `None` are skipped.
pub fn match_native_visual<C, F>(configs: &[C], format: Option<u32>, mut visual_of: F) -> Option<C>
where
    C: Copy,
    F: FnMut(C) -> Option<ffi::EGLint>,
{
    let Some(format) = format else {
        return configs.first().copied();
    };
    configs
        .iter()
        .copied()
        .find(|config| visual_of(*config).map(|visual| visual as u32) == Some(format))
}

#[cfg(test)]
mod tests {
    use super::match_native_visual;

    const XRGB8888: u32 = 0x3432_5258;
    const ARGB8888: u32 = 0x3432_5241;

    #[test]
    fn visual_matching_format_wins() {
        let configs = [(0, ARGB8888), (1, XRGB8888), (2, XRGB8888)];
        let picked = match_native_visual(&configs, Some(XRGB8888), |(_, visual)| Some(visual as i32));
        assert_eq!(picked, Some((1, XRGB8888)));
    }

    #[test]
    fn no_format_takes_first() {
        let configs = [(7, ARGB8888), (8, XRGB8888)];
        assert_eq!(match_native_visual(&configs, None, |_| None), Some((7, ARGB8888)));
    }

    #[test]
    fn no_match_and_failed_queries() {
        let configs = [(0, ARGB8888), (1, XRGB8888)];
        assert_eq!(
            match_native_visual(&configs, Some(XRGB8888), |(id, visual)| {
                (id != 1).then_some(visual as i32)
            }),
            None
        );
        let empty: [(u32, u32); 0] = [];
        assert_eq!(match_native_visual(&empty, None, |_| None), None);
    }
}
