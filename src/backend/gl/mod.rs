//! OpenGL helpers shared by all drivers
//!
//! The drivers only need a handful of entry points: clearing the first frame and asking the context
//! for its version. Everything else is drawn by the application with its own GL loader.

mod version;
pub use version::{GlApi, GlVersion, VersionError};

#[cfg(feature = "renderer_gl")]
#[allow(clippy::all, missing_docs, missing_debug_implementations)]
pub mod ffi {
    include!(concat!(env!("OUT_DIR"), "/gl_bindings.rs"));
}

/// GL flavor contexts are created for
///
/// Chosen at build time through the `gles` and `desktop_gl` features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlProfile {
    /// OpenGL ES 2.0 or newer
    Gles,
    /// Desktop OpenGL
    Gl,
}

impl GlProfile {
    /// Returns the profile this crate was built for.
    ///
    /// `gles` takes precedence if both profiles are enabled; `None` if neither is.
    pub const fn configured() -> Option<GlProfile> {
        if cfg!(feature = "gles") {
            Some(GlProfile::Gles)
        } else if cfg!(feature = "desktop_gl") {
            Some(GlProfile::Gl)
        } else {
            None
        }
    }

    /// Returns the API contexts of this profile report.
    pub fn api(self) -> GlApi {
        match self {
            GlProfile::Gles => GlApi::Gles,
            GlProfile::Gl => GlApi::Gl,
        }
    }
}

/// Errors of the GL helpers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required entry point could not be resolved
    #[error("Failed to load GL function {0}")]
    FunctionNotLoaded(&'static str),
    /// `glGetString(GL_VERSION)` returned nothing
    #[error("The GL context did not report a version")]
    NoVersionString,
    /// The version string could not be interpreted
    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Loaded GL entry points together with what the context reported about itself
#[cfg(feature = "renderer_gl")]
pub struct GlContextInfo {
    /// Raw function table
    pub gl: ffi::Gles2,
    /// `GL_VERSION` as reported by the implementation
    pub version_string: String,
    /// Parsed version, if it is a known release
    pub version: Option<GlVersion>,
}

#[cfg(feature = "renderer_gl")]
impl std::fmt::Debug for GlContextInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlContextInfo")
            .field("version_string", &self.version_string)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "renderer_gl")]
impl GlContextInfo {
    /// Clears the color buffer to `color`.
    ///
    /// The context has to be current on the calling thread.
    pub fn clear(&self, color: [f32; 4]) {
        let [r, g, b, a] = color;
        unsafe {
            self.gl.ClearColor(r, g, b, a);
            self.gl.Clear(ffi::COLOR_BUFFER_BIT);
        }
    }
}

/// Loads the GL functions of the current context through `loader`, clears the
/// back buffer to opaque black and queries the version.
///
/// The context has to be current on the calling thread.
#[cfg(feature = "renderer_gl")]
pub fn load_and_clear<F>(loader: F) -> Result<GlContextInfo, Error>
where
    F: FnMut(&'static str) -> *const std::os::raw::c_void,
{
    use std::{ffi::CStr, os::raw::c_char};

    let gl = ffi::Gles2::load_with(loader);
    if !gl.GetString.is_loaded() {
        return Err(Error::FunctionNotLoaded("glGetString"));
    }
    if !gl.Clear.is_loaded() || !gl.ClearColor.is_loaded() {
        return Err(Error::FunctionNotLoaded("glClear"));
    }

    let version_string = unsafe {
        gl.ClearColor(0.0, 0.0, 0.0, 1.0);
        gl.Clear(ffi::COLOR_BUFFER_BIT);

        let ptr = gl.GetString(ffi::VERSION) as *const c_char;
        if ptr.is_null() {
            return Err(Error::NoVersionString);
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    };

    let version = match GlVersion::parse(&version_string) {
        Ok(version) => Some(version),
        Err(err) => {
            tracing::warn!("{}", err);
            None
        }
    };
    tracing::info!(version = %version_string, "GL context loaded");

    Ok(GlContextInfo {
        gl,
        version_string,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_follows_features() {
        let profile = GlProfile::configured();
        if cfg!(feature = "gles") {
            assert_eq!(profile, Some(GlProfile::Gles));
        } else if cfg!(feature = "desktop_gl") {
            assert_eq!(profile, Some(GlProfile::Gl));
        } else {
            assert_eq!(profile, None);
        }
    }

    #[test]
    fn profile_api() {
        assert_eq!(GlProfile::Gles.api(), GlApi::Gles);
        assert_eq!(GlProfile::Gl.api(), GlApi::Gl);
    }
}
