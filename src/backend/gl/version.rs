use std::fmt;

use scan_fmt::scan_fmt;

/// Flavor of OpenGL a context implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlApi {
    /// OpenGL ES
    Gles,
    /// Desktop OpenGL
    Gl,
}

/// Errors while interpreting a `GL_VERSION` string
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionError {
    /// The string does not contain a `major.minor` pair
    #[error("GL version string {0:?} not formatted as expected")]
    Malformed(String),
    /// The version is not one of the known releases of its API
    #[error("Unknown {api:?} version {major}.{minor}")]
    Unknown {
        /// Detected API
        api: GlApi,
        /// Parsed major version
        major: u32,
        /// Parsed minor version
        minor: u32,
    },
}

/// Known GL(ES) release of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlVersion {
    /// API the version belongs to
    pub api: GlApi,
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
}

const GLES_RELEASES: &[(u32, u32)] = &[(2, 0), (3, 0), (3, 1), (3, 2)];
const GL_RELEASES: &[(u32, u32)] = &[
    (3, 0),
    (3, 1),
    (3, 2),
    (3, 3),
    (4, 0),
    (4, 1),
    (4, 2),
    (4, 3),
    (4, 4),
    (4, 5),
    (4, 6),
];

impl GlVersion {
    /// Parses the output of `glGetString(GL_VERSION)`.
    ///
    /// ES implementations report `OpenGL ES major.minor[.release] [vendor info]`, desktop ones
    /// `major.minor[.release] [vendor info]`. Only known releases are accepted.
    pub fn parse(version: &str) -> Result<GlVersion, VersionError> {
        let api = if version.contains("ES") {
            GlApi::Gles
        } else {
            GlApi::Gl
        };

        let start = version
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| VersionError::Malformed(version.to_owned()))?;
        let (major, minor) = scan_fmt!(&version[start..], "{d}.{d}", u32, u32)
            .map_err(|_| VersionError::Malformed(version.to_owned()))?;

        let known = match api {
            GlApi::Gles => GLES_RELEASES,
            GlApi::Gl => GL_RELEASES,
        };
        if !known.contains(&(major, minor)) {
            return Err(VersionError::Unknown { api, major, minor });
        }

        Ok(GlVersion { api, major, minor })
    }

    /// Returns the GLSL version number shaders for this context have to declare.
    pub fn glsl_version(&self) -> u32 {
        match (self.api, self.major, self.minor) {
            (GlApi::Gles, 2, _) => 100,
            (GlApi::Gles, major, minor) => major * 100 + minor * 10,
            (GlApi::Gl, 3, 0) => 130,
            (GlApi::Gl, 3, 1) => 140,
            (GlApi::Gl, 3, 2) => 150,
            (GlApi::Gl, major, minor) => major * 100 + minor * 10,
        }
    }
}

impl PartialOrd for GlVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.api != other.api {
            return None;
        }
        Some((self.major, self.minor).cmp(&(other.major, other.minor)))
    }
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.api {
            GlApi::Gles => write!(f, "OpenGL ES {}.{}", self.major, self.minor),
            GlApi::Gl => write!(f, "OpenGL {}.{}", self.major, self.minor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mesa_gles_3_1() {
        let version = GlVersion::parse("OpenGL ES 3.1 Mesa 23.0").unwrap();
        assert_eq!(version.api, GlApi::Gles);
        assert_eq!((version.major, version.minor), (3, 1));
    }

    #[test]
    fn parse_nvidia_desktop_4_6() {
        let version = GlVersion::parse("4.6.0 NVIDIA 535.54").unwrap();
        assert_eq!(version.api, GlApi::Gl);
        assert_eq!((version.major, version.minor), (4, 6));
    }

    #[test]
    fn parse_gles_2_0() {
        let version = GlVersion::parse("OpenGL ES 2.0 Mesa 20.3.5").unwrap();
        assert_eq!(version, GlVersion { api: GlApi::Gles, major: 2, minor: 0 });
        assert_eq!(version.glsl_version(), 100);
    }

    #[test]
    fn unknown_release_is_rejected() {
        assert_eq!(
            GlVersion::parse("OpenGL ES 3.3 Mesa"),
            Err(VersionError::Unknown { api: GlApi::Gles, major: 3, minor: 3 })
        );
        assert!(GlVersion::parse("2.1 Mesa 21.0").is_err());
    }

    #[test]
    fn missing_numbers_are_malformed() {
        assert!(matches!(GlVersion::parse("OpenGL ES"), Err(VersionError::Malformed(_))));
        assert!(matches!(GlVersion::parse(""), Err(VersionError::Malformed(_))));
    }

    #[test]
    fn glsl_versions() {
        assert_eq!(GlVersion::parse("3.3.0 Mesa").unwrap().glsl_version(), 330);
        assert_eq!(GlVersion::parse("3.1 Mesa").unwrap().glsl_version(), 140);
        assert_eq!(GlVersion::parse("OpenGL ES 3.2").unwrap().glsl_version(), 320);
    }

    #[test]
    fn ordering_within_one_api() {
        let es30 = GlVersion::parse("OpenGL ES 3.0").unwrap();
        let es32 = GlVersion::parse("OpenGL ES 3.2").unwrap();
        let gl46 = GlVersion::parse("4.6").unwrap();
        assert!(es32 > es30);
        assert_eq!(es30.partial_cmp(&gl46), None);
        assert_eq!(gl46.to_string(), "OpenGL 4.6");
    }
}
