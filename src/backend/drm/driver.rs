//! The DRM/KMS driver
//!
//! Renders through EGL into a GBM surface and scans the buffers out directly with KMS page flips.

use std::io;

use drm::control::{framebuffer, Device as ControlDevice, PageFlipFlags};
use tracing::{debug, error, info, info_span, trace, warn};

use super::{
    display::DrmDisplay,
    error::{AccessError, Error},
    flip::wait_for_page_flip,
    gbm::{GbmFramebufferManager, SCANOUT_FORMAT},
};
use crate::{
    backend::{
        egl::{self, display::match_native_visual, ffi, EGLContext, EGLDisplay, EGLSurface},
        gfx::{Driver, FrameStatus, GfxError},
        gl::{self, GlContextInfo, GlProfile},
    },
    utils::DevPath,
};

/// Runs `attempt`, and if it fails tries to become drm master once and runs it again.
///
/// A failed master acquisition ends the retry with [`Error::DrmMasterFailed`].
pub fn with_master_retry<T, A, M>(mut attempt: A, acquire_master: M) -> Result<T, Error>
where
    A: FnMut() -> Result<T, AccessError>,
    M: FnOnce() -> io::Result<()>,
{
    match attempt() {
        Ok(value) => Ok(value),
        Err(err) => {
            debug!("{}, attempting to set drm master", err);
            if let Err(err) = acquire_master() {
                error!("Unable to become drm master: {}", err);
                return Err(Error::DrmMasterFailed(err));
            }
            debug!("Became drm master");
            Ok(attempt()?)
        }
    }
}

/// Requests a flip and waits for the kernel to complete it.
///
/// `on_rejected` runs only if the request is refused. A failed wait leaves the queued buffer alone,
/// the kernel may already scan it out.
fn flip_and_wait<R, W, F>(request: R, wait: W, on_rejected: F) -> Result<(), Error>
where
    R: FnOnce() -> Result<(), Error>,
    W: FnOnce() -> Result<(), Error>,
    F: FnOnce(),
{
    if let Err(err) = request() {
        debug!("Drm page flip failed, releasing buffer: {}", err);
        on_rejected();
        return Err(err);
    }
    wait()
}

fn request_flip(drm_display: &DrmDisplay, fb: framebuffer::Handle) -> Result<(), Error> {
    let device = drm_display.device();
    device
        .page_flip(drm_display.crtc(), fb, PageFlipFlags::EVENT, None)
        .map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Failed to queue page flip",
                dev: device.dev_path(),
                source,
            })
        })
}

fn config_attributes(profile: GlProfile) -> [ffi::EGLint; 12] {
    let renderable = match profile {
        GlProfile::Gles => ffi::egl::OPENGL_ES2_BIT as ffi::EGLint,
        GlProfile::Gl => ffi::egl::OPENGL_BIT as ffi::EGLint,
    };
    [
        ffi::egl::RED_SIZE as ffi::EGLint,
        1,
        ffi::egl::GREEN_SIZE as ffi::EGLint,
        1,
        ffi::egl::BLUE_SIZE as ffi::EGLint,
        1,
        ffi::egl::ALPHA_SIZE as ffi::EGLint,
        0,
        ffi::egl::RENDERABLE_TYPE as ffi::EGLint,
        renderable,
        ffi::egl::SURFACE_TYPE as ffi::EGLint,
        ffi::egl::WINDOW_BIT as ffi::EGLint,
    ]
}

/// Driver presenting on a DRM connector
///
/// The mode is chosen once, so the size never changes.
#[derive(Debug)]
pub struct DrmDriver {
    // field order is the teardown order
    gl: GlContextInfo,
    surface: EGLSurface,
    context: EGLContext,
    egl: EGLDisplay,
    framebuffers: GbmFramebufferManager,
    display: DrmDisplay,
}

impl DrmDriver {
    /// Opens a DRM device, sets up rendering and shows a first, cleared frame.
    ///
    /// `connector` forces a connector index, otherwise the first connected one is used.
    pub fn new(connector: Option<usize>, profile: GlProfile) -> Result<DrmDriver, Error> {
        let span = info_span!("backend_drm", glhal_module = "backend_drm");
        let _guard = span.enter();

        let drm_display = DrmDisplay::open(connector)?;
        let (width, height) = drm_display.size();
        let mut framebuffers = GbmFramebufferManager::new(drm_display.device(), width, height)?;

        let egl = EGLDisplay::new(framebuffers.device())?;
        egl.bind_api(profile)?;
        let configs = egl.choose_config(&config_attributes(profile))?;
        let config = match_native_visual(&configs, Some(SCANOUT_FORMAT as u32), |config| {
            egl.config_attrib(config, ffi::egl::NATIVE_VISUAL_ID as ffi::egl::types::EGLenum)
                .ok()
        })
        .ok_or(egl::Error::NoAvailablePixelFormat)?;

        let context = EGLContext::new(&egl, config, profile)?;
        let surface = EGLSurface::new(&egl, config, framebuffers.surface())?;
        context.make_current_with_surface(&surface)?;

        let gl = gl::load_and_clear(|symbol| unsafe { egl::get_proc_address(symbol) })?;
        surface.swap_buffers()?;
        let fb = framebuffers.lock_next()?;

        let device = drm_display.device();
        with_master_retry(
            || {
                device
                    .set_crtc(
                        drm_display.crtc(),
                        Some(fb),
                        (0, 0),
                        &[drm_display.connector()],
                        Some(drm_display.mode()),
                    )
                    .map_err(|source| AccessError {
                        errmsg: "Failed to set crtc",
                        dev: device.dev_path(),
                        source,
                    })
            },
            || device.acquire_master(),
        )?;
        debug!(crtc = ?drm_display.crtc(), ?fb, "Crtc set");

        let mut driver = DrmDriver {
            gl,
            surface,
            context,
            egl,
            framebuffers,
            display: drm_display,
        };
        driver.flip(fb)?;
        driver.framebuffers.release();

        info!(
            width,
            height,
            version = %driver.gl.version_string,
            "DRM driver initialized"
        );
        Ok(driver)
    }

    fn flip(&mut self, fb: framebuffer::Handle) -> Result<(), Error> {
        let drm_display = &self.display;
        let framebuffers = &mut self.framebuffers;
        flip_and_wait(
            || request_flip(drm_display, fb),
            || wait_for_page_flip(drm_display.device(), drm_display.crtc()),
            || {
                if let Err(err) = framebuffers.discard_current() {
                    warn!("Failed to discard the rejected buffer: {}", err);
                }
            },
        )
    }

    /// Swaps, queues the new front buffer and blocks until the display shows it.
    ///
    /// If the kernel refuses the flip, the new framebuffer is removed again and the previous frame
    /// stays on screen.
    #[profiling::function]
    pub fn present(&mut self) -> Result<(), Error> {
        self.surface.swap_buffers()?;
        let fb = self.framebuffers.lock_next()?;
        self.flip(fb)?;
        self.framebuffers.release();
        trace!(?fb, "Presented");
        Ok(())
    }

    /// Returns the connector, mode and CRTC the driver presents on.
    pub fn display(&self) -> &DrmDisplay {
        &self.display
    }

    /// Returns the EGL display.
    pub fn egl_display(&self) -> &EGLDisplay {
        &self.egl
    }

    /// Returns the EGL context.
    pub fn context(&self) -> &EGLContext {
        &self.context
    }
}

impl Driver for DrmDriver {
    fn width(&self) -> u32 {
        self.display.size().0
    }

    fn height(&self) -> u32 {
        self.display.size().1
    }

    fn version_string(&self) -> &str {
        &self.gl.version_string
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.gl.clear(color);
    }

    fn page_flip(&mut self) -> Result<FrameStatus, GfxError> {
        self.present().map_err(GfxError::Drm)?;
        Ok(FrameStatus::Presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn busy() -> AccessError {
        AccessError {
            errmsg: "Failed to set crtc",
            dev: None,
            source: io::Error::from_raw_os_error(libc::EACCES),
        }
    }

    #[test]
    fn success_needs_no_master() {
        let acquired = Cell::new(false);
        let res = with_master_retry(
            || Ok::<_, AccessError>(7),
            || {
                acquired.set(true);
                Ok(())
            },
        );
        assert_eq!(res.unwrap(), 7);
        assert!(!acquired.get());
    }

    #[test]
    fn retries_once_after_becoming_master() {
        let attempts = Cell::new(0);
        let res = with_master_retry(
            || {
                attempts.set(attempts.get() + 1);
                if attempts.get() == 1 {
                    Err(busy())
                } else {
                    Ok(())
                }
            },
            || Ok(()),
        );
        assert!(res.is_ok());
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn failed_master_is_fatal() {
        let attempts = Cell::new(0);
        let res = with_master_retry(
            || {
                attempts.set(attempts.get() + 1);
                Err::<(), _>(busy())
            },
            || Err(io::Error::from_raw_os_error(libc::EPERM)),
        );
        assert!(matches!(res, Err(Error::DrmMasterFailed(_))));
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn second_failure_is_returned() {
        let res = with_master_retry(|| Err::<(), _>(busy()), || Ok(()));
        assert!(matches!(res, Err(Error::Access(_))));
    }

    fn access_error(errmsg: &'static str) -> Error {
        Error::Access(AccessError {
            errmsg,
            dev: None,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        })
    }

    #[test]
    fn refused_flip_is_discarded() {
        let waited = Cell::new(false);
        let discarded = Cell::new(false);
        let res = flip_and_wait(
            || Err(access_error("Failed to queue page flip")),
            || {
                waited.set(true);
                Ok(())
            },
            || discarded.set(true),
        );
        assert!(matches!(res, Err(Error::Access(err)) if err.errmsg == "Failed to queue page flip"));
        assert!(discarded.get());
        assert!(!waited.get());
    }

    #[test]
    fn failed_wait_keeps_the_queued_buffer() {
        let discarded = Cell::new(false);
        let res = flip_and_wait(
            || Ok(()),
            || Err(access_error("Error waiting for page flip")),
            || discarded.set(true),
        );
        assert!(matches!(res, Err(Error::Access(err)) if err.errmsg == "Error waiting for page flip"));
        assert!(!discarded.get());

        assert!(flip_and_wait(|| Ok(()), || Ok(()), || discarded.set(true)).is_ok());
        assert!(!discarded.get());
    }

    #[test]
    fn config_requests_renderable_window_surfaces() {
        let attributes = config_attributes(GlProfile::Gles);
        let value_of = |key: ffi::EGLint| {
            attributes
                .chunks(2)
                .find(|pair| pair[0] == key)
                .map(|pair| pair[1])
        };
        assert_eq!(
            value_of(ffi::egl::RENDERABLE_TYPE as ffi::EGLint),
            Some(ffi::egl::OPENGL_ES2_BIT as ffi::EGLint)
        );
        assert_eq!(
            value_of(ffi::egl::SURFACE_TYPE as ffi::EGLint),
            Some(ffi::egl::WINDOW_BIT as ffi::EGLint)
        );
        assert_eq!(value_of(ffi::egl::ALPHA_SIZE as ffi::EGLint), Some(0));
        assert_eq!(
            config_attributes(GlProfile::Gl)[9],
            ffi::egl::OPENGL_BIT as ffi::EGLint
        );
    }
}
