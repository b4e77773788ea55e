//! EGL rendering into an Xlib window

use std::{ffi::CString, mem, os::raw::c_uint, ptr, rc::Rc, sync::Arc};

use libc::c_void;
use tracing::{debug, info, info_span, trace, warn};
use xlib_sys::xlib;

use super::{xlib::XlibDisplay, Error};
use crate::{
    backend::{
        egl::{
            self, display::EGLDisplayHandle, ffi, wrap_egl_call, EGLContext, EGLDisplay, EGLError,
            EGLNativeDisplay, EGLNativeSurface, EGLPlatform, EGLSurface,
        },
        gfx::{Driver, FrameStatus, GfxError},
        gl::{self, GlContextInfo, GlProfile},
        window::{WindowEvent, WindowGeometry},
    },
    hal::WindowSettings,
};

impl EGLNativeDisplay for XlibDisplay {
    fn supported_platforms(&self) -> Vec<EGLPlatform<'_>> {
        vec![
            EGLPlatform::new(
                ffi::egl::PLATFORM_X11_KHR,
                self.as_ptr() as *mut c_void,
                &["EGL_KHR_platform_x11"],
            ),
            EGLPlatform::new(
                ffi::egl::PLATFORM_X11_EXT,
                self.as_ptr() as *mut c_void,
                &["EGL_EXT_platform_x11"],
            ),
        ]
    }

    fn legacy_display(&self) -> Option<ffi::NativeDisplayType> {
        Some(self.as_ptr() as ffi::NativeDisplayType)
    }
}

/// Top-level Xlib window with `WM_DELETE_WINDOW` support
#[derive(Debug)]
pub struct XlibWindow {
    display: Rc<XlibDisplay>,
    id: xlib::Window,
    wm_delete_window: xlib::Atom,
}

impl XlibWindow {
    /// Creates and maps a window as described by `settings`.
    pub fn new(display: Rc<XlibDisplay>, settings: &WindowSettings) -> Result<XlibWindow, Error> {
        let dpy = display.as_ptr();

        let mut attributes: xlib::XSetWindowAttributes = unsafe { mem::zeroed() };
        attributes.event_mask = xlib::ExposureMask | xlib::StructureNotifyMask;
        let id = unsafe {
            xlib::XCreateWindow(
                dpy,
                display.root(),
                0,
                0,
                settings.width,
                settings.height,
                0,
                xlib::CopyFromParent,
                xlib::InputOutput as c_uint,
                ptr::null_mut(),
                xlib::CWEventMask,
                &mut attributes,
            )
        };
        if id == 0 {
            return Err(Error::WindowCreationFailed);
        }
        let mut window = XlibWindow {
            display,
            id,
            wm_delete_window: 0,
        };

        if let Ok(title) = CString::new(settings.title.as_str()) {
            unsafe { xlib::XStoreName(dpy, id, title.as_ptr()) };
        }
        match window.display.intern_atom("WM_DELETE_WINDOW") {
            Some(mut atom) => {
                unsafe { xlib::XSetWMProtocols(dpy, id, &mut atom, 1) };
                window.wm_delete_window = atom;
            }
            None => warn!("WM_DELETE_WINDOW is not available, window cannot be closed by the window manager"),
        }
        unsafe {
            xlib::XMapWindow(dpy, id);
            xlib::XFlush(dpy);
        }

        debug!(window = id, width = settings.width, height = settings.height, "Created X window");
        Ok(window)
    }

    /// Returns the window id.
    pub fn id(&self) -> xlib::Window {
        self.id
    }

    /// Drains all pending events without blocking.
    pub fn pending_events(&self) -> Vec<WindowEvent> {
        let dpy = self.display.as_ptr();
        let mut events = Vec::new();
        while unsafe { xlib::XPending(dpy) } > 0 {
            let mut event: xlib::XEvent = unsafe { mem::zeroed() };
            unsafe { xlib::XNextEvent(dpy, &mut event) };
            events.push(translate_event(&event, self.wm_delete_window));
        }
        events
    }
}

impl Drop for XlibWindow {
    fn drop(&mut self) {
        unsafe {
            xlib::XDestroyWindow(self.display.as_ptr(), self.id);
        }
    }
}

unsafe impl EGLNativeSurface for XlibWindow {
    fn create(
        &self,
        display: &Arc<EGLDisplayHandle>,
        config_id: ffi::egl::types::EGLConfig,
    ) -> Result<*const c_void, EGLError> {
        wrap_egl_call(|| unsafe {
            ffi::egl::CreateWindowSurface(
                display.handle,
                config_id,
                self.id as ffi::NativeWindowType,
                ptr::null(),
            )
        })
    }
}

/// Translates an Xlib event for a window whose delete-window atom is `wm_delete_window`.
pub fn translate_event(event: &xlib::XEvent, wm_delete_window: xlib::Atom) -> WindowEvent {
    match event.get_type() {
        xlib::ConfigureNotify => {
            let configure = xlib::XConfigureEvent::from(*event);
            WindowEvent::Resized {
                width: configure.width.max(0) as u32,
                height: configure.height.max(0) as u32,
            }
        }
        xlib::ClientMessage => {
            let message = xlib::XClientMessageEvent::from(*event);
            if wm_delete_window != 0 && message.data.get_long(0) as xlib::Atom == wm_delete_window {
                WindowEvent::CloseRequested
            } else {
                WindowEvent::Other
            }
        }
        _ => WindowEvent::Other,
    }
}

fn config_attributes(profile: GlProfile) -> [ffi::EGLint; 10] {
    let renderable = match profile {
        GlProfile::Gles => ffi::egl::OPENGL_ES2_BIT as ffi::EGLint,
        GlProfile::Gl => ffi::egl::OPENGL_BIT as ffi::EGLint,
    };
    [
        ffi::egl::RENDERABLE_TYPE as ffi::EGLint,
        renderable,
        ffi::egl::SURFACE_TYPE as ffi::EGLint,
        ffi::egl::WINDOW_BIT as ffi::EGLint,
        ffi::egl::RED_SIZE as ffi::EGLint,
        8,
        ffi::egl::GREEN_SIZE as ffi::EGLint,
        8,
        ffi::egl::BLUE_SIZE as ffi::EGLint,
        8,
    ]
}

/// Driver rendering with EGL into an Xlib window
#[derive(Debug)]
pub struct EglX11Driver {
    gl: GlContextInfo,
    surface: EGLSurface,
    context: EGLContext,
    egl: EGLDisplay,
    window: XlibWindow,
    geometry: WindowGeometry,
}

impl EglX11Driver {
    /// Opens the default X display, creates the window and makes an EGL context current on it.
    pub fn new(settings: &WindowSettings, profile: GlProfile) -> Result<EglX11Driver, Error> {
        let span = info_span!("backend_x11", glhal_module = "backend_x11");
        let _guard = span.enter();

        let display = Rc::new(XlibDisplay::open(None)?);
        let window = XlibWindow::new(display.clone(), settings)?;

        let egl = EGLDisplay::new(&*display)?;
        egl.bind_api(profile)?;
        let config = egl
            .choose_config(&config_attributes(profile))?
            .first()
            .copied()
            .ok_or(egl::Error::NoAvailablePixelFormat)?;

        let surface = EGLSurface::new(&egl, config, &window)?;
        let context = EGLContext::new(&egl, config, profile)?;
        context.make_current_with_surface(&surface)?;

        let gl = gl::load_and_clear(|symbol| unsafe { egl::get_proc_address(symbol) })?;
        surface.swap_buffers()?;

        info!(
            width = settings.width,
            height = settings.height,
            version = %gl.version_string,
            "EGL-X11 driver initialized"
        );
        Ok(EglX11Driver {
            gl,
            surface,
            context,
            egl,
            window,
            geometry: WindowGeometry::new(settings.width, settings.height),
        })
    }

    /// Swaps and processes pending window events.
    ///
    /// Returns whether the window manager asked to close the window.
    #[profiling::function]
    pub fn present(&mut self) -> Result<bool, Error> {
        self.surface.swap_buffers()?;
        let close = self.geometry.apply_all(self.window.pending_events());
        if close {
            debug!("Window close requested");
        }
        trace!(width = self.geometry.width, height = self.geometry.height, "Presented");
        Ok(close)
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

impl Driver for EglX11Driver {
    fn width(&self) -> u32 {
        self.geometry.width
    }

    fn height(&self) -> u32 {
        self.geometry.height
    }

    fn version_string(&self) -> &str {
        &self.gl.version_string
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.gl.clear(color);
    }

    fn page_flip(&mut self) -> Result<FrameStatus, GfxError> {
        match self.present().map_err(GfxError::EglX11)? {
            true => Ok(FrameStatus::CloseRequested),
            false => Ok(FrameStatus::Presented),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WM_DELETE_WINDOW: xlib::Atom = 317;

    fn configure(width: i32, height: i32) -> xlib::XEvent {
        let mut configure: xlib::XConfigureEvent = unsafe { mem::zeroed() };
        configure.type_ = xlib::ConfigureNotify;
        configure.width = width;
        configure.height = height;
        xlib::XEvent::from(configure)
    }

    fn client_message(atom: xlib::Atom) -> xlib::XEvent {
        let mut message: xlib::XClientMessageEvent = unsafe { mem::zeroed() };
        message.type_ = xlib::ClientMessage;
        message.format = 32;
        message.data.set_long(0, atom as _);
        xlib::XEvent::from(message)
    }

    #[test]
    fn configure_notify_resizes() {
        let mut geometry = WindowGeometry::new(1280, 720);
        let event = translate_event(&configure(800, 600), WM_DELETE_WINDOW);
        assert_eq!(
            event,
            WindowEvent::Resized {
                width: 800,
                height: 600
            }
        );
        assert!(!geometry.apply(event));
        assert_eq!((geometry.width, geometry.height), (800, 600));
    }

    #[test]
    fn delete_window_requests_close() {
        assert_eq!(
            translate_event(&client_message(WM_DELETE_WINDOW), WM_DELETE_WINDOW),
            WindowEvent::CloseRequested
        );
        assert_eq!(
            translate_event(&client_message(WM_DELETE_WINDOW + 1), WM_DELETE_WINDOW),
            WindowEvent::Other
        );
        assert_eq!(
            translate_event(&client_message(0), 0),
            WindowEvent::Other
        );
    }

    #[test]
    fn other_events_are_ignored() {
        let mut expose: xlib::XExposeEvent = unsafe { mem::zeroed() };
        expose.type_ = xlib::Expose;
        assert_eq!(translate_event(&xlib::XEvent::from(expose), WM_DELETE_WINDOW), WindowEvent::Other);
    }

    #[test]
    fn config_matches_profile() {
        assert_eq!(config_attributes(GlProfile::Gles)[1], ffi::egl::OPENGL_ES2_BIT as ffi::EGLint);
        assert_eq!(config_attributes(GlProfile::Gl)[1], ffi::egl::OPENGL_BIT as ffi::EGLint);
        assert_eq!(config_attributes(GlProfile::Gles)[5], 8);
    }
}
