//! GLX rendering into an XCB window
//!
//! GLX needs an Xlib display, the window itself and all events go through the display's XCB
//! connection, which owns the event queue.

use std::{
    ffi::CString,
    os::raw::{c_int, c_void},
    ptr,
    rc::Rc,
};

use tracing::{debug, info, info_span, trace, warn};
use x11rb::{
    atom_manager,
    connection::Connection,
    protocol::{
        xproto::{
            AtomEnum, ColormapAlloc, ConnectionExt as _, CreateWindowAux, EventMask, PropMode, Screen,
            WindowClass,
        },
        Event,
    },
    wrapper::ConnectionExt as _,
    xcb_ffi::XCBConnection,
};
use xlib_sys::{glx, xlib, xlib_xcb};

use super::{xlib::XlibDisplay, Error};
use crate::{
    backend::{
        gfx::{Driver, FrameStatus, GfxError},
        gl::{self, GlContextInfo, GlProfile},
        window::{WindowEvent, WindowGeometry},
    },
    hal::WindowSettings,
};

atom_manager! {
    pub Atoms: AtomsCookie {
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        _NET_WM_NAME,
        UTF8_STRING,
    }
}

const FB_CONFIG_ATTRIBUTES: [c_int; 17] = [
    glx::GLX_X_RENDERABLE,
    1,
    glx::GLX_DRAWABLE_TYPE,
    glx::GLX_WINDOW_BIT,
    glx::GLX_RENDER_TYPE,
    glx::GLX_RGBA_BIT,
    glx::GLX_DOUBLEBUFFER,
    1,
    glx::GLX_RED_SIZE,
    8,
    glx::GLX_GREEN_SIZE,
    8,
    glx::GLX_BLUE_SIZE,
    8,
    glx::GLX_DEPTH_SIZE,
    0,
    0,
];

/// Translates an XCB event using the window's `atoms`.
pub fn translate_event(event: &Event, atoms: &Atoms) -> WindowEvent {
    match event {
        Event::ConfigureNotify(configure) => WindowEvent::Resized {
            width: configure.width.into(),
            height: configure.height.into(),
        },
        Event::ClientMessage(message)
            if message.format == 32
                && message.type_ == atoms.WM_PROTOCOLS
                && message.data.as_data32()[0] == atoms.WM_DELETE_WINDOW =>
        {
            WindowEvent::CloseRequested
        }
        _ => WindowEvent::Other,
    }
}

fn get_proc_address(symbol: &str) -> *const c_void {
    let Ok(name) = CString::new(symbol) else {
        return ptr::null();
    };
    unsafe { glx::glXGetProcAddress(name.as_ptr() as *const _) }.map_or(ptr::null(), |f| f as *const c_void)
}

#[derive(Debug)]
struct GlxContext {
    display: Rc<XlibDisplay>,
    context: glx::GLXContext,
}

impl Drop for GlxContext {
    fn drop(&mut self) {
        unsafe {
            glx::glXMakeContextCurrent(self.display.as_ptr(), 0, 0, ptr::null_mut());
            glx::glXDestroyContext(self.display.as_ptr(), self.context);
        }
    }
}

#[derive(Debug)]
struct GlxWindow {
    display: Rc<XlibDisplay>,
    drawable: glx::GLXWindow,
}

impl Drop for GlxWindow {
    fn drop(&mut self) {
        unsafe { glx::glXDestroyWindow(self.display.as_ptr(), self.drawable) };
    }
}

#[derive(Debug)]
struct XcbWindow {
    connection: Rc<XCBConnection>,
    id: u32,
    colormap: u32,
}

impl XcbWindow {
    fn new(
        connection: Rc<XCBConnection>,
        screen: &Screen,
        visual: u32,
        depth: u8,
        settings: &WindowSettings,
        atoms: &Atoms,
    ) -> Result<XcbWindow, Error> {
        let colormap = connection.generate_id()?;
        connection.create_colormap(ColormapAlloc::NONE, colormap, screen.root, visual)?;

        let id = connection.generate_id()?;
        let aux = CreateWindowAux::new()
            .event_mask(EventMask::EXPOSURE | EventMask::STRUCTURE_NOTIFY)
            // depth may differ from the root window
            .border_pixel(screen.black_pixel)
            .colormap(colormap);
        if let Err(err) = connection.create_window(
            depth,
            id,
            screen.root,
            0,
            0,
            settings.width.min(u16::MAX as u32) as u16,
            settings.height.min(u16::MAX as u32) as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            visual,
            &aux,
        ) {
            let _ = connection.free_colormap(colormap);
            return Err(err.into());
        }
        let window = XcbWindow {
            connection,
            id,
            colormap,
        };

        let connection = &window.connection;
        connection.change_property32(
            PropMode::REPLACE,
            id,
            atoms.WM_PROTOCOLS,
            AtomEnum::ATOM,
            &[atoms.WM_DELETE_WINDOW],
        )?;
        connection.change_property8(
            PropMode::REPLACE,
            id,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            settings.title.as_bytes(),
        )?;
        connection.change_property8(
            PropMode::REPLACE,
            id,
            atoms._NET_WM_NAME,
            atoms.UTF8_STRING,
            settings.title.as_bytes(),
        )?;
        connection.map_window(id)?;
        connection.flush()?;

        Ok(window)
    }
}

impl Drop for XcbWindow {
    fn drop(&mut self) {
        let _ = self.connection.destroy_window(self.id);
        let _ = self.connection.free_colormap(self.colormap);
        let _ = self.connection.flush();
    }
}

/// Driver rendering with GLX into an XCB window
#[derive(Debug)]
pub struct GlxDriver {
    gl: GlContextInfo,
    glx_window: GlxWindow,
    context: GlxContext,
    window: XcbWindow,
    atoms: Atoms,
    geometry: WindowGeometry,
    connection: Rc<XCBConnection>,
    display: Rc<XlibDisplay>,
}

impl GlxDriver {
    /// Opens the default X display, creates the window and makes a GLX context current on it.
    pub fn new(settings: &WindowSettings, profile: GlProfile) -> Result<GlxDriver, Error> {
        let span = info_span!("backend_glx", glhal_module = "backend_glx");
        let _guard = span.enter();

        let display = Rc::new(XlibDisplay::open(None)?);
        let dpy = display.as_ptr();

        let xcb = unsafe { xlib_xcb::XGetXCBConnection(dpy) };
        if xcb.is_null() {
            return Err(Error::NoXcbConnection);
        }
        unsafe { xlib_xcb::XSetEventQueueOwner(dpy, xlib_xcb::XEventQueueOwner::XCBOwnsEventQueue) };
        // the connection stays owned by the Xlib display
        let connection = Rc::new(unsafe { XCBConnection::from_raw_xcb_connection(xcb as *mut c_void, false)? });
        let screen = connection
            .setup()
            .roots
            .get(display.screen() as usize)
            .cloned()
            .ok_or(Error::NoScreen(display.screen() as usize))?;

        let (mut major, mut minor) = (0, 0);
        if unsafe { glx::glXQueryVersion(dpy, &mut major, &mut minor) } == 0 || (major, minor) < (1, 3) {
            return Err(Error::GlxVersion { major, minor });
        }
        debug!("Loaded GLX {}.{}", major, minor);

        let mut count = 0;
        let configs = unsafe {
            glx::glXChooseFBConfig(dpy, display.screen(), FB_CONFIG_ATTRIBUTES.as_ptr(), &mut count)
        };
        if configs.is_null() {
            return Err(Error::NoFbConfig);
        }
        let configs = scopeguard::guard(configs, |configs| unsafe {
            xlib::XFree(configs as *mut c_void);
        });
        if count <= 0 {
            return Err(Error::NoFbConfig);
        }
        let config = unsafe { **configs };

        let visual_info = unsafe { glx::glXGetVisualFromFBConfig(dpy, config) };
        if visual_info.is_null() {
            return Err(Error::NoVisual);
        }
        let (visual, depth) = {
            let visual_info = scopeguard::guard(visual_info, |info| unsafe {
                xlib::XFree(info as *mut c_void);
            });
            unsafe { ((**visual_info).visualid as u32, (**visual_info).depth as u8) }
        };
        debug!(visual, depth, "Using GLX config");

        if profile == GlProfile::Gles {
            debug!("GLX creates a desktop GL context, GLES entry points are loaded from it");
        }
        let context = unsafe { glx::glXCreateNewContext(dpy, config, glx::GLX_RGBA_TYPE, ptr::null_mut(), xlib::True) };
        if context.is_null() {
            return Err(Error::ContextCreationFailed);
        }
        let context = GlxContext {
            display: display.clone(),
            context,
        };

        let atoms = Atoms::new(&*connection)?.reply()?;
        let window = XcbWindow::new(connection.clone(), &screen, visual, depth, settings, &atoms)?;

        let drawable = unsafe { glx::glXCreateWindow(dpy, config, window.id as xlib::Window, ptr::null()) };
        if drawable == 0 {
            return Err(Error::GlxWindowCreationFailed);
        }
        let glx_window = GlxWindow {
            display: display.clone(),
            drawable,
        };
        if unsafe { glx::glXMakeContextCurrent(dpy, drawable, drawable, context.context) } == 0 {
            return Err(Error::MakeCurrentFailed);
        }

        let gl = gl::load_and_clear(get_proc_address)?;
        unsafe { glx::glXSwapBuffers(dpy, drawable) };

        let geometry = match connection.get_geometry(window.id)?.reply() {
            Ok(reply) => WindowGeometry::new(reply.width.into(), reply.height.into()),
            Err(err) => {
                warn!("Failed to query window geometry: {}", err);
                WindowGeometry::new(settings.width, settings.height)
            }
        };

        info!(
            width = geometry.width,
            height = geometry.height,
            version = %gl.version_string,
            "GLX driver initialized"
        );
        Ok(GlxDriver {
            gl,
            glx_window,
            context,
            window,
            atoms,
            geometry,
            connection,
            display,
        })
    }

    /// Processes pending window events and swaps.
    ///
    /// Returns whether the window manager asked to close the window.
    #[profiling::function]
    pub fn present(&mut self) -> Result<bool, Error> {
        let mut close = false;
        while let Some(event) = self.connection.poll_for_event()? {
            close |= self.geometry.apply(translate_event(&event, &self.atoms));
        }
        if close {
            debug!("Window close requested");
        }

        unsafe { glx::glXSwapBuffers(self.display.as_ptr(), self.glx_window.drawable) };
        trace!(width = self.geometry.width, height = self.geometry.height, "Presented");
        Ok(close)
    }

    /// Returns the XCB window id.
    pub fn window(&self) -> u32 {
        self.window.id
    }

    /// Returns whether the driver's context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        unsafe { glx::glXGetCurrentContext() == self.context.context }
    }
}

impl Driver for GlxDriver {
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
        match self.present().map_err(GfxError::Glx)? {
            true => Ok(FrameStatus::CloseRequested),
            false => Ok(FrameStatus::Presented),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x11rb::protocol::xproto::{ClientMessageEvent, ConfigureNotifyEvent, CONFIGURE_NOTIFY_EVENT};

    const ATOMS: Atoms = Atoms {
        WM_PROTOCOLS: 301,
        WM_DELETE_WINDOW: 302,
        _NET_WM_NAME: 303,
        UTF8_STRING: 304,
    };

    fn configure(width: u16, height: u16) -> Event {
        Event::ConfigureNotify(ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: 7,
            window: 7,
            above_sibling: 0,
            x: 0,
            y: 0,
            width,
            height,
            border_width: 0,
            override_redirect: false,
        })
    }

    #[test]
    fn configure_notify_resizes() {
        let mut geometry = WindowGeometry::new(640, 480);
        assert!(!geometry.apply(translate_event(&configure(800, 600), &ATOMS)));
        assert_eq!((geometry.width, geometry.height), (800, 600));
    }

    #[test]
    fn delete_window_requests_close() {
        let close = Event::ClientMessage(ClientMessageEvent::new(
            32,
            7,
            ATOMS.WM_PROTOCOLS,
            [ATOMS.WM_DELETE_WINDOW, 0, 0, 0, 0],
        ));
        assert_eq!(translate_event(&close, &ATOMS), WindowEvent::CloseRequested);

        let other_type = Event::ClientMessage(ClientMessageEvent::new(
            32,
            7,
            ATOMS.UTF8_STRING,
            [ATOMS.WM_DELETE_WINDOW, 0, 0, 0, 0],
        ));
        assert_eq!(translate_event(&other_type, &ATOMS), WindowEvent::Other);
    }

    #[test]
    fn config_attributes_are_terminated() {
        assert_eq!(FB_CONFIG_ATTRIBUTES.len() % 2, 1);
        assert_eq!(FB_CONFIG_ATTRIBUTES[FB_CONFIG_ATTRIBUTES.len() - 1], 0);
    }
}
