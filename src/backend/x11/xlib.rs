//! Xlib display connection shared by both X11 drivers

use std::{ffi::CString, ptr::NonNull};

use tracing::{debug, error};
use xlib_sys::xlib;

use super::Error;

/// An open Xlib display, closed on drop
#[derive(Debug)]
pub struct XlibDisplay {
    display: NonNull<xlib::Display>,
    screen: i32,
}

impl XlibDisplay {
    /// Opens the display named `name`, or `$DISPLAY` if `None`.
    pub fn open(name: Option<&str>) -> Result<XlibDisplay, Error> {
        let c_name = name
            .map(CString::new)
            .transpose()
            .map_err(|_| Error::DisplayOpenFailed(name.map(str::to_owned)))?;

        let display = unsafe {
            xlib::XOpenDisplay(c_name.as_ref().map_or(std::ptr::null(), |name| name.as_ptr()))
        };
        let Some(display) = NonNull::new(display) else {
            error!("Failed to open X display");
            return Err(Error::DisplayOpenFailed(name.map(str::to_owned)));
        };
        let screen = unsafe { xlib::XDefaultScreen(display.as_ptr()) };
        debug!(screen, "Opened X display");

        Ok(XlibDisplay { display, screen })
    }

    /// Returns the raw display pointer.
    pub fn as_ptr(&self) -> *mut xlib::Display {
        self.display.as_ptr()
    }

    /// Returns the default screen number.
    pub fn screen(&self) -> i32 {
        self.screen
    }

    /// Returns the root window of the default screen.
    pub fn root(&self) -> xlib::Window {
        unsafe { xlib::XRootWindow(self.as_ptr(), self.screen) }
    }

    /// Interns the atom `name`.
    pub fn intern_atom(&self, name: &str) -> Option<xlib::Atom> {
        let name = CString::new(name).ok()?;
        let atom = unsafe { xlib::XInternAtom(self.as_ptr(), name.as_ptr(), xlib::False) };
        (atom != 0).then_some(atom)
    }
}

impl Drop for XlibDisplay {
    fn drop(&mut self) {
        debug!("Closing X display");
        unsafe {
            xlib::XCloseDisplay(self.display.as_ptr());
        }
    }
}
