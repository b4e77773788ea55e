//! Window-system events of the windowed drivers
//!
//! The X11 drivers translate what their connection reports into [`WindowEvent`]s and fold them into
//! a [`WindowGeometry`]. A close request is handed back to the caller of `page_flip` as
//! [`FrameStatus::CloseRequested`](super::gfx::FrameStatus::CloseRequested).

/// Window event relevant to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// The window got a new size
    Resized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
    /// The window manager asked the window to close
    CloseRequested,
    /// Anything else
    Other,
}

/// Last known size of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl WindowGeometry {
    /// Geometry of a freshly created window.
    pub fn new(width: u32, height: u32) -> WindowGeometry {
        WindowGeometry { width, height }
    }

    /// Applies `event`, returns whether it asked for the window to close.
    pub fn apply(&mut self, event: WindowEvent) -> bool {
        match event {
            WindowEvent::Resized { width, height } => {
                self.width = width;
                self.height = height;
                false
            }
            WindowEvent::CloseRequested => true,
            WindowEvent::Other => false,
        }
    }

    /// Applies all `events`, returns whether any asked for the window to close.
    ///
    /// Events after a close request are still applied.
    pub fn apply_all<I: IntoIterator<Item = WindowEvent>>(&mut self, events: I) -> bool {
        events
            .into_iter()
            .fold(false, |close, event| self.apply(event) || close)
    }
}
