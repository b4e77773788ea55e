#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
// Allow acronyms like EGL
#![allow(clippy::upper_case_acronyms)]

//! # glhal: a thin presentation-surface layer
//!
//! This crate hides three mutually incompatible ways of getting an OpenGL (ES) context onto a screen
//! behind one small interface:
//!
//! - direct DRM/KMS mode-setting, with buffers allocated through GBM and rendered to through EGL,
//! - an EGL window surface on top of an Xlib window,
//! - a GLX drawable on top of an XCB window.
//!
//! Exactly one of them is active in a process. It is chosen while configuring the [`hal::HalBuilder`],
//! which is then frozen into a [`hal::Hal`]. The [`backend::gfx::Gfx`] facade is created from that
//! context and routes every call to the selected driver.
//!
//! ## Structure of the crate
//!
//! - [`hal`] holds the process-wide configuration (selected graphics and I2C backend, default window).
//! - [`backend`] contains the drivers and the helpers they are built from: DRM device discovery and
//!   connector resolution, the GBM framebuffer manager, EGL and GL loading, and the X11 drivers.
//! - `capi` exposes the facade as C-callable functions, behind the `capi` feature.
//!
//! Which drivers exist is decided at build time through the `backend_drm`, `backend_egl_x11` and
//! `backend_glx` features; the GL flavor through `gles` or `desktop_gl`.
//!
//! ## Render loop
//!
//! Everything is single-threaded and synchronous. A frame is drawn with plain GL calls, then
//! [`Gfx::page_flip`](backend::gfx::Gfx::page_flip) presents it. On the DRM backend this blocks until
//! the kernel reports the flip, which keeps the application from outrunning the display. The windowed
//! backends drain the pending window-system events instead and report a close request through the
//! returned [`FrameStatus`](backend::gfx::FrameStatus).
//!
//! ### Logging
//!
//! glhal makes extensive use of [`tracing`] for its internal logging. See the `monitor` binary in this
//! workspace for a subscriber setup.

pub mod backend;
#[cfg(feature = "capi")]
pub mod capi;
pub mod hal;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
