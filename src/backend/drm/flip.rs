//! Blocking wait for KMS page-flip completion

use std::io;

use drm::control::{crtc, Device as ControlDevice, Event};
use rustix::{
    event::{poll, PollFd, PollFlags},
    io::Errno,
};
use tracing::{trace, warn};

use super::error::{AccessError, Error};
use crate::utils::DevPath;

/// Outcome of a single wait on the device fd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Events are ready to be read
    Ready,
    /// The wait returned without events
    Timeout,
    /// The wait was interrupted, try again
    Retry,
    /// The wait failed
    Failed(Errno),
}

impl From<rustix::io::Result<usize>> for PollOutcome {
    fn from(result: rustix::io::Result<usize>) -> Self {
        match result {
            Ok(0) => PollOutcome::Timeout,
            Ok(_) => PollOutcome::Ready,
            Err(Errno::INTR) | Err(Errno::AGAIN) => PollOutcome::Retry,
            Err(err) => PollOutcome::Failed(err),
        }
    }
}

/// Blocks until the kernel reports the flip on `crtc` as completed.
///
/// There is no timeout, the display's refresh paces the caller. Interrupted waits and `EAGAIN`
/// while reading events keep waiting.
#[profiling::function]
pub fn wait_for_page_flip<D>(device: &D, crtc: crtc::Handle) -> Result<(), Error>
where
    D: ControlDevice + DevPath,
{
    loop {
        let mut fds = [PollFd::new(device, PollFlags::IN)];
        match PollOutcome::from(poll(&mut fds, -1)) {
            PollOutcome::Ready => {}
            PollOutcome::Timeout => {
                warn!("select timeout");
                return Ok(());
            }
            PollOutcome::Retry => continue,
            PollOutcome::Failed(err) => {
                return Err(Error::Access(AccessError {
                    errmsg: "Error waiting for page flip",
                    dev: device.dev_path(),
                    source: err.into(),
                }))
            }
        }

        let events = match device.receive_events() {
            Ok(events) => events,
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                continue
            }
            Err(source) => {
                return Err(Error::Access(AccessError {
                    errmsg: "Error reading drm events",
                    dev: device.dev_path(),
                    source,
                }))
            }
        };

        for event in events {
            match event {
                Event::PageFlip(event) if event.crtc == crtc => {
                    trace!(?crtc, frame = event.frame, "Page flip completed");
                    return Ok(());
                }
                Event::PageFlip(event) => trace!(crtc = ?event.crtc, "Page flip on another crtc"),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_results() {
        assert_eq!(PollOutcome::from(Ok(1)), PollOutcome::Ready);
        assert_eq!(PollOutcome::from(Ok(0)), PollOutcome::Timeout);
        assert_eq!(PollOutcome::from(Err(Errno::INTR)), PollOutcome::Retry);
        assert_eq!(PollOutcome::from(Err(Errno::AGAIN)), PollOutcome::Retry);
        assert_eq!(PollOutcome::from(Err(Errno::BADF)), PollOutcome::Failed(Errno::BADF));
    }
}
