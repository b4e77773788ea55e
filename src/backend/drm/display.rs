//! Connector, mode and CRTC resolution
//!
//! A [`DrmDisplay`] is resolved once at startup: open the first usable device, pick a connector, pick
//! its mode and find a CRTC to drive it. The resource snapshot used for this is dropped right after.
//!
//! The selection rules themselves are plain functions over [`ModeInfo`] and [`ConnectorState`], so they
//! do not need a device.

use drm::control::{
    connector, crtc, Device as ControlDevice, Mode, ModeTypeFlags, ResourceHandles,
};
use tracing::{debug, info, info_span, warn};

use super::{
    device::{find_drm_device, DrmDeviceFd},
    error::{AccessError, Error},
};
use crate::utils::DevPath;

/// Properties of a display mode the selection looks at
pub trait ModeInfo {
    /// Active area in pixels
    fn size(&self) -> (u16, u16);
    /// Whether the sink flagged this mode as preferred
    fn is_preferred(&self) -> bool;
}

impl ModeInfo for Mode {
    fn size(&self) -> (u16, u16) {
        Mode::size(self)
    }

    fn is_preferred(&self) -> bool {
        self.mode_type().contains(ModeTypeFlags::PREFERRED)
    }
}

/// Connection state of a connector
pub trait ConnectorState {
    /// Whether a sink is attached
    fn is_connected(&self) -> bool;
}

impl ConnectorState for connector::Info {
    fn is_connected(&self) -> bool {
        self.state() == connector::State::Connected
    }
}

/// A connector that could not be queried counts as disconnected.
impl<C: ConnectorState> ConnectorState for Option<C> {
    fn is_connected(&self) -> bool {
        self.as_ref().is_some_and(ConnectorState::is_connected)
    }
}

/// Picks the mode to drive a connector with.
///
/// A mode flagged preferred always wins. Otherwise the mode with the strictly largest area is
/// chosen, so among equally large modes the first one is kept.
pub fn choose_mode<M: ModeInfo>(modes: &[M]) -> Option<usize> {
    if let Some(preferred) = modes.iter().position(ModeInfo::is_preferred) {
        return Some(preferred);
    }

    let mut best = None;
    let mut max_area = 0u32;
    for (index, mode) in modes.iter().enumerate() {
        let (w, h) = mode.size();
        let area = w as u32 * h as u32;
        if best.is_none() || area > max_area {
            best = Some(index);
            max_area = area;
        }
    }
    best
}

/// Picks the connector to use.
///
/// A requested index has to exist and be connected, otherwise the first connected connector is used.
pub fn select_connector<C: ConnectorState>(
    connectors: &[C],
    requested: Option<usize>,
) -> Result<usize, Error> {
    match requested {
        Some(index) => match connectors.get(index) {
            Some(connector) if connector.is_connected() => Ok(index),
            Some(_) => {
                warn!("Connector {} is not connected", index);
                Err(Error::InvalidConnector(index))
            }
            None => {
                warn!("Connector {} out of range, {} available", index, connectors.len());
                Err(Error::InvalidConnector(index))
            }
        },
        None => connectors
            .iter()
            .position(ConnectorState::is_connected)
            .ok_or(Error::NoConnectorFound),
    }
}

/// Picks the CRTC for a connector.
///
/// The CRTC already bound through the current encoder wins, otherwise the first CRTC any of the
/// connector's encoders can drive.
pub fn pick_crtc<H, I>(bound: Option<H>, possible: I) -> Option<H>
where
    H: Copy,
    I: IntoIterator<Item = Vec<H>>,
{
    bound.or_else(|| possible.into_iter().find_map(|crtcs| crtcs.first().copied()))
}

/// Position of `crtc` in the device's CRTC list, as used by vblank requests.
pub fn crtc_index<H: PartialEq>(crtcs: &[H], crtc: &H) -> Option<usize> {
    crtcs.iter().position(|c| c == crtc)
}

/// Resolved scanout path of a DRM device
#[derive(Debug)]
pub struct DrmDisplay {
    device: DrmDeviceFd,
    connector: connector::Handle,
    mode: Mode,
    crtc: crtc::Handle,
    crtc_index: usize,
}

impl DrmDisplay {
    /// Finds a device and resolves a connector on it.
    pub fn open(requested_connector: Option<usize>) -> Result<DrmDisplay, Error> {
        let (device, resources) = find_drm_device()?;
        DrmDisplay::resolve(device, &resources, requested_connector)
    }

    /// Resolves connector, mode and CRTC on an already opened device.
    pub fn resolve(
        device: DrmDeviceFd,
        resources: &ResourceHandles,
        requested_connector: Option<usize>,
    ) -> Result<DrmDisplay, Error> {
        let span = info_span!("backend_drm", device = ?device.dev_path());
        let _guard = span.enter();

        let connectors = resources
            .connectors()
            .iter()
            .map(|handle| match device.get_connector(*handle, true) {
                Ok(info) => Some(info),
                Err(err) => {
                    debug!("Skipping connector {:?}: {}", handle, err);
                    None
                }
            })
            .collect::<Vec<_>>();

        let index = select_connector(&connectors, requested_connector)?;
        let connector = connectors[index].as_ref().ok_or(Error::InvalidConnector(index))?;
        let mode = *choose_mode(connector.modes())
            .and_then(|index| connector.modes().get(index))
            .ok_or(Error::NoModeFound)?;

        if connector.current_encoder().is_none() && connector.encoders().is_empty() {
            return Err(Error::NoEncoderFound);
        }
        let bound = match connector.current_encoder() {
            Some(encoder) => device
                .get_encoder(encoder)
                .map_err(|source| AccessError {
                    errmsg: "Error loading encoder info",
                    dev: device.dev_path(),
                    source,
                })?
                .crtc(),
            None => None,
        };
        let possible = connector
            .encoders()
            .iter()
            .filter_map(|encoder| match device.get_encoder(*encoder) {
                Ok(info) => Some(resources.filter_crtcs(info.possible_crtcs())),
                Err(err) => {
                    debug!("Skipping encoder {:?}: {}", encoder, err);
                    None
                }
            });
        let crtc = pick_crtc(bound, possible).ok_or(Error::NoCrtcFound)?;
        let crtc_index = crtc_index(resources.crtcs(), &crtc).ok_or(Error::NoCrtcFound)?;

        let (w, h) = mode.size();
        info!(
            "Using connector {:?}-{} with mode {}x{}@{} on crtc {:?} (index {})",
            connector.interface(),
            connector.interface_id(),
            w,
            h,
            mode.vrefresh(),
            crtc,
            crtc_index,
        );

        Ok(DrmDisplay {
            device,
            connector: connector.handle(),
            mode,
            crtc,
            crtc_index,
        })
    }

    /// Returns the open device.
    pub fn device(&self) -> &DrmDeviceFd {
        &self.device
    }

    /// Returns the selected connector.
    pub fn connector(&self) -> connector::Handle {
        self.connector
    }

    /// Returns the selected mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the CRTC driving the connector.
    pub fn crtc(&self) -> crtc::Handle {
        self.crtc
    }

    /// Returns the index of the CRTC in the device's resource list.
    pub fn crtc_index(&self) -> usize {
        self.crtc_index
    }

    /// Returns the size of the selected mode.
    pub fn size(&self) -> (u32, u32) {
        let (w, h) = self.mode.size();
        (w as u32, h as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestMode {
        size: (u16, u16),
        preferred: bool,
    }

    impl ModeInfo for TestMode {
        fn size(&self) -> (u16, u16) {
            self.size
        }

        fn is_preferred(&self) -> bool {
            self.preferred
        }
    }

    fn mode(w: u16, h: u16) -> TestMode {
        TestMode {
            size: (w, h),
            preferred: false,
        }
    }

    fn preferred(w: u16, h: u16) -> TestMode {
        TestMode {
            size: (w, h),
            preferred: true,
        }
    }

    impl ConnectorState for bool {
        fn is_connected(&self) -> bool {
            *self
        }
    }

    #[test]
    fn preferred_mode_beats_larger_area() {
        let modes = [mode(3840, 2160), preferred(1280, 720), mode(1920, 1080)];
        assert_eq!(choose_mode(&modes), Some(1));
    }

    #[test]
    fn largest_area_without_preferred() {
        let modes = [mode(1280, 720), mode(1920, 1080), mode(1024, 768)];
        assert_eq!(choose_mode(&modes), Some(1));
    }

    #[test]
    fn equal_area_keeps_first() {
        let modes = [mode(800, 600), mode(1920, 1200), mode(1200, 1920), mode(2304, 1000)];
        assert_eq!(choose_mode(&modes), Some(1));
    }

    #[test]
    fn zero_sized_modes_still_pick_one() {
        assert_eq!(choose_mode(&[mode(0, 0), mode(0, 0)]), Some(0));
        assert_eq!(choose_mode::<TestMode>(&[]), None);
    }

    #[test]
    fn first_connected_connector() {
        assert_eq!(select_connector(&[false, true, true], None).unwrap(), 1);
        assert!(matches!(
            select_connector(&[false, false], None),
            Err(Error::NoConnectorFound)
        ));
    }

    #[test]
    fn requested_connector_is_validated() {
        assert_eq!(select_connector(&[true, true], Some(1)).unwrap(), 1);
        assert!(matches!(
            select_connector(&[true, false], Some(1)),
            Err(Error::InvalidConnector(1))
        ));
        assert!(matches!(
            select_connector(&[true], Some(5)),
            Err(Error::InvalidConnector(5))
        ));
    }

    #[test]
    fn unreadable_connectors_are_skipped() {
        let connectors = [None, Some(false), Some(true)];
        assert_eq!(select_connector(&connectors, None).unwrap(), 2);
        assert!(matches!(
            select_connector(&connectors, Some(0)),
            Err(Error::InvalidConnector(0))
        ));
        assert!(matches!(
            select_connector(&[None::<bool>, None], None),
            Err(Error::NoConnectorFound)
        ));
    }

    #[test]
    fn bound_crtc_wins() {
        assert_eq!(pick_crtc(Some(7u32), vec![vec![1, 2]]), Some(7));
    }

    #[test]
    fn first_possible_crtc_of_first_usable_encoder() {
        assert_eq!(pick_crtc(None, vec![vec![], vec![3u32, 4], vec![5]]), Some(3));
        assert_eq!(pick_crtc::<u32, _>(None, vec![vec![]]), None);
    }

    #[test]
    fn crtc_positions() {
        assert_eq!(crtc_index(&[40u32, 41, 42], &42), Some(2));
        assert_eq!(crtc_index(&[40u32], &1), None);
    }
}
