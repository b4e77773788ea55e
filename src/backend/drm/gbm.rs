//! GBM buffer management for scanout
//!
//! Rendering goes into the buffers of a [`gbm::Surface`]. After every swap the new front buffer is
//! locked, registered with KMS as a framebuffer and queued for display. The buffer it replaces stays
//! locked until the kernel confirmed the flip, so at most one buffer is waiting for release at a time.

use std::os::unix::io::AsFd;

use drm::{
    buffer::{Handle as BufferHandle, PlanarBuffer},
    control::{framebuffer, Device as ControlDevice, FbCmd2Flags},
};
use drm_fourcc::{DrmFourcc, DrmModifier};
use gbm::{BufferObject, BufferObjectFlags, DeviceDestroyedError};
use tracing::{debug, error, trace, warn};

use super::{
    device::DrmDeviceFd,
    error::{AccessError, Error},
};
use crate::utils::DevPath;

/// Pixel format of the scanout buffers
pub const SCANOUT_FORMAT: DrmFourcc = DrmFourcc::Xrgb8888;

/// A framebuffer registered with KMS, removed again on drop
#[derive(Debug)]
pub struct GbmFramebuffer {
    fb: framebuffer::Handle,
    drm: DrmDeviceFd,
}

impl Drop for GbmFramebuffer {
    fn drop(&mut self) {
        trace!(fb = ?self.fb, "destroying framebuffer");
        if let Err(err) = self.drm.destroy_framebuffer(self.fb) {
            warn!(fb = ?self.fb, ?err, "failed to destroy framebuffer");
        }
    }
}

impl AsRef<framebuffer::Handle> for GbmFramebuffer {
    fn as_ref(&self) -> &framebuffer::Handle {
        &self.fb
    }
}

/// Per-buffer storage for the framebuffer registered for it
pub trait FramebufferCache<T> {
    /// Error of the underlying storage
    type Error;

    /// Returns the stored value.
    fn cached(&self) -> Result<Option<&T>, Self::Error>;
    /// Stores `value`, dropping it if the storage is gone.
    fn cache(&mut self, value: T) -> Result<(), Self::Error>;
    /// Removes the stored value.
    fn evict(&mut self) -> Result<Option<T>, Self::Error>;
}

impl<T: 'static> FramebufferCache<T> for BufferObject<T> {
    type Error = DeviceDestroyedError;

    fn cached(&self) -> Result<Option<&T>, DeviceDestroyedError> {
        self.userdata()
    }

    fn cache(&mut self, value: T) -> Result<(), DeviceDestroyedError> {
        self.set_userdata(value).map(drop)
    }

    fn evict(&mut self) -> Result<Option<T>, DeviceDestroyedError> {
        self.take_userdata()
    }
}

/// Returns the framebuffer of `bo`, registering it through `register` on first use.
///
/// The registration is stored on the buffer, so each buffer is added to KMS at most once. If it
/// cannot be stored the registration is dropped again and the error returned.
pub fn framebuffer_id<B, T, E, F>(bo: &mut B, register: F) -> Result<framebuffer::Handle, E>
where
    B: FramebufferCache<T>,
    T: AsRef<framebuffer::Handle>,
    E: From<B::Error>,
    F: FnOnce(&B) -> Result<T, E>,
{
    if let Some(fb) = bo.cached()? {
        return Ok(*fb.as_ref());
    }
    let fb = register(bo)?;
    let handle = *fb.as_ref();
    bo.cache(fb)?;
    Ok(handle)
}

/// Modifier to pass to `drmModeAddFB2WithModifiers`.
///
/// `INVALID` and `LINEAR` describe implicit layouts and are added without the modifiers flag.
pub fn explicit_modifier(modifier: Option<DrmModifier>) -> Option<DrmModifier> {
    match modifier {
        None | Some(DrmModifier::Invalid) | Some(DrmModifier::Linear) => None,
        x => x,
    }
}

/// Layout handed to KMS, either all planes with an explicit modifier or the first plane only
struct FramebufferLayout<'a, B> {
    buffer: &'a B,
    modifier: Option<DrmModifier>,
    single_plane: bool,
}

impl<'a, B: PlanarBuffer> PlanarBuffer for FramebufferLayout<'a, B> {
    fn size(&self) -> (u32, u32) {
        self.buffer.size()
    }

    fn format(&self) -> DrmFourcc {
        self.buffer.format()
    }

    fn modifier(&self) -> Option<DrmModifier> {
        self.modifier
    }

    fn pitches(&self) -> [u32; 4] {
        let pitches = self.buffer.pitches();
        if self.single_plane {
            [pitches[0], 0, 0, 0]
        } else {
            pitches
        }
    }

    fn handles(&self) -> [Option<BufferHandle>; 4] {
        let handles = self.buffer.handles();
        if self.single_plane {
            [handles[0], None, None, None]
        } else {
            handles
        }
    }

    fn offsets(&self) -> [u32; 4] {
        if self.single_plane {
            [0; 4]
        } else {
            self.buffer.offsets()
        }
    }
}

/// Registers `buffer` as a KMS framebuffer.
///
/// Buffers with an explicit modifier are added with all planes and the modifier. If that fails, or
/// there is no modifier, the first plane is added on its own.
#[profiling::function]
pub fn add_framebuffer<D, B>(drm: &D, buffer: &B) -> Result<framebuffer::Handle, AccessError>
where
    D: ControlDevice + DevPath,
    B: PlanarBuffer,
{
    let modifier = explicit_modifier(buffer.modifier());
    if let Some(modifier) = modifier {
        debug!(?modifier, "drmModeAddFB2WithModifiers");
        let layout = FramebufferLayout {
            buffer,
            modifier: Some(modifier),
            single_plane: false,
        };
        match drm.add_planar_framebuffer(&layout, FbCmd2Flags::MODIFIERS) {
            Ok(fb) => return Ok(fb),
            Err(err) => debug!("drmModeAddFB2WithModifiers failed: {}", err),
        }
    }

    let layout = FramebufferLayout {
        buffer,
        modifier: None,
        single_plane: true,
    };
    drm.add_planar_framebuffer(&layout, FbCmd2Flags::empty())
        .map_err(|source| {
            let (width, height) = buffer.size();
            error!(
                width,
                height,
                format = ?buffer.format(),
                "Fallback failed: drmModeAddFB2: {}",
                source
            );
            AccessError {
                errmsg: "Failed to add framebuffer",
                dev: drm.dev_path(),
                source,
            }
        })
}

/// Registers a locked buffer object.
pub fn framebuffer_from_bo<T>(drm: &DrmDeviceFd, bo: &BufferObject<T>) -> Result<GbmFramebuffer, AccessError> {
    let fb = add_framebuffer(drm, bo)?;
    Ok(GbmFramebuffer { fb, drm: drm.clone() })
}

/// Two-slot record of the buffer on screen and the one it replaced
#[derive(Debug)]
pub struct FlipChain<B> {
    current: Option<B>,
    pending_release: Option<B>,
}

impl<B> Default for FlipChain<B> {
    fn default() -> Self {
        FlipChain {
            current: None,
            pending_release: None,
        }
    }
}

impl<B> FlipChain<B> {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `next` the current buffer, moving the old current one to the release slot.
    ///
    /// Fails and hands `next` back if the previous buffer was not released yet.
    pub fn queue(&mut self, next: B) -> Result<(), B> {
        if self.pending_release.is_some() {
            return Err(next);
        }
        self.pending_release = self.current.replace(next);
        Ok(())
    }

    /// Takes the buffer waiting for release.
    ///
    /// Before the first flip there is none and this does nothing.
    pub fn release(&mut self) -> Option<B> {
        self.pending_release.take()
    }

    /// Undoes the last [`queue`](FlipChain::queue) after a failed flip request.
    ///
    /// The previous buffer becomes current again and the rejected one is returned.
    pub fn abort(&mut self) -> Option<B> {
        let rejected = self.current.take();
        self.current = self.pending_release.take();
        rejected
    }

    /// Returns whether a buffer waits for release.
    pub fn has_pending(&self) -> bool {
        self.pending_release.is_some()
    }

    /// Returns the current buffer.
    pub fn current(&self) -> Option<&B> {
        self.current.as_ref()
    }
}

/// GBM device, scanout surface and the buffers locked from it
#[derive(Debug)]
pub struct GbmFramebufferManager {
    chain: FlipChain<BufferObject<GbmFramebuffer>>,
    surface: gbm::Surface<GbmFramebuffer>,
    device: gbm::Device<DrmDeviceFd>,
    drm: DrmDeviceFd,
    size: (u32, u32),
}

impl GbmFramebufferManager {
    /// Creates a GBM device on `drm` and a `width`x`height` scanout surface with a linear layout.
    pub fn new(drm: &DrmDeviceFd, width: u32, height: u32) -> Result<Self, Error> {
        let device = gbm::Device::new(drm.clone()).map_err(|source| Error::Gbm {
            errmsg: "Failed to create gbm device",
            source,
        })?;
        let surface = create_scanout_surface(&device, width, height)?;
        debug!(width, height, format = ?SCANOUT_FORMAT, "Created gbm surface");

        Ok(GbmFramebufferManager {
            chain: FlipChain::new(),
            surface,
            device,
            drm: drm.clone(),
            size: (width, height),
        })
    }

    /// Returns the GBM device.
    pub fn device(&self) -> &gbm::Device<DrmDeviceFd> {
        &self.device
    }

    /// Returns the scanout surface.
    pub fn surface(&self) -> &gbm::Surface<GbmFramebuffer> {
        &self.surface
    }

    /// Returns the size of the surface.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Locks the front buffer after a swap and queues it for display.
    ///
    /// Returns the framebuffer to flip to.
    pub fn lock_next(&mut self) -> Result<framebuffer::Handle, Error> {
        if self.chain.has_pending() {
            return Err(Error::FlipAlreadyPending);
        }

        // SAFETY: only called once per eglSwapBuffers by the driver
        let mut bo = unsafe { self.surface.lock_front_buffer() }.map_err(|_| Error::FrontBufferLockFailed)?;
        let drm = &self.drm;
        let fb = framebuffer_id(&mut bo, |bo| framebuffer_from_bo(drm, bo).map_err(Error::from))?;
        trace!(?fb, "Locked front buffer");

        self.chain.queue(bo).map_err(|_| Error::FlipAlreadyPending)?;
        Ok(fb)
    }

    /// Releases the buffer the last confirmed flip replaced.
    ///
    /// Returns whether there was one.
    pub fn release(&mut self) -> bool {
        self.chain.release().is_some()
    }

    /// Drops the buffer of a flip the kernel refused.
    ///
    /// Its framebuffer is removed from KMS before the buffer goes back to the surface.
    pub fn discard_current(&mut self) -> Result<(), Error> {
        if let Some(mut bo) = self.chain.abort() {
            drop(bo.evict()?);
        }
        Ok(())
    }
}

fn create_scanout_surface<A: AsFd>(
    device: &gbm::Device<A>,
    width: u32,
    height: u32,
) -> Result<gbm::Surface<GbmFramebuffer>, Error> {
    let flags = BufferObjectFlags::SCANOUT | BufferObjectFlags::RENDERING;
    let modifiers = [DrmModifier::Linear];

    #[cfg(feature = "backend_gbm_has_create_with_modifiers2")]
    let result = device.create_surface_with_modifiers2(
        width,
        height,
        SCANOUT_FORMAT,
        modifiers.iter().copied(),
        flags,
    );

    #[cfg(not(feature = "backend_gbm_has_create_with_modifiers2"))]
    let result = device.create_surface_with_modifiers(width, height, SCANOUT_FORMAT, modifiers.iter().copied());

    result
        .or_else(|err| {
            debug!("Failed to create gbm surface with modifiers, falling back: {}", err);
            device.create_surface(width, height, SCANOUT_FORMAT, flags)
        })
        .map_err(|source| Error::Gbm {
            errmsg: "Failed to create gbm surface",
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct FakeFb(framebuffer::Handle);

    impl AsRef<framebuffer::Handle> for FakeFb {
        fn as_ref(&self) -> &framebuffer::Handle {
            &self.0
        }
    }

    const DESTROYED: &str = "device destroyed";

    #[derive(Default)]
    struct FakeBo {
        fb: Option<FakeFb>,
        lost_reads: bool,
        lost_writes: bool,
    }

    impl FramebufferCache<FakeFb> for FakeBo {
        type Error = &'static str;

        fn cached(&self) -> Result<Option<&FakeFb>, &'static str> {
            if self.lost_reads {
                return Err(DESTROYED);
            }
            Ok(self.fb.as_ref())
        }

        fn cache(&mut self, value: FakeFb) -> Result<(), &'static str> {
            if self.lost_writes {
                return Err(DESTROYED);
            }
            self.fb = Some(value);
            Ok(())
        }

        fn evict(&mut self) -> Result<Option<FakeFb>, &'static str> {
            Ok(self.fb.take())
        }
    }

    struct FakePlanes;

    impl PlanarBuffer for FakePlanes {
        fn size(&self) -> (u32, u32) {
            (64, 32)
        }

        fn format(&self) -> DrmFourcc {
            DrmFourcc::Xrgb8888
        }

        fn modifier(&self) -> Option<DrmModifier> {
            Some(DrmModifier::I915_y_tiled)
        }

        fn pitches(&self) -> [u32; 4] {
            [256, 128, 0, 0]
        }

        fn handles(&self) -> [Option<BufferHandle>; 4] {
            [drm::control::from_u32(7), drm::control::from_u32(8), None, None]
        }

        fn offsets(&self) -> [u32; 4] {
            [64, 8192, 0, 0]
        }
    }

    fn handle(raw: u32) -> framebuffer::Handle {
        drm::control::from_u32(raw).unwrap()
    }

    #[test]
    fn framebuffer_is_registered_once_per_buffer() {
        let calls = Cell::new(0);
        let register = |_: &FakeBo| {
            calls.set(calls.get() + 1);
            Ok::<_, &'static str>(FakeFb(handle(40 + calls.get())))
        };

        let mut bo = FakeBo::default();
        let first = framebuffer_id(&mut bo, register).unwrap();
        let second = framebuffer_id(&mut bo, register).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);

        let mut other = FakeBo::default();
        assert_ne!(framebuffer_id(&mut other, register).unwrap(), first);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn failed_registration_is_not_cached() {
        let mut bo = FakeBo::default();
        assert_eq!(framebuffer_id(&mut bo, |_| Err::<FakeFb, _>("busy")), Err("busy"));
        assert!(bo.cached().unwrap().is_none());
        assert_eq!(
            framebuffer_id(&mut bo, |_| Ok::<_, &'static str>(FakeFb(handle(3)))).unwrap(),
            handle(3)
        );
    }

    #[test]
    fn lost_store_is_an_error() {
        let calls = Cell::new(0);
        let register = |_: &FakeBo| {
            calls.set(calls.get() + 1);
            Ok::<_, &'static str>(FakeFb(handle(9)))
        };

        let mut bo = FakeBo {
            lost_writes: true,
            ..FakeBo::default()
        };
        assert_eq!(framebuffer_id(&mut bo, register), Err(DESTROYED));
        assert!(bo.fb.is_none());
        assert_eq!(framebuffer_id(&mut bo, register), Err(DESTROYED));
        assert_eq!(calls.get(), 2);

        let mut bo = FakeBo {
            lost_reads: true,
            ..FakeBo::default()
        };
        assert_eq!(framebuffer_id(&mut bo, register), Err(DESTROYED));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn layout_keeps_all_planes_with_modifier() {
        let layout = FramebufferLayout {
            buffer: &FakePlanes,
            modifier: Some(DrmModifier::I915_y_tiled),
            single_plane: false,
        };
        assert_eq!(layout.size(), (64, 32));
        assert_eq!(layout.format(), DrmFourcc::Xrgb8888);
        assert_eq!(layout.modifier(), Some(DrmModifier::I915_y_tiled));
        assert_eq!(layout.pitches(), [256, 128, 0, 0]);
        assert_eq!(layout.handles(), FakePlanes.handles());
        assert_eq!(layout.offsets(), [64, 8192, 0, 0]);
    }

    #[test]
    fn single_plane_fallback_drops_the_rest() {
        let layout = FramebufferLayout {
            buffer: &FakePlanes,
            modifier: None,
            single_plane: true,
        };
        assert_eq!(layout.size(), (64, 32));
        assert_eq!(layout.modifier(), None);
        assert_eq!(layout.pitches(), [256, 0, 0, 0]);
        assert_eq!(
            layout.handles(),
            [drm::control::from_u32::<BufferHandle>(7), None, None, None]
        );
        assert_eq!(layout.offsets(), [0; 4]);
    }

    #[test]
    fn implicit_modifiers_are_dropped() {
        assert_eq!(explicit_modifier(None), None);
        assert_eq!(explicit_modifier(Some(DrmModifier::Invalid)), None);
        assert_eq!(explicit_modifier(Some(DrmModifier::Linear)), None);
        assert_eq!(
            explicit_modifier(Some(DrmModifier::I915_x_tiled)),
            Some(DrmModifier::I915_x_tiled)
        );
    }

    #[test]
    fn release_before_first_flip_is_a_noop() {
        let mut chain = FlipChain::<u32>::new();
        assert_eq!(chain.release(), None);
        assert!(!chain.has_pending());
    }

    #[test]
    fn one_buffer_pending_at_a_time() {
        let mut chain = FlipChain::new();
        chain.queue(1).unwrap();
        assert!(!chain.has_pending());
        assert_eq!(chain.release(), None);

        chain.queue(2).unwrap();
        assert!(chain.has_pending());
        assert_eq!(chain.queue(3), Err(3));
        assert_eq!(chain.current(), Some(&2));

        assert_eq!(chain.release(), Some(1));
        assert_eq!(chain.release(), None);
        chain.queue(3).unwrap();
        assert_eq!(chain.release(), Some(2));
    }

    #[test]
    fn abort_restores_previous_buffer() {
        let mut chain = FlipChain::new();
        chain.queue(1).unwrap();
        chain.queue(2).unwrap();
        assert_eq!(chain.abort(), Some(2));
        assert_eq!(chain.current(), Some(&1));
        assert!(!chain.has_pending());
        chain.queue(3).unwrap();
        assert_eq!(chain.release(), Some(1));
    }
}
