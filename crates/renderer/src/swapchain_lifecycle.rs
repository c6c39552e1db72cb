use std::time::Duration;

use ash::vk;
use gfx_hal::{error::GfxHalError, SwapchainConfig};
use tracing::{debug, error, info, trace, warn};

use crate::backend::{ImageChain, SurfaceBackend, SurfaceSupport};
use crate::error::{RendererError, Result};

/// What the application would like the swapchain to look like. Falls back to whatever
/// the surface supports when a preference is unavailable.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainPreferences {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub image_usage: vk::ImageUsageFlags,
}

impl Default for SwapchainPreferences {
    fn default() -> Self {
        Self {
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::FIFO,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Stale,
    Destroyed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    /// The image is usable but the chain should be rebuilt after this frame.
    pub suboptimal: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image(AcquiredImage),
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildStatus {
    Rebuilt,
    /// The surface currently has no area; the chain stays Stale until it does.
    Deferred,
}

pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Result<vk::SurfaceFormatKHR> {
    match formats {
        [] => Err(RendererError::DeviceCapability(
            "surface reports no supported formats".to_string(),
        )),
        // A single UNDEFINED entry means the surface takes any format.
        [only] if only.format == vk::Format::UNDEFINED => Ok(preferred),
        _ => {
            let found = formats.iter().find(|f| {
                f.format == preferred.format && f.color_space == preferred.color_space
            });
            match found {
                Some(format) => Ok(*format),
                None => {
                    warn!(
                        "Preferred surface format {:?} unavailable, using {:?}",
                        preferred, formats[0]
                    );
                    Ok(formats[0])
                }
            }
        }
    }
}

/// FIFO is always available on a conforming implementation, so it is the fallback.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> Result<vk::PresentModeKHR> {
    if modes.contains(&preferred) {
        return Ok(preferred);
    }
    if modes.contains(&vk::PresentModeKHR::FIFO) {
        warn!("Present mode {:?} unavailable, using FIFO", preferred);
        return Ok(vk::PresentModeKHR::FIFO);
    }
    modes.first().copied().ok_or_else(|| {
        RendererError::DeviceCapability("surface reports no present modes".to_string())
    })
}

/// Uses the surface's current extent unless it reports the "pick your own" sentinel,
/// in which case `desired` is used. Either way the result is clamped to the surface's
/// min/max bounds.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, desired: vk::Extent2D) -> vk::Extent2D {
    let wanted = if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        desired
    };
    vk::Extent2D {
        width: wanted
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width.max(caps.min_image_extent.width)),
        height: wanted
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height.max(caps.min_image_extent.height)),
    }
}

/// One more image than the surface minimum, at least one per frame in flight, and
/// never above the surface maximum (0 means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, frames_in_flight: usize) -> Result<u32> {
    let frames = u32::try_from(frames_in_flight).map_err(|_| {
        RendererError::InvalidArgument(format!("{frames_in_flight} frames in flight"))
    })?;
    let desired = (caps.min_image_count + 1).max(frames);
    if caps.max_image_count == 0 {
        return Ok(desired);
    }
    if caps.max_image_count < frames {
        return Err(RendererError::DeviceCapability(format!(
            "surface allows at most {} images, {} frames in flight requested",
            caps.max_image_count, frames
        )));
    }
    Ok(desired.min(caps.max_image_count))
}

fn choose_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|flag| caps.supported_composite_alpha.contains(*flag))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Resolves preferences against what the surface supports.
pub fn select_config(
    support: &SurfaceSupport,
    preferences: &SwapchainPreferences,
    desired_extent: vk::Extent2D,
    frames_in_flight: usize,
) -> Result<SwapchainConfig> {
    let caps = &support.capabilities;
    if !caps.supported_usage_flags.contains(preferences.image_usage) {
        return Err(RendererError::DeviceCapability(format!(
            "surface does not support image usage {:?}",
            preferences.image_usage
        )));
    }
    Ok(SwapchainConfig {
        image_count: choose_image_count(caps, frames_in_flight)?,
        surface_format: choose_surface_format(&support.formats, preferences.surface_format)?,
        present_mode: choose_present_mode(&support.present_modes, preferences.present_mode)?,
        extent: choose_extent(caps, desired_extent),
        image_usage: preferences.image_usage,
        pre_transform: caps.current_transform,
        composite_alpha: choose_composite_alpha(caps),
    })
}

/// Owns the presentable image chain and everything derived from it.
///
/// The chain is only ever replaced whole: a new chain is built completely before the old
/// one is destroyed, so callers see either the old chain or the new one.
pub struct SwapchainLifecycle<B: SurfaceBackend> {
    backend: B,
    preferences: SwapchainPreferences,
    frames_in_flight: usize,
    acquire_timeout: Duration,
    desired_extent: vk::Extent2D,
    chain: Option<B::Chain>,
    state: LifecycleState,
}

impl<B: SurfaceBackend> SwapchainLifecycle<B> {
    pub fn new(
        backend: B,
        preferences: SwapchainPreferences,
        frames_in_flight: usize,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            preferences,
            frames_in_flight,
            acquire_timeout,
            desired_extent: vk::Extent2D::default(),
            chain: None,
            state: LifecycleState::Uninitialized,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn chain(&self) -> Option<&B::Chain> {
        self.chain.as_ref()
    }

    pub fn desired_extent(&self) -> vk::Extent2D {
        self.desired_extent
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.chain.as_ref().map(ImageChain::extent)
    }

    pub fn image_count(&self) -> u32 {
        self.chain.as_ref().map_or(0, ImageChain::image_count)
    }

    pub fn derived_resource_count(&self) -> usize {
        self.chain.as_ref().map_or(0, ImageChain::derived_resource_count)
    }

    /// Builds the first chain. Anything the surface cannot provide is a capability error.
    pub fn create(&mut self, desired_extent: vk::Extent2D) -> Result<()> {
        if self.state != LifecycleState::Uninitialized {
            return Err(RendererError::InvalidArgument(format!(
                "swapchain already created (state {:?})",
                self.state
            )));
        }
        self.desired_extent = desired_extent;

        let support = self.backend.query_support().map_err(|e| {
            RendererError::DeviceCapability(format!("querying surface support: {e}"))
        })?;
        let config = select_config(
            &support,
            &self.preferences,
            desired_extent,
            self.frames_in_flight,
        )?;
        if config.extent.width == 0 || config.extent.height == 0 {
            return Err(RendererError::DeviceCapability(format!(
                "surface has no drawable area ({}x{})",
                config.extent.width, config.extent.height
            )));
        }

        let chain = self.backend.build_chain(&config, None)?;
        if let Err(e) = self.check_image_count(&chain) {
            self.backend.destroy_chain(chain);
            return Err(RendererError::DeviceCapability(e));
        }
        info!(
            "Swapchain created: {} images, {}x{}, {:?}, {:?}",
            chain.image_count(),
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.present_mode
        );
        self.chain = Some(chain);
        self.state = LifecycleState::Ready;
        Ok(())
    }

    fn check_image_count(&self, chain: &B::Chain) -> std::result::Result<(), String> {
        let images = chain.image_count() as usize;
        if images < self.frames_in_flight {
            return Err(format!(
                "swapchain has {images} images, fewer than {} frames in flight",
                self.frames_in_flight
            ));
        }
        if chain.derived_resource_count() != images {
            return Err(format!(
                "swapchain has {images} images but {} derived resources",
                chain.derived_resource_count()
            ));
        }
        Ok(())
    }

    /// Flags the chain for rebuild, optionally recording a new desired extent.
    pub fn mark_stale(&mut self, new_extent: Option<vk::Extent2D>) {
        if let Some(extent) = new_extent {
            self.desired_extent = extent;
        }
        if self.state == LifecycleState::Ready {
            debug!("Swapchain marked stale");
            self.state = LifecycleState::Stale;
        }
    }

    /// Replaces the chain with one built for `new_extent`.
    ///
    /// The caller must have drained all in-flight frames first. Waits for the device to
    /// go idle, builds the replacement against the previous chain, then destroys the
    /// previous chain.
    pub fn rebuild(&mut self, new_extent: vk::Extent2D) -> Result<RebuildStatus> {
        if matches!(
            self.state,
            LifecycleState::Uninitialized | LifecycleState::Destroyed
        ) {
            return Err(RendererError::InvalidArgument(format!(
                "cannot rebuild a swapchain in state {:?}",
                self.state
            )));
        }
        self.desired_extent = new_extent;
        self.state = LifecycleState::Stale;

        self.backend
            .wait_idle()
            .map_err(|e| RendererError::fatal("waiting for idle before rebuild", e))?;
        let support = self
            .backend
            .query_support()
            .map_err(|e| RendererError::fatal("querying surface during rebuild", e))?;
        let config = select_config(
            &support,
            &self.preferences,
            new_extent,
            self.frames_in_flight,
        )?;
        if config.extent.width == 0 || config.extent.height == 0 {
            debug!("Surface has no area, deferring swapchain rebuild");
            return Ok(RebuildStatus::Deferred);
        }

        let built = self.backend.build_chain(&config, self.chain.as_ref());
        // The previous chain is retired by the build attempt whether or not it succeeded.
        if let Some(old) = self.chain.take() {
            self.backend.destroy_chain(old);
        }
        let chain = built.map_err(|e| RendererError::fatal("rebuilding swapchain", e))?;
        if let Err(e) = self.check_image_count(&chain) {
            self.backend.destroy_chain(chain);
            return Err(RendererError::Fatal(e));
        }

        debug!(
            "Swapchain rebuilt: {} images, {}x{}",
            chain.image_count(),
            config.extent.width,
            config.extent.height
        );
        self.chain = Some(chain);
        self.state = LifecycleState::Ready;
        Ok(RebuildStatus::Rebuilt)
    }

    /// Acquires the next image, signaling `signal` once it is ready for rendering.
    ///
    /// An out-of-date chain or an expired timeout yields [`AcquireOutcome::Stale`] and
    /// leaves the lifecycle Stale. A suboptimal image is returned and the lifecycle is
    /// marked Stale for the next frame. Anything else is fatal.
    pub fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        let chain = match (self.state, self.chain.as_ref()) {
            (LifecycleState::Ready, Some(chain)) => chain,
            (LifecycleState::Stale, _) => return Ok(AcquireOutcome::Stale),
            (state, _) => {
                return Err(RendererError::InvalidArgument(format!(
                    "cannot acquire from a swapchain in state {state:?}"
                )))
            }
        };

        match self.backend.acquire_image(chain, self.acquire_timeout, signal) {
            Ok((index, suboptimal)) => {
                trace!("Acquired swapchain image {} (suboptimal: {})", index, suboptimal);
                if suboptimal {
                    self.mark_stale(None);
                }
                Ok(AcquireOutcome::Image(AcquiredImage { index, suboptimal }))
            }
            Err(GfxHalError::OutOfDate) | Err(GfxHalError::Timeout) => {
                warn!("Swapchain image acquisition reported stale");
                self.mark_stale(None);
                Ok(AcquireOutcome::Stale)
            }
            Err(e) => Err(RendererError::fatal("acquiring swapchain image", e)),
        }
    }

    /// Presents `image_index` once `wait` is signaled.
    pub fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome> {
        let chain = self.chain.as_ref().ok_or_else(|| {
            RendererError::InvalidArgument(format!(
                "cannot present from a swapchain in state {:?}",
                self.state
            ))
        })?;

        match self.backend.present_image(chain, image_index, wait) {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(GfxHalError::OutOfDate) => {
                debug!("Presentation reported stale swapchain");
                self.mark_stale(None);
                Ok(PresentOutcome::Stale)
            }
            Err(e) => Err(RendererError::fatal("presenting swapchain image", e)),
        }
    }

    /// Releases the chain. Safe to call any number of times.
    pub fn destroy(&mut self) {
        if self.state == LifecycleState::Destroyed {
            return;
        }
        if let Some(chain) = self.chain.take() {
            if let Err(e) = self.backend.wait_idle() {
                error!("Failed to wait for idle before destroying swapchain: {}", e);
            }
            self.backend.destroy_chain(chain);
            debug!("Swapchain destroyed");
        }
        self.state = LifecycleState::Destroyed;
    }
}

impl<B: SurfaceBackend> Drop for SwapchainLifecycle<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockSurface};

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn lifecycle(rec: &mock::Shared, frames: usize) -> SwapchainLifecycle<MockSurface> {
        SwapchainLifecycle::new(
            MockSurface(rec.clone()),
            SwapchainPreferences::default(),
            frames,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn create_picks_preferences_when_supported() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        swapchain.create(EXTENT).unwrap();

        assert_eq!(swapchain.state(), LifecycleState::Ready);
        assert_eq!(swapchain.extent(), Some(EXTENT));
        let (_, previous, config) = rec.borrow().built[0];
        assert_eq!(previous, None);
        assert_eq!(config.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(config.image_count, 3);
        assert_eq!(swapchain.derived_resource_count(), swapchain.image_count() as usize);
    }

    #[test]
    fn create_without_formats_is_a_capability_error() {
        let rec = mock::recorder();
        rec.borrow_mut().support.formats.clear();
        let mut swapchain = lifecycle(&rec, 2);
        assert!(matches!(
            swapchain.create(EXTENT),
            Err(RendererError::DeviceCapability(_))
        ));
        assert_eq!(swapchain.state(), LifecycleState::Uninitialized);
        assert!(rec.borrow().built.is_empty());
    }

    #[test]
    fn failed_surface_query_is_a_capability_error() {
        let rec = mock::recorder();
        rec.borrow_mut().fail_query = true;
        let mut swapchain = lifecycle(&rec, 2);
        assert!(matches!(
            swapchain.create(EXTENT),
            Err(RendererError::DeviceCapability(_))
        ));
    }

    #[test]
    fn more_frames_than_images_is_rejected() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 5);
        assert!(matches!(
            swapchain.create(EXTENT),
            Err(RendererError::DeviceCapability(_))
        ));

        let rec = mock::recorder();
        rec.borrow_mut().short_images = 2;
        let mut swapchain = lifecycle(&rec, 2);
        assert!(matches!(
            swapchain.create(EXTENT),
            Err(RendererError::DeviceCapability(_))
        ));
        assert_eq!(rec.borrow().destroyed, [1]);
    }

    #[test]
    fn rebuild_at_same_extent_is_idempotent() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        swapchain.create(EXTENT).unwrap();
        let images = swapchain.image_count();
        let derived = swapchain.derived_resource_count();

        for _ in 0..2 {
            assert_eq!(swapchain.rebuild(EXTENT).unwrap(), RebuildStatus::Rebuilt);
            assert_eq!(swapchain.image_count(), images);
            assert_eq!(swapchain.derived_resource_count(), derived);
            assert_eq!(swapchain.extent(), Some(EXTENT));
        }

        let rec = rec.borrow();
        assert_eq!(rec.built.len(), 3);
        // Each build is handed its predecessor, which is destroyed afterwards.
        assert_eq!(rec.built[1].1, Some(1));
        assert_eq!(rec.built[2].1, Some(2));
        assert_eq!(rec.destroyed, [1, 2]);
        assert_eq!(rec.idle_waits, 2);
    }

    #[test]
    fn rebuild_follows_new_extent_within_bounds() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        swapchain.create(EXTENT).unwrap();
        swapchain.mark_stale(Some(vk::Extent2D {
            width: 10_000,
            height: 300,
        }));
        assert_eq!(swapchain.state(), LifecycleState::Stale);

        let desired = swapchain.desired_extent();
        swapchain.rebuild(desired).unwrap();
        assert_eq!(
            swapchain.extent(),
            Some(vk::Extent2D {
                width: 4096,
                height: 300
            })
        );
    }

    #[test]
    fn rebuild_with_no_area_is_deferred() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        swapchain.create(EXTENT).unwrap();
        rec.borrow_mut().support.capabilities.current_extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
        rec.borrow_mut().support.capabilities.min_image_extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
        assert_eq!(swapchain.rebuild(EXTENT).unwrap(), RebuildStatus::Deferred);
        assert_eq!(swapchain.state(), LifecycleState::Stale);
        // The old chain is untouched until a real rebuild happens.
        assert!(rec.borrow().destroyed.is_empty());
    }

    #[test]
    fn rebuild_before_create_is_rejected() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        assert!(matches!(
            swapchain.rebuild(EXTENT),
            Err(RendererError::InvalidArgument(_))
        ));
    }

    #[test]
    fn acquire_maps_out_of_date_and_timeout_to_stale() {
        for failure in [GfxHalError::OutOfDate, GfxHalError::Timeout] {
            let rec = mock::recorder();
            let mut swapchain = lifecycle(&rec, 2);
            swapchain.create(EXTENT).unwrap();
            rec.borrow_mut().acquire_script.push_back(Err(failure));

            let outcome = swapchain.acquire_next_image(vk::Semaphore::null()).unwrap();
            assert_eq!(outcome, AcquireOutcome::Stale);
            assert_eq!(swapchain.state(), LifecycleState::Stale);
        }
    }

    #[test]
    fn acquire_suboptimal_returns_image_and_marks_stale() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        swapchain.create(EXTENT).unwrap();
        rec.borrow_mut().acquire_script.push_back(Ok((1, true)));

        let outcome = swapchain.acquire_next_image(vk::Semaphore::null()).unwrap();
        assert_eq!(
            outcome,
            AcquireOutcome::Image(AcquiredImage {
                index: 1,
                suboptimal: true
            })
        );
        assert_eq!(swapchain.state(), LifecycleState::Stale);
    }

    #[test]
    fn acquire_device_loss_is_fatal() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        swapchain.create(EXTENT).unwrap();
        rec.borrow_mut()
            .acquire_script
            .push_back(Err(GfxHalError::DeviceLost));
        assert!(swapchain
            .acquire_next_image(vk::Semaphore::null())
            .unwrap_err()
            .is_fatal());
    }

    #[test]
    fn present_stale_conditions_mark_stale() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        swapchain.create(EXTENT).unwrap();
        rec.borrow_mut().present_script.push_back(Ok(true));
        assert_eq!(
            swapchain.present(0, vk::Semaphore::null()).unwrap(),
            PresentOutcome::Stale
        );
        assert_eq!(swapchain.state(), LifecycleState::Stale);

        swapchain.rebuild(EXTENT).unwrap();
        rec.borrow_mut()
            .present_script
            .push_back(Err(GfxHalError::OutOfDate));
        assert_eq!(
            swapchain.present(0, vk::Semaphore::null()).unwrap(),
            PresentOutcome::Stale
        );

        swapchain.rebuild(EXTENT).unwrap();
        rec.borrow_mut()
            .present_script
            .push_back(Err(GfxHalError::SurfaceLost));
        assert!(swapchain.present(0, vk::Semaphore::null()).unwrap_err().is_fatal());
    }

    #[test]
    fn destroy_is_idempotent() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        swapchain.create(EXTENT).unwrap();
        swapchain.destroy();
        swapchain.destroy();
        assert_eq!(swapchain.state(), LifecycleState::Destroyed);
        assert_eq!(rec.borrow().destroyed, [1]);

        drop(swapchain);
        assert_eq!(rec.borrow().destroyed, [1]);
        assert!(matches!(
            lifecycle(&rec, 2).acquire_next_image(vk::Semaphore::null()),
            Err(RendererError::InvalidArgument(_))
        ));
    }

    #[test]
    fn drop_releases_the_chain() {
        let rec = mock::recorder();
        let mut swapchain = lifecycle(&rec, 2);
        swapchain.create(EXTENT).unwrap();
        drop(swapchain);
        assert_eq!(rec.borrow().destroyed, [1]);
    }

    #[test]
    fn extent_prefers_surface_current_extent() {
        let caps = mock::surface_support(EXTENT).capabilities;
        let desired = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        assert_eq!(choose_extent(&caps, desired), EXTENT);

        let caps = mock::surface_support(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        })
        .capabilities;
        assert_eq!(choose_extent(&caps, desired), desired);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX).unwrap(),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE).unwrap(),
            vk::PresentModeKHR::FIFO
        );
        assert!(choose_present_mode(&[], vk::PresentModeKHR::FIFO).is_err());
    }

    #[test]
    fn format_falls_back_to_first_reported() {
        let preferred = SwapchainPreferences::default().surface_format;
        let other = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            choose_surface_format(&[other], preferred).unwrap().format,
            vk::Format::R8G8B8A8_UNORM
        );
        let any = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            choose_surface_format(&[any], preferred).unwrap().format,
            preferred.format
        );
    }

    #[test]
    fn image_count_respects_bounds() {
        let mut caps = mock::surface_support(EXTENT).capabilities;
        assert_eq!(choose_image_count(&caps, 2).unwrap(), 3);
        assert_eq!(choose_image_count(&caps, 4).unwrap(), 4);
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps, 6).unwrap(), 6);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps, 2).unwrap(), 2);
    }
}
