use std::time::Duration;

use ash::vk;
use scene::OrbitCamera;
use shared::PerDrawable;
use tracing::{debug, error, trace, warn};

use crate::backend::{FrameRenderer, ImageChain, SlotSync, SurfaceBackend};
use crate::error::{RendererError, Result};
use crate::frame_pool::FrameResourcePool;
use crate::swapchain_lifecycle::{
    AcquireOutcome, AcquiredImage, LifecycleState, PresentOutcome, RebuildStatus,
    SwapchainLifecycle,
};

/// Consecutive stale presents, with no resize in between, that end the loop.
const STALE_PRESENT_LIMIT: u32 = 2;

#[derive(Clone, Copy, Debug)]
pub struct FrameLoopConfig {
    pub frames_in_flight: usize,
    /// Upper bound on waiting for a frame slot's previous submission.
    pub fence_timeout: Duration,
    /// Upper bound on waiting for a presentable image.
    pub acquire_timeout: Duration,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            fence_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Presented, but the swapchain will be rebuilt before the next frame.
    PresentedStale,
    /// Nothing was rendered because the surface has no area.
    Skipped,
}

/// Drives one frame at a time through slot wait, acquire, uniform update, submit and
/// present.
pub struct FrameLoop<B, R>
where
    B: SurfaceBackend,
    R: FrameRenderer<Chain = B::Chain>,
{
    renderer: R,
    swapchain: SwapchainLifecycle<B>,
    pool: FrameResourcePool<R::Slot>,
    frames_rendered: u64,
    stale_presents: u32,
}

impl<B, R> FrameLoop<B, R>
where
    B: SurfaceBackend,
    R: FrameRenderer<Chain = B::Chain>,
{
    /// `swapchain` must already be created.
    pub fn new(
        swapchain: SwapchainLifecycle<B>,
        pool: FrameResourcePool<R::Slot>,
        renderer: R,
    ) -> Result<Self> {
        if swapchain.state() != LifecycleState::Ready {
            return Err(RendererError::InvalidArgument(format!(
                "frame loop needs a ready swapchain, got {:?}",
                swapchain.state()
            )));
        }
        if pool.frames_in_flight() > swapchain.image_count() as usize {
            return Err(RendererError::DeviceCapability(format!(
                "{} frames in flight exceed {} swapchain images",
                pool.frames_in_flight(),
                swapchain.image_count()
            )));
        }
        Ok(Self {
            renderer,
            swapchain,
            pool,
            frames_rendered: 0,
            stale_presents: 0,
        })
    }

    pub fn swapchain(&self) -> &SwapchainLifecycle<B> {
        &self.swapchain
    }

    pub fn pool(&self) -> &FrameResourcePool<R::Slot> {
        &self.pool
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Records a window resize. The swapchain is rebuilt at the start of the next frame.
    pub fn resize(&mut self, extent: vk::Extent2D) {
        debug!("Resize requested: {}x{}", extent.width, extent.height);
        self.stale_presents = 0;
        self.swapchain.mark_stale(Some(extent));
    }

    fn rebuild(&mut self) -> Result<RebuildStatus> {
        self.pool.drain()?;
        let extent = self.swapchain.desired_extent();
        self.swapchain.rebuild(extent)
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let signal = self.pool.slot(slot)?.image_available();
        self.swapchain.acquire_next_image(signal)
    }

    pub fn render_frame(&mut self, camera: &OrbitCamera) -> Result<FrameStatus> {
        let desired = self.swapchain.desired_extent();
        if desired.width == 0 || desired.height == 0 {
            trace!("Surface has no area, skipping frame");
            return Ok(FrameStatus::Skipped);
        }
        if self.swapchain.state() == LifecycleState::Stale
            && self.rebuild()? == RebuildStatus::Deferred
        {
            return Ok(FrameStatus::Skipped);
        }

        let slot = self.pool.acquire_slot();
        self.pool.wait_until_free(slot)?;

        let image = match self.acquire(slot)? {
            AcquireOutcome::Image(image) => image,
            AcquireOutcome::Stale => {
                warn!("Swapchain stale on acquire, rebuilding");
                if self.rebuild()? == RebuildStatus::Deferred {
                    return Ok(FrameStatus::Skipped);
                }
                match self.acquire(slot)? {
                    AcquireOutcome::Image(image) => image,
                    AcquireOutcome::Stale => {
                        return Err(RendererError::Fatal(
                            "swapchain still stale after rebuild".to_string(),
                        ))
                    }
                }
            }
        };

        let outcome = self.submit_and_present(slot, image, camera)?;
        self.pool.advance();
        self.frames_rendered += 1;

        if outcome == PresentOutcome::Stale {
            self.stale_presents += 1;
            if self.stale_presents >= STALE_PRESENT_LIMIT {
                return Err(RendererError::Fatal(format!(
                    "swapchain stale on {} consecutive presents",
                    self.stale_presents
                )));
            }
        } else {
            self.stale_presents = 0;
        }

        Ok(if outcome == PresentOutcome::Stale || image.suboptimal {
            FrameStatus::PresentedStale
        } else {
            FrameStatus::Presented
        })
    }

    fn submit_and_present(
        &mut self,
        slot: usize,
        image: AcquiredImage,
        camera: &OrbitCamera,
    ) -> Result<PresentOutcome> {
        let chain = self.swapchain.chain().ok_or_else(|| {
            RendererError::Fatal("swapchain has no images after acquire".to_string())
        })?;
        let extent = chain.extent();
        let uniforms = PerDrawable::splat(camera.uniform(extent.width, extent.height));
        self.renderer
            .update_uniforms(slot, &uniforms)
            .map_err(|e| RendererError::fatal("writing frame uniforms", e))?;

        let sync = self.pool.slot(slot)?;
        self.renderer
            .submit(slot, sync, chain, image.index)
            .map_err(|e| RendererError::fatal("submitting frame", e))?;

        let wait = sync.render_finished();
        self.swapchain.present(image.index, wait)
    }

    /// Waits for all frames to finish and releases the swapchain. Safe to repeat.
    pub fn shutdown(&mut self) {
        if self.swapchain.state() == LifecycleState::Destroyed {
            return;
        }
        debug!("Shutting down frame loop after {} frames", self.frames_rendered);
        if let Err(e) = self.pool.drain() {
            error!("Failed to drain frames in flight during shutdown: {}", e);
        }
        self.swapchain.destroy();
    }
}

impl<B, R> Drop for FrameLoop<B, R>
where
    B: SurfaceBackend,
    R: FrameRenderer<Chain = B::Chain>,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
