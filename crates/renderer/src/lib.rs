pub mod backend;
pub mod error;
pub mod frame_loop;
pub mod frame_pool;
pub mod swapchain_lifecycle;
pub mod vulkan;

#[cfg(test)]
mod mock;

pub use backend::{FrameRenderer, ImageChain, SlotSync, SurfaceBackend, SurfaceSupport};
pub use error::{RendererError, Result};
pub use frame_loop::{FrameLoop, FrameLoopConfig, FrameStatus};
pub use frame_pool::FrameResourcePool;
pub use swapchain_lifecycle::{
    AcquireOutcome, AcquiredImage, LifecycleState, PresentOutcome, RebuildStatus,
    SwapchainLifecycle, SwapchainPreferences,
};

use std::sync::Arc;

use ash::vk;
use gfx_hal::surface::Surface;
use resource_manager::{Geometry, ResourceManager};
use scene::OrbitCamera;
use shared::PerDrawable;
use tracing::info;

use vulkan::{FrameSlot, LinePipeline, VulkanFrameRenderer, VulkanSurface};

pub type VulkanFrameLoop = FrameLoop<VulkanSurface, VulkanFrameRenderer>;

/// The frame loop wired to a real Vulkan surface.
pub struct Renderer {
    frame_loop: VulkanFrameLoop,
}

impl Renderer {
    /// Creates the swapchain, frame slots, pipeline and per-slot uniforms for
    /// `geometry`, then hands them to a [`FrameLoop`].
    pub fn new(
        resource_manager: Arc<ResourceManager>,
        surface: Arc<Surface>,
        geometry: PerDrawable<Geometry>,
        depth_format: vk::Format,
        extent: vk::Extent2D,
        config: &FrameLoopConfig,
        preferences: SwapchainPreferences,
    ) -> Result<Self> {
        info!(
            "Creating renderer: {}x{}, {} frames in flight",
            extent.width, extent.height, config.frames_in_flight
        );
        let device = resource_manager.device().clone();

        let backend = VulkanSurface::new(resource_manager.clone(), surface, depth_format)?;
        let mut swapchain = SwapchainLifecycle::new(
            backend,
            preferences,
            config.frames_in_flight,
            config.acquire_timeout,
        );
        swapchain.create(extent)?;
        let color_format = swapchain
            .chain()
            .map(ImageChain::format)
            .ok_or_else(|| RendererError::Fatal("swapchain created without images".to_string()))?;

        let slots = (0..config.frames_in_flight)
            .map(|_| FrameSlot::new(&device))
            .collect::<gfx_hal::error::Result<Vec<_>>>()?;
        let pool = FrameResourcePool::new(slots, config.fence_timeout)?;

        let pipeline = LinePipeline::new(
            device,
            color_format,
            depth_format,
            vulkan::GRID_VERT_SPV,
            vulkan::GRID_FRAG_SPV,
        )?;
        let frame_renderer = VulkanFrameRenderer::new(
            resource_manager,
            geometry,
            pipeline,
            config.frames_in_flight,
        )?;

        Ok(Self {
            frame_loop: FrameLoop::new(swapchain, pool, frame_renderer)?,
        })
    }

    /// Schedules a swapchain rebuild for the new window size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.frame_loop.resize(vk::Extent2D { width, height });
    }

    pub fn render_frame(&mut self, camera: &OrbitCamera) -> Result<FrameStatus> {
        self.frame_loop.render_frame(camera)
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.frame_loop.swapchain().extent()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_loop.frames_rendered()
    }

    /// Drains all frames in flight and destroys the swapchain. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.frame_loop.shutdown();
    }
}
