//! Capability interfaces the frame loop drives.
//!
//! The loop, the frame pool and the swapchain lifecycle only see these traits. The
//! Vulkan implementations live in [`crate::vulkan`]; tests substitute in-memory fakes.

use std::time::Duration;

use ash::vk;
use gfx_hal::{error::Result as HalResult, SwapchainConfig};
pub use gfx_hal::SurfaceSupport;
use shared::{PerDrawable, UniformBufferObject};

use crate::error::Result;

/// Synchronization owned by one frame slot.
pub trait SlotSync {
    /// Signaled by image acquisition, waited on by the frame's submission.
    fn image_available(&self) -> vk::Semaphore;

    /// Signaled by the frame's submission, waited on by presentation.
    fn render_finished(&self) -> vk::Semaphore;

    /// Blocks until the slot's previous submission has completed on the GPU.
    fn wait(&self, timeout: Duration) -> HalResult<()>;

    /// Re-arms the completion guard before the slot is submitted again.
    fn reset(&self) -> HalResult<()>;
}

/// A built chain of presentable images and everything sized to it.
pub trait ImageChain {
    fn image_count(&self) -> u32;

    /// Number of per-image resources derived from the chain (one view per image).
    fn derived_resource_count(&self) -> usize;

    fn extent(&self) -> vk::Extent2D;

    fn format(&self) -> vk::Format;
}

/// Creates, tears down and drives image chains for one surface.
pub trait SurfaceBackend {
    type Chain: ImageChain;

    fn query_support(&self) -> HalResult<SurfaceSupport>;

    /// Builds a chain for `config`. `previous`, if any, is still alive and will be
    /// destroyed by the caller afterwards.
    fn build_chain(
        &mut self,
        config: &SwapchainConfig,
        previous: Option<&Self::Chain>,
    ) -> HalResult<Self::Chain>;

    fn destroy_chain(&mut self, chain: Self::Chain);

    /// Returns the acquired image index and whether the chain is suboptimal.
    fn acquire_image(
        &mut self,
        chain: &Self::Chain,
        timeout: Duration,
        signal: vk::Semaphore,
    ) -> HalResult<(u32, bool)>;

    /// Returns whether the chain is suboptimal.
    fn present_image(
        &mut self,
        chain: &Self::Chain,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> HalResult<bool>;

    /// Blocks until no GPU work is outstanding.
    fn wait_idle(&self) -> HalResult<()>;
}

/// Writes per-frame data and submits the recorded draws.
pub trait FrameRenderer {
    type Slot: SlotSync;
    type Chain: ImageChain;

    /// Copies the transforms for every drawable into the slot's uniform memory.
    fn update_uniforms(
        &mut self,
        slot_index: usize,
        uniforms: &PerDrawable<UniformBufferObject>,
    ) -> Result<()>;

    /// Submits the draws for the triangle, grid and axes into `image_index`, waiting on
    /// the slot's `image_available` and signaling its `render_finished` and guard.
    ///
    /// The guard is reset only after recording succeeds, right before the queue
    /// submission, so a failure here never leaves a slot that cannot be waited on.
    fn submit(
        &mut self,
        slot_index: usize,
        slot: &Self::Slot,
        chain: &Self::Chain,
        image_index: u32,
    ) -> Result<()>;
}
