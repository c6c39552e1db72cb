use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use gfx_hal::{device::Device, error::Result, sync::Fence, sync::Semaphore};

use crate::backend::SlotSync;

/// Synchronization objects of one frame in flight.
pub struct FrameSlot {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSlot {
    /// The fence starts signaled so the first wait on a fresh slot returns immediately.
    pub fn new(device: &Arc<Device>) -> Result<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
        })
    }

    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

impl SlotSync for FrameSlot {
    fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    fn wait(&self, timeout: Duration) -> Result<()> {
        self.in_flight.wait(Some(timeout))
    }

    fn reset(&self) -> Result<()> {
        self.in_flight.reset()
    }
}
