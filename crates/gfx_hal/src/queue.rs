use ash::khr::swapchain::Device as SwapchainLoader;
use ash::vk;
use parking_lot::Mutex;

use crate::error::Result;
use crate::sync::Fence;

/// Represents a Vulkan device queue.
///
/// Holds a clone of the `ash::Device` function table and the raw `vk::Queue` handle.
/// The owning [`Device`](crate::device::Device) must outlive every use of the queue.
pub struct Queue {
    device: ash::Device,
    queue: vk::Queue,
    family_index: u32,
    // vkQueueSubmit and vkQueuePresentKHR need external synchronization per queue.
    submit_lock: Mutex<()>,
}

impl Queue {
    /// Creates a new Queue wrapper. Called internally by `Device`.
    pub(crate) fn new(device: ash::Device, queue: vk::Queue, family_index: u32) -> Self {
        Self {
            device,
            queue,
            family_index,
            submit_lock: Mutex::new(()),
        }
    }

    /// Gets the raw `vk::Queue` handle.
    pub fn handle(&self) -> vk::Queue {
        self.queue
    }

    /// Gets the queue family index this queue belongs to.
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Submits command buffers to the queue.
    ///
    /// # Safety
    /// - The command buffers and synchronization primitives within `submits` must be valid
    ///   and owned by the same logical device as this queue.
    /// - The `signal_fence`, if provided, must be unsignaled.
    pub unsafe fn submit(&self, submits: &[vk::SubmitInfo], signal_fence: Option<&Fence>) -> Result<()> {
        if let Some(fence) = signal_fence {
            debug_assert!(
                fence.device().raw().handle() == self.device.handle(),
                "Fence passed to Queue::submit belongs to a different logical device!"
            );
        }
        let fence_handle = signal_fence.map_or(vk::Fence::null(), |f| f.handle());

        let _lock = self.submit_lock.lock();
        tracing::trace!(
            "Submitting {} batch(es) to queue family {}",
            submits.len(),
            self.family_index
        );
        self.device.queue_submit(self.queue, submits, fence_handle)?;
        Ok(())
    }

    /// Queues an image for presentation. Returns `true` if the swapchain is suboptimal.
    ///
    /// # Safety
    /// `present_info` must reference a swapchain created by `loader` and semaphores owned
    /// by this queue's device.
    pub unsafe fn present(
        &self,
        loader: &SwapchainLoader,
        present_info: &vk::PresentInfoKHR,
    ) -> Result<bool> {
        let _lock = self.submit_lock.lock();
        let suboptimal = loader.queue_present(self.queue, present_info)?;
        Ok(suboptimal)
    }
}

// The Device owns the vk::Queue handle, so no Drop impl.
