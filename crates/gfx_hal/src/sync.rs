use std::{sync::Arc, time::Duration};

use ash::vk;

use crate::{device::Device, error::Result};

/// CPU-side completion guard for a queue submission. Destroyed on drop.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// `signaled` fences pass their first wait without any submission.
    pub fn new(device: Arc<Device>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            device
                .raw()
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };
        tracing::trace!("Created fence {:?} (signaled: {})", fence, signaled);
        Ok(Self { device, fence })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Blocks until the fence is signaled. `None` waits forever.
    ///
    /// An expired wait surfaces as [`GfxHalError::Timeout`](crate::error::GfxHalError::Timeout).
    pub fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let result = unsafe {
            self.device
                .raw()
                .wait_for_fences(&[self.fence], true, timeout_nanos(timeout))
        };
        result.map_err(|e| {
            if e == vk::Result::TIMEOUT {
                tracing::warn!("Fence {:?} still unsignaled after {:?}", self.fence, timeout);
            }
            e.into()
        })
    }

    /// The fence must not be part of a pending submission.
    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.raw().reset_fences(&[self.fence])? };
        Ok(())
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_fence(self.fence, None);
        }
    }
}

/// Binary semaphore ordering work on the GPU. Destroyed on drop.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> Result<Self> {
        let semaphore = unsafe {
            device
                .raw()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        Ok(Self { device, semaphore })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_semaphore(self.semaphore, None);
        }
    }
}

fn timeout_nanos(timeout: Option<Duration>) -> u64 {
    timeout.map_or(u64::MAX, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_saturate_to_infinite() {
        assert_eq!(timeout_nanos(None), u64::MAX);
        assert_eq!(timeout_nanos(Some(Duration::from_millis(5))), 5_000_000);
        assert_eq!(timeout_nanos(Some(Duration::MAX)), u64::MAX);
    }
}
