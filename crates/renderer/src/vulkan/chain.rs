use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use gfx_hal::{
    device::Device,
    error::{GfxHalError, Result as HalResult},
    physical_device::PhysicalDevice,
    queue::Queue,
    surface::Surface,
    swapchain::{Swapchain, SwapchainConfig},
};
use gpu_allocator::MemoryLocation;
use resource_manager::{ImageHandle, ResourceManager, ResourceManagerError};
use tracing::{debug, error, trace};

use crate::backend::{ImageChain, SurfaceBackend, SurfaceSupport};
use crate::error::{RendererError, Result};

const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Picks the first depth format the device can use as an optimally tiled attachment.
pub fn find_depth_format(physical_device: &PhysicalDevice) -> Result<vk::Format> {
    let format = unsafe {
        physical_device.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    };
    format.ok_or_else(|| {
        RendererError::DeviceCapability(format!(
            "none of {DEPTH_FORMAT_CANDIDATES:?} usable as a depth attachment"
        ))
    })
}

pub(crate) fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

fn depth_error(error: ResourceManagerError) -> GfxHalError {
    match error {
        ResourceManagerError::GfxHalError(inner) => inner,
        ResourceManagerError::VulkanError(result) => result.into(),
        other => GfxHalError::Other(format!("depth attachment: {other}")),
    }
}

/// A swapchain plus the depth attachment sized to it.
///
/// The depth image is shared by all swapchain images; frames in flight are ordered
/// against each other by a barrier at the start of every frame.
pub struct VulkanChain {
    resource_manager: Arc<ResourceManager>,
    swapchain: Swapchain,
    depth_handle: ImageHandle,
    depth_image: vk::Image,
    depth_view: vk::ImageView,
    depth_format: vk::Format,
}

impl VulkanChain {
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn depth_image(&self) -> vk::Image {
        self.depth_image
    }

    pub fn depth_view(&self) -> vk::ImageView {
        self.depth_view
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}

impl ImageChain for VulkanChain {
    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    fn derived_resource_count(&self) -> usize {
        self.swapchain.image_views().len()
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn format(&self) -> vk::Format {
        self.swapchain.format().format
    }
}

impl Drop for VulkanChain {
    fn drop(&mut self) {
        trace!("Releasing depth attachment {:?}", self.depth_handle);
        if let Err(e) = self.resource_manager.destroy_image(self.depth_handle) {
            error!(
                "Failed to destroy depth image {:?}: {}",
                self.depth_handle, e
            );
        }
    }
}

/// Builds and drives [`VulkanChain`]s for one window surface.
pub struct VulkanSurface {
    device: Arc<Device>,
    surface: Arc<Surface>,
    present_queue: Arc<Queue>,
    resource_manager: Arc<ResourceManager>,
    depth_format: vk::Format,
}

impl VulkanSurface {
    pub fn new(
        resource_manager: Arc<ResourceManager>,
        surface: Arc<Surface>,
        depth_format: vk::Format,
    ) -> HalResult<Self> {
        let device = resource_manager.device().clone();
        let present_queue = device.get_present_queue()?;
        Ok(Self {
            device,
            surface,
            present_queue,
            resource_manager,
            depth_format,
        })
    }

    fn create_depth_image(
        &self,
        extent: vk::Extent2D,
    ) -> resource_manager::Result<(ImageHandle, vk::Image, vk::ImageView)> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(self.depth_format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = self.resource_manager.create_image(
            &create_info,
            MemoryLocation::GpuOnly,
            depth_aspect(self.depth_format),
        )?;
        let info = self.resource_manager.get_image_info(handle)?;
        let view = info
            .default_view_handle
            .ok_or_else(|| {
                ResourceManagerError::Other("depth image has no default view".to_string())
            })
            .and_then(|view| self.resource_manager.get_image_view_info(view));
        match view {
            Ok(view) => Ok((handle, info.image, view.view)),
            Err(e) => {
                if let Err(cleanup) = self.resource_manager.destroy_image(handle) {
                    error!(
                        "Failed to destroy depth image {:?} after view lookup failed: {}",
                        handle, cleanup
                    );
                }
                Err(e)
            }
        }
    }
}

impl SurfaceBackend for VulkanSurface {
    type Chain = VulkanChain;

    fn query_support(&self) -> HalResult<SurfaceSupport> {
        let physical_device = self.device.physical_device_handle();
        unsafe { self.surface.support(physical_device) }
    }

    fn build_chain(
        &mut self,
        config: &SwapchainConfig,
        previous: Option<&VulkanChain>,
    ) -> HalResult<VulkanChain> {
        let old = previous.map(|chain| chain.swapchain.handle());
        let swapchain =
            unsafe { Swapchain::new(self.device.clone(), &self.surface, config, old)? };
        let (depth_handle, depth_image, depth_view) = self
            .create_depth_image(swapchain.extent())
            .map_err(depth_error)?;
        debug!(
            "Depth attachment {:?} ({:?}) created for {}x{}",
            depth_handle,
            self.depth_format,
            swapchain.extent().width,
            swapchain.extent().height
        );

        Ok(VulkanChain {
            resource_manager: self.resource_manager.clone(),
            swapchain,
            depth_handle,
            depth_image,
            depth_view,
            depth_format: self.depth_format,
        })
    }

    fn destroy_chain(&mut self, chain: VulkanChain) {
        debug!("Destroying swapchain {:?}", chain.swapchain.handle());
        drop(chain);
    }

    fn acquire_image(
        &mut self,
        chain: &VulkanChain,
        timeout: Duration,
        signal: vk::Semaphore,
    ) -> HalResult<(u32, bool)> {
        unsafe {
            chain
                .swapchain
                .acquire_next_image(timeout, signal, vk::Fence::null())
        }
    }

    fn present_image(
        &mut self,
        chain: &VulkanChain,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> HalResult<bool> {
        unsafe {
            chain
                .swapchain
                .present(&self.present_queue, image_index, &[wait])
        }
    }

    fn wait_idle(&self) -> HalResult<()> {
        self.device.wait_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_formats_include_stencil_aspect() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert!(depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }

    #[test]
    fn out_of_memory_keeps_its_name() {
        let err = depth_error(ResourceManagerError::VulkanError(
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        ));
        assert!(matches!(err, GfxHalError::OutOfMemory("device")));
    }
}
