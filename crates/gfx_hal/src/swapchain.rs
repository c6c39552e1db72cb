use std::sync::Arc;
use std::time::Duration;

use ash::khr::swapchain::Device as SwapchainLoader;
use ash::vk;

use crate::device::Device;
use crate::error::{GfxHalError, Result};
use crate::queue::Queue;
use crate::surface::Surface;

/// Fully resolved parameters for creating a `Swapchain`.
///
/// Selection against the surface capabilities happens before this point; the values
/// here are passed to Vulkan as they are.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainConfig {
    /// Minimum number of images to request.
    pub image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

/// Represents the Vulkan swapchain, managing presentation images.
///
/// Owns the `vk::SwapchainKHR`, the `ash` Swapchain loader, the swapchain images,
/// and their corresponding image views.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a new `Swapchain`, optionally retiring `old_swapchain`.
    ///
    /// # Safety
    /// - `device` and `surface` must be valid and compatible.
    /// - If `old_swapchain` is provided, it must have been created for the same `surface`
    ///   and its images must no longer be in use. It is retired even if creation fails and
    ///   must still be destroyed by its owner afterwards.
    pub unsafe fn new(
        device: Arc<Device>,
        surface: &Surface,
        config: &SwapchainConfig,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Self> {
        if config.extent.width == 0 || config.extent.height == 0 {
            return Err(GfxHalError::Other(format!(
                "cannot create a swapchain with extent {:?}",
                config.extent
            )));
        }

        tracing::info!(
            "Creating swapchain: Format={:?}, ColorSpace={:?}, PresentMode={:?}, Extent={:?}, MinImageCount={}",
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.extent,
            config.image_count
        );

        let queue_family_indices = [
            device.graphics_queue_family_index(),
            device.present_queue_family_index(),
        ];

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(config.image_usage)
            .pre_transform(config.pre_transform)
            .composite_alpha(config.composite_alpha)
            .present_mode(config.present_mode)
            .clipped(true);

        create_info = if queue_family_indices[0] != queue_family_indices[1] {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        if let Some(old) = old_swapchain {
            create_info = create_info.old_swapchain(old);
            tracing::debug!("Passing old swapchain handle for recreation.");
        }

        let swapchain_loader =
            SwapchainLoader::new(surface.instance().ash_instance(), device.raw());
        let swapchain = swapchain_loader.create_swapchain(&create_info, None)?;

        let images = match swapchain_loader.get_swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                swapchain_loader.destroy_swapchain(swapchain, None);
                return Err(e.into());
            }
        };
        tracing::debug!("Retrieved {} swapchain images.", images.len());

        let image_views =
            match Self::create_image_views(device.raw(), &images, config.surface_format.format) {
                Ok(views) => views,
                Err(e) => {
                    swapchain_loader.destroy_swapchain(swapchain, None);
                    return Err(e);
                }
            };

        tracing::info!("Swapchain created with {} images.", images.len());

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: config.surface_format,
            extent: config.extent,
        })
    }

    /// Acquires the next available image from the swapchain.
    ///
    /// Returns the index of the acquired image and whether the swapchain is suboptimal.
    /// An out-of-date swapchain surfaces as [`GfxHalError::OutOfDate`], an expired
    /// timeout as [`GfxHalError::Timeout`].
    ///
    /// # Safety
    /// `signal_semaphore` and `signal_fence` must be null or valid handles that have
    /// no pending signal operation.
    pub unsafe fn acquire_next_image(
        &self,
        timeout: Duration,
        signal_semaphore: vk::Semaphore,
        signal_fence: vk::Fence,
    ) -> Result<(u32, bool)> {
        let timeout_ns = timeout.as_nanos().min(u64::MAX as u128) as u64;
        let acquired = self.swapchain_loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            signal_semaphore,
            signal_fence,
        )?;
        Ok(acquired)
    }

    /// Queues `image_index` for presentation once `wait_semaphores` are signaled.
    ///
    /// Returns `true` if the swapchain is suboptimal. An out-of-date swapchain surfaces
    /// as [`GfxHalError::OutOfDate`].
    ///
    /// # Safety
    /// `image_index` must have been acquired from this swapchain and `wait_semaphores`
    /// must have pending signal operations.
    pub unsafe fn present(
        &self,
        queue: &Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        queue.present(&self.swapchain_loader, &present_info)
    }

    /// Gets the raw `vk::SwapchainKHR` handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Gets the chosen surface format of the swapchain.
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Gets the extent (dimensions) of the swapchain image
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Gets the actual number of images in the swapchain
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Gets a slice containing the raw `vk::Image` handles.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Gets a slice containing the raw `vk::ImageView` handles.
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    unsafe fn create_image_views(
        device: &ash::Device,
        images: &[vk::Image],
        format: vk::Format,
    ) -> Result<Vec<vk::ImageView>> {
        let mut views = Vec::with_capacity(images.len());
        for image in images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(*image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            match device.create_image_view(&create_info, None) {
                Ok(view) => views.push(view),
                Err(e) => {
                    for view in views {
                        device.destroy_image_view(view, None);
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(views)
    }

    /// Destroys the image views associated with this swapchain.
    unsafe fn destroy_image_views(&mut self) {
        tracing::debug!(
            "Destroying {} swapchain image views...",
            self.image_views.len()
        );
        for view in self.image_views.drain(..) {
            self.device.raw().destroy_image_view(view, None);
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        tracing::debug!("Destroying swapchain...");
        unsafe {
            self.destroy_image_views();
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
        tracing::debug!("Swapchain destroyed.")
    }
}
