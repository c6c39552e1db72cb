use crate::{
    error::{GfxHalError, Result},
    instance::Instance,
};

use ash::{khr::surface::Instance as SurfaceLoader, vk};
use std::sync::Arc;
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// What a surface reports for one physical device.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain needs at least one format and one present mode.
    pub fn can_present(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The window's presentation surface. Destroyed on drop.
pub struct Surface {
    instance: Arc<Instance>,
    loader: SurfaceLoader,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// # Safety
    /// `window` must stay alive, with valid handles, for as long as the surface does.
    pub unsafe fn new(
        instance: Arc<Instance>,
        window: &(impl HasWindowHandle + HasDisplayHandle),
    ) -> Result<Arc<Self>> {
        let loader = SurfaceLoader::new(instance.entry(), instance.ash_instance());
        let surface = ash_window::create_surface(
            instance.entry(),
            instance.ash_instance(),
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
            None,
        )
        .map_err(GfxHalError::SurfaceCreationError)?;

        tracing::info!("Created window surface {:?}", surface);
        Ok(Arc::new(Self {
            instance,
            loader,
            surface,
        }))
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Capabilities, formats and present modes, queried fresh on every call.
    ///
    /// # Safety
    /// `physical_device` must belong to the instance this surface was created from.
    pub unsafe fn support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        let support = SurfaceSupport {
            capabilities: self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?,
            formats: self
                .loader
                .get_physical_device_surface_formats(physical_device, self.surface)?,
            present_modes: self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?,
        };
        tracing::trace!(
            "Surface offers {} formats, {} present modes, current extent {:?}",
            support.formats.len(),
            support.present_modes.len(),
            support.capabilities.current_extent
        );
        Ok(support)
    }

    /// Whether `queue_family_index` can present to this surface.
    ///
    /// # Safety
    /// `physical_device` must belong to the instance this surface was created from.
    pub unsafe fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool> {
        Ok(self.loader.get_physical_device_surface_support(
            physical_device,
            queue_family_index,
            self.surface,
        )?)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
        tracing::debug!("Window surface destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presenting_needs_a_format_and_a_mode() {
        let mut support = SurfaceSupport::default();
        assert!(!support.can_present());

        support.formats.push(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        });
        assert!(!support.can_present());

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.can_present());
    }
}
