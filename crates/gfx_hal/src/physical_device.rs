use ash::vk;

use crate::{
    error::{GfxHalError, Result},
    instance::Instance,
    surface::Surface,
};

use std::{collections::HashSet, ffi::CStr, sync::Arc};

/// Represents a physical Vulkan device (GPU).
///
/// This struct holds a handle to the Vulkan physical device and a
/// reference back to the `Instance` it originated from. It does *not* own
/// the `vk::PhysicalDevice` in the sense that it doesn't destroy it; physical
/// devices are implicitly managed by the `vk::Instance`
///
/// It's cheap to clone as it only clones the `Arc<Instance>` and copies the handle
#[derive(Clone)]
pub struct PhysicalDevice {
    /// Shared reference to the Vulkan instance
    instance: Arc<Instance>,
    /// The raw Vulkan physical device handle.
    handle: vk::PhysicalDevice,
}

/// Holds information about queue families found on a `PhysicalDevice`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Queue family index supporting graphics operations.
    pub graphics_family: Option<u32>,
    /// Queue family index supporting presentation to a given surface.
    /// This might be the same as the graphics family.
    pub present_family: Option<u32>,
    /// A dedicated transfer-only family, if the device exposes one.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if all essential queue families (graphics, present if surface exists) were found.
    pub fn is_complete(&self, requires_present: bool) -> bool {
        self.graphics_family.is_some() && (!requires_present || self.present_family.is_some())
    }

    /// Picks queue families from `families`.
    ///
    /// The graphics family is the first one with `GRAPHICS`. Presentation prefers the
    /// graphics family and otherwise takes the first family `supports_present` accepts.
    /// A transfer family is only reported if it is dedicated (no graphics bit).
    pub fn select(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool>,
    ) -> Result<Self> {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count == 0 {
                continue;
            }
            let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            if graphics && indices.graphics_family.is_none() {
                indices.graphics_family = Some(index);
            }
            if !graphics
                && family.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && indices.transfer_family.is_none()
            {
                indices.transfer_family = Some(index);
            }
        }

        if let Some(graphics) = indices.graphics_family {
            if supports_present(graphics)? {
                indices.present_family = Some(graphics);
            }
        }
        if indices.present_family.is_none() {
            for (index, family) in families.iter().enumerate() {
                let index = index as u32;
                if family.queue_count > 0 && supports_present(index)? {
                    indices.present_family = Some(index);
                    break;
                }
            }
        }

        Ok(indices)
    }
}

/// Represents the suitability of a physical device.
#[derive(Debug)]
pub enum Suitability {
    /// The device is suitable and meets requirements.
    Suitable {
        /// A score indicating preference (higher is better).
        score: u32,
        /// The indices of the required queue families.
        indices: QueueFamilyIndices,
        /// The properties of the device.
        properties: Box<vk::PhysicalDeviceProperties>,
    },
    /// The device is not suitable.
    NotSuitable {
        /// The reason why the device is not suitable.
        reason: String,
    },
}

/// Preference score for a device type. Discrete GPUs win.
pub fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    }
}

impl PhysicalDevice {
    /// Creates a new `PhysicalDevice` wrapper
    /// Typically called internally by `Instance::enumerate_physical_devices`
    pub(crate) fn new(instance: Arc<Instance>, handle: vk::PhysicalDevice) -> Self {
        Self { instance, handle }
    }

    /// Gets the raw `vk::PhysicalDevice` handle.
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Gets a reference to the `Instance` this device belongs to.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Queries the basic properties of the physical device.
    ///
    /// # Safety
    /// Assumes the `PhysicalDevice` handle is valid.
    pub unsafe fn get_properties(&self) -> vk::PhysicalDeviceProperties {
        self.instance
            .ash_instance()
            .get_physical_device_properties(self.handle)
    }

    /// Human readable device name.
    ///
    /// # Safety
    /// Assumes the `PhysicalDevice` handle is valid.
    pub unsafe fn name(&self) -> String {
        let properties = self.get_properties();
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned()
    }

    /// Queries the supported core features and the dynamic rendering feature.
    ///
    /// # Safety
    /// Assumes the `PhysicalDevice` handle is valid.
    pub unsafe fn get_features(&self) -> (vk::PhysicalDeviceFeatures, bool) {
        let mut dynamic_rendering_features = vk::PhysicalDeviceDynamicRenderingFeatures::default();
        let mut features2 =
            vk::PhysicalDeviceFeatures2::default().push_next(&mut dynamic_rendering_features);

        self.instance
            .ash_instance()
            .get_physical_device_features2(self.handle, &mut features2);

        let features = features2.features;
        (
            features,
            dynamic_rendering_features.dynamic_rendering == vk::TRUE,
        )
    }

    /// Queries the properties of all queue families available on the device.
    ///
    /// # Safety
    /// Assumes the `PhysicalDevice` handle is valid.
    pub unsafe fn get_queue_family_properties(&self) -> Vec<vk::QueueFamilyProperties> {
        self.instance
            .ash_instance()
            .get_physical_device_queue_family_properties(self.handle)
    }

    /// Queries the device specific extensions supported by this physical device.
    ///
    /// # Safety
    /// Assumes the `PhysicalDevice` handle is valid.
    pub unsafe fn get_supported_extensions(&self) -> Result<Vec<vk::ExtensionProperties>> {
        Ok(self
            .instance
            .ash_instance()
            .enumerate_device_extension_properties(self.handle)?)
    }

    /// Finds suitable queue family indices for graphics and presentation to `surface`.
    ///
    /// # Safety
    /// Assumes the `PhysicalDevice` handle and `surface` are valid.
    pub unsafe fn find_queue_families(&self, surface: &Surface) -> Result<QueueFamilyIndices> {
        let families = self.get_queue_family_properties();
        QueueFamilyIndices::select(&families, |index| {
            surface.supports_present(self.handle, index)
        })
    }

    /// Returns the first of `candidates` whose `tiling` supports `features`.
    ///
    /// # Safety
    /// Assumes the `PhysicalDevice` handle is valid.
    pub unsafe fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|&format| {
            let properties = self
                .instance
                .ash_instance()
                .get_physical_device_format_properties(self.handle, format);
            match tiling {
                vk::ImageTiling::LINEAR => properties.linear_tiling_features.contains(features),
                _ => properties.optimal_tiling_features.contains(features),
            }
        })
    }

    /// Checks if the physical device can render to `surface` with the given device
    /// extensions and dynamic rendering, and scores it.
    ///
    /// # Safety
    /// Assumes the `PhysicalDevice` handle and `surface` are valid.
    pub unsafe fn check_suitability(
        &self,
        required_extensions: &[&CStr],
        surface: &Surface,
    ) -> Result<Suitability> {
        let properties = self.get_properties();

        if properties.api_version < vk::API_VERSION_1_3 {
            return Ok(Suitability::NotSuitable {
                reason: format!(
                    "Vulkan 1.{} device, 1.3 required",
                    vk::api_version_minor(properties.api_version)
                ),
            });
        }

        let available = self.get_supported_extensions()?;
        let available_names: HashSet<&CStr> = available
            .iter()
            .map(|ext| CStr::from_ptr(ext.extension_name.as_ptr()))
            .collect();
        if let Some(missing) = required_extensions
            .iter()
            .find(|ext| !available_names.contains(*ext))
        {
            return Ok(Suitability::NotSuitable {
                reason: format!("missing device extension {:?}", missing),
            });
        }

        let (_, dynamic_rendering) = self.get_features();
        if !dynamic_rendering {
            return Ok(Suitability::NotSuitable {
                reason: "dynamic rendering not supported".to_string(),
            });
        }

        let indices = self.find_queue_families(surface)?;
        if !indices.is_complete(true) {
            return Ok(Suitability::NotSuitable {
                reason: format!("incomplete queue families: {:?}", indices),
            });
        }

        if !surface.support(self.handle)?.can_present() {
            return Ok(Suitability::NotSuitable {
                reason: "surface reports no formats or present modes".to_string(),
            });
        }

        let score = device_type_score(properties.device_type)
            + properties.limits.max_image_dimension2_d / 1024;

        Ok(Suitability::Suitable {
            score,
            indices,
            properties: Box::new(properties),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn present_prefers_the_graphics_family() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::select(&families, |_| Ok(true)).unwrap();
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
        assert_eq!(indices.transfer_family, Some(2));
        assert!(indices.is_complete(true));
    }

    #[test]
    fn present_falls_back_to_another_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = QueueFamilyIndices::select(&families, |index| Ok(index == 1)).unwrap();
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
        assert_eq!(indices.transfer_family, None);
    }

    #[test]
    fn missing_presentation_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::select(&families, |_| Ok(false)).unwrap();
        assert!(indices.is_complete(false));
        assert!(!indices.is_complete(true));
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result =
            QueueFamilyIndices::select(&families, |_| Err(GfxHalError::SurfaceLost));
        assert!(matches!(result, Err(GfxHalError::SurfaceLost)));
    }

    #[test]
    fn discrete_gpus_score_highest() {
        assert!(
            device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > device_type_score(vk::PhysicalDeviceType::CPU)
        );
    }
}
