use ash::vk;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::ffi::{c_char, CStr};
use std::sync::Arc;

use crate::error::{GfxHalError, Result};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDevice, QueueFamilyIndices};
use crate::queue::Queue;

/// Represents the logical Vulkan device, created from a `PhysicalDevice`.
///
/// Owns the `ash::Device` and one [`Queue`] per distinct queue family in use.
pub struct Device {
    _instance: Arc<Instance>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queues: Mutex<HashMap<u32, Arc<Queue>>>,
    graphics_queue_family_index: u32,
    present_queue_family_index: u32,
    transfer_queue_family_index: Option<u32>,
}

impl Device {
    /// Creates a new logical device. Typically called via `PhysicalDevice::create_logical_device`.
    ///
    /// # Safety
    /// - `instance` and `physical_device_handle` must be valid.
    /// - `queue_family_indices` must be valid indices obtained from the `physical_device_handle`.
    /// - `required_extensions` and `enabled_features` must be supported by the
    ///   `physical_device_handle`.
    pub(crate) unsafe fn new(
        instance: Arc<Instance>,
        physical_device_handle: vk::PhysicalDevice,
        queue_family_indices: &QueueFamilyIndices,
        required_extensions: &[&CStr],
        enabled_features: &vk::PhysicalDeviceFeatures,
        dynamic_rendering: bool,
    ) -> Result<Arc<Self>> {
        let graphics_family = queue_family_indices.graphics_family.ok_or_else(|| {
            GfxHalError::MissingQueueFamily("Graphics Queue Family Missing".to_string())
        })?;
        let present_family = queue_family_indices.present_family.ok_or_else(|| {
            GfxHalError::MissingQueueFamily("Present Queue Family Missing".to_string())
        })?;

        let mut unique_queue_families = BTreeSet::new();
        unique_queue_families.insert(graphics_family);
        unique_queue_families.insert(present_family);
        if let Some(transfer_family) = queue_family_indices.transfer_family {
            unique_queue_families.insert(transfer_family);
        }

        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<_> = unique_queue_families
            .iter()
            .map(|&family_index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family_index)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extension_names_raw: Vec<*const c_char> =
            required_extensions.iter().map(|s| s.as_ptr()).collect();

        let mut dynamic_rendering_features =
            vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
        let mut features2 = vk::PhysicalDeviceFeatures2::default().features(*enabled_features);
        if dynamic_rendering {
            features2 = features2.push_next(&mut dynamic_rendering_features);
        }

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names_raw)
            .push_next(&mut features2);

        tracing::info!(
            "Creating logical device with extensions: {:?}",
            required_extensions
        );
        let device = instance.ash_instance().create_device(
            physical_device_handle,
            &device_create_info,
            None,
        )?;
        tracing::info!("Logical device created successfully.");

        let queues = unique_queue_families
            .iter()
            .map(|&family_index| {
                let handle = device.get_device_queue(family_index, 0);
                (
                    family_index,
                    Arc::new(Queue::new(device.clone(), handle, family_index)),
                )
            })
            .collect();

        Ok(Arc::new(Self {
            _instance: instance,
            physical_device: physical_device_handle,
            device,
            queues: Mutex::new(queues),
            graphics_queue_family_index: graphics_family,
            present_queue_family_index: present_family,
            transfer_queue_family_index: queue_family_indices.transfer_family,
        }))
    }

    /// Provides raw access to the underlying `ash::Device`.
    /// Use with caution, prefer safe wrappers where possible.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Gets the handle of the physical device this logical device was created from.
    pub fn physical_device_handle(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Gets the primary graphics queue family index used by this device.
    pub fn graphics_queue_family_index(&self) -> u32 {
        self.graphics_queue_family_index
    }

    /// Gets the queue family index used for presentation.
    pub fn present_queue_family_index(&self) -> u32 {
        self.present_queue_family_index
    }

    /// Gets the dedicated transfer queue family index, if one was found.
    pub fn transfer_queue_family_index(&self) -> Option<u32> {
        self.transfer_queue_family_index
    }

    /// Gets the wrapped queue 0 of `family_index`.
    pub fn get_queue(&self, family_index: u32, queue_index: u32) -> Option<Arc<Queue>> {
        if queue_index != 0 {
            tracing::warn!("get_queue currently only supports queue_index 0");
            return None;
        }
        self.queues.lock().get(&family_index).cloned()
    }

    /// Gets the primary graphics queue.
    pub fn get_graphics_queue(&self) -> Result<Arc<Queue>> {
        self.get_queue(self.graphics_queue_family_index, 0)
            .ok_or_else(|| GfxHalError::MissingQueueFamily("graphics queue".to_string()))
    }

    /// Gets the queue used for presentation.
    pub fn get_present_queue(&self) -> Result<Arc<Queue>> {
        self.get_queue(self.present_queue_family_index, 0)
            .ok_or_else(|| GfxHalError::MissingQueueFamily("present queue".to_string()))
    }

    /// Waits until the logical device becomes idle.
    /// This is a heavy operation and should be used sparingly (e.g., before destruction).
    pub fn wait_idle(&self) -> Result<()> {
        tracing::debug!("Waiting for device idle...");
        unsafe { self.device.device_wait_idle()? };
        tracing::debug!("Device idle.");
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        tracing::debug!("Destroying logical device...");
        if let Err(e) = self.wait_idle() {
            tracing::error!("Error waiting for device idle during drop: {}", e);
        }
        self.queues.lock().clear();
        unsafe {
            self.device.destroy_device(None);
        }
        tracing::debug!("Logical device destroyed.");
    }
}

impl PhysicalDevice {
    /// Creates the logical device (`Device`) from this physical device.
    ///
    /// # Safety
    /// See `Device::new` safety comments.
    pub unsafe fn create_logical_device(
        &self,
        required_extensions: &[&CStr],
        queue_family_indices: &QueueFamilyIndices,
        enabled_features: &vk::PhysicalDeviceFeatures,
        dynamic_rendering: bool,
    ) -> Result<Arc<Device>> {
        Device::new(
            Arc::clone(self.instance()),
            self.handle(),
            queue_family_indices,
            required_extensions,
            enabled_features,
            dynamic_rendering,
        )
    }
}
