use std::{
    borrow::Cow,
    collections::HashSet,
    ffi::{c_char, c_void, CStr, CString},
    sync::Arc,
};

use ash::{ext::debug_utils, vk};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{GfxHalError, Result};
use crate::physical_device::PhysicalDevice;
use crate::surface::Surface;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

unsafe fn lossy_cstr<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

/// Forwards validation layer messages into `tracing` at the matching level.
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let id_name = lossy_cstr(callback_data.p_message_id_name);
    let message = lossy_cstr(callback_data.p_message);
    let id_number = callback_data.message_id_number;

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::debug!(target: "vulkan", ?message_type, "({}:{}) {}", id_name, id_number, message)
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(target: "vulkan", ?message_type, "({}:{}) {}", id_name, id_number, message)
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vulkan", ?message_type, "({}:{}) {}", id_name, id_number, message)
        }
        _ => {
            tracing::error!(target: "vulkan", ?message_type, "({}:{}) {}", id_name, id_number, message)
        }
    }

    vk::FALSE
}

#[derive(Clone, Debug)]
pub struct InstanceConfig {
    pub application_name: String,
    pub engine_name: String,
    pub application_version: u32,
    pub engine_version: u32,
    /// Enable Vulkan validation layers
    pub enable_validation: bool,
    /// Additional required instance extensions beyond surface/debug.
    pub required_extensions: Vec<&'static CStr>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        InstanceConfig {
            application_name: "Vulkan Grid".to_string(),
            engine_name: "No Engine".to_string(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            enable_validation: cfg!(debug_assertions),
            required_extensions: Vec::new(),
        }
    }
}

/// Represents the Vulkan API Instance
///
/// Owns the `ash::Entry`, `ash::Instance` and potentially the debug messenger.
/// This is the starting point for interacting with Vulkan
pub struct Instance {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan `Instance` able to present to windows of `display_handle`.
    pub fn new(config: &InstanceConfig, display_handle: &dyn HasDisplayHandle) -> Result<Arc<Self>> {
        let entry = unsafe { ash::Entry::load()? };

        let app_name = CString::new(config.application_name.clone())?;
        let engine_name = CString::new(config.engine_name.clone())?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(config.application_version)
            .engine_name(&engine_name)
            .engine_version(config.engine_version)
            .api_version(vk::API_VERSION_1_3);

        let validation = config.enable_validation
            && Self::check_validation_layer_support(&entry, &[VALIDATION_LAYER])?;
        if config.enable_validation && !validation {
            tracing::warn!("Validation layers requested but not supported. Disabling.");
        }
        let enabled_layer_names_raw: Vec<*const c_char> = if validation {
            tracing::info!("Validation layers enabled.");
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let surface_extensions =
            ash_window::enumerate_required_extensions(display_handle.display_handle()?.as_raw())?;

        let mut required: Vec<&CStr> = surface_extensions
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect();
        required.extend(config.required_extensions.iter().copied());
        if validation {
            required.push(debug_utils::NAME);
        }
        required.sort_unstable();
        required.dedup();

        Self::check_instance_extension_support(&entry, &required)?;
        tracing::info!("Required instance extensions supported: {:?}", required);

        let enabled_extension_names_raw: Vec<*const c_char> =
            required.iter().map(|name| name.as_ptr()).collect();

        let mut debug_create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let mut instance_create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&enabled_layer_names_raw)
            .enabled_extension_names(&enabled_extension_names_raw);

        if validation {
            instance_create_info = instance_create_info.push_next(&mut debug_create_info);
        }

        let instance = unsafe { entry.create_instance(&instance_create_info, None)? };
        tracing::info!("Vulkan instance created successfully.");

        let (debug_utils, debug_messenger) = if validation {
            let utils = debug_utils::Instance::new(&entry, &instance);
            let messenger =
                unsafe { utils.create_debug_utils_messenger(&debug_create_info, None)? };
            tracing::debug!("Debug messenger created.");
            (Some(utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Arc::new(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        }))
    }

    /// Provides access to the loaded Vulkan entry points.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Provides access to the raw `ash::Instance`.
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Checks if the requested validation layers are available.
    fn check_validation_layer_support(
        entry: &ash::Entry,
        required_layers: &[&CStr],
    ) -> Result<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
        let available_names: HashSet<&CStr> = available_layers
            .iter()
            .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) })
            .collect();

        for layer in required_layers {
            if !available_names.contains(layer) {
                tracing::warn!("Required validation layer {:?} not found.", layer);
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Checks if the requested instance extensions are available.
    fn check_instance_extension_support(
        entry: &ash::Entry,
        required_extensions: &[&CStr],
    ) -> Result<()> {
        let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None)? };
        let available_names: HashSet<&CStr> = available_extensions
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect();
        tracing::debug!("Available instance extensions: {:?}", available_names);

        for ext in required_extensions {
            if !available_names.contains(ext) {
                tracing::error!("Missing required instance extension: {:?}", ext);
                return Err(GfxHalError::MissingExtension(
                    ext.to_string_lossy().into_owned(),
                ));
            }
        }
        Ok(())
    }

    /// Enumerates all physical devices available to this instance.
    pub fn enumerate_physical_devices(self: &Arc<Self>) -> Result<Vec<PhysicalDevice>> {
        let handles = unsafe { self.instance.enumerate_physical_devices()? };

        if handles.is_empty() {
            return Err(GfxHalError::NoSuitableGpu(
                "No Vulkan-compatible GPUs found.".to_string(),
            ));
        }

        Ok(handles
            .into_iter()
            .map(|handle| PhysicalDevice::new(Arc::clone(self), handle))
            .collect())
    }

    /// Creates a vulkan surface for the given window
    ///
    /// # Safety
    /// `window` must stay alive longer than the returned `Surface`.
    pub unsafe fn create_surface(
        self: &Arc<Self>,
        window: &(impl HasWindowHandle + HasDisplayHandle),
    ) -> Result<Arc<Surface>> {
        Surface::new(Arc::clone(self), window)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                tracing::debug!("Destroying debug messenger...");
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            tracing::debug!("Destroying Vulkan instance...");
            self.instance.destroy_instance(None);
            tracing::debug!("Vulkan instance destroyed");
        }
    }
}
