use ash::vk;
use thiserror::Error;

/// Top-level error type for the gfx_hal crate.
///
/// Result codes the rest of the engine reacts to are surfaced as their own variants,
/// everything else stays wrapped in [`GfxHalError::VulkanError`].
#[derive(Error, Debug)]
pub enum GfxHalError {
    /// Error originating directly from a Vulkan API call.
    #[error("Vulkan API Error: {0}")]
    VulkanError(vk::Result),

    /// The logical device was lost (driver reset, hang, removal).
    #[error("Vulkan device lost")]
    DeviceLost,

    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Swapchain is out of date")]
    OutOfDate,

    /// The Vulkan surface became invalid.
    #[error("Vulkan surface lost")]
    SurfaceLost,

    /// A bounded wait expired before the GPU signaled.
    #[error("Timed out waiting on the GPU")]
    Timeout,

    /// Host or device memory was exhausted.
    #[error("Out of {0} memory")]
    OutOfMemory(&'static str),

    /// No suitable physical device (GPU) could be found that meets requirements.
    #[error("No suitable physical device found: {0}")]
    NoSuitableGpu(String),

    /// A required Vulkan instance or device extension is not supported.
    #[error("Missing required Vulkan extension: {0:?}")]
    MissingExtension(String),

    /// A required Vulkan feature is not supported by the physical device.
    #[error("Missing required Vulkan feature: {0}")]
    MissingFeature(String),

    /// Failed to find a suitable queue family (e.g., graphics, present).
    #[error("Could not find required queue family: {0}")]
    MissingQueueFamily(String),

    /// Error related to window system integration surface creation.
    #[error("Failed to create Vulkan surface: {0}")]
    SurfaceCreationError(vk::Result),

    /// Error converting a C-style string.
    #[error("Invalid C string: {0}")]
    InvalidCString(#[from] std::ffi::NulError),

    /// Error with winit windowing library.
    #[error("Winit Error: {0}")]
    WinitHandleError(#[from] winit::raw_window_handle::HandleError),

    /// Ash loader error.
    #[error("Error loading the ash entry: {0}")]
    AshEntryError(#[from] ash::LoadingError),

    /// Placeholder for other specific errors.
    #[error("An unexpected error occurred: {0}")]
    Other(String),
}

impl From<vk::Result> for GfxHalError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::OutOfDate,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            vk::Result::TIMEOUT | vk::Result::NOT_READY => Self::Timeout,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfMemory("host"),
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfMemory("device"),
            other => Self::VulkanError(other),
        }
    }
}

pub type Result<T, E = GfxHalError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_result_codes_get_named_variants() {
        assert!(matches!(
            GfxHalError::from(vk::Result::ERROR_DEVICE_LOST),
            GfxHalError::DeviceLost
        ));
        assert!(matches!(
            GfxHalError::from(vk::Result::ERROR_OUT_OF_DATE_KHR),
            GfxHalError::OutOfDate
        ));
        assert!(matches!(
            GfxHalError::from(vk::Result::TIMEOUT),
            GfxHalError::Timeout
        ));
        assert!(matches!(
            GfxHalError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GfxHalError::OutOfMemory("device")
        ));
    }

    #[test]
    fn unknown_result_codes_are_kept() {
        let err = GfxHalError::from(vk::Result::ERROR_INITIALIZATION_FAILED);
        assert!(matches!(
            err,
            GfxHalError::VulkanError(vk::Result::ERROR_INITIALIZATION_FAILED)
        ));
    }
}
