use std::fmt::Display;

use gfx_hal::error::GfxHalError;
use resource_manager::ResourceManagerError;
use scene::SceneError;
use thiserror::Error;

/// Every failure the renderer reports falls into one of four classes.
///
/// `InvalidArgument` and `DeviceCapability` abort startup. `TransientPresentation` is
/// recoverable by rebuilding the swapchain and is only handled at acquire and present.
/// `Fatal` ends the render loop.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Device capability: {0}")]
    DeviceCapability(String),

    #[error("Presentation surface is stale: {0}")]
    TransientPresentation(String),

    #[error("Fatal rendering error: {0}")]
    Fatal(String),
}

pub type Result<T, E = RendererError> = std::result::Result<T, E>;

impl RendererError {
    /// Wraps any error as `Fatal`, prefixed with what was being attempted.
    pub fn fatal(context: &str, error: impl Display) -> Self {
        Self::Fatal(format!("{context}: {error}"))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<GfxHalError> for RendererError {
    fn from(error: GfxHalError) -> Self {
        let message = error.to_string();
        match error {
            GfxHalError::OutOfDate => Self::TransientPresentation(message),
            GfxHalError::NoSuitableGpu(_)
            | GfxHalError::MissingExtension(_)
            | GfxHalError::MissingFeature(_)
            | GfxHalError::MissingQueueFamily(_)
            | GfxHalError::SurfaceCreationError(_)
            | GfxHalError::WinitHandleError(_)
            | GfxHalError::AshEntryError(_) => Self::DeviceCapability(message),
            GfxHalError::InvalidCString(_) => Self::InvalidArgument(message),
            GfxHalError::VulkanError(_)
            | GfxHalError::DeviceLost
            | GfxHalError::SurfaceLost
            | GfxHalError::Timeout
            | GfxHalError::OutOfMemory(_)
            | GfxHalError::Other(_) => Self::Fatal(message),
        }
    }
}

impl From<ResourceManagerError> for RendererError {
    fn from(error: ResourceManagerError) -> Self {
        match error {
            ResourceManagerError::GfxHalError(inner) => inner.into(),
            ResourceManagerError::VulkanError(result) => GfxHalError::from(result).into(),
            other => Self::Fatal(other.to_string()),
        }
    }
}

impl From<SceneError> for RendererError {
    fn from(error: SceneError) -> Self {
        match error {
            SceneError::InvalidArgument(message) => Self::InvalidArgument(message),
            SceneError::ResourceManagerError(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn out_of_date_is_transient() {
        let err = RendererError::from(GfxHalError::OutOfDate);
        assert!(matches!(err, RendererError::TransientPresentation(_)));
    }

    #[test]
    fn device_loss_and_timeouts_are_fatal() {
        assert!(RendererError::from(GfxHalError::DeviceLost).is_fatal());
        assert!(RendererError::from(GfxHalError::Timeout).is_fatal());
        assert!(RendererError::from(GfxHalError::from(vk::Result::ERROR_UNKNOWN)).is_fatal());
    }

    #[test]
    fn missing_support_is_a_capability_error() {
        let err = RendererError::from(GfxHalError::MissingExtension("VK_KHR_swapchain".into()));
        assert!(matches!(err, RendererError::DeviceCapability(_)));
    }

    #[test]
    fn nested_errors_keep_their_class() {
        let err = RendererError::from(ResourceManagerError::VulkanError(
            vk::Result::ERROR_DEVICE_LOST,
        ));
        assert!(err.is_fatal());

        let err = RendererError::from(SceneError::InvalidArgument("negative cells".into()));
        assert!(matches!(err, RendererError::InvalidArgument(m) if m == "negative cells"));

        let err = RendererError::from(SceneError::ResourceManagerError(
            ResourceManagerError::GfxHalError(GfxHalError::NoSuitableGpu("none".into())),
        ));
        assert!(matches!(err, RendererError::DeviceCapability(_)));
    }
}
