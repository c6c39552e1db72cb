use thiserror::Error;

/// Any errors that can be returned from this crate.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Error from ResourceManager: {0}")]
    ResourceManagerError(#[from] resource_manager::ResourceManagerError),
}

pub type Result<T> = std::result::Result<T, SceneError>;
