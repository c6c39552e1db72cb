//! Vulkan implementations of the capability traits in [`crate::backend`].

mod chain;
mod frame;
mod pipeline;
mod slot;

pub use chain::{find_depth_format, VulkanChain, VulkanSurface};
pub use frame::VulkanFrameRenderer;
pub use pipeline::{spirv_words, LinePipeline, GRID_FRAG_SPV, GRID_VERT_SPV};
pub use slot::FrameSlot;
