use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use shared::DrawableKind;
use tracing::{debug, trace};

use crate::{BufferHandle, ResourceManager, ResourceManagerError, Result};

/// Vertex and index data of one drawable, resident in device-local buffers.
///
/// Immutable once uploaded. Owned by exactly one drawable; the buffers are released
/// through the `ResourceManager` when this value is dropped.
pub struct Geometry {
    resource_manager: Arc<ResourceManager>,
    kind: DrawableKind,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl Geometry {
    /// Uploads `vertices` and `indices` through a staging copy.
    ///
    /// # Errors
    ///
    /// Returns a `ResourceManagerError` if either slice is empty, or if buffer
    /// creation or the transfer fails.
    pub fn new<V: Pod>(
        resource_manager: Arc<ResourceManager>,
        kind: DrawableKind,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<Self> {
        trace!(
            "Creating {} geometry: {} vertices, {} indices",
            kind.name(),
            vertices.len(),
            indices.len()
        );

        if vertices.is_empty() || indices.is_empty() {
            return Err(ResourceManagerError::Other(format!(
                "Cannot create {} geometry with empty vertices or indices.",
                kind.name()
            )));
        }

        let vertex_buffer = resource_manager.create_buffer_init(
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::GpuOnly,
            bytemuck::cast_slice(vertices),
        )?;

        let index_buffer = match resource_manager.create_buffer_init(
            vk::BufferUsageFlags::INDEX_BUFFER,
            MemoryLocation::GpuOnly,
            bytemuck::cast_slice(indices),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                resource_manager.release_buffer_logged(vertex_buffer, "vertex");
                return Err(e);
            }
        };

        debug!(
            "{} geometry uploaded: VB={:?}, IB={:?}, indices={}",
            kind.name(),
            vertex_buffer,
            index_buffer,
            indices.len()
        );

        Ok(Self {
            resource_manager,
            kind,
            vertex_buffer,
            index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        })
    }

    pub fn kind(&self) -> DrawableKind {
        self.kind
    }

    /// Binds the vertex buffer at binding 0 and the `u32` index buffer.
    pub fn bind(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) -> Result<()> {
        let vb_info = self.resource_manager.get_buffer_info(self.vertex_buffer)?;
        let ib_info = self.resource_manager.get_buffer_info(self.index_buffer)?;

        unsafe {
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[vb_info.buffer], &[0]);
            device.cmd_bind_index_buffer(
                command_buffer,
                ib_info.buffer,
                0,
                vk::IndexType::UINT32,
            );
        }
        Ok(())
    }

    /// Binds the geometry buffers and issues an indexed draw command.
    pub fn draw(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.bind(device, command_buffer)?;
        trace!("Drawing {}: {} indices", self.kind.name(), self.index_count);
        unsafe {
            device.cmd_draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0);
        }
        Ok(())
    }
}

impl Drop for Geometry {
    fn drop(&mut self) {
        debug!("Dropping {} geometry", self.kind.name());
        if let Err(e) = self.resource_manager.destroy_buffer(self.vertex_buffer) {
            tracing::error!(
                "Failed to destroy vertex buffer {:?} during Geometry drop: {}",
                self.vertex_buffer,
                e
            );
        }
        if let Err(e) = self.resource_manager.destroy_buffer(self.index_buffer) {
            tracing::error!(
                "Failed to destroy index buffer {:?} during Geometry drop: {}",
                self.index_buffer,
                e
            );
        }
    }
}
