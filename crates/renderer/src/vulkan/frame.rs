use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use gfx_hal::{device::Device, queue::Queue};
use gpu_allocator::MemoryLocation;
use resource_manager::{BufferHandle, Geometry, ResourceManager};
use shared::{DrawableKind, PerDrawable, UniformBufferObject};
use tracing::{debug, error, trace};

use super::chain::{depth_aspect, VulkanChain};
use super::pipeline::LinePipeline;
use super::slot::FrameSlot;
use crate::backend::{FrameRenderer, ImageChain, SlotSync};
use crate::error::{RendererError, Result};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.2, 1.0];

/// Command recording state and uniform memory owned by one frame slot.
struct SlotResources {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    uniform_buffers: PerDrawable<BufferHandle>,
    descriptor_sets: PerDrawable<vk::DescriptorSet>,
}

/// Records and submits the triangle, grid and axes each frame.
///
/// Every slot has its own command pool and, per drawable, its own host-visible uniform
/// buffer and descriptor set, so writing slot `i` never touches memory the GPU may
/// still be reading for slot `j`.
pub struct VulkanFrameRenderer {
    device: Arc<Device>,
    graphics_queue: Arc<Queue>,
    resource_manager: Arc<ResourceManager>,
    geometry: PerDrawable<Geometry>,
    pipeline: LinePipeline,
    descriptor_pool: vk::DescriptorPool,
    slots: Vec<SlotResources>,
}

impl VulkanFrameRenderer {
    pub fn new(
        resource_manager: Arc<ResourceManager>,
        geometry: PerDrawable<Geometry>,
        pipeline: LinePipeline,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let device = resource_manager.device().clone();
        let graphics_queue = device.get_graphics_queue()?;

        let descriptor_count = (frames_in_flight * DrawableKind::ALL.len()) as u32;
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(descriptor_count);
        let descriptor_pool = unsafe {
            device
                .raw()
                .create_descriptor_pool(&pool_info, None)
                .map_err(|e| RendererError::fatal("creating descriptor pool", e))?
        };

        let mut renderer = Self {
            device,
            graphics_queue,
            resource_manager,
            geometry,
            pipeline,
            descriptor_pool,
            slots: Vec::with_capacity(frames_in_flight),
        };
        for index in 0..frames_in_flight {
            let slot = renderer.create_slot_resources(index)?;
            renderer.slots.push(slot);
        }
        debug!(
            "Frame renderer ready with {} slots of {} drawables",
            frames_in_flight,
            DrawableKind::ALL.len()
        );
        Ok(renderer)
    }

    fn create_slot_resources(&self, index: usize) -> Result<SlotResources> {
        let ubo_size = size_of::<UniformBufferObject>() as vk::DeviceSize;
        let uniform_buffers = PerDrawable::try_from_fn(|_| {
            self.resource_manager.create_buffer(
                ubo_size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
            )
        })?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(self.device.graphics_queue_family_index());
        let command_pool = match unsafe { self.device.raw().create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                self.release_uniform_buffers(&uniform_buffers);
                return Err(RendererError::fatal("creating command pool", e));
            }
        };

        let mut resources = SlotResources {
            command_pool,
            command_buffer: vk::CommandBuffer::null(),
            uniform_buffers,
            descriptor_sets: PerDrawable::splat(vk::DescriptorSet::null()),
        };
        if let Err(e) = self.fill_slot_resources(&mut resources, ubo_size) {
            self.release_slot(&resources);
            return Err(e);
        }
        trace!("Slot {} resources created", index);
        Ok(resources)
    }

    /// Allocates the command buffer and points one descriptor set at each uniform buffer.
    fn fill_slot_resources(
        &self,
        resources: &mut SlotResources,
        ubo_size: vk::DeviceSize,
    ) -> Result<()> {
        let device = self.device.raw();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(resources.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| RendererError::fatal("allocating command buffer", e))?;
        resources.command_buffer = buffers.into_iter().next().ok_or_else(|| {
            RendererError::Fatal("driver allocated no command buffer".to_string())
        })?;

        let set_layouts = [self.pipeline.descriptor_set_layout(); 3];
        let set_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&set_layouts);
        let sets = unsafe { device.allocate_descriptor_sets(&set_info) }
            .map_err(|e| RendererError::fatal("allocating descriptor sets", e))?;

        for (kind, set) in DrawableKind::ALL.into_iter().zip(sets) {
            let buffer = self
                .resource_manager
                .get_buffer_info(resources.uniform_buffers[kind])?
                .buffer;
            let buffer_info = vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(0)
                .range(ubo_size);
            let write = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(&buffer_info));
            unsafe { device.update_descriptor_sets(std::slice::from_ref(&write), &[]) };
            resources.descriptor_sets[kind] = set;
        }
        Ok(())
    }

    fn release_uniform_buffers(&self, buffers: &PerDrawable<BufferHandle>) {
        for (kind, handle) in buffers.iter() {
            if let Err(e) = self.resource_manager.destroy_buffer(*handle) {
                error!("Failed to destroy {} uniform buffer: {}", kind.name(), e);
            }
        }
    }

    /// Frees the slot's pool (and with it the command buffer) and uniform buffers.
    /// Descriptor sets are released with the descriptor pool.
    fn release_slot(&self, resources: &SlotResources) {
        unsafe {
            self.device
                .raw()
                .destroy_command_pool(resources.command_pool, None)
        };
        self.release_uniform_buffers(&resources.uniform_buffers);
    }

    fn slot_resources(&self, slot_index: usize) -> Result<&SlotResources> {
        self.slots.get(slot_index).ok_or_else(|| {
            RendererError::InvalidArgument(format!("no resources for frame slot {slot_index}"))
        })
    }

    fn record(
        &self,
        resources: &SlotResources,
        chain: &VulkanChain,
        image_index: u32,
    ) -> Result<()> {
        let device = self.device.raw();
        let command_buffer = resources.command_buffer;
        let swapchain = chain.swapchain();
        let image = *swapchain.images().get(image_index as usize).ok_or_else(|| {
            RendererError::Fatal(format!("swapchain image {image_index} out of range"))
        })?;
        let image_view = *swapchain
            .image_views()
            .get(image_index as usize)
            .ok_or_else(|| {
                RendererError::Fatal(format!("swapchain view {image_index} out of range"))
            })?;
        let extent = chain.extent();

        unsafe {
            device
                .reset_command_pool(resources.command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| RendererError::fatal("resetting command pool", e))?;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| RendererError::fatal("beginning command buffer", e))?;
        }

        let color_to_attachment = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR));
        // Also orders this frame's depth writes after the previous frame's.
        let depth_to_attachment = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_access_mask(
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(chain.depth_image())
            .subresource_range(subresource_range(depth_aspect(chain.depth_format())));

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[color_to_attachment, depth_to_attachment],
            );
        }

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(image_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            });
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(chain.depth_view())
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.cmd_begin_rendering(command_buffer, &rendering_info);
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );
        }

        for (kind, geometry) in self.geometry.iter() {
            unsafe {
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline.layout(),
                    0,
                    &[resources.descriptor_sets[kind]],
                    &[],
                );
            }
            geometry.draw(device, command_buffer)?;
        }

        let color_to_present = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::empty())
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR));

        unsafe {
            device.cmd_end_rendering(command_buffer);
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[color_to_present],
            );
            device
                .end_command_buffer(command_buffer)
                .map_err(|e| RendererError::fatal("ending command buffer", e))?;
        }
        Ok(())
    }
}

fn subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl FrameRenderer for VulkanFrameRenderer {
    type Slot = FrameSlot;
    type Chain = VulkanChain;

    fn update_uniforms(
        &mut self,
        slot_index: usize,
        uniforms: &PerDrawable<UniformBufferObject>,
    ) -> Result<()> {
        let resources = self.slot_resources(slot_index)?;
        for (kind, ubo) in uniforms.iter() {
            self.resource_manager
                .write_buffer(resources.uniform_buffers[kind], bytemuck::bytes_of(ubo))?;
        }
        Ok(())
    }

    fn submit(
        &mut self,
        slot_index: usize,
        slot: &FrameSlot,
        chain: &VulkanChain,
        image_index: u32,
    ) -> Result<()> {
        let resources = self.slot_resources(slot_index)?;
        self.record(resources, chain, image_index)?;
        slot.reset().map_err(|e| RendererError::fatal("resetting frame slot", e))?;

        let wait_semaphores = [slot.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.render_finished()];
        let command_buffers = [resources.command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        trace!("Submitting slot {} for image {}", slot_index, image_index);
        unsafe {
            self.graphics_queue
                .submit(&[submit_info], Some(slot.in_flight()))?;
        }
        Ok(())
    }
}

impl Drop for VulkanFrameRenderer {
    fn drop(&mut self) {
        debug!("Dropping frame renderer");
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during frame renderer drop: {}", e);
        }
        for resources in &self.slots {
            self.release_slot(resources);
        }
        unsafe {
            self.device
                .raw()
                .destroy_descriptor_pool(self.descriptor_pool, None);
        }
    }
}
