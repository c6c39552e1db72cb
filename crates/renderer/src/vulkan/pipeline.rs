use std::io::Cursor;
use std::sync::Arc;

use ash::vk;
use gfx_hal::device::Device;
use shared::Vertex;
use tracing::{debug, error};

use crate::error::{RendererError, Result};

pub const GRID_VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/shaders/grid.vert.spv"));
pub const GRID_FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/shaders/grid.frag.spv"));

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Reinterprets SPIR-V bytecode as words, rejecting anything that cannot be a module.
pub fn spirv_words(code: &[u8]) -> Result<Vec<u32>> {
    if code.is_empty() || code.len() % 4 != 0 {
        return Err(RendererError::DeviceCapability(format!(
            "shader bytecode length {} is not a non-zero multiple of 4",
            code.len()
        )));
    }
    let words = ash::util::read_spv(&mut Cursor::new(code))
        .map_err(|e| RendererError::DeviceCapability(format!("reading SPIR-V: {e}")))?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(RendererError::DeviceCapability(
            "shader bytecode lacks the SPIR-V magic number".to_string(),
        ));
    }
    Ok(words)
}

fn create_shader_module(device: &Device, code: &[u8]) -> Result<vk::ShaderModule> {
    let words = spirv_words(code)?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
    let module = unsafe { device.raw().create_shader_module(&create_info, None) };
    module.map_err(|e| {
        error!("Failed to create shader module: {:?}", e);
        RendererError::DeviceCapability(format!("creating shader module: {e}"))
    })
}

/// The single pipeline every drawable is rendered with: colored line lists, depth
/// tested, one uniform buffer at set 0 / binding 0.
pub struct LinePipeline {
    device: Arc<Device>,
    descriptor_set_layout: vk::DescriptorSetLayout,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl LinePipeline {
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
        vertex_spv: &[u8],
        fragment_spv: &[u8],
    ) -> Result<Self> {
        let ubo_binding = vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX);
        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(std::slice::from_ref(&ubo_binding));
        let descriptor_set_layout = unsafe {
            device
                .raw()
                .create_descriptor_set_layout(&set_layout_info, None)
                .map_err(|e| RendererError::fatal("creating descriptor set layout", e))?
        };

        let set_layouts = [descriptor_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = match unsafe { device.raw().create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                unsafe {
                    device
                        .raw()
                        .destroy_descriptor_set_layout(descriptor_set_layout, None)
                };
                return Err(RendererError::fatal("creating pipeline layout", e));
            }
        };

        // Owns the layouts from here on, so any early return below releases them.
        let mut this = Self {
            device,
            descriptor_set_layout,
            layout,
            pipeline: vk::Pipeline::null(),
        };
        this.pipeline = this.create_pipeline(color_format, depth_format, vertex_spv, fragment_spv)?;
        debug!(
            "Line pipeline created (color {:?}, depth {:?})",
            color_format, depth_format
        );
        Ok(this)
    }

    fn create_pipeline(
        &self,
        color_format: vk::Format,
        depth_format: vk::Format,
        vertex_spv: &[u8],
        fragment_spv: &[u8],
    ) -> Result<vk::Pipeline> {
        let device = self.device.raw();
        let vert_module = create_shader_module(&self.device, vertex_spv)?;
        let frag_module = match create_shader_module(&self.device, fragment_spv) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_module, None) };
                return Err(e);
            }
        };

        let entry_point = c"main";
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(entry_point),
        ];

        let binding_description = Vertex::get_binding_description();
        let attribute_descriptions = Vertex::get_attribute_descriptions();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(std::slice::from_ref(&binding_description))
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::LINE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(std::slice::from_ref(&color_format))
            .depth_attachment_format(depth_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .push_next(&mut rendering_info);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        unsafe {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        }

        let pipelines = created.map_err(|(_, e)| RendererError::fatal("creating line pipeline", e))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RendererError::Fatal("driver returned no pipeline".to_string()))
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptor_set_layout
    }
}

impl Drop for LinePipeline {
    fn drop(&mut self) {
        debug!("Destroying line pipeline");
        unsafe {
            let device = self.device.raw();
            if self.pipeline != vk::Pipeline::null() {
                device.destroy_pipeline(self.pipeline, None);
            }
            device.destroy_pipeline_layout(self.layout, None);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_truncated_bytecode() {
        assert!(matches!(spirv_words(&[]), Err(RendererError::DeviceCapability(_))));
        assert!(matches!(
            spirv_words(&[0x03, 0x02, 0x23, 0x07, 0x00]),
            Err(RendererError::DeviceCapability(_))
        ));
    }

    #[test]
    fn rejects_missing_magic() {
        assert!(matches!(
            spirv_words(&[0u8; 8]),
            Err(RendererError::DeviceCapability(_))
        ));
    }

    #[test]
    fn accepts_little_endian_module_header() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, [SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn compiled_shaders_are_valid_modules() {
        assert!(spirv_words(GRID_VERT_SPV).is_ok());
        assert!(spirv_words(GRID_FRAG_SPV).is_ok());
    }
}
