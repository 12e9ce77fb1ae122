// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;
use std::mem::{offset_of, size_of};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use ash::util::read_spv;
use ash::vk;
use meshview_render::{ShaderSource, ShaderStage, Vertex};

use crate::context::Device;

/// Fixed-function state for one graphics pipeline. Viewport and scissor are
/// baked from `extent`, so pipelines are rebuilt with the swapchain.
#[derive(Clone, Debug)]
pub struct PipelineSpec<'a> {
  pub program: &'a str,
  pub extent: vk::Extent2D,
  pub samples: vk::SampleCountFlags,
  pub polygon_mode: vk::PolygonMode,
  pub cull_mode: vk::CullModeFlags,
  pub depth_compare: vk::CompareOp,
  /// Sample shading is enabled with this minimum fraction.
  pub min_sample_shading: f32,
  pub set_layouts: Vec<vk::DescriptorSetLayout>,
  pub render_pass: vk::RenderPass,
  /// The pass's subpass writes a colour attachment.
  pub color_output: bool,
}

impl<'a> PipelineSpec<'a> {
  pub fn new(
    program: &'a str,
    extent: vk::Extent2D,
    render_pass: vk::RenderPass,
    set_layouts: Vec<vk::DescriptorSetLayout>,
  ) -> Self {
    Self {
      program,
      extent,
      samples: vk::SampleCountFlags::TYPE_1,
      polygon_mode: vk::PolygonMode::FILL,
      cull_mode: vk::CullModeFlags::BACK,
      depth_compare: vk::CompareOp::LESS,
      min_sample_shading: 0.2,
      set_layouts,
      render_pass,
      color_output: true,
    }
  }

  pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
    self.samples = samples;
    self
  }

  /// Lines, no culling.
  pub fn wireframe(mut self) -> Self {
    self.polygon_mode = vk::PolygonMode::LINE;
    self.cull_mode = vk::CullModeFlags::NONE;
    self
  }

  /// Depth-only: no colour output.
  pub fn depth_only(mut self) -> Self {
    self.color_output = false;
    self
  }
}

pub fn vertex_binding() -> vk::VertexInputBindingDescription {
  vk::VertexInputBindingDescription {
    binding: 0,
    stride: size_of::<Vertex>() as u32,
    input_rate: vk::VertexInputRate::VERTEX,
  }
}

pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 5] {
  let attr = |location: u32, format: vk::Format, offset: usize| vk::VertexInputAttributeDescription {
    location,
    binding: 0,
    format,
    offset: offset as u32,
  };
  [
    attr(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, pos)),
    attr(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
    attr(2, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, tex_coord)),
    attr(3, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
    attr(4, vk::Format::R32_SINT, offset_of!(Vertex, material_id)),
  ]
}

fn shader_module(device: &ash::Device, bytes: &[u8]) -> Result<vk::ShaderModule> {
  let code = read_spv(&mut Cursor::new(bytes)).context("read_spv")?;
  let ci = vk::ShaderModuleCreateInfo {
    s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
    p_code: code.as_ptr(),
    code_size: code.len() * 4,
    ..Default::default()
  };
  unsafe { device.create_shader_module(&ci, None) }.context("create_shader_module")
}

/// Graphics pipeline and the layout it was built against.
pub struct Pipeline {
  device: Arc<Device>,
  raw: vk::Pipeline,
  layout: vk::PipelineLayout,
}

impl Pipeline {
  pub fn new(device: &Arc<Device>, shaders: &dyn ShaderSource, spec: &PipelineSpec<'_>) -> Result<Self> {
    let Some(vs_bytes) = shaders.spirv(spec.program, ShaderStage::Vertex) else {
      bail!("program `{}` has no vertex stage", spec.program);
    };
    let fs_bytes = shaders.spirv(spec.program, ShaderStage::Fragment);
    if spec.color_output && fs_bytes.is_none() {
      bail!("program `{}` has no fragment stage", spec.program);
    }

    // --- Shader modules (destroyed once the pipeline exists) ---
    let mut modules = Vec::with_capacity(2);
    let built = (|| -> Result<Self> {
      let vs = shader_module(device, vs_bytes)?;
      modules.push(vs);
      let fs = match fs_bytes {
        Some(b) => {
          let m = shader_module(device, b)?;
          modules.push(m);
          Some(m)
        }
        None => None,
      };
      let entry = c"main";
      let mut stages = vec![vk::PipelineShaderStageCreateInfo {
        s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
        stage: vk::ShaderStageFlags::VERTEX,
        module: vs,
        p_name: entry.as_ptr(),
        ..Default::default()
      }];
      if let Some(fs) = fs {
        stages.push(vk::PipelineShaderStageCreateInfo {
          s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
          stage: vk::ShaderStageFlags::FRAGMENT,
          module: fs,
          p_name: entry.as_ptr(),
          ..Default::default()
        });
      }

      // --- Fixed-function state ---
      let vb = vertex_binding();
      let va = vertex_attributes();
      let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &vb,
        vertex_attribute_description_count: va.len() as u32,
        p_vertex_attribute_descriptions: va.as_ptr(),
        ..Default::default()
      };
      let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
      };
      let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: spec.extent.width as f32,
        height: spec.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
      };
      let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: spec.extent,
      };
      let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &viewport,
        scissor_count: 1,
        p_scissors: &scissor,
        ..Default::default()
      };
      let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        depth_clamp_enable: vk::FALSE,
        rasterizer_discard_enable: vk::FALSE,
        polygon_mode: spec.polygon_mode,
        cull_mode: spec.cull_mode,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        depth_bias_enable: vk::FALSE,
        line_width: 1.0,
        ..Default::default()
      };
      let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: spec.samples,
        sample_shading_enable: vk::TRUE,
        min_sample_shading: spec.min_sample_shading,
        ..Default::default()
      };
      let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: spec.depth_compare,
        depth_bounds_test_enable: vk::FALSE,
        stencil_test_enable: vk::FALSE,
        ..Default::default()
      };
      let blend_attachment = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        blend_enable: vk::FALSE,
        ..Default::default()
      };
      let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        logic_op_enable: vk::FALSE,
        attachment_count: spec.color_output as u32,
        p_attachments: &blend_attachment,
        ..Default::default()
      };

      let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: spec.set_layouts.len() as u32,
        p_set_layouts: spec.set_layouts.as_ptr(),
        ..Default::default()
      };
      let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
        .context("create_pipeline_layout")?;

      let info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        layout,
        render_pass: spec.render_pass,
        subpass: 0,
        ..Default::default()
      };
      let raw = match unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
      } {
        Ok(p) => p[0],
        Err((_, err)) => {
          unsafe { device.destroy_pipeline_layout(layout, None) };
          return Err(anyhow!("create_graphics_pipelines({}) failed: {:?}", spec.program, err));
        }
      };
      device.set_name(raw, spec.program);
      Ok(Self {
        device: Arc::clone(device),
        raw,
        layout,
      })
    })();

    for m in modules {
      unsafe { device.destroy_shader_module(m, None) };
    }
    built
  }

  pub fn raw(&self) -> vk::Pipeline {
    self.raw
  }

  pub fn layout(&self) -> vk::PipelineLayout {
    self.layout
  }
}

impl Drop for Pipeline {
  fn drop(&mut self) {
    unsafe {
      self.device.destroy_pipeline(self.raw, None);
      self.device.destroy_pipeline_layout(self.layout, None);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_follow_the_scene_pipeline() {
    let spec = PipelineSpec::new(
      "scene",
      vk::Extent2D { width: 4, height: 4 },
      vk::RenderPass::null(),
      vec![],
    );
    assert_eq!(spec.cull_mode, vk::CullModeFlags::BACK);
    assert_eq!(spec.depth_compare, vk::CompareOp::LESS);
    assert_eq!(spec.polygon_mode, vk::PolygonMode::FILL);
    assert_eq!(spec.min_sample_shading, 0.2);
    assert!(spec.color_output);

    let wire = spec.clone().wireframe();
    assert_eq!(wire.polygon_mode, vk::PolygonMode::LINE);
    assert_eq!(wire.cull_mode, vk::CullModeFlags::NONE);
    assert_eq!(wire.depth_compare, vk::CompareOp::LESS);

    assert!(!spec.depth_only().color_output);
  }

  #[test]
  fn attributes_cover_the_whole_vertex() {
    let attrs = vertex_attributes();
    assert_eq!(vertex_binding().stride, 48);
    let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
    assert_eq!(offsets, vec![0, 12, 24, 32, 44]);
    assert_eq!(attrs[4].format, vk::Format::R32_SINT);
  }
}
