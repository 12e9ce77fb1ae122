// SPDX-License-Identifier: CEPL-1.0
//! Everything whose shape follows the swapchain. Rebuilt as a unit.

use anyhow::Result;
use ash::vk;
use meshview_render::{RenderSize, ShaderSource};
use tracing::info;

use crate::buffer::GpuBuffer;
use crate::commands::{CommandBuffers, CommandPool};
use crate::context::DeviceContext;
use crate::descriptor::DescriptorPool;
use crate::frame::PassKind;
use crate::framebuffer::Framebuffer;
use crate::image::{GpuImage, ImageSpec};
use crate::pipeline::{Pipeline, PipelineSpec};
use crate::render_pass::{RenderPass, RenderPassSpec};
use crate::scene::{SceneResources, SetLayouts};
use crate::surface::Surface;
use crate::swapchain::Swapchain;
use crate::uniforms::{CameraUbo, LightUbo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetParams {
  pub samples: vk::SampleCountFlags,
  pub shadow_map_size: u32,
}

pub struct Passes {
  pub scene: RenderPass,
  pub wireframe: RenderPass,
  pub shadow: RenderPass,
  pub gui: RenderPass,
}

pub struct Pipelines {
  pub scene: Pipeline,
  pub scene_no_lighting: Pipeline,
  pub wireframe: Pipeline,
  pub shadow: Pipeline,
}

pub struct Uniforms {
  pub camera: Vec<GpuBuffer>,
  pub light: Vec<GpuBuffer>,
}

pub struct Pools {
  scene: DescriptorPool,
  camera: DescriptorPool,
  light: DescriptorPool,
}

/// Per swapchain image unless noted.
#[derive(Clone, Debug, Default)]
pub struct Sets {
  pub scene: Vec<vk::DescriptorSet>,
  pub scene_no_shadow: Vec<vk::DescriptorSet>,
  pub camera: Vec<vk::DescriptorSet>,
  pub light: Vec<vk::DescriptorSet>,
}

pub struct Framebuffers {
  pub scene: Vec<Framebuffer>,
  pub wireframe: Vec<Framebuffer>,
  pub gui: Vec<Framebuffer>,
  /// One shared shadow map.
  pub shadow: Framebuffer,
}

pub struct Attachments {
  /// Absent without multisampling; the scene pass then draws straight into
  /// the swapchain image.
  pub color: Option<GpuImage>,
  pub depth: GpuImage,
  pub shadow: GpuImage,
}

/// Scene and wireframe passes share an attachment list.
pub fn scene_views(color: Option<vk::ImageView>, depth: vk::ImageView, swapchain: vk::ImageView) -> Vec<vk::ImageView> {
  match color {
    Some(c) => vec![c, depth, swapchain],
    None => vec![swapchain, depth],
  }
}

pub struct SwapchainTargets {
  // STRICT TEARDOWN ORDER: fields drop top to bottom, users before what they use.
  pub framebuffers: Framebuffers,
  pub attachments: Attachments,
  commands: CommandBuffers,
  pub pipelines: Pipelines,
  pub passes: Passes,
  pub uniforms: Uniforms,
  _pools: Pools,
  pub sets: Sets,
  pub swapchain: Swapchain,
  pub shadow_extent: vk::Extent2D,
}

impl SwapchainTargets {
  pub fn build(
    ctx: &DeviceContext,
    surface: &Surface,
    size: RenderSize,
    scene: &SceneResources,
    shaders: &dyn ShaderSource,
    command_pool: &CommandPool,
    params: TargetParams,
  ) -> Result<Self> {
    let device = &ctx.device;
    let swapchain = Swapchain::new(ctx, surface, size)?;
    let n = swapchain.image_count() as u32;
    let extent = swapchain.extent();
    let color_format = swapchain.format();
    let depth_format = scene.depth_format();
    let samples = params.samples;
    let layouts = scene.layouts();

    // --- Descriptor pools ---
    let ubo = |count: u32| vk::DescriptorPoolSize {
      ty: vk::DescriptorType::UNIFORM_BUFFER,
      descriptor_count: count,
    };
    let pools = Pools {
      scene: DescriptorPool::new(
        device,
        3 * n,
        &[
          ubo(3 * n),
          ubo(3 * n),
          vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 3 * n,
          },
        ],
      )?,
      camera: DescriptorPool::new(device, n, &[ubo(n)])?,
      light: DescriptorPool::new(device, n, &[ubo(n)])?,
    };

    // --- Uniform buffers ---
    let mut uniforms = Uniforms {
      camera: Vec::with_capacity(n as usize),
      light: Vec::with_capacity(n as usize),
    };
    for i in 0..n {
      let cam = GpuBuffer::uniform::<CameraUbo>(ctx)?;
      let light = GpuBuffer::uniform::<LightUbo>(ctx)?;
      device.set_name(cam.raw(), &format!("camera ubo {i}"));
      device.set_name(light.raw(), &format!("light ubo {i}"));
      uniforms.camera.push(cam);
      uniforms.light.push(light);
    }

    // --- Render passes ---
    let passes = Passes {
      scene: RenderPass::new(device, &RenderPassSpec::scene(color_format, depth_format, samples), "scene pass")?,
      wireframe: RenderPass::new(
        device,
        &RenderPassSpec::wireframe(color_format, depth_format, samples),
        "wireframe pass",
      )?,
      shadow: RenderPass::new(device, &RenderPassSpec::shadow(depth_format), "shadow pass")?,
      gui: RenderPass::new(device, &RenderPassSpec::gui(color_format), "gui pass")?,
    };

    // --- Pipelines ---
    let shadow_extent = vk::Extent2D {
      width: params.shadow_map_size,
      height: params.shadow_map_size,
    };
    let lit_layouts = vec![layouts.scene.raw(), layouts.material.raw()];
    let pipelines = Pipelines {
      scene: Pipeline::new(
        device,
        shaders,
        &PipelineSpec::new("scene", extent, passes.scene.raw(), lit_layouts.clone()).samples(samples),
      )?,
      scene_no_lighting: Pipeline::new(
        device,
        shaders,
        &PipelineSpec::new("scene_no_lighting", extent, passes.scene.raw(), lit_layouts).samples(samples),
      )?,
      wireframe: Pipeline::new(
        device,
        shaders,
        &PipelineSpec::new("wireframe", extent, passes.wireframe.raw(), vec![layouts.camera.raw()])
          .samples(samples)
          .wireframe(),
      )?,
      shadow: Pipeline::new(
        device,
        shaders,
        &PipelineSpec::new("shadow", shadow_extent, passes.shadow.raw(), vec![layouts.light.raw()])
          .depth_only(),
      )?,
    };

    let commands = command_pool.allocate(n * PassKind::COUNT as u32)?;

    // --- Attachments ---
    let multisampled = samples != vk::SampleCountFlags::TYPE_1;
    let color = if multisampled {
      let img = GpuImage::new(ctx, ImageSpec::color_target(extent, color_format, samples))?;
      img.set_name("msaa color");
      Some(img)
    } else {
      None
    };
    let depth = GpuImage::new(ctx, ImageSpec::depth_target(extent, depth_format, samples))?;
    depth.set_name("depth");
    let shadow = GpuImage::new(ctx, ImageSpec::shadow_map(params.shadow_map_size, depth_format))?;
    shadow.set_name("shadow map");
    let attachments = Attachments { color, depth, shadow };

    // --- Framebuffers ---
    let color_view = attachments.color.as_ref().map(GpuImage::view);
    let mut framebuffers = Framebuffers {
      scene: Vec::with_capacity(n as usize),
      wireframe: Vec::with_capacity(n as usize),
      gui: Vec::with_capacity(n as usize),
      shadow: Framebuffer::new(device, &passes.shadow, &[attachments.shadow.view()], shadow_extent)?,
    };
    for &view in swapchain.views() {
      let views = scene_views(color_view, attachments.depth.view(), view);
      framebuffers.scene.push(Framebuffer::new(device, &passes.scene, &views, extent)?);
      framebuffers
        .wireframe
        .push(Framebuffer::new(device, &passes.wireframe, &views, extent)?);
      framebuffers.gui.push(Framebuffer::new(device, &passes.gui, &[view], extent)?);
    }

    // --- Descriptor sets ---
    let shadow_info = scene.shadow_info(attachments.shadow.view());
    let default_shadow = scene.default_shadow_info();
    let per_image = |shadow: vk::DescriptorImageInfo| -> Vec<_> {
      uniforms
        .camera
        .iter()
        .zip(&uniforms.light)
        .map(|(c, l)| SetLayouts::scene_bindings(c.descriptor_info(), l.descriptor_info(), shadow))
        .collect()
    };
    let sets = Sets {
      scene: pools.scene.create_sets(&layouts.scene, &per_image(shadow_info))?,
      scene_no_shadow: pools.scene.create_sets(&layouts.scene, &per_image(default_shadow))?,
      camera: pools.camera.create_sets(
        &layouts.camera,
        &uniforms
          .camera
          .iter()
          .map(|b| SetLayouts::uniform_bindings(b.descriptor_info()))
          .collect::<Vec<_>>(),
      )?,
      light: pools.light.create_sets(
        &layouts.light,
        &uniforms
          .light
          .iter()
          .map(|b| SetLayouts::uniform_bindings(b.descriptor_info()))
          .collect::<Vec<_>>(),
      )?,
    };

    info!(
      "targets ready: {}x{}, {} images, msaa x{}, shadow {}",
      extent.width,
      extent.height,
      n,
      samples.as_raw(),
      params.shadow_map_size
    );

    Ok(Self {
      framebuffers,
      attachments,
      commands,
      pipelines,
      passes,
      uniforms,
      _pools: pools,
      sets,
      swapchain,
      shadow_extent,
    })
  }

  pub fn image_count(&self) -> usize {
    self.swapchain.image_count()
  }

  pub fn extent(&self) -> vk::Extent2D {
    self.swapchain.extent()
  }

  pub fn command(&self, image: usize, kind: PassKind) -> vk::CommandBuffer {
    self.commands.get(image * PassKind::COUNT + kind.index())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scene_views_follow_pass_order() {
    let [c, d, s] = [1u64, 2, 3].map(<vk::ImageView as vk::Handle>::from_raw);
    assert_eq!(scene_views(Some(c), d, s), vec![c, d, s]);
    assert_eq!(scene_views(None, d, s), vec![s, d]);

    let samples = vk::SampleCountFlags::TYPE_4;
    let f = vk::Format::B8G8R8A8_SRGB;
    let df = vk::Format::D32_SFLOAT;
    assert_eq!(
      RenderPassSpec::scene(f, df, samples).attachment_count(),
      scene_views(Some(c), d, s).len()
    );
    assert_eq!(
      RenderPassSpec::scene(f, df, vk::SampleCountFlags::TYPE_1).attachment_count(),
      scene_views(None, d, s).len()
    );
  }
}
