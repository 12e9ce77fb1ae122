// SPDX-License-Identifier: CEPL-1.0
//! Single-subpass render passes described as data.
//!
//! Attachments are numbered in a fixed order: colour, then depth, then
//! resolve, skipping any that are absent. Framebuffers must list their views
//! in the same order.

use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;

use crate::context::Device;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentSpec {
  pub format: vk::Format,
  pub samples: vk::SampleCountFlags,
  pub load_op: vk::AttachmentLoadOp,
  pub store_op: vk::AttachmentStoreOp,
  pub stencil_load_op: vk::AttachmentLoadOp,
  pub stencil_store_op: vk::AttachmentStoreOp,
  pub initial_layout: vk::ImageLayout,
  pub final_layout: vk::ImageLayout,
}

impl AttachmentSpec {
  pub fn color(format: vk::Format, samples: vk::SampleCountFlags) -> Self {
    Self {
      format,
      samples,
      load_op: vk::AttachmentLoadOp::CLEAR,
      store_op: vk::AttachmentStoreOp::STORE,
      stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
      stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
      initial_layout: vk::ImageLayout::UNDEFINED,
      final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }
  }

  pub fn depth(format: vk::Format, samples: vk::SampleCountFlags) -> Self {
    Self {
      format,
      samples,
      load_op: vk::AttachmentLoadOp::CLEAR,
      store_op: vk::AttachmentStoreOp::STORE,
      stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
      stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
      initial_layout: vk::ImageLayout::UNDEFINED,
      final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    }
  }

  pub fn resolve(format: vk::Format) -> Self {
    Self {
      load_op: vk::AttachmentLoadOp::DONT_CARE,
      ..Self::color(format, vk::SampleCountFlags::TYPE_1)
    }
  }

  /// Keeps what an earlier pass left in the attachment.
  pub fn loading(mut self) -> Self {
    self.load_op = vk::AttachmentLoadOp::LOAD;
    self.initial_layout = self.final_layout;
    self
  }

  fn describe(&self) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
      format: self.format,
      samples: self.samples,
      load_op: self.load_op,
      store_op: self.store_op,
      stencil_load_op: self.stencil_load_op,
      stencil_store_op: self.stencil_store_op,
      initial_layout: self.initial_layout,
      final_layout: self.final_layout,
      ..Default::default()
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DependencySpec {
  pub src_subpass: u32,
  pub dst_subpass: u32,
  pub src_stage: vk::PipelineStageFlags,
  pub dst_stage: vk::PipelineStageFlags,
  pub src_access: vk::AccessFlags,
  pub dst_access: vk::AccessFlags,
}

impl Default for DependencySpec {
  /// External to subpass 0, waiting on earlier colour output and depth tests.
  fn default() -> Self {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
      | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    Self {
      src_subpass: vk::SUBPASS_EXTERNAL,
      dst_subpass: 0,
      src_stage: stages,
      dst_stage: stages,
      src_access: vk::AccessFlags::empty(),
      dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderPassSpec {
  pub color: Option<AttachmentSpec>,
  pub depth: Option<AttachmentSpec>,
  pub resolve: Option<AttachmentSpec>,
  pub dependencies: Vec<DependencySpec>,
}

/// Attachment descriptions in framebuffer order plus each role's index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentPlan {
  pub attachments: Vec<AttachmentSpec>,
  pub color: Option<u32>,
  pub depth: Option<u32>,
  pub resolve: Option<u32>,
}

impl RenderPassSpec {
  pub fn plan(&self) -> AttachmentPlan {
    let mut attachments = Vec::with_capacity(3);
    let mut push = |a: Option<AttachmentSpec>| {
      a.map(|a| {
        attachments.push(a);
        attachments.len() as u32 - 1
      })
    };
    let color = push(self.color);
    let depth = push(self.depth);
    let resolve = push(self.resolve);
    AttachmentPlan {
      attachments,
      color,
      depth,
      resolve,
    }
  }

  pub fn attachment_count(&self) -> usize {
    [self.color, self.depth, self.resolve]
      .iter()
      .filter(|a| a.is_some())
      .count()
  }

  /// Clears colour and depth, resolves into the swapchain image when
  /// multisampled.
  pub fn scene(color: vk::Format, depth: vk::Format, samples: vk::SampleCountFlags) -> Self {
    let multisampled = samples != vk::SampleCountFlags::TYPE_1;
    Self {
      color: Some(AttachmentSpec::color(color, samples)),
      depth: Some(AttachmentSpec::depth(depth, samples)),
      resolve: multisampled.then(|| AttachmentSpec::resolve(color)),
      dependencies: vec![DependencySpec::default()],
    }
  }

  /// Draws over what the scene pass left.
  pub fn wireframe(color: vk::Format, depth: vk::Format, samples: vk::SampleCountFlags) -> Self {
    let scene = Self::scene(color, depth, samples);
    Self {
      color: scene.color.map(AttachmentSpec::loading),
      depth: scene.depth.map(AttachmentSpec::loading),
      ..scene
    }
  }

  /// Depth only, left readable by the fragment stage of later passes.
  /// The map is shared by every frame in flight, so the depth writes also
  /// wait for earlier passes to finish sampling it.
  pub fn shadow(depth: vk::Format) -> Self {
    Self {
      color: None,
      depth: Some(AttachmentSpec {
        final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ..AttachmentSpec::depth(depth, vk::SampleCountFlags::TYPE_1)
      }),
      resolve: None,
      dependencies: vec![
        DependencySpec {
          src_subpass: vk::SUBPASS_EXTERNAL,
          dst_subpass: 0,
          src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
          dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
          src_access: vk::AccessFlags::SHADER_READ,
          dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        },
        DependencySpec {
          src_subpass: 0,
          dst_subpass: vk::SUBPASS_EXTERNAL,
          src_stage: vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
          dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
          src_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
          dst_access: vk::AccessFlags::SHADER_READ,
        },
      ],
    }
  }

  /// Overlay pass on the swapchain image; the last pass before present.
  pub fn gui(color: vk::Format) -> Self {
    Self {
      color: Some(AttachmentSpec {
        load_op: vk::AttachmentLoadOp::LOAD,
        initial_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..AttachmentSpec::color(color, vk::SampleCountFlags::TYPE_1)
      }),
      depth: None,
      resolve: None,
      dependencies: vec![DependencySpec {
        src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access: vk::AccessFlags::empty(),
        dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..DependencySpec::default()
      }],
    }
  }
}

pub struct RenderPass {
  device: Arc<Device>,
  raw: vk::RenderPass,
  attachment_count: usize,
}

impl RenderPass {
  pub fn new(device: &Arc<Device>, spec: &RenderPassSpec, name: &str) -> Result<Self> {
    let plan = spec.plan();
    let descriptions: Vec<vk::AttachmentDescription> =
      plan.attachments.iter().map(AttachmentSpec::describe).collect();

    let color_ref = plan.color.map(|i| vk::AttachmentReference {
      attachment: i,
      layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    });
    let depth_ref = plan.depth.map(|i| vk::AttachmentReference {
      attachment: i,
      layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    });
    let resolve_ref = plan.resolve.map(|i| vk::AttachmentReference {
      attachment: i,
      layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    });

    let subpass = vk::SubpassDescription {
      pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
      color_attachment_count: color_ref.is_some() as u32,
      p_color_attachments: color_ref.as_ref().map_or(std::ptr::null(), |r| r as *const _),
      p_resolve_attachments: resolve_ref.as_ref().map_or(std::ptr::null(), |r| r as *const _),
      p_depth_stencil_attachment: depth_ref.as_ref().map_or(std::ptr::null(), |r| r as *const _),
      ..Default::default()
    };
    let dependencies: Vec<vk::SubpassDependency> = spec
      .dependencies
      .iter()
      .map(|d| vk::SubpassDependency {
        src_subpass: d.src_subpass,
        dst_subpass: d.dst_subpass,
        src_stage_mask: d.src_stage,
        dst_stage_mask: d.dst_stage,
        src_access_mask: d.src_access,
        dst_access_mask: d.dst_access,
        dependency_flags: vk::DependencyFlags::empty(),
      })
      .collect();

    let ci = vk::RenderPassCreateInfo {
      s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
      attachment_count: descriptions.len() as u32,
      p_attachments: descriptions.as_ptr(),
      subpass_count: 1,
      p_subpasses: &subpass,
      dependency_count: dependencies.len() as u32,
      p_dependencies: dependencies.as_ptr(),
      ..Default::default()
    };
    let raw = unsafe { device.create_render_pass(&ci, None) }
      .with_context(|| format!("create_render_pass({name})"))?;
    device.set_name(raw, name);
    Ok(Self {
      device: Arc::clone(device),
      raw,
      attachment_count: descriptions.len(),
    })
  }

  pub fn raw(&self) -> vk::RenderPass {
    self.raw
  }

  pub fn attachment_count(&self) -> usize {
    self.attachment_count
  }
}

impl Drop for RenderPass {
  fn drop(&mut self) {
    unsafe { self.device.destroy_render_pass(self.raw, None) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const COLOR: vk::Format = vk::Format::B8G8R8A8_SRGB;
  const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

  #[test]
  fn scene_orders_color_depth_resolve() {
    let spec = RenderPassSpec::scene(COLOR, DEPTH, vk::SampleCountFlags::TYPE_8);
    let plan = spec.plan();
    assert_eq!((plan.color, plan.depth, plan.resolve), (Some(0), Some(1), Some(2)));
    assert_eq!(plan.attachments[2].samples, vk::SampleCountFlags::TYPE_1);
    assert_eq!(plan.attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(spec.attachment_count(), 3);
  }

  #[test]
  fn single_sample_scene_has_no_resolve() {
    let plan = RenderPassSpec::scene(COLOR, DEPTH, vk::SampleCountFlags::TYPE_1).plan();
    assert_eq!(plan.attachments.len(), 2);
    assert_eq!(plan.resolve, None);
  }

  #[test]
  fn shadow_is_depth_only_and_shader_readable() {
    let spec = RenderPassSpec::shadow(DEPTH);
    let plan = spec.plan();
    assert_eq!((plan.color, plan.depth, plan.resolve), (None, Some(0), None));
    assert_eq!(
      plan.attachments[0].final_layout,
      vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    );
    let [before, after] = spec.dependencies.as_slice() else {
      panic!("shadow pass needs an incoming and an outgoing dependency");
    };
    // earlier frames' scene passes finish sampling before depth is rewritten
    assert_eq!((before.src_subpass, before.dst_subpass), (vk::SUBPASS_EXTERNAL, 0));
    assert_eq!(before.src_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    assert_eq!(before.src_access, vk::AccessFlags::SHADER_READ);
    assert!(before.dst_stage.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    assert!(before.dst_stage.contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
    assert_eq!(before.dst_access, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);

    assert_eq!((after.src_subpass, after.dst_subpass), (0, vk::SUBPASS_EXTERNAL));
    assert_eq!(after.dst_access, vk::AccessFlags::SHADER_READ);
  }

  #[test]
  fn wireframe_loads_what_scene_stored() {
    let plan = RenderPassSpec::wireframe(COLOR, DEPTH, vk::SampleCountFlags::TYPE_4).plan();
    let (c, d) = (plan.attachments[0], plan.attachments[1]);
    assert_eq!(c.load_op, vk::AttachmentLoadOp::LOAD);
    assert_eq!(c.initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(d.load_op, vk::AttachmentLoadOp::LOAD);
    assert_eq!(d.initial_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
  }

  #[test]
  fn gui_ends_ready_to_present() {
    let plan = RenderPassSpec::gui(COLOR).plan();
    assert_eq!(plan.attachments.len(), 1);
    let c = plan.attachments[0];
    assert_eq!(c.load_op, vk::AttachmentLoadOp::LOAD);
    assert_eq!(c.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
  }
}
