// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::frame::PassKind;
use crate::gui::GuiOverlay;
use crate::pipeline::Pipeline;
use crate::scene::SceneResources;
use crate::targets::SwapchainTargets;

/// What a pre-recorded scene-pass buffer draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Draw {
  Nothing,
  /// Every material group with its own material set.
  Materials,
  /// All indices with material 0.
  Blank,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
  Scene,
  Wireframe,
  Shadow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SceneSet {
  Shadowed,
  Unshadowed,
}

/// How each static buffer is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Recipe {
  pass: Pass,
  draw: Draw,
  lit: bool,
  set: SceneSet,
}

fn recipe(kind: PassKind) -> Option<Recipe> {
  let scene = |draw, lit, set| Recipe {
    pass: Pass::Scene,
    draw,
    lit,
    set,
  };
  Some(match kind {
    PassKind::Default => scene(Draw::Nothing, true, SceneSet::Unshadowed),
    PassKind::Scene => scene(Draw::Materials, true, SceneSet::Shadowed),
    PassKind::SceneNoShadow => scene(Draw::Materials, true, SceneSet::Unshadowed),
    PassKind::SceneBlank => scene(Draw::Blank, true, SceneSet::Shadowed),
    PassKind::SceneNoShadowBlank => scene(Draw::Blank, false, SceneSet::Unshadowed),
    PassKind::Wireframe => Recipe {
      pass: Pass::Wireframe,
      ..scene(Draw::Blank, false, SceneSet::Unshadowed)
    },
    PassKind::Shadow => Recipe {
      pass: Pass::Shadow,
      ..scene(Draw::Blank, false, SceneSet::Unshadowed)
    },
    PassKind::Gui => return None,
  })
}

fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
  [
    vk::ClearValue {
      color: vk::ClearColorValue { float32: color },
    },
    vk::ClearValue {
      depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
    },
  ]
}

/// Re-records every static buffer of every swapchain image. The caller
/// makes sure none of them is pending.
pub fn record_static(
  device: &ash::Device,
  targets: &SwapchainTargets,
  scene: &SceneResources,
  clear_color: [f32; 4],
) -> Result<()> {
  for image in 0..targets.image_count() {
    for kind in PassKind::STATIC {
      if let Some(r) = recipe(kind) {
        let cmd = targets.command(image, kind);
        record_one(device, cmd, targets, scene, image, r, clear_color)
          .with_context(|| format!("record {kind:?} for image {image}"))?;
      }
    }
  }
  Ok(())
}

fn record_one(
  device: &ash::Device,
  cmd: vk::CommandBuffer,
  targets: &SwapchainTargets,
  scene: &SceneResources,
  image: usize,
  r: Recipe,
  clear_color: [f32; 4],
) -> Result<()> {
  let clears = clear_values(clear_color);
  let (render_pass, framebuffer, extent, clears): (_, _, _, &[vk::ClearValue]) = match r.pass {
    Pass::Scene => (
      targets.passes.scene.raw(),
      targets.framebuffers.scene[image].raw(),
      targets.extent(),
      &clears[..],
    ),
    Pass::Wireframe => (
      targets.passes.wireframe.raw(),
      targets.framebuffers.wireframe[image].raw(),
      targets.extent(),
      &clears[..],
    ),
    Pass::Shadow => (
      targets.passes.shadow.raw(),
      targets.framebuffers.shadow.raw(),
      targets.shadow_extent,
      &clears[1..],
    ),
  };

  unsafe {
    device
      .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
      .context("reset_command_buffer")?;
    let bi = vk::CommandBufferBeginInfo {
      s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
      ..Default::default()
    };
    device.begin_command_buffer(cmd, &bi).context("begin_command_buffer")?;

    let rpbi = vk::RenderPassBeginInfo {
      s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
      render_pass,
      framebuffer,
      render_area: vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
      },
      clear_value_count: clears.len() as u32,
      p_clear_values: clears.as_ptr(),
      ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rpbi, vk::SubpassContents::INLINE);

    if r.draw != Draw::Nothing {
      let (pipeline, set0): (&Pipeline, vk::DescriptorSet) = match r.pass {
        Pass::Scene => {
          let p = if r.lit {
            &targets.pipelines.scene
          } else {
            &targets.pipelines.scene_no_lighting
          };
          let set = match r.set {
            SceneSet::Shadowed => targets.sets.scene[image],
            SceneSet::Unshadowed => targets.sets.scene_no_shadow[image],
          };
          (p, set)
        }
        Pass::Wireframe => (&targets.pipelines.wireframe, targets.sets.camera[image]),
        Pass::Shadow => (&targets.pipelines.shadow, targets.sets.light[image]),
      };

      device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.raw());
      device.cmd_bind_vertex_buffers(cmd, 0, &[scene.vertex_buffer()], &[0]);
      device.cmd_bind_index_buffer(cmd, scene.index_buffer(), 0, vk::IndexType::UINT32);
      device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        pipeline.layout(),
        0,
        &[set0],
        &[],
      );

      let with_material = r.pass == Pass::Scene;
      match r.draw {
        Draw::Materials => {
          for g in scene.groups() {
            device.cmd_bind_descriptor_sets(
              cmd,
              vk::PipelineBindPoint::GRAPHICS,
              pipeline.layout(),
              1,
              &[scene.material_set(g.material_id)],
              &[],
            );
            device.cmd_draw_indexed(cmd, g.index_count, 1, g.index_base, 0, 0);
          }
        }
        Draw::Blank => {
          if with_material {
            device.cmd_bind_descriptor_sets(
              cmd,
              vk::PipelineBindPoint::GRAPHICS,
              pipeline.layout(),
              1,
              &[scene.material_set(0)],
              &[],
            );
          }
          device.cmd_draw_indexed(cmd, scene.index_count(), 1, 0, 0, 0);
        }
        Draw::Nothing => {}
      }
    }

    device.cmd_end_render_pass(cmd);
    device.end_command_buffer(cmd).context("end_command_buffer")?;
  }
  Ok(())
}

/// Re-records image `image`'s gui buffer around the overlay's draw calls.
pub fn record_gui(
  device: &ash::Device,
  targets: &SwapchainTargets,
  image: usize,
  overlay: &mut dyn GuiOverlay,
) -> Result<()> {
  let cmd = targets.command(image, PassKind::Gui);
  unsafe {
    device
      .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
      .context("reset gui command buffer")?;
    let bi = vk::CommandBufferBeginInfo {
      s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
      flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
      ..Default::default()
    };
    device.begin_command_buffer(cmd, &bi).context("begin gui command buffer")?;
    let rpbi = vk::RenderPassBeginInfo {
      s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
      render_pass: targets.passes.gui.raw(),
      framebuffer: targets.framebuffers.gui[image].raw(),
      render_area: vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: targets.extent(),
      },
      ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rpbi, vk::SubpassContents::INLINE);
  }
  overlay.record(device, cmd)?;
  unsafe {
    device.cmd_end_render_pass(cmd);
    device.end_command_buffer(cmd).context("end gui command buffer")?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_static_kind_has_a_recipe() {
    for kind in PassKind::STATIC {
      assert!(recipe(kind).is_some(), "{kind:?}");
    }
    assert!(recipe(PassKind::Gui).is_none());
  }

  #[test]
  fn blank_variants_pick_pipeline_and_shadow_set() {
    let blank = recipe(PassKind::SceneBlank).unwrap();
    assert_eq!((blank.lit, blank.set, blank.draw), (true, SceneSet::Shadowed, Draw::Blank));

    let flat = recipe(PassKind::SceneNoShadowBlank).unwrap();
    assert_eq!((flat.lit, flat.set, flat.draw), (false, SceneSet::Unshadowed, Draw::Blank));

    assert_eq!(recipe(PassKind::Scene).unwrap().draw, Draw::Materials);
    assert_eq!(recipe(PassKind::Default).unwrap().draw, Draw::Nothing);
    assert_eq!(recipe(PassKind::Shadow).unwrap().pass, Pass::Shadow);
  }

  #[test]
  fn shadow_pass_clears_depth_only() {
    let clears = clear_values([0.1, 0.2, 0.3, 1.0]);
    let depth = unsafe { clears[1].depth_stencil };
    assert_eq!(depth.depth, 1.0);
    let color = unsafe { clears[0].color.float32 };
    assert_eq!(color, [0.1, 0.2, 0.3, 1.0]);
  }
}
