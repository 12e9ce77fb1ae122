// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use ash::vk;

/// Handles an immediate-mode GUI backend needs to create its own pipeline
/// and font atlas.
pub struct GuiInit<'a> {
  pub instance: &'a ash::Instance,
  pub physical: vk::PhysicalDevice,
  pub device: &'a ash::Device,
  pub queue_family: u32,
  pub queue: vk::Queue,
  /// Reserved for the overlay; the renderer never allocates from it.
  pub descriptor_pool: vk::DescriptorPool,
  pub render_pass: vk::RenderPass,
  pub image_count: u32,
}

/// Draws on top of the finished frame inside the gui render pass.
///
/// The renderer begins and ends the pass around [`GuiOverlay::record`] and
/// submits the buffer last; it never inspects what the overlay records.
pub trait GuiOverlay {
  fn init(&mut self, init: &GuiInit<'_>) -> Result<()>;

  /// The swapchain was rebuilt; the previous render pass is gone.
  fn render_pass_changed(&mut self, render_pass: vk::RenderPass, image_count: u32) -> Result<()>;

  fn record(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()>;
}

/// Records nothing; the gui pass then only moves the image to present.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOverlay;

impl GuiOverlay for NoOverlay {
  fn init(&mut self, _init: &GuiInit<'_>) -> Result<()> {
    Ok(())
  }

  fn render_pass_changed(&mut self, _render_pass: vk::RenderPass, _image_count: u32) -> Result<()> {
    Ok(())
  }

  fn record(&mut self, _device: &ash::Device, _cmd: vk::CommandBuffer) -> Result<()> {
    Ok(())
  }
}
