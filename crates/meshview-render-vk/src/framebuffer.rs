// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use meshview_core::EngineError;

use crate::context::Device;
use crate::render_pass::RenderPass;

pub struct Framebuffer {
  device: Arc<Device>,
  raw: vk::Framebuffer,
}

/// `views` must match the pass's attachment order and count.
pub fn check_attachment_count(pass_attachments: usize, views: &[vk::ImageView]) -> Result<(), EngineError> {
  if pass_attachments != views.len() {
    return Err(EngineError::AttachmentMismatch {
      expected: pass_attachments,
      got: views.len(),
    });
  }
  Ok(())
}

impl Framebuffer {
  pub fn new(
    device: &Arc<Device>,
    pass: &RenderPass,
    views: &[vk::ImageView],
    extent: vk::Extent2D,
  ) -> Result<Self> {
    check_attachment_count(pass.attachment_count(), views)?;
    let ci = vk::FramebufferCreateInfo {
      s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
      render_pass: pass.raw(),
      attachment_count: views.len() as u32,
      p_attachments: views.as_ptr(),
      width: extent.width,
      height: extent.height,
      layers: 1,
      ..Default::default()
    };
    let raw = unsafe { device.create_framebuffer(&ci, None) }.context("create_framebuffer")?;
    Ok(Self {
      device: Arc::clone(device),
      raw,
    })
  }

  pub fn raw(&self) -> vk::Framebuffer {
    self.raw
  }
}

impl Drop for Framebuffer {
  fn drop(&mut self) {
    unsafe { self.device.destroy_framebuffer(self.raw, None) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn count_mismatch_is_reported() {
    let views = [vk::ImageView::null(); 2];
    assert_eq!(
      check_attachment_count(3, &views),
      Err(EngineError::AttachmentMismatch {
        expected: 3,
        got: 2
      })
    );
    assert!(check_attachment_count(2, &views).is_ok());
  }
}
