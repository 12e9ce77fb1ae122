// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::vk;
use meshview_render::RenderSize;
use tracing::info;

use crate::context::{Device, DeviceContext};
use crate::image::create_image_view;
use crate::surface::Surface;

/// `B8G8R8A8_SRGB` with the sRGB non-linear colour space, else the first
/// offered format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
  formats
    .iter()
    .copied()
    .find(|f| {
      f.format == vk::Format::B8G8R8A8_SRGB
        && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    })
    .or_else(|| formats.first().copied())
    .unwrap_or(vk::SurfaceFormatKHR {
      format: vk::Format::B8G8R8A8_SRGB,
      color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    })
}

/// Mailbox when offered; FIFO is always available.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
  if modes.contains(&vk::PresentModeKHR::MAILBOX) {
    vk::PresentModeKHR::MAILBOX
  } else {
    vk::PresentModeKHR::FIFO
  }
}

/// The surface's current extent, unless it leaves the choice to us (width
/// `u32::MAX`), in which case the window size clamped to the limits.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
  if caps.current_extent.width != u32::MAX {
    return caps.current_extent;
  }
  vk::Extent2D {
    width: want
      .width
      .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
    height: want
      .height
      .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
  }
}

/// One more than the minimum, capped by a non-zero maximum.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
  let want = caps.min_image_count + 1;
  if caps.max_image_count > 0 {
    want.min(caps.max_image_count)
  } else {
    want
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
  Image { index: u32, suboptimal: bool },
  OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presented {
  Ok,
  /// Suboptimal or out of date; rebuild before the next frame.
  NeedsRecreate,
}

pub struct Swapchain {
  device: Arc<Device>,
  loader: swapchain::Device,
  raw: vk::SwapchainKHR,
  images: Vec<vk::Image>,
  views: Vec<vk::ImageView>,
  format: vk::SurfaceFormatKHR,
  extent: vk::Extent2D,
  present_mode: vk::PresentModeKHR,
}

impl Swapchain {
  pub fn new(ctx: &DeviceContext, surface: &Surface, want: RenderSize) -> Result<Self> {
    let support = surface.support(ctx.physical)?;
    let format = choose_surface_format(&support.formats);
    let present_mode = choose_present_mode(&support.present_modes);
    let extent = choose_extent(&support.capabilities, want);
    let image_count = choose_image_count(&support.capabilities);

    let graphics = ctx.indices.graphics.unwrap_or_default();
    let present = ctx.indices.present.unwrap_or(graphics);
    let families = [graphics, present];
    let (sharing_mode, family_count) = if graphics != present {
      (vk::SharingMode::CONCURRENT, 2)
    } else {
      (vk::SharingMode::EXCLUSIVE, 0)
    };

    let ci = vk::SwapchainCreateInfoKHR {
      s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
      surface: surface.raw(),
      min_image_count: image_count,
      image_format: format.format,
      image_color_space: format.color_space,
      image_extent: extent,
      image_array_layers: 1,
      image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
      image_sharing_mode: sharing_mode,
      queue_family_index_count: family_count,
      p_queue_family_indices: families.as_ptr(),
      pre_transform: support.capabilities.current_transform,
      composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
      present_mode,
      clipped: vk::TRUE,
      ..Default::default()
    };

    let device = &ctx.device;
    let loader = swapchain::Device::new(ctx.instance(), device);
    let raw = unsafe { loader.create_swapchain(&ci, None) }.context("create_swapchain")?;
    let mut out = Self {
      device: Arc::clone(device),
      loader,
      raw,
      images: Vec::new(),
      views: Vec::new(),
      format,
      extent,
      present_mode,
    };
    // views are pushed one by one so Drop cleans up a partial set
    out.images = unsafe { out.loader.get_swapchain_images(raw) }.context("get_swapchain_images")?;
    for (i, &image) in out.images.iter().enumerate() {
      let view = create_image_view(device, image, format.format, vk::ImageAspectFlags::COLOR, 1)?;
      device.set_name(view, &format!("swapchain view {i}"));
      out.views.push(view);
    }

    info!(
      "swapchain {}x{} {:?}/{:?} {:?}, {} images",
      extent.width,
      extent.height,
      format.format,
      format.color_space,
      present_mode,
      out.images.len()
    );
    Ok(out)
  }

  pub fn acquire(&self, signal: vk::Semaphore) -> Result<Acquired> {
    match unsafe {
      self.loader
        .acquire_next_image(self.raw, u64::MAX, signal, vk::Fence::null())
    } {
      Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
      Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
      Err(e) => Err(e).context("acquire_next_image"),
    }
  }

  pub fn present(&self, queue: vk::Queue, wait: vk::Semaphore, index: u32) -> Result<Presented> {
    let pi = vk::PresentInfoKHR {
      s_type: vk::StructureType::PRESENT_INFO_KHR,
      wait_semaphore_count: 1,
      p_wait_semaphores: &wait,
      swapchain_count: 1,
      p_swapchains: &self.raw,
      p_image_indices: &index,
      ..Default::default()
    };
    match unsafe { self.loader.queue_present(queue, &pi) } {
      Ok(false) => Ok(Presented::Ok),
      Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::NeedsRecreate),
      Err(e) => Err(e).context("queue_present"),
    }
  }

  pub fn views(&self) -> &[vk::ImageView] {
    &self.views
  }

  pub fn image_count(&self) -> usize {
    self.images.len()
  }

  pub fn format(&self) -> vk::Format {
    self.format.format
  }

  pub fn extent(&self) -> vk::Extent2D {
    self.extent
  }

  pub fn present_mode(&self) -> vk::PresentModeKHR {
    self.present_mode
  }
}

// STRICT TEARDOWN ORDER: views BEFORE swapchain.
impl Drop for Swapchain {
  fn drop(&mut self) {
    unsafe {
      for &v in &self.views {
        self.device.destroy_image_view(v, None);
      }
      self.loader.destroy_swapchain(self.raw, None);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR { format, color_space }
  }

  #[test]
  fn prefers_srgb_bgra_then_first() {
    let unorm = fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    let srgb = fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    assert_eq!(choose_surface_format(&[unorm, srgb]), srgb);
    assert_eq!(choose_surface_format(&[unorm]), unorm);
    let wrong_space = fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT);
    assert_eq!(choose_surface_format(&[unorm, wrong_space]), unorm);
  }

  #[test]
  fn mailbox_else_fifo() {
    use vk::PresentModeKHR as P;
    assert_eq!(choose_present_mode(&[P::FIFO, P::MAILBOX]), P::MAILBOX);
    assert_eq!(choose_present_mode(&[P::IMMEDIATE, P::FIFO_RELAXED]), P::FIFO);
  }

  fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
      current_extent: vk::Extent2D {
        width: current.0,
        height: current.1,
      },
      min_image_extent: vk::Extent2D {
        width: min.0,
        height: min.1,
      },
      max_image_extent: vk::Extent2D {
        width: max.0,
        height: max.1,
      },
      ..Default::default()
    }
  }

  #[test]
  fn extent_uses_current_unless_undefined() {
    let want = RenderSize {
      width: 1080,
      height: 720,
    };
    let fixed = caps((800, 600), (1, 1), (4096, 4096));
    assert_eq!(choose_extent(&fixed, want), vk::Extent2D { width: 800, height: 600 });

    let free = caps((u32::MAX, u32::MAX), (1, 1), (1000, 4096));
    assert_eq!(choose_extent(&free, want), vk::Extent2D { width: 1000, height: 720 });
  }

  #[test]
  fn image_count_is_min_plus_one_capped() {
    let mut c = vk::SurfaceCapabilitiesKHR {
      min_image_count: 2,
      max_image_count: 0,
      ..Default::default()
    };
    assert_eq!(choose_image_count(&c), 3);
    c.max_image_count = 2;
    assert_eq!(choose_image_count(&c), 2);
    c.max_image_count = 8;
    assert_eq!(choose_image_count(&c), 3);
  }
}
