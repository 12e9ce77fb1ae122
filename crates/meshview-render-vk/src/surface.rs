// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ash::khr::surface;
use ash::vk;
use meshview_render::SurfaceProvider;

use crate::instance::Instance;

/// What a surface supports on one physical device.
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupport {
  pub capabilities: vk::SurfaceCapabilitiesKHR,
  pub formats: Vec<vk::SurfaceFormatKHR>,
  pub present_modes: Vec<vk::PresentModeKHR>,
}

pub struct Surface {
  loader: surface::Instance,
  raw: vk::SurfaceKHR,
  _instance: Arc<Instance>,
}

impl Surface {
  /// STRICT ORDER: the instance must already carry the extensions
  /// [`crate::instance::add_surface_extensions`] reported for this display.
  pub fn new(instance: &Arc<Instance>, provider: &dyn SurfaceProvider) -> Result<Self> {
    let dh = provider
      .display_handle()
      .map_err(|e| anyhow!("{e}"))?
      .as_raw();
    let wh = provider
      .window_handle()
      .map_err(|e| anyhow!("{e}"))?
      .as_raw();
    let loader = surface::Instance::new(instance.entry(), instance.raw());
    let raw = unsafe { ash_window::create_surface(instance.entry(), instance.raw(), dh, wh, None) }
      .context("ash_window::create_surface")?;
    Ok(Self {
      loader,
      raw,
      _instance: Arc::clone(instance),
    })
  }

  pub fn raw(&self) -> vk::SurfaceKHR {
    self.raw
  }

  pub fn present_supported(&self, phys: vk::PhysicalDevice, family: u32) -> Result<bool> {
    Ok(unsafe {
      self.loader
        .get_physical_device_surface_support(phys, family, self.raw)
    }?)
  }

  pub fn support(&self, phys: vk::PhysicalDevice) -> Result<SwapchainSupport> {
    unsafe {
      Ok(SwapchainSupport {
        capabilities: self
          .loader
          .get_physical_device_surface_capabilities(phys, self.raw)
          .context("surface capabilities")?,
        formats: self
          .loader
          .get_physical_device_surface_formats(phys, self.raw)
          .context("surface formats")?,
        present_modes: self
          .loader
          .get_physical_device_surface_present_modes(phys, self.raw)
          .context("surface present modes")?,
      })
    }
  }
}

impl Drop for Surface {
  fn drop(&mut self) {
    unsafe { self.loader.destroy_surface(self.raw, None) };
  }
}
