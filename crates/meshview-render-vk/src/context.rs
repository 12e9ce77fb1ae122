// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection against a [`CapabilityRequest`] and the logical
//! device every other resource is created from.

use std::ffi::{c_char, CString};
use std::ops::Deref;
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use tracing::{info, warn};

use crate::capability::{
  select_first_suitable, CapabilityRequest, DeviceQuery, DeviceReport, FeatureChain,
  QueueFamilyCaps, QueueFamilyIndices, Selected, SurfaceSummary,
};
use crate::debug::ObjectNamer;
use crate::instance::Instance;
use crate::surface::Surface;

/// Logical device. Every GPU resource keeps an `Arc` to it, so the device is
/// destroyed after the last of them.
pub struct Device {
  raw: ash::Device,
  namer: ObjectNamer,
  instance: Arc<Instance>,
}

impl Device {
  pub fn instance(&self) -> &Arc<Instance> {
    &self.instance
  }

  pub fn set_name<H: vk::Handle>(&self, handle: H, name: &str) {
    self.namer.name(handle, name);
  }
}

impl Deref for Device {
  type Target = ash::Device;

  fn deref(&self) -> &ash::Device {
    &self.raw
  }
}

impl Drop for Device {
  fn drop(&mut self) {
    unsafe {
      let _ = self.raw.device_wait_idle();
      self.raw.destroy_device(None);
    }
  }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Queues {
  pub graphics: vk::Queue,
  pub compute: vk::Queue,
  pub transfer: vk::Queue,
  pub present: Option<vk::Queue>,
}

/// Queries real physical devices, optionally against a surface.
pub struct VkQuery<'a> {
  pub instance: &'a ash::Instance,
  pub surface: Option<&'a Surface>,
}

impl DeviceQuery for VkQuery<'_> {
  type Handle = vk::PhysicalDevice;

  fn devices(&self) -> Result<Vec<vk::PhysicalDevice>> {
    unsafe { self.instance.enumerate_physical_devices() }.context("enumerate_physical_devices")
  }

  fn report(&self, phys: vk::PhysicalDevice, request: &CapabilityRequest) -> Result<DeviceReport> {
    let props = unsafe { self.instance.get_physical_device_properties(phys) };
    let name = props
      .device_name_as_c_str()
      .map(|c| c.to_string_lossy().into_owned())
      .unwrap_or_else(|_| "<unnamed>".into());

    let extensions = unsafe { self.instance.enumerate_device_extension_properties(phys) }
      .context("enumerate_device_extension_properties")?
      .iter()
      .filter_map(|e| e.extension_name_as_c_str().ok())
      .map(|c| c.to_string_lossy().into_owned())
      .collect();

    // Versioned feature structs are only valid to query on devices
    // that report the matching API version.
    let mut features = if props.api_version >= request.api_version {
      FeatureChain::new(request.feature_structs())
    } else {
      FeatureChain::new([])
    };
    features.with_linked(|root| unsafe {
      self.instance.get_physical_device_features2(phys, root)
    });

    let families =
      unsafe { self.instance.get_physical_device_queue_family_properties(phys) };
    let mut queue_families = Vec::with_capacity(families.len());
    for (i, fam) in families.iter().enumerate() {
      let present = match self.surface {
        Some(s) => s.present_supported(phys, i as u32)?,
        None => false,
      };
      queue_families.push(QueueFamilyCaps {
        flags: fam.queue_flags,
        queue_count: fam.queue_count,
        present,
      });
    }

    let surface = match self.surface {
      Some(s) => {
        let support = s.support(phys)?;
        Some(SurfaceSummary {
          format_count: support.formats.len(),
          present_mode_count: support.present_modes.len(),
        })
      }
      None => None,
    };

    Ok(DeviceReport {
      name,
      api_version: props.api_version,
      extensions,
      features,
      queue_families,
      surface,
    })
  }

  fn needs_present(&self) -> bool {
    self.surface.is_some()
  }
}

pub fn select_device(
  instance: &Instance,
  request: &CapabilityRequest,
  surface: Option<&Surface>,
) -> Result<Selected<vk::PhysicalDevice>> {
  let query = VkQuery {
    instance: instance.raw(),
    surface,
  };
  select_first_suitable(&query, request)
}

/// One queue per distinct family, priority 1.0, with exactly the requested
/// extensions and feature flags enabled.
pub fn create_logical_device(
  instance: &Arc<Instance>,
  selected: &Selected<vk::PhysicalDevice>,
  request: &CapabilityRequest,
) -> Result<(Arc<Device>, Queues)> {
  let priorities = [1.0f32];
  let queue_infos: Vec<vk::DeviceQueueCreateInfo> = selected
    .indices
    .unique()
    .into_iter()
    .map(|family| vk::DeviceQueueCreateInfo {
      s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
      queue_family_index: family,
      queue_count: 1,
      p_queue_priorities: priorities.as_ptr(),
      ..Default::default()
    })
    .collect();

  let exts: Vec<CString> = request
    .device_extensions()
    .iter()
    .map(|e| CString::new(e.as_str()))
    .collect::<Result<_, _>>()
    .context("device extension name")?;
  let ext_ptrs: Vec<*const c_char> = exts.iter().map(|c| c.as_ptr()).collect();

  let mut enabled = FeatureChain::requested(request);
  let raw = enabled
    .with_linked(|features2| {
      let ci = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        ..Default::default()
      }
      .push_next(features2);
      unsafe { instance.raw().create_device(selected.handle, &ci, None) }
    })
    .context("create_device")?;

  let namer = ObjectNamer::new(instance.raw(), &raw, instance.debug_enabled());
  let device = Arc::new(Device {
    raw,
    namer,
    instance: Arc::clone(instance),
  });

  let idx = selected.indices;
  // completeness was checked during selection
  let get = |family: Option<u32>, name: &str| {
    family.map(|f| {
      let q = unsafe { device.get_device_queue(f, 0) };
      device.set_name(q, name);
      q
    })
  };
  let queues = Queues {
    graphics: get(idx.graphics, "graphics queue").unwrap_or_default(),
    compute: get(idx.compute, "compute queue").unwrap_or_default(),
    transfer: get(idx.transfer, "transfer queue").unwrap_or_default(),
    present: get(idx.present, "present queue"),
  };
  Ok((device, queues))
}

/// Instance, chosen physical device, logical device and its queues.
pub struct DeviceContext {
  pub device: Arc<Device>,
  pub physical: vk::PhysicalDevice,
  pub indices: QueueFamilyIndices,
  pub queues: Queues,
  pub properties: vk::PhysicalDeviceProperties,
  pub memory: vk::PhysicalDeviceMemoryProperties,
  pub device_name: String,
}

impl DeviceContext {
  pub fn new(
    instance: &Arc<Instance>,
    request: &CapabilityRequest,
    surface: Option<&Surface>,
  ) -> Result<Self> {
    let selected = select_device(instance, request, surface)?;
    let (device, queues) = create_logical_device(instance, &selected, request)?;
    let (properties, memory) = unsafe {
      (
        instance.raw().get_physical_device_properties(selected.handle),
        instance
          .raw()
          .get_physical_device_memory_properties(selected.handle),
      )
    };
    info!(
      "device ready: {} (graphics {:?}, present {:?})",
      selected.report.name, selected.indices.graphics, selected.indices.present
    );
    Ok(Self {
      device,
      physical: selected.handle,
      indices: selected.indices,
      queues,
      properties,
      memory,
      device_name: selected.report.name,
    })
  }

  /// Off-screen context with no surface or validation; used by tests.
  pub fn headless() -> Result<Self> {
    let request = CapabilityRequest::new();
    let instance = Instance::new(&request, "meshview-headless")?;
    Self::new(&instance, &request, None)
  }

  pub fn instance(&self) -> &ash::Instance {
    self.device.instance().raw()
  }

  pub fn graphics_family(&self) -> u32 {
    self.indices.graphics.unwrap_or_default()
  }

  pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
    unsafe {
      self.instance()
        .get_physical_device_format_properties(self.physical, format)
    }
  }

  /// Highest sample count usable for both colour and depth attachments,
  /// capped at `requested`.
  pub fn usable_samples(&self, requested: u32) -> vk::SampleCountFlags {
    let limits = &self.properties.limits;
    let counts =
      limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    let picked = pick_sample_count(counts, requested);
    if picked.as_raw() < requested {
      warn!("msaa x{requested} not supported, using x{}", picked.as_raw());
    }
    picked
  }

  pub fn max_anisotropy(&self) -> f32 {
    self.properties.limits.max_sampler_anisotropy
  }
}

pub fn pick_sample_count(supported: vk::SampleCountFlags, requested: u32) -> vk::SampleCountFlags {
  [
    vk::SampleCountFlags::TYPE_64,
    vk::SampleCountFlags::TYPE_32,
    vk::SampleCountFlags::TYPE_16,
    vk::SampleCountFlags::TYPE_8,
    vk::SampleCountFlags::TYPE_4,
    vk::SampleCountFlags::TYPE_2,
  ]
  .into_iter()
  .find(|c| c.as_raw() <= requested && supported.contains(*c))
  .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sample_count_caps_at_request_and_support() {
    let up_to_8 = vk::SampleCountFlags::TYPE_1
      | vk::SampleCountFlags::TYPE_2
      | vk::SampleCountFlags::TYPE_4
      | vk::SampleCountFlags::TYPE_8;
    assert_eq!(pick_sample_count(up_to_8, 8), vk::SampleCountFlags::TYPE_8);
    assert_eq!(pick_sample_count(up_to_8, 16), vk::SampleCountFlags::TYPE_8);
    assert_eq!(pick_sample_count(up_to_8, 3), vk::SampleCountFlags::TYPE_2);
    assert_eq!(pick_sample_count(up_to_8, 1), vk::SampleCountFlags::TYPE_1);
    assert_eq!(
      pick_sample_count(vk::SampleCountFlags::TYPE_1, 8),
      vk::SampleCountFlags::TYPE_1
    );
  }

  #[test]
  fn headless_context_has_gtc_queues_and_no_present() {
    let Ok(ctx) = DeviceContext::headless() else {
      eprintln!("no vulkan device; skipping");
      return;
    };
    assert!(ctx.indices.is_gtc_complete());
    assert!(ctx.indices.present.is_none());
    assert!(ctx.queues.present.is_none());
    assert!(!ctx.device_name.is_empty());
  }
}
