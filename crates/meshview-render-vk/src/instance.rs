// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::{vk, Entry};
use meshview_core::EngineError;
use raw_window_handle::RawDisplayHandle;
use tracing::info;

use crate::capability::CapabilityRequest;
use crate::debug::DebugMessenger;

/// Entry, instance and (optionally) the validation messenger.
///
/// Shared through `Arc`; surfaces and devices hold a clone so the instance is
/// destroyed only after all of them.
pub struct Instance {
  entry: Entry,
  raw: ash::Instance,
  debug: Option<DebugMessenger>,
  api_version: u32,
}

fn cstrings(names: &[String]) -> Result<Vec<CString>> {
  names
    .iter()
    .map(|n| CString::new(n.as_str()).with_context(|| format!("interior nul in {n:?}")))
    .collect()
}

/// Adds the window-system extensions the display needs to `request`.
pub fn add_surface_extensions(request: &mut CapabilityRequest, display: RawDisplayHandle) -> Result<()> {
  let exts = ash_window::enumerate_required_extensions(display)
    .context("enumerate_required_extensions")?;
  for &p in exts {
    let name = unsafe { CStr::from_ptr(p) }.to_string_lossy();
    request.add_instance_extension(&name);
  }
  Ok(())
}

impl Instance {
  pub fn new(request: &CapabilityRequest, app_name: &str) -> Result<Arc<Self>> {
    let entry = Entry::linked();

    if !request.layers().is_empty() {
      let available = unsafe { entry.enumerate_instance_layer_properties() }
        .context("enumerate_instance_layer_properties")?;
      let have = |want: &str| {
        available.iter().any(|l| {
          l.layer_name_as_c_str()
            .map(|n| n.to_bytes() == want.as_bytes())
            .unwrap_or(false)
        })
      };
      if !request.layers().iter().all(|l| have(l)) {
        return Err(EngineError::validation_layers_missing().into());
      }
    }

    let app = CString::new(app_name).unwrap_or_default();
    let engine = c"meshview";
    let app_info = vk::ApplicationInfo {
      s_type: vk::StructureType::APPLICATION_INFO,
      p_application_name: app.as_ptr(),
      application_version: vk::make_api_version(0, 1, 0, 0),
      p_engine_name: engine.as_ptr(),
      engine_version: vk::make_api_version(0, 1, 0, 0),
      api_version: request.api_version,
      ..Default::default()
    };

    let layers = cstrings(request.layers())?;
    let exts = cstrings(request.instance_extensions())?;
    let layer_ptrs: Vec<*const c_char> = layers.iter().map(|c| c.as_ptr()).collect();
    let ext_ptrs: Vec<*const c_char> = exts.iter().map(|c| c.as_ptr()).collect();

    // Chained so instance creation and destruction are covered too.
    let mut creation_messenger = crate::debug::messenger_create_info();
    let mut create_info = vk::InstanceCreateInfo {
      s_type: vk::StructureType::INSTANCE_CREATE_INFO,
      p_application_info: &app_info,
      enabled_layer_count: layer_ptrs.len() as u32,
      pp_enabled_layer_names: layer_ptrs.as_ptr(),
      enabled_extension_count: ext_ptrs.len() as u32,
      pp_enabled_extension_names: ext_ptrs.as_ptr(),
      ..Default::default()
    };
    if request.debug_utils_enabled() {
      create_info = create_info.push_next(&mut creation_messenger);
    }

    let raw = unsafe { entry.create_instance(&create_info, None) }.context("create_instance")?;

    let debug = if request.debug_utils_enabled() {
      match DebugMessenger::new(&entry, &raw) {
        Ok(m) => Some(m),
        Err(e) => {
          unsafe { raw.destroy_instance(None) };
          return Err(e);
        }
      }
    } else {
      None
    };

    info!(
      "vulkan instance: api {}.{}, {} layer(s), {} extension(s)",
      vk::api_version_major(request.api_version),
      vk::api_version_minor(request.api_version),
      layers.len(),
      exts.len()
    );

    Ok(Arc::new(Self {
      entry,
      raw,
      debug,
      api_version: request.api_version,
    }))
  }

  pub fn entry(&self) -> &Entry {
    &self.entry
  }

  pub fn raw(&self) -> &ash::Instance {
    &self.raw
  }

  pub fn api_version(&self) -> u32 {
    self.api_version
  }

  pub fn debug_enabled(&self) -> bool {
    self.debug.is_some()
  }
}

// STRICT TEARDOWN ORDER: messenger, then instance.
impl Drop for Instance {
  fn drop(&mut self) {
    unsafe {
      if let Some(debug) = self.debug.as_mut() {
        debug.destroy();
      }
      self.raw.destroy_instance(None);
    }
  }
}
