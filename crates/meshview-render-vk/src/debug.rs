// SPDX-License-Identifier: CEPL-1.0
//! Validation output routed into `tracing`, plus object naming.

use std::ffi::{c_void, CStr, CString};

use anyhow::{Context, Result};
use ash::ext::debug_utils as ext_debug;
use ash::vk;
use tracing::{debug, error, info, warn};

unsafe extern "system" fn debug_callback(
  severity: vk::DebugUtilsMessageSeverityFlagsEXT,
  types: vk::DebugUtilsMessageTypeFlagsEXT,
  data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
  _user: *mut c_void,
) -> vk::Bool32 {
  if data.is_null() {
    return vk::FALSE;
  }
  let msg = unsafe {
    let p = (*data).p_message;
    if p.is_null() {
      return vk::FALSE;
    }
    CStr::from_ptr(p).to_string_lossy()
  };
  if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
    error!("[vulkan {:?}] {}", types, msg);
  } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
    warn!("[vulkan {:?}] {}", types, msg);
  } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
    info!("[vulkan {:?}] {}", types, msg);
  } else {
    debug!("[vulkan {:?}] {}", types, msg);
  }
  vk::FALSE
}

pub(crate) fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
  vk::DebugUtilsMessengerCreateInfoEXT {
    s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
      | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
      | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
      | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
      | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
    pfn_user_callback: Some(debug_callback),
    ..Default::default()
  }
}

/// Instance-scoped messenger. Owned by [`crate::instance::Instance`], which
/// destroys it before the instance itself.
pub(crate) struct DebugMessenger {
  loader: ext_debug::Instance,
  raw: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
  pub(crate) fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
    let loader = ext_debug::Instance::new(entry, instance);
    let raw = unsafe { loader.create_debug_utils_messenger(&messenger_create_info(), None) }
      .context("create_debug_utils_messenger")?;
    Ok(Self { loader, raw })
  }

  /// # Safety
  /// Must run before the owning instance is destroyed, exactly once.
  pub(crate) unsafe fn destroy(&mut self) {
    unsafe { self.loader.destroy_debug_utils_messenger(self.raw, None) };
    self.raw = vk::DebugUtilsMessengerEXT::null();
  }
}

/// Attaches readable names to handles so validation messages can refer to
/// them. A no-op when debug utils is not enabled.
pub struct ObjectNamer {
  loader: Option<ext_debug::Device>,
}

impl ObjectNamer {
  pub(crate) fn new(instance: &ash::Instance, device: &ash::Device, enabled: bool) -> Self {
    Self {
      loader: enabled.then(|| ext_debug::Device::new(instance, device)),
    }
  }

  pub fn name<H: vk::Handle>(&self, handle: H, name: &str) {
    let Some(loader) = &self.loader else {
      return;
    };
    let Ok(cname) = CString::new(name) else {
      return;
    };
    let info = vk::DebugUtilsObjectNameInfoEXT::default()
      .object_handle(handle)
      .object_name(&cname);
    if let Err(e) = unsafe { loader.set_debug_utils_object_name(&info) } {
      debug!("naming {name} failed: {e}");
    }
  }
}
