// SPDX-License-Identifier: CEPL-1.0
//! Declarative capability requests and first-fit device selection.
//!
//! Everything in here is plain data so selection can be exercised against
//! a fake [`DeviceQuery`]; the driver-backed query lives in `context`.

use anyhow::Result;
use ash::vk;
use meshview_core::EngineError;
use tracing::{debug, info};

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
pub const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// A versioned group of boolean device features, queried and enabled as one
/// link of the features-2 chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureStruct {
  /// The base `VkPhysicalDeviceFeatures` carried inside features-2.
  Core,
  Vulkan11,
  Vulkan12,
}

impl FeatureStruct {
  pub fn name(self) -> &'static str {
    match self {
      FeatureStruct::Core => "core",
      FeatureStruct::Vulkan11 => "vulkan11",
      FeatureStruct::Vulkan12 => "vulkan12",
    }
  }

  pub fn parse(name: &str) -> Option<Self> {
    match name {
      "core" => Some(FeatureStruct::Core),
      "vulkan11" => Some(FeatureStruct::Vulkan11),
      "vulkan12" => Some(FeatureStruct::Vulkan12),
      _ => None,
    }
  }

  pub fn structure_type(self) -> vk::StructureType {
    match self {
      FeatureStruct::Core => vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
      FeatureStruct::Vulkan11 => vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_1_FEATURES,
      FeatureStruct::Vulkan12 => vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_2_FEATURES,
    }
  }

  /// Flag names known for this struct, in driver spelling.
  pub fn flag_names(self) -> &'static [&'static str] {
    match self {
      FeatureStruct::Core => CORE_FLAGS,
      FeatureStruct::Vulkan11 => VULKAN11_FLAGS,
      FeatureStruct::Vulkan12 => VULKAN12_FLAGS,
    }
  }

  /// Canonical `'static` spelling of `name`, if known.
  fn canonical(self, name: &str) -> Option<&'static str> {
    self.flag_names().iter().copied().find(|n| *n == name)
  }
}

macro_rules! feature_flags {
  ($names:ident, $accessor:ident, $ty:ty { $($name:literal => $field:ident),* $(,)? }) => {
    const $names: &[&str] = &[$($name),*];

    fn $accessor<'s>(s: &'s mut $ty, name: &str) -> Option<&'s mut vk::Bool32> {
      match name {
        $($name => Some(&mut s.$field),)*
        _ => None,
      }
    }
  };
}

feature_flags!(CORE_FLAGS, core_flag, vk::PhysicalDeviceFeatures {
  "robustBufferAccess" => robust_buffer_access,
  "fullDrawIndexUint32" => full_draw_index_uint32,
  "imageCubeArray" => image_cube_array,
  "independentBlend" => independent_blend,
  "geometryShader" => geometry_shader,
  "tessellationShader" => tessellation_shader,
  "sampleRateShading" => sample_rate_shading,
  "dualSrcBlend" => dual_src_blend,
  "logicOp" => logic_op,
  "multiDrawIndirect" => multi_draw_indirect,
  "drawIndirectFirstInstance" => draw_indirect_first_instance,
  "depthClamp" => depth_clamp,
  "depthBiasClamp" => depth_bias_clamp,
  "fillModeNonSolid" => fill_mode_non_solid,
  "depthBounds" => depth_bounds,
  "wideLines" => wide_lines,
  "largePoints" => large_points,
  "alphaToOne" => alpha_to_one,
  "multiViewport" => multi_viewport,
  "samplerAnisotropy" => sampler_anisotropy,
  "textureCompressionETC2" => texture_compression_etc2,
  "textureCompressionASTC_LDR" => texture_compression_astc_ldr,
  "textureCompressionBC" => texture_compression_bc,
  "occlusionQueryPrecise" => occlusion_query_precise,
  "pipelineStatisticsQuery" => pipeline_statistics_query,
  "vertexPipelineStoresAndAtomics" => vertex_pipeline_stores_and_atomics,
  "fragmentStoresAndAtomics" => fragment_stores_and_atomics,
  "shaderClipDistance" => shader_clip_distance,
  "shaderCullDistance" => shader_cull_distance,
  "shaderFloat64" => shader_float64,
  "shaderInt64" => shader_int64,
  "shaderInt16" => shader_int16,
});

feature_flags!(VULKAN11_FLAGS, vulkan11_flag, vk::PhysicalDeviceVulkan11Features<'static> {
  "storageBuffer16BitAccess" => storage_buffer16_bit_access,
  "uniformAndStorageBuffer16BitAccess" => uniform_and_storage_buffer16_bit_access,
  "storagePushConstant16" => storage_push_constant16,
  "storageInputOutput16" => storage_input_output16,
  "multiview" => multiview,
  "multiviewGeometryShader" => multiview_geometry_shader,
  "multiviewTessellationShader" => multiview_tessellation_shader,
  "variablePointersStorageBuffer" => variable_pointers_storage_buffer,
  "variablePointers" => variable_pointers,
  "protectedMemory" => protected_memory,
  "samplerYcbcrConversion" => sampler_ycbcr_conversion,
  "shaderDrawParameters" => shader_draw_parameters,
});

feature_flags!(VULKAN12_FLAGS, vulkan12_flag, vk::PhysicalDeviceVulkan12Features<'static> {
  "samplerMirrorClampToEdge" => sampler_mirror_clamp_to_edge,
  "drawIndirectCount" => draw_indirect_count,
  "storageBuffer8BitAccess" => storage_buffer8_bit_access,
  "shaderFloat16" => shader_float16,
  "shaderInt8" => shader_int8,
  "descriptorIndexing" => descriptor_indexing,
  "shaderSampledImageArrayNonUniformIndexing" => shader_sampled_image_array_non_uniform_indexing,
  "descriptorBindingPartiallyBound" => descriptor_binding_partially_bound,
  "descriptorBindingVariableDescriptorCount" => descriptor_binding_variable_descriptor_count,
  "runtimeDescriptorArray" => runtime_descriptor_array,
  "samplerFilterMinmax" => sampler_filter_minmax,
  "scalarBlockLayout" => scalar_block_layout,
  "imagelessFramebuffer" => imageless_framebuffer,
  "uniformBufferStandardLayout" => uniform_buffer_standard_layout,
  "separateDepthStencilLayouts" => separate_depth_stencil_layouts,
  "hostQueryReset" => host_query_reset,
  "timelineSemaphore" => timeline_semaphore,
  "bufferDeviceAddress" => buffer_device_address,
  "vulkanMemoryModel" => vulkan_memory_model,
  "shaderOutputLayer" => shader_output_layer,
});

/// One non-base link of the feature chain.
#[derive(Clone, Copy, Debug)]
enum ExtFeatures {
  Vulkan11(vk::PhysicalDeviceVulkan11Features<'static>),
  Vulkan12(vk::PhysicalDeviceVulkan12Features<'static>),
}

impl ExtFeatures {
  fn zeroed(kind: FeatureStruct) -> Option<Self> {
    match kind {
      FeatureStruct::Core => None,
      FeatureStruct::Vulkan11 => Some(ExtFeatures::Vulkan11(Default::default())),
      FeatureStruct::Vulkan12 => Some(ExtFeatures::Vulkan12(Default::default())),
    }
  }

  fn kind(&self) -> FeatureStruct {
    match self {
      ExtFeatures::Vulkan11(_) => FeatureStruct::Vulkan11,
      ExtFeatures::Vulkan12(_) => FeatureStruct::Vulkan12,
    }
  }

  fn flag_mut(&mut self, name: &str) -> Option<&mut vk::Bool32> {
    match self {
      ExtFeatures::Vulkan11(s) => vulkan11_flag(s, name),
      ExtFeatures::Vulkan12(s) => vulkan12_flag(s, name),
    }
  }

  fn clear_next(&mut self) {
    match self {
      ExtFeatures::Vulkan11(s) => s.p_next = std::ptr::null_mut(),
      ExtFeatures::Vulkan12(s) => s.p_next = std::ptr::null_mut(),
    }
  }
}

/// Ordered list of feature structs: the base struct first, then each
/// requested versioned struct once, in request order.
///
/// The list is only linked into a `pNext` chain for the duration of a single
/// driver call (see [`FeatureChain::with_linked`]); at rest every link's
/// `p_next` is null, so the value can be cloned and moved freely.
#[derive(Clone, Debug)]
pub struct FeatureChain {
  core: vk::PhysicalDeviceFeatures,
  ext: Vec<ExtFeatures>,
}

impl FeatureChain {
  /// All-false chain containing `kinds` (the base struct is always present).
  pub fn new<I>(kinds: I) -> Self
  where
    I: IntoIterator<Item = FeatureStruct>,
  {
    let mut ext: Vec<ExtFeatures> = Vec::new();
    for kind in kinds {
      if ext.iter().any(|e| e.kind() == kind) {
        continue;
      }
      if let Some(e) = ExtFeatures::zeroed(kind) {
        ext.push(e);
      }
    }
    Self {
      core: vk::PhysicalDeviceFeatures::default(),
      ext,
    }
  }

  /// Chain with exactly the requested flags switched on.
  pub fn requested(request: &CapabilityRequest) -> Self {
    let mut chain = Self::new(request.feature_structs());
    for (kind, name) in request.required_features() {
      // names in a request were validated when they were added
      if let Some(flag) = chain.flag_mut(kind, name) {
        *flag = vk::TRUE;
      }
    }
    chain
  }

  pub fn kinds(&self) -> Vec<FeatureStruct> {
    std::iter::once(FeatureStruct::Core)
      .chain(self.ext.iter().map(ExtFeatures::kind))
      .collect()
  }

  fn flag_mut(&mut self, kind: FeatureStruct, name: &str) -> Option<&mut vk::Bool32> {
    match kind {
      FeatureStruct::Core => core_flag(&mut self.core, name),
      _ => self
        .ext
        .iter_mut()
        .find(|e| e.kind() == kind)
        .and_then(|e| e.flag_mut(name)),
    }
  }

  /// `None` when the struct is not part of this chain or the name is unknown.
  pub fn get(&self, kind: FeatureStruct, name: &str) -> Option<bool> {
    let mut copy = self.clone();
    copy.flag_mut(kind, name).map(|v| *v == vk::TRUE)
  }

  pub fn set(&mut self, kind: FeatureStruct, name: &str, on: bool) -> Result<(), EngineError> {
    let flag = self
      .flag_mut(kind, name)
      .ok_or_else(|| EngineError::UnknownFeature {
        feature_struct: kind.name(),
        name: name.to_string(),
      })?;
    *flag = if on { vk::TRUE } else { vk::FALSE };
    Ok(())
  }

  /// Requested flags this chain does not report as enabled, as
  /// `"<struct>.<flag>"`.
  pub fn missing(&self, request: &CapabilityRequest) -> Vec<String> {
    request
      .required_features()
      .filter(|(kind, name)| self.get(*kind, name) != Some(true))
      .map(|(kind, name)| format!("{}.{}", kind.name(), name))
      .collect()
  }

  /// Links the chain behind a features-2 root for one call, then writes the
  /// base features back and unlinks everything again.
  pub fn with_linked<R>(
    &mut self,
    f: impl FnOnce(&mut vk::PhysicalDeviceFeatures2<'_>) -> R,
  ) -> R {
    let core = self.core;
    let (result, core_after) = {
      let mut root = vk::PhysicalDeviceFeatures2 {
        s_type: vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
        features: core,
        ..Default::default()
      };
      // push_next prepends, so walk backwards to keep request order
      for link in self.ext.iter_mut().rev() {
        root = match link {
          ExtFeatures::Vulkan11(s) => root.push_next(s),
          ExtFeatures::Vulkan12(s) => root.push_next(s),
        };
      }
      let result = f(&mut root);
      (result, root.features)
    };
    self.core = core_after;
    for link in &mut self.ext {
      link.clear_next();
    }
    result
  }
}

/// Instance layers/extensions, device extensions and per-struct feature
/// flags a device must provide. Names behave as sets; insertion order is
/// kept for logging only.
#[derive(Clone, Debug)]
pub struct CapabilityRequest {
  pub api_version: u32,
  layers: Vec<String>,
  instance_extensions: Vec<String>,
  device_extensions: Vec<String>,
  features: Vec<(FeatureStruct, Vec<&'static str>)>,
}

impl Default for CapabilityRequest {
  fn default() -> Self {
    Self {
      api_version: vk::API_VERSION_1_2,
      layers: Vec::new(),
      instance_extensions: Vec::new(),
      device_extensions: Vec::new(),
      features: Vec::new(),
    }
  }
}

fn add_unique(list: &mut Vec<String>, name: &str) {
  if !list.iter().any(|n| n == name) {
    list.push(name.to_string());
  }
}

impl CapabilityRequest {
  pub fn new() -> Self {
    Self::default()
  }

  /// What the viewer needs: swapchain support, anisotropic sampling,
  /// line rasterisation for wireframes, sample shading, imageless
  /// framebuffers, plus validation when asked for.
  pub fn viewer(validation: bool) -> Self {
    let mut req = Self::new();
    if validation {
      req.enable_validation();
    }
    req.add_device_extension(SWAPCHAIN_EXTENSION);
    // the names below are all in the tables
    for (kind, name) in [
      (FeatureStruct::Core, "samplerAnisotropy"),
      (FeatureStruct::Core, "fillModeNonSolid"),
      (FeatureStruct::Core, "sampleRateShading"),
      (FeatureStruct::Vulkan12, "imagelessFramebuffer"),
    ] {
      let _ = req.require_feature(kind, name);
    }
    req
  }

  pub fn enable_validation(&mut self) -> &mut Self {
    self.add_layer(VALIDATION_LAYER);
    self.add_instance_extension(DEBUG_UTILS_EXTENSION);
    self
  }

  pub fn add_layer(&mut self, name: &str) -> &mut Self {
    add_unique(&mut self.layers, name);
    self
  }

  pub fn add_instance_extension(&mut self, name: &str) -> &mut Self {
    add_unique(&mut self.instance_extensions, name);
    self
  }

  pub fn add_device_extension(&mut self, name: &str) -> &mut Self {
    add_unique(&mut self.device_extensions, name);
    self
  }

  /// Adds a device extension together with flags from the feature struct
  /// it exposes.
  pub fn add_device_extension_with_features(
    &mut self,
    name: &str,
    kind: FeatureStruct,
    flags: &[&str],
  ) -> Result<&mut Self, EngineError> {
    self.add_device_extension(name);
    for flag in flags {
      self.require_feature(kind, flag)?;
    }
    Ok(self)
  }

  /// Requires `name` within `kind`. Repeated requests for one struct
  /// accumulate into a union.
  pub fn require_feature(
    &mut self,
    kind: FeatureStruct,
    name: &str,
  ) -> Result<&mut Self, EngineError> {
    let canonical = kind
      .canonical(name)
      .ok_or_else(|| EngineError::UnknownFeature {
        feature_struct: kind.name(),
        name: name.to_string(),
      })?;
    match self.features.iter_mut().find(|(k, _)| *k == kind) {
      Some((_, names)) => {
        if !names.contains(&canonical) {
          names.push(canonical);
        }
      }
      None => self.features.push((kind, vec![canonical])),
    }
    Ok(self)
  }

  /// Parses `"<struct>.<flag>"`, e.g. `"vulkan11.multiviewGeometryShader"`.
  pub fn require_feature_path(&mut self, path: &str) -> Result<&mut Self, EngineError> {
    let unknown = || EngineError::UnknownFeature {
      feature_struct: "?",
      name: path.to_string(),
    };
    let (kind, name) = path.split_once('.').ok_or_else(unknown)?;
    let kind = FeatureStruct::parse(kind).ok_or_else(unknown)?;
    self.require_feature(kind, name)
  }

  pub fn layers(&self) -> &[String] {
    &self.layers
  }

  pub fn instance_extensions(&self) -> &[String] {
    &self.instance_extensions
  }

  pub fn device_extensions(&self) -> &[String] {
    &self.device_extensions
  }

  pub fn validation_enabled(&self) -> bool {
    self.layers.iter().any(|l| l == VALIDATION_LAYER)
  }

  pub fn debug_utils_enabled(&self) -> bool {
    self.instance_extensions
      .iter()
      .any(|e| e == DEBUG_UTILS_EXTENSION)
  }

  pub fn feature_structs(&self) -> impl Iterator<Item = FeatureStruct> + '_ {
    self.features.iter().map(|(k, _)| *k)
  }

  pub fn required_features(&self) -> impl Iterator<Item = (FeatureStruct, &'static str)> + '_ {
    self.features
      .iter()
      .flat_map(|(k, names)| names.iter().map(move |n| (*k, *n)))
  }
}

/// Which queue family serves each role. Roles are filled first-fit and
/// never reassigned once set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
  pub graphics: Option<u32>,
  pub compute: Option<u32>,
  pub transfer: Option<u32>,
  pub present: Option<u32>,
}

impl QueueFamilyIndices {
  pub fn is_gtc_complete(&self) -> bool {
    self.graphics.is_some() && self.compute.is_some() && self.transfer.is_some()
  }

  pub fn is_complete(&self, needs_present: bool) -> bool {
    self.is_gtc_complete() && (!needs_present || self.present.is_some())
  }

  /// Distinct family indices in role order.
  pub fn unique(&self) -> Vec<u32> {
    let mut out = Vec::with_capacity(4);
    for idx in [self.graphics, self.compute, self.transfer, self.present]
      .into_iter()
      .flatten()
    {
      if !out.contains(&idx) {
        out.push(idx);
      }
    }
    out
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyCaps {
  pub flags: vk::QueueFlags,
  pub queue_count: u32,
  /// Presentation to the candidate surface is supported.
  pub present: bool,
}

/// Scans families in index order and stops as soon as every needed role
/// has an index.
pub fn find_queue_families(families: &[QueueFamilyCaps], needs_present: bool) -> QueueFamilyIndices {
  let mut idx = QueueFamilyIndices::default();
  for (i, fam) in families.iter().enumerate() {
    if fam.queue_count == 0 {
      continue;
    }
    let i = i as u32;
    if idx.graphics.is_none() && fam.flags.contains(vk::QueueFlags::GRAPHICS) {
      idx.graphics = Some(i);
    }
    if idx.compute.is_none() && fam.flags.contains(vk::QueueFlags::COMPUTE) {
      idx.compute = Some(i);
    }
    if idx.transfer.is_none() && fam.flags.contains(vk::QueueFlags::TRANSFER) {
      idx.transfer = Some(i);
    }
    if needs_present && idx.present.is_none() && fam.present {
      idx.present = Some(i);
    }
    if idx.is_complete(needs_present) {
      break;
    }
  }
  idx
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceSummary {
  pub format_count: usize,
  pub present_mode_count: usize,
}

/// What a query learned about one physical device.
#[derive(Clone, Debug)]
pub struct DeviceReport {
  pub name: String,
  pub api_version: u32,
  pub extensions: Vec<String>,
  pub features: FeatureChain,
  pub queue_families: Vec<QueueFamilyCaps>,
  /// Present only when selecting against a surface.
  pub surface: Option<SurfaceSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
  ApiVersion { have: u32, want: u32 },
  MissingExtensions(Vec<String>),
  MissingFeatures(Vec<String>),
  IncompleteQueues(QueueFamilyIndices),
  NoSurfaceSupport,
}

/// All suitability conditions; returns the resolved queue families on success.
pub fn check_suitability(
  report: &DeviceReport,
  request: &CapabilityRequest,
  needs_present: bool,
) -> Result<QueueFamilyIndices, Rejection> {
  if report.api_version < request.api_version {
    return Err(Rejection::ApiVersion {
      have: report.api_version,
      want: request.api_version,
    });
  }

  let missing_ext: Vec<String> = request
    .device_extensions()
    .iter()
    .filter(|e| !report.extensions.contains(e))
    .cloned()
    .collect();
  if !missing_ext.is_empty() {
    return Err(Rejection::MissingExtensions(missing_ext));
  }

  let missing_feat = report.features.missing(request);
  if !missing_feat.is_empty() {
    return Err(Rejection::MissingFeatures(missing_feat));
  }

  let indices = find_queue_families(&report.queue_families, needs_present);
  if !indices.is_complete(needs_present) {
    return Err(Rejection::IncompleteQueues(indices));
  }

  if needs_present {
    match report.surface {
      Some(s) if s.format_count > 0 && s.present_mode_count > 0 => {}
      _ => return Err(Rejection::NoSurfaceSupport),
    }
  }
  Ok(indices)
}

/// Source of candidate devices and their capabilities.
pub trait DeviceQuery {
  type Handle: Copy;

  /// Devices in driver enumeration order.
  fn devices(&self) -> Result<Vec<Self::Handle>>;
  fn report(&self, device: Self::Handle, request: &CapabilityRequest) -> Result<DeviceReport>;
  /// Whether a presentation surface takes part in selection.
  fn needs_present(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct Selected<H> {
  pub handle: H,
  pub indices: QueueFamilyIndices,
  pub report: DeviceReport,
}

/// Returns the first device, in enumeration order, that passes every check.
pub fn select_first_suitable<P: DeviceQuery>(
  query: &P,
  request: &CapabilityRequest,
) -> Result<Selected<P::Handle>> {
  let devices = query.devices()?;
  if devices.is_empty() {
    return Err(EngineError::no_gpu().into());
  }

  for handle in devices {
    let report = query.report(handle, request)?;
    match check_suitability(&report, request, query.needs_present()) {
      Ok(indices) => {
        info!("selected GPU: {} ({:?})", report.name, indices);
        return Ok(Selected {
          handle,
          indices,
          report,
        });
      }
      Err(why) => debug!("skipping GPU {}: {:?}", report.name, why),
    }
  }
  Err(EngineError::no_suitable_gpu().into())
}

#[cfg(test)]
mod tests {
  use super::*;

  const GTC: vk::QueueFlags = vk::QueueFlags::from_raw(
    vk::QueueFlags::GRAPHICS.as_raw()
      | vk::QueueFlags::COMPUTE.as_raw()
      | vk::QueueFlags::TRANSFER.as_raw(),
  );

  fn family(flags: vk::QueueFlags, present: bool) -> QueueFamilyCaps {
    QueueFamilyCaps {
      flags,
      queue_count: 1,
      present,
    }
  }

  #[test]
  fn duplicate_names_collapse() {
    let mut req = CapabilityRequest::new();
    req.add_device_extension("present_swapchain")
      .add_device_extension("present_swapchain")
      .add_layer("L")
      .add_layer("L");
    assert_eq!(req.device_extensions(), ["present_swapchain".to_string()]);
    assert_eq!(req.layers().len(), 1);
  }

  #[test]
  fn feature_requests_union_per_struct() {
    let mut req = CapabilityRequest::new();
    req.require_feature(FeatureStruct::Core, "samplerAnisotropy").unwrap();
    req.require_feature(FeatureStruct::Vulkan12, "imagelessFramebuffer").unwrap();
    req.require_feature(FeatureStruct::Core, "fillModeNonSolid").unwrap();
    req.require_feature(FeatureStruct::Core, "samplerAnisotropy").unwrap();

    let feats: Vec<_> = req.required_features().collect();
    assert_eq!(
      feats,
      vec![
        (FeatureStruct::Core, "samplerAnisotropy"),
        (FeatureStruct::Core, "fillModeNonSolid"),
        (FeatureStruct::Vulkan12, "imagelessFramebuffer"),
      ]
    );
    assert_eq!(
      req.feature_structs().collect::<Vec<_>>(),
      vec![FeatureStruct::Core, FeatureStruct::Vulkan12]
    );
  }

  #[test]
  fn unknown_feature_names_are_rejected() {
    let mut req = CapabilityRequest::new();
    let err = req.require_feature(FeatureStruct::Vulkan11, "warpDrive").unwrap_err();
    assert!(matches!(err, EngineError::UnknownFeature { feature_struct: "vulkan11", .. }));
    assert!(req.require_feature_path("vulkan11.multiviewGeometryShader").is_ok());
    assert!(req.require_feature_path("vulkan99.multiview").is_err());
    assert!(req.require_feature_path("multiview").is_err());
  }

  #[test]
  fn chain_keeps_request_order_and_flags() {
    let mut req = CapabilityRequest::new();
    req.require_feature(FeatureStruct::Vulkan12, "timelineSemaphore").unwrap();
    req.require_feature(FeatureStruct::Vulkan11, "multiview").unwrap();
    let chain = FeatureChain::requested(&req);
    assert_eq!(
      chain.kinds(),
      vec![FeatureStruct::Core, FeatureStruct::Vulkan12, FeatureStruct::Vulkan11]
    );
    assert_eq!(chain.get(FeatureStruct::Vulkan12, "timelineSemaphore"), Some(true));
    assert_eq!(chain.get(FeatureStruct::Vulkan11, "multiview"), Some(true));
    assert_eq!(chain.get(FeatureStruct::Core, "samplerAnisotropy"), Some(false));
    assert_eq!(chain.get(FeatureStruct::Core, "nope"), None);
  }

  #[test]
  fn linking_walks_every_struct_and_unlinks_after() {
    let mut chain = FeatureChain::new([FeatureStruct::Vulkan11, FeatureStruct::Vulkan12]);
    let seen = chain.with_linked(|root| {
      let mut types = vec![root.s_type];
      let mut next = root.p_next as *const vk::BaseOutStructure<'_>;
      while !next.is_null() {
        unsafe {
          types.push((*next).s_type);
          next = (*next).p_next as *const vk::BaseOutStructure<'_>;
        }
      }
      root.features.sampler_anisotropy = vk::TRUE;
      types
    });
    assert_eq!(
      seen,
      vec![
        vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
        vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_1_FEATURES,
        vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_2_FEATURES,
      ]
    );
    // writes through the root land in the chain
    assert_eq!(chain.get(FeatureStruct::Core, "samplerAnisotropy"), Some(true));
    assert!(chain.ext.iter().all(|e| match e {
      ExtFeatures::Vulkan11(s) => s.p_next.is_null(),
      ExtFeatures::Vulkan12(s) => s.p_next.is_null(),
    }));
  }

  #[test]
  fn queue_search_is_first_fit_and_stops_early() {
    let fams = [
      family(vk::QueueFlags::TRANSFER, false),
      family(GTC, true),
      family(vk::QueueFlags::COMPUTE, true),
    ];
    let idx = find_queue_families(&fams, true);
    assert_eq!(idx.transfer, Some(0));
    assert_eq!(idx.graphics, Some(1));
    assert_eq!(idx.compute, Some(1));
    assert_eq!(idx.present, Some(1));
    assert_eq!(idx.unique(), vec![1, 0]);

    let headless = find_queue_families(&fams, false);
    assert!(headless.is_complete(false));
    assert_eq!(headless.present, None);
  }

  #[test]
  fn missing_present_family_is_incomplete() {
    let fams = [family(GTC, false)];
    assert!(!find_queue_families(&fams, true).is_complete(true));
    assert!(find_queue_families(&fams, false).is_complete(false));
  }

  struct FakeQuery {
    devices: Vec<DeviceReport>,
    present: bool,
  }

  impl DeviceQuery for FakeQuery {
    type Handle = usize;

    fn devices(&self) -> Result<Vec<usize>> {
      Ok((0..self.devices.len()).collect())
    }

    fn report(&self, device: usize, _request: &CapabilityRequest) -> Result<DeviceReport> {
      Ok(self.devices[device].clone())
    }

    fn needs_present(&self) -> bool {
      self.present
    }
  }

  fn device(name: &str, anisotropy: bool) -> DeviceReport {
    let mut features = FeatureChain::new([]);
    features
      .set(FeatureStruct::Core, "samplerAnisotropy", anisotropy)
      .unwrap();
    DeviceReport {
      name: name.into(),
      api_version: vk::API_VERSION_1_3,
      extensions: vec!["present_swapchain".into(), "other".into()],
      features,
      queue_families: vec![family(GTC, true)],
      surface: Some(SurfaceSummary {
        format_count: 2,
        present_mode_count: 1,
      }),
    }
  }

  fn anisotropy_request() -> CapabilityRequest {
    let mut req = CapabilityRequest::new();
    req.add_device_extension("present_swapchain");
    req.require_feature(FeatureStruct::Core, "samplerAnisotropy").unwrap();
    req
  }

  #[test]
  fn selection_rejects_device_without_required_flag() {
    let query = FakeQuery {
      devices: vec![device("no-aniso", false)],
      present: false,
    };
    let err = select_first_suitable(&query, &anisotropy_request()).unwrap_err();
    let engine = err.downcast_ref::<EngineError>().unwrap();
    assert_eq!(engine, &EngineError::no_suitable_gpu());
    assert!(engine.is_negotiation());
  }

  #[test]
  fn selection_accepts_device_with_required_flag() {
    let query = FakeQuery {
      devices: vec![device("no-aniso", false), device("aniso", true)],
      present: false,
    };
    let picked = select_first_suitable(&query, &anisotropy_request()).unwrap();
    assert_eq!(picked.handle, 1);
    assert!(picked.indices.is_gtc_complete());
    assert_eq!(picked.report.name, "aniso");
  }

  #[test]
  fn selection_is_first_fit_not_best_fit() {
    let mut better = device("second", true);
    better.queue_families = vec![family(GTC, true), family(GTC, true)];
    let query = FakeQuery {
      devices: vec![device("first", true), better],
      present: true,
    };
    assert_eq!(select_first_suitable(&query, &anisotropy_request()).unwrap().handle, 0);
  }

  #[test]
  fn no_devices_is_its_own_error() {
    let query = FakeQuery {
      devices: vec![],
      present: false,
    };
    let err = select_first_suitable(&query, &CapabilityRequest::new()).unwrap_err();
    assert_eq!(err.downcast_ref::<EngineError>(), Some(&EngineError::no_gpu()));
  }

  #[test]
  fn suitability_checks_each_condition() {
    let req = anisotropy_request();
    let ok = device("ok", true);
    assert!(check_suitability(&ok, &req, true).is_ok());

    let mut old = ok.clone();
    old.api_version = vk::API_VERSION_1_1;
    assert!(matches!(check_suitability(&old, &req, true), Err(Rejection::ApiVersion { .. })));

    let mut no_ext = ok.clone();
    no_ext.extensions.clear();
    assert_eq!(
      check_suitability(&no_ext, &req, true),
      Err(Rejection::MissingExtensions(vec!["present_swapchain".into()]))
    );

    let mut no_formats = ok.clone();
    no_formats.surface = Some(SurfaceSummary {
      format_count: 0,
      present_mode_count: 3,
    });
    assert_eq!(check_suitability(&no_formats, &req, true), Err(Rejection::NoSurfaceSupport));
    // surface support is irrelevant off-screen
    assert!(check_suitability(&no_formats, &req, false).is_ok());

    let mut missing_struct = ok;
    let mut req12 = req.clone();
    req12
      .require_feature(FeatureStruct::Vulkan12, "imagelessFramebuffer")
      .unwrap();
    missing_struct.features = FeatureChain::new([]);
    assert_eq!(
      check_suitability(&missing_struct, &req12, true),
      Err(Rejection::MissingFeatures(vec![
        "core.samplerAnisotropy".into(),
        "vulkan12.imagelessFramebuffer".into()
      ]))
    );
  }

  #[test]
  fn viewer_request_has_swapchain_and_features() {
    let req = CapabilityRequest::viewer(true);
    assert!(req.validation_enabled());
    assert!(req.debug_utils_enabled());
    assert!(req.device_extensions().contains(&SWAPCHAIN_EXTENSION.to_string()));
    assert_eq!(req.required_features().count(), 4);
    assert!(!CapabilityRequest::viewer(false).validation_enabled());
  }
}
