// SPDX-License-Identifier: CEPL-1.0
//! Descriptor set layouts, pools and writes.
//!
//! Binding indices are not chosen by hand: each binding takes the next index
//! after the previous binding's descriptor count. Writes are described as
//! `(binding, resource)` pairs checked against the layout they target.

use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use meshview_core::EngineError;

use crate::context::Device;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingSpec {
  pub ty: vk::DescriptorType,
  pub count: u32,
  pub stages: vk::ShaderStageFlags,
}

impl BindingSpec {
  pub fn uniform(stages: vk::ShaderStageFlags) -> Self {
    Self {
      ty: vk::DescriptorType::UNIFORM_BUFFER,
      count: 1,
      stages,
    }
  }

  pub fn sampler(stages: vk::ShaderStageFlags) -> Self {
    Self {
      ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
      count: 1,
      stages,
    }
  }
}

/// Binding index of each entry: the running sum of preceding counts.
pub fn flat_binding_indices(bindings: &[BindingSpec]) -> Vec<u32> {
  bindings
    .iter()
    .scan(0u32, |next, b| {
      let here = *next;
      *next += b.count;
      Some(here)
    })
    .collect()
}

#[derive(Clone, Debug)]
pub enum DescriptorResource {
  Buffers(Vec<vk::DescriptorBufferInfo>),
  Images(Vec<vk::DescriptorImageInfo>),
}

impl DescriptorResource {
  pub fn buffer(info: vk::DescriptorBufferInfo) -> Self {
    Self::Buffers(vec![info])
  }

  pub fn image(info: vk::DescriptorImageInfo) -> Self {
    Self::Images(vec![info])
  }

  fn len(&self) -> usize {
    match self {
      Self::Buffers(v) => v.len(),
      Self::Images(v) => v.len(),
    }
  }

  fn accepts(&self, ty: vk::DescriptorType) -> bool {
    match self {
      Self::Buffers(_) => matches!(
        ty,
        vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::STORAGE_BUFFER
      ),
      Self::Images(_) => matches!(
        ty,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER
          | vk::DescriptorType::SAMPLED_IMAGE
          | vk::DescriptorType::STORAGE_IMAGE
      ),
    }
  }
}

/// One binding of a set together with what it points at.
#[derive(Clone, Debug)]
pub struct BoundResource {
  pub binding: BindingSpec,
  pub resource: DescriptorResource,
}

impl BoundResource {
  pub fn uniform(stages: vk::ShaderStageFlags, info: vk::DescriptorBufferInfo) -> Self {
    Self {
      binding: BindingSpec::uniform(stages),
      resource: DescriptorResource::buffer(info),
    }
  }

  pub fn sampler(stages: vk::ShaderStageFlags, info: vk::DescriptorImageInfo) -> Self {
    Self {
      binding: BindingSpec::sampler(stages),
      resource: DescriptorResource::image(info),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedWrite {
  pub dst_binding: u32,
  pub ty: vk::DescriptorType,
  pub count: u32,
}

/// Validates `bound` against `layout` entry by entry and assigns each write
/// its binding index.
pub fn plan_writes(layout: &[BindingSpec], bound: &[BoundResource]) -> Result<Vec<PlannedWrite>, EngineError> {
  if layout.len() != bound.len() {
    return Err(EngineError::DescriptorMismatch(format!(
      "layout has {} bindings, {} resources supplied",
      layout.len(),
      bound.len()
    )));
  }
  let indices = flat_binding_indices(layout);
  layout
    .iter()
    .zip(bound)
    .zip(indices)
    .map(|((want, got), dst_binding)| {
      if *want != got.binding {
        return Err(EngineError::DescriptorMismatch(format!(
          "binding {dst_binding}: layout expects {want:?}, got {:?}",
          got.binding
        )));
      }
      if !got.resource.accepts(want.ty) || got.resource.len() != want.count as usize {
        return Err(EngineError::DescriptorMismatch(format!(
          "binding {dst_binding}: {} resource(s) of the wrong kind or count for {:?} x{}",
          got.resource.len(),
          want.ty,
          want.count
        )));
      }
      Ok(PlannedWrite {
        dst_binding,
        ty: want.ty,
        count: want.count,
      })
    })
    .collect()
}

pub struct SetLayout {
  device: Arc<Device>,
  raw: vk::DescriptorSetLayout,
  bindings: Vec<BindingSpec>,
}

impl SetLayout {
  pub fn new(device: &Arc<Device>, bindings: Vec<BindingSpec>, name: &str) -> Result<Self> {
    let raw_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
      .iter()
      .zip(flat_binding_indices(&bindings))
      .map(|(b, binding)| vk::DescriptorSetLayoutBinding {
        binding,
        descriptor_type: b.ty,
        descriptor_count: b.count,
        stage_flags: b.stages,
        ..Default::default()
      })
      .collect();
    let ci = vk::DescriptorSetLayoutCreateInfo {
      s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
      binding_count: raw_bindings.len() as u32,
      p_bindings: raw_bindings.as_ptr(),
      ..Default::default()
    };
    let raw = unsafe { device.create_descriptor_set_layout(&ci, None) }
      .with_context(|| format!("create_descriptor_set_layout({name})"))?;
    device.set_name(raw, name);
    Ok(Self {
      device: Arc::clone(device),
      raw,
      bindings,
    })
  }

  pub fn raw(&self) -> vk::DescriptorSetLayout {
    self.raw
  }

  pub fn bindings(&self) -> &[BindingSpec] {
    &self.bindings
  }
}

impl Drop for SetLayout {
  fn drop(&mut self) {
    unsafe { self.device.destroy_descriptor_set_layout(self.raw, None) };
  }
}

/// Destroying the pool frees every set allocated from it.
pub struct DescriptorPool {
  device: Arc<Device>,
  raw: vk::DescriptorPool,
}

impl DescriptorPool {
  pub fn new(device: &Arc<Device>, max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> Result<Self> {
    let ci = vk::DescriptorPoolCreateInfo {
      s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
      max_sets,
      pool_size_count: sizes.len() as u32,
      p_pool_sizes: sizes.as_ptr(),
      ..Default::default()
    };
    let raw = unsafe { device.create_descriptor_pool(&ci, None) }.context("create_descriptor_pool")?;
    Ok(Self {
      device: Arc::clone(device),
      raw,
    })
  }

  pub fn raw(&self) -> vk::DescriptorPool {
    self.raw
  }

  /// Allocates one set of `layout` and writes `bound` into it.
  pub fn create_set(&self, layout: &SetLayout, bound: &[BoundResource]) -> Result<vk::DescriptorSet> {
    let mut sets = self.create_sets(layout, std::slice::from_ref(&bound.to_vec()))?;
    Ok(sets.remove(0))
  }

  /// Allocates one set of `layout` per entry of `per_set` in a single call.
  pub fn create_sets(&self, layout: &SetLayout, per_set: &[Vec<BoundResource>]) -> Result<Vec<vk::DescriptorSet>> {
    let plans = per_set
      .iter()
      .map(|bound| plan_writes(layout.bindings(), bound))
      .collect::<Result<Vec<_>, _>>()?;
    if per_set.is_empty() {
      return Ok(Vec::new());
    }

    let layouts = vec![layout.raw; per_set.len()];
    let ai = vk::DescriptorSetAllocateInfo {
      s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
      descriptor_pool: self.raw,
      descriptor_set_count: layouts.len() as u32,
      p_set_layouts: layouts.as_ptr(),
      ..Default::default()
    };
    let sets = unsafe { self.device.allocate_descriptor_sets(&ai) }.context("allocate_descriptor_sets")?;

    for ((set, bound), plan) in sets.iter().zip(per_set).zip(&plans) {
      write_set(&self.device, *set, bound, plan);
    }
    Ok(sets)
  }
}

fn write_set(device: &ash::Device, set: vk::DescriptorSet, bound: &[BoundResource], plan: &[PlannedWrite]) {
  let writes: Vec<vk::WriteDescriptorSet> = bound
    .iter()
    .zip(plan)
    .map(|(b, p)| {
      let mut w = vk::WriteDescriptorSet {
        s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
        dst_set: set,
        dst_binding: p.dst_binding,
        dst_array_element: 0,
        descriptor_type: p.ty,
        descriptor_count: p.count,
        ..Default::default()
      };
      match &b.resource {
        DescriptorResource::Buffers(infos) => w.p_buffer_info = infos.as_ptr(),
        DescriptorResource::Images(infos) => w.p_image_info = infos.as_ptr(),
      }
      w
    })
    .collect();
  unsafe { device.update_descriptor_sets(&writes, &[]) };
}

impl Drop for DescriptorPool {
  fn drop(&mut self) {
    unsafe { self.device.destroy_descriptor_pool(self.raw, None) };
  }
}

/// Every descriptor type an overlay toolkit may allocate, `per_type` each.
pub fn gui_pool_sizes(per_type: u32) -> Vec<vk::DescriptorPoolSize> {
  [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::INPUT_ATTACHMENT,
  ]
  .into_iter()
  .map(|ty| vk::DescriptorPoolSize {
    ty,
    descriptor_count: per_type,
  })
  .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  const FS: vk::ShaderStageFlags = vk::ShaderStageFlags::FRAGMENT;

  fn spec(ty: vk::DescriptorType, count: u32) -> BindingSpec {
    BindingSpec {
      ty,
      count,
      stages: FS,
    }
  }

  #[test]
  fn binding_indices_accumulate_counts() {
    let ub = vk::DescriptorType::UNIFORM_BUFFER;
    let bindings = [spec(ub, 1), spec(ub, 1), spec(ub, 3), spec(ub, 1)];
    assert_eq!(flat_binding_indices(&bindings), vec![0, 1, 2, 5]);
    assert!(flat_binding_indices(&[]).is_empty());
  }

  fn image_info() -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo {
      sampler: vk::Sampler::null(),
      image_view: vk::ImageView::null(),
      image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
  }

  #[test]
  fn writes_follow_layout_indices() {
    let layout = [
      BindingSpec::uniform(FS),
      spec(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2),
      BindingSpec::sampler(FS),
    ];
    let bound = [
      BoundResource::uniform(FS, vk::DescriptorBufferInfo::default()),
      BoundResource {
        binding: layout[1],
        resource: DescriptorResource::Images(vec![image_info(); 2]),
      },
      BoundResource::sampler(FS, image_info()),
    ];
    let plan = plan_writes(&layout, &bound).unwrap();
    let bindings: Vec<u32> = plan.iter().map(|p| p.dst_binding).collect();
    assert_eq!(bindings, vec![0, 1, 3]);
    assert_eq!(plan[1].count, 2);
  }

  #[test]
  fn mismatched_resources_are_rejected() {
    let layout = [BindingSpec::uniform(FS), BindingSpec::sampler(FS)];

    let short = [BoundResource::uniform(FS, Default::default())];
    assert!(matches!(
      plan_writes(&layout, &short),
      Err(EngineError::DescriptorMismatch(_))
    ));

    let swapped = [
      BoundResource::sampler(FS, image_info()),
      BoundResource::uniform(FS, Default::default()),
    ];
    assert!(plan_writes(&layout, &swapped).is_err());

    let wrong_kind = [
      BoundResource::uniform(FS, Default::default()),
      BoundResource {
        binding: BindingSpec::sampler(FS),
        resource: DescriptorResource::buffer(Default::default()),
      },
    ];
    assert!(plan_writes(&layout, &wrong_kind).is_err());
  }

  #[test]
  fn gui_pool_covers_eleven_types() {
    let sizes = gui_pool_sizes(1000);
    assert_eq!(sizes.len(), 11);
    assert!(sizes.iter().all(|s| s.descriptor_count == 1000));
  }
}
