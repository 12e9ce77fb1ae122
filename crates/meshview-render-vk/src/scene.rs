// SPDX-License-Identifier: CEPL-1.0
//! GPU copies of one model: geometry, textures, materials and the set
//! layouts every pipeline is built against. Independent of the swapchain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ash::vk;
use meshview_math::mip_levels;
use meshview_render::{MaterialGroup, ModelData, TextureSlot, TextureSource};
use tracing::{info, warn};

use crate::buffer::GpuBuffer;
use crate::commands::CommandPool;
use crate::context::DeviceContext;
use crate::descriptor::{BindingSpec, BoundResource, DescriptorPool, SetLayout};
use crate::image::{find_depth_format, GpuImage, ImageSpec, Sampler, SamplerSpec};
use crate::uniforms::MaterialUbo;

const VS_FS: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
  vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);
const FS: vk::ShaderStageFlags = vk::ShaderStageFlags::FRAGMENT;

/// Minimum capacity of the material descriptor pool.
const MATERIAL_POOL_FLOOR: usize = 1000;

pub struct SetLayouts {
  /// camera UBO, light UBO, shadow map
  pub scene: SetLayout,
  pub camera: SetLayout,
  pub light: SetLayout,
  /// material UBO followed by one sampler per [`TextureSlot::SAMPLED`]
  pub material: SetLayout,
}

impl SetLayouts {
  pub fn new(ctx: &DeviceContext) -> Result<Self> {
    let device = &ctx.device;
    let mut material = vec![BindingSpec::uniform(VS_FS)];
    material.extend(TextureSlot::SAMPLED.iter().map(|_| BindingSpec::sampler(FS)));
    Ok(Self {
      scene: SetLayout::new(
        device,
        vec![
          BindingSpec::uniform(VS_FS),
          BindingSpec::uniform(VS_FS),
          BindingSpec::sampler(FS),
        ],
        "scene set layout",
      )?,
      camera: SetLayout::new(device, vec![BindingSpec::uniform(VS_FS)], "camera set layout")?,
      light: SetLayout::new(device, vec![BindingSpec::uniform(VS_FS)], "light set layout")?,
      material: SetLayout::new(device, material, "material set layout")?,
    })
  }

  pub fn scene_bindings(
    camera: vk::DescriptorBufferInfo,
    light: vk::DescriptorBufferInfo,
    shadow: vk::DescriptorImageInfo,
  ) -> Vec<BoundResource> {
    vec![
      BoundResource::uniform(VS_FS, camera),
      BoundResource::uniform(VS_FS, light),
      BoundResource::sampler(FS, shadow),
    ]
  }

  pub fn uniform_bindings(info: vk::DescriptorBufferInfo) -> Vec<BoundResource> {
    vec![BoundResource::uniform(VS_FS, info)]
  }
}

/// Assigns scene texture indices to paths; index 0 is the empty texture.
#[derive(Debug)]
pub struct TextureTable {
  by_path: HashMap<PathBuf, usize>,
  next: usize,
}

impl Default for TextureTable {
  fn default() -> Self {
    Self {
      by_path: HashMap::new(),
      next: 1,
    }
  }
}

impl TextureTable {
  /// Returns the index for `path`, calling `load` the first time it is seen.
  /// A failed load maps the path to 0 and is not retried.
  pub fn resolve(&mut self, path: &Path, load: impl FnOnce(&Path) -> Result<()>) -> usize {
    if let Some(&i) = self.by_path.get(path) {
      return i;
    }
    let index = match load(path) {
      Ok(()) => {
        let i = self.next;
        self.next += 1;
        i
      }
      Err(e) => {
        warn!("texture {}: {e:#}; using the empty texture", path.display());
        0
      }
    };
    self.by_path.insert(path.to_path_buf(), index);
    index
  }
}

/// Every material's texture ids, in [`TextureSlot::ALL`] order.
pub fn material_texture_ids(
  model: &ModelData,
  table: &mut TextureTable,
  mut load: impl FnMut(&Path) -> Result<()>,
) -> Vec<[i32; TextureSlot::COUNT]> {
  model
    .materials
    .iter()
    .map(|m| {
      let mut ids = [0i32; TextureSlot::COUNT];
      for slot in TextureSlot::ALL {
        if let Some(path) = m.texture(slot) {
          ids[slot.index()] = table.resolve(path, &mut load) as i32;
        }
      }
      ids
    })
    .collect()
}

/// Index of the material whose set draws `material`; ids past the table use
/// the fallback material 0.
pub fn material_slot(material: u32, material_count: usize) -> usize {
  let i = material as usize;
  if i < material_count {
    i
  } else {
    0
  }
}

pub struct SceneResources {
  // STRICT TEARDOWN ORDER: sets (freed with their pool) before what they reference.
  _material_pool: DescriptorPool,
  material_sets: Vec<vk::DescriptorSet>,
  _material_ubos: Vec<GpuBuffer>,
  layouts: SetLayouts,
  default_shadow: GpuImage,
  shadow_sampler: Sampler,
  _texture_sampler: Sampler,
  _textures: Vec<GpuImage>,
  vertex: GpuBuffer,
  index: GpuBuffer,
  groups: Vec<MaterialGroup>,
  index_count: u32,
  depth_format: vk::Format,
}

impl SceneResources {
  pub fn new(
    ctx: &DeviceContext,
    pool: &CommandPool,
    model: &ModelData,
    source: &dyn TextureSource,
    max_lod: f32,
  ) -> Result<Self> {
    model.validate().context("model data")?;
    let queue = ctx.queues.graphics;

    let vertex = GpuBuffer::with_data(
      ctx,
      pool,
      queue,
      vk::BufferUsageFlags::VERTEX_BUFFER,
      bytemuck::cast_slice(&model.vertices),
    )?;
    let index = GpuBuffer::with_data(
      ctx,
      pool,
      queue,
      vk::BufferUsageFlags::INDEX_BUFFER,
      bytemuck::cast_slice(&model.indices),
    )?;
    ctx.device.set_name(vertex.raw(), "vertex buffer");
    ctx.device.set_name(index.raw(), "index buffer");

    // --- Textures ---
    let mut textures = vec![GpuImage::empty_texture(ctx, pool, queue)?];
    let mut table = TextureTable::default();
    let ids = material_texture_ids(model, &mut table, |path| {
      let tex = upload_texture(ctx, pool, queue, source, path)?;
      textures.push(tex);
      Ok(())
    });

    let texture_sampler = Sampler::new(
      &ctx.device,
      SamplerSpec {
        max_anisotropy: ctx.max_anisotropy(),
        max_lod,
      },
    )?;
    let shadow_sampler = Sampler::new(
      &ctx.device,
      SamplerSpec {
        max_anisotropy: ctx.max_anisotropy(),
        max_lod: 1.0,
      },
    )?;

    let depth_format = find_depth_format(ctx)?;
    let default_shadow = GpuImage::new(ctx, ImageSpec::shadow_map(1, depth_format))?;
    default_shadow.set_name("default shadow map");
    default_shadow.fill_depth(pool, queue, 1.0)?;

    // --- Materials ---
    let layouts = SetLayouts::new(ctx)?;
    let mut material_ubos = Vec::with_capacity(model.materials.len());
    let mut per_set = Vec::with_capacity(model.materials.len());
    for (i, (m, ids)) in model.materials.iter().zip(&ids).enumerate() {
      let ubo = GpuBuffer::uniform::<MaterialUbo>(ctx)?;
      ubo.write(&MaterialUbo::new(m, *ids))?;
      ctx.device.set_name(ubo.raw(), &format!("material {i} ubo"));

      let mut bound = vec![BoundResource::uniform(VS_FS, ubo.descriptor_info())];
      bound.extend(TextureSlot::SAMPLED.iter().map(|slot| {
        let tex = &textures[ids[slot.index()] as usize];
        BoundResource::sampler(
          FS,
          vk::DescriptorImageInfo {
            sampler: texture_sampler.raw(),
            image_view: tex.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
          },
        )
      }));
      per_set.push(bound);
      material_ubos.push(ubo);
    }

    let capacity = model.materials.len().max(MATERIAL_POOL_FLOOR) as u32;
    let material_pool = DescriptorPool::new(
      &ctx.device,
      capacity,
      &[
        vk::DescriptorPoolSize {
          ty: vk::DescriptorType::UNIFORM_BUFFER,
          descriptor_count: capacity,
        },
        vk::DescriptorPoolSize {
          ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
          descriptor_count: capacity * TextureSlot::SAMPLED.len() as u32,
        },
      ],
    )?;
    let material_sets = material_pool.create_sets(&layouts.material, &per_set)?;

    let groups: Vec<MaterialGroup> = model.shapes.iter().flat_map(|s| s.groups.iter().copied()).collect();
    info!(
      "scene: {} vertices, {} indices, {} shapes, {} groups, {} materials, {} textures",
      model.vertices.len(),
      model.indices.len(),
      model.shapes.len(),
      groups.len(),
      model.materials.len(),
      textures.len() - 1
    );

    Ok(Self {
      _material_pool: material_pool,
      material_sets,
      _material_ubos: material_ubos,
      layouts,
      default_shadow,
      shadow_sampler,
      _texture_sampler: texture_sampler,
      _textures: textures,
      vertex,
      index,
      groups,
      index_count: model.indices.len() as u32,
      depth_format,
    })
  }

  pub fn layouts(&self) -> &SetLayouts {
    &self.layouts
  }

  /// Ids are checked by [`ModelData::validate`] at upload; anything out of
  /// range still draws with the fallback material.
  pub fn material_set(&self, material: u32) -> vk::DescriptorSet {
    let slot = material_slot(material, self.material_sets.len());
    self.material_sets.get(slot).copied().unwrap_or_default()
  }

  pub fn groups(&self) -> &[MaterialGroup] {
    &self.groups
  }

  pub fn index_count(&self) -> u32 {
    self.index_count
  }

  pub fn vertex_buffer(&self) -> vk::Buffer {
    self.vertex.raw()
  }

  pub fn index_buffer(&self) -> vk::Buffer {
    self.index.raw()
  }

  pub fn depth_format(&self) -> vk::Format {
    self.depth_format
  }

  pub fn shadow_info(&self, view: vk::ImageView) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo {
      sampler: self.shadow_sampler.raw(),
      image_view: view,
      image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
  }

  /// Shadow lookup for sets used while shadow mapping is off.
  pub fn default_shadow_info(&self) -> vk::DescriptorImageInfo {
    self.shadow_info(self.default_shadow.view())
  }
}

fn upload_texture(
  ctx: &DeviceContext,
  pool: &CommandPool,
  queue: vk::Queue,
  source: &dyn TextureSource,
  path: &Path,
) -> Result<GpuImage> {
  let img = source.load_rgba8(path)?;
  let levels = mip_levels(img.width, img.height);
  let tex = GpuImage::new(ctx, ImageSpec::texture(img.width, img.height, levels))?;
  tex.set_name(&path.display().to_string());
  tex.fill_pixels(ctx, pool, queue, &img.pixels)?;
  tex.generate_mipmaps(ctx, pool, queue)?;
  Ok(tex)
}

#[cfg(test)]
mod tests {
  use anyhow::anyhow;
  use meshview_render::Material;

  use super::*;

  fn textured(paths: &[(TextureSlot, &str)]) -> Material {
    let mut m = Material::fallback();
    for (slot, p) in paths {
      m.textures[slot.index()] = Some(PathBuf::from(p));
    }
    m
  }

  #[test]
  fn shared_paths_load_once() {
    let mut model = ModelData::unit_cube();
    model.materials.push(textured(&[(TextureSlot::Diffuse, "a.png"), (TextureSlot::Bump, "b.png")]));
    model.materials.push(textured(&[(TextureSlot::Ambient, "a.png")]));

    let mut loads = Vec::new();
    let mut table = TextureTable::default();
    let ids = material_texture_ids(&model, &mut table, |p| {
      loads.push(p.to_path_buf());
      Ok(())
    });

    assert_eq!(loads, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
    assert_eq!(ids[0], [0; TextureSlot::COUNT]);
    assert_eq!(ids[1][TextureSlot::Diffuse.index()], 1);
    assert_eq!(ids[1][TextureSlot::Bump.index()], 2);
    assert_eq!(ids[2][TextureSlot::Ambient.index()], 1);
  }

  #[test]
  fn failed_load_falls_back_to_zero() {
    let mut model = ModelData::unit_cube();
    model.materials.push(textured(&[(TextureSlot::Diffuse, "missing.png"), (TextureSlot::Alpha, "ok.png")]));
    model.materials.push(textured(&[(TextureSlot::Diffuse, "missing.png")]));

    let mut attempts = 0;
    let mut table = TextureTable::default();
    let ids = material_texture_ids(&model, &mut table, |p| {
      attempts += 1;
      if p == Path::new("missing.png") {
        Err(anyhow!("not found"))
      } else {
        Ok(())
      }
    });

    assert_eq!(attempts, 2);
    assert_eq!(ids[1][TextureSlot::Diffuse.index()], 0);
    assert_eq!(ids[1][TextureSlot::Alpha.index()], 1);
    assert_eq!(ids[2][TextureSlot::Diffuse.index()], 0);
  }

  #[test]
  fn unknown_material_draws_with_the_fallback() {
    assert_eq!(material_slot(0, 3), 0);
    assert_eq!(material_slot(2, 3), 2);
    assert_eq!(material_slot(3, 3), 0);
    assert_eq!(material_slot(u32::MAX, 3), 0);
  }
}
