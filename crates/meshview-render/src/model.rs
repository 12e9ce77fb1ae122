// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use anyhow::{bail, Result};
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
  pub pos: [f32; 3],
  pub color: [f32; 3],
  pub tex_coord: [f32; 2],
  pub normal: [f32; 3],
  /// Index into [`ModelData::materials`].
  pub material_id: i32,
}

/// A contiguous index range drawn with one material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaterialGroup {
  pub index_base: u32,
  pub index_count: u32,
  pub material_id: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shape {
  pub name: String,
  pub groups: Vec<MaterialGroup>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
  Ambient,
  Diffuse,
  Specular,
  SpecularHighlight,
  Bump,
  Displacement,
  Alpha,
  Reflection,
  Roughness,
  Metallic,
  Sheen,
  Emissive,
  Normal,
}

impl TextureSlot {
  pub const COUNT: usize = 13;

  pub const ALL: [TextureSlot; Self::COUNT] = [
    TextureSlot::Ambient,
    TextureSlot::Diffuse,
    TextureSlot::Specular,
    TextureSlot::SpecularHighlight,
    TextureSlot::Bump,
    TextureSlot::Displacement,
    TextureSlot::Alpha,
    TextureSlot::Reflection,
    TextureSlot::Roughness,
    TextureSlot::Metallic,
    TextureSlot::Sheen,
    TextureSlot::Emissive,
    TextureSlot::Normal,
  ];

  /// The slots the material descriptor set samples from, in binding order.
  pub const SAMPLED: [TextureSlot; 8] = [
    TextureSlot::Ambient,
    TextureSlot::Diffuse,
    TextureSlot::Specular,
    TextureSlot::SpecularHighlight,
    TextureSlot::Bump,
    TextureSlot::Displacement,
    TextureSlot::Alpha,
    TextureSlot::Reflection,
  ];

  pub fn index(self) -> usize {
    self as usize
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
  pub name: String,
  pub ambient: [f32; 3],
  pub diffuse: [f32; 3],
  pub specular: [f32; 3],
  pub transmittance: [f32; 3],
  pub emission: [f32; 3],
  pub shininess: f32,
  pub ior: f32,
  pub dissolve: f32,
  pub illum: i32,
  pub roughness: f32,
  pub metallic: f32,
  pub sheen: f32,
  pub clearcoat_thickness: f32,
  pub clearcoat_roughness: f32,
  pub anisotropy: f32,
  pub anisotropy_rotation: f32,
  /// Texture file per [`TextureSlot`], indexed by `TextureSlot::index`.
  pub textures: [Option<PathBuf>; TextureSlot::COUNT],
}

impl Default for Material {
  fn default() -> Self {
    Self {
      name: String::new(),
      ambient: [0.0; 3],
      diffuse: [0.0; 3],
      specular: [0.0; 3],
      transmittance: [0.0; 3],
      emission: [0.0; 3],
      shininess: 1.0,
      ior: 1.0,
      dissolve: 1.0,
      illum: 0,
      roughness: 0.0,
      metallic: 0.0,
      sheen: 0.0,
      clearcoat_thickness: 0.0,
      clearcoat_roughness: 0.0,
      anisotropy: 0.0,
      anisotropy_rotation: 0.0,
      textures: Default::default(),
    }
  }
}

impl Material {
  /// Mid-grey diffuse material used for geometry without one.
  pub fn fallback() -> Self {
    Self {
      name: "default".into(),
      diffuse: [0.5; 3],
      ..Default::default()
    }
  }

  pub fn texture(&self, slot: TextureSlot) -> Option<&PathBuf> {
    self.textures[slot.index()].as_ref()
  }
}

/// Decoded RGBA8 pixels, row-major, tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureImage {
  pub width: u32,
  pub height: u32,
  pub pixels: Vec<u8>,
}

impl TextureImage {
  pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
    let texels = (width as usize) * (height as usize);
    Self {
      width,
      height,
      pixels: rgba.repeat(texels),
    }
  }
}

/// Flattened geometry plus the material table it refers to.
///
/// `materials[0]` is always the fallback material.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelData {
  pub vertices: Vec<Vertex>,
  pub indices: Vec<u32>,
  pub shapes: Vec<Shape>,
  pub materials: Vec<Material>,
}

impl ModelData {
  pub fn positions(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
    self.vertices.iter().map(|v| v.pos)
  }

  pub fn group_count(&self) -> usize {
    self.shapes.iter().map(|s| s.groups.len()).sum()
  }

  /// Checks that every index, group span and material id is in range.
  pub fn validate(&self) -> Result<()> {
    if self.materials.is_empty() {
      bail!("model has no material table");
    }
    let vcount = self.vertices.len() as u32;
    if let Some(bad) = self.indices.iter().find(|&&i| i >= vcount) {
      bail!("index {bad} out of range for {vcount} vertices");
    }
    for shape in &self.shapes {
      for g in &shape.groups {
        let end = g.index_base as usize + g.index_count as usize;
        if end > self.indices.len() {
          bail!("shape `{}` group ends at {end}, past {} indices", shape.name, self.indices.len());
        }
        if g.material_id as usize >= self.materials.len() {
          bail!("shape `{}` uses missing material {}", shape.name, g.material_id);
        }
      }
    }
    Ok(())
  }

  /// Axis-aligned unit cube with per-face normals, shown when no model file
  /// is given.
  pub fn unit_cube() -> Self {
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
      // normal, u axis, v axis
      ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
      ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
      ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
      ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
      ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
      ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u, v) in FACES {
      let base = vertices.len() as u32;
      for (su, sv) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
        let pos = [0, 1, 2].map(|k| 0.5 * (n[k] + su * u[k] + sv * v[k]));
        vertices.push(Vertex {
          pos,
          color: [1.0; 3],
          tex_coord: [(su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5],
          normal: n,
          material_id: 0,
        });
      }
      indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    let count = indices.len() as u32;
    Self {
      vertices,
      indices,
      shapes: vec![Shape {
        name: "cube".into(),
        groups: vec![MaterialGroup {
          index_base: 0,
          index_count: count,
          material_id: 0,
        }],
      }],
      materials: vec![Material::fallback()],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn vertex_is_tightly_packed() {
    assert_eq!(std::mem::size_of::<Vertex>(), 48);
    assert_eq!(std::mem::offset_of!(Vertex, normal), 32);
    assert_eq!(std::mem::offset_of!(Vertex, material_id), 44);
  }

  #[test]
  fn cube_is_valid_and_counter_clockwise() {
    let cube = ModelData::unit_cube();
    cube.validate().unwrap();
    assert_eq!(cube.vertices.len(), 24);
    assert_eq!(cube.indices.len(), 36);
    assert_eq!(cube.group_count(), 1);

    for tri in cube.indices.chunks(3) {
      let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| cube.vertices[i as usize]);
      let e1 = [0, 1, 2].map(|k| b.pos[k] - a.pos[k]);
      let e2 = [0, 1, 2].map(|k| c.pos[k] - a.pos[k]);
      let cross = [
        e1[1] * e2[2] - e1[2] * e2[1],
        e1[2] * e2[0] - e1[0] * e2[2],
        e1[0] * e2[1] - e1[1] * e2[0],
      ];
      let dot: f32 = (0..3).map(|k| cross[k] * a.normal[k]).sum();
      assert!(dot > 0.0, "triangle winds against its normal");
    }
  }

  #[test]
  fn validate_rejects_bad_spans() {
    let mut cube = ModelData::unit_cube();
    cube.shapes[0].groups[0].index_count = 40;
    assert!(cube.validate().is_err());

    let mut cube = ModelData::unit_cube();
    cube.shapes[0].groups[0].material_id = 3;
    assert!(cube.validate().is_err());
  }

  #[test]
  fn fallback_material_is_grey() {
    let m = Material::fallback();
    assert_eq!(m.diffuse, [0.5; 3]);
    assert!(m.texture(TextureSlot::Diffuse).is_none());
    assert_eq!(TextureSlot::Normal.index(), 12);
  }
}
