// SPDX-License-Identifier: CEPL-1.0
//! std140 mirrors of the shader uniform blocks.

use bytemuck::{Pod, Zeroable};
use meshview_render::{Material, SceneMatrices, TextureSlot};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUbo {
  pub model: [[f32; 4]; 4],
  pub view: [[f32; 4]; 4],
  pub proj: [[f32; 4]; 4],
  pub camera_pos: [f32; 3],
  pub _pad: f32,
}

impl CameraUbo {
  pub fn from_scene(s: &SceneMatrices) -> Self {
    Self {
      model: s.model.to_cols_array_2d(),
      view: s.view.to_cols_array_2d(),
      proj: s.proj.to_cols_array_2d(),
      camera_pos: s.camera_pos.to_array(),
      _pad: 0.0,
    }
  }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightUbo {
  pub light_pos: [f32; 3],
  pub _pad0: f32,
  pub light_color: [f32; 3],
  pub _pad1: f32,
  pub light_mvp: [[f32; 4]; 4],
}

impl LightUbo {
  pub fn from_scene(s: &SceneMatrices) -> Self {
    Self {
      light_pos: s.light_pos.to_array(),
      _pad0: 0.0,
      light_color: s.light_color.to_array(),
      _pad1: 0.0,
      light_mvp: s.light_mvp.to_cols_array_2d(),
    }
  }
}

/// `illum` packs into the tail of the `emission` vec3. Texture ids are
/// indices into the scene texture table, 0 meaning "none".
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialUbo {
  pub ambient: [f32; 3],
  pub _pad0: f32,
  pub diffuse: [f32; 3],
  pub _pad1: f32,
  pub specular: [f32; 3],
  pub _pad2: f32,
  pub transmittance: [f32; 3],
  pub _pad3: f32,
  pub emission: [f32; 3],
  pub illum: i32,
  pub shininess: f32,
  pub ior: f32,
  pub dissolve: f32,
  pub roughness: f32,
  pub metallic: f32,
  pub sheen: f32,
  pub clearcoat_thickness: f32,
  pub clearcoat_roughness: f32,
  pub anisotropy: f32,
  pub anisotropy_rotation: f32,
  pub texture_ids: [i32; TextureSlot::COUNT],
  pub _pad4: [i32; 1],
}

impl MaterialUbo {
  pub fn new(m: &Material, texture_ids: [i32; TextureSlot::COUNT]) -> Self {
    Self {
      ambient: m.ambient,
      diffuse: m.diffuse,
      specular: m.specular,
      transmittance: m.transmittance,
      emission: m.emission,
      illum: m.illum,
      shininess: m.shininess,
      ior: m.ior,
      dissolve: m.dissolve,
      roughness: m.roughness,
      metallic: m.metallic,
      sheen: m.sheen,
      clearcoat_thickness: m.clearcoat_thickness,
      clearcoat_roughness: m.clearcoat_roughness,
      anisotropy: m.anisotropy,
      anisotropy_rotation: m.anisotropy_rotation,
      texture_ids,
      ..Default::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use std::mem::{offset_of, size_of};

  use meshview_math::glam::{Mat4, Vec3};

  use super::*;

  #[test]
  fn std140_sizes() {
    assert_eq!(size_of::<CameraUbo>(), 208);
    assert_eq!(size_of::<LightUbo>(), 96);
    assert_eq!(size_of::<MaterialUbo>(), 176);
    assert_eq!(size_of::<MaterialUbo>() % 16, 0);
  }

  #[test]
  fn material_offsets() {
    assert_eq!(offset_of!(MaterialUbo, emission), 64);
    assert_eq!(offset_of!(MaterialUbo, illum), 76);
    assert_eq!(offset_of!(MaterialUbo, shininess), 80);
    assert_eq!(offset_of!(MaterialUbo, anisotropy_rotation), 116);
    assert_eq!(offset_of!(MaterialUbo, texture_ids), 120);
    assert_eq!(offset_of!(LightUbo, light_color), 16);
    assert_eq!(offset_of!(LightUbo, light_mvp), 32);
    assert_eq!(offset_of!(CameraUbo, camera_pos), 192);
  }

  #[test]
  fn scene_maps_column_major() {
    let scene = SceneMatrices {
      model: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
      view: Mat4::IDENTITY,
      proj: Mat4::IDENTITY,
      camera_pos: Vec3::new(0.0, 0.0, 5.0),
      light_pos: Vec3::X,
      light_color: Vec3::splat(2.0),
      light_mvp: Mat4::IDENTITY,
    };
    let cam = CameraUbo::from_scene(&scene);
    assert_eq!(cam.model[3], [1.0, 2.0, 3.0, 1.0]);
    assert_eq!(cam.camera_pos, [0.0, 0.0, 5.0]);

    let light = LightUbo::from_scene(&scene);
    assert_eq!(light.light_color, [2.0; 3]);
    assert_eq!(light.light_pos, [1.0, 0.0, 0.0]);
  }

  #[test]
  fn material_copies_fields() {
    let mut ids = [0; TextureSlot::COUNT];
    ids[TextureSlot::Diffuse.index()] = 3;
    let m = Material {
      illum: 2,
      ..Material::fallback()
    };
    let ubo = MaterialUbo::new(&m, ids);
    assert_eq!(ubo.diffuse, [0.5; 3]);
    assert_eq!(ubo.illum, 2);
    assert_eq!(ubo.texture_ids[1], 3);
  }
}
