// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec3};

use crate::{Camera, ModelFraming};

const FOV_DEG: f32 = 60.0;
const NEAR: f32 = 0.1;

/// Point light orbiting the model in the XY plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
  pub angle_deg: f32,
  pub density: f32,
  pub distance: f32,
}

impl Default for Light {
  fn default() -> Self {
    Self {
      angle_deg: 45.0,
      density: 2.0,
      distance: 10.0,
    }
  }
}

impl Light {
  pub fn position(&self) -> Vec3 {
    Mat4::from_rotation_z(self.angle_deg.to_radians())
      .transform_point3(Vec3::new(self.distance, 0.0, 0.0))
  }

  pub fn color(&self) -> Vec3 {
    Vec3::splat(self.density)
  }
}

/// Everything the shaders need for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneMatrices {
  pub model: Mat4,
  pub view: Mat4,
  pub proj: Mat4,
  pub camera_pos: Vec3,
  pub light_pos: Vec3,
  pub light_color: Vec3,
  pub light_mvp: Mat4,
}

impl SceneMatrices {
  /// `aspect` is the swapchain width/height, `shadow_aspect` the shadow
  /// map's. Projections use a 0..1 depth range with Y pointing down in
  /// clip space.
  pub fn compute(
    camera: &Camera,
    light: &Light,
    framing: &ModelFraming,
    aspect: f32,
    shadow_aspect: f32,
  ) -> Self {
    let mut proj =
      Mat4::perspective_rh(FOV_DEG.to_radians(), aspect, NEAR, framing.distance * 10.0);
    proj.y_axis.y *= -1.0;

    let light_pos = light.position();
    // the model is re-centred on the origin by `framing.model`
    let light_view = Mat4::look_at_rh(light_pos, Vec3::ZERO, Vec3::Z);
    let light_proj = Mat4::perspective_rh(
      FOV_DEG.to_radians(),
      shadow_aspect,
      NEAR,
      framing.distance * 100.0,
    );

    Self {
      model: framing.model,
      view: camera.view(),
      proj,
      camera_pos: camera.pos,
      light_pos,
      light_color: light.color(),
      light_mvp: light_proj * light_view * framing.model,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn light_orbits_in_xy_plane() {
    let light = Light {
      angle_deg: 90.0,
      density: 3.0,
      distance: 2.0,
    };
    assert!(light.position().abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
    assert_eq!(light.color(), Vec3::splat(3.0));
  }

  #[test]
  fn projection_flips_y() {
    let framing = ModelFraming::unit();
    let camera = Camera::framed(&framing);
    let m = SceneMatrices::compute(&camera, &Light::default(), &framing, 1.5, 1.0);
    assert!(m.proj.y_axis.y < 0.0);
    assert!(m.proj.x_axis.x > 0.0);

    // a point above the origin lands in the upper half of clip space (negative y)
    let clip = m.proj * m.view * glam::Vec4::new(0.0, 0.5, 0.0, 1.0);
    assert!(clip.y / clip.w < 0.0);
  }
}
