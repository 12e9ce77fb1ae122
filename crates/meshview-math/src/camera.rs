// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};

use crate::ModelFraming;

bitflags! {
  /// Camera controls currently held down.
  #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
  pub struct MoveKeys: u16 {
    const PITCH_UP   = 1 << 0;
    const PITCH_DOWN = 1 << 1;
    const ROLL_LEFT  = 1 << 2;
    const ROLL_RIGHT = 1 << 3;
    const YAW_LEFT   = 1 << 4;
    const YAW_RIGHT  = 1 << 5;
    const PAN_UP     = 1 << 6;
    const PAN_DOWN   = 1 << 7;
    const PAN_LEFT   = 1 << 8;
    const PAN_RIGHT  = 1 << 9;
    const DOLLY_OUT  = 1 << 10;
    const DOLLY_IN   = 1 << 11;
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
  pub pos: Vec3,
  pub look_dir: Vec3,
  pub up_dir: Vec3,
}

impl Camera {
  /// Camera on +Z at the framing distance, looking at the origin.
  pub fn framed(framing: &ModelFraming) -> Self {
    let pos = Vec3::new(0.0, 0.0, framing.distance);
    Self {
      pos,
      look_dir: (-pos).normalize_or(Vec3::NEG_Z),
      up_dir: Vec3::Y,
    }
  }

  pub fn view(&self) -> Mat4 {
    Mat4::look_at_rh(self.pos, self.pos + self.look_dir, self.up_dir)
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sensitivity {
  /// Degrees per second while a rotate key is held.
  pub key_rotate: f32,
  /// World units per second while a translate key is held.
  pub key_translate: f32,
  /// World units per wheel line.
  pub wheel_translate: f32,
  /// Degrees per dragged pixel.
  pub drag_rotate: f32,
}

impl Default for Sensitivity {
  fn default() -> Self {
    Self {
      key_rotate: 30.0,
      key_translate: 2.5,
      wheel_translate: 2.5,
      drag_rotate: 0.5,
    }
  }
}

impl Sensitivity {
  /// Translation speeds follow the model size so small and huge models
  /// feel the same to navigate.
  pub fn scaled_to(mut self, framing: &ModelFraming) -> Self {
    self.key_translate = framing.distance / 1.5;
    self.wheel_translate = 0.3 * framing.distance / 1.5;
    self
  }
}

/// Orbit-style controller: input accumulates between frames and is applied
/// (then cleared) by [`CameraRig::advance`].
#[derive(Clone, Debug)]
pub struct CameraRig {
  pub camera: Camera,
  pub sensitivity: Sensitivity,
  held: MoveKeys,
  drag_pitch: f32,
  drag_roll: f32,
  wheel: f32,
}

impl CameraRig {
  pub fn new(framing: &ModelFraming, sensitivity: Sensitivity) -> Self {
    Self {
      camera: Camera::framed(framing),
      sensitivity: sensitivity.scaled_to(framing),
      held: MoveKeys::empty(),
      drag_pitch: 0.0,
      drag_roll: 0.0,
      wheel: 0.0,
    }
  }

  pub fn reset(&mut self, framing: &ModelFraming) {
    self.camera = Camera::framed(framing);
    self.sensitivity = self.sensitivity.scaled_to(framing);
    self.clear_input();
  }

  pub fn set_held(&mut self, keys: MoveKeys) {
    self.held = keys;
  }

  pub fn held(&self) -> MoveKeys {
    self.held
  }

  /// Pointer moved by (dx, dy) pixels with the rotate button down.
  pub fn drag(&mut self, dx: f32, dy: f32) {
    self.drag_pitch -= self.sensitivity.drag_rotate * dy;
    self.drag_roll += self.sensitivity.drag_rotate * dx;
  }

  pub fn scroll(&mut self, lines: f32) {
    self.wheel += lines * self.sensitivity.wheel_translate;
  }

  /// Applies held keys (scaled by `dt` seconds) and accumulated pointer
  /// input to the camera, rotating about the camera's own axes through
  /// the origin.
  pub fn advance(&mut self, dt: f32) {
    let s = self.sensitivity;
    let axis = |pos: MoveKeys, neg: MoveKeys| -> f32 {
      let mut v = 0.0;
      if self.held.contains(pos) {
        v += 1.0;
      }
      if self.held.contains(neg) {
        v -= 1.0;
      }
      v
    };
    let rot_x = axis(MoveKeys::PITCH_UP, MoveKeys::PITCH_DOWN) * s.key_rotate;
    let rot_y = axis(MoveKeys::YAW_LEFT, MoveKeys::YAW_RIGHT) * s.key_rotate;
    let rot_z = axis(MoveKeys::ROLL_RIGHT, MoveKeys::ROLL_LEFT) * s.key_rotate;
    let pan_x = axis(MoveKeys::PAN_RIGHT, MoveKeys::PAN_LEFT) * s.key_translate;
    let pan_y = axis(MoveKeys::PAN_UP, MoveKeys::PAN_DOWN) * s.key_translate;
    let dolly = axis(MoveKeys::DOLLY_IN, MoveKeys::DOLLY_OUT) * s.key_translate;

    let view = self.camera.view();
    let center_view = view.transform_point3(Vec3::ZERO);
    let inv = view.inverse();
    let world_axis = |unit: Vec3| -> Vec3 {
      let p = inv * Vec4::from((center_view + unit, 1.0));
      p.truncate().normalize_or(unit)
    };
    let ax = world_axis(Vec3::X);
    let ay = world_axis(Vec3::Y);
    let az = world_axis(Vec3::Z);

    let rotation = Mat4::from_axis_angle(ax, (dt * rot_x).to_radians())
      * Mat4::from_axis_angle(ay, (dt * rot_y).to_radians())
      * Mat4::from_axis_angle(az, (dt * rot_z).to_radians())
      * Mat4::from_axis_angle(ax, self.drag_pitch.to_radians())
      * Mat4::from_axis_angle(az, self.drag_roll.to_radians());

    let cam = &mut self.camera;
    cam.pos = rotation.transform_point3(cam.pos);
    cam.look_dir = rotation.transform_vector3(cam.look_dir);
    cam.up_dir = rotation.transform_vector3(cam.up_dir);

    let right = cam.look_dir.cross(cam.up_dir).normalize_or(Vec3::X);
    cam.pos += right * pan_x * dt + cam.up_dir * pan_y * dt;
    cam.pos += cam.look_dir * dolly * dt;
    cam.pos += cam.look_dir * self.wheel;

    self.clear_input();
  }

  fn clear_input(&mut self) {
    self.drag_pitch = 0.0;
    self.drag_roll = 0.0;
    self.wheel = 0.0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn framing() -> ModelFraming {
    ModelFraming::from_positions([[-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]])
  }

  #[test]
  fn framed_camera_looks_at_origin() {
    let cam = Camera::framed(&framing());
    assert_eq!(cam.pos, Vec3::new(0.0, 0.0, 2.0));
    assert_eq!(cam.look_dir, Vec3::NEG_Z);
    assert_eq!(cam.up_dir, Vec3::Y);
  }

  #[test]
  fn idle_advance_keeps_camera() {
    let mut rig = CameraRig::new(&framing(), Sensitivity::default());
    let before = rig.camera;
    rig.advance(0.016);
    assert!(rig.camera.pos.abs_diff_eq(before.pos, 1e-5));
    assert!(rig.camera.look_dir.abs_diff_eq(before.look_dir, 1e-5));
  }

  #[test]
  fn yaw_orbits_at_constant_distance() {
    let mut rig = CameraRig::new(&framing(), Sensitivity::default());
    rig.set_held(MoveKeys::YAW_LEFT);
    // 30 deg/s for 3 s
    rig.advance(3.0);
    let cam = rig.camera;
    assert!((cam.pos.length() - 2.0).abs() < 1e-4);
    assert!(cam.pos.x.abs() > 0.9);
    // still looking at the origin
    assert!(cam.look_dir.abs_diff_eq(-cam.pos.normalize(), 1e-4));
  }

  #[test]
  fn wheel_input_is_consumed_once() {
    let mut rig = CameraRig::new(&framing(), Sensitivity::default());
    rig.scroll(1.0);
    rig.advance(0.0);
    let after_one = rig.camera.pos.z;
    assert!(after_one < 2.0);
    rig.advance(0.0);
    assert_eq!(rig.camera.pos.z, after_one);
  }

  #[test]
  fn translate_speed_scales_with_model() {
    let s = Sensitivity::default().scaled_to(&framing());
    assert!((s.key_translate - 2.0 / 1.5).abs() < 1e-6);
    assert!((s.wheel_translate - 0.4).abs() < 1e-6);
  }
}
