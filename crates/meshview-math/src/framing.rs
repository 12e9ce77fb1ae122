// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec3};

/// Where a loaded model sits and how far away it should be viewed from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelFraming {
  /// Bounding-box midpoint in model space.
  pub center: Vec3,
  /// Twice the largest half-extent of the bounding box.
  pub distance: f32,
  /// Moves the model so its center lands on the origin.
  pub model: Mat4,
}

impl ModelFraming {
  pub fn from_positions<I>(positions: I) -> Self
  where
    I: IntoIterator<Item = [f32; 3]>,
  {
    let mut lo = Vec3::splat(f32::INFINITY);
    let mut hi = Vec3::splat(f32::NEG_INFINITY);
    let mut any = false;
    for p in positions {
      let p = Vec3::from(p);
      lo = lo.min(p);
      hi = hi.max(p);
      any = true;
    }
    if !any {
      return Self::unit();
    }

    let center = (lo + hi) * 0.5;
    let half = hi - center;
    let mut distance = half.max_element() * 2.0;
    if !distance.is_finite() || distance <= 0.0 {
      distance = 1.0;
    }
    Self {
      center,
      distance,
      model: Mat4::from_translation(-center),
    }
  }

  pub fn unit() -> Self {
    Self {
      center: Vec3::ZERO,
      distance: 1.0,
      model: Mat4::IDENTITY,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frames_bounding_box() {
    let f = ModelFraming::from_positions([[0.0, 0.0, 0.0], [2.0, 4.0, 1.0], [1.0, -2.0, 0.5]]);
    assert_eq!(f.center, Vec3::new(1.0, 1.0, 0.5));
    // half extents (1, 3, 0.5) -> 2 * 3
    assert_eq!(f.distance, 6.0);
    assert_eq!(f.model.transform_point3(f.center), Vec3::ZERO);
  }

  #[test]
  fn degenerate_inputs_fall_back() {
    assert_eq!(ModelFraming::from_positions(std::iter::empty()).distance, 1.0);
    let single = ModelFraming::from_positions([[3.0, 3.0, 3.0]]);
    assert_eq!(single.center, Vec3::splat(3.0));
    assert_eq!(single.distance, 1.0);
  }
}
