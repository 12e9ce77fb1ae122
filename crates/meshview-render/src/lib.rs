// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic contracts shared by the renderer, the asset loaders and
//! the app.

use anyhow::Result;

pub mod model;
pub mod modes;
pub mod source;

pub use meshview_math::SceneMatrices;
pub use model::{Material, MaterialGroup, ModelData, Shape, TextureImage, TextureSlot, Vertex};
pub use modes::{ShadingMode, ShadowMode};
pub use source::{ShaderSource, ShaderStage, SurfaceProvider, TextureSource};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
  pub width: u32,
  pub height: u32,
}

impl RenderSize {
  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn aspect(&self) -> f32 {
    self.width.max(1) as f32 / self.height.max(1) as f32
  }
}

pub trait Renderer {
  /// Surface changed shape; a zero size pauses rendering.
  fn resize(&mut self, size: RenderSize) -> Result<()>;
  /// Draws and presents one frame for the given scene state.
  fn render(&mut self, scene: &SceneMatrices) -> Result<()>;
  fn set_clear_color(&mut self, rgba: [f32; 4]) -> Result<()>;
  fn set_modes(&mut self, shading: ShadingMode, shadow: ShadowMode) -> Result<()>;
  /// Current drawable size in pixels.
  fn extent(&self) -> RenderSize;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn aspect_never_divides_by_zero() {
    let s = RenderSize {
      width: 1080,
      height: 0,
    };
    assert!(s.is_empty());
    assert_eq!(s.aspect(), 1080.0);
  }
}
