// SPDX-License-Identifier: CEPL-1.0

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShadingMode {
  /// Clear only.
  Default,
  /// Lit, textured geometry.
  #[default]
  Scene,
  /// Wireframe over a cleared background.
  WireframeHollow,
  /// Wireframe over flat-shaded geometry.
  WireframeSolid,
}

impl ShadingMode {
  pub const ALL: [ShadingMode; 4] = [
    ShadingMode::Default,
    ShadingMode::Scene,
    ShadingMode::WireframeHollow,
    ShadingMode::WireframeSolid,
  ];

  /// Whether this mode rasterises lit geometry that can receive shadows.
  pub fn draws_geometry(self) -> bool {
    matches!(self, ShadingMode::Scene | ShadingMode::WireframeSolid)
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShadowMode {
  #[default]
  Off,
  Mapped,
}

impl ShadowMode {
  pub fn toggled(self) -> Self {
    match self {
      ShadowMode::Off => ShadowMode::Mapped,
      ShadowMode::Mapped => ShadowMode::Off,
    }
  }
}
