// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::Path;

use clap::{Parser, ValueEnum};
use meshview_math::Sensitivity;
use meshview_render::{RenderSize, ShadingMode, ShadowMode};
use meshview_render_vk::RendererConfig;
use serde::Deserialize;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(author, version, about = "Vulkan OBJ model viewer", long_about = None)]
pub struct Args {
  /// OBJ file to view; a unit cube when omitted
  pub model: Option<std::path::PathBuf>,

  #[arg(long, default_value = "viewer.toml")]
  pub config: std::path::PathBuf,

  #[arg(long, value_enum, default_value_t = ShadingArg::Scene)]
  pub shading: ShadingArg,

  #[arg(long, value_enum, default_value_t = ShadowArg::Off)]
  pub shadow: ShadowArg,

  /// Never request the validation layer, even in debug builds
  #[arg(long)]
  pub no_validation: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShadingArg {
  Default,
  Scene,
  WireframeHollow,
  WireframeSolid,
}

impl From<ShadingArg> for ShadingMode {
  fn from(a: ShadingArg) -> Self {
    match a {
      ShadingArg::Default => ShadingMode::Default,
      ShadingArg::Scene => ShadingMode::Scene,
      ShadingArg::WireframeHollow => ShadingMode::WireframeHollow,
      ShadingArg::WireframeSolid => ShadingMode::WireframeSolid,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShadowArg {
  Off,
  Mapped,
}

impl From<ShadowArg> for ShadowMode {
  fn from(a: ShadowArg) -> Self {
    match a {
      ShadowArg::Off => ShadowMode::Off,
      ShadowArg::Mapped => ShadowMode::Mapped,
    }
  }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
  pub width: u32,
  pub height: u32,
  pub title: String,
}

impl Default for WindowCfg {
  fn default() -> Self {
    Self {
      width: 1080,
      height: 720,
      title: "meshview".into(),
    }
  }
}

impl WindowCfg {
  pub fn size(&self) -> RenderSize {
    RenderSize {
      width: self.width.max(1),
      height: self.height.max(1),
    }
  }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
  pub max_frames_in_flight: usize,
  pub msaa_samples: u32,
  pub mip_levels: u32,
  pub shadow_map_size: u32,
  pub clear_color: [f32; 4],
  /// 0 disables the cap.
  pub max_frame_rate: u32,
  /// Only honoured by debug builds.
  pub validation: bool,
}

impl Default for RenderCfg {
  fn default() -> Self {
    Self {
      max_frames_in_flight: 2,
      msaa_samples: 8,
      mip_levels: 6,
      shadow_map_size: 4096,
      clear_color: [1.0; 4],
      max_frame_rate: 120,
      validation: true,
    }
  }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DeviceCfg {
  /// Extra `"<struct>.<flag>"` requirements, e.g. `"core.wideLines"`.
  pub extra_features: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SceneCfg {
  pub light_angle: f32,
  pub light_density: f32,
  pub key_rotate_speed: f32,
  pub drag_rotate_speed: f32,
}

impl Default for SceneCfg {
  fn default() -> Self {
    Self {
      light_angle: 45.0,
      light_density: 2.0,
      key_rotate_speed: 30.0,
      drag_rotate_speed: 0.5,
    }
  }
}

impl SceneCfg {
  pub fn sensitivity(&self) -> Sensitivity {
    Sensitivity {
      key_rotate: self.key_rotate_speed,
      drag_rotate: self.drag_rotate_speed,
      ..Sensitivity::default()
    }
  }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ViewerCfg {
  pub window: WindowCfg,
  pub render: RenderCfg,
  pub device: DeviceCfg,
  pub scene: SceneCfg,
}

impl ViewerCfg {
  /// Reads `path`, falling back to defaults when it is missing or invalid.
  pub fn load(path: &Path) -> Self {
    match fs::read_to_string(path) {
      Ok(s) => Self::parse(&s).unwrap_or_else(|e| {
        warn!("{}: {e}; using defaults", path.display());
        Self::default()
      }),
      Err(e) => {
        warn!("{}: {e}; using defaults", path.display());
        Self::default()
      }
    }
  }

  pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(s)
  }

  pub fn renderer_config(&self, no_validation: bool) -> RendererConfig {
    let r = &self.render;
    RendererConfig {
      app_name: self.window.title.clone(),
      max_frames_in_flight: r.max_frames_in_flight.max(1),
      msaa_samples: r.msaa_samples,
      mip_levels: r.mip_levels,
      shadow_map_size: r.shadow_map_size.max(1),
      clear_color: r.clear_color,
      validation: r.validation && !no_validation && cfg!(debug_assertions),
      extra_features: self.device.extra_features.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_file_gives_defaults() {
    let cfg = ViewerCfg::parse("").unwrap();
    assert_eq!(cfg, ViewerCfg::default());
    assert_eq!(cfg.window.size(), RenderSize { width: 1080, height: 720 });
    assert_eq!(cfg.render.max_frames_in_flight, 2);
    assert_eq!(cfg.render.clear_color, [1.0; 4]);
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let cfg = ViewerCfg::parse(
      r#"
      [render]
      msaa_samples = 4
      clear_color = [0.0, 0.0, 0.0, 1.0]

      [device]
      extra_features = ["core.wideLines"]
      "#,
    )
    .unwrap();
    assert_eq!(cfg.render.msaa_samples, 4);
    assert_eq!(cfg.render.shadow_map_size, 4096);
    assert_eq!(cfg.scene, SceneCfg::default());

    let rc = cfg.renderer_config(true);
    assert_eq!(rc.msaa_samples, 4);
    assert!(!rc.validation);
    assert_eq!(rc.extra_features, vec!["core.wideLines".to_string()]);
  }

  #[test]
  fn invalid_file_is_an_error() {
    assert!(ViewerCfg::parse("[render]\nmsaa_samples = \"lots\"").is_err());
  }

  #[test]
  fn cli_parses_modes() {
    let args = Args::try_parse_from(["meshview", "model.obj", "--shading", "wireframe-solid", "--shadow", "mapped"])
      .unwrap();
    assert_eq!(ShadingMode::from(args.shading), ShadingMode::WireframeSolid);
    assert_eq!(ShadowMode::from(args.shadow), ShadowMode::Mapped);
    assert_eq!(args.config, std::path::PathBuf::from("viewer.toml"));
  }
}
