// SPDX-License-Identifier: CEPL-1.0
use meshview_render::{ShaderSource, ShaderStage};

macro_rules! spv {
  ($name:literal) => {
    include_bytes!(concat!(env!("OUT_DIR"), "/", $name, ".spv")).as_slice()
  };
}

/// The SPIR-V compiled by the build script.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedShaders;

impl EmbeddedShaders {
  const VERTEX: [(&'static str, &'static [u8]); 4] = [
    ("scene", spv!("scene.vert")),
    ("scene_no_lighting", spv!("scene_no_lighting.vert")),
    ("wireframe", spv!("wireframe.vert")),
    ("shadow", spv!("shadow.vert")),
  ];

  const FRAGMENT: [(&'static str, &'static [u8]); 3] = [
    ("scene", spv!("scene.frag")),
    ("scene_no_lighting", spv!("scene_no_lighting.frag")),
    ("wireframe", spv!("wireframe.frag")),
  ];
}

impl ShaderSource for EmbeddedShaders {
  fn spirv(&self, program: &str, stage: ShaderStage) -> Option<&[u8]> {
    let table: &[(&str, &[u8])] = match stage {
      ShaderStage::Vertex => &Self::VERTEX,
      ShaderStage::Fragment => &Self::FRAGMENT,
    };
    table.iter().find(|(name, _)| *name == program).map(|(_, b)| *b)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_program_has_a_vertex_stage() {
    let s = EmbeddedShaders;
    for p in ["scene", "scene_no_lighting", "wireframe", "shadow"] {
      let code = s.spirv(p, ShaderStage::Vertex).unwrap();
      // SPIR-V magic, little endian
      assert_eq!(&code[..4], &[0x03, 0x02, 0x23, 0x07]);
    }
    assert!(s.spirv("shadow", ShaderStage::Fragment).is_none());
    assert!(s.spirv("missing", ShaderStage::Vertex).is_none());
  }
}
