// SPDX-License-Identifier: CEPL-1.0
//! OBJ/MTL to [`ModelData`]: deduplicated vertices, per-shape material
//! groups and a material table with the fallback material at index 0.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::Result;
use meshview_render::{Material, MaterialGroup, ModelData, Shape, TextureSlot, Vertex};
use tracing::{info, warn};

use crate::AssetError;

fn load_options() -> tobj::LoadOptions {
  tobj::LoadOptions {
    single_index: true,
    triangulate: true,
    ignore_points: true,
    ignore_lines: true,
    ..Default::default()
  }
}

pub fn load_obj(path: &Path) -> Result<ModelData> {
  let (models, materials) = tobj::load_obj(path, &load_options()).map_err(|source| {
    AssetError::Obj {
      path: path.to_path_buf(),
      source,
    }
  })?;
  let materials = materials.unwrap_or_else(|e| {
    warn!("materials for {:?} not loaded: {e}", path);
    Vec::new()
  });
  let base_dir = path.parent().unwrap_or(Path::new("."));
  let model = build_model(&models, &materials, base_dir);
  if model.indices.is_empty() {
    return Err(AssetError::Empty(path.to_path_buf()).into());
  }
  info!(
    "model {:?}: {} vertices, {} indices, {} shapes, {} materials",
    path,
    model.vertices.len(),
    model.indices.len(),
    model.shapes.len(),
    model.materials.len()
  );
  Ok(model)
}

/// Loads from an already-open OBJ stream; `mtl` resolves material libraries.
pub fn load_obj_from_reader<R, M>(reader: &mut R, base_dir: &Path, mtl: M) -> Result<ModelData>
where
  R: BufRead,
  M: Fn(&Path) -> tobj::MTLLoadResult,
{
  let (models, materials) =
    tobj::load_obj_buf(reader, &load_options(), mtl).map_err(|source| AssetError::Obj {
      path: base_dir.to_path_buf(),
      source,
    })?;
  let materials = materials.unwrap_or_default();
  let model = build_model(&models, &materials, base_dir);
  if model.indices.is_empty() {
    return Err(AssetError::Empty(base_dir.to_path_buf()).into());
  }
  Ok(model)
}

fn build_model(models: &[tobj::Model], materials: &[tobj::Material], base_dir: &Path) -> ModelData {
  let mut vertices: Vec<Vertex> = Vec::new();
  let mut indices: Vec<u32> = Vec::new();
  let mut shapes: Vec<Shape> = Vec::new();
  let mut unique: HashMap<[u32; 12], u32> = HashMap::new();

  for model in models {
    let mesh = &model.mesh;
    let material_id = mesh.material_id.map(|m| m as u32 + 1).unwrap_or(0);
    let index_base = indices.len() as u32;

    for tri in mesh.indices.chunks_exact(3) {
      let face_normal = face_normal(&mesh.positions, tri);
      for &i in tri {
        let i = i as usize;
        let v = Vertex {
          pos: read3(&mesh.positions, i).unwrap_or_default(),
          color: read3(&mesh.vertex_color, i).unwrap_or([1.0; 3]),
          tex_coord: read2(&mesh.texcoords, i)
            .map(|[u, v]| [u, 1.0 - v])
            .unwrap_or_default(),
          normal: read3(&mesh.normals, i).unwrap_or(face_normal),
          material_id: material_id as i32,
        };
        let key: [u32; 12] = bytemuck::cast(v);
        let idx = *unique.entry(key).or_insert_with(|| {
          vertices.push(v);
          vertices.len() as u32 - 1
        });
        indices.push(idx);
      }
    }

    let index_count = indices.len() as u32 - index_base;
    if index_count == 0 {
      continue;
    }
    let group = MaterialGroup {
      index_base,
      index_count,
      material_id,
    };
    match shapes.last_mut() {
      Some(shape) if shape.name == model.name => push_group(&mut shape.groups, group),
      _ => shapes.push(Shape {
        name: model.name.clone(),
        groups: vec![group],
      }),
    }
  }

  let mut table = Vec::with_capacity(materials.len() + 1);
  table.push(Material::fallback());
  table.extend(materials.iter().map(|m| convert_material(m, base_dir)));

  ModelData {
    vertices,
    indices,
    shapes,
    materials: table,
  }
}

/// Contiguous spans with the same material collapse into one group.
fn push_group(groups: &mut Vec<MaterialGroup>, group: MaterialGroup) {
  if let Some(last) = groups.last_mut() {
    if last.material_id == group.material_id
      && last.index_base + last.index_count == group.index_base
    {
      last.index_count += group.index_count;
      return;
    }
  }
  groups.push(group);
}

fn read3(data: &[f32], i: usize) -> Option<[f32; 3]> {
  data.get(3 * i..3 * i + 3).map(|s| [s[0], s[1], s[2]])
}

fn read2(data: &[f32], i: usize) -> Option<[f32; 2]> {
  data.get(2 * i..2 * i + 2).map(|s| [s[0], s[1]])
}

fn face_normal(positions: &[f32], tri: &[u32]) -> [f32; 3] {
  let p = |k: usize| read3(positions, tri[k] as usize).unwrap_or_default();
  let (a, b, c) = (p(0), p(1), p(2));
  let e1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
  let e2 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
  let n = [
    e1[1] * e2[2] - e1[2] * e2[1],
    e1[2] * e2[0] - e1[0] * e2[2],
    e1[0] * e2[1] - e1[1] * e2[0],
  ];
  let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
  if len > f32::EPSILON {
    [n[0] / len, n[1] / len, n[2] / len]
  } else {
    [0.0, 0.0, 1.0]
  }
}

fn param_vec3(m: &tobj::Material, keys: &[&str]) -> Option<[f32; 3]> {
  let raw = keys.iter().find_map(|k| m.unknown_param.get(*k))?;
  let vals: Vec<f32> = raw.split_whitespace().filter_map(|s| s.parse().ok()).collect();
  match vals.as_slice() {
    [x, y, z, ..] => Some([*x, *y, *z]),
    [x] => Some([*x; 3]),
    _ => None,
  }
}

fn param_f32(m: &tobj::Material, key: &str) -> Option<f32> {
  m.unknown_param
    .get(key)
    .and_then(|s| s.split_whitespace().next())
    .and_then(|s| s.parse().ok())
}

fn param_path(m: &tobj::Material, key: &str) -> Option<String> {
  // texture statements may carry options before the file name
  m.unknown_param
    .get(key)
    .and_then(|s| s.split_whitespace().last())
    .map(str::to_owned)
}

fn convert_material(m: &tobj::Material, base_dir: &Path) -> Material {
  let resolve = |p: Option<String>| -> Option<PathBuf> {
    p.filter(|s| !s.is_empty()).map(|s| base_dir.join(s.replace('\\', "/")))
  };

  let mut textures: [Option<PathBuf>; TextureSlot::COUNT] = Default::default();
  let mut set = |slot: TextureSlot, p: Option<String>| textures[slot.index()] = resolve(p);
  set(TextureSlot::Ambient, m.ambient_texture.clone());
  set(TextureSlot::Diffuse, m.diffuse_texture.clone());
  set(TextureSlot::Specular, m.specular_texture.clone());
  set(TextureSlot::SpecularHighlight, m.shininess_texture.clone());
  set(TextureSlot::Bump, m.normal_texture.clone());
  set(TextureSlot::Displacement, param_path(m, "disp"));
  set(TextureSlot::Alpha, m.dissolve_texture.clone());
  set(TextureSlot::Reflection, param_path(m, "refl"));
  set(TextureSlot::Roughness, param_path(m, "map_Pr"));
  set(TextureSlot::Metallic, param_path(m, "map_Pm"));
  set(TextureSlot::Sheen, param_path(m, "map_Ps"));
  set(TextureSlot::Emissive, param_path(m, "map_Ke"));
  set(TextureSlot::Normal, param_path(m, "norm"));

  let defaults = Material::default();
  Material {
    name: m.name.clone(),
    ambient: m.ambient.unwrap_or(defaults.ambient),
    diffuse: m.diffuse.unwrap_or(defaults.diffuse),
    specular: m.specular.unwrap_or(defaults.specular),
    transmittance: param_vec3(m, &["Tf", "Kt"]).unwrap_or(defaults.transmittance),
    emission: param_vec3(m, &["Ke"]).unwrap_or(defaults.emission),
    shininess: m.shininess.unwrap_or(defaults.shininess),
    ior: m.optical_density.unwrap_or(defaults.ior),
    dissolve: m.dissolve.unwrap_or(defaults.dissolve),
    illum: m.illumination_model.map(i32::from).unwrap_or(defaults.illum),
    roughness: param_f32(m, "Pr").unwrap_or(defaults.roughness),
    metallic: param_f32(m, "Pm").unwrap_or(defaults.metallic),
    sheen: param_f32(m, "Ps").unwrap_or(defaults.sheen),
    clearcoat_thickness: param_f32(m, "Pc").unwrap_or(defaults.clearcoat_thickness),
    clearcoat_roughness: param_f32(m, "Pcr").unwrap_or(defaults.clearcoat_roughness),
    anisotropy: param_f32(m, "aniso").unwrap_or(defaults.anisotropy),
    anisotropy_rotation: param_f32(m, "anisor").unwrap_or(defaults.anisotropy_rotation),
    textures,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::{BufReader, Cursor};

  const QUADS: &str = "\
mtllib quads.mtl
o quads
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 0 0 -2
vt 0 0
vt 1 0
vt 1 1
vt 0 1
usemtl red
f 1/1 2/2 3/3 4/4
usemtl blue
f 1/1 2/2 5/3
";

  const MTL: &str = "\
newmtl red
Kd 1 0 0
Ke 0.1 0.2 0.3
Pr 0.7
map_Kd red.png
newmtl blue
Kd 0 0 1
Ni 1.5
illum 2
";

  fn load() -> ModelData {
    let mut reader = BufReader::new(Cursor::new(QUADS));
    load_obj_from_reader(&mut reader, Path::new("assets"), |_| {
      tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(MTL)))
    })
    .unwrap()
  }

  #[test]
  fn shares_vertices_within_a_material() {
    let model = load();
    // quad -> 2 triangles sharing 2 corners; the blue triangle differs by material id
    assert_eq!(model.indices.len(), 9);
    assert_eq!(model.vertices.len(), 4 + 3);
    model.validate().unwrap();
  }

  #[test]
  fn groups_follow_material_changes() {
    let model = load();
    let groups: Vec<_> = model.shapes.iter().flat_map(|s| s.groups.iter().copied()).collect();
    assert_eq!(groups.len(), 2);
    assert_eq!((groups[0].index_base, groups[0].index_count), (0, 6));
    assert_eq!((groups[1].index_base, groups[1].index_count), (6, 3));
    assert_ne!(groups[0].material_id, groups[1].material_id);
    assert!(groups.iter().all(|g| g.material_id >= 1));
  }

  #[test]
  fn materials_keep_fallback_first() {
    let model = load();
    assert_eq!(model.materials.len(), 3);
    assert_eq!(model.materials[0], Material::fallback());

    let red = model.materials.iter().find(|m| m.name == "red").unwrap();
    assert_eq!(red.diffuse, [1.0, 0.0, 0.0]);
    assert_eq!(red.emission, [0.1, 0.2, 0.3]);
    assert_eq!(red.roughness, 0.7);
    assert_eq!(
      red.texture(TextureSlot::Diffuse),
      Some(&Path::new("assets").join("red.png"))
    );

    let blue = model.materials.iter().find(|m| m.name == "blue").unwrap();
    assert_eq!(blue.ior, 1.5);
    assert_eq!(blue.illum, 2);
    assert!(blue.texture(TextureSlot::Diffuse).is_none());
  }

  #[test]
  fn flips_v_and_fills_missing_normals() {
    let model = load();
    let v0 = model.vertices.iter().find(|v| v.pos == [1.0, 1.0, 0.0]).unwrap();
    assert_eq!(v0.tex_coord, [1.0, 0.0]);
    assert_eq!(v0.normal, [0.0, 0.0, 1.0]);
    assert_eq!(v0.color, [1.0; 3]);
  }

  #[test]
  fn empty_stream_is_rejected() {
    let mut reader = BufReader::new(Cursor::new("# nothing\n"));
    let err = load_obj_from_reader(&mut reader, Path::new("."), |_| Ok(Default::default()))
      .unwrap_err();
    assert!(matches!(err.downcast_ref::<AssetError>(), Some(AssetError::Empty(_))));
  }
}
