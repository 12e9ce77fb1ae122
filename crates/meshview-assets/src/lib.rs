// SPDX-License-Identifier: CEPL-1.0
//! File-format front ends: Wavefront OBJ/MTL geometry and image textures.

pub mod obj;
pub mod texture;

use std::path::PathBuf;

use thiserror::Error;

pub use obj::{load_obj, load_obj_from_reader};
pub use texture::{decode_rgba8, ImageTextures};

#[derive(Debug, Error)]
pub enum AssetError {
  #[error("failed to load model {path}: {source}")]
  Obj {
    path: PathBuf,
    #[source]
    source: tobj::LoadError,
  },
  #[error("failed to load texture {path}: {source}")]
  Image {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("model {0} contains no triangles")]
  Empty(PathBuf),
}
