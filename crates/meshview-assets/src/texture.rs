// SPDX-License-Identifier: CEPL-1.0
use std::path::Path;

use anyhow::Result;
use meshview_render::{TextureImage, TextureSource};
use tracing::debug;

use crate::AssetError;

/// Reads textures from disk with the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageTextures;

impl TextureSource for ImageTextures {
  fn load_rgba8(&self, path: &Path) -> Result<TextureImage> {
    let img = image::open(path).map_err(|source| AssetError::Image {
      path: path.to_path_buf(),
      source,
    })?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    debug!("texture {}x{} from {:?}", width, height, path);
    Ok(TextureImage {
      width,
      height,
      pixels: rgba.into_raw(),
    })
  }
}

/// Decodes an in-memory image of any enabled format.
pub fn decode_rgba8(bytes: &[u8]) -> Result<TextureImage> {
  let img = image::load_from_memory(bytes).map_err(|source| AssetError::Image {
    path: "<memory>".into(),
    source,
  })?;
  let rgba = img.to_rgba8();
  let (width, height) = rgba.dimensions();
  Ok(TextureImage {
    width,
    height,
    pixels: rgba.into_raw(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn png_bytes() -> Vec<u8> {
    let mut img = image::RgbaImage::new(2, 1);
    img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
    img.put_pixel(1, 0, image::Rgba([0, 0, 255, 128]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
      .unwrap();
    buf
  }

  #[test]
  fn decodes_png_to_rgba8() {
    let tex = decode_rgba8(&png_bytes()).unwrap();
    assert_eq!((tex.width, tex.height), (2, 1));
    assert_eq!(tex.pixels, vec![255, 0, 0, 255, 0, 0, 255, 128]);
  }

  #[test]
  fn missing_file_is_an_error() {
    let err = ImageTextures
      .load_rgba8(Path::new("/definitely/not/here.png"))
      .unwrap_err();
    assert!(err.downcast_ref::<AssetError>().is_some());
  }
}
