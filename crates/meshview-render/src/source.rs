// SPDX-License-Identifier: CEPL-1.0
//! Collaborators the renderer consumes but does not implement.

use std::path::Path;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::{RenderSize, TextureImage};

/// A native window a presentation surface can be created for.
///
/// The backend derives the instance extensions it needs from the display
/// handle and polls `framebuffer_size` whenever it (re)creates a swapchain.
pub trait SurfaceProvider: HasWindowHandle + HasDisplayHandle {
  fn framebuffer_size(&self) -> RenderSize;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
  Vertex,
  Fragment,
}

/// Precompiled SPIR-V blobs by program name. A program may omit a stage.
pub trait ShaderSource {
  fn spirv(&self, program: &str, stage: ShaderStage) -> Option<&[u8]>;
}

/// Decodes texture files referenced by materials into RGBA8 pixels.
pub trait TextureSource {
  fn load_rgba8(&self, path: &Path) -> Result<TextureImage>;
}
