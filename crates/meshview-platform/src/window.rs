// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use meshview_render::{RenderSize, SurfaceProvider};
use tracing::info;
use winit::{
  dpi::PhysicalSize,
  event_loop::ActiveEventLoop,
  raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
  },
  window::Window,
};

/// A winit window the renderer can present to.
pub struct PlatformWindow {
  window: Window,
}

impl PlatformWindow {
  pub fn create(event_loop: &ActiveEventLoop, title: &str, size: RenderSize) -> Result<Self> {
    let attrs = Window::default_attributes()
      .with_title(title)
      .with_inner_size(PhysicalSize::new(size.width, size.height));
    let window = event_loop
      .create_window(attrs)
      .context("create_window")?;
    let inner = window.inner_size();
    info!("window {}x{}", inner.width, inner.height);
    Ok(Self { window })
  }

  pub fn window(&self) -> &Window {
    &self.window
  }

  pub fn request_redraw(&self) {
    self.window.request_redraw();
  }
}

impl HasWindowHandle for PlatformWindow {
  fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
    self.window.window_handle()
  }
}

impl HasDisplayHandle for PlatformWindow {
  fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
    self.window.display_handle()
  }
}

impl SurfaceProvider for PlatformWindow {
  fn framebuffer_size(&self) -> RenderSize {
    let s = self.window.inner_size();
    RenderSize {
      width: s.width,
      height: s.height,
    }
  }
}
