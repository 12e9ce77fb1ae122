// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device negotiation, GPU resources, and the frame loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use meshview_render::{
  ModelData, RenderSize, Renderer, SceneMatrices, ShaderSource, ShadingMode, ShadowMode, SurfaceProvider,
  TextureSource,
};
use raw_window_handle::HasDisplayHandle;
use tracing::{debug, info};

pub mod buffer;
pub mod capability;
pub mod commands;
pub mod context;
pub mod debug;
pub mod descriptor;
pub mod frame;
pub mod framebuffer;
pub mod gui;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod record;
pub mod render_pass;
pub mod scene;
pub mod shaders;
pub mod surface;
pub mod swapchain;
pub mod targets;
pub mod uniforms;

pub use capability::{CapabilityRequest, FeatureStruct};
pub use context::DeviceContext;
pub use gui::{GuiInit, GuiOverlay, NoOverlay};
pub use shaders::EmbeddedShaders;

use crate::commands::CommandPool;
use crate::descriptor::{gui_pool_sizes, DescriptorPool};
use crate::frame::{submit_plan, FrameSlots, ImageFenceTracker, PassKind};
use crate::instance::{add_surface_extensions, Instance};
use crate::scene::SceneResources;
use crate::surface::Surface;
use crate::swapchain::{Acquired, Presented};
use crate::targets::{SwapchainTargets, TargetParams};
use crate::uniforms::{CameraUbo, LightUbo};

/// Descriptors of each type reserved for the gui overlay.
const GUI_DESCRIPTORS_PER_TYPE: u32 = 1000;

#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
  pub app_name: String,
  pub max_frames_in_flight: usize,
  /// Upper bound; the device maximum wins when lower.
  pub msaa_samples: u32,
  /// Texture sampler max LOD.
  pub mip_levels: u32,
  pub shadow_map_size: u32,
  pub clear_color: [f32; 4],
  pub validation: bool,
  /// `"<struct>.<flag>"` features to require on top of the viewer's own.
  pub extra_features: Vec<String>,
}

impl Default for RendererConfig {
  fn default() -> Self {
    Self {
      app_name: "meshview".into(),
      max_frames_in_flight: 2,
      msaa_samples: 8,
      mip_levels: 6,
      shadow_map_size: 4096,
      clear_color: [1.0; 4],
      validation: cfg!(debug_assertions),
      extra_features: Vec::new(),
    }
  }
}

impl RendererConfig {
  /// Capabilities the renderer needs, including the surface's instance
  /// extensions.
  pub fn capability_request(&self, provider: &dyn SurfaceProvider) -> Result<CapabilityRequest> {
    let mut request = CapabilityRequest::viewer(self.validation);
    add_surface_extensions(&mut request, provider.display_handle()?.as_raw())?;
    for path in &self.extra_features {
      request.require_feature_path(path)?;
    }
    Ok(request)
  }
}

pub struct VkRenderer {
  // STRICT TEARDOWN ORDER: fields drop top to bottom.
  targets: Option<SwapchainTargets>,
  frames: FrameSlots,
  scene: SceneResources,
  _gui_pool: DescriptorPool,
  overlay: Box<dyn GuiOverlay>,
  command_pool: CommandPool,
  surface: Surface,
  ctx: DeviceContext,
  provider: Arc<dyn SurfaceProvider>,

  tracker: ImageFenceTracker,
  params: TargetParams,
  clear_color: [f32; 4],
  max_lod: f32,
  shading: ShadingMode,
  shadow: ShadowMode,
  plan: Vec<PassKind>,
  /// Window reported a new size; rebuild after the next present.
  resized: bool,
  /// Zero-sized window; nothing is drawn until it grows again.
  paused: bool,
  shaders: Box<dyn ShaderSource>,
}

impl VkRenderer {
  pub fn new(
    provider: Arc<dyn SurfaceProvider>,
    model: &ModelData,
    textures: &dyn TextureSource,
    shaders: Box<dyn ShaderSource>,
    mut overlay: Box<dyn GuiOverlay>,
    config: RendererConfig,
  ) -> Result<Self> {
    // STRICT ORDER: instance -> surface -> device -> resources -> swapchain
    let request = config.capability_request(provider.as_ref())?;
    let instance = Instance::new(&request, &config.app_name)?;
    let surface = Surface::new(&instance, provider.as_ref())?;
    let ctx = DeviceContext::new(&instance, &request, Some(&surface))?;

    let command_pool = CommandPool::new(&ctx.device, ctx.graphics_family())?;
    let max_lod = config.mip_levels as f32;
    let scene = SceneResources::new(&ctx, &command_pool, model, textures, max_lod)?;
    let frames = FrameSlots::new(&ctx.device, config.max_frames_in_flight)?;
    let gui_pool = DescriptorPool::new(
      &ctx.device,
      11 * GUI_DESCRIPTORS_PER_TYPE,
      &gui_pool_sizes(GUI_DESCRIPTORS_PER_TYPE),
    )?;

    let params = TargetParams {
      samples: ctx.usable_samples(config.msaa_samples),
      shadow_map_size: config.shadow_map_size,
    };
    let size = provider.framebuffer_size();
    let initial = RenderSize {
      width: size.width.max(1),
      height: size.height.max(1),
    };
    let targets = SwapchainTargets::build(
      &ctx,
      &surface,
      initial,
      &scene,
      shaders.as_ref(),
      &command_pool,
      params,
    )?;
    record::record_static(&ctx.device, &targets, &scene, config.clear_color)?;

    overlay
      .init(&GuiInit {
        instance: ctx.instance(),
        physical: ctx.physical,
        device: &ctx.device,
        queue_family: ctx.graphics_family(),
        queue: ctx.queues.graphics,
        descriptor_pool: gui_pool.raw(),
        render_pass: targets.passes.gui.raw(),
        image_count: targets.image_count() as u32,
      })
      .context("gui overlay init")?;

    let shading = ShadingMode::default();
    let shadow = ShadowMode::default();
    info!("renderer ready on {}", ctx.device_name);
    Ok(Self {
      tracker: ImageFenceTracker::new(targets.image_count()),
      targets: Some(targets),
      frames,
      scene,
      _gui_pool: gui_pool,
      overlay,
      command_pool,
      surface,
      ctx,
      provider,
      params,
      clear_color: config.clear_color,
      max_lod,
      shading,
      shadow,
      plan: submit_plan(shading, shadow),
      resized: false,
      paused: size.is_empty(),
      shaders,
    })
  }

  pub fn device_name(&self) -> &str {
    &self.ctx.device_name
  }

  pub fn modes(&self) -> (ShadingMode, ShadowMode) {
    (self.shading, self.shadow)
  }

  /// Replaces the displayed model and switches shading back to
  /// [`ShadingMode::Scene`]. The current model stays up if `model` fails to
  /// upload.
  pub fn load_model(&mut self, model: &ModelData, textures: &dyn TextureSource) -> Result<()> {
    unsafe { self.ctx.device.device_wait_idle() }.context("device_wait_idle")?;
    let scene = SceneResources::new(&self.ctx, &self.command_pool, model, textures, self.max_lod)?;

    // STRICT ORDER: pipelines and descriptor sets on the old scene go first.
    self.targets = None;
    self.scene = scene;
    info!(
      "model loaded: {} vertices, {} indices, {} materials",
      model.vertices.len(),
      model.indices.len(),
      model.materials.len()
    );
    self.shading = ShadingMode::Scene;
    self.plan = submit_plan(self.shading, self.shadow);
    self.recreate()
  }

  /// Waits for the GPU, then rebuilds everything sized by the swapchain.
  /// A zero-sized window pauses rendering instead.
  fn recreate(&mut self) -> Result<()> {
    let size = self.provider.framebuffer_size();
    if size.is_empty() {
      debug!("window minimised; pausing");
      self.paused = true;
      return Ok(());
    }
    unsafe { self.ctx.device.device_wait_idle() }.context("device_wait_idle")?;

    // STRICT ORDER: the old swapchain and everything on it go first.
    self.targets = None;
    let targets = SwapchainTargets::build(
      &self.ctx,
      &self.surface,
      size,
      &self.scene,
      self.shaders.as_ref(),
      &self.command_pool,
      self.params,
    )?;
    record::record_static(&self.ctx.device, &targets, &self.scene, self.clear_color)?;
    self.overlay
      .render_pass_changed(targets.passes.gui.raw(), targets.image_count() as u32)?;
    self.tracker.reset(targets.image_count());
    info!("swapchain recreated at {}x{}", targets.extent().width, targets.extent().height);
    self.targets = Some(targets);
    self.paused = false;
    self.resized = false;
    Ok(())
  }

  fn draw_frame(&mut self, scene: &SceneMatrices) -> Result<()> {
    if self.paused {
      return Ok(());
    }
    let Some(targets) = self.targets.as_ref() else {
      return Ok(());
    };
    let device = &self.ctx.device;
    let slot = self.frames.current();
    self.frames.wait(slot)?;

    let image = match targets.swapchain.acquire(self.frames.image_available())? {
      Acquired::Image { index, .. } => index,
      Acquired::OutOfDate => return self.recreate(),
    };
    let i = image as usize;
    if let Some(prev) = self.tracker.claim(i, slot) {
      self.frames.wait(prev)?;
    }

    targets.uniforms.camera[i].write(&CameraUbo::from_scene(scene))?;
    targets.uniforms.light[i].write(&LightUbo::from_scene(scene))?;
    record::record_gui(device, targets, i, self.overlay.as_mut())?;

    let cmds: Vec<vk::CommandBuffer> = self.plan.iter().map(|&k| targets.command(i, k)).collect();
    let wait = [self.frames.image_available()];
    let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
    let signal = [self.frames.render_finished()];
    let submit = vk::SubmitInfo {
      s_type: vk::StructureType::SUBMIT_INFO,
      wait_semaphore_count: wait.len() as u32,
      p_wait_semaphores: wait.as_ptr(),
      p_wait_dst_stage_mask: wait_stages.as_ptr(),
      command_buffer_count: cmds.len() as u32,
      p_command_buffers: cmds.as_ptr(),
      signal_semaphore_count: signal.len() as u32,
      p_signal_semaphores: signal.as_ptr(),
      ..Default::default()
    };
    self.frames.reset_current()?;
    unsafe { device.queue_submit(self.ctx.queues.graphics, &[submit], self.frames.fence(slot)) }
      .context("queue_submit")?;

    let present_queue = self.ctx.queues.present.unwrap_or(self.ctx.queues.graphics);
    let presented = targets
      .swapchain
      .present(present_queue, self.frames.render_finished(), image)?;
    self.frames.advance();

    if presented == Presented::NeedsRecreate || self.resized {
      self.recreate()?;
    }
    Ok(())
  }
}

impl Renderer for VkRenderer {
  fn resize(&mut self, size: RenderSize) -> Result<()> {
    if size.is_empty() {
      self.paused = true;
      return Ok(());
    }
    if self.paused {
      return self.recreate();
    }
    self.resized = true;
    Ok(())
  }

  fn render(&mut self, scene: &SceneMatrices) -> Result<()> {
    self.draw_frame(scene)
  }

  fn set_clear_color(&mut self, rgba: [f32; 4]) -> Result<()> {
    self.clear_color = rgba;
    let Some(targets) = self.targets.as_ref() else {
      return Ok(());
    };
    unsafe { self.ctx.device.device_wait_idle() }.context("device_wait_idle")?;
    record::record_static(&self.ctx.device, targets, &self.scene, rgba)
  }

  /// Every mode's buffers are pre-recorded for each image; this only changes
  /// which of them get submitted.
  fn set_modes(&mut self, shading: ShadingMode, shadow: ShadowMode) -> Result<()> {
    if (shading, shadow) != (self.shading, self.shadow) {
      debug!("modes: {shading:?}, shadow {shadow:?}");
    }
    self.shading = shading;
    self.shadow = shadow;
    self.plan = submit_plan(shading, shadow);
    Ok(())
  }

  fn extent(&self) -> RenderSize {
    self.targets
      .as_ref()
      .map(|t| RenderSize {
        width: t.extent().width,
        height: t.extent().height,
      })
      .unwrap_or_default()
  }
}

impl Drop for VkRenderer {
  fn drop(&mut self) {
    // fields then drop in declaration order
    unsafe {
      let _ = self.ctx.device.device_wait_idle();
    }
  }
}
