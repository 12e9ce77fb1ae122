// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use meshview_assets::{load_obj, ImageTextures};
use meshview_core::init_tracing;
use meshview_math::{CameraRig, Light, ModelFraming, SceneMatrices};
use meshview_platform::winit::{
  application::ApplicationHandler,
  event::{KeyEvent, WindowEvent},
  event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
  keyboard::PhysicalKey,
  window::WindowId,
};
use meshview_platform::{Command, InputState, PlatformWindow};
use meshview_render::{ModelData, RenderSize, Renderer, ShadingMode, ShadowMode, SurfaceProvider};
use meshview_render_vk::{EmbeddedShaders, NoOverlay, VkRenderer};
use tracing::{error, info, warn};

mod config;

use config::{Args, ViewerCfg};

struct App {
  cfg: ViewerCfg,
  no_validation: bool,
  model: ModelData,
  framing: ModelFraming,
  rig: CameraRig,
  light: Light,
  input: InputState,
  shading: ShadingMode,
  shadow: ShadowMode,

  // renderer goes before the window it presents to
  renderer: Option<VkRenderer>,
  window: Option<Arc<PlatformWindow>>,

  failure: Option<anyhow::Error>,
  last_tick: Instant,
  frames: u32,
  last_fps_instant: Instant,
  next_frame_deadline: Option<Instant>,
}

impl App {
  fn new(args: &Args, cfg: ViewerCfg, model: ModelData) -> Self {
    let framing = ModelFraming::from_positions(model.positions());
    let rig = CameraRig::new(&framing, cfg.scene.sensitivity());
    let light = Light {
      angle_deg: cfg.scene.light_angle,
      density: cfg.scene.light_density,
      distance: framing.distance,
    };
    Self {
      no_validation: args.no_validation,
      shading: args.shading.into(),
      shadow: args.shadow.into(),
      cfg,
      model,
      framing,
      rig,
      light,
      input: InputState::default(),
      renderer: None,
      window: None,
      failure: None,
      last_tick: Instant::now(),
      frames: 0,
      last_fps_instant: Instant::now(),
      next_frame_deadline: None,
    }
  }

  fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
    let window = Arc::new(PlatformWindow::create(
      event_loop,
      &self.cfg.window.title,
      self.cfg.window.size(),
    )?);
    let provider: Arc<dyn SurfaceProvider> = window.clone();
    let mut renderer = VkRenderer::new(
      provider,
      &self.model,
      &ImageTextures,
      Box::new(EmbeddedShaders),
      Box::new(NoOverlay),
      self.cfg.renderer_config(self.no_validation),
    )?;
    renderer.set_modes(self.shading, self.shadow)?;
    info!("device = {}", renderer.device_name());

    self.window = Some(window);
    self.renderer = Some(renderer);
    self.last_tick = Instant::now();
    Ok(())
  }

  fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
    self.failure = Some(err);
    self.shutdown(event_loop);
  }

  fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
    // STRICT TEARDOWN ORDER: renderer before the window
    self.renderer = None;
    self.window = None;
    event_loop.exit();
  }

  fn apply(&mut self, event_loop: &ActiveEventLoop, cmd: Command) -> Result<()> {
    match cmd {
      Command::Shading(mode) => self.shading = mode,
      Command::ToggleShadow => self.shadow = self.shadow.toggled(),
      Command::ResetCamera => {
        self.rig.reset(&self.framing);
        return Ok(());
      }
      Command::Quit => {
        self.shutdown(event_loop);
        return Ok(());
      }
    }
    info!("shading = {:?}, shadow = {:?}", self.shading, self.shadow);
    match &mut self.renderer {
      Some(r) => r.set_modes(self.shading, self.shadow),
      None => Ok(()),
    }
  }

  /// Loads a dropped OBJ. A file that fails to load or upload is reported
  /// and the current model stays.
  fn open_model(&mut self, path: &Path) {
    let loaded = load_obj(path).and_then(|model| {
      if let Some(r) = &mut self.renderer {
        r.load_model(&model, &ImageTextures)?;
      }
      Ok(model)
    });
    match loaded {
      Ok(model) => self.show_model(model),
      Err(e) => warn!("{}: {e:#}", path.display()),
    }
  }

  /// Reframes the camera and light around `model`.
  fn show_model(&mut self, model: ModelData) {
    self.framing = ModelFraming::from_positions(model.positions());
    self.rig.reset(&self.framing);
    self.light.distance = self.framing.distance;
    self.shading = ShadingMode::Scene;
    self.model = model;
    info!("viewing {} shapes", self.model.shapes.len());
  }

  fn redraw(&mut self) -> Result<()> {
    let Some(renderer) = &mut self.renderer else {
      return Ok(());
    };
    let now = Instant::now();
    let dt = now.duration_since(self.last_tick).as_secs_f32();
    self.last_tick = now;

    self.input.apply_to(&mut self.rig);
    self.rig.advance(dt);
    let scene = SceneMatrices::compute(
      &self.rig.camera,
      &self.light,
      &self.framing,
      renderer.extent().aspect(),
      1.0,
    );
    renderer.render(&scene)?;
    self.frames = self.frames.saturating_add(1);
    Ok(())
  }
}

impl ApplicationHandler for App {
  fn resumed(&mut self, event_loop: &ActiveEventLoop) {
    if self.window.is_some() {
      return;
    }
    if let Err(e) = self.start(event_loop) {
      self.fail(event_loop, e);
    }
  }

  fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
    match &self.window {
      Some(w) if w.window().id() == window_id => {}
      _ => return,
    }

    let res = match event {
      WindowEvent::CloseRequested => {
        info!("CloseRequested");
        self.shutdown(event_loop);
        Ok(())
      }
      WindowEvent::Resized(size) => {
        info!("Resized → {}x{}", size.width, size.height);
        match &mut self.renderer {
          Some(r) => r.resize(RenderSize {
            width: size.width,
            height: size.height,
          }),
          None => Ok(()),
        }
      }
      WindowEvent::Focused(false) => {
        self.input.release_all();
        Ok(())
      }
      WindowEvent::KeyboardInput {
        event:
          KeyEvent {
            physical_key: PhysicalKey::Code(code),
            state,
            repeat,
            ..
          },
        ..
      } => match self.input.key(code, state) {
        Some(cmd) if !repeat => self.apply(event_loop, cmd),
        _ => Ok(()),
      },
      WindowEvent::MouseInput { state, button, .. } => {
        self.input.mouse_button(button, state);
        Ok(())
      }
      WindowEvent::CursorMoved { position, .. } => {
        if let Some((dx, dy)) = self.input.cursor_moved(position.x, position.y) {
          self.rig.drag(dx, dy);
        }
        Ok(())
      }
      WindowEvent::MouseWheel { delta, .. } => {
        self.rig.scroll(InputState::scroll_lines(delta));
        Ok(())
      }
      WindowEvent::DroppedFile(path) => {
        self.open_model(&path);
        Ok(())
      }
      WindowEvent::RedrawRequested => self.redraw(),
      _ => Ok(()),
    };

    if let Err(e) = res {
      self.fail(event_loop, e);
    }
  }

  fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
    let Some(window) = &self.window else {
      return;
    };

    let fps = self.cfg.render.max_frame_rate;
    if fps == 0 {
      event_loop.set_control_flow(ControlFlow::Poll);
      window.request_redraw();
    } else {
      let now = Instant::now();
      match self.next_frame_deadline {
        Some(t) if now < t => event_loop.set_control_flow(ControlFlow::WaitUntil(t)),
        _ => {
          let next = now + Duration::from_nanos(1_000_000_000 / u64::from(fps));
          self.next_frame_deadline = Some(next);
          event_loop.set_control_flow(ControlFlow::WaitUntil(next));
          window.request_redraw();
        }
      }
    }

    let now = Instant::now();
    if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
      info!("fps ~ {}", self.frames);
      self.frames = 0;
      self.last_fps_instant = now;
    }
  }
}

fn run(args: Args) -> Result<()> {
  let cfg = ViewerCfg::load(&args.config);
  let model = match &args.model {
    Some(path) => load_obj(path)?,
    None => {
      info!("no model given; showing a unit cube");
      ModelData::unit_cube()
    }
  };

  let event_loop: EventLoop<()> = EventLoop::new()?;
  let mut app = App::new(&args, cfg, model);
  event_loop.run_app(&mut app)?;

  match app.failure.take() {
    Some(e) => Err(e),
    None => Ok(()),
  }
}

fn main() -> Result<()> {
  init_tracing();
  let args = Args::parse();
  run(args).inspect_err(|e| error!("{e:#}"))
}

#[cfg(test)]
mod tests {
  use meshview_math::glam::Vec3;

  use super::*;

  fn app(shading: &str) -> App {
    let args = Args::try_parse_from(["meshview", "--shading", shading]).unwrap();
    App::new(&args, ViewerCfg::default(), ModelData::unit_cube())
  }

  fn scaled_cube(scale: f32, offset: [f32; 3]) -> ModelData {
    let mut model = ModelData::unit_cube();
    for v in &mut model.vertices {
      v.pos = [0, 1, 2].map(|k| v.pos[k] * scale + offset[k]);
    }
    model
  }

  #[test]
  fn new_model_reframes_camera_and_light() {
    let mut app = app("wireframe-hollow");
    app.rig.drag(40.0, -10.0);
    app.rig.advance(0.016);

    app.show_model(scaled_cube(4.0, [10.0, 0.0, -2.0]));

    assert_eq!(app.framing.center, Vec3::new(10.0, 0.0, -2.0));
    assert_eq!(app.framing.distance, 4.0);
    assert_eq!(app.light.distance, 4.0);
    assert_eq!(app.rig.camera, CameraRig::new(&app.framing, app.cfg.scene.sensitivity()).camera);
    assert_eq!(app.shading, ShadingMode::Scene);
    assert_eq!(app.model.vertices.len(), 24);
  }

  #[test]
  fn unreadable_drop_keeps_current_model() {
    let mut app = app("wireframe-solid");
    let before = app.framing;

    app.open_model(Path::new("does/not/exist.obj"));

    assert_eq!(app.framing, before);
    assert_eq!(app.shading, ShadingMode::WireframeSolid);
    assert_eq!(app.model, ModelData::unit_cube());
  }
}
