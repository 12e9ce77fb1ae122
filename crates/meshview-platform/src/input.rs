// SPDX-License-Identifier: CEPL-1.0
//! Maps window events onto camera controls and viewer commands.

use meshview_math::{CameraRig, MoveKeys};
use meshview_render::ShadingMode;
use winit::{
  event::{ElementState, MouseButton, MouseScrollDelta},
  keyboard::KeyCode,
};

/// One-shot actions triggered by a key press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
  Shading(ShadingMode),
  ToggleShadow,
  ResetCamera,
  Quit,
}

fn move_key(code: KeyCode) -> Option<MoveKeys> {
  Some(match code {
    KeyCode::KeyW => MoveKeys::PITCH_UP,
    KeyCode::KeyS => MoveKeys::PITCH_DOWN,
    KeyCode::KeyA => MoveKeys::ROLL_LEFT,
    KeyCode::KeyD => MoveKeys::ROLL_RIGHT,
    KeyCode::KeyQ => MoveKeys::YAW_LEFT,
    KeyCode::KeyE => MoveKeys::YAW_RIGHT,
    KeyCode::ArrowUp => MoveKeys::PAN_UP,
    KeyCode::ArrowDown => MoveKeys::PAN_DOWN,
    KeyCode::ArrowLeft => MoveKeys::PAN_LEFT,
    KeyCode::ArrowRight => MoveKeys::PAN_RIGHT,
    KeyCode::PageUp => MoveKeys::DOLLY_OUT,
    KeyCode::PageDown => MoveKeys::DOLLY_IN,
    _ => return None,
  })
}

fn command(code: KeyCode) -> Option<Command> {
  Some(match code {
    KeyCode::Digit1 => Command::Shading(ShadingMode::Default),
    KeyCode::Digit2 => Command::Shading(ShadingMode::Scene),
    KeyCode::Digit3 => Command::Shading(ShadingMode::WireframeHollow),
    KeyCode::Digit4 => Command::Shading(ShadingMode::WireframeSolid),
    KeyCode::KeyM => Command::ToggleShadow,
    KeyCode::KeyR => Command::ResetCamera,
    KeyCode::Escape => Command::Quit,
    _ => return None,
  })
}

/// Held keys and pointer state between frames.
#[derive(Debug, Default)]
pub struct InputState {
  held: MoveKeys,
  dragging: bool,
  last_cursor: Option<(f64, f64)>,
}

impl InputState {
  /// Updates held movement keys; returns a command on key press.
  pub fn key(&mut self, code: KeyCode, state: ElementState) -> Option<Command> {
    let pressed = state == ElementState::Pressed;
    if let Some(k) = move_key(code) {
      self.held.set(k, pressed);
      return None;
    }
    if pressed {
      command(code)
    } else {
      None
    }
  }

  pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) {
    if button == MouseButton::Left {
      self.dragging = state == ElementState::Pressed;
    }
  }

  /// Returns the pointer delta while dragging.
  pub fn cursor_moved(&mut self, x: f64, y: f64) -> Option<(f32, f32)> {
    let prev = self.last_cursor.replace((x, y));
    match prev {
      Some((px, py)) if self.dragging => Some(((x - px) as f32, (y - py) as f32)),
      _ => None,
    }
  }

  pub fn scroll_lines(delta: MouseScrollDelta) -> f32 {
    match delta {
      MouseScrollDelta::LineDelta(_, y) => y,
      MouseScrollDelta::PixelDelta(p) => (p.y / 40.0) as f32,
    }
  }

  /// Focus lost: nothing stays held.
  pub fn release_all(&mut self) {
    self.held = MoveKeys::empty();
    self.dragging = false;
  }

  pub fn apply_to(&self, rig: &mut CameraRig) {
    rig.set_held(self.held);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn movement_keys_are_held_until_released() {
    let mut input = InputState::default();
    assert_eq!(input.key(KeyCode::KeyW, ElementState::Pressed), None);
    assert_eq!(input.key(KeyCode::PageDown, ElementState::Pressed), None);
    assert_eq!(input.held, MoveKeys::PITCH_UP | MoveKeys::DOLLY_IN);
    input.key(KeyCode::KeyW, ElementState::Released);
    assert_eq!(input.held, MoveKeys::DOLLY_IN);
    input.release_all();
    assert!(input.held.is_empty());
  }

  #[test]
  fn commands_fire_on_press_only() {
    let mut input = InputState::default();
    assert_eq!(
      input.key(KeyCode::Digit3, ElementState::Pressed),
      Some(Command::Shading(ShadingMode::WireframeHollow))
    );
    assert_eq!(input.key(KeyCode::Digit3, ElementState::Released), None);
    assert_eq!(input.key(KeyCode::KeyM, ElementState::Pressed), Some(Command::ToggleShadow));
    assert_eq!(input.key(KeyCode::KeyZ, ElementState::Pressed), None);
  }

  #[test]
  fn drag_reports_deltas_only_with_button_down() {
    let mut input = InputState::default();
    assert_eq!(input.cursor_moved(10.0, 10.0), None);
    assert_eq!(input.cursor_moved(12.0, 10.0), None);
    input.mouse_button(MouseButton::Left, ElementState::Pressed);
    assert_eq!(input.cursor_moved(15.0, 6.0), Some((3.0, -4.0)));
    input.mouse_button(MouseButton::Left, ElementState::Released);
    assert_eq!(input.cursor_moved(20.0, 6.0), None);
  }
}
