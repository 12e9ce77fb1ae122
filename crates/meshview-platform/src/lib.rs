// SPDX-License-Identifier: CEPL-1.0
pub use winit;

pub mod input;
pub mod window;

pub use input::{Command, InputState};
pub use window::PlatformWindow;
