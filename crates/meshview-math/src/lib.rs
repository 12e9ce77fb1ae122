// SPDX-License-Identifier: CEPL-1.0
//! Camera, light and mip-chain arithmetic for the viewer.

pub mod camera;
pub mod framing;
pub mod mip;
pub mod scene;

pub use camera::{Camera, CameraRig, MoveKeys, Sensitivity};
pub use framing::ModelFraming;
pub use glam;
pub use mip::{mip_extent, mip_levels};
pub use scene::{Light, SceneMatrices};
