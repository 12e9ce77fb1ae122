// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use meshview_render::{ShadingMode, ShadowMode};

use crate::context::Device;

/// The pre-recorded (and one per-frame) command buffers each swapchain image
/// owns. Discriminants index the per-image buffer table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
  Default = 0,
  Scene,
  SceneNoShadow,
  SceneBlank,
  SceneNoShadowBlank,
  Wireframe,
  Shadow,
  Gui,
}

impl PassKind {
  pub const COUNT: usize = 8;

  /// Everything except `Gui`, which is re-recorded every frame.
  pub const STATIC: [PassKind; 7] = [
    PassKind::Default,
    PassKind::Scene,
    PassKind::SceneNoShadow,
    PassKind::SceneBlank,
    PassKind::SceneNoShadowBlank,
    PassKind::Wireframe,
    PassKind::Shadow,
  ];

  pub fn index(self) -> usize {
    self as usize
  }
}

/// Ordered command buffers to submit for a mode combination; `Gui` is last.
pub fn submit_plan(shading: ShadingMode, shadow: ShadowMode) -> Vec<PassKind> {
  let mapped = shadow == ShadowMode::Mapped && shading.draws_geometry();
  let mut plan = Vec::with_capacity(4);
  if mapped {
    plan.push(PassKind::Shadow);
  }
  match shading {
    ShadingMode::Default => plan.push(PassKind::Default),
    ShadingMode::Scene if mapped => plan.push(PassKind::Scene),
    ShadingMode::Scene => plan.push(PassKind::SceneNoShadow),
    ShadingMode::WireframeHollow => plan.extend([PassKind::Default, PassKind::Wireframe]),
    ShadingMode::WireframeSolid if mapped => plan.extend([PassKind::SceneBlank, PassKind::Wireframe]),
    ShadingMode::WireframeSolid => plan.extend([PassKind::SceneNoShadowBlank, PassKind::Wireframe]),
  }
  plan.push(PassKind::Gui);
  plan
}

/// Which frame slot last submitted work that renders into each swapchain
/// image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageFenceTracker {
  owners: Vec<Option<usize>>,
}

impl ImageFenceTracker {
  pub fn new(image_count: usize) -> Self {
    Self {
      owners: vec![None; image_count],
    }
  }

  /// Forget all owners after the swapchain was rebuilt.
  pub fn reset(&mut self, image_count: usize) {
    self.owners.clear();
    self.owners.resize(image_count, None);
  }

  /// Records `slot` as the owner of `image`. Returns the previous owner when
  /// it is a different slot, whose fence must be waited on before reuse.
  pub fn claim(&mut self, image: usize, slot: usize) -> Option<usize> {
    let owner = self.owners.get_mut(image)?;
    let prev = owner.replace(slot);
    prev.filter(|&p| p != slot)
  }

  pub fn owner(&self, image: usize) -> Option<usize> {
    self.owners.get(image).copied().flatten()
  }

  pub fn len(&self) -> usize {
    self.owners.len()
  }

  pub fn is_empty(&self) -> bool {
    self.owners.is_empty()
  }
}

struct Slot {
  image_available: vk::Semaphore,
  render_finished: vk::Semaphore,
  in_flight: vk::Fence,
}

/// Per frame-in-flight synchronisation objects. Fences start signalled so the
/// first wait on each slot returns immediately.
pub struct FrameSlots {
  device: Arc<Device>,
  slots: Vec<Slot>,
  current: usize,
}

impl FrameSlots {
  pub fn new(device: &Arc<Device>, count: usize) -> Result<Self> {
    let mut out = Self {
      device: Arc::clone(device),
      slots: Vec::with_capacity(count),
      current: 0,
    };
    let sem_ci = vk::SemaphoreCreateInfo {
      s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
      ..Default::default()
    };
    let fence_ci = vk::FenceCreateInfo {
      s_type: vk::StructureType::FENCE_CREATE_INFO,
      flags: vk::FenceCreateFlags::SIGNALED,
      ..Default::default()
    };
    for i in 0..count.max(1) {
      unsafe {
        let image_available = device
          .create_semaphore(&sem_ci, None)
          .context("create image_available semaphore")?;
        let render_finished = match device.create_semaphore(&sem_ci, None) {
          Ok(s) => s,
          Err(e) => {
            device.destroy_semaphore(image_available, None);
            return Err(e).context("create render_finished semaphore");
          }
        };
        let in_flight = match device.create_fence(&fence_ci, None) {
          Ok(f) => f,
          Err(e) => {
            device.destroy_semaphore(render_finished, None);
            device.destroy_semaphore(image_available, None);
            return Err(e).context("create in_flight fence");
          }
        };
        device.set_name(in_flight, &format!("frame {i} fence"));
        out.slots.push(Slot {
          image_available,
          render_finished,
          in_flight,
        });
      }
    }
    Ok(out)
  }

  pub fn current(&self) -> usize {
    self.current
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn advance(&mut self) {
    self.current = next_slot(self.current, self.slots.len());
  }

  pub fn image_available(&self) -> vk::Semaphore {
    self.slots[self.current].image_available
  }

  pub fn render_finished(&self) -> vk::Semaphore {
    self.slots[self.current].render_finished
  }

  pub fn fence(&self, slot: usize) -> vk::Fence {
    self.slots[slot].in_flight
  }

  pub fn wait(&self, slot: usize) -> Result<()> {
    let fence = self.fence(slot);
    unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }.context("wait_for_fences")
  }

  pub fn reset_current(&self) -> Result<()> {
    let fence = self.fence(self.current);
    unsafe { self.device.reset_fences(&[fence]) }.context("reset_fences")
  }
}

impl Drop for FrameSlots {
  fn drop(&mut self) {
    unsafe {
      for s in &self.slots {
        self.device.destroy_fence(s.in_flight, None);
        self.device.destroy_semaphore(s.render_finished, None);
        self.device.destroy_semaphore(s.image_available, None);
      }
    }
  }
}

pub fn next_slot(current: usize, count: usize) -> usize {
  (current + 1) % count.max(1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plans_cover_every_mode() {
    use PassKind::*;
    use ShadingMode as S;
    use ShadowMode as M;
    assert_eq!(submit_plan(S::Default, M::Off), vec![Default, Gui]);
    assert_eq!(submit_plan(S::Default, M::Mapped), vec![Default, Gui]);
    assert_eq!(submit_plan(S::Scene, M::Off), vec![SceneNoShadow, Gui]);
    assert_eq!(submit_plan(S::Scene, M::Mapped), vec![Shadow, Scene, Gui]);
    assert_eq!(submit_plan(S::WireframeHollow, M::Mapped), vec![Default, Wireframe, Gui]);
    assert_eq!(
      submit_plan(S::WireframeSolid, M::Off),
      vec![SceneNoShadowBlank, Wireframe, Gui]
    );
    assert_eq!(
      submit_plan(S::WireframeSolid, M::Mapped),
      vec![Shadow, SceneBlank, Wireframe, Gui]
    );
  }

  #[test]
  fn gui_is_always_last_and_unique() {
    for shading in ShadingMode::ALL {
      for shadow in [ShadowMode::Off, ShadowMode::Mapped] {
        let plan = submit_plan(shading, shadow);
        assert_eq!(plan.last(), Some(&PassKind::Gui));
        assert_eq!(plan.iter().filter(|&&p| p == PassKind::Gui).count(), 1);
      }
    }
  }

  #[test]
  fn pass_indices_are_dense() {
    let mut seen: Vec<usize> = PassKind::STATIC.iter().map(|p| p.index()).collect();
    seen.push(PassKind::Gui.index());
    seen.sort_unstable();
    assert_eq!(seen, (0..PassKind::COUNT).collect::<Vec<_>>());
  }

  #[test]
  fn claim_reports_other_slot_only() {
    let mut t = ImageFenceTracker::new(3);
    assert_eq!(t.claim(0, 0), None);
    assert_eq!(t.claim(0, 0), None);
    assert_eq!(t.claim(0, 1), Some(0));
    assert_eq!(t.owner(0), Some(1));
    assert_eq!(t.claim(7, 1), None);

    t.reset(2);
    assert_eq!(t.len(), 2);
    assert_eq!(t.owner(0), None);
  }

  // Mirrors the draw loop: wait on the slot fence, wait on the image's
  // previous owner, then submit. Completes the oldest work whenever a wait
  // happens and checks the outstanding count never exceeds the slot count.
  #[test]
  fn in_flight_frames_are_bounded() {
    for (slots, images) in [(2usize, 3usize), (2, 1), (3, 2), (1, 4)] {
      let mut pending = vec![false; slots];
      let mut tracker = ImageFenceTracker::new(images);
      let mut slot = 0;
      for frame in 0..50 {
        pending[slot] = false;
        let image = (frame * 7 + 1) % images;
        if let Some(prev) = tracker.claim(image, slot) {
          pending[prev] = false;
        }
        pending[slot] = true;
        assert!(pending.iter().filter(|&&p| p).count() <= slots);
        slot = next_slot(slot, slots);
      }
    }
  }

  #[test]
  fn slot_wraps() {
    assert_eq!(next_slot(0, 2), 1);
    assert_eq!(next_slot(1, 2), 0);
    assert_eq!(next_slot(0, 0), 0);
  }
}
