// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;

use crate::context::Device;

struct PoolHandle {
  device: Arc<Device>,
  raw: vk::CommandPool,
}

impl Drop for PoolHandle {
  fn drop(&mut self) {
    unsafe { self.device.destroy_command_pool(self.raw, None) };
  }
}

/// Resettable command pool for one queue family. Buffers allocated from it
/// keep it alive.
#[derive(Clone)]
pub struct CommandPool {
  inner: Arc<PoolHandle>,
  family: u32,
}

impl CommandPool {
  pub fn new(device: &Arc<Device>, family: u32) -> Result<Self> {
    let ci = vk::CommandPoolCreateInfo {
      s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
      queue_family_index: family,
      flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
      ..Default::default()
    };
    let raw = unsafe { device.create_command_pool(&ci, None) }.context("create_command_pool")?;
    Ok(Self {
      inner: Arc::new(PoolHandle {
        device: Arc::clone(device),
        raw,
      }),
      family,
    })
  }

  pub fn family(&self) -> u32 {
    self.family
  }

  pub fn device(&self) -> &Arc<Device> {
    &self.inner.device
  }

  pub fn allocate(&self, count: u32) -> Result<CommandBuffers> {
    let ai = vk::CommandBufferAllocateInfo {
      s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
      command_pool: self.inner.raw,
      level: vk::CommandBufferLevel::PRIMARY,
      command_buffer_count: count,
      ..Default::default()
    };
    let raw = if count == 0 {
      Vec::new()
    } else {
      unsafe { self.inner.device.allocate_command_buffers(&ai) }
        .context("allocate_command_buffers")?
    };
    Ok(CommandBuffers {
      pool: Arc::clone(&self.inner),
      raw,
    })
  }

  /// Allocates a buffer and begins it for one-time submission.
  pub fn begin_one_shot(&self) -> Result<OneShot> {
    let buffers = self.allocate(1)?;
    let cmd = buffers.raw[0];
    let bi = vk::CommandBufferBeginInfo {
      s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
      flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
      ..Default::default()
    };
    unsafe { self.inner.device.begin_command_buffer(cmd, &bi) }
      .context("begin one-shot command buffer")?;
    Ok(OneShot { buffers, cmd })
  }

  /// Records with `record`, then submits to `queue` and blocks until the
  /// queue is idle.
  pub fn one_shot<R>(
    &self,
    queue: vk::Queue,
    record: impl FnOnce(&ash::Device, vk::CommandBuffer) -> Result<R>,
  ) -> Result<R> {
    let shot = self.begin_one_shot()?;
    let out = record(&self.inner.device, shot.cmd)?;
    shot.end(queue)?;
    Ok(out)
  }
}

/// A recording one-time buffer. Dropped without [`OneShot::end`] it is
/// freed unsubmitted.
pub struct OneShot {
  buffers: CommandBuffers,
  cmd: vk::CommandBuffer,
}

impl OneShot {
  pub fn cmd(&self) -> vk::CommandBuffer {
    self.cmd
  }

  /// Ends, submits, waits for the queue and frees the buffer.
  pub fn end(self, queue: vk::Queue) -> Result<()> {
    let device = &self.buffers.pool.device;
    unsafe {
      device
        .end_command_buffer(self.cmd)
        .context("end one-shot command buffer")?;
      let si = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        command_buffer_count: 1,
        p_command_buffers: &self.cmd,
        ..Default::default()
      };
      device
        .queue_submit(queue, std::slice::from_ref(&si), vk::Fence::null())
        .context("submit one-shot")?;
      device.queue_wait_idle(queue).context("wait one-shot")?;
    }
    Ok(())
  }
}

/// Primary command buffers freed back to their pool on drop.
pub struct CommandBuffers {
  pool: Arc<PoolHandle>,
  raw: Vec<vk::CommandBuffer>,
}

impl CommandBuffers {
  pub fn get(&self, i: usize) -> vk::CommandBuffer {
    self.raw[i]
  }

  pub fn len(&self) -> usize {
    self.raw.len()
  }

  pub fn is_empty(&self) -> bool {
    self.raw.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = vk::CommandBuffer> + '_ {
    self.raw.iter().copied()
  }
}

impl Drop for CommandBuffers {
  fn drop(&mut self) {
    if !self.raw.is_empty() {
      unsafe {
        self.pool
          .device
          .free_command_buffers(self.pool.raw, &self.raw)
      };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::DeviceContext;

  #[test]
  fn one_shot_returns_recorded_value() {
    let Ok(ctx) = DeviceContext::headless() else {
      eprintln!("no vulkan device; skipping");
      return;
    };
    let pool = CommandPool::new(&ctx.device, ctx.graphics_family()).unwrap();
    let bufs = pool.allocate(3).unwrap();
    assert_eq!(bufs.len(), 3);
    let v = pool
      .one_shot(ctx.queues.graphics, |_, cmd| Ok(cmd != vk::CommandBuffer::null()))
      .unwrap();
    assert!(v);
    // abandoned one-shots are freed without submission
    drop(pool.begin_one_shot().unwrap());
  }
}
