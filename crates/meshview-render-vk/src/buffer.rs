// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ash::vk;
use bytemuck::Pod;

use crate::commands::CommandPool;
use crate::context::{Device, DeviceContext};
use crate::memory::find_memory_type;

pub const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
  vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// A buffer and the dedicated memory bound to it.
pub struct GpuBuffer {
  device: Arc<Device>,
  raw: vk::Buffer,
  memory: vk::DeviceMemory,
  size: vk::DeviceSize,
}

impl GpuBuffer {
  pub fn new(
    ctx: &DeviceContext,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    props: vk::MemoryPropertyFlags,
  ) -> Result<Self> {
    let device = &ctx.device;
    let bci = vk::BufferCreateInfo {
      s_type: vk::StructureType::BUFFER_CREATE_INFO,
      size,
      usage,
      sharing_mode: vk::SharingMode::EXCLUSIVE,
      ..Default::default()
    };
    let raw = unsafe { device.create_buffer(&bci, None) }.context("create_buffer")?;

    let bind = || -> Result<vk::DeviceMemory> {
      let req = unsafe { device.get_buffer_memory_requirements(raw) };
      let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: find_memory_type(&ctx.memory, req.memory_type_bits, props)?,
        ..Default::default()
      };
      let mem = unsafe { device.allocate_memory(&mai, None) }.context("allocate_memory")?;
      if let Err(e) = unsafe { device.bind_buffer_memory(raw, mem, 0) } {
        unsafe { device.free_memory(mem, None) };
        return Err(e).context("bind_buffer_memory");
      }
      Ok(mem)
    };
    let memory = match bind() {
      Ok(m) => m,
      Err(e) => {
        unsafe { device.destroy_buffer(raw, None) };
        return Err(e);
      }
    };

    Ok(Self {
      device: Arc::clone(device),
      raw,
      memory,
      size,
    })
  }

  /// Device-local buffer of `usage` initialised from `data`.
  pub fn with_data(
    ctx: &DeviceContext,
    pool: &CommandPool,
    queue: vk::Queue,
    usage: vk::BufferUsageFlags,
    data: &[u8],
  ) -> Result<Self> {
    let buf = Self::new(
      ctx,
      data.len().max(1) as vk::DeviceSize,
      usage | vk::BufferUsageFlags::TRANSFER_DST,
      vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    buf.fill(ctx, pool, queue, data)?;
    Ok(buf)
  }

  /// Host-visible, coherent uniform buffer sized for `T`.
  pub fn uniform<T: Pod>(ctx: &DeviceContext) -> Result<Self> {
    Self::new(
      ctx,
      std::mem::size_of::<T>() as vk::DeviceSize,
      vk::BufferUsageFlags::UNIFORM_BUFFER,
      HOST_COHERENT,
    )
  }

  /// Copies `data` in through a temporary host-visible staging buffer.
  /// Blocks until the copy has completed.
  pub fn fill(
    &self,
    ctx: &DeviceContext,
    pool: &CommandPool,
    queue: vk::Queue,
    data: &[u8],
  ) -> Result<()> {
    if data.is_empty() {
      return Ok(());
    }
    let size = data.len() as vk::DeviceSize;
    if size > self.size {
      bail!("{} bytes do not fit a {}-byte buffer", size, self.size);
    }
    let staging = Self::new(ctx, size, vk::BufferUsageFlags::TRANSFER_SRC, HOST_COHERENT)?;
    staging.write_bytes(0, data)?;
    pool.one_shot(queue, |device, cmd| {
      let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
      };
      unsafe { device.cmd_copy_buffer(cmd, staging.raw, self.raw, std::slice::from_ref(&region)) };
      Ok(())
    })
  }

  /// Host-visible buffers only.
  pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
    let len = data.len() as vk::DeviceSize;
    if offset + len > self.size {
      bail!("write of {len} bytes at {offset} overflows {}-byte buffer", self.size);
    }
    if len == 0 {
      return Ok(());
    }
    unsafe {
      let ptr = self
        .device
        .map_memory(self.memory, offset, len, vk::MemoryMapFlags::empty())
        .context("map_memory")?;
      std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
      self.device.unmap_memory(self.memory);
    }
    Ok(())
  }

  pub fn write<T: Pod>(&self, value: &T) -> Result<()> {
    self.write_bytes(0, bytemuck::bytes_of(value))
  }

  /// Host-visible buffers only.
  pub fn read_back(&self) -> Result<Vec<u8>> {
    let mut out = vec![0u8; self.size as usize];
    unsafe {
      let ptr = self
        .device
        .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
        .context("map_memory")?;
      std::ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), out.len());
      self.device.unmap_memory(self.memory);
    }
    Ok(out)
  }

  pub fn raw(&self) -> vk::Buffer {
    self.raw
  }

  pub fn size(&self) -> vk::DeviceSize {
    self.size
  }

  pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo {
      buffer: self.raw,
      offset: 0,
      range: self.size,
    }
  }
}

impl Drop for GpuBuffer {
  fn drop(&mut self) {
    unsafe {
      self.device.destroy_buffer(self.raw, None);
      self.device.free_memory(self.memory, None);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn staged_fill_lands_in_device_memory() {
    let Ok(ctx) = DeviceContext::headless() else {
      eprintln!("no vulkan device; skipping");
      return;
    };
    let pool = CommandPool::new(&ctx.device, ctx.graphics_family()).unwrap();
    let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

    let dst = GpuBuffer::with_data(
      &ctx,
      &pool,
      ctx.queues.graphics,
      vk::BufferUsageFlags::TRANSFER_SRC,
      &data,
    )
    .unwrap();
    let readback = GpuBuffer::new(&ctx, 1000, vk::BufferUsageFlags::TRANSFER_DST, HOST_COHERENT).unwrap();
    pool.one_shot(ctx.queues.graphics, |device, cmd| {
      let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size: 1000,
      };
      unsafe { device.cmd_copy_buffer(cmd, dst.raw(), readback.raw(), &[region]) };
      Ok(())
    })
    .unwrap();
    assert_eq!(readback.read_back().unwrap(), data);
  }

  #[test]
  fn oversized_writes_are_rejected() {
    let Ok(ctx) = DeviceContext::headless() else {
      eprintln!("no vulkan device; skipping");
      return;
    };
    let buf = GpuBuffer::new(&ctx, 16, vk::BufferUsageFlags::UNIFORM_BUFFER, HOST_COHERENT).unwrap();
    assert!(buf.write_bytes(8, &[0u8; 16]).is_err());
    let value = [1.0f32, 2.0, 3.0, 4.0];
    buf.write(&value).unwrap();
    assert_eq!(buf.read_back().unwrap(), bytemuck::bytes_of(&value));
  }
}
