// SPDX-License-Identifier: CEPL-1.0
//! Images, views, samplers and the layout transitions the renderer uses.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ash::vk;
use meshview_core::EngineError;
use meshview_math::mip_extent;

use crate::buffer::{GpuBuffer, HOST_COHERENT};
use crate::commands::CommandPool;
use crate::context::{Device, DeviceContext};
use crate::memory::find_memory_type;

/// The only layout changes the upload path performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutTransition {
  UndefinedToTransferDst,
  TransferDstToShaderRead,
  UndefinedToShaderRead,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarrierMasks {
  pub src_access: vk::AccessFlags,
  pub dst_access: vk::AccessFlags,
  pub src_stage: vk::PipelineStageFlags,
  pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
  pub fn between(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<Self, EngineError> {
    use vk::ImageLayout as L;
    match (old, new) {
      (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(Self::UndefinedToTransferDst),
      (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok(Self::TransferDstToShaderRead),
      (L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL) => Ok(Self::UndefinedToShaderRead),
      _ => Err(EngineError::UnsupportedTransition {
        from: format!("{old:?}"),
        to: format!("{new:?}"),
      }),
    }
  }

  pub fn layouts(self) -> (vk::ImageLayout, vk::ImageLayout) {
    use vk::ImageLayout as L;
    match self {
      Self::UndefinedToTransferDst => (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
      Self::TransferDstToShaderRead => (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
      Self::UndefinedToShaderRead => (L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL),
    }
  }

  pub fn masks(self) -> BarrierMasks {
    use vk::{AccessFlags as A, PipelineStageFlags as S};
    match self {
      Self::UndefinedToTransferDst => BarrierMasks {
        src_access: A::empty(),
        dst_access: A::TRANSFER_WRITE,
        src_stage: S::TOP_OF_PIPE,
        dst_stage: S::TRANSFER,
      },
      Self::TransferDstToShaderRead => BarrierMasks {
        src_access: A::TRANSFER_WRITE,
        dst_access: A::SHADER_READ,
        src_stage: S::TRANSFER,
        dst_stage: S::FRAGMENT_SHADER,
      },
      Self::UndefinedToShaderRead => BarrierMasks {
        src_access: A::empty(),
        dst_access: A::SHADER_READ,
        src_stage: S::TOP_OF_PIPE,
        dst_stage: S::FRAGMENT_SHADER,
      },
    }
  }
}

fn subresource(aspect: vk::ImageAspectFlags, base_mip: u32, levels: u32) -> vk::ImageSubresourceRange {
  vk::ImageSubresourceRange {
    aspect_mask: aspect,
    base_mip_level: base_mip,
    level_count: levels,
    base_array_layer: 0,
    layer_count: 1,
  }
}

/// Records a barrier for `transition` over all `mip_levels` of `image`.
pub fn cmd_transition(
  device: &ash::Device,
  cmd: vk::CommandBuffer,
  image: vk::Image,
  aspect: vk::ImageAspectFlags,
  mip_levels: u32,
  transition: LayoutTransition,
) {
  let (old, new) = transition.layouts();
  let m = transition.masks();
  let barrier = vk::ImageMemoryBarrier {
    s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
    old_layout: old,
    new_layout: new,
    src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
    dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
    image,
    subresource_range: subresource(aspect, 0, mip_levels),
    src_access_mask: m.src_access,
    dst_access_mask: m.dst_access,
    ..Default::default()
  };
  unsafe {
    device.cmd_pipeline_barrier(
      cmd,
      m.src_stage,
      m.dst_stage,
      vk::DependencyFlags::empty(),
      &[],
      &[],
      std::slice::from_ref(&barrier),
    )
  };
}

/// Moves `image` from `old` to `new` in a one-shot submission. Any pair
/// outside [`LayoutTransition`] is rejected before anything is recorded.
#[allow(clippy::too_many_arguments)]
pub fn transition_image_layout(
  pool: &CommandPool,
  queue: vk::Queue,
  image: vk::Image,
  aspect: vk::ImageAspectFlags,
  old: vk::ImageLayout,
  new: vk::ImageLayout,
  mip_levels: u32,
) -> Result<()> {
  let transition = LayoutTransition::between(old, new)?;
  pool.one_shot(queue, |device, cmd| {
    cmd_transition(device, cmd, image, aspect, mip_levels, transition);
    Ok(())
  })
}

pub fn create_image_view(
  device: &ash::Device,
  image: vk::Image,
  format: vk::Format,
  aspect: vk::ImageAspectFlags,
  mip_levels: u32,
) -> Result<vk::ImageView> {
  let ci = vk::ImageViewCreateInfo {
    s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
    image,
    view_type: vk::ImageViewType::TYPE_2D,
    format,
    subresource_range: subresource(aspect, 0, mip_levels),
    ..Default::default()
  };
  unsafe { device.create_image_view(&ci, None) }.context("create_image_view")
}

pub fn is_depth_format(format: vk::Format) -> bool {
  matches!(
    format,
    vk::Format::D32_SFLOAT
      | vk::Format::D32_SFLOAT_S8_UINT
      | vk::Format::D24_UNORM_S8_UINT
      | vk::Format::D16_UNORM
      | vk::Format::D16_UNORM_S8_UINT
  )
}

/// First candidate usable as an optimal-tiling depth attachment.
pub fn find_depth_format(ctx: &DeviceContext) -> Result<vk::Format> {
  // Prefer 32f, then the stencil variants.
  [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
  ]
  .into_iter()
  .find(|&f| {
    ctx.format_properties(f)
      .optimal_tiling_features
      .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
  })
  .context("no supported depth format")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSpec {
  pub width: u32,
  pub height: u32,
  pub mip_levels: u32,
  pub samples: vk::SampleCountFlags,
  pub format: vk::Format,
  pub usage: vk::ImageUsageFlags,
  pub aspect: vk::ImageAspectFlags,
}

impl ImageSpec {
  /// Sampled RGBA texture with room for a full mip chain.
  pub fn texture(width: u32, height: u32, mip_levels: u32) -> Self {
    Self {
      width,
      height,
      mip_levels,
      samples: vk::SampleCountFlags::TYPE_1,
      format: vk::Format::R8G8B8A8_SRGB,
      usage: vk::ImageUsageFlags::TRANSFER_SRC
        | vk::ImageUsageFlags::TRANSFER_DST
        | vk::ImageUsageFlags::SAMPLED,
      aspect: vk::ImageAspectFlags::COLOR,
    }
  }

  /// Transient multisampled colour target.
  pub fn color_target(extent: vk::Extent2D, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
    Self {
      width: extent.width,
      height: extent.height,
      mip_levels: 1,
      samples,
      format,
      usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
      aspect: vk::ImageAspectFlags::COLOR,
    }
  }

  pub fn depth_target(extent: vk::Extent2D, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
    Self {
      width: extent.width,
      height: extent.height,
      mip_levels: 1,
      samples,
      format,
      usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
      aspect: vk::ImageAspectFlags::DEPTH,
    }
  }

  /// Depth image rendered from the light and sampled by the scene pass.
  pub fn shadow_map(size: u32, format: vk::Format) -> Self {
    Self {
      width: size,
      height: size,
      mip_levels: 1,
      samples: vk::SampleCountFlags::TYPE_1,
      format,
      usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        | vk::ImageUsageFlags::SAMPLED
        | vk::ImageUsageFlags::TRANSFER_DST,
      aspect: vk::ImageAspectFlags::DEPTH,
    }
  }

  pub fn extent(&self) -> vk::Extent2D {
    vk::Extent2D {
      width: self.width,
      height: self.height,
    }
  }
}

/// Image, its memory and a view over every mip level.
pub struct GpuImage {
  device: Arc<Device>,
  raw: vk::Image,
  memory: vk::DeviceMemory,
  view: vk::ImageView,
  spec: ImageSpec,
}

impl GpuImage {
  pub fn new(ctx: &DeviceContext, spec: ImageSpec) -> Result<Self> {
    let device = &ctx.device;
    let ci = vk::ImageCreateInfo {
      s_type: vk::StructureType::IMAGE_CREATE_INFO,
      image_type: vk::ImageType::TYPE_2D,
      format: spec.format,
      extent: vk::Extent3D {
        width: spec.width,
        height: spec.height,
        depth: 1,
      },
      mip_levels: spec.mip_levels,
      array_layers: 1,
      samples: spec.samples,
      tiling: vk::ImageTiling::OPTIMAL,
      usage: spec.usage,
      sharing_mode: vk::SharingMode::EXCLUSIVE,
      initial_layout: vk::ImageLayout::UNDEFINED,
      ..Default::default()
    };
    let raw = unsafe { device.create_image(&ci, None) }.context("create_image")?;

    let finish = || -> Result<(vk::DeviceMemory, vk::ImageView)> {
      let req = unsafe { device.get_image_memory_requirements(raw) };
      let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: find_memory_type(
          &ctx.memory,
          req.memory_type_bits,
          vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?,
        ..Default::default()
      };
      let memory = unsafe { device.allocate_memory(&mai, None) }.context("allocate_memory")?;
      let view = unsafe { device.bind_image_memory(raw, memory, 0) }
        .context("bind_image_memory")
        .and_then(|_| create_image_view(device, raw, spec.format, spec.aspect, spec.mip_levels));
      match view {
        Ok(v) => Ok((memory, v)),
        Err(e) => {
          unsafe { device.free_memory(memory, None) };
          Err(e)
        }
      }
    };
    let (memory, view) = match finish() {
      Ok(v) => v,
      Err(e) => {
        unsafe { device.destroy_image(raw, None) };
        return Err(e);
      }
    };

    Ok(Self {
      device: Arc::clone(device),
      raw,
      memory,
      view,
      spec,
    })
  }

  /// 1×1 texture in shader-read layout, used wherever a material has no
  /// map for a slot.
  pub fn empty_texture(ctx: &DeviceContext, pool: &CommandPool, queue: vk::Queue) -> Result<Self> {
    let img = Self::new(ctx, ImageSpec::texture(1, 1, 1))?;
    img.set_name("empty texture");
    img.fill_pixels(ctx, pool, queue, &[255, 255, 255, 255])?;
    img.transition(pool, queue, LayoutTransition::TransferDstToShaderRead)?;
    Ok(img)
  }

  pub fn raw(&self) -> vk::Image {
    self.raw
  }

  pub fn view(&self) -> vk::ImageView {
    self.view
  }

  pub fn spec(&self) -> &ImageSpec {
    &self.spec
  }

  pub fn set_name(&self, name: &str) {
    self.device.set_name(self.raw, name);
    self.device.set_name(self.view, name);
  }

  pub fn transition(&self, pool: &CommandPool, queue: vk::Queue, t: LayoutTransition) -> Result<()> {
    let (old, new) = t.layouts();
    transition_image_layout(pool, queue, self.raw, self.spec.aspect, old, new, self.spec.mip_levels)
  }

  /// Uploads tightly packed level-0 pixels. Leaves every level in
  /// `TRANSFER_DST_OPTIMAL`.
  pub fn fill_pixels(
    &self,
    ctx: &DeviceContext,
    pool: &CommandPool,
    queue: vk::Queue,
    pixels: &[u8],
  ) -> Result<()> {
    let expected = self.spec.width as usize * self.spec.height as usize * 4;
    if pixels.len() != expected {
      bail!(
        "{}x{} image expects {expected} bytes, got {}",
        self.spec.width,
        self.spec.height,
        pixels.len()
      );
    }
    let staging = GpuBuffer::new(
      ctx,
      pixels.len() as vk::DeviceSize,
      vk::BufferUsageFlags::TRANSFER_SRC,
      HOST_COHERENT,
    )?;
    staging.write_bytes(0, pixels)?;
    self.transition(pool, queue, LayoutTransition::UndefinedToTransferDst)?;
    copy_buffer_to_image(pool, queue, staging.raw(), self.raw, self.spec.width, self.spec.height)
  }

  /// Fills levels 1.. by repeated linear blits from the level above, then
  /// leaves every level in `SHADER_READ_ONLY_OPTIMAL`. Expects all levels
  /// in `TRANSFER_DST_OPTIMAL` with level 0 populated.
  pub fn generate_mipmaps(&self, ctx: &DeviceContext, pool: &CommandPool, queue: vk::Queue) -> Result<()> {
    let feats = ctx.format_properties(self.spec.format).optimal_tiling_features;
    if !feats.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR) {
      return Err(EngineError::LinearBlitUnsupported(format!("{:?}", self.spec.format)).into());
    }
    let levels = self.spec.mip_levels;
    let (w, h) = (self.spec.width, self.spec.height);
    let image = self.raw;
    pool.one_shot(queue, |device, cmd| {
      let barrier = |level: u32,
                     old: vk::ImageLayout,
                     new: vk::ImageLayout,
                     src_access: vk::AccessFlags,
                     dst_access: vk::AccessFlags,
                     src_stage: vk::PipelineStageFlags,
                     dst_stage: vk::PipelineStageFlags| {
        let b = vk::ImageMemoryBarrier {
          s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
          old_layout: old,
          new_layout: new,
          src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
          dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
          image,
          subresource_range: subresource(vk::ImageAspectFlags::COLOR, level, 1),
          src_access_mask: src_access,
          dst_access_mask: dst_access,
          ..Default::default()
        };
        unsafe {
          device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(&b),
          )
        };
      };

      for level in 1..levels {
        barrier(
          level - 1,
          vk::ImageLayout::TRANSFER_DST_OPTIMAL,
          vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
          vk::AccessFlags::TRANSFER_WRITE,
          vk::AccessFlags::TRANSFER_READ,
          vk::PipelineStageFlags::TRANSFER,
          vk::PipelineStageFlags::TRANSFER,
        );

        let blit = mip_blit(w, h, level);
        unsafe {
          device.cmd_blit_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&blit),
            vk::Filter::LINEAR,
          )
        };

        barrier(
          level - 1,
          vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
          vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
          vk::AccessFlags::TRANSFER_READ,
          vk::AccessFlags::SHADER_READ,
          vk::PipelineStageFlags::TRANSFER,
          vk::PipelineStageFlags::FRAGMENT_SHADER,
        );
      }

      barrier(
        levels - 1,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::AccessFlags::SHADER_READ,
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
      );
      Ok(())
    })
  }

  /// Clears a depth image to `depth` and leaves it shader-readable.
  pub fn fill_depth(&self, pool: &CommandPool, queue: vk::Queue, depth: f32) -> Result<()> {
    let aspect = self.spec.aspect;
    let (image, levels) = (self.raw, self.spec.mip_levels);
    pool.one_shot(queue, |device, cmd| {
      cmd_transition(device, cmd, image, aspect, levels, LayoutTransition::UndefinedToTransferDst);
      let value = vk::ClearDepthStencilValue { depth, stencil: 0 };
      unsafe {
        device.cmd_clear_depth_stencil_image(
          cmd,
          image,
          vk::ImageLayout::TRANSFER_DST_OPTIMAL,
          &value,
          &[subresource(aspect, 0, levels)],
        )
      };
      cmd_transition(device, cmd, image, aspect, levels, LayoutTransition::TransferDstToShaderRead);
      Ok(())
    })
  }

  /// Copies mip `level` of a shader-readable colour image back to the
  /// host. The image needs `TRANSFER_SRC` usage; it is returned to
  /// `SHADER_READ_ONLY_OPTIMAL` afterwards.
  pub fn read_back_level(
    &self,
    ctx: &DeviceContext,
    pool: &CommandPool,
    queue: vk::Queue,
    level: u32,
  ) -> Result<Vec<u8>> {
    if level >= self.spec.mip_levels {
      bail!("mip level {level} past the {} levels of this image", self.spec.mip_levels);
    }
    let (w, h) = mip_extent(self.spec.width, self.spec.height, level);
    let bytes = w as vk::DeviceSize * h as vk::DeviceSize * 4;
    let out = GpuBuffer::new(ctx, bytes, vk::BufferUsageFlags::TRANSFER_DST, HOST_COHERENT)?;
    let (image, aspect) = (self.raw, self.spec.aspect);
    pool.one_shot(queue, |device, cmd| {
      let to_src = vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        old_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: subresource(aspect, level, 1),
        src_access_mask: vk::AccessFlags::SHADER_READ,
        dst_access_mask: vk::AccessFlags::TRANSFER_READ,
        ..Default::default()
      };
      let back = vk::ImageMemoryBarrier {
        old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        src_access_mask: vk::AccessFlags::TRANSFER_READ,
        dst_access_mask: vk::AccessFlags::SHADER_READ,
        ..to_src
      };
      let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
          aspect_mask: aspect,
          mip_level: level,
          base_array_layer: 0,
          layer_count: 1,
        },
        image_offset: vk::Offset3D::default(),
        image_extent: vk::Extent3D {
          width: w,
          height: h,
          depth: 1,
        },
      };
      unsafe {
        device.cmd_pipeline_barrier(
          cmd,
          vk::PipelineStageFlags::FRAGMENT_SHADER,
          vk::PipelineStageFlags::TRANSFER,
          vk::DependencyFlags::empty(),
          &[],
          &[],
          &[to_src],
        );
        device.cmd_copy_image_to_buffer(
          cmd,
          image,
          vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
          out.raw(),
          &[region],
        );
        device.cmd_pipeline_barrier(
          cmd,
          vk::PipelineStageFlags::TRANSFER,
          vk::PipelineStageFlags::FRAGMENT_SHADER,
          vk::DependencyFlags::empty(),
          &[],
          &[],
          &[back],
        );
      }
      Ok(())
    })?;
    out.read_back()
  }
}

impl Drop for GpuImage {
  fn drop(&mut self) {
    unsafe {
      self.device.destroy_image_view(self.view, None);
      self.device.destroy_image(self.raw, None);
      self.device.free_memory(self.memory, None);
    }
  }
}

/// Copies a tightly packed buffer into mip 0 of an image in
/// `TRANSFER_DST_OPTIMAL`.
/// Blit region that downsamples mip `level - 1` into `level` of a
/// `width` x `height` colour image.
pub fn mip_blit(width: u32, height: u32, level: u32) -> vk::ImageBlit {
  let corner = |(x, y): (u32, u32)| vk::Offset3D {
    x: x as i32,
    y: y as i32,
    z: 1,
  };
  let layers = |mip_level| vk::ImageSubresourceLayers {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    mip_level,
    base_array_layer: 0,
    layer_count: 1,
  };
  vk::ImageBlit {
    src_subresource: layers(level - 1),
    src_offsets: [vk::Offset3D::default(), corner(mip_extent(width, height, level - 1))],
    dst_subresource: layers(level),
    dst_offsets: [vk::Offset3D::default(), corner(mip_extent(width, height, level))],
  }
}

pub fn copy_buffer_to_image(
  pool: &CommandPool,
  queue: vk::Queue,
  buffer: vk::Buffer,
  image: vk::Image,
  width: u32,
  height: u32,
) -> Result<()> {
  pool.one_shot(queue, |device, cmd| {
    let region = vk::BufferImageCopy {
      buffer_offset: 0,
      buffer_row_length: 0,
      buffer_image_height: 0,
      image_subresource: vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
      },
      image_offset: vk::Offset3D::default(),
      image_extent: vk::Extent3D {
        width,
        height,
        depth: 1,
      },
    };
    unsafe {
      device.cmd_copy_buffer_to_image(
        cmd,
        buffer,
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
      )
    };
    Ok(())
  })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerSpec {
  pub max_anisotropy: f32,
  pub max_lod: f32,
}

/// Linear, repeating sampler with an opaque-black border. Anisotropy is
/// enabled whenever `max_anisotropy` exceeds 1.
pub struct Sampler {
  device: Arc<Device>,
  raw: vk::Sampler,
}

impl Sampler {
  pub fn new(device: &Arc<Device>, spec: SamplerSpec) -> Result<Self> {
    let ci = vk::SamplerCreateInfo {
      s_type: vk::StructureType::SAMPLER_CREATE_INFO,
      mag_filter: vk::Filter::LINEAR,
      min_filter: vk::Filter::LINEAR,
      address_mode_u: vk::SamplerAddressMode::REPEAT,
      address_mode_v: vk::SamplerAddressMode::REPEAT,
      address_mode_w: vk::SamplerAddressMode::REPEAT,
      anisotropy_enable: if spec.max_anisotropy > 1.0 { vk::TRUE } else { vk::FALSE },
      max_anisotropy: spec.max_anisotropy,
      border_color: vk::BorderColor::INT_OPAQUE_BLACK,
      unnormalized_coordinates: vk::FALSE,
      compare_enable: vk::FALSE,
      compare_op: vk::CompareOp::ALWAYS,
      mipmap_mode: vk::SamplerMipmapMode::LINEAR,
      mip_lod_bias: 0.0,
      min_lod: 0.0,
      max_lod: spec.max_lod,
      ..Default::default()
    };
    let raw = unsafe { device.create_sampler(&ci, None) }.context("create_sampler")?;
    Ok(Self {
      device: Arc::clone(device),
      raw,
    })
  }

  pub fn raw(&self) -> vk::Sampler {
    self.raw
  }
}

impl Drop for Sampler {
  fn drop(&mut self) {
    unsafe { self.device.destroy_sampler(self.raw, None) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use meshview_math::mip_levels;

  #[test]
  fn only_three_transitions_exist() {
    use vk::ImageLayout as L;
    assert_eq!(
      LayoutTransition::between(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
      Ok(LayoutTransition::UndefinedToTransferDst)
    );
    let err = LayoutTransition::between(L::UNDEFINED, L::PRESENT_SRC_KHR).unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedTransition { .. }));
    assert!(LayoutTransition::between(L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL).is_err());
  }

  #[test]
  fn transition_masks_match_stages() {
    let m = LayoutTransition::UndefinedToTransferDst.masks();
    assert_eq!(m.src_access, vk::AccessFlags::empty());
    assert_eq!(m.dst_access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(m.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    assert_eq!(m.dst_stage, vk::PipelineStageFlags::TRANSFER);

    let m = LayoutTransition::TransferDstToShaderRead.masks();
    assert_eq!(m.src_access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(m.dst_access, vk::AccessFlags::SHADER_READ);
    assert_eq!(m.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

    let m = LayoutTransition::UndefinedToShaderRead.masks();
    assert_eq!(m.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    assert_eq!(m.dst_access, vk::AccessFlags::SHADER_READ);
  }

  #[test]
  fn every_transition_round_trips_through_layouts() {
    for t in [
      LayoutTransition::UndefinedToTransferDst,
      LayoutTransition::TransferDstToShaderRead,
      LayoutTransition::UndefinedToShaderRead,
    ] {
      let (old, new) = t.layouts();
      assert_eq!(LayoutTransition::between(old, new), Ok(t));
    }
  }

  fn gpu() -> Option<(DeviceContext, CommandPool)> {
    let ctx = DeviceContext::headless().ok()?;
    let pool = CommandPool::new(&ctx.device, ctx.graphics_family()).ok()?;
    Some((ctx, pool))
  }

  #[test]
  fn filled_texture_reads_back_unchanged() {
    let Some((ctx, pool)) = gpu() else {
      eprintln!("no vulkan device; skipping");
      return;
    };
    let q = ctx.queues.graphics;
    let pixels: Vec<u8> = (0..4 * 4 * 4).map(|i| i as u8).collect();
    let img = GpuImage::new(&ctx, ImageSpec::texture(4, 4, 1)).unwrap();
    img.fill_pixels(&ctx, &pool, q, &pixels).unwrap();
    img.transition(&pool, q, LayoutTransition::TransferDstToShaderRead).unwrap();
    assert_eq!(img.read_back_level(&ctx, &pool, q, 0).unwrap(), pixels);
  }

  #[test]
  fn mip_chain_keeps_level_zero() {
    let Some((ctx, pool)) = gpu() else {
      eprintln!("no vulkan device; skipping");
      return;
    };
    let q = ctx.queues.graphics;
    let (w, h) = (8, 2);
    let levels = mip_levels(w, h);
    assert_eq!(levels, 4);
    let pixels = [10u8, 20, 30, 255].repeat((w * h) as usize);
    let img = GpuImage::new(&ctx, ImageSpec::texture(w, h, levels)).unwrap();
    img.fill_pixels(&ctx, &pool, q, &pixels).unwrap();
    match img.generate_mipmaps(&ctx, &pool, q) {
      Ok(()) => assert_eq!(img.read_back_level(&ctx, &pool, q, 0).unwrap(), pixels),
      Err(e) => assert!(matches!(
        e.downcast_ref::<EngineError>(),
        Some(EngineError::LinearBlitUnsupported(_))
      )),
    }
  }

  #[test]
  fn blits_halve_each_level() {
    let (w, h) = (8, 4);
    let ends: Vec<_> = (1..mip_levels(w, h))
      .map(|level| {
        let blit = mip_blit(w, h, level);
        assert_eq!(blit.src_subresource.mip_level, level - 1);
        assert_eq!(blit.dst_subresource.mip_level, level);
        assert_eq!(blit.src_offsets[0], vk::Offset3D::default());
        assert_eq!(blit.dst_offsets[0], vk::Offset3D::default());
        let src = blit.src_offsets[1];
        let dst = blit.dst_offsets[1];
        assert_eq!((src.x as u32, src.y as u32), mip_extent(w, h, level - 1));
        assert_eq!((src.z, dst.z), (1, 1));
        (dst.x, dst.y)
      })
      .collect();
    assert_eq!(ends, vec![(4, 2), (2, 1), (1, 1)]);
  }

  #[test]
  fn deeper_mip_level_reads_back_downsampled() {
    let Some((ctx, pool)) = gpu() else {
      eprintln!("no vulkan device; skipping");
      return;
    };
    let q = ctx.queues.graphics;
    let (w, h) = (8, 4);
    let levels = mip_levels(w, h);
    let texel = [60u8, 120, 180, 255];
    let img = GpuImage::new(&ctx, ImageSpec::texture(w, h, levels)).unwrap();
    img.fill_pixels(&ctx, &pool, q, &texel.repeat((w * h) as usize)).unwrap();
    if let Err(e) = img.generate_mipmaps(&ctx, &pool, q) {
      assert!(matches!(
        e.downcast_ref::<EngineError>(),
        Some(EngineError::LinearBlitUnsupported(_))
      ));
      return;
    }

    let level2 = img.read_back_level(&ctx, &pool, q, 2).unwrap();
    // 2x1 texels, each the average of a uniform block
    assert_eq!(level2.len(), 2 * 4);
    for (got, want) in level2.iter().zip(texel.iter().cycle()) {
      assert!(got.abs_diff(*want) <= 1, "{got} vs {want}");
    }
    assert!(img.read_back_level(&ctx, &pool, q, levels).is_err());
  }

  #[test]
  fn wrong_pixel_count_is_rejected() {
    let Some((ctx, pool)) = gpu() else {
      eprintln!("no vulkan device; skipping");
      return;
    };
    let img = GpuImage::new(&ctx, ImageSpec::texture(2, 2, 1)).unwrap();
    assert!(img.fill_pixels(&ctx, &pool, ctx.queues.graphics, &[0u8; 4]).is_err());
  }

  #[test]
  fn depth_fill_and_empty_texture() {
    let Some((ctx, pool)) = gpu() else {
      eprintln!("no vulkan device; skipping");
      return;
    };
    let q = ctx.queues.graphics;
    let format = find_depth_format(&ctx).unwrap();
    assert!(is_depth_format(format));
    let depth = GpuImage::new(&ctx, ImageSpec::shadow_map(1, format)).unwrap();
    depth.fill_depth(&pool, q, 1.0).unwrap();

    let empty = GpuImage::empty_texture(&ctx, &pool, q).unwrap();
    assert_eq!(empty.spec().format, vk::Format::R8G8B8A8_SRGB);
    assert_eq!(empty.read_back_level(&ctx, &pool, q, 0).unwrap(), vec![255; 4]);
  }
}
