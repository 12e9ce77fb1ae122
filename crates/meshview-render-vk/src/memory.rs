// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use meshview_core::EngineError;

/// First memory type allowed by `type_bits` whose flags contain `required`.
pub fn find_memory_type(
  mem: &vk::PhysicalDeviceMemoryProperties,
  type_bits: u32,
  required: vk::MemoryPropertyFlags,
) -> Result<u32, EngineError> {
  (0..mem.memory_type_count)
    .find(|&i| {
      (type_bits & (1 << i)) != 0
        && mem.memory_types[i as usize].property_flags.contains(required)
    })
    .ok_or_else(|| EngineError::NoMemoryType {
      type_bits,
      flags: format!("{required:?}"),
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
    let mut p = vk::PhysicalDeviceMemoryProperties {
      memory_type_count: types.len() as u32,
      ..Default::default()
    };
    for (i, f) in types.iter().enumerate() {
      p.memory_types[i].property_flags = *f;
    }
    p
  }

  #[test]
  fn picks_first_allowed_match() {
    let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    let mem = props(&[
      vk::MemoryPropertyFlags::DEVICE_LOCAL,
      host,
      host | vk::MemoryPropertyFlags::HOST_CACHED,
    ]);
    assert_eq!(find_memory_type(&mem, 0b111, host), Ok(1));
    // bit 1 masked out by the resource
    assert_eq!(find_memory_type(&mem, 0b101, host), Ok(2));
    assert_eq!(
      find_memory_type(&mem, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
      Ok(0)
    );
  }

  #[test]
  fn no_match_is_an_error() {
    let mem = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
    let err = find_memory_type(&mem, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
    assert!(matches!(err, EngineError::NoMemoryType { type_bits: 1, .. }));
  }
}
