// SPDX-License-Identifier: CEPL-1.0

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`.
pub fn mip_levels(width: u32, height: u32) -> u32 {
  let largest = width.max(height).max(1);
  u32::BITS - largest.leading_zeros()
}

/// Extent of mip `level` for a `width` x `height` base, never below one texel.
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
  let shrink = |v: u32| v.checked_shr(level).unwrap_or(0).max(1);
  (shrink(width), shrink(height))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn level_count_matches_log2() {
    assert_eq!(mip_levels(1, 1), 1);
    assert_eq!(mip_levels(2, 1), 2);
    assert_eq!(mip_levels(512, 512), 10);
    assert_eq!(mip_levels(1024, 300), 11);
    assert_eq!(mip_levels(0, 0), 1);
  }

  #[test]
  fn extents_halve_and_clamp() {
    let (w, h) = (640, 100);
    let levels = mip_levels(w, h);
    for k in 0..levels {
      let (mw, mh) = mip_extent(w, h, k);
      assert_eq!(mw, (w / 2u32.pow(k)).max(1));
      assert_eq!(mh, (h / 2u32.pow(k)).max(1));
    }
    assert_eq!(mip_extent(640, 100, levels - 1), (1, 1));
    assert_eq!(mip_extent(7, 3, 40), (1, 1));
  }
}
