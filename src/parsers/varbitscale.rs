//! Variable bit scale coding of ultra capsule base distances.
//!
//! A 12-bit scaled value covers distances up to ~65 m by giving coarser steps to
//! larger distances: each band maps `scaled - SCALED_BASE[i]` back to
//! `TARGET_BASE[i] + (remain << LEVEL[i])`.

const VBS_SCALED_BASE: [u32; 5] = [3328, 1792, 1280, 512, 0];
const VBS_SCALED_LVL: [u32; 5] = [4, 3, 2, 1, 0];
const VBS_TARGET_BASE: [u32; 5] = [0x1 << 14, 0x1 << 12, 0x1 << 11, 0x1 << 9, 0];

/// Decodes a scaled value, returning the distance and the shift level of its band.
#[inline]
pub fn varbitscale_decode(scaled: u32) -> (u32, u32) {
    for i in 0..VBS_SCALED_BASE.len() {
        let remain = scaled as i32 - VBS_SCALED_BASE[i] as i32;
        if remain >= 0 {
            let level = VBS_SCALED_LVL[i];
            return (VBS_TARGET_BASE[i] + ((remain as u32) << level), level);
        }
    }
    (0, 0)
}

/// Inverse of [`varbitscale_decode`]. Bits below the band's resolution are dropped.
pub fn varbitscale_encode(value: u32) -> u32 {
    for i in 0..VBS_TARGET_BASE.len() {
        if value >= VBS_TARGET_BASE[i] {
            return VBS_SCALED_BASE[i] + ((value - VBS_TARGET_BASE[i]) >> VBS_SCALED_LVL[i]);
        }
    }
    0
}
