//! Order-preserving float to integer mapping for depth keys.
//!
//! IEEE-754 floats compare like sign-magnitude integers. Flipping the sign bit
//! of positive values and every bit of negative values turns that into plain
//! unsigned ordering, which is what the radix sort consumes.

/// WGSL twin of [`encode_depth`], prepended to shaders that emit sort keys.
pub const ENCODE_DEPTH_WGSL: &str = "
fn encode_depth(depth: f32) -> u32 {
    let bits = bitcast<u32>(depth);
    let mask = bitcast<u32>(bitcast<i32>(bits) >> 31u) | 0x80000000u;
    return bits ^ mask;
}
";

/// Map a signed depth to a key such that `a < b` implies `encode_depth(a) < encode_depth(b)`.
///
/// NaN has no place in a total order and is not supported.
#[inline]
pub fn encode_depth(depth: f32) -> u32 {
    let bits = depth.to_bits();
    let mask = ((bits as i32) >> 31) as u32 | 0x8000_0000;
    bits ^ mask
}

/// Inverse of [`encode_depth`].
#[inline]
pub fn decode_depth(key: u32) -> f32 {
    let mask = (((key as i32) >> 31) as u32 ^ 0xffff_ffff) | 0x8000_0000;
    f32::from_bits(key ^ mask)
}
