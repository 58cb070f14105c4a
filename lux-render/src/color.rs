//! Packed ARGB colors and fixed-length color buffers
//!
//! Two precisions are supported:
//! - `Rgb8`: 8 bits per channel packed in a `u32` (`0xAARRGGBB`)
//! - `Rgb16`: 16 bits per channel packed in a `u64` (`0xAAAARRRRGGGGBBBB`)

use crate::error::{RenderError, RenderResult};
use serde::{Deserialize, Serialize};

/// Channel slot indices within a packed word, lowest first
pub(crate) const BLUE: u32 = 0;
pub(crate) const GREEN: u32 = 1;
pub(crate) const RED: u32 = 2;
pub(crate) const ALPHA: u32 = 3;

/// A packed ARGB word of some channel width
///
/// Every fixed-point algorithm is written once against this trait so the
/// 16-bit path is the same formula as the 8-bit one with wider masks.
pub(crate) trait Packed: Copy + PartialEq + Send + Sync + 'static {
    /// Bits per channel
    const BITS: u32;
    /// Maximum channel value
    const SCALE: u64;

    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;

    #[inline(always)]
    fn channel(self, slot: u32) -> u64 {
        (self.to_bits() >> (slot * Self::BITS)) & Self::SCALE
    }

    #[inline(always)]
    fn pack(a: u64, r: u64, g: u64, b: u64) -> Self {
        Self::from_bits(
            (a << (ALPHA * Self::BITS))
                | (r << (RED * Self::BITS))
                | (g << (GREEN * Self::BITS))
                | (b << (BLUE * Self::BITS)),
        )
    }
}

impl Packed for u32 {
    const BITS: u32 = 8;
    const SCALE: u64 = 0xFF;

    #[inline(always)]
    fn to_bits(self) -> u64 {
        u64::from(self)
    }

    #[inline(always)]
    fn from_bits(bits: u64) -> Self {
        bits as u32
    }
}

impl Packed for u64 {
    const BITS: u32 = 16;
    const SCALE: u64 = 0xFFFF;

    #[inline(always)]
    fn to_bits(self) -> u64 {
        self
    }

    #[inline(always)]
    fn from_bits(bits: u64) -> Self {
        bits
    }
}

/// Opaque black at 8 bits per channel
pub const BLACK8: u32 = 0xFF00_0000;
/// Opaque black at 16 bits per channel
pub const BLACK16: u64 = 0xFFFF_0000_0000_0000;

/// Pack an 8-bit color
#[inline]
pub fn argb8(a: u8, r: u8, g: u8, b: u8) -> u32 {
    u32::pack(a.into(), r.into(), g.into(), b.into())
}

/// Split an 8-bit color into `(a, r, g, b)`
#[inline]
pub fn channels8(c: u32) -> (u8, u8, u8, u8) {
    (
        c.channel(ALPHA) as u8,
        c.channel(RED) as u8,
        c.channel(GREEN) as u8,
        c.channel(BLUE) as u8,
    )
}

/// Split a 16-bit color into `(a, r, g, b)`
#[inline]
pub fn channels16(c: u64) -> (u16, u16, u16, u16) {
    (
        c.channel(ALPHA) as u16,
        c.channel(RED) as u16,
        c.channel(GREEN) as u16,
        c.channel(BLUE) as u16,
    )
}

/// Widen an 8-bit color to 16 bits (each channel times 257)
#[inline]
pub fn widen(c: u32) -> u64 {
    let w = |slot| c.channel(slot) * 257;
    u64::pack(w(ALPHA), w(RED), w(GREEN), w(BLUE))
}

/// Narrow a 16-bit color to 8 bits with rounding
///
/// Exact inverse of [`widen`] for any 8-bit origin.
#[inline]
pub fn narrow(c: u64) -> u32 {
    let n = |slot| (c.channel(slot) + 128) / 257;
    u32::pack(n(ALPHA), n(RED), n(GREEN), n(BLUE))
}

/// Opaque 8-bit color from hue (degrees), saturation and brightness (0-1)
pub fn hsb(hue: f64, saturation: f64, brightness: f64) -> u32 {
    let h = hue.rem_euclid(360.0) / 60.0;
    let s = saturation.clamp(0.0, 1.0);
    let v = brightness.clamp(0.0, 1.0);

    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector as u32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let to8 = |x: f64| (x * 255.0).round() as u8;
    argb8(0xFF, to8(r), to8(g), to8(b))
}

/// Channel precision of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    #[default]
    Rgb8,
    Rgb16,
}

impl ColorSpace {
    pub const ALL: [ColorSpace; 2] = [ColorSpace::Rgb8, ColorSpace::Rgb16];

    /// Maximum channel value in this precision
    pub fn scale(self) -> u64 {
        match self {
            ColorSpace::Rgb8 => u32::SCALE,
            ColorSpace::Rgb16 => u64::SCALE,
        }
    }

    /// Stable slot used by per-space tables
    pub(crate) fn slot(self) -> usize {
        match self {
            ColorSpace::Rgb8 => 0,
            ColorSpace::Rgb16 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorSpace::Rgb8 => "rgb8",
            ColorSpace::Rgb16 => "rgb16",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rgb8" | "8" => Some(ColorSpace::Rgb8),
            "rgb16" | "16" => Some(ColorSpace::Rgb16),
            _ => None,
        }
    }
}

/// A fixed-length array of packed colors in one precision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorBuffer {
    Rgb8(Vec<u32>),
    Rgb16(Vec<u64>),
}

impl ColorBuffer {
    /// Zero-valued (transparent black) buffer
    pub fn new(space: ColorSpace, len: usize) -> Self {
        match space {
            ColorSpace::Rgb8 => ColorBuffer::Rgb8(vec![0; len]),
            ColorSpace::Rgb16 => ColorBuffer::Rgb16(vec![0; len]),
        }
    }

    /// Buffer filled with one 8-bit color (widened for `Rgb16`)
    pub fn filled(space: ColorSpace, len: usize, color: u32) -> Self {
        match space {
            ColorSpace::Rgb8 => ColorBuffer::Rgb8(vec![color; len]),
            ColorSpace::Rgb16 => ColorBuffer::Rgb16(vec![widen(color); len]),
        }
    }

    pub fn space(&self) -> ColorSpace {
        match self {
            ColorBuffer::Rgb8(_) => ColorSpace::Rgb8,
            ColorBuffer::Rgb16(_) => ColorSpace::Rgb16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColorBuffer::Rgb8(v) => v.len(),
            ColorBuffer::Rgb16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill every pixel with an 8-bit color
    pub fn fill_argb8(&mut self, color: u32) {
        match self {
            ColorBuffer::Rgb8(v) => v.fill(color),
            ColorBuffer::Rgb16(v) => v.fill(widen(color)),
        }
    }

    /// Fill with opaque black
    pub fn fill_black(&mut self) {
        self.fill_argb8(BLACK8);
    }

    /// Set one pixel from an 8-bit color; out-of-range indices are ignored
    pub fn set_argb8(&mut self, index: usize, color: u32) {
        match self {
            ColorBuffer::Rgb8(v) => {
                if let Some(px) = v.get_mut(index) {
                    *px = color;
                }
            }
            ColorBuffer::Rgb16(v) => {
                if let Some(px) = v.get_mut(index) {
                    *px = widen(color);
                }
            }
        }
    }

    /// Read one pixel as an 8-bit color
    pub fn get_argb8(&self, index: usize) -> Option<u32> {
        match self {
            ColorBuffer::Rgb8(v) => v.get(index).copied(),
            ColorBuffer::Rgb16(v) => v.get(index).map(|&c| narrow(c)),
        }
    }

    /// All pixels as 8-bit colors
    pub fn to_argb8(&self) -> Vec<u32> {
        match self {
            ColorBuffer::Rgb8(v) => v.clone(),
            ColorBuffer::Rgb16(v) => v.iter().map(|&c| narrow(c)).collect(),
        }
    }

    pub fn as_rgb8(&self) -> Option<&[u32]> {
        match self {
            ColorBuffer::Rgb8(v) => Some(v),
            ColorBuffer::Rgb16(_) => None,
        }
    }

    pub fn as_rgb8_mut(&mut self) -> Option<&mut [u32]> {
        match self {
            ColorBuffer::Rgb8(v) => Some(v),
            ColorBuffer::Rgb16(_) => None,
        }
    }

    pub fn as_rgb16(&self) -> Option<&[u64]> {
        match self {
            ColorBuffer::Rgb16(v) => Some(v),
            ColorBuffer::Rgb8(_) => None,
        }
    }

    pub fn as_rgb16_mut(&mut self) -> Option<&mut [u64]> {
        match self {
            ColorBuffer::Rgb16(v) => Some(v),
            ColorBuffer::Rgb8(_) => None,
        }
    }

    /// Copy `src` into this buffer, reusing the allocation when spaces match
    pub fn assign(&mut self, src: &ColorBuffer) {
        match (self, src) {
            (ColorBuffer::Rgb8(d), ColorBuffer::Rgb8(s)) => d.clone_from(s),
            (ColorBuffer::Rgb16(d), ColorBuffer::Rgb16(s)) => d.clone_from(s),
            (dst, src) => *dst = src.clone(),
        }
    }

    /// Convert `src` into this buffer's space, taking its length
    pub fn convert_from(&mut self, src: &ColorBuffer) {
        match (self, src) {
            (ColorBuffer::Rgb16(d), ColorBuffer::Rgb8(s)) => {
                d.clear();
                d.extend(s.iter().map(|&c| widen(c)));
            }
            (ColorBuffer::Rgb8(d), ColorBuffer::Rgb16(s)) => {
                d.clear();
                d.extend(s.iter().map(|&c| narrow(c)));
            }
            (dst, src) => dst.assign(src),
        }
    }

    /// Change length, zero-filling new pixels
    pub fn resize(&mut self, len: usize) {
        match self {
            ColorBuffer::Rgb8(v) => v.resize(len, 0),
            ColorBuffer::Rgb16(v) => v.resize(len, 0),
        }
    }

    /// Error unless `other` has the same space and length
    pub fn check_compatible(&self, other: &ColorBuffer) -> RenderResult<()> {
        if self.space() == other.space() && self.len() == other.len() {
            Ok(())
        } else {
            Err(RenderError::BufferMismatch {
                expected: self.space(),
                expected_len: self.len(),
                actual: other.space(),
                actual_len: other.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_narrow_lossless_for_all_8bit_values() {
        for v in 0..=255u8 {
            let c = argb8(v, v, 255 - v, v / 2);
            assert_eq!(narrow(widen(c)), c);
        }
    }

    #[test]
    fn test_widen_extremes() {
        assert_eq!(widen(0xFFFF_FFFF), 0xFFFF_FFFF_FFFF_FFFF);
        assert_eq!(widen(0), 0);
        assert_eq!(widen(BLACK8), BLACK16);
    }

    #[test]
    fn test_channels_roundtrip() {
        let c = argb8(0x12, 0x34, 0x56, 0x78);
        assert_eq!(c, 0x1234_5678);
        assert_eq!(channels8(c), (0x12, 0x34, 0x56, 0x78));
        assert_eq!(channels16(widen(c)), (0x1212, 0x3434, 0x5656, 0x7878));
    }

    #[test]
    fn test_hsb_primaries() {
        assert_eq!(hsb(0.0, 1.0, 1.0), 0xFFFF_0000);
        assert_eq!(hsb(120.0, 1.0, 1.0), 0xFF00_FF00);
        assert_eq!(hsb(240.0, 1.0, 1.0), 0xFF00_00FF);
        assert_eq!(hsb(360.0, 1.0, 1.0), 0xFFFF_0000);
        assert_eq!(hsb(42.0, 0.0, 0.0), BLACK8);
    }

    #[test]
    fn test_buffer_convert_and_assign() {
        let mut src = ColorBuffer::filled(ColorSpace::Rgb8, 4, 0xFF80_4020);
        src.set_argb8(2, 0xFF00_00FF);

        let mut wide = ColorBuffer::new(ColorSpace::Rgb16, 0);
        wide.convert_from(&src);
        assert_eq!(wide.len(), 4);
        assert_eq!(wide.get_argb8(2), Some(0xFF00_00FF));

        let mut back = ColorBuffer::new(ColorSpace::Rgb8, 1);
        back.convert_from(&wide);
        assert_eq!(back, src);

        let mut copy = ColorBuffer::new(ColorSpace::Rgb16, 9);
        copy.assign(&src);
        assert_eq!(copy, src);
    }

    #[test]
    fn test_check_compatible() {
        let a = ColorBuffer::new(ColorSpace::Rgb8, 3);
        assert!(a.check_compatible(&ColorBuffer::new(ColorSpace::Rgb8, 3)).is_ok());
        assert!(a.check_compatible(&ColorBuffer::new(ColorSpace::Rgb16, 3)).is_err());
        assert!(a.check_compatible(&ColorBuffer::new(ColorSpace::Rgb8, 4)).is_err());
    }

    #[test]
    fn test_set_out_of_range_is_ignored() {
        let mut buf = ColorBuffer::new(ColorSpace::Rgb16, 2);
        buf.set_argb8(5, 0xFFFF_FFFF);
        assert_eq!(buf.get_argb8(5), None);
        assert_eq!(buf.to_argb8(), vec![0, 0]);
    }
}
