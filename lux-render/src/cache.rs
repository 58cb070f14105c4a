//! Lazily converted multi-precision buffer cache
//!
//! A node writes its output in whichever precision it renders natively and
//! readers ask for whichever precision they consume. The cache allocates a
//! buffer on first touch and converts at most once per write per precision
//! actually read.

use crate::color::{ColorBuffer, ColorSpace};

const SLOTS: usize = ColorSpace::ALL.len();

/// Buffers keyed by color space plus the set of spaces that are current
pub struct BufferCache {
    len: usize,
    default_space: ColorSpace,
    buffers: [Option<ColorBuffer>; SLOTS],
    fresh: [bool; SLOTS],
    conversions: u64,
}

impl BufferCache {
    /// Create an empty cache for buffers of `len` pixels
    pub fn new(len: usize) -> Self {
        Self::with_default_space(len, ColorSpace::default())
    }

    pub fn with_default_space(len: usize, default_space: ColorSpace) -> Self {
        Self {
            len,
            default_space,
            buffers: [None, None],
            fresh: [false; SLOTS],
            conversions: 0,
        }
    }

    /// Pixel count of every buffer in the cache
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer in `space`, allocated and converted as needed
    pub fn get(&mut self, space: ColorSpace) -> &ColorBuffer {
        self.ensure(space);
        self.slot(space)
    }

    /// Buffer in `space` for writing; `space` becomes the sole fresh space
    ///
    /// Current content is converted in first, so in-place edits see the
    /// latest frame.
    pub fn write(&mut self, space: ColorSpace) -> &mut ColorBuffer {
        self.ensure(space);
        self.mark_modified(space);
        self.slot_mut(space)
    }

    /// Declare `space` the only authoritative copy
    pub fn mark_modified(&mut self, space: ColorSpace) {
        self.allocate(space);
        self.fresh = [false; SLOTS];
        self.fresh[space.slot()] = true;
    }

    pub fn is_fresh(&self, space: ColorSpace) -> bool {
        self.fresh[space.slot()]
    }

    /// Some fresh space, or the default space if nothing was written yet
    pub fn fresh_space(&self) -> ColorSpace {
        ColorSpace::ALL
            .into_iter()
            .find(|s| self.is_fresh(*s))
            .unwrap_or(self.default_space)
    }

    /// Buffer in `space` only if it is already fresh
    pub fn peek(&self, space: ColorSpace) -> Option<&ColorBuffer> {
        if self.is_fresh(space) {
            self.buffers[space.slot()].as_ref()
        } else {
            None
        }
    }

    /// Whether a buffer has been allocated for `space`
    pub fn is_allocated(&self, space: ColorSpace) -> bool {
        self.buffers[space.slot()].is_some()
    }

    /// Number of precision conversions performed so far
    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    /// Drop every buffer and adopt a new pixel count (geometry change)
    pub fn resize(&mut self, len: usize) {
        if len == self.len {
            return;
        }
        self.len = len;
        self.buffers = [None, None];
        self.fresh = [false; SLOTS];
    }

    /// Make `space` allocated and fresh
    fn ensure(&mut self, space: ColorSpace) {
        self.allocate(space);
        if self.is_fresh(space) {
            return;
        }

        // Never written: the zeroed buffer is authoritative as-is
        if !self.fresh.iter().any(|f| *f) {
            self.fresh[space.slot()] = true;
            return;
        }

        let from = self.fresh_space();
        let (src, dst) = self.pair(from, space);
        dst.convert_from(src);
        self.conversions += 1;
        self.fresh[space.slot()] = true;
    }

    fn allocate(&mut self, space: ColorSpace) {
        let len = self.len;
        self.buffers[space.slot()].get_or_insert_with(|| ColorBuffer::new(space, len));
    }

    fn slot(&self, space: ColorSpace) -> &ColorBuffer {
        self.buffers[space.slot()]
            .as_ref()
            .unwrap_or_else(|| unreachable!("{space:?} buffer used before allocation"))
    }

    fn slot_mut(&mut self, space: ColorSpace) -> &mut ColorBuffer {
        self.buffers[space.slot()]
            .as_mut()
            .unwrap_or_else(|| unreachable!("{space:?} buffer used before allocation"))
    }

    /// Source and destination buffers for a conversion between two spaces
    fn pair(&mut self, from: ColorSpace, to: ColorSpace) -> (&ColorBuffer, &mut ColorBuffer) {
        debug_assert_ne!(from, to);
        let (low, high) = self.buffers.split_at_mut(1);
        let (a, b) = (&mut low[0], &mut high[0]);
        let (src, dst) = if from.slot() == 0 { (a, b) } else { (b, a) };
        match (src.as_ref(), dst.as_mut()) {
            (Some(src), Some(dst)) => (src, dst),
            _ => unreachable!("conversion between unallocated buffers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_read_without_conversion() {
        let mut cache = BufferCache::new(8);
        assert!(!cache.is_fresh(ColorSpace::Rgb16));
        let buf = cache.get(ColorSpace::Rgb16);
        assert_eq!(buf.len(), 8);
        assert_eq!(buf.space(), ColorSpace::Rgb16);
        assert!(cache.is_fresh(ColorSpace::Rgb16));
        assert_eq!(cache.conversions(), 0);
        assert!(!cache.is_allocated(ColorSpace::Rgb8));
    }

    #[test]
    fn test_fresh_space_defaults() {
        let cache = BufferCache::with_default_space(4, ColorSpace::Rgb16);
        assert_eq!(cache.fresh_space(), ColorSpace::Rgb16);
    }

    #[test]
    fn test_mark_modified_collapses_fresh_set() {
        let mut cache = BufferCache::new(4);
        cache.write(ColorSpace::Rgb8).fill_argb8(0xFF10_2030);
        cache.get(ColorSpace::Rgb16);
        assert!(cache.is_fresh(ColorSpace::Rgb8));
        assert!(cache.is_fresh(ColorSpace::Rgb16));

        cache.mark_modified(ColorSpace::Rgb16);
        assert!(cache.is_fresh(ColorSpace::Rgb16));
        assert!(!cache.is_fresh(ColorSpace::Rgb8));
        assert_eq!(cache.fresh_space(), ColorSpace::Rgb16);
        assert!(cache.peek(ColorSpace::Rgb8).is_none());

        cache.get(ColorSpace::Rgb8);
        assert!(cache.is_fresh(ColorSpace::Rgb8));
        assert!(cache.is_fresh(ColorSpace::Rgb16));
    }

    #[test]
    fn test_conversion_paid_once_per_write() {
        let mut cache = BufferCache::new(16);
        cache.write(ColorSpace::Rgb8).fill_argb8(0xFFAB_CDEF);

        cache.get(ColorSpace::Rgb16);
        cache.get(ColorSpace::Rgb16);
        cache.get(ColorSpace::Rgb8);
        assert_eq!(cache.conversions(), 1);

        cache.write(ColorSpace::Rgb8).fill_argb8(0xFF00_0001);
        cache.get(ColorSpace::Rgb16);
        assert_eq!(cache.conversions(), 2);
    }

    #[test]
    fn test_round_trip_through_16_bit_is_lossless() {
        let mut cache = BufferCache::new(256);
        {
            let buf = cache.write(ColorSpace::Rgb8);
            for i in 0..256usize {
                let v = i as u32;
                buf.set_argb8(i, (v << 24) | (v << 16) | ((255 - v) << 8) | (v ^ 0x5A));
            }
        }
        let original = cache.get(ColorSpace::Rgb8).clone();

        // Touch 16-bit, make it authoritative, then read 8-bit back
        cache.write(ColorSpace::Rgb16);
        let back = cache.get(ColorSpace::Rgb8);
        assert_eq!(*back, original);
    }

    #[test]
    fn test_write_sees_previous_content() {
        let mut cache = BufferCache::new(2);
        cache.write(ColorSpace::Rgb8).fill_argb8(0xFF11_2233);
        let wide = cache.write(ColorSpace::Rgb16);
        assert_eq!(wide.get_argb8(1), Some(0xFF11_2233));
    }

    #[test]
    fn test_resize_drops_buffers() {
        let mut cache = BufferCache::new(2);
        cache.write(ColorSpace::Rgb8);
        cache.resize(5);
        assert!(!cache.is_allocated(ColorSpace::Rgb8));
        assert!(!cache.is_fresh(ColorSpace::Rgb8));
        assert_eq!(cache.get(ColorSpace::Rgb8).len(), 5);
    }
}
