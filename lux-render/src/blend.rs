//! Fixed-point alpha compositing
//!
//! Every mode shares one mixing rule. For each pixel the effective alpha is
//! `a = round(alpha * src_alpha)` in the buffer's scale (255 or 65535) and
//! each color channel becomes
//!
//! ```text
//! out = (dst * (scale - a) + combine(dst, src) * a) / scale
//! ```
//!
//! with rounding. The output alpha is `min(dst_alpha + a, scale)`. Modes
//! differ only in `combine`. The formulas are generic over the packed word
//! so the 16-bit path is the 8-bit path with wider masks.

use crate::color::{ColorBuffer, Packed, ALPHA, BLUE, GREEN, RED};
use crate::error::RenderResult;
use serde::{Deserialize, Serialize};

/// Per-channel combine function applied before the alpha-weighted mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Source replaces destination
    #[default]
    Normal,
    /// Saturating sum
    Add,
    /// Inverse multiply of inverses (always lightens)
    Screen,
    /// Absolute difference
    Difference,
    /// Product (always darkens)
    Multiply,
    /// Saturating difference `dst - src`
    Subtract,
    /// Per-channel maximum
    Lighten,
    /// Per-channel minimum
    Darken,
}

impl BlendMode {
    pub const ALL: [BlendMode; 8] = [
        BlendMode::Normal,
        BlendMode::Add,
        BlendMode::Screen,
        BlendMode::Difference,
        BlendMode::Multiply,
        BlendMode::Subtract,
        BlendMode::Lighten,
        BlendMode::Darken,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Add => "add",
            BlendMode::Screen => "screen",
            BlendMode::Difference => "difference",
            BlendMode::Multiply => "multiply",
            BlendMode::Subtract => "subtract",
            BlendMode::Lighten => "lighten",
            BlendMode::Darken => "darken",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|m| m.name().eq_ignore_ascii_case(name))
    }

    /// Combine one channel pair at the given scale
    #[inline(always)]
    fn combine(self, d: u64, s: u64, scale: u64) -> u64 {
        match self {
            BlendMode::Normal => s,
            BlendMode::Add => (d + s).min(scale),
            BlendMode::Screen => d + s - div_round(d * s, scale),
            BlendMode::Difference => d.abs_diff(s),
            BlendMode::Multiply => div_round(d * s, scale),
            BlendMode::Subtract => d.saturating_sub(s),
            BlendMode::Lighten => d.max(s),
            BlendMode::Darken => d.min(s),
        }
    }

    /// Blend one packed pixel of either width
    #[inline(always)]
    fn pixel<W: Packed>(self, dst: W, src: W, alpha: f64) -> W {
        let scale = W::SCALE;
        let a = effective_alpha(alpha, src.channel(ALPHA), scale);
        if a == 0 {
            return dst;
        }
        let inv = scale - a;

        let mix = |slot| {
            let d = dst.channel(slot);
            let c = self.combine(d, src.channel(slot), scale);
            div_round(d * inv + c * a, scale)
        };

        W::pack(
            (dst.channel(ALPHA) + a).min(scale),
            mix(RED),
            mix(GREEN),
            mix(BLUE),
        )
    }

    /// Blend one 8-bit pixel
    pub fn blend8(self, dst: u32, src: u32, alpha: f64) -> u32 {
        self.pixel(dst, src, alpha)
    }

    /// Blend one 16-bit pixel
    pub fn blend16(self, dst: u64, src: u64, alpha: f64) -> u64 {
        self.pixel(dst, src, alpha)
    }

    /// Composite `src` onto `dst` at `alpha`, writing into `out`
    ///
    /// All three buffers must share one space and length.
    pub fn blend(
        self,
        dst: &ColorBuffer,
        src: &ColorBuffer,
        alpha: f64,
        out: &mut ColorBuffer,
    ) -> RenderResult<()> {
        dst.check_compatible(src)?;
        dst.check_compatible(out)?;
        match (dst, src, out) {
            (ColorBuffer::Rgb8(d), ColorBuffer::Rgb8(s), ColorBuffer::Rgb8(o)) => {
                self.run(d, s, alpha, o)
            }
            (ColorBuffer::Rgb16(d), ColorBuffer::Rgb16(s), ColorBuffer::Rgb16(o)) => {
                self.run(d, s, alpha, o)
            }
            _ => unreachable!("spaces checked above"),
        }
        Ok(())
    }

    /// Composite `src` onto `dst` at `alpha`, output aliasing `dst`
    pub fn blend_in_place(self, dst: &mut ColorBuffer, src: &ColorBuffer, alpha: f64) -> RenderResult<()> {
        dst.check_compatible(src)?;
        match (dst, src) {
            (ColorBuffer::Rgb8(d), ColorBuffer::Rgb8(s)) => self.run_in_place(d, s, alpha),
            (ColorBuffer::Rgb16(d), ColorBuffer::Rgb16(s)) => self.run_in_place(d, s, alpha),
            _ => unreachable!("spaces checked above"),
        }
        Ok(())
    }

    fn run<W: Packed>(self, dst: &[W], src: &[W], alpha: f64, out: &mut [W]) {
        for ((o, &d), &s) in out.iter_mut().zip(dst).zip(src) {
            *o = self.pixel(d, s, alpha);
        }
    }

    fn run_in_place<W: Packed>(self, dst: &mut [W], src: &[W], alpha: f64) {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = self.pixel(*d, s, alpha);
        }
    }
}

/// Two-phase crossfade between an outgoing and incoming buffer
///
/// Below the halfway point the incoming buffer is blended onto the
/// outgoing one with rising alpha; from halfway on the outgoing buffer is
/// blended onto the incoming one with falling alpha. Alpha is 0 at both
/// ends so the result is exactly `active` at progress 0 and exactly `next`
/// at progress 1 for every mode, including non-linear ones.
pub fn crossfade(
    mode: BlendMode,
    active: &ColorBuffer,
    next: &ColorBuffer,
    progress: f64,
    out: &mut ColorBuffer,
) -> RenderResult<()> {
    if progress < 0.5 {
        mode.blend(active, next, (progress * 2.0).min(1.0), out)
    } else {
        mode.blend(next, active, ((1.0 - progress) * 2.0).max(0.0), out)
    }
}

/// `round(alpha * src_alpha)` clamped to the scale
#[inline(always)]
fn effective_alpha(alpha: f64, src_alpha: u64, scale: u64) -> u64 {
    let alpha = if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) };
    ((alpha * src_alpha as f64).round() as u64).min(scale)
}

#[inline(always)]
fn div_round(n: u64, scale: u64) -> u64 {
    (n + scale / 2) / scale
}
