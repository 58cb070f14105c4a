use crate::color::{ColorBuffer, Packed, ALPHA, BLUE, GREEN, RED};
use crate::effect::Effect;
use crate::error::RenderResult;
use crate::node::{Parameters, RenderContext};

/// Scale color channels by `level`, alpha untouched
#[derive(Debug, Clone, Default)]
pub struct Dim;

impl Dim {
    pub const KIND: &'static str = "dim";
}

impl Effect for Dim {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with("level", 0.5, 0.0, 1.0)
    }

    fn process(&mut self, ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
        let level = ctx.param("level", 0.5);
        if level >= 1.0 {
            return Ok(());
        }
        match buf {
            ColorBuffer::Rgb8(px) => scale(px, level),
            ColorBuffer::Rgb16(px) => scale(px, level),
        }
        Ok(())
    }
}

fn scale<W: Packed>(pixels: &mut [W], level: f64) {
    let k = (level * W::SCALE as f64).round() as u64;
    let mul = |c: u64| (c * k + W::SCALE / 2) / W::SCALE;
    for p in pixels {
        let c = *p;
        *p = W::pack(c.channel(ALPHA), mul(c.channel(RED)), mul(c.channel(GREEN)), mul(c.channel(BLUE)));
    }
}

/// Invert color channels, alpha untouched
#[derive(Debug, Clone, Default)]
pub struct Invert;

impl Invert {
    pub const KIND: &'static str = "invert";
}

impl Effect for Invert {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn process(&mut self, _ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
        match buf {
            ColorBuffer::Rgb8(px) => px.iter_mut().for_each(|c| *c ^= 0x00FF_FFFF),
            ColorBuffer::Rgb16(px) => px.iter_mut().for_each(|c| *c ^= 0x0000_FFFF_FFFF_FFFF),
        }
        Ok(())
    }
}
