use crate::color::{argb8, channels8, hsb, ColorBuffer, BLACK8};
use crate::error::RenderResult;
use crate::node::{Parameters, RenderContext};
use crate::pattern::Generator;
use lux_input::MidiMessage;

/// Constant color
#[derive(Debug, Clone)]
pub struct Solid {
    color: u32,
}

impl Solid {
    pub const KIND: &'static str = "solid";

    pub fn new(color: u32) -> Self {
        Self { color }
    }
}

impl Default for Solid {
    fn default() -> Self {
        Self::new(0xFFFF_FFFF)
    }
}

impl Generator for Solid {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn parameters(&self) -> Parameters {
        let (a, r, g, b) = channels8(self.color);
        Parameters::new()
            .with("red", r.into(), 0.0, 255.0)
            .with("green", g.into(), 0.0, 255.0)
            .with("blue", b.into(), 0.0, 255.0)
            .with("alpha", a.into(), 0.0, 255.0)
    }

    fn run(&mut self, ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
        let ch = |name: &str, current: u8| ctx.param(name, current.into()).round() as u8;
        let (a, r, g, b) = channels8(self.color);
        self.color = argb8(ch("alpha", a), ch("red", r), ch("green", g), ch("blue", b));
        buf.fill_argb8(self.color);
        Ok(())
    }
}

/// A dot with a fading tail running along the strip
#[derive(Debug, Clone, Default)]
pub struct Chase {
    position: f64,
}

impl Chase {
    pub const KIND: &'static str = "chase";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Generator for Chase {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
            .with("speed", 20.0, 0.0, 500.0)
            .with("width", 4.0, 1.0, 64.0)
            .with("hue", 200.0, 0.0, 360.0)
    }

    fn run(&mut self, ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
        buf.fill_argb8(BLACK8);
        let len = buf.len();
        if len == 0 {
            return Ok(());
        }
        let speed = ctx.param("speed", 20.0);
        let width = ctx.param("width", 4.0).max(1.0);
        let hue = ctx.param("hue", 200.0);

        self.position = (self.position + speed * ctx.delta_ms() / 1000.0).rem_euclid(len as f64);
        let head = self.position.floor() as usize;
        for step in 0..(width.ceil() as usize).min(len) {
            let level = 1.0 - step as f64 / width;
            let index = (head + len - step) % len;
            buf.set_argb8(index, hsb(hue, 1.0, level));
        }
        Ok(())
    }

    fn on_active(&mut self) {
        self.position = 0.0;
    }

    /// Any note restarts the run from the first pixel
    fn on_input(&mut self, msg: &MidiMessage) {
        if let MidiMessage::NoteOn { .. } = msg {
            self.position = 0.0;
        }
    }
}

/// Hue sweep across the model, drifting over time
#[derive(Debug, Clone, Default)]
pub struct Rainbow {
    offset: f64,
}

impl Rainbow {
    pub const KIND: &'static str = "rainbow";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Generator for Rainbow {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
            .with("speed", 60.0, -720.0, 720.0)
            .with("spread", 360.0, 0.0, 1440.0)
            .with("brightness", 1.0, 0.0, 1.0)
    }

    fn run(&mut self, ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
        let spread = ctx.param("spread", 360.0);
        let brightness = ctx.param("brightness", 1.0);
        self.offset = (self.offset + ctx.param("speed", 60.0) * ctx.delta_ms() / 1000.0).rem_euclid(360.0);

        let model = ctx.model();
        for i in 0..buf.len() {
            let pos = model.normalized(i).unwrap_or(0.0) as f64;
            buf.set_argb8(i, hsb(self.offset + spread * pos, 1.0, brightness));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorSpace;
    use crate::model::StripModel;
    use crate::node::{Frame, NodeCore};
    use chrono::NaiveTime;

    fn run(generator: &mut dyn Generator, core: &NodeCore, len: usize, delta_ms: f64) -> ColorBuffer {
        let model = StripModel::new(len);
        let frame = Frame::new(delta_ms, NaiveTime::MIN, &model);
        let mut buf = ColorBuffer::new(ColorSpace::Rgb8, len);
        generator.run(&core.context(frame), &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_solid_follows_parameters() {
        let mut solid = Solid::new(0xFFFF_0000);
        let mut core = NodeCore::new(solid.parameters());
        assert_eq!(run(&mut solid, &core, 3, 0.0).to_argb8(), vec![0xFFFF_0000; 3]);

        core.params_mut().set("blue", 255.0).unwrap();
        core.params_mut().set("red", 0.0).unwrap();
        assert_eq!(run(&mut solid, &core, 2, 0.0).get_argb8(1), Some(0xFF00_00FF));
    }

    #[test]
    fn test_chase_moves_and_retriggers() {
        let mut chase = Chase::new();
        let mut core = NodeCore::new(chase.parameters());
        core.params_mut().set("speed", 10.0).unwrap();
        core.params_mut().set("width", 1.0).unwrap();

        let buf = run(&mut chase, &core, 8, 300.0);
        assert_eq!(buf.get_argb8(3).map(|c| c & 0x00FF_FFFF != 0), Some(true));
        assert_eq!(buf.get_argb8(0), Some(BLACK8));

        chase.on_input(&MidiMessage::NoteOn { channel: 0, pitch: 60, velocity: 100 });
        let buf = run(&mut chase, &core, 8, 0.0);
        assert_ne!(buf.get_argb8(0), Some(BLACK8));
    }

    #[test]
    fn test_rainbow_spans_hues() {
        let mut rainbow = Rainbow::new();
        let core = NodeCore::new(rainbow.parameters());
        let buf = run(&mut rainbow, &core, 4, 0.0);
        assert_eq!(buf.get_argb8(0), Some(0xFFFF_0000));
        assert_eq!(buf.get_argb8(3), Some(0xFFFF_0000));
        assert_ne!(buf.get_argb8(1), buf.get_argb8(0));
    }
}
