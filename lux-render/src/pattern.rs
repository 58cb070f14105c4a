//! Patterns: generators with a lifecycle and their own buffer cache

use crate::cache::BufferCache;
use crate::color::{ColorBuffer, ColorSpace};
use crate::error::RenderResult;
use crate::node::{Frame, NodeCore, Parameters, RenderContext};
use chrono::NaiveTime;
use lux_input::MidiMessage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// The algorithm behind a pattern
///
/// Only `run` is required. The hooks fire as the owning channel moves the
/// pattern through its lifecycle.
pub trait Generator: Send {
    /// Stable kind name used by the registry and snapshots
    fn kind(&self) -> &'static str;

    /// Parameters this generator reads, with their defaults
    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    /// Render one frame into `buf`
    fn run(&mut self, ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()>;

    /// Became the active pattern, or the incoming one of a transition
    fn on_active(&mut self) {}

    /// Stopped being rendered
    fn on_inactive(&mut self) {}

    fn on_transition_start(&mut self) {}

    fn on_transition_end(&mut self) {}

    /// Control-surface message forwarded by a monitoring channel
    fn on_input(&mut self, _msg: &MidiMessage) {}
}

/// Process-unique pattern identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternId(u64);

impl PatternId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        PatternId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Recurring daily interval restricting automatic selection
///
/// `start > end` wraps past midnight; `start == end` covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

/// A generator plus the state a channel needs to schedule it
pub struct Pattern {
    id: PatternId,
    label: String,
    core: NodeCore,
    generator: Box<dyn Generator>,
    cache: BufferCache,
    space: ColorSpace,
    eligible: bool,
    window: Option<TimeWindow>,
}

impl Pattern {
    pub fn new(generator: impl Generator + 'static) -> Self {
        Self::boxed(Box::new(generator))
    }

    pub fn boxed(generator: Box<dyn Generator>) -> Self {
        let params = generator.parameters();
        let label = generator.kind().to_string();
        Self {
            id: PatternId::next(),
            label,
            core: NodeCore::new(params),
            generator,
            cache: BufferCache::new(0),
            space: ColorSpace::default(),
            eligible: true,
            window: None,
        }
    }

    /// Render natively in `space` instead of 8-bit
    pub fn with_space(mut self, space: ColorSpace) -> Self {
        self.space = space;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn id(&self) -> PatternId {
        self.id
    }

    pub fn kind(&self) -> &'static str {
        self.generator.kind()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn space(&self) -> ColorSpace {
        self.space
    }

    pub fn core(&self) -> &NodeCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    pub fn params(&self) -> &Parameters {
        self.core.params()
    }

    pub fn params_mut(&mut self) -> &mut Parameters {
        self.core.params_mut()
    }

    pub fn is_eligible(&self) -> bool {
        self.eligible
    }

    pub fn set_eligible(&mut self, eligible: bool) {
        self.eligible = eligible;
    }

    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    pub fn set_window(&mut self, window: Option<TimeWindow>) {
        self.window = window;
    }

    /// Whether auto-cycle may pick this pattern at `now`
    pub fn is_selectable_at(&self, now: NaiveTime) -> bool {
        self.eligible && self.window.map_or(true, |w| w.contains(now))
    }

    /// Render one frame into the pattern's own cache
    pub fn render(&mut self, frame: Frame<'_>) -> RenderResult<()> {
        self.cache.resize(frame.len());
        self.core.advance(frame.delta_ms);

        let buf = self.cache.write(self.space);
        let ctx = self.core.context(frame);
        self.generator.run(&ctx, buf)?;
        self.core.run_layers(frame, buf)
    }

    /// Last rendered frame in `space`, converting if needed
    pub fn buffer(&mut self, space: ColorSpace) -> &ColorBuffer {
        self.cache.get(space)
    }

    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    /// Geometry changed; drop cached buffers
    pub(crate) fn resize(&mut self, len: usize) {
        self.cache.resize(len);
    }

    pub(crate) fn activate(&mut self) {
        debug!(pattern = %self.label, id = %self.id, "pattern active");
        self.generator.on_active();
    }

    pub(crate) fn deactivate(&mut self) {
        debug!(pattern = %self.label, id = %self.id, "pattern inactive");
        self.generator.on_inactive();
    }

    pub(crate) fn transition_start(&mut self) {
        self.generator.on_transition_start();
    }

    pub(crate) fn transition_end(&mut self) {
        self.generator.on_transition_end();
    }

    pub(crate) fn input(&mut self, msg: &MidiMessage) {
        self.generator.on_input(msg);
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("label", &self.label)
            .field("space", &self.space)
            .field("eligible", &self.eligible)
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::StripModel;
    use std::sync::{Arc, Mutex};

    /// Calls recorded by [`Lifecycle`]
    pub(crate) type Calls = Arc<Mutex<Vec<String>>>;

    /// Solid-color generator that records every hook
    pub(crate) struct Lifecycle {
        pub name: &'static str,
        pub color: u32,
        pub calls: Calls,
    }

    impl Lifecycle {
        pub(crate) fn new(name: &'static str, color: u32, calls: &Calls) -> Self {
            Self {
                name,
                color,
                calls: Arc::clone(calls),
            }
        }

        fn log(&self, event: &str) {
            self.calls.lock().unwrap().push(format!("{}:{event}", self.name));
        }
    }

    impl Generator for Lifecycle {
        fn kind(&self) -> &'static str {
            "lifecycle"
        }

        fn run(&mut self, _ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
            buf.fill_argb8(self.color);
            Ok(())
        }

        fn on_active(&mut self) {
            self.log("active");
        }

        fn on_inactive(&mut self) {
            self.log("inactive");
        }

        fn on_transition_start(&mut self) {
            self.log("start");
        }

        fn on_transition_end(&mut self) {
            self.log("end");
        }

        fn on_input(&mut self, _msg: &MidiMessage) {
            self.log("input");
        }
    }

    pub(crate) fn calls() -> Calls {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_time_window_wraps_midnight() {
        let night = TimeWindow::new(t(22, 0), t(6, 0));
        assert!(night.contains(t(23, 30)));
        assert!(night.contains(t(2, 0)));
        assert!(!night.contains(t(12, 0)));
        assert!(!night.contains(t(6, 0)));

        let day = TimeWindow::new(t(9, 0), t(17, 0));
        assert!(day.contains(t(9, 0)));
        assert!(!day.contains(t(17, 0)));

        assert!(TimeWindow::new(t(5, 0), t(5, 0)).contains(t(1, 0)));
    }

    #[test]
    fn test_selectable_honours_flag_and_window() {
        let log = calls();
        let mut p = Pattern::new(Lifecycle::new("a", 0, &log)).with_window(TimeWindow::new(t(8, 0), t(9, 0)));
        assert!(p.is_selectable_at(t(8, 30)));
        assert!(!p.is_selectable_at(t(10, 0)));
        p.set_eligible(false);
        assert!(!p.is_selectable_at(t(8, 30)));
    }

    #[test]
    fn test_render_writes_native_space() {
        let log = calls();
        let model = StripModel::new(4);
        let frame = Frame::new(10.0, NaiveTime::MIN, &model);
        let mut p = Pattern::new(Lifecycle::new("a", 0xFF11_2233, &log)).with_space(ColorSpace::Rgb16);

        p.render(frame).unwrap();
        assert!(p.cache().is_fresh(ColorSpace::Rgb16));
        assert!(!p.cache().is_fresh(ColorSpace::Rgb8));
        assert_eq!(p.buffer(ColorSpace::Rgb8).get_argb8(3), Some(0xFF11_2233));
        assert_eq!(p.buffer(ColorSpace::Rgb8).len(), 4);
    }

    #[test]
    fn test_ids_are_unique() {
        let log = calls();
        let a = Pattern::new(Lifecycle::new("a", 0, &log));
        let b = Pattern::new(Lifecycle::new("b", 0, &log));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.label(), "lifecycle");
    }
}
