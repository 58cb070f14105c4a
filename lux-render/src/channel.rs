//! Channels: an ordered pattern list, its transition state machine and an
//! effect chain, producing one composited buffer per tick
//!
//! A channel is either idle (one active pattern renders) or transitioning
//! (active and next both render and are crossfaded by progress). While
//! idle `next_index == active_index`.

use crate::blend::{crossfade, BlendMode};
use crate::color::{ColorBuffer, ColorSpace};
use crate::effect::{run_chain, EffectSlot};
use crate::error::{RenderError, RenderResult};
use crate::event::EventBus;
use crate::node::Frame;
use crate::pattern::{Pattern, PatternId};
use crossbeam_channel::Receiver;
use lux_input::MidiMessage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which crossfader bus a channel feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossfadeGroup {
    /// Straight onto the master accumulator
    #[default]
    Bypass,
    A,
    B,
}

/// An in-flight crossfade between the active and next pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub blend: BlendMode,
    pub elapsed_ms: f64,
    pub duration_ms: f64,
}

impl Transition {
    /// 0.0 at start, 1.0 once the duration has elapsed
    pub fn progress(&self) -> f64 {
        if self.duration_ms <= 0.0 {
            1.0
        } else {
            (self.elapsed_ms / self.duration_ms).clamp(0.0, 1.0)
        }
    }
}

/// Changes to a channel's pattern list, effects and selection
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    PatternAdded { index: usize, id: PatternId },
    PatternRemoved { index: usize, id: PatternId },
    PatternMoved { from: usize, to: usize, id: PatternId },
    PatternWillChange { from: PatternId, to: PatternId },
    PatternDidChange { id: PatternId },
    EffectAdded { index: usize },
    EffectRemoved { index: usize },
}

pub struct Channel {
    label: String,
    index: usize,
    patterns: Vec<Pattern>,
    active_index: usize,
    next_index: usize,
    transition: Option<Transition>,
    transitions_enabled: bool,
    transition_blend: BlendMode,
    transition_ms: f64,
    auto_cycle: bool,
    auto_cycle_ms: f64,
    auto_cycle_elapsed: f64,
    effects: Vec<EffectSlot>,
    fader: f64,
    enabled: bool,
    group: CrossfadeGroup,
    blend_mode: BlendMode,
    monitor_input: bool,
    space: ColorSpace,
    output: ColorBuffer,
    events: EventBus<ChannelEvent>,
}

impl Channel {
    pub const DEFAULT_TRANSITION_MS: f64 = 1000.0;
    pub const DEFAULT_AUTO_CYCLE_MS: f64 = 60_000.0;

    /// Create a channel; the first pattern becomes active
    pub fn new(patterns: Vec<Pattern>) -> RenderResult<Self> {
        if patterns.is_empty() {
            return Err(RenderError::invalid("a channel needs at least one pattern"));
        }
        let mut channel = Self {
            label: "Channel".to_string(),
            index: 0,
            patterns,
            active_index: 0,
            next_index: 0,
            transition: None,
            transitions_enabled: true,
            transition_blend: BlendMode::Normal,
            transition_ms: Self::DEFAULT_TRANSITION_MS,
            auto_cycle: false,
            auto_cycle_ms: Self::DEFAULT_AUTO_CYCLE_MS,
            auto_cycle_elapsed: 0.0,
            effects: Vec::new(),
            fader: 1.0,
            enabled: true,
            group: CrossfadeGroup::Bypass,
            blend_mode: BlendMode::Normal,
            monitor_input: false,
            space: ColorSpace::default(),
            output: ColorBuffer::new(ColorSpace::default(), 0),
            events: EventBus::new(),
        };
        channel.patterns[0].activate();
        Ok(channel)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Position in the engine's channel list
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn subscribe(&self) -> Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    // --- Patterns ---

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn pattern_mut(&mut self, index: usize) -> RenderResult<&mut Pattern> {
        RenderError::check_index(index, self.patterns.len())?;
        Ok(&mut self.patterns[index])
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn active_pattern(&self) -> &Pattern {
        &self.patterns[self.active_index]
    }

    pub fn next_pattern(&self) -> &Pattern {
        &self.patterns[self.next_index]
    }

    pub fn index_of(&self, id: PatternId) -> Option<usize> {
        self.patterns.iter().position(|p| p.id() == id)
    }

    /// Append a pattern, returning its index
    pub fn add_pattern(&mut self, pattern: Pattern) -> usize {
        let index = self.patterns.len();
        let id = pattern.id();
        debug!(channel = %self.label, pattern = %pattern.label(), index, "pattern added");
        self.patterns.push(pattern);
        self.events.emit(ChannelEvent::PatternAdded { index, id });
        index
    }

    /// Remove and hand back a pattern
    ///
    /// Removing the only pattern is rejected and leaves the channel as it
    /// was. Removing the active or incoming pattern of a transition
    /// finishes the transition first.
    pub fn remove_pattern(&mut self, index: usize) -> RenderResult<Pattern> {
        RenderError::check_index(index, self.patterns.len())?;
        if self.patterns.len() == 1 {
            return Err(RenderError::invalid("cannot remove the last pattern of a channel"));
        }

        if self.transition.is_some() && (index == self.active_index || index == self.next_index) {
            self.finish_transition();
        }
        let was_active = index == self.active_index;
        if was_active {
            self.patterns[index].deactivate();
        }

        let removed = self.patterns.remove(index);
        let len = self.patterns.len();
        if self.active_index > index {
            self.active_index -= 1;
        } else if self.active_index >= len {
            self.active_index = len - 1;
        }
        if self.transition.is_none() {
            self.next_index = self.active_index;
        } else if self.next_index > index {
            self.next_index -= 1;
        }

        debug!(channel = %self.label, pattern = %removed.label(), index, "pattern removed");
        self.events.emit(ChannelEvent::PatternRemoved { index, id: removed.id() });

        if was_active {
            self.auto_cycle_elapsed = 0.0;
            let active = &mut self.patterns[self.active_index];
            active.activate();
            self.events.emit(ChannelEvent::PatternDidChange { id: active.id() });
        }
        Ok(removed)
    }

    /// Reorder a pattern; the active and next patterns keep their identity
    pub fn move_pattern(&mut self, from: usize, to: usize) -> RenderResult<()> {
        RenderError::check_index(from, self.patterns.len())?;
        RenderError::check_index(to, self.patterns.len())?;
        if from == to {
            return Ok(());
        }
        let active = self.patterns[self.active_index].id();
        let next = self.patterns[self.next_index].id();

        let pattern = self.patterns.remove(from);
        let id = pattern.id();
        self.patterns.insert(to, pattern);

        self.active_index = self.index_of(active).unwrap_or(0);
        self.next_index = self.index_of(next).unwrap_or(self.active_index);
        self.events.emit(ChannelEvent::PatternMoved { from, to, id });
        Ok(())
    }

    // --- Selection and transitions ---

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    pub fn transition(&self) -> Option<&Transition> {
        self.transition.as_ref()
    }

    pub fn transition_progress(&self) -> Option<f64> {
        self.transition.as_ref().map(Transition::progress)
    }

    /// Select a pattern by index
    ///
    /// A running transition is finished first; selecting the pattern that
    /// is already active does nothing.
    pub fn go_pattern(&mut self, index: usize) -> RenderResult<()> {
        RenderError::check_index(index, self.patterns.len())?;
        if self.transition.is_some() {
            self.finish_transition();
        }
        if index == self.active_index {
            return Ok(());
        }
        self.next_index = index;
        self.start_transition();
        Ok(())
    }

    /// Select a pattern owned by this channel
    pub fn go_pattern_id(&mut self, id: PatternId) -> RenderResult<()> {
        let index = self
            .index_of(id)
            .ok_or_else(|| RenderError::invalid(format!("pattern {id} is not in channel {}", self.label)))?;
        self.go_pattern(index)
    }

    /// Advance to the next eligible pattern
    ///
    /// Ignored while transitioning. Returns whether a change started.
    pub fn go_next(&mut self) -> bool {
        self.step(true)
    }

    /// Step back to the previous eligible pattern
    pub fn go_previous(&mut self) -> bool {
        self.step(false)
    }

    fn step(&mut self, forward: bool) -> bool {
        if self.transition.is_some() {
            return false;
        }
        match self.find_candidate(forward, Pattern::is_eligible) {
            Some(index) => {
                self.next_index = index;
                self.start_transition();
                true
            }
            None => false,
        }
    }

    /// Wrapping scan from the active pattern, excluding it
    fn find_candidate(&self, forward: bool, eligible: impl Fn(&Pattern) -> bool) -> Option<usize> {
        let len = self.patterns.len();
        (1..len)
            .map(|offset| {
                if forward {
                    (self.active_index + offset) % len
                } else {
                    (self.active_index + len - offset) % len
                }
            })
            .find(|&i| eligible(&self.patterns[i]))
    }

    fn start_transition(&mut self) {
        if self.next_index == self.active_index {
            return;
        }
        let from = self.patterns[self.active_index].id();
        let to = self.patterns[self.next_index].id();

        self.patterns[self.next_index].activate();
        self.events.emit(ChannelEvent::PatternWillChange { from, to });

        if self.transitions_enabled {
            debug!(channel = %self.label, %from, %to, ms = self.transition_ms, "transition start");
            self.transition = Some(Transition {
                blend: self.transition_blend,
                elapsed_ms: 0.0,
                duration_ms: self.transition_ms,
            });
            self.patterns[self.next_index].transition_start();
        } else {
            self.finish_transition();
        }
    }

    fn finish_transition(&mut self) {
        self.patterns[self.active_index].deactivate();
        self.active_index = self.next_index;
        if self.transition.take().is_some() {
            self.patterns[self.active_index].transition_end();
        }
        self.auto_cycle_elapsed = 0.0;

        let id = self.patterns[self.active_index].id();
        debug!(channel = %self.label, %id, "pattern changed");
        self.events.emit(ChannelEvent::PatternDidChange { id });
    }

    // --- Settings ---

    pub fn transitions_enabled(&self) -> bool {
        self.transitions_enabled
    }

    /// Disabling does not cut a running transition short
    pub fn set_transitions_enabled(&mut self, enabled: bool) {
        self.transitions_enabled = enabled;
    }

    pub fn transition_ms(&self) -> f64 {
        self.transition_ms
    }

    pub fn set_transition_ms(&mut self, ms: f64) {
        self.transition_ms = ms.max(0.0);
    }

    pub fn transition_blend(&self) -> BlendMode {
        self.transition_blend
    }

    /// Blend used by transitions started after this call
    pub fn set_transition_blend(&mut self, blend: BlendMode) {
        self.transition_blend = blend;
    }

    pub fn auto_cycle(&self) -> bool {
        self.auto_cycle
    }

    pub fn set_auto_cycle(&mut self, enabled: bool) {
        self.auto_cycle = enabled;
        self.auto_cycle_elapsed = 0.0;
    }

    pub fn auto_cycle_ms(&self) -> f64 {
        self.auto_cycle_ms
    }

    pub fn set_auto_cycle_ms(&mut self, ms: f64) {
        self.auto_cycle_ms = ms.max(0.0);
    }

    pub fn fader(&self) -> f64 {
        self.fader
    }

    pub fn set_fader(&mut self, fader: f64) {
        if !fader.is_nan() {
            self.fader = fader.clamp(0.0, 1.0);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn group(&self) -> CrossfadeGroup {
        self.group
    }

    pub fn set_group(&mut self, group: CrossfadeGroup) {
        self.group = group;
    }

    /// Blend used when merging this channel into the engine accumulator
    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    pub fn monitor_input(&self) -> bool {
        self.monitor_input
    }

    pub fn set_monitor_input(&mut self, monitor: bool) {
        self.monitor_input = monitor;
    }

    // --- Effects ---

    pub fn effects(&self) -> &[EffectSlot] {
        &self.effects
    }

    pub fn effect_mut(&mut self, index: usize) -> RenderResult<&mut EffectSlot> {
        RenderError::check_index(index, self.effects.len())?;
        Ok(&mut self.effects[index])
    }

    pub fn add_effect(&mut self, effect: EffectSlot) -> usize {
        let index = self.effects.len();
        debug!(channel = %self.label, effect = %effect.label(), index, "channel effect added");
        self.effects.push(effect);
        self.events.emit(ChannelEvent::EffectAdded { index });
        index
    }

    pub fn remove_effect(&mut self, index: usize) -> RenderResult<EffectSlot> {
        RenderError::check_index(index, self.effects.len())?;
        let slot = self.effects.remove(index);
        self.events.emit(ChannelEvent::EffectRemoved { index });
        Ok(slot)
    }

    // --- Rendering ---

    /// Deliver a control-surface message to the active and next pattern
    pub fn input(&mut self, msg: &MidiMessage) {
        self.patterns[self.active_index].input(msg);
        if self.next_index != self.active_index {
            self.patterns[self.next_index].input(msg);
        }
    }

    /// Composited output of the last tick
    pub fn output(&self) -> &ColorBuffer {
        &self.output
    }

    pub fn space(&self) -> ColorSpace {
        self.space
    }

    /// Deactivate whatever is rendering; called when the engine drops the channel
    pub(crate) fn release(&mut self) {
        if self.transition.take().is_some() {
            self.patterns[self.next_index].deactivate();
            self.next_index = self.active_index;
        }
        self.patterns[self.active_index].deactivate();
    }

    /// Adopt the engine's color space and pixel count
    pub(crate) fn configure(&mut self, space: ColorSpace, len: usize) {
        if self.space != space || self.output.len() != len {
            self.space = space;
            self.output = ColorBuffer::new(space, len);
        }
        for p in &mut self.patterns {
            p.resize(len);
        }
    }

    /// Advance timers, render, crossfade and run the effect chain
    pub fn tick(&mut self, frame: Frame<'_>) -> RenderResult<()> {
        if self.output.len() != frame.len() {
            self.configure(self.space, frame.len());
        }

        match self.transition.as_mut() {
            Some(t) => {
                t.elapsed_ms += frame.delta_ms;
                if t.elapsed_ms >= t.duration_ms {
                    self.finish_transition();
                }
            }
            None => {
                if self.auto_cycle && self.patterns.len() > 1 {
                    self.auto_cycle_elapsed += frame.delta_ms;
                    if self.auto_cycle_elapsed >= self.auto_cycle_ms {
                        self.auto_cycle_elapsed = 0.0;
                        let now = frame.time_of_day;
                        if let Some(index) = self.find_candidate(true, |p| p.is_selectable_at(now)) {
                            self.next_index = index;
                            self.start_transition();
                        }
                    }
                }
            }
        }

        let space = self.space;
        let active = self.active_index;
        self.patterns[active].render(frame)?;

        match self.transition.map(|t| (t.blend, t.progress())) {
            Some((blend, progress)) => {
                let next = self.next_index;
                self.patterns[next].render(frame)?;
                let (a, n) = pair_mut(&mut self.patterns, active, next);
                crossfade(blend, a.buffer(space), n.buffer(space), progress, &mut self.output)?;
            }
            None => self.output.assign(self.patterns[active].buffer(space)),
        }

        run_chain(&mut self.effects, frame, &mut self.output)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("label", &self.label)
            .field("index", &self.index)
            .field("patterns", &self.patterns.len())
            .field("active_index", &self.active_index)
            .field("next_index", &self.next_index)
            .field("transition", &self.transition)
            .field("fader", &self.fader)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Two distinct elements of a slice, both mutable
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (low, high) = items.split_at_mut(b);
        (&mut low[a], &mut high[0])
    } else {
        let (low, high) = items.split_at_mut(a);
        (&mut high[0], &mut low[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;
    use crate::model::StripModel;
    use crate::node::RenderContext;
    use crate::pattern::tests::{calls, Calls, Lifecycle};
    use chrono::NaiveTime;

    const X: u32 = 0xFF10_2030;
    const Y: u32 = 0xFFA0_B0C0;

    fn channel(colors: &[u32], log: &Calls) -> Channel {
        const NAMES: [&str; 4] = ["a", "b", "c", "d"];
        let patterns = colors
            .iter()
            .zip(NAMES)
            .map(|(&c, name)| Pattern::new(Lifecycle::new(name, c, log)))
            .collect();
        Channel::new(patterns).unwrap()
    }

    fn tick(channel: &mut Channel, model: &StripModel, delta_ms: f64) {
        channel.tick(Frame::new(delta_ms, NaiveTime::MIN, model)).unwrap();
    }

    fn take(log: &Calls) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[test]
    fn test_empty_channel_rejected() {
        assert!(matches!(Channel::new(Vec::new()), Err(RenderError::InvalidOperation(_))));
    }

    #[test]
    fn test_first_pattern_activated() {
        let log = calls();
        let ch = channel(&[X, Y], &log);
        assert_eq!(take(&log), vec!["a:active"]);
        assert_eq!(ch.active_index(), 0);
        assert_eq!(ch.next_index(), 0);
    }

    #[test]
    fn test_remove_last_pattern_rejected() {
        let log = calls();
        let mut ch = channel(&[X], &log);
        let before = (ch.pattern_count(), ch.active_index(), ch.next_index());
        assert!(matches!(ch.remove_pattern(0), Err(RenderError::InvalidOperation(_))));
        assert_eq!(before, (ch.pattern_count(), ch.active_index(), ch.next_index()));
    }

    #[test]
    fn test_instant_swap_without_transitions() {
        let log = calls();
        let mut ch = channel(&[X, Y], &log);
        let events = ch.subscribe();
        ch.set_transitions_enabled(false);
        take(&log);

        assert!(ch.go_next());
        assert_eq!(take(&log), vec!["b:active", "a:inactive"]);
        assert_eq!(ch.active_index(), 1);
        assert!(!ch.is_transitioning());

        let ids: Vec<_> = ch.patterns().iter().map(Pattern::id).collect();
        let got: Vec<_> = events.try_iter().collect();
        assert_eq!(
            got,
            vec![
                ChannelEvent::PatternWillChange { from: ids[0], to: ids[1] },
                ChannelEvent::PatternDidChange { id: ids[1] },
            ]
        );
    }

    #[test]
    fn test_transition_lifecycle() {
        let log = calls();
        let model = StripModel::new(2);
        let mut ch = channel(&[X, Y], &log);
        take(&log);

        assert!(ch.go_next());
        assert_eq!(take(&log), vec!["b:active", "b:start"]);
        assert!(ch.is_transitioning());
        assert_eq!(ch.next_index(), 1);

        tick(&mut ch, &model, 600.0);
        assert!(ch.is_transitioning());
        assert_eq!(ch.transition_progress(), Some(0.6));

        tick(&mut ch, &model, 400.0);
        assert!(!ch.is_transitioning());
        assert_eq!(take(&log), vec!["a:inactive", "b:end"]);
        assert_eq!(ch.active_index(), 1);
        assert_eq!(ch.next_index(), 1);
        assert_eq!(ch.output().get_argb8(0), Some(Y));
    }

    #[test]
    fn test_next_ignored_while_transitioning_and_go_pattern_forces_finish() {
        let log = calls();
        let mut ch = channel(&[X, Y, 0xFF00_0000], &log);
        assert!(ch.go_next());
        assert!(!ch.go_next());
        assert!(!ch.go_previous());
        assert_eq!(ch.next_index(), 1);
        take(&log);

        ch.go_pattern(2).unwrap();
        assert_eq!(take(&log), vec!["a:inactive", "b:end", "c:active", "c:start"]);
        assert_eq!(ch.active_index(), 1);
        assert_eq!(ch.next_index(), 2);

        assert!(ch.go_pattern(3).is_err());
    }

    #[test]
    fn test_go_pattern_by_id() {
        let log = calls();
        let mut ch = channel(&[X, Y], &log);
        ch.set_transitions_enabled(false);
        let id = ch.patterns()[1].id();
        ch.go_pattern_id(id).unwrap();
        assert_eq!(ch.active_pattern().id(), id);

        let stranger = Pattern::new(Lifecycle::new("z", 0, &log));
        assert!(ch.go_pattern_id(stranger.id()).is_err());
    }

    #[test]
    fn test_previous_wraps_and_skips_ineligible() {
        let log = calls();
        let mut ch = channel(&[X, Y, X, Y], &log);
        ch.set_transitions_enabled(false);
        ch.pattern_mut(3).unwrap().set_eligible(false);
        assert!(ch.go_previous());
        assert_eq!(ch.active_index(), 2);
    }

    #[test]
    fn test_crossfade_endpoints_through_channel() {
        let model = StripModel::new(3);
        for mode in BlendMode::ALL {
            let log = calls();
            let mut ch = channel(&[X, Y], &log);
            ch.set_transition_blend(mode);
            ch.go_next();

            tick(&mut ch, &model, 0.0);
            assert_eq!(ch.transition_progress(), Some(0.0));
            assert_eq!(ch.output().get_argb8(1), Some(X), "{mode:?} at 0");

            tick(&mut ch, &model, Channel::DEFAULT_TRANSITION_MS - 1.0);
            assert!(ch.is_transitioning(), "{mode:?} finished early");
            let progress = ch.transition_progress().unwrap();
            assert!(progress > 0.5 && progress < 1.0);
            let active = ColorBuffer::filled(ColorSpace::Rgb8, 3, X);
            let next = ColorBuffer::filled(ColorSpace::Rgb8, 3, Y);
            let mut expected = ColorBuffer::new(ColorSpace::Rgb8, 3);
            crossfade(mode, &active, &next, progress, &mut expected).unwrap();
            assert_eq!(ch.output().get_argb8(1), expected.get_argb8(1), "{mode:?} near 1");

            tick(&mut ch, &model, 1.0);
            assert!(!ch.is_transitioning());
            assert_eq!(ch.output().get_argb8(1), Some(Y), "{mode:?} at 1");
        }
    }

    #[test]
    fn test_transition_midpoint_uses_second_branch() {
        let model = StripModel::new(4);
        let log = calls();
        let mut ch = channel(&[X, Y], &log);
        ch.set_transition_ms(1000.0);
        ch.go_next();
        tick(&mut ch, &model, 500.0);
        assert_eq!(ch.transition_progress(), Some(0.5));

        let expected = BlendMode::Normal.blend8(Y, X, 1.0);
        assert!(ch.output().to_argb8().iter().all(|&c| c == expected));
    }

    #[test]
    fn test_auto_cycle_skips_ineligible_and_windowed() {
        use crate::pattern::TimeWindow;

        let model = StripModel::new(1);
        let log = calls();
        let mut ch = channel(&[X, Y, X, Y], &log);
        ch.set_transitions_enabled(false);
        ch.set_auto_cycle(true);
        ch.set_auto_cycle_ms(100.0);
        ch.pattern_mut(1).unwrap().set_eligible(false);
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let one = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
        // Midnight falls outside a noon-to-one window
        ch.pattern_mut(2).unwrap().set_window(Some(TimeWindow::new(noon, one)));

        tick(&mut ch, &model, 60.0);
        assert_eq!(ch.active_index(), 0);
        tick(&mut ch, &model, 40.0);
        assert_eq!(ch.active_index(), 3);
        assert_eq!(ch.output().get_argb8(0), Some(Y));
    }

    #[test]
    fn test_auto_cycle_without_candidates_stays() {
        let model = StripModel::new(1);
        let log = calls();
        let mut ch = channel(&[X, Y], &log);
        ch.set_auto_cycle(true);
        ch.set_auto_cycle_ms(10.0);
        ch.pattern_mut(1).unwrap().set_eligible(false);
        tick(&mut ch, &model, 50.0);
        assert_eq!(ch.active_index(), 0);
        assert!(!ch.is_transitioning());
    }

    #[test]
    fn test_remove_active_pattern_activates_neighbour() {
        let log = calls();
        let mut ch = channel(&[X, Y, X], &log);
        ch.set_transitions_enabled(false);
        ch.go_pattern(2).unwrap();
        take(&log);

        let removed = ch.remove_pattern(2).unwrap();
        assert_eq!(removed.label(), "lifecycle");
        assert_eq!(take(&log), vec!["c:inactive", "b:active"]);
        assert_eq!(ch.active_index(), 1);
        assert_eq!(ch.next_index(), 1);
    }

    #[test]
    fn test_remove_before_transition_shifts_indices() {
        let log = calls();
        let mut ch = channel(&[X, Y, X], &log);
        ch.go_pattern(1).unwrap();
        ch.go_pattern(2).unwrap();
        assert_eq!((ch.active_index(), ch.next_index()), (1, 2));

        ch.remove_pattern(0).unwrap();
        assert!(ch.is_transitioning());
        assert_eq!((ch.active_index(), ch.next_index()), (0, 1));
    }

    #[test]
    fn test_move_pattern_keeps_active_identity() {
        let log = calls();
        let mut ch = channel(&[X, Y, X], &log);
        ch.set_transitions_enabled(false);
        ch.go_pattern(1).unwrap();
        let active = ch.active_pattern().id();

        ch.move_pattern(1, 2).unwrap();
        assert_eq!(ch.active_index(), 2);
        assert_eq!(ch.active_pattern().id(), active);
        assert!(ch.move_pattern(0, 3).is_err());
    }

    struct Blackout;

    impl Effect for Blackout {
        fn kind(&self) -> &'static str {
            "blackout"
        }

        fn process(&mut self, _ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
            buf.fill_black();
            Ok(())
        }
    }

    #[test]
    fn test_effects_run_after_crossfade() {
        let model = StripModel::new(2);
        let log = calls();
        let mut ch = channel(&[X, Y], &log);
        let index = ch.add_effect(EffectSlot::new(Blackout));
        ch.go_next();
        tick(&mut ch, &model, 250.0);
        assert_eq!(ch.output().get_argb8(0), Some(0xFF00_0000));

        ch.remove_effect(index).unwrap();
        tick(&mut ch, &model, 0.0);
        assert_ne!(ch.output().get_argb8(0), Some(0xFF00_0000));
    }

    #[test]
    fn test_input_reaches_active_and_next() {
        let log = calls();
        let mut ch = channel(&[X, Y, X], &log);
        ch.go_next();
        take(&log);
        ch.input(&MidiMessage::ControlChange { channel: 0, cc: 1, value: 64 });
        assert_eq!(take(&log), vec!["a:input", "b:input"]);
    }

    #[test]
    fn test_output_follows_space() {
        let model = StripModel::new(2);
        let log = calls();
        let mut ch = channel(&[X], &log);
        ch.configure(ColorSpace::Rgb16, 2);
        tick(&mut ch, &model, 16.0);
        assert_eq!(ch.output().space(), ColorSpace::Rgb16);
        assert_eq!(ch.output().get_argb8(1), Some(X));
    }
}
