//! Serializable engine state and the node registry used to rebuild it
//!
//! Snapshots carry node kinds by name; a [`Registry`] maps those names back
//! to constructors when restoring.

use crate::blend::BlendMode;
use crate::builtin::{Chase, Dim, Invert, Rainbow, Solid};
use crate::channel::{Channel, CrossfadeGroup};
use crate::color::ColorSpace;
use crate::effect::{Effect, EffectSlot};
use crate::engine::Engine;
use crate::error::{RenderError, RenderResult};
use crate::node::{Modulator, NodeCore};
use crate::pattern::{Generator, Pattern, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

fn yes() -> bool {
    true
}

/// One pattern or effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub kind: String,
    pub label: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modulators: Vec<Modulator>,
    /// Effect bypass switch
    #[serde(default = "yes")]
    pub enabled: bool,
    /// Pattern auto-cycle eligibility
    #[serde(default = "yes")]
    pub eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    #[serde(default)]
    pub space: ColorSpace,
}

impl NodeSnapshot {
    pub fn of_pattern(pattern: &Pattern) -> Self {
        Self {
            kind: pattern.kind().to_string(),
            label: pattern.label().to_string(),
            params: pattern.params().values(),
            modulators: pattern.core().modulators().to_vec(),
            enabled: true,
            eligible: pattern.is_eligible(),
            window: pattern.window(),
            space: pattern.space(),
        }
    }

    pub fn of_effect(slot: &EffectSlot) -> Self {
        Self {
            kind: slot.kind().to_string(),
            label: slot.label().to_string(),
            params: slot.params().values(),
            modulators: slot.core().modulators().to_vec(),
            enabled: slot.is_enabled(),
            eligible: true,
            window: None,
            space: ColorSpace::default(),
        }
    }

    fn apply_core(&self, core: &mut NodeCore) -> RenderResult<()> {
        core.params_mut().apply_values(&self.params);
        for m in &self.modulators {
            core.add_modulator(m.clone())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub label: String,
    pub patterns: Vec<NodeSnapshot>,
    #[serde(default)]
    pub active: usize,
    #[serde(default)]
    pub effects: Vec<NodeSnapshot>,
    pub fader: f64,
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default)]
    pub group: CrossfadeGroup,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default = "yes")]
    pub transitions_enabled: bool,
    pub transition_ms: f64,
    #[serde(default)]
    pub transition_blend: BlendMode,
    #[serde(default)]
    pub auto_cycle: bool,
    pub auto_cycle_ms: f64,
    #[serde(default)]
    pub monitor_input: bool,
}

impl ChannelSnapshot {
    pub fn capture(channel: &Channel) -> Self {
        Self {
            label: channel.label().to_string(),
            patterns: channel.patterns().iter().map(NodeSnapshot::of_pattern).collect(),
            active: channel.active_index(),
            effects: channel.effects().iter().map(NodeSnapshot::of_effect).collect(),
            fader: channel.fader(),
            enabled: channel.is_enabled(),
            group: channel.group(),
            blend_mode: channel.blend_mode(),
            transitions_enabled: channel.transitions_enabled(),
            transition_ms: channel.transition_ms(),
            transition_blend: channel.transition_blend(),
            auto_cycle: channel.auto_cycle(),
            auto_cycle_ms: channel.auto_cycle_ms(),
            monitor_input: channel.monitor_input(),
        }
    }

    /// Rebuild the channel with `active` selected and no transition running
    pub fn build(&self, registry: &Registry) -> RenderResult<Channel> {
        let patterns = self
            .patterns
            .iter()
            .map(|p| registry.create_pattern(p))
            .collect::<RenderResult<Vec<_>>>()?;
        let mut channel = Channel::new(patterns)?.with_label(self.label.clone());
        for effect in &self.effects {
            channel.add_effect(registry.create_effect(effect)?);
        }

        channel.set_transitions_enabled(false);
        channel.go_pattern(self.active.min(channel.pattern_count() - 1))?;
        channel.set_transitions_enabled(self.transitions_enabled);

        channel.set_fader(self.fader);
        channel.set_enabled(self.enabled);
        channel.set_group(self.group);
        channel.set_blend_mode(self.blend_mode);
        channel.set_transition_ms(self.transition_ms);
        channel.set_transition_blend(self.transition_blend);
        channel.set_auto_cycle(self.auto_cycle);
        channel.set_auto_cycle_ms(self.auto_cycle_ms);
        channel.set_monitor_input(self.monitor_input);
        Ok(channel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub channels: Vec<ChannelSnapshot>,
    #[serde(default)]
    pub effects: Vec<NodeSnapshot>,
    #[serde(default)]
    pub crossfader: f64,
    #[serde(default)]
    pub crossfader_blend: BlendMode,
    pub speed: f64,
}

type PatternFactory = Box<dyn Fn() -> Box<dyn Generator> + Send + Sync>;
type EffectFactory = Box<dyn Fn() -> Box<dyn Effect> + Send + Sync>;

/// Constructors for every node kind a snapshot may name
#[derive(Default)]
pub struct Registry {
    patterns: BTreeMap<String, PatternFactory>,
    effects: BTreeMap<String, EffectFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing the built-in nodes
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_pattern(Solid::KIND, Solid::default);
        registry.register_pattern(Chase::KIND, Chase::new);
        registry.register_pattern(Rainbow::KIND, Rainbow::new);
        registry.register_effect(Dim::KIND, || Dim);
        registry.register_effect(Invert::KIND, || Invert);
        registry
    }

    pub fn register_pattern<G, F>(&mut self, kind: &str, factory: F)
    where
        G: Generator + 'static,
        F: Fn() -> G + Send + Sync + 'static,
    {
        self.patterns
            .insert(kind.to_string(), Box::new(move || Box::new(factory()) as Box<dyn Generator>));
    }

    pub fn register_effect<E, F>(&mut self, kind: &str, factory: F)
    where
        E: Effect + 'static,
        F: Fn() -> E + Send + Sync + 'static,
    {
        self.effects
            .insert(kind.to_string(), Box::new(move || Box::new(factory()) as Box<dyn Effect>));
    }

    pub fn pattern_kinds(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    pub fn effect_kinds(&self) -> impl Iterator<Item = &str> {
        self.effects.keys().map(String::as_str)
    }

    pub fn create_pattern(&self, node: &NodeSnapshot) -> RenderResult<Pattern> {
        let factory = self
            .patterns
            .get(&node.kind)
            .ok_or_else(|| RenderError::UnknownKind(node.kind.clone()))?;
        let mut pattern = Pattern::boxed(factory())
            .with_label(node.label.clone())
            .with_space(node.space);
        pattern.set_eligible(node.eligible);
        pattern.set_window(node.window);
        node.apply_core(pattern.core_mut())?;
        Ok(pattern)
    }

    pub fn create_effect(&self, node: &NodeSnapshot) -> RenderResult<EffectSlot> {
        let factory = self
            .effects
            .get(&node.kind)
            .ok_or_else(|| RenderError::UnknownKind(node.kind.clone()))?;
        let mut slot = EffectSlot::boxed(factory()).with_label(node.label.clone());
        slot.set_enabled(node.enabled);
        node.apply_core(slot.core_mut())?;
        Ok(slot)
    }
}

impl Engine {
    /// Capture channels, master effects and mixer settings
    pub fn snapshot(&self) -> EngineSnapshot {
        let channels = self
            .channels()
            .iter()
            .map(|h| ChannelSnapshot::capture(&h.lock()))
            .collect();
        let effects = self.with_effects(|chain| chain.iter().map(NodeSnapshot::of_effect).collect());
        EngineSnapshot {
            channels,
            effects,
            crossfader: self.crossfader(),
            crossfader_blend: self.crossfader_blend(),
            speed: self.speed(),
        }
    }

    /// Replace channels and master effects with those in `snapshot`
    ///
    /// Everything is built before the engine is touched, so an unknown
    /// node kind leaves the current show in place.
    pub fn restore(&self, snapshot: &EngineSnapshot, registry: &Registry) -> RenderResult<()> {
        let channels = snapshot
            .channels
            .iter()
            .map(|c| c.build(registry))
            .collect::<RenderResult<Vec<_>>>()?;
        let effects = snapshot
            .effects
            .iter()
            .map(|e| registry.create_effect(e))
            .collect::<RenderResult<Vec<_>>>()?;

        self.replace_show(channels, effects, |engine| {
            engine.set_crossfader(snapshot.crossfader);
            engine.set_crossfader_blend(snapshot.crossfader_blend);
            engine.set_speed(snapshot.speed);
        });
        info!(channels = snapshot.channels.len(), "engine restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::model::StripModel;
    use crate::node::Waveform;
    use chrono::NaiveTime;
    use std::sync::Arc;

    fn demo_engine() -> Engine {
        let engine = Engine::new(EngineConfig::default(), Arc::new(StripModel::new(4)));
        let mut ch = Channel::new(vec![
            Pattern::new(Solid::new(0xFFFF_0000)),
            Pattern::new(Rainbow::new()).with_label("sweep"),
        ])
        .unwrap()
        .with_label("main");
        ch.set_transitions_enabled(false);
        ch.go_pattern(1).unwrap();
        ch.set_fader(0.75);
        ch.set_group(CrossfadeGroup::B);
        ch.pattern_mut(1).unwrap().set_eligible(false);
        ch.pattern_mut(0)
            .unwrap()
            .core_mut()
            .add_modulator(Modulator::new("red", Waveform::Triangle, 2000.0))
            .unwrap();
        let mut dim = EffectSlot::new(Dim);
        dim.params_mut().set("level", 0.25).unwrap();
        ch.add_effect(dim);
        engine.add_channel(ch);
        engine.add_effect(EffectSlot::new(Invert));
        engine.set_crossfader(0.3);
        engine
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let source = demo_engine();
        let snap = source.snapshot();
        assert_eq!(snap.channels[0].active, 1);
        assert_eq!(snap.channels[0].patterns[1].label, "sweep");

        let target = Engine::new(EngineConfig::default(), Arc::new(StripModel::new(4)));
        target.add_channel(Channel::new(vec![Pattern::new(Chase::new())]).unwrap());
        target.restore(&snap, &Registry::with_builtins()).unwrap();

        assert_eq!(target.channel_count(), 1);
        assert_eq!(target.snapshot(), snap);
        let ch = target.channel(0).unwrap();
        let ch = ch.lock();
        assert!(!ch.is_transitioning());
        assert_eq!(ch.effects()[0].params().value("level"), Some(0.25));
    }

    struct FirstPixel(crossbeam_channel::Sender<u32>);

    impl crate::output::Output for FirstPixel {
        fn name(&self) -> &str {
            "first-pixel"
        }

        fn send(&mut self, frame: &crate::color::ColorBuffer) -> RenderResult<()> {
            let _ = self.0.send(frame.get_argb8(0).unwrap_or(0));
            Ok(())
        }
    }

    #[test]
    fn test_restore_never_publishes_a_partial_show() {
        const RED: u32 = 0xFFFF_0000;
        const YELLOW: u32 = 0xFFFF_FF00;

        let show = |color: u32, invert: bool| {
            let engine = Engine::new(EngineConfig::default(), Arc::new(StripModel::new(2)));
            engine.add_channel(Channel::new(vec![Pattern::new(Solid::new(color))]).unwrap());
            if invert {
                engine.add_effect(EffectSlot::new(Invert));
            }
            engine.snapshot()
        };
        // Red as is; blue through the master inverter comes out yellow
        let red = show(RED, false);
        let yellow = show(0xFF00_00FF, true);

        let engine = Arc::new(Engine::new(
            EngineConfig { fps: 2000.0, ..EngineConfig::default() },
            Arc::new(StripModel::new(2)),
        ));
        let registry = Registry::with_builtins();
        engine.restore(&red, &registry).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        engine.add_output(Box::new(FirstPixel(tx)));

        engine.start().unwrap();
        for i in 0..200 {
            let snap = if i % 2 == 0 { &yellow } else { &red };
            engine.restore(snap, &registry).unwrap();
        }
        engine.stop();

        let seen: Vec<u32> = rx.try_iter().collect();
        assert!(!seen.is_empty());
        for c in seen {
            assert!(c == RED || c == YELLOW, "partial show published: {c:#x}");
        }
    }

    #[test]
    fn test_unknown_kind_leaves_engine_untouched() {
        let engine = demo_engine();
        let mut snap = engine.snapshot();
        snap.channels[0].patterns[0].kind = "laser".into();
        let err = engine.restore(&snap, &Registry::with_builtins()).unwrap_err();
        assert!(matches!(err, RenderError::UnknownKind(k) if k == "laser"));
        assert_eq!(engine.channel_count(), 1);
        assert_eq!(engine.effect_count(), 1);
    }

    #[test]
    fn test_time_window_survives() {
        let registry = Registry::with_builtins();
        let start = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
        let node = NodeSnapshot::of_pattern(
            &Pattern::new(Chase::new()).with_window(TimeWindow::new(start, end)),
        );
        let pattern = registry.create_pattern(&node).unwrap();
        assert_eq!(pattern.window(), Some(TimeWindow::new(start, end)));
        assert!(registry.pattern_kinds().any(|k| k == "rainbow"));
        assert!(registry.effect_kinds().any(|k| k == "dim"));
    }
}
