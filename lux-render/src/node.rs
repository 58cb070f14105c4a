//! Shared render-node building blocks
//!
//! Patterns and effects are both render nodes: a parameter set, a list of
//! modulators driving those parameters and an optional stack of child
//! layers that post-process the node's buffer. Nodes own one [`NodeCore`]
//! instead of inheriting the capabilities.

use crate::color::ColorBuffer;
use crate::error::{RenderError, RenderResult};
use crate::model::Model;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::TAU;

/// A named, bounded scalar
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: f64,
    default: f64,
    min: f64,
    max: f64,
}

impl Parameter {
    pub fn new(name: impl Into<String>, default: f64, min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let default = default.clamp(min, max);
        Self {
            name: name.into(),
            value: default,
            default,
            min,
            max,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Current value mapped into 0.0 - 1.0
    pub fn normalized(&self) -> f64 {
        if self.max > self.min {
            (self.value - self.min) / (self.max - self.min)
        } else {
            0.0
        }
    }

    fn set(&mut self, value: f64) {
        if !value.is_nan() {
            self.value = value.clamp(self.min, self.max);
        }
    }
}

/// Ordered parameter set of one node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    params: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style add
    pub fn with(mut self, name: &str, default: f64, min: f64, max: f64) -> Self {
        self.add(Parameter::new(name, default, min, max));
        self
    }

    /// Add a parameter, replacing one with the same name
    pub fn add(&mut self, param: Parameter) {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(Parameter::value)
    }

    /// Value of `name`, or `fallback` if the node has no such parameter
    pub fn value_or(&self, name: &str, fallback: f64) -> f64 {
        self.value(name).unwrap_or(fallback)
    }

    /// Set a value, clamped to the parameter's range
    pub fn set(&mut self, name: &str, value: f64) -> RenderResult<()> {
        self.find_mut(name)?.set(value);
        Ok(())
    }

    /// Set from a 0.0 - 1.0 position within the parameter's range
    pub fn set_normalized(&mut self, name: &str, position: f64) -> RenderResult<()> {
        let param = self.find_mut(name)?;
        let value = param.min + (param.max - param.min) * position.clamp(0.0, 1.0);
        param.set(value);
        Ok(())
    }

    /// Restore every parameter to its default
    pub fn reset(&mut self) {
        for p in &mut self.params {
            p.value = p.default;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Name to value map for persistence
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.params.iter().map(|p| (p.name.clone(), p.value)).collect()
    }

    /// Apply stored values; names this node does not know are skipped
    pub fn apply_values(&mut self, values: &BTreeMap<String, f64>) {
        for (name, value) in values {
            if let Some(p) = self.params.iter_mut().find(|p| &p.name == name) {
                p.set(*value);
            }
        }
    }

    fn find_mut(&mut self, name: &str) -> RenderResult<&mut Parameter> {
        self.params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| RenderError::invalid(format!("no parameter named '{name}'")))
    }
}

/// LFO shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Saw,
    Square,
}

impl Waveform {
    /// Sample at `phase` (0.0 - 1.0), output in -1.0 - 1.0
    pub fn sample(self, phase: f64) -> f64 {
        let p = phase.rem_euclid(1.0);
        match self {
            Waveform::Sine => (p * TAU).sin(),
            Waveform::Triangle => {
                if p < 0.5 {
                    4.0 * p - 1.0
                } else {
                    3.0 - 4.0 * p
                }
            }
            Waveform::Saw => 2.0 * p - 1.0,
            Waveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// Periodic driver for one parameter of the owning node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modulator {
    pub target: String,
    pub waveform: Waveform,
    pub period_ms: f64,
    /// Swing around the middle of the target's range, 0.0 - 1.0
    pub depth: f64,
    #[serde(default)]
    pub phase: f64,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl Modulator {
    pub fn new(target: impl Into<String>, waveform: Waveform, period_ms: f64) -> Self {
        Self {
            target: target.into(),
            waveform,
            period_ms,
            depth: 1.0,
            phase: 0.0,
            enabled: true,
        }
    }

    pub fn with_depth(mut self, depth: f64) -> Self {
        self.depth = depth.clamp(0.0, 1.0);
        self
    }

    pub fn advance(&mut self, delta_ms: f64) {
        if self.period_ms > 0.0 {
            self.phase = (self.phase + delta_ms / self.period_ms).rem_euclid(1.0);
        }
    }

    /// Current position within the target range, 0.0 - 1.0
    pub fn position(&self) -> f64 {
        0.5 + 0.5 * self.depth * self.waveform.sample(self.phase)
    }
}

/// Per-frame timing and geometry handed down from the engine
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    /// Time since the previous tick, already scaled by engine speed
    pub delta_ms: f64,
    /// Local wall-clock time of day, used by pattern time windows
    pub time_of_day: NaiveTime,
    pub model: &'a dyn Model,
}

impl<'a> Frame<'a> {
    pub fn new(delta_ms: f64, time_of_day: NaiveTime, model: &'a dyn Model) -> Self {
        Self {
            delta_ms,
            time_of_day,
            model,
        }
    }

    /// Pixel count of the current geometry
    pub fn len(&self) -> usize {
        self.model.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a generator, effect or layer sees while running
pub struct RenderContext<'a> {
    pub frame: Frame<'a>,
    pub params: &'a Parameters,
}

impl<'a> RenderContext<'a> {
    pub fn delta_ms(&self) -> f64 {
        self.frame.delta_ms
    }

    pub fn model(&self) -> &'a dyn Model {
        self.frame.model
    }

    /// Parameter value or `fallback`
    pub fn param(&self, name: &str, fallback: f64) -> f64 {
        self.params.value_or(name, fallback)
    }
}

/// A child stage that post-processes its parent's buffer in place
pub trait Layer: Send {
    fn name(&self) -> &str;

    /// Run against the parent's buffer, seeing the parent's parameters
    fn run(&mut self, ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()>;
}

/// Parameters, modulators and child layers of one node
#[derive(Default)]
pub struct NodeCore {
    params: Parameters,
    modulators: Vec<Modulator>,
    layers: Vec<Box<dyn Layer>>,
}

impl NodeCore {
    pub fn new(params: Parameters) -> Self {
        Self {
            params,
            modulators: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    /// Attach a modulator; its target must be one of this node's parameters
    pub fn add_modulator(&mut self, modulator: Modulator) -> RenderResult<()> {
        if self.params.get(&modulator.target).is_none() {
            return Err(RenderError::invalid(format!(
                "modulator target '{}' is not a parameter of this node",
                modulator.target
            )));
        }
        self.modulators.push(modulator);
        Ok(())
    }

    pub fn remove_modulator(&mut self, index: usize) -> RenderResult<Modulator> {
        RenderError::check_index(index, self.modulators.len())?;
        Ok(self.modulators.remove(index))
    }

    pub fn modulators(&self) -> &[Modulator] {
        &self.modulators
    }

    pub fn add_layer(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    pub fn remove_layer(&mut self, index: usize) -> RenderResult<Box<dyn Layer>> {
        RenderError::check_index(index, self.layers.len())?;
        Ok(self.layers.remove(index))
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Step every enabled modulator and write its target
    pub fn advance(&mut self, delta_ms: f64) {
        for m in self.modulators.iter_mut().filter(|m| m.enabled) {
            m.advance(delta_ms);
            // Targets were validated on add; a removed parameter just goes stale
            let _ = self.params.set_normalized(&m.target, m.position());
        }
    }

    /// Context over this node's parameters
    pub fn context<'a>(&'a self, frame: Frame<'a>) -> RenderContext<'a> {
        RenderContext {
            frame,
            params: &self.params,
        }
    }

    /// Run child layers in order on `buf`
    pub fn run_layers(&mut self, frame: Frame<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
        let ctx = RenderContext {
            frame,
            params: &self.params,
        };
        for layer in &mut self.layers {
            layer.run(&ctx, buf)?;
        }
        Ok(())
    }
}
