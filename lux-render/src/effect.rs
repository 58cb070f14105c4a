//! In-place buffer effects for channel and master chains

use crate::color::ColorBuffer;
use crate::error::RenderResult;
use crate::node::{Frame, NodeCore, Parameters, RenderContext};
use std::fmt;

/// Trait for buffer effects
pub trait Effect: Send {
    /// Stable kind name used by the registry and snapshots
    fn kind(&self) -> &'static str;

    /// Parameters this effect reads, with their defaults
    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    /// Process the buffer in place
    fn process(&mut self, ctx: &RenderContext<'_>, buf: &mut ColorBuffer) -> RenderResult<()>;

    /// Reset internal state
    fn reset(&mut self) {}
}

/// An effect in a chain, with its parameters and bypass switch
pub struct EffectSlot {
    label: String,
    core: NodeCore,
    effect: Box<dyn Effect>,
    enabled: bool,
}

impl EffectSlot {
    pub fn new(effect: impl Effect + 'static) -> Self {
        Self::boxed(Box::new(effect))
    }

    pub fn boxed(effect: Box<dyn Effect>) -> Self {
        Self {
            label: effect.kind().to_string(),
            core: NodeCore::new(effect.parameters()),
            effect,
            enabled: true,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn kind(&self) -> &'static str {
        self.effect.kind()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling resets the effect so it starts clean when re-enabled
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled && !enabled {
            self.effect.reset();
        }
        self.enabled = enabled;
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

    /// Advance modulators, then process `buf` unless bypassed
    pub fn process(&mut self, frame: Frame<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
        self.core.advance(frame.delta_ms);
        if !self.enabled {
            return Ok(());
        }
        let ctx = self.core.context(frame);
        self.effect.process(&ctx, buf)?;
        self.core.run_layers(frame, buf)
    }
}

impl fmt::Debug for EffectSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectSlot")
            .field("kind", &self.kind())
            .field("label", &self.label)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Run a chain in declared order
pub(crate) fn run_chain(chain: &mut [EffectSlot], frame: Frame<'_>, buf: &mut ColorBuffer) -> RenderResult<()> {
    for slot in chain {
        slot.process(frame, buf)?;
    }
    Ok(())
}
