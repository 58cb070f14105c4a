//! LUX render core
//!
//! Color buffers in two precisions, fixed-point blending, patterns and the
//! channels that crossfade between them, and the engine that composites
//! channels into a frame on the caller's thread or its own render thread.

pub mod blend;
pub mod builtin;
pub mod cache;
pub mod channel;
pub mod color;
pub mod double_buffer;
pub mod effect;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod node;
pub mod output;
pub mod pattern;
pub mod snapshot;

pub use blend::{crossfade, BlendMode};
pub use cache::BufferCache;
pub use channel::{Channel, ChannelEvent, CrossfadeGroup, Transition};
pub use color::{argb8, channels8, channels16, hsb, narrow, widen, ColorBuffer, ColorSpace, BLACK16, BLACK8};
pub use double_buffer::DoubleBuffer;
pub use effect::{Effect, EffectSlot};
pub use engine::{ChannelHandle, Engine, EngineConfig, EngineEvent, EngineStats, FrameStatus, LoopTask, TaskId};
pub use error::{RenderError, RenderResult};
pub use event::EventBus;
pub use model::{GridModel, Model, Point, StripModel};
pub use node::{Frame, Layer, Modulator, NodeCore, Parameter, Parameters, RenderContext, Waveform};
pub use output::Output;
pub use pattern::{Generator, Pattern, PatternId, TimeWindow};
pub use snapshot::{ChannelSnapshot, EngineSnapshot, NodeSnapshot, Registry};
