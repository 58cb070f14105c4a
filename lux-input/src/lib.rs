//! Control-surface input for LUX
//!
//! MIDI-style messages arrive on an I/O thread, get decoded from raw bytes
//! and are pushed into a FIFO that the engine drains once per frame.

mod decoder;
mod message;
mod queue;

pub use decoder::{InputError, MidiDecoder};
pub use message::MidiMessage;
pub use queue::{InputQueue, InputSender};
