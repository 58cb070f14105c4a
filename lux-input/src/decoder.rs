//! Byte-stream decoder for MIDI channel-voice messages

use crate::message::MidiMessage;
use thiserror::Error;

/// Errors that can occur while decoding or queueing input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Empty message")]
    Empty,
    #[error("Expected a status byte, got 0x{0:02X}")]
    MissingStatus(u8),
    #[error("Truncated message: status 0x{status:02X} needs {expected} data bytes, got {actual}")]
    Truncated { status: u8, expected: usize, actual: usize },
    #[error("Unsupported system message 0x{0:02X}")]
    Unsupported(u8),
    #[error("Input queue disconnected")]
    Disconnected,
}

/// Streaming decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    /// Waiting for a status byte (or data under running status)
    #[default]
    Idle,
    /// Collecting data bytes for a channel-voice message
    Data,
    /// Inside a system-exclusive dump, discarding bytes until 0xF7
    SysEx,
}

/// Incremental decoder that accepts bytes as they arrive from a device
///
/// Supports running status, skips system-exclusive dumps and lets
/// real-time bytes (clock, start, stop) pass through without disturbing
/// a message in progress.
pub struct MidiDecoder {
    state: State,
    running_status: Option<u8>,
    data: [u8; 2],
    filled: usize,
}

impl MidiDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            running_status: None,
            data: [0; 2],
            filled: 0,
        }
    }

    /// Decode exactly one complete message
    pub fn decode(bytes: &[u8]) -> Result<MidiMessage, InputError> {
        let (&status, data) = bytes.split_first().ok_or(InputError::Empty)?;
        if status < 0x80 {
            return Err(InputError::MissingStatus(status));
        }
        if status >= 0xF0 {
            return Err(InputError::Unsupported(status));
        }
        let expected = MidiMessage::data_len(status);
        if data.len() < expected {
            return Err(InputError::Truncated {
                status,
                expected,
                actual: data.len(),
            });
        }
        Ok(MidiMessage::from_parts(status, &data[..expected]))
    }

    /// Feed one byte, returning a message when one completes
    pub fn feed(&mut self, byte: u8) -> Option<MidiMessage> {
        // Real-time messages may interleave anywhere
        if byte >= 0xF8 {
            return None;
        }

        if self.state == State::SysEx {
            if byte == 0xF7 {
                self.state = State::Idle;
            }
            return None;
        }

        if byte >= 0xF0 {
            // System common cancels running status
            self.running_status = None;
            self.filled = 0;
            self.state = if byte == 0xF0 { State::SysEx } else { State::Idle };
            return None;
        }

        if byte >= 0x80 {
            self.running_status = Some(byte);
            self.filled = 0;
            self.state = State::Data;
            return None;
        }

        // Data byte
        let status = self.running_status?;
        self.state = State::Data;
        self.data[self.filled] = byte;
        self.filled += 1;

        if self.filled == MidiMessage::data_len(status) {
            self.filled = 0;
            self.state = State::Idle;
            return Some(MidiMessage::from_parts(status, &self.data[..MidiMessage::data_len(status)]));
        }
        None
    }

    /// Feed a slice of bytes, collecting every completed message
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<MidiMessage> {
        bytes.iter().filter_map(|&b| self.feed(b)).collect()
    }

    /// Drop any partial message and running status
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for MidiDecoder {
    fn default() -> Self {
        Self::new()
    }
}
