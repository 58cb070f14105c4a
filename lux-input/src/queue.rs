//! Thread-safe FIFO between device I/O threads and the engine

use crate::decoder::{InputError, MidiDecoder};
use crate::message::MidiMessage;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// FIFO of decoded messages, drained once per frame by the engine
pub struct InputQueue {
    tx: Sender<MidiMessage>,
    rx: Receiver<MidiMessage>,
}

impl InputQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Handle for an I/O thread to push messages with
    pub fn sender(&self) -> InputSender {
        InputSender {
            tx: self.tx.clone(),
            decoder: MidiDecoder::new(),
        }
    }

    /// Take every message queued so far, in arrival order
    ///
    /// Messages pushed while draining are left for the next call.
    pub fn drain(&self) -> Vec<MidiMessage> {
        let pending = self.rx.len();
        self.rx.try_iter().take(pending).collect()
    }

    /// Number of messages waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of an [`InputQueue`], one per device thread
pub struct InputSender {
    tx: Sender<MidiMessage>,
    decoder: MidiDecoder,
}

impl InputSender {
    /// Push an already decoded message
    pub fn send(&self, msg: MidiMessage) -> Result<(), InputError> {
        self.tx.send(msg).map_err(|_| InputError::Disconnected)
    }

    /// Push raw device bytes, decoding with running status
    ///
    /// Returns the number of complete messages queued.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<usize, InputError> {
        let msgs = self.decoder.feed_all(bytes);
        for msg in &msgs {
            self.send(*msg)?;
        }
        if !msgs.is_empty() {
            tracing::trace!(count = msgs.len(), "queued input messages");
        }
        Ok(msgs.len())
    }
}

impl Clone for InputSender {
    fn clone(&self) -> Self {
        // Each clone decodes its own byte stream
        Self {
            tx: self.tx.clone(),
            decoder: MidiDecoder::new(),
        }
    }
}
