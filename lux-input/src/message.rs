//! MIDI channel-voice message definitions

/// A decoded channel-voice message
///
/// Channels are zero-based (0-15). Data values are 7-bit except pitch bend,
/// which is centered on zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    /// Polyphonic key pressure
    Aftertouch { channel: u8, pitch: u8, pressure: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// Pitch bend (-8192 to 8191)
    PitchBend { channel: u8, value: i16 },
}

impl MidiMessage {
    /// Status nibble for each message kind
    pub(crate) const NOTE_OFF: u8 = 0x80;
    pub(crate) const NOTE_ON: u8 = 0x90;
    pub(crate) const AFTERTOUCH: u8 = 0xA0;
    pub(crate) const CONTROL_CHANGE: u8 = 0xB0;
    pub(crate) const PROGRAM_CHANGE: u8 = 0xC0;
    pub(crate) const CHANNEL_PRESSURE: u8 = 0xD0;
    pub(crate) const PITCH_BEND: u8 = 0xE0;

    /// Number of data bytes following a channel-voice status byte
    pub(crate) fn data_len(status: u8) -> usize {
        match status & 0xF0 {
            Self::PROGRAM_CHANGE | Self::CHANNEL_PRESSURE => 1,
            _ => 2,
        }
    }

    /// Build a message from a status byte and its data bytes
    ///
    /// `data` must hold at least `data_len(status)` bytes.
    pub(crate) fn from_parts(status: u8, data: &[u8]) -> Self {
        let channel = status & 0x0F;
        let d0 = data[0] & 0x7F;
        let d1 = data.get(1).copied().unwrap_or(0) & 0x7F;
        match status & 0xF0 {
            Self::NOTE_OFF => MidiMessage::NoteOff { channel, pitch: d0, velocity: d1 },
            // Note-on with zero velocity is a note-off by convention
            Self::NOTE_ON if d1 == 0 => MidiMessage::NoteOff { channel, pitch: d0, velocity: 0 },
            Self::NOTE_ON => MidiMessage::NoteOn { channel, pitch: d0, velocity: d1 },
            Self::AFTERTOUCH => MidiMessage::Aftertouch { channel, pitch: d0, pressure: d1 },
            Self::CONTROL_CHANGE => MidiMessage::ControlChange { channel, cc: d0, value: d1 },
            Self::PROGRAM_CHANGE => MidiMessage::ProgramChange { channel, program: d0 },
            Self::CHANNEL_PRESSURE => MidiMessage::ChannelPressure { channel, pressure: d0 },
            _ => {
                let raw = (u16::from(d1) << 7) | u16::from(d0);
                MidiMessage::PitchBend { channel, value: raw as i16 - 8192 }
            }
        }
    }

    /// MIDI channel (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::Aftertouch { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ChannelPressure { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => channel,
        }
    }

    /// Primary value scaled to 0.0 - 1.0
    ///
    /// Velocity for notes, value for controllers, pressure for aftertouch,
    /// program number for program change, bend position for pitch bend.
    pub fn normalized(&self) -> f64 {
        match *self {
            MidiMessage::NoteOff { velocity, .. } | MidiMessage::NoteOn { velocity, .. } => {
                f64::from(velocity) / 127.0
            }
            MidiMessage::Aftertouch { pressure, .. }
            | MidiMessage::ChannelPressure { pressure, .. } => f64::from(pressure) / 127.0,
            MidiMessage::ControlChange { value, .. } => f64::from(value) / 127.0,
            MidiMessage::ProgramChange { program, .. } => f64::from(program) / 127.0,
            MidiMessage::PitchBend { value, .. } => (f64::from(value) + 8192.0) / 16383.0,
        }
    }

    /// Whether this is a note-on or note-off
    pub fn is_note(&self) -> bool {
        matches!(self, MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_zero_velocity_is_note_off() {
        let msg = MidiMessage::from_parts(0x93, &[60, 0]);
        assert_eq!(msg, MidiMessage::NoteOff { channel: 3, pitch: 60, velocity: 0 });
    }

    #[test]
    fn test_pitch_bend_center() {
        // 0x2000 split into 7-bit halves is the center position
        let msg = MidiMessage::from_parts(0xE0, &[0x00, 0x40]);
        assert_eq!(msg, MidiMessage::PitchBend { channel: 0, value: 0 });
        assert!((msg.normalized() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_normalized_controller() {
        let msg = MidiMessage::ControlChange { channel: 0, cc: 7, value: 127 };
        assert_eq!(msg.normalized(), 1.0);
        assert_eq!(msg.channel(), 0);
        assert!(!msg.is_note());
    }
}
