//! Raw channel-voice message construction.
//!
//! Everything a GM synthesizer hears is a 2- or 3-byte channel-voice
//! message. Channels are clamped to 0–15 and data bytes masked to 7 bits,
//! so a [`RawMessage`] is always well-formed on the wire.

use segno_core::ChannelMessage;

/// Channel-mode controller: all sound off (immediate silence).
pub const CC_ALL_SOUND_OFF: u8 = 120;

/// Channel-mode controller: all notes off (released, envelopes run out).
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// A wire-ready channel-voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage {
    bytes: [u8; 3],
    len: usize,
}

impl RawMessage {
    fn channel_voice(status: u8, channel: u8, data: &[u8]) -> Self {
        let mut bytes = [0u8; 3];
        bytes[0] = status | channel.min(15);
        for (slot, &byte) in bytes[1..].iter_mut().zip(data) {
            *slot = byte & 0x7F;
        }
        Self {
            bytes,
            len: 1 + data.len(),
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_voice(0x90, channel, &[note, velocity])
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_voice(0x80, channel, &[note, velocity])
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::channel_voice(0xB0, channel, &[controller, value])
    }

    /// `program` is 0-indexed on the wire.
    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::channel_voice(0xC0, channel, &[program])
    }

    pub fn all_notes_off(channel: u8) -> Self {
        Self::control_change(channel, CC_ALL_NOTES_OFF, 0)
    }

    pub fn all_sound_off(channel: u8) -> Self {
        Self::control_change(channel, CC_ALL_SOUND_OFF, 0)
    }

    /// Lower a sequence event onto the wire.
    pub fn from_event(channel: u8, message: &ChannelMessage) -> Self {
        match *message {
            ChannelMessage::NoteOn { note, velocity } => Self::note_on(channel, note, velocity),
            ChannelMessage::NoteOff { note, velocity } => Self::note_off(channel, note, velocity),
            ChannelMessage::ControlChange { controller, value } => {
                Self::control_change(channel, controller, value)
            }
            ChannelMessage::ProgramChange { program } => Self::program_change(channel, program),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}
