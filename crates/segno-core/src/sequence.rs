//! Timed MIDI event sequences.
//!
//! A [`Sequence`] is the materialized form of a score: a single track of
//! channel-voice and set-tempo events at integer tick positions, ready to be
//! loaded into a sequencer or written to a Standard MIDI File. Events are
//! kept in tick order; ties keep insertion order, which is how the sequence
//! builder controls same-instant ordering (program/tempo, then controllers,
//! then notes).

use crate::tempo::Division;

/// A channel-voice message, patch numbers already 0-indexed for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
}

/// An event payload within a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Channel {
        channel: u8,
        message: ChannelMessage,
    },
    /// Set-tempo meta event.
    Tempo {
        microseconds_per_quarter: u32,
    },
}

/// An event at an absolute tick position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub tick: u64,
    pub kind: EventKind,
}

/// An ordered, single-track collection of timed MIDI events.
#[derive(Debug, Clone)]
pub struct Sequence {
    division: Division,
    events: Vec<TimedEvent>,
}

impl Sequence {
    pub fn new(division: Division) -> Self {
        Self {
            division,
            events: Vec::new(),
        }
    }

    pub fn division(&self) -> Division {
        self.division
    }

    pub fn push(&mut self, tick: u64, kind: EventKind) {
        self.events.push(TimedEvent { tick, kind });
    }

    /// Restore tick order after out-of-order pushes. Stable, so events at
    /// the same tick keep their insertion order.
    pub fn sort(&mut self) {
        self.events.sort_by_key(|e| e.tick);
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Tick position of the last event (0 for an empty sequence).
    pub fn last_tick(&self) -> u64 {
        self.events.iter().map(|e| e.tick).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(note: u8) -> EventKind {
        EventKind::Channel {
            channel: 0,
            message: ChannelMessage::NoteOn {
                note,
                velocity: 100,
            },
        }
    }

    #[test]
    fn test_sort_is_stable_for_equal_ticks() {
        let mut seq = Sequence::new(Division::default());
        seq.push(128, note_on(62));
        seq.push(0, note_on(60));
        seq.push(0, note_on(61));
        seq.sort();

        let notes: Vec<u8> = seq
            .events()
            .iter()
            .map(|e| match e.kind {
                EventKind::Channel {
                    message: ChannelMessage::NoteOn { note, .. },
                    ..
                } => note,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(notes, vec![60, 61, 62]);
    }

    #[test]
    fn test_last_tick() {
        let mut seq = Sequence::new(Division::default());
        assert_eq!(seq.last_tick(), 0);
        seq.push(256, note_on(60));
        seq.push(128, note_on(61));
        assert_eq!(seq.last_tick(), 256);
    }
}
