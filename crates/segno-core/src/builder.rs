//! Sequence construction from realized score events.
//!
//! The builder turns a filtered, offset-shifted event list into a single
//! ordered track: program changes for every patched channel at tick 0,
//! set-tempo metas at each tempo-change tick, then per note a channel-volume
//! and panning controller pair followed by the note-on, with the note-off at
//! its own tick. Same-tick ordering falls out of insertion order plus the
//! sequence's stable sort.

use crate::channels::ChannelMap;
use crate::error::{Error, Result};
use crate::score::NoteEvent;
use crate::sequence::{ChannelMessage, EventKind, Sequence};
use crate::tempo::{microseconds_per_quarter, Division, TempoItinerary};

/// MIDI controller number for channel volume.
pub const CC_CHANNEL_VOLUME: u8 = 7;

/// MIDI controller number for panning.
pub const CC_PAN: u8 = 10;

/// Builds a [`Sequence`] for one score realization.
pub struct SequenceBuilder<'a> {
    channels: &'a ChannelMap,
    itinerary: &'a TempoItinerary,
}

impl<'a> SequenceBuilder<'a> {
    pub fn new(channels: &'a ChannelMap, itinerary: &'a TempoItinerary) -> Self {
        Self {
            channels,
            itinerary,
        }
    }

    /// Materialize `events` into an ordered single-track sequence.
    ///
    /// `events` must already be windowed and shifted (see [`shift_events`]);
    /// offsets are interpreted relative to the sequence start.
    pub fn build(&self, events: &[NoteEvent]) -> Result<Sequence> {
        let mut seq = Sequence::new(self.itinerary.division());

        // Program changes first so they sort ahead of everything else at
        // tick 0. Patches are 1-indexed externally, 0-indexed on the wire.
        let mut patched: Vec<(u8, u8)> = self
            .channels
            .iter()
            .filter_map(|(_, a)| a.patch.map(|patch| (a.channel, patch)))
            .collect();
        patched.sort_unstable();
        patched.dedup();
        for (channel, patch) in patched {
            seq.push(
                0,
                EventKind::Channel {
                    channel,
                    message: ChannelMessage::ProgramChange {
                        program: patch.saturating_sub(1),
                    },
                },
            );
        }

        // Set-tempo metas only make sense under PPQ; SMPTE ticks have a
        // fixed real-time duration.
        if matches!(
            self.itinerary.division(),
            Division::PulsesPerQuarter { .. }
        ) {
            for entry in self.itinerary.entries() {
                seq.push(
                    entry.ticks.round() as u64,
                    EventKind::Tempo {
                        microseconds_per_quarter: microseconds_per_quarter(entry.bpm)?,
                    },
                );
            }
        }

        for event in events {
            // Callback-only events never reach the MIDI stream.
            if event.function.is_some() {
                continue;
            }

            let assignment = self
                .channels
                .get(&event.instrument_id)
                .ok_or_else(|| Error::UnknownInstrument(event.instrument_id.clone()))?;
            let channel = assignment.channel;

            let on_tick = self.itinerary.tick_at(event.offset_ms);
            let off_tick = self.itinerary.tick_at(event.offset_ms + event.duration_ms);
            let velocity = level_to_data_byte(event.volume);

            seq.push(
                on_tick,
                EventKind::Channel {
                    channel,
                    message: ChannelMessage::ControlChange {
                        controller: CC_CHANNEL_VOLUME,
                        value: level_to_data_byte(event.track_volume),
                    },
                },
            );
            seq.push(
                on_tick,
                EventKind::Channel {
                    channel,
                    message: ChannelMessage::ControlChange {
                        controller: CC_PAN,
                        value: level_to_data_byte(event.panning),
                    },
                },
            );
            seq.push(
                on_tick,
                EventKind::Channel {
                    channel,
                    message: ChannelMessage::NoteOn {
                        note: event.midi_note,
                        velocity,
                    },
                },
            );
            seq.push(
                off_tick,
                EventKind::Channel {
                    channel,
                    message: ChannelMessage::NoteOff {
                        note: event.midi_note,
                        velocity,
                    },
                },
            );
        }

        seq.sort();
        Ok(seq)
    }
}

/// Map a [0.0, 1.0] level onto a 7-bit data byte. Out-of-range input is
/// clamped, not rejected.
fn level_to_data_byte(level: f64) -> u8 {
    (127.0 * level.clamp(0.0, 1.0)).round() as u8
}

/// Apply a playback window to an event list.
///
/// Shifts every offset back by `shift` ms, drops events that land before 0
/// or at/after `window_len` (half-open window), and sorts the survivors by
/// shifted offset.
pub fn shift_events(events: &[NoteEvent], shift: f64, window_len: Option<f64>) -> Vec<NoteEvent> {
    let mut shifted: Vec<NoteEvent> = events
        .iter()
        .filter_map(|event| {
            let offset = event.offset_ms - shift;
            if offset < 0.0 {
                return None;
            }
            if let Some(len) = window_len {
                if offset >= len {
                    return None;
                }
            }
            let mut event = event.clone();
            event.offset_ms = offset;
            Some(event)
        })
        .collect();
    shifted.sort_by(|a, b| a.offset_ms.total_cmp(&b.offset_ms));
    shifted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Instrument, InstrumentConfig, Score, AUDIO_TYPE_MIDI};

    fn note(offset_ms: f64, instrument: &str, duration_ms: f64, midi_note: u8) -> NoteEvent {
        NoteEvent {
            offset_ms,
            instrument_id: instrument.to_string(),
            duration_ms,
            midi_note,
            volume: 1.0,
            track_volume: 1.0,
            panning: 0.5,
            function: None,
        }
    }

    fn one_instrument_score(bpm: f64) -> Score {
        let mut score = Score::default();
        score.instruments.insert(
            "piano".into(),
            Instrument {
                config: InstrumentConfig {
                    audio_type: AUDIO_TYPE_MIDI.to_string(),
                    patch: Some(1),
                    percussion: false,
                },
            },
        );
        score.tempo.insert(0, bpm);
        score
    }

    fn build(score: &Score, events: &[NoteEvent]) -> Sequence {
        let channels = ChannelMap::for_score(score).unwrap();
        let itinerary = TempoItinerary::for_score(score, Division::default()).unwrap();
        SequenceBuilder::new(&channels, &itinerary)
            .build(events)
            .unwrap()
    }

    #[test]
    fn test_minimal_note_sequence() {
        // One note at offset 0 for 500 ms at 120 BPM: the note-off lands a
        // quarter note (128 ticks) in.
        let score = one_instrument_score(120.0);
        let events = [note(0.0, "piano", 500.0, 60)];
        let seq = build(&score, &events);

        let expected = [
            (
                0,
                EventKind::Channel {
                    channel: 0,
                    message: ChannelMessage::ProgramChange { program: 0 },
                },
            ),
            (
                0,
                EventKind::Tempo {
                    microseconds_per_quarter: 500_000,
                },
            ),
            (
                0,
                EventKind::Channel {
                    channel: 0,
                    message: ChannelMessage::ControlChange {
                        controller: CC_CHANNEL_VOLUME,
                        value: 127,
                    },
                },
            ),
            (
                0,
                EventKind::Channel {
                    channel: 0,
                    message: ChannelMessage::ControlChange {
                        controller: CC_PAN,
                        value: 64,
                    },
                },
            ),
            (
                0,
                EventKind::Channel {
                    channel: 0,
                    message: ChannelMessage::NoteOn {
                        note: 60,
                        velocity: 127,
                    },
                },
            ),
            (
                128,
                EventKind::Channel {
                    channel: 0,
                    message: ChannelMessage::NoteOff {
                        note: 60,
                        velocity: 127,
                    },
                },
            ),
        ];
        let actual: Vec<(u64, EventKind)> = seq.events().iter().map(|e| (e.tick, e.kind)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_tempo_changes_emitted_at_their_ticks() {
        let mut score = one_instrument_score(60.0);
        score.tempo.insert(1_000, 120.0);
        let seq = build(&score, &[]);

        let tempos: Vec<(u64, u32)> = seq
            .events()
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Tempo {
                    microseconds_per_quarter,
                } => Some((e.tick, microseconds_per_quarter)),
                _ => None,
            })
            .collect();
        assert_eq!(tempos, vec![(0, 1_000_000), (128, 500_000)]);
    }

    #[test]
    fn test_slow_tempo_fails_to_build() {
        let mut score = one_instrument_score(3.0);
        score.events.push(note(0.0, "piano", 100.0, 60));
        let channels = ChannelMap::for_score(&score).unwrap();
        let itinerary = TempoItinerary::for_score(&score, Division::default()).unwrap();
        let err = SequenceBuilder::new(&channels, &itinerary)
            .build(&score.events)
            .unwrap_err();
        assert!(matches!(err, Error::TempoOutOfRange { .. }));
    }

    #[test]
    fn test_function_events_are_elided() {
        let score = one_instrument_score(120.0);
        let mut marker = note(100.0, "piano", 10.0, 72);
        marker.function = Some("rewind-tape".to_string());
        let seq = build(&score, &[marker]);

        assert!(
            !seq.events()
                .iter()
                .any(|e| matches!(e.kind, EventKind::Channel { message: ChannelMessage::NoteOn { .. }, .. })),
            "callback events must not produce notes"
        );
    }

    #[test]
    fn test_out_of_range_levels_are_clamped() {
        let score = one_instrument_score(120.0);
        let mut event = note(0.0, "piano", 100.0, 60);
        event.volume = 1.7;
        event.track_volume = -0.3;
        let seq = build(&score, &[event]);

        for e in seq.events() {
            match e.kind {
                EventKind::Channel {
                    message: ChannelMessage::NoteOn { velocity, .. },
                    ..
                } => assert_eq!(velocity, 127),
                EventKind::Channel {
                    message:
                        ChannelMessage::ControlChange {
                            controller: CC_CHANNEL_VOLUME,
                            value,
                        },
                    ..
                } => assert_eq!(value, 0),
                _ => {}
            }
        }
    }

    #[test]
    fn test_unknown_instrument_is_an_error() {
        let score = one_instrument_score(120.0);
        let channels = ChannelMap::for_score(&score).unwrap();
        let itinerary = TempoItinerary::for_score(&score, Division::default()).unwrap();
        let err = SequenceBuilder::new(&channels, &itinerary)
            .build(&[note(0.0, "theremin", 100.0, 60)])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownInstrument(id) if id == "theremin"));
    }

    #[test]
    fn test_smpte_sequences_carry_no_tempo_events() {
        let mut score = one_instrument_score(120.0);
        score.events.push(note(0.0, "piano", 500.0, 60));
        let channels = ChannelMap::for_score(&score).unwrap();
        let itinerary = TempoItinerary::for_score(
            &score,
            Division::Smpte {
                fps: crate::tempo::SmpteFps::Fps25,
                resolution: 40,
            },
        )
        .unwrap();
        let seq = SequenceBuilder::new(&channels, &itinerary)
            .build(&score.events)
            .unwrap();

        assert!(!seq
            .events()
            .iter()
            .any(|e| matches!(e.kind, EventKind::Tempo { .. })));
        // 25 fps * 40 = 1000 ticks/s, so 500 ms is tick 500.
        assert!(seq.events().iter().any(|e| e.tick == 500
            && matches!(
                e.kind,
                EventKind::Channel {
                    message: ChannelMessage::NoteOff { .. },
                    ..
                }
            )));
    }

    #[test]
    fn test_shift_window_is_half_open() {
        let events: Vec<NoteEvent> = [0.0, 500.0, 1_000.0, 1_500.0]
            .iter()
            .map(|&ms| note(ms, "piano", 100.0, 60))
            .collect();

        let kept = shift_events(&events, 500.0, Some(1_000.0));
        let offsets: Vec<f64> = kept.iter().map(|e| e.offset_ms).collect();
        assert_eq!(offsets, vec![0.0, 500.0]);
    }

    #[test]
    fn test_shift_without_window_only_sorts_and_filters() {
        let mut events: Vec<NoteEvent> = [800.0, 200.0, -100.0]
            .iter()
            .map(|&ms| note(ms, "piano", 100.0, 60))
            .collect();
        events[2].offset_ms = -100.0;

        let kept = shift_events(&events, 0.0, None);
        let offsets: Vec<f64> = kept.iter().map(|e| e.offset_ms).collect();
        assert_eq!(offsets, vec![200.0, 800.0]);
    }
}
