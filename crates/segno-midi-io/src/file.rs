//! Standard MIDI File serialization via `midly`.
//!
//! Sequences are written as Type-0 files (single track) and can be read
//! back into the same event representation, which is what the round-trip
//! tests lean on.

use crate::error::{Error, Result};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{
    Format, Fps, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use segno_core::{ChannelMessage, Division, EventKind, Sequence, SmpteFps};
use std::path::Path;
use tracing::debug;

/// Serialize `sequence` to a Type-0 Standard MIDI File at `path`.
///
/// A trailing end-of-track meta event is appended; it is not part of the
/// sequence itself.
pub fn write_smf(sequence: &Sequence, path: impl AsRef<Path>) -> Result<()> {
    let timing = match sequence.division() {
        Division::PulsesPerQuarter { resolution } => Timing::Metrical(u15::new(resolution)),
        Division::Smpte { fps, resolution } => Timing::Timecode(to_midly_fps(fps), resolution),
    };

    let mut track: Vec<TrackEvent> = Vec::with_capacity(sequence.len() + 1);
    let mut previous_tick = 0u64;
    for event in sequence.events() {
        let delta = event.tick - previous_tick;
        previous_tick = event.tick;
        track.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind: to_midly_kind(&event.kind),
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(Format::SingleTrack, timing));
    smf.tracks.push(track);
    smf.save(path.as_ref())?;
    debug!(
        "wrote {} events to {}",
        sequence.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Parse a Standard MIDI File back into a [`Sequence`].
///
/// All tracks are merged; events the sequence model does not carry
/// (lyrics, markers, sysex) are skipped.
pub fn read_smf(path: impl AsRef<Path>) -> Result<Sequence> {
    let data = std::fs::read(path.as_ref())?;
    let smf = Smf::parse(&data)?;

    let division = match smf.header.timing {
        Timing::Metrical(resolution) => Division::PulsesPerQuarter {
            resolution: resolution.as_int(),
        },
        Timing::Timecode(fps, resolution) => Division::Smpte {
            fps: from_midly_fps(fps),
            resolution,
        },
    };

    let mut sequence = Sequence::new(division);
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            if let Some(kind) = from_midly_kind(&event.kind) {
                sequence.push(tick, kind);
            }
        }
    }
    sequence.sort();
    Ok(sequence)
}

fn to_midly_fps(fps: SmpteFps) -> Fps {
    match fps {
        SmpteFps::Fps24 => Fps::Fps24,
        SmpteFps::Fps25 => Fps::Fps25,
        SmpteFps::Fps29 => Fps::Fps29,
        SmpteFps::Fps30 => Fps::Fps30,
    }
}

fn from_midly_fps(fps: Fps) -> SmpteFps {
    match fps {
        Fps::Fps24 => SmpteFps::Fps24,
        Fps::Fps25 => SmpteFps::Fps25,
        Fps::Fps29 => SmpteFps::Fps29,
        Fps::Fps30 => SmpteFps::Fps30,
    }
}

fn to_midly_kind(kind: &EventKind) -> TrackEventKind<'static> {
    match *kind {
        EventKind::Tempo {
            microseconds_per_quarter,
        } => TrackEventKind::Meta(MetaMessage::Tempo(u24::new(microseconds_per_quarter))),
        EventKind::Channel { channel, message } => TrackEventKind::Midi {
            channel: u4::new(channel),
            message: match message {
                ChannelMessage::NoteOn { note, velocity } => MidiMessage::NoteOn {
                    key: u7::new(note),
                    vel: u7::new(velocity),
                },
                ChannelMessage::NoteOff { note, velocity } => MidiMessage::NoteOff {
                    key: u7::new(note),
                    vel: u7::new(velocity),
                },
                ChannelMessage::ControlChange { controller, value } => MidiMessage::Controller {
                    controller: u7::new(controller),
                    value: u7::new(value),
                },
                ChannelMessage::ProgramChange { program } => MidiMessage::ProgramChange {
                    program: u7::new(program),
                },
            },
        },
    }
}

fn from_midly_kind(kind: &TrackEventKind) -> Option<EventKind> {
    match kind {
        TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => Some(EventKind::Tempo {
            microseconds_per_quarter: tempo.as_int(),
        }),
        TrackEventKind::Midi { channel, message } => {
            let message = match *message {
                // Per the MIDI spec, note-on at velocity 0 means note-off.
                MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => ChannelMessage::NoteOff {
                    note: key.as_int(),
                    velocity: 0,
                },
                MidiMessage::NoteOn { key, vel } => ChannelMessage::NoteOn {
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => ChannelMessage::NoteOff {
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::Controller { controller, value } => ChannelMessage::ControlChange {
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                MidiMessage::ProgramChange { program } => ChannelMessage::ProgramChange {
                    program: program.as_int(),
                },
                _ => return None,
            };
            Some(EventKind::Channel {
                channel: channel.as_int(),
                message,
            })
        }
        _ => None,
    }
}
