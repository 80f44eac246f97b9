//! # Segno - score playback and MIDI export
//!
//! Segno turns a fully-realized score (instruments, tempo history, timed
//! note events, markers) into a General-MIDI event sequence, drives a
//! synthesizer to render it in real time, and writes Type-0 Standard MIDI
//! Files.
//!
//! ## Architecture
//!
//! Segno is an umbrella crate over two members:
//! - **segno-core** - score model, channel allocation, tempo itinerary and
//!   tick conversion, sequence building
//! - **segno-midi-io** - wire messages, synthesizer/sequencer devices, the
//!   pre-warmed device pool, Standard MIDI File I/O
//!
//! The root crate adds the playback controller ([`Player`]), the per-score
//! [`AudioContext`], and audio-type dispatch.
//!
//! ## Quick Start
//!
//! ```ignore
//! use segno::prelude::*;
//! use std::sync::Arc;
//!
//! let score: Arc<Score> = Arc::new(parse_score_somewhere()?);
//! let player = Player::builder().build();
//!
//! // Blocking playback of a window between two markers.
//! player.play(
//!     &score,
//!     PlayOptions::new().from_marker("verse").to_marker("chorus"),
//! )?;
//!
//! // One-off background playback: devices are released when it ends.
//! let playback = player.play(
//!     &score,
//!     PlayOptions::new().one_off(true).background(true),
//! )?;
//! playback.wait();
//!
//! // Or skip the synthesizer entirely and write a MIDI file.
//! player.export(&score, "out.mid")?;
//! ```

/// Re-export of segno-core for direct access.
pub use segno_core as core;

/// Re-export of segno-midi-io for direct access.
pub use segno_midi_io as midi_io;

pub use segno_core::{
    shift_events, ChannelAssignment, ChannelMap, ChannelMessage, Division, EventKind, Instrument,
    InstrumentConfig, NoteEvent, Score, Sequence, SequenceBuilder, SmpteFps, TempoEntry,
    TempoItinerary, TimedEvent, AUDIO_TYPE_MIDI, CC_CHANNEL_VOLUME, CC_PAN, DEFAULT_RESOLUTION,
    PERCUSSION_CHANNEL,
};

pub use segno_midi_io::{
    read_smf, write_smf, CaptureBuffer, CaptureSink, DeviceFactory, DevicePool, MidiReceiver,
    MidiSink, MidirDeviceFactory, NullDeviceFactory, PortSelector, RawMessage, Sequencer,
    Synthesizer, POOL_TARGET,
};

mod error;
pub use error::{Error, Result};

mod builder;
pub use builder::PlayerBuilder;

mod context;
pub use context::{AudioBackend, AudioContext, MidiBackend};

mod player;
pub use player::{Completion, PlayOptions, Playback, Player, Position};

/// Common imports for users of the engine.
pub mod prelude {
    pub use crate::{
        AudioBackend, AudioContext, Division, Error, InstrumentConfig, NoteEvent,
        NullDeviceFactory, PlayOptions, Playback, Player, PlayerBuilder, Position, Result, Score,
        Sequence,
    };
}
