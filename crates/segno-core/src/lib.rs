//! Core score-realization types for the segno playback engine.
//!
//! This crate is device-free: it models the score input contract, assigns
//! MIDI channels, converts millisecond offsets to tick positions under a
//! time-varying tempo, and materializes ordered event sequences. Device
//! handling and file I/O live in `segno-midi-io`.

pub mod error;
pub use error::{Error, Result};

mod score;
pub use score::{Instrument, InstrumentConfig, NoteEvent, Score, AUDIO_TYPE_MIDI};

mod channels;
pub use channels::{ChannelAssignment, ChannelMap, CHANNEL_COUNT, PERCUSSION_CHANNEL};

mod tempo;
pub use tempo::{
    microseconds_per_quarter, Division, SmpteFps, TempoEntry, TempoItinerary, DEFAULT_RESOLUTION,
};

mod sequence;
pub use sequence::{ChannelMessage, EventKind, Sequence, TimedEvent};

mod builder;
pub use builder::{shift_events, SequenceBuilder, CC_CHANNEL_VOLUME, CC_PAN};
