//! Centralized error type for the segno umbrella crate.
//!
//! Wraps the member-crate errors so `?` propagates naturally across crate
//! boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] segno_core::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] segno_midi_io::Error),

    #[error("sequencer set up before synthesizer")]
    SequencerBeforeSynth,
}

pub type Result<T> = std::result::Result<T, Error>;
