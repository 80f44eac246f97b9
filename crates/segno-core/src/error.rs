//! Error types for score realization.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no MIDI channel left for instrument `{instrument}` ({used} of 16 in use)")]
    OutOfChannels { instrument: String, used: usize },

    #[error("tempo {bpm} BPM cannot be encoded in a 3-byte set-tempo event")]
    TempoOutOfRange { bpm: f64 },

    #[error("marker `{0}` not found in score")]
    MarkerNotFound(String),

    #[error("score has no tempo entry at offset 0")]
    MissingInitialTempo,

    #[error("event references unknown instrument `{0}`")]
    UnknownInstrument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
