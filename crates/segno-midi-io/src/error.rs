//! Error types for the MIDI device and file subsystem.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MIDI subsystem unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("device is closed")]
    DeviceClosed,

    #[error("MIDI file error: {0}")]
    MidiFile(String),
}

impl From<midly::Error> for Error {
    fn from(e: midly::Error) -> Self {
        Error::MidiFile(e.to_string())
    }
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
