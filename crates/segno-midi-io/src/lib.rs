//! MIDI device and file subsystem for the segno playback engine.
//!
//! Provides wire-message construction, the synthesizer and sequencer
//! devices, the pre-warmed device pool with injectable factories, and
//! Standard MIDI File I/O.

pub mod error;
pub use error::{Error, Result};

mod message;
pub use message::{RawMessage, CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF};

mod sink;
pub use sink::{CaptureBuffer, CaptureSink, MidiReceiver, MidiSink, MidirSink, NullSink};

mod synth;
pub use synth::Synthesizer;

mod sequencer;
pub use sequencer::Sequencer;

mod pool;
pub use pool::{
    DeviceFactory, DevicePool, MidirDeviceFactory, NullDeviceFactory, PortSelector, POOL_TARGET,
};

mod file;
pub use file::{read_smf, write_smf};
