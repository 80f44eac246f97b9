//! MIDI sinks and the receiver handle.
//!
//! A [`MidiSink`] is wherever channel-voice bytes end up: a real `midir`
//! connection, a capture buffer, or nowhere. A [`MidiReceiver`] is the
//! cloneable handle a sequencer transmits into; it shares the synthesizer's
//! sink.

use crate::error::Result;
use crate::message::RawMessage;
use parking_lot::Mutex;
use std::sync::Arc;

/// Destination for raw MIDI bytes.
pub trait MidiSink: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Discards everything. Used by closed devices and the headless factory.
#[derive(Debug, Default)]
pub struct NullSink;

impl MidiSink for NullSink {
    fn send(&mut self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Records every message for later inspection. Useful in tests and for
/// debugging what a playback actually emitted.
#[derive(Debug, Default)]
pub struct CaptureSink {
    captured: CaptureBuffer,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the captured messages.
    pub fn buffer(&self) -> CaptureBuffer {
        self.captured.clone()
    }
}

impl MidiSink for CaptureSink {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.captured.0.lock().push(bytes.to_vec());
        Ok(())
    }
}

/// Clonable view of a [`CaptureSink`]'s output.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<Vec<u8>>>>);

impl CaptureBuffer {
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// `midir`-backed sink sending to a hardware or software MIDI port.
pub struct MidirSink {
    connection: midir::MidiOutputConnection,
}

impl MidirSink {
    pub fn new(connection: midir::MidiOutputConnection) -> Self {
        Self { connection }
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.connection.send(bytes)?;
        Ok(())
    }
}

/// Handle a sequencer transmits into. Cloning shares the underlying sink.
#[derive(Clone)]
pub struct MidiReceiver {
    sink: Arc<Mutex<Box<dyn MidiSink>>>,
}

impl MidiReceiver {
    pub(crate) fn new(sink: Arc<Mutex<Box<dyn MidiSink>>>) -> Self {
        Self { sink }
    }

    pub fn send(&self, message: &RawMessage) -> Result<()> {
        self.sink.lock().send(message.as_bytes())
    }
}

impl std::fmt::Debug for MidiReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiReceiver").finish_non_exhaustive()
    }
}
