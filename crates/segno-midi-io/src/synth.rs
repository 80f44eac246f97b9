//! The synthesizer device.
//!
//! A [`Synthesizer`] wraps a MIDI sink behind a shared handle so that both
//! the control plane and a connected sequencer thread can transmit into it.
//! Closing swaps the sink for a discarding one, which drops any underlying
//! port connection.

use crate::error::{Error, Result};
use crate::message::RawMessage;
use crate::sink::{MidiReceiver, MidiSink, NullSink};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use segno_core::CHANNEL_COUNT;

pub struct Synthesizer {
    name: String,
    sink: Arc<Mutex<Box<dyn MidiSink>>>,
    closed: AtomicBool,
}

impl Synthesizer {
    /// Wrap an already-open sink. Factories use this; tests can inject a
    /// capture sink through it.
    pub fn with_sink(name: impl Into<String>, sink: Box<dyn MidiSink>) -> Self {
        Self {
            name: name.into(),
            sink: Arc::new(Mutex::new(sink)),
            closed: AtomicBool::new(false),
        }
    }

    /// Name of the underlying port (or pseudo-device).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A fresh receiver handle for wiring a sequencer's transmitter into
    /// this synthesizer.
    pub fn receiver(&self) -> MidiReceiver {
        MidiReceiver::new(Arc::clone(&self.sink))
    }

    pub fn send(&self, message: &RawMessage) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::DeviceClosed);
        }
        self.sink.lock().send(message.as_bytes())
    }

    /// Silence every channel: all-notes-off plus all-sound-off, fanned out
    /// in parallel and joined before returning. Some synthesizers honor one
    /// of the two messages but not the other, so both are always sent.
    pub fn silence(&self) {
        std::thread::scope(|scope| {
            for channel in 0..CHANNEL_COUNT {
                scope.spawn(move || {
                    for message in [
                        RawMessage::all_notes_off(channel),
                        RawMessage::all_sound_off(channel),
                    ] {
                        if let Err(e) = self.send(&message) {
                            warn!("failed to silence channel {channel}: {e}");
                            return;
                        }
                    }
                });
            }
        });
    }

    /// Release the underlying sink. Receivers already handed out keep
    /// working but deliver into a discard.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closing synthesizer `{}`", self.name);
            *self.sink.lock() = Box::new(NullSink);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
