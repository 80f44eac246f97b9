//! The audio context and audio-type dispatch.
//!
//! An [`AudioContext`] couples one score to its acquired devices: which
//! audio types have been set up, the synthesizer and sequencer in use, the
//! allocated channel map, and the receiver the sequencer transmits into.
//! It is written only during setup and teardown and read during playback.
//!
//! Operations are dispatched per audio-type tag through [`AudioBackend`];
//! MIDI is the only built-in implementation. New back-ends plug in by
//! registering an implementation with the player; the controller itself
//! never changes.

use crate::error::{Error, Result};
use segno_core::ChannelMap;
use segno_midi_io::{DevicePool, MidiReceiver, Sequencer, Synthesizer};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Mutable holder coupling a score to its audio devices.
#[derive(Default)]
pub struct AudioContext {
    active: BTreeSet<String>,
    pub(crate) synth: Option<Arc<Synthesizer>>,
    pub(crate) sequencer: Option<Arc<Sequencer>>,
    pub(crate) channels: Option<ChannelMap>,
    pub(crate) receiver: Option<MidiReceiver>,
}

impl AudioContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, audio_type: &str) -> bool {
        self.active.contains(audio_type)
    }

    pub fn active_types(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    pub fn has_active_types(&self) -> bool {
        !self.active.is_empty()
    }

    pub(crate) fn activate(&mut self, audio_type: &str) {
        self.active.insert(audio_type.to_string());
    }

    pub(crate) fn deactivate(&mut self, audio_type: &str) {
        self.active.remove(audio_type);
    }

    pub fn synthesizer(&self) -> Option<&Arc<Synthesizer>> {
        self.synth.as_ref()
    }

    pub fn sequencer(&self) -> Option<&Arc<Sequencer>> {
        self.sequencer.as_ref()
    }

    pub fn channels(&self) -> Option<&ChannelMap> {
        self.channels.as_ref()
    }

    pub fn receiver(&self) -> Option<&MidiReceiver> {
        self.receiver.as_ref()
    }
}

impl std::fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioContext")
            .field("active", &self.active)
            .field("has_synth", &self.synth.is_some())
            .field("has_sequencer", &self.sequencer.is_some())
            .finish_non_exhaustive()
    }
}

/// Capability set of one audio back-end.
pub trait AudioBackend: Send + Sync {
    /// Acquire and wire whatever devices this back-end needs. Must be
    /// idempotent: devices already on the context are kept.
    fn set_up(&self, pool: &DevicePool, context: &mut AudioContext) -> Result<()>;

    /// Release this back-end's devices from the context.
    fn tear_down(&self, pool: &DevicePool, context: &mut AudioContext) -> Result<()>;

    /// Halt sounding playback without releasing devices.
    fn stop_playback(&self, context: &AudioContext) -> Result<()>;
}

/// The built-in General-MIDI back-end.
pub struct MidiBackend;

impl MidiBackend {
    fn attach_synth(&self, pool: &DevicePool, context: &mut AudioContext) -> Result<()> {
        if context.synth.is_none() {
            context.synth = Some(pool.acquire_synth()?);
        }
        Ok(())
    }

    /// The synthesizer must already be attached: wiring needs both ends.
    fn attach_sequencer(&self, pool: &DevicePool, context: &mut AudioContext) -> Result<()> {
        if context.sequencer.is_some() {
            return Ok(());
        }
        let synth = context.synth.as_ref().ok_or(Error::SequencerBeforeSynth)?;
        let sequencer = pool.acquire_sequencer()?;
        // Reused default devices may carry stale wiring; connect() drops
        // any previous transmitter before installing the new one.
        let receiver = synth.receiver();
        sequencer.connect(receiver.clone())?;
        context.receiver = Some(receiver);
        context.sequencer = Some(sequencer);
        Ok(())
    }
}

impl AudioBackend for MidiBackend {
    fn set_up(&self, pool: &DevicePool, context: &mut AudioContext) -> Result<()> {
        self.attach_synth(pool, context)?;
        self.attach_sequencer(pool, context)
    }

    fn tear_down(&self, pool: &DevicePool, context: &mut AudioContext) -> Result<()> {
        if let Some(sequencer) = context.sequencer.take() {
            sequencer.stop();
            sequencer.disconnect();
            if !pool.is_default_sequencer(&sequencer) {
                sequencer.close();
            }
        }
        if let Some(synth) = context.synth.take() {
            if !pool.is_default_synth(&synth) {
                synth.close();
            }
        }
        context.receiver = None;
        context.channels = None;
        Ok(())
    }

    fn stop_playback(&self, context: &AudioContext) -> Result<()> {
        if let Some(sequencer) = &context.sequencer {
            sequencer.stop();
        }
        // Pausing the transport is not enough: notes already delivered to
        // the synthesizer keep ringing until every channel is silenced.
        if let Some(synth) = &context.synth {
            synth.silence();
        }
        Ok(())
    }
}
