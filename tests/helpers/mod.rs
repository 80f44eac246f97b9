//! Test fixtures for segno integration tests.
//!
//! Device injection happens through the player's factory: [`CaptureFactory`]
//! opens synthesizers that record every wire message, so tests can assert on
//! what a playback actually emitted without any MIDI hardware.

// Each test binary only uses a subset of these fixtures.
#![allow(dead_code)]

use segno::prelude::*;
use segno::{CaptureBuffer, CaptureSink, DeviceFactory, Sequencer, Synthesizer};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Opens capture-backed synthesizers and hands out their buffers.
#[derive(Default)]
pub struct CaptureFactory {
    buffers: Mutex<Vec<CaptureBuffer>>,
}

impl CaptureFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every message any opened synthesizer has received, oldest device
    /// first.
    pub fn captured(&self) -> Vec<Vec<u8>> {
        self.buffers
            .lock()
            .unwrap()
            .iter()
            .flat_map(|b| b.messages())
            .collect()
    }
}

impl DeviceFactory for CaptureFactory {
    fn open_synth(&self) -> segno::midi_io::Result<Synthesizer> {
        let sink = CaptureSink::new();
        self.buffers.lock().unwrap().push(sink.buffer());
        Ok(Synthesizer::with_sink("capture", Box::new(sink)))
    }

    fn open_sequencer(&self) -> segno::midi_io::Result<Sequencer> {
        Sequencer::open()
    }
}

/// Player over a capture factory with a small pool.
pub fn capture_player() -> (Player, Arc<CaptureFactory>) {
    let factory = CaptureFactory::new();
    let player = Player::builder()
        .device_factory(Arc::clone(&factory) as Arc<dyn DeviceFactory>)
        .pool_target(1)
        .build();
    (player, factory)
}

/// Player that discards all audio; enough for sequence and export tests.
pub fn headless_player() -> Player {
    Player::builder()
        .device_factory(Arc::new(NullDeviceFactory))
        .pool_target(1)
        .build()
}

pub fn note(offset_ms: f64, instrument: &str, duration_ms: f64, midi_note: u8) -> NoteEvent {
    NoteEvent {
        offset_ms,
        instrument_id: instrument.to_string(),
        duration_ms,
        midi_note,
        volume: 1.0,
        track_volume: 1.0,
        panning: 0.5,
        function: None,
    }
}

pub fn midi_instrument(patch: Option<u8>, percussion: bool) -> segno::Instrument {
    segno::Instrument {
        config: InstrumentConfig {
            audio_type: segno::AUDIO_TYPE_MIDI.to_string(),
            patch,
            percussion,
        },
    }
}

/// One piano at 120 BPM with a single half-second middle C.
pub fn minimal_score() -> Arc<Score> {
    let mut score = Score::default();
    score
        .instruments
        .insert("piano".to_string(), midi_instrument(Some(1), false));
    score.tempo.insert(0, 120.0);
    score.events.push(note(0.0, "piano", 500.0, 60));
    Arc::new(score)
}

/// Four quarter-second notes at 0/500/1000/1500 ms with markers around the
/// middle two.
pub fn windowed_score() -> Arc<Score> {
    let mut score = Score::default();
    score
        .instruments
        .insert("piano".to_string(), midi_instrument(Some(1), false));
    score.tempo.insert(0, 120.0);
    for (i, offset) in [0.0, 500.0, 1_000.0, 1_500.0].iter().enumerate() {
        score
            .events
            .push(note(*offset, "piano", 100.0, 60 + i as u8));
    }
    score.markers.insert("verse".to_string(), 500.0);
    score.markers.insert("outro".to_string(), 1_500.0);
    Arc::new(score)
}

/// Spin until `probe` holds or the timeout passes.
pub fn wait_until(timeout: Duration, probe: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if probe() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    probe()
}

/// Note-on keys among captured messages, in emission order.
pub fn note_ons(messages: &[Vec<u8>]) -> Vec<u8> {
    messages
        .iter()
        .filter(|m| m[0] & 0xF0 == 0x90)
        .map(|m| m[1])
        .collect()
}
