//! The score input contract.
//!
//! A [`Score`] is produced by an external parser and consumed here as an
//! already-structured value: instruments keyed by id, a flat list of timed
//! note events, a tempo timeline, and named markers. Iteration over
//! instruments is stable (sorted by id), which makes channel assignment
//! deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Audio-type tag for instruments rendered through a General MIDI synthesizer.
pub const AUDIO_TYPE_MIDI: &str = "midi";

/// A fully-realized musical score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    /// Instrument id → instrument.
    #[serde(default)]
    pub instruments: BTreeMap<String, Instrument>,

    /// Timed note events, in no particular order.
    #[serde(default)]
    pub events: Vec<NoteEvent>,

    /// Tempo timeline: offset in ms → BPM. Must contain an entry at 0.
    #[serde(default)]
    pub tempo: BTreeMap<u64, f64>,

    /// Named positions usable as playback start/end references.
    #[serde(default)]
    pub markers: BTreeMap<String, f64>,
}

impl Score {
    /// Look up a marker offset by name.
    pub fn marker(&self, name: &str) -> Option<f64> {
        self.markers.get(name).copied()
    }

    /// The set of audio-type tags present among this score's instruments.
    pub fn audio_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self
            .instruments
            .values()
            .map(|i| i.config.audio_type.as_str())
            .collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }

    /// Iterate MIDI instruments in stable (id-sorted) order.
    pub fn midi_instruments(&self) -> impl Iterator<Item = (&str, &Instrument)> {
        self.instruments
            .iter()
            .filter(|(_, i)| i.config.audio_type == AUDIO_TYPE_MIDI)
            .map(|(id, i)| (id.as_str(), i))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub config: InstrumentConfig,
}

/// Per-instrument rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Audio-type tag; `"midi"` is the only built-in.
    #[serde(rename = "type")]
    pub audio_type: String,

    /// General MIDI patch number, 1-indexed (1–128).
    #[serde(default)]
    pub patch: Option<u8>,

    /// Percussion instruments are routed to the reserved channel.
    #[serde(default)]
    pub percussion: bool,
}

impl InstrumentConfig {
    pub fn midi() -> Self {
        Self {
            audio_type: AUDIO_TYPE_MIDI.to_string(),
            patch: None,
            percussion: false,
        }
    }
}

/// A single timed note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Absolute offset from the score beginning, in ms.
    pub offset_ms: f64,

    /// Id of the instrument that plays this note.
    pub instrument_id: String,

    pub duration_ms: f64,
    pub midi_note: u8,

    /// Note velocity in [0.0, 1.0].
    #[serde(default = "default_level")]
    pub volume: f64,

    /// Channel volume (CC 7) in [0.0, 1.0].
    #[serde(default = "default_level")]
    pub track_volume: f64,

    /// Stereo panning (CC 10) in [0.0, 1.0]; 0.5 is center.
    #[serde(default = "default_pan")]
    pub panning: f64,

    /// Score-side callback marker. Events carrying one are elided from
    /// MIDI output.
    #[serde(default)]
    pub function: Option<String>,
}

fn default_level() -> f64 {
    1.0
}

fn default_pan() -> f64 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn midi_instrument(patch: Option<u8>, percussion: bool) -> Instrument {
        Instrument {
            config: InstrumentConfig {
                audio_type: AUDIO_TYPE_MIDI.to_string(),
                patch,
                percussion,
            },
        }
    }

    #[test]
    fn test_audio_types_deduplicated() {
        let mut score = Score::default();
        score
            .instruments
            .insert("piano".into(), midi_instrument(Some(1), false));
        score
            .instruments
            .insert("drums".into(), midi_instrument(None, true));
        assert_eq!(score.audio_types(), vec![AUDIO_TYPE_MIDI]);
    }

    #[test]
    fn test_midi_instruments_are_id_sorted() {
        let mut score = Score::default();
        score
            .instruments
            .insert("zither".into(), midi_instrument(Some(1), false));
        score
            .instruments
            .insert("accordion".into(), midi_instrument(Some(22), false));
        let ids: Vec<&str> = score.midi_instruments().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["accordion", "zither"]);
    }

    #[test]
    fn test_non_midi_instruments_are_skipped() {
        let mut score = Score::default();
        score
            .instruments
            .insert("piano".into(), midi_instrument(Some(1), false));
        score.instruments.insert(
            "tape".into(),
            Instrument {
                config: InstrumentConfig {
                    audio_type: "sample".to_string(),
                    patch: None,
                    percussion: false,
                },
            },
        );
        assert_eq!(score.midi_instruments().count(), 1);
        let mut tags = score.audio_types();
        tags.sort_unstable();
        assert_eq!(tags, vec![AUDIO_TYPE_MIDI, "sample"]);
    }

    #[test]
    fn test_score_deserializes_from_parser_output() {
        let raw = r#"{
            "instruments": {
                "piano": {"config": {"type": "midi", "patch": 1}},
                "drums": {"config": {"type": "midi", "percussion": true}}
            },
            "events": [
                {"offset_ms": 0.0, "instrument_id": "piano",
                 "duration_ms": 500.0, "midi_note": 60}
            ],
            "tempo": {"0": 120.0},
            "markers": {"verse": 2000.0}
        }"#;
        let score: Score = serde_json::from_str(raw).unwrap();
        assert_eq!(score.instruments.len(), 2);
        assert!(score.instruments["drums"].config.percussion);
        assert_eq!(score.instruments["piano"].config.patch, Some(1));
        // Unspecified dynamics fall back to full volume, centered pan.
        assert_eq!(score.events[0].volume, 1.0);
        assert_eq!(score.events[0].panning, 0.5);
        assert_eq!(score.marker("verse"), Some(2000.0));
        assert_eq!(score.marker("chorus"), None);
    }
}
