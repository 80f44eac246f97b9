//! Tempo timeline and millisecond → tick conversion.
//!
//! Under PPQ division the duration of a tick depends on the current tempo,
//! so converting an absolute millisecond offset to a tick position needs the
//! whole history of tempo changes up to that point. [`TempoItinerary`]
//! precomputes that history: one entry per tempo change, each carrying the
//! cumulative tick position at which the change lands. SMPTE division is
//! tempo-agnostic and converts with a fixed ticks-per-second rate.

use crate::error::{Error, Result};
use crate::score::Score;

/// Default PPQ resolution (ticks per quarter note).
pub const DEFAULT_RESOLUTION: u16 = 128;

const MS_PER_MINUTE: f64 = 60_000.0;
const US_PER_MINUTE: f64 = 60_000_000.0;

/// Largest microseconds-per-quarter value encodable in a 3-byte set-tempo
/// meta event.
const MAX_US_PER_QUARTER: u32 = 0xFF_FFFF;

/// SMPTE frame rates recognized by Standard MIDI Files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmpteFps {
    Fps24,
    Fps25,
    Fps29,
    Fps30,
}

impl SmpteFps {
    pub fn frames_per_second(self) -> f64 {
        match self {
            SmpteFps::Fps24 => 24.0,
            SmpteFps::Fps25 => 25.0,
            SmpteFps::Fps29 => 29.97,
            SmpteFps::Fps30 => 30.0,
        }
    }
}

/// MIDI division mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Division {
    /// Tick duration depends on the current tempo.
    PulsesPerQuarter { resolution: u16 },
    /// Tick duration is a fixed fraction of a real-time second.
    Smpte { fps: SmpteFps, resolution: u8 },
}

impl Default for Division {
    fn default() -> Self {
        Division::PulsesPerQuarter {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

/// One tempo-change point with its cumulative tick position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEntry {
    pub ms: f64,
    pub bpm: f64,
    pub ticks: f64,
}

/// Precomputed timeline of a score's tempo changes.
///
/// Immutable once built for a given score and division.
#[derive(Debug, Clone)]
pub struct TempoItinerary {
    division: Division,
    entries: Vec<TempoEntry>,
}

impl TempoItinerary {
    /// Build the itinerary from `score`'s tempo timeline.
    ///
    /// The timeline must contain an entry at offset 0; this is part of the
    /// score input contract.
    pub fn for_score(score: &Score, division: Division) -> Result<Self> {
        if !score.tempo.contains_key(&0) {
            return Err(Error::MissingInitialTempo);
        }

        let mut entries: Vec<TempoEntry> = Vec::with_capacity(score.tempo.len());
        for (&ms, &bpm) in &score.tempo {
            let ms = ms as f64;
            let ticks = match (entries.last(), division) {
                (None, _) => 0.0,
                (Some(prev), Division::PulsesPerQuarter { resolution }) => {
                    prev.ticks + (ms - prev.ms) / ms_per_tick(prev.bpm, resolution)
                }
                (Some(_), Division::Smpte { fps, resolution }) => {
                    ms / 1_000.0 * fps.frames_per_second() * resolution as f64
                }
            };
            entries.push(TempoEntry { ms, bpm, ticks });
        }

        Ok(Self { division, entries })
    }

    pub fn division(&self) -> Division {
        self.division
    }

    pub fn entries(&self) -> &[TempoEntry] {
        &self.entries
    }

    /// Convert an absolute millisecond offset to a (fractional) tick
    /// position.
    pub fn ticks_at(&self, offset_ms: f64) -> f64 {
        match self.division {
            Division::Smpte { fps, resolution } => {
                offset_ms / 1_000.0 * fps.frames_per_second() * resolution as f64
            }
            Division::PulsesPerQuarter { resolution } => {
                if offset_ms == 0.0 {
                    return 0.0;
                }
                // Last entry at or before the offset. The entry at ms=0
                // guarantees the partition point is never zero.
                let idx = self.entries.partition_point(|e| e.ms <= offset_ms);
                let entry = &self.entries[idx - 1];
                entry.ticks + (offset_ms - entry.ms) / ms_per_tick(entry.bpm, resolution)
            }
        }
    }

    /// Tick position rounded to the nearest integer, as written into MIDI
    /// events.
    pub fn tick_at(&self, offset_ms: f64) -> u64 {
        self.ticks_at(offset_ms).round() as u64
    }
}

fn ms_per_tick(bpm: f64, resolution: u16) -> f64 {
    MS_PER_MINUTE / (bpm * resolution as f64)
}

/// Encode a BPM value as microseconds per quarter note, as carried by a
/// set-tempo meta event.
///
/// Tempos below ~3.58 BPM do not fit in the event's 3 bytes and fail with
/// [`Error::TempoOutOfRange`].
pub fn microseconds_per_quarter(bpm: f64) -> Result<u32> {
    let us = (US_PER_MINUTE / bpm).floor();
    if us > MAX_US_PER_QUARTER as f64 {
        return Err(Error::TempoOutOfRange { bpm });
    }
    Ok(us as u32)
}
