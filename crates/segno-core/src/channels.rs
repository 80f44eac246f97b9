//! MIDI channel assignment.
//!
//! A General MIDI synthesizer has 16 channels and reserves channel 9 for
//! percussion. Each MIDI instrument in a score gets exactly one channel:
//! percussion instruments get channel 9, everything else gets the lowest
//! free non-percussion channel. Assignment follows the score's stable
//! instrument order, so the same score always produces the same map.

use crate::error::{Error, Result};
use crate::score::Score;
use std::collections::{BTreeMap, BTreeSet};

/// The channel index reserved for percussion on GM synthesizers.
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Number of channels on a GM synthesizer.
pub const CHANNEL_COUNT: u8 = 16;

/// One instrument's slot on the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAssignment {
    /// Channel index, 0–15.
    pub channel: u8,
    /// GM patch number, 1-indexed (1–128).
    pub patch: Option<u8>,
    pub percussion: bool,
}

/// Instrument id → channel assignment for one score.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    assignments: BTreeMap<String, ChannelAssignment>,
}

impl ChannelMap {
    /// Assign one channel per MIDI instrument in `score`.
    ///
    /// Fails with [`Error::OutOfChannels`] when the score asks for more
    /// channels than the percussion rule leaves available.
    pub fn for_score(score: &Score) -> Result<Self> {
        let mut available: BTreeSet<u8> = (0..CHANNEL_COUNT).collect();
        let mut assignments = BTreeMap::new();

        for (id, instrument) in score.midi_instruments() {
            let percussion = instrument.config.percussion;
            let channel = available
                .iter()
                .copied()
                .find(|&ch| (ch == PERCUSSION_CHANNEL) == percussion)
                .ok_or_else(|| Error::OutOfChannels {
                    instrument: id.to_string(),
                    used: (CHANNEL_COUNT as usize) - available.len(),
                })?;
            available.remove(&channel);
            assignments.insert(
                id.to_string(),
                ChannelAssignment {
                    channel,
                    patch: instrument.config.patch,
                    percussion,
                },
            );
        }

        tracing::debug!("assigned {} MIDI channels", assignments.len());
        Ok(Self { assignments })
    }

    pub fn get(&self, instrument_id: &str) -> Option<&ChannelAssignment> {
        self.assignments.get(instrument_id)
    }

    /// Iterate assignments in instrument-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChannelAssignment)> {
        self.assignments.iter().map(|(id, a)| (id.as_str(), a))
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
