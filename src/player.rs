//! The playback controller.
//!
//! [`Player`] glues the device pool, channel allocation, tempo conversion,
//! and sequence building into the `play` / `export` surface. Scores are
//! external values, so the player tracks one [`AudioContext`] per score
//! behind a shared handle; `set_up` populates it, `tear_down` drains it.

use crate::context::{AudioBackend, AudioContext, MidiBackend};
use crate::error::Result;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use segno_core::{
    shift_events, ChannelMap, Division, NoteEvent, Score, Sequence, SequenceBuilder,
    TempoItinerary, AUDIO_TYPE_MIDI,
};
use segno_midi_io::{write_smf, DevicePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A playback start or end reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Position {
    /// A named marker in the score's marker table.
    Marker(String),
    /// An absolute millisecond offset.
    Offset(f64),
}

/// Options for one `play` or `create_sequence` call.
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub(crate) from: Option<Position>,
    pub(crate) to: Option<Position>,
    pub(crate) one_off: bool,
    pub(crate) background: bool,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playback at a named marker.
    pub fn from_marker(mut self, name: impl Into<String>) -> Self {
        self.from = Some(Position::Marker(name.into()));
        self
    }

    /// Start playback at a millisecond offset.
    pub fn from_offset(mut self, ms: f64) -> Self {
        self.from = Some(Position::Offset(ms));
        self
    }

    /// End playback at a named marker (exclusive).
    pub fn to_marker(mut self, name: impl Into<String>) -> Self {
        self.to = Some(Position::Marker(name.into()));
        self
    }

    /// End playback at a millisecond offset (exclusive).
    pub fn to_offset(mut self, ms: f64) -> Self {
        self.to = Some(Position::Offset(ms));
        self
    }

    /// Tear the audio context down when playback ends or is stopped.
    pub fn one_off(mut self, one_off: bool) -> Self {
        self.one_off = one_off;
        self
    }

    /// Return from `play` immediately instead of blocking on completion.
    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }
}

/// Single-shot completion latch, fulfilled exactly once by the end-of-track
/// listener (or by an explicit stop). `wait` may be called any number of
/// times.
#[derive(Clone, Default, Debug)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

#[derive(Default, Debug)]
struct CompletionInner {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fulfill(&self) {
        let mut done = self.inner.done.lock();
        if !*done {
            *done = true;
            self.inner.condvar.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut done = self.inner.done.lock();
        while !*done {
            self.inner.condvar.wait(&mut done);
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        *self.inner.done.lock()
    }
}

/// Handle onto a started playback.
#[derive(Debug)]
pub struct Playback {
    player: Player,
    score: Arc<Score>,
    completion: Completion,
    one_off: bool,
}

impl Playback {
    pub fn score(&self) -> &Arc<Score> {
        &self.score
    }

    /// Block until the playback completes (or has been stopped).
    pub fn wait(&self) {
        self.completion.wait();
    }

    /// Non-blocking completion probe.
    pub fn is_done(&self) -> bool {
        self.completion.is_fulfilled()
    }

    /// Stop this playback: tear the context down for one-off playbacks,
    /// otherwise halt the transport and silence the synthesizer.
    pub fn stop(&self) -> Result<()> {
        self.completion.fulfill();
        if self.one_off {
            self.player.tear_down(&self.score)
        } else {
            self.player.stop_playback(&self.score)
        }
    }
}

struct PlayerInner {
    pool: DevicePool,
    backends: HashMap<String, Arc<dyn AudioBackend>>,
    contexts: DashMap<usize, Arc<Mutex<AudioContext>>>,
    division: Division,
}

/// The playback and export controller. Cheap to clone; clones share the
/// same pool and contexts.
#[derive(Clone)]
pub struct Player {
    inner: Arc<PlayerInner>,
}

impl Player {
    pub fn builder() -> crate::PlayerBuilder {
        crate::PlayerBuilder::default()
    }

    pub(crate) fn from_parts(
        pool: DevicePool,
        mut backends: HashMap<String, Arc<dyn AudioBackend>>,
        division: Division,
    ) -> Self {
        backends
            .entry(AUDIO_TYPE_MIDI.to_string())
            .or_insert_with(|| Arc::new(MidiBackend));
        Self {
            inner: Arc::new(PlayerInner {
                pool,
                backends,
                contexts: DashMap::new(),
                division,
            }),
        }
    }

    /// The device pool backing this player.
    pub fn pool(&self) -> &DevicePool {
        &self.inner.pool
    }

    fn context(&self, score: &Arc<Score>) -> Arc<Mutex<AudioContext>> {
        self.inner
            .contexts
            .entry(score_key(score))
            .or_insert_with(|| Arc::new(Mutex::new(AudioContext::new())))
            .clone()
    }

    /// Whether `score` currently has any audio type set up.
    pub fn is_set_up(&self, score: &Arc<Score>) -> bool {
        self.inner
            .contexts
            .get(&score_key(score))
            .map(|ctx| ctx.lock().has_active_types())
            .unwrap_or(false)
    }

    /// Set up every audio type present in the score.
    pub fn set_up(&self, score: &Arc<Score>) -> Result<()> {
        let context = self.context(score);
        let mut guard = context.lock();
        for tag in score.audio_types() {
            self.set_up_tag(&mut guard, tag)?;
        }
        Ok(())
    }

    /// Set up a single audio type for the score.
    pub fn set_up_audio_type(&self, score: &Arc<Score>, audio_type: &str) -> Result<()> {
        let context = self.context(score);
        let mut guard = context.lock();
        self.set_up_tag(&mut guard, audio_type)
    }

    fn set_up_tag(&self, context: &mut AudioContext, audio_type: &str) -> Result<()> {
        match self.inner.backends.get(audio_type) {
            Some(backend) => {
                backend.set_up(&self.inner.pool, context)?;
                context.activate(audio_type);
            }
            // Unknown tags degrade gracefully so scores with mixed audio
            // types still play the parts we understand.
            None => error!("no implementation for audio type `{audio_type}`"),
        }
        Ok(())
    }

    /// Halt sounding playback for the score, keeping its devices.
    pub fn stop_playback(&self, score: &Arc<Score>) -> Result<()> {
        let context = self.context(score);
        let guard = context.lock();
        let tags: Vec<String> = guard.active_types().map(String::from).collect();
        for tag in tags {
            match self.inner.backends.get(&tag) {
                Some(backend) => backend.stop_playback(&guard)?,
                None => error!("no implementation for audio type `{tag}`"),
            }
        }
        Ok(())
    }

    /// Release the score's devices and drop its context.
    pub fn tear_down(&self, score: &Arc<Score>) -> Result<()> {
        let context = self.context(score);
        let mut guard = context.lock();
        let tags: Vec<String> = guard.active_types().map(String::from).collect();
        for tag in tags {
            match self.inner.backends.get(&tag) {
                Some(backend) => {
                    backend.tear_down(&self.inner.pool, &mut guard)?;
                    guard.deactivate(&tag);
                }
                None => error!("no implementation for audio type `{tag}`"),
            }
        }
        if !guard.has_active_types() {
            self.inner.contexts.remove(&score_key(score));
        }
        Ok(())
    }

    /// Set up the score, resolve the playback window, and materialize the
    /// windowed events into a sequence, loading it into the sequencer.
    pub fn create_sequence(&self, score: &Arc<Score>, options: &PlayOptions) -> Result<Sequence> {
        self.create_sequence_from(score, None, options)
    }

    /// Like [`create_sequence`](Self::create_sequence) but restricted to an
    /// explicit subset of the score's events.
    pub fn create_sequence_from(
        &self,
        score: &Arc<Score>,
        events: Option<&[NoteEvent]>,
        options: &PlayOptions,
    ) -> Result<Sequence> {
        let context = self.context(score);
        let mut guard = context.lock();
        for tag in score.audio_types() {
            self.set_up_tag(&mut guard, tag)?;
        }

        let start = resolve_position(score, options.from.as_ref())?;
        let end = resolve_position(score, options.to.as_ref())?;

        let source: &[NoteEvent] = events.unwrap_or(&score.events);
        let effective_start = if options.from.is_some() {
            start.unwrap_or(0.0)
        } else if events.is_some() {
            source
                .iter()
                .map(|e| e.offset_ms)
                .min_by(|a, b| a.total_cmp(b))
                .map(|ms| ms.max(0.0))
                .unwrap_or(0.0)
        } else {
            start.unwrap_or(0.0)
        };
        let window_len = end.map(|end| end - start.unwrap_or(0.0));
        let windowed = shift_events(source, effective_start, window_len);

        let channels = ChannelMap::for_score(score)?;
        let itinerary = TempoItinerary::for_score(score, self.inner.division)?;
        let sequence = SequenceBuilder::new(&channels, &itinerary).build(&windowed)?;
        debug!(
            "built sequence: {} events over {} channels",
            sequence.len(),
            channels.len()
        );

        if let Some(sequencer) = guard.sequencer() {
            sequencer.load(sequence.clone())?;
            sequencer.seek_start();
        }
        guard.channels = Some(channels);
        Ok(sequence)
    }

    /// Play the score.
    ///
    /// Blocks until completion unless `background` is set; tears the
    /// context down afterwards when `one_off` is set.
    pub fn play(&self, score: &Arc<Score>, options: PlayOptions) -> Result<Playback> {
        self.play_events(score, None, options)
    }

    /// Play an explicit subset of the score's events.
    pub fn play_events(
        &self,
        score: &Arc<Score>,
        events: Option<&[NoteEvent]>,
        options: PlayOptions,
    ) -> Result<Playback> {
        let sequence = self.create_sequence_from(score, events, &options)?;
        let completion = Completion::new();

        {
            let context = self.context(score);
            let guard = context.lock();
            match guard.sequencer() {
                Some(sequencer) if !sequence.is_empty() => {
                    let listener_completion = completion.clone();
                    sequencer.set_end_listener(move || listener_completion.fulfill());
                    sequencer.seek_start();
                    sequencer.start()?;
                }
                // Nothing will ever reach end-of-track; complete at once.
                _ => completion.fulfill(),
            }
        }

        match (options.one_off, options.background) {
            (true, true) => {
                let player = self.clone();
                let score = Arc::clone(score);
                let watch_completion = completion.clone();
                let spawned = std::thread::Builder::new()
                    .name("segno-playback-watch".to_string())
                    .spawn(move || {
                        watch_completion.wait();
                        if let Err(e) = player.tear_down(&score) {
                            warn!("teardown after playback failed: {e}");
                        }
                    });
                if let Err(e) = spawned {
                    warn!("failed to spawn playback watcher: {e}");
                }
            }
            (true, false) => {
                completion.wait();
                self.tear_down(score)?;
            }
            (false, true) => {}
            (false, false) => completion.wait(),
        }

        Ok(Playback {
            player: self.clone(),
            score: Arc::clone(score),
            completion,
            one_off: options.one_off,
        })
    }

    /// Build the sequence for the whole score and write it to a Type-0
    /// Standard MIDI File at `path`.
    pub fn export(&self, score: &Arc<Score>, path: impl AsRef<Path>) -> Result<()> {
        let sequence = self.create_sequence(score, &PlayOptions::default())?;
        write_smf(&sequence, path)?;
        Ok(())
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("division", &self.inner.division)
            .field("contexts", &self.inner.contexts.len())
            .finish_non_exhaustive()
    }
}

fn score_key(score: &Arc<Score>) -> usize {
    Arc::as_ptr(score) as usize
}

fn resolve_position(score: &Score, position: Option<&Position>) -> Result<Option<f64>> {
    match position {
        None => Ok(None),
        Some(Position::Offset(ms)) => Ok(Some(*ms)),
        Some(Position::Marker(name)) => score
            .marker(name)
            .map(Some)
            .ok_or_else(|| segno_core::Error::MarkerNotFound(name.clone()).into()),
    }
}
