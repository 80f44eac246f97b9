//! The sequencer device.
//!
//! A [`Sequencer`] owns a dedicated transport thread. The thread holds the
//! loaded [`Sequence`], converts tick positions to wall-clock deadlines
//! (from the embedded set-tempo events under PPQ, or the fixed frame rate
//! under SMPTE), and transmits each channel-voice event into the connected
//! [`MidiReceiver`] at its moment. After the final event it invokes the
//! registered end-of-track listener.
//!
//! `stop()` pauses the transport and keeps the sequence and position;
//! `close()` ends the thread. Commands travel over a bounded channel so the
//! control plane never blocks on playback.

use crate::error::{Error, Result};
use crate::message::RawMessage;
use crate::sink::MidiReceiver;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use segno_core::{Division, EventKind, Sequence};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tempo assumed until the first set-tempo event (120 BPM).
const DEFAULT_US_PER_QUARTER: f64 = 500_000.0;

type EndListener = Box<dyn Fn() + Send>;

enum Command {
    Load(Sequence),
    Connect(MidiReceiver),
    Disconnect,
    SeekStart,
    Start,
    Stop,
    Close,
}

pub struct Sequencer {
    commands: Sender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    end_listener: Arc<Mutex<Option<EndListener>>>,
    closed: AtomicBool,
}

impl Sequencer {
    /// Spawn the transport thread, ready to accept a sequence.
    pub fn open() -> Result<Self> {
        let (commands, command_rx) = bounded(64);
        let running = Arc::new(AtomicBool::new(false));
        let end_listener: Arc<Mutex<Option<EndListener>>> = Arc::new(Mutex::new(None));

        let transport = Transport {
            commands: command_rx,
            running: Arc::clone(&running),
            end_listener: Arc::clone(&end_listener),
            receiver: None,
            loaded: None,
            cursor: 0,
            position_us: 0,
            playing: false,
            origin: Instant::now(),
        };
        let thread = std::thread::Builder::new()
            .name("segno-sequencer".to_string())
            .spawn(move || transport.run())
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        Ok(Self {
            commands,
            thread: Mutex::new(Some(thread)),
            running,
            end_listener,
            closed: AtomicBool::new(false),
        })
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::DeviceClosed)
    }

    /// Replace the loaded sequence and rewind to tick 0.
    pub fn load(&self, sequence: Sequence) -> Result<()> {
        self.command(Command::Load(sequence))
    }

    /// Wire this sequencer's transmitter into a synthesizer's receiver,
    /// dropping any previous wiring.
    pub fn connect(&self, receiver: MidiReceiver) -> Result<()> {
        self.command(Command::Disconnect)?;
        self.command(Command::Connect(receiver))
    }

    pub fn disconnect(&self) {
        let _ = self.command(Command::Disconnect);
    }

    /// Reset the tick position to 0, keeping the loaded sequence.
    pub fn seek_start(&self) {
        let _ = self.command(Command::SeekStart);
    }

    /// Start (or resume) the transport.
    pub fn start(&self) -> Result<()> {
        self.command(Command::Start)
    }

    /// Pause the transport. The loaded sequence and position are preserved.
    pub fn stop(&self) {
        let _ = self.command(Command::Stop);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Install the end-of-track listener, replacing any previous one. The
    /// listener runs on the transport thread each time playback reaches the
    /// end of the loaded sequence.
    pub fn set_end_listener(&self, listener: impl Fn() + Send + 'static) {
        *self.end_listener.lock() = Some(Box::new(listener));
    }

    /// End the transport thread. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closing sequencer");
            let _ = self.commands.send(Command::Close);
            if let Some(thread) = self.thread.lock().take() {
                let _ = thread.join();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("running", &self.is_running())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Wall-clock time of every event, in microseconds from sequence start.
fn schedule_for(sequence: &Sequence) -> Vec<u64> {
    match sequence.division() {
        Division::Smpte { fps, resolution } => {
            let us_per_tick = 1_000_000.0 / (fps.frames_per_second() * resolution as f64);
            sequence
                .events()
                .iter()
                .map(|e| (e.tick as f64 * us_per_tick) as u64)
                .collect()
        }
        Division::PulsesPerQuarter { resolution } => {
            let mut us_per_quarter = DEFAULT_US_PER_QUARTER;
            let mut clock_us = 0.0;
            let mut prev_tick = 0u64;
            sequence
                .events()
                .iter()
                .map(|e| {
                    clock_us += (e.tick - prev_tick) as f64 * us_per_quarter / resolution as f64;
                    prev_tick = e.tick;
                    // A tempo event takes effect for everything after its
                    // own tick.
                    if let EventKind::Tempo {
                        microseconds_per_quarter,
                    } = e.kind
                    {
                        us_per_quarter = microseconds_per_quarter as f64;
                    }
                    clock_us as u64
                })
                .collect()
        }
    }
}

struct Transport {
    commands: Receiver<Command>,
    running: Arc<AtomicBool>,
    end_listener: Arc<Mutex<Option<EndListener>>>,
    receiver: Option<MidiReceiver>,
    loaded: Option<(Sequence, Vec<u64>)>,
    cursor: usize,
    /// Transport position corresponding to `origin`.
    position_us: u64,
    playing: bool,
    /// Wall-clock anchor of the current run.
    origin: Instant,
}

impl Transport {
    fn run(mut self) {
        loop {
            let command = match self.next_deadline() {
                Some(deadline) => match self.commands.recv_deadline(deadline) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            match command {
                Some(Command::Load(sequence)) => {
                    debug!("loaded sequence with {} events", sequence.len());
                    let schedule = schedule_for(&sequence);
                    self.loaded = Some((sequence, schedule));
                    self.cursor = 0;
                    self.position_us = 0;
                    self.set_playing(false);
                }
                Some(Command::Connect(receiver)) => self.receiver = Some(receiver),
                Some(Command::Disconnect) => self.receiver = None,
                Some(Command::SeekStart) => {
                    self.cursor = 0;
                    self.position_us = 0;
                }
                Some(Command::Start) => self.resume(),
                Some(Command::Stop) => self.pause(),
                Some(Command::Close) => break,
                None => self.emit_due(),
            }
        }
        self.set_playing(false);
    }

    fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        self.running.store(playing, Ordering::Release);
    }

    fn next_deadline(&self) -> Option<Instant> {
        if !self.playing {
            return None;
        }
        let (_, schedule) = self.loaded.as_ref()?;
        let due_us = *schedule.get(self.cursor)?;
        Some(self.origin + Duration::from_micros(due_us.saturating_sub(self.position_us)))
    }

    fn resume(&mut self) {
        if self.playing {
            return;
        }
        let has_pending = self
            .loaded
            .as_ref()
            .map(|(_, schedule)| self.cursor < schedule.len())
            .unwrap_or(false);
        if has_pending {
            self.origin = Instant::now();
            self.set_playing(true);
        }
    }

    fn pause(&mut self) {
        if !self.playing {
            return;
        }
        // Re-anchor at the next unsent event so a later start resumes
        // where playback left off.
        if let Some((_, schedule)) = self.loaded.as_ref() {
            if let Some(&due_us) = schedule.get(self.cursor) {
                self.position_us = due_us;
            }
        }
        self.set_playing(false);
    }

    fn emit_due(&mut self) {
        let mut to_send: Vec<RawMessage> = Vec::new();
        let mut finished = false;

        if let Some((sequence, schedule)) = self.loaded.as_ref() {
            if self.cursor >= schedule.len() {
                return;
            }
            // Everything sharing the due instant goes out in one burst,
            // preserving sequence order.
            let due_us = schedule[self.cursor];
            let mut cursor = self.cursor;
            while cursor < schedule.len() && schedule[cursor] == due_us {
                if let EventKind::Channel { channel, message } = sequence.events()[cursor].kind {
                    to_send.push(RawMessage::from_event(channel, &message));
                }
                cursor += 1;
            }
            self.cursor = cursor;
            if cursor == schedule.len() {
                self.position_us = schedule.last().copied().unwrap_or(0);
                finished = true;
            }
        }

        if let Some(receiver) = &self.receiver {
            for message in &to_send {
                if let Err(e) = receiver.send(message) {
                    warn!("failed to transmit event: {e}");
                }
            }
        }

        if finished {
            self.set_playing(false);
            if let Some(listener) = self.end_listener.lock().as_ref() {
                listener();
            }
        }
    }
}
