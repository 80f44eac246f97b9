//! Device factories and the pre-warmed device pool.
//!
//! Opening a real MIDI device takes long enough to hear (hundreds of ms on
//! some systems), so the pool keeps a bounded queue of already-open
//! synthesizers and sequencers and refills it in the background. Workers
//! with a permanently-assigned device install it as a default, which
//! bypasses the queues entirely.
//!
//! The pool is an explicit registry passed to the playback controller, not
//! process-global state; tests inject their own [`DeviceFactory`].

use crate::error::{Error, Result};
use crate::sequencer::Sequencer;
use crate::sink::{MidirSink, NullSink};
use crate::synth::Synthesizer;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use midir::MidiOutput;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// How many of each device the pool keeps warm.
pub const POOL_TARGET: usize = 4;

const CLIENT_NAME: &str = "segno";

/// Opens synthesizers and sequencers. Implementations decide where the
/// sound actually goes.
pub trait DeviceFactory: Send + Sync {
    fn open_synth(&self) -> Result<Synthesizer>;
    fn open_sequencer(&self) -> Result<Sequencer>;
}

/// How [`MidirDeviceFactory`] picks among available output ports.
#[derive(Debug, Clone, Default)]
pub enum PortSelector {
    /// First available port.
    #[default]
    First,
    Index(usize),
    /// First port whose name contains the string, case-insensitively.
    NameContains(String),
}

/// Opens real `midir` output connections (typically to the system's GM
/// synthesizer).
#[derive(Debug, Clone, Default)]
pub struct MidirDeviceFactory {
    selector: PortSelector,
}

impl MidirDeviceFactory {
    pub fn new(selector: PortSelector) -> Self {
        Self { selector }
    }

    /// Names of the currently available MIDI output ports.
    pub fn list_ports() -> Result<Vec<String>> {
        let output = MidiOutput::new(CLIENT_NAME)?;
        Ok(output
            .ports()
            .iter()
            .map(|port| {
                output
                    .port_name(port)
                    .unwrap_or_else(|_| "[unnamed output]".to_string())
            })
            .collect())
    }
}

impl DeviceFactory for MidirDeviceFactory {
    fn open_synth(&self) -> Result<Synthesizer> {
        let output = MidiOutput::new(CLIENT_NAME)?;
        let ports = output.ports();
        let index = match &self.selector {
            PortSelector::First => Some(0),
            PortSelector::Index(i) => Some(*i),
            PortSelector::NameContains(needle) => {
                let needle = needle.to_lowercase();
                ports.iter().position(|port| {
                    output
                        .port_name(port)
                        .map(|name| name.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
            }
        };
        let port = index
            .and_then(|i| ports.get(i))
            .ok_or_else(|| Error::DeviceUnavailable("no matching MIDI output port".to_string()))?;
        let name = output
            .port_name(port)
            .unwrap_or_else(|_| "[unnamed output]".to_string());
        let connection = output.connect(port, "segno-synth")?;
        debug!("opened synthesizer on port `{name}`");
        Ok(Synthesizer::with_sink(name, Box::new(MidirSink::new(connection))))
    }

    fn open_sequencer(&self) -> Result<Sequencer> {
        Sequencer::open()
    }
}

/// Opens synthesizers that discard their output. Lets `export` and tests
/// run on machines with no MIDI subsystem at all.
#[derive(Debug, Clone, Default)]
pub struct NullDeviceFactory;

impl DeviceFactory for NullDeviceFactory {
    fn open_synth(&self) -> Result<Synthesizer> {
        Ok(Synthesizer::with_sink("null", Box::new(NullSink)))
    }

    fn open_sequencer(&self) -> Result<Sequencer> {
        Sequencer::open()
    }
}

struct PooledQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> PooledQueue<T> {
    fn new(target: usize) -> Self {
        let (sender, receiver) = bounded(target);
        Self { sender, receiver }
    }
}

/// Pre-warmed holders of open synthesizers and sequencers.
pub struct DevicePool {
    factory: Arc<dyn DeviceFactory>,
    synths: PooledQueue<Synthesizer>,
    sequencers: PooledQueue<Sequencer>,
    default_synth: Mutex<Option<Arc<Synthesizer>>>,
    default_sequencer: Mutex<Option<Arc<Sequencer>>>,
}

impl DevicePool {
    pub fn new(factory: Arc<dyn DeviceFactory>) -> Self {
        Self::with_target(factory, POOL_TARGET)
    }

    /// The bounded queues enforce the target: refills beyond it are closed
    /// and dropped instead of accumulating.
    pub fn with_target(factory: Arc<dyn DeviceFactory>, target: usize) -> Self {
        Self {
            factory,
            synths: PooledQueue::new(target.max(1)),
            sequencers: PooledQueue::new(target.max(1)),
            default_synth: Mutex::new(None),
            default_sequencer: Mutex::new(None),
        }
    }

    /// Install a shared synthesizer that every acquisition returns from now
    /// on, bypassing the queue.
    pub fn set_default_synth(&self, synth: Arc<Synthesizer>) {
        *self.default_synth.lock() = Some(synth);
    }

    pub fn set_default_sequencer(&self, sequencer: Arc<Sequencer>) {
        *self.default_sequencer.lock() = Some(sequencer);
    }

    /// Whether `synth` is the installed shared default.
    pub fn is_default_synth(&self, synth: &Arc<Synthesizer>) -> bool {
        self.default_synth
            .lock()
            .as_ref()
            .map(|d| Arc::ptr_eq(d, synth))
            .unwrap_or(false)
    }

    pub fn is_default_sequencer(&self, sequencer: &Arc<Sequencer>) -> bool {
        self.default_sequencer
            .lock()
            .as_ref()
            .map(|d| Arc::ptr_eq(d, sequencer))
            .unwrap_or(false)
    }

    /// Take a ready synthesizer, opening one on the spot when the warm
    /// queue is empty. Fails only if the factory cannot produce a device.
    pub fn acquire_synth(&self) -> Result<Arc<Synthesizer>> {
        if let Some(default) = self.default_synth.lock().clone() {
            return Ok(default);
        }
        let synth = match self.synths.receiver.try_recv() {
            Ok(synth) => synth,
            Err(_) => self.factory.open_synth()?,
        };
        self.refill_synths();
        Ok(Arc::new(synth))
    }

    pub fn acquire_sequencer(&self) -> Result<Arc<Sequencer>> {
        if let Some(default) = self.default_sequencer.lock().clone() {
            return Ok(default);
        }
        let sequencer = match (self.sequencers.receiver.try_recv()).ok() {
            Some(sequencer) => sequencer,
            None => self.factory.open_sequencer()?,
        };
        self.refill_sequencers();
        Ok(Arc::new(sequencer))
    }

    fn refill_synths(&self) {
        let factory = Arc::clone(&self.factory);
        let sender = self.synths.sender.clone();
        spawn_refill("segno-pool-synths", move || {
            if sender.is_full() {
                return false;
            }
            match factory.open_synth() {
                Ok(synth) => match sender.try_send(synth) {
                    Ok(()) => true,
                    Err(TrySendError::Full(synth)) | Err(TrySendError::Disconnected(synth)) => {
                        synth.close();
                        false
                    }
                },
                Err(e) => {
                    warn!("synthesizer refill failed: {e}");
                    false
                }
            }
        });
    }

    fn refill_sequencers(&self) {
        let factory = Arc::clone(&self.factory);
        let sender = self.sequencers.sender.clone();
        spawn_refill("segno-pool-sequencers", move || {
            if sender.is_full() {
                return false;
            }
            match factory.open_sequencer() {
                Ok(sequencer) => match sender.try_send(sequencer) {
                    Ok(()) => true,
                    Err(TrySendError::Full(sequencer))
                    | Err(TrySendError::Disconnected(sequencer)) => {
                        sequencer.close();
                        false
                    }
                },
                Err(e) => {
                    warn!("sequencer refill failed: {e}");
                    false
                }
            }
        });
    }
}

impl std::fmt::Debug for DevicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePool")
            .field("warm_synths", &self.synths.receiver.len())
            .field("warm_sequencers", &self.sequencers.receiver.len())
            .finish_non_exhaustive()
    }
}

/// Run `fill` on a background thread until it reports the queue is full.
fn spawn_refill(name: &str, fill: impl FnMut() -> bool + Send + 'static) {
    let mut fill = fill;
    let _ = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || while fill() {});
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts every open so tests can observe background refills.
    #[derive(Default)]
    struct CountingFactory {
        synths_opened: AtomicUsize,
    }

    impl DeviceFactory for CountingFactory {
        fn open_synth(&self) -> Result<Synthesizer> {
            self.synths_opened.fetch_add(1, Ordering::SeqCst);
            NullDeviceFactory.open_synth()
        }

        fn open_sequencer(&self) -> Result<Sequencer> {
            Sequencer::open()
        }
    }

    struct FailingFactory;

    impl DeviceFactory for FailingFactory {
        fn open_synth(&self) -> Result<Synthesizer> {
            Err(Error::DeviceUnavailable("no MIDI support".to_string()))
        }

        fn open_sequencer(&self) -> Result<Sequencer> {
            Err(Error::DeviceUnavailable("no MIDI support".to_string()))
        }
    }

    #[test]
    fn test_acquire_from_empty_pool_opens_synchronously() {
        let pool = DevicePool::with_target(Arc::new(NullDeviceFactory), 2);
        let synth = pool.acquire_synth().unwrap();
        assert!(!synth.is_closed());
    }

    #[test]
    fn test_background_refill_tops_up_the_queue() {
        let factory = Arc::new(CountingFactory::default());
        let pool = DevicePool::with_target(Arc::clone(&factory) as Arc<dyn DeviceFactory>, 2);

        let _first = pool.acquire_synth().unwrap();
        // One synchronous open plus background refills up to the target.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while factory.synths_opened.load(Ordering::SeqCst) < 3
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(factory.synths_opened.load(Ordering::SeqCst) >= 3);

        // The next acquisition is served from the warm queue.
        let warm = pool.acquire_synth().unwrap();
        assert!(!warm.is_closed());
    }

    #[test]
    fn test_default_synth_bypasses_queue() {
        let pool = DevicePool::with_target(Arc::new(FailingFactory), 2);
        let default = Arc::new(Synthesizer::with_sink("default", Box::new(NullSink)));
        pool.set_default_synth(Arc::clone(&default));

        let acquired = pool.acquire_synth().unwrap();
        assert!(Arc::ptr_eq(&acquired, &default));
        assert!(pool.is_default_synth(&acquired));
    }

    #[test]
    fn test_dead_midi_subsystem_surfaces_immediately() {
        let pool = DevicePool::with_target(Arc::new(FailingFactory), 2);
        assert!(matches!(
            pool.acquire_synth().unwrap_err(),
            Error::DeviceUnavailable(_)
        ));
        assert!(matches!(
            pool.acquire_sequencer().unwrap_err(),
            Error::DeviceUnavailable(_)
        ));
    }

    #[test]
    fn test_sequencer_acquisition_is_usable() {
        let pool = DevicePool::with_target(Arc::new(NullDeviceFactory), 1);
        let sequencer = pool.acquire_sequencer().unwrap();
        assert!(!sequencer.is_running());
        sequencer.close();
    }
}
