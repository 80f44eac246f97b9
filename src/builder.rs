//! PlayerBuilder for configuring the playback controller.

use crate::context::AudioBackend;
use crate::Player;
use segno_core::Division;
use segno_midi_io::{DeviceFactory, DevicePool, MidirDeviceFactory, POOL_TARGET};
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for [`Player`].
///
/// # Example
///
/// ```ignore
/// use segno::prelude::*;
/// use std::sync::Arc;
///
/// let player = Player::builder()
///     .device_factory(Arc::new(NullDeviceFactory))
///     .pool_target(2)
///     .build();
/// ```
pub struct PlayerBuilder {
    factory: Option<Arc<dyn DeviceFactory>>,
    division: Division,
    pool_target: usize,
    backends: HashMap<String, Arc<dyn AudioBackend>>,
}

impl Default for PlayerBuilder {
    fn default() -> Self {
        Self {
            factory: None,
            division: Division::default(),
            pool_target: POOL_TARGET,
            backends: HashMap::new(),
        }
    }
}

impl PlayerBuilder {
    /// Inject the device factory (default: real `midir` devices on the
    /// first available output port).
    pub fn device_factory(mut self, factory: Arc<dyn DeviceFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Set the MIDI division (default: PPQ at 128 ticks per quarter).
    pub fn division(mut self, division: Division) -> Self {
        self.division = division;
        self
    }

    /// How many devices of each kind the pool keeps warm (default: 4).
    pub fn pool_target(mut self, target: usize) -> Self {
        self.pool_target = target;
        self
    }

    /// Register an audio back-end for a custom audio-type tag.
    pub fn backend(
        mut self,
        audio_type: impl Into<String>,
        backend: Arc<dyn AudioBackend>,
    ) -> Self {
        self.backends.insert(audio_type.into(), backend);
        self
    }

    pub fn build(self) -> Player {
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(MidirDeviceFactory::default()));
        let pool = DevicePool::with_target(factory, self.pool_target);
        Player::from_parts(pool, self.backends, self.division)
    }
}
