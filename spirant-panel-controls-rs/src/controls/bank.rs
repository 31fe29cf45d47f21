use super::channel::SampledChannel;
use super::config::PanelConfig;
use super::error::PanelError;
use super::range::ControlRange;
use super::takeover::{LockState, SoftTakeover};

/// All scenes of one physical fader.
///
/// Holds one [`SoftTakeover`] per scene, every one wrapping the same
/// channel with its own smoothing window. Exactly one mode is active;
/// [`read()`](Self::read) and [`service()`](Self::service) act on it, and
/// the inactive modes keep their lock state and value untouched.
///
/// Mode 0 starts unlocked when [`PanelConfig::start_unlocked`] is set;
/// every other mode starts locked at the default value.
pub struct ControlBank<'a, C, const SCENES: usize> {
    modes: [SoftTakeover<'a, C>; SCENES],
    active: usize,
}

impl<'a, C: SampledChannel, const SCENES: usize> ControlBank<'a, C, SCENES> {
    /// Create a bank over `channel` with `num_values` logical values per
    /// scene, all holding `default_value`.
    pub fn new(
        channel: &'a C,
        num_values: u16,
        default_value: u16,
        config: &PanelConfig,
    ) -> Result<Self, PanelError> {
        if SCENES == 0 {
            return Err(PanelError::EmptyPanel);
        }
        config.validate()?;
        let range = ControlRange::for_channel(channel, num_values)?;
        if !range.contains(default_value) {
            return Err(PanelError::ValueOutOfRange);
        }
        Ok(Self::assemble(channel, range, default_value, config))
    }

    /// Constructor for callers that have already validated the arguments.
    pub(crate) fn assemble(
        channel: &'a C,
        range: ControlRange,
        default_value: u16,
        config: &PanelConfig,
    ) -> Self {
        let modes = core::array::from_fn(|scene| {
            let initial = if scene == 0 && config.start_unlocked {
                LockState::Unlocked
            } else {
                LockState::Locked
            };
            SoftTakeover::assemble(channel, range, default_value, initial, config)
        });
        Self { modes, active: 0 }
    }

    /// Sample the active mode and return its value.
    pub fn read(&mut self) -> u16 {
        self.modes[self.active].read()
    }

    /// Take one sample into the active mode's window.
    pub fn service(&mut self) {
        self.modes[self.active].service();
    }

    /// Make `target` the active mode.
    ///
    /// The outgoing mode is locked at its current value. With
    /// `request_unlock` the incoming mode is re-locked and asked to unlock,
    /// so it starts from a clean window and follows the knob only once the
    /// knob matches its remembered value.
    pub fn select_mode(&mut self, target: usize, request_unlock: bool) -> Result<(), PanelError> {
        if target >= SCENES {
            return Err(PanelError::InvalidSceneIndex);
        }
        self.modes[self.active].lock();
        self.active = target;
        if request_unlock {
            let mode = &mut self.modes[target];
            mode.lock();
            mode.req_unlock();
        }
        Ok(())
    }

    /// Copy lock value, range and locked intent from mode `source` into
    /// mode `dest`. Copying a mode onto itself does nothing.
    pub fn copy_settings(&mut self, dest: usize, source: usize) -> Result<(), PanelError> {
        if dest >= SCENES || source >= SCENES {
            return Err(PanelError::InvalidSceneIndex);
        }
        if dest == source {
            return Ok(());
        }
        let settings = self.modes[source].settings();
        self.modes[dest].apply_settings(&settings)
    }

    /// Take the knob's present position as the active mode's value.
    pub fn set_defaults(&mut self) -> u16 {
        self.modes[self.active].over_write()
    }

    pub fn is_locked(&self) -> bool {
        self.modes[self.active].is_locked()
    }

    pub fn lock_state(&self) -> LockState {
        self.modes[self.active].state()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_mode(&self) -> &SoftTakeover<'a, C> {
        &self.modes[self.active]
    }

    pub fn active_mode_mut(&mut self) -> &mut SoftTakeover<'a, C> {
        &mut self.modes[self.active]
    }

    pub fn mode(&self, scene: usize) -> Result<&SoftTakeover<'a, C>, PanelError> {
        self.modes.get(scene).ok_or(PanelError::InvalidSceneIndex)
    }

    pub fn mode_mut(&mut self, scene: usize) -> Result<&mut SoftTakeover<'a, C>, PanelError> {
        self.modes.get_mut(scene).ok_or(PanelError::InvalidSceneIndex)
    }

    /// Every mode, in scene order.
    pub fn modes(&self) -> &[SoftTakeover<'a, C>] {
        &self.modes
    }
}

// ── Unit Tests ───────────────────────────────────────────────────────────
