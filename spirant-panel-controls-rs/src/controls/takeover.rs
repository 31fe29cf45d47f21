use super::channel::SampledChannel;
use super::config::PanelConfig;
use super::error::PanelError;
use super::range::ControlRange;
use super::settings::ControlSettings;
use super::smoothing::SmoothingFilter;

/// Whether a control follows its knob or holds a remembered value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockState {
    /// Frozen at the lock value; the knob is ignored.
    Locked,
    /// Holding the lock value until the knob passes through it.
    UnlockRequested,
    /// Following the knob, with hysteresis.
    Unlocked,
}

/// One logical control of one scene, layered over a shared channel.
///
/// Reading returns the remembered lock value until the physical position
/// has been brought back to it (soft takeover), after which the control
/// tracks the knob. While tracking, the value only changes once the smoothed
/// raw reading moves past a slice boundary by more than
/// `threshold × slice_width`, which keeps a knob resting on a boundary from
/// chattering between two values.
///
/// Only [`read()`](Self::read) and [`req_unlock()`](Self::req_unlock) move
/// `UnlockRequested` to `Unlocked`.
pub struct SoftTakeover<'a, C> {
    filter: SmoothingFilter<'a, C>,
    range: ControlRange,
    state: LockState,
    lock_value: u16,
    threshold: f32,
}

impl<'a, C: SampledChannel> SoftTakeover<'a, C> {
    /// Create a control holding `default_value` in state `initial`.
    ///
    /// Returns [`PanelError::ValueOutOfRange`] if `default_value` is not a
    /// valid value of `range`, or the error from [`PanelConfig::validate()`].
    pub fn new(
        channel: &'a C,
        range: ControlRange,
        default_value: u16,
        initial: LockState,
        config: &PanelConfig,
    ) -> Result<Self, PanelError> {
        config.validate()?;
        if !range.contains(default_value) {
            return Err(PanelError::ValueOutOfRange);
        }
        Ok(Self::assemble(channel, range, default_value, initial, config))
    }

    /// Constructor for callers that have already validated the arguments.
    pub(crate) fn assemble(
        channel: &'a C,
        range: ControlRange,
        default_value: u16,
        initial: LockState,
        config: &PanelConfig,
    ) -> Self {
        Self {
            filter: SmoothingFilter::with_window(channel, config.window_size),
            range,
            state: initial,
            lock_value: default_value,
            threshold: config.threshold,
        }
    }

    /// Take one sample into the smoothing window without resolving state.
    pub fn service(&mut self) {
        self.filter.service();
    }

    /// Sample the channel and return the control's current value.
    pub fn read(&mut self) -> u16 {
        self.filter.service();
        self.resolve()
    }

    /// Freeze the control at its current value.
    pub fn lock(&mut self) {
        self.state = LockState::Locked;
    }

    /// Ask a locked control to pick the knob back up.
    ///
    /// Has no effect unless the control is `Locked`. Otherwise the filter
    /// is cleared and one read is taken, so a knob already sitting on the
    /// lock value unlocks straight away. Returns the resulting state.
    pub fn req_unlock(&mut self) -> LockState {
        if self.state == LockState::Locked {
            self.rearm();
            self.read();
        }
        self.state
    }

    /// Jam a new lock value.
    ///
    /// A locked control stays locked; any other control waits for the knob
    /// to reach the new value. The filter is left untouched.
    pub fn set_lock_val(&mut self, value: u16) -> Result<(), PanelError> {
        if !self.range.contains(value) {
            return Err(PanelError::ValueOutOfRange);
        }
        self.lock_value = value;
        if self.state != LockState::Locked {
            self.state = LockState::UnlockRequested;
        }
        Ok(())
    }

    /// Adopt the current physical position as the lock value, bypassing
    /// hysteresis. Returns the adopted value.
    pub fn over_write(&mut self) -> u16 {
        self.filter.service();
        self.lock_value = self.measured();
        if self.state != LockState::Locked {
            self.state = LockState::UnlockRequested;
        }
        self.lock_value
    }

    /// Replace the control's range, carrying the lock value across.
    ///
    /// A value past the new top is scaled proportionally (see
    /// [`ControlRange::rescale()`]). A control that was not locked is
    /// re-armed against the new range.
    pub fn set_range(&mut self, range: ControlRange) {
        let prior = self.state;
        self.state = LockState::Locked;
        self.lock_value = range.rescale(self.lock_value, &self.range);
        self.range = range;
        if prior != LockState::Locked {
            self.req_unlock();
        }
    }

    /// Logical value of the current filter average, no sampling.
    pub fn measured(&self) -> u16 {
        self.range.to_logical(self.filter.read())
    }

    /// Snapshot of everything needed to recreate this control.
    pub fn settings(&self) -> ControlSettings {
        ControlSettings {
            lock_value: self.lock_value,
            raw_min: self.range.raw_min(),
            raw_max: self.range.raw_max(),
            num_values: self.range.num_values(),
            locked: self.state == LockState::Locked,
        }
    }

    /// Load a snapshot taken with [`settings()`](Self::settings).
    ///
    /// An unlocked snapshot comes back as `UnlockRequested` with a cleared
    /// filter, so the knob has to be brought to the stored value again.
    pub fn apply_settings(&mut self, settings: &ControlSettings) -> Result<(), PanelError> {
        self.range = settings.range()?;
        self.lock_value = settings.lock_value;
        if settings.locked {
            self.state = LockState::Locked;
        } else {
            self.rearm();
        }
        Ok(())
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn lock_value(&self) -> u16 {
        self.lock_value
    }

    pub fn range(&self) -> &ControlRange {
        &self.range
    }

    /// Returns `true` unless the control is following its knob.
    pub fn is_locked(&self) -> bool {
        self.state != LockState::Unlocked
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn filter(&self) -> &SmoothingFilter<'a, C> {
        &self.filter
    }

    fn rearm(&mut self) {
        self.state = LockState::UnlockRequested;
        self.filter.reset();
    }

    fn resolve(&mut self) -> u16 {
        let raw = self.filter.read();
        let current = self.range.to_logical(raw);
        match self.state {
            LockState::Locked => {}
            LockState::UnlockRequested => {
                if current == self.lock_value {
                    self.state = LockState::Unlocked;
                    #[cfg(feature = "defmt")]
                    defmt::debug!("control unlocked at {}", current);
                }
            }
            LockState::Unlocked => {
                if current != self.lock_value && self.cleared_boundary(raw, current) {
                    self.lock_value = current;
                }
            }
        }
        self.lock_value
    }

    /// Whether `raw` lies past the slice boundary between the lock value
    /// and `current` by more than the hysteresis margin.
    fn cleared_boundary(&self, raw: u16, current: u16) -> bool {
        let margin = self.threshold * self.range.slice_width();
        let overshoot = if current > self.lock_value {
            raw.saturating_sub(self.range.to_raw(self.lock_value + 1))
        } else {
            self.range.to_raw(self.lock_value).saturating_sub(raw)
        };
        f32::from(overshoot) > margin
    }
}

// ── Unit Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::LatchedChannel;

    /// 12-bit channel cut into 128 values: 32 raw counts per value.
    fn channel() -> LatchedChannel {
        LatchedChannel::new(0, 4095)
    }

    fn control(ch: &LatchedChannel, default_value: u16, initial: LockState) -> SoftTakeover<'_, LatchedChannel> {
        let config = PanelConfig {
            window_size: 1,
            ..PanelConfig::default()
        };
        let range = ControlRange::for_channel(ch, 128).unwrap();
        SoftTakeover::new(ch, range, default_value, initial, &config).unwrap()
    }

    // ── Construction ─────────────────────────────────────────────────

    #[test]
    fn default_must_fit_range() {
        let ch = channel();
        let range = ControlRange::for_channel(&ch, 128).unwrap();
        let result = SoftTakeover::new(&ch, range, 128, LockState::Locked, &PanelConfig::default());
        assert!(matches!(result, Err(PanelError::ValueOutOfRange)));
    }

    #[test]
    fn bad_config_rejected() {
        let ch = channel();
        let range = ControlRange::for_channel(&ch, 128).unwrap();
        let config = PanelConfig {
            threshold: 1.5,
            ..PanelConfig::default()
        };
        let result = SoftTakeover::new(&ch, range, 0, LockState::Locked, &config);
        assert!(matches!(result, Err(PanelError::InvalidThreshold)));
    }

    #[test]
    fn created_unlocked_follows_knob() {
        let ch = channel();
        let mut c = control(&ch, 0, LockState::Unlocked);
        ch.set(3216);
        assert_eq!(c.read(), 100);
        assert!(!c.is_locked());
    }

    // ── Locking ──────────────────────────────────────────────────────

    #[test]
    fn locked_ignores_knob_but_keeps_sampling() {
        let ch = channel();
        let mut c = control(&ch, 42, LockState::Locked);
        ch.set(4000);
        assert_eq!(c.read(), 42);
        assert_eq!(c.filter().count(), 1);
        assert_eq!(c.measured(), 125);
        assert!(c.is_locked());
    }

    #[test]
    fn unlock_on_exact_match_is_immediate() {
        let ch = channel();
        let mut c = control(&ch, 100, LockState::Locked);
        ch.set(3216);
        assert_eq!(c.req_unlock(), LockState::Unlocked);
        assert_eq!(c.read(), 100);

        ch.set(3300);
        assert_eq!(c.read(), 103);
    }

    #[test]
    fn unlock_waits_for_knob_to_reach_lock_value() {
        let ch = channel();
        let mut c = control(&ch, 100, LockState::Locked);
        ch.set(1616); // value 50
        assert_eq!(c.req_unlock(), LockState::UnlockRequested);
        assert_eq!(c.read(), 100);
        assert!(c.is_locked());

        ch.set(3216);
        assert_eq!(c.read(), 100);
        assert_eq!(c.state(), LockState::Unlocked);

        ch.set(1616);
        assert_eq!(c.read(), 50);
    }

    #[test]
    fn req_unlock_only_acts_on_locked() {
        let ch = channel();
        let mut c = control(&ch, 10, LockState::Unlocked);
        ch.set(2000);
        c.read();
        let before = c.filter().count();
        assert_eq!(c.req_unlock(), LockState::Unlocked);
        assert_eq!(c.filter().count(), before);
    }

    #[test]
    fn lock_freezes_tracking_value() {
        let ch = channel();
        let mut c = control(&ch, 0, LockState::Unlocked);
        ch.set(1616);
        assert_eq!(c.read(), 50);
        c.lock();
        ch.set(4000);
        assert_eq!(c.read(), 50);
        assert_eq!(c.state(), LockState::Locked);
    }

    // ── Hysteresis ───────────────────────────────────────────────────

    #[test]
    fn boundary_noise_does_not_chatter_upward() {
        let ch = channel();
        let mut c = control(&ch, 50, LockState::Unlocked);
        ch.set(1616);
        assert_eq!(c.read(), 50);

        // Value 51 starts at raw 1632; margin is 0.05 * 32 = 1.6 counts.
        ch.set(1633);
        assert_eq!(c.read(), 50);
        ch.set(1645);
        assert_eq!(c.read(), 51);
    }

    #[test]
    fn boundary_noise_does_not_chatter_downward() {
        let ch = channel();
        let mut c = control(&ch, 51, LockState::Unlocked);
        ch.set(1640);
        assert_eq!(c.read(), 51);

        ch.set(1631);
        assert_eq!(c.read(), 51);
        ch.set(1620);
        assert_eq!(c.read(), 50);
    }

    #[test]
    fn large_moves_jump_several_values() {
        let ch = channel();
        let mut c = control(&ch, 10, LockState::Unlocked);
        ch.set(336);
        assert_eq!(c.read(), 10);
        ch.set(4095);
        assert_eq!(c.read(), 127);
        ch.set(0);
        assert_eq!(c.read(), 0);
    }

    // ── Jamming ──────────────────────────────────────────────────────

    #[test]
    fn set_lock_val_keeps_locked_control_locked() {
        let ch = channel();
        let mut c = control(&ch, 0, LockState::Locked);
        c.set_lock_val(64).unwrap();
        assert_eq!(c.state(), LockState::Locked);
        assert_eq!(c.read(), 64);
    }

    #[test]
    fn set_lock_val_rearms_tracking_control() {
        let ch = channel();
        let mut c = control(&ch, 0, LockState::Unlocked);
        ch.set(1616);
        c.read();
        c.set_lock_val(64).unwrap();
        assert_eq!(c.state(), LockState::UnlockRequested);
        assert_eq!(c.filter().count(), 1);
        assert_eq!(c.read(), 64);
    }

    #[test]
    fn set_lock_val_out_of_range() {
        let ch = channel();
        let mut c = control(&ch, 5, LockState::Locked);
        assert_eq!(c.set_lock_val(128), Err(PanelError::ValueOutOfRange));
        assert_eq!(c.lock_value(), 5);
    }

    #[test]
    fn over_write_adopts_knob_position() {
        let ch = channel();
        let mut c = control(&ch, 100, LockState::Locked);
        ch.set(1616);
        assert_eq!(c.over_write(), 50);
        assert_eq!(c.state(), LockState::Locked);
        assert_eq!(c.read(), 50);
    }

    #[test]
    fn over_write_on_waiting_control_unlocks_next_read() {
        let ch = channel();
        let mut c = control(&ch, 100, LockState::UnlockRequested);
        ch.set(800);
        assert_eq!(c.over_write(), 25);
        assert_eq!(c.state(), LockState::UnlockRequested);
        assert_eq!(c.read(), 25);
        assert_eq!(c.state(), LockState::Unlocked);
    }

    // ── Range Changes ────────────────────────────────────────────────

    #[test]
    fn set_range_rescales_value_past_new_top() {
        let ch = channel();
        let mut c = control(&ch, 100, LockState::Locked);
        c.set_range(ControlRange::new(0, 4095, 64).unwrap());
        assert_eq!(c.lock_value(), 50);
        assert_eq!(c.range().num_values(), 64);
        assert_eq!(c.state(), LockState::Locked);
    }

    #[test]
    fn set_range_rearms_tracking_control() {
        let ch = channel();
        let mut c = control(&ch, 0, LockState::Unlocked);
        ch.set(3216);
        assert_eq!(c.read(), 100);

        // Same knob position now maps to 50 of 64: still a match.
        c.set_range(ControlRange::new(0, 4095, 64).unwrap());
        assert_eq!(c.lock_value(), 50);
        assert_eq!(c.state(), LockState::Unlocked);
    }

    // ── Settings ─────────────────────────────────────────────────────

    #[test]
    fn settings_round_trip_through_apply() {
        let ch = channel();
        let mut a = control(&ch, 77, LockState::Locked);
        a.set_range(ControlRange::new(100, 3000, 90).unwrap());
        let snapshot = a.settings();

        let mut b = control(&ch, 0, LockState::Locked);
        b.apply_settings(&snapshot).unwrap();
        assert_eq!(b.settings(), snapshot);
        assert_eq!(b.read(), 77);
    }

    #[test]
    fn unlocked_settings_come_back_waiting() {
        let ch = channel();
        let mut c = control(&ch, 0, LockState::Locked);
        ch.set(2000);
        c.read();
        let snapshot = ControlSettings {
            lock_value: 12,
            raw_min: 0,
            raw_max: 4095,
            num_values: 128,
            locked: false,
        };
        c.apply_settings(&snapshot).unwrap();
        assert_eq!(c.state(), LockState::UnlockRequested);
        assert_eq!(c.filter().count(), 0);
    }

    #[test]
    fn invalid_settings_leave_control_untouched() {
        let ch = channel();
        let mut c = control(&ch, 9, LockState::Locked);
        let bad = ControlSettings {
            lock_value: 200,
            raw_min: 0,
            raw_max: 4095,
            num_values: 128,
            locked: true,
        };
        assert_eq!(c.apply_settings(&bad), Err(PanelError::ValueOutOfRange));
        assert_eq!(c.lock_value(), 9);
    }
}
