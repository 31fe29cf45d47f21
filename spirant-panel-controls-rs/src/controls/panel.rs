//! Panel: every physical control with all of its scenes.

use core::cell::Cell;

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use heapless::Vec;

use super::bank::ControlBank;
use super::channel::SampledChannel;
use super::config::{ControlSetup, PanelConfig};
use super::error::PanelError;
use super::range::ControlRange;
use super::settings::ControlSettings;
use super::takeover::LockState;

/// Try to lock `mutex`, yielding between attempts, at most `patience`
/// extra times.
async fn acquire<M: RawMutex, T>(mutex: &Mutex<M, T>, patience: u8) -> Result<MutexGuard<'_, M, T>, PanelError> {
    let mut attempts = 0;
    loop {
        if let Ok(guard) = mutex.try_lock() {
            return Ok(guard);
        }
        if attempts >= patience {
            return Err(PanelError::Busy);
        }
        attempts += 1;
        yield_now().await;
    }
}

/// Scene, mapping and the last values seen per control (storage order).
struct PanelState<const CONTROLS: usize> {
    scene: usize,
    mapping: Option<[usize; CONTROLS]>,
    values: [u16; CONTROLS],
    locks: [bool; CONTROLS],
}

impl<const CONTROLS: usize> PanelState<CONTROLS> {
    /// Storage slot for an external control index.
    fn slot(&self, idx: usize) -> Result<usize, PanelError> {
        if idx >= CONTROLS {
            return Err(PanelError::InvalidControlIndex);
        }
        Ok(self.storage(idx))
    }

    /// Storage slot for an external index already known to be in bounds.
    fn storage(&self, idx: usize) -> usize {
        self.mapping.as_ref().map_or(idx, |table| table[idx])
    }
}

/// Every physical control of the instrument and all of its scenes.
///
/// `CONTROLS` physical controls, each with `SCENES` independent logical
/// values. The application addresses controls by external index, which
/// goes through the optional position mapping to a storage slot.
///
/// # Locking
///
/// Each [`ControlBank`] sits in its own async mutex and the panel-wide
/// state (current scene, position mapping, value cache) in one more. Locks
/// are taken with [`try_lock`](Mutex::try_lock) retried up to
/// [`PanelConfig::patience`] times, one scheduler yield apart; past that
/// the operation reports [`PanelError::Busy`] instead of waiting.
///
/// Panel state is always locked before any bank, and banks in storage
/// order. [`Panel::service()`] takes bank locks only, one at a time, so it
/// never waits on the application side for longer than one bank access.
/// Scene-wide operations lock every bank before changing any of them: a
/// busy bank aborts the whole operation and no half-switched scene is
/// ever visible.
///
/// [`Panel::read()`] and [`Panel::is_locked()`] answer from a per-control
/// cache held in the panel state and never wait on a bank.
/// [`Panel::sample()`], [`Panel::read_all()`] and every operation that
/// changes a control refresh that cache.
///
/// # Examples
///
/// ```ignore
/// use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
/// use spirant_panel::controls::{LatchedChannel, Panel, PanelConfig};
///
/// static FADERS: [LatchedChannel; 8] = [const { LatchedChannel::new(0, 4095) }; 8];
///
/// let panel: Panel<'static, CriticalSectionRawMutex, LatchedChannel, 8, 4> =
///     Panel::uniform(PanelConfig::default(), FADERS.each_ref(), 128, 0)?;
///
/// // Periodic context:
/// panel.service().await?;
///
/// // Application context:
/// let value = panel.sample(3).await?;
/// panel.select_scene(1).await?;
/// ```
pub struct Panel<'a, M: RawMutex, C, const CONTROLS: usize, const SCENES: usize> {
    banks: [Mutex<M, ControlBank<'a, C, SCENES>>; CONTROLS],
    state: Mutex<M, PanelState<CONTROLS>>,
    config: PanelConfig,
    busy_events: BlockingMutex<M, Cell<u32>>,
}

impl<'a, M, C, const CONTROLS: usize, const SCENES: usize> Panel<'a, M, C, CONTROLS, SCENES>
where
    M: RawMutex,
    C: SampledChannel,
{
    /// Build a panel from one [`ControlSetup`] per physical control.
    ///
    /// # Errors
    ///
    /// * [`PanelError::EmptyPanel`] if `CONTROLS` or `SCENES` is zero.
    /// * Anything [`PanelConfig::validate()`] rejects.
    /// * [`PanelError::EmptyRange`] / [`PanelError::InvalidRawBounds`] for a
    ///   control whose channel bounds or value count are unusable.
    /// * [`PanelError::ValueOutOfRange`] for a default past `num_values`.
    pub fn new(config: PanelConfig, setups: [ControlSetup<'a, C>; CONTROLS]) -> Result<Self, PanelError> {
        if CONTROLS == 0 || SCENES == 0 {
            return Err(PanelError::EmptyPanel);
        }
        config.validate()?;

        let mut ranges = [ControlRange::default(); CONTROLS];
        for (range, setup) in ranges.iter_mut().zip(&setups) {
            *range = ControlRange::for_channel(setup.channel, setup.num_values)?;
            if !range.contains(setup.default_value) {
                return Err(PanelError::ValueOutOfRange);
            }
        }

        let banks: [ControlBank<'a, C, SCENES>; CONTROLS] = core::array::from_fn(|slot| {
            let setup = &setups[slot];
            ControlBank::assemble(setup.channel, ranges[slot], setup.default_value, &config)
        });
        let state = PanelState {
            scene: 0,
            mapping: None,
            values: core::array::from_fn(|slot| banks[slot].active_mode().lock_value()),
            locks: core::array::from_fn(|slot| banks[slot].is_locked()),
        };

        Ok(Self {
            banks: banks.map(Mutex::new),
            state: Mutex::new(state),
            config,
            busy_events: BlockingMutex::new(Cell::new(0)),
        })
    }

    /// Build a panel where every control has the same resolution and
    /// default value.
    pub fn uniform(
        config: PanelConfig,
        channels: [&'a C; CONTROLS],
        num_values: u16,
        default_value: u16,
    ) -> Result<Self, PanelError> {
        let setups = channels.map(|channel| ControlSetup {
            channel,
            num_values,
            default_value,
        });
        Self::new(config, setups)
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn num_controls(&self) -> usize {
        CONTROLS
    }

    pub fn num_scenes(&self) -> usize {
        SCENES
    }

    /// Number of lock acquisitions that ran out of patience so far.
    pub fn busy_events(&self) -> u32 {
        self.busy_events.lock(|count| count.get())
    }

    /// Remember what `bank`'s active scene reports in the value cache.
    fn record(state: &mut PanelState<CONTROLS>, slot: usize, bank: &ControlBank<'a, C, SCENES>) {
        state.values[slot] = bank.active_mode().lock_value();
        state.locks[slot] = bank.is_locked();
    }

    // ── Locking helpers ──────────────────────────────────────────────

    async fn lock<'m, T>(&self, mutex: &'m Mutex<M, T>) -> Result<MutexGuard<'m, M, T>, PanelError> {
        let result = acquire(mutex, self.config.patience).await;
        if result.is_err() {
            self.busy_events.lock(|count| count.set(count.get().wrapping_add(1)));
        }
        result
    }

    async fn lock_panel(&self) -> Result<MutexGuard<'_, M, PanelState<CONTROLS>>, PanelError> {
        let guard = self.lock(&self.state).await;
        if guard.is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("panel state busy");
        }
        guard
    }

    /// Lock every bank in storage order, or none of them.
    async fn lock_banks(&self) -> Result<Vec<MutexGuard<'_, M, ControlBank<'a, C, SCENES>>, CONTROLS>, PanelError> {
        let mut guards = Vec::new();
        for (_slot, bank) in self.banks.iter().enumerate() {
            match self.lock(bank).await {
                // Capacity is CONTROLS, one guard per bank.
                Ok(guard) => {
                    let _ = guards.push(guard);
                }
                Err(e) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("bank {} busy, scene operation aborted", _slot);
                    return Err(e);
                }
            }
        }
        Ok(guards)
    }

    // ── Position mapping ─────────────────────────────────────────────

    /// Address controls through `table`: external index `i` refers to
    /// storage slot `table[i]`.
    ///
    /// Returns [`PanelError::InvalidMapping`] unless `table` is a
    /// permutation of `0..CONTROLS`.
    pub async fn set_position_mapping(&self, table: &[usize; CONTROLS]) -> Result<(), PanelError> {
        let mut seen = [false; CONTROLS];
        for &slot in table {
            if slot >= CONTROLS || seen[slot] {
                return Err(PanelError::InvalidMapping);
            }
            seen[slot] = true;
        }
        self.lock_panel().await?.mapping = Some(*table);
        Ok(())
    }

    /// Go back to addressing controls in storage order.
    pub async fn clear_position_mapping(&self) -> Result<(), PanelError> {
        self.lock_panel().await?.mapping = None;
        Ok(())
    }

    // ── Sampling ─────────────────────────────────────────────────────

    /// Take one sample on every control's active scene.
    ///
    /// Call once per tick from the periodic context. A bank that stays busy
    /// is skipped for this tick; the others are still serviced and the call
    /// returns [`PanelError::Busy`].
    pub async fn service(&self) -> Result<(), PanelError> {
        let mut skipped = false;
        for (_slot, bank) in self.banks.iter().enumerate() {
            match self.lock(bank).await {
                Ok(mut bank) => bank.service(),
                Err(_) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("service skipped busy bank {}", _slot);
                    skipped = true;
                }
            }
        }
        if skipped {
            Err(PanelError::Busy)
        } else {
            Ok(())
        }
    }

    // ── Reading ──────────────────────────────────────────────────────

    /// Last value seen for control `idx`.
    ///
    /// Served from the cache that [`read_all()`](Self::read_all),
    /// [`sample()`](Self::sample) and the scene and calibration operations
    /// keep up to date. Never touches a bank lock.
    pub async fn read(&self, idx: usize) -> Result<u16, PanelError> {
        let state = self.lock_panel().await?;
        let slot = state.slot(idx)?;
        Ok(state.values[slot])
    }

    /// Whether control `idx` is holding a value rather than following its
    /// knob, as of the last cache update. Never touches a bank lock.
    pub async fn is_locked(&self, idx: usize) -> Result<bool, PanelError> {
        let state = self.lock_panel().await?;
        let slot = state.slot(idx)?;
        Ok(state.locks[slot])
    }

    /// Sample control `idx` now and return its value, updating the cache.
    ///
    /// If the control's bank is busy the last value seen is returned
    /// instead. Fails with [`PanelError::Busy`] only when the panel state
    /// itself cannot be locked.
    pub async fn sample(&self, idx: usize) -> Result<u16, PanelError> {
        let mut state = self.lock_panel().await?;
        let slot = state.slot(idx)?;
        match self.lock(&self.banks[slot]).await {
            Ok(mut bank) => {
                let value = bank.read();
                Self::record(&mut state, slot, &bank);
                Ok(value)
            }
            Err(_) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("control {} busy, serving cached value", idx);
                Ok(state.values[slot])
            }
        }
    }

    /// Lock state of control `idx`'s active scene.
    pub async fn lock_state(&self, idx: usize) -> Result<LockState, PanelError> {
        let state = self.lock_panel().await?;
        let slot = state.slot(idx)?;
        let bank = self.lock(&self.banks[slot]).await?;
        Ok(bank.lock_state())
    }

    /// Last value and lock flag seen for control `idx`, without touching
    /// its bank.
    pub async fn peek(&self, idx: usize) -> Result<(u16, bool), PanelError> {
        let state = self.lock_panel().await?;
        let slot = state.slot(idx)?;
        Ok((state.values[slot], state.locks[slot]))
    }

    /// Read every control into `values` / `locks`, in external order.
    ///
    /// Runs under one panel-state lock. Busy banks contribute their cached
    /// value and flag.
    pub async fn read_all(&self, values: &mut [u16; CONTROLS], locks: &mut [bool; CONTROLS]) -> Result<(), PanelError> {
        let mut state = self.lock_panel().await?;
        for (slot, bank) in self.banks.iter().enumerate() {
            if let Ok(mut bank) = self.lock(bank).await {
                bank.read();
                Self::record(&mut state, slot, &bank);
            }
        }
        for (idx, (value, locked)) in values.iter_mut().zip(locks.iter_mut()).enumerate() {
            let slot = state.storage(idx);
            *value = state.values[slot];
            *locked = state.locks[slot];
        }
        Ok(())
    }

    // ── Scenes ───────────────────────────────────────────────────────

    pub async fn current_scene(&self) -> Result<usize, PanelError> {
        Ok(self.lock_panel().await?.scene)
    }

    /// Switch every control to `scene`.
    ///
    /// Each control's outgoing scene is locked at its current value and
    /// the incoming one is asked to unlock, so it follows the knob again
    /// only once the knob matches the value stored for that scene.
    pub async fn select_scene(&self, scene: usize) -> Result<(), PanelError> {
        if scene >= SCENES {
            return Err(PanelError::InvalidSceneIndex);
        }
        let mut state = self.lock_panel().await?;
        self.switch_scene(&mut state, scene).await
    }

    /// Re-apply the current scene, e.g. after calibration.
    pub async fn save_scene(&self) -> Result<(), PanelError> {
        let mut state = self.lock_panel().await?;
        let scene = state.scene;
        self.switch_scene(&mut state, scene).await
    }

    async fn switch_scene(&self, state: &mut PanelState<CONTROLS>, scene: usize) -> Result<(), PanelError> {
        let mut banks = self.lock_banks().await?;
        for (slot, bank) in banks.iter_mut().enumerate() {
            bank.select_mode(scene, true)?;
            Self::record(state, slot, bank);
        }
        state.scene = scene;
        #[cfg(feature = "defmt")]
        defmt::debug!("scene {} selected", scene);
        Ok(())
    }

    /// Copy every control's settings from scene `source` into scene `dest`.
    ///
    /// With `source` set to the current scene this saves the live knob
    /// positions into `dest`.
    pub async fn copy_scene(&self, dest: usize, source: usize) -> Result<(), PanelError> {
        if dest >= SCENES || source >= SCENES {
            return Err(PanelError::InvalidSceneIndex);
        }
        let mut state = self.lock_panel().await?;
        let mut banks = self.lock_banks().await?;
        for (slot, bank) in banks.iter_mut().enumerate() {
            bank.copy_settings(dest, source)?;
            if dest == state.scene {
                Self::record(&mut state, slot, bank);
            }
        }
        Ok(())
    }

    /// Settings of every control in `scene`, in external order, for an
    /// external scene store.
    pub async fn scene_snapshot(&self, scene: usize) -> Result<[ControlSettings; CONTROLS], PanelError> {
        if scene >= SCENES {
            return Err(PanelError::InvalidSceneIndex);
        }
        let state = self.lock_panel().await?;
        let banks = self.lock_banks().await?;
        Ok(core::array::from_fn(|idx| {
            banks[state.storage(idx)].modes()[scene].settings()
        }))
    }

    /// Load settings taken with [`scene_snapshot()`](Self::scene_snapshot)
    /// into `scene`.
    ///
    /// Every record is validated before anything changes.
    pub async fn restore_scene(&self, scene: usize, settings: &[ControlSettings; CONTROLS]) -> Result<(), PanelError> {
        if scene >= SCENES {
            return Err(PanelError::InvalidSceneIndex);
        }
        for entry in settings {
            entry.range()?;
        }
        let mut state = self.lock_panel().await?;
        let mut banks = self.lock_banks().await?;
        for (idx, entry) in settings.iter().enumerate() {
            let slot = state.slot(idx)?;
            let bank = &mut banks[slot];
            bank.mode_mut(scene)?.apply_settings(entry)?;
            if scene == state.scene {
                Self::record(&mut state, slot, bank);
            }
        }
        Ok(())
    }

    // ── Calibration & setup ──────────────────────────────────────────

    /// Ask control `idx`, or every control when `None`, to pick its knob
    /// back up.
    pub async fn req_unlock(&self, idx: Option<usize>) -> Result<(), PanelError> {
        let mut state = self.lock_panel().await?;
        match idx {
            Some(idx) => {
                let slot = state.slot(idx)?;
                let mut bank = self.lock(&self.banks[slot]).await?;
                bank.active_mode_mut().req_unlock();
                Self::record(&mut state, slot, &bank);
            }
            None => {
                let mut banks = self.lock_banks().await?;
                for (slot, bank) in banks.iter_mut().enumerate() {
                    bank.active_mode_mut().req_unlock();
                    Self::record(&mut state, slot, bank);
                }
            }
        }
        Ok(())
    }

    /// Jam `value` into control `idx`'s active scene.
    pub async fn set_lock_val(&self, idx: usize, value: u16) -> Result<(), PanelError> {
        let mut state = self.lock_panel().await?;
        let slot = state.slot(idx)?;
        let mut bank = self.lock(&self.banks[slot]).await?;
        bank.active_mode_mut().set_lock_val(value)?;
        Self::record(&mut state, slot, &bank);
        Ok(())
    }

    /// Take control `idx`'s knob position as its value. Returns the value.
    pub async fn over_write(&self, idx: usize) -> Result<u16, PanelError> {
        let mut state = self.lock_panel().await?;
        let slot = state.slot(idx)?;
        let mut bank = self.lock(&self.banks[slot]).await?;
        let value = bank.set_defaults();
        Self::record(&mut state, slot, &bank);
        Ok(value)
    }

    /// Take every knob's position as its control's value.
    pub async fn set_defaults(&self) -> Result<(), PanelError> {
        let mut state = self.lock_panel().await?;
        let mut banks = self.lock_banks().await?;
        for (slot, bank) in banks.iter_mut().enumerate() {
            bank.set_defaults();
            Self::record(&mut state, slot, bank);
        }
        Ok(())
    }

    /// Change the raw bounds of control `idx`'s active scene, keeping its
    /// number of values.
    pub async fn set_range(&self, idx: usize, raw_min: u16, raw_max: u16) -> Result<(), PanelError> {
        self.update_range(idx, |current| ControlRange::new(raw_min, raw_max, current.num_values()))
            .await
    }

    /// Change the number of values of control `idx`'s active scene. The
    /// held value is rescaled if it no longer fits.
    pub async fn set_num_values(&self, idx: usize, num_values: u16) -> Result<(), PanelError> {
        self.update_range(idx, |current| {
            ControlRange::new(current.raw_min(), current.raw_max(), num_values)
        })
        .await
    }

    async fn update_range<F>(&self, idx: usize, build: F) -> Result<(), PanelError>
    where
        F: FnOnce(&ControlRange) -> Result<ControlRange, PanelError>,
    {
        let mut state = self.lock_panel().await?;
        let slot = state.slot(idx)?;
        let mut bank = self.lock(&self.banks[slot]).await?;
        let range = build(bank.active_mode().range())?;
        bank.active_mode_mut().set_range(range);
        Self::record(&mut state, slot, &bank);
        Ok(())
    }
}

// ── Unit Tests ───────────────────────────────────────────────────────────
