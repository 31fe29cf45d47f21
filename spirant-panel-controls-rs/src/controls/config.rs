use super::channel::SampledChannel;
use super::error::PanelError;
use super::{DEFAULT_PATIENCE, DEFAULT_SERVICE_HZ, DEFAULT_THRESHOLD, DEFAULT_WINDOW, MAX_WINDOW};

// ── PanelConfig ──────────────────────────────────────────────────────────

/// Tuning shared by every control on a panel.
///
/// [`PanelConfig::default()`] suits 12-bit faders: a
/// 100-sample window serviced at 1 kHz and a 5 % hysteresis margin.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanelConfig {
    /// Moving-average window in samples. Default: 100. Max: 128.
    pub window_size: usize,
    /// Fraction of one value's raw slice the average must move past a
    /// slice boundary before an unlocked control changes value.
    /// The margin is `threshold × slice_width` raw counts, so it shrinks as
    /// `num_values` grows; it is not a fraction of the whole raw span.
    /// Default: 0.05.
    pub threshold: f32,
    /// Extra `try_lock` attempts (one scheduler yield apart) before an
    /// operation gives up with [`PanelError::Busy`]. Default: 4.
    pub patience: u8,
    /// Whether scene 0 tracks its knobs immediately after construction.
    /// When `false` every control starts locked at its default value.
    /// Default: `true`.
    pub start_unlocked: bool,
    /// Rate at which the periodic driver services the panel. Default: 1000.
    pub service_frequency_hz: u32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW,
            threshold: DEFAULT_THRESHOLD,
            patience: DEFAULT_PATIENCE,
            start_unlocked: true,
            service_frequency_hz: DEFAULT_SERVICE_HZ,
        }
    }
}

impl PanelConfig {
    /// Check the values a panel cannot work with.
    ///
    /// Returns [`PanelError::InvalidWindow`] for a window outside
    /// `1..=MAX_WINDOW` and [`PanelError::InvalidThreshold`] for a threshold
    /// that is not a finite fraction in `[0, 1)`.
    pub fn validate(&self) -> Result<(), PanelError> {
        if self.window_size == 0 || self.window_size > MAX_WINDOW {
            return Err(PanelError::InvalidWindow);
        }
        if !self.threshold.is_finite() || !(0.0..1.0).contains(&self.threshold) {
            return Err(PanelError::InvalidThreshold);
        }
        Ok(())
    }

    /// Convert the service frequency to a ticker period in microseconds.
    ///
    /// Formula: `1_000_000 / service_frequency_hz`, with 0 Hz treated as 1 Hz.
    pub fn service_period_us(&self) -> u64 {
        1_000_000 / u64::from(self.service_frequency_hz.max(1))
    }
}

// ── ControlSetup ─────────────────────────────────────────────────────────

/// Per-control attachment used when building a [`Panel`](super::Panel).
///
/// Every scene of the control shares `channel` and starts with the
/// channel's full raw span cut into `num_values` logical values, holding
/// `default_value`.
pub struct ControlSetup<'a, C> {
    /// Physical input for this control.
    pub channel: &'a C,
    /// Number of logical values the control reports (`0..num_values`).
    pub num_values: u16,
    /// Value every scene starts with.
    pub default_value: u16,
}

impl<C> Clone for ControlSetup<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ControlSetup<'_, C> {}

impl<'a, C: SampledChannel> ControlSetup<'a, C> {
    /// Attach `channel` with `num_values` logical values, defaulting to 0.
    pub fn new(channel: &'a C, num_values: u16) -> Self {
        Self {
            channel,
            num_values,
            default_value: 0,
        }
    }

    /// Same setup with a different starting value.
    pub fn with_default(self, default_value: u16) -> Self {
        Self { default_value, ..self }
    }
}
