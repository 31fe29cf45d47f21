use super::channel::SampledChannel;
use super::error::PanelError;

/// Affine map between a channel's raw domain and a control's logical values.
///
/// The raw span `[raw_min, raw_max]` is cut into `num_values` equal slices;
/// logical value `v` owns the raw slice starting at [`to_raw(v)`](Self::to_raw).
/// Both directions use truncating integer division, so the map is
/// monotonic but a round trip may land one value low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlRange {
    raw_min: u16,
    raw_max: u16,
    num_values: u16,
}

impl ControlRange {
    /// Create a range covering `[raw_min, raw_max]` with `num_values`
    /// logical values.
    ///
    /// Returns [`PanelError::EmptyRange`] if `num_values == 0` and
    /// [`PanelError::InvalidRawBounds`] if `raw_max < raw_min`.
    pub fn new(raw_min: u16, raw_max: u16, num_values: u16) -> Result<Self, PanelError> {
        if num_values == 0 {
            return Err(PanelError::EmptyRange);
        }
        if raw_max < raw_min {
            return Err(PanelError::InvalidRawBounds);
        }
        Ok(Self {
            raw_min,
            raw_max,
            num_values,
        })
    }

    /// Range spanning the full raw bounds reported by `channel`.
    pub fn for_channel<C: SampledChannel>(channel: &C, num_values: u16) -> Result<Self, PanelError> {
        Self::new(channel.min(), channel.max(), num_values)
    }

    /// Lowest raw value of the range.
    pub fn raw_min(&self) -> u16 {
        self.raw_min
    }

    /// Highest raw value of the range.
    pub fn raw_max(&self) -> u16 {
        self.raw_max
    }

    /// Number of logical values; valid values are `0..num_values`.
    pub fn num_values(&self) -> u16 {
        self.num_values
    }

    /// Number of raw counts covered, `raw_max - raw_min + 1`.
    pub fn span(&self) -> u32 {
        u32::from(self.raw_max - self.raw_min) + 1
    }

    /// Width of one logical value in raw counts (may be fractional).
    pub fn slice_width(&self) -> f32 {
        self.span() as f32 / f32::from(self.num_values)
    }

    /// Returns `true` if `value` is a valid logical value for this range.
    pub fn contains(&self, value: u16) -> bool {
        value < self.num_values
    }

    /// Logical value for a raw sample.
    ///
    /// `floor((raw - raw_min) * num_values / span)`. Samples outside the raw
    /// bounds are clamped first, so the result is always `< num_values`.
    pub fn to_logical(&self, raw: u16) -> u16 {
        let offset = u32::from(raw.clamp(self.raw_min, self.raw_max) - self.raw_min);
        (offset * u32::from(self.num_values) / self.span()) as u16
    }

    /// First raw value of the slice belonging to `value`.
    ///
    /// `floor(value * span / num_values) + raw_min`. Values past the top of
    /// the range are treated as the top value.
    pub fn to_raw(&self, value: u16) -> u16 {
        let value = u32::from(value.min(self.num_values - 1));
        (value * self.span() / u32::from(self.num_values)) as u16 + self.raw_min
    }

    /// Carry `value` from `previous` into this range.
    ///
    /// Values that still fit are kept as they are; values past the new top
    /// are scaled proportionally so they keep their relative position.
    pub fn rescale(&self, value: u16, previous: &ControlRange) -> u16 {
        if self.contains(value) {
            return value;
        }
        let scaled = u32::from(value) * u32::from(self.num_values) / u32::from(previous.num_values);
        scaled.min(u32::from(self.num_values - 1)) as u16
    }
}

impl Default for ControlRange {
    /// A single value spanning the whole `u16` raw domain.
    fn default() -> Self {
        Self {
            raw_min: 0,
            raw_max: u16::MAX,
            num_values: 1,
        }
    }
}

// ── Unit Tests ───────────────────────────────────────────────────────────
