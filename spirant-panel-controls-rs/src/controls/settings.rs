use super::error::PanelError;
use super::range::ControlRange;

/// Everything needed to recreate one control of one scene.
///
/// This is the record an external scene store persists per control per
/// scene, and what [`ControlBank::copy_settings()`](super::ControlBank::copy_settings)
/// moves between scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlSettings {
    /// Remembered logical value.
    pub lock_value: u16,
    /// Lowest raw value of the control's range.
    pub raw_min: u16,
    /// Highest raw value of the control's range.
    pub raw_max: u16,
    /// Number of logical values.
    pub num_values: u16,
    /// `true` if the control should stay frozen, `false` if it should
    /// pick the knob back up once it matches `lock_value`.
    pub locked: bool,
}

impl ControlSettings {
    /// Validate the record and return its range.
    ///
    /// Fails with the same errors as [`ControlRange::new()`], or
    /// [`PanelError::ValueOutOfRange`] if `lock_value` does not fit.
    pub fn range(&self) -> Result<ControlRange, PanelError> {
        let range = ControlRange::new(self.raw_min, self.raw_max, self.num_values)?;
        if !range.contains(self.lock_value) {
            return Err(PanelError::ValueOutOfRange);
        }
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(lock_value: u16, num_values: u16) -> ControlSettings {
        ControlSettings {
            lock_value,
            raw_min: 0,
            raw_max: 4095,
            num_values,
            locked: true,
        }
    }

    #[test]
    fn valid_settings_yield_range() {
        let range = settings(127, 128).range().unwrap();
        assert_eq!(range.num_values(), 128);
        assert_eq!(range.raw_max(), 4095);
    }

    #[test]
    fn lock_value_must_fit() {
        assert_eq!(settings(128, 128).range(), Err(PanelError::ValueOutOfRange));
    }

    #[test]
    fn empty_range_rejected() {
        assert_eq!(settings(0, 0).range(), Err(PanelError::EmptyRange));
    }
}
