use core::fmt;

/// Errors that can occur when configuring or operating the control panel.
///
/// Everything except [`Busy`](PanelError::Busy) is a configuration error and
/// is reported at setup time. `Busy` is transient: the bounded lock wait ran
/// out and the caller should simply try again on its next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PanelError {
    /// A control was given zero logical values (`num_values == 0`).
    EmptyRange,
    /// Raw bounds are inverted (`raw_max < raw_min`).
    InvalidRawBounds,
    /// Logical value is outside `[0, num_values)`.
    ValueOutOfRange,
    /// Smoothing window is zero or larger than [`MAX_WINDOW`](super::MAX_WINDOW).
    InvalidWindow,
    /// Hysteresis threshold is not a finite fraction in `[0, 1)`.
    InvalidThreshold,
    /// Control index is out of bounds (must be < number of physical controls).
    InvalidControlIndex,
    /// Scene index is out of bounds (must be < number of scenes).
    InvalidSceneIndex,
    /// Position mapping is not a permutation of the storage indices.
    InvalidMapping,
    /// Panel was declared with zero controls or zero scenes.
    EmptyPanel,
    /// Lock could not be acquired within the configured patience.
    Busy,
}

impl PanelError {
    /// Returns `true` for errors that go away on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, PanelError::Busy)
    }
}

impl fmt::Display for PanelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PanelError::EmptyRange => write!(f, "Control range has no logical values"),
            PanelError::InvalidRawBounds => write!(f, "Raw maximum is below raw minimum"),
            PanelError::ValueOutOfRange => write!(f, "Value outside the control's logical range"),
            PanelError::InvalidWindow => write!(f, "Smoothing window must be 1-128 samples"),
            PanelError::InvalidThreshold => write!(f, "Hysteresis threshold must be in [0, 1)"),
            PanelError::InvalidControlIndex => write!(f, "Invalid control index"),
            PanelError::InvalidSceneIndex => write!(f, "Invalid scene index"),
            PanelError::InvalidMapping => write!(f, "Position mapping is not a permutation"),
            PanelError::EmptyPanel => write!(f, "Panel needs at least one control and one scene"),
            PanelError::Busy => write!(f, "Lock busy, try again next tick"),
        }
    }
}
