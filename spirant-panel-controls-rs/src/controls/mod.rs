//! Fader and knob arbitration with soft takeover across scenes.
//!
//! This module turns noisy analog readings from physical controls into
//! stable logical values, and lets every physical control drive several
//! independent values (scenes) without the reported value jumping when the
//! scene changes.
//!
//! # Architecture
//!
//! ```text
//! Panel ── ControlBank (one per physical control, in its own mutex)
//!             └── SoftTakeover × SCENES ── SmoothingFilter ──┐
//!                                                            ├─ &SampledChannel
//!                                          (shared by every scene of the control)
//! ```
//!
//! - [`SmoothingFilter`] keeps a moving average of the last
//!   [`PanelConfig::window_size`] samples.
//! - [`SoftTakeover`] holds a remembered value and a [`LockState`]. A
//!   locked control ignores its knob; an unlock request waits until the
//!   knob passes through the remembered value; an unlocked control tracks
//!   the knob with hysteresis at the value boundaries.
//! - [`ControlBank`] keeps one [`SoftTakeover`] per scene and switches
//!   between them, locking the outgoing scene.
//! - [`Panel`] owns every bank and is what the application talks to.
//!
//! # Execution contexts
//!
//! A periodic context calls [`Panel::service()`] about once per
//! millisecond (see `panel_service_task` behind the `task` feature).
//! The application reads values and switches scenes from its own task.
//! Neither side ever waits longer than [`PanelConfig::patience`] scheduler
//! yields for a lock; see [`Panel`] for the locking rules.
//!
//! # `no_std` Compatibility
//!
//! No heap allocation. The number of controls and scenes are const
//! generics and every buffer is a fixed-size array of at most
//! [`MAX_WINDOW`] samples. The optional `defmt` feature enables
//! structured logging for embedded targets.

mod bank;
mod channel;
mod config;
mod error;
mod panel;
mod range;
mod settings;
mod smoothing;
mod takeover;

pub use bank::ControlBank;
pub use channel::{LatchedChannel, MultiChannelAdc, MuxedChannel, PanelChannel, SampledChannel, INVALID_CHANNEL};
pub use config::{ControlSetup, PanelConfig};
pub use error::PanelError;
pub use panel::Panel;
pub use range::ControlRange;
pub use settings::ControlSettings;
pub use smoothing::SmoothingFilter;
pub use takeover::{LockState, SoftTakeover};

/// Largest smoothing window, in samples.
pub const MAX_WINDOW: usize = 128;

/// Smoothing window used by [`PanelConfig::default()`].
pub const DEFAULT_WINDOW: usize = 100;

/// Hysteresis margin used by [`PanelConfig::default()`], as a fraction of
/// one value's raw slice.
pub const DEFAULT_THRESHOLD: f32 = 0.05;

/// Extra lock attempts used by [`PanelConfig::default()`].
pub const DEFAULT_PATIENCE: u8 = 4;

/// Service rate used by [`PanelConfig::default()`].
pub const DEFAULT_SERVICE_HZ: u32 = 1000;
