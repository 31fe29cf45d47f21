//! Soft-takeover arbitration for faders and knobs, using Embassy.
//!
//! This crate provides [`Panel`], the set of physical controls of an
//! instrument with several scenes each, and [`panel_service_task`], the
//! periodic loop that keeps their smoothing windows fed.
//!
//! # Quick Start
//!
//! ```ignore
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use spirant_panel::controls::{LatchedChannel, Panel, PanelConfig};
//! use spirant_panel::panel_service_task;
//!
//! type Faders = Panel<'static, CriticalSectionRawMutex, LatchedChannel, 8, 4>;
//!
//! static CHANNELS: [LatchedChannel; 8] = [const { LatchedChannel::new(0, 4095) }; 8];
//! static PANEL: StaticCell<Faders> = StaticCell::new();
//!
//! // In your Embassy main:
//! let panel = PANEL.init(Panel::uniform(PanelConfig::default(), CHANNELS.each_ref(), 128, 0).unwrap());
//! spawner.spawn(faders_task(panel)).unwrap();
//!
//! // Thin task wrapper (Embassy tasks cannot be generic):
//! #[embassy_executor::task]
//! async fn faders_task(panel: &'static Faders) {
//!     panel_service_task(panel).await;
//! }
//! ```
//!
//! # Crate Features
//!
//! - **`defmt`** — structured logging via [`defmt`](https://docs.rs/defmt).
//! - **`task`** — [`panel_service_task`], driven by `embassy-time`.
//!
//! [`Panel`]: controls::Panel

#![no_std]

pub mod controls;
#[cfg(feature = "task")]
pub mod service_task;

// ── Re-exports for convenience ───────────────────────────────────────────

pub use controls::{Panel, PanelConfig, PanelError};
#[cfg(feature = "task")]
pub use service_task::panel_service_task;
