//! Periodic sampling loop for a [`Panel`].

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Ticker};

use crate::controls::{Panel, SampledChannel};

/// Service `panel` forever at its configured rate.
///
/// This is a regular `async fn`, **not** an Embassy `#[task]`. Callers
/// wrap it in a concrete task, since Embassy tasks cannot be generic:
///
/// ```ignore
/// #[embassy_executor::task]
/// async fn faders_task(panel: &'static Panel<'static, CriticalSectionRawMutex, LatchedChannel, 8, 4>) {
///     panel_service_task(panel).await;
/// }
/// ```
///
/// The rate comes from [`PanelConfig::service_frequency_hz`](crate::PanelConfig::service_frequency_hz).
/// A round with a busy bank is logged and the loop carries on; the skipped
/// bank is sampled again on the next tick.
pub async fn panel_service_task<M, C, const CONTROLS: usize, const SCENES: usize>(
    panel: &'static Panel<'static, M, C, CONTROLS, SCENES>,
) -> !
where
    M: RawMutex,
    C: SampledChannel,
{
    let period = Duration::from_micros(panel.config().service_period_us());
    let mut ticker = Ticker::every(period);

    #[cfg(feature = "defmt")]
    defmt::info!("panel service running every {} us", period.as_micros());

    loop {
        if let Err(_e) = panel.service().await {
            #[cfg(feature = "defmt")]
            defmt::warn!("service round incomplete: {}", _e);
        }
        ticker.next().await;
    }
}
