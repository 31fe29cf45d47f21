//! Sampled channel capability and its concrete variants.
//!
//! A [`SampledChannel`] is one physical analog input. Every scene of a
//! fader wraps the *same* channel in its own smoothing filter, so the
//! capability is expressed entirely through `&self` and implementations
//! keep their last sample behind interior mutability.
//!
//! # Variants
//!
//! - [`LatchedChannel`] — value pushed in from elsewhere (DMA, another
//!   task, tests) and latched on `service()`.
//! - [`MuxedChannel`] — one input of a multi-channel ADC that is shared by
//!   several channels through a blocking mutex.
//! - [`PanelChannel`] — either of the above, for panels that mix both.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;

/// Channel number that marks a [`MuxedChannel`] as not wired to anything.
pub const INVALID_CHANNEL: u8 = 99;

/// One physical analog input.
///
/// # Contract
///
/// - [`service()`](Self::service) takes one sample and must be safe to call
///   from the periodic context. It never fails: a disconnected or faulty
///   input latches [`min()`](Self::min).
/// - [`read()`](Self::read) returns the last sample and is valid before the
///   first `service()` (it returns `min()` then).
pub trait SampledChannel {
    /// Lowest raw value the hardware reports.
    fn min(&self) -> u16;
    /// Highest raw value the hardware reports.
    fn max(&self) -> u16;
    /// Take one sample.
    fn service(&self);
    /// Last sample taken by [`service()`](Self::service).
    fn read(&self) -> u16;
}

// ── LatchedChannel ───────────────────────────────────────────────────────

/// Software channel with set/clock latch semantics.
///
/// [`set()`](Self::set) loads the next value without changing what
/// [`read()`](SampledChannel::read) returns; the value only becomes visible
/// when the periodic driver calls [`service()`](SampledChannel::service).
///
/// # Examples
///
/// ```
/// use spirant_panel::controls::{LatchedChannel, SampledChannel};
///
/// let ch = LatchedChannel::new(0, 4095);
/// ch.set(2048);
/// assert_eq!(ch.read(), 0); // not clocked yet
/// ch.service();
/// assert_eq!(ch.read(), 2048);
/// ```
#[derive(Debug)]
pub struct LatchedChannel {
    min: u16,
    max: u16,
    input: AtomicU16,
    output: AtomicU16,
    connected: AtomicBool,
}

impl LatchedChannel {
    /// Create a connected channel reporting `min` until the first sample.
    pub const fn new(min: u16, max: u16) -> Self {
        Self {
            min,
            max,
            input: AtomicU16::new(min),
            output: AtomicU16::new(min),
            connected: AtomicBool::new(true),
        }
    }

    /// Load the value the next `service()` will latch.
    pub fn set(&self, raw: u16) {
        self.input.store(raw, Ordering::Relaxed);
    }

    /// Mark the input as unplugged. `service()` latches `min()` until
    /// [`connect()`](Self::connect) is called.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Mark the input as plugged in again.
    pub fn connect(&self) {
        self.connected.store(true, Ordering::Relaxed);
    }

    /// Returns `true` if the latched output differs from the loaded input.
    pub fn pending(&self) -> bool {
        self.input.load(Ordering::Relaxed) != self.output.load(Ordering::Relaxed)
    }
}

impl SampledChannel for LatchedChannel {
    fn min(&self) -> u16 {
        self.min
    }

    fn max(&self) -> u16 {
        self.max
    }

    fn service(&self) {
        let sample = if self.connected.load(Ordering::Relaxed) {
            self.input.load(Ordering::Relaxed)
        } else {
            self.min
        };
        self.output.store(sample, Ordering::Relaxed);
    }

    fn read(&self) -> u16 {
        self.output.load(Ordering::Relaxed)
    }
}

// ── MuxedChannel ─────────────────────────────────────────────────────────

/// A multi-channel ADC shared by several [`MuxedChannel`]s.
///
/// The chip driver itself lives outside this crate; this is the only
/// thing the panel needs from it.
pub trait MultiChannelAdc {
    /// Driver-specific failure (bus error, timeout, ...).
    type Error;

    /// Convert one input and return the raw reading.
    fn read_channel(&mut self, channel: u8) -> Result<u16, Self::Error>;
}

/// One input of a shared multi-channel ADC.
///
/// All channels on the same chip hold a reference to the same blocking
/// mutex, so conversions are serialised and no channel owns its own copy
/// of the bus. The mutex is held only for the single conversion.
pub struct MuxedChannel<'a, M: RawMutex, A> {
    adc: &'a BlockingMutex<M, RefCell<A>>,
    channel: u8,
    min: u16,
    max: u16,
    value: AtomicU16,
}

impl<'a, M, A> MuxedChannel<'a, M, A>
where
    M: RawMutex,
    A: MultiChannelAdc,
{
    /// Attach to input `channel` of the shared `adc`.
    ///
    /// Pass [`INVALID_CHANNEL`] for an unwired input; it always reads `min`.
    pub const fn new(adc: &'a BlockingMutex<M, RefCell<A>>, channel: u8, min: u16, max: u16) -> Self {
        Self {
            adc,
            channel,
            min,
            max,
            value: AtomicU16::new(min),
        }
    }

    /// ADC input this channel converts.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    fn convert(&self) -> Option<u16> {
        self.adc.lock(|cell| {
            // Fails if a conversion is already in flight on this core.
            let mut adc = cell.try_borrow_mut().ok()?;
            adc.read_channel(self.channel).ok()
        })
    }
}

impl<M, A> SampledChannel for MuxedChannel<'_, M, A>
where
    M: RawMutex,
    A: MultiChannelAdc,
{
    fn min(&self) -> u16 {
        self.min
    }

    fn max(&self) -> u16 {
        self.max
    }

    fn service(&self) {
        if self.channel == INVALID_CHANNEL {
            self.value.store(self.min, Ordering::Relaxed);
            return;
        }

        let sample = match self.convert() {
            Some(raw) => raw,
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("ADC read failed on channel {}", self.channel);
                self.min
            }
        };
        self.value.store(sample, Ordering::Relaxed);
    }

    fn read(&self) -> u16 {
        self.value.load(Ordering::Relaxed)
    }
}

// ── PanelChannel ─────────────────────────────────────────────────────────

/// Closed set of channel kinds a panel can be built from.
pub enum PanelChannel<'a, M: RawMutex, A> {
    /// Value pushed in from software.
    Latched(LatchedChannel),
    /// Input of a shared multi-channel ADC.
    Muxed(MuxedChannel<'a, M, A>),
}

impl<M, A> SampledChannel for PanelChannel<'_, M, A>
where
    M: RawMutex,
    A: MultiChannelAdc,
{
    fn min(&self) -> u16 {
        match self {
            PanelChannel::Latched(ch) => ch.min(),
            PanelChannel::Muxed(ch) => ch.min(),
        }
    }

    fn max(&self) -> u16 {
        match self {
            PanelChannel::Latched(ch) => ch.max(),
            PanelChannel::Muxed(ch) => ch.max(),
        }
    }

    fn service(&self) {
        match self {
            PanelChannel::Latched(ch) => ch.service(),
            PanelChannel::Muxed(ch) => ch.service(),
        }
    }

    fn read(&self) -> u16 {
        match self {
            PanelChannel::Latched(ch) => ch.read(),
            PanelChannel::Muxed(ch) => ch.read(),
        }
    }
}

// ── Unit Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    struct FakeAdc {
        values: [u16; 8],
        fail_on: Option<u8>,
        conversions: usize,
    }

    impl MultiChannelAdc for FakeAdc {
        type Error = ();

        fn read_channel(&mut self, channel: u8) -> Result<u16, ()> {
            self.conversions += 1;
            if self.fail_on == Some(channel) {
                return Err(());
            }
            self.values.get(channel as usize).copied().ok_or(())
        }
    }

    fn make_adc(fail_on: Option<u8>) -> BlockingMutex<CriticalSectionRawMutex, RefCell<FakeAdc>> {
        BlockingMutex::new(RefCell::new(FakeAdc {
            values: [100, 200, 300, 400, 500, 600, 700, 800],
            fail_on,
            conversions: 0,
        }))
    }

    // ── LatchedChannel ───────────────────────────────────────────────

    #[test]
    fn latched_reads_min_before_first_service() {
        let ch = LatchedChannel::new(16, 4000);
        ch.set(1234);
        assert_eq!(ch.read(), 16);
        assert!(ch.pending());
    }

    #[test]
    fn latched_service_clocks_input_to_output() {
        let ch = LatchedChannel::new(0, 4095);
        ch.set(1234);
        ch.service();
        assert_eq!(ch.read(), 1234);
        assert!(!ch.pending());

        // Loading a new value does not disturb the output until clocked.
        ch.set(99);
        assert_eq!(ch.read(), 1234);
        ch.service();
        assert_eq!(ch.read(), 99);
    }

    #[test]
    fn latched_disconnected_reads_min() {
        let ch = LatchedChannel::new(10, 4095);
        ch.set(3000);
        ch.disconnect();
        ch.service();
        assert_eq!(ch.read(), 10);

        ch.connect();
        ch.service();
        assert_eq!(ch.read(), 3000);
    }

    // ── MuxedChannel ─────────────────────────────────────────────────

    #[test]
    fn muxed_reads_its_own_input() {
        let adc = make_adc(None);
        let ch2 = MuxedChannel::new(&adc, 2, 0, 4095);
        let ch5 = MuxedChannel::new(&adc, 5, 0, 4095);

        assert_eq!(ch2.read(), 0);
        ch2.service();
        ch5.service();
        assert_eq!(ch2.read(), 300);
        assert_eq!(ch5.read(), 600);
        assert_eq!(ch5.channel(), 5);

        // Both channels went through the one shared chip.
        assert_eq!(adc.lock(|cell| cell.borrow().conversions), 2);
    }

    #[test]
    fn muxed_read_failure_falls_back_to_min() {
        let adc = make_adc(Some(3));
        let ch = MuxedChannel::new(&adc, 3, 7, 4095);
        ch.service();
        assert_eq!(ch.read(), 7);
    }

    #[test]
    fn muxed_invalid_channel_never_converts() {
        let adc = make_adc(None);
        let ch = MuxedChannel::new(&adc, INVALID_CHANNEL, 5, 4095);
        ch.service();
        assert_eq!(ch.read(), 5);
        assert_eq!(adc.lock(|cell| cell.borrow().conversions), 0);
    }

    // ── PanelChannel ─────────────────────────────────────────────────

    #[test]
    fn panel_channel_delegates_to_variant() {
        let adc = make_adc(None);
        let muxed: PanelChannel<'_, CriticalSectionRawMutex, FakeAdc> =
            PanelChannel::Muxed(MuxedChannel::new(&adc, 0, 0, 1023));
        let latched: PanelChannel<'_, CriticalSectionRawMutex, FakeAdc> =
            PanelChannel::Latched(LatchedChannel::new(0, 4095));

        muxed.service();
        assert_eq!(muxed.read(), 100);
        assert_eq!(muxed.max(), 1023);

        if let PanelChannel::Latched(ch) = &latched {
            ch.set(42);
        }
        latched.service();
        assert_eq!(latched.read(), 42);
        assert_eq!(latched.min(), 0);
    }
}
