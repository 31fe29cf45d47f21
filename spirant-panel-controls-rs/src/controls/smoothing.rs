use super::channel::SampledChannel;
use super::error::PanelError;
use super::MAX_WINDOW;

/// Moving-average filter over one [`SampledChannel`].
///
/// Keeps the last `window` raw samples in a fixed ring buffer together
/// with their running sum, so [`read()`](Self::read) is O(1). Several
/// filters may wrap the same channel; each keeps its own window.
///
/// **Invariant:** after every [`service()`](Self::service) or
/// [`push()`](Self::push), `running_sum` equals the sum of the `count`
/// samples resident in the buffer.
///
/// # Examples
///
/// ```
/// use spirant_panel::controls::{LatchedChannel, SmoothingFilter};
///
/// let ch = LatchedChannel::new(0, 4095);
/// let mut filter = SmoothingFilter::new(&ch, 4).unwrap();
/// assert_eq!(filter.read(), 0); // cold start reads the channel minimum
///
/// filter.push(100);
/// filter.push(300);
/// assert_eq!(filter.read(), 200);
/// ```
pub struct SmoothingFilter<'a, C> {
    channel: &'a C,
    samples: [u16; MAX_WINDOW],
    /// Slot the next sample is written to.
    cursor: usize,
    /// Number of valid samples, at most `window`.
    count: usize,
    window: usize,
    running_sum: u64,
}

impl<'a, C: SampledChannel> SmoothingFilter<'a, C> {
    /// Create an empty filter averaging over `window` samples.
    ///
    /// Returns [`PanelError::InvalidWindow`] if `window` is zero or larger
    /// than [`MAX_WINDOW`].
    pub fn new(channel: &'a C, window: usize) -> Result<Self, PanelError> {
        if window == 0 || window > MAX_WINDOW {
            return Err(PanelError::InvalidWindow);
        }
        Ok(Self::with_window(channel, window))
    }

    /// Create a filter and fill its window straight away, so the first
    /// [`read()`](Self::read) is already a real average.
    pub fn primed(channel: &'a C, window: usize) -> Result<Self, PanelError> {
        let mut filter = Self::new(channel, window)?;
        filter.fill();
        Ok(filter)
    }

    /// Constructor for callers that have already validated `window`.
    pub(crate) fn with_window(channel: &'a C, window: usize) -> Self {
        Self {
            channel,
            samples: [0; MAX_WINDOW],
            cursor: 0,
            count: 0,
            window,
            running_sum: 0,
        }
    }

    /// Discard every sample. The next `read()` returns the channel minimum.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.count = 0;
        self.running_sum = 0;
    }

    /// Take one sample from the channel and fold it into the window.
    pub fn service(&mut self) {
        self.channel.service();
        self.push(self.channel.read());
    }

    /// Fold a sample that was obtained elsewhere into the window,
    /// evicting the oldest one once the window is full.
    pub fn push(&mut self, raw: u16) {
        if self.count == self.window {
            self.running_sum -= u64::from(self.samples[self.cursor]);
        } else {
            self.count += 1;
        }
        self.samples[self.cursor] = raw;
        self.running_sum += u64::from(raw);
        self.cursor = (self.cursor + 1) % self.window;
    }

    /// Service the channel until the window is full.
    pub fn fill(&mut self) {
        while self.count < self.window {
            self.service();
        }
    }

    /// Current average, or the channel minimum if no samples are held.
    pub fn read(&self) -> u16 {
        if self.count == 0 {
            return self.channel.min();
        }
        (self.running_sum / self.count as u64) as u16
    }

    /// Returns `true` once the window is full.
    pub fn is_primed(&self) -> bool {
        self.count == self.window
    }

    /// Number of samples currently held.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Configured window length.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Sum of the samples currently held.
    pub fn running_sum(&self) -> u64 {
        self.running_sum
    }

    /// The channel this filter samples.
    pub fn channel(&self) -> &'a C {
        self.channel
    }

    /// Samples currently held, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = u16> + '_ {
        let start = if self.count == self.window { self.cursor } else { 0 };
        (0..self.count).map(move |i| self.samples[(start + i) % self.window])
    }
}

// ── Unit Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::LatchedChannel;

    fn resident_sum(filter: &SmoothingFilter<'_, LatchedChannel>) -> u64 {
        filter.samples().map(u64::from).sum()
    }

    // ── Construction ─────────────────────────────────────────────────

    #[test]
    fn window_bounds_validated() {
        let ch = LatchedChannel::new(0, 4095);
        assert!(matches!(SmoothingFilter::new(&ch, 0), Err(PanelError::InvalidWindow)));
        assert!(matches!(SmoothingFilter::new(&ch, MAX_WINDOW + 1), Err(PanelError::InvalidWindow)));
        assert!(SmoothingFilter::new(&ch, MAX_WINDOW).is_ok());
    }

    #[test]
    fn cold_start_reads_channel_min() {
        let ch = LatchedChannel::new(37, 4095);
        let filter = SmoothingFilter::new(&ch, 8).unwrap();
        assert_eq!(filter.count(), 0);
        assert_eq!(filter.read(), 37);
    }

    #[test]
    fn primed_filter_starts_full() {
        let ch = LatchedChannel::new(0, 4095);
        ch.set(1000);
        let filter = SmoothingFilter::primed(&ch, 16).unwrap();
        assert!(filter.is_primed());
        assert_eq!(filter.read(), 1000);
        assert_eq!(filter.running_sum(), 16_000);
    }

    // ── Averaging ────────────────────────────────────────────────────

    #[test]
    fn service_pulls_one_sample_from_channel() {
        let ch = LatchedChannel::new(0, 4095);
        let mut filter = SmoothingFilter::new(&ch, 4).unwrap();

        ch.set(400);
        filter.service();
        assert_eq!(filter.count(), 1);
        assert_eq!(filter.read(), 400);

        ch.set(800);
        filter.service();
        assert_eq!(filter.count(), 2);
        assert_eq!(filter.read(), 600);
    }

    #[test]
    fn oldest_sample_evicted_when_full() {
        let ch = LatchedChannel::new(0, 4095);
        let mut filter = SmoothingFilter::new(&ch, 3).unwrap();
        for raw in [10, 20, 30] {
            filter.push(raw);
        }
        assert_eq!(filter.read(), 20);

        filter.push(90); // evicts 10
        assert_eq!(filter.count(), 3);
        assert_eq!(filter.running_sum(), 140);
        assert_eq!(filter.read(), 46);
        assert_eq!(filter.samples().collect::<heapless::Vec<u16, 3>>(), [20, 30, 90]);
    }

    #[test]
    fn running_sum_matches_resident_samples() {
        let ch = LatchedChannel::new(0, 4095);
        let mut filter = SmoothingFilter::new(&ch, 7).unwrap();

        // Deterministic pseudo-noise across several wraps of the ring.
        let mut raw: u32 = 1234;
        for _ in 0..50 {
            raw = (raw * 1103 + 4097) % 4096;
            ch.set(raw as u16);
            filter.service();

            assert_eq!(filter.running_sum(), resident_sum(&filter));
            assert_eq!(filter.read() as u64, filter.running_sum() / filter.count() as u64);
        }
    }

    #[test]
    fn read_has_no_side_effects() {
        let ch = LatchedChannel::new(0, 4095);
        let mut filter = SmoothingFilter::new(&ch, 4).unwrap();
        filter.push(100);
        filter.push(201);

        let first = filter.read();
        for _ in 0..10 {
            assert_eq!(filter.read(), first);
        }
        assert_eq!(filter.count(), 2);
    }

    // ── Reset ────────────────────────────────────────────────────────

    #[test]
    fn reset_discards_samples() {
        let ch = LatchedChannel::new(5, 4095);
        let mut filter = SmoothingFilter::new(&ch, 4).unwrap();
        filter.push(1000);
        filter.push(2000);

        filter.reset();
        assert_eq!(filter.count(), 0);
        assert_eq!(filter.running_sum(), 0);
        assert_eq!(filter.read(), 5);

        filter.push(300);
        assert_eq!(filter.read(), 300);
    }

    #[test]
    fn filters_sharing_a_channel_keep_separate_windows() {
        let ch = LatchedChannel::new(0, 4095);
        let mut a = SmoothingFilter::new(&ch, 4).unwrap();
        let mut b = SmoothingFilter::new(&ch, 4).unwrap();

        ch.set(1000);
        a.service();
        a.service();
        ch.set(3000);
        b.service();

        assert_eq!(a.read(), 1000);
        assert_eq!(b.read(), 3000);
    }
}
