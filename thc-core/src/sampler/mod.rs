//! Arc voltage sampling and oversampling.
//!
//! The divider is read through two taps. Alternating between them cancels the
//! common-mode offset without a second converter. One interrupt invocation
//! handles one tap; a full plus/minus pair closes every other invocation, and
//! every [`SamplerConfig::window`] pairs the accumulated sums collapse into a
//! single [`VoltageReading`].

use core::fmt;

use crate::config::{
    ADC_FULL_SCALE_COUNTS, CALIBRATION_OFFSET_COUNTS, OVERSAMPLE_WINDOW,
    SLOPE_COUNTS_PER_VOLT_X100,
};

/// Divider tap selected for the next conversion.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DividerTap {
    Plus,
    Minus,
}

/// Phase of the alternating measurement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SamplePhase {
    MeasurePlus,
    MeasureMinus,
}

/// Converter wired to both divider taps.
///
/// `start_conversion` only triggers the hardware; the result is collected on
/// the next interrupt through `read_conversion`, so the conversion time
/// overlaps the interrupt period.
pub trait DividerAdc {
    fn start_conversion(&mut self, tap: DividerTap);

    /// Returns the result of the conversion started on the previous call.
    fn read_conversion(&mut self) -> u16;
}

/// Oversampling and calibration parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SamplerConfig {
    /// Plus/minus pairs per filtered reading. Must be non-zero.
    pub window: u16,
    /// Counts subtracted from the averaged difference.
    pub offset_counts: i32,
    /// Largest valid reading; anything above collapses to zero.
    pub full_scale: u16,
}

impl SamplerConfig {
    #[must_use]
    pub const fn new(window: u16, offset_counts: i32, full_scale: u16) -> Self {
        Self {
            window: if window == 0 { 1 } else { window },
            offset_counts,
            full_scale,
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::new(
            OVERSAMPLE_WINDOW,
            CALIBRATION_OFFSET_COUNTS,
            ADC_FULL_SCALE_COUNTS,
        )
    }
}

/// One filtered arc voltage value, in calibrated divider counts.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct VoltageReading {
    counts: u16,
}

impl VoltageReading {
    /// Reading reported when no arc is present or the sum was out of range.
    pub const ZERO: Self = Self { counts: 0 };

    #[must_use]
    pub const fn from_counts(counts: u16) -> Self {
        Self { counts }
    }

    #[must_use]
    pub const fn counts(self) -> u16 {
        self.counts
    }

    /// Arc voltage in tenths of a volt.
    #[must_use]
    pub const fn volts_tenths(self) -> u32 {
        self.counts as u32 * 1_000 / SLOPE_COUNTS_PER_VOLT_X100
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.counts == 0
    }
}

impl fmt::Display for VoltageReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tenths = self.volts_tenths();
        write!(f, "{}.{}V", tenths / 10, tenths % 10)
    }
}

/// Converts a wanted arc voltage into divider counts.
#[must_use]
pub fn target_counts(volts: u16) -> u16 {
    let counts = u32::from(volts) * SLOPE_COUNTS_PER_VOLT_X100 / 100;
    u16::try_from(counts).unwrap_or(u16::MAX)
}

/// Collapses one window of sums into a reading.
///
/// Negative and above-full-scale results are reported as zero.
#[must_use]
pub fn average_window(plus_sum: u32, minus_sum: u32, config: SamplerConfig) -> VoltageReading {
    let window = i64::from(config.window.max(1));
    let value = (i64::from(plus_sum) - i64::from(minus_sum)) / window
        - i64::from(config.offset_counts);

    if value < 0 || value > i64::from(config.full_scale) {
        return VoltageReading::ZERO;
    }

    u16::try_from(value).map_or(VoltageReading::ZERO, VoltageReading::from_counts)
}

/// Alternating two-tap sampler.
pub struct VoltageSampler<A> {
    adc: A,
    config: SamplerConfig,
    phase: SamplePhase,
    plus_sum: u32,
    minus_sum: u32,
    pairs: u16,
    filtered: VoltageReading,
    windows: u32,
}

impl<A> VoltageSampler<A>
where
    A: DividerAdc,
{
    pub const fn new(adc: A, config: SamplerConfig) -> Self {
        Self {
            adc,
            config,
            phase: SamplePhase::MeasurePlus,
            plus_sum: 0,
            minus_sum: 0,
            pairs: 0,
            filtered: VoltageReading::ZERO,
            windows: 0,
        }
    }

    /// Starts the first plus conversion. Call once before enabling the interrupt.
    pub fn prime(&mut self) {
        self.phase = SamplePhase::MeasurePlus;
        self.adc.start_conversion(DividerTap::Plus);
    }

    /// Interrupt body. Returns a reading only when a window closes.
    pub fn tick(&mut self) -> Option<VoltageReading> {
        match self.phase {
            SamplePhase::MeasurePlus => {
                let raw = self.adc.read_conversion();
                self.plus_sum = self.plus_sum.saturating_add(u32::from(raw));
                self.adc.start_conversion(DividerTap::Minus);
                self.phase = SamplePhase::MeasureMinus;
                None
            }
            SamplePhase::MeasureMinus => {
                let raw = self.adc.read_conversion();
                self.minus_sum = self.minus_sum.saturating_add(u32::from(raw));
                self.adc.start_conversion(DividerTap::Plus);
                self.phase = SamplePhase::MeasurePlus;

                self.pairs += 1;
                if self.pairs < self.config.window {
                    return None;
                }

                let reading = average_window(self.plus_sum, self.minus_sum, self.config);
                self.plus_sum = 0;
                self.minus_sum = 0;
                self.pairs = 0;
                self.filtered = reading;
                self.windows = self.windows.wrapping_add(1);
                Some(reading)
            }
        }
    }

    /// Last completed window; never a partial accumulation.
    pub fn filtered(&self) -> VoltageReading {
        self.filtered
    }

    pub fn phase(&self) -> SamplePhase {
        self.phase
    }

    /// Current plus and minus sums.
    pub fn accumulators(&self) -> (u32, u32) {
        (self.plus_sum, self.minus_sum)
    }

    /// Number of windows closed since construction.
    pub fn windows(&self) -> u32 {
        self.windows
    }

    pub fn config(&self) -> SamplerConfig {
        self.config
    }

    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTaps {
        plus: u16,
        minus: u16,
        selected: Option<DividerTap>,
        starts: u32,
    }

    impl FixedTaps {
        fn new(plus: u16, minus: u16) -> Self {
            Self {
                plus,
                minus,
                selected: None,
                starts: 0,
            }
        }
    }

    impl DividerAdc for FixedTaps {
        fn start_conversion(&mut self, tap: DividerTap) {
            self.selected = Some(tap);
            self.starts += 1;
        }

        fn read_conversion(&mut self) -> u16 {
            match self.selected {
                Some(DividerTap::Plus) => self.plus,
                Some(DividerTap::Minus) => self.minus,
                None => 0,
            }
        }
    }

    #[test]
    fn window_closes_after_configured_pairs() {
        let mut sampler = VoltageSampler::new(FixedTaps::new(700, 100), SamplerConfig::default());
        sampler.prime();

        for _ in 0..(2 * 8 - 1) {
            assert_eq!(sampler.tick(), None);
        }
        let reading = sampler.tick();

        assert_eq!(reading, Some(VoltageReading::from_counts(600 - 35)));
        assert_eq!(sampler.accumulators(), (0, 0));
        assert_eq!(sampler.windows(), 1);
    }

    #[test]
    fn mid_window_reads_keep_previous_value() {
        let mut sampler = VoltageSampler::new(FixedTaps::new(500, 100), SamplerConfig::default());
        sampler.prime();
        for _ in 0..16 {
            sampler.tick();
        }
        let first = sampler.filtered();
        assert_eq!(first.counts(), 400 - 35);

        sampler.adc_mut().plus = 900;
        for _ in 0..15 {
            sampler.tick();
            assert_eq!(sampler.filtered(), first);
        }

        sampler.tick();
        assert_eq!(sampler.filtered().counts(), 800 - 35);
    }

    #[test]
    fn taps_alternate_and_overlap_conversions() {
        let mut sampler = VoltageSampler::new(FixedTaps::new(10, 0), SamplerConfig::default());
        sampler.prime();
        assert_eq!(sampler.adc_mut().selected, Some(DividerTap::Plus));

        sampler.tick();
        assert_eq!(sampler.phase(), SamplePhase::MeasureMinus);
        assert_eq!(sampler.adc_mut().selected, Some(DividerTap::Minus));

        sampler.tick();
        assert_eq!(sampler.phase(), SamplePhase::MeasurePlus);
        assert_eq!(sampler.adc_mut().selected, Some(DividerTap::Plus));
        assert_eq!(sampler.adc_mut().starts, 3);
    }

    #[test]
    fn negative_and_overflowing_windows_collapse_to_zero() {
        let config = SamplerConfig::default();
        assert_eq!(average_window(8 * 20, 8 * 10, config), VoltageReading::ZERO);
        assert_eq!(average_window(8 * 1_023, 0, config).counts(), 1_023 - 35);
        assert_eq!(average_window(8 * 1_100, 0, config), VoltageReading::ZERO);
        assert_eq!(average_window(0, 8 * 500, config), VoltageReading::ZERO);
    }

    #[test]
    fn calibration_slope_converts_both_ways() {
        let counts = target_counts(125);
        assert_eq!(counts, 606);
        assert_eq!(VoltageReading::from_counts(counts).volts_tenths(), 1_249);
        assert_eq!(VoltageReading::from_counts(485).volts_tenths(), 1_000);
    }
}
