//! Arc voltage divider taps on ADC1.

use embassy_stm32::adc::{Adc, AnyAdcChannel, Resolution, SampleTime};
use embassy_stm32::peripherals::ADC1;
use thc_core::sampler::{DividerAdc, DividerTap};

/// Two single-ended channels across the divider.
///
/// The G0 driver only offers blocking reads, so the conversion runs inside
/// `start_conversion` and `read_conversion` hands back the latched value.
pub struct DividerTaps {
    adc: Adc<'static, ADC1>,
    plus: AnyAdcChannel<ADC1>,
    minus: AnyAdcChannel<ADC1>,
    latched: u16,
}

impl DividerTaps {
    pub fn new(
        mut adc: Adc<'static, ADC1>,
        plus: AnyAdcChannel<ADC1>,
        minus: AnyAdcChannel<ADC1>,
    ) -> Self {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        adc.set_resolution(Resolution::BITS10);
        Self {
            adc,
            plus,
            minus,
            latched: 0,
        }
    }
}

impl DividerAdc for DividerTaps {
    fn start_conversion(&mut self, tap: DividerTap) {
        self.latched = match tap {
            DividerTap::Plus => self.adc.blocking_read(&mut self.plus),
            DividerTap::Minus => self.adc.blocking_read(&mut self.minus),
        };
    }

    fn read_conversion(&mut self) -> u16 {
        self.latched
    }
}
