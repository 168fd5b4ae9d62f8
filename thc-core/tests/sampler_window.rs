use std::collections::VecDeque;

use thc_core::sampler::{
    DividerAdc, DividerTap, SamplePhase, SamplerConfig, VoltageReading, VoltageSampler,
};

struct XorShift(u32);

impl XorShift {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

/// Converter replaying queued raw values and checking the tap sequence.
#[derive(Default)]
struct ReplayAdc {
    plus: VecDeque<u16>,
    minus: VecDeque<u16>,
    pending: Option<DividerTap>,
}

impl DividerAdc for ReplayAdc {
    fn start_conversion(&mut self, tap: DividerTap) {
        assert_ne!(self.pending, Some(tap), "tap started twice in a row");
        self.pending = Some(tap);
    }

    fn read_conversion(&mut self) -> u16 {
        match self.pending {
            Some(DividerTap::Plus) => self.plus.pop_front().unwrap_or(0),
            Some(DividerTap::Minus) => self.minus.pop_front().unwrap_or(0),
            None => panic!("read before any conversion was started"),
        }
    }
}

fn expected(plus: &[u16], minus: &[u16], config: SamplerConfig) -> VoltageReading {
    let plus: i64 = plus.iter().map(|value| i64::from(*value)).sum();
    let minus: i64 = minus.iter().map(|value| i64::from(*value)).sum();
    let value = (plus - minus) / i64::from(config.window) - i64::from(config.offset_counts);
    if value < 0 || value > i64::from(config.full_scale) {
        VoltageReading::ZERO
    } else {
        VoltageReading::from_counts(u16::try_from(value).unwrap())
    }
}

#[test]
fn every_window_matches_reference_average() {
    let config = SamplerConfig::default();
    let window = usize::from(config.window);
    let mut rng = XorShift(0x9E37_79B9);
    let mut sampler = VoltageSampler::new(ReplayAdc::default(), config);
    sampler.prime();

    for round in 0..500 {
        let base = u16::try_from(rng.next() % 900).unwrap();
        let plus: Vec<u16> = (0..window)
            .map(|_| base + u16::try_from(rng.next() % 200).unwrap())
            .collect();
        let minus: Vec<u16> = (0..window)
            .map(|_| u16::try_from(rng.next() % 150).unwrap())
            .collect();
        sampler.adc_mut().plus.extend(plus.iter().copied());
        sampler.adc_mut().minus.extend(minus.iter().copied());

        let previous = sampler.filtered();
        for tick in 0..(window * 2 - 1) {
            assert_eq!(sampler.tick(), None, "round {round} tick {tick}");
            assert_eq!(sampler.filtered(), previous);
        }

        let reading = sampler.tick().expect("window did not close");
        assert_eq!(reading, expected(&plus, &minus, config), "round {round}");
        assert_eq!(sampler.filtered(), reading);
        assert_eq!(sampler.accumulators(), (0, 0));
        assert_eq!(sampler.phase(), SamplePhase::MeasurePlus);
    }

    assert_eq!(sampler.windows(), 500);
}

#[test]
fn narrow_window_and_offset_are_configurable() {
    let config = SamplerConfig::new(2, 10, 1_024);
    let mut sampler = VoltageSampler::new(ReplayAdc::default(), config);
    sampler.adc_mut().plus.extend([300, 310]);
    sampler.adc_mut().minus.extend([100, 90]);
    sampler.prime();

    let mut readings = Vec::new();
    for _ in 0..4 {
        readings.extend(sampler.tick());
    }

    assert_eq!(readings, vec![VoltageReading::from_counts(200)]);
}
