use thc_core::host::AtomicPosition;
use thc_core::pulse::{PulseOutcome, PulseShared, PulseTimer, StepPulseEmitter, reprogram};
use thc_core::sim::{SimPulseTimer, SimStepPin, TimerEvent};

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

    fn range(&mut self, low: u32, high: u32) -> u32 {
        low + self.next() % (high - low)
    }
}

struct Bench<'a> {
    timer: SimPulseTimer,
    emitter: StepPulseEmitter<'a, SimStepPin>,
    steps: Vec<u64>,
}

impl<'a> Bench<'a> {
    fn new(shared: &'a PulseShared, position: &'a AtomicPosition, period: u16) -> Self {
        let mut timer = SimPulseTimer::new();
        timer.set_period(period);
        timer.set_counter(0);
        timer.enable_interrupts();
        timer.resume_clock();

        Self {
            timer,
            emitter: StepPulseEmitter::new(SimStepPin::default(), shared, position),
            steps: Vec::new(),
        }
    }

    fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            let outcome = match self.timer.advance() {
                Some(TimerEvent::Top) => self.emitter.on_overflow(&mut self.timer),
                Some(TimerEvent::Bottom) => self.emitter.on_capture(&mut self.timer),
                None => continue,
            };
            if let PulseOutcome::Stepped(_) = outcome {
                self.steps.push(self.timer.ticks());
            }
        }
    }

    fn elapsed_since_step(&self) -> u64 {
        self.timer.ticks() - self.steps.last().copied().unwrap_or(0)
    }
}

#[test]
fn reprogramming_same_period_keeps_step_grid() {
    let shared = PulseShared::new();
    let position = AtomicPosition::new(0);
    let mut bench = Bench::new(&shared, &position, 37);
    let mut rng = XorShift(0xDEAD_BEEF);

    for _ in 0..400 {
        bench.run(u64::from(rng.range(1, 90)));
        reprogram(&mut bench.timer, 37);
    }
    bench.run(100);

    for (index, tick) in bench.steps.iter().enumerate() {
        assert_eq!(*tick, 37 * (index as u64 + 1));
    }
    assert_eq!(position.get(), i32::try_from(bench.steps.len()).unwrap());
}

#[test]
fn period_change_neither_skips_nor_doubles_a_step() {
    let shared = PulseShared::new();
    let position = AtomicPosition::new(0);
    let mut bench = Bench::new(&shared, &position, 200);
    let mut rng = XorShift(0x0BAD_F00D);

    for _ in 0..300 {
        bench.run(u64::from(rng.range(1, 400)));

        let steps_before = bench.steps.len();
        let last_step = bench.steps.last().copied().unwrap_or(0);
        let elapsed = bench.elapsed_since_step();
        let period = u16::try_from(rng.range(20, 500)).unwrap();
        reprogram(&mut bench.timer, period);

        // The next step lands one new period after the previous one, or on the
        // next tick when that moment has already passed.
        let expected = last_step + u64::from(period).max(elapsed + 1);
        while bench.steps.len() == steps_before {
            bench.run(1);
        }
        assert_eq!(bench.steps.len(), steps_before + 1);
        assert_eq!(bench.steps[steps_before], expected);

        bench.run(u64::from(period) * 3);
        let tail = &bench.steps[steps_before..];
        for pair in tail.windows(2) {
            assert_eq!(pair[1] - pair[0], u64::from(period));
        }
    }

    assert_eq!(shared.pulses(), u32::try_from(bench.steps.len()).unwrap());
}

#[test]
fn parked_period_stops_the_clock_at_next_extreme() {
    let shared = PulseShared::new();
    let position = AtomicPosition::new(0);
    let mut bench = Bench::new(&shared, &position, 50);

    bench.run(120);
    assert_eq!(bench.steps.as_slice(), &[50, 100]);

    reprogram(&mut bench.timer, u16::MAX);
    bench.run(200_000);

    assert!(!bench.timer.running());
    assert_eq!(bench.steps.len(), 2);
    assert_eq!(position.get(), 2);
    assert_eq!(shared.pulses(), 2);
}
