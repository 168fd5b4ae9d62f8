//! Z step pulse generation on a phase-correct timer.
//!
//! The timer counts from zero up to its period and back down. Reaching either
//! extreme raises an interrupt and each interrupt emits exactly one step, so a
//! period of `p` ticks yields one step every `p` timer ticks. A period of
//! [`MAX_TIMER_PERIOD`] parks the train: the next extreme pauses the clock
//! instead of stepping.
//!
//! [`rephase`] carries the elapsed part of the current half cycle across a
//! period change so that updating the speed never drops or doubles a step.

use portable_atomic::{AtomicI8, AtomicU32, Ordering};

use crate::config::{MAX_TIMER_PERIOD, TIMER_CONVERSION_CONSTANT};
use crate::host::AtomicPosition;

/// Half of the phase-correct cycle the counter is currently in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CountDirection {
    Up,
    Down,
}

/// Physical direction of Z travel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepDirection {
    Positive,
    Negative,
}

impl StepDirection {
    /// Direction for a signed speed; zero counts as positive.
    #[must_use]
    pub const fn from_speed(speed: i32) -> Self {
        if speed < 0 {
            StepDirection::Negative
        } else {
            StepDirection::Positive
        }
    }

    /// Position delta of one step.
    #[must_use]
    pub const fn delta(self) -> i8 {
        match self {
            StepDirection::Positive => 1,
            StepDirection::Negative => -1,
        }
    }
}

/// Register-level access to the pulse timer.
pub trait PulseTimer {
    fn set_period(&mut self, period: u16);
    fn period(&self) -> u16;
    fn set_counter(&mut self, value: u16);
    fn current_counter(&self) -> u16;
    fn pause_clock(&mut self);
    fn resume_clock(&mut self);
    fn counting_direction(&self) -> CountDirection;

    /// Records the half cycle just entered.
    ///
    /// Timers that expose their counting direction in hardware ignore this.
    fn note_counting_direction(&mut self, _direction: CountDirection) {}

    /// Arms the top and bottom interrupts.
    fn enable_interrupts(&mut self);
}

/// Step output line.
pub trait StepPin {
    fn set_high(&mut self);
    fn set_low(&mut self);
}

/// Direction output line.
pub trait DirectionPin {
    fn set_direction(&mut self, direction: StepDirection);
}

/// Period and direction derived from a signed step rate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseProgram {
    pub period: u16,
    pub direction: StepDirection,
}

impl PulseProgram {
    /// Program that parks the train.
    pub const PARKED: Self = Self {
        period: MAX_TIMER_PERIOD,
        direction: StepDirection::Positive,
    };

    /// Converts a signed speed in steps/s into a timer program.
    #[must_use]
    pub fn from_speed(speed: i32) -> Self {
        Self::from_speed_with(speed, TIMER_CONVERSION_CONSTANT, MAX_TIMER_PERIOD)
    }

    #[must_use]
    pub fn from_speed_with(speed: i32, conversion: u32, max_period: u16) -> Self {
        let frequency = speed.unsigned_abs();
        let period = if frequency == 0 {
            max_period
        } else {
            u16::try_from(conversion / frequency)
                .unwrap_or(u16::MAX)
                .min(max_period)
        };

        Self {
            period,
            direction: StepDirection::from_speed(speed),
        }
    }

    #[must_use]
    pub const fn is_parked(&self) -> bool {
        self.period == MAX_TIMER_PERIOD
    }
}

/// Counter value that keeps the current phase under `new_period`.
///
/// `elapsed` is the time since the last reversal: the counter itself when
/// counting up, or the distance from the old top when counting down. The
/// returned counter leaves the same remaining time to the next extreme, clipped
/// to zero when the new period is already shorter than the elapsed time.
#[must_use]
pub fn rephase(
    old_period: u16,
    counter: u16,
    direction: CountDirection,
    new_period: u16,
) -> u16 {
    let elapsed = match direction {
        CountDirection::Up => counter,
        CountDirection::Down => old_period.saturating_sub(counter),
    };
    let rest = new_period.saturating_sub(elapsed);

    match direction {
        CountDirection::Up => new_period - rest,
        CountDirection::Down => rest,
    }
}

/// Reprograms `timer` to `new_period` without disturbing the running phase.
///
/// The clock stays paused between reading the counter and writing the new
/// values, so no edge can be lost in between.
pub fn reprogram<T>(timer: &mut T, new_period: u16)
where
    T: PulseTimer + ?Sized,
{
    timer.pause_clock();
    let old_period = timer.period();
    let counter = rephase(
        old_period,
        timer.current_counter(),
        timer.counting_direction(),
        new_period,
    );
    timer.set_period(new_period);
    timer.set_counter(counter);
    timer.resume_clock();
}

/// State shared between the control update and the pulse interrupts.
///
/// `direction` is written by the control update while the timer clock is
/// paused and read by both pulse interrupts. `pulses` is written only by the
/// pulse interrupts.
#[derive(Debug)]
pub struct PulseShared {
    direction: AtomicI8,
    pulses: AtomicU32,
}

impl PulseShared {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            direction: AtomicI8::new(1),
            pulses: AtomicU32::new(0),
        }
    }

    pub fn set_direction(&self, direction: StepDirection) {
        self.direction.store(direction.delta(), Ordering::Relaxed);
    }

    pub fn direction(&self) -> StepDirection {
        if self.direction.load(Ordering::Relaxed) < 0 {
            StepDirection::Negative
        } else {
            StepDirection::Positive
        }
    }

    /// Total pulses emitted, wrapping.
    pub fn pulses(&self) -> u32 {
        self.pulses.load(Ordering::Relaxed)
    }

    fn record_pulse(&self) -> i32 {
        self.pulses.fetch_add(1, Ordering::Relaxed);
        i32::from(self.direction.load(Ordering::Relaxed))
    }
}

impl Default for PulseShared {
    fn default() -> Self {
        Self::new()
    }
}

/// What a pulse interrupt did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PulseOutcome {
    /// Train is parked; the clock was paused.
    Parked,
    /// One step was emitted with the given position delta.
    Stepped(i32),
}

/// Body of the two pulse interrupts.
pub struct StepPulseEmitter<'a, P> {
    step: P,
    shared: &'a PulseShared,
    position: &'a AtomicPosition,
}

impl<'a, P> StepPulseEmitter<'a, P>
where
    P: StepPin,
{
    pub const fn new(step: P, shared: &'a PulseShared, position: &'a AtomicPosition) -> Self {
        Self {
            step,
            shared,
            position,
        }
    }

    /// Counter reached its top.
    pub fn on_overflow<T>(&mut self, timer: &mut T) -> PulseOutcome
    where
        T: PulseTimer + ?Sized,
    {
        self.emit(timer, CountDirection::Down)
    }

    /// Counter reached zero.
    pub fn on_capture<T>(&mut self, timer: &mut T) -> PulseOutcome
    where
        T: PulseTimer + ?Sized,
    {
        self.emit(timer, CountDirection::Up)
    }

    fn emit<T>(&mut self, timer: &mut T, entering: CountDirection) -> PulseOutcome
    where
        T: PulseTimer + ?Sized,
    {
        if timer.period() == MAX_TIMER_PERIOD {
            timer.pause_clock();
            return PulseOutcome::Parked;
        }

        self.step.set_high();
        timer.note_counting_direction(entering);
        let delta = self.shared.record_pulse();
        self.position.shift(delta);
        self.step.set_low();

        PulseOutcome::Stepped(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPin {
        rising: u32,
        high: bool,
    }

    impl StepPin for CountingPin {
        fn set_high(&mut self) {
            self.high = true;
            self.rising += 1;
        }

        fn set_low(&mut self) {
            self.high = false;
        }
    }

    struct RegisterTimer {
        period: u16,
        counter: u16,
        direction: CountDirection,
        running: bool,
        pauses: u32,
    }

    impl RegisterTimer {
        fn new(period: u16, counter: u16, direction: CountDirection) -> Self {
            Self {
                period,
                counter,
                direction,
                running: true,
                pauses: 0,
            }
        }
    }

    impl PulseTimer for RegisterTimer {
        fn set_period(&mut self, period: u16) {
            self.period = period;
        }

        fn period(&self) -> u16 {
            self.period
        }

        fn set_counter(&mut self, value: u16) {
            assert!(!self.running, "counter written while clock is running");
            self.counter = value;
        }

        fn current_counter(&self) -> u16 {
            self.counter
        }

        fn pause_clock(&mut self) {
            self.running = false;
            self.pauses += 1;
        }

        fn resume_clock(&mut self) {
            self.running = true;
        }

        fn counting_direction(&self) -> CountDirection {
            self.direction
        }

        fn note_counting_direction(&mut self, direction: CountDirection) {
            self.direction = direction;
        }

        fn enable_interrupts(&mut self) {}
    }

    #[test]
    fn unchanged_period_is_a_no_op() {
        for counter in [0_u16, 1, 99, 250, 499, 500] {
            assert_eq!(rephase(500, counter, CountDirection::Up, 500), counter);
            assert_eq!(rephase(500, counter, CountDirection::Down, 500), counter);
        }
    }

    #[test]
    fn counting_up_keeps_elapsed_time() {
        assert_eq!(rephase(1_000, 300, CountDirection::Up, 2_000), 300);
        assert_eq!(rephase(1_000, 300, CountDirection::Up, 200), 200);
    }

    #[test]
    fn counting_down_keeps_elapsed_time() {
        // 300 ticks since the top; the new top is 600 so 300 remain.
        assert_eq!(rephase(1_000, 700, CountDirection::Down, 600), 300);
        assert_eq!(rephase(1_000, 200, CountDirection::Down, 500), 0);
    }

    #[test]
    fn reprogram_pauses_around_register_writes() {
        let mut timer = RegisterTimer::new(400, 100, CountDirection::Up);
        reprogram(&mut timer, 250);

        assert_eq!(timer.period, 250);
        assert_eq!(timer.counter, 100);
        assert_eq!(timer.pauses, 1);
        assert!(timer.running);
    }

    #[test]
    fn speed_maps_to_clamped_period() {
        assert_eq!(PulseProgram::from_speed(0), PulseProgram::PARKED);
        assert_eq!(PulseProgram::from_speed(1).period, MAX_TIMER_PERIOD);
        assert_eq!(PulseProgram::from_speed(3).period, MAX_TIMER_PERIOD);

        let up = PulseProgram::from_speed(10_000);
        assert_eq!(up.period, 25);
        assert_eq!(up.direction, StepDirection::Positive);

        let down = PulseProgram::from_speed(-2_500);
        assert_eq!(down.period, 100);
        assert_eq!(down.direction, StepDirection::Negative);
    }

    #[test]
    fn parked_timer_pauses_instead_of_stepping() {
        let shared = PulseShared::new();
        let position = AtomicPosition::new(0);
        let mut emitter = StepPulseEmitter::new(
            CountingPin {
                rising: 0,
                high: false,
            },
            &shared,
            &position,
        );
        let mut timer = RegisterTimer::new(MAX_TIMER_PERIOD, 10, CountDirection::Up);

        assert_eq!(emitter.on_overflow(&mut timer), PulseOutcome::Parked);
        assert!(!timer.running);
        assert_eq!(emitter.step.rising, 0);
        assert_eq!(position.get(), 0);
    }

    #[test]
    fn each_extreme_emits_one_signed_step() {
        let shared = PulseShared::new();
        let position = AtomicPosition::new(100);
        let mut emitter = StepPulseEmitter::new(
            CountingPin {
                rising: 0,
                high: false,
            },
            &shared,
            &position,
        );
        let mut timer = RegisterTimer::new(50, 50, CountDirection::Up);

        assert_eq!(emitter.on_overflow(&mut timer), PulseOutcome::Stepped(1));
        assert_eq!(timer.direction, CountDirection::Down);

        shared.set_direction(StepDirection::Negative);
        assert_eq!(emitter.on_capture(&mut timer), PulseOutcome::Stepped(-1));
        assert_eq!(emitter.on_capture(&mut timer), PulseOutcome::Stepped(-1));
        assert_eq!(timer.direction, CountDirection::Up);

        assert_eq!(position.get(), 99);
        assert_eq!(shared.pulses(), 3);
        assert_eq!(emitter.step.rising, 3);
        assert!(!emitter.step.high);
    }
}
