//! Closed-loop torch height control.
//!
//! [`HeightController`] turns a target Z speed into an acceleration-limited
//! current speed and a [`PulseProgram`] for the step timer. It does not touch
//! hardware: each [`HeightController::update`] returns a [`HeightUpdate`]
//! listing the effects the caller must apply (timer program, axis release,
//! fatal fault).
//!
//! The error-to-speed law is supplied through [`TargetSpeedLaw`]. The bundled
//! [`BenchOscillation`] ignores the voltage and swings the head up and down,
//! which is how the pulse path is exercised on the bench.

use core::fmt;

use crate::config::{
    BENCH_OSCILLATION_HALF_PERIOD, BENCH_OSCILLATION_SPEED, DEFAULT_MAX_ACCELERATION_STEP_S2,
    DEFAULT_Z_BOTTOM_LIMIT, DEFAULT_Z_TOP_LIMIT, MAX_THC_STEP_S, UPDATE_RATE_HZ,
};
use crate::host::ThcFault;
use crate::pulse::PulseProgram;
use crate::sampler::VoltageReading;

/// Height controller lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlState {
    /// Z belongs to the host stepper.
    Disabled,
    /// Closed loop running.
    Enabled,
    /// Decelerating to zero before handing Z back.
    Disabling,
    /// Travel overrun reported; the train stays parked.
    Faulted,
}

impl ControlState {
    #[must_use]
    pub const fn as_index(self) -> u16 {
        match self {
            ControlState::Disabled => 0,
            ControlState::Enabled => 1,
            ControlState::Disabling => 2,
            ControlState::Faulted => 3,
        }
    }

    #[must_use]
    pub const fn from_index(index: u16) -> Option<Self> {
        match index {
            0 => Some(ControlState::Disabled),
            1 => Some(ControlState::Enabled),
            2 => Some(ControlState::Disabling),
            3 => Some(ControlState::Faulted),
            _ => None,
        }
    }

    /// Returns `true` while the controller owns the Z axis.
    #[must_use]
    pub const fn owns_axis(self) -> bool {
        !matches!(self, ControlState::Disabled)
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlState::Disabled => "disabled",
            ControlState::Enabled => "enabled",
            ControlState::Disabling => "disabling",
            ControlState::Faulted => "faulted",
        })
    }
}

/// Voltage pair handed to the target speed law.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VoltageFeedback {
    pub actual: VoltageReading,
    pub wanted: VoltageReading,
}

impl VoltageFeedback {
    #[must_use]
    pub const fn new(actual: VoltageReading, wanted: VoltageReading) -> Self {
        Self { actual, wanted }
    }

    /// `actual - wanted` in divider counts.
    #[must_use]
    pub fn error_counts(&self) -> i32 {
        i32::from(self.actual.counts()) - i32::from(self.wanted.counts())
    }
}

/// Derives a target Z speed (steps/s) from the arc voltage.
pub trait TargetSpeedLaw {
    /// Clears internal state; called on every enable.
    fn reset(&mut self);

    /// Called once per update while enabled.
    fn target_speed(&mut self, feedback: VoltageFeedback) -> i32;
}

/// Fixed-magnitude target that flips sign every `half_period` updates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BenchOscillation {
    magnitude: i32,
    half_period: u16,
    counter: u16,
    target: i32,
}

impl BenchOscillation {
    #[must_use]
    pub const fn new(magnitude: i32, half_period: u16) -> Self {
        Self {
            magnitude,
            half_period,
            counter: half_period / 2,
            target: magnitude,
        }
    }
}

impl Default for BenchOscillation {
    fn default() -> Self {
        Self::new(BENCH_OSCILLATION_SPEED, BENCH_OSCILLATION_HALF_PERIOD)
    }
}

impl TargetSpeedLaw for BenchOscillation {
    fn reset(&mut self) {
        // Start mid-swing so the first leg is half as long.
        self.target = self.magnitude;
        self.counter = self.half_period / 2;
    }

    fn target_speed(&mut self, _feedback: VoltageFeedback) -> i32 {
        if self.counter == self.half_period {
            self.counter = 0;
            self.target = -self.target;
        } else {
            self.counter += 1;
        }
        self.target
    }
}

/// Speed, acceleration and travel limits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HeightConfig {
    /// Largest commanded speed magnitude in steps/s.
    pub max_speed: i32,
    /// Largest speed change per update, in steps/s.
    pub max_acceleration: i32,
    pub z_bottom_limit: i32,
    pub z_top_limit: i32,
    /// Update calls per second.
    pub update_rate_hz: u32,
}

impl HeightConfig {
    #[must_use]
    pub const fn new(
        max_speed: i32,
        max_acceleration: i32,
        z_bottom_limit: i32,
        z_top_limit: i32,
        update_rate_hz: u32,
    ) -> Self {
        Self {
            max_speed,
            max_acceleration,
            z_bottom_limit,
            z_top_limit,
            update_rate_hz,
        }
    }

    #[must_use]
    pub const fn with_limits(mut self, z_bottom_limit: i32, z_top_limit: i32) -> Self {
        self.z_bottom_limit = z_bottom_limit;
        self.z_top_limit = z_top_limit;
        self
    }

    /// Returns `true` when `z` lies inside the travel window.
    #[must_use]
    pub const fn contains(&self, z: i32) -> bool {
        z >= self.z_bottom_limit && z <= self.z_top_limit
    }
}

impl Default for HeightConfig {
    fn default() -> Self {
        Self::new(
            MAX_THC_STEP_S,
            per_update(DEFAULT_MAX_ACCELERATION_STEP_S2, UPDATE_RATE_HZ),
            DEFAULT_Z_BOTTOM_LIMIT,
            DEFAULT_Z_TOP_LIMIT,
            UPDATE_RATE_HZ,
        )
    }
}

fn per_update(steps_per_s2: u32, update_rate_hz: u32) -> i32 {
    i32::try_from(steps_per_s2 / update_rate_hz.max(1)).unwrap_or(i32::MAX)
}

/// Outcome of [`HeightController::enable`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EnableOutcome {
    /// Controller was idle; the caller must take Z from the host stepper.
    Acquire,
    /// Controller already owned Z and is running again.
    Resumed,
    /// A travel fault is latched.
    Refused,
}

/// Effects requested by one update.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HeightUpdate {
    /// New timer program; `None` leaves the hardware untouched.
    pub program: Option<PulseProgram>,
    /// Z position to publish before handing the axis back.
    pub release_axis: Option<i32>,
    pub fault: Option<ThcFault>,
}

impl HeightUpdate {
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            program: None,
            release_axis: None,
            fault: None,
        }
    }
}

/// Acceleration-limited Z speed controller.
pub struct HeightController<L> {
    law: L,
    config: HeightConfig,
    state: ControlState,
    target_speed: i32,
    current_speed: i32,
}

impl<L> HeightController<L>
where
    L: TargetSpeedLaw,
{
    pub const fn new(law: L, config: HeightConfig) -> Self {
        Self {
            law,
            config,
            state: ControlState::Disabled,
            target_speed: 0,
            current_speed: 0,
        }
    }

    /// Starts closed-loop control.
    pub fn enable(&mut self) -> EnableOutcome {
        let outcome = match self.state {
            ControlState::Faulted => return EnableOutcome::Refused,
            ControlState::Disabled => EnableOutcome::Acquire,
            ControlState::Enabled | ControlState::Disabling => EnableOutcome::Resumed,
        };

        self.law.reset();
        self.state = ControlState::Enabled;
        outcome
    }

    /// Requests a graceful stop; Z is released once the speed reaches zero.
    pub fn disable(&mut self) {
        self.target_speed = 0;
        if self.state == ControlState::Enabled {
            self.state = ControlState::Disabling;
        }
    }

    /// Sets the acceleration limit from a value in steps/s².
    pub fn set_max_acceleration(&mut self, steps_per_s2: u32) {
        self.config.max_acceleration = per_update(steps_per_s2, self.config.update_rate_hz);
    }

    /// Upper bound, in steps, on the distance travelled while stopping from
    /// full speed.
    #[must_use]
    pub fn max_stopping_distance(&self) -> u32 {
        let acceleration = u64::from(self.config.max_acceleration.unsigned_abs())
            * u64::from(self.config.update_rate_hz);
        if acceleration == 0 {
            return u32::MAX;
        }
        let speed = u64::from(self.config.max_speed.unsigned_abs());
        u32::try_from(speed * speed / acceleration).unwrap_or(u32::MAX)
    }

    /// Runs one control step. Call once per closed sampler window.
    pub fn update(&mut self, z_position: i32, feedback: VoltageFeedback) -> HeightUpdate {
        let mut effects = HeightUpdate::idle();

        match self.state {
            ControlState::Enabled => {
                self.target_speed = self.law.target_speed(feedback);
                if !self.config.contains(z_position) {
                    self.state = ControlState::Faulted;
                    self.target_speed = 0;
                    self.current_speed = 0;
                    effects.fault = Some(ThcFault::ZOverrun {
                        position: z_position,
                    });
                    effects.program = Some(PulseProgram::PARKED);
                    return effects;
                }
            }
            ControlState::Disabling => {
                self.target_speed = 0;
                if self.current_speed == 0 {
                    self.state = ControlState::Disabled;
                    effects.release_axis = Some(z_position);
                }
            }
            ControlState::Disabled => self.target_speed = 0,
            ControlState::Faulted => {
                self.target_speed = 0;
                return effects;
            }
        }

        let limit = self.config.max_acceleration.max(0);
        let delta = self
            .target_speed
            .saturating_sub(self.current_speed)
            .clamp(-limit, limit);
        if delta == 0 {
            return effects;
        }

        let max_speed = self.config.max_speed.max(0);
        self.current_speed = self
            .current_speed
            .saturating_add(delta)
            .clamp(-max_speed, max_speed);
        effects.program = Some(PulseProgram::from_speed(self.current_speed));
        effects
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Current speed in steps/s.
    pub fn current_speed(&self) -> i32 {
        self.current_speed
    }

    pub fn target_speed(&self) -> i32 {
        self.target_speed
    }

    pub fn config(&self) -> HeightConfig {
        self.config
    }

    pub fn law_mut(&mut self) -> &mut L {
        &mut self.law
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::StepDirection;

    struct Constant(i32);

    impl TargetSpeedLaw for Constant {
        fn reset(&mut self) {}

        fn target_speed(&mut self, _feedback: VoltageFeedback) -> i32 {
            self.0
        }
    }

    fn controller(target: i32) -> HeightController<Constant> {
        HeightController::new(Constant(target), HeightConfig::default())
    }

    #[test]
    fn disabled_controller_leaves_timer_alone() {
        let mut thc = controller(5_000);
        for _ in 0..10 {
            assert_eq!(thc.update(100, VoltageFeedback::default()), HeightUpdate::idle());
        }
        assert_eq!(thc.current_speed(), 0);
    }

    #[test]
    fn ramps_by_acceleration_then_holds() {
        let mut thc = controller(1_000);
        assert_eq!(thc.enable(), EnableOutcome::Acquire);

        let first = thc.update(100, VoltageFeedback::default());
        assert_eq!(thc.current_speed(), 200);
        assert_eq!(
            first.program,
            Some(PulseProgram {
                period: 1_250,
                direction: StepDirection::Positive,
            })
        );

        for _ in 0..4 {
            thc.update(100, VoltageFeedback::default());
        }
        assert_eq!(thc.current_speed(), 1_000);

        assert_eq!(thc.update(100, VoltageFeedback::default()).program, None);
    }

    #[test]
    fn speed_saturates_at_max() {
        let mut thc = controller(-50_000);
        thc.enable();
        for _ in 0..200 {
            thc.update(100, VoltageFeedback::default());
        }
        assert_eq!(thc.current_speed(), -MAX_THC_STEP_S);
    }

    #[test]
    fn disable_decelerates_before_release() {
        let mut thc = controller(600);
        thc.enable();
        for _ in 0..3 {
            thc.update(50, VoltageFeedback::default());
        }
        assert_eq!(thc.current_speed(), 600);

        thc.disable();
        assert_eq!(thc.state(), ControlState::Disabling);

        let mut released = None;
        for _ in 0..10 {
            let effects = thc.update(57, VoltageFeedback::default());
            if let Some(z) = effects.release_axis {
                assert_eq!(thc.current_speed(), 0);
                released = Some(z);
                break;
            }
        }

        assert_eq!(released, Some(57));
        assert_eq!(thc.state(), ControlState::Disabled);
    }

    #[test]
    fn overrun_latches_fault_and_parks() {
        let mut thc = controller(800);
        thc.enable();
        thc.update(10, VoltageFeedback::default());

        let effects = thc.update(DEFAULT_Z_TOP_LIMIT + 1, VoltageFeedback::default());
        assert_eq!(
            effects.fault,
            Some(ThcFault::ZOverrun {
                position: DEFAULT_Z_TOP_LIMIT + 1
            })
        );
        assert_eq!(effects.program, Some(PulseProgram::PARKED));
        assert_eq!(thc.state(), ControlState::Faulted);

        assert_eq!(thc.update(10, VoltageFeedback::default()), HeightUpdate::idle());
        assert_eq!(thc.enable(), EnableOutcome::Refused);
    }

    #[test]
    fn bench_oscillation_flips_every_half_period() {
        let mut law = BenchOscillation::new(25_000, 4);
        law.reset();
        let feedback = VoltageFeedback::default();

        let seen: [i32; 8] = core::array::from_fn(|_| law.target_speed(feedback));
        assert_eq!(
            seen,
            [25_000, 25_000, -25_000, -25_000, -25_000, -25_000, -25_000, 25_000]
        );
    }

    #[test]
    fn acceleration_setter_uses_update_rate() {
        let mut thc = controller(0);
        thc.set_max_acceleration(500_000);
        assert_eq!(thc.config().max_acceleration, 500);
        assert_eq!(thc.max_stopping_distance(), 200);

        thc.set_max_acceleration(999);
        assert_eq!(thc.max_stopping_distance(), u32::MAX);
    }
}
