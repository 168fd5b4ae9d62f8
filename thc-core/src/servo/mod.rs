//! Hardware binding for the height controller.
//!
//! [`ThcServo`] applies the effects returned by
//! [`HeightController::update`](crate::height::HeightController::update):
//! timer programs go through the phase-preserving [`reprogram`], axis hand-off
//! goes through the [`HostStepper`] protocol and travel faults go to the
//! [`FaultHandler`]. [`ControlLoop`] is the body of the sampler interrupt and
//! drives the servo once per closed window.

use crate::config::MAX_TIMER_PERIOD;
use crate::height::{
    ControlState, EnableOutcome, HeightController, HeightUpdate, TargetSpeedLaw, VoltageFeedback,
};
use crate::host::{Axis, FaultHandler, HostStepper};
use crate::pulse::{DirectionPin, PulseProgram, PulseShared, PulseTimer, reprogram};
use crate::sampler::{DividerAdc, VoltageReading, VoltageSampler};
use crate::settings::PlasmaSettings;

/// Height controller wired to the pulse timer and direction output.
pub struct ThcServo<'a, L, T, D> {
    controller: HeightController<L>,
    timer: T,
    direction: D,
    shared: &'a PulseShared,
}

impl<'a, L, T, D> ThcServo<'a, L, T, D>
where
    L: TargetSpeedLaw,
    T: PulseTimer,
    D: DirectionPin,
{
    pub const fn new(
        controller: HeightController<L>,
        timer: T,
        direction: D,
        shared: &'a PulseShared,
    ) -> Self {
        Self {
            controller,
            timer,
            direction,
            shared,
        }
    }

    /// Parks the timer at its longest period and arms both interrupts.
    pub fn init(&mut self) {
        critical_section::with(|_| {
            self.timer.pause_clock();
            self.timer.set_period(MAX_TIMER_PERIOD);
            // The last step is at least one full period old.
            self.timer.set_counter(MAX_TIMER_PERIOD);
            self.timer.enable_interrupts();
        });
    }

    /// Takes Z from the host stepper and starts the loop.
    pub fn enable<H>(&mut self, host: &mut H) -> EnableOutcome
    where
        H: HostStepper + ?Sized,
    {
        let outcome = self.controller.enable();
        if outcome == EnableOutcome::Acquire {
            host.leave_control_on(Axis::Z);
        }
        outcome
    }

    /// Starts the graceful stop; Z is handed back by a later update.
    pub fn disable(&mut self) {
        self.controller.disable();
    }

    /// Runs one control update and applies its effects.
    pub fn update<H, F>(
        &mut self,
        feedback: VoltageFeedback,
        host: &mut H,
        faults: &mut F,
    ) -> HeightUpdate
    where
        H: HostStepper + ?Sized,
        F: FaultHandler + ?Sized,
    {
        let z = host.position(Axis::Z);
        let effects = self.controller.update(z, feedback);

        if let Some(program) = effects.program {
            self.apply(program);
        }
        if let Some(position) = effects.release_axis {
            host.set_position(Axis::Z, position);
            host.take_control_on(Axis::Z);
        }
        if let Some(fault) = effects.fault {
            faults.fault(fault);
        }

        effects
    }

    fn apply(&mut self, program: PulseProgram) {
        critical_section::with(|_| {
            self.timer.pause_clock();
            self.direction.set_direction(program.direction);
            self.shared.set_direction(program.direction);
            reprogram(&mut self.timer, program.period);
        });
    }

    pub fn controller(&self) -> &HeightController<L> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut HeightController<L> {
        &mut self.controller
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

/// Fixed-rate work run after every closed sampler window.
pub trait Housekeeping {
    fn on_window(&mut self, reading: VoltageReading);
}

/// Housekeeping that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHousekeeping;

impl Housekeeping for NoHousekeeping {
    fn on_window(&mut self, _reading: VoltageReading) {}
}

/// Summary of one closed window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WindowReport {
    pub reading: VoltageReading,
    pub control: ControlState,
    pub speed: i32,
    pub effects: HeightUpdate,
    /// Set when the enable flag changed the controller state this window.
    pub enable: Option<EnableOutcome>,
}

/// Sampler, servo and settings owned by the sampler interrupt.
pub struct ControlLoop<'a, A, L, T, D> {
    sampler: VoltageSampler<A>,
    servo: ThcServo<'a, L, T, D>,
    settings: &'a PlasmaSettings,
}

impl<'a, A, L, T, D> ControlLoop<'a, A, L, T, D>
where
    A: DividerAdc,
    L: TargetSpeedLaw,
    T: PulseTimer,
    D: DirectionPin,
{
    pub const fn new(
        sampler: VoltageSampler<A>,
        servo: ThcServo<'a, L, T, D>,
        settings: &'a PlasmaSettings,
    ) -> Self {
        Self {
            sampler,
            servo,
            settings,
        }
    }

    /// Parks the pulse timer and starts the first conversion.
    pub fn init(&mut self) {
        self.servo.init();
        self.sampler.prime();
    }

    /// Sampler interrupt body.
    ///
    /// Between window boundaries this only accumulates. On a boundary it
    /// publishes the reading, follows the enable flag, runs the control update
    /// and then the housekeeping hook.
    pub fn tick<H, F, K>(
        &mut self,
        host: &mut H,
        faults: &mut F,
        housekeeping: &mut K,
    ) -> Option<WindowReport>
    where
        H: HostStepper + ?Sized,
        F: FaultHandler + ?Sized,
        K: Housekeeping + ?Sized,
    {
        let reading = self.sampler.tick()?;
        self.settings.record_actual(reading);

        let enable = self.follow_enable_flag(host);
        let effects = self.servo.update(self.settings.feedback(), host, faults);
        housekeeping.on_window(reading);

        let controller = self.servo.controller();
        Some(WindowReport {
            reading,
            control: controller.state(),
            speed: controller.current_speed(),
            effects,
            enable,
        })
    }

    fn follow_enable_flag<H>(&mut self, host: &mut H) -> Option<EnableOutcome>
    where
        H: HostStepper + ?Sized,
    {
        let wanted = self.settings.thc_enabled();
        match (wanted, self.servo.controller().state()) {
            (true, ControlState::Disabled | ControlState::Disabling) => {
                Some(self.servo.enable(host))
            }
            (false, ControlState::Enabled) => {
                self.servo.disable();
                None
            }
            _ => None,
        }
    }

    pub fn sampler(&self) -> &VoltageSampler<A> {
        &self.sampler
    }

    pub fn sampler_mut(&mut self) -> &mut VoltageSampler<A> {
        &mut self.sampler
    }

    pub fn servo(&self) -> &ThcServo<'a, L, T, D> {
        &self.servo
    }

    pub fn servo_mut(&mut self) -> &mut ThcServo<'a, L, T, D> {
        &mut self.servo
    }
}
