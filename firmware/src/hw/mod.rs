//! STM32G0 peripherals behind the `thc-core` hardware traits.
//!
//! Pin map:
//! - PA0 / PA1: arc divider plus and minus taps (ADC1)
//! - PB3: torch start output, PB4: arc transfer input (active low)
//! - PB5: Z step, PB6: Z direction, PB7: Z driver enable (active low)
//! - TIM3: phase-correct step timer, TIM14: sampler tick

#![cfg(target_os = "none")]

mod divider;
mod timer;

pub use divider::DividerTaps;
pub use timer::{
    SAMPLER_TICK_HZ, SamplerTick, Stm32PulseTimer, configure_pulse_timer, configure_sampler_tick,
};

use embassy_stm32::gpio::{Input, Level, Output};
use embassy_stm32::pac;
use thc_core::host::{FaultHandler, ThcFault};
use thc_core::ignition::TorchSignals;
use thc_core::pulse::{DirectionPin, StepDirection, StepPin};

use crate::telemetry;

/// GPIOB line driving the torch start relay.
const TORCH_START_PIN: usize = 3;
/// GPIOB line enabling the Z driver (low = enabled).
const Z_ENABLE_PIN: usize = 7;

/// Torch relay output and arc transfer input.
pub struct TorchPins {
    start: Output<'static>,
    transfer: Input<'static>,
}

impl TorchPins {
    pub fn new(start: Output<'static>, transfer: Input<'static>) -> Self {
        Self { start, transfer }
    }
}

impl TorchSignals for TorchPins {
    fn set_torch_start(&mut self, on: bool) {
        self.start.set_level(Level::from(on));
    }

    fn transfer_detected(&mut self) -> bool {
        self.transfer.is_low()
    }
}

pub struct StepOutput(Output<'static>);

impl StepOutput {
    pub fn new(pin: Output<'static>) -> Self {
        Self(pin)
    }
}

impl StepPin for StepOutput {
    fn set_high(&mut self) {
        self.0.set_high();
    }

    fn set_low(&mut self) {
        self.0.set_low();
    }
}

pub struct DirectionOutput(Output<'static>);

impl DirectionOutput {
    pub fn new(pin: Output<'static>) -> Self {
        Self(pin)
    }
}

impl DirectionPin for DirectionOutput {
    fn set_direction(&mut self, direction: StepDirection) {
        match direction {
            StepDirection::Positive => self.0.set_high(),
            StepDirection::Negative => self.0.set_low(),
        }
    }
}

/// Kill path: parks the step timer, drops the torch, disables Z and halts.
///
/// Writes go straight to the registers because the pins are owned by other
/// contexts by the time a fault is raised.
pub struct HaltOnFault {
    pulse_timer: Stm32PulseTimer,
}

impl HaltOnFault {
    pub fn new(pulse_timer: Stm32PulseTimer) -> Self {
        Self { pulse_timer }
    }
}

impl FaultHandler for HaltOnFault {
    fn fault(&mut self, fault: ThcFault) {
        self.pulse_timer.halt();
        pac::GPIOB.bsrr().write(|w| {
            w.set_br(TORCH_START_PIN, true);
            w.set_bs(Z_ENABLE_PIN, true);
        });
        telemetry::log_fault(fault);

        cortex_m::interrupt::disable();
        loop {
            cortex_m::asm::wfi();
        }
    }
}
