//! TIM3 step timer and TIM14 sampler tick.

use embassy_stm32::Peri;
use embassy_stm32::pac;
use embassy_stm32::pac::timer::vals;
use embassy_stm32::peripherals::{TIM3, TIM14};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::low_level::{CountingMode, Timer};
use static_cell::StaticCell;
use thc_core::config::{OVERSAMPLE_WINDOW, TIMER_CONVERSION_CONSTANT, UPDATE_RATE_HZ};
use thc_core::pulse::{CountDirection, PulseTimer};

/// Two conversions per oversample pair, one window per control update.
pub const SAMPLER_TICK_HZ: u32 = UPDATE_RATE_HZ * 2 * OVERSAMPLE_WINDOW as u32;

static PULSE_TIMER: StaticCell<Timer<'static, TIM3>> = StaticCell::new();
static SAMPLER_TIMER: StaticCell<Timer<'static, TIM14>> = StaticCell::new();

/// Puts TIM3 in center-aligned mode clocked at the step conversion rate and
/// leaves it stopped. The returned handle may be copied into each interrupt.
pub fn configure_pulse_timer(tim: Peri<'static, TIM3>) -> Stm32PulseTimer {
    let timer = PULSE_TIMER.init(Timer::new(tim));
    timer.stop();
    timer.set_counting_mode(CountingMode::CenterAlignedBothInterrupts);

    let prescaler = (timer.get_clock_frequency().0 / TIMER_CONVERSION_CONSTANT).saturating_sub(1);
    let regs = timer.regs_gp16();
    regs.psc().write_value(u16::try_from(prescaler).unwrap_or(u16::MAX));
    regs.cr1().modify(|w| {
        w.set_urs(vals::Urs::COUNTER_ONLY);
        w.set_arpe(false);
    });
    regs.egr().write(|w| w.set_ug(true));

    Stm32PulseTimer { regs }
}

/// Starts TIM14 at [`SAMPLER_TICK_HZ`] with its update interrupt armed.
pub fn configure_sampler_tick(tim: Peri<'static, TIM14>) -> SamplerTick {
    let timer = SAMPLER_TIMER.init(Timer::new(tim));
    timer.set_frequency(Hertz(SAMPLER_TICK_HZ));
    timer.enable_update_interrupt(true);
    timer.start();

    SamplerTick {
        regs: timer.regs_core(),
    }
}

/// Register handle over TIM3.
#[derive(Copy, Clone)]
pub struct Stm32PulseTimer {
    regs: pac::timer::TimGp16,
}

impl Stm32PulseTimer {
    /// Clears the update flag; returns `false` for spurious entries.
    pub fn acknowledge(&self) -> bool {
        let pending = self.regs.sr().read().uif();
        self.regs.sr().modify(|w| w.set_uif(false));
        pending
    }

    /// Stops the counter and parks the period.
    pub fn halt(&mut self) {
        self.pause_clock();
        self.set_period(u16::MAX);
    }
}

impl PulseTimer for Stm32PulseTimer {
    fn set_period(&mut self, period: u16) {
        self.regs.arr().write(|w| w.set_arr(period));
    }

    fn period(&self) -> u16 {
        self.regs.arr().read().arr()
    }

    fn set_counter(&mut self, value: u16) {
        self.regs.cnt().write(|w| w.set_cnt(value));
    }

    fn current_counter(&self) -> u16 {
        self.regs.cnt().read().cnt()
    }

    fn pause_clock(&mut self) {
        self.regs.cr1().modify(|w| w.set_cen(false));
    }

    fn resume_clock(&mut self) {
        self.regs.cr1().modify(|w| w.set_cen(true));
    }

    fn counting_direction(&self) -> CountDirection {
        match self.regs.cr1().read().dir() {
            vals::Dir::DOWN => CountDirection::Down,
            _ => CountDirection::Up,
        }
    }

    fn enable_interrupts(&mut self) {
        self.regs.dier().modify(|w| w.set_uie(true));
    }
}

/// Register handle over TIM14.
#[derive(Copy, Clone)]
pub struct SamplerTick {
    regs: pac::timer::TimCore,
}

impl SamplerTick {
    pub fn acknowledge(&self) {
        self.regs.sr().modify(|w| w.set_uif(false));
    }
}
