use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, Mutex, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::{Adc, AdcChannel};
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver};
use static_cell::StaticCell;
use thc_core::config::DEFAULT_CUT_VOLTAGE;
use thc_core::height::{BenchOscillation, HeightConfig, HeightController, HeightUpdate};
use thc_core::host::Axis;
use thc_core::pulse::{CountDirection, PulseShared, PulseTimer, StepPulseEmitter};
use thc_core::sampler::{SamplerConfig, VoltageSampler};
use thc_core::servo::{ControlLoop, NoHousekeeping, ThcServo, WindowReport};
use thc_core::settings::PlasmaSettings;

use crate::axis::AxisTable;
use crate::cut::CutCommandQueue;
use crate::hw::{
    self, DirectionOutput, DividerTaps, HaltOnFault, SamplerTick, StepOutput, Stm32PulseTimer,
    TorchPins,
};
use crate::status;

mod cut_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

const WINDOW_REPORT_DEPTH: usize = 16;

type WindowReportQueue = Channel<CriticalSectionRawMutex, WindowReport, WINDOW_REPORT_DEPTH>;
type WindowReportReceiver =
    Receiver<'static, CriticalSectionRawMutex, WindowReport, WINDOW_REPORT_DEPTH>;

type FirmwareLoop =
    ControlLoop<'static, DividerTaps, BenchOscillation, Stm32PulseTimer, DirectionOutput>;

/// State owned by the sampler interrupt.
struct SamplerContext {
    control: FirmwareLoop,
    tick: SamplerTick,
    faults: HaltOnFault,
}

/// State owned by the step interrupt.
struct PulseContext {
    emitter: StepPulseEmitter<'static, StepOutput>,
    timer: Stm32PulseTimer,
}

pub(super) static SETTINGS: PlasmaSettings = PlasmaSettings::new(0);
pub(super) static AXES: AxisTable = AxisTable::new();
/// Inbox of the cut task. The operator command parser (G-code or panel) owns
/// the sending side; this firmware only consumes it.
pub(super) static CUT_COMMANDS: CutCommandQueue = Channel::new();
static WINDOW_REPORTS: WindowReportQueue = Channel::new();
static PULSE_SHARED: PulseShared = PulseShared::new();
static Z_ENABLE: StaticCell<Output<'static>> = StaticCell::new();

// Handed to the interrupts once; each handler moves its context into a
// handler-local static on first entry.
static SAMPLER_CONTEXT: Mutex<RefCell<Option<SamplerContext>>> = Mutex::new(RefCell::new(None));
static PULSE_CONTEXT: Mutex<RefCell<Option<PulseContext>>> = Mutex::new(RefCell::new(None));

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PB3,
        PB4,
        PB5,
        PB6,
        PB7,
        ADC1,
        TIM3,
        TIM14,
        ..
    } = hal::init(config);

    SETTINGS.set_wanted_voltage(DEFAULT_CUT_VOLTAGE);
    Z_ENABLE.init(Output::new(PB7, Level::Low, Speed::Low));

    let pulse_timer = hw::configure_pulse_timer(TIM3);
    let divider = DividerTaps::new(Adc::new(ADC1), PA0.degrade_adc(), PA1.degrade_adc());
    let servo = ThcServo::new(
        HeightController::new(BenchOscillation::default(), HeightConfig::default()),
        pulse_timer,
        DirectionOutput::new(Output::new(PB6, Level::Low, Speed::VeryHigh)),
        &PULSE_SHARED,
    );
    let mut control = ControlLoop::new(
        VoltageSampler::new(divider, SamplerConfig::default()),
        servo,
        &SETTINGS,
    );
    control.init();
    status::record_stop_distance(control.servo().controller().max_stopping_distance());

    let emitter = StepPulseEmitter::new(
        StepOutput::new(Output::new(PB5, Level::Low, Speed::VeryHigh)),
        &PULSE_SHARED,
        AXES.position_cell(Axis::Z),
    );
    let tick = hw::configure_sampler_tick(TIM14);

    critical_section::with(|cs| {
        PULSE_CONTEXT.borrow_ref_mut(cs).replace(PulseContext {
            emitter,
            timer: pulse_timer,
        });
        SAMPLER_CONTEXT.borrow_ref_mut(cs).replace(SamplerContext {
            control,
            tick,
            faults: HaltOnFault::new(pulse_timer),
        });
    });

    hal::interrupt::TIM3_TIM4.set_priority(Priority::P0);
    hal::interrupt::TIM14.set_priority(Priority::P1);
    unsafe {
        hal::interrupt::TIM3_TIM4.enable();
        hal::interrupt::TIM14.enable();
    }

    let torch = TorchPins::new(
        Output::new(PB3, Level::Low, Speed::Low),
        Input::new(PB4, Pull::Up),
    );

    spawner
        .spawn(cut_task::run(
            torch,
            CUT_COMMANDS.receiver(),
            WINDOW_REPORTS.receiver(),
        ))
        .expect("failed to spawn cut task");

    core::future::pending::<()>().await;
}

#[hal::interrupt]
fn TIM14() {
    static mut CONTEXT: Option<SamplerContext> = None;

    if CONTEXT.is_none() {
        *CONTEXT = critical_section::with(|cs| SAMPLER_CONTEXT.borrow_ref_mut(cs).take());
    }
    let Some(context) = CONTEXT.as_mut() else {
        return;
    };
    context.tick.acknowledge();

    let mut host = AXES.handle();
    let Some(report) = context
        .control
        .tick(&mut host, &mut context.faults, &mut NoHousekeeping)
    else {
        return;
    };

    status::record_window(&report);
    let quiet = report.effects == HeightUpdate::idle() && report.enable.is_none();
    if !quiet && WINDOW_REPORTS.try_send(report).is_err() {
        status::record_dropped_report();
    }
}

#[hal::interrupt]
fn TIM3_TIM4() {
    static mut CONTEXT: Option<PulseContext> = None;

    if CONTEXT.is_none() {
        *CONTEXT = critical_section::with(|cs| PULSE_CONTEXT.borrow_ref_mut(cs).take());
    }
    let Some(context) = CONTEXT.as_mut() else {
        return;
    };
    if !context.timer.acknowledge() {
        return;
    }

    // The counter has already turned when the update fires: counting down
    // means the top was just reached.
    let _ = match context.timer.counting_direction() {
        CountDirection::Down => context.emitter.on_overflow(&mut context.timer),
        CountDirection::Up => context.emitter.on_capture(&mut context.timer),
    };
}
