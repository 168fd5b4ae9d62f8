//! Simulated torch bench: every `thc-core` component wired to the simulated
//! hardware from `thc_core::sim`, advanced one millisecond at a time.

use std::time::Duration;

use thc_core::config::CALIBRATION_OFFSET_COUNTS;
use thc_core::cut::{CutCommand, CutOutcome, CutParameters, CutRequest, CutSession, ZMove};
use thc_core::height::{BenchOscillation, HeightConfig, HeightController};
use thc_core::host::{AtomicPosition, Axis};
use thc_core::ignition::IgnitionState;
use thc_core::pulse::{PulseShared, StepPulseEmitter};
use thc_core::sampler::{SamplerConfig, VoltageSampler, target_counts};
use thc_core::servo::{ControlLoop, NoHousekeeping, ThcServo};
use thc_core::settings::PlasmaSettings;
use thc_core::sim::{
    RecordingFault, SimDirectionPin, SimDividerAdc, SimHostStepper, SimPulseTimer, SimQueue,
    SimStepPin, SimTorch, TimerEvent,
};
use thc_core::status::{StatusProvider, StatusSnapshot};
use thc_core::telemetry::{
    EventId, TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecord,
    TelemetryRecorder,
};

/// Timer clocks between two sampler interrupts (250 kHz / 16 kHz).
const TIMER_TICKS_PER_SAMPLE: u32 = 16;
/// Sampler interrupts per millisecond: one window of eight tap pairs.
const SAMPLES_PER_MS: u32 = 16;
/// Command loop period.
const COMMAND_TICK_MS: u64 = 10;
/// Voltage telemetry period while height control runs.
const VOLTAGE_SAMPLE_MS: u64 = 100;
/// Simulated arc voltage change per step of Z travel, in tenths of a volt.
const ARC_TENTHS_PER_STEP: i32 = 1;
/// Z steps per hundredth of a millimetre.
const STEPS_PER_CMM: i32 = 1;
/// Travel of a host-planned Z move per millisecond.
const HOST_MOVE_STEPS_PER_MS: i32 = 20;

/// Microseconds of simulated time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct BenchInstant(u64);

impl BenchInstant {
    pub fn as_millis(self) -> u64 {
        self.0 / 1_000
    }
}

impl TelemetryInstant for BenchInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Physical behaviour of the simulated torch and table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BenchProfile {
    pub z_bottom_limit: i32,
    pub z_top_limit: i32,
    pub start_z: i32,
    /// Z position, in steps, where the torch touches the plate.
    pub surface_z: i32,
    /// Delay between torch start and arc transfer; `None` never transfers.
    pub transfer_after_ms: Option<u64>,
    /// Arc duration once transferred; `None` keeps the arc.
    pub arc_lasts_ms: Option<u64>,
    /// Arc voltage with the torch at cut height.
    pub arc_volts: u16,
}

impl Default for BenchProfile {
    fn default() -> Self {
        Self {
            z_bottom_limit: 0,
            z_top_limit: 4_000,
            start_z: 2_000,
            surface_z: 1_850,
            transfer_after_ms: Some(300),
            arc_lasts_ms: None,
            arc_volts: 118,
        }
    }
}

type BenchLoop =
    ControlLoop<'static, SimDividerAdc, BenchOscillation, SimPulseTimer, SimDirectionPin>;

/// Lines produced while the bench runs.
#[derive(Debug, Default)]
pub struct BenchOutput {
    pub lines: Vec<String>,
}

pub struct Bench {
    profile: BenchProfile,
    settings: &'static PlasmaSettings,
    position: &'static AtomicPosition,
    control: BenchLoop,
    emitter: StepPulseEmitter<'static, SimStepPin>,
    host: SimHostStepper<'static>,
    faults: RecordingFault,
    session: CutSession<'static, SimTorch, BenchInstant>,
    queue: SimQueue,
    telemetry: TelemetryRecorder<BenchInstant>,
    printed: EventId,
    /// Host-planned Z move still in flight, in steps.
    z_target: Option<i32>,
    torch_started_ms: Option<u64>,
    transferred_ms: Option<u64>,
    now_ms: u64,
    halted: bool,
}

impl Bench {
    pub fn new(profile: BenchProfile) -> Self {
        // Each session lives for the whole process; leaking gives the
        // interrupt-side borrows the same 'static shape as on the target.
        let settings: &'static PlasmaSettings = Box::leak(Box::new(PlasmaSettings::default()));
        let shared: &'static PulseShared = Box::leak(Box::new(PulseShared::new()));
        let position: &'static AtomicPosition =
            Box::leak(Box::new(AtomicPosition::new(profile.start_z)));

        let config =
            HeightConfig::default().with_limits(profile.z_bottom_limit, profile.z_top_limit);
        let servo = ThcServo::new(
            HeightController::new(BenchOscillation::default(), config),
            SimPulseTimer::new(),
            SimDirectionPin::default(),
            shared,
        );
        let sampler = VoltageSampler::new(SimDividerAdc::new(0, 100), SamplerConfig::default());
        let mut control = ControlLoop::new(sampler, servo, settings);
        control.init();

        Self {
            profile,
            settings,
            position,
            control,
            emitter: StepPulseEmitter::new(SimStepPin::default(), shared, position),
            host: SimHostStepper::new(position),
            faults: RecordingFault::default(),
            session: CutSession::new(SimTorch::default(), settings),
            queue: SimQueue::default(),
            telemetry: TelemetryRecorder::new(),
            printed: 0,
            z_target: None,
            torch_started_ms: None,
            transferred_ms: None,
            now_ms: 0,
            halted: false,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn ignition_state(&self) -> IgnitionState {
        self.session.state()
    }

    pub fn z_position(&self) -> i32 {
        self.position.get()
    }

    pub fn parameters(&self) -> CutParameters {
        self.session.parameters()
    }

    pub fn set_arc_volts(&mut self, volts: u16) {
        self.profile.arc_volts = volts;
    }

    /// Sets the height controller's acceleration limit in steps/s².
    pub fn set_max_acceleration(&mut self, steps_per_s2: u32) {
        self.control
            .servo_mut()
            .controller_mut()
            .set_max_acceleration(steps_per_s2);
    }

    /// Starts a cut: raise to the initial height, fire, wait for transfer.
    pub fn start(&mut self, request: CutRequest, out: &mut BenchOutput) {
        self.command(CutCommand::Start(request), out);
    }

    pub fn stop(&mut self, out: &mut BenchOutput) {
        self.command(CutCommand::Stop, out);
    }

    pub fn stop_after_move(&mut self, out: &mut BenchOutput) {
        self.command(CutCommand::StopAfterMove, out);
    }

    pub fn lock(&mut self, out: &mut BenchOutput) {
        self.command(CutCommand::Lock, out);
    }

    pub fn unlock(&mut self, out: &mut BenchOutput) {
        self.command(CutCommand::Unlock, out);
    }

    pub fn request_thc(&mut self, enabled: bool, out: &mut BenchOutput) {
        self.command(CutCommand::SetThc(enabled), out);
    }

    pub fn set_dry_run(&mut self, enabled: bool, out: &mut BenchOutput) {
        self.command(CutCommand::SetDryRun(enabled), out);
    }

    /// Advances simulated time by `millis`, stopping early on a fault.
    pub fn run(&mut self, millis: u64, out: &mut BenchOutput) {
        for _ in 0..millis {
            if self.halted {
                break;
            }
            self.step_millisecond(out);
        }
    }

    fn now(&self) -> BenchInstant {
        BenchInstant(self.now_ms * 1_000)
    }

    fn command(&mut self, command: CutCommand, out: &mut BenchOutput) {
        let now = self.now();
        let was_on = self.session.torch_on();
        let outcome = self.session.handle(command, now, &mut self.telemetry);
        self.apply(was_on, outcome, out);
    }

    fn step_millisecond(&mut self, out: &mut BenchOutput) {
        self.advance_host_move();
        self.update_divider();

        for _ in 0..SAMPLES_PER_MS {
            for _ in 0..TIMER_TICKS_PER_SAMPLE {
                let timer = self.control.servo_mut().timer_mut();
                match timer.advance() {
                    Some(TimerEvent::Top) => {
                        self.emitter.on_overflow(timer);
                    }
                    Some(TimerEvent::Bottom) => {
                        self.emitter.on_capture(timer);
                    }
                    None => {}
                }
            }

            let report = self
                .control
                .tick(&mut self.host, &mut self.faults, &mut NoHousekeeping);
            if let Some(report) = report {
                let z = self.position.get();
                self.telemetry.record_window(&report, z, self.now());
                if let Some(fault) = report.effects.fault {
                    self.drain(out);
                    out.lines.push(format!("halted: {fault}"));
                    self.command(CutCommand::Stop, out);
                    self.halted = true;
                    return;
                }
            }
        }

        self.now_ms += 1;
        if self.now_ms % COMMAND_TICK_MS == 0 {
            self.command_tick(out);
        }
        if self.now_ms % VOLTAGE_SAMPLE_MS == 0 && self.settings.thc_enabled() {
            self.telemetry.record_voltage(
                self.settings.actual(),
                self.settings.wanted(),
                self.now(),
            );
        }
        self.drain(out);
    }

    fn command_tick(&mut self, out: &mut BenchOutput) {
        let arc = self.arc_present();
        self.session.signals_mut().transferred = arc;
        if arc && self.transferred_ms.is_none() {
            self.transferred_ms = Some(self.now_ms);
        }

        let now = self.now();
        let was_on = self.session.torch_on();
        let outcome = self.session.poll(&self.queue, now, &mut self.telemetry);
        self.apply(was_on, outcome, out);
    }

    /// Tracks the torch edges for the arc model and prints what the session
    /// asked for.
    fn apply(&mut self, was_on: bool, outcome: CutOutcome, out: &mut BenchOutput) {
        let torch_on = self.session.torch_on();
        if torch_on && !was_on {
            self.torch_started_ms = Some(self.now_ms);
            self.transferred_ms = None;
        } else if !torch_on {
            self.torch_started_ms = None;
        }

        self.drain(out);
        if let Some(notice) = outcome.notice {
            out.lines.push(notice.to_string());
        }
        if let Some(ZMove { height_cmm }) = outcome.z_move {
            out.lines
                .push(format!("move z {}.{:02}mm", height_cmm / 100, height_cmm % 100));
            if self.z_target.is_none() {
                self.queue.push(1);
            }
            self.z_target = Some(self.height_to_steps(height_cmm));
        }
    }

    /// Moves Z toward the planned target while the host owns the axis.
    fn advance_host_move(&mut self) {
        let Some(target) = self.z_target else {
            return;
        };
        if !self.host.owned_by_host(Axis::Z) {
            return;
        }
        let z = self.position.get();
        let next = z + (target - z).clamp(-HOST_MOVE_STEPS_PER_MS, HOST_MOVE_STEPS_PER_MS);
        self.position.set(next);
        if next == target {
            self.z_target = None;
            self.queue.complete_one();
        }
    }

    fn height_to_steps(&self, height_cmm: u16) -> i32 {
        self.profile.surface_z + i32::from(height_cmm) * STEPS_PER_CMM
    }

    fn arc_present(&self) -> bool {
        let Some(started) = self.torch_started_ms else {
            return false;
        };
        if !self.session.signals().torch_on {
            return false;
        }
        let Some(delay) = self.profile.transfer_after_ms else {
            return false;
        };
        if self.now_ms < started + delay {
            return false;
        }
        match (self.profile.arc_lasts_ms, self.transferred_ms) {
            (Some(lasts), Some(transferred)) => self.now_ms < transferred + lasts,
            _ => true,
        }
    }

    /// Arc voltage rises with torch height above the cut height.
    fn update_divider(&mut self) {
        let counts = if self.session.signals().torch_on && self.transferred_ms.is_some() {
            let cut_z = self.height_to_steps(self.session.parameters().cut_height_cmm);
            let tenths = i32::from(self.profile.arc_volts) * 10
                + (self.position.get() - cut_z) * ARC_TENTHS_PER_STEP;
            let volts = u16::try_from((tenths / 10).max(0)).unwrap_or(u16::MAX);
            target_counts(volts)
        } else {
            0
        };
        self.control
            .sampler_mut()
            .adc_mut()
            .set_arc_counts(counts, CALIBRATION_OFFSET_COUNTS);
    }

    fn drain(&mut self, out: &mut BenchOutput) {
        let next = self.telemetry.next_id();
        for record in self.telemetry.oldest_first() {
            if record.id.wrapping_sub(self.printed) < next.wrapping_sub(self.printed) {
                if let Some(line) = describe_record(record) {
                    out.lines.push(line);
                }
            }
        }
        self.printed = next;
    }
}

impl StatusProvider for Bench {
    fn snapshot(&mut self) -> Option<StatusSnapshot> {
        let controller = self.control.servo().controller();
        Some(StatusSnapshot {
            ignition: self.session.state(),
            torch_on: self.session.signals().torch_on,
            control: controller.state(),
            thc_enabled: self.settings.thc_enabled(),
            actual: self.settings.actual(),
            wanted: self.settings.wanted(),
            speed: controller.current_speed(),
            z_position: self.position.get(),
            stop_distance: controller.max_stopping_distance(),
        })
    }
}

/// Formats a record for the transcript; per-window pulse records are skipped.
fn describe_record(record: &TelemetryRecord<BenchInstant>) -> Option<String> {
    if record.event == TelemetryEventKind::PulseReprogram {
        return None;
    }
    let head = format!(
        "telemetry #{} t={}ms {}",
        record.id,
        record.timestamp.as_millis(),
        record.event
    );
    let detail = match record.details {
        TelemetryPayload::None => None,
        TelemetryPayload::Ignition(details) => details
            .elapsed_since_previous
            .map(|elapsed| format!("from={} after={}ms", details.from, elapsed.as_millis())),
        TelemetryPayload::Voltage(voltage) => {
            Some(format!("actual={} wanted={}", voltage.actual, voltage.wanted))
        }
        TelemetryPayload::Pulse(pulse) => {
            Some(format!("period={} speed={}", pulse.period, pulse.speed))
        }
        TelemetryPayload::Axis(position) => Some(format!("z={position}")),
        TelemetryPayload::Fault(fault) => Some(fault.to_string()),
    };
    Some(match detail {
        Some(detail) => format!("{head} {detail}"),
        None => head,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use thc_core::height::ControlState;

    fn unlocked(profile: BenchProfile) -> (Bench, BenchOutput) {
        let mut bench = Bench::new(profile);
        let mut out = BenchOutput::default();
        bench.unlock(&mut out);
        (bench, out)
    }

    fn cut_moves(out: &BenchOutput) -> usize {
        out.lines.iter().filter(|line| *line == "move z 1.50mm").count()
    }

    #[test]
    fn cut_transfers_and_enables_height_control() {
        let (mut bench, mut out) = unlocked(BenchProfile::default());

        bench.start(CutRequest::default(), &mut out);
        bench.run(600, &mut out);

        assert_eq!(bench.ignition_state(), IgnitionState::Established);
        assert!(bench.settings.thc_enabled());
        assert!(out.lines.iter().any(|line| line == "plasma transfer"));
        let snapshot = bench.snapshot().expect("snapshot");
        assert_eq!(snapshot.control, ControlState::Enabled);
        assert!(!snapshot.actual.is_zero());
        assert!(snapshot.stop_distance > 0);
    }

    #[test]
    fn cut_pierces_then_moves_to_cut_height() {
        let (mut bench, mut out) = unlocked(BenchProfile::default());
        let request = CutRequest {
            pierce_delay_ms: Some(300),
            ..CutRequest::default()
        };

        bench.start(request, &mut out);
        assert!(out.lines.iter().any(|line| line == "move z 3.80mm"));
        bench.run(50, &mut out);
        assert_eq!(bench.z_position(), 2_230);

        // Transfer is seen on the 310 ms poll; the pierce ends 300 ms later.
        bench.run(550, &mut out);
        assert!(out.lines.iter().any(|line| line == "plasma transfer"));
        assert_eq!(cut_moves(&out), 0);
        bench.run(20, &mut out);
        assert_eq!(cut_moves(&out), 1);

        // Height control owns Z; the planned move lands once it lets go.
        bench.stop(&mut out);
        bench.run(300, &mut out);
        assert_eq!(bench.z_position(), 2_000);
        assert_eq!(bench.queue.pending, 0);
    }

    #[test]
    fn dry_run_sequences_heights_without_firing() {
        let (mut bench, mut out) = unlocked(BenchProfile::default());
        let request = CutRequest {
            pierce_delay_ms: Some(200),
            ..CutRequest::default()
        };

        bench.set_dry_run(true, &mut out);
        bench.start(request, &mut out);
        assert!(out.lines.iter().any(|line| line == "dry run, torch not fired"));
        bench.run(150, &mut out);
        assert_eq!(bench.z_position(), 2_230);
        assert_eq!(cut_moves(&out), 0);

        bench.run(200, &mut out);
        assert_eq!(cut_moves(&out), 1);
        assert_eq!(bench.z_position(), 2_000);
        assert_eq!(bench.session.signals().starts, 0);
        assert!(!bench.settings.thc_enabled());
    }

    #[test]
    fn lost_arc_stops_torch_and_hands_z_back() {
        let (mut bench, mut out) = unlocked(BenchProfile {
            arc_lasts_ms: Some(500),
            ..BenchProfile::default()
        });

        bench.start(CutRequest::default(), &mut out);
        bench.run(1_500, &mut out);

        assert_eq!(bench.ignition_state(), IgnitionState::Lost);
        assert!(!bench.settings.thc_enabled());
        assert!(out.lines.iter().any(|line| line == "arc lost, torch stopped"));
        assert!(out.lines.iter().any(|line| line.contains("arc-lost")));
        assert!(out.lines.iter().any(|line| line.contains("axis-released")));
    }

    #[test]
    fn narrow_travel_window_halts_bench() {
        let (mut bench, mut out) = unlocked(BenchProfile {
            z_top_limit: 1_200,
            start_z: 1_000,
            surface_z: 850,
            ..BenchProfile::default()
        });

        bench.start(CutRequest::default(), &mut out);
        bench.run(5_000, &mut out);

        assert!(bench.halted());
        assert!(bench.now_ms() < 5_000);
        assert!(out.lines.iter().any(|line| line.starts_with("halted: Stop: Z overrun.")));
        assert_eq!(bench.ignition_state(), IgnitionState::Off);
    }

    #[test]
    fn acceleration_setting_shrinks_stop_distance() {
        let mut bench = Bench::new(BenchProfile::default());
        let before = bench.snapshot().expect("snapshot").stop_distance;

        bench.set_max_acceleration(50_000);

        let after = bench.snapshot().expect("snapshot").stop_distance;
        assert!(after > before, "before={before} after={after}");
    }
}
