use embassy_futures::select::{Either3, select3};
use embassy_time::{Duration, Instant, Ticker};
use heapless::String;
use thc_core::host::Axis;
use thc_core::status::{StatusFormatter, StatusProvider};

use super::{AXES, SETTINGS, WindowReportReceiver};
use crate::cut::{self, CutCommandReceiver, FirmwareCutSession};
use crate::hw::TorchPins;
use crate::status::{self, FirmwareStatus};
use crate::telemetry::{self, FirmwareInstant, FirmwareTelemetry};

const CUT_TICK: Duration = Duration::from_millis(10);
/// Ticks between voltage telemetry samples while height control runs.
const VOLTAGE_SAMPLE_TICKS: u32 = 10;
/// Ticks between status log lines.
const STATUS_TICKS: u32 = 100;

#[embassy_executor::task]
pub async fn run(
    torch: TorchPins,
    commands: CutCommandReceiver<'static>,
    reports: WindowReportReceiver,
) {
    let mut session: FirmwareCutSession<'static, TorchPins> =
        FirmwareCutSession::new(torch, &SETTINGS);
    let mut telemetry = FirmwareTelemetry::new();
    status::record_ignition(session.state(), session.torch_on());
    let mut status_provider = FirmwareStatus::new(&SETTINGS, AXES.position_cell(Axis::Z));
    let mut ticker = Ticker::every(CUT_TICK);
    let queue = AXES.handle();
    let mut ticks: u32 = 0;

    loop {
        let event = select3(commands.receive(), reports.receive(), ticker.next()).await;
        let first = telemetry.next_id();
        let now = FirmwareInstant::from(Instant::now());
        let outcome = match event {
            Either3::First(command) => session.handle(command, now, &mut telemetry),
            Either3::Second(report) => {
                let z = AXES.position_cell(Axis::Z).get();
                telemetry.record_window(&report, z, now);
                telemetry::log_since(&telemetry, first);
                continue;
            }
            Either3::Third(()) => {
                ticks = ticks.wrapping_add(1);
                if SETTINGS.thc_enabled() && ticks % VOLTAGE_SAMPLE_TICKS == 0 {
                    telemetry.record_voltage(SETTINGS.actual(), SETTINGS.wanted(), now);
                }
                if ticks % STATUS_TICKS == 0 {
                    log_status(&mut status_provider);
                }
                session.poll(&queue, now, &mut telemetry)
            }
        };

        cut::publish(&session, outcome, &telemetry, first);
    }
}

fn log_status(provider: &mut FirmwareStatus<'_>) {
    let Some(snapshot) = provider.snapshot() else {
        return;
    };
    let formatter = StatusFormatter::new(&snapshot);
    let mut line: String<96> = String::new();

    if formatter.write_torch_line(&mut line).is_ok() {
        telemetry::log_status_line(&line);
    }
    line.clear();
    if formatter.write_arc_line(&mut line).is_ok() {
        telemetry::log_status_line(&line);
    }
    line.clear();
    if formatter.write_thc_line(&mut line).is_ok() {
        telemetry::log_status_line(&line);
    }

    let dropped = status::dropped_reports();
    if dropped > 0 {
        telemetry::log_notice("window reports dropped", Some(i64::from(dropped)));
    }
}
