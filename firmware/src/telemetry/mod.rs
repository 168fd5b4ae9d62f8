//! Telemetry timestamps and logging helpers.
//!
//! The ring itself lives in `thc-core`; this module supplies the firmware
//! instant type and mirrors every stored record to defmt (or stdout on the
//! host) so bring-up sessions can follow the torch without a debugger.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::time::Duration;

use embassy_time::Instant;
use thc_core::height::ControlState;
use thc_core::host::ThcFault;
use thc_core::telemetry::{
    TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecord, TelemetryRecorder,
};

/// Monotonic timestamp carried by firmware telemetry records.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(Instant::from_micros(micros))
    }

    #[must_use]
    pub const fn into_embassy(self) -> Instant {
        self.0
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_duration_since(earlier.0).as_micros())
    }
}

/// Recorder type used by the cut task.
pub type FirmwareTelemetry = TelemetryRecorder<FirmwareInstant>;

/// Logs every record written since `first`.
pub fn log_since(recorder: &FirmwareTelemetry, first: thc_core::telemetry::EventId) {
    for record in recorder.oldest_first() {
        if record.id.wrapping_sub(first) < recorder.next_id().wrapping_sub(first) {
            log_record(record);
        }
    }
}

/// Mirrors one stored record to the log.
pub fn log_record(record: &TelemetryRecord<FirmwareInstant>) {
    let timestamp_us = record.timestamp.into_embassy().as_micros();
    emit_log(
        event_label(record.event),
        timestamp_us,
        payload_detail(record.details),
    );
}

/// Logs an operator-facing notice such as a failed ignition.
pub fn log_notice(message: &'static str, value: Option<i64>) {
    emit_warn(message, value);
}

/// Logs a Z move handed to the motion board, height in hundredths of a mm.
pub fn log_z_move(height_cmm: u16) {
    emit_move(height_cmm / 100, height_cmm % 100);
}

/// Logs one rendered status line.
pub fn log_status_line(line: &str) {
    emit_status(line);
}

/// Logs a fault that is about to halt the controller.
pub fn log_fault(fault: ThcFault) {
    match fault {
        ThcFault::ZOverrun { position } => emit_error(fault.message(), i64::from(position)),
    }
}

fn payload_detail(payload: TelemetryPayload) -> Option<i64> {
    match payload {
        TelemetryPayload::None => None,
        TelemetryPayload::Ignition(details) => details
            .elapsed_since_previous
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)),
        TelemetryPayload::Voltage(voltage) => Some(i64::from(voltage.actual.volts_tenths())),
        TelemetryPayload::Pulse(pulse) => Some(i64::from(pulse.speed)),
        TelemetryPayload::Axis(position) => Some(i64::from(position)),
        TelemetryPayload::Fault(ThcFault::ZOverrun { position }) => Some(i64::from(position)),
    }
}

const fn event_label(event: TelemetryEventKind) -> &'static str {
    match event {
        TelemetryEventKind::Ignition(state) => state.label(),
        TelemetryEventKind::ArcLost => "arc-lost",
        TelemetryEventKind::AxisTaken => "axis-taken",
        TelemetryEventKind::AxisReleased => "axis-released",
        TelemetryEventKind::ZOverrun => "z-overrun",
        TelemetryEventKind::VoltageWindow => "voltage",
        TelemetryEventKind::PulseReprogram => "pulse",
        TelemetryEventKind::Control(state) => control_label(state),
        TelemetryEventKind::Custom(_) => "custom",
    }
}

const fn control_label(state: ControlState) -> &'static str {
    match state {
        ControlState::Disabled => "thc-disabled",
        ControlState::Enabled => "thc-enabled",
        ControlState::Disabling => "thc-disabling",
        ControlState::Faulted => "thc-faulted",
    }
}

#[cfg(target_os = "none")]
fn emit_log(event: &'static str, timestamp_us: u64, detail: Option<i64>) {
    if let Some(detail) = detail {
        defmt::info!("telemetry:thc {} t={}us v={}", event, timestamp_us, detail);
    } else {
        defmt::info!("telemetry:thc {} t={}us", event, timestamp_us);
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(event: &'static str, timestamp_us: u64, detail: Option<i64>) {
    if let Some(detail) = detail {
        println!("telemetry:thc {event} t={timestamp_us}us v={detail}");
    } else {
        println!("telemetry:thc {event} t={timestamp_us}us");
    }
}

#[cfg(target_os = "none")]
fn emit_move(millimetres: u16, hundredths: u16) {
    defmt::info!(
        "cut: move z to {}.{}{}mm",
        millimetres,
        hundredths / 10,
        hundredths % 10
    );
}

#[cfg(not(target_os = "none"))]
fn emit_move(millimetres: u16, hundredths: u16) {
    println!("cut: move z to {millimetres}.{hundredths:02}mm");
}

#[cfg(target_os = "none")]
fn emit_status(line: &str) {
    defmt::info!("status: {=str}", line);
}

#[cfg(not(target_os = "none"))]
fn emit_status(line: &str) {
    println!("status: {line}");
}

#[cfg(target_os = "none")]
fn emit_warn(message: &'static str, value: Option<i64>) {
    if let Some(value) = value {
        defmt::warn!("{} ({})", message, value);
    } else {
        defmt::warn!("{}", message);
    }
}

#[cfg(not(target_os = "none"))]
fn emit_warn(message: &'static str, value: Option<i64>) {
    if let Some(value) = value {
        println!("warn: {message} ({value})");
    } else {
        println!("warn: {message}");
    }
}

#[cfg(target_os = "none")]
fn emit_error(message: &'static str, value: i64) {
    defmt::error!("{} z={}", message, value);
}

#[cfg(not(target_os = "none"))]
fn emit_error(message: &'static str, value: i64) {
    println!("error: {message} z={value}");
}
