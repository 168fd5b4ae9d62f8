//! Telemetry event catalog and ring recorder shared by firmware and host targets.
//!
//! The core never logs. Callers feed ignition steps and window reports into a
//! [`TelemetryRecorder`], which keeps the most recent records in a fixed-size
//! ring. Event kinds encode to compact `u16` codes so they can be mirrored over
//! RTT or printed by the emulator without carrying strings.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::height::{ControlState, EnableOutcome};
use crate::host::ThcFault;
use crate::ignition::{IgnitionState, IgnitionStep};
use crate::pulse::{PulseProgram, StepDirection};
use crate::sampler::VoltageReading;
use crate::servo::WindowReport;

/// Monotonic identifier assigned to each record.
pub type EventId = u32;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    /// Ignition machine entered the given state.
    Ignition(IgnitionState),
    ArcLost,
    /// Height controller took Z from the host stepper.
    AxisTaken,
    /// Z handed back to the host stepper.
    AxisReleased,
    ZOverrun,
    /// Height controller state changed.
    Control(ControlState),
    VoltageWindow,
    PulseReprogram,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::Ignition(state) => write!(f, "ignition {state}"),
            TelemetryEventKind::ArcLost => f.write_str("arc-lost"),
            TelemetryEventKind::AxisTaken => f.write_str("axis-taken"),
            TelemetryEventKind::AxisReleased => f.write_str("axis-released"),
            TelemetryEventKind::ZOverrun => f.write_str("z-overrun"),
            TelemetryEventKind::Control(state) => write!(f, "control {state}"),
            TelemetryEventKind::VoltageWindow => f.write_str("voltage-window"),
            TelemetryEventKind::PulseReprogram => f.write_str("pulse-reprogram"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const IGNITION_BASE: u16 = 0x0000;
    const ARC_LOST_CODE: u16 = 0x0008;
    const AXIS_TAKEN_CODE: u16 = 0x0009;
    const AXIS_RELEASED_CODE: u16 = 0x000A;
    const Z_OVERRUN_CODE: u16 = 0x000B;
    const VOLTAGE_WINDOW_CODE: u16 = 0x000C;
    const PULSE_REPROGRAM_CODE: u16 = 0x000D;
    const CONTROL_BASE: u16 = 0x0010;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::Ignition(state) => Self::IGNITION_BASE + state.as_index(),
            TelemetryEventKind::ArcLost => Self::ARC_LOST_CODE,
            TelemetryEventKind::AxisTaken => Self::AXIS_TAKEN_CODE,
            TelemetryEventKind::AxisReleased => Self::AXIS_RELEASED_CODE,
            TelemetryEventKind::ZOverrun => Self::Z_OVERRUN_CODE,
            TelemetryEventKind::VoltageWindow => Self::VOLTAGE_WINDOW_CODE,
            TelemetryEventKind::PulseReprogram => Self::PULSE_REPROGRAM_CODE,
            TelemetryEventKind::Control(state) => Self::CONTROL_BASE + state.as_index(),
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::ARC_LOST_CODE => TelemetryEventKind::ArcLost,
            Self::AXIS_TAKEN_CODE => TelemetryEventKind::AxisTaken,
            Self::AXIS_RELEASED_CODE => TelemetryEventKind::AxisReleased,
            Self::Z_OVERRUN_CODE => TelemetryEventKind::ZOverrun,
            Self::VOLTAGE_WINDOW_CODE => TelemetryEventKind::VoltageWindow,
            Self::PULSE_REPROGRAM_CODE => TelemetryEventKind::PulseReprogram,
            value if (Self::IGNITION_BASE..Self::ARC_LOST_CODE).contains(&value) => {
                IgnitionState::from_index(value - Self::IGNITION_BASE)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::Ignition)
            }
            value if (Self::CONTROL_BASE..Self::CONTROL_BASE + 8).contains(&value) => {
                ControlState::from_index(value - Self::CONTROL_BASE)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::Control)
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    Ignition(IgnitionTelemetry),
    Voltage(VoltageTelemetry),
    Pulse(PulseTelemetry),
    /// Z position at the moment of the event.
    Axis(i32),
    Fault(ThcFault),
}

/// Ignition transition payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IgnitionTelemetry {
    pub from: IgnitionState,
    pub torch_on: bool,
    pub elapsed_since_previous: Option<Duration>,
}

/// Filtered reading against the wanted voltage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VoltageTelemetry {
    pub actual: VoltageReading,
    pub wanted: VoltageReading,
}

/// Timer program applied by a control update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PulseTelemetry {
    pub period: u16,
    pub direction: StepDirection,
    pub speed: i32,
}

impl PulseTelemetry {
    #[must_use]
    pub const fn new(program: PulseProgram, speed: i32) -> Self {
        Self {
            period: program.period,
            direction: program.direction,
            speed,
        }
    }
}

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_ignition_at: Option<TInstant>,
    last_control: ControlState,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_ignition_at: None,
            last_control: ControlState::Disabled,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Id the next record will receive.
    pub fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records an ignition transition. Unchanged steps are skipped.
    ///
    /// An `Established -> Lost` step records [`TelemetryEventKind::ArcLost`]
    /// ahead of the state change.
    pub fn record_ignition(&mut self, step: IgnitionStep, timestamp: TInstant) -> Option<EventId> {
        if !step.changed() {
            return None;
        }

        let elapsed = self
            .last_ignition_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_ignition_at = Some(timestamp);

        if step.arc_lost() {
            self.record(TelemetryEventKind::ArcLost, TelemetryPayload::None, timestamp);
        }

        let payload = TelemetryPayload::Ignition(IgnitionTelemetry {
            from: step.from,
            torch_on: step.state == IgnitionState::Igniting,
            elapsed_since_previous: elapsed,
        });
        Some(self.record(TelemetryEventKind::Ignition(step.state), payload, timestamp))
    }

    /// Records one filtered window.
    pub fn record_voltage(
        &mut self,
        actual: VoltageReading,
        wanted: VoltageReading,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::VoltageWindow,
            TelemetryPayload::Voltage(VoltageTelemetry { actual, wanted }),
            timestamp,
        )
    }

    /// Records the effects of one control window; returns how many records
    /// were written.
    pub fn record_window(
        &mut self,
        report: &WindowReport,
        z_position: i32,
        timestamp: TInstant,
    ) -> usize {
        let mut written = 0;

        if report.enable == Some(EnableOutcome::Acquire) {
            self.record(
                TelemetryEventKind::AxisTaken,
                TelemetryPayload::Axis(z_position),
                timestamp,
            );
            written += 1;
        }
        if let Some(program) = report.effects.program {
            self.record(
                TelemetryEventKind::PulseReprogram,
                TelemetryPayload::Pulse(PulseTelemetry::new(program, report.speed)),
                timestamp,
            );
            written += 1;
        }
        if let Some(position) = report.effects.release_axis {
            self.record(
                TelemetryEventKind::AxisReleased,
                TelemetryPayload::Axis(position),
                timestamp,
            );
            written += 1;
        }
        if let Some(fault) = report.effects.fault {
            self.record(
                TelemetryEventKind::ZOverrun,
                TelemetryPayload::Fault(fault),
                timestamp,
            );
            written += 1;
        }
        if report.control != self.last_control {
            self.last_control = report.control;
            self.record(
                TelemetryEventKind::Control(report.control),
                TelemetryPayload::None,
                timestamp,
            );
            written += 1;
        }

        written
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::height::HeightUpdate;
    use crate::ignition::IgnitionMachine;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
    struct MicrosInstant(u64);

    impl TelemetryInstant for MicrosInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    #[test]
    fn event_codes_round_trip() {
        let fixtures = [
            TelemetryEventKind::Ignition(IgnitionState::Locked),
            TelemetryEventKind::Ignition(IgnitionState::Lost),
            TelemetryEventKind::ArcLost,
            TelemetryEventKind::AxisTaken,
            TelemetryEventKind::AxisReleased,
            TelemetryEventKind::ZOverrun,
            TelemetryEventKind::VoltageWindow,
            TelemetryEventKind::PulseReprogram,
            TelemetryEventKind::Control(ControlState::Disabling),
        ];

        for kind in fixtures {
            assert_eq!(TelemetryEventKind::from_raw(kind.to_raw()), kind);
        }

        assert_eq!(
            TelemetryEventKind::from_raw(0x0006),
            TelemetryEventKind::Custom(0x0006)
        );
        assert_eq!(
            TelemetryEventKind::from_raw(0x0017),
            TelemetryEventKind::Custom(0x0017)
        );
    }

    #[test]
    fn ignition_records_elapsed_and_arc_loss() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();
        let mut machine = IgnitionMachine::new();

        assert_eq!(recorder.record_ignition(machine.start(), MicrosInstant(10)), None);
        assert_eq!(
            recorder.record_ignition(machine.unlock(), MicrosInstant(100)),
            Some(0)
        );
        recorder.record_ignition(machine.start(), MicrosInstant(250));

        let started = recorder.latest().copied().unwrap();
        assert_eq!(
            started.event,
            TelemetryEventKind::Ignition(IgnitionState::Igniting)
        );
        match started.details {
            TelemetryPayload::Ignition(details) => {
                assert!(details.torch_on);
                assert_eq!(details.elapsed_since_previous, Some(Duration::from_micros(150)));
            }
            _ => panic!("expected ignition payload"),
        }

        machine.update(crate::ignition::IgnitionInputs {
            transferred: true,
            queue_empty: false,
        });
        let lost = machine.update(crate::ignition::IgnitionInputs {
            transferred: false,
            queue_empty: false,
        });
        recorder.record_ignition(lost, MicrosInstant(900));

        let events: heapless::Vec<TelemetryEventKind, 8> =
            recorder.oldest_first().map(|record| record.event).collect();
        assert_eq!(
            events.as_slice(),
            &[
                TelemetryEventKind::Ignition(IgnitionState::Off),
                TelemetryEventKind::Ignition(IgnitionState::Igniting),
                TelemetryEventKind::ArcLost,
                TelemetryEventKind::Ignition(IgnitionState::Lost),
            ]
        );
    }

    #[test]
    fn window_effects_become_records() {
        let mut recorder = TelemetryRecorder::<MicrosInstant, 4>::new();
        let report = WindowReport {
            reading: VoltageReading::from_counts(600),
            control: ControlState::Enabled,
            speed: 200,
            effects: HeightUpdate {
                program: Some(PulseProgram::from_speed(200)),
                release_axis: None,
                fault: None,
            },
            enable: Some(EnableOutcome::Acquire),
        };

        assert_eq!(recorder.record_window(&report, 1_200, MicrosInstant(5)), 3);

        let quiet = WindowReport {
            effects: HeightUpdate::idle(),
            enable: None,
            ..report
        };
        assert_eq!(recorder.record_window(&quiet, 1_200, MicrosInstant(6)), 0);
        assert_eq!(recorder.len(), 3);
    }
}
