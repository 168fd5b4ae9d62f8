//! Shared status surface.
//!
//! Firmware and emulator implement [`StatusProvider`] over their live state so
//! that any front-end can render the same `torch`, `arc` and `thc` lines
//! through [`StatusFormatter`].

use core::fmt;

use crate::height::ControlState;
use crate::ignition::IgnitionState;
use crate::sampler::VoltageReading;
use crate::settings::VoltageTrend;

/// Point-in-time view of the torch-control subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub ignition: IgnitionState,
    pub torch_on: bool,
    pub control: ControlState,
    pub thc_enabled: bool,
    pub actual: VoltageReading,
    pub wanted: VoltageReading,
    /// Current Z speed in steps/s.
    pub speed: i32,
    pub z_position: i32,
    /// Worst-case steps travelled while stopping from full speed.
    pub stop_distance: u32,
}

impl StatusSnapshot {
    /// Snapshot matching a freshly booted controller.
    #[must_use]
    pub const fn initial(wanted: VoltageReading) -> Self {
        Self {
            ignition: IgnitionState::Locked,
            torch_on: false,
            control: ControlState::Disabled,
            thc_enabled: false,
            actual: VoltageReading::ZERO,
            wanted,
            speed: 0,
            z_position: 0,
            stop_distance: 0,
        }
    }

    #[must_use]
    pub fn trend(&self) -> VoltageTrend {
        VoltageTrend::compare(self.actual, self.wanted)
    }
}

/// Platform hook that supplies live status information.
pub trait StatusProvider {
    /// Returns a snapshot if the platform can currently provide one.
    fn snapshot(&mut self) -> Option<StatusSnapshot>;
}

/// Status provider that never reports snapshots.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStatusProvider;

impl StatusProvider for NoStatusProvider {
    fn snapshot(&mut self) -> Option<StatusSnapshot> {
        None
    }
}

/// Renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the torch line (e.g. `torch state=igniting output=on`).
    pub fn write_torch_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "torch state={} output={}",
            self.snapshot.ignition,
            on_off(self.snapshot.torch_on)
        )
    }

    /// Writes the arc line (e.g. `arc actual=118.5V wanted=125.0V trend=<`).
    pub fn write_arc_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "arc actual={} wanted={} trend={}",
            self.snapshot.actual,
            self.snapshot.wanted,
            self.snapshot.trend()
        )
    }

    /// Writes the height control line
    /// (e.g. `thc state=enabled request=on speed=+1200 z=850 stop=500`).
    pub fn write_thc_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "thc state={} request={} speed={:+} z={} stop={}",
            self.snapshot.control,
            on_off(self.snapshot.thc_enabled),
            self.snapshot.speed,
            self.snapshot.z_position,
            self.snapshot.stop_distance
        )
    }
}

const fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}
