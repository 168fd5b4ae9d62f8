#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The sampler interrupt and the cut task publish into lightweight atomics so
//! a front-end can build a `StatusSnapshot` without borrowing either owner.

use portable_atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, Ordering};
use thc_core::height::ControlState;
use thc_core::host::AtomicPosition;
use thc_core::ignition::IgnitionState;
use thc_core::servo::WindowReport;
use thc_core::settings::PlasmaSettings;
use thc_core::status::{StatusProvider, StatusSnapshot};

static IGNITION_STATE: AtomicU16 = AtomicU16::new(IgnitionState::Locked.as_index());
static TORCH_ON: AtomicBool = AtomicBool::new(false);
static CONTROL_STATE: AtomicU16 = AtomicU16::new(ControlState::Disabled.as_index());
/// Z speed in steps/s after the last window.
static Z_SPEED: AtomicI32 = AtomicI32::new(0);
static WINDOWS: AtomicU32 = AtomicU32::new(0);
/// Stopping distance of the height controller, in steps.
static STOP_DISTANCE: AtomicU32 = AtomicU32::new(0);
/// Window reports the cut task never saw because its inbox was full.
static DROPPED_REPORTS: AtomicU32 = AtomicU32::new(0);

/// Records the ignition state and the torch-start output level.
pub fn record_ignition(state: IgnitionState, torch_on: bool) {
    IGNITION_STATE.store(state.as_index(), Ordering::Relaxed);
    TORCH_ON.store(torch_on, Ordering::Relaxed);
}

/// Records the controller state after one sampler window.
pub fn record_window(report: &WindowReport) {
    CONTROL_STATE.store(report.control.as_index(), Ordering::Relaxed);
    Z_SPEED.store(report.speed, Ordering::Relaxed);
    WINDOWS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_stop_distance(steps: u32) {
    STOP_DISTANCE.store(steps, Ordering::Relaxed);
}

pub fn record_dropped_report() {
    DROPPED_REPORTS.fetch_add(1, Ordering::Relaxed);
}

/// Number of sampler windows closed since boot.
pub fn windows() -> u32 {
    WINDOWS.load(Ordering::Relaxed)
}

pub fn dropped_reports() -> u32 {
    DROPPED_REPORTS.load(Ordering::Relaxed)
}

/// Builds a [`StatusSnapshot`] from the stored values.
pub fn snapshot(settings: &PlasmaSettings, position: &AtomicPosition) -> StatusSnapshot {
    let ignition = IgnitionState::from_index(IGNITION_STATE.load(Ordering::Relaxed))
        .unwrap_or(IgnitionState::Locked);
    let control = ControlState::from_index(CONTROL_STATE.load(Ordering::Relaxed))
        .unwrap_or(ControlState::Disabled);

    StatusSnapshot {
        ignition,
        torch_on: TORCH_ON.load(Ordering::Relaxed),
        control,
        thc_enabled: settings.thc_enabled(),
        actual: settings.actual(),
        wanted: settings.wanted(),
        speed: Z_SPEED.load(Ordering::Relaxed),
        z_position: position.get(),
        stop_distance: STOP_DISTANCE.load(Ordering::Relaxed),
    }
}

/// [`StatusProvider`] over the firmware statics.
pub struct FirmwareStatus<'a> {
    settings: &'a PlasmaSettings,
    position: &'a AtomicPosition,
}

impl<'a> FirmwareStatus<'a> {
    pub const fn new(settings: &'a PlasmaSettings, position: &'a AtomicPosition) -> Self {
        Self { settings, position }
    }
}

impl StatusProvider for FirmwareStatus<'_> {
    fn snapshot(&mut self) -> Option<StatusSnapshot> {
        Some(snapshot(self.settings, self.position))
    }
}
