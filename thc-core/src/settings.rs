//! Operating settings shared between the command loop and the interrupts.
//!
//! Every field is a single atomic cell, so setters and getters are safe from
//! any context without masking. The command loop writes the wanted voltage and
//! the enable flag; the sampler interrupt writes the actual voltage mirror.

use core::fmt;

use portable_atomic::{AtomicBool, AtomicU16, Ordering};

use crate::config::DEFAULT_CUT_VOLTAGE;
use crate::height::VoltageFeedback;
use crate::sampler::{VoltageReading, target_counts};

/// Position of the measured arc voltage relative to the wanted one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VoltageTrend {
    Below,
    OnTarget,
    Above,
}

impl VoltageTrend {
    #[must_use]
    pub fn compare(actual: VoltageReading, wanted: VoltageReading) -> Self {
        match actual.cmp(&wanted) {
            core::cmp::Ordering::Less => VoltageTrend::Below,
            core::cmp::Ordering::Equal => VoltageTrend::OnTarget,
            core::cmp::Ordering::Greater => VoltageTrend::Above,
        }
    }

    /// Single-character marker used on status lines.
    #[must_use]
    pub const fn marker(self) -> char {
        match self {
            VoltageTrend::Below => '<',
            VoltageTrend::OnTarget => '=',
            VoltageTrend::Above => '>',
        }
    }
}

impl fmt::Display for VoltageTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker())
    }
}

/// Wanted/actual arc voltage, the height control enable flag and dry run.
#[derive(Debug)]
pub struct PlasmaSettings {
    wanted_counts: AtomicU16,
    actual_counts: AtomicU16,
    thc_enabled: AtomicBool,
    /// Cuts run their motion without firing the torch.
    dry_run: AtomicBool,
}

impl PlasmaSettings {
    /// Creates settings with the wanted voltage given in counts.
    #[must_use]
    pub const fn new(wanted_counts: u16) -> Self {
        Self {
            wanted_counts: AtomicU16::new(wanted_counts),
            actual_counts: AtomicU16::new(0),
            thc_enabled: AtomicBool::new(false),
            dry_run: AtomicBool::new(false),
        }
    }

    /// Sets the wanted arc voltage in volts.
    pub fn set_wanted_voltage(&self, volts: u16) {
        self.wanted_counts.store(target_counts(volts), Ordering::Relaxed);
    }

    pub fn wanted(&self) -> VoltageReading {
        VoltageReading::from_counts(self.wanted_counts.load(Ordering::Relaxed))
    }

    /// Mirrors the last filtered reading.
    pub fn record_actual(&self, reading: VoltageReading) {
        self.actual_counts.store(reading.counts(), Ordering::Relaxed);
    }

    pub fn actual(&self) -> VoltageReading {
        VoltageReading::from_counts(self.actual_counts.load(Ordering::Relaxed))
    }

    pub fn set_thc_enabled(&self, enabled: bool) {
        self.thc_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn thc_enabled(&self) -> bool {
        self.thc_enabled.load(Ordering::Relaxed)
    }

    pub fn set_dry_run(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::Relaxed);
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run.load(Ordering::Relaxed)
    }

    /// Snapshot handed to the target speed law.
    pub fn feedback(&self) -> VoltageFeedback {
        VoltageFeedback::new(self.actual(), self.wanted())
    }

    pub fn trend(&self) -> VoltageTrend {
        VoltageTrend::compare(self.actual(), self.wanted())
    }
}

impl Default for PlasmaSettings {
    fn default() -> Self {
        Self::new(target_counts(DEFAULT_CUT_VOLTAGE))
    }
}
