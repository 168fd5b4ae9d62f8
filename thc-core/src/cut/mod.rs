//! Cut request parameters, the arc-transfer wait budget and the
//! [`CutSession`] that sequences a cut on top of the ignition controller.

use core::fmt;

use crate::config::{
    DEFAULT_CUT_HEIGHT_CMM, DEFAULT_CUT_VOLTAGE, DEFAULT_INITIAL_HEIGHT_CMM,
    DEFAULT_PIERCE_DELAY_MS, MAX_CUT_VOLTAGE, MAX_HEIGHT_CMM, MAX_PIERCE_DELAY_MS,
    MIN_CUT_VOLTAGE, MIN_HEIGHT_CMM, TRANSFER_POLL_INTERVAL_MS, TRANSFER_WAIT_POLLS,
};
use crate::ignition::IgnitionState;

mod session;

pub use session::{CutCommand, CutNotice, CutOutcome, CutPhase, CutSession, ZMove};

/// Raw values supplied with a start-cut request; `None` selects the default.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CutRequest {
    pub voltage: Option<u16>,
    pub pierce_delay_ms: Option<u16>,
    /// Hundredths of a millimetre.
    pub cut_height_cmm: Option<u16>,
    /// Hundredths of a millimetre.
    pub initial_height_cmm: Option<u16>,
}

/// Rejected request field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CutParameterError {
    VoltageOutOfRange(u16),
    PierceDelayTooLong(u16),
    CutHeightOutOfRange(u16),
    InitialHeightOutOfRange(u16),
}

impl fmt::Display for CutParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutParameterError::VoltageOutOfRange(value) => write!(
                f,
                "voltage {value}V outside {MIN_CUT_VOLTAGE}-{MAX_CUT_VOLTAGE}V"
            ),
            CutParameterError::PierceDelayTooLong(value) => {
                write!(f, "pierce delay {value}ms above {MAX_PIERCE_DELAY_MS}ms")
            }
            CutParameterError::CutHeightOutOfRange(value) => {
                f.write_str("cut height ")?;
                write_mm(f, *value)?;
                f.write_str(" outside band")
            }
            CutParameterError::InitialHeightOutOfRange(value) => {
                f.write_str("initial height ")?;
                write_mm(f, *value)?;
                f.write_str(" outside band")
            }
        }
    }
}

/// Validated parameters for one cut.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CutParameters {
    pub voltage: u16,
    pub pierce_delay_ms: u16,
    pub cut_height_cmm: u16,
    pub initial_height_cmm: u16,
}

impl CutParameters {
    pub const DEFAULT: Self = Self {
        voltage: DEFAULT_CUT_VOLTAGE,
        pierce_delay_ms: DEFAULT_PIERCE_DELAY_MS,
        cut_height_cmm: DEFAULT_CUT_HEIGHT_CMM,
        initial_height_cmm: DEFAULT_INITIAL_HEIGHT_CMM,
    };

    /// Strict validation: the first out-of-band field is reported.
    pub fn validate(request: CutRequest) -> Result<Self, CutParameterError> {
        let voltage = match request.voltage {
            Some(value) if !voltage_in_band(value) => {
                return Err(CutParameterError::VoltageOutOfRange(value));
            }
            Some(value) => value,
            None => DEFAULT_CUT_VOLTAGE,
        };
        let pierce_delay_ms = match request.pierce_delay_ms {
            Some(value) if value > MAX_PIERCE_DELAY_MS => {
                return Err(CutParameterError::PierceDelayTooLong(value));
            }
            Some(value) => value,
            None => DEFAULT_PIERCE_DELAY_MS,
        };
        let cut_height_cmm = match request.cut_height_cmm {
            Some(value) if !height_in_band(value) => {
                return Err(CutParameterError::CutHeightOutOfRange(value));
            }
            Some(value) => value,
            None => DEFAULT_CUT_HEIGHT_CMM,
        };
        let initial_height_cmm = match request.initial_height_cmm {
            Some(value) if !height_in_band(value) => {
                return Err(CutParameterError::InitialHeightOutOfRange(value));
            }
            Some(value) => value,
            None => DEFAULT_INITIAL_HEIGHT_CMM,
        };

        Ok(Self {
            voltage,
            pierce_delay_ms,
            cut_height_cmm,
            initial_height_cmm,
        })
    }

    /// Lenient resolution: each out-of-band field falls back to its default.
    #[must_use]
    pub fn resolve(request: CutRequest) -> Self {
        Self {
            voltage: request
                .voltage
                .filter(|value| voltage_in_band(*value))
                .unwrap_or(DEFAULT_CUT_VOLTAGE),
            pierce_delay_ms: request
                .pierce_delay_ms
                .filter(|value| *value <= MAX_PIERCE_DELAY_MS)
                .unwrap_or(DEFAULT_PIERCE_DELAY_MS),
            cut_height_cmm: request
                .cut_height_cmm
                .filter(|value| height_in_band(*value))
                .unwrap_or(DEFAULT_CUT_HEIGHT_CMM),
            initial_height_cmm: request
                .initial_height_cmm
                .filter(|value| height_in_band(*value))
                .unwrap_or(DEFAULT_INITIAL_HEIGHT_CMM),
        }
    }
}

impl Default for CutParameters {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for CutParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V={} D={} H=", self.voltage, self.pierce_delay_ms)?;
        write_mm(f, self.cut_height_cmm)?;
        f.write_str(" I=")?;
        write_mm(f, self.initial_height_cmm)
    }
}

fn voltage_in_band(value: u16) -> bool {
    (MIN_CUT_VOLTAGE..=MAX_CUT_VOLTAGE).contains(&value)
}

fn height_in_band(value: u16) -> bool {
    (MIN_HEIGHT_CMM..=MAX_HEIGHT_CMM).contains(&value)
}

fn write_mm(f: &mut fmt::Formatter<'_>, cmm: u16) -> fmt::Result {
    write!(f, "{}.{:02}mm", cmm / 100, cmm % 100)
}

/// Result of one transfer poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransferStatus {
    Waiting { polls_left: u8 },
    Transferred,
    /// Budget exhausted while still igniting.
    TimedOut,
    ArcLost,
    /// Torch was stopped or locked while waiting.
    Aborted,
}

impl TransferStatus {
    #[must_use]
    pub const fn is_final(self) -> bool {
        !matches!(self, TransferStatus::Waiting { .. })
    }
}

/// Poll budget for the wait between torch start and arc transfer.
///
/// The ignition machine itself never times out; the command layer polls its
/// state at [`TransferWait::interval_ms`] and gives up once the budget is
/// spent.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransferWait {
    budget: u8,
    polls: u8,
    interval_ms: u32,
}

impl TransferWait {
    #[must_use]
    pub const fn new(budget: u8, interval_ms: u32) -> Self {
        Self {
            budget,
            polls: 0,
            interval_ms,
        }
    }

    #[must_use]
    pub const fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Total wait covered by the budget.
    #[must_use]
    pub const fn budget_ms(&self) -> u32 {
        self.budget as u32 * self.interval_ms
    }

    /// Checks the ignition state once and charges one poll if still igniting.
    pub fn poll(&mut self, state: IgnitionState) -> TransferStatus {
        match state {
            IgnitionState::Established => TransferStatus::Transferred,
            IgnitionState::Lost => TransferStatus::ArcLost,
            IgnitionState::Off | IgnitionState::Locked => TransferStatus::Aborted,
            IgnitionState::Igniting => {
                self.polls = self.polls.saturating_add(1);
                if self.polls >= self.budget {
                    TransferStatus::TimedOut
                } else {
                    TransferStatus::Waiting {
                        polls_left: self.budget - self.polls,
                    }
                }
            }
        }
    }
}

impl Default for TransferWait {
    fn default() -> Self {
        Self::new(TRANSFER_WAIT_POLLS, TRANSFER_POLL_INTERVAL_MS)
    }
}
