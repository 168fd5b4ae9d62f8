//! Cut sequencing on top of the ignition controller.
//!
//! A start request raises Z to the initial height, fires the torch, polls for
//! arc transfer within the [`TransferWait`] budget, waits out the pierce delay
//! and finally descends to cut height. Height control is enabled as soon as
//! the arc transfers and disabled whenever the torch goes out. Nothing here
//! blocks: the owner calls [`CutSession::poll`] from its command tick and
//! executes the returned [`ZMove`]s.

use core::fmt;
use core::time::Duration;

use super::{CutParameters, CutRequest, TransferStatus, TransferWait};
use crate::host::MotionQueue;
use crate::ignition::{
    IgnitionController, IgnitionState, IgnitionStep, TorchOutput, TorchSignals,
};
use crate::settings::PlasmaSettings;
use crate::telemetry::{TelemetryInstant, TelemetryRecorder};

/// Operator commands accepted by a cut session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CutCommand {
    Start(CutRequest),
    Stop,
    /// Stop once the queued motion has drained.
    StopAfterMove,
    Lock,
    Unlock,
    SetThc(bool),
    SetDryRun(bool),
}

/// Z move the motion planner must execute, in hundredths of a millimetre.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ZMove {
    pub height_cmm: u16,
}

/// Operator-facing events raised while sequencing a cut.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CutNotice {
    StartRefused,
    /// Start accepted in dry run; the torch stays off.
    DryRun,
    ArcTransferred,
    TransferTimedOut { budget_ms: u32 },
    ArcLost,
    /// Torch went out while cutting.
    TorchOut,
}

impl CutNotice {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            CutNotice::StartRefused => "torch locked, start refused",
            CutNotice::DryRun => "dry run, torch not fired",
            CutNotice::ArcTransferred => "plasma transfer",
            CutNotice::TransferTimedOut { .. } => "plasma did not start, dry run",
            CutNotice::ArcLost => "arc lost, torch stopped",
            CutNotice::TorchOut => "torch out, height control off",
        }
    }
}

impl fmt::Display for CutNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutNotice::TransferTimedOut { budget_ms } => {
                write!(f, "plasma did not start after {budget_ms}ms, dry run")
            }
            other => f.write_str(other.label()),
        }
    }
}

/// What one command or poll asks of the owner.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CutOutcome {
    pub z_move: Option<ZMove>,
    pub notice: Option<CutNotice>,
}

impl CutOutcome {
    pub const NONE: Self = Self {
        z_move: None,
        notice: None,
    };

    const fn noticed(notice: CutNotice) -> Self {
        Self {
            z_move: None,
            notice: Some(notice),
        }
    }

    const fn moved(height_cmm: u16, notice: Option<CutNotice>) -> Self {
        Self {
            z_move: Some(ZMove { height_cmm }),
            notice,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CutPhase<T> {
    Idle,
    AwaitingTransfer {
        wait: TransferWait,
        /// `None` until the first poll, which runs immediately.
        last_poll: Option<T>,
    },
    Piercing {
        since: T,
    },
    Cutting,
}

/// One cut at a time over an [`IgnitionController`], clocked by the caller's
/// instants.
pub struct CutSession<'a, S, T> {
    ignition: IgnitionController<S>,
    settings: &'a PlasmaSettings,
    phase: CutPhase<T>,
    parameters: CutParameters,
    torch_on: bool,
}

impl<'a, S, T> CutSession<'a, S, T>
where
    S: TorchSignals,
    T: TelemetryInstant,
{
    /// Builds a session with the torch output forced low.
    pub fn new(signals: S, settings: &'a PlasmaSettings) -> Self {
        let mut ignition = IgnitionController::new(signals);
        ignition.init();

        Self {
            ignition,
            settings,
            phase: CutPhase::Idle,
            parameters: CutParameters::DEFAULT,
            torch_on: false,
        }
    }

    /// Applies one command.
    pub fn handle<const N: usize>(
        &mut self,
        command: CutCommand,
        now: T,
        telemetry: &mut TelemetryRecorder<T, N>,
    ) -> CutOutcome {
        match command {
            CutCommand::Start(request) => return self.start(request, now, telemetry),
            CutCommand::Stop => {
                let step = self.ignition.stop();
                self.finish(step, now, telemetry);
            }
            CutCommand::StopAfterMove => self.ignition.stop_after_move(),
            CutCommand::Lock => {
                let step = self.ignition.lock();
                self.finish(step, now, telemetry);
            }
            CutCommand::Unlock => {
                let step = self.ignition.unlock();
                self.observe(step, now, telemetry);
            }
            CutCommand::SetThc(enabled) => self.settings.set_thc_enabled(enabled),
            CutCommand::SetDryRun(dry_run) => self.settings.set_dry_run(dry_run),
        }
        CutOutcome::NONE
    }

    /// Runs the ignition update and advances the cut sequence.
    pub fn poll<Q, const N: usize>(
        &mut self,
        queue: &Q,
        now: T,
        telemetry: &mut TelemetryRecorder<T, N>,
    ) -> CutOutcome
    where
        Q: MotionQueue + ?Sized,
    {
        let step = self.ignition.update(queue);
        self.observe(step, now, telemetry);
        if step.arc_lost() {
            self.settings.set_thc_enabled(false);
            self.phase = CutPhase::Idle;
            return CutOutcome::noticed(CutNotice::ArcLost);
        }

        match self.phase {
            CutPhase::Idle => CutOutcome::NONE,
            CutPhase::AwaitingTransfer {
                mut wait,
                last_poll,
            } => {
                let interval = Duration::from_millis(u64::from(wait.interval_ms()));
                if last_poll.is_some_and(|last| now.saturating_duration_since(last) < interval) {
                    return CutOutcome::NONE;
                }
                self.poll_transfer(&mut wait, now, telemetry)
            }
            CutPhase::Piercing { since } => {
                if now.saturating_duration_since(since) < self.pierce_delay() {
                    return CutOutcome::NONE;
                }
                self.phase = CutPhase::Cutting;
                CutOutcome::moved(self.parameters.cut_height_cmm, None)
            }
            CutPhase::Cutting => {
                if !self.settings.dry_run() && !self.ignition.state().is_cutting() {
                    self.settings.set_thc_enabled(false);
                    self.phase = CutPhase::Idle;
                    return CutOutcome::noticed(CutNotice::TorchOut);
                }
                CutOutcome::NONE
            }
        }
    }

    fn start<const N: usize>(
        &mut self,
        request: CutRequest,
        now: T,
        telemetry: &mut TelemetryRecorder<T, N>,
    ) -> CutOutcome {
        let parameters = CutParameters::resolve(request);
        if self.settings.dry_run() {
            let step = self.ignition.stop();
            self.observe(step, now, telemetry);
            self.settings.set_thc_enabled(false);
            self.settings.set_wanted_voltage(parameters.voltage);
            self.parameters = parameters;
            self.phase = CutPhase::Piercing { since: now };
            return CutOutcome::moved(parameters.initial_height_cmm, Some(CutNotice::DryRun));
        }

        let from = self.ignition.state();
        if !self.ignition.start() {
            return CutOutcome::noticed(CutNotice::StartRefused);
        }

        self.settings.set_wanted_voltage(parameters.voltage);
        self.parameters = parameters;
        let state = self.ignition.state();
        self.observe(
            IgnitionStep {
                from,
                state,
                torch: (from != state).then_some(TorchOutput::On),
            },
            now,
            telemetry,
        );

        self.phase = CutPhase::AwaitingTransfer {
            wait: TransferWait::default(),
            last_poll: None,
        };
        CutOutcome::moved(parameters.initial_height_cmm, None)
    }

    fn poll_transfer<const N: usize>(
        &mut self,
        wait: &mut TransferWait,
        now: T,
        telemetry: &mut TelemetryRecorder<T, N>,
    ) -> CutOutcome {
        match wait.poll(self.ignition.state()) {
            TransferStatus::Waiting { .. } => {
                self.phase = CutPhase::AwaitingTransfer {
                    wait: *wait,
                    last_poll: Some(now),
                };
                CutOutcome::NONE
            }
            TransferStatus::Transferred => {
                self.settings.set_thc_enabled(true);
                self.phase = CutPhase::Piercing { since: now };
                CutOutcome::noticed(CutNotice::ArcTransferred)
            }
            TransferStatus::TimedOut => {
                let step = self.ignition.stop();
                self.observe(step, now, telemetry);
                self.settings.set_thc_enabled(false);
                self.settings.set_dry_run(true);
                self.phase = CutPhase::Piercing { since: now };
                CutOutcome::noticed(CutNotice::TransferTimedOut {
                    budget_ms: wait.budget_ms(),
                })
            }
            TransferStatus::ArcLost | TransferStatus::Aborted => {
                self.settings.set_thc_enabled(false);
                self.phase = CutPhase::Idle;
                CutOutcome::NONE
            }
        }
    }

    fn finish<const N: usize>(
        &mut self,
        step: IgnitionStep,
        now: T,
        telemetry: &mut TelemetryRecorder<T, N>,
    ) {
        self.observe(step, now, telemetry);
        self.settings.set_thc_enabled(false);
        self.phase = CutPhase::Idle;
    }

    fn observe<const N: usize>(
        &mut self,
        step: IgnitionStep,
        now: T,
        telemetry: &mut TelemetryRecorder<T, N>,
    ) {
        match step.torch {
            Some(TorchOutput::On) => self.torch_on = true,
            Some(TorchOutput::Off) => self.torch_on = false,
            None => {}
        }
        telemetry.record_ignition(step, now);
    }

    fn pierce_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.parameters.pierce_delay_ms))
    }

    pub fn phase(&self) -> CutPhase<T> {
        self.phase
    }

    pub fn parameters(&self) -> CutParameters {
        self.parameters
    }

    pub fn state(&self) -> IgnitionState {
        self.ignition.state()
    }

    /// Last level driven onto the torch-start output.
    pub fn torch_on(&self) -> bool {
        self.torch_on
    }

    pub fn signals(&self) -> &S {
        self.ignition.signals()
    }

    pub fn signals_mut(&mut self) -> &mut S {
        self.ignition.signals_mut()
    }
}
