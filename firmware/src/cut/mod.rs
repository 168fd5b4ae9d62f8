#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Command channel into the cut task and the glue that mirrors a
//! [`CutSession`] outcome to status cells and the log.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use thc_core::cut::{CutNotice, CutOutcome, CutSession};
use thc_core::ignition::TorchSignals;
use thc_core::telemetry::EventId;

pub use thc_core::cut::CutCommand;

use crate::status;
use crate::telemetry::{self, FirmwareInstant, FirmwareTelemetry};

/// Depth of the command channel feeding the cut task.
pub const CUT_COMMAND_DEPTH: usize = 4;

pub type CutCommandQueue = Channel<CriticalSectionRawMutex, CutCommand, CUT_COMMAND_DEPTH>;
pub type CutCommandSender<'a> = Sender<'a, CriticalSectionRawMutex, CutCommand, CUT_COMMAND_DEPTH>;
pub type CutCommandReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, CutCommand, CUT_COMMAND_DEPTH>;

pub type FirmwareCutSession<'a, S> = CutSession<'a, S, FirmwareInstant>;

/// Publishes the session state after a command or poll.
///
/// `first` is the telemetry id taken before the call so every ignition record
/// it produced reaches the log.
pub fn publish<S>(
    session: &FirmwareCutSession<'_, S>,
    outcome: CutOutcome,
    telemetry: &FirmwareTelemetry,
    first: EventId,
) where
    S: TorchSignals,
{
    status::record_ignition(session.state(), session.torch_on());
    telemetry::log_since(telemetry, first);

    if let Some(notice) = outcome.notice {
        telemetry::log_notice(notice.label(), notice_value(notice));
    }
    if let Some(target) = outcome.z_move {
        telemetry::log_z_move(target.height_cmm);
    }
}

/// Numeric detail logged next to a notice.
fn notice_value(notice: CutNotice) -> Option<i64> {
    match notice {
        CutNotice::TransferTimedOut { budget_ms } => Some(i64::from(budget_ms)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Instant;
    use thc_core::cut::CutRequest;
    use thc_core::host::AtomicPosition;
    use thc_core::ignition::IgnitionState;
    use thc_core::settings::PlasmaSettings;
    use thc_core::sim::SimTorch;

    #[test]
    fn start_publishes_ignition_to_status() {
        let settings = PlasmaSettings::default();
        let mut session: FirmwareCutSession<'_, SimTorch> =
            CutSession::new(SimTorch::default(), &settings);
        let mut telemetry = FirmwareTelemetry::new();
        let now = FirmwareInstant::from(Instant::from_millis(5));

        let first = telemetry.next_id();
        let outcome = session.handle(CutCommand::Unlock, now, &mut telemetry);
        publish(&session, outcome, &telemetry, first);

        let first = telemetry.next_id();
        let outcome = session.handle(CutCommand::Start(CutRequest::default()), now, &mut telemetry);
        publish(&session, outcome, &telemetry, first);

        let snapshot = status::snapshot(&settings, &AtomicPosition::new(0));
        assert_eq!(snapshot.ignition, IgnitionState::Igniting);
        assert!(snapshot.torch_on);
        assert_eq!(telemetry.next_id(), 2);
    }

    #[test]
    fn only_timeouts_carry_a_value() {
        assert_eq!(
            notice_value(CutNotice::TransferTimedOut { budget_ms: 3_000 }),
            Some(3_000)
        );
        assert_eq!(notice_value(CutNotice::ArcLost), None);
    }
}
