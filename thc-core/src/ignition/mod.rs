//! Torch ignition and arc supervision.
//!
//! [`IgnitionMachine`] is the pure five-state machine: every transition returns
//! an [`IgnitionStep`] describing the resulting state and the torch-start
//! output change, and never touches hardware. [`IgnitionController`] binds the
//! machine to a [`TorchSignals`] implementation and runs each transition inside
//! a critical section so the command loop and any asynchronous caller observe
//! an atomic check-then-set.

use core::fmt;

use crate::host::MotionQueue;

/// Arc lifecycle as seen by the torch controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IgnitionState {
    /// Torch firing is forbidden until [`IgnitionController::unlock`].
    Locked,
    /// Torch idle, ready to start.
    Off,
    /// Torch-start asserted, waiting for the arc to transfer.
    Igniting,
    /// Arc transferred to the workpiece; the only state valid for cutting.
    Established,
    /// Arc dropped after transfer; torch has been stopped.
    Lost,
}

impl IgnitionState {
    /// Returns `true` when the torch is live for cutting.
    pub const fn is_cutting(self) -> bool {
        matches!(self, IgnitionState::Established)
    }

    /// Deterministic index used by telemetry codes.
    pub const fn as_index(self) -> u16 {
        match self {
            IgnitionState::Locked => 0,
            IgnitionState::Off => 1,
            IgnitionState::Igniting => 2,
            IgnitionState::Established => 3,
            IgnitionState::Lost => 4,
        }
    }

    /// Attempts to construct a state from its index.
    pub const fn from_index(index: u16) -> Option<Self> {
        match index {
            0 => Some(IgnitionState::Locked),
            1 => Some(IgnitionState::Off),
            2 => Some(IgnitionState::Igniting),
            3 => Some(IgnitionState::Established),
            4 => Some(IgnitionState::Lost),
            _ => None,
        }
    }

    /// Short lowercase label for logs and status lines.
    pub const fn label(self) -> &'static str {
        match self {
            IgnitionState::Locked => "locked",
            IgnitionState::Off => "off",
            IgnitionState::Igniting => "igniting",
            IgnitionState::Established => "established",
            IgnitionState::Lost => "lost",
        }
    }
}

impl fmt::Display for IgnitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Requested level for the torch-start output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TorchOutput {
    On,
    Off,
}

/// Inputs sampled once per [`IgnitionMachine::update`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IgnitionInputs {
    /// Level of the arc transfer-detect input.
    pub transferred: bool,
    /// Whether the shared motion queue has drained.
    pub queue_empty: bool,
}

/// Result of a single transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IgnitionStep {
    pub from: IgnitionState,
    pub state: IgnitionState,
    /// Output change to apply, if any.
    pub torch: Option<TorchOutput>,
}

impl IgnitionStep {
    const fn unchanged(state: IgnitionState) -> Self {
        Self {
            from: state,
            state,
            torch: None,
        }
    }

    /// Returns `true` when the transition moved to a different state.
    pub fn changed(&self) -> bool {
        self.from != self.state
    }

    /// Returns `true` when this step is the fault transition out of `Established`.
    pub fn arc_lost(&self) -> bool {
        self.from == IgnitionState::Established && self.state == IgnitionState::Lost
    }
}

/// Pure ignition state machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IgnitionMachine {
    state: IgnitionState,
    stop_pending: bool,
}

impl IgnitionMachine {
    /// Creates a machine in the [`IgnitionState::Locked`] state.
    pub const fn new() -> Self {
        Self {
            state: IgnitionState::Locked,
            stop_pending: false,
        }
    }

    pub const fn state(&self) -> IgnitionState {
        self.state
    }

    /// Returns `true` while a deferred stop waits for the motion queue.
    pub const fn stop_pending(&self) -> bool {
        self.stop_pending
    }

    /// Requests ignition; ignored while locked.
    pub fn start(&mut self) -> IgnitionStep {
        let from = self.state;
        if from == IgnitionState::Locked {
            return IgnitionStep::unchanged(from);
        }

        self.state = IgnitionState::Igniting;
        IgnitionStep {
            from,
            state: self.state,
            torch: Some(TorchOutput::On),
        }
    }

    /// Drops the torch-start output and cancels any deferred stop.
    pub fn stop(&mut self) -> IgnitionStep {
        let from = self.state;
        if self.state != IgnitionState::Locked {
            self.state = IgnitionState::Off;
        }
        self.stop_pending = false;

        IgnitionStep {
            from,
            state: self.state,
            torch: Some(TorchOutput::Off),
        }
    }

    /// Stops the torch, then forbids further starts.
    pub fn lock(&mut self) -> IgnitionStep {
        let from = self.state;
        let mut step = self.stop();
        self.state = IgnitionState::Locked;
        step.from = from;
        step.state = self.state;
        step
    }

    /// Clears the lock; the torch stays off.
    pub fn unlock(&mut self) -> IgnitionStep {
        let from = self.state;
        self.state = IgnitionState::Off;
        IgnitionStep {
            from,
            state: self.state,
            torch: None,
        }
    }

    /// Requests a stop once all queued motion has completed.
    pub fn stop_after_move(&mut self) {
        self.stop_pending = true;
    }

    /// Advances the machine from the sampled inputs.
    pub fn update(&mut self, inputs: IgnitionInputs) -> IgnitionStep {
        let from = self.state;
        match self.state {
            IgnitionState::Locked | IgnitionState::Off | IgnitionState::Lost => {
                IgnitionStep::unchanged(from)
            }
            IgnitionState::Igniting => {
                if inputs.transferred {
                    self.state = IgnitionState::Established;
                }
                IgnitionStep {
                    from,
                    state: self.state,
                    torch: None,
                }
            }
            IgnitionState::Established => {
                if !inputs.transferred {
                    let mut step = self.stop();
                    self.state = IgnitionState::Lost;
                    step.from = from;
                    step.state = self.state;
                    step
                } else if self.stop_pending && inputs.queue_empty {
                    let mut step = self.stop();
                    step.from = from;
                    step
                } else {
                    IgnitionStep::unchanged(from)
                }
            }
        }
    }
}

impl Default for IgnitionMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Digital lines connecting the controller to the plasma power supply.
pub trait TorchSignals {
    /// Drives the torch-start output.
    fn set_torch_start(&mut self, on: bool);

    /// Samples the arc transfer-detect input.
    fn transfer_detected(&mut self) -> bool;
}

/// Ignition machine bound to the torch signals.
pub struct IgnitionController<S> {
    machine: IgnitionMachine,
    signals: S,
}

impl<S> IgnitionController<S>
where
    S: TorchSignals,
{
    /// Creates a locked controller. Call [`Self::init`] before use.
    pub const fn new(signals: S) -> Self {
        Self {
            machine: IgnitionMachine::new(),
            signals,
        }
    }

    /// Forces the torch-start output low without leaving `Locked`.
    pub fn init(&mut self) {
        self.stop();
    }

    /// Requests ignition, returning `false` when the controller is locked.
    pub fn start(&mut self) -> bool {
        critical_section::with(|_| {
            let step = self.machine.start();
            self.apply(step);
            step.state != IgnitionState::Locked
        })
    }

    pub fn stop(&mut self) -> IgnitionStep {
        critical_section::with(|_| {
            let step = self.machine.stop();
            self.apply(step);
            step
        })
    }

    pub fn lock(&mut self) -> IgnitionStep {
        critical_section::with(|_| {
            let step = self.machine.lock();
            self.apply(step);
            step
        })
    }

    pub fn unlock(&mut self) -> IgnitionStep {
        critical_section::with(|_| {
            let step = self.machine.unlock();
            self.apply(step);
            step
        })
    }

    /// Defers a stop until `update` observes an empty motion queue.
    pub fn stop_after_move(&mut self) {
        self.machine.stop_after_move();
    }

    /// Samples the transfer input and motion queue, then advances the machine.
    ///
    /// Call once per servo tick. A step with [`IgnitionStep::arc_lost`] set
    /// must be reported upward; the controller never re-ignites on its own.
    pub fn update<Q>(&mut self, queue: &Q) -> IgnitionStep
    where
        Q: MotionQueue + ?Sized,
    {
        let transferred = self.signals.transfer_detected();
        let queue_empty = queue.is_empty();
        critical_section::with(|_| {
            let step = self.machine.update(IgnitionInputs {
                transferred,
                queue_empty,
            });
            self.apply(step);
            step
        })
    }

    pub fn state(&self) -> IgnitionState {
        self.machine.state()
    }

    pub fn stop_pending(&self) -> bool {
        self.machine.stop_pending()
    }

    pub fn signals(&self) -> &S {
        &self.signals
    }

    pub fn signals_mut(&mut self) -> &mut S {
        &mut self.signals
    }

    fn apply(&mut self, step: IgnitionStep) {
        match step.torch {
            Some(TorchOutput::On) => self.signals.set_torch_start(true),
            Some(TorchOutput::Off) => self.signals.set_torch_start(false),
            None => {}
        }
    }
}
