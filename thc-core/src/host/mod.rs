//! Contracts consumed from the host motion firmware.
//!
//! The torch-control core does not own the motion planner or the general
//! stepper driver. It only needs to ask whether queued motion remains, to hand
//! the Z axis back and forth, to read and publish axis positions, and to raise
//! a fatal fault. Firmware and emulator targets implement these traits over
//! their concrete planner, stepper and kill paths.

use core::fmt;

use portable_atomic::{AtomicI32, Ordering};

/// Machine axes addressed through the host stepper contract.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Deterministic index for per-axis tables.
    pub const fn as_index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        })
    }
}

/// General stepper subsystem that normally drives every axis.
///
/// An axis has exactly one driver at a time. `leave_control_on` must be called
/// before the height controller emits its own pulses and `take_control_on`
/// only after the controller has stopped; skipping either call lets two
/// drivers race on the same step and direction pins.
pub trait HostStepper {
    /// Returns the absolute position of `axis`, in steps.
    fn position(&self, axis: Axis) -> i32;

    /// Publishes an absolute position for `axis` to the planner.
    fn set_position(&mut self, axis: Axis, steps: i32);

    /// Stops driving `axis` so another component can own its pins.
    fn leave_control_on(&mut self, axis: Axis);

    /// Resumes driving `axis` after another component released it.
    fn take_control_on(&mut self, axis: Axis);
}

/// Shared motion queue fed by the planner.
pub trait MotionQueue {
    /// Returns `true` once no motion blocks remain queued.
    fn is_empty(&self) -> bool;
}

/// Fatal fault raised by the core.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ThcFault {
    /// The Z axis left its travel window while the height controller was enabled.
    ZOverrun { position: i32 },
}

impl ThcFault {
    /// Human-readable kill message handed to the host fault path.
    pub const fn message(self) -> &'static str {
        match self {
            ThcFault::ZOverrun { .. } => "Stop: Z overrun.",
        }
    }
}

impl fmt::Display for ThcFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThcFault::ZOverrun { position } => {
                write!(f, "{} (z={position})", self.message())
            }
        }
    }
}

/// Kill path of the host firmware.
///
/// Implementations are expected to halt; the core never retries after calling
/// [`FaultHandler::fault`].
pub trait FaultHandler {
    fn fault(&mut self, fault: ThcFault);
}

/// Axis position counter shared between the step interrupts and the host.
///
/// Written by the pulse interrupts (highest priority) through
/// [`AtomicPosition::shift`]; read by the height controller update and the
/// command loop. A single 32-bit cell keeps every access naturally atomic.
#[derive(Debug)]
pub struct AtomicPosition {
    steps: AtomicI32,
}

impl AtomicPosition {
    /// Creates a counter at `steps`.
    pub const fn new(steps: i32) -> Self {
        Self {
            steps: AtomicI32::new(steps),
        }
    }

    /// Returns the current position.
    pub fn get(&self) -> i32 {
        self.steps.load(Ordering::Relaxed)
    }

    /// Overwrites the current position.
    pub fn set(&self, steps: i32) {
        self.steps.store(steps, Ordering::Relaxed);
    }

    /// Applies a signed step delta.
    pub fn shift(&self, delta: i32) {
        self.steps.fetch_add(delta, Ordering::Relaxed);
    }
}

impl Default for AtomicPosition {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_position_accumulates_signed_deltas() {
        let position = AtomicPosition::new(10);
        position.shift(1);
        position.shift(1);
        position.shift(-3);
        assert_eq!(position.get(), 9);

        position.set(-40);
        assert_eq!(position.get(), -40);
    }

    #[test]
    fn overrun_fault_carries_kill_message() {
        let fault = ThcFault::ZOverrun { position: 4_001 };
        assert_eq!(fault.message(), "Stop: Z overrun.");
    }
}
