//! Simulated hardware for host tests and the emulator.
//!
//! Each type implements one of the hardware traits with plain fields so a test
//! can script inputs and inspect outputs. [`SimPulseTimer`] models the
//! phase-correct counter tick by tick.

use heapless::Vec;

use crate::host::{AtomicPosition, Axis, FaultHandler, HostStepper, MotionQueue, ThcFault};
use crate::ignition::TorchSignals;
use crate::pulse::{CountDirection, DirectionPin, PulseTimer, StepDirection, StepPin};
use crate::sampler::{DividerAdc, DividerTap};

/// Extreme reached by [`SimPulseTimer::advance`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerEvent {
    /// Counter reached the period.
    Top,
    /// Counter reached zero.
    Bottom,
}

/// Tick-level model of a phase-correct up/down counter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimPulseTimer {
    period: u16,
    counter: u16,
    direction: CountDirection,
    running: bool,
    interrupts: bool,
    ticks: u64,
}

impl SimPulseTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            period: u16::MAX,
            counter: 0,
            direction: CountDirection::Up,
            running: false,
            interrupts: false,
            ticks: 0,
        }
    }

    /// Advances one timer clock. Returns the extreme reached, if any.
    pub fn advance(&mut self) -> Option<TimerEvent> {
        if !self.running {
            return None;
        }
        self.ticks += 1;

        match self.direction {
            CountDirection::Up => {
                self.counter = self.counter.saturating_add(1);
                if self.counter >= self.period {
                    self.counter = self.period;
                    self.direction = CountDirection::Down;
                    return self.interrupts.then_some(TimerEvent::Top);
                }
            }
            CountDirection::Down => {
                self.counter = self.counter.saturating_sub(1);
                if self.counter == 0 {
                    self.direction = CountDirection::Up;
                    return self.interrupts.then_some(TimerEvent::Bottom);
                }
            }
        }
        None
    }

    #[must_use]
    pub const fn running(&self) -> bool {
        self.running
    }

    /// Clock ticks counted while running.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Default for SimPulseTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseTimer for SimPulseTimer {
    fn set_period(&mut self, period: u16) {
        self.period = period;
    }

    fn period(&self) -> u16 {
        self.period
    }

    fn set_counter(&mut self, value: u16) {
        self.counter = value;
    }

    fn current_counter(&self) -> u16 {
        self.counter
    }

    fn pause_clock(&mut self) {
        self.running = false;
    }

    fn resume_clock(&mut self) {
        self.running = true;
    }

    fn counting_direction(&self) -> CountDirection {
        self.direction
    }

    fn enable_interrupts(&mut self) {
        self.interrupts = true;
    }
}

/// Divider with scripted tap levels.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimDividerAdc {
    pub plus: u16,
    pub minus: u16,
    selected: Option<DividerTap>,
    conversions: u32,
}

impl SimDividerAdc {
    #[must_use]
    pub const fn new(plus: u16, minus: u16) -> Self {
        Self {
            plus,
            minus,
            selected: None,
            conversions: 0,
        }
    }

    /// Sets the taps so a window averages to `counts` after `offset` is removed.
    pub fn set_arc_counts(&mut self, counts: u16, offset: i32) {
        let plus = i32::from(self.minus) + i32::from(counts) + offset;
        self.plus = u16::try_from(plus.max(0)).unwrap_or(u16::MAX);
    }

    #[must_use]
    pub const fn conversions(&self) -> u32 {
        self.conversions
    }
}

impl DividerAdc for SimDividerAdc {
    fn start_conversion(&mut self, tap: DividerTap) {
        self.selected = Some(tap);
        self.conversions += 1;
    }

    fn read_conversion(&mut self) -> u16 {
        match self.selected {
            Some(DividerTap::Plus) => self.plus,
            Some(DividerTap::Minus) => self.minus,
            None => 0,
        }
    }
}

/// Torch-start output and transfer input.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimTorch {
    pub torch_on: bool,
    pub transferred: bool,
    /// Number of rising edges on the torch-start output.
    pub starts: u32,
}

impl TorchSignals for SimTorch {
    fn set_torch_start(&mut self, on: bool) {
        if on && !self.torch_on {
            self.starts += 1;
        }
        self.torch_on = on;
    }

    fn transfer_detected(&mut self) -> bool {
        self.transferred
    }
}

/// Motion queue with a block count.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimQueue {
    pub pending: u32,
}

impl SimQueue {
    pub fn push(&mut self, blocks: u32) {
        self.pending = self.pending.saturating_add(blocks);
    }

    /// Completes one block.
    pub fn complete_one(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }
}

impl MotionQueue for SimQueue {
    fn is_empty(&self) -> bool {
        self.pending == 0
    }
}

/// Host stepper reading Z from the shared position counter.
#[derive(Debug)]
pub struct SimHostStepper<'a> {
    z: &'a AtomicPosition,
    planner: [i32; 3],
    owned_by_host: [bool; 3],
    /// Ownership changes in call order: `true` for take, `false` for leave.
    pub handoffs: Vec<(Axis, bool), 16>,
}

impl<'a> SimHostStepper<'a> {
    #[must_use]
    pub fn new(z: &'a AtomicPosition) -> Self {
        Self {
            z,
            planner: [0; 3],
            owned_by_host: [true; 3],
            handoffs: Vec::new(),
        }
    }

    /// Position last published to the planner for `axis`.
    #[must_use]
    pub fn planner_position(&self, axis: Axis) -> i32 {
        self.planner[axis.as_index()]
    }

    #[must_use]
    pub fn owned_by_host(&self, axis: Axis) -> bool {
        self.owned_by_host[axis.as_index()]
    }
}

impl HostStepper for SimHostStepper<'_> {
    fn position(&self, axis: Axis) -> i32 {
        match axis {
            Axis::Z => self.z.get(),
            other => self.planner[other.as_index()],
        }
    }

    fn set_position(&mut self, axis: Axis, steps: i32) {
        self.planner[axis.as_index()] = steps;
    }

    fn leave_control_on(&mut self, axis: Axis) {
        self.owned_by_host[axis.as_index()] = false;
        let _ = self.handoffs.push((axis, false));
    }

    fn take_control_on(&mut self, axis: Axis) {
        self.owned_by_host[axis.as_index()] = true;
        let _ = self.handoffs.push((axis, true));
    }
}

/// Fault handler that records instead of halting.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecordingFault {
    pub faults: Vec<ThcFault, 4>,
}

impl FaultHandler for RecordingFault {
    fn fault(&mut self, fault: ThcFault) {
        let _ = self.faults.push(fault);
    }
}

/// Step output counting rising edges.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimStepPin {
    pub high: bool,
    pub edges: u32,
}

impl StepPin for SimStepPin {
    fn set_high(&mut self) {
        if !self.high {
            self.edges += 1;
        }
        self.high = true;
    }

    fn set_low(&mut self) {
        self.high = false;
    }
}

/// Direction output holding the last written level.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimDirectionPin {
    pub direction: Option<StepDirection>,
    pub writes: u32,
}

impl DirectionPin for SimDirectionPin {
    fn set_direction(&mut self, direction: StepDirection) {
        self.direction = Some(direction);
        self.writes += 1;
    }
}
