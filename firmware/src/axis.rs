#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Axis bookkeeping shared with the motion link.
//!
//! The planner runs on the motion board; this board only mirrors what the
//! height controller needs from it: per-axis positions, which side owns each
//! axis, and whether queued motion remains.

use portable_atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use thc_core::host::{AtomicPosition, Axis, HostStepper, MotionQueue};

const AXIS_COUNT: usize = 3;

/// Position, ownership and queue-depth cells for every axis.
pub struct AxisTable {
    positions: [AtomicPosition; AXIS_COUNT],
    planner: [AtomicI32; AXIS_COUNT],
    host_owned: [AtomicBool; AXIS_COUNT],
    queued_blocks: AtomicU32,
}

impl AxisTable {
    pub const fn new() -> Self {
        Self {
            positions: [const { AtomicPosition::new(0) }; AXIS_COUNT],
            planner: [const { AtomicI32::new(0) }; AXIS_COUNT],
            host_owned: [const { AtomicBool::new(true) }; AXIS_COUNT],
            queued_blocks: AtomicU32::new(0),
        }
    }

    /// Live step counter for `axis`, shared with the pulse interrupt.
    pub fn position_cell(&self, axis: Axis) -> &AtomicPosition {
        &self.positions[axis.as_index()]
    }

    /// Position last published back to the planner.
    pub fn planner_position(&self, axis: Axis) -> i32 {
        self.planner[axis.as_index()].load(Ordering::Relaxed)
    }

    pub fn owned_by_host(&self, axis: Axis) -> bool {
        self.host_owned[axis.as_index()].load(Ordering::Relaxed)
    }

    /// Notes `blocks` newly queued motion blocks.
    pub fn queue_blocks(&self, blocks: u32) {
        self.queued_blocks.fetch_add(blocks, Ordering::AcqRel);
    }

    /// Notes one finished motion block.
    pub fn complete_block(&self) {
        let _ = self
            .queued_blocks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |blocks| {
                Some(blocks.saturating_sub(1))
            });
    }

    pub const fn handle(&self) -> AxisHandle<'_> {
        AxisHandle { table: self }
    }
}

impl Default for AxisTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Copyable view implementing the host contracts over an [`AxisTable`].
#[derive(Copy, Clone)]
pub struct AxisHandle<'a> {
    table: &'a AxisTable,
}

impl HostStepper for AxisHandle<'_> {
    fn position(&self, axis: Axis) -> i32 {
        self.table.position_cell(axis).get()
    }

    fn set_position(&mut self, axis: Axis, steps: i32) {
        self.table.planner[axis.as_index()].store(steps, Ordering::Relaxed);
    }

    fn leave_control_on(&mut self, axis: Axis) {
        self.table.host_owned[axis.as_index()].store(false, Ordering::Release);
    }

    fn take_control_on(&mut self, axis: Axis) {
        self.table.host_owned[axis.as_index()].store(true, Ordering::Release);
    }
}

impl MotionQueue for AxisHandle<'_> {
    fn is_empty(&self) -> bool {
        self.table.queued_blocks.load(Ordering::Acquire) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_flips_ownership_and_publishes_position() {
        let table = AxisTable::new();
        let mut handle = table.handle();

        handle.leave_control_on(Axis::Z);
        assert!(!table.owned_by_host(Axis::Z));
        assert!(table.owned_by_host(Axis::X));

        table.position_cell(Axis::Z).shift(-42);
        let position = handle.position(Axis::Z);
        handle.set_position(Axis::Z, position);
        handle.take_control_on(Axis::Z);

        assert!(table.owned_by_host(Axis::Z));
        assert_eq!(table.planner_position(Axis::Z), -42);
    }

    #[test]
    fn queue_drains_without_underflow() {
        let table = AxisTable::new();
        let handle = table.handle();
        assert!(handle.is_empty());

        table.queue_blocks(2);
        table.complete_block();
        assert!(!handle.is_empty());
        table.complete_block();
        table.complete_block();
        assert!(handle.is_empty());
    }
}
