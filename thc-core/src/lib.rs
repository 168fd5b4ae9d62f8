#![no_std]

// Shared logic for the plasma torch-control subsystem.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Hardware is reached only through the traits in
// `host`, `ignition`, `pulse` and `sampler`, so the same state machines run
// inside interrupt handlers on the target and under the host test harness.

pub mod config;
pub mod cut;
pub mod height;
pub mod host;
pub mod ignition;
pub mod pulse;
pub mod sampler;
pub mod servo;
pub mod settings;
pub mod sim;
pub mod status;
pub mod telemetry;
