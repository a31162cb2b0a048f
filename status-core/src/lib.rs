#![no_std]

// Shared logic for the roboto_usb2can status indicators.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. The firmware feeds hardware events in and drives the
// tick; the emulator and the tests do the same with synthetic clocks.

pub mod config;
pub mod events;
pub mod led;
pub mod monitor;
pub mod script;
pub mod status;
pub mod telemetry;

/// Monotonic timestamp in milliseconds since boot.
pub type Millis = u64;
