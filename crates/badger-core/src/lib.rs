//! Hardware-independent core library for badger-air
//!
//! This crate contains the platform-agnostic half of the badge firmware: the
//! reading history and its flash-backed persistent record, the cross-context
//! acquisition worker and its scheduler, and the SCD41 adapter the worker
//! drives (behind the `sensor-scd41` feature).
//!
//! It is `#![no_std]` so it compiles on both the RP2040 target and desktop hosts
//! (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

pub mod acquisition;
pub mod app_state;
pub mod config;
pub mod sensors;
pub mod storage;

#[cfg(test)]
mod test_support;
