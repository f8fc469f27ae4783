//! Integration test driver for `tests/integration/`.
//!
//! Each `mod` below exercises one subsystem through the full
//! `AppService` command path against the simulation adapters. All tests
//! run on the host with no real hardware; dose volumes and calibration
//! rates are scaled so motor runtimes stay in the 100-500 ms range.

#![cfg(not(target_os = "espidf"))]

mod common;
mod dosing_flow_tests;
mod log_flow_tests;
mod schedule_flow_tests;
mod wifi_flow_tests;
