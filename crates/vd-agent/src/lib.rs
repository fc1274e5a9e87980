//! vdash agent: OBD-II polling over CAN into a shared vehicle state.
//!
//! Re-exports all modules so external crates (e.g. `vd-e2e-tests`) can
//! wire the poller, state store and simulated ECU themselves.

pub mod config;
pub mod reporter;
pub mod scheduler;
pub mod sim;
pub mod state;
