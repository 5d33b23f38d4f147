//! quiclb library crate for the operator binary and its tests.
//!
//! The routing core lives in `quiclb-core`; this crate loads configuration,
//! sets up logging and assembles the core. The main binary is in main.rs.

pub mod balancer;
pub mod commands;
pub mod config;
pub mod telemetry;
