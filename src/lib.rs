// lib.rs
pub mod config;
pub mod control_system;
pub mod error;
pub mod flow_analyzer;
pub mod global_variables;
pub mod monitoring;
pub mod simulation_engine;
pub mod traci;

pub use error::{Result, TlcsError};
