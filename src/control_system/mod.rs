// control_system/mod.rs
pub mod phases;
pub mod selector;
