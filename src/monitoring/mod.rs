// monitoring/mod.rs
pub mod traffic_monitoring_system;

pub use traffic_monitoring_system::{EpisodeSummary, Reporter};
