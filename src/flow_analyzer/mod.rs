pub mod predictive_model;

// Re-export the items from predictive_model
pub use predictive_model::{DecisionModel, LinearModel, QueueHeuristicModel, Ranking};
