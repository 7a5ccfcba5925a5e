// simulation_engine/mod.rs
pub mod episode;
pub mod evaluation;
pub mod gateway;
pub mod local_world;
pub mod route_generation;
pub mod state;
