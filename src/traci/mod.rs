// traci/mod.rs
pub mod client;
pub mod codec;

pub use client::{SumoGateway, SumoLaunch, TraciConnection};
