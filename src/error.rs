// src/error.rs

use thiserror::Error;

/// Every failure an evaluation run can hit. None of them are retried.
#[derive(Debug, Error)]
pub enum TlcsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("please declare environment variable '{0}'")]
    MissingEnv(&'static str),

    #[error("phase scheme error: {0}")]
    PhaseScheme(String),

    #[error("decision model error: {0}")]
    Model(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("traci protocol error: {0}")]
    Protocol(String),

    #[error("traci command 0x{command:02x} failed: {description}")]
    CommandFailed { command: u8, description: String },

    #[error("report error: {0}")]
    Report(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, TlcsError>;
