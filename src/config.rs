// src/config.rs

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::control_system::phases::PhaseScheme;
use crate::control_system::selector::SelectorKind;
use crate::error::{Result, TlcsError};
use crate::global_variables::{DEFAULT_STARVATION_THRESHOLD, SUMO_HOME_ENV};
use crate::simulation_engine::episode::EpisodeSettings;
use crate::simulation_engine::state::MIN_STATE_FEATURES;

/// Which simulator the evaluation drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// SUMO over TraCI, needs `SUMO_HOME`.
    Sumo,
    /// The in-process intersection.
    Local,
}

/// Evaluation settings, read from a JSON file. Missing keys take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub gui: bool,
    pub max_steps: u32,
    pub n_cars_generated: usize,
    pub episode_seed: u64,
    pub green_duration: u32,
    pub yellow_duration: u32,
    pub num_states: usize,
    pub num_actions: usize,
    pub starvation_threshold: u32,
    pub selector: SelectorKind,
    pub gateway: GatewayKind,
    pub sumocfg_file_name: PathBuf,
    pub route_file: PathBuf,
    /// Trained weights. Without them the queue heuristic ranks actions.
    pub model_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub dpi: u32,
    /// Also run the fixed-cycle baseline on the same seed.
    pub run_fixed_cycle: bool,
    /// Also run the per-action selector on the same seed.
    pub compare_selectors: bool,
    /// Steps a vehicle needs to reach the stop line in the local intersection.
    pub local_approach_steps: u32,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            gui: false,
            max_steps: 5400,
            n_cars_generated: 1000,
            episode_seed: 10000,
            green_duration: 10,
            yellow_duration: 4,
            num_states: 8,
            num_actions: 4,
            starvation_threshold: DEFAULT_STARVATION_THRESHOLD,
            selector: SelectorKind::Movement,
            gateway: GatewayKind::Local,
            sumocfg_file_name: PathBuf::from("intersection/sumo_config.sumocfg"),
            route_file: PathBuf::from("intersection/episode_routes.rou.xml"),
            model_path: None,
            output_path: PathBuf::from("test_results"),
            dpi: 96,
            run_fixed_cycle: true,
            compare_selectors: false,
            local_approach_steps: 8,
        }
    }
}

impl EvalConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            TlcsError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: EvalConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(TlcsError::Config("max_steps must be positive".into()));
        }
        if self.green_duration == 0 || self.yellow_duration == 0 {
            return Err(TlcsError::Config(
                "green_duration and yellow_duration must be positive".into(),
            ));
        }
        if self.num_states < MIN_STATE_FEATURES {
            return Err(TlcsError::Config(format!(
                "num_states must be at least {}, got {}",
                MIN_STATE_FEATURES, self.num_states
            )));
        }
        PhaseScheme::for_actions(self.num_actions)
            .map_err(|e| TlcsError::Config(e.to_string()))?;
        if self.dpi == 0 {
            return Err(TlcsError::Config("dpi must be positive".into()));
        }
        Ok(())
    }

    pub fn phase_scheme(&self) -> Result<PhaseScheme> {
        PhaseScheme::for_actions(self.num_actions)
    }

    pub fn episode_settings(&self) -> EpisodeSettings {
        EpisodeSettings {
            max_steps: self.max_steps,
            green_duration: self.green_duration,
            yellow_duration: self.yellow_duration,
            num_states: self.num_states,
            num_actions: self.num_actions,
        }
    }
}

/// SUMO installation root, read through `lookup`. Absence is fatal for SUMO runs.
pub fn sumo_home_from<F>(lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    lookup(SUMO_HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or(TlcsError::MissingEnv(SUMO_HOME_ENV))
}
