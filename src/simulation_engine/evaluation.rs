// simulation_engine/evaluation.rs
//
// Wires a config into gateways, models and runners, and runs the evaluation
// modes the binaries expose.

use std::ffi::OsString;
use std::time::Duration;

use log::{info, warn};

use crate::config::{sumo_home_from, EvalConfig, GatewayKind};
use crate::control_system::phases::PhaseTable;
use crate::control_system::selector::{build_policy, SelectorKind};
use crate::error::{Result, TlcsError};
use crate::flow_analyzer::predictive_model::{DecisionModel, LinearModel, QueueHeuristicModel};
use crate::simulation_engine::episode::{EpisodeMetrics, EpisodeRunner, RunMode};
use crate::simulation_engine::gateway::SimulatorGateway;
use crate::simulation_engine::local_world::LocalIntersection;
use crate::simulation_engine::route_generation::TrafficGenerator;
use crate::traci::{SumoGateway, SumoLaunch};

pub type BoxedGateway = Box<dyn SimulatorGateway + Send>;
pub type BoxedModel = Box<dyn DecisionModel + Send>;

/// What one evaluation run hands to the reporter.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub mode: RunMode,
    pub selector: Option<SelectorKind>,
    pub elapsed: Duration,
    pub metrics: EpisodeMetrics,
}

/// The SUMO gateway needs `SUMO_HOME`; its absence fails here, before any episode starts.
pub fn build_gateway(config: &EvalConfig, table: &PhaseTable) -> Result<BoxedGateway> {
    build_gateway_with(config, table, |key| std::env::var_os(key))
}

/// `build_gateway` with environment variables read through `lookup`.
pub fn build_gateway_with<F>(config: &EvalConfig, table: &PhaseTable, lookup: F) -> Result<BoxedGateway>
where
    F: Fn(&str) -> Option<OsString>,
{
    match config.gateway {
        GatewayKind::Sumo => {
            let launch = SumoLaunch::from_home(
                sumo_home_from(lookup),
                config.gui,
                &config.sumocfg_file_name,
                config.max_steps,
            )?;
            info!("Using SUMO at {}", launch.binary.display());
            Ok(Box::new(SumoGateway::new(launch)))
        }
        GatewayKind::Local => Ok(Box::new(LocalIntersection::new(
            table.clone(),
            config.local_approach_steps,
        ))),
    }
}

pub fn build_model(config: &EvalConfig, table: &PhaseTable) -> Result<BoxedModel> {
    match &config.model_path {
        Some(path) => Ok(Box::new(LinearModel::load(path)?)),
        None => {
            warn!("No model_path configured, ranking actions by queued vehicles");
            Ok(Box::new(QueueHeuristicModel::new(table.clone())))
        }
    }
}

pub fn build_generator(config: &EvalConfig) -> TrafficGenerator {
    let generator = TrafficGenerator::new(config.max_steps, config.n_cars_generated);
    match config.gateway {
        GatewayKind::Sumo => generator.with_route_file(&config.route_file),
        GatewayKind::Local => generator,
    }
}

pub fn build_runner(
    config: &EvalConfig,
    selector: SelectorKind,
) -> Result<EpisodeRunner<BoxedGateway, BoxedModel>> {
    let table = PhaseTable::new(config.phase_scheme()?)?;
    let gateway = build_gateway(config, &table)?;
    let model = build_model(config, &table)?;
    let policy = build_policy(selector, table, config.starvation_threshold);
    EpisodeRunner::new(
        gateway,
        model,
        policy,
        build_generator(config),
        config.episode_settings(),
    )
}

/// One model-driven episode on `episode_seed` with the given selector.
pub fn evaluate_model(config: &EvalConfig, selector: SelectorKind) -> Result<EvaluationOutcome> {
    let mut runner = build_runner(config, selector)?;
    let elapsed = runner.run(config.episode_seed)?;
    Ok(EvaluationOutcome {
        mode: RunMode::Model,
        selector: Some(selector),
        elapsed,
        metrics: runner.into_metrics(),
    })
}

/// The round-robin baseline on `episode_seed`.
pub fn evaluate_fixed_cycle(config: &EvalConfig) -> Result<EvaluationOutcome> {
    let mut runner = build_runner(config, config.selector)?;
    let elapsed = runner.run_fixed_cycle(config.episode_seed)?;
    Ok(EvaluationOutcome {
        mode: RunMode::FixedCycle,
        selector: None,
        elapsed,
        metrics: runner.into_metrics(),
    })
}

/// The selector kind the comparison run uses: whichever one is not configured.
pub fn other_selector(kind: SelectorKind) -> SelectorKind {
    match kind {
        SelectorKind::Movement => SelectorKind::Action,
        SelectorKind::Action => SelectorKind::Movement,
    }
}

impl EvaluationOutcome {
    pub fn waiting_series(&self) -> &[f64] {
        self.metrics.waiting_series(self.mode)
    }

    pub fn label(&self) -> String {
        match (self.mode, self.selector) {
            (RunMode::FixedCycle, _) => "fixed_cycle".to_string(),
            (RunMode::Model, Some(SelectorKind::Movement)) | (RunMode::Model, None) => {
                "model".to_string()
            }
            (RunMode::Model, Some(SelectorKind::Action)) => "model_action_selector".to_string(),
        }
    }
}
