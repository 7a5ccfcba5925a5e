// main.rs
//
// Evaluates a trained model on one episode, optionally next to the fixed-cycle
// baseline and the per-action selector, and writes the plots and data files.

use std::env;
use std::process;

use log::{error, info};
use tokio::task;

use tlcs_eval::config::{EvalConfig, GatewayKind};
use tlcs_eval::monitoring::{EpisodeSummary, Reporter};
use tlcs_eval::simulation_engine::evaluation::{
    evaluate_fixed_cycle, evaluate_model, other_selector, EvaluationOutcome,
};
use tlcs_eval::{Result, TlcsError};

const DEFAULT_SETTINGS: &str = "testing_settings.json";

#[tokio::main]
async fn main() {
    env_logger::init();

    let settings_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_SETTINGS.to_string());
    if let Err(e) = run(&settings_path).await {
        error!("Evaluation failed: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(settings_path: &str) -> Result<()> {
    let config = EvalConfig::from_file(settings_path)?;
    info!("Loaded settings from {}", settings_path);
    let reporter = Reporter::new(&config.output_path, config.dpi)?;

    let outcomes = if config.gateway == GatewayKind::Local {
        run_concurrently(&config).await?
    } else {
        // SUMO runs share one route file, so they go one after another.
        run_sequentially(&config)?
    };

    report(&config, &reporter, &outcomes)?;
    info!("Results saved in {}", reporter.path().display());
    Ok(())
}

fn jobs(config: &EvalConfig) -> Vec<Box<dyn FnOnce() -> Result<EvaluationOutcome> + Send>> {
    let mut jobs: Vec<Box<dyn FnOnce() -> Result<EvaluationOutcome> + Send>> = Vec::new();

    let cfg = config.clone();
    jobs.push(Box::new(move || evaluate_model(&cfg, cfg.selector)));
    if config.run_fixed_cycle {
        let cfg = config.clone();
        jobs.push(Box::new(move || evaluate_fixed_cycle(&cfg)));
    }
    if config.compare_selectors {
        let cfg = config.clone();
        jobs.push(Box::new(move || evaluate_model(&cfg, other_selector(cfg.selector))));
    }
    jobs
}

async fn run_concurrently(config: &EvalConfig) -> Result<Vec<EvaluationOutcome>> {
    let handles: Vec<_> = jobs(config).into_iter().map(task::spawn_blocking).collect();
    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| TlcsError::Gateway(format!("evaluation task failed: {}", e)))??;
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn run_sequentially(config: &EvalConfig) -> Result<Vec<EvaluationOutcome>> {
    jobs(config).into_iter().map(|job| job()).collect()
}

fn report(config: &EvalConfig, reporter: &Reporter, outcomes: &[EvaluationOutcome]) -> Result<()> {
    for outcome in outcomes {
        info!(
            "{}: {:.1}s, final total wait {}",
            outcome.label(),
            outcome.elapsed.as_secs_f64(),
            outcome.waiting_series().last().copied().unwrap_or(0.0)
        );
        reporter.append_summary(&EpisodeSummary::from_metrics(
            config.episode_seed,
            outcome.mode,
            &outcome.label(),
            outcome.elapsed.as_secs_f64(),
            &outcome.metrics,
        ))?;
    }

    let model = &outcomes[0];
    reporter.save_data_and_plot(&model.metrics.reward_episode, "reward", "Action step", "Reward")?;
    let queue: Vec<f64> = model
        .metrics
        .queue_length_episode
        .iter()
        .map(|q| f64::from(*q))
        .collect();
    reporter.save_data_and_plot(&queue, "queue", "Action step", "Queue length (vehicles)")?;
    reporter.save_data_and_plot(
        model.waiting_series(),
        "delay",
        "Simulation step",
        "Cumulative waiting time (s)",
    )?;

    for outcome in &outcomes[1..] {
        reporter.save_data(outcome.waiting_series(), &format!("delay_{}", outcome.label()))?;
    }
    if outcomes.len() > 1 {
        let series: Vec<&[f64]> = outcomes.iter().map(|o| o.waiting_series()).collect();
        reporter.save_overlay_plot(
            &series,
            "delay_comparison",
            "Simulation step",
            "Cumulative waiting time (s)",
        )?;
    }
    Ok(())
}
