// fixed_cycle_main.rs
//
// Runs only the round-robin baseline and saves its waiting-time series.

use std::env;
use std::process;

use log::info;

use tlcs_eval::config::EvalConfig;
use tlcs_eval::monitoring::{EpisodeSummary, Reporter};
use tlcs_eval::simulation_engine::evaluation::evaluate_fixed_cycle;
use tlcs_eval::Result;

fn run(settings_path: &str) -> Result<()> {
    let config = EvalConfig::from_file(settings_path)?;
    let reporter = Reporter::new(&config.output_path, config.dpi)?;

    let outcome = evaluate_fixed_cycle(&config)?;
    reporter.save_data_and_plot(
        outcome.waiting_series(),
        "delay_fixed_cycle",
        "Simulation step",
        "Cumulative waiting time (s)",
    )?;
    reporter.append_summary(&EpisodeSummary::from_metrics(
        config.episode_seed,
        outcome.mode,
        &outcome.label(),
        outcome.elapsed.as_secs_f64(),
        &outcome.metrics,
    ))?;
    info!("Baseline results saved in {}", reporter.path().display());
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let settings_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "testing_settings.json".to_string());
    let result = tokio::task::spawn_blocking(move || run(&settings_path)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Baseline task failed: {}", e);
            process::exit(1);
        }
    }
}
