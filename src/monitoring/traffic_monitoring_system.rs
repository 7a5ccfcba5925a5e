// monitoring/traffic_monitoring_system.rs
//
// Writes the series collected by an episode as plain text and line charts,
// and keeps a CSV log of one summary row per episode.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TlcsError};
use crate::simulation_engine::episode::{EpisodeMetrics, RunMode};

/// Line colours for overlay charts: first series default blue, then red, then black.
const SERIES_COLORS: [RGBColor; 3] = [RGBColor(31, 119, 180), RED, BLACK];

/// Chart size in inches, scaled by dpi.
const FIGURE_WIDTH_IN: f64 = 20.0;
const FIGURE_HEIGHT_IN: f64 = 11.25;

const SUMMARY_FILE: &str = "episodes.csv";

/// One row of `episodes.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub seed: u64,
    pub mode: String,
    pub elapsed_secs: f64,
    pub decisions: usize,
    pub total_reward: f64,
    pub mean_queue_length: f64,
    pub final_total_wait: f64,
}

impl EpisodeSummary {
    /// `label` names the run in the `mode` column, e.g. `model`, `model_action_selector`.
    pub fn from_metrics(
        seed: u64,
        mode: RunMode,
        label: &str,
        elapsed_secs: f64,
        metrics: &EpisodeMetrics,
    ) -> Self {
        let (decisions, total_reward, mean_queue_length) = match mode {
            RunMode::Model if !metrics.queue_length_episode.is_empty() => (
                metrics.decisions(),
                metrics.total_reward(),
                metrics.queue_length_episode.iter().map(|q| f64::from(*q)).sum::<f64>()
                    / metrics.queue_length_episode.len() as f64,
            ),
            RunMode::Model => (metrics.decisions(), metrics.total_reward(), 0.0),
            RunMode::FixedCycle => (0, 0.0, 0.0),
        };
        Self {
            seed,
            mode: label.to_string(),
            elapsed_secs: (elapsed_secs * 10.0).round() / 10.0,
            decisions,
            total_reward,
            mean_queue_length,
            final_total_wait: metrics.waiting_series(mode).last().copied().unwrap_or(0.0),
        }
    }
}

/// Output directory plus rendering settings.
#[derive(Debug, Clone)]
pub struct Reporter {
    path: PathBuf,
    dpi: u32,
}

impl Reporter {
    pub fn new<P: AsRef<Path>>(path: P, dpi: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path, dpi })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_path(&self, filename: &str) -> PathBuf {
        self.path.join(format!("plot_{}_data.txt", filename))
    }

    pub fn plot_path(&self, filename: &str) -> PathBuf {
        self.path.join(format!("plot_{}.png", filename))
    }

    /// One value per line.
    pub fn save_data<T: ToString>(&self, data: &[T], filename: &str) -> Result<PathBuf> {
        let path = self.data_path(filename);
        let mut writer = BufWriter::new(File::create(&path)?);
        for value in data {
            writeln!(writer, "{}", value.to_string())?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Chart plus its data file.
    pub fn save_data_and_plot(
        &self,
        data: &[f64],
        filename: &str,
        xlabel: &str,
        ylabel: &str,
    ) -> Result<()> {
        self.save_data(data, filename)?;
        self.render(&[data], filename, xlabel, ylabel)?;
        info!("Saved {} series to {}", filename, self.path.display());
        Ok(())
    }

    /// Overlays two or three series in one chart (no data file).
    pub fn save_overlay_plot(
        &self,
        series: &[&[f64]],
        filename: &str,
        xlabel: &str,
        ylabel: &str,
    ) -> Result<()> {
        if !(2..=SERIES_COLORS.len()).contains(&series.len()) {
            return Err(TlcsError::Report(format!(
                "overlay takes 2 or 3 series, got {}",
                series.len()
            )));
        }
        self.render(series, filename, xlabel, ylabel)?;
        info!("Saved {} overlay to {}", filename, self.path.display());
        Ok(())
    }

    /// Appends a row to `episodes.csv`, writing the header on first use.
    pub fn append_summary(&self, summary: &EpisodeSummary) -> Result<()> {
        let filename = self.path.join(SUMMARY_FILE);
        let file_exists = filename.exists();
        let file = OpenOptions::new().append(true).create(true).open(&filename)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);
        wtr.serialize(summary)?;
        wtr.flush()?;
        Ok(())
    }

    pub fn read_summaries(&self) -> Result<Vec<EpisodeSummary>> {
        let mut rdr = csv::Reader::from_path(self.path.join(SUMMARY_FILE))?;
        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            rows.push(result?);
        }
        Ok(rows)
    }

    fn render(&self, series: &[&[f64]], filename: &str, xlabel: &str, ylabel: &str) -> Result<()> {
        let (y_min, y_max) = value_range(series)
            .ok_or_else(|| TlcsError::Report(format!("no data to plot for {}", filename)))?;
        let x_max = series.iter().map(|s| s.len()).max().unwrap_or(1).max(1);

        let width = (FIGURE_WIDTH_IN * f64::from(self.dpi)) as u32;
        let height = (FIGURE_HEIGHT_IN * f64::from(self.dpi)) as u32;
        let font_size = (f64::from(self.dpi) / 4.0).max(12.0) as u32;

        let plot_path = self.plot_path(filename);
        let root = BitMapBackend::new(&plot_path, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(40)
            .x_label_area_size(font_size * 3)
            .y_label_area_size(font_size * 5)
            .build_cartesian_2d(0..x_max, y_min..y_max)
            .map_err(chart_error)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(xlabel)
            .y_desc(ylabel)
            .label_style(("sans-serif", font_size))
            .axis_desc_style(("sans-serif", font_size))
            .draw()
            .map_err(chart_error)?;

        for (data, color) in series.iter().zip(SERIES_COLORS.iter()) {
            chart
                .draw_series(LineSeries::new(
                    data.iter().enumerate().map(|(i, v)| (i, *v)),
                    color.stroke_width(2),
                ))
                .map_err(chart_error)?;
        }

        root.present().map_err(chart_error)?;
        Ok(())
    }
}

/// Data range padded by 5% of each bound's magnitude.
fn value_range(series: &[&[f64]]) -> Option<(f64, f64)> {
    let values = series.iter().flat_map(|s| s.iter().copied());
    let (min, max) = values.fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })?;
    let lo = min - 0.05 * min.abs();
    let hi = max + 0.05 * max.abs();
    if hi > lo {
        Some((lo, hi))
    } else {
        Some((lo - 1.0, hi + 1.0))
    }
}

fn chart_error<E: std::fmt::Display>(err: E) -> TlcsError {
    TlcsError::Report(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_file_has_one_value_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path(), 96).unwrap();
        let path = reporter.save_data(&[-3.0, 0.5, 12.0], "reward").unwrap();
        assert_eq!(path, dir.path().join("plot_reward_data.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "-3\n0.5\n12\n");
    }

    #[test]
    fn range_pads_by_five_percent() {
        let (lo, hi) = value_range(&[&[-10.0, 0.0], &[20.0]]).unwrap();
        assert!((lo - -10.5).abs() < 1e-9);
        assert!((hi - 21.0).abs() < 1e-9);
        assert_eq!(value_range(&[&[0.0, 0.0]]), Some((-1.0, 1.0)));
        assert_eq!(value_range(&[&[]]), None);
    }

    #[test]
    fn overlay_needs_two_or_three_series() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path(), 96).unwrap();
        let a = [1.0, 2.0];
        assert!(reporter.save_overlay_plot(&[&a], "x", "step", "y").is_err());
        assert!(reporter.save_overlay_plot(&[&a, &a, &a, &a], "x", "step", "y").is_err());
    }

    #[test]
    fn summaries_append_with_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path().join("results"), 96).unwrap();

        let metrics = EpisodeMetrics {
            reward_episode: vec![-2.0, -4.0],
            queue_length_episode: vec![2, 4],
            sum_waiting_times: vec![1.0, 5.0, 9.0],
            ..EpisodeMetrics::default()
        };
        let model = EpisodeSummary::from_metrics(7, RunMode::Model, "model", 1.234, &metrics);
        assert_eq!(model.decisions, 2);
        assert_eq!(model.total_reward, -6.0);
        assert_eq!(model.mean_queue_length, 3.0);
        assert_eq!(model.final_total_wait, 9.0);
        assert_eq!(model.elapsed_secs, 1.2);

        reporter.append_summary(&model).unwrap();
        let fixed = EpisodeSummary::from_metrics(7, RunMode::FixedCycle, "fixed_cycle", 0.5, &metrics);
        reporter.append_summary(&fixed).unwrap();

        let text = std::fs::read_to_string(reporter.path().join("episodes.csv")).unwrap();
        assert_eq!(text.matches("seed,mode").count(), 1);
        let rows = reporter.read_summaries().unwrap();
        assert_eq!(rows, vec![model, fixed]);
    }

    #[test]
    fn selector_runs_get_distinct_rows() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path(), 96).unwrap();
        let metrics = EpisodeMetrics {
            reward_episode: vec![-1.0],
            queue_length_episode: vec![1],
            sum_waiting_times: vec![2.0],
            ..EpisodeMetrics::default()
        };
        for label in ["model", "model_action_selector"] {
            let summary = EpisodeSummary::from_metrics(3, RunMode::Model, label, 1.0, &metrics);
            reporter.append_summary(&summary).unwrap();
        }
        let modes: Vec<String> = reporter
            .read_summaries()
            .unwrap()
            .into_iter()
            .map(|row| row.mode)
            .collect();
        assert_eq!(modes, vec!["model", "model_action_selector"]);
    }

    #[test]
    fn data_file_survives_a_failed_chart() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path(), 96).unwrap();
        assert!(reporter.save_data_and_plot(&[], "empty", "step", "wait").is_err());
        let text = std::fs::read_to_string(reporter.data_path("empty")).unwrap();
        assert!(text.is_empty());
        assert!(!reporter.plot_path("empty").exists());
    }
}
