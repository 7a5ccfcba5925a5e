// simulation_engine/episode.rs
//
// One evaluation episode: sample the intersection, ask the model, let the
// selector enforce fairness, drive the lights through yellow and green, and
// record reward and waiting-time series along the way.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;

use crate::control_system::phases::Action;
use crate::control_system::selector::SelectionPolicy;
use crate::error::{Result, TlcsError};
use crate::flow_analyzer::predictive_model::DecisionModel;
use crate::global_variables::{FIXED_CYCLE_GREEN_REPEATS, TL_ID};
use crate::simulation_engine::gateway::{SimulatorGateway, VehicleId};
use crate::simulation_engine::route_generation::TrafficGenerator;
use crate::simulation_engine::state::{queue_length, IntersectionState};

/// Fixed parameters of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EpisodeSettings {
    pub max_steps: u32,
    pub green_duration: u32,
    pub yellow_duration: u32,
    pub num_states: usize,
    pub num_actions: usize,
}

/// Which waiting-time series a simulated step is recorded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Model,
    FixedCycle,
}

/// Series collected by the runner, read by the reporter afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpisodeMetrics {
    /// One per decision: minus the halted vehicles at decision time.
    pub reward_episode: Vec<f64>,
    /// One per decision: halted vehicles at decision time.
    pub queue_length_episode: Vec<u32>,
    /// One per decision.
    pub actions: Vec<Action>,
    /// Total accumulated wait sampled at each decision.
    pub decision_waits: Vec<f64>,
    /// Total accumulated wait after every simulated step of a model-driven run.
    pub sum_waiting_times: Vec<f64>,
    /// Same, for the fixed-cycle baseline.
    pub sum_waiting_times_fixed: Vec<f64>,
}

impl EpisodeMetrics {
    fn clear_model_run(&mut self) {
        self.reward_episode.clear();
        self.queue_length_episode.clear();
        self.actions.clear();
        self.decision_waits.clear();
        self.sum_waiting_times.clear();
    }

    pub fn decisions(&self) -> usize {
        self.reward_episode.len()
    }

    pub fn total_reward(&self) -> f64 {
        self.reward_episode.iter().sum()
    }

    pub fn waiting_series(&self, mode: RunMode) -> &[f64] {
        match mode {
            RunMode::Model => &self.sum_waiting_times,
            RunMode::FixedCycle => &self.sum_waiting_times_fixed,
        }
    }
}

pub struct EpisodeRunner<G, M> {
    gateway: G,
    model: M,
    policy: Box<dyn SelectionPolicy + Send>,
    generator: TrafficGenerator,
    settings: EpisodeSettings,
    step: u32,
    waiting_times: HashMap<VehicleId, f64>,
    metrics: EpisodeMetrics,
}

impl<G: SimulatorGateway, M: DecisionModel> EpisodeRunner<G, M> {
    pub fn new(
        gateway: G,
        model: M,
        policy: Box<dyn SelectionPolicy + Send>,
        generator: TrafficGenerator,
        settings: EpisodeSettings,
    ) -> Result<Self> {
        if model.num_actions() != settings.num_actions {
            return Err(TlcsError::Config(format!(
                "model scores {} actions but the run uses {}",
                model.num_actions(),
                settings.num_actions
            )));
        }
        if let Some(width) = model.state_width() {
            if width != settings.num_states {
                return Err(TlcsError::Config(format!(
                    "model reads {} state features but the run samples {}",
                    width, settings.num_states
                )));
            }
        }
        Ok(Self {
            gateway,
            model,
            policy,
            generator,
            settings,
            step: 0,
            waiting_times: HashMap::new(),
            metrics: EpisodeMetrics::default(),
        })
    }

    pub fn settings(&self) -> &EpisodeSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &EpisodeMetrics {
        &self.metrics
    }

    pub fn into_metrics(self) -> EpisodeMetrics {
        self.metrics
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Runs one model-driven episode and returns its wall-clock duration.
    pub fn run(&mut self, seed: u64) -> Result<Duration> {
        let start = Instant::now();
        let scenario = self.generator.generate_routefile(seed)?;
        self.gateway.start_session(&scenario)?;
        info!(
            "Simulating episode {} with the {} selector...",
            seed,
            self.policy.name()
        );

        self.reset_episode();
        self.metrics.clear_model_run();
        let outcome = self.model_loop();
        self.finish_session(outcome)?;

        let elapsed = start.elapsed();
        info!(
            "Episode {} finished: {} decisions, total reward {}, {:.1}s",
            seed,
            self.metrics.decisions(),
            self.metrics.total_reward(),
            elapsed.as_secs_f64()
        );
        Ok(elapsed)
    }

    /// Round-robin baseline: every action in turn, three greens then one yellow.
    /// No model or selector involvement.
    pub fn run_fixed_cycle(&mut self, seed: u64) -> Result<Duration> {
        let start = Instant::now();
        let scenario = self.generator.generate_routefile(seed)?;
        self.gateway.start_session(&scenario)?;
        info!("Simulating fixed-cycle episode {}...", seed);

        self.reset_episode();
        self.metrics.sum_waiting_times_fixed.clear();
        let outcome = self.fixed_cycle_loop();
        self.finish_session(outcome)?;

        let elapsed = start.elapsed();
        info!(
            "Fixed-cycle episode {} finished in {:.1}s",
            seed,
            elapsed.as_secs_f64()
        );
        Ok(elapsed)
    }

    /// Advances up to `steps_todo` ticks, never past `max_steps`, sampling the
    /// total wait after each tick. Returns the number of ticks simulated.
    pub fn simulate(&mut self, steps_todo: u32, mode: RunMode) -> Result<u32> {
        let steps_todo = steps_todo.min(self.settings.max_steps.saturating_sub(self.step));

        for _ in 0..steps_todo {
            self.gateway.advance_one_step()?;
            self.step += 1;
            let wait = self.collect_waiting_times()?;
            match mode {
                RunMode::Model => self.metrics.sum_waiting_times.push(wait),
                RunMode::FixedCycle => self.metrics.sum_waiting_times_fixed.push(wait),
            }
        }
        Ok(steps_todo)
    }

    fn reset_episode(&mut self) {
        self.step = 0;
        self.waiting_times.clear();
        self.policy.reset();
    }

    fn model_loop(&mut self) -> Result<()> {
        let mut old_action: Option<Action> = None;

        while self.step < self.settings.max_steps {
            let state = IntersectionState::sample(&mut self.gateway, self.settings.num_states)?;

            // Recorded only; the reward is the instantaneous queue.
            let current_total_wait = self.collect_waiting_times()?;
            let queue = queue_length(&mut self.gateway)?;
            let reward = -f64::from(queue);

            let ranking = self.model.rank(&state)?;
            let action = self.policy.select(&ranking)?;
            if action != ranking.top() {
                debug!("Step {}: model wanted {}, applying {}", self.step, ranking.top(), action);
            }

            if let Some(previous) = old_action {
                if previous != action {
                    self.set_yellow_phase(previous)?;
                    self.simulate(self.settings.yellow_duration, RunMode::Model)?;
                }
            }

            self.set_green_phase(action)?;
            self.simulate(self.settings.green_duration, RunMode::Model)?;

            old_action = Some(action);
            self.metrics.reward_episode.push(reward);
            self.metrics.queue_length_episode.push(queue);
            self.metrics.actions.push(action);
            self.metrics.decision_waits.push(current_total_wait);
        }
        Ok(())
    }

    fn fixed_cycle_loop(&mut self) -> Result<()> {
        let mut action = Action(0);

        while self.step < self.settings.max_steps {
            for _ in 0..FIXED_CYCLE_GREEN_REPEATS {
                if self.step >= self.settings.max_steps {
                    return Ok(());
                }
                self.set_green_phase(action)?;
                self.simulate(self.settings.green_duration, RunMode::FixedCycle)?;
            }
            if self.step >= self.settings.max_steps {
                return Ok(());
            }
            self.set_yellow_phase(action)?;
            self.simulate(self.settings.yellow_duration, RunMode::FixedCycle)?;

            action = Action((action.0 + 1) % self.settings.num_actions);
        }
        Ok(())
    }

    /// Closes the gateway on every exit path. A loop failure wins over a close failure.
    fn finish_session(&mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => self.gateway.end_session(),
            Err(err) => {
                if let Err(close_err) = self.gateway.end_session() {
                    warn!("Failed to end session after error: {}", close_err);
                }
                Err(err)
            }
        }
    }

    /// Refreshes per-vehicle waits from the gateway and returns their sum.
    /// Vehicles that already left keep their last value.
    fn collect_waiting_times(&mut self) -> Result<f64> {
        for vehicle in self.gateway.list_active_entities()? {
            let wait = self.gateway.get_accumulated_wait(&vehicle)?;
            self.waiting_times.insert(vehicle, wait);
        }
        Ok(self.waiting_times.values().sum())
    }

    fn set_yellow_phase(&mut self, old_action: Action) -> Result<()> {
        self.gateway.set_signal_phase(TL_ID, old_action.yellow_phase())
    }

    fn set_green_phase(&mut self, action: Action) -> Result<()> {
        self.gateway.set_signal_phase(TL_ID, action.green_phase())
    }
}
