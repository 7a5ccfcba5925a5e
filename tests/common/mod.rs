// Fakes shared by the integration tests: a scripted stepped world and a
// model that replays fixed rankings.
#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;

use tlcs_eval::control_system::phases::PhaseCode;
use tlcs_eval::flow_analyzer::predictive_model::DecisionModel;
use tlcs_eval::simulation_engine::episode::EpisodeSettings;
use tlcs_eval::simulation_engine::gateway::{Approach, LaneId, SimulatorGateway, VehicleId};
use tlcs_eval::simulation_engine::route_generation::Scenario;
use tlcs_eval::simulation_engine::state::IntersectionState;
use tlcs_eval::{Result, TlcsError};

/// A vehicle present from `enter` (inclusive) to `leave` (exclusive); it waits every step.
#[derive(Debug, Clone)]
pub struct FakeVehicle {
    pub id: VehicleId,
    pub enter: u32,
    pub leave: u32,
}

#[derive(Debug, Default)]
pub struct FakeGateway {
    pub step: u32,
    pub sessions_started: u32,
    pub sessions_ended: u32,
    pub scenario_vehicles: usize,
    /// (step at which it was set, phase)
    pub phases: Vec<(u32, PhaseCode)>,
    pub halted_per_approach: u32,
    pub lane_depth: HashMap<LaneId, u32>,
    pub vehicles: Vec<FakeVehicle>,
    pub fail_at_step: Option<u32>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase_codes(&self) -> Vec<u32> {
        self.phases.iter().map(|(_, p)| p.0).collect()
    }
}

impl SimulatorGateway for FakeGateway {
    fn start_session(&mut self, scenario: &Scenario) -> Result<()> {
        self.sessions_started += 1;
        self.scenario_vehicles = scenario.departures.len();
        self.step = 0;
        self.phases.clear();
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        self.sessions_ended += 1;
        Ok(())
    }

    fn advance_one_step(&mut self) -> Result<()> {
        if self.fail_at_step == Some(self.step) {
            return Err(TlcsError::Gateway(format!("scripted failure at step {}", self.step)));
        }
        self.step += 1;
        Ok(())
    }

    fn list_active_entities(&mut self) -> Result<Vec<VehicleId>> {
        Ok(self
            .vehicles
            .iter()
            .filter(|v| v.enter <= self.step && self.step < v.leave)
            .map(|v| v.id.clone())
            .collect())
    }

    fn get_accumulated_wait(&mut self, vehicle: &str) -> Result<f64> {
        self.vehicles
            .iter()
            .find(|v| v.id == vehicle)
            .map(|v| f64::from(self.step - v.enter))
            .ok_or_else(|| TlcsError::Gateway(format!("unknown vehicle {}", vehicle)))
    }

    fn get_halted_count(&mut self, _approach: Approach) -> Result<u32> {
        Ok(self.halted_per_approach)
    }

    fn get_queue_depth(&mut self, lane: &LaneId) -> Result<u32> {
        Ok(self.lane_depth.get(lane).copied().unwrap_or(0))
    }

    fn set_signal_phase(&mut self, _intersection_id: &str, phase: PhaseCode) -> Result<()> {
        self.phases.push((self.step, phase));
        Ok(())
    }
}

/// Replays preferred actions in a loop: each call scores the scripted action highest.
pub struct ScriptedModel {
    num_actions: usize,
    script: Vec<usize>,
    calls: Cell<usize>,
}

impl ScriptedModel {
    pub fn new(num_actions: usize, script: Vec<usize>) -> Self {
        Self {
            num_actions,
            script,
            calls: Cell::new(0),
        }
    }

    pub fn always(num_actions: usize, action: usize) -> Self {
        Self::new(num_actions, vec![action])
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl DecisionModel for ScriptedModel {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn predict(&self, _state: &IntersectionState) -> Result<Vec<f64>> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        let preferred = self.script[call % self.script.len()];
        Ok((0..self.num_actions)
            .map(|a| if a == preferred { 1.0 } else { 0.0 })
            .collect())
    }
}

pub fn settings(max_steps: u32) -> EpisodeSettings {
    EpisodeSettings {
        max_steps,
        green_duration: 10,
        yellow_duration: 4,
        num_states: 8,
        num_actions: 4,
    }
}
