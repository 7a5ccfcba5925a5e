// simulation_engine/local_world.rs
//
// A small in-process four-approach intersection. Vehicles from the scenario
// enter their inbound lane, drive to the stop line and queue there until a
// green releases their movement. It gives evaluations and tests a stepped
// world without SUMO; it is not a traffic model of any fidelity.

use std::collections::{HashMap, VecDeque};

use log::{debug, info};

use crate::control_system::phases::{Movement, PhaseCode, PhaseTable};
use crate::error::{Result, TlcsError};
use crate::global_variables::{LANES_PER_EDGE, LEFT_TURN_LANE, TL_ID};
use crate::simulation_engine::gateway::{Approach, LaneId, SimulatorGateway, VehicleId};
use crate::simulation_engine::route_generation::{Departure, Scenario};

/// A vehicle on one of the inbound lanes.
#[derive(Debug, Clone)]
struct LocalVehicle {
    id: VehicleId,
    movement: Movement,
    /// Steps left until it reaches the stop line (or the back of the queue).
    steps_to_stop_line: u32,
    /// Seconds spent halted so far.
    waiting: f64,
    halted: bool,
}

/// Stepped intersection implementing the gateway contract in memory.
#[derive(Debug)]
pub struct LocalIntersection {
    table: PhaseTable,
    approach_steps: u32,
    step: u32,
    running: bool,
    phase: Option<PhaseCode>,
    pending: VecDeque<Departure>,
    lanes: HashMap<LaneId, VecDeque<LocalVehicle>>,
    through_lane_cursor: u8,
    departed: usize,
}

impl LocalIntersection {
    /// `approach_steps` is how long a vehicle drives from entering the lane to the stop line.
    pub fn new(table: PhaseTable, approach_steps: u32) -> Self {
        Self {
            table,
            approach_steps,
            step: 0,
            running: false,
            phase: None,
            pending: VecDeque::new(),
            lanes: HashMap::new(),
            through_lane_cursor: 0,
            departed: 0,
        }
    }

    pub fn current_step(&self) -> u32 {
        self.step
    }

    pub fn current_phase(&self) -> Option<PhaseCode> {
        self.phase
    }

    /// Vehicles that already cleared the intersection this session.
    pub fn departed(&self) -> usize {
        self.departed
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running {
            Ok(())
        } else {
            Err(TlcsError::Gateway("no active local session".into()))
        }
    }

    fn vehicles(&self) -> impl Iterator<Item = &LocalVehicle> {
        self.lanes.values().flatten()
    }

    fn lane_for(&mut self, departure: &Departure) -> LaneId {
        let index = if departure.route.is_left_turn() {
            LEFT_TURN_LANE
        } else {
            // Spread through/right traffic over the non-left lanes.
            let index = self.through_lane_cursor;
            self.through_lane_cursor = (self.through_lane_cursor + 1) % LEFT_TURN_LANE;
            index
        };
        LaneId::new(departure.route.from, index)
    }

    fn spawn_due_vehicles(&mut self) {
        while self
            .pending
            .front()
            .is_some_and(|d| d.depart_step <= self.step)
        {
            let Some(departure) = self.pending.pop_front() else {
                break;
            };
            let lane = self.lane_for(&departure);
            self.lanes.entry(lane).or_default().push_back(LocalVehicle {
                id: departure.vehicle_id,
                movement: departure.route.movement(),
                steps_to_stop_line: self.approach_steps,
                waiting: 0.0,
                halted: false,
            });
        }
    }

    /// Movements released by the active phase. Yellow and no phase release nothing.
    fn released(&self) -> Vec<Movement> {
        match self.phase {
            Some(code) if !code.is_yellow() => self
                .table
                .served(code.action())
                .map(|set| set.iter().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

impl SimulatorGateway for LocalIntersection {
    fn start_session(&mut self, scenario: &Scenario) -> Result<()> {
        if self.running {
            return Err(TlcsError::Gateway("local session already running".into()));
        }
        self.step = 0;
        self.phase = None;
        self.lanes.clear();
        self.through_lane_cursor = 0;
        self.departed = 0;
        self.pending = scenario.departures.iter().cloned().collect();
        self.running = true;
        info!(
            "Local intersection started with {} scheduled vehicles (seed {})",
            self.pending.len(),
            scenario.seed
        );
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        self.ensure_running()?;
        self.running = false;
        self.pending.clear();
        self.lanes.clear();
        info!(
            "Local intersection closed after {} steps, {} vehicles cleared",
            self.step, self.departed
        );
        Ok(())
    }

    fn advance_one_step(&mut self) -> Result<()> {
        self.ensure_running()?;
        let released = self.released();
        let mut cleared = 0;

        for queue in self.lanes.values_mut() {
            // Head of the lane crosses if its movement is green.
            if let Some(head) = queue.front() {
                if head.steps_to_stop_line == 0 && released.contains(&head.movement) {
                    queue.pop_front();
                    cleared += 1;
                }
            }

            // Everyone else drives on until blocked by the vehicle ahead.
            let mut blocked_at_stop_line = true;
            for vehicle in queue.iter_mut() {
                if vehicle.steps_to_stop_line > 0 {
                    vehicle.steps_to_stop_line -= 1;
                    vehicle.halted = false;
                    blocked_at_stop_line = false;
                } else if blocked_at_stop_line {
                    vehicle.halted = true;
                    vehicle.waiting += 1.0;
                }
            }
        }

        self.departed += cleared;
        self.step += 1;
        self.spawn_due_vehicles();
        Ok(())
    }

    fn list_active_entities(&mut self) -> Result<Vec<VehicleId>> {
        self.ensure_running()?;
        Ok(self.vehicles().map(|v| v.id.clone()).collect())
    }

    fn get_accumulated_wait(&mut self, vehicle: &str) -> Result<f64> {
        self.ensure_running()?;
        self.vehicles()
            .find(|v| v.id == vehicle)
            .map(|v| v.waiting)
            .ok_or_else(|| TlcsError::Gateway(format!("unknown vehicle {}", vehicle)))
    }

    fn get_halted_count(&mut self, approach: Approach) -> Result<u32> {
        self.ensure_running()?;
        let halted = (0..LANES_PER_EDGE)
            .filter_map(|index| self.lanes.get(&LaneId::new(approach, index)))
            .flatten()
            .filter(|v| v.halted)
            .count();
        Ok(halted as u32)
    }

    fn get_queue_depth(&mut self, lane: &LaneId) -> Result<u32> {
        self.ensure_running()?;
        if lane.index >= LANES_PER_EDGE {
            return Err(TlcsError::Gateway(format!("unknown lane {}", lane)));
        }
        Ok(self.lanes.get(lane).map(|q| q.len() as u32).unwrap_or(0))
    }

    fn set_signal_phase(&mut self, intersection_id: &str, phase: PhaseCode) -> Result<()> {
        self.ensure_running()?;
        if intersection_id != TL_ID {
            return Err(TlcsError::Gateway(format!(
                "unknown traffic light {}",
                intersection_id
            )));
        }
        if !self.table.contains(phase.action()) {
            return Err(TlcsError::Gateway(format!(
                "phase {} is not in the program",
                phase.0
            )));
        }
        if self.phase != Some(phase) {
            debug!("Traffic light {} switching to phase {}", TL_ID, phase.0);
        }
        self.phase = Some(phase);
        Ok(())
    }
}
