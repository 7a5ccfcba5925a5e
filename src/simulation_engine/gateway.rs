// simulation_engine/gateway.rs
//
// The narrow set of simulator capabilities the episode runner depends on.

use std::fmt;

use crate::control_system::phases::PhaseCode;
use crate::error::Result;
use crate::global_variables::{EDGE_EAST, EDGE_NORTH, EDGE_SOUTH, EDGE_WEST};
use crate::simulation_engine::route_generation::Scenario;

/// Identifier the simulator assigns to a vehicle.
pub type VehicleId = String;

/// One of the four inbound approaches of the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Approach {
    North,
    South,
    East,
    West,
}

impl Approach {
    pub const ALL: [Approach; 4] = [
        Approach::North,
        Approach::South,
        Approach::East,
        Approach::West,
    ];

    /// Inbound edge id in environment.net.xml.
    pub fn edge_id(self) -> &'static str {
        match self {
            Approach::North => EDGE_NORTH,
            Approach::South => EDGE_SOUTH,
            Approach::East => EDGE_EAST,
            Approach::West => EDGE_WEST,
        }
    }

    /// Outbound edge id leaving the intersection towards this side.
    pub fn exit_edge_id(self) -> &'static str {
        match self {
            Approach::North => "TL2N",
            Approach::South => "TL2S",
            Approach::East => "TL2E",
            Approach::West => "TL2W",
        }
    }

    pub fn letter(self) -> char {
        match self {
            Approach::North => 'N',
            Approach::South => 'S',
            Approach::East => 'E',
            Approach::West => 'W',
        }
    }

    pub fn opposite(self) -> Approach {
        match self {
            Approach::North => Approach::South,
            Approach::South => Approach::North,
            Approach::East => Approach::West,
            Approach::West => Approach::East,
        }
    }

    /// Side a vehicle arriving from this approach reaches by turning left
    /// (right-hand traffic).
    pub fn left_exit(self) -> Approach {
        match self {
            Approach::West => Approach::North,
            Approach::North => Approach::East,
            Approach::East => Approach::South,
            Approach::South => Approach::West,
        }
    }
}

/// A lane of an inbound edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneId {
    pub approach: Approach,
    pub index: u8,
}

impl LaneId {
    pub fn new(approach: Approach, index: u8) -> Self {
        Self { approach, index }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.approach.edge_id(), self.index)
    }
}

/// Capabilities of a stepped traffic simulator. Every call may fail; failures
/// are fatal for the episode.
pub trait SimulatorGateway {
    fn start_session(&mut self, scenario: &Scenario) -> Result<()>;

    fn end_session(&mut self) -> Result<()>;

    /// Advances the simulated world by one tick.
    fn advance_one_step(&mut self) -> Result<()>;

    fn list_active_entities(&mut self) -> Result<Vec<VehicleId>>;

    /// Seconds the vehicle has spent halted, as tracked by the simulator.
    fn get_accumulated_wait(&mut self, vehicle: &str) -> Result<f64>;

    /// Vehicles standing still on the inbound edge of `approach`.
    fn get_halted_count(&mut self, approach: Approach) -> Result<u32>;

    /// Vehicles currently on `lane`.
    fn get_queue_depth(&mut self, lane: &LaneId) -> Result<u32>;

    fn set_signal_phase(&mut self, intersection_id: &str, phase: PhaseCode) -> Result<()>;
}

impl<G: SimulatorGateway + ?Sized> SimulatorGateway for Box<G> {
    fn start_session(&mut self, scenario: &Scenario) -> Result<()> {
        (**self).start_session(scenario)
    }

    fn end_session(&mut self) -> Result<()> {
        (**self).end_session()
    }

    fn advance_one_step(&mut self) -> Result<()> {
        (**self).advance_one_step()
    }

    fn list_active_entities(&mut self) -> Result<Vec<VehicleId>> {
        (**self).list_active_entities()
    }

    fn get_accumulated_wait(&mut self, vehicle: &str) -> Result<f64> {
        (**self).get_accumulated_wait(vehicle)
    }

    fn get_halted_count(&mut self, approach: Approach) -> Result<u32> {
        (**self).get_halted_count(approach)
    }

    fn get_queue_depth(&mut self, lane: &LaneId) -> Result<u32> {
        (**self).get_queue_depth(lane)
    }

    fn set_signal_phase(&mut self, intersection_id: &str, phase: PhaseCode) -> Result<()> {
        (**self).set_signal_phase(intersection_id, phase)
    }
}
