// route_generation.rs
//
// Builds the vehicle demand for one episode. Departure times follow a
// Weibull(2) curve stretched over the episode, so traffic ramps up, peaks
// and fades. Three vehicles in four drive straight through, the rest turn.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::control_system::phases::Movement;
use crate::error::Result;
use crate::simulation_engine::gateway::Approach;

const STRAIGHT_SHARE: f64 = 0.75;
const WEIBULL_SHAPE: f64 = 2.0;

/// Origin and destination side of a vehicle's trip through the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub from: Approach,
    pub to: Approach,
}

impl Route {
    pub const STRAIGHT: [Route; 4] = [
        Route::new(Approach::West, Approach::East),
        Route::new(Approach::East, Approach::West),
        Route::new(Approach::North, Approach::South),
        Route::new(Approach::South, Approach::North),
    ];

    pub const TURNING: [Route; 8] = [
        Route::new(Approach::West, Approach::North),
        Route::new(Approach::West, Approach::South),
        Route::new(Approach::North, Approach::West),
        Route::new(Approach::North, Approach::East),
        Route::new(Approach::East, Approach::North),
        Route::new(Approach::East, Approach::South),
        Route::new(Approach::South, Approach::West),
        Route::new(Approach::South, Approach::East),
    ];

    pub const fn new(from: Approach, to: Approach) -> Self {
        Self { from, to }
    }

    /// Route id as used in the route file, e.g. `W_N`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.from.letter(), self.to.letter())
    }

    pub fn edges(&self) -> String {
        format!("{} {}", self.from.edge_id(), self.to.exit_edge_id())
    }

    pub fn is_left_turn(&self) -> bool {
        self.from.left_exit() == self.to
    }

    /// Signal movement that has to be green for this route to clear the stop line.
    /// Right turns ride on the through movement of their origin.
    pub fn movement(&self) -> Movement {
        match (self.from, self.is_left_turn()) {
            (Approach::North, false) => Movement::NorthSouth,
            (Approach::South, false) => Movement::SouthNorth,
            (Approach::East, false) => Movement::EastWest,
            (Approach::West, false) => Movement::WestEast,
            (Approach::North, true) => Movement::NorthLeft,
            (Approach::South, true) => Movement::SouthLeft,
            (Approach::East, true) => Movement::EastLeft,
            (Approach::West, true) => Movement::WestLeft,
        }
    }
}

/// A single scheduled vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub vehicle_id: String,
    pub route: Route,
    pub depart_step: u32,
}

/// Demand for one episode, sorted by departure step.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub seed: u64,
    pub max_steps: u32,
    pub departures: Vec<Departure>,
}

impl Scenario {
    /// SUMO route file content for this scenario.
    pub fn to_route_xml(&self) -> String {
        let mut xml = String::from("<routes>\n");
        xml.push_str(
            "    <vType accel=\"1.0\" decel=\"4.5\" id=\"standard_car\" length=\"5.0\" minGap=\"2.5\" maxSpeed=\"25\" sigma=\"0.5\" />\n\n",
        );
        for route in Route::STRAIGHT.iter().chain(Route::TURNING.iter()) {
            let _ = writeln!(
                xml,
                "    <route id=\"{}\" edges=\"{}\"/>",
                route.id(),
                route.edges()
            );
        }
        xml.push('\n');
        for departure in &self.departures {
            let _ = writeln!(
                xml,
                "    <vehicle id=\"{}\" type=\"standard_car\" route=\"{}\" depart=\"{}\" departLane=\"random\" departSpeed=\"10\" />",
                departure.vehicle_id,
                departure.route.id(),
                departure.depart_step
            );
        }
        xml.push_str("</routes>\n");
        xml
    }
}

/// Seeded generator of episode demand.
#[derive(Debug, Clone)]
pub struct TrafficGenerator {
    pub max_steps: u32,
    pub n_cars_generated: usize,
    /// Where the route file is written, if anywhere (the SUMO config points at it).
    pub route_file: Option<PathBuf>,
}

impl TrafficGenerator {
    pub fn new(max_steps: u32, n_cars_generated: usize) -> Self {
        Self {
            max_steps,
            n_cars_generated,
            route_file: None,
        }
    }

    pub fn with_route_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.route_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Same seed, same scenario.
    pub fn generate(&self, seed: u64) -> Scenario {
        let mut rng = SmallRng::seed_from_u64(seed);
        let steps = self.departure_steps(&mut rng);

        let departures = steps
            .into_iter()
            .enumerate()
            .map(|(counter, depart_step)| {
                let route = if rng.random_range(0.0..1.0) < STRAIGHT_SHARE {
                    Route::STRAIGHT[rng.random_range(0..Route::STRAIGHT.len())]
                } else {
                    Route::TURNING[rng.random_range(0..Route::TURNING.len())]
                };
                Departure {
                    vehicle_id: format!("{}_{}", route.id(), counter),
                    route,
                    depart_step,
                }
            })
            .collect();

        Scenario {
            seed,
            max_steps: self.max_steps,
            departures,
        }
    }

    /// Generates the scenario and writes the route file when one is configured.
    pub fn generate_routefile(&self, seed: u64) -> Result<Scenario> {
        let scenario = self.generate(seed);
        if let Some(path) = &self.route_file {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, scenario.to_route_xml())?;
            info!(
                "Wrote {} vehicles for seed {} to {}",
                scenario.departures.len(),
                seed,
                path.display()
            );
        }
        Ok(scenario)
    }

    /// Weibull samples, sorted, then rescaled linearly onto `[0, max_steps]`.
    fn departure_steps(&self, rng: &mut SmallRng) -> Vec<u32> {
        let mut timings: Vec<f64> = (0..self.n_cars_generated)
            .map(|_| {
                let u: f64 = rng.random_range(0.0..1.0);
                (-(1.0 - u).ln()).powf(1.0 / WEIBULL_SHAPE)
            })
            .collect();
        timings.sort_by(f64::total_cmp);

        let (Some(first), Some(last)) = (timings.first(), timings.last()) else {
            return Vec::new();
        };
        let min_old = first.floor();
        let max_old = last.ceil().max(min_old + 1.0);
        let max_new = f64::from(self.max_steps);

        timings
            .iter()
            .map(|t| {
                let scaled = (max_new / (max_old - min_old)) * (t - max_old) + max_new;
                scaled.round().clamp(0.0, max_new) as u32
            })
            .collect()
    }
}
