// Traffic light id as configured in environment.net.xml
pub const TL_ID: &str = "TL";

// Incoming edges, one per approach
pub const EDGE_NORTH: &str = "N2TL";
pub const EDGE_SOUTH: &str = "S2TL";
pub const EDGE_EAST: &str = "E2TL";
pub const EDGE_WEST: &str = "W2TL";

// Lanes per incoming edge. Lanes 0..=2 carry through and right-turn traffic,
// lane 3 is the dedicated left-turn lane.
pub const LANES_PER_EDGE: u8 = 4;
pub const LEFT_TURN_LANE: u8 = 3;

// Consecutive unserved decisions tolerated before the selector overrides the model
pub const DEFAULT_STARVATION_THRESHOLD: u32 = 10;

// Fixed-cycle baseline holds each green for this many green intervals
pub const FIXED_CYCLE_GREEN_REPEATS: usize = 3;

// Environment variable pointing at the SUMO installation
pub const SUMO_HOME_ENV: &str = "SUMO_HOME";
