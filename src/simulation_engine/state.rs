// simulation_engine/state.rs

use crate::error::{Result, TlcsError};
use crate::global_variables::LEFT_TURN_LANE;
use crate::simulation_engine::gateway::{Approach, LaneId, SimulatorGateway};

/// Lanes aggregated into each of the eight canonical state slots:
/// through/right lanes then the left-turn lane, for W, N, E and S.
const STATE_LAYOUT: [(Approach, &[u8]); 8] = [
    (Approach::West, &[0, 1, 2]),
    (Approach::West, &[LEFT_TURN_LANE]),
    (Approach::North, &[0, 1, 2]),
    (Approach::North, &[LEFT_TURN_LANE]),
    (Approach::East, &[0, 1, 2]),
    (Approach::East, &[LEFT_TURN_LANE]),
    (Approach::South, &[0, 1, 2]),
    (Approach::South, &[LEFT_TURN_LANE]),
];

pub const MIN_STATE_FEATURES: usize = STATE_LAYOUT.len();

/// Vehicle counts per approach/turn class, rebuilt at every decision.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionState {
    values: Vec<f64>,
}

impl IntersectionState {
    pub fn zeros(num_states: usize) -> Self {
        Self {
            values: vec![0.0; num_states],
        }
    }

    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Queries the gateway lane by lane. Slots past the canonical eight stay zero.
    pub fn sample<G: SimulatorGateway + ?Sized>(
        gateway: &mut G,
        num_states: usize,
    ) -> Result<Self> {
        if num_states < MIN_STATE_FEATURES {
            return Err(TlcsError::Config(format!(
                "num_states must be at least {}, got {}",
                MIN_STATE_FEATURES, num_states
            )));
        }

        let mut state = Self::zeros(num_states);
        for (slot, (approach, lanes)) in STATE_LAYOUT.iter().enumerate() {
            let mut count = 0u32;
            for &index in lanes.iter() {
                count += gateway.get_queue_depth(&LaneId::new(*approach, index))?;
            }
            state.values[slot] = f64::from(count);
        }
        Ok(state)
    }

    pub fn get(&self, slot: usize) -> f64 {
        self.values.get(slot).copied().unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Halted vehicles summed over the four inbound approaches.
pub fn queue_length<G: SimulatorGateway + ?Sized>(gateway: &mut G) -> Result<u32> {
    let mut total = 0;
    for approach in Approach::ALL {
        total += gateway.get_halted_count(approach)?;
    }
    Ok(total)
}
