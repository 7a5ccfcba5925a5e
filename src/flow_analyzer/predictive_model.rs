// flow_analyzer/predictive_model.rs

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::control_system::phases::{Action, PhaseTable};
use crate::error::{Result, TlcsError};
use crate::simulation_engine::state::IntersectionState;

/// Anything that scores every action for a given intersection state.
/// Only the order induced by the scores is used by the controller.
pub trait DecisionModel {
    fn num_actions(&self) -> usize;

    /// Number of state features the model was built for, if it needs a fixed width.
    fn state_width(&self) -> Option<usize> {
        None
    }

    /// One score per action, higher is better.
    fn predict(&self, state: &IntersectionState) -> Result<Vec<f64>>;

    /// Actions ordered from most to least preferred.
    fn rank(&self, state: &IntersectionState) -> Result<Ranking> {
        let scores = self.predict(state)?;
        if scores.len() != self.num_actions() {
            return Err(TlcsError::Model(format!(
                "model returned {} scores for {} actions",
                scores.len(),
                self.num_actions()
            )));
        }
        Ranking::from_scores(&scores)
    }
}

impl<M: DecisionModel + ?Sized> DecisionModel for Box<M> {
    fn num_actions(&self) -> usize {
        (**self).num_actions()
    }

    fn state_width(&self) -> Option<usize> {
        (**self).state_width()
    }

    fn predict(&self, state: &IntersectionState) -> Result<Vec<f64>> {
        (**self).predict(state)
    }
}

/// Action preference order, best first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    order: Vec<Action>,
}

impl Ranking {
    /// Orders actions by descending score. Equal scores put the higher action first.
    pub fn from_scores(scores: &[f64]) -> Result<Self> {
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]).then(b.cmp(a)));
        Self::from_order(order)
    }

    pub fn from_order<I: IntoIterator<Item = usize>>(order: I) -> Result<Self> {
        let order: Vec<Action> = order.into_iter().map(Action).collect();
        if order.is_empty() {
            return Err(TlcsError::Model("empty action ranking".into()));
        }
        for (i, action) in order.iter().enumerate() {
            if order[..i].contains(action) {
                return Err(TlcsError::Model(format!("{} ranked twice", action)));
            }
        }
        Ok(Self { order })
    }

    pub fn top(&self) -> Action {
        self.order[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Fails if any ranked action lies outside `[0, num_actions)`.
    pub fn ensure_within(&self, num_actions: usize) -> Result<()> {
        match self.order.iter().find(|a| a.0 >= num_actions) {
            Some(action) => Err(TlcsError::Model(format!(
                "ranked {} but only {} actions exist",
                action, num_actions
            ))),
            None => Ok(()),
        }
    }
}

/// Pretrained linear Q-function: `score[a] = bias[a] + sum_i weights[a][i] * state[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<Vec<f64>>,
    #[serde(default)]
    pub bias: Vec<f64>,
}

impl LinearModel {
    pub fn new(weights: Vec<Vec<f64>>, bias: Vec<f64>) -> Result<Self> {
        let model = Self { weights, bias };
        model.validate()?;
        Ok(model)
    }

    /// Loads weights saved as JSON (`{"weights": [[..], ..], "bias": [..]}`).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut model: LinearModel = serde_json::from_str(&text)?;
        if model.bias.is_empty() {
            model.bias = vec![0.0; model.weights.len()];
        }
        model.validate()?;
        info!(
            "Loaded linear model from {} ({} actions x {} states)",
            path.display(),
            model.num_actions(),
            model.num_states()
        );
        Ok(model)
    }

    pub fn num_states(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    fn validate(&self) -> Result<()> {
        if self.weights.is_empty() {
            return Err(TlcsError::Model("model has no actions".into()));
        }
        let width = self.num_states();
        if self.weights.iter().any(|row| row.len() != width) {
            return Err(TlcsError::Model("weight rows differ in length".into()));
        }
        if self.bias.len() != self.weights.len() {
            return Err(TlcsError::Model(format!(
                "{} bias terms for {} actions",
                self.bias.len(),
                self.weights.len()
            )));
        }
        Ok(())
    }
}

impl DecisionModel for LinearModel {
    fn num_actions(&self) -> usize {
        self.weights.len()
    }

    fn state_width(&self) -> Option<usize> {
        Some(self.num_states())
    }

    fn predict(&self, state: &IntersectionState) -> Result<Vec<f64>> {
        if state.len() != self.num_states() {
            return Err(TlcsError::Model(format!(
                "state has {} features, model expects {}",
                state.len(),
                self.num_states()
            )));
        }
        Ok(self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| b + row.iter().zip(state.as_slice()).map(|(w, x)| w * x).sum::<f64>())
            .collect())
    }
}

/// Scores each action by the number of vehicles queued on the movements it releases.
/// Stands in when no trained weights are configured.
#[derive(Debug, Clone)]
pub struct QueueHeuristicModel {
    table: PhaseTable,
}

impl QueueHeuristicModel {
    pub fn new(table: PhaseTable) -> Self {
        Self { table }
    }
}

impl DecisionModel for QueueHeuristicModel {
    fn num_actions(&self) -> usize {
        self.table.num_actions()
    }

    fn predict(&self, state: &IntersectionState) -> Result<Vec<f64>> {
        (0..self.table.num_actions())
            .map(|a| {
                let served = self.table.served(Action(a))?;
                Ok(served.iter().map(|m| state.get(m.state_slot())).sum())
            })
            .collect()
    }
}
