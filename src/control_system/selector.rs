// control_system/selector.rs
//
// Turns the model's ranking into the action actually applied, overriding the
// model whenever some movement (or action) has waited too many decisions.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::control_system::phases::{Action, Movement, PhaseTable};
use crate::error::Result;
use crate::flow_analyzer::predictive_model::Ranking;

/// "Decisions since last served", one slot per movement or per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarvationCounter {
    counts: Vec<u32>,
}

impl StarvationCounter {
    pub fn new(slots: usize) -> Self {
        Self {
            counts: vec![0; slots],
        }
    }

    pub fn get(&self, slot: usize) -> u32 {
        self.counts[slot]
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.counts
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    /// Resets every served slot and ages every other slot by one decision.
    pub fn serve<F: Fn(usize) -> bool>(&mut self, is_served: F) {
        for (slot, count) in self.counts.iter_mut().enumerate() {
            if is_served(slot) {
                *count = 0;
            } else {
                *count = count.saturating_add(1);
            }
        }
    }
}

/// Which counter granularity the controller runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Movement,
    Action,
}

/// Picks one action per decision from a ranking and keeps its own fairness state.
pub trait SelectionPolicy {
    fn name(&self) -> &'static str;

    fn select(&mut self, ranking: &Ranking) -> Result<Action>;

    /// Forget all fairness state, as at the start of an episode.
    fn reset(&mut self);
}

impl<P: SelectionPolicy + ?Sized> SelectionPolicy for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn select(&mut self, ranking: &Ranking) -> Result<Action> {
        (**self).select(ranking)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

pub fn build_policy(
    kind: SelectorKind,
    table: PhaseTable,
    threshold: u32,
) -> Box<dyn SelectionPolicy + Send> {
    match kind {
        SelectorKind::Movement => Box::new(MovementStarvationSelector::new(table, threshold)),
        SelectorKind::Action => {
            Box::new(ActionStarvationSelector::new(table.num_actions(), threshold))
        }
    }
}

/// One counter per movement. If any movement has gone unserved for more than
/// `threshold` decisions, the first such movement in enumeration order is
/// released by its override action, whatever the model prefers.
#[derive(Debug, Clone)]
pub struct MovementStarvationSelector {
    table: PhaseTable,
    threshold: u32,
    counter: StarvationCounter,
}

impl MovementStarvationSelector {
    pub fn new(table: PhaseTable, threshold: u32) -> Self {
        Self {
            table,
            threshold,
            counter: StarvationCounter::new(Movement::COUNT),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn table(&self) -> &PhaseTable {
        &self.table
    }

    pub fn counter(&self) -> &StarvationCounter {
        &self.counter
    }

    pub fn starvation(&self, movement: Movement) -> u32 {
        self.counter.get(movement.index())
    }

    /// First movement past the threshold, in enumeration order.
    pub fn starved_movement(&self) -> Option<Movement> {
        Movement::ALL
            .into_iter()
            .find(|m| self.counter.get(m.index()) > self.threshold)
    }
}

impl SelectionPolicy for MovementStarvationSelector {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn select(&mut self, ranking: &Ranking) -> Result<Action> {
        let action = match self.starved_movement() {
            Some(movement) => {
                let action = self.table.override_action(movement);
                debug!(
                    "{} unserved for {} decisions, overriding model choice {} with {}",
                    movement,
                    self.counter.get(movement.index()),
                    ranking.top(),
                    action
                );
                action
            }
            None => ranking.top(),
        };

        let served = self.table.served(action)?;
        self.counter.serve(|slot| served.contains(Movement::ALL[slot]));
        Ok(action)
    }

    fn reset(&mut self) {
        self.counter.reset_all();
    }
}

/// One counter per action. The best-ranked action whose counter is past the
/// threshold wins; otherwise the model's top action.
#[derive(Debug, Clone)]
pub struct ActionStarvationSelector {
    num_actions: usize,
    threshold: u32,
    counter: StarvationCounter,
}

impl ActionStarvationSelector {
    pub fn new(num_actions: usize, threshold: u32) -> Self {
        Self {
            num_actions,
            threshold,
            counter: StarvationCounter::new(num_actions),
        }
    }

    pub fn counter(&self) -> &StarvationCounter {
        &self.counter
    }
}

impl SelectionPolicy for ActionStarvationSelector {
    fn name(&self) -> &'static str {
        "action"
    }

    fn select(&mut self, ranking: &Ranking) -> Result<Action> {
        ranking.ensure_within(self.num_actions)?;

        let action = match ranking.iter().find(|a| self.counter.get(a.0) > self.threshold) {
            Some(starved) => {
                debug!(
                    "{} unserved for {} decisions, overriding model choice {}",
                    starved,
                    self.counter.get(starved.0),
                    ranking.top()
                );
                starved
            }
            None => ranking.top(),
        };

        self.counter.serve(|slot| slot == action.0);
        Ok(action)
    }

    fn reset(&mut self) {
        self.counter.reset_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::phases::PhaseScheme;

    fn base_selector() -> MovementStarvationSelector {
        MovementStarvationSelector::new(PhaseTable::new(PhaseScheme::Base).unwrap(), 10)
    }

    #[test]
    fn counter_serve_resets_and_ages() {
        let mut counter = StarvationCounter::new(4);
        counter.serve(|slot| slot == 1);
        counter.serve(|slot| slot == 2);
        assert_eq!(counter.as_slice(), &[2, 1, 0, 2]);
        assert_eq!(counter.max(), 2);
        counter.reset_all();
        assert_eq!(counter.as_slice(), &[0; 4]);
    }

    #[test]
    fn unstarved_selector_follows_model() {
        let mut selector = base_selector();
        let ranking = Ranking::from_order(vec![2, 0, 1, 3]).unwrap();
        assert_eq!(selector.select(&ranking).unwrap(), Action(2));
        assert_eq!(selector.starvation(Movement::EastWest), 0);
        assert_eq!(selector.starvation(Movement::WestEast), 0);
        assert_eq!(selector.starvation(Movement::NorthSouth), 1);
    }

    #[test]
    fn override_fires_once_counter_passes_threshold() {
        let mut selector = base_selector();
        let ranking = Ranking::from_order(vec![2, 3, 1, 0]).unwrap();
        for _ in 0..10 {
            assert_eq!(selector.select(&ranking).unwrap(), Action(2));
        }
        // At exactly the threshold the model still wins.
        assert_eq!(selector.starvation(Movement::NorthSouth), 10);
        assert_eq!(selector.select(&ranking).unwrap(), Action(2));
        assert_eq!(selector.starvation(Movement::NorthSouth), 11);
        assert_eq!(selector.select(&ranking).unwrap(), Action(0));
        assert_eq!(selector.starvation(Movement::NorthSouth), 0);
        assert_eq!(selector.starvation(Movement::SouthNorth), 0);
    }

    #[test]
    fn reset_clears_counters() {
        let mut selector = base_selector();
        let ranking = Ranking::from_order(vec![1, 0, 2, 3]).unwrap();
        selector.select(&ranking).unwrap();
        assert!(selector.counter().max() > 0);
        selector.reset();
        assert_eq!(selector.counter().max(), 0);
    }

    #[test]
    fn out_of_range_model_choice_is_an_error() {
        let mut selector = base_selector();
        let ranking = Ranking::from_order(vec![6, 0]).unwrap();
        assert!(selector.select(&ranking).is_err());
    }

    #[test]
    fn action_selector_rescues_starved_action_in_rank_order() {
        let mut selector = ActionStarvationSelector::new(4, 10);
        let ranking = Ranking::from_order(vec![0, 3, 1, 2]).unwrap();
        for _ in 0..11 {
            assert_eq!(selector.select(&ranking).unwrap(), Action(0));
        }
        assert_eq!(selector.counter().as_slice(), &[0, 11, 11, 11]);
        // Actions 1, 2 and 3 are all starved; the best ranked of them (3) goes first.
        assert_eq!(selector.select(&ranking).unwrap(), Action(3));
        assert_eq!(selector.counter().as_slice(), &[1, 12, 12, 0]);
        assert_eq!(selector.select(&ranking).unwrap(), Action(1));
        assert_eq!(selector.select(&ranking).unwrap(), Action(2));
        assert_eq!(selector.select(&ranking).unwrap(), Action(0));
    }

    #[test]
    fn action_selector_validates_ranking() {
        let mut selector = ActionStarvationSelector::new(4, 10);
        let ranking = Ranking::from_order(vec![0, 4]).unwrap();
        assert!(selector.select(&ranking).is_err());
    }

    #[test]
    fn build_policy_picks_strategy() {
        let table = PhaseTable::new(PhaseScheme::Extended).unwrap();
        assert_eq!(build_policy(SelectorKind::Movement, table.clone(), 10).name(), "movement");
        assert_eq!(build_policy(SelectorKind::Action, table, 10).name(), "action");
    }
}
