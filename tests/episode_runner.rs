mod common;

use common::{settings, FakeGateway, FakeVehicle, ScriptedModel};
use tlcs_eval::control_system::phases::{Action, PhaseScheme, PhaseTable};
use tlcs_eval::control_system::selector::{build_policy, SelectorKind};
use tlcs_eval::flow_analyzer::predictive_model::LinearModel;
use tlcs_eval::simulation_engine::episode::{EpisodeRunner, RunMode};
use tlcs_eval::simulation_engine::gateway::{Approach, LaneId};
use tlcs_eval::simulation_engine::route_generation::TrafficGenerator;
use tlcs_eval::simulation_engine::state::IntersectionState;

fn runner(
    gateway: FakeGateway,
    model: ScriptedModel,
    max_steps: u32,
) -> EpisodeRunner<FakeGateway, ScriptedModel> {
    let table = PhaseTable::new(PhaseScheme::Base).unwrap();
    EpisodeRunner::new(
        gateway,
        model,
        build_policy(SelectorKind::Movement, table, 10),
        TrafficGenerator::new(max_steps, 20),
        settings(max_steps),
    )
    .unwrap()
}

#[test]
fn constant_action_runs_without_yellow() {
    let mut gateway = FakeGateway::new();
    gateway.halted_per_approach = 3;
    let mut runner = runner(gateway, ScriptedModel::always(4, 2), 50);

    runner.run(1).unwrap();

    let metrics = runner.metrics();
    assert_eq!(metrics.decisions(), 5);
    assert_eq!(metrics.actions, vec![Action(2); 5]);
    assert_eq!(metrics.reward_episode, vec![-12.0; 5]);
    assert_eq!(metrics.queue_length_episode, vec![12; 5]);
    assert_eq!(metrics.decision_waits.len(), 5);
    assert_eq!(metrics.sum_waiting_times.len(), 50);
    assert!(metrics.sum_waiting_times_fixed.is_empty());

    let gateway = runner.gateway();
    assert_eq!(gateway.sessions_started, 1);
    assert_eq!(gateway.sessions_ended, 1);
    assert_eq!(gateway.scenario_vehicles, 20);
    assert_eq!(gateway.phase_codes(), vec![4; 5]);
}

#[test]
fn yellow_is_inserted_only_when_the_action_changes() {
    let mut runner = runner(FakeGateway::new(), ScriptedModel::new(4, vec![0, 1]), 60);
    runner.run(1).unwrap();

    assert_eq!(
        runner.gateway().phases.iter().map(|(s, p)| (*s, p.0)).collect::<Vec<_>>(),
        vec![
            (0, 0),
            (10, 1),
            (14, 2),
            (24, 3),
            (28, 0),
            (38, 1),
            (42, 2),
            (52, 3),
            (56, 0),
        ]
    );
    assert_eq!(runner.metrics().decisions(), 5);
    assert_eq!(runner.step(), 60);
    assert_eq!(runner.metrics().sum_waiting_times.len(), 60);
}

#[test]
fn starved_movement_forces_its_action() {
    // 11 decisions of action 2 leave NS/SN unserved past the threshold.
    let mut runner = runner(FakeGateway::new(), ScriptedModel::always(4, 2), 166);
    runner.run(1).unwrap();

    let actions = &runner.metrics().actions;
    assert_eq!(actions.len(), 15);
    assert!(actions[..11].iter().all(|a| *a == Action(2)));
    assert_eq!(actions[11], Action(0));
    assert_eq!(actions[12], Action(1));
    assert_eq!(actions[13], Action(3));
    assert_eq!(actions[14], Action(2));
}

#[test]
fn simulate_never_passes_max_steps() {
    let mut runner = runner(FakeGateway::new(), ScriptedModel::always(4, 0), 50);

    assert_eq!(runner.simulate(30, RunMode::Model).unwrap(), 30);
    assert_eq!(runner.simulate(30, RunMode::Model).unwrap(), 20);
    assert_eq!(runner.simulate(5, RunMode::Model).unwrap(), 0);
    assert_eq!(runner.step(), 50);
    assert_eq!(runner.gateway().step, 50);
    assert_eq!(runner.metrics().sum_waiting_times.len(), 50);
}

#[test]
fn waits_of_departed_vehicles_are_kept() {
    let mut gateway = FakeGateway::new();
    gateway.vehicles = vec![
        FakeVehicle { id: "W_E_0".into(), enter: 0, leave: 5 },
        FakeVehicle { id: "N_S_1".into(), enter: 3, leave: 100 },
    ];
    let mut runner = runner(gateway, ScriptedModel::always(4, 0), 10);

    runner.simulate(8, RunMode::FixedCycle).unwrap();

    assert_eq!(
        runner.metrics().sum_waiting_times_fixed,
        vec![1.0, 2.0, 3.0, 5.0, 6.0, 7.0, 8.0, 9.0]
    );
}

#[test]
fn fixed_cycle_visits_actions_round_robin() {
    let mut runner = runner(FakeGateway::new(), ScriptedModel::always(4, 3), 140);
    runner.run_fixed_cycle(1).unwrap();

    let mut expected = Vec::new();
    for action in 0..4u32 {
        expected.extend([2 * action; 3]);
        expected.push(2 * action + 1);
    }
    expected.push(0);
    assert_eq!(runner.gateway().phase_codes(), expected);
    assert_eq!(runner.metrics().sum_waiting_times_fixed.len(), 140);
    assert_eq!(runner.metrics().decisions(), 0);
    assert_eq!(runner.gateway().sessions_ended, 1);
}

#[test]
fn failed_step_still_ends_the_session() {
    let mut gateway = FakeGateway::new();
    gateway.fail_at_step = Some(25);
    let mut runner = runner(gateway, ScriptedModel::always(4, 1), 100);

    assert!(runner.run(1).is_err());
    assert_eq!(runner.gateway().sessions_ended, 1);
    assert_eq!(runner.metrics().sum_waiting_times.len(), 25);
}

#[test]
fn model_with_wrong_action_count_is_rejected() {
    let table = PhaseTable::new(PhaseScheme::Base).unwrap();
    let result = EpisodeRunner::new(
        FakeGateway::new(),
        ScriptedModel::always(8, 0),
        build_policy(SelectorKind::Movement, table, 10),
        TrafficGenerator::new(100, 10),
        settings(100),
    );
    assert!(result.is_err());
}

#[test]
fn model_with_wrong_state_width_is_rejected() {
    let table = PhaseTable::new(PhaseScheme::Base).unwrap();
    let model = LinearModel::new(vec![vec![0.5; 8]; 4], vec![0.0; 4]).unwrap();
    let mut wide = settings(100);
    wide.num_states = 10;
    let result = EpisodeRunner::new(
        FakeGateway::new(),
        model,
        build_policy(SelectorKind::Movement, table.clone(), 10),
        TrafficGenerator::new(100, 10),
        wide,
    );
    assert!(result.is_err());

    let model = LinearModel::new(vec![vec![0.5; 8]; 4], vec![0.0; 4]).unwrap();
    assert!(EpisodeRunner::new(
        FakeGateway::new(),
        model,
        build_policy(SelectorKind::Movement, table, 10),
        TrafficGenerator::new(100, 10),
        settings(100),
    )
    .is_ok());
}

#[test]
fn state_sums_through_lanes_and_keeps_left_lane_apart() {
    let mut gateway = FakeGateway::new();
    for (index, depth) in [(0, 1), (1, 2), (2, 3), (3, 4)] {
        gateway.lane_depth.insert(LaneId::new(Approach::West, index), depth);
    }
    gateway.lane_depth.insert(LaneId::new(Approach::North, 2), 5);
    gateway.lane_depth.insert(LaneId::new(Approach::South, 3), 7);

    let state = IntersectionState::sample(&mut gateway, 10).unwrap();
    assert_eq!(
        state.as_slice(),
        &[6.0, 4.0, 5.0, 0.0, 0.0, 0.0, 0.0, 7.0, 0.0, 0.0]
    );
    assert!(IntersectionState::sample(&mut gateway, 7).is_err());
}
