//! Integration coverage for `$`/`@` reference resolution chained through a
//! multi-hop plan, exercised via the public planner entry point.

use goap_engine::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn index_of(actions: Vec<Action>) -> ActionIndex {
    let arced: Vec<Arc<Action>> = actions.into_iter().map(Arc::new).collect();
    ActionIndex::build(&arced)
}

fn names(plan: &Plan) -> Vec<String> {
    plan.actions.iter().map(|a| a.name.clone()).collect()
}

/// Move/Pick/Place chain: a wildcard-effect `Move`, a `Pick` whose
/// precondition references its own post-bound effect via `$`, and a `Place`
/// whose precondition references world state via `@`. Moving a robot that
/// already holds nothing to a new object, picking it up, moving again, and
/// placing it must regress through two independent `Move` bindings ("P1"
/// then "P2") without either collapsing into the other.
#[test]
fn move_pick_move_place_chain_binds_each_reference_independently() {
    let move_to = Action::new("Move").with_precondition("robot_ready", true).with_effect("robot_location", Value::Any);
    let pick = Action::new("Pick")
        .with_precondition("robot_location", "@object_location")
        .with_effect("object_location", "gripper");
    let place = Action::new("Place")
        .with_precondition("object_location", "gripper")
        .with_precondition("robot_location", "$object_location")
        .with_effect("object_location", Value::Any);

    let index = index_of(vec![move_to, pick, place]);
    let start = State::new().with("robot_ready", true).with("object_location", "P1");
    let goal = State::new().with("object_location", "P2");

    let plan = generate_plan(&goal, &start, &HashSet::new(), &index, &PlannerConfig::default()).unwrap();
    assert_eq!(names(&plan), vec!["Move", "Pick", "Move", "Place"]);

    assert_eq!(plan.actions[0].effects.get("robot_location"), Some(&Value::Str("P1".into())));
    assert_eq!(plan.actions[2].effects.get("robot_location"), Some(&Value::Str("P2".into())));
    assert_eq!(plan.actions[3].effects.get("object_location"), Some(&Value::Str("P2".into())));

    let mut simulated = start.clone();
    for action in &plan.actions {
        action.apply_effects(&mut simulated);
    }
    assert!(simulated.satisfies(&goal));
}

#[test]
fn self_referencing_precondition_is_a_cyclic_reference() {
    let looping = Action::new("Looping").with_precondition("x", "@x").with_effect("y", true);
    let index = index_of(vec![looping]);
    let start = State::new();
    let goal = State::new().with("y", true);

    let err = generate_plan(&goal, &start, &HashSet::new(), &index, &PlannerConfig::default()).unwrap_err();
    match err {
        GoapError::PlanningFailed { reason } => assert!(reason.contains("cyclic references")),
        other => panic!("expected PlanningFailed, got {other:?}"),
    }
}

#[test]
fn dollar_prefix_resolves_against_the_bound_effect_not_world_state() {
    // Deliver's own `$object_location` must read the *bound copy's* effect
    // (post wildcard-binding, "TARGET"), never the world state's stale value
    // ("OLD"), even though both are stored under the same key name.
    let deliver = Action::new("Deliver")
        .with_precondition("robot_location", "$object_location")
        .with_effect("object_location", Value::Any);
    let position_robot = Action::new("PositionRobot").with_effect("robot_location", Value::Any);
    let index = index_of(vec![deliver, position_robot]);

    let start = State::new().with("object_location", "OLD");
    let goal = State::new().with("object_location", "TARGET");

    let plan = generate_plan(&goal, &start, &HashSet::new(), &index, &PlannerConfig::default()).unwrap();
    assert_eq!(names(&plan), vec!["PositionRobot", "Deliver"]);
    assert_eq!(plan.actions[0].effects.get("robot_location"), Some(&Value::Str("TARGET".into())));
    assert_eq!(plan.actions[1].effects.get("object_location"), Some(&Value::Str("TARGET".into())));
}
