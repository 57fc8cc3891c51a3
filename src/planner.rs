// ============================================================================
//                    GOAP ENGINE • GOAL-REGRESSION PLANNER
//        Recursive, Least-Cost Search Over the Action Lookup Index
// ----------------------------------------------------------------------------
//   Architectural Role:
//       Computes a least-cost ordered action sequence that transforms a
//       start state into one satisfying a goal, by regressing from the goal
//       through actions' effects to their preconditions, recursively, until
//       every precondition is already true in the start state. Handles
//       wildcard effect binding, `$`/`@` reference resolution, cyclic-
//       reference detection, blacklisting, first-occurrence deduplication,
//       and deterministic tie-breaking by candidate registration order.
//
//   Core Functions:
//       • `generate_plan` — the public entry point, one goal key at a time
//       • `plan_subgoal` — the recursive regression step (spec §4.3)
//       • `dedupe_preserving_first` — collapse repeated actions, first wins
// ============================================================================

use crate::action::Action;
use crate::error::{GoapError, Result};
use crate::index::ActionIndex;
use crate::reference::resolve;
use crate::state::State;
use crate::value::Value;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// An ordered, deduplicated sequence of bound action copies whose cumulative
/// effects satisfy the goal they were planned for.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn total_cost(&self) -> f64 {
        self.actions.iter().map(|a| a.cost).sum()
    }
}

/// Tunables for the recursive search; see `SPEC_FULL.md` §A.3.
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Bounds both reference-substitution chains and subgoal recursion
    /// depth. Cycles are caught explicitly (see `plan_subgoal`) well before
    /// this would ever trigger in practice; it exists as a backstop against
    /// very deep, legitimately acyclic chains.
    pub recursion_limit: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { recursion_limit: 64 }
    }
}

/// Computes a least-cost plan from `start_state` to `goal`, skipping any
/// action whose name is in `blacklist`.
///
/// Multi-key goals are handled by regressing each key independently (the
/// reference algorithm rejects multi-key subgoals in the *recursive* call;
/// this is the top-level iteration that the spec leaves to the caller, per
/// §4.3's "Subgoal constraint" note) and deduplicating the concatenation.
pub fn generate_plan(
    goal: &State,
    start_state: &State,
    blacklist: &HashSet<String>,
    index: &ActionIndex,
    config: &PlannerConfig,
) -> Result<Plan> {
    match generate_plan_inner(goal, start_state, blacklist, index, config) {
        Ok(plan) => Ok(plan),
        Err(GoapError::CyclicReference { key }) => Err(GoapError::PlanningFailed {
            reason: format!("cyclic references detected while resolving '{key}'"),
        }),
        Err(GoapError::RecursionLimitExceeded { key }) => Err(GoapError::PlanningFailed {
            reason: format!(
                "cyclic references (recursion limit exceeded) while resolving '{key}'"
            ),
        }),
        Err(other) => Err(other),
    }
}

fn generate_plan_inner(
    goal: &State,
    start_state: &State,
    blacklist: &HashSet<String>,
    index: &ActionIndex,
    config: &PlannerConfig,
) -> Result<Plan> {
    let mut combined = Vec::new();
    for (key, value) in goal.iter() {
        let mut in_progress: HashSet<(String, Value)> = HashSet::new();
        let path = plan_subgoal(key, value, start_state, blacklist, index, &mut in_progress, config, 0)?;
        combined.extend(path);
    }

    let deduped = dedupe_preserving_first(combined);

    let infeasible: Vec<&Action> = deduped.iter().filter(|a| a.is_impossible()).collect();
    if !infeasible.is_empty() {
        let keys: Vec<String> = infeasible
            .iter()
            .flat_map(|a| a.effects.iter().map(|(k, _)| k.clone()))
            .collect();
        warn!("planning failed: no feasible action for {:?}", keys);
        return Err(GoapError::PlanningFailed {
            reason: format!("no feasible action for: {}", keys.join(", ")),
        });
    }

    Ok(Plan { actions: deduped })
}

/// Recursive regression step for a single `(key, value)` subgoal. Never
/// returns `Err` for ordinary infeasibility — that is represented in-band
/// as an [`Action::impossible`] marker so cost comparison between sibling
/// candidates still works. Only genuine cyclic/recursion-depth conditions
/// are raised as errors, since those are not something cost comparison can
/// route around.
///
/// A subgoal is the pair `(key, value)`, not `key` alone: two different
/// requested values for the same key (e.g. an intermediate `object_location:
/// "gripper"` versus the goal's own `object_location: "P2"`) are distinct
/// subgoals and must not collide in `in_progress` — only re-entering the
/// *same* `(key, value)` pair while it is still being expanded is a cycle.
fn plan_subgoal(
    key: &str,
    value: &Value,
    start_state: &State,
    blacklist: &HashSet<String>,
    index: &ActionIndex,
    in_progress: &mut HashSet<(String, Value)>,
    config: &PlannerConfig,
    depth: usize,
) -> Result<Vec<Action>> {
    if depth > config.recursion_limit {
        return Err(GoapError::RecursionLimitExceeded { key: key.to_string() });
    }
    let resolved_value = resolve(value, start_state, '@', config.recursion_limit)?;
    let subgoal = (key.to_string(), resolved_value.clone());
    if !in_progress.insert(subgoal.clone()) {
        return Err(GoapError::CyclicReference { key: key.to_string() });
    }
    let result = plan_subgoal_inner(key, &resolved_value, start_state, blacklist, index, in_progress, config, depth);
    in_progress.remove(&subgoal);
    result
}

fn plan_subgoal_inner(
    key: &str,
    resolved_value: &Value,
    start_state: &State,
    blacklist: &HashSet<String>,
    index: &ActionIndex,
    in_progress: &mut HashSet<(String, Value)>,
    config: &PlannerConfig,
    depth: usize,
) -> Result<Vec<Action>> {
    if start_state.satisfies_pair(key, resolved_value) {
        return Ok(Vec::new());
    }

    let mut candidates: Vec<Arc<Action>> = index.candidates(key, resolved_value).to_vec();
    if candidates.is_empty() {
        candidates = index.wildcard_candidates(key).to_vec();
        if !candidates.is_empty() {
            debug!("subgoal '{key}' falling back to wildcard producers");
        }
    }
    candidates.retain(|a| !blacklist.contains(&a.name));

    if candidates.is_empty() {
        warn!("no producer for subgoal '{key}' = {resolved_value}; inserting impossible marker");
        return Ok(vec![Action::impossible(key, resolved_value.clone())]);
    }

    debug!("subgoal '{key}' = {resolved_value}: {} candidate(s)", candidates.len());

    let mut best: Option<Vec<Action>> = None;
    let mut best_cost = f64::INFINITY;

    for candidate in &candidates {
        let mut bound = (**candidate).clone();
        if bound.effects.get(key).map(|v| v.is_wildcard()).unwrap_or(false) {
            bound.effects.insert(key.to_string(), resolved_value.clone());
        }

        let mut candidate_path = Vec::new();
        for (pk, pv) in bound.preconditions.iter() {
            let local = resolve(pv, &bound.effects, '$', config.recursion_limit)?;
            let resolved_pv = resolve(&local, start_state, '@', config.recursion_limit)?;
            let sub_path = plan_subgoal(pk, &resolved_pv, start_state, blacklist, index, in_progress, config, depth + 1)?;
            candidate_path.extend(sub_path);
        }
        candidate_path.push(bound);

        let deduped = dedupe_preserving_first(candidate_path);
        let total_cost: f64 = deduped.iter().map(|a| a.cost).sum();

        // The first candidate explored always seeds `best`, even when its
        // path is infeasible (infinite cost) — otherwise an all-infeasible
        // candidate set would leave `best` at `None` instead of surfacing
        // the impossible-action marker for the caller to detect (spec §4.3
        // step 11). Strictly-smaller-wins after that keeps the spec's
        // first-explored tie-break: an equal-cost later candidate never
        // displaces the current best.
        if best.is_none() || total_cost < best_cost {
            best_cost = total_cost;
            best = Some(deduped);
        }
    }

    Ok(best.expect("candidates is non-empty, so the loop runs at least once"))
}

/// Collapses repeated actions under elastic action equality, keeping only
/// the first occurrence (spec §4.3 step 9, §8 invariant).
fn dedupe_preserving_first(actions: Vec<Action>) -> Vec<Action> {
    let mut result: Vec<Action> = Vec::with_capacity(actions.len());
    for action in actions {
        if !result.iter().any(|existing: &Action| existing.matches_elastic(&action)) {
            result.push(action);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn index_of(actions: Vec<Action>) -> ActionIndex {
        let arced: Vec<Arc<Action>> = actions.into_iter().map(Arc::new).collect();
        ActionIndex::build(&arced)
    }

    fn names(plan: &Plan) -> Vec<String> {
        plan.actions.iter().map(|a| a.name.clone()).collect()
    }

    #[test]
    fn driving_scenario_picks_rent_car_chain() {
        let drive = Action::new("Drive")
            .with_precondition("has_drivers_license", true)
            .with_precondition("tank_has_gas", true)
            .with_effect("driving", true);
        let fill_gas = Action::new("FillGas")
            .with_precondition("has_car", true)
            .with_effect("tank_has_gas", true);
        let rent_car = Action::new("RentCar").with_effect("has_car", true).with_cost(100.0);
        let buy_car = Action::new("BuyCar").with_effect("has_car", true).with_cost(10000.0);

        let index = index_of(vec![drive, fill_gas, rent_car, buy_car]);
        let start = State::new().with("has_car", false).with("has_drivers_license", true);
        let goal = State::new().with("driving", true);

        let plan = generate_plan(&goal, &start, &HashSet::new(), &index, &PlannerConfig::default()).unwrap();
        assert_eq!(names(&plan), vec!["RentCar", "FillGas", "Drive"]);
    }

    #[test]
    fn already_satisfied_goal_yields_empty_plan() {
        let index = index_of(vec![Action::new("Noop").with_effect("k", true)]);
        let start = State::new().with("k", true);
        let goal = State::new().with("k", true);
        let plan = generate_plan(&goal, &start, &HashSet::new(), &index, &PlannerConfig::default()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn no_producer_raises_planning_failed() {
        let index = index_of(vec![]);
        let start = State::new();
        let goal = State::new().with("unreachable", true);
        let err = generate_plan(&goal, &start, &HashSet::new(), &index, &PlannerConfig::default()).unwrap_err();
        assert!(matches!(err, GoapError::PlanningFailed { .. }));
    }

    #[test]
    fn sole_candidate_with_an_unreachable_precondition_fails_without_panicking() {
        // `Produce` is the only producer of `X`, but its own precondition
        // `Y` has no producer at all. Every explored candidate path is
        // infinite-cost, so `best` must still end up `Some` (seeded by the
        // first candidate unconditionally) rather than panicking on an
        // `Option::None` `best`.
        let produce = Action::new("Produce").with_precondition("Y", true).with_effect("X", true);
        let index = index_of(vec![produce]);
        let goal = State::new().with("X", true);
        let err = generate_plan(&goal, &State::new(), &HashSet::new(), &index, &PlannerConfig::default()).unwrap_err();
        assert!(matches!(err, GoapError::PlanningFailed { .. }));
    }

    #[test]
    fn cyclic_preconditions_raise_planning_failed_cyclic_references() {
        let a1 = Action::new("A1").with_precondition("FIRST", true).with_effect("SECOND", true);
        let a2 = Action::new("A2").with_precondition("SECOND", true).with_effect("FIRST", true);
        let a3 = Action::new("A3")
            .with_precondition("FIRST", true)
            .with_precondition("SECOND", true)
            .with_effect("THIRD", true);
        let index = index_of(vec![a1, a2, a3]);
        let start = State::new();
        let goal = State::new().with("THIRD", true);

        let err = generate_plan(&goal, &start, &HashSet::new(), &index, &PlannerConfig::default()).unwrap_err();
        match err {
            GoapError::PlanningFailed { reason } => assert!(reason.contains("cyclic references")),
            other => panic!("expected PlanningFailed, got {other:?}"),
        }
    }

    #[test]
    fn blacklisted_action_is_excluded_from_candidates() {
        let cheap = Action::new("Cheap").with_effect("x", true).with_cost(1.0);
        let pricey = Action::new("Pricey").with_effect("x", true).with_cost(5.0);
        let index = index_of(vec![cheap, pricey]);
        let mut blacklist = HashSet::new();
        blacklist.insert("Cheap".to_string());

        let plan = generate_plan(
            &State::new().with("x", true),
            &State::new(),
            &blacklist,
            &index,
            &PlannerConfig::default(),
        )
        .unwrap();
        assert_eq!(names(&plan), vec!["Pricey"]);
    }

    #[test]
    fn duplicate_shared_subplan_actions_are_deduplicated() {
        // Two top-level goal keys both need `Power` as a precondition; the
        // resulting plan must only contain one copy of it.
        let power = Action::new("Power").with_effect("has_power", true);
        let light = Action::new("Light").with_precondition("has_power", true).with_effect("light_on", true);
        let radio = Action::new("Radio").with_precondition("has_power", true).with_effect("radio_on", true);
        let index = index_of(vec![power, light, radio]);

        let goal = State::new().with("light_on", true).with("radio_on", true);
        let plan = generate_plan(&goal, &State::new(), &HashSet::new(), &index, &PlannerConfig::default()).unwrap();

        let power_count = plan.actions.iter().filter(|a| a.name == "Power").count();
        assert_eq!(power_count, 1);
    }

    #[test]
    fn wildcard_effect_binds_to_requested_goal_value() {
        let mv = Action::new("Move").with_effect("robot_location", Value::Any).with_cost(1.0);
        let index = index_of(vec![mv]);
        let goal = State::new().with("robot_location", "P2");
        let plan = generate_plan(&goal, &State::new(), &HashSet::new(), &index, &PlannerConfig::default()).unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].effects.get("robot_location"), Some(&Value::Str("P2".into())));
    }

    #[test]
    fn reference_in_precondition_resolves_against_world_state() {
        // Pick: {object_location: "gripper"} / {robot_location: "@object_location"}
        let pick = Action::new("Pick")
            .with_precondition("object_location", "gripper")
            .with_effect("robot_location", "@object_location");
        let set_gripper = Action::new("SetGripper").with_effect("object_location", "gripper");
        let index = index_of(vec![pick, set_gripper]);
        let start = State::new().with("object_location", "P1");
        let goal = State::new().with("robot_location", "P1");

        let plan = generate_plan(&goal, &start, &HashSet::new(), &index, &PlannerConfig::default()).unwrap();
        assert_eq!(names(&plan), vec!["SetGripper", "Pick"]);
    }
}
