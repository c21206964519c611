//! Behavioural properties of the demand resolver.
//!
//! Hand-written scenarios pin down recipe selection, cycle handling and the
//! multiplier arithmetic; proptest covers conservation and determinism over
//! random acyclic catalogs.

use std::collections::HashSet;

use alchemy_planner::calculator::{self, MAX_STEPS_REASON};
use alchemy_planner::index::OutputIndex;
use alchemy_planner::ledger::EPSILON;
use alchemy_planner::models::{PlanResult, PlannerConfig, Recipe, pct_to_mult};
use alchemy_planner::params::{PlannerParams, TargetMode};
use proptest::prelude::*;

// ===========================================================================
// Fixtures
// ===========================================================================

fn assert_close(actual: f64, expected: f64) {
    let tolerance = 1e-9 * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual}"
    );
}

/// Two ways to make planks; the sawmill comes first in catalog order.
fn lumber_catalog() -> Vec<Recipe> {
    vec![
        Recipe::new("planks-sawmill", "sawmill", 3.0)
            .with_input("logs", 1.0)
            .with_output("planks", 2.0)
            .with_output("sawdust", 1.0),
        Recipe::new("planks-press", "press", 5.0)
            .with_input("sawdust", 6.0)
            .with_output("planks", 1.0),
        Recipe::new("crate", "workbench", 10.0)
            .with_input("planks", 4.0)
            .with_input("nails", 8.0)
            .with_output("crate", 1.0),
        Recipe::new("nails", "forge", 2.0)
            .with_input("iron bar", 1.0)
            .with_output("nails", 10.0),
    ]
}

fn cycle_catalog() -> Vec<Recipe> {
    vec![
        Recipe::new("a", "transmuter", 5.0)
            .with_input("x", 1.0)
            .with_output("y", 1.0),
        Recipe::new("b", "transmuter", 5.0)
            .with_input("y", 1.0)
            .with_output("x", 1.0),
    ]
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn smelter_scenario() {
    let recipes = vec![
        Recipe::new("Smelter", "Smelter", 2.0)
            .with_input("Ore", 2.0)
            .with_output("Bar", 1.0),
    ];

    let result = calculator::resolve("Bar", 30.0, &recipes, &PlannerConfig::default());
    assert!(result.is_success());
    assert_close(result.recipe_runs().get("Smelter").unwrap(), 30.0);
    assert_close(result.machines().get("Smelter").unwrap(), 1.0);
    assert_eq!(result.demand().len(), 1);
    assert_close(result.demand().rate("Ore"), 60.0);

    let config = PlannerConfig::default().with_factory_speed(pct_to_mult(50.0));
    let result = calculator::resolve("Bar", 30.0, &recipes, &config);
    assert_close(result.machines().get("Smelter").unwrap(), 2.0 / 3.0);
    assert_close(result.recipe_runs().get("Smelter").unwrap(), 30.0);
    assert_close(result.demand().rate("Ore"), 60.0);
}

#[test]
fn default_recipe_is_first_in_catalog_order() {
    let recipes = lumber_catalog();
    let result = calculator::resolve("crate", 1.0, &recipes, &PlannerConfig::default());

    assert!(result.is_success());
    assert!(result.recipe_runs().contains("planks-sawmill"));
    assert!(!result.recipe_runs().contains("planks-press"));
    // 4 planks/min from the sawmill leaves 2 sawdust/min over.
    assert_close(result.demand().rate("sawdust"), -2.0);
    assert_close(result.demand().rate("logs"), 2.0);
    assert_close(result.demand().rate("iron bar"), 0.8);
}

#[test]
fn valid_pin_is_honored() {
    let recipes = lumber_catalog();
    let config = PlannerConfig::default().with_pin("planks", "planks-press");
    let result = calculator::resolve("crate", 1.0, &recipes, &config);

    assert!(result.is_success());
    assert_close(result.recipe_runs().get("planks-press").unwrap(), 4.0);
    assert_close(result.machines().get("press").unwrap(), 4.0 * 5.0 / 60.0);

    // The pin only covers planks: the 24 sawdust/min the press eats still
    // comes from the sawmill, whose planks end up as surplus.
    assert_close(result.recipe_runs().get("planks-sawmill").unwrap(), 24.0);
    assert_close(result.demand().rate("planks"), -48.0);
    assert_close(result.demand().rate("logs"), 24.0);
    assert!(result.demand().get("sawdust").is_none());
}

#[test]
fn invalid_pin_falls_back_to_first_producer() {
    let recipes = lumber_catalog();
    let baseline = calculator::resolve("crate", 1.0, &recipes, &PlannerConfig::default());

    for bogus in ["nails", "does-not-exist"] {
        let config = PlannerConfig::default().with_pin("planks", bogus);
        let result = calculator::resolve("crate", 1.0, &recipes, &config);
        assert_eq!(result, baseline);
    }
}

#[test]
fn two_recipe_cycle_aborts_within_default_budget() {
    let result = calculator::resolve("y", 3.0, &cycle_catalog(), &PlannerConfig::default());

    match &result {
        PlanResult::Failure { reason, state } => {
            assert_eq!(reason, MAX_STEPS_REASON);
            let total_runs: f64 = state.recipe_runs.iter().map(|(_, r)| r).sum();
            assert_close(total_runs, 3.0 * 25_000.0);
        }
        PlanResult::Success(_) => panic!("cycle must not resolve"),
    }

    let cycle = cycle_catalog();
    let index = OutputIndex::build(&cycle);
    assert_eq!(result.unresolved(&index).len(), 1);
}

#[test]
fn shrunk_budget_aborts_early() {
    let config = PlannerConfig::default().with_max_steps(3);
    let result = calculator::resolve("y", 1.0, &cycle_catalog(), &config);

    assert_eq!(result.reason(), Some(MAX_STEPS_REASON));
    assert_close(result.recipe_runs().get("a").unwrap(), 2.0);
    assert_close(result.recipe_runs().get("b").unwrap(), 1.0);
    // Three expansions ended on "a", leaving x demanded.
    assert_close(result.demand().rate("x"), 1.0);
}

#[test]
fn doubling_factory_speed_halves_machines_only() {
    let recipes = lumber_catalog();
    let base = PlannerConfig::default().with_factory_speed(1.25);
    let fast = PlannerConfig::default().with_factory_speed(2.5);

    let slow_plan = calculator::resolve("crate", 3.0, &recipes, &base);
    let fast_plan = calculator::resolve("crate", 3.0, &recipes, &fast);

    assert_eq!(slow_plan.recipe_runs(), fast_plan.recipe_runs());
    assert_eq!(slow_plan.demand(), fast_plan.demand());
    for (device, count) in slow_plan.machines().iter() {
        assert_close(fast_plan.machines().get(device).unwrap(), count / 2.0);
    }
    assert_eq!(slow_plan.machines().len(), fast_plan.machines().len());
}

#[test]
fn devices_mode_matches_equivalent_rate() {
    let recipes = vec![
        Recipe::new("elixir", "alembic", 12.0)
            .with_input("herb", 3.0)
            .with_input("water", 2.0)
            .with_output("elixir", 2.0),
    ];

    let mut devices = PlannerParams::new("elixir");
    devices.mode = TargetMode::Devices;
    devices.target = 4.0;
    devices.factory_pct = 30.0;
    let config = devices.config();

    let mut rate = devices.clone();
    rate.mode = TargetMode::Rate;
    rate.target = 4.0 * ((60.0 / 12.0) * pct_to_mult(30.0)) * 2.0;

    let by_devices = calculator::plan(&devices, &config, &recipes).unwrap();
    let by_rate = calculator::plan(&rate, &config, &recipes).unwrap();

    assert_eq!(by_devices.target_per_min, by_rate.target_per_min);
    assert_eq!(by_devices.result, by_rate.result);
    assert_close(by_devices.result.machines().get("alembic").unwrap(), 4.0);
}

#[test]
fn raw_target_yields_no_plan() {
    let recipes = lumber_catalog();
    let params = PlannerParams::new("logs");
    assert!(calculator::plan(&params, &params.config(), &recipes).is_none());

    let params = PlannerParams::new("unheard of");
    assert!(calculator::plan(&params, &params.config(), &recipes).is_none());
}

#[test]
fn reserved_multipliers_do_not_change_plans() {
    let recipes = lumber_catalog();
    let mut config = PlannerConfig::default();
    let baseline = calculator::resolve("crate", 2.0, &recipes, &config);

    config.fuel_value_mult = 3.0;
    config.nutrient_value_mult = 0.5;
    assert_eq!(calculator::resolve("crate", 2.0, &recipes, &config), baseline);
}

#[test]
fn resolution_never_touches_catalog() {
    let recipes = lumber_catalog();
    let before = recipes.clone();
    let _ = calculator::resolve("crate", 7.0, &recipes, &PlannerConfig::default());
    let _ = calculator::resolve("y", 1.0, &cycle_catalog(), &PlannerConfig::default().with_max_steps(5));
    assert_eq!(recipes, before);
}

// ===========================================================================
// Generators
// ===========================================================================

/// Random acyclic catalog: intermediate item `k` only consumes raw items or
/// intermediates below `k`, and may emit a waste byproduct nothing consumes.
fn arb_acyclic_catalog() -> impl Strategy<Value = Vec<Recipe>> {
    (1usize..=3, 1usize..=6).prop_flat_map(|(raw_count, item_count)| {
        let recipe = |k: usize| {
            (
                proptest::collection::vec((0..raw_count + k, 1u32..=5), 1..=3),
                1u32..=5,
                1u32..=20,
                proptest::option::of(1u32..=3),
            )
                .prop_map(move |(inputs, out, secs, waste)| (k, inputs, out, secs, waste))
        };

        let per_item: Vec<_> = (0..item_count)
            .map(|k| proptest::collection::vec(recipe(k), 1..=2))
            .collect();

        per_item.prop_map(move |groups| {
            let name = |idx: usize| {
                if idx < raw_count {
                    format!("raw{idx}")
                } else {
                    format!("item{}", idx - raw_count)
                }
            };

            let mut recipes = Vec::new();
            for group in groups {
                for (n, (k, inputs, out, secs, waste)) in group.into_iter().enumerate() {
                    let mut recipe = Recipe::new(
                        format!("make-item{k}-{n}"),
                        format!("device{}", (k + n) % 3),
                        secs as f64,
                    )
                    .with_output(format!("item{k}"), out as f64);
                    for (idx, amount) in inputs {
                        recipe = recipe.with_input(name(idx), amount as f64);
                    }
                    if let Some(waste) = waste {
                        recipe = recipe.with_output(format!("waste{k}"), waste as f64);
                    }
                    recipes.push(recipe);
                }
            }
            recipes
        })
    })
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Only raw items stay demanded, every intermediate nets out, and each
    /// ledger entry equals the flows implied by the recipe runs.
    #[test]
    fn acyclic_plans_conserve_flow(recipes in arb_acyclic_catalog(), rate in 0.5f64..500.0) {
        let index = OutputIndex::build(&recipes);
        let target = index.items().filter(|i| i.starts_with("item")).last().unwrap().to_string();

        let result = calculator::resolve(&target, rate, &recipes, &PlannerConfig::default());
        prop_assert!(result.is_success());

        for (item, flow) in result.demand().iter() {
            if flow > EPSILON {
                prop_assert!(!index.has_producer(item), "{item} still demanded at {flow}");
            }
        }

        let mut items: HashSet<&str> = HashSet::new();
        for recipe in &recipes {
            items.extend(recipe.inputs.iter().chain(&recipe.outputs).map(|io| io.item.as_str()));
        }

        for item in items {
            let mut expected = if item == target { rate } else { 0.0 };
            // Gross flow through the item; tolerances are relative to it.
            let mut gross = expected;
            for recipe in &recipes {
                let runs = result.recipe_runs().get(&recipe.slug).unwrap_or(0.0);
                let consumed: f64 = recipe.inputs.iter().filter(|i| i.item == item).map(|i| runs * i.amount).sum();
                let produced: f64 = recipe.outputs.iter().filter(|o| o.item == item).map(|o| runs * o.amount).sum();
                expected += consumed - produced;
                gross += consumed + produced;
            }

            let actual = result.demand().rate(item);
            let tolerance = 1e-9 * gross.max(1.0);
            prop_assert!((actual - expected).abs() <= tolerance, "{item}: {actual} vs {expected}");

            let intermediate = item.starts_with("item") && item != target;
            if intermediate {
                prop_assert!(actual.abs() <= tolerance, "{item} nets to {actual}");
            }
        }
    }

    #[test]
    fn identical_inputs_give_identical_plans(recipes in arb_acyclic_catalog(), rate in 0.1f64..1000.0, pct in -50.0f64..200.0) {
        let index = OutputIndex::build(&recipes);
        let target = index.items().next().unwrap().to_string();
        let config = PlannerConfig::default().with_factory_speed(pct_to_mult(pct));

        let first = calculator::resolve(&target, rate, &recipes, &config);
        let second = calculator::resolve(&target, rate, &recipes, &config);

        prop_assert_eq!(&first, &second);
        let first_order: Vec<&str> = first.demand().iter().map(|(k, _)| k).collect();
        let second_order: Vec<&str> = second.demand().iter().map(|(k, _)| k).collect();
        prop_assert_eq!(first_order, second_order);
    }
}
