//! Production plan resolution
//!
//! The resolver works on a net-flow ledger rather than a tree. It keeps
//! picking the first item that still has unmet demand and a producer,
//! replaces that demand with the inputs of one recipe, and books the outputs
//! (including byproducts) against the ledger. It stops when nothing is left
//! to expand or the step budget runs out.

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::index::OutputIndex;
use crate::ledger::{DemandLedger, RateTable};
use crate::models::{PlanResult, PlanState, PlannerConfig, Recipe};
use crate::params::{PlannerParams, TargetMode};

/// Reason attached to plans that ran out of steps
pub const MAX_STEPS_REASON: &str = "Max steps reached (Recipe loop / cycle?)";

/// Resolve the demand for `target_per_min` units of `target_item` per minute.
///
/// Builds a fresh output index over `recipes`; nothing is cached between calls.
pub fn resolve(
    target_item: &str,
    target_per_min: f64,
    recipes: &[Recipe],
    config: &PlannerConfig,
) -> PlanResult {
    let index = OutputIndex::build(recipes);
    resolve_indexed(&index, target_item, target_per_min, config)
}

/// Same as [`resolve`] over an index the caller already built
pub fn resolve_indexed(
    index: &OutputIndex<'_>,
    target_item: &str,
    target_per_min: f64,
    config: &PlannerConfig,
) -> PlanResult {
    debug!(
        target_item,
        target_per_min,
        factory_speed = config.factory_speed_mult,
        max_steps = config.max_steps,
        "resolving plan"
    );

    let mut state = PlanState {
        demand: DemandLedger::seeded(target_item, target_per_min),
        ..PlanState::default()
    };
    let mut steps = 0usize;

    while let Some(item) = state.demand.pick_expandable(index).map(str::to_owned) {
        if steps >= config.max_steps {
            warn!(target_item, steps, unresolved = %item, "step budget exhausted");
            return PlanResult::Failure {
                reason: MAX_STEPS_REASON.to_string(),
                state,
            };
        }

        let need_per_min = state.demand.rate(&item);
        let Some(producer) = index.select(&item, &config.recipe_choice) else {
            unreachable!("expandable item {item} has no producer");
        };
        let recipe = producer.recipe;

        let runs_per_min = need_per_min / producer.output_amount;
        state.recipe_runs.add(&recipe.slug, runs_per_min);

        let machines = runs_per_min * recipe.crafting_s / 60.0 / config.factory_speed_mult;
        state.machines.add(&recipe.device, machines);

        // Outputs reduce demand and may flip it into surplus.
        for output in &recipe.outputs {
            state.demand.add_flow(&output.item, -runs_per_min * output.amount);
        }
        for input in &recipe.inputs {
            state.demand.add_flow(&input.item, runs_per_min * input.amount);
        }
        state.demand.prune();
        steps += 1;

        trace!(step = steps, item = %item, recipe = %recipe.slug, runs_per_min, "expanded");
    }

    debug!(target_item, steps, devices = state.machines.len(), "plan resolved");
    PlanResult::Success(state)
}

/// A resolved plan together with the request that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub target_item: String,
    pub mode: TargetMode,
    pub target_value: f64,
    pub target_per_min: f64,
    pub result: PlanResult,
}

/// Plan for the given parameters.
///
/// Returns `None` when nothing in the catalog produces the target item.
pub fn plan(params: &PlannerParams, config: &PlannerConfig, recipes: &[Recipe]) -> Option<Plan> {
    let index = OutputIndex::build(recipes);
    if !index.has_producer(&params.item) {
        debug!(item = %params.item, "no recipe produces target item");
        return None;
    }

    let target_per_min = params.target_per_minute(&index, config)?;
    let result = resolve_indexed(&index, &params.item, target_per_min, config);

    Some(Plan {
        target_item: params.item.clone(),
        mode: params.mode,
        target_value: params.target,
        target_per_min,
        result,
    })
}

/// Format a rate for display with precision depending on magnitude
pub fn fmt_rate(n: f64) -> String {
    if !n.is_finite() {
        "—".to_string()
    } else if n.abs() >= 100.0 {
        format!("{:.2}", n)
    } else if n.abs() >= 10.0 {
        format!("{:.3}", n)
    } else {
        format!("{:.4}", n)
    }
}

/// Display-ready view of a plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub target_item: String,
    pub target_per_min: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// device -> count, largest first
    pub machines: RateTable,
    /// raw inputs and other unmet demand, largest first
    pub needs: RateTable,
    /// byproducts as positive rates, largest first
    pub surpluses: RateTable,
    pub recipe_runs: RateTable,
}

impl PlanSummary {
    pub fn from_plan(plan: &Plan) -> Self {
        let state = plan.result.state();
        let table = |rows: Vec<(String, f64)>| -> RateTable {
            rows.iter().map(|(key, rate)| (key.as_str(), *rate)).collect()
        };

        Self {
            target_item: plan.target_item.clone(),
            target_per_min: plan.target_per_min,
            error: plan.result.reason().map(str::to_string),
            machines: table(state.machines.sorted_desc()),
            needs: table(state.demand.needs()),
            surpluses: table(state.demand.surpluses()),
            recipe_runs: state.recipe_runs.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Production Plan ===")?;
        writeln!(
            f,
            "Target: {} @ {} / min",
            self.target_item,
            fmt_rate(self.target_per_min)
        )?;
        writeln!(f)?;

        if let Some(error) = &self.error {
            writeln!(f, "{}", error)?;
            return Ok(());
        }

        let sections = [
            ("Machines:", &self.machines),
            ("Need (inputs / raw resources) per min:", &self.needs),
            ("Surplus (byproducts) per min:", &self.surpluses),
        ];
        for (i, (title, rows)) in sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", title)?;
            if rows.is_empty() {
                writeln!(f, "  (none)")?;
            }
            for (name, value) in rows.iter() {
                writeln!(f, "  {}: {}", name, fmt_rate(value))?;
            }
        }

        Ok(())
    }
}

/// Per-recipe breakdown of a plan, one line per recipe in expansion order
pub fn format_recipe_runs(plan: &Plan, recipes: &[Recipe]) -> String {
    let mut output = String::new();

    for (slug, runs) in plan.result.recipe_runs().iter() {
        match recipes.iter().find(|r| r.slug == slug) {
            Some(recipe) => output.push_str(&format!(
                "  {} [{} · {}s]: {} runs/min\n",
                recipe.name,
                recipe.device,
                recipe.crafting_s,
                fmt_rate(runs)
            )),
            None => output.push_str(&format!("  {}: {} runs/min\n", slug, fmt_rate(runs))),
        }
    }

    output
}
