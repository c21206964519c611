//! Data models for recipes, planner configuration and plan results

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::index::OutputIndex;
use crate::ledger::{DemandLedger, EPSILON, RateTable};

/// Device name used when a catalog record does not say which machine runs it
pub const UNKNOWN_DEVICE: &str = "unknown device";

/// Default number of expansions before a plan is declared cyclic
pub const DEFAULT_MAX_STEPS: usize = 25_000;

/// An item and how many units of it a recipe run consumes or produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAmount {
    pub item: String,
    pub amount: f64,
}

impl ItemAmount {
    pub fn new(item: impl Into<String>, amount: f64) -> Self {
        Self {
            item: item.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub slug: String,
    pub device: String,
    /// Seconds for one run on one device
    pub crafting_s: f64,
    pub inputs: Vec<ItemAmount>,
    pub outputs: Vec<ItemAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Recipe {
    pub fn new(slug: impl Into<String>, device: impl Into<String>, crafting_s: f64) -> Self {
        let slug = slug.into();
        Self {
            name: slug.clone(),
            slug,
            device: device.into(),
            crafting_s,
            inputs: Vec::new(),
            outputs: Vec::new(),
            url: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_input(mut self, item: impl Into<String>, amount: f64) -> Self {
        self.inputs.push(ItemAmount::new(item, amount));
        self
    }

    pub fn with_output(mut self, item: impl Into<String>, amount: f64) -> Self {
        self.outputs.push(ItemAmount::new(item, amount));
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Units of `item` produced by one run
    pub fn output_amount(&self, item: &str) -> Option<f64> {
        self.outputs.iter().find(|o| o.item == item).map(|o| o.amount)
    }

    /// Runs per minute a single device manages at the given speed multiplier
    pub fn runs_per_minute_per_device(&self, factory_speed_mult: f64) -> f64 {
        (60.0 / self.crafting_s) * factory_speed_mult
    }
}

/// Knobs that shape a resolution
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    pub factory_speed_mult: f64,
    // Reserved: carried through to plans but not read by the resolver.
    pub fuel_value_mult: f64,
    pub nutrient_value_mult: f64,
    /// item -> recipe slug, for items with more than one producer
    pub recipe_choice: HashMap<String, String>,
    pub max_steps: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            factory_speed_mult: 1.0,
            fuel_value_mult: 1.0,
            nutrient_value_mult: 1.0,
            recipe_choice: HashMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl PlannerConfig {
    pub fn with_factory_speed(mut self, mult: f64) -> Self {
        self.factory_speed_mult = mult;
        self
    }

    pub fn with_pin(mut self, item: impl Into<String>, slug: impl Into<String>) -> Self {
        self.recipe_choice.insert(item.into(), slug.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Convert an efficiency bonus in percent to a multiplier; non-finite input counts as zero
pub fn pct_to_mult(pct: f64) -> f64 {
    let pct = if pct.is_finite() { pct } else { 0.0 };
    1.0 + pct / 100.0
}

/// Ledger and accumulators produced by one resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanState {
    /// +need / -surplus per minute
    pub demand: DemandLedger,
    /// device -> fractional machine count
    pub machines: RateTable,
    /// recipe slug -> runs per minute
    pub recipe_runs: RateTable,
}

/// Outcome of a resolution. Both arms carry the full state so a failed plan
/// can still be inspected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanResult {
    Success(PlanState),
    Failure {
        reason: String,
        #[serde(flatten)]
        state: PlanState,
    },
}

impl PlanResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PlanResult::Success(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            PlanResult::Success(_) => None,
            PlanResult::Failure { reason, .. } => Some(reason),
        }
    }

    pub fn state(&self) -> &PlanState {
        match self {
            PlanResult::Success(state) | PlanResult::Failure { state, .. } => state,
        }
    }

    pub fn into_state(self) -> PlanState {
        match self {
            PlanResult::Success(state) | PlanResult::Failure { state, .. } => state,
        }
    }

    pub fn demand(&self) -> &DemandLedger {
        &self.state().demand
    }

    pub fn machines(&self) -> &RateTable {
        &self.state().machines
    }

    pub fn recipe_runs(&self) -> &RateTable {
        &self.state().recipe_runs
    }

    /// Items still demanded that a recipe could have produced
    pub fn unresolved<'r>(&'r self, index: &OutputIndex<'_>) -> Vec<&'r str> {
        self.demand()
            .iter()
            .filter(|&(item, rate)| rate > EPSILON && index.has_producer(item))
            .map(|(item, _)| item)
            .collect()
    }
}
