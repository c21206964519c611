//! Alchemy Factory production planner
//!
//! Resolves how many devices, recipe runs and raw inputs it takes to sustain
//! a requested output rate of one item, given a catalog of recipes.

pub mod calculator;
pub mod catalog;
pub mod db;
pub mod extract;
pub mod index;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod params;

pub use calculator::{Plan, PlanSummary, plan, resolve};
pub use index::OutputIndex;
pub use ledger::{DemandLedger, RateTable};
pub use models::{ItemAmount, PlanResult, PlanState, PlannerConfig, Recipe};
pub use params::{PlannerParams, TargetMode};
