//! Planner parameters and their query-string form
//!
//! A plan is bookmarkable through `item`, `mode` and `target` in a query
//! string. Percentages and recipe pins are not part of the shareable link.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::index::OutputIndex;
use crate::models::{PlannerConfig, pct_to_mult};

/// Target value used when none is given
pub const DEFAULT_TARGET: f64 = 2.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParamsError {
    #[error("unknown mode '{0}' (expected 'rate' or 'devices')")]
    UnknownMode(String),

    #[error("recipe pin '{0}' must look like item=recipe-slug")]
    MalformedPin(String),
}

/// How the target value is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// Units per minute of the target item
    #[default]
    Rate,
    /// Number of devices running the target item's recipe
    Devices,
}

impl TargetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetMode::Rate => "rate",
            TargetMode::Devices => "devices",
        }
    }
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetMode {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rate" => Ok(TargetMode::Rate),
            "devices" => Ok(TargetMode::Devices),
            other => Err(ParamsError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerParams {
    pub item: String,
    pub mode: TargetMode,
    pub target: f64,
    /// Efficiency bonuses in percent
    pub factory_pct: f64,
    pub fuel_pct: f64,
    pub fertilizer_pct: f64,
    /// item -> recipe slug
    #[serde(default)]
    pub recipe_choice: BTreeMap<String, String>,
}

impl PlannerParams {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            mode: TargetMode::Rate,
            target: DEFAULT_TARGET,
            factory_pct: 0.0,
            fuel_pct: 0.0,
            fertilizer_pct: 0.0,
            recipe_choice: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> PlannerConfig {
        PlannerConfig {
            factory_speed_mult: pct_to_mult(self.factory_pct),
            fuel_value_mult: pct_to_mult(self.fuel_pct),
            nutrient_value_mult: pct_to_mult(self.fertilizer_pct),
            recipe_choice: self
                .recipe_choice
                .iter()
                .map(|(item, slug)| (item.clone(), slug.clone()))
                .collect::<HashMap<_, _>>(),
            ..PlannerConfig::default()
        }
    }

    /// Target rate in units per minute.
    ///
    /// In devices mode the count is converted through the recipe that would
    /// be selected for the target item; `None` if nothing produces it.
    pub fn target_per_minute(&self, index: &OutputIndex<'_>, config: &PlannerConfig) -> Option<f64> {
        match self.mode {
            TargetMode::Rate => Some(self.target),
            TargetMode::Devices => {
                let producer = index.select(&self.item, &config.recipe_choice)?;
                let per_device = producer
                    .recipe
                    .runs_per_minute_per_device(config.factory_speed_mult);
                Some(self.target * per_device * producer.output_amount)
            }
        }
    }

    /// Encode the shareable part as `item=..&mode=..&target=..`
    pub fn encode(&self) -> String {
        format!(
            "item={}&mode={}&target={}",
            encode_component(&self.item),
            self.mode,
            encode_component(&self.target.to_string())
        )
    }

    /// Restore parameters from a query string.
    ///
    /// `items` is the display-ordered item list; an absent or unknown item
    /// falls back to its first entry. Returns `None` if there is nothing to
    /// fall back to.
    pub fn decode(query: &str, items: &[String]) -> Option<Self> {
        let pairs = parse_query(query);
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let item = match get("item") {
            Some(item) if items.iter().any(|i| i == item) => item.to_string(),
            _ => items.first()?.clone(),
        };

        let mut params = Self::new(item);
        if get("mode") == Some("devices") {
            params.mode = TargetMode::Devices;
        }
        if let Some(target) = get("target").and_then(|t| t.trim().parse::<f64>().ok()) {
            params.target = target;
        }
        Some(params)
    }

    pub fn with_pin(mut self, item: impl Into<String>, slug: impl Into<String>) -> Self {
        self.recipe_choice.insert(item.into(), slug.into());
        self
    }
}

/// Parse an `item=slug` recipe pin
pub fn parse_pin(pin: &str) -> Result<(String, String), ParamsError> {
    match pin.split_once('=') {
        Some((item, slug)) if !item.trim().is_empty() && !slug.trim().is_empty() => {
            Ok((item.trim().to_string(), slug.trim().to_string()))
        }
        _ => Err(ParamsError::MalformedPin(pin.to_string())),
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

/// Form-style percent encoding: spaces become `+`
fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'*' | b'-' | b'.' | b'_' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn decode_component(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => match bytes.get(i + 1..i + 3).and_then(|pair| hex_pair(pair[0], pair[1])) {
                Some(byte) => {
                    out.push(byte);
                    i += 2;
                }
                None => out.push(b'%'),
            },
            other => out.push(other),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
