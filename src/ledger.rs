//! Insertion-ordered rate tables and the demand ledger
//!
//! Every table here iterates in first-insertion order. The resolver relies on
//! that order to decide which item it expands next, so it is part of the
//! contract and not an accident of the container.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::index::OutputIndex;

/// Rates whose magnitude falls below this are treated as zero.
pub const EPSILON: f64 = 1e-12;

/// A map from key to accumulated rate that remembers insertion order.
///
/// Removing a key and adding it again later places it at the back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    entries: Vec<(String, f64)>,
    positions: HashMap<String, usize>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the rate stored under `key`, creating it at zero first
    pub fn add(&mut self, key: &str, delta: f64) {
        match self.positions.get(key) {
            Some(&pos) => self.entries[pos].1 += delta,
            None => {
                self.positions.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), delta));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.positions.get(key).map(|&pos| self.entries[pos].1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(key, rate)| (key.as_str(), *rate))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Keep only entries for which `keep` returns true; returns how many were removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str, f64) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|(key, rate)| keep(key, *rate));

        let removed = before - self.entries.len();
        if removed > 0 {
            self.positions = self
                .entries
                .iter()
                .enumerate()
                .map(|(pos, (key, _))| (key.clone(), pos))
                .collect();
        }
        removed
    }

    /// Entries sorted by rate, largest first. Equal rates keep insertion order.
    pub fn sorted_desc(&self) -> Vec<(String, f64)> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
        sorted
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, rate)| rate).sum()
    }
}

impl Serialize for RateTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, rate) in &self.entries {
            map.serialize_entry(key, rate)?;
        }
        map.end()
    }
}

impl<'a> FromIterator<(&'a str, f64)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut table = RateTable::new();
        for (key, rate) in iter {
            table.add(key, rate);
        }
        table
    }
}

/// Signed net flow per item, in units per minute.
///
/// Positive entries are demand that is still unmet; negative entries are
/// surplus nobody consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemandLedger {
    rates: RateTable,
}

impl DemandLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger holding a single demand. The entry is kept even if tiny.
    pub fn seeded(item: &str, rate_per_min: f64) -> Self {
        let mut ledger = Self::new();
        ledger.add_flow(item, rate_per_min);
        ledger
    }

    pub fn add_flow(&mut self, item: &str, delta: f64) {
        self.rates.add(item, delta);
    }

    /// Drop every entry whose magnitude is below [`EPSILON`]
    pub fn prune(&mut self) -> usize {
        self.rates.retain(|_, rate| rate.abs() >= EPSILON)
    }

    /// First item, in insertion order, that still has positive demand and a producer.
    pub fn pick_expandable(&self, index: &OutputIndex<'_>) -> Option<&str> {
        self.rates
            .iter()
            .find(|&(item, rate)| rate > EPSILON && index.has_producer(item))
            .map(|(item, _)| item)
    }

    pub fn get(&self, item: &str) -> Option<f64> {
        self.rates.get(item)
    }

    /// Current rate for `item`, zero if absent
    pub fn rate(&self, item: &str) -> f64 {
        self.rates.get(item).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.rates.iter()
    }

    pub fn as_table(&self) -> &RateTable {
        &self.rates
    }

    /// Positive entries, largest first
    pub fn needs(&self) -> Vec<(String, f64)> {
        self.rates
            .sorted_desc()
            .into_iter()
            .filter(|(_, rate)| *rate > 0.0)
            .collect()
    }

    /// Negative entries as absolute values, largest first
    pub fn surpluses(&self) -> Vec<(String, f64)> {
        let mut surplus: Vec<(String, f64)> = self
            .rates
            .iter()
            .filter(|&(_, rate)| rate < 0.0)
            .map(|(item, rate)| (item.to_string(), -rate))
            .collect();
        surplus.sort_by(|a, b| b.1.total_cmp(&a.1));
        surplus
    }
}

impl Serialize for DemandLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rates.serialize(serializer)
    }
}
