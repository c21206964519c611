//! Recipe catalog loading and sanitizing
//!
//! The catalog is a JSON array of loosely typed records, as written by the
//! page extractor. Records flagged with `parse_error` are dropped, missing
//! fields get defaults, and numbers stored as strings are coerced.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{ItemAmount, Recipe, UNKNOWN_DEVICE};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write catalog {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog must be a JSON array of recipe records")]
    NotAnArray,
}

/// Parse catalog JSON into recipes, in file order
pub fn parse_catalog(json: &str) -> Result<Vec<Recipe>, CatalogError> {
    let value: Value = serde_json::from_str(json)?;
    let records = value.as_array().ok_or(CatalogError::NotAnArray)?;
    Ok(sanitize(records))
}

pub fn load_catalog_file(path: &Path) -> Result<Vec<Recipe>, CatalogError> {
    let json = fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let recipes = parse_catalog(&json)?;
    debug!(path = %path.display(), recipes = recipes.len(), "loaded catalog file");
    Ok(recipes)
}

/// Write any serializable record list as pretty JSON
pub fn write_catalog_file<T: serde::Serialize>(path: &Path, records: &[T]) -> Result<(), CatalogError> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json).map_err(|source| CatalogError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Keep the usable records, in order
pub fn sanitize(records: &[Value]) -> Vec<Recipe> {
    let recipes: Vec<Recipe> = records.iter().filter_map(sanitize_record).collect();
    if recipes.len() < records.len() {
        debug!(
            kept = recipes.len(),
            dropped = records.len() - recipes.len(),
            "sanitized catalog"
        );
    }
    recipes
}

fn sanitize_record(record: &Value) -> Option<Recipe> {
    let obj = record.as_object()?;
    if obj.get("parse_error").is_some_and(truthy) {
        return None;
    }

    let Some(slug) = obj.get("slug").and_then(coerce_string) else {
        warn!("dropping catalog record without slug");
        return None;
    };

    let crafting_s = obj.get("crafting_s").and_then(coerce_number);
    let Some(crafting_s) = crafting_s.filter(|s| s.is_finite() && *s > 0.0) else {
        warn!(%slug, "dropping recipe without a positive crafting time");
        return None;
    };

    Some(Recipe {
        name: obj.get("name").and_then(coerce_string).unwrap_or_else(|| slug.clone()),
        device: obj
            .get("device")
            .and_then(coerce_string)
            .unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
        crafting_s,
        inputs: item_amounts(&slug, obj.get("inputs")),
        outputs: item_amounts(&slug, obj.get("outputs")),
        url: obj.get("url").filter(|v| truthy(v)).and_then(coerce_string),
        slug,
    })
}

fn item_amounts(slug: &str, value: Option<&Value>) -> Vec<ItemAmount> {
    let Some(list) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|entry| {
            let item = entry.get("item").and_then(coerce_string)?;
            match entry.get("amount").and_then(coerce_number) {
                Some(amount) if amount.is_finite() && amount > 0.0 => Some(ItemAmount { item, amount }),
                _ => {
                    warn!(%slug, %item, "dropping item entry without a positive amount");
                    None
                }
            }
        })
        .collect()
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Every item mentioned by any recipe, sorted for display
pub fn item_list(recipes: &[Recipe]) -> Vec<String> {
    let mut items: Vec<String> = recipes
        .iter()
        .flat_map(|r| r.inputs.iter().chain(&r.outputs))
        .map(|io| io.item.clone())
        .collect();
    items.sort_by(|a, b| display_order(a, b));
    items.dedup();
    items
}

/// Recipe count per device, ordered by device name
pub fn device_counts(recipes: &[Recipe]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for recipe in recipes {
        *counts.entry(recipe.device.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(device, count)| (device.to_string(), count))
        .collect()
}

/// Case-insensitive alphabetical order, ties broken by the raw string
pub fn display_order(a: &str, b: &str) -> Ordering {
    let fold = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<String>();
    fold(a).cmp(&fold(b)).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"name": "Iron Bar", "slug": "iron-bar", "device": "smelter", "crafting_s": 2,
         "inputs": [{"item": "iron ore", "amount": 2}],
         "outputs": [{"item": "iron bar", "amount": 1}],
         "url": "https://alchemy-factory-codex.com/recipe/iron-bar/"},
        {"url": "https://alchemy-factory-codex.com/recipe/broken/", "slug": "broken", "parse_error": true, "reason": "no outputs"},
        null,
        {"slug": "plank", "crafting_s": "3", "outputs": [{"item": "Plank", "amount": "4"}]},
        {"slug": "no-time", "outputs": [{"item": "x", "amount": 1}]},
        {"name": 7, "slug": 42, "crafting_s": 1.5,
         "inputs": [{"item": "water", "amount": 0}, {"item": "sand", "amount": 1}],
         "outputs": [{"item": "glass", "amount": 1}]}
    ]"#;

    #[test]
    fn test_parse_catalog_keeps_usable_records_in_order() {
        let recipes = parse_catalog(SAMPLE).unwrap();
        let slugs: Vec<&str> = recipes.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["iron-bar", "plank", "42"]);
    }

    #[test]
    fn test_defaults_and_coercion() {
        let recipes = parse_catalog(SAMPLE).unwrap();

        let plank = &recipes[1];
        assert_eq!(plank.name, "plank");
        assert_eq!(plank.device, UNKNOWN_DEVICE);
        assert_eq!(plank.crafting_s, 3.0);
        assert!(plank.inputs.is_empty());
        assert_eq!(plank.outputs, vec![ItemAmount::new("Plank", 4.0)]);
        assert_eq!(plank.url, None);

        let glass = &recipes[2];
        assert_eq!(glass.name, "7");
        assert_eq!(glass.inputs, vec![ItemAmount::new("sand", 1.0)]);

        assert_eq!(
            recipes[0].url.as_deref(),
            Some("https://alchemy-factory-codex.com/recipe/iron-bar/")
        );
    }

    #[test]
    fn test_non_array_catalog_is_rejected() {
        assert!(matches!(parse_catalog(r#"{"slug": "x"}"#), Err(CatalogError::NotAnArray)));
        assert!(matches!(parse_catalog("not json"), Err(CatalogError::Json(_))));
    }

    #[test]
    fn test_item_list_is_sorted_case_insensitively() {
        let recipes = parse_catalog(SAMPLE).unwrap();
        assert_eq!(
            item_list(&recipes),
            vec!["glass", "iron bar", "iron ore", "Plank", "sand"]
        );
    }

    #[test]
    fn test_display_order_breaks_ties() {
        assert_eq!(display_order("apple", "Banana"), Ordering::Less);
        assert_eq!(display_order("Apple", "apple"), Ordering::Less);
        assert_eq!(display_order("x", "x"), Ordering::Equal);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipes.json");
        let recipes = parse_catalog(SAMPLE).unwrap();

        write_catalog_file(&path, &recipes).unwrap();
        assert_eq!(load_catalog_file(&path).unwrap(), recipes);

        let missing = dir.path().join("missing.json");
        assert!(matches!(load_catalog_file(&missing), Err(CatalogError::Read { .. })));
    }

    #[test]
    fn test_device_counts_sorted_by_device() {
        let recipes = parse_catalog(SAMPLE).unwrap();
        assert_eq!(
            device_counts(&recipes),
            vec![
                ("smelter".to_string(), 1),
                (UNKNOWN_DEVICE.to_string(), 2),
            ]
        );
        assert!(device_counts(&[]).is_empty());
    }
}
