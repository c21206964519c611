//! Lookup from item to the recipes that produce it

use std::collections::HashMap;

use crate::models::Recipe;

/// One recipe able to produce an item, with how much of it a single run yields
#[derive(Debug, Clone, Copy)]
pub struct Producer<'a> {
    pub recipe: &'a Recipe,
    pub output_amount: f64,
}

/// Producers per item, in catalog order.
///
/// A recipe only ever lands in the list of an item it outputs, and the
/// per-run amount is captured while indexing, so selecting a producer can
/// never miss its own output.
#[derive(Debug, Clone, Default)]
pub struct OutputIndex<'a> {
    producers: HashMap<&'a str, Vec<Producer<'a>>>,
    items: Vec<&'a str>,
}

impl<'a> OutputIndex<'a> {
    pub fn build(recipes: &'a [Recipe]) -> Self {
        let mut producers: HashMap<&'a str, Vec<Producer<'a>>> = HashMap::new();
        let mut items = Vec::new();

        for recipe in recipes {
            for output in &recipe.outputs {
                let list = producers.entry(output.item.as_str()).or_insert_with(|| {
                    items.push(output.item.as_str());
                    Vec::new()
                });

                // Same item listed twice by one recipe: the first amount wins.
                if list.last().is_some_and(|p| std::ptr::eq(p.recipe, recipe)) {
                    continue;
                }

                list.push(Producer {
                    recipe,
                    output_amount: output.amount,
                });
            }
        }

        Self { producers, items }
    }

    /// Producers of `item` in catalog order; empty for raw resources
    pub fn producers(&self, item: &str) -> &[Producer<'a>] {
        self.producers.get(item).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_producer(&self, item: &str) -> bool {
        self.producers.contains_key(item)
    }

    /// Choose the recipe used to make `item`.
    ///
    /// A pin wins when it names one of the producers; anything else falls
    /// back to the first producer in catalog order.
    pub fn select(&self, item: &str, pins: &HashMap<String, String>) -> Option<Producer<'a>> {
        let candidates = self.producers.get(item)?;
        pins.get(item)
            .and_then(|slug| candidates.iter().find(|p| p.recipe.slug == *slug))
            .or_else(|| candidates.first())
            .copied()
    }

    /// Producible items, in the order they were first seen
    pub fn items(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.items.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
