//! Database schema and operations

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::models::{ItemAmount, Recipe};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Recipes in catalog order; position decides the default producer
        CREATE TABLE IF NOT EXISTS recipes (
            position INTEGER PRIMARY KEY AUTOINCREMENT,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            device TEXT NOT NULL,
            crafting_s REAL NOT NULL,
            url TEXT
        );

        -- What a recipe consumes per run
        CREATE TABLE IF NOT EXISTS recipe_inputs (
            recipe_slug TEXT NOT NULL,
            position INTEGER NOT NULL,
            item TEXT NOT NULL,
            amount REAL NOT NULL,
            PRIMARY KEY (recipe_slug, position)
        );

        -- What a recipe produces per run
        CREATE TABLE IF NOT EXISTS recipe_outputs (
            recipe_slug TEXT NOT NULL,
            position INTEGER NOT NULL,
            item TEXT NOT NULL,
            amount REAL NOT NULL,
            PRIMARY KEY (recipe_slug, position)
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_outputs_item ON recipe_outputs(item);
        "#,
    )?;
    Ok(())
}

/// Insert a recipe, or replace one with the same slug while keeping its position
pub fn insert_recipe(conn: &Connection, recipe: &Recipe) -> Result<()> {
    conn.execute(
        "INSERT INTO recipes (slug, name, device, crafting_s, url)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(slug) DO UPDATE SET
            name = excluded.name,
            device = excluded.device,
            crafting_s = excluded.crafting_s,
            url = excluded.url",
        (
            &recipe.slug,
            &recipe.name,
            &recipe.device,
            recipe.crafting_s,
            &recipe.url,
        ),
    )
    .with_context(|| format!("Failed to store recipe {}", recipe.slug))?;

    conn.execute("DELETE FROM recipe_inputs WHERE recipe_slug = ?1", [&recipe.slug])?;
    conn.execute("DELETE FROM recipe_outputs WHERE recipe_slug = ?1", [&recipe.slug])?;

    for (position, input) in recipe.inputs.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_inputs (recipe_slug, position, item, amount)
             VALUES (?1, ?2, ?3, ?4)",
            (&recipe.slug, position as i64, &input.item, input.amount),
        )?;
    }
    for (position, output) in recipe.outputs.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_outputs (recipe_slug, position, item, amount)
             VALUES (?1, ?2, ?3, ?4)",
            (&recipe.slug, position as i64, &output.item, output.amount),
        )?;
    }
    Ok(())
}

/// Store a whole catalog in one transaction
pub fn import_catalog(conn: &mut Connection, recipes: &[Recipe]) -> Result<usize> {
    let tx = conn.transaction()?;
    for recipe in recipes {
        insert_recipe(&tx, recipe)?;
    }
    tx.commit()?;

    info!(recipes = recipes.len(), "imported catalog");
    Ok(recipes.len())
}

/// Clear all recipes (for re-import)
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM recipe_outputs;
        DELETE FROM recipe_inputs;
        DELETE FROM recipes;
        "#,
    )?;
    Ok(())
}

/// Load every recipe in catalog order
pub fn load_catalog(conn: &Connection) -> Result<Vec<Recipe>> {
    let mut stmt = conn.prepare(
        "SELECT slug, name, device, crafting_s, url FROM recipes ORDER BY position",
    )?;

    let rows = stmt.query_map([], recipe_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        let mut recipe = row?;
        load_item_amounts(conn, &mut recipe)?;
        results.push(recipe);
    }
    Ok(results)
}

/// Get a single recipe by slug
pub fn get_recipe(conn: &Connection, slug: &str) -> Result<Option<Recipe>> {
    let recipe = conn
        .query_row(
            "SELECT slug, name, device, crafting_s, url FROM recipes WHERE slug = ?1",
            [slug],
            recipe_from_row,
        )
        .optional()?;

    match recipe {
        Some(mut recipe) => {
            load_item_amounts(conn, &mut recipe)?;
            Ok(Some(recipe))
        }
        None => Ok(None),
    }
}

/// List devices with how many recipes run on each
pub fn list_devices(conn: &Connection) -> Result<Vec<(String, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT device, COUNT(*) FROM recipes GROUP BY device ORDER BY device",
    )?;

    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

fn recipe_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipe> {
    Ok(Recipe {
        slug: row.get(0)?,
        name: row.get(1)?,
        device: row.get(2)?,
        crafting_s: row.get(3)?,
        url: row.get(4)?,
        inputs: Vec::new(),
        outputs: Vec::new(),
    })
}

fn load_item_amounts(conn: &Connection, recipe: &mut Recipe) -> Result<()> {
    recipe.inputs = query_item_amounts(
        conn,
        "SELECT item, amount FROM recipe_inputs WHERE recipe_slug = ?1 ORDER BY position",
        &recipe.slug,
    )?;
    recipe.outputs = query_item_amounts(
        conn,
        "SELECT item, amount FROM recipe_outputs WHERE recipe_slug = ?1 ORDER BY position",
        &recipe.slug,
    )?;
    Ok(())
}

fn query_item_amounts(conn: &Connection, sql: &str, slug: &str) -> Result<Vec<ItemAmount>> {
    let mut stmt = conn.prepare_cached(sql)?;

    let rows = stmt.query_map([slug], |row| {
        Ok(ItemAmount {
            item: row.get(0)?,
            amount: row.get(1)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn sample() -> Vec<Recipe> {
        vec![
            Recipe::new("zinc-bar", "smelter", 4.0)
                .with_name("Zinc Bar")
                .with_input("zinc ore", 3.0)
                .with_input("coal", 1.0)
                .with_output("zinc bar", 1.0)
                .with_output("slag", 0.5),
            Recipe::new("coal", "kiln", 6.0)
                .with_input("log", 2.0)
                .with_output("coal", 1.0)
                .with_url("https://alchemy-factory-codex.com/recipe/coal/"),
        ]
    }

    #[test]
    fn test_import_and_load_keep_order() {
        let mut conn = memory_db();
        assert_eq!(import_catalog(&mut conn, &sample()).unwrap(), 2);
        assert_eq!(load_catalog(&conn).unwrap(), sample());
    }

    #[test]
    fn test_reimport_keeps_position_and_replaces_items() {
        let mut conn = memory_db();
        import_catalog(&mut conn, &sample()).unwrap();

        let changed = Recipe::new("zinc-bar", "blast furnace", 2.0).with_output("zinc bar", 2.0);
        import_catalog(&mut conn, std::slice::from_ref(&changed)).unwrap();

        let loaded = load_catalog(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], changed);
        assert_eq!(loaded[1].slug, "coal");
    }

    #[test]
    fn test_get_recipe_and_list_devices() {
        let mut conn = memory_db();
        import_catalog(&mut conn, &sample()).unwrap();

        let coal = get_recipe(&conn, "coal").unwrap().unwrap();
        assert_eq!(coal.inputs, vec![ItemAmount::new("log", 2.0)]);
        assert!(get_recipe(&conn, "missing").unwrap().is_none());

        assert_eq!(
            list_devices(&conn).unwrap(),
            vec![("kiln".to_string(), 1), ("smelter".to_string(), 1)]
        );
        assert_eq!(list_devices(&conn).unwrap(), crate::catalog::device_counts(&sample()));
    }

    #[test]
    fn test_clear_catalog() {
        let mut conn = memory_db();
        import_catalog(&mut conn, &sample()).unwrap();
        clear_catalog(&conn).unwrap();
        assert!(load_catalog(&conn).unwrap().is_empty());
    }
}
