//! Alchemy Factory Production Planner
//!
//! A production chain planner for Alchemy Factory recipe catalogs.

use std::path::{Path, PathBuf};

use alchemy_planner::calculator::{self, PlanSummary};
use alchemy_planner::index::OutputIndex;
use alchemy_planner::models::{DEFAULT_MAX_STEPS, Recipe};
use alchemy_planner::params::{self, PlannerParams, TargetMode};
use alchemy_planner::{catalog, db, extract, logging};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rusqlite::Connection;

#[derive(Parser)]
#[command(name = "alchemy-planner")]
#[command(about = "Production chain planner for Alchemy Factory")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "alchemy_data.db")]
    database: PathBuf,

    /// Read recipes from a recipes.json file instead of the database
    #[arg(short, long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a recipes.json catalog into the database
    Import {
        /// Path to recipes.json
        file: PathBuf,

        /// Clear existing recipes before importing
        #[arg(long)]
        clear: bool,
    },

    /// Extract recipes from saved codex recipe pages
    Extract {
        /// Directory containing one HTML page per recipe
        pages_dir: PathBuf,

        /// Write the extracted records to this recipes.json
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Also import the extracted recipes into the database
        #[arg(long)]
        import: bool,

        /// Clear existing recipes before importing
        #[arg(long)]
        clear: bool,
    },

    /// Plan the production chain for a target item
    Plan {
        /// Target item (e.g., "iron bar")
        item: Option<String>,

        /// Restore item, mode and target from a shared query string
        #[arg(short, long, conflicts_with = "item")]
        query: Option<String>,

        /// Whether the target is units/min or a device count
        #[arg(short, long, value_enum)]
        mode: Option<TargetMode>,

        /// Target value (default 2)
        #[arg(short, long)]
        target: Option<f64>,

        /// Factory efficiency bonus in percent
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        factory: f64,

        /// Fuel efficiency bonus in percent
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        fuel: f64,

        /// Fertilizer efficiency bonus in percent
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        fertilizer: f64,

        /// Pin the recipe for an item, as item=recipe-slug (repeatable)
        #[arg(short, long)]
        pin: Vec<String>,

        /// Expansion steps before giving up on a cyclic chain
        #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
        max_steps: usize,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,

        /// Show runs per minute for every recipe used
        #[arg(short, long)]
        verbose: bool,
    },

    /// List all items in the catalog
    Items,

    /// List recipes, optionally only those producing an item
    Recipes {
        item: Option<String>,
    },

    /// Show details for a specific recipe
    Recipe {
        /// Recipe slug
        slug: String,
    },

    /// List devices and how many recipes each runs
    Devices,

    /// Print a shareable query string for a plan
    Link {
        item: String,

        #[arg(short, long, value_enum, default_value_t = TargetMode::Rate)]
        mode: TargetMode,

        #[arg(short, long, default_value_t = params::DEFAULT_TARGET)]
        target: f64,
    },

    /// Initialize empty database with schema
    Init,

    /// Load a small sample catalog for testing (without codex pages)
    LoadSample,
}

fn main() -> Result<()> {
    logging::init("warn");
    let cli = Cli::parse();

    match cli.command {
        Commands::Import { ref file, clear } => {
            let recipes = catalog::load_catalog_file(file)?;
            let mut conn = open_database(&cli.database)?;
            if clear {
                println!("Clearing existing recipes...");
                db::clear_catalog(&conn)?;
            }
            let count = db::import_catalog(&mut conn, &recipes)?;
            println!("Imported {} recipes into {}", count, cli.database.display());
        }

        Commands::Extract {
            ref pages_dir,
            ref out,
            import,
            clear,
        } => {
            let (records, stats) = extract::extract_catalog(pages_dir)?;

            if let Some(out) = out {
                catalog::write_catalog_file(out, &records)?;
                println!("Wrote {}", out.display());
            }

            if import {
                let recipes: Vec<Recipe> = records.iter().filter_map(|r| r.recipe().cloned()).collect();
                let mut conn = open_database(&cli.database)?;
                if clear {
                    db::clear_catalog(&conn)?;
                }
                db::import_catalog(&mut conn, &recipes)?;
            }

            println!("\n{}", stats);
        }

        Commands::Plan {
            ref item,
            ref query,
            mode,
            target,
            factory,
            fuel,
            fertilizer,
            ref pin,
            max_steps,
            json,
            verbose,
        } => {
            let recipes = load_recipes(&cli)?;
            let items = catalog::item_list(&recipes);

            let mut params = match (item, query) {
                (_, Some(query)) => PlannerParams::decode(query, &items)
                    .context("Catalog has no items. Run 'import' or 'load-sample' first.")?,
                (Some(item), None) => PlannerParams::new(item.as_str()),
                (None, None) => bail!("Give a target item or --query"),
            };
            if let Some(mode) = mode {
                params.mode = mode;
            }
            if let Some(target) = target {
                params.target = target;
            }
            params.factory_pct = factory;
            params.fuel_pct = fuel;
            params.fertilizer_pct = fertilizer;
            for pin in pin {
                let (item, slug) = params::parse_pin(pin)?;
                params.recipe_choice.insert(item, slug);
            }

            if !items.contains(&params.item) {
                println!("Item '{}' is not in the catalog", params.item);
                return Ok(());
            }

            let config = params.config().with_max_steps(max_steps);
            let Some(plan) = calculator::plan(&params, &config, &recipes) else {
                println!("No recipe produces '{}'; it is a raw resource.", params.item);
                return Ok(());
            };

            let summary = PlanSummary::from_plan(&plan);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary);
                if verbose {
                    println!("Recipe runs:");
                    print!("{}", calculator::format_recipe_runs(&plan, &recipes));
                    if !plan.result.is_success() {
                        let index = OutputIndex::build(&recipes);
                        println!("Unresolved: {}", plan.result.unresolved(&index).join(", "));
                    }
                }
                println!("Link: ?{}", params.encode());
            }
        }

        Commands::Items => {
            let recipes = load_recipes(&cli)?;
            let items = catalog::item_list(&recipes);
            if items.is_empty() {
                println!("No items in catalog. Run 'import' or 'load-sample' first.");
            } else {
                let index = OutputIndex::build(&recipes);
                for item in items {
                    let marker = if index.has_producer(&item) { "" } else { " (raw)" };
                    println!("  {}{}", item, marker);
                }
            }
        }

        Commands::Recipes { ref item } => {
            let recipes = load_recipes(&cli)?;
            let index = OutputIndex::build(&recipes);

            let listed: Vec<&Recipe> = match item {
                Some(item) => index.producers(item).iter().map(|p| p.recipe).collect(),
                None => recipes.iter().collect(),
            };

            if listed.is_empty() {
                println!("No recipes found");
            } else {
                println!("{:<4} {:<32} {:<24} {:>8}", "#", "Recipe", "Device", "Time (s)");
                println!("{}", "-".repeat(71));
                for (i, r) in listed.iter().enumerate() {
                    println!("{:<4} {:<32} {:<24} {:>8}", i + 1, r.slug, r.device, r.crafting_s);
                }
            }
        }

        Commands::Recipe { ref slug } => {
            let recipe = match &cli.catalog {
                Some(_) => load_recipes(&cli)?.into_iter().find(|r| &r.slug == slug),
                None => db::get_recipe(&open_database(&cli.database)?, slug)?,
            };

            if let Some(r) = recipe {
                println!("Recipe: {}", r.name);
                println!("  Slug: {}", r.slug);
                println!("  Device: {}", r.device);
                println!("  Crafting time: {}s", r.crafting_s);
                if let Some(url) = &r.url {
                    println!("  URL: {}", url);
                }
                if !r.inputs.is_empty() {
                    println!("  Inputs:");
                    for i in &r.inputs {
                        println!("    {} × {}", i.amount, i.item);
                    }
                }
                if !r.outputs.is_empty() {
                    println!("  Outputs:");
                    for o in &r.outputs {
                        println!("    {} × {}", o.amount, o.item);
                    }
                }
            } else {
                println!("Recipe '{}' not found", slug);
            }
        }

        Commands::Devices => {
            let devices = match &cli.catalog {
                Some(_) => catalog::device_counts(&load_recipes(&cli)?),
                None => db::list_devices(&open_database(&cli.database)?)?,
            };
            if devices.is_empty() {
                println!("No recipes in catalog. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<30} {:>8}", "Device", "Recipes");
                println!("{}", "-".repeat(39));
                for (device, count) in devices {
                    println!("{:<30} {:>8}", device, count);
                }
            }
        }

        Commands::Link {
            ref item,
            mode,
            target,
        } => {
            let mut params = PlannerParams::new(item.as_str());
            params.mode = mode;
            params.target = target;
            println!("?{}", params.encode());
        }

        Commands::Init => {
            open_database(&cli.database)?;
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            let mut conn = open_database(&cli.database)?;
            db::clear_catalog(&conn)?;
            let count = db::import_catalog(&mut conn, &sample_catalog())?;
            println!("Loaded {} sample recipes", count);
        }
    }

    Ok(())
}

fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn load_recipes(cli: &Cli) -> Result<Vec<Recipe>> {
    match &cli.catalog {
        Some(path) => Ok(catalog::load_catalog_file(path)?),
        None => db::load_catalog(&open_database(&cli.database)?),
    }
}

/// Small Alchemy Factory style catalog for trying the planner out
fn sample_catalog() -> Vec<Recipe> {
    vec![
        Recipe::new("logs", "lumber mill", 4.0)
            .with_name("Logs")
            .with_output("logs", 2.0),
        Recipe::new("planks", "sawmill", 3.0)
            .with_name("Planks")
            .with_input("logs", 1.0)
            .with_output("planks", 2.0)
            .with_output("sawdust", 1.0),
        Recipe::new("charcoal", "kiln", 8.0)
            .with_name("Charcoal")
            .with_input("logs", 2.0)
            .with_output("charcoal", 1.0),
        Recipe::new("charcoal-from-sawdust", "kiln", 10.0)
            .with_name("Charcoal (Sawdust)")
            .with_input("sawdust", 4.0)
            .with_output("charcoal", 1.0),
        Recipe::new("copper-ingot", "stone furnace", 6.0)
            .with_name("Copper Ingot")
            .with_input("copper ore", 2.0)
            .with_input("charcoal", 1.0)
            .with_output("copper ingot", 1.0),
        Recipe::new("bronze-ingot", "crucible", 12.0)
            .with_name("Bronze Ingot")
            .with_input("copper ingot", 3.0)
            .with_input("tin ore", 1.0)
            .with_input("charcoal", 2.0)
            .with_output("bronze ingot", 2.0)
            .with_output("slag", 1.0),
        Recipe::new("healing-potion", "alembic", 15.0)
            .with_name("Healing Potion")
            .with_input("planks", 1.0)
            .with_input("bronze ingot", 1.0)
            .with_input("water", 5.0)
            .with_output("healing potion", 3.0),
    ]
}
