//! SweetSaas pricing calculator
//!
//! Catalog and pricing tool for confectionery vendors: ingredient and
//! recipe costing, product pricing by margin or by price, and a margin report.

mod catalog;
mod config;
mod db;
mod error;
mod input;
mod models;
mod pricing;
mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Config;
use crate::input::{parse_amount, parse_count};
use crate::pricing::{PriceEditor, PricePolicy, RecipePricingInput};

#[derive(Parser)]
#[command(name = "sweet-pricing")]
#[command(about = "Cost and pricing calculator for confectionery vendors")]
struct Cli {
    /// Path to the SQLite database (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Replace the catalog with a built-in sample
    LoadSample,

    /// Import catalog definitions from a directory of TOML files
    Import {
        /// Directory to scan for *.toml files
        dir: PathBuf,

        /// Clear existing catalog before importing
        #[arg(long)]
        clear: bool,
    },

    /// List ingredients with their cost per unit
    Ingredients,

    /// List packaging materials
    Packages,

    /// List monthly fixed costs
    FixedCosts,

    /// List recipes with batch and per-serving cost
    Recipes,

    /// List products with their stored price
    Products,

    /// Show the cost breakdown of a recipe
    Recipe {
        name: String,
    },

    /// Show a product's lines, stored snapshot and current cost
    Product {
        name: String,
    },

    /// Price a batch from a total cost, without touching the catalog
    Quote {
        /// Total cost of the batch
        total_cost: String,

        /// Sellable units in the batch; repeat to compare batch sizes
        #[arg(short, long = "yield", default_value = "1")]
        yield_amount: Vec<String>,

        /// Re-quote at this cost, keeping whichever of margin or price was given
        #[arg(long)]
        new_cost: Option<String>,

        /// Profit margin in percent
        #[arg(short, long, allow_hyphen_values = true, conflicts_with = "price")]
        margin: Option<String>,

        /// Final batch price; the margin is derived from it
        #[arg(short, long)]
        price: Option<String>,
    },

    /// Price a recipe batch with labor, packaging and fixed costs
    Price {
        recipe: String,

        #[arg(long, default_value = "0")]
        labor_minutes: String,

        /// Packaging cost for the whole batch
        #[arg(long, default_value = "0")]
        packaging_cost: String,

        /// Sellable units in the batch (defaults to the recipe's servings)
        #[arg(short, long = "yield")]
        yield_amount: Option<String>,

        #[arg(short, long, allow_hyphen_values = true, conflicts_with = "price")]
        margin: Option<String>,

        #[arg(short, long)]
        price: Option<String>,

        /// Store the result as a pricing record
        #[arg(long)]
        save: bool,
    },

    /// Refresh stored product prices from current catalog costs
    Reprice,

    /// Margin report over all products
    Report,

    /// Stored pricing records for a recipe, newest first
    PricingHistory {
        recipe: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Resolve which of margin/price drives the recompute
fn policy_from_args(margin: Option<String>, price: Option<String>, cfg: &Config) -> (PricePolicy, f64) {
    match (margin, price) {
        (_, Some(price)) => (PricePolicy::Price, parse_amount(&price)),
        (Some(margin), None) => (PricePolicy::Margin, parse_amount(&margin)),
        (None, None) => (PricePolicy::Margin, cfg.pricing.default_margin),
    }
}

fn below_cost_marker(price: f64, cost: f64) -> &'static str {
    if price < cost { "  ! below cost" } else { "" }
}

fn print_quote(editor: &PriceEditor, cfg: &Config) {
    let (margin_tag, price_tag) = match editor.last_edited() {
        PricePolicy::Margin => ("", " (derived)"),
        PricePolicy::Price => (" (derived)", ""),
    };
    println!("Total cost:   {}", cfg.money(editor.total_cost()));
    println!("Margin:       {:.2}%{}", editor.profit_margin(), margin_tag);
    println!(
        "Final price:  {}{}{}",
        cfg.money(editor.final_price()),
        price_tag,
        below_cost_marker(editor.final_price(), editor.total_cost())
    );
    print_unit_figures(editor, cfg);
}

fn print_unit_figures(editor: &PriceEditor, cfg: &Config) {
    if editor.yield_amount() == 0 {
        println!("Yield is zero; unit figures not computed.");
        return;
    }
    println!("Unit cost:    {}", cfg.money(editor.unit_cost()));
    println!("Unit price:   {}", cfg.money(editor.unit_price()));
    println!("Profit/unit:  {}", cfg.money(editor.profit_per_unit()));
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        cfg.database = database;
    }
    debug!(database = %cfg.database.display(), "opening database");

    let conn = Connection::open(&cfg.database)
        .with_context(|| format!("Failed to open {}", cfg.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cfg.database.display());
        }

        Commands::LoadSample => {
            let stats = catalog::load_sample(&conn, cfg.pricing.default_margin)?;
            println!("Sample data loaded successfully!");
            println!("{}", stats);
        }

        Commands::Import { dir, clear } => {
            if clear {
                println!("Clearing existing catalog...");
                db::clear_catalog(&conn)?;
            }
            let stats = catalog::import_directory(&conn, &dir, cfg.pricing.default_margin)?;
            println!("{}", stats);
        }

        Commands::Ingredients => {
            let ingredients = db::list_ingredients(&conn)?;
            if ingredients.is_empty() {
                println!("No ingredients in database. Run 'import' or 'load-sample' first.");
            } else {
                println!(
                    "{:<25} {:>12} {:>10} {:>14}",
                    "Ingredient", "Package", "Amount", "Cost/unit"
                );
                println!("{}", "-".repeat(64));
                for i in ingredients {
                    println!(
                        "{:<25} {:>12} {:>7} {:<2} {:>14}",
                        i.name,
                        cfg.money(i.package_cost),
                        i.package_amount,
                        i.unit,
                        format!("{}{:.4}/{}", cfg.currency, i.cost_per_unit(), i.unit)
                    );
                }
            }
        }

        Commands::Packages => {
            let packages = db::list_packages(&conn)?;
            if packages.is_empty() {
                println!("No packages in database.");
            } else {
                for p in packages {
                    println!("  {:<30} {:>10}", p.name, cfg.money(p.unit_cost));
                }
            }
        }

        Commands::FixedCosts => {
            let costs = db::list_fixed_costs(&conn)?;
            for c in &costs {
                println!("  {:<30} {:>10}", c.name, cfg.money(c.monthly_amount));
            }
            let total = db::fixed_costs_total(&conn)?;
            println!("Monthly total: {}", cfg.money(total));
            println!(
                "Share per priced batch ({:.1}%): {}",
                cfg.pricing.allocation_rate * 100.0,
                cfg.money(pricing::fixed_costs_share(total, cfg.pricing.allocation_rate))
            );
        }

        Commands::Recipes => {
            let recipes = db::list_recipes(&conn)?;
            if recipes.is_empty() {
                println!("No recipes in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<30} {:>9} {:>12} {:>12}", "Recipe", "Servings", "Batch", "Serving");
                println!("{}", "-".repeat(66));
                for r in recipes {
                    println!(
                        "{:<30} {:>9} {:>12} {:>12}",
                        r.name,
                        r.servings,
                        cfg.money(r.total_cost()),
                        cfg.money(r.cost_per_unit())
                    );
                }
            }
        }

        Commands::Products => {
            let products = db::list_products(&conn)?;
            if products.is_empty() {
                println!("No products in database. Run 'import' or 'load-sample' first.");
            } else {
                for p in products {
                    println!(
                        "  {:<30} cost {:>10}  price {:>10}  margin {:>6.1}%{}",
                        p.name,
                        cfg.money(p.total_cost),
                        cfg.money(p.price),
                        p.profit_margin,
                        below_cost_marker(p.price, p.total_cost)
                    );
                }
            }
        }

        Commands::Recipe { name } => {
            let recipe = db::get_recipe(&conn, &name)?;
            println!("Recipe: {} ({} servings)", recipe.name, recipe.servings);
            for item in &recipe.items {
                println!(
                    "  {:<25} {:>8} {:<2} x {}{:.4} = {}",
                    item.ingredient_name,
                    item.amount,
                    item.unit,
                    cfg.currency,
                    item.cost_per_unit,
                    cfg.money(item.cost())
                );
            }
            println!("Batch cost:   {}", cfg.money(recipe.total_cost()));
            println!("Serving cost: {}", cfg.money(recipe.cost_per_unit()));
        }

        Commands::Product { name } => {
            let product = db::get_product(&conn, &name)?;
            println!("Product: {}", product.name);
            for line in &product.recipes {
                println!(
                    "  {} x {} @ {}",
                    line.quantity,
                    line.recipe_name,
                    cfg.money(line.cost_per_unit)
                );
            }
            for line in &product.packages {
                println!(
                    "  {} x {} @ {}",
                    line.quantity,
                    line.package_name,
                    cfg.money(line.unit_cost)
                );
            }

            let authority = match product.policy {
                PricePolicy::Margin => "margin",
                PricePolicy::Price => "price",
            };
            println!("Stored cost:   {}", cfg.money(product.total_cost));
            println!(
                "Stored price:  {}{}",
                cfg.money(product.price),
                below_cost_marker(product.price, product.total_cost)
            );
            println!("Stored margin: {:.1}% (set by {})", product.profit_margin, authority);

            let current =
                pricing::compute_product_cost(&product.recipe_lines(), &product.package_lines());
            if (current - product.total_cost).abs() > 0.005 {
                println!(
                    "Current cost:  {} (snapshot is stale, run 'reprice')",
                    cfg.money(current)
                );
            }
        }

        Commands::Quote {
            total_cost,
            yield_amount,
            new_cost,
            margin,
            price,
        } => {
            let total_cost = input::parse_cost("total cost", &total_cost)?;
            let yields: Vec<u32> = yield_amount.iter().map(|y| parse_count(y)).collect();
            let first_yield = yields.first().copied().unwrap_or(1);
            let mut editor = PriceEditor::new(total_cost, first_yield, cfg.pricing.default_margin);
            match policy_from_args(margin, price, &cfg) {
                (PricePolicy::Margin, margin) => editor.edit_margin(margin),
                (PricePolicy::Price, price) => editor.edit_price(price),
            }
            print_quote(&editor, &cfg);

            if let Some(new_cost) = new_cost {
                editor.set_total_cost(input::parse_cost("new cost", &new_cost)?);
                println!();
                println!("At the new cost:");
                print_quote(&editor, &cfg);
            }

            for &y in yields.iter().skip(1) {
                editor.set_yield(y);
                println!();
                println!("Yield {}:", y);
                print_unit_figures(&editor, &cfg);
            }
        }

        Commands::Price {
            recipe,
            labor_minutes,
            packaging_cost,
            yield_amount,
            margin,
            price,
            save,
        } => {
            let recipe = db::get_recipe(&conn, &recipe)?;
            let (policy, value) = policy_from_args(margin, price, &cfg);
            let input = RecipePricingInput {
                recipe_cost: recipe.total_cost(),
                labor_minutes: input::parse_cost("labor minutes", &labor_minutes)?,
                hourly_rate: cfg.pricing.hourly_labor_rate,
                packaging_cost: input::parse_cost("packaging cost", &packaging_cost)?,
                fixed_costs_monthly_total: db::fixed_costs_total(&conn)?,
                allocation_rate: cfg.pricing.allocation_rate,
                policy,
                profit_margin: value,
                final_price: value,
                yield_amount: yield_amount
                    .as_deref()
                    .map(parse_count)
                    .unwrap_or(recipe.servings),
            };
            let result = pricing::compute_recipe_pricing(&input);

            println!("=== Pricing: {} ===", recipe.name);
            println!("Ingredients:        {}", cfg.money(input.recipe_cost));
            println!(
                "Labor ({} min):     {}",
                input.labor_minutes,
                cfg.money(result.labor_cost)
            );
            println!("Packaging:          {}", cfg.money(input.packaging_cost));
            println!("Fixed costs share:  {}", cfg.money(result.fixed_costs_share));
            println!("Total cost:         {}", cfg.money(result.total_cost));
            println!("Margin:             {:.2}%", result.profit_margin);
            println!(
                "Final price:        {}{}",
                cfg.money(result.final_price),
                if result.is_below_cost() { "  ! below cost" } else { "" }
            );
            println!("Yield:              {}", input.yield_amount);
            if input.yield_amount > 0 {
                println!("Unit cost:          {}", cfg.money(result.unit_cost));
                println!("Unit price:         {}", cfg.money(result.unit_price));
                println!("Profit/unit:        {}", cfg.money(result.profit_per_unit));
            }

            if save {
                let id = db::insert_pricing_record(&conn, recipe.id, &input, &result)?;
                println!("Saved pricing record #{}", id);
            }
        }

        Commands::Reprice => {
            let changed = db::reprice_products(&conn)?;
            println!("Repriced {} products", changed);
        }

        Commands::Report => {
            let products = db::list_products(&conn)?;
            println!("{}", report::margin_report(&products, &cfg.currency));
        }

        Commands::PricingHistory { recipe } => {
            let recipe = db::get_recipe(&conn, &recipe)?;
            let records = db::list_pricing_records(&conn, recipe.id)?;
            if records.is_empty() {
                println!("No pricing records for {}. Use 'price --save' first.", recipe.name);
            } else {
                for r in records {
                    println!(
                        "#{} {}  yield {}",
                        r.id,
                        r.created_at.format("%Y-%m-%d %H:%M"),
                        r.yield_amount
                    );
                    println!(
                        "  labor {} min = {}  packaging {}  fixed share {}",
                        r.labor_minutes,
                        cfg.money(r.labor_cost),
                        cfg.money(r.packaging_cost),
                        cfg.money(r.fixed_costs_share)
                    );
                    println!(
                        "  cost {}  margin {:.1}%  price {}{}",
                        cfg.money(r.total_cost),
                        r.profit_margin,
                        cfg.money(r.final_price),
                        below_cost_marker(r.final_price, r.total_cost)
                    );
                    if r.yield_amount > 0 {
                        println!(
                            "  unit cost {}  unit price {}",
                            cfg.money(r.unit_cost),
                            cfg.money(r.unit_price)
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
