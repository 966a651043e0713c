//! Database schema and catalog persistence
//!
//! Derived costs and prices are written as snapshots alongside the source
//! rows. Reading a product returns what was stored when it was last priced,
//! not a fresh roll-up; see [`reprice_products`] for the explicit refresh.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::debug;

use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    FixedCost, Ingredient, Package, PricingRecord, Product, ProductPackage, ProductRecipe, Recipe,
    RecipeItem, Unit,
};
use crate::pricing::{self, PricePolicy, RecipePricing, RecipePricingInput};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> CatalogResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            unit TEXT NOT NULL,
            package_cost REAL NOT NULL,
            package_amount REAL NOT NULL CHECK (package_amount > 0)
        );

        CREATE TABLE IF NOT EXISTS packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            unit_cost REAL NOT NULL
        );

        -- Monthly overhead (rent, utilities, ...)
        CREATE TABLE IF NOT EXISTS fixed_costs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            monthly_amount REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            servings INTEGER NOT NULL CHECK (servings >= 1)
        );

        CREATE TABLE IF NOT EXISTS recipe_items (
            recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
            amount REAL NOT NULL,
            PRIMARY KEY (recipe_id, position)
        );

        -- total_cost, profit_margin and price are a snapshot
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            total_cost REAL NOT NULL,
            profit_margin REAL NOT NULL,
            price REAL NOT NULL,
            price_policy TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS product_recipes (
            product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            recipe_id INTEGER NOT NULL REFERENCES recipes(id),
            quantity REAL NOT NULL,
            PRIMARY KEY (product_id, position)
        );

        CREATE TABLE IF NOT EXISTS product_packages (
            product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            package_id INTEGER NOT NULL REFERENCES packages(id),
            quantity REAL NOT NULL,
            PRIMARY KEY (product_id, position)
        );

        CREATE TABLE IF NOT EXISTS pricing_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
            labor_minutes REAL NOT NULL,
            packaging_cost REAL NOT NULL,
            profit_margin REAL NOT NULL,
            yield_amount INTEGER NOT NULL,
            labor_cost REAL NOT NULL,
            fixed_costs_share REAL NOT NULL,
            total_cost REAL NOT NULL,
            final_price REAL NOT NULL,
            unit_cost REAL NOT NULL,
            unit_price REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_items_ingredient ON recipe_items(ingredient_id);
        CREATE INDEX IF NOT EXISTS idx_pricing_records_recipe ON pricing_records(recipe_id);
        "#,
    )?;
    Ok(())
}

/// Remove every catalog row (for re-import)
pub fn clear_catalog(conn: &Connection) -> CatalogResult<()> {
    conn.execute_batch(
        r#"
        DELETE FROM pricing_records;
        DELETE FROM product_packages;
        DELETE FROM product_recipes;
        DELETE FROM products;
        DELETE FROM recipe_items;
        DELETE FROM recipes;
        DELETE FROM fixed_costs;
        DELETE FROM packages;
        DELETE FROM ingredients;
        "#,
    )?;
    Ok(())
}

fn policy_to_str(policy: PricePolicy) -> &'static str {
    match policy {
        PricePolicy::Margin => "margin",
        PricePolicy::Price => "price",
    }
}

fn policy_from_str(s: &str) -> PricePolicy {
    if s == "price" {
        PricePolicy::Price
    } else {
        PricePolicy::Margin
    }
}

fn unit_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<Unit> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: CatalogError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> CatalogResult<Vec<T>> {
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Insert an ingredient, or update the one with the same name
pub fn upsert_ingredient(
    conn: &Connection,
    name: &str,
    unit: Unit,
    package_cost: f64,
    package_amount: f64,
) -> CatalogResult<i64> {
    Ingredient::validate(name, package_cost, package_amount)?;
    let id = conn.query_row(
        "INSERT INTO ingredients (name, unit, package_cost, package_amount)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(name) DO UPDATE SET
             unit = excluded.unit,
             package_cost = excluded.package_cost,
             package_amount = excluded.package_amount
         RETURNING id",
        params![name, unit.as_str(), package_cost, package_amount],
        |row| row.get(0),
    )?;
    debug!(ingredient = name, id, "saved ingredient");
    Ok(id)
}

pub fn upsert_package(conn: &Connection, name: &str, unit_cost: f64) -> CatalogResult<i64> {
    if !(unit_cost >= 0.0) {
        return Err(CatalogError::NegativeCost(name.to_string()));
    }
    let id = conn.query_row(
        "INSERT INTO packages (name, unit_cost) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET unit_cost = excluded.unit_cost
         RETURNING id",
        params![name, unit_cost],
        |row| row.get(0),
    )?;
    debug!(package = name, id, "saved package");
    Ok(id)
}

pub fn upsert_fixed_cost(conn: &Connection, name: &str, monthly_amount: f64) -> CatalogResult<i64> {
    if !(monthly_amount >= 0.0) {
        return Err(CatalogError::NegativeCost(name.to_string()));
    }
    let id = conn.query_row(
        "INSERT INTO fixed_costs (name, monthly_amount) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET monthly_amount = excluded.monthly_amount
         RETURNING id",
        params![name, monthly_amount],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Start a transaction unless the caller already holds one
fn begin(conn: &Connection) -> CatalogResult<Option<Transaction<'_>>> {
    if conn.is_autocommit() {
        Ok(Some(conn.unchecked_transaction()?))
    } else {
        Ok(None)
    }
}

fn finish(tx: Option<Transaction<'_>>) -> CatalogResult<()> {
    if let Some(tx) = tx {
        tx.commit()?;
    }
    Ok(())
}

fn lookup_id(conn: &Connection, table: &str, name: &str) -> CatalogResult<Option<i64>> {
    let sql = format!("SELECT id FROM {table} WHERE name = ?1");
    Ok(conn.query_row(&sql, [name], |row| row.get(0)).optional()?)
}

/// List all ingredients ordered by name
pub fn list_ingredients(conn: &Connection) -> CatalogResult<Vec<Ingredient>> {
    let mut stmt = conn.prepare(
        "SELECT name, unit, package_cost, package_amount FROM ingredients ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Ingredient {
            name: row.get(0)?,
            unit: unit_from_row(row, 1)?,
            package_cost: row.get(2)?,
            package_amount: row.get(3)?,
        })
    })?;
    collect(rows)
}

pub fn list_packages(conn: &Connection) -> CatalogResult<Vec<Package>> {
    let mut stmt = conn.prepare("SELECT name, unit_cost FROM packages ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Package {
            name: row.get(0)?,
            unit_cost: row.get(1)?,
        })
    })?;
    collect(rows)
}

pub fn list_fixed_costs(conn: &Connection) -> CatalogResult<Vec<FixedCost>> {
    let mut stmt = conn.prepare("SELECT name, monthly_amount FROM fixed_costs ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(FixedCost {
            name: row.get(0)?,
            monthly_amount: row.get(1)?,
        })
    })?;
    collect(rows)
}

/// Sum of all monthly fixed costs
pub fn fixed_costs_total(conn: &Connection) -> CatalogResult<f64> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(monthly_amount), 0.0) FROM fixed_costs",
        [],
        |row| row.get(0),
    )?)
}

/// Create or replace a recipe and its ordered ingredient lines
///
/// Lines name ingredients that must already exist.
pub fn save_recipe(
    conn: &Connection,
    name: &str,
    servings: u32,
    items: &[(String, f64)],
) -> CatalogResult<i64> {
    Recipe::validate(name, servings)?;

    let mut ingredient_ids = Vec::with_capacity(items.len());
    for (ingredient, _) in items {
        let id = lookup_id(conn, "ingredients", ingredient)?
            .ok_or_else(|| CatalogError::UnknownIngredient(ingredient.clone()))?;
        ingredient_ids.push(id);
    }

    let tx = begin(conn)?;
    let recipe_id: i64 = conn.query_row(
        "INSERT INTO recipes (name, servings) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET servings = excluded.servings
         RETURNING id",
        params![name, servings],
        |row| row.get(0),
    )?;
    conn.execute("DELETE FROM recipe_items WHERE recipe_id = ?1", [recipe_id])?;
    for (position, (ingredient_id, (_, amount))) in ingredient_ids.iter().zip(items).enumerate() {
        conn.execute(
            "INSERT INTO recipe_items (recipe_id, position, ingredient_id, amount)
             VALUES (?1, ?2, ?3, ?4)",
            params![recipe_id, position as i64, ingredient_id, amount],
        )?;
    }
    finish(tx)?;

    debug!(recipe = name, id = recipe_id, lines = items.len(), "saved recipe");
    Ok(recipe_id)
}

fn recipe_items(conn: &Connection, recipe_id: i64) -> CatalogResult<Vec<RecipeItem>> {
    let mut stmt = conn.prepare(
        "SELECT i.name, i.unit, i.package_cost / i.package_amount, ri.amount
         FROM recipe_items ri
         JOIN ingredients i ON i.id = ri.ingredient_id
         WHERE ri.recipe_id = ?1
         ORDER BY ri.position",
    )?;
    let rows = stmt.query_map([recipe_id], |row| {
        Ok(RecipeItem {
            ingredient_name: row.get(0)?,
            unit: unit_from_row(row, 1)?,
            cost_per_unit: row.get(2)?,
            amount: row.get(3)?,
        })
    })?;
    collect(rows)
}

fn recipe_by_id(conn: &Connection, id: i64) -> CatalogResult<Option<Recipe>> {
    let header: Option<(String, u32)> = conn
        .query_row(
            "SELECT name, servings FROM recipes WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match header {
        Some((name, servings)) => Ok(Some(Recipe {
            id,
            name,
            servings,
            items: recipe_items(conn, id)?,
        })),
        None => Ok(None),
    }
}

/// Load a recipe with its ingredient lines and current ingredient costs
pub fn get_recipe(conn: &Connection, name: &str) -> CatalogResult<Recipe> {
    let id = lookup_id(conn, "recipes", name)?
        .ok_or_else(|| CatalogError::UnknownRecipe(name.to_string()))?;
    recipe_by_id(conn, id)?.ok_or_else(|| CatalogError::UnknownRecipe(name.to_string()))
}

pub fn list_recipes(conn: &Connection) -> CatalogResult<Vec<Recipe>> {
    let mut stmt = conn.prepare("SELECT id FROM recipes ORDER BY name")?;
    let ids = collect(stmt.query_map([], |row| row.get::<_, i64>(0))?)?;

    let mut recipes = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(recipe) = recipe_by_id(conn, id)? {
            recipes.push(recipe);
        }
    }
    Ok(recipes)
}

/// Price a product from its lines and store the result
///
/// `value` is the margin percentage or the final price, depending on
/// `policy`. The cost, margin and price written are a snapshot of the
/// current recipe and package costs.
pub fn save_product(
    conn: &Connection,
    name: &str,
    recipes: &[(String, f64)],
    packages: &[(String, f64)],
    policy: PricePolicy,
    value: f64,
) -> CatalogResult<Product> {
    let mut recipe_lines = Vec::with_capacity(recipes.len());
    for (recipe_name, quantity) in recipes {
        let recipe = get_recipe(conn, recipe_name)?;
        recipe_lines.push(ProductRecipe {
            recipe_id: recipe.id,
            recipe_name: recipe.name.clone(),
            cost_per_unit: recipe.cost_per_unit(),
            quantity: *quantity,
        });
    }

    let mut package_lines = Vec::with_capacity(packages.len());
    for (package_name, quantity) in packages {
        let (id, unit_cost): (i64, f64) = conn
            .query_row(
                "SELECT id, unit_cost FROM packages WHERE name = ?1",
                [package_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| CatalogError::UnknownPackage(package_name.clone()))?;
        package_lines.push(ProductPackage {
            package_id: id,
            package_name: package_name.clone(),
            unit_cost,
            quantity: *quantity,
        });
    }

    let mut product = Product {
        id: 0,
        name: name.to_string(),
        recipes: recipe_lines,
        packages: package_lines,
        total_cost: 0.0,
        profit_margin: 0.0,
        price: 0.0,
        policy,
    };
    price_product(&mut product, value);

    let tx = begin(conn)?;
    product.id = conn.query_row(
        "INSERT INTO products (name, total_cost, profit_margin, price, price_policy)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(name) DO UPDATE SET
             total_cost = excluded.total_cost,
             profit_margin = excluded.profit_margin,
             price = excluded.price,
             price_policy = excluded.price_policy
         RETURNING id",
        params![
            name,
            product.total_cost,
            product.profit_margin,
            product.price,
            policy_to_str(policy)
        ],
        |row| row.get(0),
    )?;
    conn.execute("DELETE FROM product_recipes WHERE product_id = ?1", [product.id])?;
    conn.execute("DELETE FROM product_packages WHERE product_id = ?1", [product.id])?;
    for (position, line) in product.recipes.iter().enumerate() {
        conn.execute(
            "INSERT INTO product_recipes (product_id, position, recipe_id, quantity)
             VALUES (?1, ?2, ?3, ?4)",
            params![product.id, position as i64, line.recipe_id, line.quantity],
        )?;
    }
    for (position, line) in product.packages.iter().enumerate() {
        conn.execute(
            "INSERT INTO product_packages (product_id, position, package_id, quantity)
             VALUES (?1, ?2, ?3, ?4)",
            params![product.id, position as i64, line.package_id, line.quantity],
        )?;
    }
    finish(tx)?;

    debug!(product = name, id = product.id, price = product.price, "saved product");
    Ok(product)
}

/// Recompute a product's snapshot from its lines.
///
/// `value` feeds whichever field `product.policy` marks as authoritative.
fn price_product(product: &mut Product, value: f64) {
    product.total_cost =
        pricing::compute_product_cost(&product.recipe_lines(), &product.package_lines());
    match product.policy {
        PricePolicy::Margin => {
            product.profit_margin = value;
            product.price = pricing::compute_from_margin(product.total_cost, 1, value).final_price;
        }
        PricePolicy::Price => {
            product.price = value;
            product.profit_margin =
                pricing::compute_from_price(product.total_cost, 1, value).profit_margin;
        }
    }
}

fn product_by_id(conn: &Connection, id: i64, name: String) -> CatalogResult<Product> {
    let (total_cost, profit_margin, price, policy): (f64, f64, f64, String) = conn.query_row(
        "SELECT total_cost, profit_margin, price, price_policy FROM products WHERE id = ?1",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT recipe_id, quantity FROM product_recipes WHERE product_id = ?1 ORDER BY position",
    )?;
    let lines = collect(stmt.query_map([id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
    })?)?;
    let mut recipes = Vec::with_capacity(lines.len());
    for (recipe_id, quantity) in lines {
        let recipe = recipe_by_id(conn, recipe_id)?
            .ok_or_else(|| CatalogError::UnknownRecipe(recipe_id.to_string()))?;
        recipes.push(ProductRecipe {
            recipe_id,
            recipe_name: recipe.name.clone(),
            cost_per_unit: recipe.cost_per_unit(),
            quantity,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.unit_cost, pp.quantity
         FROM product_packages pp
         JOIN packages p ON p.id = pp.package_id
         WHERE pp.product_id = ?1
         ORDER BY pp.position",
    )?;
    let packages = collect(stmt.query_map([id], |row| {
        Ok(ProductPackage {
            package_id: row.get(0)?,
            package_name: row.get(1)?,
            unit_cost: row.get(2)?,
            quantity: row.get(3)?,
        })
    })?)?;

    Ok(Product {
        id,
        name,
        recipes,
        packages,
        total_cost,
        profit_margin,
        price,
        policy: policy_from_str(&policy),
    })
}

/// Load a product with its stored snapshot and current line costs
pub fn get_product(conn: &Connection, name: &str) -> CatalogResult<Product> {
    let id = lookup_id(conn, "products", name)?
        .ok_or_else(|| CatalogError::UnknownProduct(name.to_string()))?;
    product_by_id(conn, id, name.to_string())
}

pub fn list_products(conn: &Connection) -> CatalogResult<Vec<Product>> {
    let mut stmt = conn.prepare("SELECT id, name FROM products ORDER BY name")?;
    let rows = collect(stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?)?;

    let mut products = Vec::with_capacity(rows.len());
    for (id, name) in rows {
        products.push(product_by_id(conn, id, name)?);
    }
    Ok(products)
}

/// Refresh every product snapshot from current ingredient and package costs
///
/// The stored authoritative field (margin or price) is kept; the other is
/// recomputed. Returns the number of products whose snapshot changed.
pub fn reprice_products(conn: &Connection) -> CatalogResult<usize> {
    let mut changed = 0;
    for mut product in list_products(conn)? {
        let before = (product.total_cost, product.profit_margin, product.price);
        let value = match product.policy {
            PricePolicy::Margin => product.profit_margin,
            PricePolicy::Price => product.price,
        };
        price_product(&mut product, value);

        if before != (product.total_cost, product.profit_margin, product.price) {
            conn.execute(
                "UPDATE products SET total_cost = ?1, profit_margin = ?2, price = ?3 WHERE id = ?4",
                params![product.total_cost, product.profit_margin, product.price, product.id],
            )?;
            debug!(product = %product.name, "snapshot refreshed");
            changed += 1;
        }
    }
    Ok(changed)
}

/// Store the result of pricing a recipe batch
pub fn insert_pricing_record(
    conn: &Connection,
    recipe_id: i64,
    input: &RecipePricingInput,
    result: &RecipePricing,
) -> CatalogResult<i64> {
    conn.execute(
        "INSERT INTO pricing_records (
             recipe_id, labor_minutes, packaging_cost, profit_margin, yield_amount,
             labor_cost, fixed_costs_share, total_cost, final_price, unit_cost, unit_price,
             created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            recipe_id,
            input.labor_minutes,
            input.packaging_cost,
            result.profit_margin,
            input.yield_amount,
            result.labor_cost,
            result.fixed_costs_share,
            result.total_cost,
            result.final_price,
            result.unit_cost,
            result.unit_price,
            Utc::now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Pricing records for a recipe, newest first
pub fn list_pricing_records(conn: &Connection, recipe_id: i64) -> CatalogResult<Vec<PricingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, labor_minutes, packaging_cost, profit_margin, yield_amount,
                labor_cost, fixed_costs_share, total_cost, final_price, unit_cost, unit_price,
                created_at
         FROM pricing_records
         WHERE recipe_id = ?1
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([recipe_id], |row| {
        Ok(PricingRecord {
            id: row.get(0)?,
            labor_minutes: row.get(1)?,
            packaging_cost: row.get(2)?,
            profit_margin: row.get(3)?,
            yield_amount: row.get(4)?,
            labor_cost: row.get(5)?,
            fixed_costs_share: row.get(6)?,
            total_cost: row.get(7)?,
            final_price: row.get(8)?,
            unit_cost: row.get(9)?,
            unit_price: row.get(10)?,
            created_at: row.get::<_, DateTime<Utc>>(11)?,
        })
    })?;
    collect(rows)
}
