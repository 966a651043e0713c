//! Catalog import from TOML definition files
//!
//! A catalog directory holds any number of `*.toml` files. Each may define
//! ingredients, packages, fixed costs, recipes and products, referring to
//! each other by name. Files are applied in path order so later files can
//! use names defined by earlier ones.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::db;
use crate::error::{CatalogError, CatalogResult};
use crate::models::Unit;
use crate::pricing::PricePolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    #[serde(default, rename = "ingredient")]
    pub ingredients: Vec<IngredientDef>,
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageDef>,
    #[serde(default, rename = "fixed_cost")]
    pub fixed_costs: Vec<FixedCostDef>,
    #[serde(default, rename = "recipe")]
    pub recipes: Vec<RecipeDef>,
    #[serde(default, rename = "product")]
    pub products: Vec<ProductDef>,
}

#[derive(Debug, Deserialize)]
pub struct IngredientDef {
    pub name: String,
    pub unit: Unit,
    pub package_cost: f64,
    pub package_amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct PackageDef {
    pub name: String,
    pub unit_cost: f64,
}

#[derive(Debug, Deserialize)]
pub struct FixedCostDef {
    pub name: String,
    pub monthly_amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct RecipeDef {
    pub name: String,
    pub servings: u32,
    #[serde(default)]
    pub items: Vec<RecipeItemDef>,
}

#[derive(Debug, Deserialize)]
pub struct RecipeItemDef {
    pub ingredient: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct ProductDef {
    pub name: String,
    #[serde(default)]
    pub recipes: Vec<ProductRecipeDef>,
    #[serde(default)]
    pub packages: Vec<ProductPackageDef>,
    pub margin: Option<f64>,
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ProductRecipeDef {
    pub recipe: String,
    pub quantity: f64,
}

#[derive(Debug, Deserialize)]
pub struct ProductPackageDef {
    pub package: String,
    pub quantity: f64,
}

impl ProductDef {
    /// Which field is authoritative, and its value
    fn policy(&self, default_margin: f64) -> CatalogResult<(PricePolicy, f64)> {
        match (self.margin, self.price) {
            (Some(_), Some(_)) => Err(CatalogError::ConflictingPolicy(self.name.clone())),
            (Some(margin), None) => Ok((PricePolicy::Margin, margin)),
            (None, Some(price)) => Ok((PricePolicy::Price, price)),
            (None, None) => Ok((PricePolicy::Margin, default_margin)),
        }
    }
}

pub fn parse_catalog(content: &str) -> Result<CatalogFile, toml::de::Error> {
    toml::from_str(content)
}

/// Counts of rows written by one or more catalog files
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub ingredients: usize,
    pub packages: usize,
    pub fixed_costs: usize,
    pub recipes: usize,
    pub products: usize,
    pub errors: usize,
}

impl ImportStats {
    fn add(&mut self, other: &ImportStats) {
        self.files += other.files;
        self.ingredients += other.ingredients;
        self.packages += other.packages;
        self.fixed_costs += other.fixed_costs;
        self.recipes += other.recipes;
        self.products += other.products;
        self.errors += other.errors;
    }
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} files: {} ingredients, {} packages, {} fixed costs, {} recipes, {} products. Errors: {}",
            self.files,
            self.ingredients,
            self.packages,
            self.fixed_costs,
            self.recipes,
            self.products,
            self.errors
        )
    }
}

/// Write one parsed catalog file to the database, all or nothing
pub fn apply_catalog(
    conn: &Connection,
    catalog: &CatalogFile,
    default_margin: f64,
) -> CatalogResult<ImportStats> {
    let tx = conn.unchecked_transaction()?;

    for def in &catalog.ingredients {
        db::upsert_ingredient(conn, &def.name, def.unit, def.package_cost, def.package_amount)?;
    }
    for def in &catalog.packages {
        db::upsert_package(conn, &def.name, def.unit_cost)?;
    }
    for def in &catalog.fixed_costs {
        db::upsert_fixed_cost(conn, &def.name, def.monthly_amount)?;
    }
    for def in &catalog.recipes {
        let items: Vec<(String, f64)> = def
            .items
            .iter()
            .map(|i| (i.ingredient.clone(), i.amount))
            .collect();
        db::save_recipe(conn, &def.name, def.servings, &items)?;
    }
    for def in &catalog.products {
        let (policy, value) = def.policy(default_margin)?;
        let recipes: Vec<(String, f64)> = def
            .recipes
            .iter()
            .map(|r| (r.recipe.clone(), r.quantity))
            .collect();
        let packages: Vec<(String, f64)> = def
            .packages
            .iter()
            .map(|p| (p.package.clone(), p.quantity))
            .collect();
        db::save_product(conn, &def.name, &recipes, &packages, policy, value)?;
    }

    tx.commit()?;

    Ok(ImportStats {
        files: 1,
        ingredients: catalog.ingredients.len(),
        packages: catalog.packages.len(),
        fixed_costs: catalog.fixed_costs.len(),
        recipes: catalog.recipes.len(),
        products: catalog.products.len(),
        errors: 0,
    })
}

/// Find all catalog files under a directory, sorted by path
pub fn find_catalog_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();
    files
}

fn import_file(conn: &Connection, path: &Path, default_margin: f64) -> Result<ImportStats> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let catalog =
        parse_catalog(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    let stats = apply_catalog(conn, &catalog, default_margin)?;
    Ok(stats)
}

/// Import every catalog file in a directory
///
/// A file that fails to parse or apply is rolled back, logged and counted;
/// the remaining files are still imported.
pub fn import_directory(conn: &Connection, dir: &Path, default_margin: f64) -> Result<ImportStats> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    let files = find_catalog_files(dir);
    info!(dir = %dir.display(), files = files.len(), "importing catalog");

    let mut stats = ImportStats::default();
    for path in &files {
        match import_file(conn, path, default_margin) {
            Ok(file_stats) => {
                info!(
                    file = %path.display(),
                    recipes = file_stats.recipes,
                    products = file_stats.products,
                    "imported"
                );
                stats.add(&file_stats);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{e:#}"), "skipping catalog file");
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

/// Built-in catalog for trying the tool without writing one
pub const SAMPLE_CATALOG: &str = r#"
[[ingredient]]
name = "Condensed milk"
unit = "g"
package_cost = 7.90
package_amount = 395

[[ingredient]]
name = "Cocoa powder"
unit = "g"
package_cost = 12.00
package_amount = 200

[[ingredient]]
name = "Butter"
unit = "g"
package_cost = 11.50
package_amount = 200

[[ingredient]]
name = "Chocolate sprinkles"
unit = "g"
package_cost = 6.00
package_amount = 150

[[ingredient]]
name = "Shredded coconut"
unit = "g"
package_cost = 5.20
package_amount = 100

[[ingredient]]
name = "Wheat flour"
unit = "kg"
package_cost = 6.50
package_amount = 1

[[ingredient]]
name = "Sugar"
unit = "kg"
package_cost = 4.80
package_amount = 1

[[ingredient]]
name = "Eggs"
unit = "un"
package_cost = 14.00
package_amount = 12

[[ingredient]]
name = "Whole milk"
unit = "l"
package_cost = 5.00
package_amount = 1

[[package]]
name = "Paper cup"
unit_cost = 0.08

[[package]]
name = "Gift box (4)"
unit_cost = 2.50

[[package]]
name = "Cake board"
unit_cost = 3.00

[[fixed_cost]]
name = "Rent"
monthly_amount = 1200

[[fixed_cost]]
name = "Utilities"
monthly_amount = 350

[[recipe]]
name = "Brigadeiro"
servings = 25
items = [
    { ingredient = "Condensed milk", amount = 395 },
    { ingredient = "Cocoa powder", amount = 40 },
    { ingredient = "Butter", amount = 20 },
    { ingredient = "Chocolate sprinkles", amount = 100 },
]

[[recipe]]
name = "Beijinho"
servings = 25
items = [
    { ingredient = "Condensed milk", amount = 395 },
    { ingredient = "Butter", amount = 20 },
    { ingredient = "Shredded coconut", amount = 100 },
]

[[recipe]]
name = "Chocolate cake"
servings = 12
items = [
    { ingredient = "Wheat flour", amount = 0.3 },
    { ingredient = "Sugar", amount = 0.25 },
    { ingredient = "Eggs", amount = 4 },
    { ingredient = "Whole milk", amount = 0.24 },
    { ingredient = "Cocoa powder", amount = 60 },
    { ingredient = "Butter", amount = 100 },
]

[[product]]
name = "Brigadeiro (single)"
recipes = [{ recipe = "Brigadeiro", quantity = 1 }]
packages = [{ package = "Paper cup", quantity = 1 }]
price = 2.50

[[product]]
name = "Mixed gift box"
recipes = [
    { recipe = "Brigadeiro", quantity = 2 },
    { recipe = "Beijinho", quantity = 2 },
]
packages = [
    { package = "Paper cup", quantity = 4 },
    { package = "Gift box (4)", quantity = 1 },
]
margin = 120

[[product]]
name = "Chocolate cake (whole)"
recipes = [{ recipe = "Chocolate cake", quantity = 12 }]
packages = [{ package = "Cake board", quantity = 1 }]
margin = 90
"#;

/// Replace the catalog with the built-in sample
pub fn load_sample(conn: &Connection, default_margin: f64) -> Result<ImportStats> {
    db::clear_catalog(conn)?;
    let catalog = parse_catalog(SAMPLE_CATALOG).context("Built-in sample catalog is invalid")?;
    Ok(apply_catalog(conn, &catalog, default_margin)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn sample_catalog_loads() {
        let conn = open();
        let stats = load_sample(&conn, 30.0).unwrap();
        assert_eq!(stats.ingredients, 9);
        assert_eq!(stats.recipes, 3);
        assert_eq!(stats.products, 3);

        let single = db::get_product(&conn, "Brigadeiro (single)").unwrap();
        assert_eq!(single.policy, PricePolicy::Price);
        assert!((single.price - 2.5).abs() < 1e-9);
        assert!(single.profit_margin > 0.0);
    }

    #[test]
    fn product_without_policy_uses_default_margin() {
        let conn = open();
        let catalog = parse_catalog(
            r#"
            [[package]]
            name = "Bag"
            unit_cost = 2.0

            [[product]]
            name = "Empty bag"
            packages = [{ package = "Bag", quantity = 1 }]
            "#,
        )
        .unwrap();
        apply_catalog(&conn, &catalog, 50.0).unwrap();

        let product = db::get_product(&conn, "Empty bag").unwrap();
        assert!((product.total_cost - 2.0).abs() < 1e-9);
        assert!((product.price - 3.0).abs() < 1e-9);
    }

    #[test]
    fn conflicting_policy_is_rejected() {
        let def = ProductDef {
            name: "Both".to_string(),
            recipes: vec![],
            packages: vec![],
            margin: Some(10.0),
            price: Some(5.0),
        };
        assert!(matches!(def.policy(30.0), Err(CatalogError::ConflictingPolicy(_))));
    }

    #[test]
    fn failed_file_leaves_no_rows() {
        let conn = open();
        let catalog = parse_catalog(
            r#"
            [[ingredient]]
            name = "Sugar"
            unit = "kg"
            package_cost = 4.0
            package_amount = 1

            [[recipe]]
            name = "Syrup"
            servings = 1
            items = [{ ingredient = "Honey", amount = 1 }]
            "#,
        )
        .unwrap();

        let err = apply_catalog(&conn, &catalog, 30.0).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownIngredient(ref name) if name == "Honey"));
        assert!(db::list_ingredients(&conn).unwrap().is_empty());
    }

    #[test]
    fn unknown_keys_and_units_fail_to_parse() {
        let bad_unit = r#"
            [[ingredient]]
            name = "X"
            unit = "cup"
            package_cost = 1
            package_amount = 1
        "#;
        assert!(parse_catalog(bad_unit).is_err());
        assert!(parse_catalog("[[widget]]\nname = \"X\"\n").is_err());
    }

    #[test]
    fn directory_import_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(
            dir.path().join("a_packages.toml"),
            "[[package]]\nname = \"Bag\"\nunit_cost = 2.0\n",
        )
        .unwrap();
        fs::write(dir.path().join("b").join("broken.toml"), "[[package]\nname = ").unwrap();
        fs::write(
            dir.path().join("b").join("sugar.toml"),
            "[[ingredient]]\nname = \"Sugar\"\nunit = \"kg\"\npackage_cost = 4.0\npackage_amount = 1\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("c_products.toml"),
            "[[product]]\nname = \"Gift bag\"\nmargin = 50\npackages = [{ package = \"Bag\", quantity = 1 }]\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a catalog").unwrap();

        let files = find_catalog_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a_packages.toml"),
                PathBuf::from("b/broken.toml"),
                PathBuf::from("b/sugar.toml"),
                PathBuf::from("c_products.toml"),
            ]
        );

        let conn = open();
        let stats = import_directory(&conn, dir.path(), 30.0).unwrap();
        assert_eq!(stats.files, 3);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.packages, 1);
        assert_eq!(stats.ingredients, 1);
        assert_eq!(stats.products, 1);

        assert_eq!(db::list_ingredients(&conn).unwrap()[0].name, "Sugar");
        let product = db::get_product(&conn, "Gift bag").unwrap();
        assert_eq!(product.policy, PricePolicy::Margin);
        assert!((product.total_cost - 2.0).abs() < 1e-9);
        assert!((product.price - 3.0).abs() < 1e-9);
    }

    #[test]
    fn import_requires_a_directory() {
        let conn = open();
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(import_directory(&conn, file.path(), 30.0).is_err());
    }
}
