//! Catalog entities and their derived costs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::CatalogError;
use crate::pricing::{PackageLine, PricePolicy, RecipeLine};

/// Measurement unit of an ingredient package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Unit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "ml")]
    Milliliter,
    #[serde(rename = "l")]
    Liter,
    #[serde(rename = "un")]
    Piece,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Milliliter => "ml",
            Unit::Liter => "l",
            Unit::Piece => "un",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "g" => Ok(Unit::Gram),
            "kg" => Ok(Unit::Kilogram),
            "ml" => Ok(Unit::Milliliter),
            "l" => Ok(Unit::Liter),
            "un" | "unit" => Ok(Unit::Piece),
            other => Err(CatalogError::UnknownUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ingredient {
    pub name: String,
    pub unit: Unit,
    pub package_cost: f64,
    pub package_amount: f64, // Always > 0
}

impl Ingredient {
    pub fn validate(name: &str, package_cost: f64, package_amount: f64) -> Result<(), CatalogError> {
        if !(package_amount > 0.0) {
            return Err(CatalogError::NonPositivePackageAmount(name.to_string()));
        }
        if !(package_cost >= 0.0) {
            return Err(CatalogError::NegativeCost(name.to_string()));
        }
        Ok(())
    }

    pub fn cost_per_unit(&self) -> f64 {
        self.package_cost / self.package_amount
    }
}

/// One ingredient line of a recipe, already joined with the ingredient row
#[derive(Debug, Clone)]
pub struct RecipeItem {
    pub ingredient_name: String,
    pub unit: Unit,
    pub cost_per_unit: f64,
    pub amount: f64,
}

impl RecipeItem {
    pub fn cost(&self) -> f64 {
        self.cost_per_unit * self.amount
    }
}

#[derive(Debug, Clone)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub servings: u32, // Always >= 1
    pub items: Vec<RecipeItem>,
}

impl Recipe {
    pub fn validate(name: &str, servings: u32) -> Result<(), CatalogError> {
        if servings == 0 {
            return Err(CatalogError::ZeroServings(name.to_string()));
        }
        Ok(())
    }

    /// Ingredient cost of one full batch
    pub fn total_cost(&self) -> f64 {
        self.items.iter().map(RecipeItem::cost).sum()
    }

    /// Ingredient cost of one serving
    pub fn cost_per_unit(&self) -> f64 {
        self.total_cost() / self.servings.max(1) as f64
    }
}

#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub unit_cost: f64,
}

#[derive(Debug, Clone)]
pub struct ProductRecipe {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub cost_per_unit: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone)]
pub struct ProductPackage {
    pub package_id: i64,
    pub package_name: String,
    pub unit_cost: f64,
    pub quantity: f64,
}

/// A sellable product with its stored pricing snapshot
#[derive(Debug, Clone)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub recipes: Vec<ProductRecipe>,
    pub packages: Vec<ProductPackage>,
    /// Snapshot taken when the product was last priced
    pub total_cost: f64,
    pub profit_margin: f64,
    pub price: f64,
    /// Field the operator last set; the other one was derived from it
    pub policy: PricePolicy,
}

impl Product {
    pub fn recipe_lines(&self) -> Vec<RecipeLine> {
        self.recipes
            .iter()
            .map(|r| RecipeLine {
                cost_per_unit: r.cost_per_unit,
                quantity: r.quantity,
            })
            .collect()
    }

    pub fn package_lines(&self) -> Vec<PackageLine> {
        self.packages
            .iter()
            .map(|p| PackageLine {
                unit_cost: p.unit_cost,
                quantity: p.quantity,
            })
            .collect()
    }

    pub fn profit(&self) -> f64 {
        self.price - self.total_cost
    }

    pub fn is_below_cost(&self) -> bool {
        self.price < self.total_cost
    }
}

/// Monthly overhead such as rent or utilities
#[derive(Debug, Clone)]
pub struct FixedCost {
    pub name: String,
    pub monthly_amount: f64,
}

/// Stored result of pricing one recipe batch
#[derive(Debug, Clone)]
pub struct PricingRecord {
    pub id: i64,
    pub labor_minutes: f64,
    pub packaging_cost: f64,
    pub profit_margin: f64,
    pub yield_amount: u32,
    pub labor_cost: f64,
    pub fixed_costs_share: f64,
    pub total_cost: f64,
    pub final_price: f64,
    pub unit_cost: f64,
    pub unit_price: f64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parses_both_ways() {
        for unit in [Unit::Gram, Unit::Kilogram, Unit::Milliliter, Unit::Liter, Unit::Piece] {
            assert_eq!(unit.as_str().parse::<Unit>().unwrap(), unit);
        }
        assert_eq!(" KG ".parse::<Unit>().unwrap(), Unit::Kilogram);
        assert!("cups".parse::<Unit>().is_err());
    }

    #[test]
    fn ingredient_cost_per_unit() {
        let flour = Ingredient {
            name: "Flour".to_string(),
            unit: Unit::Gram,
            package_cost: 6.0,
            package_amount: 1000.0,
        };
        assert!((flour.cost_per_unit() - 0.006).abs() < 1e-12);
    }

    #[test]
    fn ingredient_rejects_empty_package() {
        assert!(matches!(
            Ingredient::validate("Sugar", 4.0, 0.0),
            Err(CatalogError::NonPositivePackageAmount(_))
        ));
        assert!(matches!(
            Ingredient::validate("Sugar", -1.0, 100.0),
            Err(CatalogError::NegativeCost(_))
        ));
        assert!(Ingredient::validate("Sugar", 4.0, 1000.0).is_ok());
    }

    #[test]
    fn recipe_costs() {
        let recipe = Recipe {
            id: 1,
            name: "Brigadeiro".to_string(),
            servings: 20,
            items: vec![
                RecipeItem {
                    ingredient_name: "Condensed milk".to_string(),
                    unit: Unit::Gram,
                    cost_per_unit: 0.02,
                    amount: 395.0,
                },
                RecipeItem {
                    ingredient_name: "Cocoa".to_string(),
                    unit: Unit::Gram,
                    cost_per_unit: 0.05,
                    amount: 40.0,
                },
            ],
        };
        assert!((recipe.total_cost() - 9.9).abs() < 1e-9);
        assert!((recipe.cost_per_unit() - 0.495).abs() < 1e-9);
        assert!(Recipe::validate("Empty", 0).is_err());
    }
}
