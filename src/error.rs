//! Catalog errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("ingredient '{0}' must have a package amount greater than zero")]
    NonPositivePackageAmount(String),

    #[error("'{0}' cannot have a negative cost")]
    NegativeCost(String),

    #[error("recipe '{0}' must yield at least one serving")]
    ZeroServings(String),

    #[error("unknown unit '{0}' (expected g, kg, ml, l or un)")]
    UnknownUnit(String),

    #[error("ingredient '{0}' not found")]
    UnknownIngredient(String),

    #[error("recipe '{0}' not found")]
    UnknownRecipe(String),

    #[error("package '{0}' not found")]
    UnknownPackage(String),

    #[error("product '{0}' not found")]
    UnknownProduct(String),

    #[error("product '{0}' sets both margin and price")]
    ConflictingPolicy(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
