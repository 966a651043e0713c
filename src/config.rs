//! Settings file
//!
//! Read from `sweet-pricing.toml` in the working directory unless another
//! path is given. A missing file means defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use crate::pricing::DEFAULT_ALLOCATION_RATE;

pub const DEFAULT_CONFIG_FILE: &str = "sweet-pricing.toml";
pub const DATABASE_ENV: &str = "SWEET_PRICING_DATABASE";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: PathBuf,
    /// Prefix printed before amounts
    pub currency: String,
    pub pricing: PricingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub hourly_labor_rate: f64,
    /// Fraction of monthly fixed costs charged to each priced batch
    pub allocation_rate: f64,
    pub default_margin: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("sweet_pricing.db"),
            currency: "$".to_string(),
            pricing: PricingConfig::default(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            hourly_labor_rate: 15.0,
            allocation_rate: DEFAULT_ALLOCATION_RATE,
            default_margin: 30.0,
        }
    }
}

impl Config {
    pub fn money(&self, amount: f64) -> String {
        format!("{}{:.2}", self.currency, amount)
    }
}

/// Load the config file, falling back to defaults when it does not exist
///
/// An explicitly requested file must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        cfg
    } else if required {
        bail!("Config file {} not found", path.display());
    } else {
        Config::default()
    };

    if let Ok(db) = std::env::var(DATABASE_ENV) {
        cfg.database = PathBuf::from(db);
    }

    validate_config(&cfg)?;
    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    if !(cfg.pricing.hourly_labor_rate >= 0.0) {
        bail!("pricing.hourly_labor_rate cannot be negative");
    }
    if !(0.0..=1.0).contains(&cfg.pricing.allocation_rate) {
        bail!(
            "pricing.allocation_rate must be a fraction between 0 and 1, got {}",
            cfg.pricing.allocation_rate
        );
    }
    if !cfg.pricing.default_margin.is_finite() {
        bail!("pricing.default_margin must be a number");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.database, PathBuf::from("sweet_pricing.db"));
        assert_eq!(cfg.pricing.allocation_rate, 0.01);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn partial_pricing_section() {
        let cfg: Config = toml::from_str(
            r#"
            currency = "R$ "

            [pricing]
            hourly_labor_rate = 22.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.pricing.hourly_labor_rate, 22.5);
        assert_eq!(cfg.pricing.default_margin, 30.0);
        assert_eq!(cfg.money(3.0), "R$ 3.00");
    }

    #[test]
    fn allocation_rate_must_be_a_fraction() {
        let mut cfg = Config::default();
        cfg.pricing.allocation_rate = 5.0;
        assert!(validate_config(&cfg).is_err());
        cfg.pricing.allocation_rate = 0.05;
        cfg.pricing.hourly_labor_rate = -1.0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/sweet-pricing.toml"))).is_err());
    }
}
