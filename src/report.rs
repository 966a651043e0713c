//! Margin report over stored product snapshots

use std::fmt;

use crate::models::Product;

#[derive(Debug, Clone)]
pub struct ProductRow {
    pub name: String,
    pub total_cost: f64,
    pub price: f64,
    pub profit_margin: f64,
    pub profit: f64,
    pub below_cost: bool,
}

/// Summary of every product's stored cost and price
#[derive(Debug, Clone)]
pub struct MarginReport {
    pub currency: String,
    pub rows: Vec<ProductRow>,
    pub total_cost: f64,
    pub total_price: f64,
    pub average_margin: f64,
    pub below_cost: usize,
}

/// Build the report from stored snapshots, lowest margin first
pub fn margin_report(products: &[Product], currency: &str) -> MarginReport {
    let mut rows: Vec<ProductRow> = products
        .iter()
        .map(|p| ProductRow {
            name: p.name.clone(),
            total_cost: p.total_cost,
            price: p.price,
            profit_margin: p.profit_margin,
            profit: p.profit(),
            below_cost: p.is_below_cost(),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.profit_margin
            .total_cmp(&b.profit_margin)
            .then_with(|| a.name.cmp(&b.name))
    });

    let total_cost = rows.iter().map(|r| r.total_cost).sum();
    let total_price = rows.iter().map(|r| r.price).sum();
    let average_margin = if rows.is_empty() {
        0.0
    } else {
        rows.iter().map(|r| r.profit_margin).sum::<f64>() / rows.len() as f64
    };
    let below_cost = rows.iter().filter(|r| r.below_cost).count();

    MarginReport {
        currency: currency.to_string(),
        rows,
        total_cost,
        total_price,
        average_margin,
        below_cost,
    }
}

impl fmt::Display for MarginReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Margin Report ===")?;
        if self.rows.is_empty() {
            return writeln!(f, "No products priced yet.");
        }

        let money = |v: f64| format!("{}{:.2}", self.currency, v);

        writeln!(
            f,
            "{:<30} {:>12} {:>12} {:>9} {:>12}",
            "Product", "Cost", "Price", "Margin", "Profit"
        )?;
        writeln!(f, "{}", "-".repeat(79))?;
        for row in &self.rows {
            let flag = if row.below_cost { "  ! below cost" } else { "" };
            writeln!(
                f,
                "{:<30} {:>12} {:>12} {:>8.1}% {:>12}{}",
                row.name,
                money(row.total_cost),
                money(row.price),
                row.profit_margin,
                money(row.profit),
                flag
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Products:        {}", self.rows.len())?;
        writeln!(f, "Total cost:      {}", money(self.total_cost))?;
        writeln!(f, "Total price:     {}", money(self.total_price))?;
        writeln!(f, "Average margin:  {:.1}%", self.average_margin)?;
        if self.below_cost > 0 {
            writeln!(f, "Below cost:      {}", self.below_cost)?;
        }
        Ok(())
    }
}
