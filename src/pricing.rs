//! Cost roll-up and price/margin calculation
//!
//! Everything here is plain arithmetic over already-loaded numbers. No
//! function in this module can fail: non-finite inputs count as 0, a zero
//! cost yields a zero margin and a zero yield yields zero unit figures.

/// Replace NaN and infinities with 0
fn finite(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn per_unit(amount: f64, yield_amount: u32) -> f64 {
    if yield_amount == 0 {
        0.0
    } else {
        amount / yield_amount as f64
    }
}

/// Result of pricing with the margin as the authoritative field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginQuote {
    pub final_price: f64,
    pub unit_cost: f64,
    pub unit_price: f64,
    pub profit_per_unit: f64,
}

/// Result of pricing with the final price as the authoritative field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub profit_margin: f64,
    pub unit_cost: f64,
    pub unit_price: f64,
    pub profit_per_unit: f64,
}

/// Price a batch from a margin percentage (30 means 30%)
///
/// Negative margins are accepted as-is so a vendor can deliberately sell
/// below cost.
pub fn compute_from_margin(total_cost: f64, yield_amount: u32, margin: f64) -> MarginQuote {
    let total_cost = finite(total_cost);
    let margin = finite(margin);

    let final_price = total_cost + total_cost * margin / 100.0;
    let unit_cost = per_unit(total_cost, yield_amount);
    let unit_price = per_unit(final_price, yield_amount);

    MarginQuote {
        final_price,
        unit_cost,
        unit_price,
        profit_per_unit: unit_price - unit_cost,
    }
}

/// Back-calculate the margin from a final price
///
/// The derived margin is clamped at 0, and is 0 whenever the cost is 0.
pub fn compute_from_price(total_cost: f64, yield_amount: u32, final_price: f64) -> PriceQuote {
    let total_cost = finite(total_cost);
    let final_price = finite(final_price);

    let profit_margin = if total_cost == 0.0 {
        0.0
    } else {
        ((final_price - total_cost) / total_cost * 100.0).max(0.0)
    };
    let unit_cost = per_unit(total_cost, yield_amount);
    let unit_price = per_unit(final_price, yield_amount);

    PriceQuote {
        profit_margin,
        unit_cost,
        unit_price,
        profit_per_unit: unit_price - unit_cost,
    }
}

/// A recipe used in a product, costed per serving
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecipeLine {
    pub cost_per_unit: f64,
    pub quantity: f64,
}

/// A packaging item used in a product
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackageLine {
    pub unit_cost: f64,
    pub quantity: f64,
}

/// Total material cost of one product instance
pub fn compute_product_cost(recipes: &[RecipeLine], packages: &[PackageLine]) -> f64 {
    let recipe_cost: f64 = recipes
        .iter()
        .map(|line| finite(line.cost_per_unit) * finite(line.quantity))
        .sum();
    let package_cost: f64 = packages
        .iter()
        .map(|line| finite(line.unit_cost) * finite(line.quantity))
        .sum();
    recipe_cost + package_cost
}

/// Share of monthly fixed costs attributed to a single priced item.
///
/// Defaults to a flat 1% of the monthly total, regardless of product mix.
pub const DEFAULT_ALLOCATION_RATE: f64 = 0.01;

/// Which of the two coupled fields drives a recompute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricePolicy {
    Margin,
    Price,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipePricingInput {
    /// Ingredient cost of one full batch
    pub recipe_cost: f64,
    pub labor_minutes: f64,
    pub hourly_rate: f64,
    pub packaging_cost: f64,
    pub fixed_costs_monthly_total: f64,
    pub allocation_rate: f64,
    pub policy: PricePolicy,
    /// Margin percentage, read when `policy` is `Margin`
    pub profit_margin: f64,
    /// Batch price, read when `policy` is `Price`
    pub final_price: f64,
    pub yield_amount: u32,
}

/// Full cost and price breakdown for one recipe batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecipePricing {
    pub labor_cost: f64,
    pub fixed_costs_share: f64,
    pub total_cost: f64,
    pub profit_margin: f64,
    pub final_price: f64,
    pub unit_cost: f64,
    pub unit_price: f64,
    pub profit_per_unit: f64,
}

impl RecipePricing {
    pub fn is_below_cost(&self) -> bool {
        self.final_price < self.total_cost
    }
}

pub fn labor_cost(labor_minutes: f64, hourly_rate: f64) -> f64 {
    finite(labor_minutes) / 60.0 * finite(hourly_rate)
}

pub fn fixed_costs_share(monthly_total: f64, allocation_rate: f64) -> f64 {
    finite(monthly_total) * finite(allocation_rate)
}

/// Price a recipe batch including labor, packaging and overhead
pub fn compute_recipe_pricing(input: &RecipePricingInput) -> RecipePricing {
    let labor_cost = labor_cost(input.labor_minutes, input.hourly_rate);
    let fixed_costs_share =
        fixed_costs_share(input.fixed_costs_monthly_total, input.allocation_rate);
    let total_cost =
        finite(input.recipe_cost) + labor_cost + finite(input.packaging_cost) + fixed_costs_share;

    let (profit_margin, final_price, unit_cost, unit_price, profit_per_unit) = match input.policy {
        PricePolicy::Margin => {
            let quote = compute_from_margin(total_cost, input.yield_amount, input.profit_margin);
            (
                finite(input.profit_margin),
                quote.final_price,
                quote.unit_cost,
                quote.unit_price,
                quote.profit_per_unit,
            )
        }
        PricePolicy::Price => {
            let quote = compute_from_price(total_cost, input.yield_amount, input.final_price);
            (
                quote.profit_margin,
                finite(input.final_price),
                quote.unit_cost,
                quote.unit_price,
                quote.profit_per_unit,
            )
        }
    };

    RecipePricing {
        labor_cost,
        fixed_costs_share,
        total_cost,
        profit_margin,
        final_price,
        unit_cost,
        unit_price,
        profit_per_unit,
    }
}

/// Two coupled fields, margin and final price, kept in sync.
///
/// The last field the operator edited is authoritative; the other one is
/// always derived from it. Cost or yield changes recompute only the derived
/// field and never move the authority.
#[derive(Debug, Clone)]
pub struct PriceEditor {
    total_cost: f64,
    yield_amount: u32,
    profit_margin: f64,
    final_price: f64,
    last_edited: PricePolicy,
}

impl PriceEditor {
    pub fn new(total_cost: f64, yield_amount: u32, margin: f64) -> Self {
        let mut editor = Self {
            total_cost: finite(total_cost),
            yield_amount,
            profit_margin: 0.0,
            final_price: 0.0,
            last_edited: PricePolicy::Margin,
        };
        editor.edit_margin(margin);
        editor
    }

    pub fn edit_margin(&mut self, margin: f64) {
        self.last_edited = PricePolicy::Margin;
        self.profit_margin = finite(margin);
        self.recompute();
    }

    pub fn edit_price(&mut self, price: f64) {
        self.last_edited = PricePolicy::Price;
        self.final_price = finite(price);
        self.recompute();
    }

    pub fn set_total_cost(&mut self, total_cost: f64) {
        self.total_cost = finite(total_cost);
        self.recompute();
    }

    pub fn set_yield(&mut self, yield_amount: u32) {
        self.yield_amount = yield_amount;
    }

    fn recompute(&mut self) {
        match self.last_edited {
            PricePolicy::Margin => {
                self.final_price =
                    compute_from_margin(self.total_cost, self.yield_amount, self.profit_margin)
                        .final_price;
            }
            PricePolicy::Price => {
                self.profit_margin =
                    compute_from_price(self.total_cost, self.yield_amount, self.final_price)
                        .profit_margin;
            }
        }
    }

    pub fn last_edited(&self) -> PricePolicy {
        self.last_edited
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn yield_amount(&self) -> u32 {
        self.yield_amount
    }

    pub fn profit_margin(&self) -> f64 {
        self.profit_margin
    }

    pub fn final_price(&self) -> f64 {
        self.final_price
    }

    pub fn unit_cost(&self) -> f64 {
        per_unit(self.total_cost, self.yield_amount)
    }

    pub fn unit_price(&self) -> f64 {
        per_unit(self.final_price, self.yield_amount)
    }

    pub fn profit_per_unit(&self) -> f64 {
        self.unit_price() - self.unit_cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * (1.0 + a.abs().max(b.abs()))
    }

    #[test]
    fn margin_scenario() {
        let q = compute_from_margin(100.0, 10, 30.0);
        assert!(approx(q.final_price, 130.0));
        assert!(approx(q.unit_cost, 10.0));
        assert!(approx(q.unit_price, 13.0));
        assert!(approx(q.profit_per_unit, 3.0));
    }

    #[test]
    fn price_scenario() {
        let q = compute_from_price(50.0, 5, 75.0);
        assert!(approx(q.profit_margin, 50.0));
        assert!(approx(q.unit_cost, 10.0));
        assert!(approx(q.unit_price, 15.0));
        assert!(approx(q.profit_per_unit, 5.0));
    }

    #[test]
    fn margin_round_trips_through_price() {
        for &cost in &[0.01, 1.0, 12.5, 100.0, 9_999.99] {
            for &yield_amount in &[1, 3, 24] {
                for &margin in &[0.0, 0.5, 30.0, 100.0, 250.0] {
                    let price = compute_from_margin(cost, yield_amount, margin).final_price;
                    let back = compute_from_price(cost, yield_amount, price).profit_margin;
                    assert!(approx(back, margin), "cost={cost} margin={margin} back={back}");
                }
            }
        }
    }

    #[test]
    fn zero_cost_gives_zero_margin() {
        for &price in &[0.0, 1.0, 500.0] {
            let q = compute_from_price(0.0, 4, price);
            assert_eq!(q.profit_margin, 0.0);
            assert!(q.unit_price.is_finite());
        }
    }

    #[test]
    fn price_below_cost_clamps_margin() {
        let q = compute_from_price(100.0, 1, 80.0);
        assert_eq!(q.profit_margin, 0.0);
        assert!(approx(q.profit_per_unit, -20.0));
    }

    #[test]
    fn negative_margin_is_not_clamped() {
        let q = compute_from_margin(100.0, 1, -10.0);
        assert!(approx(q.final_price, 90.0));
    }

    #[test]
    fn larger_margin_gives_larger_price() {
        let mut last = f64::NEG_INFINITY;
        for step in -5..50 {
            let price = compute_from_margin(42.0, 6, step as f64 * 7.5).final_price;
            assert!(price > last);
            last = price;
        }
    }

    #[test]
    fn unit_figures_multiply_back() {
        let q = compute_from_margin(37.3, 7, 42.0);
        assert!(approx(q.unit_price * 7.0, q.final_price));
        assert!(approx(q.unit_cost * 7.0, 37.3));
    }

    #[test]
    fn zero_yield_gives_zero_unit_figures() {
        let q = compute_from_margin(10.0, 0, 20.0);
        assert!(approx(q.final_price, 12.0));
        assert_eq!(q.unit_cost, 0.0);
        assert_eq!(q.unit_price, 0.0);
    }

    #[test]
    fn nan_inputs_count_as_zero() {
        let q = compute_from_margin(f64::NAN, 2, 30.0);
        assert_eq!(q.final_price, 0.0);
        let q = compute_from_price(10.0, 2, f64::NAN);
        assert_eq!(q.profit_margin, 0.0);
    }

    #[test]
    fn product_cost_sums_recipes_and_packages() {
        let recipes = [
            RecipeLine { cost_per_unit: 2.0, quantity: 3.0 },
            RecipeLine { cost_per_unit: 1.5, quantity: 2.0 },
        ];
        let packages = [PackageLine { unit_cost: 0.5, quantity: 1.0 }];
        assert!(approx(compute_product_cost(&recipes, &packages), 9.5));
        assert_eq!(compute_product_cost(&[], &[]), 0.0);
    }

    fn recipe_input(policy: PricePolicy) -> RecipePricingInput {
        RecipePricingInput {
            recipe_cost: 40.0,
            labor_minutes: 90.0,
            hourly_rate: 20.0,
            packaging_cost: 5.0,
            fixed_costs_monthly_total: 1500.0,
            allocation_rate: DEFAULT_ALLOCATION_RATE,
            policy,
            profit_margin: 50.0,
            final_price: 150.0,
            yield_amount: 20,
        }
    }

    #[test]
    fn recipe_pricing_from_margin() {
        let p = compute_recipe_pricing(&recipe_input(PricePolicy::Margin));
        assert!(approx(p.labor_cost, 30.0));
        assert!(approx(p.fixed_costs_share, 15.0));
        assert!(approx(p.total_cost, 90.0));
        assert!(approx(p.final_price, 135.0));
        assert!(approx(p.unit_cost, 4.5));
        assert!(approx(p.unit_price, 6.75));
        assert!(!p.is_below_cost());
    }

    #[test]
    fn recipe_pricing_from_price() {
        let p = compute_recipe_pricing(&recipe_input(PricePolicy::Price));
        assert!(approx(p.total_cost, 90.0));
        assert!(approx(p.final_price, 150.0));
        assert!(approx(p.profit_margin, 200.0 / 3.0));
        assert!(approx(p.unit_price, 7.5));
    }

    #[test]
    fn editor_keeps_margin_authoritative_across_cost_changes() {
        let mut editor = PriceEditor::new(100.0, 10, 30.0);
        assert!(approx(editor.final_price(), 130.0));

        editor.set_total_cost(200.0);
        assert_eq!(editor.last_edited(), PricePolicy::Margin);
        assert!(approx(editor.profit_margin(), 30.0));
        assert!(approx(editor.final_price(), 260.0));
    }

    #[test]
    fn editor_keeps_price_authoritative_across_cost_changes() {
        let mut editor = PriceEditor::new(50.0, 5, 0.0);
        editor.edit_price(75.0);
        assert!(approx(editor.profit_margin(), 50.0));

        editor.set_total_cost(60.0);
        assert_eq!(editor.last_edited(), PricePolicy::Price);
        assert!(approx(editor.final_price(), 75.0));
        assert!(approx(editor.profit_margin(), 25.0));

        editor.edit_margin(10.0);
        assert!(approx(editor.final_price(), 66.0));
        assert!(approx(editor.unit_price(), 13.2));
    }

    #[test]
    fn editor_yield_change_only_moves_unit_figures() {
        let mut editor = PriceEditor::new(100.0, 10, 30.0);
        editor.set_yield(4);
        assert!(approx(editor.final_price(), 130.0));
        assert!(approx(editor.unit_cost(), 25.0));
        assert!(approx(editor.unit_price(), 32.5));
        assert_eq!(editor.yield_amount(), 4);
        editor.set_yield(0);
        assert_eq!(editor.profit_per_unit(), 0.0);
    }
}
