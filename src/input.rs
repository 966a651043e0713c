//! Lenient parsing of operator-entered amounts
//!
//! Amounts arrive as typed text: `12.5`, `12,5`, `R$ 1.234,56` or
//! `$1,234.56`. Anything unreadable is 0, never an error and never NaN.

use std::sync::OnceLock;

use anyhow::{Result, bail};
use regex::Regex;

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // [sign] [currency] [sign] digits with '.' or ',' groups [%]
    RE.get_or_init(|| {
        Regex::new(r"^(-)?\s*(?:R\$|\$|€|£)?\s*(-)?\s*([0-9]+(?:[.,][0-9]+)*)\s*%?$")
            .expect("valid amount regex")
    })
}

/// Parse an amount, treating malformed input as 0
pub fn parse_amount(text: &str) -> f64 {
    let Some(cap) = amount_re().captures(text.trim()) else {
        return 0.0;
    };

    let negative = match (cap.get(1), cap.get(2)) {
        (Some(_), Some(_)) => return 0.0,
        (None, None) => false,
        _ => true,
    };
    let number = normalize_separators(&cap[3]);
    let value = number.parse::<f64>().unwrap_or(0.0);

    if !value.is_finite() {
        0.0
    } else if negative {
        -value
    } else {
        value
    }
}

/// Parse a cost that must not be negative
///
/// Malformed text is still 0; only a readable negative amount is rejected.
pub fn parse_cost(field: &str, text: &str) -> Result<f64> {
    let value = parse_amount(text);
    if value < 0.0 {
        bail!("{} cannot be negative, got {}", field, text.trim());
    }
    Ok(value)
}

/// Rewrite a number with '.' or ',' separators into plain `1234.56` form.
///
/// The last separator is the decimal point when both kinds appear. When only
/// one kind appears it is the decimal point unless it repeats.
fn normalize_separators(raw: &str) -> String {
    let last_dot = raw.rfind('.');
    let last_comma = raw.rfind(',');

    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(d.max(c)),
        (Some(d), None) => single_kind_decimal(raw, '.', d),
        (None, Some(c)) => single_kind_decimal(raw, ',', c),
        (None, None) => None,
    };

    let mut out = String::with_capacity(raw.len());
    for (i, ch) in raw.char_indices() {
        if ch.is_ascii_digit() {
            out.push(ch);
        } else if Some(i) == decimal {
            out.push('.');
        }
    }
    out
}

fn single_kind_decimal(raw: &str, sep: char, last: usize) -> Option<usize> {
    if raw.matches(sep).count() > 1 {
        None // thousands grouping: 1.234.567
    } else {
        Some(last)
    }
}

/// Parse a yield, rounding down and treating malformed input as 0
pub fn parse_count(text: &str) -> u32 {
    let value = parse_amount(text);
    if value <= 0.0 {
        0
    } else if value >= u32::MAX as f64 {
        u32::MAX
    } else {
        value.floor() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_numbers() {
        assert_eq!(parse_amount("12.5"), 12.5);
        assert_eq!(parse_amount("  7 "), 7.0);
        assert_eq!(parse_amount("-3.25"), -3.25);
    }

    #[test]
    fn comma_decimal() {
        assert_eq!(parse_amount("12,5"), 12.5);
        assert_eq!(parse_amount("R$ 1.234,56"), 1234.56);
        assert_eq!(parse_amount("1.234.567"), 1234567.0);
    }

    #[test]
    fn dot_decimal_with_grouping() {
        assert_eq!(parse_amount("$1,234.56"), 1234.56);
        assert_eq!(parse_amount("1,234,567"), 1234567.0);
        assert_eq!(parse_amount("30%"), 30.0);
    }

    #[test]
    fn garbage_is_zero() {
        for text in [
            "", "   ", "abc", "1-2", "NaN", "inf", "--5", ".", "1O0", "1e3", "12abc3", "5x5",
            "12.", "1,,2", "- R$ -5", "5 kg",
        ] {
            let value = parse_amount(text);
            assert_eq!(value, 0.0, "{text:?}");
        }
    }

    #[test]
    fn currency_sign_placement() {
        assert_eq!(parse_amount("-R$ 5,50"), -5.5);
        assert_eq!(parse_amount("R$ -5,50"), -5.5);
        assert_eq!(parse_amount("€12"), 12.0);
        assert_eq!(parse_amount("£ 0.99"), 0.99);
    }

    #[test]
    fn costs_reject_negatives() {
        assert_eq!(parse_cost("total cost", "R$ 10,00").unwrap(), 10.0);
        assert_eq!(parse_cost("total cost", "oops").unwrap(), 0.0);
        let err = parse_cost("total cost", "R$ -3").unwrap_err();
        assert!(err.to_string().contains("total cost cannot be negative"));
    }

    #[test]
    fn counts() {
        assert_eq!(parse_count("12"), 12);
        assert_eq!(parse_count("2,9"), 2);
        assert_eq!(parse_count("-4"), 0);
        assert_eq!(parse_count("x"), 0);
    }
}
