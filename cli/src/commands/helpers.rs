use anyhow::{Context, Result, bail};
use serde::Serialize;

use mise_core::units::is_known_unit;

/// Parse a quantity with a unit, returning `(quantity, unit)`.
/// Accepts: "500g", "500 g", "1.5kg", "2 cups", "3 pcs".
pub(crate) fn parse_quantity_unit(s: &str) -> Result<(f64, String)> {
    let s = s.trim();

    let (qty, unit) = if let Some((qty, unit)) = split_number_unit(s) {
        (qty, unit)
    } else {
        let parts: Vec<&str> = s.splitn(2, char::is_whitespace).collect();
        if parts.len() != 2 {
            bail!("Invalid quantity format: '{s}'. Use '500g', '1.5 kg', '2 cups', etc.");
        }
        let qty: f64 = parts[0]
            .parse()
            .with_context(|| format!("Invalid quantity: '{s}'"))?;
        (qty, parts[1].trim())
    };

    if !qty.is_finite() || qty <= 0.0 {
        bail!("Quantity must be greater than 0");
    }
    if !is_known_unit(unit) {
        eprintln!(
            "Note: unit '{unit}' is not recognised; costing will treat it as the ingredient's base unit"
        );
    }
    Ok((qty, unit.to_lowercase()))
}

/// Split "500ml" or "2.5tbsp" into (500.0, "ml") or (2.5, "tbsp").
fn split_number_unit(s: &str) -> Option<(f64, &str)> {
    let idx = s.find(|c: char| c.is_alphabetic())?;
    if idx == 0 {
        return None;
    }
    let (num_part, unit_part) = s.split_at(idx);
    let qty: f64 = num_part.parse().ok()?;
    if unit_part.is_empty() {
        return None;
    }
    Some((qty, unit_part))
}

/// Parse a comma-separated id list such as "4,2,9".
pub(crate) fn parse_id_list(s: &str) -> Result<Vec<i64>> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<i64>()
                .with_context(|| format!("Invalid id '{p}' in '{s}'"))
        })
        .collect()
}

pub(crate) fn format_cost(cost: Option<f64>) -> String {
    cost.map_or_else(|| "-".to_string(), |c| format!("{:.2}", no_neg_zero(c)))
}

pub(crate) fn format_quantity(quantity: f64, unit: &str) -> String {
    let q = no_neg_zero(quantity);
    if q.fract() == 0.0 {
        format!("{q:.0} {unit}")
    } else {
        format!("{q} {unit}")
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity_unit_compact() {
        let (q, u) = parse_quantity_unit("500g").unwrap();
        assert!((q - 500.0).abs() < f64::EPSILON);
        assert_eq!(u, "g");

        let (q, u) = parse_quantity_unit("1.5KG").unwrap();
        assert!((q - 1.5).abs() < f64::EPSILON);
        assert_eq!(u, "kg");
    }

    #[test]
    fn test_parse_quantity_unit_spaced() {
        let (q, u) = parse_quantity_unit("2 cups").unwrap();
        assert!((q - 2.0).abs() < f64::EPSILON);
        assert_eq!(u, "cups");
    }

    #[test]
    fn test_parse_quantity_unit_invalid() {
        assert!(parse_quantity_unit("abc").is_err());
        assert!(parse_quantity_unit("500").is_err());
        assert!(parse_quantity_unit("0g").is_err());
        assert!(parse_quantity_unit("-3 kg").is_err());
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("4,2, 9").unwrap(), vec![4, 2, 9]);
        assert_eq!(parse_id_list("").unwrap(), Vec::<i64>::new());
        assert!(parse_id_list("4,x").is_err());
    }

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(None), "-");
        assert_eq!(format_cost(Some(7.0)), "7.00");
        assert_eq!(format_cost(Some(-0.0)), "0.00");
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(500.0, "g"), "500 g");
        assert_eq!(format_quantity(0.5, "batch"), "0.5 batch");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        // Should not panic on multi-byte characters
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("Béarnaise", 10), "Béarnaise");
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("nope"), "{\"error\":\"nope\"}");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
        assert_eq!(no_neg_zero(-3.0), -3.0);
    }
}
