//! Physical unit conversion for costing.
//!
//! Units fall into three categories, each with a category-internal standard:
//! grams for mass, milliliters for volume, pieces for count. Conversion only
//! happens within a category.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitCategory {
    Mass,
    Volume,
    Count,
}

/// Category and factor to the category standard for a unit, case-insensitive.
fn lookup(unit: &str) -> Option<(UnitCategory, f64)> {
    let lower = unit.trim().to_lowercase();
    let entry = match lower.as_str() {
        "g" | "gram" | "grams" => (UnitCategory::Mass, 1.0),
        "kg" | "kilogram" | "kilograms" => (UnitCategory::Mass, 1000.0),
        "mg" | "milligram" | "milligrams" => (UnitCategory::Mass, 0.001),
        "oz" | "ounce" | "ounces" => (UnitCategory::Mass, 28.3495),
        "lb" | "lbs" | "pound" | "pounds" => (UnitCategory::Mass, 453.592),
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => {
            (UnitCategory::Volume, 1.0)
        }
        "l" | "liter" | "liters" | "litre" | "litres" => (UnitCategory::Volume, 1000.0),
        "cl" => (UnitCategory::Volume, 10.0),
        "dl" => (UnitCategory::Volume, 100.0),
        "tsp" | "teaspoon" | "teaspoons" => (UnitCategory::Volume, 4.928_92),
        "tbsp" | "tablespoon" | "tablespoons" => (UnitCategory::Volume, 14.7868),
        "cup" | "cups" => (UnitCategory::Volume, 236.588),
        "fl_oz" | "fl oz" | "floz" => (UnitCategory::Volume, 29.5735),
        "pcs" | "pc" | "piece" | "pieces" => (UnitCategory::Count, 1.0),
        "dozen" => (UnitCategory::Count, 12.0),
        _ => return None,
    };
    Some(entry)
}

#[must_use]
pub fn unit_category(unit: &str) -> Option<UnitCategory> {
    lookup(unit).map(|(category, _)| category)
}

#[must_use]
pub fn is_known_unit(unit: &str) -> bool {
    lookup(unit).is_some()
}

/// Convert `quantity` expressed in `from_unit` into `to_base_unit`.
///
/// - Same unit (case-insensitive): the quantity is returned unchanged.
/// - Either unit unrecognized: the quantity is returned unchanged (treated as
///   already compatible). Callers that need to know should check
///   [`is_known_unit`].
/// - Both recognized but in different categories: `None`.
#[must_use]
pub fn convert(quantity: f64, from_unit: &str, to_base_unit: &str) -> Option<f64> {
    if from_unit.trim().eq_ignore_ascii_case(to_base_unit.trim()) {
        return Some(quantity);
    }

    let (Some((from_cat, from_factor)), Some((to_cat, to_factor))) =
        (lookup(from_unit), lookup(to_base_unit))
    else {
        return Some(quantity);
    };

    if from_cat != to_cat {
        return None;
    }

    Some(quantity * from_factor / to_factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_same_unit_is_identity() {
        assert_eq!(convert(3.5, "g", "g"), Some(3.5));
        assert_eq!(convert(3.5, "KG", "kg"), Some(3.5));
        // Same string, even if unknown
        assert_eq!(convert(2.0, "sprig", "SPRIG"), Some(2.0));
    }

    #[test]
    fn test_mass_conversions() {
        assert!(approx(convert(1.0, "kg", "g").unwrap(), 1000.0));
        assert!(approx(convert(500.0, "g", "kg").unwrap(), 0.5));
        assert!(approx(convert(1.0, "lb", "g").unwrap(), 453.592));
        assert!(approx(convert(1000.0, "mg", "g").unwrap(), 1.0));
    }

    #[test]
    fn test_volume_and_count_conversions() {
        assert!(approx(convert(2.0, "l", "ml").unwrap(), 2000.0));
        assert!(approx(convert(1.0, "cup", "ml").unwrap(), 236.588));
        assert!(approx(convert(3.0, "tbsp", "ml").unwrap(), 3.0 * 14.7868));
        assert!(approx(convert(2.0, "dozen", "pcs").unwrap(), 24.0));
    }

    #[test]
    fn test_case_insensitive_units() {
        assert!(approx(convert(1.0, "Kg", "G").unwrap(), 1000.0));
        assert!(approx(convert(1.0, "TBSP", "ml").unwrap(), 14.7868));
    }

    #[test]
    fn test_incompatible_categories_return_none() {
        assert_eq!(convert(1.0, "g", "ml"), None);
        assert_eq!(convert(1.0, "pcs", "kg"), None);
        assert_eq!(convert(1.0, "cup", "dozen"), None);
    }

    #[test]
    fn test_unknown_unit_passes_through() {
        assert_eq!(convert(4.0, "handful", "g"), Some(4.0));
        assert_eq!(convert(4.0, "g", "bunch"), Some(4.0));
        assert!(!is_known_unit("handful"));
        assert!(is_known_unit("Litres"));
    }

    #[test]
    fn test_unit_category() {
        assert_eq!(unit_category("oz"), Some(UnitCategory::Mass));
        assert_eq!(unit_category("fl_oz"), Some(UnitCategory::Volume));
        assert_eq!(unit_category("pieces"), Some(UnitCategory::Count));
        assert_eq!(unit_category(""), None);
    }
}
