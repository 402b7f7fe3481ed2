use mise_core::units::{UnitCategory, convert, unit_category};
use proptest::prelude::*;
use proptest::test_runner::Config;

const MASS: &[&str] = &["g", "kg", "mg", "oz", "lb"];
const VOLUME: &[&str] = &["ml", "l", "cl", "dl", "tsp", "tbsp", "cup", "fl_oz"];
const COUNT: &[&str] = &["pcs", "dozen"];

fn same_category_pair() -> impl Strategy<Value = (&'static str, &'static str)> {
    prop_oneof![
        (prop::sample::select(MASS), prop::sample::select(MASS)),
        (prop::sample::select(VOLUME), prop::sample::select(VOLUME)),
        (prop::sample::select(COUNT), prop::sample::select(COUNT)),
    ]
}

proptest! {
    #![proptest_config(Config::with_cases(256))]
    #[test]
    fn convert_round_trips_within_category(
        (from, to) in same_category_pair(),
        quantity in 0.001_f64..1_000_000.0_f64
    ) {
        let there = convert(quantity, from, to).expect("same category converts");
        let back = convert(there, to, from).expect("same category converts");
        prop_assert!((back - quantity).abs() <= 1e-9 * quantity.max(1.0));
    }

    #[test]
    fn convert_across_categories_is_none(
        mass in prop::sample::select(MASS),
        volume in prop::sample::select(VOLUME),
        quantity in 0.001_f64..1000.0_f64
    ) {
        prop_assert_eq!(convert(quantity, mass, volume), None);
        prop_assert_eq!(convert(quantity, volume, mass), None);
    }

    #[test]
    fn convert_is_case_insensitive(
        (from, to) in same_category_pair(),
        quantity in 0.001_f64..1000.0_f64
    ) {
        prop_assert_eq!(
            convert(quantity, &from.to_uppercase(), to),
            convert(quantity, from, to)
        );
    }
}

#[test]
fn test_unit_tables_are_categorised() {
    for unit in MASS {
        assert_eq!(unit_category(unit), Some(UnitCategory::Mass));
    }
    for unit in VOLUME {
        assert_eq!(unit_category(unit), Some(UnitCategory::Volume));
    }
    for unit in COUNT {
        assert_eq!(unit_category(unit), Some(UnitCategory::Count));
    }
}
