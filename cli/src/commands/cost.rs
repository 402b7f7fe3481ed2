use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mise_core::MiseService;
use mise_core::models::{CostLineKind, CostingResult};

use super::helpers::{format_cost, format_quantity, truncate};

/// Show the rolled-up cost of a recipe. `save` stores the per-portion cost.
pub(crate) fn cmd_cost(svc: &MiseService, recipe_id: i64, save: bool, json: bool) -> Result<()> {
    let result = if save {
        svc.recompute_cost(recipe_id)?
    } else {
        svc.get_recipe_cost(recipe_id)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_costing(&result);
    if save {
        println!("\nSaved cost/portion: {}", format_cost(result.cost_per_portion));
    }
    Ok(())
}

fn print_costing(result: &CostingResult) {
    #[derive(Tabled)]
    struct CostRow {
        #[tabled(rename = "Kind")]
        kind: &'static str,
        #[tabled(rename = "Item")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "In base unit")]
        base: String,
        #[tabled(rename = "Unit cost")]
        unit_cost: String,
        #[tabled(rename = "Cost")]
        cost: String,
    }

    let name = &result.recipe_name;
    println!(
        "=== {name} ({}) ===",
        format_quantity(result.yield_quantity, &result.yield_unit)
    );

    if result.breakdown.is_empty() {
        println!("  (no ingredients or sub-recipes)");
    } else {
        let rows: Vec<CostRow> = result
            .breakdown
            .iter()
            .map(|item| CostRow {
                kind: match item.kind {
                    CostLineKind::Ingredient => "ingredient",
                    CostLineKind::SubRecipe => "sub-recipe",
                },
                name: if item.unit_assumed {
                    format!("{} (unit assumed)", truncate(&item.name, 25))
                } else {
                    truncate(&item.name, 30)
                },
                quantity: format_quantity(item.quantity, &item.unit),
                base: item.quantity_in_base_unit.map_or_else(
                    || "-".to_string(),
                    |q| format_quantity(q, &item.base_unit),
                ),
                unit_cost: item
                    .cost_per_base_unit
                    .map_or_else(|| "-".to_string(), |c| format!("{c:.4}")),
                cost: format_cost(item.line_cost),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    println!(
        "\n  Batch cost: {}  |  Per portion: {}",
        format_cost(result.batch_cost),
        format_cost(result.cost_per_portion)
    );
    if !result.is_complete() {
        println!("  Known so far: {}", format_cost(Some(result.known_cost)));
        println!("  Missing costs: {}", result.missing.join(", "));
    }
}
