use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mise_core::MiseService;
use mise_core::models::{NewIngredient, UpdateIngredient};
use mise_core::units::is_known_unit;

use super::helpers::{format_cost, truncate};

pub(crate) fn cmd_ingredient_add(
    svc: &MiseService,
    ingredient: &NewIngredient,
    json: bool,
) -> Result<()> {
    if !is_known_unit(&ingredient.base_unit) {
        eprintln!(
            "Note: base unit '{}' is not recognised; lines in other units cannot be converted",
            ingredient.base_unit
        );
    }
    let created = svc.add_ingredient(ingredient)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        let id = created.id;
        let name = &created.name;
        let unit = &created.base_unit;
        let cost = format_cost(created.cost_per_base_unit);
        println!("Added ingredient: {name} (id: {id}, {cost} per {unit})");
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_list(
    svc: &MiseService,
    search: Option<&str>,
    include_inactive: bool,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Cost/unit")]
        cost: String,
        #[tabled(rename = "Active")]
        active: String,
    }

    let ingredients = svc.list_ingredients(search, include_inactive)?;
    if ingredients.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No ingredients found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
        return Ok(());
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 35),
            unit: i.base_unit.clone(),
            cost: i
                .cost_per_base_unit
                .map_or_else(|| "-".to_string(), |c| format!("{c:.4}")),
            active: if i.is_active { "yes" } else { "no" }.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_ingredient_update(
    svc: &MiseService,
    ingredient_id: i64,
    update: &UpdateIngredient,
    json: bool,
) -> Result<()> {
    let ingredient = svc.update_ingredient(ingredient_id, update)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        let name = &ingredient.name;
        let unit = &ingredient.base_unit;
        let cost = format_cost(ingredient.cost_per_base_unit);
        println!("Updated {name}: {cost} per {unit}");
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_deactivate(
    svc: &MiseService,
    ingredient_id: i64,
    json: bool,
) -> Result<()> {
    let ingredient = svc.deactivate_ingredient(ingredient_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        println!("Deactivated {}", ingredient.name);
    }
    Ok(())
}
