use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mise_core::models::{NewRecipeIngredient, RecipeIngredient, UpdateRecipeIngredient};
use mise_core::{CoreError, MiseService};

use super::helpers::{json_error, no_neg_zero, parse_id_list, parse_quantity_unit, truncate};

pub(crate) fn cmd_line_add(
    svc: &MiseService,
    recipe_id: i64,
    ingredient_id: i64,
    quantity_str: &str,
    json: bool,
) -> Result<()> {
    let (quantity, unit) = parse_quantity_unit(quantity_str)?;
    let line = svc.add_recipe_ingredient(
        recipe_id,
        &NewRecipeIngredient {
            ingredient_id,
            quantity,
            unit,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&line)?);
    } else {
        let name = line.ingredient_name.as_deref().unwrap_or("?");
        let (q, u) = (line.quantity, &line.unit);
        println!("Added {q} {u} of {name} to recipe {recipe_id} (line {})", line.id);
    }
    Ok(())
}

pub(crate) fn cmd_line_list(svc: &MiseService, recipe_id: i64, json: bool) -> Result<()> {
    let lines = svc.list_recipe_ingredients(recipe_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
        return Ok(());
    }
    if lines.is_empty() {
        eprintln!("Recipe {recipe_id} has no ingredient lines");
        return Ok(());
    }
    print_lines(&lines);
    Ok(())
}

pub(crate) fn cmd_line_update(
    svc: &MiseService,
    line_id: i64,
    quantity_str: &str,
    json: bool,
) -> Result<()> {
    let (quantity, unit) = parse_quantity_unit(quantity_str)?;
    let line = svc.update_recipe_ingredient(
        line_id,
        &UpdateRecipeIngredient {
            quantity: Some(quantity),
            unit: Some(unit),
        },
    )?;
    if json {
        println!("{}", serde_json::to_string_pretty(&line)?);
    } else {
        println!("Updated line {line_id}: {} {}", line.quantity, line.unit);
    }
    Ok(())
}

pub(crate) fn cmd_line_remove(svc: &MiseService, line_id: i64, json: bool) -> Result<()> {
    match svc.remove_recipe_ingredient(line_id) {
        Ok(()) => {
            if json {
                println!("{}", serde_json::json!({ "removed": line_id }));
            } else {
                println!("Removed line {line_id}");
            }
            Ok(())
        }
        Err(CoreError::NotFound { .. }) => {
            let msg = format!("Recipe ingredient line {line_id} not found");
            if json {
                println!("{}", json_error(&msg));
            } else {
                eprintln!("{msg}");
            }
            process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn cmd_line_reorder(
    svc: &MiseService,
    recipe_id: i64,
    ids: &str,
    json: bool,
) -> Result<()> {
    let ordered = parse_id_list(ids)?;
    let lines = svc.reorder_recipe_ingredients(recipe_id, &ordered)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else {
        print_lines(&lines);
    }
    Ok(())
}

fn print_lines(lines: &[RecipeIngredient]) {
    #[derive(Tabled)]
    struct LineRow {
        #[tabled(rename = "#")]
        order: i64,
        #[tabled(rename = "Line")]
        id: i64,
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
    }

    let rows: Vec<LineRow> = lines
        .iter()
        .map(|l| LineRow {
            order: l.sort_order,
            id: l.id,
            name: truncate(l.ingredient_name.as_deref().unwrap_or("?"), 35),
            quantity: format!("{}", no_neg_zero(l.quantity)),
            unit: l.unit.clone(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
