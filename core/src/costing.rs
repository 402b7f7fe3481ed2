//! Recursive batch costing over the sub-recipe graph.

use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    BomEdge, CostBreakdownItem, CostLineKind, CostingResult, RecipeIngredient, SubRecipeUnit,
};
use crate::units::{convert, is_known_unit};

/// Cost one batch of `recipe_id`, including every nested sub-recipe.
///
/// Children are costed before their parents with an explicit stack. A recipe
/// reached twice through different parents is costed once. A recipe reached
/// again while still on the current path means the graph holds a loop, which
/// fails with [`CoreError::InternalConsistency`].
pub fn roll_up_cost(db: &Database, recipe_id: i64) -> CoreResult<CostingResult> {
    if !db.recipe_exists(recipe_id)? {
        return Err(CoreError::not_found("Recipe", recipe_id));
    }

    let mut memo: HashMap<i64, CostingResult> = HashMap::new();
    let mut on_path: HashSet<i64> = HashSet::new();
    // (recipe_id, children already pushed)
    let mut stack = vec![(recipe_id, false)];

    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            let result = cost_recipe(db, id, &memo)?;
            on_path.remove(&id);
            memo.insert(id, result);
            continue;
        }
        if memo.contains_key(&id) {
            continue;
        }
        if !on_path.insert(id) {
            error!(recipe_id, revisited = id, "Sub-recipe loop found while costing");
            return Err(CoreError::InternalConsistency(format!(
                "recipe {id} contains itself; costing of recipe {recipe_id} aborted"
            )));
        }
        stack.push((id, true));
        for child_id in db.child_recipe_ids(id)? {
            if !memo.contains_key(&child_id) {
                stack.push((child_id, false));
            }
        }
    }

    debug!(recipe_id, recipes_costed = memo.len(), "Cost roll-up finished");
    memo.remove(&recipe_id).ok_or_else(|| {
        CoreError::InternalConsistency(format!("recipe {recipe_id} was not costed"))
    })
}

/// Roll up the cost and cache the per-portion figure on the recipe.
pub fn recompute_cost(db: &Database, recipe_id: i64) -> CoreResult<CostingResult> {
    let result = roll_up_cost(db, recipe_id)?;
    db.set_recipe_cost_price(recipe_id, result.cost_per_portion)?;
    info!(
        recipe_id,
        cost_per_portion = ?result.cost_per_portion,
        missing = result.missing.len(),
        "Stored cost snapshot"
    );
    Ok(result)
}

/// Cost a single recipe whose children are all present in `memo`.
fn cost_recipe(
    db: &Database,
    recipe_id: i64,
    memo: &HashMap<i64, CostingResult>,
) -> CoreResult<CostingResult> {
    let recipe = db.get_recipe(recipe_id)?;
    let mut breakdown = Vec::new();
    let mut missing = Vec::new();
    let mut known_cost = 0.0;

    for line in db.get_recipe_ingredients(recipe_id)? {
        let item = cost_ingredient_line(db, recipe_id, &line)?;
        match item.line_cost {
            Some(cost) => known_cost += cost,
            None => push_missing(&mut missing, &item.name),
        }
        breakdown.push(item);
    }

    for edge in db.bom_edges_for_parent(recipe_id)? {
        let child = memo.get(&edge.child_recipe_id).ok_or_else(|| {
            CoreError::InternalConsistency(format!(
                "sub-recipe {} of recipe {recipe_id} was not costed first",
                edge.child_recipe_id
            ))
        })?;
        let batches = batches_of_child(&edge, child);
        if batches.is_none() {
            debug!(
                recipe_id,
                child_id = child.recipe_id,
                unit = %edge.unit,
                "Sub-recipe quantity cannot be scaled against child yield"
            );
            push_missing(&mut missing, &child.recipe_name);
        }
        for name in &child.missing {
            push_missing(&mut missing, name);
        }
        // An incomplete child still contributes its priced share
        if let Some(b) = batches {
            known_cost += b * child.batch_cost.unwrap_or(child.known_cost);
        }
        breakdown.push(CostBreakdownItem {
            kind: CostLineKind::SubRecipe,
            item_id: child.recipe_id,
            name: child.recipe_name.clone(),
            quantity: edge.quantity,
            unit: edge.unit.to_string(),
            quantity_in_base_unit: batches,
            base_unit: SubRecipeUnit::Batch.to_string(),
            cost_per_base_unit: child.batch_cost,
            line_cost: batches.zip(child.batch_cost).map(|(b, cost)| b * cost),
            unit_assumed: false,
        });
    }

    let batch_cost = missing.is_empty().then_some(known_cost);
    let cost_per_portion = batch_cost
        .filter(|_| recipe.yield_quantity > 0.0)
        .map(|cost| cost / recipe.yield_quantity);

    Ok(CostingResult {
        recipe_id,
        recipe_name: recipe.name,
        yield_quantity: recipe.yield_quantity,
        yield_unit: recipe.yield_unit,
        breakdown,
        batch_cost,
        cost_per_portion,
        known_cost,
        missing,
    })
}

fn cost_ingredient_line(
    db: &Database,
    recipe_id: i64,
    line: &RecipeIngredient,
) -> CoreResult<CostBreakdownItem> {
    let ingredient = db.get_ingredient(line.ingredient_id)?;

    let same_unit = line.unit.trim().eq_ignore_ascii_case(ingredient.base_unit.trim());
    let unit_assumed =
        !same_unit && !(is_known_unit(&line.unit) && is_known_unit(&ingredient.base_unit));
    if unit_assumed {
        warn!(
            recipe_id,
            ingredient = %ingredient.name,
            unit = %line.unit,
            base_unit = %ingredient.base_unit,
            "Unrecognized unit costed as the ingredient base unit"
        );
    }

    let converted = convert(line.quantity, &line.unit, &ingredient.base_unit);
    let line_cost = converted
        .zip(ingredient.cost_per_base_unit)
        .map(|(qty, cost)| qty * cost);

    Ok(CostBreakdownItem {
        kind: CostLineKind::Ingredient,
        item_id: ingredient.id,
        name: ingredient.name,
        quantity: line.quantity,
        unit: line.unit.clone(),
        quantity_in_base_unit: converted,
        base_unit: ingredient.base_unit,
        cost_per_base_unit: ingredient.cost_per_base_unit,
        line_cost,
        unit_assumed,
    })
}

/// How many child batches an edge asks for, or `None` if it cannot be scaled.
fn batches_of_child(edge: &BomEdge, child: &CostingResult) -> Option<f64> {
    match edge.unit {
        SubRecipeUnit::Batch => Some(edge.quantity),
        SubRecipeUnit::Portion => {
            (child.yield_quantity > 0.0).then(|| edge.quantity / child.yield_quantity)
        }
        SubRecipeUnit::Gram | SubRecipeUnit::Milliliter => {
            if child.yield_quantity <= 0.0 || !is_known_unit(&child.yield_unit) {
                return None;
            }
            convert(edge.quantity, edge.unit.as_str(), &child.yield_unit)
                .map(|qty| qty / child.yield_quantity)
        }
    }
}

fn push_missing(missing: &mut Vec<String>, name: &str) {
    if !missing.iter().any(|m| m == name) {
        missing.push(name.to_string());
    }
}
