//! Recipe composition graph: which recipes include which.
//!
//! Edges live in `recipe_recipes`. The edge set is kept acyclic at the single
//! write path, [`add_edge`]; read paths still guard against loops so corrupted
//! rows surface as [`CoreError::InternalConsistency`] instead of runaway
//! recursion.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    BomEdge, BomTreeChild, BomTreeNode, SubRecipeUnit, UpdateBomEdge, validate_positive,
};

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Whether `parent_id -> child_id` can be added without closing a loop.
///
/// Walks down from `child_id`; reaching `parent_id` means the child already
/// (transitively) contains the parent.
pub fn can_add(db: &Database, parent_id: i64, child_id: i64) -> CoreResult<bool> {
    if parent_id == child_id {
        return Ok(false);
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([child_id]);
    while let Some(current) = queue.pop_front() {
        if current == parent_id {
            return Ok(false);
        }
        if !visited.insert(current) {
            continue;
        }
        for next in db.child_recipe_ids(current)? {
            if !visited.contains(&next) {
                queue.push_back(next);
            }
        }
    }
    debug!(parent_id, child_id, visited = visited.len(), "Cycle check passed");
    Ok(true)
}

/// Link `child_id` under `parent_id` at the end of the parent's list.
///
/// Existence, cycle and duplicate checks run inside the same write
/// transaction as the insert.
pub fn add_edge(
    db: &Database,
    parent_id: i64,
    child_id: i64,
    quantity: f64,
    unit: SubRecipeUnit,
) -> CoreResult<BomEdge> {
    if parent_id == child_id {
        return Err(CoreError::CycleDetected {
            parent_id,
            child_id,
        });
    }
    validate_positive("quantity", quantity)?;

    let tx = db.immediate_transaction()?;

    if !db.recipe_exists(parent_id)? {
        return Err(CoreError::not_found("Recipe", parent_id));
    }
    if !db.recipe_exists(child_id)? {
        return Err(CoreError::not_found("Recipe", child_id));
    }
    if !can_add(db, parent_id, child_id)? {
        warn!(parent_id, child_id, "Rejected sub-recipe link that would form a cycle");
        return Err(CoreError::CycleDetected {
            parent_id,
            child_id,
        });
    }
    if db.find_bom_edge(parent_id, child_id)?.is_some() {
        return Err(CoreError::DuplicateEdge {
            parent_id,
            child_id,
        });
    }

    let position = db.max_bom_position(parent_id)?.map_or(0, |max| max + 1);
    let edge = db.insert_bom_edge_row(parent_id, child_id, quantity, unit, position)?;
    tx.commit()?;

    info!(
        edge_id = edge.id,
        parent_id,
        child_id,
        quantity,
        unit = %unit,
        position,
        "Added sub-recipe"
    );
    Ok(edge)
}

pub fn update_edge(db: &Database, edge_id: i64, update: &UpdateBomEdge) -> CoreResult<BomEdge> {
    let edge = db.update_bom_edge(edge_id, update)?;
    info!(edge_id, quantity = edge.quantity, unit = %edge.unit, "Updated sub-recipe");
    Ok(edge)
}

pub fn remove_edge(db: &Database, edge_id: i64) -> CoreResult<()> {
    db.delete_bom_edge(edge_id)?;
    info!(edge_id, "Removed sub-recipe");
    Ok(())
}

/// Set each edge's position to its index in `ordered_edge_ids`.
///
/// Ids that do not belong to `parent_id` are skipped.
pub fn reorder(db: &Database, parent_id: i64, ordered_edge_ids: &[i64]) -> CoreResult<Vec<BomEdge>> {
    if !db.recipe_exists(parent_id)? {
        return Err(CoreError::not_found("Recipe", parent_id));
    }

    let tx = db.immediate_transaction()?;
    let mut ignored = 0_usize;
    for (index, edge_id) in ordered_edge_ids.iter().enumerate() {
        if !db.set_bom_edge_position(*edge_id, parent_id, index as i64)? {
            ignored += 1;
        }
    }
    tx.commit()?;

    if ignored > 0 {
        debug!(parent_id, ignored, "Reorder skipped ids from other recipes");
    }
    db.bom_edges_for_parent(parent_id)
}

/// Direct sub-recipes of `recipe_id`, in position order.
pub fn list_sub_recipes(db: &Database, recipe_id: i64) -> CoreResult<Vec<BomEdge>> {
    if !db.recipe_exists(recipe_id)? {
        return Err(CoreError::not_found("Recipe", recipe_id));
    }
    db.bom_edges_for_parent(recipe_id)
}

/// Links where `recipe_id` is the child.
pub fn used_in(db: &Database, recipe_id: i64) -> CoreResult<Vec<BomEdge>> {
    if !db.recipe_exists(recipe_id)? {
        return Err(CoreError::not_found("Recipe", recipe_id));
    }
    db.bom_edges_for_child(recipe_id)
}

/// Nested bill of materials for `recipe_id`.
///
/// Nodes at `max_depth` are emitted with `truncated` set and no children.
pub fn render_tree(db: &Database, recipe_id: i64, max_depth: usize) -> CoreResult<BomTreeNode> {
    if !db.recipe_exists(recipe_id)? {
        return Err(CoreError::not_found("Recipe", recipe_id));
    }
    let mut path = Vec::new();
    render_node(db, recipe_id, 0, max_depth, &mut path)
}

fn render_node(
    db: &Database,
    recipe_id: i64,
    depth: usize,
    max_depth: usize,
    path: &mut Vec<i64>,
) -> CoreResult<BomTreeNode> {
    if path.contains(&recipe_id) {
        error!(recipe_id, ?path, "Sub-recipe loop found while rendering tree");
        return Err(CoreError::InternalConsistency(format!(
            "recipe {recipe_id} contains itself via {path:?}"
        )));
    }

    if depth >= max_depth {
        return Ok(BomTreeNode {
            recipe_id,
            recipe_name: None,
            truncated: true,
            not_found: false,
            children: Vec::new(),
        });
    }

    let Some(recipe) = db.find_recipe(recipe_id)? else {
        return Ok(BomTreeNode {
            recipe_id,
            recipe_name: None,
            truncated: false,
            not_found: true,
            children: Vec::new(),
        });
    };

    path.push(recipe_id);
    let mut children = Vec::new();
    for edge in db.bom_edges_for_parent(recipe_id)? {
        let child = render_node(db, edge.child_recipe_id, depth + 1, max_depth, path)?;
        children.push(BomTreeChild {
            link_id: edge.id,
            edge_quantity: edge.quantity,
            edge_unit: edge.unit,
            position: edge.position,
            child,
        });
    }
    path.pop();

    Ok(BomTreeNode {
        recipe_id,
        recipe_name: Some(recipe.name),
        truncated: false,
        not_found: false,
        children,
    })
}
