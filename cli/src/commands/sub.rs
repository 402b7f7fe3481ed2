use anyhow::Result;
use std::fmt::Write;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mise_core::models::{BomEdge, BomTreeNode, SubRecipeUnit, UpdateBomEdge};
use mise_core::{CoreError, MiseService};

use super::helpers::{format_quantity, json_error, parse_id_list, truncate};

pub(crate) fn cmd_sub_add(
    svc: &MiseService,
    parent_id: i64,
    child_id: i64,
    quantity: f64,
    unit: &str,
    json: bool,
) -> Result<()> {
    let unit: SubRecipeUnit = unit.parse()?;
    let edge = svc.add_sub_recipe(parent_id, child_id, quantity, unit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&edge)?);
    } else {
        println!(
            "Added {} of recipe {child_id} to recipe {parent_id} (link {})",
            format_quantity(edge.quantity, edge.unit.as_str()),
            edge.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_sub_list(svc: &MiseService, parent_id: i64, json: bool) -> Result<()> {
    let edges = svc.list_sub_recipes(parent_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&edges)?);
        return Ok(());
    }
    if edges.is_empty() {
        eprintln!("Recipe {parent_id} has no sub-recipes");
        return Ok(());
    }
    print_edges(svc, &edges, |e| e.child_recipe_id);
    Ok(())
}

pub(crate) fn cmd_sub_update(
    svc: &MiseService,
    edge_id: i64,
    quantity: Option<f64>,
    unit: Option<&str>,
    json: bool,
) -> Result<()> {
    if quantity.is_none() && unit.is_none() {
        anyhow::bail!("Nothing to update. Pass --quantity and/or --unit");
    }
    let unit = unit.map(str::parse::<SubRecipeUnit>).transpose()?;
    let edge = svc.update_sub_recipe(edge_id, &UpdateBomEdge { quantity, unit })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&edge)?);
    } else {
        println!(
            "Updated link {edge_id}: {}",
            format_quantity(edge.quantity, edge.unit.as_str())
        );
    }
    Ok(())
}

pub(crate) fn cmd_sub_remove(svc: &MiseService, edge_id: i64, json: bool) -> Result<()> {
    match svc.remove_sub_recipe(edge_id) {
        Ok(()) => {
            if json {
                println!("{}", serde_json::json!({ "removed": edge_id }));
            } else {
                println!("Removed sub-recipe link {edge_id}");
            }
            Ok(())
        }
        Err(CoreError::NotFound { .. }) => {
            let msg = format!("Sub-recipe link {edge_id} not found");
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

pub(crate) fn cmd_sub_reorder(
    svc: &MiseService,
    parent_id: i64,
    ids: &str,
    json: bool,
) -> Result<()> {
    let ordered = parse_id_list(ids)?;
    let edges = svc.reorder_sub_recipes(parent_id, &ordered)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&edges)?);
    } else {
        print_edges(svc, &edges, |e| e.child_recipe_id);
    }
    Ok(())
}

pub(crate) fn cmd_sub_used_in(svc: &MiseService, recipe_id: i64, json: bool) -> Result<()> {
    let edges = svc.get_used_in(recipe_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&edges)?);
        return Ok(());
    }
    if edges.is_empty() {
        eprintln!("Recipe {recipe_id} is not used in any other recipe");
        return Ok(());
    }
    print_edges(svc, &edges, |e| e.parent_recipe_id);
    Ok(())
}

pub(crate) fn cmd_sub_tree(
    svc: &MiseService,
    recipe_id: i64,
    max_depth: Option<usize>,
    json: bool,
) -> Result<()> {
    let tree = svc.get_bom_tree(recipe_id, max_depth)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }
    let mut out = String::new();
    render_node(&tree, "", &mut out);
    print!("{out}");
    Ok(())
}

fn node_label(node: &BomTreeNode) -> String {
    let mut label = match node.recipe_name.as_deref() {
        Some(name) => format!("{name} [{}]", node.recipe_id),
        None => format!("[{}]", node.recipe_id),
    };
    if node.not_found {
        label.push_str(" (missing)");
    } else if node.truncated {
        label.push_str(" ...");
    }
    label
}

fn render_node(node: &BomTreeNode, prefix: &str, out: &mut String) {
    if prefix.is_empty() {
        out.push_str(&node_label(node));
        out.push('\n');
    }
    let count = node.children.len();
    for (i, link) in node.children.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let qty = format_quantity(link.edge_quantity, link.edge_unit.as_str());
        let _ = writeln!(out, "{prefix}{branch}{qty} × {}", node_label(&link.child));
        let next = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_node(&link.child, &next, out);
    }
}

/// `other_end` picks which recipe of each link to show by name.
fn print_edges(svc: &MiseService, edges: &[BomEdge], other_end: impl Fn(&BomEdge) -> i64) {
    #[derive(Tabled)]
    struct EdgeRow {
        #[tabled(rename = "#")]
        position: i64,
        #[tabled(rename = "Link")]
        id: i64,
        #[tabled(rename = "Recipe")]
        recipe: String,
        #[tabled(rename = "Qty")]
        quantity: String,
    }

    let rows: Vec<EdgeRow> = edges
        .iter()
        .map(|e| {
            let id = other_end(e);
            let name = svc
                .get_recipe(id)
                .map_or_else(|_| "?".to_string(), |r| r.name);
            EdgeRow {
                position: e.position,
                id: e.id,
                recipe: format!("{} [{id}]", truncate(&name, 30)),
                quantity: format_quantity(e.quantity, e.unit.as_str()),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
