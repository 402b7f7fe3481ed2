use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mise_core::MiseService;
use mise_core::models::{NewRecipe, Recipe, RecipeStatus, UpdateRecipe, VersionEntry};

use super::helpers::{format_cost, format_quantity, truncate};

pub(crate) struct RecipeArgs {
    pub name: String,
    pub yield_quantity: f64,
    pub yield_unit: String,
    pub instructions: Option<String>,
    pub status: Option<String>,
    pub is_public: bool,
    pub owner_id: Option<String>,
}

pub(crate) fn cmd_recipe_create(svc: &MiseService, args: RecipeArgs, json: bool) -> Result<()> {
    let status = match args.status.as_deref() {
        Some(s) => s.parse::<RecipeStatus>()?,
        None => RecipeStatus::Draft,
    };
    let recipe = svc.create_recipe(&NewRecipe {
        name: args.name,
        yield_quantity: args.yield_quantity,
        yield_unit: args.yield_unit,
        instructions: args.instructions,
        status,
        is_public: args.is_public,
        owner_id: args.owner_id,
    })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let (id, name) = (recipe.id, &recipe.name);
        println!("Created recipe: {name} (id: {id}, yield: {})", yield_label(&recipe));
        println!("Add ingredients with: mise line add {id} <ingredient-id> <quantity>");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(
    svc: &MiseService,
    status: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Ver")]
        version: i64,
        #[tabled(rename = "Yield")]
        yield_label: String,
        #[tabled(rename = "Cost/portion")]
        cost: String,
    }

    let status = status.map(str::parse::<RecipeStatus>).transpose()?;
    let recipes = svc.list_recipes(status)?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            name: truncate(&r.name, 30),
            status: r.status.to_string(),
            version: r.version,
            yield_label: yield_label(r),
            cost: format_cost(r.cost_price),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_recipe_show(svc: &MiseService, recipe_id: i64, json: bool) -> Result<()> {
    let recipe = svc.get_recipe(recipe_id)?;
    let lines = svc.list_recipe_ingredients(recipe_id)?;
    let subs = svc.list_sub_recipes(recipe_id)?;

    if json {
        let detail = serde_json::json!({
            "recipe": recipe,
            "ingredients": lines,
            "sub_recipes": subs,
        });
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let name = &recipe.name;
    println!("=== {name} (v{}) ===", recipe.version);
    println!(
        "  Status: {}  |  Yield: {}  |  Visibility: {}",
        recipe.status,
        yield_label(&recipe),
        if recipe.is_public { "public" } else { "private" }
    );
    if let Some(owner) = &recipe.owner_id {
        println!("  Owner: {owner}");
    }
    if let Some(root) = recipe.root_id {
        println!("  Forked from: recipe {root}");
    }
    println!("  Cost/portion: {}", format_cost(recipe.cost_price));

    println!("\n  INGREDIENTS:");
    if lines.is_empty() {
        println!("    (none)");
    }
    for line in &lines {
        let iname = line.ingredient_name.as_deref().unwrap_or("?");
        println!(
            "    [{}] {iname}: {}",
            line.id,
            format_quantity(line.quantity, &line.unit)
        );
    }

    if !subs.is_empty() {
        println!("\n  SUB-RECIPES:");
        for edge in &subs {
            let child = svc
                .get_recipe(edge.child_recipe_id)
                .map_or_else(|_| "?".to_string(), |r| r.name);
            println!(
                "    [{}] {child}: {}",
                edge.id,
                format_quantity(edge.quantity, edge.unit.as_str())
            );
        }
    }

    if let Some(instructions) = &recipe.instructions {
        println!("\n  INSTRUCTIONS:\n    {instructions}");
    }

    Ok(())
}

pub(crate) fn cmd_recipe_update(
    svc: &MiseService,
    recipe_id: i64,
    update: &UpdateRecipe,
    json: bool,
) -> Result<()> {
    let recipe = svc.update_recipe(recipe_id, update)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        println!("Updated recipe {recipe_id}: {}", recipe.name);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_status(
    svc: &MiseService,
    recipe_id: i64,
    status: &str,
    json: bool,
) -> Result<()> {
    let status: RecipeStatus = status.parse()?;
    print_status_change(&svc.set_recipe_status(recipe_id, status)?, json)
}

pub(crate) fn cmd_recipe_archive(svc: &MiseService, recipe_id: i64, json: bool) -> Result<()> {
    print_status_change(&svc.archive_recipe(recipe_id)?, json)
}

fn print_status_change(recipe: &Recipe, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(recipe)?);
    } else {
        println!("{} is now {}", recipe.name, recipe.status);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(svc: &MiseService, recipe_id: i64, json: bool) -> Result<()> {
    svc.delete_recipe(recipe_id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": recipe_id }));
    } else {
        println!("Deleted recipe {recipe_id}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_fork(
    svc: &MiseService,
    recipe_id: i64,
    owner_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let forked = svc.fork_recipe(recipe_id, owner_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&forked)?);
    } else {
        println!(
            "Forked recipe {recipe_id} into {} (id: {}, version {})",
            forked.name, forked.id, forked.version
        );
    }
    Ok(())
}

pub(crate) fn cmd_recipe_versions(
    svc: &MiseService,
    recipe_id: i64,
    viewer_id: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct VersionRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Ver")]
        version: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Forked from")]
        parent: String,
    }

    let tree = svc.get_version_tree(recipe_id, viewer_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }
    if tree.is_empty() {
        eprintln!("No versions found for recipe {recipe_id}");
        process::exit(2);
    }

    let rows: Vec<VersionRow> = tree
        .iter()
        .map(|entry| {
            let (name, status) = match entry {
                VersionEntry::Full(r) => (truncate(&r.name, 30), r.status.to_string()),
                VersionEntry::Masked(m) => ("(private)".to_string(), m.status.to_string()),
            };
            VersionRow {
                id: entry.id(),
                version: entry.version(),
                name,
                status,
                parent: entry.root_id().map_or_else(|| "-".to_string(), |p| p.to_string()),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

fn yield_label(recipe: &Recipe) -> String {
    format_quantity(recipe.yield_quantity, &recipe.yield_unit)
}
