mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    RecipeArgs, cmd_cost, cmd_ingredient_add, cmd_ingredient_deactivate, cmd_ingredient_list,
    cmd_ingredient_update, cmd_line_add, cmd_line_list, cmd_line_remove, cmd_line_reorder,
    cmd_line_update, cmd_recipe_archive, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_fork,
    cmd_recipe_list, cmd_recipe_show, cmd_recipe_status, cmd_recipe_update, cmd_recipe_versions,
    cmd_sub_add, cmd_sub_list, cmd_sub_remove, cmd_sub_reorder, cmd_sub_tree, cmd_sub_update,
    cmd_sub_used_in,
};
use crate::config::Config;
use mise_core::MiseService;
use mise_core::models::{NewIngredient, UpdateIngredient, UpdateRecipe};

#[derive(Parser)]
#[command(
    name = "mise",
    version,
    about = "Recipe costing, sub-recipes and version lineage",
    long_about = "Recipe costing, sub-recipes and version lineage.\n\n\
        Recipes are built from priced ingredients and from other recipes.\n\
        Costs roll up through every level of sub-recipe."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Manage the ingredient catalogue
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Manage a recipe's ingredient lines
    Line {
        #[command(subcommand)]
        command: LineCommands,
    },
    /// Manage sub-recipes (recipes used inside other recipes)
    Sub {
        #[command(subcommand)]
        command: SubCommands,
    },
    /// Show the rolled-up cost of a recipe
    Cost {
        /// Recipe ID
        recipe_id: i64,
        /// Store the per-portion cost on the recipe
        #[arg(long)]
        save: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a new recipe
    Create {
        /// Recipe name
        name: String,
        /// How much one batch makes
        #[arg(short = 'y', long = "yield", default_value = "1")]
        yield_quantity: f64,
        /// Unit of the yield (e.g. portion, g, ml)
        #[arg(short = 'u', long, default_value = "portion")]
        yield_unit: String,
        /// Method / instructions text
        #[arg(long)]
        instructions: Option<String>,
        /// Initial status: draft, active, archived (default: draft)
        #[arg(long)]
        status: Option<String>,
        /// Make the recipe visible to everyone
        #[arg(long)]
        public: bool,
        /// Owner identifier
        #[arg(long)]
        owner: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// Only show recipes with this status
        #[arg(short, long)]
        status: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe with its ingredient lines and sub-recipes
    Show {
        /// Recipe ID
        recipe_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update recipe metadata
    Update {
        /// Recipe ID
        recipe_id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New yield quantity
        #[arg(long = "yield")]
        yield_quantity: Option<f64>,
        /// New yield unit
        #[arg(long)]
        yield_unit: Option<String>,
        /// New instructions text
        #[arg(long, conflicts_with = "clear_instructions")]
        instructions: Option<String>,
        /// Remove the instructions
        #[arg(long)]
        clear_instructions: bool,
        /// Set visibility (true = public, false = private)
        #[arg(long)]
        public: Option<bool>,
        /// New owner identifier
        #[arg(long, conflicts_with = "clear_owner")]
        owner: Option<String>,
        /// Remove the owner
        #[arg(long)]
        clear_owner: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a recipe's status
    Status {
        /// Recipe ID
        recipe_id: i64,
        /// New status: draft, active, archived
        status: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Archive a recipe (soft delete)
    Archive {
        /// Recipe ID
        recipe_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Permanently delete a recipe
    Delete {
        /// Recipe ID
        recipe_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fork a recipe into a new draft version
    Fork {
        /// Recipe ID to fork
        recipe_id: i64,
        /// Owner of the new fork (default: the original owner)
        #[arg(long)]
        owner: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show every version in a recipe's lineage
    Versions {
        /// Any recipe ID in the lineage
        recipe_id: i64,
        /// Hide versions this viewer may not see
        #[arg(long)]
        viewer: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add an ingredient
    Add {
        /// Ingredient name
        name: String,
        /// Base unit that costs are expressed in (e.g. g, ml, pcs)
        #[arg(short, long)]
        unit: String,
        /// Cost per base unit (omit if unknown)
        #[arg(short, long)]
        cost: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List/search ingredients
    List {
        /// Search query to filter by name
        #[arg(short, long)]
        search: Option<String>,
        /// Include deactivated ingredients
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update an ingredient
    Update {
        /// Ingredient ID
        ingredient_id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New base unit
        #[arg(long)]
        unit: Option<String>,
        /// New cost per base unit
        #[arg(long, conflicts_with = "clear_cost")]
        cost: Option<f64>,
        /// Mark the cost as unknown
        #[arg(long)]
        clear_cost: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deactivate an ingredient (hidden from lists, kept in recipes)
    Deactivate {
        /// Ingredient ID
        ingredient_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum LineCommands {
    /// Add an ingredient line to a recipe
    Add {
        /// Recipe ID
        recipe_id: i64,
        /// Ingredient ID
        ingredient_id: i64,
        /// Quantity with unit (e.g. "500g", "1.5 kg", "2 pcs")
        quantity: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List a recipe's ingredient lines
    List {
        /// Recipe ID
        recipe_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the quantity of an ingredient line
    Update {
        /// Line ID
        line_id: i64,
        /// Quantity with unit (e.g. "500g", "1.5 kg")
        quantity: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an ingredient line
    Remove {
        /// Line ID
        line_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reorder a recipe's ingredient lines
    Reorder {
        /// Recipe ID
        recipe_id: i64,
        /// Line IDs in the new order, comma-separated (e.g. "4,2,9")
        ids: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SubCommands {
    /// Use one recipe inside another
    Add {
        /// Parent recipe ID
        parent_id: i64,
        /// Child recipe ID
        child_id: i64,
        /// How much of the child to use
        #[arg(short, long, default_value = "1")]
        quantity: f64,
        /// Unit of the quantity: portion, batch, g, ml
        #[arg(short, long, default_value = "portion")]
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the sub-recipes of a recipe
    List {
        /// Parent recipe ID
        parent_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the quantity or unit of a sub-recipe link
    Update {
        /// Link ID
        link_id: i64,
        /// New quantity
        #[arg(short, long)]
        quantity: Option<f64>,
        /// New unit: portion, batch, g, ml
        #[arg(short, long)]
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a sub-recipe link
    Remove {
        /// Link ID
        link_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reorder a recipe's sub-recipes
    Reorder {
        /// Parent recipe ID
        parent_id: i64,
        /// Link IDs in the new order, comma-separated (e.g. "4,2,9")
        ids: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the recipes that use this recipe
    UsedIn {
        /// Recipe ID
        recipe_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the full bill of materials as a tree
    Tree {
        /// Recipe ID
        recipe_id: i64,
        /// Maximum depth to expand (default: MISE_BOM_MAX_DEPTH or 10)
        #[arg(short = 'd', long)]
        max_depth: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MISE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db_path = config.db_path.to_string_lossy();
    let svc = MiseService::new(&db_path)?.with_bom_max_depth(config.bom_max_depth);

    match cli.command {
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                name,
                yield_quantity,
                yield_unit,
                instructions,
                status,
                public,
                owner,
                json,
            } => cmd_recipe_create(
                &svc,
                RecipeArgs {
                    name,
                    yield_quantity,
                    yield_unit,
                    instructions,
                    status,
                    is_public: public,
                    owner_id: owner,
                },
                json,
            ),
            RecipeCommands::List { status, json } => {
                cmd_recipe_list(&svc, status.as_deref(), json)
            }
            RecipeCommands::Show { recipe_id, json } => cmd_recipe_show(&svc, recipe_id, json),
            RecipeCommands::Update {
                recipe_id,
                name,
                yield_quantity,
                yield_unit,
                instructions,
                clear_instructions,
                public,
                owner,
                clear_owner,
                json,
            } => {
                let update = UpdateRecipe {
                    name,
                    yield_quantity,
                    yield_unit,
                    instructions: if clear_instructions {
                        Some(None)
                    } else {
                        instructions.map(Some)
                    },
                    is_public: public,
                    owner_id: if clear_owner {
                        Some(None)
                    } else {
                        owner.map(Some)
                    },
                };
                cmd_recipe_update(&svc, recipe_id, &update, json)
            }
            RecipeCommands::Status {
                recipe_id,
                status,
                json,
            } => cmd_recipe_status(&svc, recipe_id, &status, json),
            RecipeCommands::Archive { recipe_id, json } => {
                cmd_recipe_archive(&svc, recipe_id, json)
            }
            RecipeCommands::Delete { recipe_id, json } => cmd_recipe_delete(&svc, recipe_id, json),
            RecipeCommands::Fork {
                recipe_id,
                owner,
                json,
            } => cmd_recipe_fork(&svc, recipe_id, owner.as_deref(), json),
            RecipeCommands::Versions {
                recipe_id,
                viewer,
                json,
            } => cmd_recipe_versions(&svc, recipe_id, viewer.as_deref(), json),
        },
        Commands::Ingredient { command } => match command {
            IngredientCommands::Add {
                name,
                unit,
                cost,
                json,
            } => cmd_ingredient_add(
                &svc,
                &NewIngredient {
                    name,
                    base_unit: unit,
                    cost_per_base_unit: cost,
                },
                json,
            ),
            IngredientCommands::List { search, all, json } => {
                cmd_ingredient_list(&svc, search.as_deref(), all, json)
            }
            IngredientCommands::Update {
                ingredient_id,
                name,
                unit,
                cost,
                clear_cost,
                json,
            } => {
                let update = UpdateIngredient {
                    name,
                    base_unit: unit,
                    cost_per_base_unit: if clear_cost { Some(None) } else { cost.map(Some) },
                };
                cmd_ingredient_update(&svc, ingredient_id, &update, json)
            }
            IngredientCommands::Deactivate {
                ingredient_id,
                json,
            } => cmd_ingredient_deactivate(&svc, ingredient_id, json),
        },
        Commands::Line { command } => match command {
            LineCommands::Add {
                recipe_id,
                ingredient_id,
                quantity,
                json,
            } => cmd_line_add(&svc, recipe_id, ingredient_id, &quantity, json),
            LineCommands::List { recipe_id, json } => cmd_line_list(&svc, recipe_id, json),
            LineCommands::Update {
                line_id,
                quantity,
                json,
            } => cmd_line_update(&svc, line_id, &quantity, json),
            LineCommands::Remove { line_id, json } => cmd_line_remove(&svc, line_id, json),
            LineCommands::Reorder {
                recipe_id,
                ids,
                json,
            } => cmd_line_reorder(&svc, recipe_id, &ids, json),
        },
        Commands::Sub { command } => match command {
            SubCommands::Add {
                parent_id,
                child_id,
                quantity,
                unit,
                json,
            } => cmd_sub_add(&svc, parent_id, child_id, quantity, &unit, json),
            SubCommands::List { parent_id, json } => cmd_sub_list(&svc, parent_id, json),
            SubCommands::Update {
                link_id,
                quantity,
                unit,
                json,
            } => cmd_sub_update(&svc, link_id, quantity, unit.as_deref(), json),
            SubCommands::Remove { link_id, json } => cmd_sub_remove(&svc, link_id, json),
            SubCommands::Reorder {
                parent_id,
                ids,
                json,
            } => cmd_sub_reorder(&svc, parent_id, &ids, json),
            SubCommands::UsedIn { recipe_id, json } => cmd_sub_used_in(&svc, recipe_id, json),
            SubCommands::Tree {
                recipe_id,
                max_depth,
                json,
            } => cmd_sub_tree(&svc, recipe_id, max_depth, json),
        },
        Commands::Cost {
            recipe_id,
            save,
            json,
        } => cmd_cost(&svc, recipe_id, save, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _new) = config.load_or_create_api_key()?;
                Some(key)
            };
            server::start_server(svc, port, &bind, api_key).await
        }
    }
}
