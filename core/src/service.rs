use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::bom::{self, DEFAULT_MAX_DEPTH};
use crate::costing;
use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::lineage;
use crate::models::{
    BomEdge, BomTreeNode, CostingResult, Ingredient, NewIngredient, NewRecipe,
    NewRecipeIngredient, Recipe, RecipeIngredient, RecipeStatus, SubRecipeUnit, UpdateBomEdge,
    UpdateIngredient, UpdateRecipe, UpdateRecipeIngredient, VersionEntry,
};

/// Entry point for front ends: one store plus the graph engines over it.
pub struct MiseService {
    db: Database,
    bom_max_depth: usize,
}

impl MiseService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self::with_database(db))
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(db))
    }

    #[must_use]
    pub fn with_database(db: Database) -> Self {
        Self {
            db,
            bom_max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Depth used by [`Self::get_bom_tree`] when the caller passes none.
    #[must_use]
    pub fn with_bom_max_depth(mut self, depth: usize) -> Self {
        self.bom_max_depth = depth;
        self
    }

    #[must_use]
    pub fn bom_max_depth(&self) -> usize {
        self.bom_max_depth
    }

    fn require_recipe(&self, recipe_id: i64) -> CoreResult<()> {
        if self.db.recipe_exists(recipe_id)? {
            Ok(())
        } else {
            Err(CoreError::not_found("Recipe", recipe_id))
        }
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> CoreResult<Recipe> {
        let created = self.db.insert_recipe(recipe)?;
        info!(recipe_id = created.id, name = %created.name, "Created recipe");
        Ok(created)
    }

    pub fn get_recipe(&self, recipe_id: i64) -> CoreResult<Recipe> {
        self.db.get_recipe(recipe_id)
    }

    pub fn list_recipes(&self, status: Option<RecipeStatus>) -> CoreResult<Vec<Recipe>> {
        self.db.list_recipes(status)
    }

    pub fn update_recipe(&self, recipe_id: i64, update: &UpdateRecipe) -> CoreResult<Recipe> {
        self.db.update_recipe(recipe_id, update)
    }

    pub fn set_recipe_status(&self, recipe_id: i64, status: RecipeStatus) -> CoreResult<Recipe> {
        let recipe = self.db.set_recipe_status(recipe_id, status)?;
        info!(recipe_id, status = %status, "Changed recipe status");
        Ok(recipe)
    }

    /// Soft delete.
    pub fn archive_recipe(&self, recipe_id: i64) -> CoreResult<Recipe> {
        self.set_recipe_status(recipe_id, RecipeStatus::Archived)
    }

    pub fn delete_recipe(&self, recipe_id: i64) -> CoreResult<()> {
        self.db.delete_recipe(recipe_id)?;
        info!(recipe_id, "Deleted recipe");
        Ok(())
    }

    // --- Ingredients ---

    pub fn add_ingredient(&self, ingredient: &NewIngredient) -> CoreResult<Ingredient> {
        self.db.insert_ingredient(ingredient)
    }

    pub fn get_ingredient(&self, ingredient_id: i64) -> CoreResult<Ingredient> {
        self.db.get_ingredient(ingredient_id)
    }

    pub fn list_ingredients(
        &self,
        search: Option<&str>,
        include_inactive: bool,
    ) -> CoreResult<Vec<Ingredient>> {
        self.db.list_ingredients(search, include_inactive)
    }

    pub fn update_ingredient(
        &self,
        ingredient_id: i64,
        update: &UpdateIngredient,
    ) -> CoreResult<Ingredient> {
        self.db.update_ingredient(ingredient_id, update)
    }

    pub fn deactivate_ingredient(&self, ingredient_id: i64) -> CoreResult<Ingredient> {
        self.db.deactivate_ingredient(ingredient_id)
    }

    // --- Recipe ingredient lines ---

    pub fn add_recipe_ingredient(
        &self,
        recipe_id: i64,
        line: &NewRecipeIngredient,
    ) -> CoreResult<RecipeIngredient> {
        self.db.add_recipe_ingredient(recipe_id, line)
    }

    pub fn list_recipe_ingredients(&self, recipe_id: i64) -> CoreResult<Vec<RecipeIngredient>> {
        self.require_recipe(recipe_id)?;
        self.db.get_recipe_ingredients(recipe_id)
    }

    pub fn update_recipe_ingredient(
        &self,
        line_id: i64,
        update: &UpdateRecipeIngredient,
    ) -> CoreResult<RecipeIngredient> {
        self.db.update_recipe_ingredient(line_id, update)
    }

    pub fn remove_recipe_ingredient(&self, line_id: i64) -> CoreResult<()> {
        self.db.remove_recipe_ingredient(line_id)
    }

    pub fn reorder_recipe_ingredients(
        &self,
        recipe_id: i64,
        ordered_line_ids: &[i64],
    ) -> CoreResult<Vec<RecipeIngredient>> {
        self.require_recipe(recipe_id)?;
        self.db.reorder_recipe_ingredients(recipe_id, ordered_line_ids)
    }

    // --- Sub-recipes ---

    pub fn list_sub_recipes(&self, recipe_id: i64) -> CoreResult<Vec<BomEdge>> {
        bom::list_sub_recipes(&self.db, recipe_id)
    }

    pub fn add_sub_recipe(
        &self,
        parent_id: i64,
        child_id: i64,
        quantity: f64,
        unit: SubRecipeUnit,
    ) -> CoreResult<BomEdge> {
        bom::add_edge(&self.db, parent_id, child_id, quantity, unit)
    }

    pub fn update_sub_recipe(&self, edge_id: i64, update: &UpdateBomEdge) -> CoreResult<BomEdge> {
        bom::update_edge(&self.db, edge_id, update)
    }

    pub fn remove_sub_recipe(&self, edge_id: i64) -> CoreResult<()> {
        bom::remove_edge(&self.db, edge_id)
    }

    pub fn reorder_sub_recipes(
        &self,
        parent_id: i64,
        ordered_edge_ids: &[i64],
    ) -> CoreResult<Vec<BomEdge>> {
        bom::reorder(&self.db, parent_id, ordered_edge_ids)
    }

    pub fn get_used_in(&self, recipe_id: i64) -> CoreResult<Vec<BomEdge>> {
        bom::used_in(&self.db, recipe_id)
    }

    pub fn get_bom_tree(&self, recipe_id: i64, max_depth: Option<usize>) -> CoreResult<BomTreeNode> {
        bom::render_tree(
            &self.db,
            recipe_id,
            max_depth.unwrap_or(self.bom_max_depth),
        )
    }

    // --- Costing ---

    pub fn get_recipe_cost(&self, recipe_id: i64) -> CoreResult<CostingResult> {
        costing::roll_up_cost(&self.db, recipe_id)
    }

    pub fn recompute_cost(&self, recipe_id: i64) -> CoreResult<CostingResult> {
        costing::recompute_cost(&self.db, recipe_id)
    }

    // --- Versions ---

    pub fn fork_recipe(&self, recipe_id: i64, new_owner_id: Option<&str>) -> CoreResult<Recipe> {
        lineage::fork(&self.db, recipe_id, new_owner_id)
    }

    pub fn get_version_tree(
        &self,
        recipe_id: i64,
        viewer_id: Option<&str>,
    ) -> CoreResult<Vec<VersionEntry>> {
        lineage::get_version_tree(&self.db, recipe_id, viewer_id)
    }
}
