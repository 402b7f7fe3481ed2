use std::path::Path;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use crate::error::{CoreError, CoreResult, OptionalRow};
use crate::models::{
    BomEdge, Ingredient, NewIngredient, NewRecipe, NewRecipeIngredient, Recipe, RecipeIngredient,
    RecipeStatus, SubRecipeUnit, UpdateBomEdge, UpdateIngredient, UpdateRecipe,
    UpdateRecipeIngredient, validate_cost, validate_name, validate_positive, validate_unit,
};

const RECIPE_COLUMNS: &str = "id, name, yield_quantity, yield_unit, instructions, status, \
     is_public, owner_id, version, root_id, cost_price, created_at, updated_at";

const INGREDIENT_COLUMNS: &str =
    "id, name, base_unit, cost_per_base_unit, is_active, created_at, updated_at";

const BOM_EDGE_COLUMNS: &str =
    "id, parent_recipe_id, child_recipe_id, quantity, unit, position, created_at";

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate().context("Failed to migrate database")?;
        Ok(db)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    yield_quantity REAL NOT NULL DEFAULT 1.0,
                    yield_unit TEXT NOT NULL DEFAULT 'portion',
                    instructions TEXT,
                    status TEXT NOT NULL DEFAULT 'draft',
                    is_public INTEGER NOT NULL DEFAULT 0,
                    owner_id TEXT,
                    version INTEGER NOT NULL DEFAULT 1,
                    root_id INTEGER REFERENCES recipes(id) ON DELETE SET NULL,
                    cost_price REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    CHECK (root_id IS NULL OR root_id != id)
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    base_unit TEXT NOT NULL,
                    cost_per_base_unit REAL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL,
                    sort_order INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    parent_recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    child_recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    quantity REAL NOT NULL DEFAULT 1.0,
                    unit TEXT NOT NULL DEFAULT 'portion',
                    position INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    UNIQUE (parent_recipe_id, child_recipe_id),
                    CHECK (parent_recipe_id != child_recipe_id)
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_root ON recipes(root_id);
                CREATE INDEX IF NOT EXISTS idx_recipes_status ON recipes(status);
                CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_recipes_parent ON recipe_recipes(parent_recipe_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_recipes_child ON recipe_recipes(child_recipe_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Start a write transaction that takes the database lock up front.
    ///
    /// Queries made through `self` while the transaction is open run inside it.
    pub(crate) fn immediate_transaction(&self) -> CoreResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    // --- Row mapping helpers ---

    fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
    where
        T: std::str::FromStr<Err = CoreError>,
    {
        raw.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        let status: String = row.get(5)?;
        Ok(Recipe {
            id: row.get(0)?,
            name: row.get(1)?,
            yield_quantity: row.get(2)?,
            yield_unit: row.get(3)?,
            instructions: row.get(4)?,
            status: Self::parse_column::<RecipeStatus>(5, &status)?,
            is_public: row.get(6)?,
            owner_id: row.get(7)?,
            version: row.get(8)?,
            root_id: row.get(9)?,
            cost_price: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            base_unit: row.get(2)?,
            cost_per_base_unit: row.get(3)?,
            is_active: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    // Expects columns:
    // 0: ri.id, 1: ri.recipe_id, 2: ri.ingredient_id, 3: ri.quantity,
    // 4: ri.unit, 5: ri.sort_order, 6: ri.created_at, 7: i.name
    fn recipe_ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<RecipeIngredient> {
        Ok(RecipeIngredient {
            id: row.get(0)?,
            recipe_id: row.get(1)?,
            ingredient_id: row.get(2)?,
            quantity: row.get(3)?,
            unit: row.get(4)?,
            sort_order: row.get(5)?,
            created_at: row.get(6)?,
            ingredient_name: row.get(7)?,
        })
    }

    fn bom_edge_from_row(row: &rusqlite::Row) -> rusqlite::Result<BomEdge> {
        let unit: String = row.get(4)?;
        Ok(BomEdge {
            id: row.get(0)?,
            parent_recipe_id: row.get(1)?,
            child_recipe_id: row.get(2)?,
            quantity: row.get(3)?,
            unit: Self::parse_column::<SubRecipeUnit>(4, &unit)?,
            position: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    // --- Recipes ---

    pub fn insert_recipe(&self, recipe: &NewRecipe) -> CoreResult<Recipe> {
        self.insert_recipe_version(recipe, 1, None)
    }

    /// Insert a recipe row with explicit lineage fields. Forks go through here.
    pub(crate) fn insert_recipe_version(
        &self,
        recipe: &NewRecipe,
        version: i64,
        root_id: Option<i64>,
    ) -> CoreResult<Recipe> {
        validate_name("Recipe", &recipe.name)?;
        validate_positive("yield_quantity", recipe.yield_quantity)?;
        validate_unit("yield_unit", &recipe.yield_unit)?;

        let now = now();
        self.conn.execute(
            "INSERT INTO recipes (name, yield_quantity, yield_unit, instructions, status, is_public,
                                  owner_id, version, root_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                recipe.name.trim(),
                recipe.yield_quantity,
                recipe.yield_unit.trim(),
                recipe.instructions,
                recipe.status.as_str(),
                recipe.is_public,
                recipe.owner_id,
                version,
                root_id,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe(id)
    }

    pub fn get_recipe(&self, id: i64) -> CoreResult<Recipe> {
        self.conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .or_not_found("Recipe", id)
    }

    pub fn find_recipe(&self, id: i64) -> CoreResult<Option<Recipe>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .optional()?)
    }

    pub fn recipe_exists(&self, id: i64) -> CoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM recipes WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_recipes(&self, status: Option<RecipeStatus>) -> CoreResult<Vec<Recipe>> {
        let recipes = if let Some(status) = status {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {RECIPE_COLUMNS} FROM recipes WHERE status = ?1 ORDER BY name, id"
            ))?;
            stmt.query_map(params![status.as_str()], Self::recipe_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY name, id"
            ))?;
            stmt.query_map([], Self::recipe_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(recipes)
    }

    pub fn update_recipe(&self, id: i64, update: &UpdateRecipe) -> CoreResult<Recipe> {
        let existing = self.get_recipe(id)?;

        let name = update.name.as_deref().unwrap_or(&existing.name);
        validate_name("Recipe", name)?;
        let yield_quantity = update.yield_quantity.unwrap_or(existing.yield_quantity);
        validate_positive("yield_quantity", yield_quantity)?;
        let yield_unit = update.yield_unit.as_deref().unwrap_or(&existing.yield_unit);
        validate_unit("yield_unit", yield_unit)?;
        let instructions = match &update.instructions {
            Some(v) => v.clone(),
            None => existing.instructions.clone(),
        };
        let is_public = update.is_public.unwrap_or(existing.is_public);
        let owner_id = match &update.owner_id {
            Some(v) => v.clone(),
            None => existing.owner_id.clone(),
        };

        self.conn.execute(
            "UPDATE recipes SET name = ?1, yield_quantity = ?2, yield_unit = ?3, instructions = ?4,
                                is_public = ?5, owner_id = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                name.trim(),
                yield_quantity,
                yield_unit.trim(),
                instructions,
                is_public,
                owner_id,
                now(),
                id
            ],
        )?;
        self.get_recipe(id)
    }

    pub fn set_recipe_status(&self, id: i64, status: RecipeStatus) -> CoreResult<Recipe> {
        let changed = self.conn.execute(
            "UPDATE recipes SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now(), id],
        )?;
        if changed == 0 {
            return Err(CoreError::not_found("Recipe", id));
        }
        self.get_recipe(id)
    }

    pub fn set_recipe_cost_price(&self, id: i64, cost_price: Option<f64>) -> CoreResult<Recipe> {
        let changed = self.conn.execute(
            "UPDATE recipes SET cost_price = ?1, updated_at = ?2 WHERE id = ?3",
            params![cost_price, now(), id],
        )?;
        if changed == 0 {
            return Err(CoreError::not_found("Recipe", id));
        }
        self.get_recipe(id)
    }

    /// Hard delete. Ingredient lines and sub-recipe links cascade; forks keep
    /// existing with their `root_id` cleared.
    pub fn delete_recipe(&self, id: i64) -> CoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(CoreError::not_found("Recipe", id));
        }
        Ok(())
    }

    /// Recipes whose `root_id` is any of `parent_ids`.
    pub fn recipes_forked_from(&self, parent_ids: &[i64]) -> CoreResult<Vec<Recipe>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; parent_ids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE root_id IN ({placeholders}) ORDER BY id"
        ))?;
        let recipes = stmt
            .query_map(
                rusqlite::params_from_iter(parent_ids.iter()),
                Self::recipe_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    // --- Ingredients ---

    pub fn insert_ingredient(&self, ingredient: &NewIngredient) -> CoreResult<Ingredient> {
        validate_name("Ingredient", &ingredient.name)?;
        validate_unit("base_unit", &ingredient.base_unit)?;
        validate_cost(ingredient.cost_per_base_unit)?;

        let now = now();
        self.conn.execute(
            "INSERT INTO ingredients (name, base_unit, cost_per_base_unit, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ingredient.name.trim(),
                ingredient.base_unit.trim(),
                ingredient.cost_per_base_unit,
                now,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_ingredient(id)
    }

    pub fn get_ingredient(&self, id: i64) -> CoreResult<Ingredient> {
        self.conn
            .query_row(
                &format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = ?1"),
                params![id],
                Self::ingredient_from_row,
            )
            .or_not_found("Ingredient", id)
    }

    pub fn list_ingredients(
        &self,
        search: Option<&str>,
        include_inactive: bool,
    ) -> CoreResult<Vec<Ingredient>> {
        let escaped = search
            .unwrap_or("")
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients
             WHERE name LIKE ?1 ESCAPE '\\' AND (?2 OR is_active = 1)
             ORDER BY name, id"
        ))?;
        let ingredients = stmt
            .query_map(params![pattern, include_inactive], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    pub fn update_ingredient(&self, id: i64, update: &UpdateIngredient) -> CoreResult<Ingredient> {
        let existing = self.get_ingredient(id)?;

        let name = update.name.as_deref().unwrap_or(&existing.name);
        validate_name("Ingredient", name)?;
        let base_unit = update.base_unit.as_deref().unwrap_or(&existing.base_unit);
        validate_unit("base_unit", base_unit)?;
        let cost = match update.cost_per_base_unit {
            Some(v) => v,
            None => existing.cost_per_base_unit,
        };
        validate_cost(cost)?;

        self.conn.execute(
            "UPDATE ingredients SET name = ?1, base_unit = ?2, cost_per_base_unit = ?3, updated_at = ?4
             WHERE id = ?5",
            params![name.trim(), base_unit.trim(), cost, now(), id],
        )?;
        self.get_ingredient(id)
    }

    /// Soft delete: the ingredient stays referenced by existing recipe lines.
    pub fn deactivate_ingredient(&self, id: i64) -> CoreResult<Ingredient> {
        let changed = self.conn.execute(
            "UPDATE ingredients SET is_active = 0, updated_at = ?1 WHERE id = ?2",
            params![now(), id],
        )?;
        if changed == 0 {
            return Err(CoreError::not_found("Ingredient", id));
        }
        self.get_ingredient(id)
    }

    // --- Recipe ingredient lines ---

    pub fn add_recipe_ingredient(
        &self,
        recipe_id: i64,
        line: &NewRecipeIngredient,
    ) -> CoreResult<RecipeIngredient> {
        validate_positive("quantity", line.quantity)?;
        validate_unit("unit", &line.unit)?;
        if !self.recipe_exists(recipe_id)? {
            return Err(CoreError::not_found("Recipe", recipe_id));
        }
        let ingredient = self.get_ingredient(line.ingredient_id)?;

        let duplicate: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM recipe_ingredients WHERE recipe_id = ?1 AND ingredient_id = ?2",
            params![recipe_id, line.ingredient_id],
            |row| row.get(0),
        )?;
        if duplicate > 0 {
            return Err(CoreError::Invalid(format!(
                "Ingredient '{}' is already in recipe {recipe_id}",
                ingredient.name
            )));
        }

        let max_order: Option<i64> = self.conn.query_row(
            "SELECT MAX(sort_order) FROM recipe_ingredients WHERE recipe_id = ?1",
            params![recipe_id],
            |row| row.get(0),
        )?;
        let next_order = max_order.map_or(0, |m| m + 1);

        self.insert_recipe_ingredient_row(
            recipe_id,
            line.ingredient_id,
            line.quantity,
            line.unit.trim(),
            next_order,
        )
    }

    pub(crate) fn insert_recipe_ingredient_row(
        &self,
        recipe_id: i64,
        ingredient_id: i64,
        quantity: f64,
        unit: &str,
        sort_order: i64,
    ) -> CoreResult<RecipeIngredient> {
        self.conn.execute(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, quantity, unit, sort_order, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![recipe_id, ingredient_id, quantity, unit, sort_order, now()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe_ingredient(id)
    }

    pub fn get_recipe_ingredient(&self, id: i64) -> CoreResult<RecipeIngredient> {
        self.conn
            .query_row(
                "SELECT ri.id, ri.recipe_id, ri.ingredient_id, ri.quantity, ri.unit,
                        ri.sort_order, ri.created_at, i.name
                 FROM recipe_ingredients ri
                 LEFT JOIN ingredients i ON ri.ingredient_id = i.id
                 WHERE ri.id = ?1",
                params![id],
                Self::recipe_ingredient_from_row,
            )
            .or_not_found("Recipe ingredient", id)
    }

    pub fn get_recipe_ingredients(&self, recipe_id: i64) -> CoreResult<Vec<RecipeIngredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT ri.id, ri.recipe_id, ri.ingredient_id, ri.quantity, ri.unit,
                    ri.sort_order, ri.created_at, i.name
             FROM recipe_ingredients ri
             LEFT JOIN ingredients i ON ri.ingredient_id = i.id
             WHERE ri.recipe_id = ?1
             ORDER BY ri.sort_order, ri.id",
        )?;
        let lines = stmt
            .query_map(params![recipe_id], Self::recipe_ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    pub fn update_recipe_ingredient(
        &self,
        id: i64,
        update: &UpdateRecipeIngredient,
    ) -> CoreResult<RecipeIngredient> {
        let existing = self.get_recipe_ingredient(id)?;
        let quantity = update.quantity.unwrap_or(existing.quantity);
        validate_positive("quantity", quantity)?;
        let unit = update.unit.as_deref().unwrap_or(&existing.unit);
        validate_unit("unit", unit)?;

        self.conn.execute(
            "UPDATE recipe_ingredients SET quantity = ?1, unit = ?2 WHERE id = ?3",
            params![quantity, unit.trim(), id],
        )?;
        self.get_recipe_ingredient(id)
    }

    pub fn remove_recipe_ingredient(&self, id: i64) -> CoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM recipe_ingredients WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(CoreError::not_found("Recipe ingredient", id));
        }
        Ok(())
    }

    /// Assign each line its index in `ordered_ids`. Ids from other recipes are skipped.
    pub fn reorder_recipe_ingredients(
        &self,
        recipe_id: i64,
        ordered_ids: &[i64],
    ) -> CoreResult<Vec<RecipeIngredient>> {
        let tx = self.immediate_transaction()?;
        for (index, line_id) in ordered_ids.iter().enumerate() {
            tx.execute(
                "UPDATE recipe_ingredients SET sort_order = ?1 WHERE id = ?2 AND recipe_id = ?3",
                params![index as i64, line_id, recipe_id],
            )?;
        }
        tx.commit()?;
        self.get_recipe_ingredients(recipe_id)
    }

    // --- Sub-recipe links ---

    pub fn get_bom_edge(&self, id: i64) -> CoreResult<BomEdge> {
        self.conn
            .query_row(
                &format!("SELECT {BOM_EDGE_COLUMNS} FROM recipe_recipes WHERE id = ?1"),
                params![id],
                Self::bom_edge_from_row,
            )
            .or_not_found("Sub-recipe link", id)
    }

    pub fn find_bom_edge(&self, parent_id: i64, child_id: i64) -> CoreResult<Option<BomEdge>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {BOM_EDGE_COLUMNS} FROM recipe_recipes
                     WHERE parent_recipe_id = ?1 AND child_recipe_id = ?2"
                ),
                params![parent_id, child_id],
                Self::bom_edge_from_row,
            )
            .optional()?)
    }

    /// Edges out of `parent_id`, in display order.
    pub fn bom_edges_for_parent(&self, parent_id: i64) -> CoreResult<Vec<BomEdge>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BOM_EDGE_COLUMNS} FROM recipe_recipes
             WHERE parent_recipe_id = ?1 ORDER BY position, id"
        ))?;
        let edges = stmt
            .query_map(params![parent_id], Self::bom_edge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    /// Edges into `child_id`: every recipe that includes it.
    pub fn bom_edges_for_child(&self, child_id: i64) -> CoreResult<Vec<BomEdge>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BOM_EDGE_COLUMNS} FROM recipe_recipes
             WHERE child_recipe_id = ?1 ORDER BY parent_recipe_id, id"
        ))?;
        let edges = stmt
            .query_map(params![child_id], Self::bom_edge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    pub fn child_recipe_ids(&self, parent_id: i64) -> CoreResult<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT child_recipe_id FROM recipe_recipes WHERE parent_recipe_id = ?1")?;
        let ids = stmt
            .query_map(params![parent_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn max_bom_position(&self, parent_id: i64) -> CoreResult<Option<i64>> {
        Ok(self.conn.query_row(
            "SELECT MAX(position) FROM recipe_recipes WHERE parent_recipe_id = ?1",
            params![parent_id],
            |row| row.get(0),
        )?)
    }

    /// Raw insert. Cycle and duplicate checks belong to the caller.
    pub(crate) fn insert_bom_edge_row(
        &self,
        parent_id: i64,
        child_id: i64,
        quantity: f64,
        unit: SubRecipeUnit,
        position: i64,
    ) -> CoreResult<BomEdge> {
        self.conn.execute(
            "INSERT INTO recipe_recipes (parent_recipe_id, child_recipe_id, quantity, unit, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![parent_id, child_id, quantity, unit.as_str(), position, now()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_bom_edge(id)
    }

    pub fn update_bom_edge(&self, id: i64, update: &UpdateBomEdge) -> CoreResult<BomEdge> {
        let existing = self.get_bom_edge(id)?;
        let quantity = update.quantity.unwrap_or(existing.quantity);
        validate_positive("quantity", quantity)?;
        let unit = update.unit.unwrap_or(existing.unit);

        self.conn.execute(
            "UPDATE recipe_recipes SET quantity = ?1, unit = ?2 WHERE id = ?3",
            params![quantity, unit.as_str(), id],
        )?;
        self.get_bom_edge(id)
    }

    pub fn delete_bom_edge(&self, id: i64) -> CoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM recipe_recipes WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(CoreError::not_found("Sub-recipe link", id));
        }
        Ok(())
    }

    /// Returns whether a row belonging to `parent_id` was updated.
    pub(crate) fn set_bom_edge_position(
        &self,
        id: i64,
        parent_id: i64,
        position: i64,
    ) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE recipe_recipes SET position = ?1 WHERE id = ?2 AND parent_recipe_id = ?3",
            params![position, id, parent_id],
        )?;
        Ok(changed > 0)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ingredient(name: &str, cost: Option<f64>) -> NewIngredient {
        NewIngredient {
            name: name.to_string(),
            base_unit: "g".to_string(),
            cost_per_base_unit: cost,
        }
    }

    #[test]
    fn test_insert_and_get_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.insert_recipe(&NewRecipe::named("Chicken Stock")).unwrap();

        assert_eq!(recipe.name, "Chicken Stock");
        assert_eq!(recipe.version, 1);
        assert_eq!(recipe.root_id, None);
        assert_eq!(recipe.status, RecipeStatus::Draft);
        assert!(!recipe.is_public);

        let fetched = db.get_recipe(recipe.id).unwrap();
        assert_eq!(fetched.id, recipe.id);
        assert_eq!(fetched.yield_unit, "portion");
    }

    #[test]
    fn test_get_recipe_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_recipe(42).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { id: 42, .. }));
        assert!(db.find_recipe(42).unwrap().is_none());
    }

    #[test]
    fn test_insert_recipe_rejects_bad_input() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.insert_recipe(&NewRecipe::named("  ")),
            Err(CoreError::Invalid(_))
        ));
        let mut zero_yield = NewRecipe::named("Stock");
        zero_yield.yield_quantity = 0.0;
        assert!(matches!(
            db.insert_recipe(&zero_yield),
            Err(CoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_list_recipes_with_status_filter() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_recipe(&NewRecipe::named("Aioli")).unwrap();
        db.insert_recipe(&NewRecipe::named("Brioche")).unwrap();
        db.set_recipe_status(a.id, RecipeStatus::Active).unwrap();

        assert_eq!(db.list_recipes(None).unwrap().len(), 2);
        let active = db.list_recipes(Some(RecipeStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Aioli");
        assert!(
            db.list_recipes(Some(RecipeStatus::Archived))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_update_recipe_partial() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.insert_recipe(&NewRecipe::named("Stock")).unwrap();

        let updated = db
            .update_recipe(
                recipe.id,
                &UpdateRecipe {
                    yield_quantity: Some(5.0),
                    yield_unit: Some("l".to_string()),
                    instructions: Some(Some("Simmer 4h".to_string())),
                    is_public: Some(true),
                    ..UpdateRecipe::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Stock");
        assert!((updated.yield_quantity - 5.0).abs() < f64::EPSILON);
        assert_eq!(updated.yield_unit, "l");
        assert_eq!(updated.instructions.as_deref(), Some("Simmer 4h"));
        assert!(updated.is_public);

        // Clearing instructions
        let cleared = db
            .update_recipe(
                recipe.id,
                &UpdateRecipe {
                    instructions: Some(None),
                    ..UpdateRecipe::default()
                },
            )
            .unwrap();
        assert!(cleared.instructions.is_none());
    }

    #[test]
    fn test_set_status_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.set_recipe_status(5, RecipeStatus::Archived),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_recipe_cascades() {
        let db = Database::open_in_memory().unwrap();
        let salt = db.insert_ingredient(&sample_ingredient("Salt", Some(0.01))).unwrap();
        let parent = db.insert_recipe(&NewRecipe::named("Soup")).unwrap();
        let child = db.insert_recipe(&NewRecipe::named("Stock")).unwrap();
        let fork = db
            .insert_recipe_version(&NewRecipe::named("Stock (Fork)"), 2, Some(child.id))
            .unwrap();

        db.add_recipe_ingredient(
            child.id,
            &NewRecipeIngredient {
                ingredient_id: salt.id,
                quantity: 5.0,
                unit: "g".to_string(),
            },
        )
        .unwrap();
        db.insert_bom_edge_row(parent.id, child.id, 1.0, SubRecipeUnit::Batch, 0)
            .unwrap();

        db.delete_recipe(child.id).unwrap();

        assert!(db.get_recipe_ingredients(child.id).unwrap().is_empty());
        assert!(db.bom_edges_for_parent(parent.id).unwrap().is_empty());
        assert_eq!(db.get_recipe(fork.id).unwrap().root_id, None);
        assert!(matches!(
            db.delete_recipe(child.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_self_fork_rejected_by_schema() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.insert_recipe(&NewRecipe::named("Stock")).unwrap();
        let res = db.conn().execute(
            "UPDATE recipes SET root_id = id WHERE id = ?1",
            params![recipe.id],
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_ingredient_crud() {
        let db = Database::open_in_memory().unwrap();
        let flour = db
            .insert_ingredient(&sample_ingredient("Flour", Some(0.002)))
            .unwrap();
        assert_eq!(flour.base_unit, "g");
        assert!(flour.is_active);

        let updated = db
            .update_ingredient(
                flour.id,
                &UpdateIngredient {
                    cost_per_base_unit: Some(None),
                    ..UpdateIngredient::default()
                },
            )
            .unwrap();
        assert!(updated.cost_per_base_unit.is_none());

        db.insert_ingredient(&sample_ingredient("Butter", None))
            .unwrap();
        db.deactivate_ingredient(flour.id).unwrap();

        let active = db.list_ingredients(None, false).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Butter");
        assert_eq!(db.list_ingredients(None, true).unwrap().len(), 2);
        assert_eq!(db.list_ingredients(Some("flo"), true).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_ingredient_rejects_negative_cost() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.insert_ingredient(&sample_ingredient("Saffron", Some(-1.0))),
            Err(CoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_recipe_ingredient_lines() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.insert_recipe(&NewRecipe::named("Bread")).unwrap();
        let flour = db.insert_ingredient(&sample_ingredient("Flour", None)).unwrap();
        let water = db.insert_ingredient(&sample_ingredient("Water", None)).unwrap();

        let a = db
            .add_recipe_ingredient(
                recipe.id,
                &NewRecipeIngredient {
                    ingredient_id: flour.id,
                    quantity: 500.0,
                    unit: "g".to_string(),
                },
            )
            .unwrap();
        let b = db
            .add_recipe_ingredient(
                recipe.id,
                &NewRecipeIngredient {
                    ingredient_id: water.id,
                    quantity: 350.0,
                    unit: "ml".to_string(),
                },
            )
            .unwrap();
        assert_eq!(a.sort_order, 0);
        assert_eq!(b.sort_order, 1);
        assert_eq!(a.ingredient_name.as_deref(), Some("Flour"));

        // Duplicate ingredient rejected
        let dup = db.add_recipe_ingredient(
            recipe.id,
            &NewRecipeIngredient {
                ingredient_id: flour.id,
                quantity: 1.0,
                unit: "g".to_string(),
            },
        );
        assert!(matches!(dup, Err(CoreError::Invalid(_))));

        let lines = db.reorder_recipe_ingredients(recipe.id, &[b.id, a.id]).unwrap();
        assert_eq!(lines[0].id, b.id);
        assert_eq!(lines[1].id, a.id);

        let updated = db
            .update_recipe_ingredient(
                a.id,
                &UpdateRecipeIngredient {
                    quantity: Some(0.5),
                    unit: Some("kg".to_string()),
                },
            )
            .unwrap();
        assert!((updated.quantity - 0.5).abs() < f64::EPSILON);
        assert_eq!(updated.unit, "kg");

        db.remove_recipe_ingredient(a.id).unwrap();
        assert_eq!(db.get_recipe_ingredients(recipe.id).unwrap().len(), 1);
        assert!(matches!(
            db.remove_recipe_ingredient(a.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_add_line_to_missing_recipe() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&sample_ingredient("Flour", None)).unwrap();
        let res = db.add_recipe_ingredient(
            99,
            &NewRecipeIngredient {
                ingredient_id: flour.id,
                quantity: 1.0,
                unit: "g".to_string(),
            },
        );
        assert!(matches!(res, Err(CoreError::NotFound { id: 99, .. })));
    }

    #[test]
    fn test_bom_edge_storage() {
        let db = Database::open_in_memory().unwrap();
        let parent = db.insert_recipe(&NewRecipe::named("Eggs Benedict")).unwrap();
        let child = db.insert_recipe(&NewRecipe::named("Hollandaise")).unwrap();

        let edge = db
            .insert_bom_edge_row(parent.id, child.id, 0.5, SubRecipeUnit::Batch, 3)
            .unwrap();
        assert_eq!(edge.unit, SubRecipeUnit::Batch);
        assert_eq!(edge.position, 3);

        assert_eq!(db.child_recipe_ids(parent.id).unwrap(), vec![child.id]);
        assert_eq!(db.bom_edges_for_child(child.id).unwrap().len(), 1);
        assert_eq!(db.max_bom_position(parent.id).unwrap(), Some(3));
        assert_eq!(db.max_bom_position(child.id).unwrap(), None);
        assert!(db.find_bom_edge(parent.id, child.id).unwrap().is_some());
        assert!(db.find_bom_edge(child.id, parent.id).unwrap().is_none());

        // Schema guards
        assert!(
            db.insert_bom_edge_row(parent.id, child.id, 1.0, SubRecipeUnit::Portion, 4)
                .is_err()
        );
        assert!(
            db.insert_bom_edge_row(parent.id, parent.id, 1.0, SubRecipeUnit::Portion, 4)
                .is_err()
        );
    }

    #[test]
    fn test_recipes_forked_from() {
        let db = Database::open_in_memory().unwrap();
        let root = db.insert_recipe(&NewRecipe::named("Base")).unwrap();
        let a = db
            .insert_recipe_version(&NewRecipe::named("A"), 2, Some(root.id))
            .unwrap();
        let b = db
            .insert_recipe_version(&NewRecipe::named("B"), 2, Some(root.id))
            .unwrap();

        let forks = db.recipes_forked_from(&[root.id]).unwrap();
        assert_eq!(forks.len(), 2);
        assert_eq!(forks[0].id, a.id);
        assert_eq!(forks[1].id, b.id);
        assert!(db.recipes_forked_from(&[a.id, b.id]).unwrap().is_empty());
        assert!(db.recipes_forked_from(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mise.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_recipe(&NewRecipe::named("Stock")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_recipes(None).unwrap().len(), 1);
    }
}
