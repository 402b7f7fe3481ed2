//! Fork lineage: every recipe points at the recipe it was copied from through
//! `root_id`, so the lineage is a forest of single-parent trees.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::CoreResult;
use crate::models::{MaskedRecipe, NewRecipe, Recipe, RecipeStatus, VersionEntry};

/// Copy `recipe_id` into a new draft one version above it.
///
/// Ingredient lines and sub-recipe links are copied with their ordering; the
/// copied links keep pointing at the original children.
pub fn fork(db: &Database, recipe_id: i64, new_owner_id: Option<&str>) -> CoreResult<Recipe> {
    let tx = db.immediate_transaction()?;
    let original = db.get_recipe(recipe_id)?;

    let draft = NewRecipe {
        name: format!("{} (Fork)", original.name),
        yield_quantity: original.yield_quantity,
        yield_unit: original.yield_unit.clone(),
        instructions: original.instructions.clone(),
        status: RecipeStatus::Draft,
        is_public: false,
        owner_id: new_owner_id
            .map(str::to_string)
            .or_else(|| original.owner_id.clone()),
    };
    let forked = db.insert_recipe_version(&draft, original.version + 1, Some(original.id))?;

    let lines = db.get_recipe_ingredients(recipe_id)?;
    for line in &lines {
        db.insert_recipe_ingredient_row(
            forked.id,
            line.ingredient_id,
            line.quantity,
            &line.unit,
            line.sort_order,
        )?;
    }
    let edges = db.bom_edges_for_parent(recipe_id)?;
    for edge in &edges {
        db.insert_bom_edge_row(
            forked.id,
            edge.child_recipe_id,
            edge.quantity,
            edge.unit,
            edge.position,
        )?;
    }
    tx.commit()?;

    info!(
        recipe_id,
        fork_id = forked.id,
        version = forked.version,
        lines = lines.len(),
        sub_recipes = edges.len(),
        "Forked recipe"
    );
    Ok(forked)
}

/// Every version connected to `recipe_id`: its ancestors, and all descendants
/// of the oldest ancestor including sibling branches.
///
/// Ordered by `(version, created_at, id)`. With a `viewer_id`, versions the
/// viewer may not see are masked and every exposed `root_id` is relinked to
/// the nearest visible ancestor. An unknown `recipe_id` yields an empty list.
pub fn get_version_tree(
    db: &Database,
    recipe_id: i64,
    viewer_id: Option<&str>,
) -> CoreResult<Vec<VersionEntry>> {
    let Some(start) = db.find_recipe(recipe_id)? else {
        debug!(recipe_id, "Version tree requested for unknown recipe");
        return Ok(Vec::new());
    };

    let root = find_root(db, start)?;
    let mut recipes = collect_descendants(db, root)?;
    recipes.sort_by(|a, b| {
        a.version
            .cmp(&b.version)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    let Some(viewer_id) = viewer_id else {
        return Ok(recipes.into_iter().map(VersionEntry::Full).collect());
    };

    let mut ancestors = VisibleAncestors::new(&recipes, viewer_id);
    let mut entries = Vec::with_capacity(recipes.len());
    for recipe in &recipes {
        let parent_visible = recipe
            .root_id
            .and_then(|parent_id| ancestors.by_id.get(&parent_id))
            .is_some_and(|parent| parent.is_visible_to(viewer_id));

        if recipe.is_visible_to(viewer_id) {
            let mut full = recipe.clone();
            if full.root_id.is_some() && !parent_visible {
                full.root_id = ancestors.resolve(recipe.id);
            }
            entries.push(VersionEntry::Full(full));
        } else {
            let root_id = ancestors.resolve(recipe.id);
            entries.push(VersionEntry::Masked(MaskedRecipe::from_recipe(recipe, root_id)));
        }
    }

    debug!(
        recipe_id,
        versions = entries.len(),
        masked = entries.iter().filter(|e| e.is_masked()).count(),
        "Built version tree"
    );
    Ok(entries)
}

/// Follow `root_id` upward to the oldest reachable ancestor.
fn find_root(db: &Database, start: Recipe) -> CoreResult<Recipe> {
    let mut seen = HashSet::from([start.id]);
    let mut current = start;
    while let Some(parent_id) = current.root_id {
        if !seen.insert(parent_id) {
            warn!(recipe_id = current.id, parent_id, "Lineage loop in stored data; stopping walk");
            break;
        }
        match db.find_recipe(parent_id)? {
            Some(parent) => current = parent,
            None => {
                warn!(recipe_id = current.id, parent_id, "Lineage points at a missing recipe");
                break;
            }
        }
    }
    Ok(current)
}

/// Breadth-first walk down the fork tree from `root`, level by level.
fn collect_descendants(db: &Database, root: Recipe) -> CoreResult<Vec<Recipe>> {
    let mut visited = HashSet::from([root.id]);
    let mut frontier = vec![root.id];
    let mut recipes = vec![root];

    while !frontier.is_empty() {
        let next: Vec<Recipe> = db
            .recipes_forked_from(&frontier)?
            .into_iter()
            .filter(|r| visited.insert(r.id))
            .collect();
        frontier = next.iter().map(|r| r.id).collect();
        recipes.extend(next);
    }
    Ok(recipes)
}

/// Nearest-visible-ancestor lookups for one version tree, memoized by id.
struct VisibleAncestors<'a> {
    by_id: HashMap<i64, &'a Recipe>,
    viewer_id: &'a str,
    memo: HashMap<i64, Option<i64>>,
}

impl<'a> VisibleAncestors<'a> {
    fn new(recipes: &'a [Recipe], viewer_id: &'a str) -> Self {
        Self {
            by_id: recipes.iter().map(|r| (r.id, r)).collect(),
            viewer_id,
            memo: HashMap::new(),
        }
    }

    /// Closest strict ancestor of `recipe_id` the viewer may see.
    fn resolve(&mut self, recipe_id: i64) -> Option<i64> {
        // Every node on this chain below the answer is hidden, so they share it.
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = recipe_id;

        let answer = loop {
            if let Some(&cached) = self.memo.get(&current) {
                break cached;
            }
            if !seen.insert(current) {
                break None;
            }
            chain.push(current);

            let Some(parent) = self
                .by_id
                .get(&current)
                .and_then(|r| r.root_id)
                .and_then(|parent_id| self.by_id.get(&parent_id))
            else {
                break None;
            };
            if parent.is_visible_to(self.viewer_id) {
                break Some(parent.id);
            }
            current = parent.id;
        };

        for id in chain {
            self.memo.insert(id, answer);
        }
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::add_edge;
    use crate::models::{NewIngredient, NewRecipeIngredient, SubRecipeUnit};
    use rusqlite::params;

    fn recipe(db: &Database, name: &str, owner: &str, is_public: bool) -> Recipe {
        let mut new = NewRecipe::named(name);
        new.owner_id = Some(owner.to_string());
        new.is_public = is_public;
        db.insert_recipe(&new).unwrap()
    }

    fn publish(db: &Database, id: i64) {
        db.conn()
            .execute("UPDATE recipes SET is_public = 1 WHERE id = ?1", params![id])
            .unwrap();
    }

    fn ids(entries: &[VersionEntry]) -> Vec<i64> {
        entries.iter().map(VersionEntry::id).collect()
    }

    #[test]
    fn test_fork_copies_content() {
        let db = Database::open_in_memory().unwrap();
        let mut new = NewRecipe::named("Hollandaise");
        new.instructions = Some("Whisk over a bain-marie".to_string());
        new.owner_id = Some("chef-a".to_string());
        new.is_public = true;
        new.status = RecipeStatus::Active;
        let original = db.insert_recipe(&new).unwrap();
        let butter = db
            .insert_ingredient(&NewIngredient {
                name: "Butter".to_string(),
                base_unit: "g".to_string(),
                cost_per_base_unit: Some(0.01),
            })
            .unwrap();
        db.add_recipe_ingredient(
            original.id,
            &NewRecipeIngredient {
                ingredient_id: butter.id,
                quantity: 250.0,
                unit: "g".to_string(),
            },
        )
        .unwrap();
        let reduction = recipe(&db, "Reduction", "chef-a", true);
        add_edge(&db, original.id, reduction.id, 1.0, SubRecipeUnit::Batch).unwrap();

        let forked = fork(&db, original.id, None).unwrap();
        assert_eq!(forked.name, "Hollandaise (Fork)");
        assert_eq!(forked.version, 2);
        assert_eq!(forked.root_id, Some(original.id));
        assert_eq!(forked.status, RecipeStatus::Draft);
        assert!(!forked.is_public);
        assert_eq!(forked.owner_id.as_deref(), Some("chef-a"));
        assert_eq!(forked.instructions, original.instructions);

        let lines = db.get_recipe_ingredients(forked.id).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].ingredient_id, butter.id);
        let edges = db.bom_edges_for_parent(forked.id).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].child_recipe_id, reduction.id);
    }

    #[test]
    fn test_fork_with_new_owner() {
        let db = Database::open_in_memory().unwrap();
        let original = recipe(&db, "Stock", "chef-a", true);
        let forked = fork(&db, original.id, Some("chef-b")).unwrap();
        assert_eq!(forked.owner_id.as_deref(), Some("chef-b"));
    }

    #[test]
    fn test_fork_missing_recipe() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            fork(&db, 12, None),
            Err(crate::error::CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_version_tree_includes_sibling_branches() {
        let db = Database::open_in_memory().unwrap();
        let a = recipe(&db, "Base", "chef-a", true);
        let b = fork(&db, a.id, None).unwrap();
        let c = fork(&db, a.id, None).unwrap();
        let d = fork(&db, b.id, None).unwrap();

        for start in [a.id, b.id, c.id, d.id] {
            let tree = get_version_tree(&db, start, None).unwrap();
            assert_eq!(ids(&tree), vec![a.id, b.id, c.id, d.id]);
            assert!(tree.iter().all(|e| !e.is_masked()));
        }
    }

    #[test]
    fn test_version_tree_unknown_recipe_is_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(get_version_tree(&db, 77, Some("anyone")).unwrap().is_empty());
    }

    #[test]
    fn test_version_tree_masks_private_middle_version() {
        let db = Database::open_in_memory().unwrap();
        let a = recipe(&db, "Base", "chef-a", true);
        let b = fork(&db, a.id, Some("chef-b")).unwrap();
        let c = fork(&db, b.id, Some("chef-c")).unwrap();
        publish(&db, c.id);

        let tree = get_version_tree(&db, c.id, Some("viewer")).unwrap();
        assert_eq!(ids(&tree), vec![a.id, b.id, c.id]);

        assert!(!tree[0].is_masked());
        match &tree[1] {
            VersionEntry::Masked(masked) => {
                assert_eq!(masked.root_id, Some(a.id));
                assert!(masked.name.is_empty());
                assert!(masked.owner_id.is_none());
                assert_eq!(masked.version, 2);
            }
            VersionEntry::Full(_) => panic!("private version leaked"),
        }
        // Relinked past the hidden version
        assert!(!tree[2].is_masked());
        assert_eq!(tree[2].root_id(), Some(a.id));
    }

    #[test]
    fn test_version_tree_owner_sees_own_private_version() {
        let db = Database::open_in_memory().unwrap();
        let a = recipe(&db, "Base", "chef-a", true);
        let b = fork(&db, a.id, Some("chef-b")).unwrap();

        let tree = get_version_tree(&db, a.id, Some("chef-b")).unwrap();
        assert!(tree.iter().all(|e| !e.is_masked()));
        assert_eq!(tree[1].id(), b.id);
        assert_eq!(tree[1].root_id(), Some(a.id));
    }

    #[test]
    fn test_version_tree_hidden_root() {
        let db = Database::open_in_memory().unwrap();
        let a = recipe(&db, "Secret Base", "chef-a", false);
        let b = fork(&db, a.id, Some("viewer")).unwrap();

        let tree = get_version_tree(&db, b.id, Some("viewer")).unwrap();
        assert!(tree[0].is_masked());
        assert_eq!(tree[0].root_id(), None);
        assert_eq!(tree[1].root_id(), None);
    }

    #[test]
    fn test_version_tree_survives_lineage_loop() {
        let db = Database::open_in_memory().unwrap();
        let a = recipe(&db, "A", "chef-a", true);
        let b = fork(&db, a.id, None).unwrap();
        db.conn()
            .execute(
                "UPDATE recipes SET root_id = ?1 WHERE id = ?2",
                params![b.id, a.id],
            )
            .unwrap();

        let tree = get_version_tree(&db, b.id, Some("viewer")).unwrap();
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_deleted_parent_detaches_fork() {
        let db = Database::open_in_memory().unwrap();
        let a = recipe(&db, "A", "chef-a", true);
        let b = fork(&db, a.id, None).unwrap();
        db.delete_recipe(a.id).unwrap();

        let tree = get_version_tree(&db, b.id, None).unwrap();
        assert_eq!(ids(&tree), vec![b.id]);
        assert_eq!(tree[0].root_id(), None);
    }
}
