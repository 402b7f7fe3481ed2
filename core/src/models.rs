use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// --- Recipes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeStatus {
    Draft,
    Active,
    Archived,
}

impl RecipeStatus {
    pub const ALL: [RecipeStatus; 3] = [Self::Draft, Self::Active, Self::Archived];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for RecipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == lower)
            .ok_or_else(|| {
                CoreError::Invalid(format!(
                    "Invalid recipe status '{s}'. Must be one of: draft, active, archived"
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub yield_quantity: f64,
    pub yield_unit: String,
    pub instructions: Option<String>,
    pub status: RecipeStatus,
    pub is_public: bool,
    pub owner_id: Option<String>,
    pub version: i64,
    /// The recipe this one was forked from (immediate parent, not the tree root).
    pub root_id: Option<i64>,
    /// Cached per-portion cost from the last snapshot.
    pub cost_price: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Recipe {
    /// Whether `viewer_id` may see this recipe's content.
    #[must_use]
    pub fn is_visible_to(&self, viewer_id: &str) -> bool {
        self.is_public || self.owner_id.as_deref() == Some(viewer_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub yield_quantity: f64,
    pub yield_unit: String,
    pub instructions: Option<String>,
    pub status: RecipeStatus,
    pub is_public: bool,
    pub owner_id: Option<String>,
}

impl NewRecipe {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            yield_quantity: 1.0,
            yield_unit: "portion".to_string(),
            instructions: None,
            status: RecipeStatus::Draft,
            is_public: false,
            owner_id: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRecipe {
    pub name: Option<String>,
    pub yield_quantity: Option<f64>,
    pub yield_unit: Option<String>,
    pub instructions: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub owner_id: Option<Option<String>>,
}

// --- Ingredients ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub base_unit: String,
    /// `None` means the price is unknown, not free.
    pub cost_per_base_unit: Option<f64>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub base_unit: String,
    pub cost_per_base_unit: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateIngredient {
    pub name: Option<String>,
    pub base_unit: Option<String>,
    pub cost_per_base_unit: Option<Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeIngredient {
    pub id: i64,
    pub recipe_id: i64,
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit: String,
    pub sort_order: i64,
    pub created_at: String,
    // Joined for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredient_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRecipeIngredient {
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRecipeIngredient {
    pub quantity: Option<f64>,
    pub unit: Option<String>,
}

// --- Sub-recipe links (BOM edges) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubRecipeUnit {
    #[serde(rename = "portion")]
    Portion,
    #[serde(rename = "batch")]
    Batch,
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "ml")]
    Milliliter,
}

impl SubRecipeUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Portion => "portion",
            Self::Batch => "batch",
            Self::Gram => "g",
            Self::Milliliter => "ml",
        }
    }
}

impl fmt::Display for SubRecipeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubRecipeUnit {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "portion" | "portions" => Ok(Self::Portion),
            "batch" | "batches" => Ok(Self::Batch),
            "g" | "gram" | "grams" => Ok(Self::Gram),
            "ml" | "milliliter" | "milliliters" => Ok(Self::Milliliter),
            _ => Err(CoreError::Invalid(format!(
                "Invalid sub-recipe unit '{s}'. Must be one of: portion, batch, g, ml"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomEdge {
    pub id: i64,
    pub parent_recipe_id: i64,
    pub child_recipe_id: i64,
    pub quantity: f64,
    pub unit: SubRecipeUnit,
    pub position: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBomEdge {
    pub quantity: Option<f64>,
    pub unit: Option<SubRecipeUnit>,
}

/// One node of a rendered bill of materials.
#[derive(Debug, Clone, Serialize)]
pub struct BomTreeNode {
    pub recipe_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_name: Option<String>,
    /// Depth limit reached; children were not expanded.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub not_found: bool,
    pub children: Vec<BomTreeChild>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BomTreeChild {
    pub link_id: i64,
    pub edge_quantity: f64,
    pub edge_unit: SubRecipeUnit,
    pub position: i64,
    pub child: BomTreeNode,
}

// --- Costing ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostLineKind {
    Ingredient,
    SubRecipe,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostBreakdownItem {
    pub kind: CostLineKind,
    /// Ingredient id for ingredient lines, child recipe id for sub-recipe lines.
    pub item_id: i64,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub quantity_in_base_unit: Option<f64>,
    pub base_unit: String,
    pub cost_per_base_unit: Option<f64>,
    pub line_cost: Option<f64>,
    /// The line's unit was not recognized and was costed as if already in the base unit.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unit_assumed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostingResult {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub yield_quantity: f64,
    pub yield_unit: String,
    pub breakdown: Vec<CostBreakdownItem>,
    /// Full batch cost, `None` when anything in the subtree is missing a cost.
    pub batch_cost: Option<f64>,
    pub cost_per_portion: Option<f64>,
    /// Sum of every priced line, including the scaled priced share of
    /// incomplete sub-recipes.
    pub known_cost: f64,
    pub missing: Vec<String>,
}

impl CostingResult {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

// --- Version lineage ---

/// Placeholder for a version the viewer may not see.
#[derive(Debug, Clone, Serialize)]
pub struct MaskedRecipe {
    pub id: i64,
    pub name: String,
    pub version: i64,
    pub status: RecipeStatus,
    pub root_id: Option<i64>,
    pub instructions: Option<String>,
    pub cost_price: Option<f64>,
    pub owner_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MaskedRecipe {
    #[must_use]
    pub fn from_recipe(recipe: &Recipe, root_id: Option<i64>) -> Self {
        Self {
            id: recipe.id,
            name: String::new(),
            version: recipe.version,
            status: recipe.status,
            root_id,
            instructions: None,
            cost_price: None,
            owner_id: None,
            created_at: recipe.created_at.clone(),
            updated_at: recipe.updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "visibility", rename_all = "lowercase")]
pub enum VersionEntry {
    Full(Recipe),
    Masked(MaskedRecipe),
}

impl VersionEntry {
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::Full(r) => r.id,
            Self::Masked(m) => m.id,
        }
    }

    #[must_use]
    pub fn root_id(&self) -> Option<i64> {
        match self {
            Self::Full(r) => r.root_id,
            Self::Masked(m) => m.root_id,
        }
    }

    #[must_use]
    pub fn version(&self) -> i64 {
        match self {
            Self::Full(r) => r.version,
            Self::Masked(m) => m.version,
        }
    }

    #[must_use]
    pub fn is_masked(&self) -> bool {
        matches!(self, Self::Masked(_))
    }
}

// --- Validation ---

pub fn validate_name(what: &str, name: &str) -> CoreResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::Invalid(format!("{what} name must not be empty")));
    }
    Ok(())
}

pub fn validate_positive(field: &str, value: f64) -> CoreResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::Invalid(format!("{field} must be greater than 0")));
    }
    Ok(())
}

/// Costs may be zero (free ingredients) but never negative.
pub fn validate_cost(cost: Option<f64>) -> CoreResult<()> {
    if cost.is_some_and(|c| !c.is_finite() || c < 0.0) {
        return Err(CoreError::Invalid(
            "cost_per_base_unit must not be negative".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_unit(field: &str, unit: &str) -> CoreResult<()> {
    if unit.trim().is_empty() {
        return Err(CoreError::Invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recipe() -> Recipe {
        Recipe {
            id: 1,
            name: "Hollandaise".to_string(),
            yield_quantity: 4.0,
            yield_unit: "portion".to_string(),
            instructions: Some("Whisk.".to_string()),
            status: RecipeStatus::Active,
            is_public: false,
            owner_id: Some("chef-a".to_string()),
            version: 2,
            root_id: Some(7),
            cost_price: Some(1.25),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-02T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_recipe_status_parse() {
        assert_eq!("draft".parse::<RecipeStatus>().unwrap(), RecipeStatus::Draft);
        assert_eq!(
            "ACTIVE".parse::<RecipeStatus>().unwrap(),
            RecipeStatus::Active
        );
        assert!("deleted".parse::<RecipeStatus>().is_err());
    }

    #[test]
    fn test_sub_recipe_unit_parse_and_serde() {
        assert_eq!(
            "Batch".parse::<SubRecipeUnit>().unwrap(),
            SubRecipeUnit::Batch
        );
        assert_eq!("g".parse::<SubRecipeUnit>().unwrap(), SubRecipeUnit::Gram);
        assert!("cup".parse::<SubRecipeUnit>().is_err());
        let json = serde_json::to_string(&SubRecipeUnit::Milliliter).unwrap();
        assert_eq!(json, "\"ml\"");
    }

    #[test]
    fn test_visibility_rules() {
        let mut r = sample_recipe();
        assert!(r.is_visible_to("chef-a"));
        assert!(!r.is_visible_to("chef-b"));
        r.is_public = true;
        assert!(r.is_visible_to("chef-b"));
    }

    #[test]
    fn test_masked_recipe_drops_content() {
        let r = sample_recipe();
        let masked = MaskedRecipe::from_recipe(&r, None);
        assert_eq!(masked.id, r.id);
        assert_eq!(masked.version, 2);
        assert_eq!(masked.status, RecipeStatus::Active);
        assert!(masked.name.is_empty());
        assert!(masked.owner_id.is_none());
        assert!(masked.cost_price.is_none());
        assert!(masked.root_id.is_none());
        assert_eq!(masked.created_at, r.created_at);
    }

    #[test]
    fn test_version_entry_serializes_visibility_tag() {
        let entry = VersionEntry::Masked(MaskedRecipe::from_recipe(&sample_recipe(), Some(3)));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["visibility"], "masked");
        assert_eq!(value["root_id"], 3);
        assert_eq!(value["name"], "");
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("quantity", 0.5).is_ok());
        assert!(validate_positive("quantity", 0.0).is_err());
        assert!(validate_positive("quantity", -1.0).is_err());
        assert!(validate_positive("quantity", f64::NAN).is_err());
    }

    #[test]
    fn test_validate_cost_allows_zero_and_unknown() {
        assert!(validate_cost(None).is_ok());
        assert!(validate_cost(Some(0.0)).is_ok());
        assert!(validate_cost(Some(-0.01)).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Recipe", "Stock").is_ok());
        assert!(validate_name("Recipe", "   ").is_err());
    }
}
