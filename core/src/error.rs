use thiserror::Error;

/// Errors surfaced by the recipe graph engines and the store beneath them.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A referenced recipe, ingredient, line, or sub-recipe link does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Linking `child_id` under `parent_id` would close a loop in the BOM graph.
    #[error(
        "Adding recipe {child_id} as a sub-recipe of recipe {parent_id} would create a circular reference"
    )]
    CycleDetected { parent_id: i64, child_id: i64 },

    /// The parent already includes this child.
    #[error("Recipe {child_id} is already a sub-recipe of recipe {parent_id}")]
    DuplicateEdge { parent_id: i64, child_id: i64 },

    /// Rejected input: non-positive quantities, blank names, unknown enum strings.
    #[error("{0}")]
    Invalid(String),

    /// Stored data violates a graph invariant the write path should have kept.
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// True for the failures a user can correct by changing their request.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::CycleDetected { .. }
                | Self::DuplicateEdge { .. }
                | Self::Invalid(_)
        )
    }
}

/// Map "no rows" from a single-row lookup onto `NotFound`.
pub(crate) trait OptionalRow<T> {
    fn or_not_found(self, entity: &'static str, id: i64) -> CoreResult<T>;
}

impl<T> OptionalRow<T> for rusqlite::Result<T> {
    fn or_not_found(self, entity: &'static str, id: i64) -> CoreResult<T> {
        match self {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(CoreError::not_found(entity, id)),
            Err(e) => Err(CoreError::Database(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_both_recipes() {
        let err = CoreError::CycleDetected {
            parent_id: 3,
            child_id: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("recipe 7"));
        assert!(msg.contains("recipe 3"));
    }

    #[test]
    fn test_user_error_classification() {
        assert!(CoreError::not_found("Recipe", 1).is_user_error());
        assert!(CoreError::Invalid("bad".into()).is_user_error());
        assert!(!CoreError::InternalConsistency("loop".into()).is_user_error());
    }

    #[test]
    fn test_or_not_found_maps_no_rows() {
        let res: rusqlite::Result<i64> = Err(rusqlite::Error::QueryReturnedNoRows);
        let err = res.or_not_found("Recipe", 9).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotFound {
                entity: "Recipe",
                id: 9
            }
        ));
    }
}
