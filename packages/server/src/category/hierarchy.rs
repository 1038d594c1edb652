use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use super::CategoryError;
use crate::entity::category;

/// Deepest level that may still receive children.
pub const MAX_PARENT_LEVEL: i32 = 1;

/// Level of a category placed under `parent` (or at the root).
pub fn level_under(parent: Option<&category::Model>) -> Result<i32, CategoryError> {
    match parent {
        None => Ok(1),
        Some(parent) if parent.level > MAX_PARENT_LEVEL => Err(CategoryError::Validation(
            "Subcategories cannot have subcategories.".into(),
        )),
        Some(parent) => Ok(parent.level + 1),
    }
}

/// Level of `category` after re-parenting it under `new_parent`.
///
/// Keeping the current parent is always allowed. A category that has
/// children may only stay where it is or become a root, otherwise its
/// children would hang below a level-2 node.
pub fn level_after_move(
    category: &category::Model,
    new_parent: Option<&category::Model>,
    has_children: bool,
) -> Result<i32, CategoryError> {
    if new_parent.map(|p| p.id) == category.parent_id {
        return Ok(category.level);
    }
    let Some(parent) = new_parent else {
        return Ok(1);
    };
    if parent.id == category.id {
        return Err(CategoryError::Validation(
            "A category cannot be its own parent".into(),
        ));
    }
    if has_children {
        return Err(CategoryError::Validation(
            "A category that has subcategories cannot be moved under another category".into(),
        ));
    }
    level_under(Some(parent))
}

/// One entry of a nested children listing.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CategoryNode {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub level: i32,
    pub is_deleted: bool,
    #[schema(no_recursion)]
    pub children: Vec<CategoryNode>,
}

/// Nest `descendants` under `root`.
///
/// Rows keep their relative input order among siblings. Rows not reachable
/// from `root` are dropped, and a row is never emitted twice.
pub fn build_forest(root: Uuid, descendants: Vec<category::Model>) -> Vec<CategoryNode> {
    let mut by_parent: HashMap<Uuid, Vec<category::Model>> = HashMap::new();
    for row in descendants {
        if let Some(parent_id) = row.parent_id {
            by_parent.entry(parent_id).or_default().push(row);
        }
    }

    let mut visited = HashSet::from([root]);
    assemble(root, &mut by_parent, &mut visited)
}

fn assemble(
    parent: Uuid,
    by_parent: &mut HashMap<Uuid, Vec<category::Model>>,
    visited: &mut HashSet<Uuid>,
) -> Vec<CategoryNode> {
    let Some(rows) = by_parent.remove(&parent) else {
        return Vec::new();
    };

    let mut nodes = Vec::with_capacity(rows.len());
    for row in rows {
        if !visited.insert(row.id) {
            continue;
        }
        let children = assemble(row.id, by_parent, visited);
        nodes.push(CategoryNode {
            id: row.id,
            name: row.name,
            slug: row.slug,
            level: row.level,
            is_deleted: row.is_deleted,
            children,
        });
    }
    nodes
}
