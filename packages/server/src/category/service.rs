use std::collections::HashSet;

use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ExprTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use super::hierarchy::{self, CategoryNode};
use super::{CategoryError, slug};
use crate::entity::category;
use crate::models::shared::escape_like;

const MAX_NAME_LEN: usize = 255;

/// Postgres takes `OFFSET` as a signed 64-bit integer.
const MAX_OFFSET: u64 = i64::MAX as u64;

/// Input for [`CategoryService::create`].
#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    /// Parent id, or the parent's name.
    pub parent: Option<String>,
    /// Explicit slug; derived from `name` when absent.
    pub slug: Option<String>,
    pub is_active: Option<bool>,
}

/// Partial update for [`CategoryService::update`].
///
/// Outer `None` leaves a field untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub parent: Option<Option<String>>,
    pub is_active: Option<bool>,
}

/// Reference to an image already written to blob storage.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub hash: String,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Name,
    CreatedAt,
    UpdatedAt,
}

#[derive(Debug, Clone)]
pub struct ListParams {
    /// List soft-deleted rows instead of live ones.
    pub deleted: bool,
    pub search: Option<String>,
    pub level: Option<i32>,
    pub parent_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub sort: SortField,
    pub descending: bool,
    /// 1-based.
    pub page: u64,
    pub per_page: u64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            deleted: false,
            search: None,
            level: None,
            parent_id: None,
            is_active: None,
            sort: SortField::Name,
            descending: false,
            page: 1,
            per_page: 20,
        }
    }
}

pub struct CategoryService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> CategoryService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Look up a category by id, soft-deleted or not.
    pub async fn get(&self, id: Uuid) -> Result<category::Model, CategoryError> {
        category::Entity::find_by_id(id)
            .one(self.conn)
            .await?
            .ok_or(CategoryError::NotFound(id))
    }

    pub async fn create(
        &self,
        new: NewCategory,
        actor: Option<Uuid>,
    ) -> Result<category::Model, CategoryError> {
        let name = normalize_name(&new.name)?;

        let parent = match non_blank(new.parent.as_deref()) {
            Some(reference) => Some(self.resolve_parent(reference).await?),
            None => None,
        };
        let level = hierarchy::level_under(parent.as_ref())?;

        let slug = match non_blank(new.slug.as_deref()) {
            Some(requested) => self.claim_slug(requested).await?,
            None => self.derive_slug(&name).await?,
        };

        let now = Utc::now();
        let model = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            description: Set(normalize_description(new.description)),
            slug: Set(slug),
            is_active: Set(new.is_active.unwrap_or(true)),
            is_deleted: Set(false),
            level: Set(level),
            parent_id: Set(parent.map(|p| p.id)),
            image_hash: Set(None),
            image_filename: Set(None),
            created_by: Set(actor),
            updated_by: Set(actor),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model
            .insert(self.conn)
            .await
            .map_err(CategoryError::from_write)?;
        tracing::info!(id = %created.id, slug = %created.slug, level = created.level, "Category created");
        Ok(created)
    }

    /// Apply `changes`. Re-parenting re-checks the depth rule and recomputes `level`.
    pub async fn update(
        &self,
        id: Uuid,
        changes: CategoryChanges,
        actor: Option<Uuid>,
    ) -> Result<category::Model, CategoryError> {
        let existing = self.get(id).await?;
        if changes == CategoryChanges::default() {
            return Ok(existing);
        }

        let mut active: category::ActiveModel = existing.clone().into();

        if let Some(ref name) = changes.name {
            active.name = Set(normalize_name(name)?);
        }
        if let Some(description) = changes.description {
            active.description = Set(normalize_description(description));
        }
        if let Some(parent_ref) = changes.parent {
            let new_parent = match non_blank(parent_ref.as_deref()) {
                Some(reference) => Some(self.resolve_parent(reference).await?),
                None => None,
            };
            let has_children = self.count_children(id).await? > 0;
            let level = hierarchy::level_after_move(&existing, new_parent.as_ref(), has_children)?;
            active.parent_id = Set(new_parent.map(|p| p.id));
            active.level = Set(level);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_by = Set(actor);
        active.updated_at = Set(Utc::now());

        active
            .update(self.conn)
            .await
            .map_err(CategoryError::from_write)
    }

    pub async fn soft_delete(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<category::Model, CategoryError> {
        let existing = self.get(id).await?;
        if existing.is_deleted {
            return Err(CategoryError::InvalidState(
                "Category is already deleted".into(),
            ));
        }
        self.set_deleted(existing, true, actor).await
    }

    pub async fn restore(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<category::Model, CategoryError> {
        let existing = self.get(id).await?;
        if !existing.is_deleted {
            return Err(CategoryError::InvalidState("Category is not deleted".into()));
        }
        self.set_deleted(existing, false, actor).await
    }

    async fn set_deleted(
        &self,
        existing: category::Model,
        deleted: bool,
        actor: Option<Uuid>,
    ) -> Result<category::Model, CategoryError> {
        let mut active: category::ActiveModel = existing.into();
        active.is_deleted = Set(deleted);
        active.updated_by = Set(actor);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.conn).await?)
    }

    /// Permanently remove a category and its whole subtree.
    ///
    /// Returns the removed rows, root first. Run inside a transaction.
    pub async fn hard_delete(&self, id: Uuid) -> Result<Vec<category::Model>, CategoryError> {
        let root = self.get(id).await?;
        let mut removed = vec![root];
        removed.extend(self.descendants_of(id).await?);

        let ids: Vec<Uuid> = removed.iter().map(|c| c.id).collect();
        category::Entity::delete_many()
            .filter(category::Column::Id.is_in(ids))
            .exec(self.conn)
            .await?;

        tracing::info!(%id, removed = removed.len(), "Category subtree deleted");
        Ok(removed)
    }

    /// Nested children of the category with `parent_slug`.
    ///
    /// An unknown slug yields an empty listing rather than an error.
    pub async fn list_children(
        &self,
        parent_slug: &str,
    ) -> Result<Vec<CategoryNode>, CategoryError> {
        let parent = category::Entity::find()
            .filter(category::Column::Slug.eq(parent_slug.trim()))
            .one(self.conn)
            .await?;

        let Some(parent) = parent else {
            return Ok(Vec::new());
        };
        let descendants = self.descendants_of(parent.id).await?;
        Ok(hierarchy::build_forest(parent.id, descendants))
    }

    /// Record a stored image on the category. Returns the updated row and the
    /// hash of the image it replaced, if any.
    pub async fn set_image(
        &self,
        id: Uuid,
        image: ImageRef,
        actor: Option<Uuid>,
    ) -> Result<(category::Model, Option<String>), CategoryError> {
        let existing = self.get(id).await?;
        let previous = existing.image_hash.clone();

        let mut active: category::ActiveModel = existing.into();
        active.image_hash = Set(Some(image.hash));
        active.image_filename = Set(Some(image.filename));
        active.updated_by = Set(actor);
        active.updated_at = Set(Utc::now());

        Ok((active.update(self.conn).await?, previous))
    }

    pub async fn is_image_referenced(&self, hash: &str) -> Result<bool, CategoryError> {
        let count = category::Entity::find()
            .filter(category::Column::ImageHash.eq(hash))
            .count(self.conn)
            .await?;
        Ok(count > 0)
    }

    /// One page of categories plus the total number of matches.
    pub async fn list(
        &self,
        params: &ListParams,
    ) -> Result<(Vec<category::Model>, u64), CategoryError> {
        let mut select =
            category::Entity::find().filter(category::Column::IsDeleted.eq(params.deleted));

        if let Some(term) = non_blank(params.search.as_deref()) {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(category::Column::Name))).like(
                    LikeExpr::new(format!("%{}%", escape_like(&term.to_lowercase()))).escape('\\'),
                ),
            );
        }
        if let Some(level) = params.level {
            select = select.filter(category::Column::Level.eq(level));
        }
        if let Some(parent_id) = params.parent_id {
            select = select.filter(category::Column::ParentId.eq(parent_id));
        }
        if let Some(is_active) = params.is_active {
            select = select.filter(category::Column::IsActive.eq(is_active));
        }

        let total = select.clone().count(self.conn).await?;

        let column = match params.sort {
            SortField::Name => category::Column::Name,
            SortField::CreatedAt => category::Column::CreatedAt,
            SortField::UpdatedAt => category::Column::UpdatedAt,
        };
        let order = if params.descending {
            Order::Desc
        } else {
            Order::Asc
        };
        let offset = page_offset(params.page, params.per_page)?;

        let rows = select
            .order_by(column, order)
            .order_by_asc(category::Column::Id)
            .offset(Some(offset))
            .limit(Some(params.per_page))
            .all(self.conn)
            .await?;

        Ok((rows, total))
    }

    /// Live categories for pickers, optionally only roots.
    pub async fn dialog(&self, roots_only: bool) -> Result<Vec<category::Model>, CategoryError> {
        let mut select = category::Entity::find().filter(category::Column::IsDeleted.eq(false));
        if roots_only {
            select = select.filter(category::Column::ParentId.is_null());
        }
        Ok(select
            .order_by_asc(category::Column::Name)
            .all(self.conn)
            .await?)
    }

    async fn count_children(&self, id: Uuid) -> Result<u64, CategoryError> {
        Ok(category::Entity::find()
            .filter(category::Column::ParentId.eq(id))
            .count(self.conn)
            .await?)
    }

    /// All rows below `root`, breadth first, siblings ordered by name.
    async fn descendants_of(&self, root: Uuid) -> Result<Vec<category::Model>, CategoryError> {
        let mut seen = HashSet::from([root]);
        let mut frontier = vec![root];
        let mut found = Vec::new();

        while !frontier.is_empty() {
            let parents = std::mem::take(&mut frontier);
            let children = category::Entity::find()
                .filter(category::Column::ParentId.is_in(parents))
                .order_by_asc(category::Column::Name)
                .all(self.conn)
                .await?;
            for child in children {
                if seen.insert(child.id) {
                    frontier.push(child.id);
                    found.push(child);
                }
            }
        }

        Ok(found)
    }

    /// Resolve a parent given by id or by (case-insensitive) name.
    async fn resolve_parent(&self, reference: &str) -> Result<category::Model, CategoryError> {
        if let Ok(id) = reference.parse::<Uuid>() {
            return category::Entity::find_by_id(id)
                .one(self.conn)
                .await?
                .ok_or_else(|| {
                    CategoryError::Validation(format!("Parent category {id} does not exist"))
                });
        }

        let mut matches = category::Entity::find()
            .filter(category::Column::Name.eq(reference.to_lowercase()))
            .limit(2)
            .all(self.conn)
            .await?;

        match matches.len() {
            0 => Err(CategoryError::Validation(format!(
                "Parent category '{reference}' does not exist"
            ))),
            1 => Ok(matches.remove(0)),
            _ => Err(CategoryError::Validation(format!(
                "More than one category is named '{reference}'; refer to the parent by id"
            ))),
        }
    }

    async fn derive_slug(&self, name: &str) -> Result<String, CategoryError> {
        let base = slug::base_slug(name);
        let taken: HashSet<String> = category::Entity::find()
            .select_only()
            .column(category::Column::Slug)
            .filter(
                category::Column::Slug
                    .eq(base.as_str())
                    .or(category::Column::Slug.starts_with(format!("{base}-"))),
            )
            .into_tuple::<String>()
            .all(self.conn)
            .await?
            .into_iter()
            .collect();

        Ok(slug::first_available(&base, &taken))
    }

    async fn claim_slug(&self, requested: &str) -> Result<String, CategoryError> {
        if !slug::is_canonical(requested) {
            return Err(CategoryError::Validation(format!(
                "Slug '{requested}' must be lowercase letters and digits separated by single hyphens"
            )));
        }
        let in_use = category::Entity::find()
            .filter(category::Column::Slug.eq(requested))
            .count(self.conn)
            .await?;
        if in_use > 0 {
            return Err(CategoryError::Validation(format!(
                "Slug '{requested}' is already in use"
            )));
        }
        Ok(requested.to_string())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Row offset of a 1-based page. Pages past the addressable range are rejected.
fn page_offset(page: u64, per_page: u64) -> Result<u64, CategoryError> {
    (Ord::max(page, 1) - 1)
        .checked_mul(per_page)
        .filter(|offset| *offset <= MAX_OFFSET)
        .ok_or_else(|| CategoryError::Validation(format!("page {page} is out of range")))
}

fn normalize_name(name: &str) -> Result<String, CategoryError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(CategoryError::Validation(format!(
            "Name must be 1-{MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_lowercase())
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}
