use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::{CategoryChanges, ListParams, NewCategory, SortField};
use crate::entity::category::{self, LEVEL_LABELS, MAX_LEVEL};
use crate::error::AppError;

use super::shared::{Pagination, double_option, page_window};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateCategoryRequest {
    /// Display name; stored trimmed and lowercased.
    #[schema(example = "Fast Food")]
    pub name: String,
    pub description: Option<String>,
    /// Parent category, by id or by name. Only top-level categories can be parents.
    #[schema(example = "food")]
    pub parent: Option<String>,
    /// Explicit slug. Derived from the name when omitted.
    #[schema(example = "fast-food")]
    pub slug: Option<String>,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
}

impl From<CreateCategoryRequest> for NewCategory {
    fn from(req: CreateCategoryRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            parent: req.parent,
            slug: req.slug,
            is_active: req.is_active,
        }
    }
}

/// PATCH body. Absent fields are left alone; `null` clears nullable ones.
#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    /// New parent by id or name; `null` moves the category to the top level.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub parent: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl From<UpdateCategoryRequest> for CategoryChanges {
    fn from(req: UpdateCategoryRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            parent: req.parent,
            is_active: req.is_active,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    #[schema(example = "fast food")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "fast-food")]
    pub slug: String,
    pub is_active: bool,
    pub is_deleted: bool,
    #[schema(example = 2)]
    pub level: i32,
    #[schema(example = "Subcategory")]
    pub level_label: &'static str,
    pub parent_id: Option<Uuid>,
    /// Download URL of the category image, when one has been uploaded.
    #[schema(example = "/api/v1/categories/0b7c.../image")]
    pub image_url: Option<String>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<category::Model> for CategoryResponse {
    fn from(m: category::Model) -> Self {
        Self {
            image_url: m
                .image_hash
                .as_ref()
                .map(|_| format!("/api/v1/categories/{}/image", m.id)),
            level_label: level_label(m.level),
            id: m.id,
            name: m.name,
            description: m.description,
            slug: m.slug,
            is_active: m.is_active,
            is_deleted: m.is_deleted,
            level: m.level,
            parent_id: m.parent_id,
            created_by: m.created_by,
            updated_by: m.updated_by,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

fn level_label(level: i32) -> &'static str {
    usize::try_from(level - 1)
        .ok()
        .and_then(|i| LEVEL_LABELS.get(i))
        .copied()
        .unwrap_or("Unknown")
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CategoryListResponse {
    pub data: Vec<CategoryResponse>,
    pub pagination: Pagination,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CategoryListQuery {
    /// Page number (default 1).
    pub page: Option<u64>,
    /// Items per page (default 20, max 100).
    pub per_page: Option<u64>,
    /// Case-insensitive substring match on the name.
    pub search: Option<String>,
    pub level: Option<i32>,
    pub parent_id: Option<Uuid>,
    pub is_active: Option<bool>,
    /// `name` (default), `created_at` or `updated_at`.
    pub sort_by: Option<String>,
    /// `asc` (default) or `desc`.
    pub sort_order: Option<String>,
}

impl CategoryListQuery {
    pub fn into_params(self, deleted: bool) -> Result<ListParams, AppError> {
        let sort = match self.sort_by.as_deref().unwrap_or("name") {
            "name" => SortField::Name,
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            _ => {
                return Err(AppError::Validation(
                    "sort_by must be one of: name, created_at, updated_at".into(),
                ));
            }
        };
        let descending = match self.sort_order.as_deref().unwrap_or("asc") {
            "asc" => false,
            "desc" => true,
            _ => {
                return Err(AppError::Validation(
                    "sort_order must be one of: asc, desc".into(),
                ));
            }
        };
        if let Some(level) = self.level
            && !(1..=MAX_LEVEL).contains(&level)
        {
            return Err(AppError::Validation(format!(
                "level must be between 1 and {MAX_LEVEL}"
            )));
        }

        let (page, per_page) = page_window(self.page, self.per_page);
        Ok(ListParams {
            deleted,
            search: self.search,
            level: self.level,
            parent_id: self.parent_id,
            is_active: self.is_active,
            sort,
            descending,
            page,
            per_page,
        })
    }
}

/// Multipart body for image uploads.
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct ImageUpload {
    /// Image file; the filename extension decides the stored content type.
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChildrenQuery {
    /// Slug of the category whose descendants are listed. Without one the
    /// listing is empty.
    pub slug: Option<String>,
}

/// Compact entry for pickers.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DialogItem {
    pub id: Uuid,
    #[schema(example = "food")]
    pub name: String,
    #[schema(example = "food")]
    pub slug: String,
}

impl From<category::Model> for DialogItem {
    fn from(m: category::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            slug: m.slug,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LevelOption {
    #[schema(example = 1)]
    pub value: i32,
    #[schema(example = "Category")]
    pub display: &'static str,
}

pub fn level_options() -> Vec<LevelOption> {
    (1..=MAX_LEVEL)
        .zip(LEVEL_LABELS)
        .map(|(value, display)| LevelOption { value, display })
        .collect()
}
