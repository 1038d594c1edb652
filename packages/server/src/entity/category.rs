use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Deepest level a category can sit at (Category → Subcategory → Sub-subcategory).
pub const MAX_LEVEL: i32 = 3;

/// Display labels for each level, indexed by `level - 1`.
pub const LEVEL_LABELS: [&str; MAX_LEVEL as usize] = ["Category", "Subcategory", "Sub-subcategory"];

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "category")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stored trimmed and lowercased.
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: Option<String>,

    /// Unique across live and soft-deleted rows. Fixed after creation.
    #[sea_orm(unique)]
    pub slug: String,

    pub is_active: bool,
    pub is_deleted: bool,

    /// 1 for roots, `parent.level + 1` otherwise.
    pub level: i32,
    /// Removing a parent row removes its children with it.
    pub parent_id: Option<Uuid>,
    #[sea_orm(
        self_ref,
        relation_enum = "Parent",
        from = "parent_id",
        to = "id",
        on_delete = "Cascade"
    )]
    pub parent: BelongsTo<Option<Entity>>,

    /// Hex content hash into the blob store.
    pub image_hash: Option<String>,
    pub image_filename: Option<String>,

    pub created_by: Option<Uuid>,
    #[sea_orm(
        belongs_to,
        relation_enum = "Creator",
        from = "created_by",
        to = "id",
        on_delete = "SetNull"
    )]
    pub creator: BelongsTo<Option<super::user::Entity>>,

    pub updated_by: Option<Uuid>,
    #[sea_orm(
        belongs_to,
        relation_enum = "Updater",
        from = "updated_by",
        to = "id",
        on_delete = "SetNull"
    )]
    pub updater: BelongsTo<Option<super::user::Entity>>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
