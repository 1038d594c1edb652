use std::collections::HashSet;

use axum::{
    Json,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::Field},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use common::storage::{BlobStore, ContentHash};
use sea_orm::TransactionTrait;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::instrument;
use uuid::Uuid;

use crate::category::{CategoryNode, CategoryService, ImageRef};
use crate::config::StorageConfig;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::category::{
    CategoryListQuery, CategoryListResponse, CategoryResponse, ChildrenQuery,
    CreateCategoryRequest, DialogItem, ImageUpload, LevelOption, UpdateCategoryRequest,
    level_options,
};
use crate::models::shared::Pagination;
use crate::policy::Operation;
use crate::state::AppState;
use crate::utils::filename::{content_disposition_value, validate_flat_filename};

/// Multipart part carrying the uploaded file.
const IMAGE_FIELD: &str = "image";

/// Body limit for image uploads: the blob limit plus room for multipart framing.
pub fn image_body_limit(storage: &StorageConfig) -> DefaultBodyLimit {
    let limit = storage.max_blob_size.saturating_add(64 * 1024);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Categories",
    operation_id = "listCategories",
    summary = "List categories",
    description = "Paginated list of categories that are not soft-deleted. Supports case-insensitive name search, filters on `level`, `parent_id` and `is_active`, and sorting by `name` (default, ascending), `created_at` or `updated_at`.",
    params(CategoryListQuery),
    responses(
        (status = 200, description = "Page of categories", body = CategoryListResponse),
        (status = 400, description = "Bad query parameter (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_categories(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<CategoryListQuery>,
) -> Result<Json<CategoryListResponse>, AppError> {
    auth_user.require(Operation::CategoryRead)?;
    list_page(&state, query, false).await
}

#[utoipa::path(
    get,
    path = "/deleted",
    tag = "Categories",
    operation_id = "listDeletedCategories",
    summary = "List soft-deleted categories",
    description = "Same filters and sorting as the main listing, over soft-deleted rows only. Requires `category:list_deleted`.",
    params(CategoryListQuery),
    responses(
        (status = 200, description = "Page of soft-deleted categories", body = CategoryListResponse),
        (status = 400, description = "Bad query parameter (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_deleted_categories(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<CategoryListQuery>,
) -> Result<Json<CategoryListResponse>, AppError> {
    auth_user.require(Operation::CategoryListDeleted)?;
    list_page(&state, query, true).await
}

async fn list_page(
    state: &AppState,
    query: CategoryListQuery,
    deleted: bool,
) -> Result<Json<CategoryListResponse>, AppError> {
    let params = query.into_params(deleted)?;
    let (rows, total) = CategoryService::new(&state.db).list(&params).await?;

    Ok(Json(CategoryListResponse {
        data: rows.into_iter().map(CategoryResponse::from).collect(),
        pagination: Pagination::new(params.page, params.per_page, total),
    }))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Categories",
    operation_id = "createCategory",
    summary = "Create a category",
    description = "Creates a category, optionally under a top-level parent given by id or name. The level is derived from the parent and the slug from the name unless one is supplied. Requires `category:create`.",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Validation error, e.g. parent is already a subcategory (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(name = %payload.name))]
pub async fn create_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(Operation::CategoryCreate)?;

    let txn = state.db.begin().await?;
    let created = CategoryService::new(&txn)
        .create(payload.into(), Some(auth_user.user_id))
        .await?;
    txn.commit().await?;

    Ok((StatusCode::CREATED, Json(CategoryResponse::from(created))))
}

#[utoipa::path(
    get,
    path = "/children",
    tag = "Categories",
    operation_id = "listCategoryChildren",
    summary = "Nested children of a category",
    description = "Returns every descendant of the category with the given slug as a nested tree. Soft-deleted nodes are included and flagged. An unknown or missing slug yields an empty list.",
    params(ChildrenQuery),
    responses(
        (status = 200, description = "Nested children", body = Vec<CategoryNode>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(slug = ?query.slug))]
pub async fn list_children(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ChildrenQuery>,
) -> Result<Json<Vec<CategoryNode>>, AppError> {
    auth_user.require(Operation::CategoryRead)?;
    let Some(slug) = query.slug else {
        return Ok(Json(Vec::new()));
    };
    let nodes = CategoryService::new(&state.db).list_children(&slug).await?;
    Ok(Json(nodes))
}

#[utoipa::path(
    get,
    path = "/dialog",
    tag = "Categories",
    operation_id = "categoryDialog",
    summary = "All categories for pickers",
    description = "Every category that is not soft-deleted, as `{id, name, slug}`, ordered by name.",
    responses(
        (status = 200, description = "Categories", body = Vec<DialogItem>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn dialog(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<DialogItem>>, AppError> {
    auth_user.require(Operation::CategoryRead)?;
    let rows = CategoryService::new(&state.db).dialog(false).await?;
    Ok(Json(rows.into_iter().map(DialogItem::from).collect()))
}

#[utoipa::path(
    get,
    path = "/parents",
    tag = "Categories",
    operation_id = "parentCategoryDialog",
    summary = "Possible parents for pickers",
    description = "Top-level categories that are not soft-deleted, the only ones that may receive children.",
    responses(
        (status = 200, description = "Top-level categories", body = Vec<DialogItem>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn parent_dialog(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<DialogItem>>, AppError> {
    auth_user.require(Operation::CategoryRead)?;
    let rows = CategoryService::new(&state.db).dialog(true).await?;
    Ok(Json(rows.into_iter().map(DialogItem::from).collect()))
}

#[utoipa::path(
    get,
    path = "/levels",
    tag = "Categories",
    operation_id = "levelDialog",
    summary = "Level choices",
    description = "The fixed list of category levels with their display labels.",
    responses(
        (status = 200, description = "Level choices", body = Vec<LevelOption>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
pub async fn level_dialog(auth_user: AuthUser) -> Result<Json<Vec<LevelOption>>, AppError> {
    auth_user.require(Operation::CategoryRead)?;
    Ok(Json(level_options()))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Categories",
    operation_id = "getCategory",
    summary = "Get a category by ID",
    description = "Returns the category whether or not it is soft-deleted.",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category details", body = CategoryResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn get_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CategoryResponse>, AppError> {
    auth_user.require(Operation::CategoryRead)?;
    let category = CategoryService::new(&state.db).get(id).await?;
    Ok(Json(category.into()))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Categories",
    operation_id = "updateCategory",
    summary = "Update a category",
    description = "Partially updates name, description, parent and active flag. Changing the parent re-checks the depth rule and recomputes the level. Slug and level cannot be set directly. An empty payload returns the category unchanged. Requires `category:update`.",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = CategoryResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn update_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateCategoryRequest>,
) -> Result<Json<CategoryResponse>, AppError> {
    auth_user.require(Operation::CategoryUpdate)?;

    let txn = state.db.begin().await?;
    let updated = CategoryService::new(&txn)
        .update(id, payload.into(), Some(auth_user.user_id))
        .await?;
    txn.commit().await?;

    Ok(Json(updated.into()))
}

#[utoipa::path(
    post,
    path = "/{id}/soft-delete",
    tag = "Categories",
    operation_id = "softDeleteCategory",
    summary = "Soft-delete a category",
    description = "Hides the category from default listings. Children are not affected and the slug stays reserved. Requires `category:soft_delete`.",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category soft-deleted", body = CategoryResponse),
        (status = 400, description = "Already deleted (INVALID_STATE)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn soft_delete_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CategoryResponse>, AppError> {
    auth_user.require(Operation::CategorySoftDelete)?;
    let category = CategoryService::new(&state.db)
        .soft_delete(id, Some(auth_user.user_id))
        .await?;
    Ok(Json(category.into()))
}

#[utoipa::path(
    post,
    path = "/{id}/restore",
    tag = "Categories",
    operation_id = "restoreCategory",
    summary = "Restore a soft-deleted category",
    description = "Requires `category:restore`.",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category restored", body = CategoryResponse),
        (status = 400, description = "Not deleted (INVALID_STATE)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn restore_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CategoryResponse>, AppError> {
    auth_user.require(Operation::CategoryRestore)?;
    let category = CategoryService::new(&state.db)
        .restore(id, Some(auth_user.user_id))
        .await?;
    Ok(Json(category.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Categories",
    operation_id = "deleteCategory",
    summary = "Permanently delete a category",
    description = "Deletes the category and its whole subtree in one transaction, freeing their slugs. Images no longer referenced by any category are removed from storage. Irreversible. Requires `category:hard_delete`.",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category and descendants deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn delete_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth_user.require(Operation::CategoryHardDelete)?;

    let txn = state.db.begin().await?;
    let removed = CategoryService::new(&txn).hard_delete(id).await?;
    txn.commit().await?;

    release_images(&state, removed.into_iter().filter_map(|c| c.image_hash)).await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/image",
    tag = "Categories",
    operation_id = "uploadCategoryImage",
    summary = "Upload a category image",
    description = "Replaces the category image with the `image` part of a multipart body. The filename must be flat and its extension must map to an `image/*` type. Requires `category:update`.",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = CategoryResponse),
        (status = 400, description = "Missing part, bad filename, not an image or too large (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart))]
pub async fn upload_image(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<CategoryResponse>, AppError> {
    auth_user.require(Operation::CategoryUpdate)?;
    CategoryService::new(&state.db).get(id).await?;

    let (filename, hash, size) = store_image_part(
        multipart,
        state.blob_store.as_ref(),
        state.config.storage.max_blob_size,
    )
    .await?;
    tracing::debug!(%hash, size, "Image stored");

    let txn = state.db.begin().await?;
    let (category, previous) = CategoryService::new(&txn)
        .set_image(
            id,
            ImageRef {
                hash: hash.to_hex(),
                filename,
            },
            Some(auth_user.user_id),
        )
        .await?;
    txn.commit().await?;

    if let Some(previous) = previous.filter(|p| *p != hash.to_hex()) {
        release_images(&state, [previous]).await;
    }

    Ok(Json(category.into()))
}

#[utoipa::path(
    get,
    path = "/{id}/image",
    tag = "Categories",
    operation_id = "getCategoryImage",
    summary = "Download a category image",
    description = "Streams the stored image with a content type guessed from its filename. Supports `If-None-Match`.",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 304, description = "Not modified"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Category or image not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, headers))]
pub async fn get_image(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    auth_user.require(Operation::CategoryRead)?;

    let category = CategoryService::new(&state.db).get(id).await?;
    let (Some(hash), Some(filename)) = (category.image_hash, category.image_filename) else {
        return Err(AppError::NotFound("Category has no image".into()));
    };

    let etag_value = format!("\"{hash}\"");
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && (val == etag_value || val == "*")
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let hash: ContentHash = hash.parse()?;
    let reader = state.blob_store.open(&hash).await?;
    let body = Body::from_stream(ReaderStream::new(reader));
    let content_type = mime_guess::from_path(&filename).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&filename),
        )
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

/// Find the `image` part of a multipart body and store it.
///
/// Returns the validated filename, the content hash and the size in bytes.
async fn store_image_part(
    mut multipart: Multipart,
    blob_store: &dyn BlobStore,
    max_size: u64,
) -> Result<(String, ContentHash, u64), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .ok_or_else(|| AppError::Validation("The image part must have a filename".into()))?;
        let filename = validate_flat_filename(filename)
            .map_err(|e| AppError::Validation(e.message().into()))?
            .to_string();

        let mime = mime_guess::from_path(&filename).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::IMAGE {
            return Err(AppError::Validation(format!(
                "'{filename}' is not an image file"
            )));
        }

        let (hash, size) = stream_field_to_store(field, blob_store, max_size).await?;
        return Ok((filename, hash, size));
    }

    Err(AppError::Validation(format!(
        "Missing '{IMAGE_FIELD}' file part"
    )))
}

/// Spool a multipart field to a temp file, then hand it to the blob store.
async fn stream_field_to_store(
    mut field: Field<'_>,
    blob_store: &dyn BlobStore,
    max_size: u64,
) -> Result<(ContentHash, u64), AppError> {
    let temp_path = std::env::temp_dir().join(format!("venue-upload-{}", Uuid::new_v4()));

    let result = async {
        let mut temp_file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;

        let mut total_size: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
        {
            total_size += chunk.len() as u64;
            if total_size > max_size {
                return Err(AppError::Validation(format!(
                    "Image exceeds the {max_size} byte limit"
                )));
            }
            temp_file
                .write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
        }
        if total_size == 0 {
            return Err(AppError::Validation("Image is empty".into()));
        }

        temp_file
            .flush()
            .await
            .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;
        drop(temp_file);

        let file = tokio::fs::File::open(&temp_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reopen temp file: {e}")))?;
        let hash = blob_store.put_stream(Box::new(file)).await?;

        Ok((hash, total_size))
    }
    .await;

    let _ = tokio::fs::remove_file(&temp_path).await;

    result
}

/// Remove blobs that no category references any more. Failures are logged
/// and leave an orphaned blob behind.
async fn release_images(state: &AppState, hashes: impl IntoIterator<Item = String>) {
    let service = CategoryService::new(&state.db);
    let hashes: HashSet<String> = hashes.into_iter().collect();

    for hex in hashes {
        match service.is_image_referenced(&hex).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(hash = %hex, error = %e, "Could not check image references");
                continue;
            }
        }

        let removed = match hex.parse::<ContentHash>() {
            Ok(hash) => state.blob_store.remove(&hash).await,
            Err(e) => Err(e),
        };
        match removed {
            Ok(_) => tracing::debug!(hash = %hex, "Released unreferenced image"),
            Err(e) => tracing::warn!(hash = %hex, error = %e, "Failed to release image"),
        }
    }
}
