use sea_orm::sea_query::{Index, OnConflict, PostgresQueryBuilder};
use sea_orm::*;
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::entity::{category, user};
use crate::policy::Role;
use crate::utils::hash;

/// Create the bootstrap SUPERUSER from configuration if it does not exist yet.
///
/// Does nothing unless both `auth.bootstrap_email` and
/// `auth.bootstrap_password` are set. An existing account with that email is
/// left untouched, password included.
pub async fn seed_bootstrap_superuser(
    db: &DatabaseConnection,
    auth: &AuthConfig,
) -> Result<(), DbErr> {
    let (Some(email), Some(password)) = (&auth.bootstrap_email, &auth.bootstrap_password) else {
        return Ok(());
    };

    let password = hash::hash_password(password)
        .map_err(|e| DbErr::Custom(format!("Password hash error: {e}")))?;
    let now = chrono::Utc::now();
    let model = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.trim().to_lowercase()),
        name: Set("Superuser".to_string()),
        password: Set(password),
        role: Set(Role::Superuser.as_str().to_string()),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let result = user::Entity::insert(model)
        .on_conflict(
            OnConflict::column(user::Column::Email)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await;

    match result {
        Ok(0) | Err(DbErr::RecordNotInserted) => {}
        Ok(_) => info!(email = %email, "Seeded bootstrap superuser"),
        Err(e) => return Err(e),
    }

    Ok(())
}

/// Ensure the indexes used by hierarchy walks and listings exist.
///
/// Schema-sync only creates the unique slug index, so the lookup indexes are
/// created here on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let indexes = [
        ("idx_category_parent_id", category::Column::ParentId),
        ("idx_category_is_deleted", category::Column::IsDeleted),
    ];

    for (name, column) in indexes {
        let stmt = Index::create()
            .if_not_exists()
            .name(name)
            .table(category::Entity)
            .col(column)
            .to_string(PostgresQueryBuilder);

        match db.execute_unprepared(&stmt).await {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => tracing::warn!("Failed to create index {}: {}", name, e),
        }
    }

    Ok(())
}
