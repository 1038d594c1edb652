use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/categories", category_routes(config))
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
}

fn category_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let crud = OpenApiRouter::new()
        .routes(routes!(
            handlers::category::list_categories,
            handlers::category::create_category
        ))
        .routes(routes!(handlers::category::list_deleted_categories))
        .routes(routes!(handlers::category::list_children))
        .routes(routes!(handlers::category::dialog))
        .routes(routes!(handlers::category::parent_dialog))
        .routes(routes!(handlers::category::level_dialog))
        .routes(routes!(
            handlers::category::get_category,
            handlers::category::update_category,
            handlers::category::delete_category
        ))
        .routes(routes!(handlers::category::soft_delete_category))
        .routes(routes!(handlers::category::restore_category));

    let images = OpenApiRouter::new()
        .routes(routes!(
            handlers::category::upload_image,
            handlers::category::get_image
        ))
        .layer(handlers::category::image_body_limit(&config.storage));

    crud.merge(images)
}
