//! Thin HTTP surface over the application services.

mod middleware;
mod routes;

pub use middleware::{Identity, RequestContext};

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};

use crate::application::accounts::AccountService;
use crate::application::error::ErrorReport;
use crate::application::export::ExportPipeline;
use crate::application::identity::IdentityCipher;
use crate::application::ingest::IngestService;
use crate::application::item_sets::ItemSetService;
use crate::application::media::MediaStore;
use crate::application::preview::PreviewService;
use crate::application::repos::ImagesRepo;
use crate::cache::CacheSyncEngine;
use crate::infra::assets::FontLibrary;
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub item_sets: Arc<ItemSetService>,
    pub ingest: Arc<IngestService>,
    pub export: Arc<ExportPipeline>,
    pub preview: Arc<PreviewService>,
    pub engine: Arc<CacheSyncEngine>,
    pub images: Arc<dyn ImagesRepo>,
    pub media: Arc<dyn MediaStore>,
    pub identity: Arc<IdentityCipher>,
    pub cookie_name: String,
    pub fonts: FontLibrary,
    pub db: PostgresRepositories,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/accounts", post(routes::bootstrap_account))
        .route("/accounts/signup", post(routes::signup))
        .route("/accounts/logout", post(routes::logout))
        .route("/item-sets", get(routes::list_headings))
        .route("/item-sets", post(routes::create_blank))
        .route("/item-sets/ingest", post(routes::ingest_columns))
        .route("/item-sets/{heading}", get(routes::heading_window))
        .route("/item-sets/{heading}", put(routes::update_item_set))
        .route("/item-sets/{heading}", delete(routes::delete_item_set))
        .route("/item-sets/{heading}/full", get(routes::load_full))
        .route("/item-sets/{heading}/items", post(routes::append_items))
        .route("/image", post(routes::upload_image))
        .route("/preview", post(routes::refresh_preview))
        .route("/export/{format}", get(routes::export_archive))
        .route("/_health/db", get(routes::db_health))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::extract_identity,
        ))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}

fn db_health_response(result: Result<(), sqlx::Error>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
