use std::{process, sync::Arc};

use stampino::{
    application::{
        accounts::AccountService,
        error::AppError,
        export::ExportPipeline,
        identity::IdentityCipher,
        ingest::IngestService,
        item_sets::ItemSetService,
        media::MediaStore,
        preview::PreviewService,
        render::TextCompositor,
        repos::{ImagesRepo, ItemSetsRepo, UsersRepo},
    },
    cache::{CacheStore, CacheSyncEngine, MemoryCacheStore},
    config,
    infra::{
        assets::FontLibrary,
        db::PostgresRepositories,
        error::InfraError,
        http::{AppState, build_router},
        media::HttpMediaStore,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    run_serve(settings).await
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let item_sets_repo: Arc<dyn ItemSetsRepo> = repositories.clone();
    let images_repo: Arc<dyn ImagesRepo> = repositories.clone();

    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let engine = Arc::new(CacheSyncEngine::new(
        item_sets_repo.clone(),
        cache,
        settings.cache.window,
    ));

    let media: Arc<dyn MediaStore> = Arc::new(HttpMediaStore::from_settings(&settings.media)?);
    let fonts = FontLibrary::new(settings.render.fonts_dir.clone());
    let renderer = Arc::new(TextCompositor::new(fonts.clone()));
    let identity = Arc::new(
        IdentityCipher::new(&settings.identity.master_secret)
            .map_err(|err| AppError::unexpected(err.to_string()))?,
    );

    std::fs::create_dir_all(&settings.render.scratch_dir).map_err(InfraError::from)?;

    let state = AppState {
        accounts: Arc::new(AccountService::new(
            users_repo,
            item_sets_repo.clone(),
            engine.clone(),
        )),
        item_sets: Arc::new(ItemSetService::new(item_sets_repo.clone(), engine.clone())),
        ingest: Arc::new(IngestService::new(item_sets_repo.clone(), engine.clone())),
        export: Arc::new(ExportPipeline::new(
            item_sets_repo.clone(),
            images_repo.clone(),
            media.clone(),
            renderer.clone(),
            settings.render.scratch_dir.clone(),
        )),
        preview: Arc::new(PreviewService::new(
            item_sets_repo,
            images_repo.clone(),
            media.clone(),
            renderer,
        )),
        engine,
        images: images_repo,
        media,
        identity,
        cookie_name: settings.identity.cookie_name.clone(),
        fonts,
        db: (*repositories).clone(),
    };

    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "stampino listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn shutdown_signal(grace: std::time::Duration) {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to install shutdown signal handler");
        return;
    }
    info!(grace_seconds = grace.as_secs(), "shutdown signal received");
}
