mod appstate;
mod brands;
mod cache;
mod collection;
mod config;
mod error;
mod filter;
mod handler;
mod paginator;
mod query;
mod session;
mod storage;

use anyhow::Result;
use appstate::AppState;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use config::Config;
use handler::{admin, catalog};
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level()?)
        .init();

    let state = AppState::new(config.clone())?;
    info!(
        products = state.products.len(),
        data_dir = %config.data_dir()?.display(),
        "storage opened"
    );
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.storage.db.flush_async().await?;
    info!("storage flushed, bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(catalog::root))
        .route("/products", get(catalog::list_products))
        .route("/brands", get(catalog::list_brands))
        .route("/catalog/sessions", post(catalog::open_catalog_session))
        .route("/admin/sessions", post(admin::open_admin_session))
        .route("/sessions/:id", delete(catalog::close_session))
        .route("/sessions/:id/next", post(catalog::next_page))
        .route("/sessions/:id/search", post(catalog::search))
        .route("/sessions/:id/products", post(admin::create_product))
        .route(
            "/sessions/:id/products/:product_id",
            patch(admin::update_product).delete(admin::delete_product),
        )
        .route("/sessions/:id/reconcile", post(admin::reconcile))
        .route("/admin/brands", post(admin::create_brand))
        .route("/admin/brands/:id", delete(admin::delete_brand))
        .route("/admin/products/bulk-delete", post(admin::bulk_delete))
        .route("/admin/migrations/brands", post(admin::migrate_brands))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .into_inner(),
        )
}
