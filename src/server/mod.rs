use crate::carousel::CarouselAllocator;
use crate::config::Config;
use crate::photos::{CommitCoordinator, IngestPipeline, RenditionStore};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use vitrine_common::Error;
use vitrine_db::pool::DbPool;

pub mod routes_carousel;
pub mod routes_photos;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub db_pool: DbPool,
    /// Content-addressed rendition files
    pub store: Arc<RenditionStore>,
    /// Upload validation and rendition generation
    pub ingest: Arc<IngestPipeline>,
    /// Serialized per-product photo set commits
    pub commits: Arc<CommitCoordinator>,
    /// Homepage slot assignment
    pub carousel: Arc<CarouselAllocator>,
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest(
            "/api",
            routes_photos::photo_routes().merge(routes_carousel::carousel_routes()),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Map a workflow error onto an HTTP response.
///
/// Validation rejections are 400, missing resources 404, stale-version and
/// occupied-slot conflicts 409, everything else 500. Slot conflicts carry
/// the holding product so the client can resolve the collision.
pub(crate) fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::UnknownPhotoReference(_) => StatusCode::BAD_REQUEST,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        e if e.is_conflict() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed");
    }

    let body = match &err {
        Error::SlotTaken { position, holder } => serde_json::json!({
            "error": err.to_string(),
            "position": position,
            "holder": holder,
        }),
        _ => serde_json::json!({ "error": err.to_string() }),
    };

    (status, Json(body)).into_response()
}

/// Start the HTTP server
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
