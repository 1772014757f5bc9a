mod api;
mod auth;
mod config;
mod db;
mod models;
mod schema;
mod seed;
mod store;
mod telemetry;

use anyhow::Context;
use axum::extract::{FromRef, MatchedPath};
use axum::http::Request;
use axum::middleware;
use axum::Router;
use recipebox_core::Catalog;
use std::env;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Span;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;
use crate::db::DbPool;
use crate::store::PgStore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<DbPool>,
    pub catalog: Arc<Catalog>,
    pub config: Arc<ServerConfig>,
}

impl FromRef<AppState> for Arc<DbPool> {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<Catalog> {
    fn from_ref(state: &AppState) -> Self {
        state.catalog.clone()
    }
}

impl FromRef<AppState> for Arc<ServerConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Check for --openapi flag to dump spec and exit
    if env::args().any(|arg| arg == "--openapi") {
        let spec = api::openapi().to_pretty_json()?;
        println!("{}", spec);
        return Ok(());
    }

    telemetry::init_telemetry()?;

    let config = ServerConfig::from_env()?;
    let pool = Arc::new(db::create_pool(&config.database_url)?);
    let catalog = Arc::new(Catalog::new(
        Arc::new(PgStore::new(pool.clone())),
        config.change_buffer,
    ));

    if let Some(path) = &config.settings_path {
        let settings = seed::load_settings(path)?;
        seed::seed_defaults(&pool, &catalog, &settings)?;
    }

    let bind_addr = config.bind_addr;
    let state = AppState {
        pool: pool.clone(),
        catalog,
        config: Arc::new(config),
    };

    // Public routes (no auth required)
    let public_router = api::public::router().nest("/api/publications", api::publications::router());

    // Protected routes (auth required)
    let protected_router = Router::new()
        .nest("/api/test", api::testing::router())
        .nest("/api/auth", api::auth::router())
        .nest("/api/methods", api::methods::router())
        .layer(middleware::from_fn_with_state(pool, auth::require_auth));

    let swagger_ui = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api::openapi());

    let app = Router::new()
        .merge(public_router)
        .merge(protected_router)
        .merge(swagger_ui)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let matched_path = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map(MatchedPath::as_str)
                        .unwrap_or(request.uri().path());

                    // Don't create a span at all for noisy endpoints
                    if matched_path == "/api/test/unauthed-ping" {
                        tracing::trace_span!("http_request")
                    } else {
                        tracing::info_span!(
                            "http_request",
                            method = %request.method(),
                            path = %matched_path,
                        )
                    }
                })
                .on_request(|_request: &Request<_>, _span: &Span| {})
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        if span.metadata().map(|m| m.level()) == Some(&tracing::Level::TRACE) {
                            return;
                        }
                        let status = response.status().as_u16();
                        if status >= 500 {
                            tracing::error!(
                                status = %status,
                                latency_ms = %latency.as_millis(),
                                "request failed with server error"
                            );
                        } else {
                            tracing::info!(
                                status = %status,
                                latency_ms = %latency.as_millis(),
                                "request completed"
                            );
                        }
                    },
                )
                .on_failure(
                    |error: tower_http::classify::ServerErrorsFailureClass,
                     latency: std::time::Duration,
                     _span: &Span| {
                        tracing::error!(
                            error = %error,
                            latency_ms = %latency.as_millis(),
                            "request failed"
                        );
                    },
                ),
        );

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on {}", listener.local_addr()?);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
