pub mod logout;
pub mod me;

use crate::AppState;
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

/// Returns the router for /api/auth endpoints that need a session
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me::me))
        .route("/logout", post(logout::logout))
}

#[derive(OpenApi)]
#[openapi(paths(me::me, logout::logout), components(schemas(me::MeResponse)))]
pub struct ApiDoc;
