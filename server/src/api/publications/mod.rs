pub mod subscribe;

use crate::AppState;
use axum::routing::get;
use axum::Router;
use utoipa::OpenApi;

/// Returns the router for /api/publications endpoints.
///
/// Anonymous callers may connect; they get an empty publication.
pub fn router() -> Router<AppState> {
    Router::new().route("/{channel}", get(subscribe::subscribe))
}

#[derive(OpenApi)]
#[openapi(paths(subscribe::subscribe))]
pub struct ApiDoc;
