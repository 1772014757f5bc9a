pub mod call;

use crate::AppState;
use axum::routing::post;
use axum::Router;
use utoipa::OpenApi;

/// Returns the router for /api/methods endpoints (mounted at /api/methods)
pub fn router() -> Router<AppState> {
    Router::new().route("/{name}", post(call::call))
}

#[derive(OpenApi)]
#[openapi(
    paths(call::call),
    components(schemas(call::MethodErrorResponse, call::MethodPayload))
)]
pub struct ApiDoc;
