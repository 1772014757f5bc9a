use crate::api::ErrorResponse;
use crate::auth::AuthUser;
use axum::{response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
    /// Roles granted to the user. Clients gate admin routes on these.
    pub roles: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me(auth: AuthUser) -> impl IntoResponse {
    Json(MeResponse {
        user_id: auth.user.id,
        username: auth.user.username,
        roles: auth.roles,
    })
}
