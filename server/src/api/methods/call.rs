use crate::auth::AuthUser;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use recipebox_core::{dispatch, Catalog, MethodError, Violation};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;

/// Error body for a failed method call.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MethodErrorResponse {
    pub error: String,
    /// Machine-readable error code, e.g. `validation-error`.
    pub code: String,
    /// Per-field violations, present only for `validation-error`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub violations: Vec<Violation>,
}

/// Free-form JSON, used for method arguments and results.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(value_type = Object)]
pub struct MethodPayload(pub Value);

pub fn status_for(err: &MethodError) -> StatusCode {
    match err {
        MethodError::NotLoggedIn => StatusCode::UNAUTHORIZED,
        MethodError::NotAuthorized => StatusCode::FORBIDDEN,
        MethodError::Validation(_) | MethodError::BadArguments(_) => StatusCode::BAD_REQUEST,
        MethodError::NotFound(_) | MethodError::UnknownMethod(_) => StatusCode::NOT_FOUND,
        MethodError::Duplicate(_) => StatusCode::CONFLICT,
        MethodError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: MethodError) -> Response {
    let status = status_for(&err);
    let violations = match &err {
        MethodError::Validation(validation) => validation.violations.clone(),
        _ => Vec::new(),
    };
    (
        status,
        Json(MethodErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
            violations,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/api/methods/{name}",
    tag = "methods",
    params(
        ("name" = String, Path, description = "Method name, e.g. recipes.insert")
    ),
    request_body(content = MethodPayload, description = "Method arguments"),
    responses(
        (status = 200, description = "Method result", body = MethodPayload),
        (status = 400, description = "Invalid arguments or document", body = MethodErrorResponse),
        (status = 401, description = "Not logged in", body = MethodErrorResponse),
        (status = 403, description = "Missing role", body = MethodErrorResponse),
        (status = 404, description = "Unknown method or document", body = MethodErrorResponse),
        (status = 409, description = "Duplicate document", body = MethodErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn call(
    State(catalog): State<Arc<Catalog>>,
    auth: AuthUser,
    Path(name): Path<String>,
    Json(arguments): Json<Value>,
) -> Response {
    let identity = auth.identity();

    let result =
        tokio::task::spawn_blocking(move || dispatch(&catalog, &identity, &name, arguments))
            .await;

    match result {
        Ok(Ok(value)) => Json(value).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(e) => {
            tracing::error!("Method task failed: {}", e);
            error_response(MethodError::Internal("method task failed".to_string()))
        }
    }
}
