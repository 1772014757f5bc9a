use crate::api::ErrorResponse;
use crate::db::DbPool;
use crate::models::User;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use recipebox_core::Identity;
use std::sync::Arc;
use uuid::Uuid;

use super::db::{get_user_from_token, Authenticated};

/// Extractor that validates the Authorization header and provides the
/// authenticated user, the session it came in on and its roles.
///
/// ```ignore
/// async fn my_handler(auth: AuthUser) -> impl IntoResponse {
///     let identity = auth.identity();
/// }
/// ```
pub struct AuthUser {
    pub user: User,
    pub session_id: Uuid,
    pub roles: Vec<String>,
}

impl AuthUser {
    /// The identity publications and methods see for this user.
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: Some(self.user.id),
            roles: self.roles.clone(),
        }
    }
}

impl From<Authenticated> for AuthUser {
    fn from(auth: Authenticated) -> Self {
        Self {
            user: auth.user,
            session_id: auth.session_id,
            roles: auth.roles,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum AuthError {
    MissingHeader,
    InvalidHeader,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingHeader => "Missing Authorization header",
            AuthError::InvalidHeader => "Invalid Authorization header",
            AuthError::InvalidFormat => "Invalid Authorization header format",
            AuthError::InvalidToken => "Invalid or expired token",
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: message.to_string(),
            }),
        )
            .into_response()
    }
}

/// Pull the bearer token out of the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?;

    let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidHeader)?;

    auth_str
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<DbPool>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let pool = Arc::<DbPool>::from_ref(state);
        let token = bearer_token(&parts.headers)?;

        let auth = get_user_from_token(&pool, token)
            .await
            .ok_or(AuthError::InvalidToken)?;

        Ok(auth.into())
    }
}

/// Like [`AuthUser`], but a missing or invalid token yields `None` instead
/// of rejecting the request.
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    pub fn identity(&self) -> Identity {
        self.0
            .as_ref()
            .map(AuthUser::identity)
            .unwrap_or_else(Identity::anonymous)
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    Arc<DbPool>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(
            AuthUser::from_request_parts(parts, state).await.ok(),
        ))
    }
}
