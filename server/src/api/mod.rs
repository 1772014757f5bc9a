pub mod auth;
pub mod methods;
pub mod public;
pub mod publications;
pub mod testing;

use serde::Serialize;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{OpenApi, ToSchema};

/// Shared error response used by all endpoints
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Generate the complete OpenAPI spec by merging all module specs
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Base spec with shared components and security
    #[derive(OpenApi)]
    #[openapi(components(schemas(ErrorResponse)))]
    struct BaseApi;

    let mut spec = BaseApi::openapi();

    if let Some(components) = spec.components.as_mut() {
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }

    let modules: Vec<utoipa::openapi::OpenApi> = vec![
        public::ApiDoc::openapi(),
        testing::ApiDoc::openapi(),
        auth::ApiDoc::openapi(),
        methods::ApiDoc::openapi(),
        publications::ApiDoc::openapi(),
    ];

    for module_spec in modules {
        spec.paths.paths.extend(module_spec.paths.paths);

        if let Some(module_components) = module_spec.components {
            if let Some(spec_components) = spec.components.as_mut() {
                spec_components.schemas.extend(module_components.schemas);
            }
        }
    }

    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let spec = openapi();
        for path in [
            "/api/auth/signup",
            "/api/auth/login",
            "/api/auth/me",
            "/api/auth/logout",
            "/api/methods/{name}",
            "/api/publications/{channel}",
            "/api/test/ping",
            "/api/test/unauthed-ping",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
