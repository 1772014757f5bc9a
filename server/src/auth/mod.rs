mod crypto;
mod db;
mod extractor;
mod middleware;

pub use crypto::{hash_password, verify_password};
pub use db::{create_session, delete_session, grant_role};
pub use extractor::{AuthUser, MaybeAuthUser};
pub use middleware::require_auth;
