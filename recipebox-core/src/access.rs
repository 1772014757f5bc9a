//! Route guard: who may see which page.
//!
//! Access is a pure function of the session and the route's requirement.
//! Nothing is cached; every navigation evaluates again.

use uuid::Uuid;

use crate::publication::{Identity, ADMIN_ROLE};

pub const SIGNIN_PATH: &str = "/signin";
pub const NOT_AUTHORIZED_PATH: &str = "/notauthorized";

/// What a route demands of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Public,
    LoggedIn,
    Admin,
}

/// Role membership as known to the client. Roles arrive on their own
/// subscription, so they may lag the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleState {
    Pending,
    Ready(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<Uuid>,
    pub roles: RoleState,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            roles: RoleState::Ready(Vec::new()),
        }
    }

    /// Logged in, roles not yet loaded.
    pub fn pending(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            roles: RoleState::Pending,
        }
    }

    pub fn with_roles(user_id: Uuid, roles: Vec<String>) -> Self {
        Self {
            user_id: Some(user_id),
            roles: RoleState::Ready(roles),
        }
    }

    /// The identity this session presents to publications and methods.
    /// Pending roles count as none.
    pub fn identity(&self) -> Identity {
        let roles = match &self.roles {
            RoleState::Ready(roles) => roles.clone(),
            RoleState::Pending => Vec::new(),
        };
        Identity {
            user_id: self.user_id,
            roles,
        }
    }
}

impl From<&Identity> for Session {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id,
            roles: RoleState::Ready(identity.roles.clone()),
        }
    }
}

/// Where a session stands with respect to one protected route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Anonymous,
    AuthenticatedPendingRole,
    AuthenticatedAuthorized,
    AuthenticatedUnauthorized,
}

impl GuardState {
    pub fn evaluate(session: &Session, requirement: Requirement) -> Self {
        if session.user_id.is_none() {
            return GuardState::Anonymous;
        }
        let role = match requirement {
            Requirement::Public | Requirement::LoggedIn => {
                return GuardState::AuthenticatedAuthorized
            }
            Requirement::Admin => ADMIN_ROLE,
        };
        match &session.roles {
            RoleState::Pending => GuardState::AuthenticatedPendingRole,
            RoleState::Ready(roles) if roles.iter().any(|r| r == role) => {
                GuardState::AuthenticatedAuthorized
            }
            RoleState::Ready(_) => GuardState::AuthenticatedUnauthorized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    /// Role data not loaded yet. Show a placeholder and evaluate again later.
    Pending,
    /// Send the user elsewhere.
    Deny(&'static str),
}

pub fn can_access(session: &Session, requirement: Requirement) -> Access {
    if requirement == Requirement::Public {
        return Access::Allow;
    }
    match GuardState::evaluate(session, requirement) {
        GuardState::Anonymous => Access::Deny(SIGNIN_PATH),
        GuardState::AuthenticatedPendingRole => Access::Pending,
        GuardState::AuthenticatedAuthorized => Access::Allow,
        GuardState::AuthenticatedUnauthorized => Access::Deny(NOT_AUTHORIZED_PATH),
    }
}

/// Client-side pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    Home,
    SignIn,
    SignUp,
    SignOut,
    About,
    AddRecipe,
    ListRecipes,
    Favorites,
    Add,
    Search,
    ExampleRecipe(Option<Uuid>),
    Edit(Uuid),
    Admin,
    NotAuthorized,
    NotFound(String),
}

impl Route {
    /// Resolve a path. Query strings and a trailing slash are ignored;
    /// anything unrecognized, including a malformed id, is `NotFound`.
    pub fn parse(path: &str) -> Self {
        let clean = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = clean.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').skip(1).collect();

        match segments.as_slice() {
            [] => Route::Landing,
            ["home"] => Route::Home,
            ["signin"] => Route::SignIn,
            ["signup"] => Route::SignUp,
            ["signout"] => Route::SignOut,
            ["about"] => Route::About,
            ["addrecipe"] => Route::AddRecipe,
            ["list"] => Route::ListRecipes,
            ["favorites"] => Route::Favorites,
            ["add"] => Route::Add,
            ["search"] => Route::Search,
            ["examplerecipe"] => Route::ExampleRecipe(None),
            ["examplerecipe", id] => match Uuid::parse_str(id) {
                Ok(id) => Route::ExampleRecipe(Some(id)),
                Err(_) => Route::NotFound(path.to_string()),
            },
            ["edit", id] => match Uuid::parse_str(id) {
                Ok(id) => Route::Edit(id),
                Err(_) => Route::NotFound(path.to_string()),
            },
            ["admin"] => Route::Admin,
            ["notauthorized"] => Route::NotAuthorized,
            _ => Route::NotFound(path.to_string()),
        }
    }

    pub fn requirement(&self) -> Requirement {
        match self {
            Route::Landing
            | Route::Home
            | Route::SignIn
            | Route::SignUp
            | Route::SignOut
            | Route::About
            | Route::NotAuthorized
            | Route::NotFound(_) => Requirement::Public,
            Route::AddRecipe
            | Route::ListRecipes
            | Route::Favorites
            | Route::Add
            | Route::Search
            | Route::ExampleRecipe(_)
            | Route::Edit(_) => Requirement::LoggedIn,
            Route::Admin => Requirement::Admin,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Landing => "/".to_string(),
            Route::Home => "/home".to_string(),
            Route::SignIn => SIGNIN_PATH.to_string(),
            Route::SignUp => "/signup".to_string(),
            Route::SignOut => "/signout".to_string(),
            Route::About => "/about".to_string(),
            Route::AddRecipe => "/addrecipe".to_string(),
            Route::ListRecipes => "/list".to_string(),
            Route::Favorites => "/favorites".to_string(),
            Route::Add => "/add".to_string(),
            Route::Search => "/search".to_string(),
            Route::ExampleRecipe(None) => "/examplerecipe".to_string(),
            Route::ExampleRecipe(Some(id)) => format!("/examplerecipe/{id}"),
            Route::Edit(id) => format!("/edit/{id}"),
            Route::Admin => "/admin".to_string(),
            Route::NotAuthorized => NOT_AUTHORIZED_PATH.to_string(),
            Route::NotFound(path) => path.clone(),
        }
    }
}

/// What the router should do for a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect(&'static str),
    Loading,
    NotFound(String),
}

pub fn navigate(path: &str, session: &Session) -> Navigation {
    match Route::parse(path) {
        Route::NotFound(path) => Navigation::NotFound(path),
        route => match can_access(session, route.requirement()) {
            Access::Allow => Navigation::Render(route),
            Access::Pending => Navigation::Loading,
            Access::Deny(target) => Navigation::Redirect(target),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTECTED: [&str; 8] = [
        "/addrecipe",
        "/list",
        "/favorites",
        "/add",
        "/search",
        "/examplerecipe",
        "/edit/6f1c2d8e-54a1-4a0b-9a53-2f8b1e3c7d10",
        "/admin",
    ];

    fn admin() -> Session {
        Session::with_roles(Uuid::new_v4(), vec![ADMIN_ROLE.to_string()])
    }

    #[test]
    fn test_anonymous_redirected_to_signin() {
        let session = Session::anonymous();
        for path in PROTECTED {
            assert_eq!(
                navigate(path, &session),
                Navigation::Redirect(SIGNIN_PATH),
                "{path}"
            );
        }
    }

    #[test]
    fn test_public_pages_render_for_anyone() {
        let session = Session::anonymous();
        for path in ["/", "/home", "/signin", "/signup", "/signout", "/about", "/notauthorized"] {
            assert!(matches!(navigate(path, &session), Navigation::Render(_)), "{path}");
        }
    }

    #[test]
    fn test_non_admin_waits_for_roles_before_redirect() {
        let user_id = Uuid::new_v4();
        let pending = Session::pending(user_id);
        assert_eq!(navigate("/admin", &pending), Navigation::Loading);
        assert_eq!(
            GuardState::evaluate(&pending, Requirement::Admin),
            GuardState::AuthenticatedPendingRole
        );

        let ready = Session::with_roles(user_id, vec![]);
        assert_eq!(
            navigate("/admin", &ready),
            Navigation::Redirect(NOT_AUTHORIZED_PATH)
        );
    }

    #[test]
    fn test_logged_in_pages_do_not_wait_for_roles() {
        let pending = Session::pending(Uuid::new_v4());
        assert_eq!(
            navigate("/list", &pending),
            Navigation::Render(Route::ListRecipes)
        );
    }

    #[test]
    fn test_admin_allowed_everywhere() {
        let session = admin();
        for path in PROTECTED {
            assert!(matches!(navigate(path, &session), Navigation::Render(_)), "{path}");
        }
        assert_eq!(can_access(&session, Requirement::Admin), Access::Allow);
    }

    #[test]
    fn test_roles_without_a_user_grant_nothing() {
        let session = Session {
            user_id: None,
            roles: RoleState::Ready(vec![ADMIN_ROLE.to_string()]),
        };
        assert_eq!(
            can_access(&session, Requirement::Admin),
            Access::Deny(SIGNIN_PATH)
        );
    }

    #[test]
    fn test_route_parse_and_path_agree() {
        let id = Uuid::new_v4();
        for route in [
            Route::Landing,
            Route::Home,
            Route::AddRecipe,
            Route::ExampleRecipe(None),
            Route::ExampleRecipe(Some(id)),
            Route::Edit(id),
            Route::Admin,
            Route::NotAuthorized,
        ] {
            assert_eq!(Route::parse(&route.path()), route);
        }
        assert_eq!(Route::parse("/list/"), Route::ListRecipes);
        assert_eq!(Route::parse("/search?q=tomato"), Route::Search);
    }

    #[test]
    fn test_unknown_paths_are_not_found() {
        let session = admin();
        for path in ["/nope", "/edit/not-an-id", "/edit", "/list/extra"] {
            assert_eq!(
                navigate(path, &session),
                Navigation::NotFound(path.to_string())
            );
        }
    }

    #[test]
    fn test_session_identity() {
        let user_id = Uuid::new_v4();
        assert!(!Session::pending(user_id).identity().is_admin());
        assert!(Session::with_roles(user_id, vec![ADMIN_ROLE.to_string()])
            .identity()
            .is_admin());
        assert!(!Session::anonymous().identity().is_logged_in());
    }
}
