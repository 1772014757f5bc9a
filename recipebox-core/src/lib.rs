pub mod access;
pub mod collection;
pub mod list_view;
pub mod methods;
pub mod mirror;
pub mod model;
pub mod publication;
pub mod reactive;
pub mod schema;
pub mod search;
pub mod store;
pub mod subscription;

pub use access::{can_access, navigate, Access, GuardState, Navigation, Requirement, RoleState, Route, Session};
pub use collection::{Catalog, Change, Collection, CollectionError, DEFAULT_CHANGE_BUFFER};
pub use list_view::{FavoritesView, ListState, RecipeListView};
pub use methods::{dispatch, LocalMethods, MethodCaller, MethodError};
pub use mirror::LocalMirror;
pub use model::{Dietary, Document, Favorite, Recipe, Stored};
pub use publication::{publish, Channel, Feed, FeedEvent, Identity, Publish, ADMIN_ROLE};
pub use reactive::ReactiveQuery;
pub use schema::{Field, FieldKind, Schema, ValidationError, Violation, ViolationKind};
pub use search::{apply_filter, SearchField};
pub use store::{DocumentStore, MemoryStore, Record, StoreError};
pub use subscription::Subscription;
