//! Remote mutation procedures, named `<entity>.<action>`.
//!
//! Clients never write to a collection directly: every mutation goes through
//! [`dispatch`], which checks the caller, decodes the arguments and applies
//! the change. Results and failures go back to the caller only; everyone
//! else sees the effect through their publications.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::collection::{Catalog, CollectionError};
use crate::model::Favorite;
use crate::publication::Identity;
use crate::schema::ValidationError;

pub const RECIPES_INSERT: &str = "recipes.insert";
pub const RECIPES_UPDATE: &str = "recipes.update";
pub const RECIPES_REMOVE: &str = "recipes.remove";
pub const FAVORITES_ADD: &str = "favorites.add";
pub const FAVORITES_REMOVE: &str = "favorites.remove";
pub const FAVORITES_TOGGLE: &str = "favorites.toggle";

pub const METHOD_NAMES: [&str; 6] = [
    RECIPES_INSERT,
    RECIPES_UPDATE,
    RECIPES_REMOVE,
    FAVORITES_ADD,
    FAVORITES_REMOVE,
    FAVORITES_TOGGLE,
];

#[derive(Error, Debug)]
pub enum MethodError {
    #[error("You must be logged in")]
    NotLoggedIn,

    #[error("Not authorized")]
    NotAuthorized,

    #[error(transparent)]
    Validation(ValidationError),

    #[error("Document {0} not found")]
    NotFound(Uuid),

    #[error("Duplicate document: {0}")]
    Duplicate(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Bad arguments: {0}")]
    BadArguments(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MethodError {
    /// Stable machine-readable code, sent over the wire with the message.
    pub fn code(&self) -> &'static str {
        match self {
            MethodError::NotLoggedIn => "not-logged-in",
            MethodError::NotAuthorized => "not-authorized",
            MethodError::Validation(_) => "validation-error",
            MethodError::NotFound(_) => "not-found",
            MethodError::Duplicate(_) => "duplicate",
            MethodError::UnknownMethod(_) => "unknown-method",
            MethodError::BadArguments(_) => "bad-arguments",
            MethodError::Internal(_) => "internal-error",
        }
    }
}

impl From<CollectionError> for MethodError {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::Validation(err) => MethodError::Validation(err),
            CollectionError::NotFound(id) => MethodError::NotFound(id),
            CollectionError::Duplicate(key) => MethodError::Duplicate(key),
            other => {
                error!(error = %other, "collection failure during method call");
                MethodError::Internal(other.to_string())
            }
        }
    }
}

/// Recipe id, either bare (`"<uuid>"`) or wrapped (`{"id": "<uuid>"}`).
#[derive(Deserialize)]
#[serde(untagged)]
enum IdArg {
    Bare(Uuid),
    Wrapped { id: Uuid },
}

impl IdArg {
    fn id(&self) -> Uuid {
        match self {
            IdArg::Bare(id) | IdArg::Wrapped { id } => *id,
        }
    }
}

#[derive(Deserialize)]
struct UpdateArgs {
    id: Uuid,
    patch: Map<String, Value>,
}

#[derive(Deserialize)]
struct FavoriteArgs {
    recipe_id: Uuid,
}

fn args<T: DeserializeOwned>(value: Value) -> Result<T, MethodError> {
    serde_json::from_value(value).map_err(|e| MethodError::BadArguments(e.to_string()))
}

fn logged_in(identity: &Identity) -> Result<Uuid, MethodError> {
    identity.user_id.ok_or(MethodError::NotLoggedIn)
}

fn admin(identity: &Identity) -> Result<Uuid, MethodError> {
    let user_id = logged_in(identity)?;
    if !identity.is_admin() {
        return Err(MethodError::NotAuthorized);
    }
    Ok(user_id)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, MethodError> {
    serde_json::to_value(value).map_err(|e| MethodError::Internal(e.to_string()))
}

/// Run the method `name` on behalf of `identity`.
pub fn dispatch(
    catalog: &Catalog,
    identity: &Identity,
    name: &str,
    arguments: Value,
) -> Result<Value, MethodError> {
    let result = match name {
        RECIPES_INSERT => insert_recipe(catalog, identity, arguments),
        RECIPES_UPDATE => update_recipe(catalog, identity, arguments),
        RECIPES_REMOVE => remove_recipe(catalog, identity, arguments),
        FAVORITES_ADD => add_favorite(catalog, identity, arguments),
        FAVORITES_REMOVE => remove_favorite(catalog, identity, arguments),
        FAVORITES_TOGGLE => toggle_favorite(catalog, identity, arguments),
        _ => Err(MethodError::UnknownMethod(name.to_string())),
    };
    match &result {
        Ok(_) => info!(method = name, user_id = ?identity.user_id, "method succeeded"),
        Err(err) => info!(
            method = name,
            user_id = ?identity.user_id,
            code = err.code(),
            "method failed"
        ),
    }
    result
}

fn insert_recipe(catalog: &Catalog, identity: &Identity, arguments: Value) -> Result<Value, MethodError> {
    let user_id = logged_in(identity)?;
    let stored = catalog.recipes.insert_value(arguments, Some(user_id))?;
    encode(&stored)
}

fn update_recipe(catalog: &Catalog, identity: &Identity, arguments: Value) -> Result<Value, MethodError> {
    admin(identity)?;
    let UpdateArgs { id, patch } = args(arguments)?;
    let stored = catalog.recipes.validate_and_update(id, patch)?;
    encode(&stored)
}

fn remove_recipe(catalog: &Catalog, identity: &Identity, arguments: Value) -> Result<Value, MethodError> {
    admin(identity)?;
    let id = args::<IdArg>(arguments)?.id();
    let removed = catalog.recipes.validate_and_remove(id)?.is_some();
    if removed {
        // Favorites pointing at a deleted recipe would dangle.
        for favorite in catalog.favorites.find(|f| f.recipe_id == id)? {
            catalog.favorites.validate_and_remove(favorite.id)?;
        }
    }
    Ok(json!({ "removed": removed }))
}

fn find_favorite(catalog: &Catalog, user_id: Uuid, recipe_id: Uuid) -> Result<Option<Uuid>, MethodError> {
    Ok(catalog
        .favorites
        .find(|f| f.user_id == user_id && f.recipe_id == recipe_id)?
        .first()
        .map(|f| f.id))
}

fn insert_favorite(catalog: &Catalog, user_id: Uuid, recipe_id: Uuid) -> Result<Value, MethodError> {
    if catalog.recipes.find_one(recipe_id)?.is_none() {
        return Err(MethodError::NotFound(recipe_id));
    }
    let stored = catalog
        .favorites
        .validate_and_insert(Favorite { user_id, recipe_id }, Some(user_id))?;
    encode(&stored)
}

fn add_favorite(catalog: &Catalog, identity: &Identity, arguments: Value) -> Result<Value, MethodError> {
    let user_id = logged_in(identity)?;
    let FavoriteArgs { recipe_id } = args(arguments)?;
    insert_favorite(catalog, user_id, recipe_id)
}

fn remove_favorite(catalog: &Catalog, identity: &Identity, arguments: Value) -> Result<Value, MethodError> {
    let user_id = logged_in(identity)?;
    let FavoriteArgs { recipe_id } = args(arguments)?;
    let removed = match find_favorite(catalog, user_id, recipe_id)? {
        Some(id) => catalog.favorites.validate_and_remove(id)?.is_some(),
        None => false,
    };
    Ok(json!({ "removed": removed }))
}

fn toggle_favorite(catalog: &Catalog, identity: &Identity, arguments: Value) -> Result<Value, MethodError> {
    let user_id = logged_in(identity)?;
    let FavoriteArgs { recipe_id } = args(arguments)?;
    match find_favorite(catalog, user_id, recipe_id)? {
        Some(id) => {
            catalog.favorites.validate_and_remove(id)?;
            Ok(json!({ "favorite": false }))
        }
        None => {
            insert_favorite(catalog, user_id, recipe_id)?;
            Ok(json!({ "favorite": true }))
        }
    }
}

/// Something that can run remote methods: in process, or over the network.
#[async_trait]
pub trait MethodCaller: Send + Sync {
    async fn call(&self, name: &str, arguments: Value) -> Result<Value, MethodError>;
}

/// Runs methods against an in-process catalog as a fixed identity.
#[derive(Clone)]
pub struct LocalMethods {
    catalog: Arc<Catalog>,
    identity: Identity,
}

impl LocalMethods {
    pub fn new(catalog: Arc<Catalog>, identity: Identity) -> Self {
        Self { catalog, identity }
    }
}

#[async_trait]
impl MethodCaller for LocalMethods {
    async fn call(&self, name: &str, arguments: Value) -> Result<Value, MethodError> {
        dispatch(&self.catalog, &self.identity, name, arguments)
    }
}
