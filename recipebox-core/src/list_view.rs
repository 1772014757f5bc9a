//! View state for the recipe list pages.
//!
//! Views hold only transient state (search term, which recipe is being
//! edited). Mutations go out through a [`MethodCaller`] and are not applied
//! locally; the list changes when the subscription delivers the result.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::methods::{MethodCaller, MethodError, FAVORITES_TOGGLE, RECIPES_REMOVE, RECIPES_UPDATE};
use crate::model::{Favorite, Recipe, Stored};
use crate::reactive::ReactiveQuery;
use crate::search::apply_filter;
use crate::subscription::Subscription;

pub type MethodHandle = JoinHandle<Result<Value, MethodError>>;

#[derive(Debug, PartialEq)]
pub enum ListState<'a> {
    /// The initial batch has not arrived yet.
    Loading,
    Ready(&'a [Stored<Recipe>]),
}

impl ListState<'_> {
    pub fn is_loading(&self) -> bool {
        matches!(self, ListState::Loading)
    }

    pub fn recipes(&self) -> &[Stored<Recipe>] {
        match self {
            ListState::Loading => &[],
            ListState::Ready(recipes) => recipes,
        }
    }
}

/// Fire a method call in the background. Failures are logged; the handle
/// lets a caller inspect the outcome if it wants to.
fn spawn_call(methods: &Arc<dyn MethodCaller>, name: &'static str, arguments: Value) -> MethodHandle {
    let methods = Arc::clone(methods);
    tokio::spawn(async move {
        let result = methods.call(name, arguments).await;
        if let Err(err) = &result {
            warn!(method = name, code = err.code(), error = %err, "method call failed");
        }
        result
    })
}

/// Searchable list of recipes with remove and edit actions.
pub struct RecipeListView {
    recipes: Subscription<Recipe>,
    methods: Arc<dyn MethodCaller>,
    search_term: String,
    editing: Option<Uuid>,
    query: ReactiveQuery<(String, bool), Vec<Stored<Recipe>>>,
}

impl RecipeListView {
    pub fn new(recipes: Subscription<Recipe>, methods: Arc<dyn MethodCaller>) -> Self {
        let mirror = Arc::clone(recipes.mirror());
        let deps = (String::new(), recipes.ready());
        let query = ReactiveQuery::new(vec![mirror.watch()], deps, move |deps: &(String, bool)| {
            apply_filter(&deps.0, &mirror.fetch())
        });
        Self {
            recipes,
            methods,
            search_term: String::new(),
            editing: None,
            query,
        }
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    pub fn reset_search(&mut self) {
        self.search_term.clear();
    }

    /// The filtered list, recomputed if the term, readiness or the
    /// underlying recipes changed since the last render.
    pub fn render(&mut self) -> ListState<'_> {
        let ready = self.recipes.ready();
        let recipes = self.query.get(&(self.search_term.clone(), ready));
        if ready {
            ListState::Ready(recipes)
        } else {
            ListState::Loading
        }
    }

    /// How many times the list has been filtered.
    pub fn filter_runs(&self) -> usize {
        self.query.runs()
    }

    /// Resolves when the underlying recipes change.
    pub async fn changed(&self) {
        self.query.changed().await
    }

    pub fn remove(&self, id: Uuid) -> MethodHandle {
        spawn_call(&self.methods, RECIPES_REMOVE, json!(id))
    }

    /// Open the edit modal for a recipe. Returns the recipe, or `None` if it
    /// is not in the list.
    pub fn open_edit(&mut self, id: Uuid) -> Option<Stored<Recipe>> {
        let recipe = self.recipes.mirror().find_one(id)?;
        self.editing = Some(id);
        Some(recipe)
    }

    pub fn editing(&self) -> Option<Uuid> {
        self.editing
    }

    pub fn close_edit(&mut self) {
        self.editing = None;
    }

    /// Send `patch` for the recipe being edited and close the modal.
    /// Does nothing if no recipe is being edited.
    pub fn submit_edit(&mut self, patch: Map<String, Value>) -> Option<MethodHandle> {
        let id = self.editing.take()?;
        Some(spawn_call(
            &self.methods,
            RECIPES_UPDATE,
            json!({ "id": id, "patch": patch }),
        ))
    }
}

/// The signed-in user's favorite recipes.
pub struct FavoritesView {
    recipes: Subscription<Recipe>,
    favorites: Subscription<Favorite>,
    methods: Arc<dyn MethodCaller>,
    query: ReactiveQuery<(), Vec<Stored<Recipe>>>,
}

impl FavoritesView {
    pub fn new(
        recipes: Subscription<Recipe>,
        favorites: Subscription<Favorite>,
        methods: Arc<dyn MethodCaller>,
    ) -> Self {
        let recipe_mirror = Arc::clone(recipes.mirror());
        let favorite_mirror = Arc::clone(favorites.mirror());
        let sources = vec![recipe_mirror.watch(), favorite_mirror.watch()];
        let query = ReactiveQuery::new(sources, (), move |_: &()| {
            favorite_mirror
                .fetch()
                .iter()
                .filter_map(|favorite| recipe_mirror.find_one(favorite.recipe_id))
                .collect()
        });
        Self {
            recipes,
            favorites,
            methods,
            query,
        }
    }

    /// Favorited recipes in the order they were favorited.
    pub fn render(&mut self) -> ListState<'_> {
        let ready = self.recipes.ready() && self.favorites.ready();
        let recipes = self.query.get(&());
        if ready {
            ListState::Ready(recipes)
        } else {
            ListState::Loading
        }
    }

    pub fn is_favorite(&self, recipe_id: Uuid) -> bool {
        !self
            .favorites
            .mirror()
            .find(|f| f.recipe_id == recipe_id)
            .is_empty()
    }

    pub fn toggle(&self, recipe_id: Uuid) -> MethodHandle {
        spawn_call(&self.methods, FAVORITES_TOGGLE, json!({ "recipe_id": recipe_id }))
    }

    pub async fn changed(&self) {
        self.query.changed().await
    }
}
