//! Document types stored in the catalog.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::ops::Deref;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::schema::{Field, FieldKind, Schema};

/// Maximum length of a recipe name, in characters.
pub const MAX_RECIPE_NAME_LEN: usize = 100;

/// A document type that lives in a named, schema-validated collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection name; publication channel names are derived from it.
    const COLLECTION: &'static str;

    fn schema() -> &'static Schema;

    /// Key that must be unique across the collection, if the type has one.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

/// A persisted document: store-assigned metadata plus the document fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<D> {
    pub id: Uuid,
    /// User who created the document, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: D,
}

impl<D> Deref for Stored<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.fields
    }
}

impl<D> AsRef<D> for Stored<D> {
    fn as_ref(&self) -> &D {
        &self.fields
    }
}

/// Lets code that works over stored recipes accept bare ones too.
impl AsRef<Recipe> for Recipe {
    fn as_ref(&self) -> &Recipe {
        self
    }
}

/// Dietary labels a recipe may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dietary {
    #[serde(rename = "Dairy-Free")]
    DairyFree,
    Vegan,
    #[serde(rename = "Gluten-Free")]
    GlutenFree,
    Vegetarian,
}

impl Dietary {
    /// Wire names, in declaration order.
    pub const NAMES: [&'static str; 4] = ["Dairy-Free", "Vegan", "Gluten-Free", "Vegetarian"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dietary::DairyFree => "Dairy-Free",
            Dietary::Vegan => "Vegan",
            Dietary::GlutenFree => "Gluten-Free",
            Dietary::Vegetarian => "Vegetarian",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    /// Image URL.
    pub image: String,
    pub time: String,
    pub cost: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub appliances: Vec<String>,
    pub ingredients: Vec<String>,
    /// Preparation instructions.
    pub recipe: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dietary: Vec<Dietary>,
}

static RECIPE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        Recipe::COLLECTION,
        vec![
            Field::required(
                "name",
                "Recipe Name",
                FieldKind::bounded_string(MAX_RECIPE_NAME_LEN),
            ),
            Field::required("image", "Image URL", FieldKind::string()),
            Field::required("time", "Time", FieldKind::string()),
            Field::required("cost", "Cost", FieldKind::string()),
            Field::optional("filter", "Filter", FieldKind::array_of(FieldKind::string())),
            Field::optional(
                "appliances",
                "Appliances",
                FieldKind::array_of(FieldKind::string()),
            ),
            Field::required(
                "ingredients",
                "Ingredients",
                FieldKind::non_empty_array_of(FieldKind::string()),
            ),
            Field::required("recipe", "Recipe", FieldKind::string()),
            Field::optional(
                "dietary",
                "Dietary",
                FieldKind::array_of(FieldKind::OneOf(&Dietary::NAMES)),
            ),
        ],
    )
});

impl Document for Recipe {
    const COLLECTION: &'static str = "RecipesCollection";

    fn schema() -> &'static Schema {
        &RECIPE_SCHEMA
    }
}

/// A user's mark on a recipe. At most one per (user, recipe) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: Uuid,
    pub recipe_id: Uuid,
}

static FAVORITE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        Favorite::COLLECTION,
        vec![
            Field::required("user_id", "User", FieldKind::Id),
            Field::required("recipe_id", "Recipe", FieldKind::Id),
        ],
    )
});

impl Document for Favorite {
    const COLLECTION: &'static str = "FavoritesCollection";

    fn schema() -> &'static Schema {
        &FAVORITE_SCHEMA
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("{}:{}", self.user_id, self.recipe_id))
    }
}
