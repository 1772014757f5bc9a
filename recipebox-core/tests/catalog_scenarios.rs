//! End-to-end scenarios for the catalog: collection, publication,
//! subscription, search and the route guard working together.
//!
//! Rejected documents live as JSON fixtures in `fixtures/invalid_recipes/`:
//! ```json
//! { "description": "...", "document": { ... }, "fields": ["name"] }
//! ```

use glob::glob;
use recipebox_core::methods::RECIPES_REMOVE;
use recipebox_core::{
    apply_filter, dispatch, navigate, Catalog, Channel, CollectionError, Identity, Navigation,
    Recipe, Session, Stored, Subscription, ADMIN_ROLE,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct InvalidCase {
    description: String,
    document: Value,
    fields: Vec<String>,
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("invalid_recipes")
}

fn recipe(name: &str, ingredients: &[&str]) -> Value {
    json!({
        "name": name,
        "image": format!("https://example.com/{}.jpg", name.to_lowercase()),
        "time": "15 min",
        "cost": "$5",
        "ingredients": ingredients,
        "recipe": "Combine and serve."
    })
}

async fn subscribe_names(catalog: &Catalog, identity: &Identity) -> Vec<String> {
    let sub = Subscription::subscribe_local(&catalog.recipes, Channel::User, identity).unwrap();
    assert!(sub.wait_ready().await);
    sub.mirror().fetch().iter().map(|r| r.name.clone()).collect()
}

fn names(recipes: &[Stored<Recipe>]) -> Vec<&str> {
    recipes.iter().map(|r| r.name.as_str()).collect()
}

#[test]
fn invalid_documents_are_never_retrievable() {
    let catalog = Catalog::in_memory();
    let pattern = fixtures_dir().join("*.json");
    let mut seen = 0;

    for entry in glob(pattern.to_str().unwrap()).unwrap() {
        let path = entry.unwrap();
        let case: InvalidCase = serde_json::from_str(&fs::read_to_string(&path).unwrap())
            .unwrap_or_else(|e| panic!("{}: {e}", path.display()));

        match catalog.recipes.insert_value(case.document, None) {
            Err(CollectionError::Validation(err)) => {
                let mut got: Vec<&str> = err.fields();
                let mut want: Vec<&str> = case.fields.iter().map(String::as_str).collect();
                got.sort_unstable();
                want.sort_unstable();
                assert_eq!(got, want, "{}", case.description);
            }
            other => panic!("{}: expected validation error, got {other:?}", case.description),
        }
        seen += 1;
    }

    assert!(seen > 0, "no fixtures found");
    assert!(catalog.recipes.find_all().unwrap().is_empty());
}

#[test]
fn accepted_documents_satisfy_the_schema() {
    let catalog = Catalog::in_memory();
    let mut document = recipe("Salad", &["lettuce"]);
    document["dietary"] = json!(["Vegan", "Gluten-Free"]);
    document["appliances"] = json!([]);
    catalog.recipes.insert_value(document, None).unwrap();

    for stored in catalog.recipes.find_all().unwrap() {
        assert!(stored.name.chars().count() <= 100);
        assert!(!stored.ingredients.is_empty());
        let value = serde_json::to_value(&stored.fields).unwrap();
        assert!(<Recipe as recipebox_core::Document>::schema().validate(&value).is_ok());
    }
}

#[test]
fn name_length_limit_is_inclusive() {
    let catalog = Catalog::in_memory();
    let longest = "a".repeat(100);
    let stored = catalog.recipes.insert_value(recipe(&longest, &["salt"]), None).unwrap();
    assert_eq!(stored.name, longest);

    match catalog.recipes.insert_value(recipe(&"a".repeat(101), &["salt"]), None) {
        Err(CollectionError::Validation(err)) => assert_eq!(err.fields(), vec!["name"]),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(catalog.recipes.find_all().unwrap().len(), 1);
}

#[tokio::test]
async fn pasta_and_salad() {
    let catalog = Catalog::in_memory();
    let admin = Identity::user(Uuid::new_v4()).with_role(ADMIN_ROLE);
    let pasta = catalog
        .recipes
        .insert_value(recipe("Pasta", &["pasta", "tomato"]), None)
        .unwrap();
    catalog
        .recipes
        .insert_value(recipe("Salad", &["lettuce", "tomato"]), None)
        .unwrap();

    let sub = Subscription::subscribe_local(&catalog.recipes, Channel::User, &admin).unwrap();
    assert!(sub.wait_ready().await);
    let all = sub.mirror().fetch();

    assert_eq!(names(&apply_filter("tomato", &all)), vec!["Pasta", "Salad"]);
    assert_eq!(names(&apply_filter("pasta", &all)), vec!["Pasta"]);
    assert_eq!(names(&apply_filter("", &all)), vec!["Pasta", "Salad"]);

    let removed = dispatch(&catalog, &admin, RECIPES_REMOVE, json!(pasta.id)).unwrap();
    assert_eq!(removed, json!({"removed": true}));
    drop(sub);

    assert_eq!(subscribe_names(&catalog, &admin).await, vec!["Salad"]);
}

#[tokio::test]
async fn filter_properties_hold_over_a_live_mirror() {
    let catalog = Catalog::in_memory();
    for (name, ingredients) in [
        ("Chicken Soup", &["chicken", "water"][..]),
        ("Fried Rice", &["rice", "egg"][..]),
        ("Chicken Salad", &["CHICKEN", "lettuce"][..]),
    ] {
        catalog.recipes.insert_value(recipe(name, ingredients), None).unwrap();
    }
    let user = Identity::user(Uuid::new_v4());
    let sub = Subscription::subscribe_local(&catalog.recipes, Channel::User, &user).unwrap();
    assert!(sub.wait_ready().await);
    let all = sub.mirror().fetch();

    for term in ["chicken", "RICE", "  ", "zzz", "salad"] {
        let once = apply_filter(term, &all);
        assert_eq!(apply_filter(term, &once), once, "idempotent for {term:?}");
        assert_eq!(
            apply_filter(&term.to_uppercase(), &all),
            apply_filter(&term.to_lowercase(), &all),
            "case-insensitive for {term:?}"
        );
    }
    assert_eq!(apply_filter(" \t", &all), all);
}

#[tokio::test]
async fn anonymous_sees_nothing_and_non_admin_admin_channel_is_empty() {
    let catalog = Catalog::in_memory();
    catalog.recipes.insert_value(recipe("Pasta", &["pasta"]), None).unwrap();

    assert!(subscribe_names(&catalog, &Identity::anonymous()).await.is_empty());

    let user = Identity::user(Uuid::new_v4());
    let admin_sub = Subscription::subscribe_local(&catalog.recipes, Channel::Admin, &user).unwrap();
    assert!(admin_sub.wait_ready().await);
    assert!(admin_sub.mirror().is_empty());
}

#[test]
fn guard_redirects() {
    let anonymous = Session::anonymous();
    for path in ["/list", "/favorites", "/admin", "/edit/6f1c2d8e-54a1-4a0b-9a53-2f8b1e3c7d10"] {
        assert_eq!(navigate(path, &anonymous), Navigation::Redirect("/signin"));
    }

    let user_id = Uuid::new_v4();
    assert_eq!(navigate("/admin", &Session::pending(user_id)), Navigation::Loading);
    assert_eq!(
        navigate("/admin", &Session::with_roles(user_id, vec!["cook".to_string()])),
        Navigation::Redirect("/notauthorized")
    );
    assert!(matches!(
        navigate("/admin", &Session::with_roles(user_id, vec![ADMIN_ROLE.to_string()])),
        Navigation::Render(_)
    ));
}
