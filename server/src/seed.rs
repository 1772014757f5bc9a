//! First-run seeding from the settings file.
//!
//! ```json
//! {
//!   "defaultAccounts": [{"username": "admin", "password": "changeme", "role": "admin"}],
//!   "defaultRecipes": [{"name": "Pasta", "ingredients": ["pasta"], ...}]
//! }
//! ```

use anyhow::Context;
use diesel::prelude::*;
use recipebox_core::Catalog;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::auth::{grant_role, hash_password};
use crate::db::DbPool;
use crate::models::{NewUser, User};
use crate::schema::users;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DefaultAccount {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub default_accounts: Vec<DefaultAccount>,
    #[serde(default)]
    pub default_recipes: Vec<Value>,
}

impl Settings {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("Invalid settings JSON")
    }
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    Settings::parse(&text)
}

fn has_users(conn: &mut PgConnection) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(
        users::table.filter(users::deleted_at.is_null()),
    ))
    .get_result(conn)
}

/// Create default accounts and recipes, but only on an empty database.
pub fn seed_defaults(pool: &DbPool, catalog: &Catalog, settings: &Settings) -> anyhow::Result<()> {
    let mut conn = pool.get().context("Failed to get database connection")?;

    if has_users(&mut conn)? {
        tracing::debug!("Users already exist, skipping seed");
        return Ok(());
    }

    for account in &settings.default_accounts {
        let password_hash = hash_password(&account.password)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;

        let user: User = diesel::insert_into(users::table)
            .values(&NewUser {
                username: &account.username,
                password_hash: &password_hash,
            })
            .returning(User::as_returning())
            .get_result(&mut conn)
            .with_context(|| format!("Failed to create account {}", account.username))?;

        if let Some(role) = &account.role {
            grant_role(&mut conn, user.id, role)?;
        }
        tracing::info!(username = %account.username, role = ?account.role, "created default account");
    }

    let mut inserted = 0;
    for recipe in &settings.default_recipes {
        match catalog.recipes.insert_value(recipe.clone(), None) {
            Ok(_) => inserted += 1,
            Err(e) => tracing::warn!("Skipping invalid default recipe: {}", e),
        }
    }
    tracing::info!(
        recipes = inserted,
        skipped = settings.default_recipes.len() - inserted,
        "seeded default recipes"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        let settings = Settings::parse(
            r#"{
                "defaultAccounts": [
                    {"username": "admin@foo.com", "password": "changeme", "role": "admin"},
                    {"username": "john@foo.com", "password": "changeme"}
                ],
                "defaultRecipes": [{"name": "Pasta"}]
            }"#,
        )
        .unwrap();

        assert_eq!(settings.default_accounts.len(), 2);
        assert_eq!(settings.default_accounts[0].role.as_deref(), Some("admin"));
        assert_eq!(settings.default_accounts[1].role, None);
        assert_eq!(settings.default_recipes.len(), 1);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        assert_eq!(Settings::parse("{}").unwrap(), Settings::default());
    }

    #[test]
    fn test_malformed_settings_rejected() {
        assert!(Settings::parse(r#"{"defaultAccounts": [{"username": "x"}]}"#).is_err());
        assert!(Settings::parse("not json").is_err());
    }
}
