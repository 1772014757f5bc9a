use crate::db::DbPool;
use crate::models::{NewSession, NewUserRole, User};
use crate::schema::{sessions, user_roles, users};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::crypto::{generate_token, hash_token};

/// A user resolved from a bearer token.
pub struct Authenticated {
    pub user: User,
    pub session_id: Uuid,
    pub roles: Vec<String>,
}

pub fn create_session(
    conn: &mut PgConnection,
    user_id: Uuid,
    lifetime_days: i64,
) -> Result<String, diesel::result::Error> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let expires_at = Utc::now() + Duration::days(lifetime_days);

    let new_session = NewSession {
        user_id,
        token_hash: &token_hash,
        expires_at,
    };

    diesel::insert_into(sessions::table)
        .values(&new_session)
        .execute(conn)?;

    Ok(token)
}

pub fn delete_session(conn: &mut PgConnection, session_id: Uuid) -> QueryResult<usize> {
    diesel::delete(sessions::table.filter(sessions::id.eq(session_id))).execute(conn)
}

pub fn load_roles(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Vec<String>> {
    user_roles::table
        .filter(user_roles::user_id.eq(user_id))
        .order(user_roles::role.asc())
        .select(user_roles::role)
        .load(conn)
}

pub fn grant_role(conn: &mut PgConnection, user_id: Uuid, role: &str) -> QueryResult<usize> {
    diesel::insert_into(user_roles::table)
        .values(&NewUserRole { user_id, role })
        .on_conflict_do_nothing()
        .execute(conn)
}

pub async fn get_user_from_token(pool: &DbPool, token: &str) -> Option<Authenticated> {
    let mut conn = pool.get().ok()?;
    let token_hash = hash_token(token);

    let (user, session_id) = sessions::table
        .inner_join(users::table)
        .filter(sessions::token_hash.eq(&token_hash))
        .filter(sessions::expires_at.gt(Utc::now()))
        .filter(users::deleted_at.is_null())
        .select((User::as_select(), sessions::id))
        .first::<(User, Uuid)>(&mut conn)
        .ok()?;

    let roles = match load_roles(&mut conn, user.id) {
        Ok(roles) => roles,
        Err(e) => {
            tracing::error!("Failed to load roles for {}: {}", user.id, e);
            Vec::new()
        }
    };

    Some(Authenticated {
        user,
        session_id,
        roles,
    })
}
