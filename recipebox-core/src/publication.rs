//! Named read channels over a collection.
//!
//! A publication turns a collection into a [`Feed`]: the documents visible
//! to the caller, one `Ready` marker, then live changes. Authorization is
//! decided once, when the feed is opened. A caller who may not read a
//! channel gets a feed that is immediately ready and empty.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::pin::Pin;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collection::{Change, Collection, CollectionError};
use crate::model::{Document, Favorite, Recipe, Stored};

/// Role that unlocks admin channels and admin-only methods.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Documents owned by or visible to the requesting user.
    User,
    /// Every document; only for callers holding the admin role.
    Admin,
}

impl Channel {
    fn suffix(self) -> &'static str {
        match self {
            Channel::User => "user",
            Channel::Admin => "admin",
        }
    }

    /// Full channel name, e.g. `RecipesCollection.publication.user`.
    pub fn name(self, collection: &str) -> String {
        format!("{collection}.publication.{}", self.suffix())
    }

    /// Split a channel name into its collection and channel.
    pub fn parse(name: &str) -> Option<(&str, Channel)> {
        let (collection, suffix) = name.rsplit_once(".publication.")?;
        if collection.is_empty() {
            return None;
        }
        let channel = match suffix {
            "user" => Channel::User,
            "admin" => Channel::Admin,
            _ => return None,
        };
        Some((collection, channel))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Who is asking. Anonymous callers have no user id and no roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<Uuid>,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.is_logged_in() && self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

/// One message on a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum FeedEvent<D> {
    Added { document: Stored<D> },
    Changed { document: Stored<D> },
    Removed { id: Uuid },
    /// The initial batch is complete.
    Ready,
}

impl<D> FeedEvent<D> {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedEvent::Added { .. } => "added",
            FeedEvent::Changed { .. } => "changed",
            FeedEvent::Removed { .. } => "removed",
            FeedEvent::Ready => "ready",
        }
    }
}

pub type Feed<D> = Pin<Box<dyn Stream<Item = FeedEvent<D>> + Send>>;

/// Per-type visibility on the user channel.
pub trait Publish: Document {
    fn visible_to_user(document: &Stored<Self>, identity: &Identity) -> bool;
}

impl Publish for Recipe {
    /// The catalog is browsable by every signed-in user.
    fn visible_to_user(_document: &Stored<Self>, identity: &Identity) -> bool {
        identity.is_logged_in()
    }
}

impl Publish for Favorite {
    fn visible_to_user(document: &Stored<Self>, identity: &Identity) -> bool {
        identity.user_id == Some(document.user_id)
    }
}

fn authorized(channel: Channel, identity: &Identity) -> bool {
    match channel {
        Channel::User => identity.is_logged_in(),
        Channel::Admin => identity.is_admin(),
    }
}

/// Tracks which documents a feed has sent, so that changes racing the
/// initial snapshot and changes that move a document in or out of view are
/// translated into a consistent added/changed/removed sequence.
struct MergeBox {
    channel: Channel,
    identity: Identity,
    sent: HashSet<Uuid>,
}

impl MergeBox {
    fn new(channel: Channel, identity: Identity) -> Self {
        Self {
            channel,
            identity,
            sent: HashSet::new(),
        }
    }

    fn visible<D: Publish>(&self, document: &Stored<D>) -> bool {
        match self.channel {
            Channel::Admin => true,
            Channel::User => D::visible_to_user(document, &self.identity),
        }
    }

    fn apply<D: Publish>(&mut self, change: Change<D>) -> Option<FeedEvent<D>> {
        match change {
            Change::Inserted(document) | Change::Updated(document) => {
                let visible = self.visible(&document);
                let known = self.sent.contains(&document.id);
                match (visible, known) {
                    (true, false) => {
                        self.sent.insert(document.id);
                        Some(FeedEvent::Added { document })
                    }
                    (true, true) => Some(FeedEvent::Changed { document }),
                    (false, true) => {
                        self.sent.remove(&document.id);
                        Some(FeedEvent::Removed { id: document.id })
                    }
                    (false, false) => None,
                }
            }
            Change::Removed(document) => self
                .sent
                .remove(&document.id)
                .then_some(FeedEvent::Removed { id: document.id }),
        }
    }
}

/// Open a feed on `collection` for `identity`.
///
/// The change receiver is registered before the snapshot is read, so no
/// change is lost between the two. If the feed falls further behind than
/// the collection's change buffer it ends, and the subscriber has to
/// subscribe again.
pub fn publish<D: Publish>(
    collection: &Collection<D>,
    channel: Channel,
    identity: &Identity,
) -> Result<Feed<D>, CollectionError> {
    let name = channel.name(D::COLLECTION);

    if !authorized(channel, identity) {
        warn!(
            channel = %name,
            user_id = ?identity.user_id,
            "unauthorized subscription, publishing nothing"
        );
        return Ok(Box::pin(tokio_stream::once(FeedEvent::Ready)));
    }

    let changes = collection.watch();
    let mut merge_box = MergeBox::new(channel, identity.clone());

    let mut initial: Vec<FeedEvent<D>> = collection
        .find_all()?
        .into_iter()
        .filter_map(|document| merge_box.apply(Change::Inserted(document)))
        .collect();
    debug!(channel = %name, documents = initial.len(), "publication ready");
    initial.push(FeedEvent::Ready);

    let live = BroadcastStream::new(changes)
        .map_while(move |change| match change {
            Ok(change) => Some(merge_box.apply(change)),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(channel = %name, skipped, "publication fell behind, closing feed");
                None
            }
        })
        .filter_map(|event| event);

    Ok(Box::pin(tokio_stream::iter(initial).chain(live)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Catalog;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn recipe_value(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "image": "https://example.com/r.jpg",
            "time": "10 min",
            "cost": "$2",
            "ingredients": ["salt"],
            "recipe": "Cook."
        })
    }

    async fn next<D>(feed: &mut Feed<D>) -> FeedEvent<D> {
        tokio::time::timeout(Duration::from_secs(1), feed.next())
            .await
            .expect("feed stalled")
            .expect("feed ended")
    }

    #[test]
    fn test_channel_names_round_trip() {
        let name = Channel::Admin.name(Recipe::COLLECTION);
        assert_eq!(name, "RecipesCollection.publication.admin");
        assert_eq!(
            Channel::parse(&name),
            Some(("RecipesCollection", Channel::Admin))
        );
        assert_eq!(
            Channel::parse("FavoritesCollection.publication.user"),
            Some(("FavoritesCollection", Channel::User))
        );
        assert_eq!(Channel::parse("RecipesCollection.publication.root"), None);
        assert_eq!(Channel::parse(".publication.user"), None);
        assert_eq!(Channel::parse("RecipesCollection"), None);
    }

    #[test]
    fn test_roles_need_a_user() {
        let ghost = Identity {
            user_id: None,
            roles: vec![ADMIN_ROLE.to_string()],
        };
        assert!(!ghost.is_admin());
        assert!(Identity::user(Uuid::new_v4()).with_role(ADMIN_ROLE).is_admin());
    }

    #[test]
    fn test_feed_event_wire_format() {
        let event: FeedEvent<Recipe> = FeedEvent::Ready;
        assert_eq!(serde_json::to_value(&event).unwrap(), json!({"msg": "ready"}));
        let id = Uuid::new_v4();
        let removed: FeedEvent<Recipe> = FeedEvent::Removed { id };
        assert_eq!(
            serde_json::to_value(&removed).unwrap(),
            json!({"msg": "removed", "id": id})
        );
    }

    #[tokio::test]
    async fn test_initial_batch_then_ready() {
        let catalog = Catalog::in_memory();
        let pasta = catalog.recipes.insert_value(recipe_value("Pasta"), None).unwrap();
        let user = Identity::user(Uuid::new_v4());

        let mut feed = publish(&catalog.recipes, Channel::User, &user).unwrap();
        assert_eq!(next(&mut feed).await, FeedEvent::Added { document: pasta });
        assert_eq!(next(&mut feed).await, FeedEvent::Ready);
    }

    #[tokio::test]
    async fn test_live_changes_follow_ready() {
        let catalog = Catalog::in_memory();
        let user = Identity::user(Uuid::new_v4());
        let mut feed = publish(&catalog.recipes, Channel::User, &user).unwrap();
        assert_eq!(next(&mut feed).await, FeedEvent::Ready);

        let soup = catalog.recipes.insert_value(recipe_value("Soup"), None).unwrap();
        catalog.recipes.validate_and_remove(soup.id).unwrap();

        assert_eq!(next(&mut feed).await, FeedEvent::Added { document: soup.clone() });
        assert_eq!(next(&mut feed).await, FeedEvent::Removed { id: soup.id });
    }

    #[tokio::test]
    async fn test_admin_channel_is_silent_for_non_admins() {
        let catalog = Catalog::in_memory();
        catalog.recipes.insert_value(recipe_value("Pasta"), None).unwrap();

        for identity in [Identity::anonymous(), Identity::user(Uuid::new_v4())] {
            let feed = publish(&catalog.recipes, Channel::Admin, &identity).unwrap();
            let events: Vec<_> = feed.collect().await;
            assert_eq!(events, vec![FeedEvent::Ready]);
        }
    }

    #[tokio::test]
    async fn test_admin_channel_sees_everything() {
        let catalog = Catalog::in_memory();
        let owner = Uuid::new_v4();
        let favorite = Favorite {
            user_id: owner,
            recipe_id: Uuid::new_v4(),
        };
        catalog.favorites.validate_and_insert(favorite, Some(owner)).unwrap();

        let admin = Identity::user(Uuid::new_v4()).with_role(ADMIN_ROLE);
        let mut feed = publish(&catalog.favorites, Channel::Admin, &admin).unwrap();
        assert!(matches!(next(&mut feed).await, FeedEvent::Added { .. }));
        assert_eq!(next(&mut feed).await, FeedEvent::Ready);
    }

    #[tokio::test]
    async fn test_user_channel_scopes_favorites_to_owner() {
        let catalog = Catalog::in_memory();
        let me = Uuid::new_v4();
        let someone_else = Uuid::new_v4();
        let recipe_id = Uuid::new_v4();
        let mine = catalog
            .favorites
            .validate_and_insert(Favorite { user_id: me, recipe_id }, Some(me))
            .unwrap();
        catalog
            .favorites
            .validate_and_insert(
                Favorite {
                    user_id: someone_else,
                    recipe_id,
                },
                Some(someone_else),
            )
            .unwrap();

        let mut feed = publish(&catalog.favorites, Channel::User, &Identity::user(me)).unwrap();
        assert_eq!(next(&mut feed).await, FeedEvent::Added { document: mine });
        assert_eq!(next(&mut feed).await, FeedEvent::Ready);

        // Someone else's change never reaches this feed.
        catalog
            .favorites
            .validate_and_insert(
                Favorite {
                    user_id: someone_else,
                    recipe_id: Uuid::new_v4(),
                },
                Some(someone_else),
            )
            .unwrap();
        let result = tokio::time::timeout(Duration::from_millis(50), feed.next()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_box_reconciles_races() {
        let now = chrono::Utc::now();
        let doc = Stored {
            id: Uuid::new_v4(),
            owner: None,
            created_at: now,
            updated_at: now,
            fields: Favorite {
                user_id: Uuid::new_v4(),
                recipe_id: Uuid::new_v4(),
            },
        };
        let mut merge_box = MergeBox::new(Channel::User, Identity::user(doc.user_id));

        // A removal for a document never sent is dropped.
        assert_eq!(merge_box.apply(Change::Removed(doc.clone())), None);
        // An insert seen twice (snapshot and change) becomes a change.
        assert!(matches!(
            merge_box.apply(Change::Inserted(doc.clone())),
            Some(FeedEvent::Added { .. })
        ));
        assert!(matches!(
            merge_box.apply(Change::Inserted(doc.clone())),
            Some(FeedEvent::Changed { .. })
        ));

        // An update that moves the document out of view removes it.
        let moved = Stored {
            fields: Favorite {
                user_id: Uuid::new_v4(),
                ..doc.fields
            },
            ..doc.clone()
        };
        assert_eq!(
            merge_box.apply(Change::Updated(moved.clone())),
            Some(FeedEvent::Removed { id: doc.id })
        );
        assert_eq!(merge_box.apply(Change::Updated(moved)), None);
    }

    #[tokio::test]
    async fn test_feed_that_falls_behind_ends() {
        let catalog = Catalog::new(Arc::new(MemoryStore::new()), 1);
        let user = Identity::user(Uuid::new_v4());
        let mut feed = publish(&catalog.recipes, Channel::User, &user).unwrap();
        assert_eq!(next(&mut feed).await, FeedEvent::Ready);

        for name in ["Pasta", "Salad", "Soup"] {
            catalog.recipes.insert_value(recipe_value(name), None).unwrap();
        }
        let ended = tokio::time::timeout(Duration::from_secs(1), feed.next())
            .await
            .expect("feed stalled");
        assert!(ended.is_none());
    }
}
