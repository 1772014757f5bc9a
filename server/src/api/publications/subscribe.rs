use crate::api::ErrorResponse;
use crate::auth::MaybeAuthUser;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use recipebox_core::{
    publish, Catalog, Channel, Collection, CollectionError, Document, Favorite, Feed, FeedEvent,
    Identity, Publish, Recipe,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Logs when the client goes away and the stream is dropped.
struct FeedGuard {
    channel: String,
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        tracing::info!(channel = %self.channel, "publication closed");
    }
}

/// One SSE frame per feed event, named after the event kind.
pub fn encode<D: Serialize>(event: &FeedEvent<D>) -> Result<Event, axum::Error> {
    Event::default().event(event.kind()).json_data(event)
}

fn not_found(channel: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Unknown publication: {}", channel),
        }),
    )
        .into_response()
}

fn open<D: Publish>(
    name: String,
    collection: &Collection<D>,
    channel: Channel,
    identity: &Identity,
) -> Response {
    match publish(collection, channel, identity) {
        Ok(feed) => stream(name, feed),
        Err(err) => failed(&name, err),
    }
}

fn stream<D: Publish>(name: String, feed: Feed<D>) -> Response {
    let guard = FeedGuard { channel: name };
    let events = feed.map(move |event| {
        let _guard = &guard;
        encode(&event)
    });

    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response()
}

fn failed(name: &str, err: CollectionError) -> Response {
    tracing::error!(channel = %name, "Failed to open publication: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Failed to open publication".to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/api/publications/{channel}",
    tag = "publications",
    params(
        ("channel" = String, Path, description = "Publication name, e.g. RecipesCollection.publication.user")
    ),
    responses(
        (status = 200, description = "Server-sent event stream of added, changed, removed and ready events", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown publication", body = ErrorResponse)
    ),
    security(
        (),
        ("bearer_auth" = [])
    )
)]
pub async fn subscribe(
    State(catalog): State<Arc<Catalog>>,
    auth: MaybeAuthUser,
    Path(name): Path<String>,
) -> Response {
    let Some((collection, channel)) = Channel::parse(&name) else {
        return not_found(&name);
    };
    let identity = auth.identity();

    tracing::info!(
        channel = %name,
        user_id = ?identity.user_id,
        "publication opened"
    );

    if collection == Recipe::COLLECTION {
        open(name, &catalog.recipes, channel, &identity)
    } else if collection == Favorite::COLLECTION {
        open(name, &catalog.favorites, channel, &identity)
    } else {
        not_found(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_event_kind_encodes() {
        let events: Vec<FeedEvent<Recipe>> = vec![
            FeedEvent::Removed {
                id: uuid::Uuid::nil(),
            },
            FeedEvent::Ready,
        ];
        for event in &events {
            assert!(encode(event).is_ok(), "{}", event.kind());
        }
    }

    #[test]
    fn test_event_payload_is_tagged() {
        let ready: FeedEvent<Recipe> = FeedEvent::Ready;
        assert_eq!(
            serde_json::to_value(&ready).unwrap(),
            serde_json::json!({"msg": "ready"})
        );
    }
}
