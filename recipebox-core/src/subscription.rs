//! Client handle on a publication.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::collection::{Collection, CollectionError};
use crate::mirror::LocalMirror;
use crate::publication::{publish, Channel, Feed, Identity, Publish};

/// A running subscription. Drains its feed into a [`LocalMirror`] on a
/// background task; dropping the handle stops it.
pub struct Subscription<D> {
    name: String,
    mirror: Arc<LocalMirror<D>>,
    task: JoinHandle<()>,
}

impl<D: Clone + Send + Sync + 'static> Subscription<D> {
    /// Start draining `feed`. Must be called inside a tokio runtime.
    pub fn subscribe(name: impl Into<String>, mut feed: Feed<D>) -> Self {
        let name = name.into();
        let mirror = Arc::new(LocalMirror::new());
        let task = {
            let mirror = Arc::clone(&mirror);
            let name = name.clone();
            tokio::spawn(async move {
                while let Some(event) = feed.next().await {
                    mirror.apply(event);
                }
                debug!(channel = %name, "feed ended");
                mirror.close();
            })
        };
        info!(channel = %name, "subscribed");
        Self { name, mirror, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the initial batch has arrived. Never goes back to false.
    pub fn ready(&self) -> bool {
        self.mirror.is_ready()
    }

    /// Wait for the initial batch. Returns false if the feed ended first.
    pub async fn wait_ready(&self) -> bool {
        let mut rx: watch::Receiver<u64> = self.mirror.watch();
        loop {
            if self.mirror.is_ready() {
                return true;
            }
            if !self.mirror.is_live() || rx.changed().await.is_err() {
                return self.mirror.is_ready();
            }
        }
    }

    pub fn mirror(&self) -> &Arc<LocalMirror<D>> {
        &self.mirror
    }

    /// Stop receiving. The mirror keeps whatever it already holds.
    pub fn stop(self) {}
}

impl<D: Publish> Subscription<D> {
    /// Subscribe to a collection in the same process.
    pub fn subscribe_local(
        collection: &Collection<D>,
        channel: Channel,
        identity: &Identity,
    ) -> Result<Self, CollectionError> {
        let feed = publish(collection, channel, identity)?;
        Ok(Self::subscribe(channel.name(D::COLLECTION), feed))
    }
}

impl<D> Drop for Subscription<D> {
    fn drop(&mut self) {
        self.task.abort();
        debug!(channel = %self.name, "subscription stopped");
    }
}
