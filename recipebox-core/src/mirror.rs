//! Client-side copy of the documents a subscription has received.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;
use uuid::Uuid;

use crate::model::Stored;
use crate::publication::FeedEvent;

/// Local, read-only view of a feed. Readers see documents in arrival order.
/// Every applied event bumps a version counter that reactive queries watch.
pub struct LocalMirror<D> {
    documents: RwLock<Vec<Stored<D>>>,
    ready: AtomicBool,
    closed: AtomicBool,
    version: watch::Sender<u64>,
}

impl<D> Default for LocalMirror<D> {
    fn default() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            version: watch::Sender::new(0),
        }
    }
}

impl<D: Clone> LocalMirror<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: FeedEvent<D>) {
        match event {
            FeedEvent::Added { document } | FeedEvent::Changed { document } => {
                let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
                match documents.iter_mut().find(|d| d.id == document.id) {
                    Some(existing) => *existing = document,
                    None => documents.push(document),
                }
            }
            FeedEvent::Removed { id } => {
                self.documents
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|d| d.id != id);
            }
            FeedEvent::Ready => {
                // Ready flips once; a repeated marker changes nothing.
                if self.ready.swap(true, Ordering::AcqRel) {
                    return;
                }
            }
        }
        self.bump();
    }

    /// Mark the feed as finished. Documents stay readable but are no longer live.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.bump();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn is_live(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Snapshot of every document.
    pub fn fetch(&self) -> Vec<Stored<D>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn find(&self, predicate: impl Fn(&Stored<D>) -> bool) -> Vec<Stored<D>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| predicate(d))
            .cloned()
            .collect()
    }

    pub fn find_one(&self, id: Uuid) -> Option<Stored<D>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(name: &str) -> Stored<String> {
        let now = Utc::now();
        Stored {
            id: Uuid::new_v4(),
            owner: None,
            created_at: now,
            updated_at: now,
            fields: name.to_string(),
        }
    }

    #[test]
    fn test_added_changed_removed() {
        let mirror = LocalMirror::new();
        let a = doc("a");
        let b = doc("b");
        mirror.apply(FeedEvent::Added { document: a.clone() });
        mirror.apply(FeedEvent::Added { document: b.clone() });
        mirror.apply(FeedEvent::Changed {
            document: Stored {
                fields: "a2".to_string(),
                ..a.clone()
            },
        });
        assert_eq!(
            mirror.fetch().iter().map(|d| d.fields.as_str()).collect::<Vec<_>>(),
            vec!["a2", "b"]
        );

        mirror.apply(FeedEvent::Removed { id: a.id });
        assert_eq!(mirror.len(), 1);
        assert!(mirror.find_one(a.id).is_none());
        assert_eq!(mirror.find(|d| d.fields == "b"), vec![b]);
    }

    #[test]
    fn test_ready_flips_once() {
        let mirror: LocalMirror<String> = LocalMirror::new();
        assert!(!mirror.is_ready());
        mirror.apply(FeedEvent::Ready);
        let version = mirror.version();
        mirror.apply(FeedEvent::Ready);
        assert!(mirror.is_ready());
        assert_eq!(mirror.version(), version);
    }

    #[test]
    fn test_every_event_bumps_version() {
        let mirror = LocalMirror::new();
        let rx = mirror.watch();
        let a = doc("a");
        mirror.apply(FeedEvent::Added { document: a.clone() });
        mirror.apply(FeedEvent::Removed { id: a.id });
        assert_eq!(mirror.version(), 2);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_close_keeps_documents() {
        let mirror = LocalMirror::new();
        mirror.apply(FeedEvent::Added { document: doc("a") });
        mirror.close();
        mirror.close();
        assert!(!mirror.is_live());
        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.version(), 2);
    }
}
