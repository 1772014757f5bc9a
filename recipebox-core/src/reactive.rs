//! Derived values that recompute when their inputs change.

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{StreamExt, StreamMap};

/// A value computed from local mirrors and explicit dependencies.
///
/// The value is recomputed on read when the dependencies differ from the
/// last run or when any source mirror has applied an event since. Otherwise
/// the cached value is returned.
pub struct ReactiveQuery<K, T> {
    sources: Vec<watch::Receiver<u64>>,
    deps: K,
    value: T,
    runs: usize,
    compute: Box<dyn FnMut(&K) -> T + Send + Sync>,
}

impl<K: Clone + PartialEq, T> ReactiveQuery<K, T> {
    pub fn new(
        mut sources: Vec<watch::Receiver<u64>>,
        deps: K,
        mut compute: impl FnMut(&K) -> T + Send + Sync + 'static,
    ) -> Self {
        for source in &mut sources {
            source.borrow_and_update();
        }
        let value = compute(&deps);
        Self {
            sources,
            deps,
            value,
            runs: 1,
            compute: Box::new(compute),
        }
    }

    pub fn get(&mut self, deps: &K) -> &T {
        let mut stale = *deps != self.deps;
        for source in &mut self.sources {
            // A closed source has stopped changing; only a pending bump counts.
            if source.has_changed().unwrap_or(false) {
                source.borrow_and_update();
                stale = true;
            }
        }
        if stale {
            self.deps = deps.clone();
            self.value = (self.compute)(&self.deps);
            self.runs += 1;
        }
        &self.value
    }

    /// How many times the value has been computed.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Resolve once any source has changed since it was last read. Never
    /// resolves if there are no live sources.
    pub async fn changed(&self) {
        let mut streams = StreamMap::new();
        for (index, source) in self.sources.iter().enumerate() {
            streams.insert(index, WatchStream::from_changes(source.clone()));
        }
        if streams.next().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::LocalMirror;
    use crate::model::Stored;
    use crate::publication::FeedEvent;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

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

    fn matching(mirror: &Arc<LocalMirror<String>>) -> ReactiveQuery<String, Vec<String>> {
        let source = Arc::clone(mirror);
        ReactiveQuery::new(vec![mirror.watch()], String::new(), move |term: &String| {
            source
                .find(|d| d.fields.contains(term.as_str()))
                .into_iter()
                .map(|d| d.fields)
                .collect()
        })
    }

    #[test]
    fn test_cached_until_something_changes() {
        let mirror = Arc::new(LocalMirror::new());
        mirror.apply(FeedEvent::Added { document: doc("pasta") });
        let mut query = matching(&mirror);

        assert_eq!(query.get(&String::new()), &vec!["pasta".to_string()]);
        assert_eq!(query.get(&String::new()).len(), 1);
        assert_eq!(query.runs(), 1);
    }

    #[test]
    fn test_recomputes_on_dependency_change() {
        let mirror = Arc::new(LocalMirror::new());
        mirror.apply(FeedEvent::Added { document: doc("pasta") });
        mirror.apply(FeedEvent::Added { document: doc("salad") });
        let mut query = matching(&mirror);

        assert_eq!(query.get(&"sal".to_string()), &vec!["salad".to_string()]);
        assert_eq!(query.runs(), 2);
        query.get(&"sal".to_string());
        assert_eq!(query.runs(), 2);
    }

    #[test]
    fn test_recomputes_on_source_change() {
        let mirror = Arc::new(LocalMirror::new());
        let mut query = matching(&mirror);
        assert!(query.get(&String::new()).is_empty());

        mirror.apply(FeedEvent::Added { document: doc("soup") });
        assert_eq!(query.get(&String::new()), &vec!["soup".to_string()]);
        assert_eq!(query.runs(), 2);
    }

    #[test]
    fn test_compute_may_keep_state() {
        let mut seen = Vec::new();
        let mut query = ReactiveQuery::new(Vec::new(), 0u32, move |n: &u32| {
            seen.push(*n);
            seen.clone()
        });
        query.get(&1);
        assert_eq!(query.get(&2), &vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_changed_wakes_on_source_event() {
        let mirror = Arc::new(LocalMirror::new());
        let query = matching(&mirror);

        let writer = Arc::clone(&mirror);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.apply(FeedEvent::Ready);
        });
        tokio::time::timeout(Duration::from_secs(1), query.changed())
            .await
            .expect("query never woke");
    }
}
