//! Deferred field-change notifications
//!
//! Mutations never call watchers directly. They queue a pending
//! notification per `(node, watch path)`, and the queue is drained by
//! [`tick`] once the current synchronous work has finished. Several changes
//! queued before a drain coalesce into one call, and the callback that is
//! registered when the queue drains is the one that runs.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::graph::{Node, NodeId, WeakNode};

struct Pending {
    node: WeakNode,
    key: String,
    path: String,
}

/// Process-wide notification queue
pub struct Dispatcher {
    queue: Mutex<IndexMap<(NodeId, String), Pending>>,
}

static DISPATCHER: Lazy<Dispatcher> = Lazy::new(Dispatcher::new);

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(IndexMap::new()),
        }
    }

    /// The global dispatcher
    pub fn global() -> &'static Dispatcher {
        &DISPATCHER
    }

    fn enqueue(&self, node: &Node, key: String, path: String) {
        let id = node.id();
        let mut queue = self.queue.lock();
        queue.insert(
            (id, key.clone()),
            Pending {
                node: node.downgrade(),
                key,
                path,
            },
        );
    }

    /// Number of queued notifications
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Deliver every queued notification, returns how many callbacks ran
    pub fn flush(&self) -> usize {
        let pending: Vec<Pending> = {
            let mut queue = self.queue.lock();
            queue.drain(..).map(|(_, pending)| pending).collect()
        };

        let mut delivered = 0;
        for item in pending {
            let Some(node) = item.node.upgrade() else {
                continue;
            };
            let callback = node.with_core(|core| core.watchers.get(&item.key).cloned());
            if let Some(callback) = callback {
                tracing::trace!("Dispatching change at `{}` to watcher `{}`", item.path, item.key);
                callback(&item.path);
                delivered += 1;
            }
        }
        delivered
    }
}

pub(crate) fn enqueue(node: &Node, key: String, path: String) {
    DISPATCHER.enqueue(node, key, path);
}

/// Deliver queued notifications right away
pub fn flush() -> usize {
    DISPATCHER.flush()
}

/// Number of queued notifications
pub fn pending() -> usize {
    DISPATCHER.pending()
}

/// Let the current task finish its synchronous work, then deliver queued
/// notifications
pub async fn tick() -> usize {
    tokio::task::yield_now().await;
    DISPATCHER.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_same_path_watch_coalesces() {
        let doc = Document::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let handler = move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        doc.watch("a", handler.clone());
        doc.watch("a", handler);
        doc.set("a", 1).unwrap();

        tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_changes_coalesce_until_drained() {
        let dispatcher = Dispatcher::new();
        let doc = Document::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let counter = calls.clone();
        let paths = seen.clone();
        doc.watch("", move |path: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            paths.lock().push(path.to_string());
        });
        dispatcher.enqueue(&Node::from(&doc), String::new(), "a".into());
        dispatcher.enqueue(&Node::from(&doc), String::new(), "b".into());
        assert_eq!(dispatcher.pending(), 1);

        assert_eq!(dispatcher.flush(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().as_slice(), ["b".to_string()]);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_callback_is_resolved_at_dispatch_time() {
        let dispatcher = Dispatcher::new();
        let doc = Document::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        doc.watch("a", move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.enqueue(&Node::from(&doc), "a".into(), "a".into());
        dispatcher.enqueue(&Node::from(&doc), "a".into(), "a".into());
        assert_eq!(dispatcher.pending(), 1);

        doc.unwatch("a");
        assert_eq!(dispatcher.flush(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nested_change_bubbles_up() {
        let root = Document::new();
        let child = Document::new();
        root.set("child", child.clone()).unwrap();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let paths = seen.clone();
        root.watch("child", move |path: &str| paths.lock().push(path.to_string()));

        child.set("name", "x").unwrap();
        tick().await;
        assert_eq!(seen.lock().as_slice(), ["child.name".to_string()]);
    }
}
