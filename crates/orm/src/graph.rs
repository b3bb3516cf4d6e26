//! Parent edge bookkeeping for the document graph
//!
//! Documents and collections form a graph, not a tree: a child can be held
//! by several parents. Each child keeps weak edges back to every parent that
//! holds it, keyed by the parent's node id and labelled with the field name.
//! Collection membership is labelled with [`MEMBER`], the index is resolved
//! when a notification bubbles up.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::collection::{Collection, WeakCollection};
use crate::document::{Document, WeakDocument};
use crate::path;
use crate::value::Value;
use crate::watch;

/// Unique identity of a node for the lifetime of the process
pub type NodeId = u64;

/// Edge label used for collection membership
pub const MEMBER: &str = "*";

/// Callback fired with the changed path relative to the watched node
pub type WatchCallback = Arc<dyn Fn(&str) + Send + Sync>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Weak reference from a child to one of its parents
#[derive(Clone)]
pub(crate) struct Edge {
    pub parent: WeakNode,
    pub field: String,
}

/// Edges and watchers shared by every graph node
#[derive(Default)]
pub(crate) struct NodeCore {
    pub parents: IndexMap<NodeId, Edge>,
    pub watchers: IndexMap<String, WatchCallback>,
}

/// A strong handle on a graph node
#[derive(Clone)]
pub enum Node {
    Document(Document),
    Collection(Collection),
}

/// A weak handle on a graph node
#[derive(Clone)]
pub enum WeakNode {
    Document(WeakDocument),
    Collection(WeakCollection),
}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        match self {
            WeakNode::Document(weak) => weak.upgrade().map(Node::Document),
            WeakNode::Collection(weak) => weak.upgrade().map(Node::Collection),
        }
    }
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Document(doc) => doc.node_id(),
            Node::Collection(col) => col.node_id(),
        }
    }

    pub fn downgrade(&self) -> WeakNode {
        match self {
            Node::Document(doc) => WeakNode::Document(doc.downgrade()),
            Node::Collection(col) => WeakNode::Collection(col.downgrade()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Node::Document(doc) => Value::Document(doc.clone()),
            Node::Collection(col) => Value::Collection(col.clone()),
        }
    }

    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&mut NodeCore) -> R) -> R {
        match self {
            Node::Document(doc) => doc.with_core(f),
            Node::Collection(col) => col.with_core(f),
        }
    }

    /// Field (or [`MEMBER`]) under which this node still holds `child`
    fn holds(&self, child: NodeId) -> Option<String> {
        match self {
            Node::Document(doc) => doc.field_of(child),
            Node::Collection(col) => col.position_of(child).map(|_| MEMBER.to_string()),
        }
    }

    /// Label of `child` as seen from this node, collection indexes resolved
    fn label_of(&self, child: NodeId, field: &str) -> Option<String> {
        match self {
            Node::Document(_) => Some(field.to_string()),
            Node::Collection(col) => col.position_of(child).map(|i| i.to_string()),
        }
    }

    fn remove_child(&self, child: NodeId) {
        match self {
            Node::Document(doc) => doc.remove_child(child),
            Node::Collection(col) => col.remove_child(child),
        }
    }

    /// Parent edges that are still alive
    pub fn parents(&self) -> Parents {
        let edges: Vec<Edge> = self.with_core(|core| {
            core.parents.retain(|_, edge| edge.parent.upgrade().is_some());
            core.parents.values().cloned().collect()
        });
        Parents {
            edges: edges
                .into_iter()
                .filter_map(|edge| edge.parent.upgrade().map(|node| (node, edge.field)))
                .collect(),
        }
    }

    /// Remove this node from every parent and clear its own parent edges
    pub fn disconnect(&self) {
        let id = self.id();
        for (parent, _) in self.parents().edges {
            parent.remove_child(id);
        }
        self.with_core(|core| core.parents.clear());
    }
}

impl From<&Document> for Node {
    fn from(doc: &Document) -> Self {
        Node::Document(doc.clone())
    }
}

impl From<&Collection> for Node {
    fn from(col: &Collection) -> Self {
        Node::Collection(col.clone())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Document(doc) => doc.fmt(f),
            Node::Collection(col) => col.fmt(f),
        }
    }
}

/// Snapshot of the live parents of a node
#[derive(Debug, Clone)]
pub struct Parents {
    edges: Vec<(Node, String)>,
}

impl Parents {
    pub fn has(&self, parent: impl Into<Node>) -> bool {
        let id = parent.into().id();
        self.edges.iter().any(|(node, _)| node.id() == id)
    }

    /// Field under which `parent` holds the node
    pub fn get(&self, parent: impl Into<Node>) -> Option<String> {
        let id = parent.into().id();
        self.edges
            .iter()
            .find(|(node, _)| node.id() == id)
            .map(|(_, field)| field.clone())
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Node, &str)> {
        self.edges.iter().map(|(node, field)| (node, field.as_str()))
    }
}

/// Register `parent` on `child` if the value is a node
pub(crate) fn attach(parent: &Node, field: &str, child: &Value) {
    if let Some(child) = child.node() {
        let edge = Edge {
            parent: parent.downgrade(),
            field: field.to_string(),
        };
        let parent_id = parent.id();
        child.with_core(|core| {
            core.parents.insert(parent_id, edge);
        });
    }
}

/// Drop the edge from `child` to `parent` once the parent no longer holds it.
/// A parent that still holds the child elsewhere keeps the edge, relabelled.
pub(crate) fn detach(parent: &Node, child: &Value) {
    if let Some(child) = child.node() {
        let parent_id = parent.id();
        match parent.holds(child.id()) {
            Some(field) => child.with_core(|core| {
                if let Some(edge) = core.parents.get_mut(&parent_id) {
                    edge.field = field;
                }
            }),
            None => child.with_core(|core| {
                core.parents.shift_remove(&parent_id);
            }),
        }
    }
}

/// Queue notifications for every watcher affected by a change at `path`,
/// bubbling up through all parents
pub(crate) fn notify(node: &Node, path: &str) {
    let mut visited = HashSet::new();
    let mut queue = vec![(node.clone(), path.to_string())];

    while let Some((current, path)) = queue.pop() {
        let id = current.id();
        if !visited.insert(id) {
            continue;
        }

        let (keys, edges): (Vec<String>, Vec<Edge>) = current.with_core(|core| {
            (
                core.watchers.keys().cloned().collect(),
                core.parents.values().cloned().collect(),
            )
        });
        for key in keys.into_iter().filter(|key| matches_watch(key, &path)) {
            watch::enqueue(&current, key, path.clone());
        }

        for edge in edges {
            let Some(parent) = edge.parent.upgrade() else {
                continue;
            };
            if let Some(label) = parent.label_of(id, &edge.field) {
                queue.push((parent, path::join(&label, &path)));
            }
        }
    }
}

/// A watcher on `key` fires for changes at, below or above it
fn matches_watch(key: &str, path: &str) -> bool {
    key.is_empty()
        || path.is_empty()
        || key == path
        || path.starts_with(&format!("{key}."))
        || key.starts_with(&format!("{path}."))
}
