//! Graph Nodes
//!
//! A node is the scheduling identity of a stream. It carries a rank and an
//! ordered list of downstream targets.
//!
//! # Rank Invariant
//!
//! For every link `A -> B`, `rank(A) < rank(B)`. When a new link would break
//! this, [`Node::link_to`] raises the target (and everything reachable from
//! it) until the invariant holds again. Ranks only ever grow.
//!
//! # Ownership
//!
//! Targets hold the downstream node strongly but the handler only weakly.
//! The strong reference to a handler lives in the `Listener` that created the
//! link, so dropping the listener is enough to make the handler unreachable
//! even before the link itself is removed.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use smallvec::SmallVec;

/// Type-erased, non-owning reference to a handler.
pub(crate) type WeakAction = Weak<dyn Any + Send + Sync>;

/// Guards linking, unlinking and listener-set snapshots across all nodes.
///
/// Re-entrant so a rank bump can walk the graph while already holding it.
static GRAPH_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn graph_lock() -> &'static ReentrantMutex<()> {
    GRAPH_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies one link so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A downstream link: an optional weak handler plus the node it feeds.
///
/// Links without a handler are pure ordering edges.
#[derive(Clone)]
pub(crate) struct Target {
    id: TargetId,
    pub(crate) action: Option<WeakAction>,
    pub(crate) node: Node,
}

struct NodeInner {
    id: NodeId,
    rank: AtomicU64,
    targets: Mutex<Vec<Target>>,
}

/// A ranked vertex of the propagation graph.
///
/// Cloning a `Node` clones a handle to the same vertex.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Create a node with the given starting rank.
    pub fn new(rank: u64) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: NodeId::new(),
                rank: AtomicU64::new(rank),
                targets: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The shared sink node with maximal rank.
    ///
    /// Handlers targeting it run after everything else in a transaction,
    /// which is where user callbacks and cell commits belong.
    pub fn null() -> Self {
        static NULL: OnceLock<Node> = OnceLock::new();
        NULL.get_or_init(|| Node::new(u64::MAX)).clone()
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Current rank.
    pub fn rank(&self) -> u64 {
        self.inner.rank.load(Ordering::SeqCst)
    }

    /// Number of downstream links.
    pub fn target_count(&self) -> usize {
        self.inner.targets.lock().len()
    }

    /// Link this node to `target`, raising ranks as needed.
    ///
    /// Returns the link's ID and whether any rank changed. A changed rank
    /// means an open transaction must rebuild its queue.
    pub(crate) fn link_to(&self, action: Option<WeakAction>, target: &Node) -> (TargetId, bool) {
        let _graph = graph_lock().lock();
        let mut visited = HashSet::new();
        let changed = target.ensure_bigger_than(self.rank(), &mut visited);
        let id = TargetId::new();
        self.inner.targets.lock().push(Target {
            id,
            action,
            node: target.clone(),
        });
        (id, changed)
    }

    /// Remove a link previously returned by [`Node::link_to`].
    ///
    /// Unknown IDs are ignored, so unlinking is idempotent.
    pub(crate) fn unlink_to(&self, id: TargetId) {
        let removed = {
            let _graph = graph_lock().lock();
            let mut targets = self.inner.targets.lock();
            targets
                .iter()
                .position(|t| t.id == id)
                .map(|ix| targets.remove(ix))
        };
        // Dropped outside the locks; it may hold the last reference to a node.
        drop(removed);
    }

    /// Snapshot of the current targets, safe to iterate while links change.
    pub(crate) fn targets(&self) -> SmallVec<[Target; 4]> {
        let _graph = graph_lock().lock();
        self.inner.targets.lock().iter().cloned().collect()
    }

    /// Raise this node above `limit`, then everything downstream of it.
    ///
    /// `visited` holds the nodes on the current bump path; meeting one of
    /// them again means a cycle through a loop, and the walk stops there.
    fn ensure_bigger_than(&self, limit: u64, visited: &mut HashSet<NodeId>) -> bool {
        if self.rank() > limit || !visited.insert(self.id()) {
            return false;
        }

        let rank = limit.saturating_add(1);
        self.inner.rank.store(rank, Ordering::SeqCst);
        tracing::trace!(node = self.id().raw(), rank, "raised node rank");

        let downstream: SmallVec<[Node; 4]> = self
            .inner
            .targets
            .lock()
            .iter()
            .map(|t| t.node.clone())
            .collect();
        for node in downstream {
            node.ensure_bigger_than(rank, visited);
        }

        visited.remove(&self.id());
        true
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("rank", &self.rank())
            .field("targets", &self.target_count())
            .finish()
    }
}
