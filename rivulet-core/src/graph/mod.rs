//! Propagation Graph
//!
//! This module holds the two pieces that decide *when* things run: the
//! ranked node graph and the transaction that drains work over it.
//!
//! # Overview
//!
//! - Every stream owns a [`Node`]. Subscribing links the stream's node to a
//!   target node, and the graph keeps `rank(source) < rank(target)` for every
//!   link.
//! - A [`Transaction`] queues work keyed by `(rank, sequence)`, so a handler
//!   never runs before the handlers it depends on in the same transaction.
//!
//! # Design Decisions
//!
//! 1. Ranks are adjusted incrementally on link instead of re-sorting the
//!    whole graph. A bump during a transaction tells that transaction to
//!    rebuild its queue before the next pop.
//!
//! 2. Two independent locks: a re-entrant transaction lock that serializes
//!    propagation, and a re-entrant graph lock that protects links. Delivery
//!    iterates a snapshot of a node's targets, so new links can be formed
//!    while a firing is being delivered.

mod node;
mod scheduler;

pub use node::{Node, NodeId, TargetId};
pub(crate) use node::WeakAction;
pub use scheduler::Transaction;
