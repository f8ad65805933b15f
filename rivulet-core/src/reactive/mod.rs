//! Reactive Primitives
//!
//! This module implements the values users build graphs from: streams,
//! cells, sinks and loops.
//!
//! # Concepts
//!
//! ## Streams
//!
//! A [`Stream`] is a sequence of discrete events. A stream fires at most
//! a handful of values per transaction, and those firings are only visible
//! inside that transaction.
//!
//! ## Cells
//!
//! A [`Cell`] is a value that changes in discrete steps. Updates are
//! buffered and committed at the end of the transaction, so every reader in
//! a transaction sees the same value.
//!
//! ## Sinks and Loops
//!
//! [`StreamSink`] and [`CellSink`] are where values enter the graph.
//! [`StreamLoop`] and [`CellLoop`] are placeholders that let a definition
//! refer to something constructed later in the same transaction.
//!
//! # Implementation Notes
//!
//! Subscriptions are owned by [`Listener`]s. Derived streams keep the
//! listeners on their inputs, so dropping a derived stream unsubscribes it.
//! `listen` hands its listener to the [`Runtime`] registry instead, which
//! keeps it alive until it is explicitly unlistened.

mod cell;
mod context;
mod lazy;
mod listener;
mod loops;
pub mod operational;
mod runtime;
mod sink;
mod stream;

pub use cell::{Cell, Lambda};
pub(crate) use context::CallbackContext;
pub use lazy::Lazy;
pub use listener::{Listener, ListenerHandle, ListenerId};
pub use loops::{CellLoop, StreamLoop};
pub use runtime::Runtime;
pub use sink::{CellSink, StreamSink};
pub use stream::Stream;
