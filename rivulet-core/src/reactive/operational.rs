//! Operational primitives.
//!
//! These expose details that the rest of the API deliberately hides: the
//! discrete steps of a cell, and the boundary between transactions. They
//! are the tools for building new primitives, not for ordinary application
//! logic.

use crate::graph::Transaction;

use super::cell::Cell;
use super::stream::Stream;

/// The steps of `c`, without its current value.
///
/// Fires at most once per transaction.
pub fn updates<A>(c: &Cell<A>) -> Stream<A>
where
    A: Clone + Send + Sync + 'static,
{
    c.updates()
}

/// `c`'s current value, fired once in the transaction this is called in,
/// followed by every update.
pub fn value<A>(c: &Cell<A>) -> Stream<A>
where
    A: Clone + Send + Sync + 'static,
{
    c.value()
}

/// Fire each of `s`'s firings again in a new transaction, after the current
/// one has closed.
pub fn defer<A>(s: &Stream<A>) -> Stream<A>
where
    A: Clone + Send + Sync + 'static,
{
    split(&s.map(|a| vec![a.clone()]))
}

/// Fire each element of a collection in its own transaction, in order,
/// after the current transaction has closed.
pub fn split<A, C>(s: &Stream<C>) -> Stream<A>
where
    A: Clone + Send + Sync + 'static,
    C: IntoIterator<Item = A> + Clone + Send + Sync + 'static,
{
    let out = Stream::new();
    let listener = s.listen_to(&out, |trans, out, items| {
        for (ix, a) in items.clone().into_iter().enumerate() {
            let weak = out.downgrade();
            trans.post_child(Some(ix), move |child| {
                if let (Some(child), Some(out)) = (child, weak.upgrade()) {
                    out.send(child, a);
                }
            });
        }
    });
    out.with_cleanup(listener)
}
