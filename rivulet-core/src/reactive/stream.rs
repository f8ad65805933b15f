//! Event Streams
//!
//! A stream is a sequence of discrete firings. Firings exist only for the
//! transaction they happen in; the first firing schedules a last-phase reset
//! of the firing list.
//!
//! # How Streams Work
//!
//! 1. Every combinator creates an output stream and links the input's node
//!    to the output's node. The link carries a weak reference to a handler.
//!
//! 2. The strong reference to that handler lives in a [`Listener`], and the
//!    listener is stored as a cleanup on the output stream. Dropping the
//!    output therefore drops the subscription on its input. This forms an
//!    ownership chain from every derived stream back to its sources.
//!
//! 3. Handlers refer to their output stream weakly, so the chain never
//!    loops back on itself.
//!
//! 4. Sending a value pushes it onto the firing list and queues one
//!    prioritized delivery per target, at the target's rank.
//!
//! # Failure Isolation
//!
//! Every handler invocation runs inside a [`CallbackContext`] with panics
//! caught. A panicking handler is logged and skipped; the rest of the
//! transaction carries on.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::graph::{Node, TargetId, Transaction, WeakAction};

use super::cell::{Cell, Sample};
use super::CallbackContext;
use super::lazy::Lazy;
use super::listener::{Listener, ListenerHandle};
use super::runtime::Runtime;

type Combine<A> = Arc<dyn Fn(&A, &A) -> A + Send + Sync>;

/// Run user code as a callback: sends are rejected and panics are logged
/// instead of unwinding into the scheduler.
pub(crate) fn isolate<R>(f: impl FnOnce() -> R) -> Option<R> {
    let _ctx = CallbackContext::enter();
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(
                panic = panic_message(payload.as_ref()),
                "listener panicked during propagation"
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// The code run when a firing reaches a target.
pub(crate) struct Handler<A> {
    f: Box<dyn Fn(&Transaction, &A) + Send + Sync>,
}

impl<A: 'static> Handler<A> {
    pub(crate) fn new(f: impl Fn(&Transaction, &A) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { f: Box::new(f) })
    }

    pub(crate) fn invoke(&self, trans: &Transaction, a: &A) {
        isolate(|| (self.f)(trans, a));
    }
}

struct StreamData<A> {
    node: Node,
    firings: Mutex<Vec<A>>,
    cleanups: Mutex<Vec<Listener>>,
}

/// A stream of discrete events.
///
/// # Example
///
/// ```rust
/// use rivulet_core::StreamSink;
///
/// let clicks = StreamSink::<i32>::new();
/// let doubled = clicks.map(|x| x * 2);
/// let l = doubled.listen(|x| println!("{x}"));
///
/// clicks.send(21); // prints 42
/// l.unlisten();
/// ```
pub struct Stream<A> {
    data: Arc<StreamData<A>>,
}

pub(crate) struct WeakStream<A> {
    data: Weak<StreamData<A>>,
}

impl<A> WeakStream<A> {
    pub(crate) fn upgrade(&self) -> Option<Stream<A>> {
        self.data.upgrade().map(|data| Stream { data })
    }
}

impl<A> Clone for WeakStream<A> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

impl<A> Stream<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// A stream that never fires.
    pub fn new() -> Self {
        Self {
            data: Arc::new(StreamData {
                node: Node::new(0),
                firings: Mutex::new(Vec::new()),
                cleanups: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.data.node
    }

    pub(crate) fn downgrade(&self) -> WeakStream<A> {
        WeakStream {
            data: Arc::downgrade(&self.data),
        }
    }

    /// Fire `a` in `trans`.
    pub(crate) fn send(&self, trans: &Transaction, a: A) {
        let first = {
            let mut firings = self.data.firings.lock();
            firings.push(a.clone());
            firings.len() == 1
        };
        if first {
            let weak = self.downgrade();
            trans.last(move |_| {
                if let Some(stream) = weak.upgrade() {
                    stream.data.firings.lock().clear();
                }
            });
        }

        for target in self.data.node.targets() {
            let Some(action) = target.action else {
                continue;
            };
            let a = a.clone();
            trans.prioritized(&target.node, move |trans| {
                let handler = action
                    .upgrade()
                    .and_then(|any| any.downcast::<Handler<A>>().ok());
                if let Some(handler) = handler {
                    handler.invoke(trans, &a);
                }
            });
        }
    }

    /// Link to `target` and replay this transaction's firings, unless
    /// `suppress_earlier` is set.
    fn link(
        &self,
        target: &Node,
        trans: &Transaction,
        handler: &Arc<Handler<A>>,
        suppress_earlier: bool,
    ) -> TargetId {
        let action: Arc<dyn Any + Send + Sync> = handler.clone();
        let weak: WeakAction = Arc::downgrade(&action);
        let (id, changed) = self.data.node.link_to(Some(weak), target);
        if changed {
            trans.request_regen();
        }

        if !suppress_earlier {
            let firings = self.data.firings.lock().clone();
            if !firings.is_empty() {
                let handler = handler.clone();
                trans.prioritized(target, move |trans| {
                    for a in &firings {
                        handler.invoke(trans, a);
                    }
                });
            }
        }
        id
    }

    /// Subscribe `handler` at `target`. The returned listener owns the
    /// handler and keeps this stream alive.
    pub(crate) fn listen_internal(
        &self,
        target: &Node,
        trans: &Transaction,
        handler: Arc<Handler<A>>,
        suppress_earlier: bool,
    ) -> Listener {
        let id = self.link(target, trans, &handler, suppress_earlier);
        let source = self.clone();
        Listener::new(move || {
            source.data.node.unlink_to(id);
            drop(handler);
        })
    }

    /// Re-fire everything into `out` without keeping this stream alive.
    ///
    /// Used for feedback edges, where holding the source would
    /// close a reference cycle.
    pub(crate) fn forward_unretained(&self, trans: &Transaction, out: &Stream<A>) -> Listener {
        let weak = out.downgrade();
        let handler = Handler::new(move |trans, a: &A| {
            if let Some(out) = weak.upgrade() {
                out.send(trans, a.clone());
            }
        });
        let id = self.link(out.node(), trans, &handler, false);
        let node = self.data.node.clone();
        Listener::new(move || {
            node.unlink_to(id);
            drop(handler);
        })
    }

    /// Subscribe with a handler that writes into `out`.
    pub(crate) fn listen_to<B, F>(&self, out: &Stream<B>, f: F) -> Listener
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(&Transaction, &Stream<B>, &A) + Send + Sync + 'static,
    {
        let weak = out.downgrade();
        let handler = Handler::new(move |trans, a: &A| {
            if let Some(out) = weak.upgrade() {
                f(trans, &out, a);
            }
        });
        Transaction::apply(|trans| self.listen_internal(out.node(), trans, handler, false))
    }

    pub(crate) fn with_cleanup(self, listener: Listener) -> Self {
        self.add_cleanup(listener);
        self
    }

    /// Keep `other` alive for as long as this stream lives.
    pub(crate) fn retaining<B: Send + 'static>(self, other: B) -> Self {
        self.with_cleanup(Listener::new(move || drop(other)))
    }

    /// Merge all firings of one transaction into a single firing using `f`.
    pub(crate) fn coalesce<F>(&self, trans: &Transaction, f: F) -> Stream<A>
    where
        F: Fn(&A, &A) -> A + Send + Sync + 'static,
    {
        let out = Stream::new();
        let weak = out.downgrade();
        let node = out.node().clone();
        let accum: Arc<Mutex<Option<A>>> = Arc::new(Mutex::new(None));

        let handler = Handler::new(move |trans, a: &A| {
            let first = {
                let mut acc = accum.lock();
                match acc.take() {
                    Some(prev) => {
                        *acc = Some(f(&prev, a));
                        false
                    }
                    None => {
                        *acc = Some(a.clone());
                        true
                    }
                }
            };
            if first {
                let accum = accum.clone();
                let weak = weak.clone();
                trans.prioritized(&node, move |trans| {
                    let value = accum.lock().take();
                    if let (Some(value), Some(out)) = (value, weak.upgrade()) {
                        out.send(trans, value);
                    }
                });
            }
        });
        let listener = self.listen_internal(out.node(), trans, handler, false);
        out.with_cleanup(listener)
    }

    pub(crate) fn last_firing_only(&self, trans: &Transaction) -> Stream<A> {
        self.coalesce(trans, |_, right| right.clone())
    }

    /// Plain union of two streams. The left input goes through an extra
    /// node ranked below the output so its firings always arrive first.
    fn merge_raw(&self, other: &Stream<A>, trans: &Transaction) -> Stream<A> {
        let out = Stream::new();
        let left = Node::new(0);
        let (left_id, _) = left.link_to(None, out.node());

        let weak = out.downgrade();
        let forward = Handler::new(move |trans, a: &A| {
            if let Some(out) = weak.upgrade() {
                out.send(trans, a.clone());
            }
        });
        let l1 = self.listen_internal(&left, trans, forward.clone(), false);
        let l2 = other.listen_internal(out.node(), trans, forward, false);
        let unlink = Listener::new(move || left.unlink_to(left_id));
        out.with_cleanup(l1).with_cleanup(l2).with_cleanup(unlink)
    }

    pub(crate) fn hold_lazy_in(&self, trans: &Transaction, initial: Lazy<A>) -> Cell<A> {
        Cell::from_stream(trans, self, Sample::Lazy(initial))
    }

    // ------------------------------------------------------------------------
    // Subscription
    // ------------------------------------------------------------------------

    /// Listen for firings until the returned [`Listener`] is dropped or
    /// unlistened.
    pub fn listen_weak(&self, f: impl Fn(&A) + Send + Sync + 'static) -> Listener {
        let handler = Handler::new(move |_, a: &A| f(a));
        Transaction::apply(|trans| self.listen_internal(&Node::null(), trans, handler, false))
    }

    /// Listen for firings until [`ListenerHandle::unlisten`] is called.
    ///
    /// The handler must not block and must not send into sinks.
    pub fn listen(&self, f: impl Fn(&A) + Send + Sync + 'static) -> ListenerHandle {
        Runtime::keep_alive(self.listen_weak(f))
    }

    /// Listen for the next firing only, then deregister.
    pub fn listen_once(&self, f: impl Fn(&A) + Send + Sync + 'static) -> ListenerHandle {
        Transaction::apply(|_| {
            let slot: Arc<std::sync::OnceLock<ListenerHandle>> = Arc::default();
            let own = slot.clone();
            let handle = self.once().listen(move |a| {
                if let Some(handle) = own.get() {
                    handle.unlisten();
                }
                f(a);
            });
            let _ = slot.set(handle.clone());
            handle
        })
    }

    /// Tie `listener`'s lifetime to this stream.
    pub fn add_cleanup(&self, listener: Listener) {
        self.data.cleanups.lock().push(listener);
    }

    /// Release every upstream subscription this stream owns. It stops
    /// firing from then on.
    pub fn close(&self) {
        let cleanups = std::mem::take(&mut *self.data.cleanups.lock());
        drop(cleanups);
    }

    // ------------------------------------------------------------------------
    // Combinators
    // ------------------------------------------------------------------------

    /// Transform each firing with `f`.
    pub fn map<B, F>(&self, f: F) -> Stream<B>
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        let out = Stream::new();
        let listener = self.listen_to(&out, move |trans, out, a| out.send(trans, f(a)));
        out.with_cleanup(listener)
    }

    /// Replace every firing with `b`.
    pub fn map_to<B>(&self, b: B) -> Stream<B>
    where
        B: Clone + Send + Sync + 'static,
    {
        self.map(move |_| b.clone())
    }

    /// Only pass firings for which `pred` holds.
    pub fn filter(&self, pred: impl Fn(&A) -> bool + Send + Sync + 'static) -> Stream<A> {
        let out = Stream::new();
        let listener = self.listen_to(&out, move |trans, out, a| {
            if pred(a) {
                out.send(trans, a.clone());
            }
        });
        out.with_cleanup(listener)
    }

    /// Merge with `other`, combining simultaneous firings as
    /// `f(left, right)`.
    ///
    /// The output fires at most once per transaction.
    pub fn merge(&self, other: &Stream<A>, f: impl Fn(&A, &A) -> A + Send + Sync + 'static) -> Stream<A> {
        Transaction::apply(|trans| self.merge_raw(other, trans).coalesce(trans, f))
    }

    /// Merge keeping this stream's value when both fire.
    pub fn or_else(&self, other: &Stream<A>) -> Stream<A> {
        self.merge(other, |left, _| left.clone())
    }

    /// Merge any number of streams. Simultaneous firings are combined
    /// left to right.
    pub fn merge_all<I, F>(streams: I, f: F) -> Stream<A>
    where
        I: IntoIterator<Item = Stream<A>>,
        F: Fn(&A, &A) -> A + Send + Sync + 'static,
    {
        let streams: Vec<Stream<A>> = streams.into_iter().collect();
        let f: Combine<A> = Arc::new(f);
        Transaction::apply(|_| Self::merge_range(&streams, &f))
    }

    /// Merge any number of streams, keeping the leftmost simultaneous value.
    pub fn or_else_all<I>(streams: I) -> Stream<A>
    where
        I: IntoIterator<Item = Stream<A>>,
    {
        Self::merge_all(streams, |left, _| left.clone())
    }

    fn merge_range(streams: &[Stream<A>], f: &Combine<A>) -> Stream<A> {
        match streams {
            [] => Stream::new(),
            [single] => single.clone(),
            _ => {
                let (left, right) = streams.split_at(streams.len() / 2);
                let f2 = f.clone();
                Self::merge_range(left, f).merge(&Self::merge_range(right, f), move |a, b| f2(a, b))
            }
        }
    }

    /// Combine each firing with `c`'s value from before this transaction.
    pub fn snapshot<B, C, F>(&self, c: &Cell<B>, f: F) -> Stream<C>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        F: Fn(&A, &B) -> C + Send + Sync + 'static,
    {
        let out = Stream::new();
        let c = c.clone();
        let listener = self.listen_to(&out, move |trans, out, a| match c.try_sample_no_trans() {
            Ok(b) => out.send(trans, f(a, &b)),
            Err(err) => tracing::error!(%err, "snapshot skipped"),
        });
        out.with_cleanup(listener)
    }

    /// Replace each firing with `c`'s value.
    pub fn snapshot1<B>(&self, c: &Cell<B>) -> Stream<B>
    where
        B: Clone + Send + Sync + 'static,
    {
        self.snapshot(c, |_, b| b.clone())
    }

    /// [`Stream::snapshot`] against two cells.
    pub fn snapshot3<B, C, D, F>(&self, b: &Cell<B>, c: &Cell<C>, f: F) -> Stream<D>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
        F: Fn(&A, &B, &C) -> D + Send + Sync + 'static,
    {
        let c = c.clone();
        self.snapshot(b, move |a, b| f(a, b, &c.sample_no_trans()))
    }

    /// [`Stream::snapshot`] against three cells.
    pub fn snapshot4<B, C, D, E, F>(&self, b: &Cell<B>, c: &Cell<C>, d: &Cell<D>, f: F) -> Stream<E>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: Fn(&A, &B, &C, &D) -> E + Send + Sync + 'static,
    {
        let (c, d) = (c.clone(), d.clone());
        self.snapshot(b, move |a, b| f(a, b, &c.sample_no_trans(), &d.sample_no_trans()))
    }

    /// [`Stream::snapshot`] against four cells.
    pub fn snapshot5<B, C, D, E, G, F>(
        &self,
        b: &Cell<B>,
        c: &Cell<C>,
        d: &Cell<D>,
        e: &Cell<E>,
        f: F,
    ) -> Stream<G>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        G: Clone + Send + Sync + 'static,
        F: Fn(&A, &B, &C, &D, &E) -> G + Send + Sync + 'static,
    {
        let (c, d, e) = (c.clone(), d.clone(), e.clone());
        self.snapshot(b, move |a, b| {
            f(a, b, &c.sample_no_trans(), &d.sample_no_trans(), &e.sample_no_trans())
        })
    }

    /// [`Stream::snapshot`] against five cells.
    #[allow(clippy::too_many_arguments)]
    pub fn snapshot6<B, C, D, E, G, H, F>(
        &self,
        b: &Cell<B>,
        c: &Cell<C>,
        d: &Cell<D>,
        e: &Cell<E>,
        g: &Cell<G>,
        f: F,
    ) -> Stream<H>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        G: Clone + Send + Sync + 'static,
        H: Clone + Send + Sync + 'static,
        F: Fn(&A, &B, &C, &D, &E, &G) -> H + Send + Sync + 'static,
    {
        let (c, d, e, g) = (c.clone(), d.clone(), e.clone(), g.clone());
        self.snapshot(b, move |a, b| {
            f(
                a,
                b,
                &c.sample_no_trans(),
                &d.sample_no_trans(),
                &e.sample_no_trans(),
                &g.sample_no_trans(),
            )
        })
    }

    /// A cell holding the latest firing, starting at `initial`.
    pub fn hold(&self, initial: A) -> Cell<A> {
        Transaction::apply(|trans| Cell::from_stream(trans, self, Sample::Value(initial)))
    }

    /// [`Stream::hold`] with an initial value computed on first sample.
    pub fn hold_lazy(&self, initial: Lazy<A>) -> Cell<A> {
        Transaction::apply(|trans| self.hold_lazy_in(trans, initial))
    }

    /// Only pass firings while `c` holds `true`.
    pub fn gate(&self, c: &Cell<bool>) -> Stream<A> {
        self.snapshot(c, |a, open| open.then(|| a.clone()))
            .filter_present()
    }

    /// Transform firings with a state machine. `f` maps an input and the
    /// current state to an output and the next state.
    pub fn collect<B, S, F>(&self, initial: S, f: F) -> Stream<B>
    where
        B: Clone + Send + Sync + 'static,
        S: Clone + Send + Sync + 'static,
        F: Fn(&A, &S) -> (B, S) + Send + Sync + 'static,
    {
        self.collect_lazy(Lazy::of(initial), f)
    }

    /// [`Stream::collect`] with the initial state computed on first use.
    pub fn collect_lazy<B, S, F>(&self, initial: Lazy<S>, f: F) -> Stream<B>
    where
        B: Clone + Send + Sync + 'static,
        S: Clone + Send + Sync + 'static,
        F: Fn(&A, &S) -> (B, S) + Send + Sync + 'static,
    {
        Transaction::apply(|trans| {
            let es = Stream::<S>::new();
            let state = es.hold_lazy_in(trans, initial);
            let ebs = self.snapshot(&state, f);
            let eb = ebs.map(|(b, _)| b.clone());
            let es_out = ebs.map(|(_, s)| s.clone());
            es.add_cleanup(es_out.forward_unretained(trans, &es));
            eb.retaining(es_out)
        })
    }

    /// Accumulate firings into a cell.
    pub fn accum<S, F>(&self, initial: S, f: F) -> Cell<S>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&A, &S) -> S + Send + Sync + 'static,
    {
        self.accum_lazy(Lazy::of(initial), f)
    }

    /// [`Stream::accum`] with the initial state computed on first use.
    pub fn accum_lazy<S, F>(&self, initial: Lazy<S>, f: F) -> Cell<S>
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&A, &S) -> S + Send + Sync + 'static,
    {
        Transaction::apply(|trans| {
            let es = Stream::<S>::new();
            let state = es.hold_lazy_in(trans, initial.clone());
            let es_out = self.snapshot(&state, f);
            es.add_cleanup(es_out.forward_unretained(trans, &es));
            es_out.hold_lazy_in(trans, initial)
        })
    }

    /// Pass the first firing only.
    pub fn once(&self) -> Stream<A> {
        Transaction::apply(|_| {
            let out = Stream::new();
            let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));
            let weak_slot = Arc::downgrade(&slot);
            let listener = self.listen_to(&out, move |trans, out, a| {
                let Some(slot) = weak_slot.upgrade() else {
                    return;
                };
                let upstream = slot.lock().take();
                if let Some(upstream) = upstream {
                    out.send(trans, a.clone());
                    drop(upstream);
                }
            });
            *slot.lock() = Some(listener);
            out.with_cleanup(Listener::new(move || {
                let upstream = slot.lock().take();
                drop(upstream);
            }))
        })
    }
}

impl<A> Stream<Option<A>>
where
    A: Clone + Send + Sync + 'static,
{
    /// Unwrap `Some` firings and drop `None`s.
    pub fn filter_present(&self) -> Stream<A> {
        let out = Stream::new();
        let listener = self.listen_to(&out, |trans, out, a| {
            if let Some(a) = a {
                out.send(trans, a.clone());
            }
        });
        out.with_cleanup(listener)
    }
}

impl<A> Clone for Stream<A> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

impl<A> Default for Stream<A>
where
    A: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Stream<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("node", &self.data.node)
            .field("firings", &self.data.firings.lock().len())
            .field("cleanups", &self.data.cleanups.lock().len())
            .finish()
    }
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::sink::StreamSink;

    fn collect_into<A: Clone + Send + Sync + 'static>(s: &Stream<A>) -> (Arc<Mutex<Vec<A>>>, Listener) {
        let out = Arc::new(Mutex::new(Vec::new()));
        let o = out.clone();
        let l = s.listen_weak(move |a| o.lock().push(a.clone()));
        (out, l)
    }

    #[test]
    fn send_reaches_listener() {
        let s = StreamSink::new();
        let (out, _l) = collect_into(&s);

        s.send(5);
        s.send(-7);

        assert_eq!(*out.lock(), vec![5, -7]);
    }

    #[test]
    fn dropping_weak_listener_stops_delivery() {
        let s = StreamSink::new();
        let (out, l) = collect_into(&s);

        s.send(1);
        drop(l);
        s.send(2);

        assert_eq!(*out.lock(), vec![1]);
    }

    #[test]
    fn map_and_filter() {
        let s = StreamSink::new();
        let evens = s.filter(|x: &i32| x % 2 == 0).map(|x| x * 10);
        let (out, _l) = collect_into(&evens);

        for x in 1..=5 {
            s.send(x);
        }

        assert_eq!(*out.lock(), vec![20, 40]);
    }

    #[test]
    fn dropping_derived_stream_unlinks_source() {
        let s = StreamSink::<i32>::new();
        let mapped = s.map(|x| *x);
        assert_eq!(s.node().target_count(), 1);

        drop(mapped);

        assert_eq!(s.node().target_count(), 0);
    }

    #[test]
    fn listen_inside_transaction_sees_its_sends() {
        let s = StreamSink::new();
        let out = Arc::new(Mutex::new(Vec::new()));

        let l = Transaction::run(|| {
            s.send('x');
            let o = out.clone();
            s.listen_weak(move |c| o.lock().push(*c))
        });

        assert_eq!(*out.lock(), vec!['x']);
        drop(l);
    }

    #[test]
    fn once_fires_a_single_time() {
        let s = StreamSink::new();
        let first = s.once();
        let (out, _l) = collect_into(&first);

        s.send('A');
        s.send('B');

        assert_eq!(*out.lock(), vec!['A']);
        assert_eq!(s.node().target_count(), 0);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let s = StreamSink::new();
        let _bad = s.listen_weak(|_: &i32| panic!("broken listener"));
        let (out, _l) = collect_into(&s);

        s.send(3);

        assert_eq!(*out.lock(), vec![3]);
    }

    #[test]
    fn close_releases_upstream() {
        let s = StreamSink::new();
        let mapped = s.map(|x: &i32| x + 1);
        let (out, _l) = collect_into(&mapped);

        s.send(1);
        mapped.close();
        s.send(2);

        assert_eq!(*out.lock(), vec![2]);
    }

    #[test]
    fn wide_snapshots_read_every_cell() {
        let s = StreamSink::new();
        let k = crate::reactive::sink::CellSink::new(1);
        let (b, c, d, e) = (Cell::new(2), Cell::new(3), Cell::new(4), Cell::new(5));
        let five = s.snapshot5(&k, &b, &c, &d, |a: &i32, k: &i32, b: &i32, c: &i32, d: &i32| {
            a * k + b + c + d
        });
        let six = s.snapshot6(&k, &b, &c, &d, &e, |a: &i32, k: &i32, b: &i32, c: &i32, d: &i32, e: &i32| {
            vec![*a, *k, *b, *c, *d, *e]
        });
        let (fives, _l5) = collect_into(&five);
        let (sixes, _l6) = collect_into(&six);

        s.send(10);
        k.send(0);
        s.send(20);

        assert_eq!(*fives.lock(), vec![19, 9]);
        assert_eq!(*sixes.lock(), vec![vec![10, 1, 2, 3, 4, 5], vec![20, 0, 2, 3, 4, 5]]);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
