//! Cells
//!
//! A cell is a value that changes in discrete steps. It is driven by a
//! stream of updates and buffers them: readers always see the value as of
//! the start of the transaction, and the new value is committed in the
//! transaction's last phase.
//!
//! # How Cells Work
//!
//! 1. Holding a stream subscribes a commit handler at the null node, so it
//!    runs after every other handler of the transaction.
//!
//! 2. The first update in a transaction stores the pending value and
//!    queues one last-phase commit. Later updates overwrite the pending
//!    value.
//!
//! 3. Sampling returns the committed value. A lazily-initialized cell
//!    computes its value on first sample; an unresolved loop cannot be
//!    sampled at all.
//!
//! # Memory Layout
//!
//! Each cell consists of:
//! - The update stream (shared with whatever it was held from)
//! - The value state, behind a mutex
//! - The commit subscription on the update stream

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{FrpError, Result};
use crate::graph::{Node, Transaction};

use super::lazy::Lazy;
use super::listener::{Listener, ListenerHandle};
use super::runtime::Runtime;
use super::stream::{isolate, Handler, Stream};

/// A shareable function value, as held by a cell of functions.
pub type Lambda<A, B> = Arc<dyn Fn(&A) -> B + Send + Sync>;

/// Committed value of a cell.
pub(crate) enum Sample<A> {
    Value(A),
    Lazy(Lazy<A>),
    /// A loop placeholder that has not been looped yet.
    Unresolved,
}

struct CellState<A> {
    current: Sample<A>,
    update: Option<A>,
}

struct CellData<A> {
    stream: Stream<A>,
    state: Mutex<CellState<A>>,
    cleanup: Mutex<Option<Listener>>,
}

/// Value captured by a lazy sample, filled in at the end of the transaction.
enum LazySample<A> {
    Pending(Cell<A>),
    Ready(A),
}

struct ApplyState<A, B> {
    f: Option<Lambda<A, B>>,
    a: Option<A>,
}

/// A time-varying value.
///
/// # Example
///
/// ```rust
/// use rivulet_core::CellSink;
///
/// let a = CellSink::new(1);
/// let b = CellSink::new(5);
/// let sum = a.lift(&b, |x: &i32, y: &i32| x + y);
///
/// assert_eq!(sum.sample(), 6);
/// a.send(12);
/// assert_eq!(sum.sample(), 17);
/// ```
pub struct Cell<A> {
    data: Arc<CellData<A>>,
}

impl<A> Cell<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// A cell with a constant value.
    pub fn new(value: A) -> Self {
        Self::with_state(Stream::new(), Sample::Value(value))
    }

    fn with_state(stream: Stream<A>, current: Sample<A>) -> Self {
        Self {
            data: Arc::new(CellData {
                stream,
                state: Mutex::new(CellState {
                    current,
                    update: None,
                }),
                cleanup: Mutex::new(None),
            }),
        }
    }

    /// A cell driven by `stream`.
    pub(crate) fn from_stream(trans: &Transaction, stream: &Stream<A>, initial: Sample<A>) -> Self {
        let cell = Self::with_state(stream.clone(), initial);
        let weak = Arc::downgrade(&cell.data);

        let handler = Handler::new(move |trans, a: &A| {
            let Some(data) = weak.upgrade() else {
                return;
            };
            let first = data.state.lock().update.replace(a.clone()).is_none();
            if first {
                trans.last(move |_| {
                    let mut state = data.state.lock();
                    if let Some(value) = state.update.take() {
                        state.current = Sample::Value(value);
                    }
                });
            }
        });
        let listener = stream.listen_internal(&Node::null(), trans, handler, false);
        *cell.data.cleanup.lock() = Some(listener);
        cell
    }

    /// Committed value, outside of transaction locking.
    pub(crate) fn try_sample_no_trans(&self) -> Result<A> {
        let lazy = {
            let state = self.data.state.lock();
            match &state.current {
                Sample::Value(value) => return Ok(value.clone()),
                Sample::Lazy(lazy) => lazy.clone(),
                Sample::Unresolved => return Err(FrpError::LoopNotResolved),
            }
        };

        let value = lazy.get();
        let mut state = self.data.state.lock();
        if let Sample::Lazy(_) = state.current {
            state.current = Sample::Value(value.clone());
        }
        Ok(value)
    }

    /// # Panics
    ///
    /// Panics if the cell is an unresolved loop.
    pub(crate) fn sample_no_trans(&self) -> A {
        match self.try_sample_no_trans() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// The value including this transaction's pending update.
    fn new_value(&self) -> Result<A> {
        let update = self.data.state.lock().update.clone();
        match update {
            Some(value) => Ok(value),
            None => self.try_sample_no_trans(),
        }
    }

    /// Read the current value.
    ///
    /// Inside a transaction this is the value from before the transaction
    /// started.
    ///
    /// # Panics
    ///
    /// Panics if the cell is a `CellLoop` that has not been looped yet. Use
    /// [`Cell::try_sample`] to get an error instead.
    pub fn sample(&self) -> A {
        Transaction::apply(|_| self.sample_no_trans())
    }

    /// [`Cell::sample`] that reports an unresolved loop as an error.
    pub fn try_sample(&self) -> Result<A> {
        Transaction::apply(|_| self.try_sample_no_trans())
    }

    /// A deferred sample, usable before a loop is resolved.
    ///
    /// The value is captured at the end of the current transaction and
    /// includes that transaction's update.
    pub fn sample_lazy(&self) -> Lazy<A> {
        Transaction::apply(|trans| self.sample_lazy_in(trans))
    }

    pub(crate) fn sample_lazy_in(&self, trans: &Transaction) -> Lazy<A> {
        let slot = Arc::new(Mutex::new(LazySample::Pending(self.clone())));

        let capture = slot.clone();
        trans.last(move |_| {
            let pending = match &*capture.lock() {
                LazySample::Pending(cell) => Some(cell.clone()),
                LazySample::Ready(_) => None,
            };
            if let Some(Ok(value)) = pending.map(|cell| cell.new_value()) {
                *capture.lock() = LazySample::Ready(value);
            }
        });

        Lazy::new(move || {
            let pending = match &*slot.lock() {
                LazySample::Ready(value) => return value.clone(),
                LazySample::Pending(cell) => cell.clone(),
            };
            pending.sample()
        })
    }

    /// Give an unresolved loop its initial value.
    pub(crate) fn resolve_lazy(&self, lazy: Lazy<A>) {
        let mut state = self.data.state.lock();
        if let Sample::Unresolved = state.current {
            state.current = Sample::Lazy(lazy);
        }
    }

    /// The stream this cell holds, with every firing rather than the last.
    pub(crate) fn source(&self) -> &Stream<A> {
        &self.data.stream
    }

    pub(crate) fn updates_in(&self, trans: &Transaction) -> Stream<A> {
        self.data.stream.last_firing_only(trans)
    }

    pub(crate) fn updates(&self) -> Stream<A> {
        Transaction::apply(|trans| self.updates_in(trans))
    }

    /// Fires the current value once, in the transaction it is created in,
    /// then every update.
    pub(crate) fn value_in(&self, trans: &Transaction) -> Stream<A> {
        let spark = Stream::<()>::new();
        let fire = spark.clone();
        trans.prioritized(spark.node(), move |trans| fire.send(trans, ()));
        let initial = spark.snapshot1(self);
        initial.merge(&self.updates_in(trans), |_, update| update.clone())
    }

    pub(crate) fn value(&self) -> Stream<A> {
        Transaction::apply(|trans| self.value_in(trans))
    }

    // ------------------------------------------------------------------------
    // Subscription
    // ------------------------------------------------------------------------

    /// Listen to the current value and every later one, until the
    /// returned [`Listener`] is dropped.
    pub fn listen_weak(&self, f: impl Fn(&A) + Send + Sync + 'static) -> Listener {
        Transaction::apply(|trans| self.value_in(trans).listen_weak(f))
    }

    /// Listen to the current value and every later one, until
    /// [`ListenerHandle::unlisten`] is called.
    pub fn listen(&self, f: impl Fn(&A) + Send + Sync + 'static) -> ListenerHandle {
        Runtime::keep_alive(self.listen_weak(f))
    }

    /// Release the subscription on the update stream. The cell keeps its
    /// last committed value from then on.
    pub fn close(&self) {
        let cleanup = self.data.cleanup.lock().take();
        drop(cleanup);
    }

    // ------------------------------------------------------------------------
    // Algebra
    // ------------------------------------------------------------------------

    pub fn map<B, F>(&self, f: F) -> Cell<B>
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Transaction::apply(|trans| {
            let g = f.clone();
            let initial = self.sample_lazy_in(trans).map(move |a| g(a));
            self.updates_in(trans)
                .map(move |a| f(a))
                .hold_lazy_in(trans, initial)
        })
    }

    /// Apply a cell of functions to a cell of arguments.
    ///
    /// Every lift is built on this. The output is recomputed at most once
    /// per transaction, after both inputs have delivered their values.
    pub fn apply<B>(bf: &Cell<Lambda<A, B>>, ba: &Cell<A>) -> Cell<B>
    where
        B: Clone + Send + Sync + 'static,
    {
        Transaction::apply(|trans| {
            let out = Stream::<B>::new();
            let in_target = Node::new(0);
            let (in_id, _) = in_target.link_to(None, out.node());
            let state = Arc::new(Mutex::new(ApplyState { f: None, a: None }));

            let fire = {
                let state = state.clone();
                let weak = out.downgrade();
                let node = out.node().clone();
                Arc::new(move |trans: &Transaction| {
                    let (state, weak) = (state.clone(), weak.clone());
                    trans.prioritized(&node, move |trans| {
                        let (f, a) = {
                            let st = state.lock();
                            (st.f.clone(), st.a.clone())
                        };
                        let (Some(f), Some(a), Some(out)) = (f, a, weak.upgrade()) else {
                            return;
                        };
                        if let Some(b) = isolate(|| f(&a)) {
                            out.send(trans, b);
                        }
                    });
                })
            };

            let on_f = {
                let (state, fire) = (state.clone(), fire.clone());
                Handler::new(move |trans, f: &Lambda<A, B>| {
                    let ready = {
                        let mut st = state.lock();
                        st.f = Some(f.clone());
                        st.a.is_some()
                    };
                    if ready {
                        fire(trans);
                    }
                })
            };
            let on_a = Handler::new(move |trans, a: &A| {
                let ready = {
                    let mut st = state.lock();
                    st.a = Some(a.clone());
                    st.f.is_some()
                };
                if ready {
                    fire(trans);
                }
            });

            let l1 = bf.value_in(trans).listen_internal(&in_target, trans, on_f, false);
            let l2 = ba.value_in(trans).listen_internal(&in_target, trans, on_a, false);
            let unlink = Listener::new(move || in_target.unlink_to(in_id));

            let (bf, ba) = (bf.clone(), ba.clone());
            let initial = Lazy::new(move || {
                let f = bf.sample_no_trans();
                f(&ba.sample_no_trans())
            });

            out.last_firing_only(trans)
                .with_cleanup(l1)
                .with_cleanup(l2)
                .with_cleanup(unlink)
                .hold_lazy_in(trans, initial)
        })
    }

    /// Combine with another cell.
    pub fn lift<B, C, F>(&self, b: &Cell<B>, f: F) -> Cell<C>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        F: Fn(&A, &B) -> C + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let bf = self.map(move |a: &A| -> Lambda<B, C> {
            let (a, f) = (a.clone(), f.clone());
            Arc::new(move |b: &B| f(&a, b))
        });
        Cell::apply(&bf, b)
    }

    /// [`Cell::lift`] over three cells.
    pub fn lift3<B, C, D, F>(&self, b: &Cell<B>, c: &Cell<C>, f: F) -> Cell<D>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
        F: Fn(&A, &B, &C) -> D + Send + Sync + 'static,
    {
        self.lift(b, |a, b| (a.clone(), b.clone()))
            .lift(c, move |(a, b), c| f(a, b, c))
    }

    /// [`Cell::lift`] over four cells.
    pub fn lift4<B, C, D, E, F>(&self, b: &Cell<B>, c: &Cell<C>, d: &Cell<D>, f: F) -> Cell<E>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: Fn(&A, &B, &C, &D) -> E + Send + Sync + 'static,
    {
        self.lift3(b, c, |a, b, c| (a.clone(), b.clone(), c.clone()))
            .lift(d, move |(a, b, c), d| f(a, b, c, d))
    }

    /// [`Cell::lift`] over five cells.
    pub fn lift5<B, C, D, E, G, F>(
        &self,
        b: &Cell<B>,
        c: &Cell<C>,
        d: &Cell<D>,
        e: &Cell<E>,
        f: F,
    ) -> Cell<G>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        G: Clone + Send + Sync + 'static,
        F: Fn(&A, &B, &C, &D, &E) -> G + Send + Sync + 'static,
    {
        self.lift4(b, c, d, |a, b, c, d| (a.clone(), b.clone(), c.clone(), d.clone()))
            .lift(e, move |(a, b, c, d), e| f(a, b, c, d, e))
    }

    /// [`Cell::lift`] over six cells.
    #[allow(clippy::too_many_arguments)]
    pub fn lift6<B, C, D, E, G, H, F>(
        &self,
        b: &Cell<B>,
        c: &Cell<C>,
        d: &Cell<D>,
        e: &Cell<E>,
        g: &Cell<G>,
        f: F,
    ) -> Cell<H>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        D: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        G: Clone + Send + Sync + 'static,
        H: Clone + Send + Sync + 'static,
        F: Fn(&A, &B, &C, &D, &E, &G) -> H + Send + Sync + 'static,
    {
        self.lift5(b, c, d, e, |a, b, c, d, e| {
            (a.clone(), b.clone(), c.clone(), d.clone(), e.clone())
        })
        .lift(g, move |(a, b, c, d, e), g| f(a, b, c, d, e, g))
    }
}

impl<A> Cell<Cell<A>>
where
    A: Clone + Send + Sync + 'static,
{
    /// Flatten a cell of cells.
    ///
    /// When the outer cell switches during a transaction, only the final
    /// value of the newly selected inner cell is delivered.
    pub fn switch_c(&self) -> Cell<A> {
        Transaction::apply(|trans| {
            let initial = self.sample_lazy_in(trans).map(|inner: &Cell<A>| inner.sample());
            let out = Stream::<A>::new();
            let node = out.node().clone();

            let weak = out.downgrade();
            let current: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));
            let slot = current.clone();
            let on_switch = Handler::new(move |trans, inner: &Cell<A>| {
                let previous = slot.lock().take();
                drop(previous);
                // A fresh handler per inner cell, so firings already queued
                // for the previous one die with its listener.
                let weak = weak.clone();
                let forward = Handler::new(move |trans, a: &A| {
                    if let Some(out) = weak.upgrade() {
                        out.send(trans, a.clone());
                    }
                });
                let listener = inner
                    .value_in(trans)
                    .listen_internal(&node, trans, forward, false);
                *slot.lock() = Some(listener);
            });

            let outer = self.value_in(trans).listen_internal(out.node(), trans, on_switch, false);
            let inner = Listener::new(move || {
                let previous = current.lock().take();
                drop(previous);
            });
            out.last_firing_only(trans)
                .with_cleanup(outer)
                .with_cleanup(inner)
                .hold_lazy_in(trans, initial)
        })
    }
}

impl<A> Cell<Stream<A>>
where
    A: Clone + Send + Sync + 'static,
{
    /// Fire whatever the currently selected stream fires.
    ///
    /// A switch takes effect at the end of the transaction: the old stream
    /// can still fire in the switching transaction, the new one cannot.
    ///
    /// # Panics
    ///
    /// Panics if the cell is an unresolved loop.
    pub fn switch_s(&self) -> Stream<A> {
        Transaction::apply(|trans| {
            let out = Stream::<A>::new();
            let node = out.node().clone();

            let weak = out.downgrade();
            let forward = Handler::new(move |trans, a: &A| {
                if let Some(out) = weak.upgrade() {
                    out.send(trans, a.clone());
                }
            });

            let first = self
                .sample_no_trans()
                .listen_internal(&node, trans, forward.clone(), false);
            let current = Arc::new(Mutex::new(Some(first)));

            let slot = current.clone();
            let on_switch = Handler::new(move |trans, next: &Stream<A>| {
                let (next, slot, forward, node) =
                    (next.clone(), slot.clone(), forward.clone(), node.clone());
                trans.last(move |trans| {
                    let previous = slot.lock().take();
                    drop(previous);
                    let listener = next.listen_internal(&node, trans, forward, true);
                    *slot.lock() = Some(listener);
                });
            });

            let outer = self.updates_in(trans).listen_internal(out.node(), trans, on_switch, false);
            let inner = Listener::new(move || {
                let previous = current.lock().take();
                drop(previous);
            });
            out.with_cleanup(outer).with_cleanup(inner)
        })
    }
}

impl<A> Clone for Cell<A> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for Cell<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.data.state.lock();
        let mut s = f.debug_struct("Cell");
        match &state.current {
            Sample::Value(value) => s.field("value", value),
            Sample::Lazy(_) => s.field("value", &format_args!("<lazy>")),
            Sample::Unresolved => s.field("value", &format_args!("<unresolved>")),
        };
        s.field("pending", &state.update).finish()
    }
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::sink::{CellSink, StreamSink};

    fn record<A: Clone + Send + Sync + 'static>(c: &Cell<A>) -> (Arc<Mutex<Vec<A>>>, Listener) {
        let out = Arc::new(Mutex::new(Vec::new()));
        let o = out.clone();
        let l = c.listen_weak(move |a| o.lock().push(a.clone()));
        (out, l)
    }

    #[test]
    fn constant_cell() {
        let c = Cell::new(12);
        let (out, _l) = record(&c);
        assert_eq!(c.sample(), 12);
        assert_eq!(*out.lock(), vec![12]);
    }

    #[test]
    fn hold_commits_at_end_of_transaction() {
        let s = StreamSink::new();
        let c = s.hold(0);

        Transaction::run_void(|| {
            s.send(2);
            assert_eq!(c.sample(), 0);
        });

        assert_eq!(c.sample(), 2);
    }

    #[test]
    fn lazy_hold_is_computed_on_sample() {
        let s = StreamSink::<i32>::new();
        let c = s.hold_lazy(Lazy::new(|| 40 + 2));
        assert_eq!(c.sample(), 42);
    }

    #[test]
    fn map_tracks_updates() {
        let c = CellSink::new(6);
        let mapped = c.map(|x: &i32| x.to_string());
        let (out, _l) = record(&mapped);

        c.send(8);

        assert_eq!(*out.lock(), vec!["6".to_string(), "8".to_string()]);
    }

    #[test]
    fn lift_is_glitch_free() {
        let a = CellSink::new(1);
        let a3 = a.map(|x: &i32| x * 3);
        let a5 = a.map(|x: &i32| x * 5);
        let both = a3.lift(&a5, |x, y| format!("{x} {y}"));
        let (out, _l) = record(&both);

        a.send(2);

        assert_eq!(*out.lock(), vec!["3 5".to_string(), "6 10".to_string()]);
    }

    #[test]
    fn sample_lazy_sees_the_update_of_its_transaction() {
        let c = CellSink::new(1);
        let lazy = Transaction::run(|| {
            c.send(5);
            c.sample_lazy()
        });
        assert_eq!(lazy.get(), 5);
    }

    #[test]
    fn closed_cell_stops_updating() {
        let s = StreamSink::new();
        let c = s.hold('a');

        s.send('b');
        c.close();
        s.send('c');

        assert_eq!(c.sample(), 'b');
    }

    #[test]
    fn debug_shows_value() {
        let c = Cell::new(3);
        assert_eq!(format!("{c:?}"), "Cell { value: 3, pending: None }");
    }
}
