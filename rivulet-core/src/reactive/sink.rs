//! Sinks are the entry points where outside code pushes values into the
//! graph.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{FrpError, Result};
use crate::graph::Transaction;

use super::cell::Cell;
use super::CallbackContext;
use super::stream::Stream;

type Combine<A> = Arc<dyn Fn(&A, &A) -> A + Send + Sync>;

/// A stream that outside code can fire.
pub struct StreamSink<A> {
    stream: Stream<A>,
    combine: Option<Combine<A>>,
    /// Value sent in the current transaction and not yet delivered.
    pending: Arc<Mutex<Option<A>>>,
}

impl<A> StreamSink<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// A sink that accepts one send per transaction.
    pub fn new() -> Self {
        Self {
            stream: Stream::new(),
            combine: None,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// A sink that combines several sends in one transaction with `f`.
    pub fn with_coalescer(f: impl Fn(&A, &A) -> A + Send + Sync + 'static) -> Self {
        Self {
            combine: Some(Arc::new(f)),
            ..Self::new()
        }
    }

    /// Fire `a`, in the current transaction if one is open.
    ///
    /// # Errors
    ///
    /// - [`FrpError::SendInCallback`] when called from a listener callback.
    /// - [`FrpError::MultipleSendsInTransaction`] when this sink has no
    ///   coalescer and was already sent to in this transaction.
    pub fn try_send(&self, a: A) -> Result<()> {
        if CallbackContext::is_active() {
            return Err(FrpError::SendInCallback);
        }

        Transaction::apply(|trans| {
            let mut pending = self.pending.lock();
            if let Some(previous) = pending.take() {
                return match &self.combine {
                    Some(f) => {
                        *pending = Some(f(&previous, &a));
                        Ok(())
                    }
                    None => {
                        *pending = Some(previous);
                        Err(FrpError::MultipleSendsInTransaction)
                    }
                };
            }
            *pending = Some(a);
            drop(pending);

            let stream = self.stream.clone();
            let slot = self.pending.clone();
            trans.prioritized(self.stream.node(), move |trans| {
                let value = slot.lock().take();
                if let Some(value) = value {
                    stream.send(trans, value);
                }
            });
            Ok(())
        })
    }

    /// Fire `a`.
    ///
    /// # Panics
    ///
    /// Panics where [`StreamSink::try_send`] would return an error.
    pub fn send(&self, a: A) {
        if let Err(err) = self.try_send(a) {
            panic!("{err}");
        }
    }
}

impl<A> Deref for StreamSink<A> {
    type Target = Stream<A>;

    fn deref(&self) -> &Stream<A> {
        &self.stream
    }
}

impl<A> Clone for StreamSink<A> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            combine: self.combine.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<A> Default for StreamSink<A>
where
    A: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for StreamSink<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSink")
            .field("stream", &self.stream)
            .field("coalescing", &self.combine.is_some())
            .finish()
    }
}

/// A cell that outside code can set.
pub struct CellSink<A> {
    sink: StreamSink<A>,
    cell: Cell<A>,
}

impl<A> CellSink<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// A cell sink holding `initial` until the first send.
    pub fn new(initial: A) -> Self {
        let sink = StreamSink::new();
        let cell = sink.hold(initial);
        Self { sink, cell }
    }

    /// A cell sink that combines several sends in one transaction with `f`.
    pub fn with_coalescer(initial: A, f: impl Fn(&A, &A) -> A + Send + Sync + 'static) -> Self {
        let sink = StreamSink::with_coalescer(f);
        let cell = sink.hold(initial);
        Self { sink, cell }
    }

    /// Set the value. It becomes visible once the transaction closes.
    ///
    /// # Panics
    ///
    /// Panics where [`CellSink::try_send`] would return an error.
    pub fn send(&self, a: A) {
        self.sink.send(a);
    }

    /// See [`StreamSink::try_send`].
    pub fn try_send(&self, a: A) -> Result<()> {
        self.sink.try_send(a)
    }
}

impl<A> Deref for CellSink<A> {
    type Target = Cell<A>;

    fn deref(&self) -> &Cell<A> {
        &self.cell
    }
}

impl<A> Clone for CellSink<A> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for CellSink<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellSink").field("cell", &self.cell).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_send_without_coalescer_is_rejected() {
        let s = StreamSink::new();
        let out = Arc::new(Mutex::new(Vec::new()));
        let o = out.clone();
        let _l = s.listen_weak(move |x: &i32| o.lock().push(*x));

        let second = Transaction::run(|| {
            s.send(1);
            s.try_send(2)
        });

        assert_eq!(second, Err(FrpError::MultipleSendsInTransaction));
        assert_eq!(*out.lock(), vec![1]);
    }

    #[test]
    fn coalescer_combines_simultaneous_sends() {
        let s = StreamSink::with_coalescer(|a: &i32, b: &i32| a + b);
        let out = Arc::new(Mutex::new(Vec::new()));
        let o = out.clone();
        let _l = s.listen_weak(move |x| o.lock().push(*x));

        Transaction::run_void(|| {
            s.send(2);
            s.send(8);
        });
        s.send(40);

        assert_eq!(*out.lock(), vec![10, 40]);
    }

    #[test]
    fn send_inside_callback_is_rejected() {
        let a = StreamSink::new();
        let b = StreamSink::<i32>::new();
        let result = Arc::new(Mutex::new(None));

        let r = result.clone();
        let b2 = b.clone();
        let _l = a.listen_weak(move |x: &i32| {
            *r.lock() = Some(b2.try_send(*x));
        });
        a.send(1);

        assert_eq!(*result.lock(), Some(Err(FrpError::SendInCallback)));
    }

    #[test]
    fn cell_sink_updates_after_transaction() {
        let c = CellSink::new(0);
        c.send(9);
        assert_eq!(c.sample(), 9);
    }
}
