//! Forward References
//!
//! Loops let a definition refer to a stream or cell that is only constructed
//! later in the same transaction. The placeholder is usable right away and is
//! resolved exactly once with [`StreamLoop::loop_`] or [`CellLoop::loop_`].
//!
//! # Resolution
//!
//! Resolving links the target's node to the placeholder's node. The rank
//! bump this causes puts the feedback edge after everything that depends on
//! the placeholder, so a value fed back through a loop is only seen in the
//! next transaction (through the hold that closes the loop).
//!
//! # Ownership
//!
//! The placeholder's stream forwards from the target without retaining it,
//! so a target built from the placeholder (the usual case) does not keep
//! itself alive through the loop. The loop handle holds the target instead.
//! The graph stays live while the handle or the target is held, and dropping
//! both releases it along with its links on upstream sinks. Code that keeps
//! only values derived from the placeholder must also keep the loop handle.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{FrpError, Result};
use crate::graph::Transaction;

use super::cell::{Cell, Sample};
use super::stream::Stream;

/// A stream placeholder resolved later in the same transaction.
pub struct StreamLoop<A> {
    stream: Stream<A>,
    assigned: Arc<AtomicBool>,
    target: Arc<Mutex<Option<Stream<A>>>>,
}

impl<A> StreamLoop<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// # Errors
    ///
    /// Returns [`FrpError::LoopOutsideTransaction`] when no transaction is
    /// open on this thread.
    pub fn new() -> Result<Self> {
        if !Transaction::is_active() {
            return Err(FrpError::LoopOutsideTransaction);
        }
        Ok(Self {
            stream: Stream::new(),
            assigned: Arc::new(AtomicBool::new(false)),
            target: Arc::new(Mutex::new(None)),
        })
    }

    /// Resolve the placeholder: from now on it fires whatever `target` fires.
    ///
    /// # Errors
    ///
    /// Returns [`FrpError::LoopResolvedTwice`] if already resolved.
    pub fn loop_(&self, target: &Stream<A>) -> Result<()> {
        if self.assigned.swap(true, Ordering::SeqCst) {
            return Err(FrpError::LoopResolvedTwice);
        }
        let listener = Transaction::apply(|trans| target.forward_unretained(trans, &self.stream));
        self.stream.add_cleanup(listener);
        *self.target.lock() = Some(target.clone());
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.assigned.load(Ordering::SeqCst)
    }

    /// Drop the link to the target and release it.
    pub fn close(&self) {
        self.target.lock().take();
        self.stream.close();
    }
}

impl<A> Deref for StreamLoop<A> {
    type Target = Stream<A>;

    fn deref(&self) -> &Stream<A> {
        &self.stream
    }
}

impl<A> Clone for StreamLoop<A> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            assigned: self.assigned.clone(),
            target: self.target.clone(),
        }
    }
}

/// A cell placeholder resolved later in the same transaction.
///
/// Sampling it before [`CellLoop::loop_`] is an error.
pub struct CellLoop<A> {
    cell: Cell<A>,
    updates: StreamLoop<A>,
    target: Arc<Mutex<Option<Cell<A>>>>,
}

impl<A> CellLoop<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// # Errors
    ///
    /// Returns [`FrpError::LoopOutsideTransaction`] when no transaction is
    /// open on this thread.
    pub fn new() -> Result<Self> {
        let updates = StreamLoop::new()?;
        let cell = Transaction::apply(|trans| Cell::from_stream(trans, &updates.stream, Sample::Unresolved));
        Ok(Self {
            cell,
            updates,
            target: Arc::new(Mutex::new(None)),
        })
    }

    /// Resolve the placeholder to `target`. Its value starts at `target`'s
    /// value as of the end of this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`FrpError::LoopResolvedTwice`] if already resolved.
    pub fn loop_(&self, target: &Cell<A>) -> Result<()> {
        Transaction::apply(|trans| {
            // The loop cell keeps only the last firing, so the raw stream
            // is enough and needs no extra owner.
            self.updates.loop_(target.source())?;
            self.cell.resolve_lazy(target.sample_lazy_in(trans));
            *self.target.lock() = Some(target.clone());
            Ok(())
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.updates.is_resolved()
    }

    /// Release the loop's subscriptions and its target.
    pub fn close(&self) {
        self.target.lock().take();
        self.cell.close();
        self.updates.close();
    }
}

impl<A> Deref for CellLoop<A> {
    type Target = Cell<A>;

    fn deref(&self) -> &Cell<A> {
        &self.cell
    }
}

impl<A> Clone for CellLoop<A> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            updates: self.updates.clone(),
            target: self.target.clone(),
        }
    }
}
