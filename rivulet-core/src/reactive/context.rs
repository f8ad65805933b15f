//! Callback Context
//!
//! Tracks whether the current thread is executing a handler on behalf of the
//! engine. Sinks consult it to reject sends made from inside a callback,
//! which would otherwise re-enter propagation mid-drain.
//!
//! # Implementation
//!
//! A thread-local depth counter. Entering a callback increments it and the
//! returned guard decrements it again, so the count stays balanced even if
//! the callback panics.

use std::cell::Cell;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Guard marking the current thread as inside a listener callback.
pub(crate) struct CallbackContext {
    depth: usize,
}

impl CallbackContext {
    /// Enter a callback. The context is exited when the guard is dropped.
    pub(crate) fn enter() -> Self {
        let depth = DEPTH.with(|d| {
            let depth = d.get() + 1;
            d.set(depth);
            depth
        });
        Self { depth }
    }

    /// Check if any callback is running on this thread.
    pub(crate) fn is_active() -> bool {
        Self::depth() > 0
    }

    /// Number of nested callbacks on this thread.
    pub(crate) fn depth() -> usize {
        DEPTH.with(Cell::get)
    }
}

impl Drop for CallbackContext {
    fn drop(&mut self) {
        DEPTH.with(|d| {
            debug_assert_eq!(d.get(), self.depth, "CallbackContext exited out of order");
            d.set(d.get().saturating_sub(1));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_depth() {
        assert!(!CallbackContext::is_active());

        {
            let _outer = CallbackContext::enter();
            assert_eq!(CallbackContext::depth(), 1);
            {
                let _inner = CallbackContext::enter();
                assert_eq!(CallbackContext::depth(), 2);
            }
            assert_eq!(CallbackContext::depth(), 1);
        }

        assert!(!CallbackContext::is_active());
    }

    #[test]
    fn context_survives_panics() {
        let result = std::panic::catch_unwind(|| {
            let _ctx = CallbackContext::enter();
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(!CallbackContext::is_active());
    }
}
