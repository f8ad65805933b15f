//! Keep-Alive Registry
//!
//! The graph only holds handlers weakly. A plain [`Listener`] keeps its own
//! subscription alive for as long as it exists, which is not what most
//! callers want from `listen`: they expect the subscription to last until
//! they say otherwise.
//!
//! # How It Works
//!
//! 1. `listen` creates a [`Listener`] and hands it to [`Runtime::keep_alive`].
//!
//! 2. The runtime stores it in a process-wide map keyed by listener ID and
//!    returns a [`ListenerHandle`] carrying only that ID.
//!
//! 3. [`ListenerHandle::unlisten`] removes the entry. The removed listener is
//!    released after the map's shard lock has been dropped, so a release that
//!    cascades into further deregistrations never re-enters the map while it
//!    is locked.
//!
//! [`ListenerHandle::unlisten`]: super::ListenerHandle::unlisten

use std::sync::OnceLock;

use dashmap::DashMap;

use super::listener::{Listener, ListenerHandle, ListenerId};

/// The global listener registry.
pub struct Runtime;

static KEEP_ALIVE: OnceLock<DashMap<ListenerId, Listener>> = OnceLock::new();

fn registry() -> &'static DashMap<ListenerId, Listener> {
    KEEP_ALIVE.get_or_init(DashMap::new)
}

impl Runtime {
    /// Take ownership of `listener` until its handle is unlistened.
    pub fn keep_alive(listener: Listener) -> ListenerHandle {
        let id = listener.id();
        registry().insert(id, listener);
        tracing::trace!(listener = ?id, "listener kept alive");
        ListenerHandle::new(id)
    }

    /// Release a kept-alive listener. Returns `false` if it was not
    /// registered.
    pub fn release(id: ListenerId) -> bool {
        let removed = registry().remove(&id);
        match removed {
            Some((_, listener)) => {
                listener.unlisten();
                tracing::trace!(listener = ?id, "listener released");
                true
            }
            None => false,
        }
    }

    /// Whether `id` is currently held by the registry.
    pub fn is_kept_alive(id: ListenerId) -> bool {
        registry().contains_key(&id)
    }

    /// Number of listeners currently held.
    pub fn kept_alive_count() -> usize {
        registry().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn registry_owns_listener_until_released() {
        let released = Arc::new(AtomicBool::new(false));
        let r = released.clone();
        let handle = Runtime::keep_alive(Listener::new(move || r.store(true, Ordering::SeqCst)));

        assert!(handle.is_active());
        assert!(!released.load(Ordering::SeqCst));

        assert!(handle.unlisten());
        assert!(released.load(Ordering::SeqCst));
        assert!(!handle.is_active());
        assert!(!handle.unlisten());
    }

    #[test]
    fn dropping_handle_keeps_listener() {
        let released = Arc::new(AtomicBool::new(false));
        let r = released.clone();
        let handle = Runtime::keep_alive(Listener::new(move || r.store(true, Ordering::SeqCst)));
        let id = handle.id();
        drop(handle);

        assert!(Runtime::is_kept_alive(id));
        assert!(Runtime::release(id));
        assert!(released.load(Ordering::SeqCst));
    }
}
