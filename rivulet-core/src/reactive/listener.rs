//! Listener handles.
//!
//! Every subscription returns a handle that can deregister it. There are two
//! flavours:
//!
//! - [`Listener`] owns the subscription directly. Dropping it deregisters.
//! - [`ListenerHandle`] refers to a subscription owned by the process-wide
//!   keep-alive registry. It stays registered until [`ListenerHandle::unlisten`]
//!   is called, whether or not the handle itself is kept.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::runtime::Runtime;

/// Unique identifier for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

type Release = Box<dyn FnOnce() + Send>;

/// An owned subscription.
///
/// Releasing it (explicitly or by dropping) runs its release action exactly
/// once.
pub struct Listener {
    id: ListenerId,
    release: Mutex<Option<Release>>,
}

impl Listener {
    pub(crate) fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id: ListenerId::new(),
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// A listener that owns nothing.
    pub fn empty() -> Self {
        Self {
            id: ListenerId::new(),
            release: Mutex::new(None),
        }
    }

    /// Get the listener's unique ID.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Deregister now. Later calls do nothing.
    pub fn unlisten(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    /// Whether the subscription is still registered.
    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }

    /// Combine two listeners into one that releases both.
    pub fn append(self, other: Listener) -> Listener {
        Listener::new(move || {
            self.unlisten();
            other.unlisten();
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.unlisten();
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// A subscription owned by the keep-alive registry.
///
/// Dropping the handle does not deregister.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: ListenerId,
}

impl ListenerHandle {
    pub(crate) fn new(id: ListenerId) -> Self {
        Self { id }
    }

    /// Get the listener's unique ID.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Deregister and release the subscription. Returns `false` if it was
    /// already released.
    pub fn unlisten(&self) -> bool {
        Runtime::release(self.id)
    }

    /// Whether the subscription is still registered.
    pub fn is_active(&self) -> bool {
        Runtime::is_kept_alive(self.id)
    }
}
