//! Transactions
//!
//! A transaction is the unit of atomic propagation. Everything triggered by
//! one external `send` (or by one [`Transaction::run`] block) is computed and
//! committed together.
//!
//! # Phases
//!
//! Closing a transaction runs three phases:
//!
//! 1. **Prioritized.** Pop the lowest `(rank, sequence)` entry and run it,
//!    until the queue is empty. The sequence is a global counter, so ties
//!    on rank run in submission order. If a handler formed a link that
//!    bumped a rank, the queue is rebuilt from the retained entries before
//!    the next pop.
//!
//! 2. **Last.** Run the end-of-transaction actions in submission order.
//!    Cell commits, firing resets and deferred switch re-subscriptions
//!    happen here. If a last action queues prioritized work, phase 1 runs
//!    again.
//!
//! 3. **Post.** Run continuations in slot order. The detached slot comes
//!    first and runs with no transaction active. Child slot `n` runs inside
//!    a fresh transaction that is fully closed before slot `n + 1` starts.
//!
//! # Thread Safety
//!
//! A single re-entrant lock serializes all transaction activity across the
//! process. The active transaction for a call stack lives in a thread local,
//! so nested entry points reuse it and only the outermost one closes it.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, ReentrantMutex};

use super::node::Node;

type Action = Box<dyn FnOnce(&Transaction) + Send>;
type PostAction = Box<dyn FnOnce(Option<&Transaction>) + Send>;
type StartHook = Arc<dyn Fn() + Send + Sync>;

/// Global ordering for prioritized entries with equal rank.
static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

static TRANSACTION_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();
static START_HOOKS: OnceLock<Mutex<Vec<StartHook>>> = OnceLock::new();

fn transaction_lock() -> &'static ReentrantMutex<()> {
    TRANSACTION_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

fn start_hooks() -> &'static Mutex<Vec<StartHook>> {
    START_HOOKS.get_or_init(|| Mutex::new(Vec::new()))
}

thread_local! {
    static CURRENT: RefCell<Option<Transaction>> = const { RefCell::new(None) };
    static RUNNING_HOOKS: Cell<bool> = const { Cell::new(false) };
}

/// Installs a transaction as current and restores the previous one on drop.
struct CurrentScope {
    previous: Option<Transaction>,
}

impl CurrentScope {
    fn enter(trans: Option<Transaction>) -> Self {
        let previous = CURRENT.with(|c| c.replace(trans));
        Self { previous }
    }
}

impl Drop for CurrentScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|c| *c.borrow_mut() = previous);
    }
}

/// Clears the start-hook flag even if a hook panics.
struct HookGuard;

impl Drop for HookGuard {
    fn drop(&mut self) {
        RUNNING_HOOKS.with(|r| r.set(false));
    }
}

struct Entry {
    node: Node,
    action: Action,
}

#[derive(Default)]
struct TransactionState {
    queue: BinaryHeap<Reverse<(u64, u64)>>,
    entries: HashMap<u64, Entry>,
    to_regen: bool,
    last: Vec<Action>,
    post: BTreeMap<Option<usize>, PostAction>,
}

impl TransactionState {
    fn regenerate(&mut self) {
        self.to_regen = false;
        self.queue = self
            .entries
            .iter()
            .map(|(seq, entry)| Reverse((entry.node.rank(), *seq)))
            .collect();
        tracing::trace!(entries = self.entries.len(), "regenerated priority queue");
    }
}

/// Handle to an open transaction.
///
/// Internal operations receive the active transaction explicitly; user code
/// only ever sees the associated functions.
#[derive(Clone)]
pub struct Transaction {
    state: Arc<Mutex<TransactionState>>,
}

impl Transaction {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TransactionState::default())),
        }
    }

    /// Run `code` inside a transaction and return its result.
    ///
    /// Opens a new transaction only if none is active on this thread. All
    /// sends made inside `code` propagate as one atomic step.
    pub fn run<R>(code: impl FnOnce() -> R) -> R {
        Self::apply(|_| code())
    }

    /// [`Transaction::run`] for code with no result.
    pub fn run_void(code: impl FnOnce()) {
        Self::apply(|_| code())
    }

    /// Run `action` once the current transaction has fully closed, with no
    /// transaction active. Without an open transaction it runs right away.
    pub fn post(action: impl FnOnce() + Send + 'static) {
        Self::apply(|trans| trans.post_child(None, move |_| action()));
    }

    /// Register a hook that runs whenever a new outermost transaction
    /// starts. Transactions opened by the hooks themselves do not re-run
    /// them.
    pub fn on_start(hook: impl Fn() + Send + Sync + 'static) {
        start_hooks().lock().push(Arc::new(hook));
    }

    /// Whether a transaction is open on this thread.
    pub fn is_active() -> bool {
        CURRENT.with(|c| c.borrow().is_some())
    }

    pub(crate) fn current() -> Option<Transaction> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// Run `code` with the active transaction, opening and closing one if
    /// needed.
    ///
    /// A transaction opened here is closed even when `code` panics; the
    /// panic is re-raised once the close has finished.
    pub(crate) fn apply<R>(code: impl FnOnce(&Transaction) -> R) -> R {
        let _lock = transaction_lock().lock();
        if let Some(trans) = Self::current() {
            return code(&trans);
        }

        run_start_hooks();
        let trans = Transaction::new();
        let _scope = CurrentScope::enter(Some(trans.clone()));
        tracing::trace!("transaction opened");
        let result = panic::catch_unwind(AssertUnwindSafe(|| code(&trans)));
        trans.close();
        match result {
            Ok(result) => result,
            Err(payload) => {
                tracing::debug!("transaction closed after a panic");
                panic::resume_unwind(payload)
            }
        }
    }

    /// Queue `action` to run when the drain reaches `node`'s rank.
    pub(crate) fn prioritized(&self, node: &Node, action: impl FnOnce(&Transaction) + Send + 'static) {
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        state.queue.push(Reverse((node.rank(), seq)));
        state.entries.insert(
            seq,
            Entry {
                node: node.clone(),
                action: Box::new(action),
            },
        );
    }

    /// Queue an end-of-transaction action.
    pub(crate) fn last(&self, action: impl FnOnce(&Transaction) + Send + 'static) {
        self.state.lock().last.push(Box::new(action));
    }

    /// Queue a continuation for after this transaction closes.
    ///
    /// `None` is the detached slot; `Some(ix)` runs in its own child
    /// transaction. Actions for the same slot run in registration order.
    pub(crate) fn post_child(
        &self,
        slot: Option<usize>,
        action: impl FnOnce(Option<&Transaction>) + Send + 'static,
    ) {
        let mut state = self.state.lock();
        let action: PostAction = match state.post.remove(&slot) {
            Some(existing) => Box::new(move |trans| {
                existing(trans);
                action(trans);
            }),
            None => Box::new(action),
        };
        state.post.insert(slot, action);
    }

    /// Mark the queue stale after a rank change.
    pub(crate) fn request_regen(&self) {
        self.state.lock().to_regen = true;
    }

    fn next_prioritized(&self) -> Option<Action> {
        let mut state = self.state.lock();
        if state.to_regen {
            state.regenerate();
        }
        while let Some(Reverse((_, seq))) = state.queue.pop() {
            if let Some(entry) = state.entries.remove(&seq) {
                return Some(entry.action);
            }
        }
        None
    }

    fn take_last(&self) -> Vec<Action> {
        std::mem::take(&mut self.state.lock().last)
    }

    fn next_post(&self) -> Option<(Option<usize>, PostAction)> {
        self.state.lock().post.pop_first()
    }

    fn close(&self) {
        let mut prioritized = 0usize;
        loop {
            while let Some(action) = self.next_prioritized() {
                prioritized += 1;
                action(self);
            }
            let last = self.take_last();
            if last.is_empty() {
                break;
            }
            for action in last {
                action(self);
            }
        }

        while let Some((slot, action)) = self.next_post() {
            match slot {
                None => {
                    let _scope = CurrentScope::enter(None);
                    action(None);
                }
                Some(ix) => {
                    let child = Transaction::new();
                    let _scope = CurrentScope::enter(Some(child.clone()));
                    tracing::trace!(child = ix, "child transaction opened");
                    action(Some(&child));
                    child.close();
                }
            }
        }

        tracing::trace!(prioritized, "transaction closed");
    }
}

fn run_start_hooks() {
    if RUNNING_HOOKS.with(|r| r.replace(true)) {
        return;
    }
    let _guard = HookGuard;
    let hooks: Vec<StartHook> = start_hooks().lock().clone();
    for hook in hooks {
        hook();
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Transaction")
            .field("queued", &state.entries.len())
            .field("last", &state.last.len())
            .field("post", &state.post.len())
            .finish()
    }
}
