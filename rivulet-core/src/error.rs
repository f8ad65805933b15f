//! Error Types
//!
//! Usage errors raised by the engine. Every one of these is fatal to the
//! call that produced it, never to the transaction machinery: a failed
//! `try_send` leaves the current transaction intact and the graph usable.
//!
//! Failures inside listener callbacks are not represented here. Those are
//! caught where the callback is invoked and reported through `tracing`.

use thiserror::Error;

/// Errors returned by the fallible entry points (`try_send`, `try_sample`,
/// loop construction and resolution).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrpError {
    /// A `CellLoop` was sampled before `loop_` was called on it.
    #[error("cell loop sampled before it was looped")]
    LoopNotResolved,

    /// `loop_` was called a second time on the same placeholder.
    #[error("loop placeholder looped more than once")]
    LoopResolvedTwice,

    /// A `StreamLoop` or `CellLoop` was constructed with no transaction open.
    #[error("stream and cell loops must be created inside an explicit transaction")]
    LoopOutsideTransaction,

    /// A sink was pushed to from inside a listener callback.
    #[error("send() is not allowed inside a listener callback")]
    SendInCallback,

    /// A sink without a combining function was sent to twice in one
    /// transaction.
    #[error(
        "send() called more than once in a single transaction; \
         construct the sink with a coalescer to combine simultaneous values"
    )]
    MultipleSendsInTransaction,
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FrpError>;
