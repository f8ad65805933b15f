//! Rivulet Core
//!
//! A transactional functional reactive programming engine. It implements:
//!
//! - Event streams and time-varying cells
//! - Glitch-free propagation ordered by node rank
//! - Atomic transactions with end-of-transaction commits
//! - Forward references for cyclic definitions
//!
//! # Architecture
//!
//! The crate is organized into three modules:
//!
//! - `graph`: ranked nodes and the transaction scheduler
//! - `reactive`: streams, cells, sinks, loops and listeners
//! - `error`: usage errors
//!
//! # Example
//!
//! ```rust
//! use rivulet_core::{CellSink, StreamSink, Transaction};
//!
//! let clicks = StreamSink::<i32>::new();
//! let total = clicks.accum(0, |n: &i32, acc: &i32| acc + n);
//! let step = CellSink::new(1);
//!
//! let l = total.lift(&step, |t: &i32, s: &i32| t * s).listen(|x| println!("{x}"));
//!
//! Transaction::run_void(|| {
//!     clicks.send(5);
//!     step.send(2);
//! });
//! // prints 0, then 10
//! l.unlisten();
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{FrpError, Result};
pub use graph::Transaction;
pub use reactive::operational;
pub use reactive::{
    Cell, CellLoop, CellSink, Lambda, Lazy, Listener, ListenerHandle, ListenerId, Stream,
    StreamLoop, StreamSink,
};
