//! Deferred handles for the eventual outcome of asynchronous work.
//!
//! A [`Deferred`] is a cheap, cloneable reference to one shared outcome. The
//! producer settles it once with [`Deferred::resolve`] or [`Deferred::reject`]
//! (and may report progress with [`Deferred::notify`] before that); any number
//! of consumers observe it with [`Deferred::done`], [`Deferred::fail`] and
//! [`Deferred::progress`]. Observers registered after settlement fire right
//! away with the stored payload.
//!
//! Each observer carries a [`Dispatch`] policy that decides where it runs:
//! inline on the settling thread, queued onto the [`Context`] it was registered
//! from, or automatically chosen between the two.
//!
//! Handles compose with [`Deferred::then`] (chaining) and [`when()`]
//! (aggregation).
//!
//! # Examples
//!
//! ```
//! use deferred_out::Deferred;
//! use std::thread;
//!
//! let op = Deferred::<String>::new();
//! let doubled = op.then(|s: &String| Deferred::<usize>::resolved(s.len() * 2));
//!
//! let producer = op.clone();
//! thread::spawn(move || producer.resolve(String::from("🍓")))
//!     .join()
//!     .expect("The producer thread has panicked");
//!
//! assert_eq!(*doubled.wait().unwrap(), 8);
//! ```

pub mod context;
pub mod deferred;
pub mod dispatch;
pub mod event_loop;
pub mod settled;
mod then;
pub mod when;

use std::fmt;

pub use context::{Context, ContextGuard, Executor, Work};
pub use deferred::Deferred;
pub use dispatch::Dispatch;
pub use event_loop::{EventLoop, EventLoopBuilder};
pub use settled::Settled;
pub use when::{when, Watch};

/// Lifecycle of a deferred outcome. `Resolved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Resolved,
    Rejected,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Pending => write!(f, "pending"),
            State::Resolved => write!(f, "resolved"),
            State::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cannot settle or notify an already {state} deferred")]
    AlreadySettled { state: State },
    #[error("queued dispatch requires the calling thread to be bound to an execution context")]
    NoContext,
    #[error("the execution context no longer accepts work")]
    ContextClosed,
}

/// Aggregates deferreds of different payload types into one `Deferred<()>`.
///
/// ```
/// use deferred_out::{when, Deferred};
///
/// let a = Deferred::<i32>::new();
/// let b = Deferred::<String, String>::new();
/// let all = when!(a, b);
/// a.resolve(1);
/// b.resolve("two".into());
/// assert!(all.is_resolved());
/// ```
#[macro_export]
macro_rules! when {
    ($($input:expr),+ $(,)?) => {
        $crate::when([$(&$input as &dyn $crate::Watch),+])
    };
}
