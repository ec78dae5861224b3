//! Execution contexts: the places queued observers are delivered to.
//!
//! The crate only needs two things from a context: accept a unit of work and
//! run it later on its own thread, and tell whether the calling thread is that
//! thread. [`EventLoop`](crate::EventLoop) is a ready-made implementation; any
//! other loop can plug in by implementing [`Executor`].
//!
//! A thread is *bound* to a context with [`enter`]. Observers remember the
//! binding of the thread that registered them.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::Error;

/// A unit of work posted to an execution context.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Posts `work` to run later on this context's thread, in submission order.
    fn submit(&self, work: Work) -> Result<(), Error>;

    /// Whether the calling thread is the thread this context runs work on.
    fn is_current(&self) -> bool;
}

pub type Context = Arc<dyn Executor>;

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// The context the calling thread is bound to, if any.
pub fn current() -> Option<Context> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Binds `context` to the calling thread until the returned guard is dropped.
///
/// Guards nest: dropping one restores whatever binding was active before it.
pub fn enter(context: Context) -> ContextGuard {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(context));
    ContextGuard {
        previous,
        _not_send: std::marker::PhantomData,
    }
}

/// Restores the previous thread binding on drop. Must be dropped on the thread
/// that created it.
#[must_use = "the binding is undone as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<Context>,
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("restores_binding", &self.previous.is_some())
            .finish()
    }
}
