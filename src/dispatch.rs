//! Dispatch policies and the observer lists they route.
//!
//! Every observer is stored together with a [`Route`] resolved at
//! registration time, so one deferred can serve observers that live on
//! different execution contexts.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{trace, warn};

use crate::context::{self, Context};
use crate::Error;

/// Where an observer runs when its event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dispatch {
    /// Inline, on the thread that resolves, rejects or notifies.
    Direct,
    /// Posted to the context the observer was registered from.
    Queued,
    /// Inline when fired from the registering context, queued to it otherwise.
    #[default]
    Auto,
}

/// A dispatch policy bound to the registering thread's context.
#[derive(Clone)]
pub(crate) enum Route {
    Inline,
    Queued(Context),
    Auto(Context),
}

impl Route {
    pub(crate) fn capture(dispatch: Dispatch) -> Result<Route, Error> {
        let home = context::current();
        match (dispatch, home) {
            (Dispatch::Direct, _) | (Dispatch::Auto, None) => Ok(Route::Inline),
            (Dispatch::Auto, Some(home)) => Ok(Route::Auto(home)),
            (Dispatch::Queued, Some(home)) => Ok(Route::Queued(home)),
            (Dispatch::Queued, None) => Err(Error::NoContext),
        }
    }

    /// Like [`Route::capture`], but a missing context is a usage error.
    pub(crate) fn capture_or_panic(dispatch: Dispatch) -> Route {
        match Route::capture(dispatch) {
            Ok(route) => route,
            Err(err) => panic!("{err}"),
        }
    }

    pub(crate) fn deliver<W>(&self, work: W)
    where
        W: FnOnce() + Send + 'static,
    {
        let home = match self {
            Route::Inline => return work(),
            Route::Auto(home) if home.is_current() => return work(),
            Route::Auto(home) | Route::Queued(home) => home,
        };
        trace!("posting observer to its execution context");
        if let Err(err) = home.submit(Box::new(work)) {
            warn!(error = %err, "dropping observer, its execution context refused the work");
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Inline => write!(f, "Inline"),
            Route::Queued(_) => write!(f, "Queued"),
            Route::Auto(_) => write!(f, "Auto"),
        }
    }
}

/// An observer that fires at most once (done and fail).
pub(crate) struct Once<T> {
    route: Route,
    callback: Box<dyn FnOnce(&Arc<T>) + Send>,
}

impl<T: Send + Sync + 'static> Once<T> {
    pub(crate) fn new<F>(route: Route, callback: F) -> Self
    where
        F: FnOnce(&Arc<T>) + Send + 'static,
    {
        Once {
            route,
            callback: Box::new(callback),
        }
    }

    pub(crate) fn fire(self, value: Arc<T>) {
        let callback = self.callback;
        self.route.deliver(move || callback(&value));
    }
}

/// An observer that fires on every notification (progress).
pub(crate) struct Repeat<T> {
    route: Route,
    callback: Arc<Mutex<dyn FnMut(&Arc<T>) + Send>>,
}

impl<T: Send + Sync + 'static> Repeat<T> {
    pub(crate) fn new<F>(route: Route, callback: F) -> Self
    where
        F: FnMut(&Arc<T>) + Send + 'static,
    {
        Repeat {
            route,
            callback: Arc::new(Mutex::new(callback)),
        }
    }

    pub(crate) fn fire(&self, value: Arc<T>) {
        let callback = Arc::clone(&self.callback);
        self.route.deliver(move || {
            let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut *callback)(&value)
        });
    }
}

impl<T> Clone for Repeat<T> {
    fn clone(&self) -> Self {
        Repeat {
            route: self.route.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Per-event observer lists. Append-only; firing order is insertion order.
pub(crate) struct Registry<T, E> {
    pub(crate) done: Vec<Once<T>>,
    pub(crate) fail: Vec<Once<E>>,
    pub(crate) progress: Vec<Repeat<T>>,
}

impl<T, E> Registry<T, E> {
    pub(crate) fn new() -> Self {
        Registry {
            done: Vec::new(),
            fail: Vec::new(),
            progress: Vec::new(),
        }
    }
}

impl<T, E> fmt::Debug for Registry<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("done", &self.done.len())
            .field("fail", &self.fail.len())
            .field("progress", &self.progress.len())
            .finish()
    }
}
