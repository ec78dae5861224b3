use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::{trace, warn};

use crate::dispatch::{Dispatch, Once, Registry, Repeat, Route};
use crate::{Error, State};

/// A shared handle to the eventual outcome of some asynchronous work.
///
/// Clones alias the same outcome. The outcome lives as long as any handle, or
/// any observer closure holding a handle, is alive.
///
/// `T` is the success payload (also carried by progress notifications) and
/// `E` the rejection payload. Use tuples for multi-valued payloads.
///
/// Settling, notifying and registering on one deferred are serialized: a
/// thread that fires observers holds the deferred until its fan-out is done,
/// so an observer registered meanwhile from another thread fires after every
/// observer registered before it. Observers may call back into their own
/// deferred.
///
/// # Examples
///
/// ```
/// use deferred_out::Deferred;
/// use std::sync::mpsc::channel;
/// use std::thread;
///
/// let op = Deferred::<(i32, String)>::new();
/// let (tx, rx) = channel();
/// op.done(move |(n, s): &(i32, String)| tx.send(format!("{n} {s}")).unwrap());
///
/// let producer = op.clone();
/// let task = thread::spawn(move || producer.resolve((42, String::from("🍓"))));
/// task.join().expect("The producer thread has panicked");
///
/// assert_eq!(rx.recv().unwrap(), "42 🍓");
/// ```
pub struct Deferred<T, E = ()> {
    promise: Arc<ReentrantMutex<RefCell<Inner<T, E>>>>,
}

struct Inner<T, E> {
    outcome: Outcome<T, E>,
    observers: Registry<T, E>,
}

enum Outcome<T, E> {
    Pending,
    Resolved(Arc<T>),
    Rejected(Arc<E>),
}

impl<T, E> Inner<T, E> {
    /// Moves a pending outcome to its terminal state and hands back the
    /// observers that were waiting on it.
    fn settle(&mut self, outcome: Outcome<T, E>) -> Result<Registry<T, E>, Error> {
        match self.outcome.state() {
            State::Pending => {
                self.outcome = outcome;
                Ok(mem::replace(&mut self.observers, Registry::new()))
            }
            state => Err(Error::AlreadySettled { state }),
        }
    }
}

impl<T, E> Outcome<T, E> {
    fn state(&self) -> State {
        match self {
            Outcome::Pending => State::Pending,
            Outcome::Resolved(_) => State::Resolved,
            Outcome::Rejected(_) => State::Rejected,
        }
    }
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: Arc::clone(&self.promise),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.promise.lock();
        let inner = guard.borrow();
        f.debug_struct("Deferred")
            .field("state", &inner.outcome.state())
            .field("observers", &inner.observers)
            .finish()
    }
}

impl<T, E> Default for Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// A new pending deferred.
    pub fn new() -> Self {
        Self::with_outcome(Outcome::Pending)
    }

    /// A deferred that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self::with_outcome(Outcome::Resolved(Arc::new(value)))
    }

    /// A deferred that is already rejected with `err`.
    pub fn rejected(err: E) -> Self {
        Self::with_outcome(Outcome::Rejected(Arc::new(err)))
    }

    fn with_outcome(outcome: Outcome<T, E>) -> Self {
        Self {
            promise: Arc::new(ReentrantMutex::new(RefCell::new(Inner {
                outcome,
                observers: Registry::new(),
            }))),
        }
    }

    pub fn state(&self) -> State {
        self.promise.lock().borrow().outcome.state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == State::Resolved
    }

    pub fn is_rejected(&self) -> bool {
        self.state() == State::Rejected
    }

    /// Whether both handles refer to the same outcome.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.promise, &other.promise)
    }

    /// Resolves with `value` and fires every done observer in registration
    /// order.
    ///
    /// # Panics
    ///
    /// If the deferred is already resolved or rejected.
    pub fn resolve(&self, value: T) {
        if let Err(err) = self.try_resolve(value) {
            panic!("{err}");
        }
    }

    /// Like [`Deferred::resolve`], but reports a settled deferred as an error.
    pub fn try_resolve(&self, value: T) -> Result<(), Error> {
        self.try_resolve_shared(Arc::new(value))
    }

    pub(crate) fn try_resolve_shared(&self, value: Arc<T>) -> Result<(), Error> {
        let guard = self.promise.lock();
        let observers = guard
            .borrow_mut()
            .settle(Outcome::Resolved(Arc::clone(&value)))?;
        trace!(state = %State::Resolved, observers = observers.done.len(), "deferred settled");
        for observer in observers.done {
            observer.fire(Arc::clone(&value));
        }
        Ok(())
    }

    /// Rejects with `err` and fires every fail observer in registration order.
    ///
    /// # Panics
    ///
    /// If the deferred is already resolved or rejected.
    pub fn reject(&self, err: E) {
        if let Err(err) = self.try_reject(err) {
            panic!("{err}");
        }
    }

    /// Like [`Deferred::reject`], but reports a settled deferred as an error.
    pub fn try_reject(&self, err: E) -> Result<(), Error> {
        self.try_reject_shared(Arc::new(err))
    }

    pub(crate) fn try_reject_shared(&self, err: Arc<E>) -> Result<(), Error> {
        let guard = self.promise.lock();
        let observers = guard
            .borrow_mut()
            .settle(Outcome::Rejected(Arc::clone(&err)))?;
        trace!(state = %State::Rejected, observers = observers.fail.len(), "deferred settled");
        for observer in observers.fail {
            observer.fire(Arc::clone(&err));
        }
        Ok(())
    }

    /// Reports progress to every progress observer. Ignored (with a warning)
    /// once the deferred is settled.
    pub fn notify(&self, value: T) {
        if let Err(err) = self.try_notify(value) {
            warn!(error = %err, "ignoring notification");
        }
    }

    pub fn try_notify(&self, value: T) -> Result<(), Error> {
        self.try_notify_shared(Arc::new(value))
    }

    pub(crate) fn try_notify_shared(&self, value: Arc<T>) -> Result<(), Error> {
        let guard = self.promise.lock();
        let observers: Vec<Repeat<T>> = {
            let inner = guard.borrow();
            match inner.outcome.state() {
                State::Pending => inner.observers.progress.clone(),
                state => return Err(Error::AlreadySettled { state }),
            }
        };
        for observer in &observers {
            // A progress observer may settle the deferred from this thread.
            if guard.borrow().outcome.state() != State::Pending {
                break;
            }
            observer.fire(Arc::clone(&value));
        }
        Ok(())
    }

    /// Calls `callback` with the result once resolved, using [`Dispatch::Auto`].
    ///
    /// Registering on an already resolved deferred fires right away.
    pub fn done<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.done_with(Dispatch::Auto, callback)
    }

    /// # Panics
    ///
    /// If `dispatch` is [`Dispatch::Queued`] and the calling thread is not
    /// bound to an execution context.
    pub fn done_with<F>(&self, dispatch: Dispatch, callback: F) -> &Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.on_done(Route::capture_or_panic(dispatch), move |value| {
            callback(value.as_ref())
        });
        self
    }

    /// Calls `callback` with the rejection once rejected, using
    /// [`Dispatch::Auto`].
    pub fn fail<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&E) + Send + 'static,
    {
        self.fail_with(Dispatch::Auto, callback)
    }

    pub fn fail_with<F>(&self, dispatch: Dispatch, callback: F) -> &Self
    where
        F: FnOnce(&E) + Send + 'static,
    {
        self.on_fail(Route::capture_or_panic(dispatch), move |err| {
            callback(err.as_ref())
        });
        self
    }

    /// Calls `callback` for each [`Deferred::notify`] issued while pending.
    pub fn progress<F>(&self, callback: F) -> &Self
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.progress_with(Dispatch::Auto, callback)
    }

    pub fn progress_with<F>(&self, dispatch: Dispatch, mut callback: F) -> &Self
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.on_progress(Route::capture_or_panic(dispatch), move |value| {
            callback(value.as_ref())
        });
        self
    }

    pub(crate) fn on_done<F>(&self, route: Route, callback: F)
    where
        F: FnOnce(&Arc<T>) + Send + 'static,
    {
        let observer = Once::new(route, callback);
        let guard = self.promise.lock();
        let value = {
            let mut inner = guard.borrow_mut();
            let inner = &mut *inner;
            match &inner.outcome {
                Outcome::Pending => {
                    inner.observers.done.push(observer);
                    return;
                }
                Outcome::Resolved(value) => Arc::clone(value),
                Outcome::Rejected(_) => return,
            }
        };
        observer.fire(value);
    }

    pub(crate) fn on_fail<F>(&self, route: Route, callback: F)
    where
        F: FnOnce(&Arc<E>) + Send + 'static,
    {
        let observer = Once::new(route, callback);
        let guard = self.promise.lock();
        let err = {
            let mut inner = guard.borrow_mut();
            let inner = &mut *inner;
            match &inner.outcome {
                Outcome::Pending => {
                    inner.observers.fail.push(observer);
                    return;
                }
                Outcome::Rejected(err) => Arc::clone(err),
                Outcome::Resolved(_) => return,
            }
        };
        observer.fire(err);
    }

    pub(crate) fn on_progress<F>(&self, route: Route, callback: F)
    where
        F: FnMut(&Arc<T>) + Send + 'static,
    {
        let guard = self.promise.lock();
        let mut inner = guard.borrow_mut();
        if let Outcome::Pending = inner.outcome {
            inner.observers.progress.push(Repeat::new(route, callback));
        }
    }
}
