//! Aggregation over several deferreds.
//!
//! [`when`] settles one payload-less deferred from many inputs: it resolves
//! once every input has resolved and rejects as soon as any input rejects.
//! The inputs' payloads are not carried over. Inputs of different payload
//! types are aggregated through the [`Watch`] trait, usually via the
//! [`when!`](crate::when!) macro.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::dispatch::{Dispatch, Route};
use crate::Deferred;

/// Payload-less view of a deferred: observe that it resolved or rejected
/// without caring about the values.
pub trait Watch {
    fn watch_done(&self, dispatch: Dispatch, callback: Box<dyn FnOnce() + Send>);
    fn watch_fail(&self, dispatch: Dispatch, callback: Box<dyn FnOnce() + Send>);
}

impl<T, E> Watch for Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn watch_done(&self, dispatch: Dispatch, callback: Box<dyn FnOnce() + Send>) {
        self.on_done(Route::capture_or_panic(dispatch), move |_| callback());
    }

    fn watch_fail(&self, dispatch: Dispatch, callback: Box<dyn FnOnce() + Send>) {
        self.on_fail(Route::capture_or_panic(dispatch), move |_| callback());
    }
}

impl<W: Watch + ?Sized> Watch for &W {
    fn watch_done(&self, dispatch: Dispatch, callback: Box<dyn FnOnce() + Send>) {
        (**self).watch_done(dispatch, callback)
    }

    fn watch_fail(&self, dispatch: Dispatch, callback: Box<dyn FnOnce() + Send>) {
        (**self).watch_fail(dispatch, callback)
    }
}

impl<W: Watch + ?Sized> Watch for Box<W> {
    fn watch_done(&self, dispatch: Dispatch, callback: Box<dyn FnOnce() + Send>) {
        (**self).watch_done(dispatch, callback)
    }

    fn watch_fail(&self, dispatch: Dispatch, callback: Box<dyn FnOnce() + Send>) {
        (**self).watch_fail(dispatch, callback)
    }
}

/// Returns a deferred that resolves once all `inputs` have resolved, or
/// rejects as soon as one of them rejects.
///
/// Inputs that are already settled are counted immediately, so aggregating
/// only resolved inputs yields a resolved deferred. An empty input resolves
/// immediately as well.
///
/// # Examples
///
/// ```
/// use deferred_out::{when, Deferred};
/// use std::thread;
///
/// let ops: Vec<Deferred<usize>> = (0..3).map(|_| Deferred::new()).collect();
/// let all = when(&ops);
/// let tasks: Vec<_> = ops
///     .iter()
///     .cloned()
///     .enumerate()
///     .map(|(i, op)| thread::spawn(move || op.resolve(i)))
///     .collect();
/// for task in tasks {
///     task.join().expect("A producer thread has panicked");
/// }
/// assert!(all.wait().is_ok());
/// ```
pub fn when<I>(inputs: I) -> Deferred<()>
where
    I: IntoIterator,
    I::Item: Watch,
{
    let inputs: Vec<I::Item> = inputs.into_iter().collect();
    let aggregate = Deferred::<()>::new();
    let total = inputs.len();
    trace!(inputs = total, "aggregating deferreds");
    if total == 0 {
        aggregate.resolve(());
        return aggregate;
    }

    let resolved = Arc::new(AtomicUsize::new(0));
    for input in &inputs {
        let count = Arc::clone(&resolved);
        let target = aggregate.clone();
        input.watch_done(
            Dispatch::Auto,
            Box::new(move || {
                if count.fetch_add(1, Ordering::AcqRel) + 1 == total {
                    if let Err(err) = target.try_resolve(()) {
                        debug!(error = %err, "aggregate settled before its last input resolved");
                    }
                }
            }),
        );
        let target = aggregate.clone();
        input.watch_fail(
            Dispatch::Auto,
            Box::new(move || {
                // Only the first rejection lands; later ones find it settled.
                if let Err(err) = target.try_reject(()) {
                    debug!(error = %err, "ignoring rejection of a settled aggregate");
                }
            }),
        );
    }
    aggregate
}
