use tracing::debug;

use crate::dispatch::{Dispatch, Route};
use crate::Deferred;

impl<T, E> Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Chains `transform` onto the result of this deferred.
    ///
    /// Returns a pending deferred right away. Once this deferred resolves,
    /// `transform` is called with the result and the deferred it returns is
    /// relayed into the derived one: its resolution, rejection and progress
    /// notifications all pass through. If this deferred is rejected instead,
    /// `transform` is never called and the derived deferred is rejected with
    /// `F::default()`.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred_out::Deferred;
    ///
    /// let op = Deferred::<i32>::new();
    /// let text = op.then(|n: &i32| Deferred::<String>::resolved(format!("#{n}")));
    /// op.resolve(7);
    /// assert_eq!(text.wait().unwrap().as_str(), "#7");
    /// ```
    pub fn then<U, F, G>(&self, transform: G) -> Deferred<U, F>
    where
        U: Send + Sync + 'static,
        F: Default + Send + Sync + 'static,
        G: FnOnce(&T) -> Deferred<U, F> + Send + 'static,
    {
        self.chain(Dispatch::Auto, transform, None::<fn()>)
    }

    /// Like [`Deferred::then`], with `transform` delivered per `dispatch`.
    pub fn then_with<U, F, G>(&self, dispatch: Dispatch, transform: G) -> Deferred<U, F>
    where
        U: Send + Sync + 'static,
        F: Default + Send + Sync + 'static,
        G: FnOnce(&T) -> Deferred<U, F> + Send + 'static,
    {
        self.chain(dispatch, transform, None::<fn()>)
    }

    /// Like [`Deferred::then_with`], and calls `on_fail` when this deferred is
    /// rejected, before the rejection reaches the derived deferred.
    pub fn then_or_else<U, F, G, H>(
        &self,
        dispatch: Dispatch,
        transform: G,
        on_fail: H,
    ) -> Deferred<U, F>
    where
        U: Send + Sync + 'static,
        F: Default + Send + Sync + 'static,
        G: FnOnce(&T) -> Deferred<U, F> + Send + 'static,
        H: FnOnce() + Send + 'static,
    {
        self.chain(dispatch, transform, Some(on_fail))
    }

    fn chain<U, F, G, H>(&self, dispatch: Dispatch, transform: G, on_fail: Option<H>) -> Deferred<U, F>
    where
        U: Send + Sync + 'static,
        F: Default + Send + Sync + 'static,
        G: FnOnce(&T) -> Deferred<U, F> + Send + 'static,
        H: FnOnce() + Send + 'static,
    {
        let derived = Deferred::<U, F>::new();
        let route = Route::capture_or_panic(dispatch);

        if let Some(on_fail) = on_fail {
            self.on_fail(route.clone(), move |_| on_fail());
        }
        let target = derived.clone();
        self.on_fail(route.clone(), move |_| {
            if let Err(err) = target.try_reject(F::default()) {
                debug!(error = %err, "derived deferred settled before its parent was rejected");
            }
        });

        let target = derived.clone();
        self.on_done(route, move |value| {
            let inner = transform(value.as_ref());
            relay(&inner, target);
        });

        derived
    }
}

/// Forwards every event of `source` into `target`.
fn relay<U, F>(source: &Deferred<U, F>, target: Deferred<U, F>)
where
    U: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    let to = target.clone();
    source.on_progress(Route::Inline, move |value| {
        if let Err(err) = to.try_notify_shared(value.clone()) {
            debug!(error = %err, "dropping relayed notification");
        }
    });
    let to = target.clone();
    source.on_fail(Route::Inline, move |err| {
        if let Err(err) = to.try_reject_shared(err.clone()) {
            debug!(error = %err, "dropping relayed rejection");
        }
    });
    source.on_done(Route::Inline, move |value| {
        if let Err(err) = target.try_resolve_shared(value.clone()) {
            debug!(error = %err, "dropping relayed resolution");
        }
    });
}
