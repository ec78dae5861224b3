//! Waiting on a deferred, either as a `Future` or by blocking the thread.
//!
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};

use crate::dispatch::Route;
use crate::Deferred;

/// Resolves to the outcome of a [`Deferred`] once it settles: `Ok` with the
/// result or `Err` with the rejection.
///
/// # Examples
///
/// ```
/// use deferred_out::Deferred;
/// use futures::executor::block_on;
/// use std::thread;
///
/// let op = Deferred::<String, String>::new();
/// let waiter = op.settled();
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received {:?}", waiter.await);
/// }));
/// op.resolve("Hi".into());
/// task1.join().expect("The task1 thread has panicked.");
/// ```
#[derive(Debug)]
pub struct Settled<T, E> {
    promise: Arc<Shared<T, E>>,
}

#[derive(Debug)]
struct Shared<T, E> {
    inner: Mutex<Inner<T, E>>,
    ready: Condvar,
}

#[derive(Debug)]
struct Inner<T, E> {
    value: Option<Result<Arc<T>, Arc<E>>>,
    waker: Option<Waker>,
}

impl<T, E> Shared<T, E> {
    fn fill(&self, value: Result<Arc<T>, Arc<E>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.value = Some(value);
        if let Some(waker) = inner.waker.take() {
            waker.wake()
        }
        self.ready.notify_all();
    }
}

impl<T, E> Settled<T, E> {
    /// Blocks the calling thread until the deferred settles.
    ///
    /// Never returns if the deferred is never settled.
    pub fn wait(self) -> Result<Arc<T>, Arc<E>> {
        let mut inner = self.promise.inner.lock().unwrap();
        loop {
            match inner.value {
                Some(ref value) => return value.clone(),
                None => inner = self.promise.ready.wait(inner).unwrap(),
            }
        }
    }
}

impl<T, E> Future for Settled<T, E> {
    type Output = Result<Arc<T>, Arc<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.promise.inner.lock().unwrap();
        match inner.value {
            Some(ref value) => Poll::Ready(value.clone()),
            None => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// A future that completes when this deferred settles.
    pub fn settled(&self) -> Settled<T, E> {
        let promise = Arc::new(Shared {
            inner: Mutex::new(Inner {
                value: None,
                waker: None,
            }),
            ready: Condvar::new(),
        });
        let on_done = Arc::clone(&promise);
        self.on_done(Route::Inline, move |value| on_done.fill(Ok(Arc::clone(value))));
        let on_fail = Arc::clone(&promise);
        self.on_fail(Route::Inline, move |err| on_fail.fill(Err(Arc::clone(err))));
        Settled { promise }
    }

    /// Blocks the calling thread until this deferred settles.
    pub fn wait(&self) -> Result<Arc<T>, Arc<E>> {
        self.settled().wait()
    }
}
