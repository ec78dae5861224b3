//! A thread-affine execution context.
//!
//! [`EventLoop`] owns one OS thread that runs posted work in submission
//! order. The thread is bound to the loop's [`Context`] for its whole life, so
//! observers registered from inside posted work default to being delivered
//! back onto the loop.
//!
//! When the [`EventLoop`] is dropped, work already posted is drained, the
//! thread is joined, and a panic on the loop thread is forwarded to the
//! dropping thread. Posting after that fails with [`Error::ContextClosed`].

use std::io;
use std::panic::resume_unwind;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::Sender;
use tracing::debug;

use crate::context::{self, Context, Executor, Work};
use crate::Error;

/// Configures and spawns an [`EventLoop`].
#[derive(Debug, Clone, Default)]
pub struct EventLoopBuilder {
    name: Option<String>,
    capacity: Option<usize>,
}

impl EventLoopBuilder {
    /// Sets the name of the loop thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Bounds the queue of pending work.
    ///
    /// Unbounded by default. With a bound, posting blocks while the queue is
    /// full; work running on the loop must then not post to its own loop.
    pub fn capacity(self, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..self
        }
    }

    pub fn spawn(self) -> io::Result<EventLoop> {
        let (sender, receiver) = match self.capacity {
            Some(capacity) => crossbeam_channel::bounded::<Work>(capacity),
            None => crossbeam_channel::unbounded::<Work>(),
        };
        let handle = Arc::new(Handle {
            sender: Mutex::new(Some(sender)),
            thread: OnceLock::new(),
        });

        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        let home = Arc::clone(&handle);
        let name = self.name.unwrap_or_else(|| String::from("event-loop"));
        let thread = builder.spawn(move || {
            let _ = home.thread.set(thread::current().id());
            let _guard = context::enter(home);
            debug!(name = %name, "event loop starting");
            for work in receiver {
                work();
            }
            debug!(name = %name, "event loop exiting");
        })?;

        Ok(EventLoop {
            handle,
            thread: Some(thread),
        })
    }
}

/// The [`Executor`] half of an [`EventLoop`], shared with observers.
struct Handle {
    sender: Mutex<Option<Sender<Work>>>,
    thread: OnceLock<ThreadId>,
}

impl Executor for Handle {
    fn submit(&self, work: Work) -> Result<(), Error> {
        let sender = self.sender.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(work).map_err(|_| Error::ContextClosed),
            None => Err(Error::ContextClosed),
        }
    }

    fn is_current(&self) -> bool {
        self.thread.get() == Some(&thread::current().id())
    }
}

/// A worker thread that runs posted work in order.
///
/// # Examples
///
/// ```
/// use deferred_out::{Deferred, Dispatch, EventLoop};
/// use std::sync::mpsc::channel;
/// use std::thread;
///
/// let event_loop = EventLoop::builder().name("ui").spawn().unwrap();
/// let op = Deferred::<u32>::new();
/// let (tx, rx) = channel();
///
/// let consumer = op.clone();
/// event_loop.post(move || {
///     consumer.done_with(Dispatch::Queued, move |v: &u32| {
///         let name = thread::current().name().map(String::from);
///         tx.send((*v, name)).unwrap();
///     });
/// }).unwrap();
///
/// event_loop.post({
///     let op = op.clone();
///     move || {
///         thread::spawn(move || op.resolve(5));
///     }
/// }).unwrap();
/// assert_eq!(rx.recv().unwrap(), (5, Some(String::from("ui"))));
/// ```
pub struct EventLoop {
    handle: Arc<Handle>,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder::default()
    }

    /// Spawns an unnamed loop with an unbounded queue.
    pub fn new() -> io::Result<Self> {
        Self::builder().spawn()
    }

    /// The loop as an execution context, for [`context::enter`] or for
    /// comparing against [`context::current`].
    pub fn context(&self) -> Context {
        Arc::clone(&self.handle) as Context
    }

    /// Posts `work` to run on the loop thread.
    pub fn post<W>(&self, work: W) -> Result<(), Error>
    where
        W: FnOnce() + Send + 'static,
    {
        self.handle.submit(Box::new(work))
    }

    /// Whether the calling thread is the loop thread.
    pub fn is_current(&self) -> bool {
        self.handle.is_current()
    }

    fn wait_for_exit(&mut self) {
        if let Some(thread) = self.thread.take() {
            if let Err(payload) = thread.join() {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // Disconnecting the channel lets the thread drain and exit.
        drop(self.handle.sender.lock().unwrap().take());
        if self.is_current() {
            // Dropped by its own work; the thread exits once that returns.
            debug!("event loop dropped on its own thread, not joining");
            return;
        }
        self.wait_for_exit();
    }
}
