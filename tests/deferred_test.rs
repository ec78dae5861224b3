#[cfg(test)]
mod tests {
    use deferred_out::{context, when, Deferred, Dispatch, EventLoop, State};
    use futures::executor::block_on;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::{Arc, Mutex};
    use std::{thread, time::Duration};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn thread_name() -> Option<String> {
        thread::current().name().map(String::from)
    }

    #[test]
    fn test_resolve_fires_once_and_second_resolve_is_fatal() {
        init_tracing();
        let s = Deferred::<i32>::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        s.done(move |v: &i32| sink.lock().unwrap().push(*v));
        s.resolve(42);
        assert!(catch_unwind(AssertUnwindSafe(|| s.resolve(7))).is_err());
        assert_eq!(*calls.lock().unwrap(), vec![42]);
        assert_eq!(s.state(), State::Resolved);
    }

    #[test]
    fn test_when_with_one_input_already_resolved() {
        let a = Deferred::<()>::resolved(());
        let b = Deferred::<()>::new();
        let all = when([&a, &b]);
        assert!(all.is_pending());
        let producer = b.clone();
        thread::spawn(move || producer.resolve(()))
            .join()
            .expect("The producer thread has panicked");
        assert!(all.is_resolved());
    }

    #[test]
    fn test_when_rejects_before_pending_input_settles() {
        let a = Deferred::<u8, String>::new();
        let b = Deferred::<String>::new();
        let all = deferred_out::when!(a, b);
        let failures = Arc::new(AtomicUsize::new(0));
        let count = failures.clone();
        all.fail(move |_: &()| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        a.reject("💥".into());
        assert!(all.is_rejected());
        b.resolve("late".into());
        assert!(all.is_rejected());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_queued_observers_run_on_their_loop_in_order() {
        init_tracing();
        let event_loop = EventLoop::builder().name("consumer").spawn().unwrap();
        let op = Deferred::<u32>::new();
        let (tx, rx) = channel();
        let (registered_tx, registered_rx) = channel();

        let consumer = op.clone();
        event_loop
            .post(move || {
                let progress_tx = tx.clone();
                consumer
                    .progress_with(Dispatch::Queued, move |v: &u32| {
                        progress_tx.send(("progress", *v, thread_name())).unwrap()
                    })
                    .done_with(Dispatch::Queued, move |v: &u32| {
                        tx.send(("done", *v, thread_name())).unwrap()
                    });
                registered_tx.send(()).unwrap();
            })
            .unwrap();
        registered_rx.recv_timeout(TIMEOUT).unwrap();

        let producer = op.clone();
        thread::spawn(move || {
            producer.notify(1);
            producer.notify(2);
            producer.resolve(3);
        })
        .join()
        .expect("The producer thread has panicked");

        let consumer_name = Some(String::from("consumer"));
        let received: Vec<_> = (0..3).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
        assert_eq!(
            received,
            vec![
                ("progress", 1, consumer_name.clone()),
                ("progress", 2, consumer_name.clone()),
                ("done", 3, consumer_name),
            ]
        );
    }

    #[test]
    fn test_queued_observer_on_settled_deferred_runs_after_current_work() {
        let event_loop = EventLoop::builder().name("late").spawn().unwrap();
        let op = Deferred::<u32>::resolved(4);
        let (tx, rx) = channel();

        event_loop
            .post(move || {
                let observer_tx = tx.clone();
                op.done_with(Dispatch::Queued, move |v: &u32| {
                    observer_tx
                        .send(format!("done:{v}@{}", thread_name().unwrap()))
                        .unwrap()
                });
                tx.send(String::from("registered")).unwrap();
            })
            .unwrap();

        let received: Vec<String> = (0..2).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
        assert_eq!(received, vec!["registered", "done:4@late"]);
    }

    #[test]
    fn test_late_registration_from_a_loop_waits_for_fan_out() {
        let event_loop = EventLoop::builder().name("registrar").spawn().unwrap();
        let op = Deferred::<u32>::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (started_tx, started_rx) = channel();

        for tag in ["o1", "o2"] {
            let sink = order.clone();
            let started_tx = started_tx.clone();
            op.done_with(Dispatch::Direct, move |_: &u32| {
                sink.lock().unwrap().push(tag);
                if tag == "o1" {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(100));
                }
            });
        }

        let producer = op.clone();
        let settle = thread::spawn(move || producer.resolve(1));
        started_rx.recv_timeout(TIMEOUT).unwrap();

        let (tx, rx) = channel();
        let consumer = op.clone();
        let sink = order.clone();
        event_loop
            .post(move || {
                consumer.done(move |_: &u32| {
                    sink.lock().unwrap().push("o3");
                    tx.send(()).unwrap();
                });
            })
            .unwrap();
        rx.recv_timeout(TIMEOUT).unwrap();
        settle.join().expect("The producer thread has panicked");

        assert_eq!(*order.lock().unwrap(), vec!["o1", "o2", "o3"]);
    }

    #[test]
    fn test_auto_dispatch_follows_the_registering_loop() {
        let event_loop = EventLoop::builder().name("home").spawn().unwrap();
        let op = Deferred::<()>::new();
        let (tx, rx) = channel();
        let (registered_tx, registered_rx) = channel();

        let consumer = op.clone();
        event_loop
            .post(move || {
                consumer.done(move |_: &()| tx.send(thread_name()).unwrap());
                registered_tx.send(()).unwrap();
            })
            .unwrap();
        registered_rx.recv_timeout(TIMEOUT).unwrap();

        let producer = op.clone();
        thread::Builder::new()
            .name("producer".into())
            .spawn(move || producer.resolve(()))
            .unwrap()
            .join()
            .expect("The producer thread has panicked");
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Some(String::from("home")));
    }

    #[test]
    fn test_auto_dispatch_is_inline_on_the_registering_loop() {
        let event_loop = EventLoop::new().unwrap();
        let (tx, rx) = channel();
        event_loop
            .post(move || {
                let op = Deferred::<u8>::new();
                let fired = Arc::new(AtomicUsize::new(0));
                let count = fired.clone();
                op.done(move |_: &u8| {
                    count.fetch_add(1, Ordering::SeqCst);
                });
                op.resolve(1);
                tx.send(fired.load(Ordering::SeqCst)).unwrap();
            })
            .unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 1);
    }

    #[test]
    fn test_direct_dispatch_runs_on_the_settling_thread() {
        let event_loop = EventLoop::builder().name("registrar").spawn().unwrap();
        let op = Deferred::<()>::new();
        let (tx, rx) = channel();
        let (registered_tx, registered_rx) = channel();
        let consumer = op.clone();
        event_loop
            .post(move || {
                consumer.done_with(Dispatch::Direct, move |_: &()| {
                    tx.send(thread_name()).unwrap()
                });
                registered_tx.send(()).unwrap();
            })
            .unwrap();
        registered_rx.recv_timeout(TIMEOUT).unwrap();

        thread::Builder::new()
            .name("settler".into())
            .spawn(move || op.resolve(()))
            .unwrap()
            .join()
            .expect("The settling thread has panicked");
        assert_eq!(rx.try_recv().unwrap(), Some(String::from("settler")));
    }

    #[test]
    fn test_one_deferred_serves_observers_on_several_loops() {
        let loops: Vec<EventLoop> = ["alpha", "beta", "gamma"]
            .iter()
            .map(|name| EventLoop::builder().name(*name).spawn().unwrap())
            .collect();
        let op = Deferred::<String>::new();
        let (tx, rx) = channel();

        for event_loop in &loops {
            let _guard = context::enter(event_loop.context());
            let tx = tx.clone();
            op.done_with(Dispatch::Queued, move |v: &String| {
                tx.send(format!("{v}@{}", thread_name().unwrap())).unwrap()
            });
        }
        op.resolve("🍓".into());

        let mut received: Vec<String> = (0..3).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
        received.sort();
        assert_eq!(received, vec!["🍓@alpha", "🍓@beta", "🍓@gamma"]);
    }

    #[test]
    fn test_queued_without_context_is_fatal() {
        let op = Deferred::<()>::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            op.done_with(Dispatch::Queued, |_: &()| {});
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_progress_worker_reports_then_resolves() {
        let worker = EventLoop::builder().name("worker").spawn().unwrap();
        let op = Deferred::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        op.progress(move |v: &u32| sink.lock().unwrap().push(*v));

        let producer = op.clone();
        worker
            .post(move || {
                for counter in 1..=3 {
                    thread::sleep(Duration::from_millis(10));
                    producer.notify(counter);
                }
                producer.resolve(3);
            })
            .unwrap();

        assert_eq!(*op.wait().unwrap(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_then_with_queued_transform_runs_on_loop() {
        let event_loop = EventLoop::builder().name("transform").spawn().unwrap();
        let op = Deferred::<u32>::new();
        let derived = {
            let _guard = context::enter(event_loop.context());
            op.then_with(Dispatch::Queued, |v: &u32| {
                Deferred::<(u32, Option<String>)>::resolved((v * 2, thread_name()))
            })
        };
        op.resolve(21);
        let outcome = derived.wait().unwrap();
        let (value, name) = &*outcome;
        assert_eq!(*value, 42);
        assert_eq!(name.as_deref(), Some("transform"));
    }

    #[test]
    fn test_then_and_when_compose() {
        let first = Deferred::<u32>::new();
        let second = Deferred::<u32>::new();
        let doubled = first.then(|v: &u32| Deferred::<u32>::resolved(v * 2));
        let all = when([&doubled, &second]);

        let tasks: Vec<_> = [(first.clone(), 1), (second.clone(), 2)]
            .into_iter()
            .map(|(op, v)| thread::spawn(move || op.resolve(v)))
            .collect();
        for task in tasks {
            task.join().expect("A producer thread has panicked");
        }
        assert!(block_on(all.settled()).is_ok());
        assert_eq!(*doubled.wait().unwrap(), 2);
    }

    #[test]
    fn test_rejection_propagates_down_a_chain() {
        let op = Deferred::<u32, String>::new();
        let end = op
            .then(|v: &u32| Deferred::<u32, String>::resolved(v + 1))
            .then(|v: &u32| Deferred::<String, String>::resolved(v.to_string()));
        let producer = op.clone();
        thread::spawn(move || producer.reject("reject!!".into()))
            .join()
            .expect("The producer thread has panicked");
        assert_eq!(end.state(), State::Rejected);
        assert_eq!(block_on(end.settled()).unwrap_err().as_str(), "");
    }
}
