//! Single-worker, priority-ordered execution lane over one owned resource.
//!
//! The worker thread owns the resource (the store connection) outright;
//! callers never touch it except from inside a submitted task. Among queued
//! jobs, strictly higher priority runs first. Equal priorities happen to run
//! in submission order, but callers must not rely on that.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::oneshot;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher is shut down")]
    Closed,
    #[error("dispatched task panicked")]
    TaskPanicked,
    #[error("failed to spawn dispatcher worker: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type StoreDispatcher = Dispatcher<rusqlite::Connection>;

type Task<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

struct Job<C> {
    priority: i32,
    sequence: u64,
    task: Task<C>,
}

impl<C> PartialEq for Job<C> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<C> Eq for Job<C> {}

impl<C> PartialOrd for Job<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Job<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct Queue<C> {
    heap: BinaryHeap<Job<C>>,
    next_sequence: u64,
    closed: bool,
}

struct Shared<C> {
    queue: Mutex<Queue<C>>,
    available: Condvar,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Queue<C>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Dispatcher<C> {
    name: String,
    shared: Arc<Shared<C>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Send + 'static> Dispatcher<C> {
    /// Spawns the worker thread, which takes ownership of `resource` and
    /// drops it once the dispatcher shuts down.
    pub fn start(name: &str, resource: C) -> Result<Self, DispatchError> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                heap: BinaryHeap::new(),
                next_sequence: 0,
                closed: false,
            }),
            available: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(&worker_name, &worker_shared, resource))?;

        Ok(Self {
            name: name.to_string(),
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    fn enqueue<T, F>(
        &self,
        priority: i32,
        task: F,
    ) -> Result<oneshot::Receiver<thread::Result<T>>, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce(&mut C) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task: Task<C> = Box::new(move |resource: &mut C| {
            let result = catch_unwind(AssertUnwindSafe(|| task(resource)));
            // The submitter may have stopped waiting.
            let _ = tx.send(result);
        });

        let depth = {
            let mut queue = self.shared.lock();
            if queue.closed {
                return Err(DispatchError::Closed);
            }
            let sequence = queue.next_sequence;
            queue.next_sequence += 1;
            queue.heap.push(Job {
                priority,
                sequence,
                task,
            });
            queue.heap.len()
        };
        self.shared.available.notify_one();
        tracing::trace!(dispatcher = %self.name, priority, depth, "job queued");
        Ok(rx)
    }

    fn settle<T, E>(
        &self,
        outcome: Result<thread::Result<Result<T, E>>, oneshot::error::RecvError>,
    ) -> Result<T, E>
    where
        E: From<DispatchError>,
    {
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                tracing::error!(dispatcher = %self.name, "dispatched task panicked");
                Err(DispatchError::TaskPanicked.into())
            }
            Err(_) => Err(DispatchError::Closed.into()),
        }
    }

    /// Queues `task` at `priority` and waits for it to run. Errors returned
    /// by the task reach only this caller.
    pub async fn submit<T, E, F>(&self, priority: i32, task: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<DispatchError> + Send + 'static,
        F: FnOnce(&mut C) -> Result<T, E> + Send + 'static,
    {
        let rx = self.enqueue(priority, task)?;
        self.settle(rx.await)
    }

    /// Blocking variant of [`Dispatcher::submit`] for plain threads. Panics if
    /// called from inside an async runtime.
    pub fn submit_blocking<T, E, F>(&self, priority: i32, task: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<DispatchError> + Send + 'static,
        F: FnOnce(&mut C) -> Result<T, E> + Send + 'static,
    {
        let rx = self.enqueue(priority, task)?;
        self.settle(rx.blocking_recv())
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().heap.len()
    }
}

impl<C> Dispatcher<C> {
    /// Stops accepting jobs, lets the worker drain what is already queued,
    /// then joins it. Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.lock();
            queue.closed = true;
        }
        self.shared.available.notify_all();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!(dispatcher = %self.name, "dispatcher worker exited abnormally");
            }
        }
    }
}

impl<C> Drop for Dispatcher<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<C>(name: &str, shared: &Shared<C>, mut resource: C) {
    tracing::debug!(dispatcher = name, "dispatcher worker started");
    loop {
        let job = {
            let mut queue = shared.lock();
            loop {
                if let Some(job) = queue.heap.pop() {
                    break Some(job);
                }
                if queue.closed {
                    break None;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        let Some(Job { priority, task, .. }) = job else {
            break;
        };

        let started = Instant::now();
        task(&mut resource);
        tracing::trace!(
            dispatcher = name,
            priority,
            elapsed_us = started.elapsed().as_micros() as u64,
            "job finished"
        );
    }
    tracing::debug!(dispatcher = name, "dispatcher worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("task failed: {0}")]
        Failed(String),
        #[error(transparent)]
        Dispatch(#[from] DispatchError),
    }

    fn recorder() -> Arc<Dispatcher<Vec<String>>> {
        Arc::new(Dispatcher::start("test-dispatcher", Vec::new()).expect("start"))
    }

    async fn wait_for_pending(dispatcher: &Dispatcher<Vec<String>>, expected: usize) {
        for _ in 0..500 {
            if dispatcher.pending() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("dispatcher never reached {expected} pending jobs");
    }

    #[tokio::test]
    async fn higher_priority_runs_first_among_queued_jobs() {
        let dispatcher = recorder();
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let blocker = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .submit(0, move |log: &mut Vec<String>| {
                        let _ = started_tx.send(());
                        let _ = release_rx.recv();
                        log.push("blocker".to_string());
                        Ok::<_, DispatchError>(())
                    })
                    .await
            })
        };
        started_rx.await.expect("blocker started");

        let mut queued = Vec::new();
        for (priority, label) in [(1, "low"), (5, "mid"), (100, "high")] {
            let submitter = dispatcher.clone();
            queued.push(tokio::spawn(async move {
                submitter
                    .submit(priority, move |log: &mut Vec<String>| {
                        log.push(label.to_string());
                        Ok::<_, DispatchError>(())
                    })
                    .await
            }));
            wait_for_pending(&dispatcher, queued.len()).await;
        }

        release_tx.send(()).expect("release");
        blocker.await.expect("join").expect("blocker");
        for handle in queued {
            handle.await.expect("join").expect("queued job");
        }

        let order = dispatcher
            .submit(0, |log: &mut Vec<String>| Ok::<_, DispatchError>(log.clone()))
            .await
            .expect("read log");
        assert_eq!(order, vec!["blocker", "high", "mid", "low"]);
    }

    #[tokio::test]
    async fn task_errors_reach_only_their_submitter() {
        let dispatcher = recorder();
        let failed = dispatcher
            .submit(1, |_: &mut Vec<String>| {
                Err::<(), _>(TestError::Failed("boom".to_string()))
            })
            .await;
        assert!(matches!(failed, Err(TestError::Failed(message)) if message == "boom"));

        let value = dispatcher
            .submit(1, |log: &mut Vec<String>| {
                log.push("after".to_string());
                Ok::<_, TestError>(log.len())
            })
            .await
            .expect("worker keeps running");
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn panicking_task_does_not_stop_the_worker() {
        let dispatcher = recorder();
        let panicked = dispatcher
            .submit(1, |_: &mut Vec<String>| -> Result<(), TestError> {
                panic!("task blew up")
            })
            .await;
        assert!(matches!(
            panicked,
            Err(TestError::Dispatch(DispatchError::TaskPanicked))
        ));

        let ok = dispatcher
            .submit(1, |_: &mut Vec<String>| Ok::<_, TestError>("still alive"))
            .await
            .expect("next job");
        assert_eq!(ok, "still alive");
    }

    #[test]
    fn submissions_after_shutdown_are_rejected() {
        let dispatcher = Dispatcher::start("closing", 0u32).expect("start");
        let value = dispatcher
            .submit_blocking(1, |n: &mut u32| {
                *n += 1;
                Ok::<_, DispatchError>(*n)
            })
            .expect("before shutdown");
        assert_eq!(value, 1);

        dispatcher.shutdown();
        let rejected = dispatcher.submit_blocking(1, |n: &mut u32| Ok::<_, DispatchError>(*n));
        assert!(matches!(rejected, Err(DispatchError::Closed)));
    }

    #[test]
    fn concurrent_blocking_callers_are_serialized() {
        let dispatcher = Arc::new(Dispatcher::start("serial", 0u64).expect("start"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dispatcher = dispatcher.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        dispatcher
                            .submit_blocking(i, |n: &mut u64| {
                                *n += 1;
                                Ok::<_, DispatchError>(())
                            })
                            .expect("submit");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        let total = dispatcher
            .submit_blocking(0, |n: &mut u64| Ok::<_, DispatchError>(*n))
            .expect("total");
        assert_eq!(total, 400);
    }
}
