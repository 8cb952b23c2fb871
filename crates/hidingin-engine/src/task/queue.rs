use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::handle::TaskHandle;
use super::TaskError;

/// A queued unit of work. Receives the name of the thread executing it.
type Job = Box<dyn FnOnce(&str) + Send + 'static>;

/// Scheduling model selected at construction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExecMode {
    /// Dedicated named worker threads pull from the shared FIFO.
    Threaded,
    /// No threads; tasks run when the owner calls [`TaskQueue::drain_in_place`].
    InPlace,
}

struct QueueState {
    jobs: VecDeque<Job>,
    stopped: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    /// Maximum number of pending jobs; zero means unbounded.
    max_tasks: usize,
}

/// FIFO task queue with named workers or in-place execution.
///
/// ```ignore
/// let queue = TaskQueue::threaded(["hidingin-compute"], 0)?;
/// let handle = queue.submit(|thread| Ok(thread.to_string()));
/// assert_eq!(handle.wait()?, "hidingin-compute");
/// ```
pub struct TaskQueue {
    label: String,
    mode: ExecMode,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    thread_names: Vec<String>,
}

impl TaskQueue {
    /// Spawns one worker per name. The first name doubles as the queue label.
    ///
    /// Start order is FIFO; with more than one worker, completion order is not.
    pub fn threaded<I, S>(thread_names: I, max_tasks: usize) -> Result<Self, TaskError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let thread_names: Vec<String> = thread_names.into_iter().map(Into::into).collect();
        let Some(label) = thread_names.first().cloned() else {
            return Err(TaskError::NoWorkers);
        };

        let mut queue = Self {
            label,
            mode: ExecMode::Threaded,
            shared: Self::new_shared(max_tasks),
            workers: Vec::with_capacity(thread_names.len()),
            thread_names: Vec::new(),
        };

        for name in &thread_names {
            let shared = Arc::clone(&queue.shared);
            let worker_name = name.clone();
            // On failure `queue` drops here, stopping and joining what was spawned.
            let worker = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(shared, worker_name))
                .map_err(|source| TaskError::Spawn {
                    name: name.clone(),
                    source,
                })?;
            queue.workers.push(worker);
        }
        queue.thread_names = thread_names;

        log::debug!(
            "task queue `{}` started with {} worker(s)",
            queue.label,
            queue.workers.len()
        );
        Ok(queue)
    }

    /// Creates a queue that never spawns threads.
    ///
    /// Tasks observe `name` as their thread name when drained.
    pub fn in_place(name: impl Into<String>, max_tasks: usize) -> Self {
        let label = name.into();
        Self {
            thread_names: vec![label.clone()],
            label,
            mode: ExecMode::InPlace,
            shared: Self::new_shared(max_tasks),
            workers: Vec::new(),
        }
    }

    fn new_shared(max_tasks: usize) -> Arc<Shared> {
        Arc::new(Shared {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                stopped: false,
            }),
            available: Condvar::new(),
            max_tasks,
        })
    }

    /// Enqueues `task` and returns its completion handle.
    ///
    /// Never blocks. After [`stop`](Self::stop) the returned handle is already
    /// abandoned; on a full queue it already carries [`TaskError::QueueFull`].
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&str) -> anyhow::Result<T> + Send + 'static,
    {
        let (completer, handle) = TaskHandle::channel();

        {
            let mut state = self.shared.state.lock();
            if state.stopped {
                log::debug!("task queue `{}`: submit after stop", self.label);
                return TaskHandle::abandoned();
            }
            let capacity = self.shared.max_tasks;
            if capacity > 0 && state.jobs.len() >= capacity {
                log::warn!("task queue `{}` is full ({capacity} pending)", self.label);
                return TaskHandle::resolved(Err(TaskError::QueueFull { capacity }));
            }

            let label = self.label.clone();
            state.jobs.push_back(Box::new(move |thread_name: &str| {
                completer.complete(run_guarded(&label, thread_name, task));
            }));
        }

        self.shared.available.notify_one();
        handle
    }

    /// Runs every pending task on the calling thread, in submission order.
    ///
    /// Tasks submitted while draining are run too. Returns how many ran.
    pub fn drain_in_place(&self) -> Result<usize, TaskError> {
        if self.mode != ExecMode::InPlace {
            return Err(TaskError::NotInPlace(self.label.clone()));
        }

        let mut ran = 0;
        loop {
            let job = {
                let mut state = self.shared.state.lock();
                if state.stopped {
                    break;
                }
                match state.jobs.pop_front() {
                    Some(job) => job,
                    None => break,
                }
            };
            job(&self.label);
            ran += 1;
        }
        Ok(ran)
    }

    /// Stops the queue. Queued tasks that have not started are abandoned.
    ///
    /// Idempotent. Does not wait for in-flight tasks; dropping the queue does.
    pub fn stop(&self) {
        let abandoned = {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            std::mem::take(&mut state.jobs)
        };
        self.shared.available.notify_all();

        if !abandoned.is_empty() {
            log::debug!(
                "task queue `{}` stopped, abandoning {} task(s)",
                self.label,
                abandoned.len()
            );
        }
        // Dropping the jobs drops their completers.
        drop(abandoned);
    }

    /// Number of tasks waiting to start.
    pub fn len(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().jobs.is_empty()
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn thread_names(&self) -> &[String] {
        &self.thread_names
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.stop();

        let current = thread::current().id();
        for worker in self.workers.drain(..) {
            // A task may hold the last reference to its own queue.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                log::error!("task queue `{}`: worker panicked outside a task", self.label);
            }
        }
    }
}

fn worker_loop(shared: Arc<Shared>, name: String) {
    log::debug!("worker `{name}` running");
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if state.stopped {
                    log::debug!("worker `{name}` exiting");
                    return;
                }
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                shared.available.wait(&mut state);
            }
        };
        job(&name);
    }
}

fn run_guarded<T, F>(queue: &str, thread_name: &str, task: F) -> Result<T, TaskError>
where
    F: FnOnce(&str) -> anyhow::Result<T>,
{
    match catch_unwind(AssertUnwindSafe(|| task(thread_name))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            log::warn!("task on `{queue}` failed: {err:#}");
            Err(TaskError::Failed(err))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::warn!("task on `{queue}` panicked: {message}");
            Err(TaskError::Panicked(message))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn single_worker(name: &str) -> TaskQueue {
        TaskQueue::threaded([name], 0).unwrap()
    }

    // ── threaded ──────────────────────────────────────────────────────────

    #[test]
    fn threaded_queue_runs_in_submission_order() {
        let queue = single_worker("fifo");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let seen = Arc::clone(&seen);
                queue.submit(move |_| {
                    seen.lock().push(i);
                    Ok(())
                })
            })
            .collect();
        for h in handles {
            h.wait().unwrap();
        }

        assert_eq!(*seen.lock(), (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn tasks_see_their_worker_name() {
        let queue = single_worker("hidingin-test-worker");
        let name = queue.submit(|thread| Ok(thread.to_string())).wait().unwrap();
        assert_eq!(name, "hidingin-test-worker");
        assert_eq!(queue.thread_names(), ["hidingin-test-worker".to_string()]);
    }

    #[test]
    fn failing_task_does_not_stop_the_worker() {
        let queue = single_worker("errors");
        let failed = queue.submit(|_| -> anyhow::Result<()> { anyhow::bail!("boom") });
        let next = queue.submit(|_| Ok(5));

        assert!(matches!(failed.wait(), Err(TaskError::Failed(_))));
        assert_eq!(next.wait().unwrap(), 5);
    }

    #[test]
    fn panicking_task_is_captured() {
        let queue = single_worker("panics");
        let panicked = queue.submit(|_| -> anyhow::Result<()> { panic!("kaboom") });
        let next = queue.submit(|_| Ok("still alive"));

        match panicked.wait() {
            Err(TaskError::Panicked(msg)) => assert!(msg.contains("kaboom")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(next.wait().unwrap(), "still alive");
    }

    #[test]
    fn threaded_queue_requires_a_name() {
        let err = TaskQueue::threaded(Vec::<String>::new(), 0).err().unwrap();
        assert!(matches!(err, TaskError::NoWorkers));
    }

    #[test]
    fn drain_is_rejected_on_threaded_queue() {
        let queue = single_worker("threaded");
        assert!(matches!(queue.drain_in_place(), Err(TaskError::NotInPlace(_))));
    }

    // ── in place ──────────────────────────────────────────────────────────

    #[test]
    fn in_place_queue_waits_for_drain() {
        let queue = TaskQueue::in_place("render-owner", 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let caller = thread::current().id();

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let seen = Arc::clone(&seen);
                queue.submit(move |name| {
                    assert_eq!(thread::current().id(), caller);
                    seen.lock().push(i);
                    Ok(name.to_string())
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert!(seen.lock().is_empty());
        assert_eq!(queue.len(), 5);

        assert_eq!(queue.drain_in_place().unwrap(), 5);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        for h in handles {
            assert_eq!(h.wait().unwrap(), "render-owner");
        }
    }

    // ── stop / abandonment ────────────────────────────────────────────────

    #[test]
    fn stop_abandons_queued_tasks_but_finishes_in_flight_one() {
        let queue = single_worker("stopper");
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);

        let in_flight = queue.submit(move |_| {
            started_tx.send(()).unwrap();
            gate_rx.recv().unwrap();
            Ok("done")
        });
        started_rx.recv().unwrap();

        let queued: Vec<_> = (0..3).map(|i| queue.submit(move |_| Ok(i))).collect();
        queue.stop();
        gate_tx.send(()).unwrap();

        assert_eq!(in_flight.wait().unwrap(), "done");
        for h in queued {
            assert!(h.wait().unwrap_err().is_abandoned());
        }
    }

    #[test]
    fn submit_after_stop_fails_fast() {
        let queue = TaskQueue::in_place("stopped", 0);
        queue.stop();
        let h = queue.submit(|_| Ok(()));
        assert!(h.try_wait().unwrap().unwrap_err().is_abandoned());
        assert_eq!(queue.drain_in_place().unwrap(), 0);
    }

    #[test]
    fn full_queue_rejects_new_tasks() {
        let queue = TaskQueue::in_place("bounded", 2);
        let _a = queue.submit(|_| Ok(()));
        let _b = queue.submit(|_| Ok(()));
        let c = queue.submit(|_| Ok(()));
        assert!(matches!(
            c.wait(),
            Err(TaskError::QueueFull { capacity: 2 })
        ));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drop_joins_while_a_task_is_running() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let queue = single_worker("joiner");
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);

        let running = queue.submit(move |_| {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(50));
            done.store(true, Ordering::SeqCst);
            Ok("slept")
        });
        let pending = queue.submit(|_| Ok("never"));
        started_rx.recv().unwrap();

        let start = Instant::now();
        drop(queue);
        assert!(finished.load(Ordering::SeqCst), "drop returned before the running task finished");
        assert!(start.elapsed() < Duration::from_secs(2));

        assert_eq!(running.wait().unwrap(), "slept");
        assert!(pending.wait().unwrap_err().is_abandoned());
    }
}
