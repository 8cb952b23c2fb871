use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::TaskError;

/// Completion handle for a submitted task.
///
/// The result can be taken exactly once. If the producing side is dropped
/// without completing (the queue stopped before the task started), every wait
/// resolves to [`TaskError::Abandoned`] instead of blocking forever.
#[must_use = "dropping a TaskHandle discards the task's result"]
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: Receiver<Result<T, TaskError>>,
}

/// Producer side of a [`TaskHandle`], moved into the queued job.
pub(crate) struct Completer<T> {
    tx: Sender<Result<T, TaskError>>,
}

impl<T> Completer<T> {
    pub(crate) fn complete(self, result: Result<T, TaskError>) {
        // The caller may have dropped its handle; that is not an error.
        let _ = self.tx.send(result);
    }
}

impl<T> TaskHandle<T> {
    pub(crate) fn channel() -> (Completer<T>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (Completer { tx }, Self { rx })
    }

    /// A handle that already carries `result`.
    pub(crate) fn resolved(result: Result<T, TaskError>) -> Self {
        let (completer, handle) = Self::channel();
        completer.complete(result);
        handle
    }

    /// A handle whose task will never run.
    pub(crate) fn abandoned() -> Self {
        let (completer, handle) = Self::channel();
        drop(completer);
        handle
    }

    /// Blocks until the task finishes or is abandoned.
    pub fn wait(self) -> Result<T, TaskError> {
        self.rx.recv().unwrap_or(Err(TaskError::Abandoned))
    }

    /// Blocks for at most `timeout`. Returns `None` if the task is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, TaskError>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(TaskError::Abandoned)),
        }
    }

    /// Non-blocking poll. Returns `None` if the task is still pending.
    pub fn try_wait(&self) -> Option<Result<T, TaskError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TaskError::Abandoned)),
        }
    }
}
