/// Failure states of a scheduled task or of the queue itself.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task body returned an error.
    #[error("task failed: {0:#}")]
    Failed(anyhow::Error),

    /// The task body panicked; the payload message is kept when it is a string.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The queue was stopped before the task started.
    #[error("task abandoned before it started")]
    Abandoned,

    /// The queue already holds its maximum number of pending tasks.
    #[error("task queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// `drain_in_place` was called on a threaded queue.
    #[error("queue `{0}` does not execute in place")]
    NotInPlace(String),

    /// A threaded queue was requested without any worker names.
    #[error("threaded queue needs at least one worker name")]
    NoWorkers,

    #[error("failed to spawn worker thread `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl TaskError {
    /// Returns true for the terminal "never started" state.
    pub fn is_abandoned(&self) -> bool {
        matches!(self, TaskError::Abandoned)
    }
}
