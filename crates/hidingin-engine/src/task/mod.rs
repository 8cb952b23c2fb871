//! Task scheduling.
//!
//! A [`TaskQueue`] runs closures either on dedicated named worker threads or
//! in place, when the owner drains it from a thread of its choosing (used when
//! GPU encoding must happen on an externally owned render thread).
//!
//! Guarantees:
//! - FIFO start order per queue instance; none across instances
//! - every task runs at most once
//! - failures and panics are captured into the task's [`TaskHandle`]
//! - stopping abandons queued work; abandoned handles resolve to
//!   [`TaskError::Abandoned`] and never carry a value

mod error;
mod handle;
mod queue;

pub use error::TaskError;
pub use handle::TaskHandle;
pub use queue::{ExecMode, TaskQueue};
