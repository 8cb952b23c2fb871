//! GPU pipeline facade.
//!
//! Routes render, compute and blit work through three [`TaskQueue`](crate::task::TaskQueue)s
//! onto a [`GpuBackend`]. Each queue has a single worker (or runs in place),
//! so operations that write the same target execute in submission order.
//! Nothing here names a concrete graphics API.

mod backend;
mod config;
mod error;
mod exchange;
mod facade;

pub use backend::{GpuBackend, GpuOp, LoadMode, PassKind};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use exchange::StateExchange;
pub use facade::{GpuPipeline, PassContext};
