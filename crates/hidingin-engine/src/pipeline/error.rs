use crate::coords::PixelRect;
use crate::resource::ResourceError;
use crate::task::TaskError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Task(TaskError),

    /// The backend cannot encode this operation for these resources.
    #[error("{backend} backend cannot encode {op}: {reason}")]
    Unsupported {
        backend: String,
        op: &'static str,
        reason: String,
    },

    #[error("region {region:?} lies outside the {width}x{height} source")]
    InvalidRegion {
        region: PixelRect,
        width: u32,
        height: u32,
    },

    #[error("nothing to composite")]
    NoLayers,

    #[error("gpu work did not complete within {0:?}")]
    Timeout(std::time::Duration),
}

impl From<TaskError> for PipelineError {
    /// Unwraps pipeline errors that travelled through a task's `anyhow` error.
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Failed(inner) => match inner.downcast::<PipelineError>() {
                Ok(pipeline) => pipeline,
                Err(other) => PipelineError::Task(TaskError::Failed(other)),
            },
            other => PipelineError::Task(other),
        }
    }
}
