/// Construction parameters for [`GpuPipeline`](super::GpuPipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Run render work only when the owner drains the render queue.
    ///
    /// Needed when encoding must happen on a thread owned by the UI toolkit.
    pub render_in_place: bool,

    /// Per-queue cap on pending tasks; zero is unbounded.
    pub max_pending: usize,

    /// Worker threads are named `{prefix}-render`, `{prefix}-compute`,
    /// `{prefix}-blit`.
    pub thread_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_in_place: false,
            max_pending: 64,
            thread_prefix: "hidingin".to_string(),
        }
    }
}

impl PipelineConfig {
    pub(crate) fn thread_name(&self, queue: &str) -> String {
        format!("{}-{queue}", self.thread_prefix)
    }
}
