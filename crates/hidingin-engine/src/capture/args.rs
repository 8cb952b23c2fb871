use std::time::Duration;

/// Composition parameters, fixed at construction.
#[derive(Debug, Clone)]
pub struct CompositeCaptureArgs {
    /// Distinct sources a batch needs before it composes early.
    pub req_composite_num: usize,

    /// Longest a cycle waits for a full batch.
    pub frame_interval: Duration,

    /// Fill in a source that missed a cycle with its last merged layer.
    pub reuse_stale_layers: bool,
}

impl CompositeCaptureArgs {
    /// `req_composite_num` is raised to at least one.
    pub fn new(req_composite_num: usize, frame_interval_ms: u64) -> Self {
        Self {
            req_composite_num: req_composite_num.max(1),
            frame_interval: Duration::from_millis(frame_interval_ms),
            reuse_stale_layers: true,
        }
    }

    pub fn with_stale_layers(mut self, reuse: bool) -> Self {
        self.reuse_stale_layers = reuse;
        self
    }
}

impl Default for CompositeCaptureArgs {
    fn default() -> Self {
        // ~60 Hz
        Self::new(1, 16)
    }
}

/// What a capture source records.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SourceKind {
    WholeDesktop,
    Application { name: String },
}

/// Per-source registration data.
#[derive(Debug, Clone)]
pub struct CaptureArgs {
    /// Name attached to every frame this source contributes.
    pub event_name: String,
    pub kind: SourceKind,
    /// Windows hidden from the capture. `-1` stands for the overlay itself.
    pub excluded_window_ids: Vec<i64>,
    pub excluded_app_name: Option<String>,
    /// For application capture: restrict to these windows. Empty means all.
    pub included_window_ids: Vec<i64>,
}

impl CaptureArgs {
    pub fn whole_desktop(event_name: impl Into<String>) -> Self {
        Self::with_kind(event_name, SourceKind::WholeDesktop)
    }

    pub fn application(event_name: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self::with_kind(event_name, SourceKind::Application { name: app_name.into() })
    }

    fn with_kind(event_name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            event_name: event_name.into(),
            kind,
            excluded_window_ids: Vec::new(),
            excluded_app_name: None,
            included_window_ids: Vec::new(),
        }
    }

    pub fn excluding_windows(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.excluded_window_ids.extend(ids);
        self
    }

    pub fn excluding_app(mut self, name: impl Into<String>) -> Self {
        self.excluded_app_name = Some(name.into());
        self
    }

    pub fn including_windows(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.included_window_ids.extend(ids);
        self
    }
}
