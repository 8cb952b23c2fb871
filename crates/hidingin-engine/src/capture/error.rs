use super::OrderKey;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Sources can only be registered before the compositor starts.
    #[error("compositor already started")]
    AlreadyStarted,

    #[error("compositor stopped")]
    Stopped,

    #[error("no source registered under {0}")]
    UnknownSource(OrderKey),

    #[error("no capture sources registered")]
    NoSources,

    #[error("capture source `{name}` failed to start: {reason:#}")]
    SourceStart { name: String, reason: anyhow::Error },

    #[error("failed to spawn compositor thread")]
    Spawn(#[source] std::io::Error),
}
