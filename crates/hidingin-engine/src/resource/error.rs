#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The resource was explicitly released and can no longer be bound.
    #[error("resource `{0}` was released")]
    Released(String),

    #[error("failed to allocate `{label}`: {reason}")]
    Allocation { label: String, reason: String },

    /// The handle was created by a different backend than the one using it.
    #[error("resource `{0}` belongs to a different backend")]
    ForeignHandle(String),
}
