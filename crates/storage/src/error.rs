/// All errors that can be returned by a StateStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A patch addresses a section with a different shape than the one
    /// already stored (flat fields vs. repeated iterations).
    #[error("section '{section}' is stored as {found} state but the patch addresses it as {expected}")]
    ShapeConflict {
        section: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A stored session could not be decoded into an answer state.
    #[error("corrupt state for session {session}: {message}")]
    Corrupt { session: String, message: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
