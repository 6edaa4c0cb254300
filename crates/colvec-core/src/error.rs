use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`ColvecError`].
pub type ColvecResult<T> = Result<T, ColvecError>;

/// Top-level error type for the colvec engine.
///
/// Adapter failures are wrapped with the operation, table, and document
/// identity (when known) so a failure can be diagnosed from the message alone.
#[derive(Error, Debug)]
pub enum ColvecError {
    /// Missing or invalid pipeline setup. Fatal, never retried.
    #[error("Config error: {0}")]
    Config(String),

    /// The embedding adapter failed or produced no tokens.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The storage adapter failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Vectors of inconsistent dimensionality met during pooling or scoring.
    #[error("Shape mismatch in {context}: expected dimension {expected}, found {found}")]
    ShapeMismatch {
        /// Expected vector dimension.
        expected: usize,
        /// Dimension actually encountered.
        found: usize,
        /// Where the mismatch was detected.
        context: String,
    },

    /// No document with this identity exists in the table.
    #[error("Document not found: {0}")]
    NotFound(Uuid),

    /// Empty or degenerate query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Bulk inputs of different lengths.
    #[error("Arity mismatch: {contents} contents but {metadata} metadata entries")]
    ArityMismatch {
        /// Number of contents supplied.
        contents: usize,
        /// Number of metadata entries supplied.
        metadata: usize,
    },

    /// A pipeline operation ran before `initialize()`.
    #[error("Pipeline not initialized: call initialize() before {0}")]
    NotInitialized(String),

    /// The operation was aborted by a timeout or deadline.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = ColvecError::ShapeMismatch {
            expected: 128,
            found: 64,
            context: "document pooling".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Shape mismatch in document pooling: expected dimension 128, found 64"
        );
    }

    #[test]
    fn test_not_found_includes_id() {
        let id = Uuid::new_v4();
        let err = ColvecError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_json_conversion() {
        let err: ColvecError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ColvecError::Json(_)));
    }
}
