use thiserror::Error;

/// Error type for matrix construction, manipulation and I/O.
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("Shape mismatch: {0}")]
    Shape(String),
    #[error("Invalid headers for axis {axis}: {detail}")]
    Header { axis: usize, detail: String },
    #[error("Index out of bounds: {0}")]
    OutOfBounds(String),
    #[error("Malformed matrix file: {0}")]
    Format(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
