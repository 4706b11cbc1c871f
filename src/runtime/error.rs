use crate::language::errors::SyntaxError;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to read `{path}`: {message}")]
    Io { path: String, message: String },
    #[error("Error in cmake code at\n{path}:{}", .errors.first().map_or(0, |err| err.line))]
    Syntax {
        path: String,
        source_text: String,
        errors: Vec<SyntaxError>,
    },
    #[error("Snapshot #{index} is not part of the state")]
    InvalidSnapshot { index: usize },
    #[error("Snapshot #{popped} popped while #{current} is still open")]
    SnapshotOrder { popped: usize, current: usize },
    #[error("Configuration failed: {message}")]
    Configure { message: String },
}
