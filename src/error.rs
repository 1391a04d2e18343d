//! Error type shared by every stage of the pipeline.
//!
//! Each error carries a coarse [`ErrorKind`] (used for the process exit code and
//! for tests) plus a human-readable message with the context of the failure.

use thiserror::Error;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid run configuration (bad flag values, unsupported change-point count).
    Config,
    /// A required input file does not exist.
    NotFound,
    /// Malformed or invalid input data.
    DataFormat,
    /// The model cannot be built or sampled for the given data.
    Model,
    /// Reading or writing an artifact failed.
    Io,
}

#[derive(Clone, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn data_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataFormat, message)
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Model, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> u8 {
        match self.kind {
            ErrorKind::Config | ErrorKind::NotFound => 2,
            ErrorKind::DataFormat => 3,
            ErrorKind::Model => 4,
            ErrorKind::Io => 5,
        }
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code())
            .field("message", &self.message)
            .finish()
    }
}

/// Open a file for reading, mapping a missing path to [`ErrorKind::NotFound`].
pub fn open_input(path: &std::path::Path, what: &str) -> Result<std::fs::File, AppError> {
    std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::not_found(format!("File not found: {} ({what})", path.display()))
        } else {
            AppError::io(format!("Failed to open {what} '{}': {e}", path.display()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_kind() {
        assert_eq!(AppError::not_found("x").exit_code(), 2);
        assert_eq!(AppError::data_format("x").exit_code(), 3);
        assert_eq!(AppError::io("x").exit_code(), 5);
    }

    #[test]
    fn missing_input_is_not_found() {
        let path = std::env::temp_dir().join("regime_breaks_definitely_missing.csv");
        let err = open_input(&path, "returns CSV").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("File not found"));
    }
}
