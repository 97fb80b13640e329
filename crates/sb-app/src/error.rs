//! Error types for the sb-app service layer.

use std::path::PathBuf;

/// Application error shared by every front end.
///
/// Configuration variants are raised before anything is mutated; per-item
/// execution failures never surface here, they are recorded on the item.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file: {}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("No run directory: {0}")]
    NoRunDirectory(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Nothing to run: the queue has no queued items")]
    NothingToRun,

    #[error("Nothing to aggregate under {}", path.display())]
    NothingToAggregate { path: PathBuf },

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Results error: {0}")]
    Results(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sb_catalog::CatalogError> for AppError {
    fn from(err: sb_catalog::CatalogError) -> Self {
        AppError::Catalog(err.to_string())
    }
}

impl From<sb_results::ResultsError> for AppError {
    fn from(err: sb_results::ResultsError) -> Self {
        match err {
            sb_results::ResultsError::RepIndexExhausted { .. } => {
                AppError::InvalidInput(err.to_string())
            }
            other => AppError::Results(other.to_string()),
        }
    }
}
