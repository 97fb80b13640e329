//! sb-results: run-directory layout and aggregate report files.

pub mod layout;
pub mod report;
pub mod types;

pub use layout::*;
pub use report::{GroupReport, write_group_report, write_summary};
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Group grid_{grid} has no rows to report")]
    EmptyGroup { grid: i64 },

    #[error("No replicate index left under {}", dir.display())]
    RepIndexExhausted { dir: std::path::PathBuf },
}
