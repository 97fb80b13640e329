//! sb-catalog: simulation profiles loaded from an `Equations/` directory.
//!
//! Only the pieces the launcher needs are typed: each profile resolves to an
//! id, a display name, and an optional command template. Everything else in
//! the profile files is ignored.

pub mod catalog;
pub mod schema;

pub use catalog::{Catalog, Profile, find_equations_dir};
pub use schema::{BackendDef, CatalogIndex, ProfileDef};

use std::path::PathBuf;

pub const EQUATIONS_DIR: &str = "Equations";
pub const INDEX_FILE: &str = "equations_index.yaml";

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("Catalog directory not found: {}", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("Catalog index not found: {}", path.display())]
    MissingIndex { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),
}
