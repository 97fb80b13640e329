//! Catalog loading and lookup.

use std::fs;
use std::path::{Path, PathBuf};

use crate::schema::{CatalogIndex, ProfileDef};
use crate::{CatalogError, CatalogResult, EQUATIONS_DIR, INDEX_FILE};

/// A selectable simulation profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    /// Command template with `{placeholder}` tokens; `None` when the profile
    /// does not define a backend command.
    pub command: Option<String>,
}

impl Profile {
    /// Display label used for queue entries and log headers.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl From<ProfileDef> for Profile {
    fn from(def: ProfileDef) -> Self {
        let command = def
            .backend
            .map(|b| b.command)
            .filter(|c| !c.trim().is_empty());
        Self {
            id: def.id,
            name: def.name,
            command,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    dir: PathBuf,
    profiles: Vec<Profile>,
}

impl Catalog {
    /// Load every profile listed in `<dir>/equations_index.yaml`, in index order.
    ///
    /// Listed profiles whose file is missing, or whose `id` is empty, are
    /// skipped with a warning. Duplicate ids keep the first occurrence.
    pub fn load(dir: &Path) -> CatalogResult<Self> {
        if !dir.is_dir() {
            return Err(CatalogError::MissingDirectory {
                path: dir.to_path_buf(),
            });
        }

        let index_path = dir.join(INDEX_FILE);
        if !index_path.is_file() {
            return Err(CatalogError::MissingIndex { path: index_path });
        }
        let index: CatalogIndex = read_yaml(&index_path)?;

        let mut profiles: Vec<Profile> = Vec::new();
        for id in &index.equations {
            let path = dir.join(format!("{}.yaml", id));
            if !path.is_file() {
                tracing::warn!(profile = %id, path = %path.display(), "profile listed in index but file is missing");
                continue;
            }
            let def: ProfileDef = read_yaml(&path)?;
            if def.id.trim().is_empty() {
                tracing::warn!(path = %path.display(), "profile without id skipped");
                continue;
            }
            if profiles.iter().any(|p| p.id == def.id) {
                tracing::warn!(profile = %def.id, "duplicate profile id skipped");
                continue;
            }
            profiles.push(Profile::from(def));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            profiles,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, id: &str) -> CatalogResult<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| CatalogError::ProfileNotFound(id.to_string()))
    }

    /// First profile in index order (the default selection).
    pub fn first(&self) -> Option<&Profile> {
        self.profiles.first()
    }
}

/// Nearest `Equations/` directory at or above `start`.
pub fn find_equations_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(EQUATIONS_DIR))
        .find(|candidate| candidate.is_dir())
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> CatalogResult<T> {
    let content = fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| CatalogError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}
