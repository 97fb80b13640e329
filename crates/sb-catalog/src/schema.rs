//! On-disk catalog schema.

use serde::{Deserialize, Serialize};

/// `equations_index.yaml`: ordered list of profile ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CatalogIndex {
    #[serde(default)]
    pub equations: Vec<String>,
}

/// `<id>.yaml`. Unknown keys (expressions, parameters, outputs...) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileDef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendDef {
    #[serde(default = "default_backend_kind")]
    pub kind: String,
    #[serde(default)]
    pub command: String,
}

fn default_backend_kind() -> String {
    "python".to_string()
}
