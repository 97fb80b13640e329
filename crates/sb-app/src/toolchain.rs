//! Project root, interpreter, and entry script discovery.

use std::path::{Path, PathBuf};

use sb_catalog::EQUATIONS_DIR;

use crate::config::SimbatchConfig;

const SCRIPT_CANDIDATES: [&str; 2] = ["run_poisson.py", "main.py"];

/// Where and with what the external simulation is launched.
#[derive(Debug, Clone, PartialEq)]
pub struct Toolchain {
    pub project_root: PathBuf,
    pub python: String,
    pub script: Option<PathBuf>,
}

impl Toolchain {
    /// Resolve against `config`, discovering anything it leaves unset.
    pub fn discover(config: &SimbatchConfig, cwd: &Path) -> Self {
        let project_root = config
            .project_root
            .clone()
            .unwrap_or_else(|| find_project_root(cwd));

        let python = config
            .python
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| discover_python(&project_root));

        let script = match &config.script {
            Some(script) if script.is_absolute() => Some(script.clone()),
            Some(script) => Some(project_root.join(script)),
            None => discover_script(&project_root),
        };

        tracing::debug!(
            root = %project_root.display(),
            python = %python,
            script = ?script,
            "resolved toolchain"
        );

        Self {
            project_root,
            python,
            script,
        }
    }
}

/// Nearest ancestor of `start` holding an `Equations/` folder, else `start`.
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(EQUATIONS_DIR).is_dir())
        .unwrap_or(start)
        .to_path_buf()
}

/// Project virtualenv interpreter if present, else `python` from `PATH`.
pub fn discover_python(project_root: &Path) -> String {
    let venv = project_root.join(".venv");
    [
        venv.join("Scripts").join("python.exe"),
        venv.join("bin").join("python"),
    ]
    .into_iter()
    .find(|p| p.is_file())
    .map(|p| p.display().to_string())
    .unwrap_or_else(|| "python".to_string())
}

pub fn discover_script(project_root: &Path) -> Option<PathBuf> {
    SCRIPT_CANDIDATES
        .iter()
        .map(|name| project_root.join(name))
        .find(|p| p.is_file())
}
