//! Replicate side-files: `args.txt`, `cmd.txt`, `host.log`.
//!
//! All three are overwritten on every attempt so a re-run never leaves a
//! mix of old and new content behind.

use std::fs;
use std::path::{Path, PathBuf};

use sb_core::timestamp_now;
use sb_results::{ARGS_FILE, CMD_FILE, HOST_LOG_FILE};

use crate::error::AppResult;
use crate::process::{ProcessExit, ProcessOutput};

pub fn write_args_file(
    out_dir: &Path,
    grid: &str,
    steps: &str,
    seed: Option<i64>,
) -> AppResult<PathBuf> {
    let seed_line = seed.map(|s| format!("--seed {}\n", s)).unwrap_or_default();
    let text = format!(
        "--grid {}\n--steps {}\n{}--out \"{}\"\n",
        grid,
        steps,
        seed_line,
        out_dir.display()
    );

    let path = out_dir.join(ARGS_FILE);
    fs::write(&path, text)?;
    Ok(path)
}

pub fn write_cmd_file(out_dir: &Path, command_line: &str) -> AppResult<PathBuf> {
    let path = out_dir.join(CMD_FILE);
    fs::write(&path, format!("{}\n", command_line))?;
    Ok(path)
}

/// How a hosted run ended, as recorded at the bottom of `host.log`.
#[derive(Debug, Clone)]
pub enum HostLogEnding<'a> {
    Finished(&'a ProcessOutput),
    StartFailed(String),
}

/// The header block of `host.log`, fixed before the process starts.
#[derive(Debug, Clone)]
pub struct HostLog {
    pub started_at: String,
    pub equation: String,
    pub grid: String,
    pub steps: String,
    pub seed: Option<i64>,
    pub out_dir: PathBuf,
    pub command_line: String,
}

impl HostLog {
    pub fn new(
        equation: &str,
        grid: &str,
        steps: &str,
        seed: Option<i64>,
        out_dir: &Path,
        command_line: &str,
    ) -> Self {
        Self {
            started_at: timestamp_now(),
            equation: equation.to_string(),
            grid: grid.to_string(),
            steps: steps.to_string(),
            seed,
            out_dir: out_dir.to_path_buf(),
            command_line: command_line.to_string(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.out_dir.join(HOST_LOG_FILE)
    }

    fn header(&self) -> String {
        let seed_line = self
            .seed
            .map(|seed| format!("# seed: {}\n", seed))
            .unwrap_or_default();
        format!(
            "# host run started: {}\n# equation: {}\n# grid: {}\n# steps: {}\n{}# out: {}\n# cmd: {}\n\n",
            self.started_at,
            self.equation,
            self.grid,
            self.steps,
            seed_line,
            self.out_dir.display(),
            self.command_line
        )
    }

    /// Write the header alone, replacing any previous log.
    pub fn write_started(&self) -> AppResult<()> {
        fs::write(self.path(), self.header())?;
        Ok(())
    }

    /// Rewrite the log with captured output and the closing lines.
    pub fn write_finished(&self, ending: HostLogEnding<'_>) -> AppResult<()> {
        let mut text = self.header();
        match ending {
            HostLogEnding::Finished(output) => {
                text.push_str(&output.stdout);
                if !output.stdout.is_empty() && !output.stdout.ends_with('\n') {
                    text.push('\n');
                }
                if !output.stderr.is_empty() {
                    text.push_str("\n# stderr:\n");
                    text.push_str(&output.stderr);
                    if !output.stderr.ends_with('\n') {
                        text.push('\n');
                    }
                }
                let closing = match output.exit {
                    ProcessExit::Exited(code) => format!("# exit code: {}", code),
                    ProcessExit::Terminated => "# exit code: (terminated by signal)".to_string(),
                    ProcessExit::Canceled => "# canceled".to_string(),
                };
                text.push('\n');
                text.push_str(&closing);
                text.push('\n');
            }
            HostLogEnding::StartFailed(message) => {
                text.push_str(&format!("# error: {}\n", message));
            }
        }
        text.push_str(&format!("# host run finished: {}\n", timestamp_now()));

        fs::write(self.path(), text)?;
        Ok(())
    }
}
