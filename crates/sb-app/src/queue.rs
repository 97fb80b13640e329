//! Run request queue and replicate expansion.

use std::fmt;
use std::path::{Path, PathBuf};

use sb_core::{RequestId, describe_seed, timestamp_now};
use sb_results::{create_rep_dirs, grid_dir, next_rep_index, rep_dir_name};

use crate::config::{DEFAULT_GRID, DEFAULT_STEPS};
use crate::error::{AppError, AppResult};

pub const UNNAMED_LABEL: &str = "(unnamed)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunStatus::Queued => "Queued",
            RunStatus::Running => "Running",
            RunStatus::Done => "Done",
            RunStatus::Failed => "Failed",
        };
        f.write_str(text)
    }
}

/// One external run to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub id: RequestId,
    pub enqueued_at: String,
    pub equation_label: String,
    pub grid: String,
    pub steps: String,
    pub out_dir: PathBuf,
    pub status: RunStatus,
    pub rep_index: u32,
    pub rep_total: u32,
    pub seed: Option<i64>,
    /// Profile command captured at enqueue time; `None` uses the configured default.
    pub command_template: Option<String>,
}

/// Parameters for a batch of replicates.
#[derive(Debug, Clone, Default)]
pub struct ReplicateSpec {
    pub equation_label: String,
    pub grid: String,
    pub steps: String,
    pub replicates: u32,
    pub base_seed: Option<i64>,
    pub command_template: Option<String>,
}

/// Grid value with blanks replaced by the default.
pub fn effective_grid(grid: &str) -> &str {
    non_blank(grid).unwrap_or(DEFAULT_GRID)
}

/// Step count with blanks replaced by the default.
pub fn effective_steps(steps: &str) -> &str {
    non_blank(steps).unwrap_or(DEFAULT_STEPS)
}

fn non_blank(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

/// Insertion-ordered run queue.
#[derive(Debug, Clone, Default)]
pub struct RunQueue {
    items: Vec<RunRequest>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate replicate folders under `run_dir/grid_<grid>/` and queue one
    /// request per folder. Returns the ids of the new requests.
    ///
    /// Seeds are `base + k` for the k-th replicate when a base seed is
    /// given; otherwise no replicate gets a seed.
    pub fn enqueue_replicates(
        &mut self,
        run_dir: &Path,
        spec: &ReplicateSpec,
    ) -> AppResult<Vec<RequestId>> {
        if !run_dir.is_dir() {
            return Err(AppError::NoRunDirectory(format!(
                "{} does not exist; create a run first",
                run_dir.display()
            )));
        }

        let grid = effective_grid(&spec.grid).to_string();
        let steps = effective_steps(&spec.steps).to_string();
        let count = spec.replicates.max(1);
        let label = non_blank(&spec.equation_label)
            .unwrap_or(UNNAMED_LABEL)
            .to_string();

        let seeds = (0..count)
            .map(|k| match spec.base_seed {
                Some(base) => base.checked_add(i64::from(k)).map(Some).ok_or_else(|| {
                    AppError::InvalidInput(format!("seed {} + {} overflows", base, k))
                }),
                None => Ok(None),
            })
            .collect::<AppResult<Vec<Option<i64>>>>()?;

        let group_dir = grid_dir(run_dir, &grid);
        std::fs::create_dir_all(&group_dir)?;
        let start = next_rep_index(&group_dir)?;
        let dirs = create_rep_dirs(&group_dir, start, count)?;

        let enqueued_at = timestamp_now();
        let mut ids = Vec::with_capacity(dirs.len());
        for ((offset, out_dir), seed) in dirs.into_iter().enumerate().zip(seeds) {
            let rep_index = start + offset as u32;
            let request = RunRequest {
                id: RequestId::new(),
                enqueued_at: enqueued_at.clone(),
                equation_label: label.clone(),
                grid: grid.clone(),
                steps: steps.clone(),
                out_dir,
                status: RunStatus::Queued,
                rep_index,
                rep_total: count,
                seed,
                command_template: spec.command_template.clone(),
            };
            tracing::info!(
                "[queue] + {} {} grid={} steps={} seed={} -> {}",
                request.equation_label,
                rep_dir_name(rep_index),
                request.grid,
                request.steps,
                describe_seed(request.seed),
                request.out_dir.display()
            );
            ids.push(request.id);
            self.items.push(request);
        }

        Ok(ids)
    }

    /// Drop the given requests. A running request only loses its record.
    pub fn remove(&mut self, ids: &[RequestId]) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !ids.contains(&item.id));
        let removed = before - self.items.len();
        if removed > 0 {
            tracing::info!(removed, "[queue] removed items");
        }
        removed
    }

    /// Ids of `Queued` requests, in insertion order.
    pub fn queued_ids(&self) -> Vec<RequestId> {
        self.items
            .iter()
            .filter(|item| item.status == RunStatus::Queued)
            .map(|item| item.id)
            .collect()
    }

    pub fn get(&self, id: RequestId) -> Option<&RunRequest> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut RunRequest> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Returns `false` when the request is no longer queued.
    pub fn set_status(&mut self, id: RequestId, status: RunStatus) -> bool {
        match self.get_mut(id) {
            Some(item) => {
                item.status = status;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunRequest> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn counts(&self) -> QueueCounts {
        self.items
            .iter()
            .fold(QueueCounts::default(), |mut counts, item| {
                match item.status {
                    RunStatus::Queued => counts.queued += 1,
                    RunStatus::Running => counts.running += 1,
                    RunStatus::Done => counts.done += 1,
                    RunStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }
}
