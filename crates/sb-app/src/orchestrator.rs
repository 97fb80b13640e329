//! Sequential execution of queued runs and single cancellable launches.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use sb_catalog::Profile;
use sb_core::{describe_seed, timestamp_now};
use sb_results::{PREVIEW_FILE, grid_dir, next_rep_index, rep_dir_name};

use crate::config::SimbatchConfig;
use crate::error::{AppError, AppResult};
use crate::process::{CancelToken, ProcessExit, ProcessOutput, run_process};
use crate::progress::{BatchEvent, emit};
use crate::queue::{RunQueue, RunRequest, RunStatus, effective_grid, effective_steps};
use crate::sidefiles::{HostLog, HostLogEnding, write_args_file, write_cmd_file};
use crate::template::{Placeholders, requires_key, resolve_template, seed_opt, split_command_line};
use crate::toolchain::Toolchain;

/// What the orchestrator is currently doing. Batches and launches are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Batch,
    Launch,
}

/// Resets the activity to `Idle` when dropped.
struct ActivityGuard {
    slot: Arc<Mutex<Activity>>,
}

impl ActivityGuard {
    fn acquire(slot: &Arc<Mutex<Activity>>, wanted: Activity) -> AppResult<Self> {
        let mut current = lock(slot);
        match *current {
            Activity::Idle => {
                *current = wanted;
                Ok(Self { slot: Arc::clone(slot) })
            }
            Activity::Batch => Err(AppError::Busy("a batch is already running".to_string())),
            Activity::Launch => Err(AppError::Busy("a launch is already running".to_string())),
        }
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        *lock(&self.slot) = Activity::Idle;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome counts of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed_wall_s: f64,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Parameters of a single launch.
#[derive(Debug, Clone, Default)]
pub struct LaunchParams {
    pub equation_label: String,
    pub grid: String,
    pub steps: String,
    pub seed: Option<i64>,
    pub command_template: Option<String>,
}

impl LaunchParams {
    pub fn from_profile(profile: Option<&Profile>, grid: &str, steps: &str, seed: Option<i64>) -> Self {
        Self {
            equation_label: profile.map(|p| p.label().to_string()).unwrap_or_default(),
            grid: grid.to_string(),
            steps: steps.to_string(),
            seed,
            command_template: profile.and_then(|p| p.command.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStatus {
    Completed,
    Failed { exit_code: Option<i32> },
    Canceled,
}

#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub out_dir: PathBuf,
    pub status: LaunchStatus,
    pub elapsed_wall_s: f64,
    /// Why the process never started, when it did not.
    pub message: Option<String>,
}

/// A launch running on a background thread.
pub struct LaunchHandle {
    cancel: CancelToken,
    thread: JoinHandle<AppResult<LaunchOutcome>>,
}

impl LaunchHandle {
    /// Request cancellation; the process tree is killed on the next poll.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> AppResult<LaunchOutcome> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(AppError::Io(std::io::Error::other("launch thread panicked"))))
    }
}

/// Everything needed to execute one replicate.
struct ExecutionPlan<'a> {
    label: &'a str,
    grid: &'a str,
    steps: &'a str,
    seed: Option<i64>,
    out_dir: &'a Path,
    template: &'a str,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: SimbatchConfig,
    toolchain: Toolchain,
    activity: Arc<Mutex<Activity>>,
}

impl Orchestrator {
    pub fn new(config: SimbatchConfig, toolchain: Toolchain) -> Self {
        Self {
            config,
            toolchain,
            activity: Arc::new(Mutex::new(Activity::Idle)),
        }
    }

    pub fn config(&self) -> &SimbatchConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn activity(&self) -> Activity {
        *lock(&self.activity)
    }

    /// Execute every request that is `Queued` when the batch starts, one at
    /// a time, in queue order.
    ///
    /// The queue lock is held only to take the snapshot and to update status,
    /// so callers may enqueue or remove while the batch runs. Requests added
    /// later wait for the next batch; requests removed before their turn are
    /// skipped. A failing item never stops the batch.
    pub fn run_batch(
        &self,
        queue: &Mutex<RunQueue>,
        run_dir: &Path,
        mut progress_cb: Option<&mut dyn FnMut(BatchEvent)>,
    ) -> AppResult<BatchReport> {
        let _guard = ActivityGuard::acquire(&self.activity, Activity::Batch)?;

        ensure_run_dir(run_dir)?;
        let snapshot: Vec<RunRequest> = {
            let queue = lock(queue);
            queue
                .queued_ids()
                .into_iter()
                .filter_map(|id| queue.get(id).cloned())
                .collect()
        };
        if snapshot.is_empty() {
            return Err(AppError::NothingToRun);
        }
        for item in &snapshot {
            self.check_template(self.template_for(item.command_template.as_deref()))?;
        }

        let total = snapshot.len();
        tracing::info!(total, run = %run_dir.display(), "batch started");
        let started = Instant::now();
        let mut report = BatchReport::default();

        for (index, item) in snapshot.iter().enumerate() {
            let position = index + 1;
            let still_queued = {
                let mut queue = lock(queue);
                let queued = queue
                    .get(item.id)
                    .is_some_and(|current| current.status == RunStatus::Queued);
                queued && queue.set_status(item.id, RunStatus::Running)
            };
            if !still_queued {
                tracing::info!(id = %item.id, "[queue] item no longer queued; skipped");
                report.skipped += 1;
                emit(&mut progress_cb, BatchEvent::ItemSkipped { id: item.id, position });
                continue;
            }

            emit(
                &mut progress_cb,
                BatchEvent::ItemStarted {
                    id: item.id,
                    position,
                    total,
                    label: item.equation_label.clone(),
                    rep_index: item.rep_index,
                    out_dir: item.out_dir.clone(),
                },
            );

            let item_started = Instant::now();
            let plan = ExecutionPlan {
                label: &item.equation_label,
                grid: effective_grid(&item.grid),
                steps: effective_steps(&item.steps),
                seed: item.seed,
                out_dir: &item.out_dir,
                template: self.template_for(item.command_template.as_deref()),
            };
            let result = self.execute(&plan, &CancelToken::new());

            let (status, exit_code, message) = match &result {
                Ok(output) if output.exit.success() => (RunStatus::Done, Some(0), None),
                Ok(output) => {
                    tracing::warn!(
                        id = %item.id,
                        rep = item.rep_index,
                        exit = ?output.exit,
                        "[queue] item failed"
                    );
                    (RunStatus::Failed, output.exit.code(), None)
                }
                Err(err) => {
                    tracing::warn!(id = %item.id, rep = item.rep_index, error = %err, "[queue] item failed");
                    (RunStatus::Failed, None, Some(err.to_string()))
                }
            };
            match status {
                RunStatus::Done => report.succeeded += 1,
                _ => report.failed += 1,
            }
            lock(queue).set_status(item.id, status);

            emit(
                &mut progress_cb,
                BatchEvent::ItemFinished {
                    id: item.id,
                    position,
                    total,
                    status,
                    exit_code,
                    elapsed_wall_s: item_started.elapsed().as_secs_f64(),
                    message,
                },
            );
        }

        report.elapsed_wall_s = started.elapsed().as_secs_f64();
        tracing::info!(
            "Queue finished. Success={}, Failed={}",
            report.succeeded,
            report.failed
        );
        emit(
            &mut progress_cb,
            BatchEvent::BatchFinished {
                succeeded: report.succeeded,
                failed: report.failed,
                elapsed_wall_s: report.elapsed_wall_s,
            },
        );
        Ok(report)
    }

    /// Run one replicate in the next free `rep_NNN` folder, blocking until it
    /// exits or `cancel` fires.
    pub fn launch(
        &self,
        run_dir: &Path,
        params: &LaunchParams,
        cancel: &CancelToken,
    ) -> AppResult<LaunchOutcome> {
        let guard = ActivityGuard::acquire(&self.activity, Activity::Launch)?;
        self.launch_guarded(guard, run_dir, params, cancel)
    }

    /// Start [`launch`](Self::launch) on a background thread.
    ///
    /// Busy and configuration errors are reported here, before the thread
    /// starts.
    pub fn spawn_launch(&self, run_dir: &Path, params: LaunchParams) -> AppResult<LaunchHandle> {
        let guard = ActivityGuard::acquire(&self.activity, Activity::Launch)?;
        ensure_run_dir(run_dir)?;
        self.check_template(self.template_for(params.command_template.as_deref()))?;

        let cancel = CancelToken::new();
        let token = cancel.clone();
        let this = self.clone();
        let run_dir = run_dir.to_path_buf();
        let thread = thread::spawn(move || this.launch_guarded(guard, &run_dir, &params, &token));

        Ok(LaunchHandle { cancel, thread })
    }

    fn launch_guarded(
        &self,
        _guard: ActivityGuard,
        run_dir: &Path,
        params: &LaunchParams,
        cancel: &CancelToken,
    ) -> AppResult<LaunchOutcome> {
        ensure_run_dir(run_dir)?;
        let template = self.template_for(params.command_template.as_deref());
        self.check_template(template)?;

        let grid = effective_grid(&params.grid);
        let steps = effective_steps(&params.steps);
        let group_dir = grid_dir(run_dir, grid);
        fs::create_dir_all(&group_dir)?;
        let out_dir = group_dir.join(rep_dir_name(next_rep_index(&group_dir)?));
        fs::create_dir_all(&out_dir)?;

        let label = if params.equation_label.trim().is_empty() {
            crate::queue::UNNAMED_LABEL
        } else {
            params.equation_label.as_str()
        };
        tracing::info!(
            "[launch] {} grid={} steps={} seed={} -> {}",
            label,
            grid,
            steps,
            describe_seed(params.seed),
            out_dir.display()
        );

        let started = Instant::now();
        let plan = ExecutionPlan {
            label,
            grid,
            steps,
            seed: params.seed,
            out_dir: &out_dir,
            template,
        };
        let (status, message) = match self.execute(&plan, cancel) {
            Ok(output) => match output.exit {
                ProcessExit::Exited(0) => (LaunchStatus::Completed, None),
                ProcessExit::Canceled => (LaunchStatus::Canceled, None),
                other => (
                    LaunchStatus::Failed {
                        exit_code: other.code(),
                    },
                    None,
                ),
            },
            Err(err) => {
                tracing::warn!(out = %out_dir.display(), error = %err, "[launch] failed to start");
                (LaunchStatus::Failed { exit_code: None }, Some(err.to_string()))
            }
        };
        tracing::info!(status = ?status, out = %out_dir.display(), "[launch] finished");

        Ok(LaunchOutcome {
            out_dir,
            status,
            elapsed_wall_s: started.elapsed().as_secs_f64(),
            message,
        })
    }

    /// Resolve the selected profile's command with the current parameters and
    /// write it to `launch_preview.txt` in the run folder without running it.
    pub fn dry_run(
        &self,
        run_dir: &Path,
        profile: Option<&Profile>,
        grid: &str,
        steps: &str,
        seed: Option<i64>,
    ) -> AppResult<PathBuf> {
        ensure_run_dir(run_dir)?;
        let template = profile
            .and_then(|p| p.command.as_deref())
            .ok_or_else(|| AppError::Config("selected profile has no command template".to_string()))?;

        let vars = self.placeholders(effective_grid(grid), effective_steps(steps), seed, run_dir);
        let resolved = resolve_template(template, &vars);
        let label = profile.map(Profile::label).unwrap_or(crate::queue::UNNAMED_LABEL);

        let text = format!(
            "# Launch Dry-Run Preview\n# equation: {}\n# generated: {}\n# projectRoot: {}\n\n{}\n",
            label,
            timestamp_now(),
            self.toolchain.project_root.display(),
            resolved
        );
        let path = run_dir.join(PREVIEW_FILE);
        fs::write(&path, text)?;
        tracing::info!(path = %path.display(), command = %resolved, "launch preview written");
        Ok(path)
    }

    fn template_for<'a>(&'a self, item_template: Option<&'a str>) -> &'a str {
        item_template
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.config.command_template)
    }

    fn check_template(&self, template: &str) -> AppResult<()> {
        if self.toolchain.script.is_none() && requires_key(template, "script") {
            return Err(AppError::Config(format!(
                "command template needs {{script}} but no run_poisson.py or main.py was found under {}",
                self.toolchain.project_root.display()
            )));
        }
        Ok(())
    }

    fn placeholders(&self, grid: &str, steps: &str, seed: Option<i64>, out_dir: &Path) -> Placeholders {
        let mut vars = Placeholders::new()
            .with("python", self.toolchain.python.clone())
            .with("projectRoot", self.toolchain.project_root.display().to_string())
            .with("outDir", out_dir.display().to_string())
            .with("seedOpt", seed_opt(seed))
            .with_run_params(grid, steps);
        if let Some(script) = &self.toolchain.script {
            vars.set("script", script.display().to_string());
        }
        vars
    }

    /// Write side-files, run the process, and record the result in `host.log`.
    fn execute(&self, plan: &ExecutionPlan<'_>, cancel: &CancelToken) -> AppResult<ProcessOutput> {
        let vars = self.placeholders(plan.grid, plan.steps, plan.seed, plan.out_dir);
        let command_line = resolve_template(plan.template, &vars);
        tracing::debug!(command = %command_line, "resolved command");

        write_args_file(plan.out_dir, plan.grid, plan.steps, plan.seed)?;
        write_cmd_file(plan.out_dir, &command_line)?;
        let host_log = HostLog::new(
            plan.label,
            plan.grid,
            plan.steps,
            plan.seed,
            plan.out_dir,
            &command_line,
        );
        host_log.write_started()?;

        let output = split_command_line(&command_line).and_then(|(program, args)| {
            run_process(&program, &args, &self.toolchain.project_root, cancel)
        });
        match output {
            Ok(output) => {
                host_log.write_finished(HostLogEnding::Finished(&output))?;
                Ok(output)
            }
            Err(err) => {
                if let Err(log_err) = host_log.write_finished(HostLogEnding::StartFailed(err.to_string())) {
                    tracing::warn!(error = %log_err, "could not finish host.log");
                }
                Err(err)
            }
        }
    }
}

fn ensure_run_dir(run_dir: &Path) -> AppResult<()> {
    if run_dir.is_dir() {
        Ok(())
    } else {
        Err(AppError::NoRunDirectory(format!(
            "{} does not exist; create a run first",
            run_dir.display()
        )))
    }
}

