//! Service layer for simbatch.
//!
//! Front ends (the CLI today) drive everything through this crate: the run
//! queue, the orchestrator that executes queued runs one at a time, and the
//! aggregation pass that turns a finished run into reports.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod queue;
pub mod sidefiles;
pub mod template;
pub mod toolchain;

pub use aggregate::{AggregateReport, SkippedEntry, aggregate_run};
pub use config::{DEFAULT_CONFIG_FILE, DEFAULT_GRID, DEFAULT_STEPS, SimbatchConfig};
pub use error::{AppError, AppResult};
pub use orchestrator::{
    Activity, BatchReport, LaunchHandle, LaunchOutcome, LaunchParams, LaunchStatus, Orchestrator,
};
pub use process::{CancelToken, ProcessExit, ProcessOutput, run_process};
pub use progress::BatchEvent;
pub use queue::{QueueCounts, ReplicateSpec, RunQueue, RunRequest, RunStatus};
pub use template::{DEFAULT_TEMPLATE, Placeholders, resolve_template, split_command_line};
pub use toolchain::Toolchain;
