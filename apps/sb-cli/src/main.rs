use clap::{Args, Parser, Subcommand};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use tracing_subscriber::{EnvFilter, fmt};

use sb_app::{
    AppError, AppResult, BatchEvent, DEFAULT_CONFIG_FILE, LaunchParams, LaunchStatus,
    Orchestrator, ReplicateSpec, RunQueue, RunStatus, SimbatchConfig, Toolchain, aggregate_run,
};
use sb_catalog::{Catalog, Profile};
use sb_results::RunLayout;

const ACTIVITY_LOG: &str = "activity.log";

#[derive(Parser)]
#[command(name = "sb-cli")]
#[command(about = "simbatch - batch host for external simulation runs", long_about = None)]
struct Cli {
    /// Configuration file (YAML); missing default file means built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the runs root directory
    #[arg(long, global = true)]
    runs_root: Option<PathBuf>,
    /// Override the project root (where the simulation script lives)
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new run directory under the runs root
    NewRun,
    /// List run directories, marking the newest
    Runs,
    /// List simulation profiles from the catalog
    Profiles,
    /// Enqueue replicates and execute them one after another
    Batch {
        #[command(flatten)]
        params: RunParams,
        /// Number of replicates to enqueue
        #[arg(long, default_value_t = 1)]
        replicates: u32,
    },
    /// Run a single replicate; `--timeout` cancels it
    Launch {
        #[command(flatten)]
        params: RunParams,
        /// Cancel the run after this many seconds
        #[arg(long)]
        timeout: Option<f64>,
    },
    /// Resolve the profile command without running it
    DryRun {
        #[command(flatten)]
        params: RunParams,
    },
    /// Aggregate replicate metrics into reports
    Aggregate {
        /// Run directory (defaults to the newest run)
        #[arg(long)]
        run: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunParams {
    /// Grid size (defaults to the configured grid)
    #[arg(long)]
    grid: Option<String>,
    /// Time steps (defaults to the configured steps)
    #[arg(long)]
    steps: Option<String>,
    /// Seed; with replicates, the k-th replicate gets seed + k
    #[arg(long)]
    seed: Option<i64>,
    /// Profile id from the catalog (defaults to the first profile)
    #[arg(long)]
    profile: Option<String>,
    /// Run directory (defaults to the newest run)
    #[arg(long)]
    run: Option<PathBuf>,
}

struct Context {
    config: SimbatchConfig,
    toolchain: Toolchain,
    layout: RunLayout,
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_tracing(&config.runs_root);

    let cwd = std::env::current_dir()?;
    let toolchain = Toolchain::discover(&config, &cwd);
    let layout = RunLayout::new(config.runs_root.clone());
    let ctx = Context {
        config,
        toolchain,
        layout,
    };

    let result = match cli.command {
        Commands::NewRun => cmd_new_run(&ctx),
        Commands::Runs => cmd_runs(&ctx),
        Commands::Profiles => cmd_profiles(&ctx),
        Commands::Batch { params, replicates } => cmd_batch(&ctx, &params, replicates),
        Commands::Launch { params, timeout } => cmd_launch(&ctx, &params, timeout),
        Commands::DryRun { params } => cmd_dry_run(&ctx, &params),
        Commands::Aggregate { run } => cmd_aggregate(&ctx, run.as_deref()),
    };
    if let Err(err) = &result {
        tracing::error!(error = %err, "command failed");
    }
    result
}

fn load_config(cli: &Cli) -> AppResult<SimbatchConfig> {
    let mut config = match &cli.config {
        Some(path) => SimbatchConfig::load(path)?,
        None => SimbatchConfig::load_or_default(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    if let Some(root) = &cli.runs_root {
        config.runs_root = root.clone();
    }
    if let Some(root) = &cli.project_root {
        config.project_root = Some(root.clone());
    }
    Ok(config)
}

/// Log to stderr and append to `<runs_root>/activity.log`.
fn init_tracing(runs_root: &Path) {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    let file_layer = fs::create_dir_all(runs_root)
        .and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(runs_root.join(ACTIVITY_LOG))
        })
        .map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter())
        });

    match file_layer {
        Ok(file_layer) => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        Err(err) => {
            tracing_subscriber::registry().with(stderr_layer).init();
            tracing::warn!(error = %err, "activity log unavailable; logging to stderr only");
        }
    }
}

fn cmd_new_run(ctx: &Context) -> AppResult<()> {
    let run_dir = ctx.layout.create_run()?;
    println!("✓ Created run: {}", run_dir.display());
    Ok(())
}

fn cmd_runs(ctx: &Context) -> AppResult<()> {
    let runs = ctx.layout.list_runs()?;
    if runs.is_empty() {
        println!("No runs under {}", ctx.layout.root().display());
        return Ok(());
    }

    let newest = ctx.layout.newest_run()?;
    println!("Runs under {}:", ctx.layout.root().display());
    for run in runs {
        let marker = if newest.as_ref() == Some(&run) { "*" } else { " " };
        println!("{} {}", marker, sb_results::dir_name(&run));
    }
    Ok(())
}

fn cmd_profiles(ctx: &Context) -> AppResult<()> {
    let catalog = Catalog::load(&equations_dir(ctx))?;
    if catalog.is_empty() {
        println!("No profiles in {}", catalog.dir().display());
        return Ok(());
    }

    println!("Profiles in {}:", catalog.dir().display());
    for profile in catalog.profiles() {
        let command = if profile.command.is_some() {
            "command"
        } else {
            "default command"
        };
        println!("  {} - {} ({})", profile.id, profile.label(), command);
    }
    Ok(())
}

fn cmd_batch(ctx: &Context, params: &RunParams, replicates: u32) -> AppResult<()> {
    let run_dir = resolve_run_dir(ctx, params.run.as_deref())?;
    let profile = select_profile(ctx, params.profile.as_deref())?;

    let spec = ReplicateSpec {
        equation_label: profile
            .as_ref()
            .map(|p| p.label().to_string())
            .unwrap_or_default(),
        grid: params.grid.clone().unwrap_or_else(|| ctx.config.default_grid.clone()),
        steps: params.steps.clone().unwrap_or_else(|| ctx.config.default_steps.clone()),
        replicates,
        base_seed: params.seed,
        command_template: profile.and_then(|p| p.command),
    };

    let queue = Mutex::new(RunQueue::new());
    queue
        .lock()
        .map_err(|_| AppError::InvalidInput("queue lock poisoned".to_string()))?
        .enqueue_replicates(&run_dir, &spec)?;

    println!("Running batch in {}", run_dir.display());
    let orchestrator = Orchestrator::new(ctx.config.clone(), ctx.toolchain.clone());
    let report = orchestrator.run_batch(
        &queue,
        &run_dir,
        Some(&mut |event| render_batch_event(&event)),
    )?;

    println!(
        "Queue finished. Success={}, Failed={} ({:.2} s)",
        report.succeeded, report.failed, report.elapsed_wall_s
    );
    Ok(())
}

fn render_batch_event(event: &BatchEvent) {
    match event {
        BatchEvent::ItemStarted {
            position,
            total,
            label,
            rep_index,
            out_dir,
            ..
        } => {
            println!(
                "[{}/{}] {} rep {} -> {}",
                position,
                total,
                label,
                rep_index,
                out_dir.display()
            );
        }
        BatchEvent::ItemFinished {
            position,
            total,
            status,
            exit_code,
            elapsed_wall_s,
            message,
            ..
        } => {
            let symbol = if *status == RunStatus::Done { "✓" } else { "✗" };
            let code = exit_code.map_or_else(|| "-".to_string(), |c| c.to_string());
            println!(
                "  {} [{}/{}] {} (exit {}, {:.2} s)",
                symbol, position, total, status, code, elapsed_wall_s
            );
            if let Some(message) = message {
                println!("    {}", message);
            }
        }
        BatchEvent::ItemSkipped { position, .. } => {
            println!("  - [{}] skipped (no longer queued)", position);
        }
        BatchEvent::BatchFinished { .. } => {}
    }
}

fn cmd_launch(ctx: &Context, params: &RunParams, timeout: Option<f64>) -> AppResult<()> {
    let run_dir = resolve_run_dir(ctx, params.run.as_deref())?;
    let profile = select_profile(ctx, params.profile.as_deref())?;
    let launch = LaunchParams::from_profile(
        profile.as_ref(),
        params.grid.as_deref().unwrap_or(&ctx.config.default_grid),
        params.steps.as_deref().unwrap_or(&ctx.config.default_steps),
        params.seed,
    );

    let deadline = match timeout {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => {
            return Err(AppError::InvalidInput(format!("invalid timeout: {}", secs)));
        }
        None => None,
    };

    let orchestrator = Orchestrator::new(ctx.config.clone(), ctx.toolchain.clone());
    let handle = orchestrator.spawn_launch(&run_dir, launch)?;
    println!("Launching in {}", run_dir.display());

    let started = Instant::now();
    while !handle.is_finished() {
        if let Some(limit) = deadline
            && started.elapsed() >= limit
        {
            println!("Timeout reached; canceling");
            handle.cancel();
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    let outcome = handle.join()?;

    match outcome.status {
        LaunchStatus::Completed => println!(
            "✓ Launch completed ({:.2} s): {}",
            outcome.elapsed_wall_s,
            outcome.out_dir.display()
        ),
        LaunchStatus::Failed { exit_code } => {
            println!(
                "✗ Launch failed (exit {}): {}",
                exit_code.map_or_else(|| "-".to_string(), |c| c.to_string()),
                outcome.out_dir.display()
            );
            if let Some(message) = &outcome.message {
                println!("  {}", message);
            }
        }
        LaunchStatus::Canceled => {
            println!("✗ Launch canceled: {}", outcome.out_dir.display())
        }
    }
    Ok(())
}

fn cmd_dry_run(ctx: &Context, params: &RunParams) -> AppResult<()> {
    let run_dir = resolve_run_dir(ctx, params.run.as_deref())?;
    let profile = select_profile(ctx, params.profile.as_deref())?;

    let orchestrator = Orchestrator::new(ctx.config.clone(), ctx.toolchain.clone());
    let path = orchestrator.dry_run(
        &run_dir,
        profile.as_ref(),
        params.grid.as_deref().unwrap_or(&ctx.config.default_grid),
        params.steps.as_deref().unwrap_or(&ctx.config.default_steps),
        params.seed,
    )?;

    println!("✓ Launch preview written: {}", path.display());
    if let Some(command) = fs::read_to_string(&path)?.lines().last() {
        println!("  {}", command);
    }
    Ok(())
}

fn cmd_aggregate(ctx: &Context, run: Option<&Path>) -> AppResult<()> {
    let run_dir = resolve_run_dir(ctx, run)?;
    println!("Aggregating {}", run_dir.display());

    let report = aggregate_run(&run_dir)?;
    for row in &report.groups {
        println!(
            "  grid {:>6}  n = {:<4} mean ± stderr = {}",
            row.grid, row.n, row.pretty
        );
    }
    if !report.skipped.is_empty() {
        println!("Skipped {} folder(s):", report.skipped.len());
        for entry in &report.skipped {
            println!("  {} ({})", entry.path.display(), entry.reason);
        }
    }
    println!("✓ Summary: {}", report.tsv_path.display());
    println!("✓ Summary: {}", report.jsonl_path.display());
    Ok(())
}

fn resolve_run_dir(ctx: &Context, explicit: Option<&Path>) -> AppResult<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir.to_path_buf()),
        None => ctx.layout.newest_run()?.ok_or_else(|| {
            AppError::NoRunDirectory(format!(
                "no run_* folder under {}; use `new-run` first",
                ctx.layout.root().display()
            ))
        }),
    }
}

fn equations_dir(ctx: &Context) -> PathBuf {
    ctx.config
        .equations_dir
        .clone()
        .or_else(|| sb_catalog::find_equations_dir(&ctx.toolchain.project_root))
        .unwrap_or_else(|| ctx.toolchain.project_root.join(sb_catalog::EQUATIONS_DIR))
}

/// The requested profile, or the catalog's first profile when none is named.
///
/// Without a catalog, runs fall back to the configured default template.
fn select_profile(ctx: &Context, id: Option<&str>) -> AppResult<Option<Profile>> {
    let dir = equations_dir(ctx);
    match id {
        Some(id) => {
            let catalog = Catalog::load(&dir)?;
            Ok(Some(catalog.get(id)?.clone()))
        }
        None => match Catalog::load(&dir) {
            Ok(catalog) => Ok(catalog.first().cloned()),
            Err(err) => {
                tracing::debug!(error = %err, "no catalog; using default template");
                Ok(None)
            }
        },
    }
}
