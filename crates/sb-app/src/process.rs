//! External process execution with full output capture and cancellation.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{AppError, AppResult};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Normal exit with a status code.
    Exited(i32),
    /// Killed by a signal it did not ask for.
    Terminated,
    /// Killed because the cancel token fired.
    Canceled,
}

impl ProcessExit {
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessExit::Exited(code) => Some(*code),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Exited(0))
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit: ProcessExit,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` in `cwd` until it exits or `cancel` fires.
///
/// Both streams are drained on reader threads while the child runs, so a
/// chatty process cannot block on a full pipe. On cancel the whole process
/// tree is killed.
pub fn run_process(
    program: &str,
    args: &[String],
    cwd: &Path,
    cancel: &CancelToken,
) -> AppResult<ProcessOutput> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(|source| AppError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let exit = match wait_or_cancel(&mut child, cancel) {
        Ok(exit) => exit,
        Err(err) => {
            kill_tree(&mut child);
            let _ = child.wait();
            return Err(err.into());
        }
    };

    Ok(ProcessOutput {
        exit,
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
    })
}

fn wait_or_cancel(child: &mut Child, cancel: &CancelToken) -> std::io::Result<ProcessExit> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(classify(status));
        }
        if cancel.is_canceled() {
            tracing::info!(pid = child.id(), "cancel requested; killing process tree");
            kill_tree(child);
            child.wait()?;
            return Ok(ProcessExit::Canceled);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn classify(status: ExitStatus) -> ProcessExit {
    match status.code() {
        Some(code) => ProcessExit::Exited(code),
        None => ProcessExit::Terminated,
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    // The child leads its own process group; signal the whole group.
    let pgid = child.id() as libc::pid_t;
    let ret = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if ret == -1 {
        tracing::debug!(
            error = %std::io::Error::last_os_error(),
            "process group kill failed; killing child only"
        );
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
