use std::path::PathBuf;

use sb_core::RequestId;

use crate::queue::RunStatus;

/// Batch progress, delivered to an optional callback as the batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    ItemStarted {
        id: RequestId,
        position: usize,
        total: usize,
        label: String,
        rep_index: u32,
        out_dir: PathBuf,
    },
    ItemFinished {
        id: RequestId,
        position: usize,
        total: usize,
        status: RunStatus,
        exit_code: Option<i32>,
        elapsed_wall_s: f64,
        message: Option<String>,
    },
    /// Removed or no longer queued when its turn came.
    ItemSkipped { id: RequestId, position: usize },
    BatchFinished {
        succeeded: usize,
        failed: usize,
        elapsed_wall_s: f64,
    },
}

pub(crate) fn emit(progress_cb: &mut Option<&mut dyn FnMut(BatchEvent)>, event: BatchEvent) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(event);
    }
}
