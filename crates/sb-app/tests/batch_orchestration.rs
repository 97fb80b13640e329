#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sb_app::*;

const FAKE_SIM: &str = r#"#!/bin/sh
out=""
seed=""
grid=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift 2 ;;
    --seed) seed="$2"; shift 2 ;;
    --grid) grid="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case "$out" in
  *rep_002) echo "replicate two always fails" 1>&2; exit 7 ;;
esac
echo "simulating grid=$grid"
echo "METRIC value=${seed:-0}.25" > "$out/run.log"
"#;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{}_{}", prefix, nanos));
    fs::create_dir_all(&dir).unwrap();
    dir
}

struct Fixture {
    orchestrator: Orchestrator,
    run_dir: PathBuf,
}

fn fixture(prefix: &str, template: &str) -> Fixture {
    let project = unique_temp_dir(prefix);
    let script = project.join("fake_sim.sh");
    fs::write(&script, FAKE_SIM).unwrap();

    let run_dir = project.join("runs").join("run_20240101_000000");
    fs::create_dir_all(&run_dir).unwrap();

    let config = SimbatchConfig {
        runs_root: project.join("runs"),
        command_template: template.to_string(),
        ..SimbatchConfig::default()
    };
    let toolchain = Toolchain {
        project_root: project.clone(),
        python: "sh".to_string(),
        script: Some(script),
    };
    Fixture {
        orchestrator: Orchestrator::new(config, toolchain),
        run_dir,
    }
}

fn spec(grid: &str, replicates: u32, base_seed: Option<i64>) -> ReplicateSpec {
    ReplicateSpec {
        equation_label: "Fake Poisson".to_string(),
        grid: grid.to_string(),
        steps: "5".to_string(),
        replicates,
        base_seed,
        command_template: None,
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn failing_item_does_not_stop_the_batch() {
    let fx = fixture("sb_app_batch", DEFAULT_TEMPLATE);
    let queue = Mutex::new(RunQueue::new());
    let ids = queue
        .lock()
        .unwrap()
        .enqueue_replicates(&fx.run_dir, &spec("64", 3, Some(10)))
        .unwrap();
    assert_eq!(ids.len(), 3);

    let mut events = Vec::new();
    let mut on_event = |event: BatchEvent| events.push(event);
    let report = fx
        .orchestrator
        .run_batch(&queue, &fx.run_dir, Some(&mut on_event))
        .unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.attempted(), 3);

    let queue = queue.lock().unwrap();
    let statuses: Vec<RunStatus> = ids.iter().map(|id| queue.get(*id).unwrap().status).collect();
    assert_eq!(
        statuses,
        vec![RunStatus::Done, RunStatus::Failed, RunStatus::Done]
    );
    assert_eq!(
        queue.counts(),
        QueueCounts {
            queued: 0,
            running: 0,
            done: 2,
            failed: 1
        }
    );

    let seeds: Vec<Option<i64>> = ids.iter().map(|id| queue.get(*id).unwrap().seed).collect();
    assert_eq!(seeds, vec![Some(10), Some(11), Some(12)]);

    let second = queue.get(ids[1]).unwrap();
    assert!(second.out_dir.ends_with("grid_64/rep_002"));
    let args = read(&second.out_dir.join("args.txt"));
    assert_eq!(
        args,
        format!(
            "--grid 64\n--steps 5\n--seed 11\n--out \"{}\"\n",
            second.out_dir.display()
        )
    );
    let cmd = read(&second.out_dir.join("cmd.txt"));
    assert!(cmd.starts_with("sh \""));
    assert!(cmd.contains("--grid 64 --steps 5 --seed 11 --out"));
    let host = read(&second.out_dir.join("host.log"));
    assert!(host.contains("# equation: Fake Poisson\n"));
    assert!(host.contains("# seed: 11\n"));
    assert!(host.contains("\n# stderr:\nreplicate two always fails\n"));
    assert!(host.contains("\n# exit code: 7\n"));

    let first = queue.get(ids[0]).unwrap();
    assert_eq!(read(&first.out_dir.join("run.log")), "METRIC value=10.25\n");
    let host = read(&first.out_dir.join("host.log"));
    assert!(host.contains("simulating grid=64\n"));
    assert!(host.contains("# exit code: 0\n"));

    let finished: Vec<(RunStatus, Option<i32>)> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::ItemFinished {
                status, exit_code, ..
            } => Some((*status, *exit_code)),
            _ => None,
        })
        .collect();
    assert_eq!(
        finished,
        vec![
            (RunStatus::Done, Some(0)),
            (RunStatus::Failed, Some(7)),
            (RunStatus::Done, Some(0))
        ]
    );
    assert!(matches!(
        events.last(),
        Some(BatchEvent::BatchFinished {
            succeeded: 2,
            failed: 1,
            ..
        })
    ));
}

#[test]
fn unseeded_replicates_pass_no_seed() {
    let fx = fixture("sb_app_noseed", DEFAULT_TEMPLATE);
    let mut queue = RunQueue::new();
    let ids = queue
        .enqueue_replicates(&fx.run_dir, &spec("", 3, None))
        .unwrap();

    for (k, id) in ids.iter().enumerate() {
        let item = queue.get(*id).unwrap();
        assert_eq!(item.seed, None);
        assert_eq!(item.grid, "256");
        assert_eq!(item.rep_index, k as u32 + 1);
        assert_eq!(item.rep_total, 3);
        assert_eq!(item.status, RunStatus::Queued);
        assert!(item.out_dir.is_dir());
    }

    let queue = Mutex::new(queue);
    fx.orchestrator.run_batch(&queue, &fx.run_dir, None).unwrap();
    let queue = queue.lock().unwrap();
    let first = queue.get(ids[0]).unwrap();
    assert!(!read(&first.out_dir.join("args.txt")).contains("--seed"));
    assert!(!read(&first.out_dir.join("cmd.txt")).contains("--seed"));
    assert!(!read(&first.out_dir.join("host.log")).contains("# seed:"));
}

#[test]
fn replicate_numbering_continues_after_gaps() {
    let fx = fixture("sb_app_gaps", DEFAULT_TEMPLATE);
    let group = fx.run_dir.join("grid_32");
    fs::create_dir_all(group.join("rep_001")).unwrap();
    fs::create_dir_all(group.join("rep_003")).unwrap();

    let mut queue = RunQueue::new();
    let ids = queue
        .enqueue_replicates(&fx.run_dir, &spec("32", 0, None))
        .unwrap();
    assert_eq!(ids.len(), 1);
    let item = queue.get(ids[0]).unwrap();
    assert_eq!(item.rep_index, 4);
    assert_eq!(item.rep_total, 1);
    assert_eq!(item.out_dir, group.join("rep_004"));
}

#[test]
fn configuration_errors_come_before_any_work() {
    let fx = fixture("sb_app_config", DEFAULT_TEMPLATE);
    let queue = Mutex::new(RunQueue::new());

    assert!(matches!(
        fx.orchestrator.run_batch(&queue, &fx.run_dir, None),
        Err(AppError::NothingToRun)
    ));
    assert!(matches!(
        fx.orchestrator
            .run_batch(&queue, &fx.run_dir.join("missing"), None),
        Err(AppError::NoRunDirectory(_))
    ));

    // A template that needs {script} with no script discovered.
    let no_script = Orchestrator::new(
        fx.orchestrator.config().clone(),
        Toolchain {
            script: None,
            ..fx.orchestrator.toolchain().clone()
        },
    );
    let id = queue
        .lock()
        .unwrap()
        .enqueue_replicates(&fx.run_dir, &spec("8", 1, None))
        .unwrap()[0];
    assert!(matches!(
        no_script.run_batch(&queue, &fx.run_dir, None),
        Err(AppError::Config(_))
    ));
    let queue = queue.lock().unwrap();
    let item = queue.get(id).unwrap();
    assert_eq!(item.status, RunStatus::Queued);
    assert!(!item.out_dir.join("args.txt").exists());
    assert_eq!(no_script.activity(), Activity::Idle);
}

#[test]
fn items_removed_mid_batch_are_skipped_and_late_items_wait() {
    let fx = fixture("sb_app_snapshot", DEFAULT_TEMPLATE);
    let queue = Mutex::new(RunQueue::new());
    let ids = queue
        .lock()
        .unwrap()
        .enqueue_replicates(&fx.run_dir, &spec("16", 3, Some(1)))
        .unwrap();
    let third = ids[2];
    let mut late = Vec::new();

    let run_dir = fx.run_dir.clone();
    let mut on_event = |event: BatchEvent| {
        if let BatchEvent::ItemStarted { position: 1, .. } = event {
            let mut q = queue.lock().unwrap();
            assert_eq!(q.remove(&[third]), 1);
            late = q.enqueue_replicates(&run_dir, &spec("16", 1, None)).unwrap();
        }
    };
    let report = fx
        .orchestrator
        .run_batch(&queue, &fx.run_dir, Some(&mut on_event))
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);

    let queue = queue.lock().unwrap();
    assert!(queue.get(third).is_none());
    assert_eq!(late.len(), 1);
    assert_eq!(queue.get(late[0]).unwrap().status, RunStatus::Queued);
    assert_eq!(queue.queued_ids(), late);
}

#[test]
fn launch_can_be_canceled_and_blocks_other_work() {
    let fx = fixture("sb_app_cancel", r#"sh -c "echo started; sleep 30""#);
    let params = LaunchParams {
        equation_label: "Slow".to_string(),
        grid: "8".to_string(),
        steps: "1".to_string(),
        seed: Some(3),
        command_template: None,
    };

    let handle = fx
        .orchestrator
        .spawn_launch(&fx.run_dir, params.clone())
        .unwrap();
    assert_eq!(fx.orchestrator.activity(), Activity::Launch);

    assert!(matches!(
        fx.orchestrator
            .launch(&fx.run_dir, &params, &CancelToken::new()),
        Err(AppError::Busy(_))
    ));
    let queue = Mutex::new(RunQueue::new());
    assert!(matches!(
        fx.orchestrator.run_batch(&queue, &fx.run_dir, None),
        Err(AppError::Busy(_))
    ));

    std::thread::sleep(Duration::from_millis(200));
    assert!(!handle.is_finished());
    handle.cancel();
    let outcome = handle.join().unwrap();

    assert_eq!(outcome.status, LaunchStatus::Canceled);
    assert!(outcome.out_dir.ends_with("grid_8/rep_001"));
    assert!(outcome.elapsed_wall_s < 20.0);
    let host = read(&outcome.out_dir.join("host.log"));
    assert!(host.contains("# equation: Slow\n"));
    assert!(host.contains("\n# canceled\n"));
    assert!(!host.contains("# exit code"));
    assert_eq!(fx.orchestrator.activity(), Activity::Idle);
}

#[test]
fn blocking_launch_reports_exit_status() {
    let fx = fixture("sb_app_launch", DEFAULT_TEMPLATE);
    let params = LaunchParams {
        equation_label: String::new(),
        grid: "4".to_string(),
        steps: "2".to_string(),
        seed: Some(42),
        command_template: None,
    };

    let first = fx
        .orchestrator
        .launch(&fx.run_dir, &params, &CancelToken::new())
        .unwrap();
    assert_eq!(first.status, LaunchStatus::Completed);
    assert_eq!(read(&first.out_dir.join("run.log")), "METRIC value=42.25\n");
    assert!(read(&first.out_dir.join("host.log")).contains("# equation: (unnamed)\n"));

    // The fake simulation fails every rep_002.
    let second = fx
        .orchestrator
        .launch(&fx.run_dir, &params, &CancelToken::new())
        .unwrap();
    assert_eq!(second.status, LaunchStatus::Failed { exit_code: Some(7) });
    assert!(second.out_dir.ends_with("grid_4/rep_002"));
}

#[test]
fn unknown_program_marks_item_failed() {
    let fx = fixture("sb_app_nostart", r#""/no/such/simulator" --grid {grid}"#);
    let queue = Mutex::new(RunQueue::new());
    let id = queue
        .lock()
        .unwrap()
        .enqueue_replicates(&fx.run_dir, &spec("8", 1, None))
        .unwrap()[0];

    let report = fx.orchestrator.run_batch(&queue, &fx.run_dir, None).unwrap();
    assert_eq!(report.failed, 1);

    let queue = queue.lock().unwrap();
    let item = queue.get(id).unwrap();
    assert_eq!(item.status, RunStatus::Failed);
    let host = read(&item.out_dir.join("host.log"));
    assert!(host.contains("# cmd: \"/no/such/simulator\" --grid 8\n"));
    assert!(host.contains("# error: "));
}

#[test]
fn launch_that_cannot_start_reports_failure() {
    let fx = fixture("sb_app_launch_nostart", r#""/no/such/simulator" --grid {grid}"#);
    let params = LaunchParams {
        grid: "8".to_string(),
        steps: "2".to_string(),
        ..LaunchParams::default()
    };

    let outcome = fx
        .orchestrator
        .launch(&fx.run_dir, &params, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.status, LaunchStatus::Failed { exit_code: None });
    assert!(outcome.message.as_deref().is_some_and(|m| m.contains("/no/such/simulator")));
    assert!(read(&outcome.out_dir.join("host.log")).contains("# error: "));
    assert_eq!(fx.orchestrator.activity(), Activity::Idle);
}

#[test]
fn exhausted_replicate_numbering_is_rejected() {
    let fx = fixture("sb_app_rep_limit", DEFAULT_TEMPLATE);
    let group = fx.run_dir.join("grid_8");
    fs::create_dir_all(group.join(format!("rep_{}", u32::MAX))).unwrap();

    let mut queue = RunQueue::new();
    let err = queue
        .enqueue_replicates(&fx.run_dir, &spec("8", 2, None))
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(queue.is_empty());
}

#[test]
fn dry_run_writes_preview() {
    let fx = fixture("sb_app_dry", DEFAULT_TEMPLATE);
    let profile = sb_catalog::Profile {
        id: "poisson".to_string(),
        name: "Newtonian Poisson".to_string(),
        command: Some("{python} \"{script}\" --grid {gridSize} --steps {timeSteps} --out \"{outDir}\" {unknown}".to_string()),
    };

    let path = fx
        .orchestrator
        .dry_run(&fx.run_dir, Some(&profile), "128", "", None)
        .unwrap();
    assert_eq!(path, fx.run_dir.join("launch_preview.txt"));

    let text = read(&path);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "# Launch Dry-Run Preview");
    assert_eq!(lines[1], "# equation: Newtonian Poisson");
    assert!(lines[2].starts_with("# generated: "));
    assert_eq!(
        lines[3],
        format!(
            "# projectRoot: {}",
            fx.orchestrator.toolchain().project_root.display()
        )
    );
    assert_eq!(lines[4], "");
    assert!(lines[5].starts_with("sh \""));
    assert!(lines[5].contains("--grid 128 --steps 1000 --out"));
    assert!(lines[5].ends_with("{unknown}"));

    let bare = sb_catalog::Profile {
        command: None,
        ..profile
    };
    assert!(matches!(
        fx.orchestrator
            .dry_run(&fx.run_dir, Some(&bare), "128", "10", None),
        Err(AppError::Config(_))
    ));
}
