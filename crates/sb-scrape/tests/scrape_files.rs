use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use sb_scrape::{
    MetricOutcome, extract_grid, extract_metric, extract_seed, extract_seed_from_candidates,
};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{}_{}", prefix, nanos));
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir
}

#[test]
fn missing_and_empty_logs() {
    let dir = unique_temp_dir("sb_scrape_missing");

    let missing = extract_metric(&dir.join("run.log"));
    assert_eq!(missing, MetricOutcome::MissingLog);
    assert_eq!(missing.note(), "no run.log");
    assert_eq!(missing.value(), None);

    let empty = dir.join("empty.log");
    fs::write(&empty, "").unwrap();
    assert_eq!(extract_metric(&empty), MetricOutcome::NoMetric);
}

#[test]
fn reads_metric_from_backend_style_log() {
    let dir = unique_temp_dir("sb_scrape_backend");
    let log = dir.join("run.log");
    fs::write(
        &log,
        "[step 0] grid=64 work=512\n[step 100] grid=64 work=512\nelapsed_s=0.731204\nMETRIC value=0.731204\n",
    )
    .unwrap();

    let out = extract_metric(&log);
    assert_eq!(out.value(), Some(0.731204));
    assert_eq!(out.note(), "METRIC value");
}

#[test]
fn invalid_utf8_is_tolerated() {
    let dir = unique_temp_dir("sb_scrape_binary");
    let log = dir.join("run.log");
    let mut bytes = vec![0xff, 0xfe, b'\n'];
    bytes.extend_from_slice(b"elapsed_s=9.5\n");
    fs::write(&log, bytes).unwrap();

    assert_eq!(extract_metric(&log).value(), Some(9.5));
}

#[test]
fn directory_in_place_of_log_is_missing() {
    let dir = unique_temp_dir("sb_scrape_dir");
    let fake = dir.join("run.log");
    fs::create_dir_all(&fake).unwrap();
    assert_eq!(extract_metric(&fake), MetricOutcome::MissingLog);
}

#[test]
fn seed_priority_order() {
    let dir = unique_temp_dir("sb_scrape_seed");
    let args = dir.join("args.txt");
    let run_args = dir.join("run_args.txt");
    let cmd = dir.join("cmd.txt");
    let log = dir.join("run.log");

    fs::write(&args, "--grid 64\n--steps 10\n--out \"x\"\n").unwrap();
    fs::write(&cmd, "python run.py --grid 64 --seed 21 --out x\n").unwrap();
    fs::write(&log, "seed --seed=99\n").unwrap();

    // args.txt has no seed and run_args.txt is missing: cmd.txt wins.
    let found = extract_seed_from_candidates(&[&args, &run_args, &cmd, &log]);
    assert_eq!(found, Some(21));

    fs::write(&args, "--grid 64\n--seed nope\n--seed 5\n").unwrap();
    assert_eq!(extract_seed(&args), Some(5));
    assert_eq!(
        extract_seed_from_candidates(&[&args, &run_args, &cmd, &log]),
        Some(5)
    );

    assert_eq!(extract_grid(&args), Some(64));
    assert_eq!(extract_seed(&run_args), None);
}
