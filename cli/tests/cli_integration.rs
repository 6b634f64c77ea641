//! Integration tests driving the rasterload binary over fixture inputs.
//!
//! External commands are stubbed with `true`, `false`, and `sh` so the
//! tests exercise the real spawn/classify/report path without a database.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn rasterload_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rasterload"))
}

fn run_subcommand(dir: &Path, args: &[&str]) -> Output {
    Command::new(rasterload_bin())
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run rasterload")
}

fn write_input(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

#[test]
fn test_run_mixed_batch_writes_rerun_and_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        "batch.txt",
        &[
            "true first-ok",
            "false broken-tile",
            "sh -c 'printf \"WARNING: srid not found\\n\" 1>&2'",
            "true second-ok",
        ],
    );

    let output = run_subcommand(
        dir.path(),
        &[
            "run",
            "--input",
            input.to_str().unwrap(),
            "--command",
            "true",
            "--command",
            "false",
            "--command",
            "sh",
            "--jobs",
            "2",
        ],
    );

    assert_eq!(output.status.code(), Some(1), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Submitted: 4"));
    assert!(stdout.contains("success: 2"));
    assert!(stdout.contains("warning: 1"));
    assert!(stdout.contains("error:   1"));

    let rerun = fs::read_to_string(dir.path().join("batch.rerun.txt")).unwrap();
    assert_eq!(rerun.trim(), "false broken-tile");

    let log = fs::read_to_string(dir.path().join("batch.log")).unwrap();
    assert!(log.contains("batch complete: 4 total"));
}

#[test]
fn test_rerun_file_feeds_back_into_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "first.txt", &["true a", "false b"]);

    let output = run_subcommand(
        dir.path(),
        &[
            "run",
            "--input",
            input.to_str().unwrap(),
            "--command",
            "true",
            "--command",
            "false",
        ],
    );
    assert_eq!(output.status.code(), Some(1));

    // Swap the failing stub for a succeeding one and resubmit the rerun file.
    let rerun_path = dir.path().join("first.rerun.txt");
    assert!(rerun_path.exists());
    let output = run_subcommand(
        dir.path(),
        &[
            "run",
            "--input",
            rerun_path.to_str().unwrap(),
            "--command",
            "false",
        ],
    );
    // The single resubmitted job still fails (it is `false`), so a second
    // rerun file appears alongside the first.
    assert_eq!(output.status.code(), Some(1));
    let second = fs::read_to_string(dir.path().join("first.rerun.rerun.txt")).unwrap();
    assert_eq!(second.trim(), "false b");
}

#[test]
fn test_run_all_success_exits_0_with_json_summary() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "ok.txt", &["true a", "true b"]);

    let output = run_subcommand(
        dir.path(),
        &[
            "run",
            "--input",
            input.to_str().unwrap(),
            "--command",
            "true",
            "--format",
            "json",
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("invalid JSON summary: {e}\n{stdout}"));
    assert_eq!(parsed["total"], 2);
    assert_eq!(parsed["success"], 2);
    assert_eq!(parsed["error"], 0);
    assert!(!dir.path().join("ok.rerun.txt").exists());
}

#[test]
fn test_check_reports_invalid_lines_without_executing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        "check.txt",
        &[
            "raster2pgsql -s 4269 a.tif elevation.dem",
            "",
            "raster2pgsql -s # b.tif elevation.dem",
            "psql -c 'select 1'",
        ],
    );

    let output = run_subcommand(dir.path(), &["check", "--input", input.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 runnable command(s), 3 invalid line(s)."));
    assert!(stdout.contains("[empty]"));
    assert!(stdout.contains("[placeholder]"));
    assert!(stdout.contains("[unexpected_command]"));
    // check never runs anything and leaves no batch artifacts behind.
    assert!(!dir.path().join("check.log").exists());
}

#[test]
fn test_missing_input_is_fatal_exit_2() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_subcommand(
        dir.path(),
        &["run", "--input", "no-such-file.txt", "--command", "true"],
    );

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("no-such-file.txt"));
}

#[test]
fn test_load_rejects_invalid_params_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "tiles.txt", &["/data/a.tif"]);

    let output = run_subcommand(
        dir.path(),
        &[
            "load",
            "--input",
            input.to_str().unwrap(),
            "--srid",
            "0",
            "--schema",
            "elevation",
            "--table",
            "dem",
            "--user",
            "loader",
            "--dbname",
            "dshub",
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid SRID"));
    assert!(!dir.path().join("tiles.log").exists());
}

#[test]
fn test_strict_flag_escalates_keyword_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        "strict.txt",
        &["sh -c 'printf \"NOTICE: cannot reuse index\\n\" 1>&2'"],
    );

    let lenient = run_subcommand(
        dir.path(),
        &["run", "--input", input.to_str().unwrap(), "--command", "sh"],
    );
    assert_eq!(lenient.status.code(), Some(0));

    let strict = run_subcommand(
        dir.path(),
        &[
            "run",
            "--input",
            input.to_str().unwrap(),
            "--command",
            "sh",
            "--strict",
        ],
    );
    assert_eq!(strict.status.code(), Some(1));
}
