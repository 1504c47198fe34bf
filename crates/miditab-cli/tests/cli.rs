//! End-to-end tests for the `miditab` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const NOTES_CSV: &str = "track,time,duration,note\nTrack2,0,480,60\nTrack2,960,480,64\n";

fn miditab(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("miditab").unwrap();
    // keep ./miditab.toml and the user's config.toml out of the way
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join(".config"));
    cmd
}

fn encode_fixture(dir: &TempDir) -> std::path::PathBuf {
    let csv = dir.path().join("notes.csv");
    let mid = dir.path().join("notes.mid");
    fs::write(&csv, NOTES_CSV).unwrap();

    miditab(dir)
        .arg("encode")
        .arg(&csv)
        .arg(&mid)
        .assert()
        .success();
    mid
}

#[cfg(target_os = "linux")]
#[test]
fn user_config_is_read_from_config_home() {
    let dir = TempDir::new().unwrap();
    let user_dir = dir.path().join(".config").join("miditab");
    fs::create_dir_all(&user_dir).unwrap();
    fs::write(user_dir.join("config.toml"), "[encode]\nticks_per_beat = 240\n").unwrap();
    let mid = encode_fixture(&dir);

    miditab(&dir)
        .arg("notes")
        .arg(&mid)
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ticks_per_beat\": 240"));
}

#[test]
fn tempo_prints_microseconds() {
    let dir = TempDir::new().unwrap();
    miditab(&dir)
        .args(["tempo", "120"])
        .assert()
        .success()
        .stdout("500000\n");
}

#[test]
fn zero_tempo_fails() {
    let dir = TempDir::new().unwrap();
    miditab(&dir)
        .args(["tempo", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid tempo"));
}

#[test]
fn encode_then_extract_notes() {
    let dir = TempDir::new().unwrap();
    let mid = encode_fixture(&dir);

    miditab(&dir)
        .arg("notes")
        .arg(&mid)
        .assert()
        .success()
        .stdout(NOTES_CSV);
}

#[test]
fn events_as_json() {
    let dir = TempDir::new().unwrap();
    let mid = encode_fixture(&dir);

    miditab(&dir)
        .arg("events")
        .arg(&mid)
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"set_tempo\""))
        .stdout(predicate::str::contains("\"tempo\": 500000"));
}

#[test]
fn events_to_file() {
    let dir = TempDir::new().unwrap();
    let mid = encode_fixture(&dir);
    let out = dir.path().join("events.csv");

    miditab(&dir)
        .arg("events")
        .arg(&mid)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let csv = fs::read_to_string(&out).unwrap();
    assert!(csv.starts_with("type,tempo,time,meta,track,tick"));
    assert!(csv.contains("note_on,"));
}

#[test]
fn overlapping_notes_out_of_order_fail_to_encode() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("bad.csv");
    fs::write(&csv, "track,time,duration,note\nA,960,480,60\nA,0,480,62\n").unwrap();

    miditab(&dir)
        .arg("encode")
        .arg(&csv)
        .arg(dir.path().join("bad.mid"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to adjust"));

    miditab(&dir)
        .arg("encode")
        .arg(&csv)
        .arg(dir.path().join("sorted.mid"))
        .arg("--sort-by-start")
        .assert()
        .success();
}

#[test]
fn config_file_sets_resolution() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    fs::write(&config, "[encode]\nticks_per_beat = 480\n").unwrap();
    let csv = dir.path().join("notes.csv");
    let mid = dir.path().join("notes.mid");
    fs::write(&csv, NOTES_CSV).unwrap();

    miditab(&dir)
        .arg("--config")
        .arg(&config)
        .arg("encode")
        .arg(&csv)
        .arg(&mid)
        .assert()
        .success();

    miditab(&dir)
        .arg("notes")
        .arg(&mid)
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ticks_per_beat\": 480"));
}

#[test]
fn dataset_converts_directory() {
    let dir = TempDir::new().unwrap();
    let mid = encode_fixture(&dir);
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir(&input).unwrap();
    fs::copy(&mid, input.join("piece.mid")).unwrap();
    fs::write(input.join("readme.txt"), "not midi").unwrap();

    miditab(&dir)
        .arg("dataset")
        .arg(&input)
        .arg(&output)
        .arg("--events")
        .assert()
        .success();

    assert_eq!(fs::read_to_string(output.join("piece.csv")).unwrap(), NOTES_CSV);
    assert!(output.join("piece.events.csv").exists());
    assert!(!output.join("readme.csv").exists());
}

#[test]
fn dataset_reports_broken_files() {
    let dir = TempDir::new().unwrap();
    let mid = encode_fixture(&dir);
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir(&input).unwrap();
    fs::copy(&mid, input.join("good.mid")).unwrap();
    fs::write(input.join("broken.mid"), b"garbage").unwrap();

    miditab(&dir)
        .arg("dataset")
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 2 files failed"));

    assert!(output.join("good.csv").exists());
}
