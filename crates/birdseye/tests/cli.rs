#![cfg(feature = "cli")]

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use std::path::Path;

fn write_frames(dir: &Path, count: usize) {
    for n in 0..count {
        let img = RgbImage::from_fn(500, 350, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        img.save(dir.join(format!("frame_{n:03}.png")))
            .expect("write frame");
    }
}

/// 9x6 corners placed exactly on the default plane anchors.
fn identity_corners() -> Vec<[f32; 2]> {
    let mut pts = Vec::new();
    for r in 0..6 {
        for c in 0..9 {
            pts.push([450.0 - 50.0 * c as f32, 300.0 - 50.0 * r as f32]);
        }
    }
    pts
}

fn write_corners(path: &Path, frames: Vec<Option<Vec<[f32; 2]>>>) {
    let json = serde_json::json!({ "frames": frames });
    std::fs::write(path, json.to_string()).expect("write corners");
}

fn stdout_records(output: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect()
}

#[test]
fn prints_one_record_per_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).expect("mkdir");
    write_frames(&frames, 2);
    let corners = dir.path().join("corners.json");
    write_corners(&corners, vec![Some(identity_corners()), None]);

    let assert = Command::cargo_bin("birdseye")
        .expect("binary")
        .arg("--frames")
        .arg(&frames)
        .arg("--corners")
        .arg(&corners)
        .assert()
        .success();

    let records = stdout_records(&assert.get_output().stdout);
    assert_eq!(records.len(), 2);

    assert_eq!(records[0]["frame"], 0);
    assert_eq!(records[0]["status"], "rectified");
    assert_eq!(records[0]["inliers"], 4);
    let residual = records[0]["forward_residual_px"].as_f64().expect("residual");
    assert!(residual < 1e-2);
    // Default auxiliary matrix shifts rectified coordinates by +100 px.
    let first = &records[0]["projected"][0];
    let x = first[0].as_f64().expect("x");
    let y = first[1].as_f64().expect("y");
    assert!((x - 550.0).abs() < 1e-2 && (y - 400.0).abs() < 1e-2, "{first}");

    assert_eq!(records[1]["frame"], 1);
    assert_eq!(records[1]["status"], "pattern_not_found");
    assert!(records[1]["projected"].is_null());
}

#[test]
fn max_frames_limits_output_and_saves_images() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = dir.path().join("frames");
    let out = dir.path().join("out");
    std::fs::create_dir(&frames).expect("mkdir");
    write_frames(&frames, 3);
    let corners = dir.path().join("corners.json");
    write_corners(&corners, vec![Some(identity_corners()); 3]);

    let assert = Command::cargo_bin("birdseye")
        .expect("binary")
        .arg("--frames")
        .arg(&frames)
        .arg("--corners")
        .arg(&corners)
        .args(["--max-frames", "1"])
        .arg("--save-dir")
        .arg(&out)
        .assert()
        .success();

    assert_eq!(stdout_records(&assert.get_output().stdout).len(), 1);
    assert!(out.join("frame_00000.png").is_file());
    assert!(out.join("rectified_00000.png").is_file());
}

#[test]
fn zero_max_frames_reads_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).expect("mkdir");
    write_frames(&frames, 2);
    let corners = dir.path().join("corners.json");
    write_corners(&corners, vec![Some(identity_corners()); 2]);

    let assert = Command::cargo_bin("birdseye")
        .expect("binary")
        .arg("--frames")
        .arg(&frames)
        .arg("--corners")
        .arg(&corners)
        .args(["--max-frames", "0"])
        .assert()
        .success();

    assert!(stdout_records(&assert.get_output().stdout).is_empty());
}

#[test]
fn missing_frames_directory_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let corners = dir.path().join("corners.json");
    write_corners(&corners, vec![]);

    Command::cargo_bin("birdseye")
        .expect("binary")
        .arg("--frames")
        .arg(dir.path().join("nope"))
        .arg("--corners")
        .arg(&corners)
        .assert()
        .failure()
        .stderr(predicate::str::contains("video source unavailable"));
}

#[test]
fn invalid_config_fails_before_reading_frames() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"pattern": {"cols": 1, "rows": 6}}"#).expect("write config");

    Command::cargo_bin("birdseye")
        .expect("binary")
        .arg("--frames")
        .arg(dir.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 2x2"));
}

#[cfg(not(feature = "chess"))]
#[test]
fn no_detector_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_frames(dir.path(), 1);

    Command::cargo_bin("birdseye")
        .expect("binary")
        .arg("--frames")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no corner detector"));
}
