use assert_cmd::cargo::cargo_bin_cmd;
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// 600x400 white sheet with a 200px tendon line at y=150
fn write_sheet(dir: &Path) -> PathBuf {
    let mut image = RgbaImage::from_pixel(600, 400, Rgba([255, 255, 255, 255]));
    draw_filled_rect_mut(&mut image, Rect::at(150, 150).of_size(200, 3), Rgba([0, 0, 0, 255]));
    let path = dir.join("sheet.png");
    image.save(&path).expect("sheet should be written");
    path
}

fn write_replay(dir: &Path, with_scale: bool) -> PathBuf {
    let mut entries = vec![
        r#"{"page": 0, "text": "tendon banded ( 1 )", "confidence": 0.95, "bbox": [170, 118, 330, 140]}"#,
        r#"{"page": 0, "text": "GRID B", "confidence": 0.9, "bbox": [450, 20, 520, 40]}"#,
    ];
    if with_scale {
        entries.push(r#"{"page": 0, "text": "SCALE: 1/4\" = 1'-0\"", "confidence": 0.9, "bbox": [20, 360, 180, 380]}"#);
    }
    let path = dir.join("ocr.json");
    std::fs::write(&path, format!("[{}]", entries.join(","))).expect("replay should be written");
    path
}

fn extract(input: &Path, replay: &Path, output: &Path) -> assert_cmd::assert::Assert {
    cargo_bin_cmd!("tendon-extract")
        .arg("extract")
        .arg(input)
        .arg("--output")
        .arg(output)
        .arg(format!("--ocr=replay:{}", replay.display()))
        .args(["--dpi", "200", "--tile-size", "200", "--overlap", "60", "--batch-size", "4"])
        .assert()
}

/// First four CSV columns, which do not depend on pixel-exact line lengths
fn csv_summary(path: &Path) -> String {
    std::fs::read_to_string(path)
        .expect("csv should be readable")
        .lines()
        .map(|line| line.split(',').take(4).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn extract_measures_tendon_against_page_scale() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let sheet = write_sheet(temp.path());
    let replay = write_replay(temp.path(), true);
    let out = temp.path().join("out");

    extract(&sheet, &replay, &out)
        .success()
        .stdout(predicate::str::starts_with("Detected 1 tendons on 1 pages (1 measured)"));

    assert!(out.join("page_0.png").exists(), "annotated page should exist");
    let annotated = image::open(out.join("page_0.png")).expect("annotated page should be readable");
    assert_eq!((annotated.width(), annotated.height()), (600, 400));

    let json = std::fs::read_to_string(out.join("results.json")).expect("results.json should exist");
    let value: Value = serde_json::from_str(&json).expect("results.json should be valid json");
    assert_eq!(value["total_pages"], 1);
    assert_eq!(value["total_tendons"], 1);
    assert_eq!(value["pages"][0]["page"], 1);
    assert_eq!(value["pages"][0]["filename"], "page_0.png");

    let record = &value["pages"][0]["measurements"][0];
    assert_eq!(record["callout"], "TENDON BANDED (1)");
    assert_eq!(record["status"], "resolved");
    let feet = record["value"].as_f64().expect("measured value");
    assert!((feet - 4.0).abs() < 0.3, "measured {feet}");
    assert!(record["measurement"].as_str().is_some_and(|m| m.starts_with('~') && m.ends_with(" ft")));
}

#[test]
fn extract_without_scale_writes_unresolved() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let sheet = write_sheet(temp.path());
    let replay = write_replay(temp.path(), false);
    let out = temp.path().join("out");

    extract(&sheet, &replay, &out)
        .success()
        .stdout(predicate::str::contains("(0 measured)"));

    insta::assert_snapshot!(csv_summary(&out.join("tendons.csv")), @r###"
    Page,Callout,Measurement,Status
    1,TENDON BANDED (1),unresolved,no_scale
    "###);
}

#[test]
fn extract_parallel_matches_page_at_a_time() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let sheet = write_sheet(temp.path());
    let replay = write_replay(temp.path(), false);
    let sequential = temp.path().join("sequential");
    let parallel = temp.path().join("parallel");

    extract(&sheet, &replay, &sequential).success();
    cargo_bin_cmd!("tendon-extract")
        .arg("extract")
        .arg(&sheet)
        .arg("--output")
        .arg(&parallel)
        .arg(format!("--ocr=replay:{}", replay.display()))
        .args(["--dpi", "200", "--tile-size", "200", "--overlap", "60", "--batch-size", "4", "--parallel"])
        .assert()
        .success();

    assert_eq!(
        csv_summary(&sequential.join("tendons.csv")),
        csv_summary(&parallel.join("tendons.csv"))
    );
}

#[test]
fn extract_fails_for_missing_input() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let replay = write_replay(temp.path(), false);

    extract(&temp.path().join("missing.png"), &replay, &temp.path().join("out"))
        .failure()
        .stderr(predicate::str::contains("input file not found"));
}

#[test]
fn extract_fails_for_unsupported_input() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let replay = write_replay(temp.path(), false);
    let input = temp.path().join("drawing.dwg");
    std::fs::write(&input, b"binary").expect("input should be written");

    extract(&input, &replay, &temp.path().join("out"))
        .failure()
        .stderr(predicate::str::contains("unsupported input format"));
}

#[test]
fn extract_rejects_invalid_tiling() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let sheet = write_sheet(temp.path());
    let replay = write_replay(temp.path(), false);

    cargo_bin_cmd!("tendon-extract")
        .arg("extract")
        .arg(&sheet)
        .arg("--output")
        .arg(temp.path().join("out"))
        .arg(format!("--ocr=replay:{}", replay.display()))
        .args(["--tile-size", "100", "--overlap", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn extract_rejects_unknown_ocr_backend() {
    cargo_bin_cmd!("tendon-extract")
        .args(["extract", "sheet.png", "--output", "out", "--ocr", "easyocr"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected `replay:<json>` or `tesseract`"));
}

#[test]
fn config_prints_effective_toml() {
    cargo_bin_cmd!("tendon-extract")
        .arg("config")
        .env("TENDON_TILE_SIZE", "800")
        .env_remove("TENDON_TILE_OVERLAP")
        .assert()
        .success()
        .stdout(predicate::str::contains("[tiling]"))
        .stdout(predicate::str::contains("tile_size = 800"))
        .stdout(predicate::str::contains("overlap = 250"));
}

#[test]
fn version_prints_crate_version() {
    cargo_bin_cmd!("tendon-extract")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::diff(format!("{}\n", env!("CARGO_PKG_VERSION"))));
}
