use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../coco-index/tests/fixtures")
        .join(name)
}

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("coco-index").unwrap();
    cmd.env_remove("COCO_GT").env("RUST_LOG", "error");
    cmd
}

#[test]
fn info_reports_counts() {
    cmd()
        .args(["info", "--gt"])
        .arg(fixture("gt.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("annotations: 5"))
        .stdout(predicate::str::contains("annotated images: 3"));
}

#[test]
fn ann_ids_by_image_and_category() {
    cmd()
        .args(["ann-ids", "--img-ids", "2", "--cat-ids", "1", "--gt"])
        .arg(fixture("gt.json"))
        .assert()
        .success()
        .stdout("103\n104\n");
}

#[test]
fn ann_ids_area_and_crowd() {
    cmd()
        .args(["ann-ids", "--area-rng", "200,2000", "--iscrowd", "false", "--gt"])
        .arg(fixture("gt.json"))
        .assert()
        .success()
        .stdout("101\n103\n");
}

#[test]
fn ann_ids_rejects_bad_area_range() {
    cmd()
        .args(["ann-ids", "--area-rng", "1,2,3", "--gt"])
        .arg(fixture("gt.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("two bounds"));
}

#[test]
fn gt_path_from_environment() {
    let mut cmd = Command::cargo_bin("coco-index").unwrap();
    cmd.env("COCO_GT", fixture("gt.json"))
        .env("RUST_LOG", "error")
        .args(["cat-ids", "--supercategories", "animal"])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn load_res_writes_merged_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("dt_merged.json");
    cmd()
        .args(["load-res", "--gt"])
        .arg(fixture("gt.json"))
        .arg("--res")
        .arg(fixture("dt.json"))
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let merged: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let anns = merged["annotations"].as_array().unwrap();
    assert_eq!(anns.len(), 6);
    assert_eq!(anns[0]["id"], 1);
    assert_eq!(anns[0]["iscrowd"], 0);
    assert_eq!(merged["categories"].as_array().unwrap().len(), 2);
}

#[test]
fn missing_file_fails() {
    cmd()
        .args(["info", "--gt", "no/such/file.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file.json"));
}
