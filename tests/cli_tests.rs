//! Integration tests for the CLI interface

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_cli_help_flag() {
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"));
}

#[test]
fn test_avail_lists_registered_classes() {
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.arg("avail")
        .assert()
        .success()
        .stdout(predicate::str::contains("t1"))
        .stdout(predicate::str::contains("t2star"))
        .stdout(predicate::str::contains("t2star_t1"));
}

#[test]
fn test_menu_shows_specs_and_parameters() {
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.arg("menu")
        .arg("t2star")
        .assert()
        .success()
        .stdout(predicate::str::contains("Acquired data specs:"))
        .stdout(predicate::str::contains("channel_mags"))
        .stdout(predicate::str::contains("qsm_dual_echo"));
}

#[test]
fn test_menu_unknown_class_fails() {
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.arg("menu")
        .arg("pet")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pet"));
}

#[test]
fn test_derive_writes_a_plan() {
    let scratch = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.args(["derive", "/data/bids", "t1", "sub01_t1", "brain_mask"])
        .args(["--scratch", scratch.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan written to"));

    let plan_path = scratch.path().join("sub01_t1-plan.json");
    assert!(plan_path.exists());
    let plan: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(plan_path).unwrap()).unwrap();
    assert_eq!(plan["class"], "t1");
    assert_eq!(plan["dataset"]["type"], "bids");
    assert_eq!(plan["requested"][0], "brain_mask");
    assert_eq!(plan["pipelines"][0]["name"], "brain_extraction_pipeline");
}

#[test]
fn test_derive_parameter_values_are_type_checked() {
    let scratch = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.args(["derive", "/data/bids", "t1", "sub01_t1", "brain_mask"])
        .args(["--scratch", scratch.path().to_str().unwrap()])
        .args(["--parameter", "bet_f_threshold", "very-high"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bet_f_threshold"));
}

#[test]
fn test_derive_rejects_acquired_derivatives() {
    let scratch = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.args(["derive", "/data/bids", "t1", "sub01_t1", "magnitude"])
        .args(["--scratch", scratch.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("magnitude"));
}

#[test]
fn test_derive_reads_subject_ids_from_file() {
    let scratch = TempDir::new().unwrap();
    let id_file = scratch.path().join("subjects.txt");
    std::fs::write(&id_file, "sub-01\nsub-02\n\n").unwrap();

    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.args(["derive", "/data/bids", "t1", "group_t1", "brain_mask"])
        .args(["--scratch", scratch.path().to_str().unwrap()])
        .args(["--subject-ids", id_file.to_str().unwrap()])
        .assert()
        .success();

    let plan: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(scratch.path().join("group_t1-plan.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(plan["subject_ids"], serde_json::json!(["sub-01", "sub-02"]));
}

#[test]
fn test_derive_accepts_regex_inputs() {
    let scratch = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.args(["derive", "/data/bids", "t1", "sub01_t1", "brain_mask"])
        .args(["--scratch", scratch.path().to_str().unwrap()])
        .args(["--input-regex", "magnitude", r".*mprage\.nii\.gz"])
        .assert()
        .success();

    let plan: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(scratch.path().join("sub01_t1-plan.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(plan["inputs"]["magnitude"]["is_regex"], true);
    assert_eq!(plan["inputs"]["magnitude"]["pattern"], r".*mprage\.nii\.gz");
}

#[test]
fn test_derive_rejects_invalid_regex_inputs() {
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.args(["derive", "/data/bids", "t1", "sub01_t1", "brain_mask"])
        .args(["--input-regex", "magnitude", "*mprage"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid regex pattern"));
}

#[test]
fn test_derive_reads_parameters_from_yaml_file() {
    let scratch = TempDir::new().unwrap();
    let param_file = scratch.path().join("params.yaml");
    std::fs::write(&param_file, "bet_robust: false\nbet_f_threshold: 0.3\n").unwrap();

    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.args(["derive", "/data/bids", "t1", "sub01_t1", "brain_mask"])
        .args(["--scratch", scratch.path().to_str().unwrap()])
        .args(["--parameter-file", param_file.to_str().unwrap()])
        .args(["--parameter", "bet_f_threshold", "0.4"])
        .assert()
        .success();

    let plan: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(scratch.path().join("sub01_t1-plan.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(plan["parameters"]["bet_robust"], false);
    // command-line overrides beat the file
    assert_eq!(plan["parameters"]["bet_f_threshold"], 0.4);
}

#[test]
fn test_derive_xnat_requires_a_server() {
    let mut cmd = Command::cargo_bin("neuropipe").unwrap();
    cmd.args(["derive", "PROJ01", "t1", "proj_t1", "brain_mask"])
        .args(["--dataset-type", "xnat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--xnat-server"));
}
