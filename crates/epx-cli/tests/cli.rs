//! Black-box tests of the `epx` binary.

use assert_cmd::Command;
use epx_core::matrix;
use epx_market::{CountryParams, DemandParams, EpecInstance, FollowerParams, LeaderParams};
use predicates::prelude::*;

fn write_solo_instance(dir: &std::path::Path) -> std::path::PathBuf {
    let instance = EpecInstance::new(
        vec![CountryParams {
            name: "Solo".into(),
            followers: FollowerParams {
                costs_quad: vec![0.5],
                costs_lin: vec![10.0],
                capacities: vec![100.0],
                emission_costs: vec![1.0],
                tax_caps: vec![20.0],
                names: vec!["producer".into()],
            },
            demand: DemandParams {
                alpha: 300.0,
                beta: 0.05,
            },
            leader: LeaderParams::default(),
        }],
        matrix::zeros(1, 1),
    )
    .unwrap();
    let path = dir.join("instance.dat");
    instance.save(&path).unwrap();
    path
}

#[test]
fn solves_an_instance_and_writes_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let instance = write_solo_instance(dir.path());
    let prefix = dir.path().join("result");
    Command::cargo_bin("epx")
        .unwrap()
        .arg(&instance)
        .arg("-r")
        .arg(&prefix)
        .arg("-s")
        .arg("2")
        .arg("--algorithm")
        .arg("full")
        .assert()
        .success()
        .stdout(predicate::str::contains("NashEqFound"));
    assert!(prefix.with_extension("json").exists());
    assert!(prefix.with_extension("txt").exists());
}

#[test]
fn missing_instance_is_an_error() {
    Command::cargo_bin("epx")
        .unwrap()
        .arg("does-not-exist.dat")
        .assert()
        .failure();
}

#[test]
fn version_flag_works() {
    Command::cargo_bin("epx")
        .unwrap()
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains("epx"));
}

#[test]
fn help_lists_the_options() {
    Command::cargo_bin("epx")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--write-level"))
        .stdout(predicate::str::contains("--algorithm"));
}
