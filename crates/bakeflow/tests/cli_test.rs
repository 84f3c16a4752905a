use assert_cmd::Command;
use predicates::prelude::*;

const VALID_DOC: &str = r#"
platforms:
  - name: centos
    source_ami: ami-00000001
  - name: win-2012r2
    source_ami: ami-00000002
    connection: winrm
    port: 5985
    username: Administrator
profiles:
  - name: default
  - name: hardened
    extra_vars:
      hardening: true
"#;

fn bake() -> Command {
    Command::cargo_bin("bake").unwrap()
}

#[test]
fn validate_accepts_a_good_document_and_lists_instances() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bake.yml"), VALID_DOC).unwrap();

    bake()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("centos-default"))
        .stdout(predicate::str::contains("centos-hardened"))
        .stdout(predicate::str::contains("win-2012r2-default"));
}

#[test]
fn validate_reports_every_missing_field() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("bake.yml"),
        "platforms:\n  - name: centos\n",
    )
    .unwrap();

    bake()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("source_ami is required"));
}

#[test]
fn missing_document_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    bake()
        .current_dir(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn hidden_document_name_is_found_too() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".bake.yml"), VALID_DOC).unwrap();

    bake()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn status_shows_uncreated_instances() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bake.yml"), VALID_DOC).unwrap();

    bake()
        .current_dir(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("centos-default"))
        .stdout(predicate::str::contains("not created"));
}

#[test]
fn unknown_instance_lists_the_valid_keys() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bake.yml"), VALID_DOC).unwrap();

    bake()
        .current_dir(dir.path())
        .arg("clean")
        .arg("debian-default")
        .assert()
        .failure()
        .stderr(predicate::str::contains("centos-default"));
}
