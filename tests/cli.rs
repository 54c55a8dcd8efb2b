use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use std::io::Cursor;
use tempfile::{tempdir, NamedTempFile};

/// Config whose "converter" just copies the input to the requested output.
fn create_copy_config() -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"convert:\n  max_concurrency: 2\n  converter:\n    program: cp\n    args: [\"{input}\", \"{output}\"]\n",
    )
    .expect("Writing temp config failed");
    config
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("batch-convert").expect("Binary exists");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve").and(predicate::str::contains("convert")));
}

#[test]
fn convert_requires_inputs() {
    let mut cmd = Command::cargo_bin("batch-convert").expect("Binary exists");
    cmd.args(["convert", "--output", "out.zip"]).assert().failure();
}

#[cfg(unix)]
#[test]
fn convert_happy_flow_writes_archive_and_cleans_workspace() {
    let config = create_copy_config();
    let inputs = tempdir().unwrap();
    let workspaces = tempdir().unwrap();
    let first = inputs.path().join("report.docx");
    let second = inputs.path().join("summary.doc");
    write(&first, b"report").unwrap();
    write(&second, b"summary").unwrap();
    let output = inputs.path().join("result.zip");

    let mut cmd = Command::cargo_bin("batch-convert").expect("Binary exists");
    cmd.arg("convert")
        .arg("--config")
        .arg(config.path())
        .arg("--output")
        .arg(&output)
        .arg(&first)
        .arg(&second)
        .env("BATCH_CONVERT_WORKSPACE_ROOT", workspaces.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Conversion complete: 2 succeeded, 0 failed."));

    let bytes = std::fs::read(&output).expect("archive written");
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut names: Vec<_> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["report.pdf", "summary.pdf"]);
    assert!(std::fs::read_dir(workspaces.path()).unwrap().next().is_none());
}

#[cfg(unix)]
#[test]
fn convert_without_eligible_documents_fails_with_message() {
    let config = create_copy_config();
    let inputs = tempdir().unwrap();
    let workspaces = tempdir().unwrap();
    let notes = inputs.path().join("notes.txt");
    write(&notes, b"plain text").unwrap();

    let mut cmd = Command::cargo_bin("batch-convert").expect("Binary exists");
    cmd.arg("convert")
        .arg("--config")
        .arg(config.path())
        .arg("--output")
        .arg(inputs.path().join("result.zip"))
        .arg(&notes)
        .env("BATCH_CONVERT_WORKSPACE_ROOT", workspaces.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No eligible documents found."));
    assert!(!inputs.path().join("result.zip").exists());
    assert!(std::fs::read_dir(workspaces.path()).unwrap().next().is_none());
}
