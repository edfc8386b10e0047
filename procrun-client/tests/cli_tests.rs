#![cfg(unix)]

use std::fs;
use std::process::Command;

fn procrun() -> Command {
    Command::new(env!("CARGO_BIN_EXE_procrun"))
}

fn writer() -> Command {
    Command::new(env!("CARGO_BIN_EXE_writer"))
}

#[test]
fn test_exec_exit_status() {
    assert!(procrun().args(["exec", "/bin/true"]).status().unwrap().success());

    let status = procrun().args(["exec", "/bin/false"]).status().unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_redirect_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");

    let status = procrun()
        .arg("redirect")
        .arg("--output")
        .arg(&out)
        .args(["/bin/echo", "hello"])
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
}

#[test]
fn test_json_summary() {
    let output = procrun()
        .args(["--json", "shell", "exit 4"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["mode"], "shell");
    assert_eq!(summary["success"], false);
    assert_eq!(summary["outcome"]["value"], 4);
}

#[test]
fn test_config_file_changes_shell() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("procrun.toml");
    fs::write(&config, "shell = \"/nonexistent/sh\"\n").unwrap();

    let status = procrun()
        .arg("--config")
        .arg(&config)
        .args(["shell", "true"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_writer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("written.txt");

    let status = writer().arg(&path).arg("some text").status().unwrap();
    assert!(status.success());
    assert_eq!(fs::read_to_string(&path).unwrap(), "some text");
}

#[test]
fn test_writer_writes_hyphen_text_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dash.txt");

    let status = writer().arg(&path).arg("-n").status().unwrap();
    assert!(status.success());
    assert_eq!(fs::read_to_string(&path).unwrap(), "-n");
}

#[test]
fn test_writer_argument_errors() {
    let output = writer().arg("/tmp/only-one").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Incorrect number of arguments"));

    let status = writer()
        .args(["/nonexistent/dir/file.txt", "x"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}
