use std::process::{Command, Output, Stdio};
use std::io::Write;
use tempfile::TempDir;

fn dirsync(dir: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dirsync"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to run dirsync")
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = dirsync(temp_path, &["init"]);
    assert!(output.status.success());

    let config_path = temp_path.join(".dirsync/settings.toml");
    assert!(config_path.exists());
    assert!(temp_path.join(".dirsync/sources.toml").exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[sync]"));
    assert!(content.contains("[logging]"));

    // Second init without --force refuses
    let output = dirsync(temp_path, &["init"]);
    assert!(!output.status.success());
}

#[test]
fn test_forced_init_keeps_sources() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();
    std::fs::create_dir_all(temp_path.join("src")).unwrap();

    assert!(dirsync(temp_path, &["init"]).status.success());
    assert!(dirsync(temp_path, &["add-source", "src"]).status.success());
    assert!(dirsync(temp_path, &["init", "--force"]).status.success());

    let output = dirsync(temp_path, &["list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("[0] "), "source list was reset: {stdout}");
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let config_dir = temp_path.join(".dirsync");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("settings.toml"),
        "version = 2\n[sync]\nblock_size = 99\n",
    )
    .unwrap();

    let output = dirsync(temp_path, &["config"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("block_size = 99"));
}

#[test]
fn test_source_commands_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();
    std::fs::create_dir_all(temp_path.join("src/cache")).unwrap();
    std::fs::create_dir_all(temp_path.join("backup")).unwrap();
    std::fs::write(temp_path.join("src/a.txt"), "hello").unwrap();

    assert!(dirsync(temp_path, &["init"]).status.success());
    assert!(dirsync(temp_path, &["add-source", "src"]).status.success());
    assert!(dirsync(temp_path, &["add-target", "0", "backup"]).status.success());
    assert!(dirsync(temp_path, &["add-exception", "0", "src/cache"]).status.success());

    // The new target got the existing content
    assert_eq!(
        std::fs::read_to_string(temp_path.join("backup/a.txt")).unwrap(),
        "hello"
    );

    let output = dirsync(temp_path, &["list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("[0] "));
    assert!(stdout.contains("Recursive: true"));
    assert!(stdout.contains("target [0]"));
    assert!(stdout.contains("exception [0]"));

    // Nested source without an exception is rejected
    std::fs::create_dir_all(temp_path.join("src/docs")).unwrap();
    let output = dirsync(temp_path, &["add-source", "src/docs"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("has a conflict with source"));
}

#[test]
fn test_run_quits_on_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();
    assert!(dirsync(temp_path, &["init"]).status.success());

    let mut child = Command::new(env!("CARGO_BIN_EXE_dirsync"))
        .current_dir(temp_path)
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"jobs\nquit\n")
        .unwrap();

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Watching 0 sources"));
    assert!(stdout.contains("No jobs"));
}

#[test]
fn test_list_json() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();
    std::fs::create_dir_all(temp_path.join("src")).unwrap();

    assert!(dirsync(temp_path, &["init"]).status.success());
    assert!(dirsync(temp_path, &["add-source", "src", "--non-recursive"]).status.success());

    let output = dirsync(temp_path, &["list", "--json"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let sources = value.as_array().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0]["recursive"], serde_json::Value::Bool(false));
    assert!(sources[0]["path"].as_str().unwrap().ends_with("src"));
    assert_eq!(sources[0]["targets"], serde_json::json!([]));
}
