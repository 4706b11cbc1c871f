use std::{
    env, fs,
    path::PathBuf,
    process::{Command, Stdio},
};
use tempfile::TempDir;

fn bin_path() -> String {
    if let Some(path) = option_env!("CARGO_BIN_EXE_listscript") {
        return path.to_string();
    }
    if let Ok(path) = env::var("CARGO_BIN_EXE_listscript") {
        return path;
    }
    let mut fallback =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir not set by cargo"));
    fallback.push("target");
    fallback.push("debug");
    fallback.push("listscript");
    if cfg!(windows) {
        fallback.set_extension("exe");
    }
    if fallback.exists() {
        return fallback.to_string_lossy().into_owned();
    }
    panic!(
        "binary path not set by cargo test and fallback {:?} not found",
        fallback
    );
}

#[test]
fn script_mode_prints_status_and_exits() {
    let dir = TempDir::new().expect("temp dir");
    let script = dir.path().join("hello.cmake");
    fs::write(
        &script,
        "message(STATUS \"hello ${GREETING}\")\ncmake_language(EXIT 4)\n",
    )
    .expect("write script");

    let output = Command::new(bin_path())
        .current_dir(dir.path())
        .arg("-DGREETING=world")
        .arg("-P")
        .arg(&script)
        .stdin(Stdio::null())
        .output()
        .expect("failed to run listscript");
    assert_eq!(output.status.code(), Some(4));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "-- hello world\n");
}

#[test]
fn configure_reports_errors_with_exit_status() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(
        dir.path().join("CMakeLists.txt"),
        "cmake_minimum_required(VERSION 3.20)\nproject(Broken LANGUAGES NONE)\nmessage(FATAL_ERROR \"broken tree\")\n",
    )
    .expect("write list file");

    let output = Command::new(bin_path())
        .arg("-S")
        .arg(dir.path())
        .arg("-B")
        .arg(dir.path().join("build"))
        .stdin(Stdio::null())
        .output()
        .expect("failed to run listscript");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CMake Error at CMakeLists.txt:3 (message):"), "{stderr}");
    assert!(stderr.contains("broken tree"));
}

#[test]
fn syntax_errors_fail_before_running() {
    let dir = TempDir::new().expect("temp dir");
    let script = dir.path().join("bad.cmake");
    fs::write(&script, "message(STATUS \"ok\")\nset(X\n").expect("write script");

    let output = Command::new(bin_path())
        .arg("-P")
        .arg(&script)
        .stdin(Stdio::null())
        .output()
        .expect("failed to run listscript");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
