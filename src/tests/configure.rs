use super::Outcome;
use crate::runtime::{config::EngineOptions, error::RuntimeError, interpreter::Interpreter, messenger::CaptureSink};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, text).expect("write list file");
}

fn configure(root: &Path) -> Outcome {
    let sink = CaptureSink::new();
    let mut interp = Interpreter::new(EngineOptions::default()).with_sink(Box::new(sink.clone()));
    let code = interp
        .configure(root, &root.join("build"))
        .expect("tree configures");
    Outcome {
        stdout: sink.stdout_text(),
        stderr: sink.stderr_text(),
        code,
    }
}

#[test]
fn configures_a_source_tree() {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(
        root,
        "CMakeLists.txt",
        r#"
cmake_minimum_required(VERSION 3.20)
project(Demo VERSION 1.2.3 LANGUAGES NONE)
include(helpers.cmake)
add_library(core STATIC core.c)
add_library(Demo::core ALIAS core)
get_target_property(kind Demo::core TYPE)
get_target_property(real Demo::core ALIASED_TARGET)
message(STATUS "${PROJECT_NAME} ${Demo_VERSION_MINOR} ${kind} ${real} ${HELPER}")
add_subdirectory(sub)
get_property(sub_targets DIRECTORY sub PROPERTY BUILDSYSTEM_TARGETS)
message(STATUS "${FROM_SUB} ${sub_targets}")
"#,
    );
    write(root, "helpers.cmake", "set(HELPER loaded)\n");
    write(
        root,
        "sub/CMakeLists.txt",
        r#"
add_executable(tool main.c)
set(FROM_SUB "${PROJECT_NAME}-sub" PARENT_SCOPE)
"#,
    );

    let out = configure(root);
    assert!(out.stderr.is_empty(), "{}", out.stderr);
    assert_eq!(
        out.status_lines(),
        vec!["Demo 2 STATIC_LIBRARY core loaded", "Demo-sub tool"]
    );
    assert_eq!(out.code, 0);
}

#[test]
fn duplicate_targets_are_rejected() {
    let dir = TempDir::new().expect("temp dir");
    write(
        dir.path(),
        "CMakeLists.txt",
        r#"
cmake_minimum_required(VERSION 3.20)
project(Twice LANGUAGES NONE)
add_executable(app main.c)
add_library(app SHARED lib.c)
message(STATUS "configured")
"#,
    );
    let out = configure(dir.path());
    assert!(out.stderr.contains("cannot create target \"app\""), "{}", out.stderr);
    assert!(out.stderr.contains("CMP0002"));
    assert_eq!(out.status_lines(), vec!["configured"]);
    assert_eq!(out.code, 1);
}

#[test]
fn missing_subdirectory_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    write(
        dir.path(),
        "CMakeLists.txt",
        "cmake_minimum_required(VERSION 3.20)\nproject(P LANGUAGES NONE)\nadd_subdirectory(nowhere)\n",
    );
    let out = configure(dir.path());
    assert!(out.stderr.contains("which is not an existing directory."), "{}", out.stderr);
    assert_eq!(out.code, 1);
}

#[test]
fn missing_list_file_is_an_io_error() {
    let dir = TempDir::new().expect("temp dir");
    let mut interp = Interpreter::new(EngineOptions::default()).with_sink(Box::new(CaptureSink::new()));
    let err = interp
        .configure(dir.path(), &dir.path().join("build"))
        .expect_err("no CMakeLists.txt");
    assert!(matches!(err, RuntimeError::Io { .. }));
}
