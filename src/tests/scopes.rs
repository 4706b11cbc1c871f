use super::{run_script, run_with};
use crate::runtime::config::EngineOptions;

#[test]
fn function_locals_do_not_leak() {
    let out = run_script(
        r#"
set(X 1)
function(F)
  set(X 2)
endfunction()
F()
message(STATUS "${X}")
"#,
    );
    assert_eq!(out.status_lines(), vec!["1"]);
    assert_eq!(out.code, 0);
}

#[test]
fn parent_scope_writes_reach_the_caller_only() {
    let out = run_script(
        r#"
function(F)
  set(Y 7 PARENT_SCOPE)
  message(STATUS "inside [${Y}]")
endfunction()
F()
message(STATUS "outside [${Y}]")
"#,
    );
    assert_eq!(out.status_lines(), vec!["inside []", "outside [7]"]);
}

#[test]
fn unset_in_a_function_hides_the_caller_value() {
    let out = run_script(
        r#"
set(X 1)
function(F)
  unset(X)
  message(STATUS "[${X}]")
endfunction()
F()
message(STATUS "[${X}]")
"#,
    );
    assert_eq!(out.status_lines(), vec!["[]", "[1]"]);
}

#[test]
fn block_scopes_variables() {
    let out = run_script(
        r#"
block(SCOPE_FOR VARIABLES)
  set(Z 5)
endblock()
if(DEFINED Z)
  message(STATUS "leaked")
else()
  message(STATUS "contained")
endif()
block(PROPAGATE OUT)
  set(OUT done)
  set(TMP x)
endblock()
message(STATUS "${OUT}|${TMP}")
"#,
    );
    assert_eq!(out.status_lines(), vec!["contained", "done|"]);
}

#[test]
fn function_arguments_and_return_propagate() {
    let out = run_script(
        r#"
cmake_minimum_required(VERSION 3.25)
function(collect first)
  set(result "${first}:${ARGC}:${ARGN}")
  return(PROPAGATE result)
  set(result "unreachable")
endfunction()
collect(a b c)
message(STATUS "${result}")
"#,
    );
    assert_eq!(out.status_lines(), vec!["a:3:b;c"]);
    assert!(out.stderr.is_empty(), "{}", out.stderr);
}

#[test]
fn macros_substitute_text_in_the_caller_scope() {
    let out = run_script(
        r#"
macro(assign name value)
  set(${name} "${value}-${ARGC}")
endmacro()
assign(M hello)
message(STATUS "${M}")
"#,
    );
    assert_eq!(out.status_lines(), vec!["hello-2"]);
}

#[test]
fn scripted_commands_shadow_builtins() {
    let out = run_script(
        r#"
function(message)
  _message(STATUS "wrapped ${ARGV1}")
endfunction()
message(STATUS hi)
"#,
    );
    assert_eq!(out.status_lines(), vec!["wrapped hi"]);
}

#[test]
fn loops_break_and_continue() {
    let out = run_script(
        r#"
set(seen "")
foreach(i RANGE 5)
  if(i EQUAL 1)
    continue()
  endif()
  if(i EQUAL 4)
    break()
  endif()
  list(APPEND seen ${i})
endforeach()
message(STATUS "${seen}")
set(n 0)
while(n LESS 3)
  math(EXPR n "${n} + 1")
endwhile()
message(STATUS "${n}")
"#,
    );
    assert_eq!(out.status_lines(), vec!["0;2;3", "3"]);
}

#[test]
fn foreach_over_lists() {
    let out = run_script(
        r#"
set(A x y)
set(B 1 2)
foreach(item IN LISTS A ITEMS z)
  message(STATUS "${item}")
endforeach()
foreach(pair IN ZIP_LISTS A B)
  message(STATUS "${pair_0}=${pair_1}")
endforeach()
"#,
    );
    assert_eq!(out.status_lines(), vec!["x", "y", "z", "x=1", "y=2"]);
}

#[test]
fn runaway_recursion_is_reported() {
    let options = EngineOptions {
        recursion_limit: 10,
        ..EngineOptions::script()
    };
    let out = run_with(
        options,
        r#"
macro(recurse)
  recurse()
endmacro()
recurse()
message(STATUS "after")
"#,
    );
    assert!(out.stderr.contains("Maximum recursion depth of 10 exceeded"), "{}", out.stderr);
    assert!(out.status_lines().is_empty());
    assert_eq!(out.code, 1);
}

#[test]
fn shallow_recursion_stays_under_the_limit() {
    let options = EngineOptions {
        recursion_limit: 10,
        ..EngineOptions::script()
    };
    let out = run_with(
        options,
        r#"
function(countdown n)
  if(n GREATER 0)
    math(EXPR next "${n} - 1")
    countdown(${next})
  endif()
endfunction()
countdown(3)
message(STATUS "done")
"#,
    );
    assert_eq!(out.status_lines(), vec!["done"]);
    assert_eq!(out.code, 0);
}

#[test]
fn unclosed_blocks_are_errors() {
    let out = run_script("if(TRUE)\nmessage(STATUS never)\n");
    assert!(out.stderr.contains("A logical block opening on the line"), "{}", out.stderr);
    assert!(out.stderr.contains("is not closed."));
    assert_eq!(out.code, 1);
}

#[test]
fn mismatched_end_arguments_only_warn() {
    let out = run_script(
        r#"
function(F)
endfunction(G)
message(STATUS "still running")
"#,
    );
    assert!(out.stderr.contains("with mis-matching arguments."), "{}", out.stderr);
    assert_eq!(out.status_lines(), vec!["still running"]);
}

#[test]
fn default_recursion_limit_reports_on_a_small_caller_stack() {
    let caller = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            run_script(
                r#"
function(recurse)
  if(TRUE)
    recurse()
  endif()
endfunction()
recurse()
"#,
            )
        })
        .expect("spawn caller");
    let out = caller.join().expect("caller thread finishes");
    assert!(
        out.stderr.contains("Maximum recursion depth of 1000 exceeded"),
        "{}",
        out.stderr
    );
    assert_eq!(out.code, 1);
}

#[test]
fn end_argument_warnings_point_at_the_closing_command() {
    let out = run_script(
        r#"
block()
endblock(junk)
message(STATUS "after")
"#,
    );
    assert!(
        out.stderr
            .contains("CMake Warning (dev) at /virtual/script.cmake:3 (endblock):"),
        "{}",
        out.stderr
    );
    assert!(out.stderr.contains("has unexpected arguments."));
    assert_eq!(out.status_lines(), vec!["after"]);
}
