use super::run_script;

#[test]
fn list_operations() {
    let out = run_script(
        r#"
set(l c a b a)
list(LENGTH l n)
list(REMOVE_DUPLICATES l)
list(SORT l)
list(GET l 0 -1 ends)
list(FIND l b at)
list(JOIN l "-" joined)
list(APPEND empty)
message(STATUS "${n} ${l} ${ends} ${at} ${joined} [${empty}]")
"#,
    );
    assert_eq!(out.status_lines(), vec!["4 a;b;c a;c 1 a-b-c []"]);
}

#[test]
fn string_operations() {
    let out = run_script(
        r#"
string(TOUPPER "mixed Case" upper)
string(SUBSTRING "abcdef" 2 3 middle)
string(REPLACE "o" "0" zeroed "foo boo")
string(REGEX REPLACE "([a-z]+)" "<\\1>" tagged "ab cd")
string(STRIP "  padded  " stripped)
string(LENGTH "four" len)
message(STATUS "${upper}|${middle}|${zeroed}|${tagged}|${stripped}|${len}")
"#,
    );
    assert_eq!(
        out.status_lines(),
        vec!["MIXED CASE|cde|f00 b00|<ab> <cd>|padded|4"]
    );
}

#[test]
fn math_expressions() {
    let out = run_script(
        r#"
math(EXPR v "(1 + 2) * 5 - 7 % 4")
math(EXPR h "255" OUTPUT_FORMAT HEXADECIMAL)
math(EXPR s "1 << 4 | 1")
message(STATUS "${v} ${h} ${s}")
"#,
    );
    assert_eq!(out.status_lines(), vec!["12 0xff 17"]);
}

#[test]
fn bad_math_is_an_error() {
    let out = run_script("math(EXPR v \"1 / 0\")\nmessage(STATUS unreachable)\n");
    assert!(out.stderr.contains("divide by zero"), "{}", out.stderr);
    assert!(out.status_lines().is_empty());
    assert_eq!(out.code, 1);
}

#[test]
fn conditions_capture_regex_groups() {
    let out = run_script(
        r#"
cmake_minimum_required(VERSION 3.5)
if("version-1.4" MATCHES "([0-9]+)\\.([0-9]+)")
  message(STATUS "${CMAKE_MATCH_0} ${CMAKE_MATCH_1} ${CMAKE_MATCH_2}")
endif()
if(NOT 3 LESS 2 AND "b" STRGREATER "a")
  message(STATUS "compound")
endif()
if(1.10 VERSION_GREATER 1.9)
  message(STATUS "versions")
endif()
set(L x y)
if(y IN_LIST L)
  message(STATUS "member")
endif()
"#,
    );
    assert_eq!(
        out.status_lines(),
        vec!["1.4 1 4", "compound", "versions", "member"]
    );
}

#[test]
fn fatal_error_stops_the_script() {
    let out = run_script(
        r#"
message(STATUS "before")
message(FATAL_ERROR "stop here")
message(STATUS "after")
"#,
    );
    assert_eq!(out.status_lines(), vec!["before"]);
    assert!(out.stderr.contains("CMake Error at /virtual/script.cmake:3 (message):"), "{}", out.stderr);
    assert!(out.stderr.contains("  stop here"));
    assert_eq!(out.code, 1);
}

#[test]
fn send_error_keeps_running() {
    let out = run_script(
        r#"
message(SEND_ERROR "first")
message(STATUS "continued")
"#,
    );
    assert_eq!(out.status_lines(), vec!["continued"]);
    assert_eq!(out.code, 1);
}

#[test]
fn unknown_commands_are_fatal() {
    let out = run_script("no_such_command(1)\nmessage(STATUS after)\n");
    assert!(out.stderr.contains("Unknown CMake command \"no_such_command\"."), "{}", out.stderr);
    assert!(out.status_lines().is_empty());
    assert_eq!(out.code, 1);
}

#[test]
fn explicit_exit_code() {
    let out = run_script(
        r#"
cmake_language(EXIT 3)
message(STATUS "never")
"#,
    );
    assert!(out.status_lines().is_empty());
    assert_eq!(out.code, 3);
}

#[test]
fn eval_and_deferred_calls() {
    let out = run_script(
        r#"
cmake_language(DEFER CALL message STATUS "deferred")
cmake_language(EVAL CODE "set(E evaluated)")
cmake_language(CALL message STATUS "${E}")
message(STATUS "last")
"#,
    );
    assert_eq!(out.status_lines(), vec!["evaluated", "last", "deferred"]);
}

#[test]
fn deferred_calls_can_be_cancelled() {
    let out = run_script(
        r#"
cmake_language(DEFER ID later CALL message STATUS "cancelled")
cmake_language(DEFER ID_VAR kept CALL message STATUS "kept")
cmake_language(DEFER CANCEL_CALL later)
message(STATUS "${kept}")
"#,
    );
    assert_eq!(out.status_lines(), vec!["__1", "kept"]);
}

#[test]
fn global_properties_and_definitions() {
    let out = run_script(
        r#"
define_property(GLOBAL PROPERTY MY_PROP BRIEF_DOCS "short" FULL_DOCS "long")
set_property(GLOBAL PROPERTY MY_PROP a)
set_property(GLOBAL APPEND PROPERTY MY_PROP b)
get_property(value GLOBAL PROPERTY MY_PROP)
get_property(is_set GLOBAL PROPERTY MY_PROP SET)
get_property(defined GLOBAL PROPERTY MY_PROP DEFINED)
get_property(brief GLOBAL PROPERTY MY_PROP BRIEF_DOCS)
get_property(missing GLOBAL PROPERTY OTHER_PROP DEFINED)
message(STATUS "${value} ${is_set} ${defined} ${brief} ${missing}")
"#,
    );
    assert_eq!(out.status_lines(), vec!["a;b 1 1 short 0"]);
}

#[test]
fn invalid_property_scope_is_reported() {
    let out = run_script("set_property(NOWHERE PROPERTY P v)\n");
    assert!(out.stderr.contains("given invalid scope NOWHERE."), "{}", out.stderr);
    assert_eq!(out.code, 1);
}

#[test]
fn cache_entries_are_visible_until_shadowed() {
    let out = run_script(
        r#"
set(C cached CACHE STRING "doc")
message(STATUS "${C} $CACHE{C}")
set(C normal)
message(STATUS "${C} $CACHE{C}")
"#,
    );
    assert_eq!(out.status_lines(), vec!["cached cached", "normal cached"]);
}

#[test]
fn project_commands_are_not_scriptable() {
    let out = run_script("add_library(lib STATIC a.c)\n");
    assert!(out.stderr.contains("not scriptable"), "{}", out.stderr);
    assert_eq!(out.code, 1);
}
