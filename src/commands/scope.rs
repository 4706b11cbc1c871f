//! Commands that read other files or change the policy settings of a scope.

use crate::language::expand::split_list;
use crate::runtime::{
    cache::CacheEntryType,
    interpreter::Interpreter,
    messenger::MessageType,
    platform::collapse_full_path,
    policies::{PolicyId, PolicyStatus, Version, ENGINE_VERSION},
    registry::CommandRegistry,
    status::ExecutionStatus,
};

pub fn register(registry: &mut CommandRegistry) {
    registry.add_builtin("include", include_command);
    registry.add_builtin("cmake_minimum_required", cmake_minimum_required_command);
    registry.add_builtin("cmake_policy", cmake_policy_command);
}

pub fn register_project(registry: &mut CommandRegistry) {
    registry.add_builtin("add_subdirectory", add_subdirectory_command);
    registry.add_builtin("project", project_command);
}

pub(super) fn is_full_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Looks `module` up in `CMAKE_MODULE_PATH`.
fn find_module(interp: &Interpreter, module: &str) -> Option<String> {
    let search = interp.safe_definition("CMAKE_MODULE_PATH");
    let base = interp.current_source_dir();
    split_list(&search).into_iter().find_map(|dir| {
        let candidate = collapse_full_path(&format!("{dir}/{module}"), &base);
        (interp.platform().fs_exists(&candidate) && !interp.platform().fs_is_dir(&candidate))
            .then_some(candidate)
    })
}

fn include_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.is_empty() || args.len() > 4 {
        return status.fail("called with wrong number of arguments.  include() only takes one file.");
    }
    let mut optional = false;
    let mut no_policy_scope = false;
    let mut result_variable: Option<&str> = None;
    let mut idx = 1;
    while idx < args.len() {
        match args[idx].as_str() {
            "OPTIONAL" => {
                if optional {
                    return status.fail("called with invalid arguments: OPTIONAL used twice");
                }
                optional = true;
            }
            "RESULT_VARIABLE" => {
                if result_variable.is_some() {
                    return status.fail("called with invalid arguments: only one result variable allowed");
                }
                idx += 1;
                match args.get(idx) {
                    Some(name) => result_variable = Some(name),
                    None => return status.fail("called with no value for RESULT_VARIABLE."),
                }
            }
            "NO_POLICY_SCOPE" => no_policy_scope = true,
            other if idx > 1 => {
                return status.fail(format!("called with invalid argument: {other}"));
            }
            _ => {}
        }
        idx += 1;
    }

    let mut file = args[0].clone();
    if file.is_empty() {
        interp.issue_message(
            MessageType::AuthorWarning,
            "include() given empty file name (ignored).",
        );
        return true;
    }
    if !is_full_path(&file) {
        if let Some(module) = find_module(interp, &format!("{file}.cmake")) {
            file = module;
        }
    }
    let full = collapse_full_path(&file, &interp.current_source_dir());
    let read = interp.read_dependent_file(&full, no_policy_scope);
    if let Some(name) = result_variable {
        interp.add_definition(name, if read { &full } else { "NOTFOUND" });
    }
    if !optional && !read && !interp.fatal_error_occurred() {
        return status.fail(format!("could not find requested file:\n  {file}"));
    }
    true
}

/// Parses `min[...max]`. A `...` needs a version on both sides.
fn split_version_range<'v>(text: &'v str, status: &mut ExecutionStatus) -> Option<(&'v str, Option<&'v str>)> {
    match text.split_once("...") {
        None => Some((text, None)),
        Some((min, max)) if !min.is_empty() && !max.is_empty() => Some((min, Some(max))),
        Some(_) => {
            status.set_error(format!(
                "VERSION \"{text}\" does not have a version on both sides of \"...\"."
            ));
            None
        }
    }
}

/// Leading `major.minor[.patch[.tweak]]` components, as `sscanf("%u.%u...")`
/// reads them. Fewer than two components is a failure.
fn scan_version(text: &str) -> Option<Version> {
    let mut parts = Vec::new();
    for piece in text.splitn(4, '.') {
        let digits: String = piece.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            break;
        }
        parts.push(digits.parse::<u32>().ok()?);
        if digits.len() != piece.len() {
            break;
        }
    }
    if parts.len() < 2 {
        return None;
    }
    parts.resize(3, 0);
    Some(Version::new(parts[0], parts[1], parts[2]))
}

fn cmake_minimum_required_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let mut version: Option<&str> = None;
    let mut expecting_version = false;
    let mut unknown = Vec::new();
    for arg in args {
        match arg.as_str() {
            "VERSION" => expecting_version = true,
            "FATAL_ERROR" => {
                if expecting_version {
                    return status.fail("called with no value for VERSION.");
                }
            }
            value if expecting_version => {
                expecting_version = false;
                version = Some(value);
            }
            value => unknown.push(value),
        }
    }
    if expecting_version {
        return status.fail("called with no value for VERSION.");
    }
    let Some(version) = version else {
        return enforce_unknown_arguments(None, &unknown, status);
    };
    let Some((min, max)) = split_version_range(version, status) else {
        return false;
    };
    interp.add_definition("CMAKE_MINIMUM_REQUIRED_VERSION", min);

    let Some(required) = scan_version(min) else {
        return status.fail(format!("could not parse VERSION \"{min}\"."));
    };
    if required > ENGINE_VERSION {
        return super::fatal_error(
            interp,
            format!(
                "CMake {}.{} or higher is required.  You are running version {ENGINE_VERSION}",
                required.major, required.minor
            ),
        );
    }
    if !enforce_unknown_arguments(max, &unknown, status) {
        return false;
    }
    if required < Version::new(2, 4, 0) {
        interp.issue_message(
            MessageType::AuthorWarning,
            "Compatibility with CMake < 2.4 is not supported by CMake >= 3.0.",
        );
        interp.set_policy_version("2.4", max);
    } else {
        interp.set_policy_version(min, max);
    }
    true
}

/// Unknown arguments are only tolerated when the range's max is newer than
/// this engine.
fn enforce_unknown_arguments(max: Option<&str>, unknown: &[&str], status: &mut ExecutionStatus) -> bool {
    let Some(first) = unknown.first() else {
        return true;
    };
    if let Some(max) = max.and_then(scan_version) {
        if ENGINE_VERSION < max {
            return true;
        }
    }
    status.fail(format!("called with unknown argument \"{first}\"."))
}

fn cmake_policy_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(mode) = args.first() else {
        return status.fail("requires at least one argument.");
    };
    match mode.as_str() {
        "SET" => {
            if args.len() != 3 {
                return status.fail("SET must be given exactly 2 additional arguments.");
            }
            let policy = match args[2].as_str() {
                "OLD" => PolicyStatus::Old,
                "NEW" => PolicyStatus::New,
                other => {
                    return status.fail(format!("SET given unrecognized policy status \"{other}\""));
                }
            };
            if !interp.set_policy_by_name(&args[1], policy) {
                return status.fail("SET failed to set policy.");
            }
            true
        }
        "GET" => {
            if args.len() != 3 {
                return status.fail("GET must be given exactly 2 additional arguments.");
            }
            let Some(id) = PolicyId::parse(&args[1]) else {
                return status.fail(format!(
                    "GET given policy \"{}\" which is not known to this version of CMake.",
                    args[1]
                ));
            };
            let value = match interp.policy_status(id) {
                PolicyStatus::Old => "OLD",
                PolicyStatus::Warn => "",
                PolicyStatus::New => "NEW",
            };
            interp.add_definition(&args[2], value);
            true
        }
        "PUSH" => {
            if args.len() > 1 {
                return status.fail("PUSH may not be given additional arguments.");
            }
            interp.push_policy(false, Default::default());
            true
        }
        "POP" => {
            if args.len() > 1 {
                return status.fail("POP may not be given additional arguments.");
            }
            interp.pop_policy();
            true
        }
        "VERSION" => {
            if args.len() <= 1 {
                return status.fail("VERSION not given an argument");
            }
            if args.len() >= 3 {
                return status.fail("VERSION given too many arguments");
            }
            let Some((min, max)) = split_version_range(&args[1], status) else {
                return false;
            };
            interp.set_policy_version(min, max);
            true
        }
        "GET_WARNING" => {
            if args.len() != 3 {
                return status.fail("GET_WARNING must be given exactly 2 additional arguments.");
            }
            let Some(id) = PolicyId::parse(&args[1]) else {
                return status.fail(format!(
                    "GET_WARNING given policy \"{}\" which is not known to this version of CMake.",
                    args[1]
                ));
            };
            interp.add_definition(&args[2], &id.warning());
            true
        }
        other => status.fail(format!("given unknown first argument \"{other}\"")),
    }
}

fn add_subdirectory_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(source_arg) = args.first() else {
        return status.fail("called with incorrect number of arguments");
    };
    let mut binary_arg: Option<&str> = None;
    let mut exclude_from_all = false;
    let mut system = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "EXCLUDE_FROM_ALL" => exclude_from_all = true,
            "SYSTEM" => system = true,
            other if binary_arg.is_none() => binary_arg = Some(other),
            _ => return status.fail("called with incorrect number of arguments"),
        }
    }
    let current_source = interp.current_source_dir();
    let current_binary = interp.current_binary_dir();
    let snapshot = interp.current_snapshot();
    if interp
        .state()
        .directory(snapshot)
        .and_then(|dir| dir.properties.get("SYSTEM"))
        .is_some_and(crate::language::expand::is_on)
    {
        system = true;
    }

    let source = if is_full_path(source_arg) {
        source_arg.clone()
    } else {
        format!("{current_source}/{source_arg}")
    };
    if !interp.platform().fs_is_dir(&source) {
        return status.fail(format!(
            "given source \"{source_arg}\" which is not an existing directory."
        ));
    }
    let source = collapse_full_path(&source, &current_source);

    let binary = match binary_arg {
        Some(binary) if is_full_path(binary) => binary.to_string(),
        Some(binary) => format!("{current_binary}/{binary}"),
        None => {
            let Some(relative) = source
                .strip_prefix(current_source.trim_end_matches('/'))
                .filter(|rest| rest.starts_with('/'))
            else {
                return status.fail(format!(
                    "not given a binary directory but the given source directory \"{source}\" is not a subdirectory of \"{current_source}\".  When specifying an out-of-tree source a binary directory must be explicitly specified."
                ));
            };
            format!("{}{relative}", current_binary.trim_end_matches('/'))
        }
    };
    let binary = collapse_full_path(&binary, &current_binary);
    interp.add_subdirectory(&source, &binary, exclude_from_all, system);
    true
}

fn project_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(name) = args.first() else {
        return status.fail("PROJECT called with incorrect number of arguments");
    };
    if name.is_empty() {
        return status.fail("PROJECT called with an empty project name");
    }

    let mut version: Option<&str> = None;
    let mut description: Option<&str> = None;
    let mut homepage: Option<&str> = None;
    let mut keyword: Option<&str> = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "VERSION" | "DESCRIPTION" | "HOMEPAGE_URL" | "LANGUAGES" => {
                keyword = Some(arg.as_str());
            }
            value => match keyword {
                Some("VERSION") if version.is_none() => version = Some(value),
                Some("DESCRIPTION") if description.is_none() => description = Some(value),
                Some("HOMEPAGE_URL") if homepage.is_none() => homepage = Some(value),
                Some(repeated @ ("VERSION" | "DESCRIPTION" | "HOMEPAGE_URL")) => {
                    return status.fail(format!("{repeated} may be specified at most once."));
                }
                // languages select a toolchain, which this engine does not model
                _ => {}
            },
        }
    }

    let source = interp.current_source_dir();
    let binary = interp.current_binary_dir();
    let snapshot = interp.current_snapshot();
    let is_top_level = interp.state().buildsystem_directory_parent(snapshot).is_none();
    if let Some(dir) = interp.state_mut().directory_mut(snapshot) {
        dir.project_name = name.clone();
    }

    const HELP: &str = "Value Computed by CMake";
    interp.add_cache_definition(&format!("{name}_BINARY_DIR"), &binary, HELP, CacheEntryType::Static, true);
    interp.add_cache_definition(&format!("{name}_SOURCE_DIR"), &source, HELP, CacheEntryType::Static, true);
    interp.add_cache_definition(
        &format!("{name}_IS_TOP_LEVEL"),
        if is_top_level { "ON" } else { "OFF" },
        HELP,
        CacheEntryType::Static,
        true,
    );
    interp.add_definition("PROJECT_NAME", name);
    interp.add_definition("PROJECT_SOURCE_DIR", &source);
    interp.add_definition("PROJECT_BINARY_DIR", &binary);
    interp.add_definition(&format!("{name}_SOURCE_DIR"), &source);
    interp.add_definition(&format!("{name}_BINARY_DIR"), &binary);
    interp.add_definition_bool("PROJECT_IS_TOP_LEVEL", is_top_level);
    interp.add_definition_bool(&format!("{name}_IS_TOP_LEVEL"), is_top_level);
    if is_top_level {
        interp.add_definition("CMAKE_PROJECT_NAME", name);
    }

    let components: Vec<String> = match version {
        Some(text) => {
            let valid = !text.is_empty()
                && text.split('.').count() <= 4
                && text
                    .split('.')
                    .all(|piece| !piece.is_empty() && piece.chars().all(|c| c.is_ascii_digit()));
            if !valid {
                return status.fail(format!("VERSION \"{text}\" format invalid."));
            }
            text.split('.').map(str::to_string).collect()
        }
        None => Vec::new(),
    };
    let full_version = components.join(".");
    let suffixes = ["MAJOR", "MINOR", "PATCH", "TWEAK"];
    for prefix in ["PROJECT".to_string(), name.clone()] {
        interp.add_definition(&format!("{prefix}_VERSION"), &full_version);
        for (idx, suffix) in suffixes.iter().enumerate() {
            let value = components.get(idx).map(String::as_str).unwrap_or("");
            interp.add_definition(&format!("{prefix}_VERSION_{suffix}"), value);
        }
        interp.add_definition(&format!("{prefix}_DESCRIPTION"), description.unwrap_or(""));
        interp.add_definition(&format!("{prefix}_HOMEPAGE_URL"), homepage.unwrap_or(""));
    }
    if is_top_level {
        interp.add_definition("CMAKE_PROJECT_VERSION", &full_version);
        interp.add_definition("CMAKE_PROJECT_DESCRIPTION", description.unwrap_or(""));
        interp.add_definition("CMAKE_PROJECT_HOMEPAGE_URL", homepage.unwrap_or(""));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_version_prefixes() {
        assert_eq!(scan_version("3.10"), Some(Version::new(3, 10, 0)));
        assert_eq!(scan_version("3.10.2.1"), Some(Version::new(3, 10, 2)));
        assert_eq!(scan_version("3.5rc"), Some(Version::new(3, 5, 0)));
        assert_eq!(scan_version("3"), None);
        assert_eq!(scan_version("x.1"), None);
    }

    #[test]
    fn version_ranges_need_both_sides() {
        let mut status = ExecutionStatus::new();
        assert_eq!(split_version_range("3.5...3.28", &mut status), Some(("3.5", Some("3.28"))));
        assert_eq!(split_version_range("3.5", &mut status), Some(("3.5", None)));
        assert_eq!(split_version_range("3.5...", &mut status), None);
        assert!(status.error().contains("both sides"));
    }
}
