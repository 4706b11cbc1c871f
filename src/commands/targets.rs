//! Build-model commands: target declarations and the directory build
//! settings that later targets pick up.

use super::{
    fatal_error,
    properties::{set_target_property, target_property, Edit},
    scope::is_full_path,
};
use crate::language::expand::{is_off, join_list, split_list};
use crate::runtime::{
    interpreter::Interpreter,
    platform::collapse_full_path,
    properties::PropertyScope,
    registry::CommandRegistry,
    state::ContentKind,
    status::ExecutionStatus,
};
use crate::target::{Target, TargetType};

pub fn register(registry: &mut CommandRegistry) {
    registry.add_builtin("add_executable", add_executable_command);
    registry.add_builtin("add_library", add_library_command);
    registry.add_builtin("add_custom_target", add_custom_target_command);
    registry.add_builtin("set_target_properties", set_target_properties_command);
    registry.add_builtin("get_target_property", get_target_property_command);
    registry.add_builtin("include_directories", include_directories_command);
    registry.add_builtin("add_compile_options", add_compile_options_command);
    registry.add_builtin("add_compile_definitions", add_compile_definitions_command);
    registry.add_builtin("add_definitions", add_definitions_command);
    registry.add_builtin("add_link_options", add_link_options_command);
    registry.add_builtin("link_directories", link_directories_command);
}

const RESERVED_TARGETS: [&str; 10] = [
    "all",
    "ALL_BUILD",
    "help",
    "install",
    "INSTALL",
    "preinstall",
    "clean",
    "edit_cache",
    "rebuild_cache",
    "ZERO_CHECK",
];

fn is_valid_target_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-' | ':'))
}

/// Reports a reserved or malformed name. Returns true when the name is usable.
fn check_target_name(interp: &mut Interpreter, name: &str) -> bool {
    if is_valid_target_name(name) && !RESERVED_TARGETS.contains(&name) {
        return true;
    }
    fatal_error(
        interp,
        format!("The target name \"{name}\" is reserved or not valid for certain CMake features, such as generator expressions, and may result in undefined behavior."),
    );
    false
}

/// Declares a target built in the current directory. New targets start
/// with the directory's build settings and any property initialized from
/// a variable.
fn create_target(
    interp: &mut Interpreter,
    name: &str,
    kind: TargetType,
    sources: &[String],
    exclude_from_all: bool,
) -> Result<(), String> {
    let snapshot = interp.current_snapshot();
    let mut target = Target::new(name, kind, interp.current_source_dir());
    for content in ContentKind::ALL {
        if content == ContentKind::CompileDefinitions {
            continue;
        }
        let entries = interp.state().content(snapshot, content);
        if !entries.is_empty() {
            target.properties.set(content.property_name(), join_list(&entries));
        }
    }
    if !sources.is_empty() {
        target.properties.set("SOURCES", join_list(sources));
    }
    if exclude_from_all {
        target.properties.set("EXCLUDE_FROM_ALL", "TRUE");
    }
    let initializers: Vec<(String, String)> = interp
        .state()
        .property_definitions
        .initializers(PropertyScope::Target)
        .map(|(property, variable)| (property.to_string(), variable.to_string()))
        .collect();
    for (property, variable) in initializers {
        if let Some(value) = interp.definition(&variable) {
            target.properties.set(&property, value);
        }
    }

    interp.targets_mut().add(target).map_err(|err| {
        format!("cannot create target \"{name}\" because {err}  See documentation for policy CMP0002 for more details.")
    })?;
    if let Some(dir) = interp.state_mut().directory_mut(snapshot) {
        dir.target_names.push(name.to_string());
    }
    Ok(())
}

fn create_imported_target(interp: &mut Interpreter, name: &str, kind: TargetType, global: bool) -> Result<(), String> {
    let err = || format!("cannot create imported target \"{name}\" because another target with the same name already exists.");
    if interp.targets().contains(name) {
        return Err(err());
    }
    let mut target = Target::new(name, kind, interp.current_source_dir());
    target.imported = true;
    if global {
        target.properties.set("IMPORTED_GLOBAL", "TRUE");
    }
    interp.targets_mut().add(target).map_err(|_| err())
}

/// Checks the `ALIAS` signature and records the alias. `accepts` decides
/// whether the aliased target's type fits the command.
fn create_alias(
    interp: &mut Interpreter,
    args: &[String],
    rest: &[String],
    accepts: fn(&Target) -> bool,
    kind_name: &str,
) -> Result<(), String> {
    let name = &args[0];
    if args.len() != 3 || rest.len() != 1 {
        return Err("ALIAS requires exactly one target argument.".into());
    }
    let aliased = &rest[0];
    let prefix = format!("cannot create ALIAS target \"{name}\" because");
    if interp.targets().is_alias(aliased) {
        return Err(format!("{prefix} target \"{aliased}\" is itself an ALIAS."));
    }
    let Some(target) = interp.targets().get(aliased) else {
        return Err(format!("{prefix} target \"{aliased}\" does not already exist."));
    };
    if !accepts(target) {
        return Err(format!("{prefix} target \"{aliased}\" is not {kind_name}."));
    }
    interp
        .targets_mut()
        .add_alias(name, aliased)
        .map_err(|err| format!("{prefix} {err}"))
}

fn add_executable_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(name) = args.first() else {
        return status.fail("called with incorrect number of arguments");
    };
    let mut win32 = false;
    let mut bundle = false;
    let mut exclude_from_all = false;
    let mut imported = false;
    let mut global = false;
    let mut alias = false;
    let mut idx = 1;
    while let Some(arg) = args.get(idx) {
        match arg.as_str() {
            "WIN32" => win32 = true,
            "MACOSX_BUNDLE" => bundle = true,
            "EXCLUDE_FROM_ALL" => exclude_from_all = true,
            "IMPORTED" => imported = true,
            "GLOBAL" if imported => global = true,
            "ALIAS" => {
                alias = true;
                idx += 1;
                break;
            }
            _ => break,
        }
        idx += 1;
    }
    let rest = &args[idx.min(args.len())..];

    if !check_target_name(interp, name) {
        return true;
    }
    if imported && (win32 || bundle || exclude_from_all) {
        let option = if win32 {
            "WIN32"
        } else if bundle {
            "MACOSX_BUNDLE"
        } else {
            "EXCLUDE_FROM_ALL"
        };
        return status.fail(format!("may not be given {option} for an IMPORTED target."));
    }
    if alias {
        if exclude_from_all {
            return status.fail("EXCLUDE_FROM_ALL with ALIAS makes no sense.");
        }
        if imported {
            return status.fail("IMPORTED with ALIAS is not allowed.");
        }
        let is_executable = |target: &Target| target.kind == TargetType::Executable;
        return match create_alias(interp, args, rest, is_executable, "an executable") {
            Ok(()) => true,
            Err(err) => status.fail(err),
        };
    }
    if imported {
        return match create_imported_target(interp, name, TargetType::Executable, global) {
            Ok(()) => true,
            Err(err) => status.fail(err),
        };
    }

    if let Err(err) = create_target(interp, name, TargetType::Executable, rest, exclude_from_all) {
        return status.fail(err);
    }
    if let Some(target) = interp.targets_mut().get_mut(name) {
        if win32 {
            target.properties.set("WIN32_EXECUTABLE", "ON");
        }
        if bundle {
            target.properties.set("MACOSX_BUNDLE", "ON");
        }
    }
    true
}

fn is_library(target: &Target) -> bool {
    match target.kind {
        TargetType::StaticLibrary
        | TargetType::SharedLibrary
        | TargetType::ModuleLibrary
        | TargetType::ObjectLibrary
        | TargetType::InterfaceLibrary => true,
        TargetType::UnknownLibrary => target.imported,
        TargetType::Executable | TargetType::Utility => false,
    }
}

fn add_library_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(name) = args.first() else {
        return status.fail("called with incorrect number of arguments");
    };
    let mut kind = if interp.is_on("BUILD_SHARED_LIBS") {
        TargetType::SharedLibrary
    } else {
        TargetType::StaticLibrary
    };
    let mut have_type = false;
    let mut alias = false;
    let mut exclude_from_all = false;
    let mut imported = false;
    let mut global = false;
    let mut idx = 1;
    while let Some(arg) = args.get(idx) {
        match arg.as_str() {
            "INTERFACE" => {
                if have_type {
                    return status.fail("INTERFACE library specified with conflicting/multiple types.");
                }
                if alias {
                    return status.fail("INTERFACE library specified with conflicting ALIAS type.");
                }
                kind = TargetType::InterfaceLibrary;
                have_type = true;
            }
            "ALIAS" => {
                if kind == TargetType::InterfaceLibrary {
                    return status.fail("INTERFACE library specified with conflicting ALIAS type.");
                }
                alias = true;
            }
            "EXCLUDE_FROM_ALL" => exclude_from_all = true,
            "IMPORTED" => imported = true,
            "GLOBAL" if imported => global = true,
            "GLOBAL" if kind == TargetType::InterfaceLibrary => {
                return status.fail("GLOBAL option may only be used with IMPORTED libraries.");
            }
            keyword => match TargetType::from_library_keyword(keyword) {
                Some(library) => {
                    if kind == TargetType::InterfaceLibrary {
                        return status.fail(format!(
                            "INTERFACE library specified with conflicting {keyword} type."
                        ));
                    }
                    kind = library;
                    have_type = true;
                }
                None => break,
            },
        }
        idx += 1;
        if alias {
            break;
        }
    }
    let rest = &args[idx.min(args.len())..];

    if !check_target_name(interp, name) {
        return true;
    }
    if alias {
        if exclude_from_all {
            return status.fail("EXCLUDE_FROM_ALL with ALIAS makes no sense.");
        }
        if imported {
            return status.fail("IMPORTED with ALIAS is not allowed.");
        }
        return match create_alias(interp, args, rest, is_library, "a library") {
            Ok(()) => true,
            Err(err) => status.fail(err),
        };
    }
    if imported && exclude_from_all {
        return status.fail("excludeFromAll with IMPORTED target makes no sense.");
    }
    if kind == TargetType::UnknownLibrary && !imported {
        return status.fail("UNKNOWN library type used with non-IMPORTED library.");
    }
    if imported {
        if !have_type {
            return status.fail("called with IMPORTED argument but no library type.");
        }
        return match create_imported_target(interp, name, kind, global) {
            Ok(()) => true,
            Err(err) => status.fail(err),
        };
    }
    if kind == TargetType::InterfaceLibrary && name.contains("::") {
        return status.fail(format!("Invalid name for INTERFACE library target: {name}"));
    }
    match create_target(interp, name, kind, rest, exclude_from_all) {
        Ok(()) => true,
        Err(err) => status.fail(err),
    }
}

fn add_custom_target_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(name) = args.first() else {
        return status.fail("called with incorrect number of arguments");
    };
    if name.contains(['/', '\\']) {
        return status.fail(format!(
            "called with invalid target name \"{name}\".  Target names may not contain a slash.  Use ADD_CUSTOM_COMMAND to generate files."
        ));
    }

    enum Doing {
        Nothing,
        Command,
        Depends,
        Byproducts,
        WorkingDirectory,
        Comment,
        JobPool,
        Sources,
    }
    let mut doing = Doing::Command;
    let mut exclude_from_all = true;
    let mut commands: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut depends = Vec::new();
    let mut byproducts = Vec::new();
    let mut sources = Vec::new();
    let mut working_directory = None;
    let mut comment = None;
    let mut job_pool = None;
    let mut uses_terminal = false;
    let mut expand_lists = false;
    for (idx, arg) in args.iter().enumerate().skip(1) {
        match arg.as_str() {
            "ALL" if idx == 1 => exclude_from_all = false,
            "DEPENDS" => doing = Doing::Depends,
            "BYPRODUCTS" => doing = Doing::Byproducts,
            "WORKING_DIRECTORY" => doing = Doing::WorkingDirectory,
            "COMMENT" => doing = Doing::Comment,
            "JOB_POOL" => doing = Doing::JobPool,
            "SOURCES" => doing = Doing::Sources,
            "COMMAND" => {
                doing = Doing::Command;
                if !current.is_empty() {
                    commands.push(std::mem::take(&mut current));
                }
            }
            "VERBATIM" | "USES_TERMINAL" | "COMMAND_EXPAND_LISTS" | "JOB_SERVER_AWARE" => {
                doing = Doing::Nothing;
                match arg.as_str() {
                    "USES_TERMINAL" => uses_terminal = true,
                    "COMMAND_EXPAND_LISTS" => expand_lists = true,
                    _ => {}
                }
            }
            _ => match doing {
                Doing::Command => current.push(arg),
                Doing::Depends => depends.push(arg.as_str()),
                Doing::Byproducts => byproducts.push(arg.as_str()),
                Doing::Sources => sources.push(arg.clone()),
                Doing::WorkingDirectory => {
                    working_directory = Some(arg.clone());
                    doing = Doing::Nothing;
                }
                Doing::Comment => {
                    comment = Some(arg.clone());
                    doing = Doing::Nothing;
                }
                Doing::JobPool => {
                    job_pool = Some(arg.clone());
                    doing = Doing::Nothing;
                }
                Doing::Nothing => return status.fail("Wrong syntax. Unknown type of argument."),
            },
        }
    }
    if !current.is_empty() {
        commands.push(current);
    }

    if commands.is_empty() && !byproducts.is_empty() {
        return status.fail("BYPRODUCTS may not be specified without any COMMAND");
    }
    if !check_target_name(interp, name) {
        return true;
    }
    if commands.is_empty() && uses_terminal {
        return status.fail("USES_TERMINAL may not be specified without any COMMAND");
    }
    if commands.is_empty() && expand_lists {
        return status.fail("COMMAND_EXPAND_LISTS may not be specified without any COMMAND");
    }
    if job_pool.is_some() && uses_terminal {
        return status.fail("JOB_POOL is shadowed by USES_TERMINAL.");
    }

    if let Err(err) = create_target(interp, name, TargetType::Utility, &sources, exclude_from_all) {
        return status.fail(err);
    }
    tracing::debug!(
        target = %name,
        commands = commands.len(),
        depends = depends.len(),
        working_directory = ?working_directory,
        comment = ?comment,
        "declared custom target"
    );
    true
}

fn set_target_properties_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 2 {
        return status.fail("called with incorrect number of arguments");
    }
    let Some(props_at) = args.iter().position(|arg| arg == "PROPERTIES") else {
        return status.fail("called with illegal arguments, maybe missing a PROPERTIES specifier?");
    };
    let pairs = &args[props_at + 1..];
    if pairs.is_empty() {
        return status.fail("called with illegal arguments, maybe missing a PROPERTIES specifier?");
    }
    if pairs.len() % 2 != 0 {
        return status.fail("called with incorrect number of arguments.");
    }
    for name in &args[..props_at] {
        if interp.targets().is_alias(name) {
            return status.fail("can not be used on an ALIAS target.");
        }
        if !interp.targets().contains(name) {
            return status.fail(format!("Can not find target to add properties to: {name}"));
        }
        for pair in pairs.chunks(2) {
            if !set_target_property(interp, name, &pair[0], Edit::Set(&pair[1])) {
                return true;
            }
        }
    }
    true
}

fn get_target_property_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() != 3 {
        return status.fail("called with incorrect number of arguments");
    }
    let (variable, name, property) = (&args[0], &args[1], &args[2]);
    if !interp.targets().contains(name) {
        return fatal_error(
            interp,
            format!("get_target_property() called with non-existent target \"{name}\"."),
        );
    }
    let value = if property.is_empty() {
        None
    } else {
        target_property(interp, name, property)
    };
    match value {
        Some(value) => interp.add_definition(variable, &value),
        None => interp.add_definition(variable, &format!("{variable}-NOTFOUND")),
    }
    true
}

/// Makes a relative include directory absolute against the current source
/// directory. Off values and generator expressions pass through.
fn normalize_include(interp: &Interpreter, include: &str) -> String {
    let trimmed = include.trim_matches([' ', '\r']);
    let path = trimmed.replace('\\', "/");
    if is_off(&path) || is_full_path(&path) || path.starts_with("$<") {
        return path;
    }
    format!("{}/{path}", interp.current_source_dir())
}

/// Adds `value` to the front of a directory's build setting.
fn prepend_content(interp: &mut Interpreter, kind: ContentKind, value: &str) {
    if value.is_empty() {
        return;
    }
    let snapshot = interp.current_snapshot();
    let mut entries = vec![value.to_string()];
    entries.extend(interp.state().content(snapshot, kind));
    interp.state_mut().set_content(snapshot, kind, &join_list(&entries));
}

fn append_content(interp: &mut Interpreter, kind: ContentKind, value: &str) {
    let snapshot = interp.current_snapshot();
    interp.state_mut().append_content(snapshot, kind, value);
}

fn include_directories_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(first) = args.first() else {
        return true;
    };
    let mut before = interp.is_on("CMAKE_INCLUDE_DIRECTORIES_BEFORE");
    let mut rest = args;
    match first.as_str() {
        "BEFORE" => {
            before = true;
            rest = &args[1..];
        }
        "AFTER" => {
            before = false;
            rest = &args[1..];
        }
        _ => {}
    }

    let mut before_includes = Vec::new();
    let mut after_includes = Vec::new();
    let mut system_includes = Vec::new();
    let mut system = false;
    for arg in rest {
        if arg == "SYSTEM" {
            system = true;
            continue;
        }
        if arg.is_empty() {
            return status.fail("given empty-string as include directory.");
        }
        let includes: Vec<String> = split_list(arg)
            .iter()
            .map(|include| normalize_include(interp, include))
            .collect();
        if system {
            system_includes.extend(includes.iter().cloned());
        }
        if before {
            before_includes.extend(includes);
        } else {
            after_includes.extend(includes);
        }
    }
    before_includes.reverse();

    let after = join_list(&after_includes);
    append_content(interp, ContentKind::IncludeDirectories, &after);
    let front = join_list(&before_includes);
    prepend_content(interp, ContentKind::IncludeDirectories, &front);

    let snapshot = interp.current_snapshot();
    let names = interp
        .state()
        .directory(snapshot)
        .map(|dir| dir.target_names.clone())
        .unwrap_or_default();
    for name in names {
        if let Some(target) = interp.targets_mut().get_mut(&name) {
            target.properties.append("INCLUDE_DIRECTORIES", &after, false);
            if !front.is_empty() {
                let mut entries = split_list(&front);
                entries.extend(split_list(
                    target.properties.get("INCLUDE_DIRECTORIES").unwrap_or_default(),
                ));
                target.properties.set("INCLUDE_DIRECTORIES", join_list(&entries));
            }
        }
    }
    if !system_includes.is_empty() {
        if let Some(dir) = interp.state_mut().directory_mut(snapshot) {
            dir.properties
                .append("SYSTEM_INCLUDE_DIRECTORIES", &join_list(&system_includes), false);
        }
    }
    true
}

fn add_compile_options_command(interp: &mut Interpreter, args: &[String], _status: &mut ExecutionStatus) -> bool {
    for option in args {
        append_content(interp, ContentKind::CompileOptions, option);
    }
    true
}

fn add_compile_definitions_command(interp: &mut Interpreter, args: &[String], _status: &mut ExecutionStatus) -> bool {
    for definition in args {
        append_content(interp, ContentKind::CompileDefinitions, definition);
    }
    true
}

/// The name and value of a `-DNAME[=value]` or `/DNAME[=value]` flag.
fn parse_define_flag(flag: &str) -> Option<&str> {
    let define = flag
        .strip_prefix("-D")
        .or_else(|| flag.strip_prefix("/D"))?;
    let name = define.split('=').next().unwrap_or_default();
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    (starts_well && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')).then_some(define)
}

fn add_definitions_command(interp: &mut Interpreter, args: &[String], _status: &mut ExecutionStatus) -> bool {
    let snapshot = interp.current_snapshot();
    for flag in args {
        if flag.is_empty() {
            continue;
        }
        if let Some(dir) = interp.state_mut().directory_mut(snapshot) {
            let definitions = match dir.properties.get("DEFINITIONS") {
                Some(existing) if !existing.is_empty() => format!("{existing} {flag}"),
                _ => flag.clone(),
            };
            dir.properties.set("DEFINITIONS", definitions);
        }
        match parse_define_flag(flag) {
            Some(define) => append_content(interp, ContentKind::CompileDefinitions, define),
            None => append_content(interp, ContentKind::CompileOptions, flag),
        }
    }
    true
}

fn add_link_options_command(interp: &mut Interpreter, args: &[String], _status: &mut ExecutionStatus) -> bool {
    for option in args {
        append_content(interp, ContentKind::LinkOptions, option);
    }
    true
}

fn link_directories_command(interp: &mut Interpreter, args: &[String], _status: &mut ExecutionStatus) -> bool {
    let Some(first) = args.first() else {
        return true;
    };
    let mut before = interp.is_on("CMAKE_LINK_DIRECTORIES_BEFORE");
    let mut rest = args;
    match first.as_str() {
        "BEFORE" => {
            before = true;
            rest = &args[1..];
        }
        "AFTER" => {
            before = false;
            rest = &args[1..];
        }
        _ => {}
    }
    let base = interp.current_source_dir();
    let directories: Vec<String> = rest
        .iter()
        .map(|dir| {
            let dir = dir.replace('\\', "/");
            if is_full_path(&dir) || dir.starts_with("$<") {
                dir
            } else {
                collapse_full_path(&dir, &base)
            }
        })
        .collect();
    let joined = join_list(&directories);
    if before {
        prepend_content(interp, ContentKind::LinkDirectories, &joined);
    } else {
        append_content(interp, ContentKind::LinkDirectories, &joined);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_names() {
        assert!(is_valid_target_name("ns::core"));
        assert!(is_valid_target_name("lib-2.0+x"));
        assert!(!is_valid_target_name("has space"));
        assert!(!is_valid_target_name(""));
    }

    #[test]
    fn define_flags() {
        assert_eq!(parse_define_flag("-DFOO"), Some("FOO"));
        assert_eq!(parse_define_flag("/DBAR=1"), Some("BAR=1"));
        assert_eq!(parse_define_flag("-D1X"), None);
        assert_eq!(parse_define_flag("-Wall"), None);
    }
}
