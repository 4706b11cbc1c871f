//! Property commands over the global, directory, target and cache scopes.

use super::fatal_error;
use crate::language::expand::{is_off, is_on, join_list};
use crate::runtime::{
    cache::CacheEntryType,
    interpreter::Interpreter,
    platform::collapse_full_path,
    properties::{PropertyDefinition, PropertyMap, PropertyScope},
    registry::CommandRegistry,
    state::{ContentKind, SnapshotId},
    status::ExecutionStatus,
};
use std::collections::BTreeSet;

pub fn register(registry: &mut CommandRegistry) {
    registry.add_builtin("set_property", set_property_command);
    registry.add_builtin("get_property", get_property_command);
    registry.add_builtin("define_property", define_property_command);
    registry.add_builtin("get_directory_property", get_directory_property_command);
    registry.add_builtin("set_directory_properties", set_directory_properties_command);
    registry.add_builtin("get_cmake_property", get_cmake_property_command);
}

const DIRECTORY_NOT_FOUND: &str = "DIRECTORY scope provided but requested directory was not found. This could be because the directory argument was invalid or, it is valid but has not been processed yet.";

/// How a property is changed.
#[derive(Clone, Copy)]
pub(crate) enum Edit<'a> {
    Set(&'a str),
    Append { value: &'a str, as_string: bool },
    Remove,
}

impl Edit<'_> {
    fn apply(self, props: &mut PropertyMap, name: &str) {
        match self {
            Edit::Set(value) => props.set(name, value),
            Edit::Append { value, as_string } => props.append(name, value, as_string),
            Edit::Remove => props.remove(name),
        }
    }
}

pub(crate) fn global_property(interp: &Interpreter, name: &str) -> Option<String> {
    let state = interp.state();
    match name {
        "CACHE_VARIABLES" => Some(join_list(&state.cache.names().collect::<Vec<_>>())),
        "COMMANDS" => Some(join_list(&state.commands.command_names())),
        "MACROS" => Some(join_list(&state.commands.macro_names())),
        _ => state.global_properties.get(name).map(str::to_string),
    }
}

/// Reads a directory property, walking up to the parent directory and then
/// the global scope for properties defined as `INHERITED`.
pub(crate) fn directory_property(interp: &Interpreter, snapshot: SnapshotId, name: &str) -> Option<String> {
    let state = interp.state();
    let dir = state.directory(snapshot)?;
    let value = match name {
        "SOURCE_DIR" => Some(dir.location.clone()),
        "BINARY_DIR" => Some(dir.output_location.clone()),
        "PARENT_DIRECTORY" => Some(
            state
                .buildsystem_directory_parent(snapshot)
                .and_then(|parent| state.directory(parent))
                .map(|parent| parent.location.clone())
                .unwrap_or_default(),
        ),
        "LISTFILE_STACK" => Some(join_list(&state.list_file_stack(snapshot))),
        "VARIABLES" => {
            let mut names: BTreeSet<String> = state.closure_keys(snapshot).into_iter().collect();
            names.extend(state.cache.names().map(str::to_string));
            Some(join_list(&names.into_iter().collect::<Vec<_>>()))
        }
        "MACROS" => Some(join_list(&state.commands.macro_names())),
        "SUBDIRECTORIES" => {
            let children: Vec<&str> = dir
                .children
                .iter()
                .filter_map(|child| state.directory(*child))
                .map(|child| child.location.as_str())
                .collect();
            Some(join_list(&children))
        }
        "BUILDSYSTEM_TARGETS" => Some(join_list(&dir.target_names)),
        _ => match ContentKind::from_property(name) {
            Some(kind) => Some(join_list(&state.content(snapshot, kind))),
            None => dir.properties.get(name).map(str::to_string),
        },
    };
    if value.is_none() && state.property_definitions.is_inherited(PropertyScope::Directory, name) {
        return match state.buildsystem_directory_parent(snapshot) {
            Some(parent) => directory_property(interp, parent, name),
            None => global_property(interp, name),
        };
    }
    value
}

pub(crate) fn set_directory_property(interp: &mut Interpreter, snapshot: SnapshotId, name: &str, edit: Edit<'_>) {
    let state = interp.state_mut();
    if let Some(kind) = ContentKind::from_property(name) {
        match edit {
            Edit::Set(value) => state.set_content(snapshot, kind, value),
            Edit::Append { value, .. } => state.append_content(snapshot, kind, value),
            Edit::Remove => state.clear_content(snapshot, kind),
        }
        return;
    }
    if let Some(dir) = state.directory_mut(snapshot) {
        edit.apply(&mut dir.properties, name);
    }
}

/// Reads a target property. Aliases resolve to their target, except for
/// `ALIASED_TARGET` itself.
pub(crate) fn target_property(interp: &Interpreter, target_name: &str, name: &str) -> Option<String> {
    let targets = interp.targets();
    if name == "ALIASED_TARGET" {
        return targets.aliased_target(target_name).map(str::to_string);
    }
    let target = targets.get(target_name)?;
    let value = target.property(name);
    if value.is_none() && interp.state().property_definitions.is_inherited(PropertyScope::Target, name) {
        let snapshot = interp.directory_snapshot(&target.directory)?;
        return directory_property(interp, snapshot, name);
    }
    value
}

/// Applies `edit` to a target property. Returns false after reporting a
/// read-only property.
pub(crate) fn set_target_property(interp: &mut Interpreter, target_name: &str, name: &str, edit: Edit<'_>) -> bool {
    if crate::target::Target::is_read_only(name) {
        fatal_error(interp, format!("{name} property is read-only"));
        return false;
    }
    if let Some(target) = interp.targets_mut().get_mut(target_name) {
        edit.apply(&mut target.properties, name);
    }
    true
}

fn find_directory(interp: &Interpreter, name: Option<&str>) -> Option<SnapshotId> {
    match name {
        None => Some(interp.current_snapshot()),
        Some(name) => {
            let full = collapse_full_path(name, &interp.current_source_dir());
            interp.directory_snapshot(&full)
        }
    }
}

fn set_property_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(scope_name) = args.first() else {
        return status.fail("called with incorrect number of arguments");
    };
    let scope = match scope_name.as_str() {
        "GLOBAL" => PropertyScope::Global,
        "DIRECTORY" => PropertyScope::Directory,
        "TARGET" => PropertyScope::Target,
        "CACHE" => PropertyScope::Cache,
        _ => {
            return status.fail(format!(
                "given invalid scope {scope_name}.  Valid scopes are GLOBAL, DIRECTORY, TARGET, CACHE."
            ));
        }
    };

    enum Doing {
        None,
        Names,
        Property,
        Values,
    }
    let mut doing = Doing::Names;
    let mut names = BTreeSet::new();
    let mut property = String::new();
    let mut values: Vec<&str> = Vec::new();
    let mut append = false;
    let mut as_string = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "PROPERTY" => doing = Doing::Property,
            "APPEND" | "APPEND_STRING" => {
                doing = Doing::None;
                append = true;
                as_string = arg == "APPEND_STRING";
            }
            _ => match doing {
                Doing::Names => {
                    names.insert(arg.as_str());
                }
                Doing::Property => {
                    property = arg.clone();
                    doing = Doing::Values;
                }
                Doing::Values => values.push(arg),
                Doing::None => return status.fail(format!("given invalid argument \"{arg}\".")),
            },
        }
    }
    if property.is_empty() {
        return status.fail("not given a PROPERTY <name> argument.");
    }

    let value = join_list(&values);
    let edit = if append {
        Edit::Append {
            value: &value,
            as_string,
        }
    } else if values.is_empty() {
        Edit::Remove
    } else {
        Edit::Set(&value)
    };

    match scope {
        PropertyScope::Global => {
            if !names.is_empty() {
                return status.fail("given names for GLOBAL scope.");
            }
            edit.apply(&mut interp.state_mut().global_properties, &property);
        }
        PropertyScope::Directory => {
            if names.len() > 1 {
                return status.fail("allows at most one name for DIRECTORY scope.");
            }
            let Some(snapshot) = find_directory(interp, names.first().copied()) else {
                return status.fail(DIRECTORY_NOT_FOUND);
            };
            set_directory_property(interp, snapshot, &property, edit);
        }
        PropertyScope::Target => {
            for name in names {
                if interp.targets().is_alias(name) {
                    return status.fail("can not be used on an ALIAS target.");
                }
                if !interp.targets().contains(name) {
                    return status.fail(format!(
                        "could not find TARGET {name}.  Perhaps it has not yet been created."
                    ));
                }
                if !set_target_property(interp, name, &property, edit) {
                    return true;
                }
            }
        }
        _ => {
            for name in names {
                if !interp.state().cache.contains(name) {
                    return status.fail(format!(
                        "could not find CACHE variable {name}.  Perhaps it has not yet been created."
                    ));
                }
                if property == "ADVANCED" && !values.is_empty() && !is_on(&value) && !is_off(&value) {
                    return status.fail(format!(
                        "given non-boolean value \"{value}\" for CACHE property \"ADVANCED\".  "
                    ));
                }
                if property == "TYPE" && CacheEntryType::parse(&value).is_none() {
                    return status.fail(format!("given invalid CACHE entry TYPE \"{value}\""));
                }
                let cache = &mut interp.state_mut().cache;
                match edit {
                    Edit::Remove => {
                        cache.set_property(name, &property, "", false);
                    }
                    Edit::Set(value) => {
                        cache.set_property(name, &property, value, false);
                    }
                    Edit::Append { value, .. } => {
                        cache.set_property(name, &property, value, true);
                    }
                }
            }
        }
    }
    true
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Info {
    Value,
    Set,
    Defined,
    BriefDocs,
    FullDocs,
}

fn get_property_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 3 {
        return status.fail("called with incorrect number of arguments");
    }
    let variable = &args[0];
    let scope = match args[1].as_str() {
        "GLOBAL" => PropertyScope::Global,
        "DIRECTORY" => PropertyScope::Directory,
        "TARGET" => PropertyScope::Target,
        "CACHE" => PropertyScope::Cache,
        "VARIABLE" => PropertyScope::Variable,
        other => {
            return status.fail(format!(
                "given invalid scope {other}.  Valid scopes are GLOBAL, DIRECTORY, TARGET, VARIABLE, CACHE."
            ));
        }
    };

    enum Doing {
        None,
        Name,
        Property,
    }
    let mut doing = Doing::Name;
    let mut name: Option<&str> = None;
    let mut property = "";
    let mut info = Info::Value;
    for arg in &args[2..] {
        match arg.as_str() {
            "PROPERTY" => doing = Doing::Property,
            "BRIEF_DOCS" | "FULL_DOCS" | "SET" | "DEFINED" => {
                doing = Doing::None;
                info = match arg.as_str() {
                    "BRIEF_DOCS" => Info::BriefDocs,
                    "FULL_DOCS" => Info::FullDocs,
                    "SET" => Info::Set,
                    _ => Info::Defined,
                };
            }
            _ => match doing {
                Doing::Name => {
                    doing = Doing::None;
                    name = Some(arg.as_str());
                }
                Doing::Property => {
                    doing = Doing::None;
                    property = arg.as_str();
                }
                Doing::None => return status.fail(format!("given invalid argument \"{arg}\".")),
            },
        }
    }
    if property.is_empty() {
        return status.fail("not given a PROPERTY <name> argument.");
    }

    match info {
        Info::Defined => {
            let defined = interp.state().property_definitions.get(scope, property).is_some();
            interp.add_definition(variable, if defined { "1" } else { "0" });
            return true;
        }
        Info::BriefDocs | Info::FullDocs => {
            let docs = interp
                .state()
                .property_definitions
                .get(scope, property)
                .map(|def| if info == Info::BriefDocs { def.brief.clone() } else { def.full.clone() })
                .unwrap_or_else(|| "NOTFOUND".to_string());
            interp.add_definition(variable, &docs);
            return true;
        }
        Info::Value | Info::Set => {}
    }

    let value = match scope {
        PropertyScope::Global => {
            if name.is_some() {
                return status.fail("given name for GLOBAL scope.");
            }
            global_property(interp, property)
        }
        PropertyScope::Directory => {
            let Some(snapshot) = find_directory(interp, name) else {
                return status.fail(DIRECTORY_NOT_FOUND);
            };
            directory_property(interp, snapshot, property)
        }
        PropertyScope::Target => {
            let Some(target) = name else {
                return status.fail("not given name for TARGET scope.");
            };
            if !interp.targets().contains(target) {
                return status.fail(format!(
                    "could not find TARGET {target}.  Perhaps it has not yet been created."
                ));
            }
            target_property(interp, target, property)
        }
        PropertyScope::Variable => {
            if name.is_some() {
                return status.fail("given name for VARIABLE scope.");
            }
            interp.definition(property).map(str::to_string)
        }
        _ => {
            let Some(entry) = name else {
                return status.fail("not given name for CACHE scope.");
            };
            interp.state().cache.property(entry, property)
        }
    };

    match (info, value) {
        (Info::Set, value) => interp.add_definition(variable, if value.is_some() { "1" } else { "0" }),
        (_, Some(value)) => interp.add_definition(variable, &value),
        (_, None) => interp.remove_definition(variable),
    }
    true
}

fn define_property_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(scope_name) = args.first() else {
        return status.fail("called with incorrect number of arguments");
    };
    let scope = match PropertyScope::parse(scope_name) {
        Some(scope) if scope_name != "CACHE" => scope,
        _ => {
            return status.fail(format!(
                "given invalid scope {scope_name}.  Valid scopes are GLOBAL, DIRECTORY, TARGET, SOURCE, TEST, VARIABLE, CACHED_VARIABLE."
            ));
        }
    };

    let mut keyword: Option<&str> = None;
    let mut property = String::new();
    let mut definition = PropertyDefinition::default();
    for arg in &args[1..] {
        match arg.as_str() {
            "PROPERTY" | "BRIEF_DOCS" | "FULL_DOCS" | "INITIALIZE_FROM_VARIABLE" => keyword = Some(arg.as_str()),
            "INHERITED" => {
                definition.inherited = true;
                keyword = None;
            }
            _ => match keyword {
                Some("PROPERTY") => {
                    property = arg.clone();
                    keyword = None;
                }
                Some("INITIALIZE_FROM_VARIABLE") => {
                    definition.initialize_from_variable = Some(arg.clone());
                    keyword = None;
                }
                Some("BRIEF_DOCS") => definition.brief.push_str(arg),
                Some("FULL_DOCS") => definition.full.push_str(arg),
                _ => return status.fail(format!("given invalid argument \"{arg}\".")),
            },
        }
    }
    if property.is_empty() {
        return status.fail("not given a PROPERTY <name> argument.");
    }

    if let Some(variable) = &definition.initialize_from_variable {
        if scope != PropertyScope::Target {
            return status.fail(format!(
                "Scope {scope_name} does not support INITIALIZE_FROM_VARIABLE."
            ));
        }
        let Some((prefix, _)) = property.split_once('_') else {
            return status.fail(format!(
                "Property name \"{property}\" defined with INITIALIZE_FROM_VARIABLE does not contain an underscore."
            ));
        };
        if !variable.starts_with(&format!("{prefix}_")) {
            return status.fail(format!(
                "Variable name \"{variable}\" does not start with the property name prefix \"{prefix}_\"."
            ));
        }
    }

    interp
        .state_mut()
        .property_definitions
        .define(scope, &property, definition);
    true
}

fn get_directory_property_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 2 {
        return status.fail("called with incorrect number of arguments");
    }
    let variable = &args[0];
    let mut rest = &args[1..];
    let mut snapshot = interp.current_snapshot();
    if rest[0] == "DIRECTORY" {
        let Some(dir) = rest.get(1) else {
            return status.fail("DIRECTORY argument provided without subsequent arguments");
        };
        let full = collapse_full_path(dir, &interp.current_source_dir());
        let Some(found) = interp.directory_snapshot(&full) else {
            return status.fail(
                "DIRECTORY argument provided but requested directory not found. This could be because the directory argument was invalid or, it is valid but has not been processed yet.",
            );
        };
        snapshot = found;
        rest = &rest[2..];
        if rest.is_empty() {
            return status.fail("called with incorrect number of arguments");
        }
    }

    if rest[0] == "DEFINITION" {
        let Some(name) = rest.get(1) else {
            return status.fail(
                "A request for a variable definition was made without providing the name of the variable to get.",
            );
        };
        let value = interp
            .state()
            .definition(snapshot, name)
            .map(str::to_string)
            .unwrap_or_default();
        interp.add_definition(variable, &value);
        return true;
    }
    if rest[0].is_empty() {
        return status.fail("given empty string for the property name to get");
    }
    let value = directory_property(interp, snapshot, &rest[0]).unwrap_or_default();
    interp.add_definition(variable, &value);
    true
}

fn set_directory_properties_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.is_empty() {
        return status.fail("called with incorrect number of arguments");
    }
    if args.len() % 2 != 1 {
        return status.fail("Wrong number of arguments");
    }
    let snapshot = interp.current_snapshot();
    for pair in args[1..].chunks(2) {
        let (name, value) = (&pair[0], &pair[1]);
        match name.as_str() {
            "VARIABLES" => {
                return status.fail("Variables and cache variables should be set using SET command");
            }
            "MACROS" => {
                return status.fail("Commands and macros cannot be set using SET_CMAKE_PROPERTIES");
            }
            _ => set_directory_property(interp, snapshot, name, Edit::Set(value)),
        }
    }
    true
}

fn get_cmake_property_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 2 {
        return status.fail("called with incorrect number of arguments");
    }
    let value = match args[1].as_str() {
        "VARIABLES" => directory_property(interp, interp.current_snapshot(), "VARIABLES"),
        "" => None,
        name => global_property(interp, name),
    };
    interp.add_definition(&args[0], value.as_deref().unwrap_or("NOTFOUND"));
    true
}
