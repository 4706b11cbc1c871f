//! `set()`, `unset()` and `option()`.

use crate::language::expand::join_list;
use crate::runtime::{
    cache::CacheEntryType, interpreter::Interpreter, messenger::MessageType,
    registry::CommandRegistry, status::ExecutionStatus,
};

pub fn register(registry: &mut CommandRegistry) {
    registry.add_builtin("set", set_command);
    registry.add_builtin("unset", unset_command);
    registry.add_builtin("option", option_command);
}

/// `ENV{NAME}` names an environment variable.
fn env_name(variable: &str) -> Option<&str> {
    if variable.len() > 5 && variable.starts_with("ENV{") {
        Some(&variable[4..variable.len() - 1])
    } else {
        None
    }
}

fn set_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(variable) = args.first() else {
        return status.fail("called with incorrect number of arguments");
    };
    if args.len() == 1 {
        interp.remove_definition(variable);
        return true;
    }
    if args.len() == 2 && args[1] == "PARENT_SCOPE" {
        interp.raise_scope(variable, None);
        return true;
    }

    if let Some(name) = env_name(variable) {
        let current = interp.platform().env_get(name);
        if !args[1].is_empty() {
            if current.as_deref() != Some(args[1].as_str()) {
                interp.platform_mut().env_set(name, &args[1]);
            }
            if let Some(extra) = args.get(2) {
                interp.issue_message(
                    MessageType::AuthorWarning,
                    format!("Only the first value argument is used when setting an environment variable.  Argument '{extra}' and later are unused."),
                );
            }
        } else if current.is_some() {
            interp.platform_mut().env_unset(name);
        }
        return true;
    }

    let last = args.len() - 1;
    let mut parent_scope = false;
    let mut force = false;
    let mut cache = false;
    let mut ignored = 0;
    if args[last] == "PARENT_SCOPE" {
        parent_scope = true;
        ignored += 1;
    } else {
        if args.len() > 4 && args[last] == "FORCE" {
            force = true;
            ignored += 1;
        }
        if args.len() > 3 && args[args.len() - 3 - usize::from(force)] == "CACHE" {
            cache = true;
            ignored += 3;
        }
    }
    let value = join_list(&args[1..args.len() - ignored]);

    if parent_scope {
        interp.raise_scope(variable, Some(&value));
        return true;
    }
    if args[last] == "CACHE" || args[last - 1] == "CACHE" || (force && !cache) {
        return status.fail("given invalid arguments for CACHE mode.");
    }

    if !cache {
        interp.add_definition(variable, &value);
        return true;
    }
    let cache_start = args.len() - 3 - usize::from(force);
    let kind = match CacheEntryType::parse(&args[cache_start + 1]) {
        Some(kind) => kind,
        None => {
            interp.issue_message(
                MessageType::AuthorWarning,
                format!("implicitly converting '{}' to 'STRING' type.", args[cache_start + 1]),
            );
            CacheEntryType::String
        }
    };
    let help = &args[cache_start + 2];
    let already_cached = interp
        .state()
        .cache
        .entry(variable)
        .is_some_and(|entry| entry.kind != CacheEntryType::Uninitialized);
    if already_cached && kind != CacheEntryType::Internal && !force {
        return true;
    }
    interp.add_cache_definition(variable, &value, help, kind, force);
    true
}

fn unset_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.is_empty() || args.len() > 2 {
        return status.fail("called with incorrect number of arguments");
    }
    let variable = &args[0];
    if let Some(name) = env_name(variable) {
        interp.platform_mut().env_unset(name);
        return true;
    }
    match args.get(1).map(String::as_str) {
        None => interp.remove_definition(variable),
        Some("CACHE") => interp.state_mut().cache.remove(variable),
        Some("PARENT_SCOPE") => interp.raise_scope(variable, None),
        Some(_) => return status.fail("called with an invalid second argument"),
    }
    true
}

fn option_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 2 || args.len() > 3 {
        return status.fail(format!(
            "called with incorrect number of arguments: {}",
            args.join(" ")
        ));
    }
    let name = &args[0];
    // a normal variable of the same name wins over the option
    if interp.is_normal_definition_set(name) {
        return true;
    }

    let existing = interp.state().cache.entry(name).cloned();
    if let Some(entry) = &existing {
        if entry.kind != CacheEntryType::Uninitialized {
            interp.state_mut().cache.set_property(name, "HELPSTRING", &args[1], false);
            return true;
        }
    }
    let initial = match args.get(2) {
        Some(value) => value.clone(),
        None => existing.map_or_else(|| "Off".to_string(), |entry| entry.value),
    };
    interp.add_cache_definition(name, &initial, &args[1], CacheEntryType::Bool, false);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_names() {
        assert_eq!(env_name("ENV{PATH}"), Some("PATH"));
        assert_eq!(env_name("ENV{}"), None);
        assert_eq!(env_name("PATH"), None);
    }
}
