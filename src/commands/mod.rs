//! Built-in commands, registered into a fresh [`CommandRegistry`].

mod block;
mod control;
mod function;
mod language;
mod legacy;
mod list;
mod math;
mod message;
mod properties;
mod scope;
mod string;
mod targets;
mod variables;

use crate::language::ast::ListFileArgument;
use crate::runtime::{
    config::WorkingMode,
    interpreter::Interpreter,
    messenger::MessageType,
    registry::CommandRegistry,
    status::{ControlFlow, ExecutionStatus},
};

/// Commands that only make sense while configuring a source tree.
const PROJECT_COMMANDS: [&str; 13] = [
    "add_compile_definitions",
    "add_compile_options",
    "add_custom_target",
    "add_definitions",
    "add_executable",
    "add_library",
    "add_link_options",
    "add_subdirectory",
    "get_target_property",
    "include_directories",
    "link_directories",
    "project",
    "set_target_properties",
];

pub fn register_builtins(registry: &mut CommandRegistry, mode: WorkingMode) {
    control::register(registry);
    function::register(registry);
    block::register(registry);
    scope::register(registry);
    language::register(registry);
    message::register(registry);
    variables::register(registry);
    math::register(registry);
    list::register(registry);
    string::register(registry);
    properties::register(registry);
    legacy::register(registry);
    match mode {
        WorkingMode::Normal => {
            scope::register_project(registry);
            targets::register(registry);
        }
        WorkingMode::Script => {
            for name in PROJECT_COMMANDS {
                registry.add_unexpected(name, "command is not scriptable");
            }
        }
    }
}

/// Reports `message` as a fatal error and stops processing. The command
/// itself counts as handled.
pub(crate) fn fatal_error(interp: &mut Interpreter, message: impl Into<String>) -> bool {
    interp.issue_message(MessageType::FatalError, message);
    interp.set_fatal_error();
    true
}

/// Copies a control transfer requested inside a replayed body to the
/// enclosing status. Returns true when the replay has to stop.
pub(crate) fn forward_control(inner: &ExecutionStatus, outer: &mut ExecutionStatus) -> bool {
    match inner.control_flow() {
        Some(ControlFlow::Return(variables)) => outer.set_return_invoked_with(variables),
        Some(ControlFlow::Break) => outer.set_break_invoked(),
        Some(ControlFlow::Continue) => outer.set_continue_invoked(),
        Some(ControlFlow::Exit(code)) => outer.set_exit_code(code),
        None => return false,
    }
    true
}

/// Compares arguments as written, ignoring where they appear.
pub(crate) fn same_arguments(lhs: &[ListFileArgument], rhs: &[ListFileArgument]) -> bool {
    lhs.len() == rhs.len()
        && lhs
            .iter()
            .zip(rhs)
            .all(|(a, b)| a.value == b.value && a.delim == b.delim)
}

/// Quotes `value` so it reads back as a single argument.
pub(crate) fn escape_for_cmake(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Parses an integer the way `std::stoi` would: leading whitespace, an
/// optional sign and at least one digit; trailing text is ignored.
pub(crate) fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits = bytes[end..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    trimmed[..end + digits].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ast::Delimiter;

    #[test]
    fn argument_comparison_ignores_lines() {
        let a = vec![ListFileArgument::unquoted("X", 1)];
        let b = vec![ListFileArgument::unquoted("X", 7)];
        let c = vec![ListFileArgument::new("X", Delimiter::Quoted, 1)];
        assert!(same_arguments(&a, &b));
        assert!(!same_arguments(&a, &c));
    }

    #[test]
    fn leading_integers() {
        assert_eq!(parse_leading_int(" 42abc"), Some(42));
        assert_eq!(parse_leading_int("-3"), Some(-3));
        assert_eq!(parse_leading_int("x1"), None);
        assert_eq!(parse_leading_int("+"), None);
    }

    #[test]
    fn escapes_for_reading_back() {
        assert_eq!(escape_for_cmake("a\"$b"), "\"a\\\"\\$b\"");
    }
}
