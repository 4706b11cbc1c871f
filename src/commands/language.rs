//! `cmake_language()`: calling commands by name, deferred calls and
//! evaluating code at run time.

use super::fatal_error;
use crate::language::{
    ast::{ListFileArgument, ListFileFunction},
    expand::join_list,
};
use crate::runtime::{
    config::WorkingMode, interpreter::Interpreter, platform::collapse_full_path,
    registry::CommandRegistry, status::ExecutionStatus,
};

/// Commands that only make sense as literal source structure.
const NOT_CALLABLE: [&str; 14] = [
    "function",
    "endfunction",
    "macro",
    "endmacro",
    "if",
    "elseif",
    "else",
    "endif",
    "while",
    "endwhile",
    "foreach",
    "endforeach",
    "block",
    "endblock",
];

pub fn register(registry: &mut CommandRegistry) {
    registry.add_builtin_raw("cmake_language", cmake_language_command);
}

/// Expands raw arguments one at a time, so that `CALL` can pass the rest
/// through unexpanded.
struct ArgCursor<'a> {
    raw: &'a [ListFileArgument],
    next_raw: usize,
    expanded: Vec<String>,
    next: usize,
}

impl<'a> ArgCursor<'a> {
    fn new(raw: &'a [ListFileArgument]) -> Self {
        Self {
            raw,
            next_raw: 0,
            expanded: Vec::new(),
            next: 0,
        }
    }

    /// Makes sure an expanded argument is available at the cursor.
    /// `None` means expansion failed and was already reported.
    fn more(&mut self, interp: &mut Interpreter) -> Option<bool> {
        while self.next >= self.expanded.len() {
            let Some(arg) = self.raw.get(self.next_raw) else {
                return Some(false);
            };
            self.next_raw += 1;
            let values = interp.expand_arguments(std::slice::from_ref(arg))?;
            self.expanded.extend(values);
        }
        Some(true)
    }

    fn current(&self) -> &str {
        &self.expanded[self.next]
    }

    fn take(&mut self) -> String {
        let value = self.expanded[self.next].clone();
        self.next += 1;
        value
    }

    /// Expands every remaining raw argument.
    fn finish(&mut self, interp: &mut Interpreter) -> Option<()> {
        let rest = &self.raw[self.next_raw..];
        self.next_raw = self.raw.len();
        let values = interp.expand_arguments(rest)?;
        self.expanded.extend(values);
        Some(())
    }

    fn remaining(&self) -> &[String] {
        &self.expanded[self.next..]
    }
}

#[derive(Default)]
struct Defer {
    directory: Option<String>,
    id: Option<String>,
    id_var: Option<String>,
}

fn cmake_language_command(interp: &mut Interpreter, args: &[ListFileArgument], status: &mut ExecutionStatus) -> bool {
    dispatch(interp, args, status).unwrap_or(true)
}

fn dispatch(interp: &mut Interpreter, args: &[ListFileArgument], status: &mut ExecutionStatus) -> Option<bool> {
    let mut cursor = ArgCursor::new(args);
    if !cursor.more(interp)? {
        return Some(status.fail("called with incorrect number of arguments"));
    }

    let mut defer = None;
    if cursor.current() == "DEFER" {
        cursor.next += 1;
        if !cursor.more(interp)? {
            return Some(fatal_error(interp, "DEFER requires at least one argument"));
        }
        let mut options = Defer::default();
        while cursor.more(interp)? {
            match cursor.current() {
                "CALL" => break,
                "CANCEL_CALL" | "GET_CALL_IDS" | "GET_CALL" => {
                    if options.id.is_some() || options.id_var.is_some() {
                        let message = format!("DEFER {} does not accept ID or ID_VAR.", cursor.current());
                        return Some(fatal_error(interp, message));
                    }
                    cursor.finish(interp)?;
                    let rest = cursor.remaining().to_vec();
                    return Some(defer_query(interp, options.directory.as_deref(), &rest));
                }
                "DIRECTORY" => {
                    cursor.next += 1;
                    if options.directory.is_some() {
                        return Some(fatal_error(interp, "DEFER given multiple DIRECTORY arguments"));
                    }
                    if !cursor.more(interp)? {
                        return Some(fatal_error(interp, "DEFER DIRECTORY missing value"));
                    }
                    let dir = cursor.take();
                    if dir.is_empty() {
                        return Some(fatal_error(interp, "DEFER DIRECTORY may not be empty"));
                    }
                    options.directory = Some(collapse_full_path(&dir, &interp.current_source_dir()));
                }
                "ID" => {
                    cursor.next += 1;
                    if options.id.is_some() {
                        return Some(fatal_error(interp, "DEFER given multiple ID arguments"));
                    }
                    if !cursor.more(interp)? {
                        return Some(fatal_error(interp, "DEFER ID missing value"));
                    }
                    let id = cursor.take();
                    if id.is_empty() {
                        return Some(fatal_error(interp, "DEFER ID may not be empty"));
                    }
                    if id.starts_with(|c: char| c.is_ascii_uppercase()) {
                        return Some(fatal_error(interp, "DEFER ID may not start in A-Z."));
                    }
                    options.id = Some(id);
                }
                "ID_VAR" => {
                    cursor.next += 1;
                    if options.id_var.is_some() {
                        return Some(fatal_error(interp, "DEFER given multiple ID_VAR arguments"));
                    }
                    if !cursor.more(interp)? {
                        return Some(fatal_error(interp, "DEFER ID_VAR missing variable name"));
                    }
                    let var = cursor.take();
                    if var.is_empty() {
                        return Some(fatal_error(interp, "DEFER ID_VAR may not be empty"));
                    }
                    options.id_var = Some(var);
                }
                other => {
                    let message = format!("DEFER unknown option:\n  {other}");
                    return Some(fatal_error(interp, message));
                }
            }
        }
        if !cursor.more(interp)? || cursor.current() != "CALL" {
            return Some(fatal_error(interp, "DEFER must be followed by a CALL argument"));
        }
        defer = Some(options);
    }

    if cursor.current() == "CALL" {
        cursor.next += 1;
        if !cursor.more(interp)? {
            return Some(fatal_error(interp, "CALL missing command name"));
        }
        let command = cursor.take();
        if cursor.next != cursor.expanded.len() {
            return Some(fatal_error(interp, "CALL command's arguments must be literal"));
        }
        let rest = &args[cursor.next_raw..];
        return Some(call(interp, &command, rest, defer, status));
    }

    cursor.finish(interp)?;
    let expanded = cursor.expanded;
    let result = match expanded[0].as_str() {
        "EVAL" => eval(interp, &expanded),
        "GET_MESSAGE_LOG_LEVEL" => {
            if expanded.len() != 2 {
                return Some(fatal_error(interp, "GET_MESSAGE_LOG_LEVEL expects exactly 1 argument"));
            }
            let level = interp.log_level().as_str();
            interp.add_definition(&expanded[1], level);
            true
        }
        "EXIT" => exit(interp, &expanded, status),
        _ => fatal_error(interp, "called with unknown meta-operation"),
    };
    Some(result)
}

/// Runs `command` with the remaining raw arguments, now or deferred.
fn call(interp: &mut Interpreter, command: &str, rest: &[ListFileArgument], defer: Option<Defer>, status: &mut ExecutionStatus) -> bool {
    if NOT_CALLABLE.contains(&command.to_ascii_lowercase().as_str()) {
        return fatal_error(interp, format!("invalid command specified: {command}"));
    }
    let line = interp.execution_context().line;
    let arguments = rest
        .iter()
        .map(|arg| ListFileArgument::new(arg.value.clone(), arg.delim, line))
        .collect();
    let function = ListFileFunction::new(command, line, line, arguments);

    let Some(defer) = defer else {
        return interp.execute_command(&function, status);
    };
    match interp.defer_call(defer.directory.as_deref(), defer.id, function) {
        Ok(id) => {
            if let Some(var) = defer.id_var {
                interp.add_definition(&var, &id);
            }
            true
        }
        Err(message) => fatal_error(interp, message),
    }
}

/// `DEFER CANCEL_CALL|GET_CALL_IDS|GET_CALL ...`
fn defer_query(interp: &mut Interpreter, directory: Option<&str>, args: &[String]) -> bool {
    let Some((operation, args)) = args.split_first() else {
        return true;
    };
    match operation.as_str() {
        "CANCEL_CALL" => {
            if let Some(id) = args.iter().find(|id| id.starts_with(|c: char| c.is_ascii_uppercase())) {
                return fatal_error(interp, format!("DEFER CANCEL_CALL unknown argument:\n  {id}"));
            }
            match interp.defer_cancel(directory, args) {
                Ok(()) => true,
                Err(message) => fatal_error(interp, message),
            }
        }
        "GET_CALL_IDS" => {
            let [var] = args else {
                let message = if args.is_empty() {
                    "DEFER GET_CALL_IDS missing output variable"
                } else {
                    "DEFER GET_CALL_IDS given too many arguments"
                };
                return fatal_error(interp, message);
            };
            match interp.defer_ids(directory) {
                Ok(ids) => {
                    interp.add_definition(var, &join_list(&ids[..]));
                    true
                }
                Err(message) => fatal_error(interp, message),
            }
        }
        _ => {
            let (id, var) = match args {
                [] => return fatal_error(interp, "DEFER GET_CALL missing id"),
                [_] => return fatal_error(interp, "DEFER GET_CALL missing output variable"),
                [id, var] => (id, var),
                _ => return fatal_error(interp, "DEFER GET_CALL given too many arguments"),
            };
            if id.is_empty() {
                return fatal_error(interp, "DEFER GET_CALL id may not be empty");
            }
            if id.starts_with(|c: char| c.is_ascii_uppercase()) {
                return fatal_error(interp, format!("DEFER GET_CALL unknown argument:\n  {id}"));
            }
            match interp.defer_get_call(directory, id) {
                Ok(command) => {
                    let value = command
                        .map(|command| {
                            let mut items = vec![command.function.original_name().to_string()];
                            items.extend(command.function.arguments().iter().map(|arg| arg.value.clone()));
                            join_list(&items[..])
                        })
                        .unwrap_or_default();
                    interp.add_definition(var, &value);
                    true
                }
                Err(message) => fatal_error(interp, message),
            }
        }
    }
}

fn eval(interp: &mut Interpreter, expanded: &[String]) -> bool {
    if expanded.len() < 2 {
        return fatal_error(interp, "called with incorrect number of arguments");
    }
    if expanded[1] != "CODE" {
        if expanded[2..].iter().any(|arg| arg == "CODE") {
            return fatal_error(interp, "called with unsupported arguments between EVAL and CODE arguments");
        }
        return fatal_error(interp, "called without CODE argument");
    }
    let code = expanded[2..].join(" ");
    let context = interp.execution_context();
    let virtual_path = format!("{}:{}:EVAL", context.file_path, context.line);
    // a parse failure has already been reported
    interp.read_list_file_as_string(&code, &virtual_path);
    true
}

fn exit(interp: &mut Interpreter, expanded: &[String], status: &mut ExecutionStatus) -> bool {
    if expanded.len() != 2 {
        return fatal_error(interp, "EXIT requires one argument");
    }
    if interp.options().mode != WorkingMode::Script {
        return fatal_error(interp, "EXIT can be used only in SCRIPT mode");
    }
    match expanded[1].trim_start().parse::<i64>() {
        Ok(code) => {
            status.set_exit_code(code as i32);
            true
        }
        Err(_) => fatal_error(
            interp,
            format!("EXIT requires one integral argument, got \"{}\"", expanded[1]),
        ),
    }
}
