//! `function()` and `macro()`: recording a body and calling it later.

use crate::language::{
    ast::{Delimiter, ListFileArgument, ListFileFunction},
    expand::join_list,
};
use crate::runtime::{
    blocker::{BlockBody, FunctionBlocker},
    interpreter::Interpreter,
    messenger::MessageType,
    platform::parent_dir,
    policies::PolicyMap,
    registry::{Command, CommandRegistry, ScriptedKind},
    status::ExecutionStatus,
};
use std::sync::Arc;

pub fn register(registry: &mut CommandRegistry) {
    registry.add_flow_control("function", function_command);
    registry.add_flow_control("macro", macro_command);
    registry.add_unexpected(
        "endfunction",
        "An ENDFUNCTION command was found outside of a proper FUNCTION ENDFUNCTION structure. Or its arguments did not match the opening FUNCTION command.",
    );
    registry.add_unexpected(
        "endmacro",
        "An ENDMACRO command was found outside of a proper MACRO ENDMACRO structure. Or its arguments did not match the opening MACRO command.",
    );
}

/// Everything a recorded definition needs at call time.
struct Definition {
    /// Command name followed by the formal parameters.
    signature: Vec<String>,
    functions: Vec<ListFileFunction>,
    policies: PolicyMap,
    file_path: String,
    line: usize,
}

impl Definition {
    fn name(&self) -> &str {
        &self.signature[0]
    }

    fn parameters(&self) -> &[String] {
        &self.signature[1..]
    }
}

fn call_function(definition: &Definition, interp: &mut Interpreter, args: &[ListFileArgument], status: &mut ExecutionStatus) -> bool {
    let Some(expanded) = interp.expand_arguments(args) else {
        return true;
    };
    if expanded.len() < definition.parameters().len() {
        return status.fail(format!(
            "Function invoked with incorrect arguments for function named: {}",
            definition.name()
        ));
    }

    let scope = interp.push_function_scope(&definition.file_path, &definition.policies);
    interp.add_definition("ARGC", &expanded.len().to_string());
    for (idx, value) in expanded.iter().enumerate() {
        interp.add_definition(&format!("ARGV{idx}"), value);
    }
    for (parameter, value) in definition.parameters().iter().zip(&expanded) {
        interp.add_definition(parameter, value);
    }
    interp.add_definition("ARGV", &join_list(&expanded[..]));
    interp.add_definition("ARGN", &join_list(&expanded[definition.parameters().len()..]));
    interp.add_definition("CMAKE_CURRENT_FUNCTION", definition.name());
    interp.add_definition("CMAKE_CURRENT_FUNCTION_LIST_FILE", &definition.file_path);
    interp.add_definition(
        "CMAKE_CURRENT_FUNCTION_LIST_DIR",
        &parent_dir(&definition.file_path),
    );
    interp.add_definition("CMAKE_CURRENT_FUNCTION_LIST_LINE", &definition.line.to_string());

    for function in &definition.functions {
        let mut inner = ExecutionStatus::new();
        if !interp.execute_command(function, &mut inner) || inner.nested_error() {
            // the failing command already reported with the full call stack
            interp.pop_function_scope(scope, false);
            status.set_nested_error();
            return false;
        }
        if inner.return_invoked() {
            interp.raise_variables(inner.return_variables());
            break;
        }
        if let Some(code) = inner.exit_code() {
            status.set_exit_code(code);
            break;
        }
    }
    interp.pop_function_scope(scope, true);
    true
}

/// Textual substitution of macro parameters into one argument.
fn substitute(value: &str, parameters: &[(String, &str)], argc: &str, argn: &str, argv: &str, positional: &[String]) -> String {
    let mut out = value.to_string();
    for (reference, replacement) in parameters {
        out = out.replace(reference.as_str(), replacement);
    }
    out = out.replace("${ARGC}", argc);
    out = out.replace("${ARGN}", argn);
    out = out.replace("${ARGV}", argv);
    if out.contains("${ARGV") {
        for (idx, replacement) in positional.iter().enumerate() {
            out = out.replace(&format!("${{ARGV{idx}}}"), replacement);
        }
    }
    out
}

fn call_macro(definition: &Definition, interp: &mut Interpreter, args: &[ListFileArgument], status: &mut ExecutionStatus) -> bool {
    let Some(expanded) = interp.expand_arguments(args) else {
        return true;
    };
    if expanded.len() < definition.parameters().len() {
        return status.fail(format!(
            "Macro invoked with incorrect arguments for macro named: {}",
            definition.name()
        ));
    }

    let scope = interp.push_macro_scope(&definition.file_path, &definition.policies);
    let argc = expanded.len().to_string();
    let argn = join_list(&expanded[definition.parameters().len()..]);
    let argv = join_list(&expanded[..]);
    let parameters: Vec<(String, &str)> = definition
        .parameters()
        .iter()
        .zip(&expanded)
        .map(|(parameter, value)| (format!("${{{parameter}}}"), value.as_str()))
        .collect();

    for function in &definition.functions {
        let arguments = function
            .arguments()
            .iter()
            .map(|arg| {
                let value = if arg.delim == Delimiter::Bracket {
                    arg.value.clone()
                } else {
                    substitute(&arg.value, &parameters, &argc, &argn, &argv, &expanded)
                };
                ListFileArgument::new(value, arg.delim, arg.line)
            })
            .collect();
        let call = ListFileFunction::new(
            function.original_name(),
            function.line(),
            function.line_end(),
            arguments,
        );
        let mut inner = ExecutionStatus::new();
        if !interp.execute_command(&call, &mut inner) || inner.nested_error() {
            interp.pop_macro_scope(scope, false);
            status.set_nested_error();
            return false;
        }
        if super::forward_control(&inner, status) {
            break;
        }
    }
    interp.pop_macro_scope(scope, true);
    true
}

struct DefinitionBlocker {
    signature: Vec<String>,
    kind: ScriptedKind,
}

impl FunctionBlocker for DefinitionBlocker {
    fn start_command_name(&self) -> &str {
        match self.kind {
            ScriptedKind::Function => "function",
            ScriptedKind::Macro => "macro",
        }
    }

    fn end_command_name(&self) -> &str {
        match self.kind {
            ScriptedKind::Function => "endfunction",
            ScriptedKind::Macro => "endmacro",
        }
    }

    fn arguments_match(&self, end: &ListFileFunction, interp: &mut Interpreter) -> bool {
        match interp.expand_arguments(end.arguments()) {
            Some(expanded) => expanded
                .first()
                .map_or(true, |first| *first == self.signature[0]),
            None => false,
        }
    }

    fn replay(self: Box<Self>, body: BlockBody, _status: &mut ExecutionStatus, interp: &mut Interpreter) -> bool {
        let definition = Arc::new(Definition {
            signature: self.signature,
            functions: body.functions,
            policies: interp.record_policies(),
            file_path: body.starting_context.file_path,
            line: body.starting_context.line,
        });
        let name = definition.name().to_string();
        let command: Command = match self.kind {
            ScriptedKind::Function => Arc::new(move |interp: &mut Interpreter, args: &[ListFileArgument], status: &mut ExecutionStatus| {
                call_function(&definition, interp, args, status)
            }),
            ScriptedKind::Macro => Arc::new(move |interp: &mut Interpreter, args: &[ListFileArgument], status: &mut ExecutionStatus| {
                call_macro(&definition, interp, args, status)
            }),
        };
        match interp.state_mut().commands.add_scripted(&name, command, self.kind) {
            Ok(()) => true,
            Err(message) => {
                interp.issue_message(MessageType::FatalError, message);
                interp.set_fatal_error();
                false
            }
        }
    }
}

fn function_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.is_empty() {
        return status.fail("called with incorrect number of arguments");
    }
    interp.add_function_blocker(Box::new(DefinitionBlocker {
        signature: args.to_vec(),
        kind: ScriptedKind::Function,
    }));
    true
}

fn macro_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.is_empty() {
        return status.fail("called with incorrect number of arguments");
    }
    interp.add_function_blocker(Box::new(DefinitionBlocker {
        signature: args.to_vec(),
        kind: ScriptedKind::Macro,
    }));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macro_substitution_is_textual() {
        let parameters = vec![("${a}".to_string(), "one")];
        let positional = vec!["one".to_string(), "two".to_string()];
        let out = substitute(
            "${a}-${ARGC}-${ARGN}-${ARGV1}-${ARGV}",
            &parameters,
            "2",
            "two",
            "one;two",
            &positional,
        );
        assert_eq!(out, "one-2-two-two-one;two");
    }

    #[test]
    fn unknown_positional_references_survive() {
        let out = substitute("${ARGV5}", &[], "0", "", "", &[]);
        assert_eq!(out, "${ARGV5}");
    }
}
