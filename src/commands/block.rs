use crate::language::ast::ListFileFunction;
use crate::runtime::{
    blocker::{BlockBody, FunctionBlocker},
    interpreter::{Interpreter, ScopeHandle},
    registry::CommandRegistry,
    status::ExecutionStatus,
};

pub fn register(registry: &mut CommandRegistry) {
    registry.add_flow_control("block", block_command);
    registry.add_unexpected(
        "endblock",
        "An ENDBLOCK command was found outside of a proper BLOCK and ENDBLOCK structure.",
    );
}

/// An open `block()`: the scopes it pushed and the variables copied out
/// when it ends.
struct Block {
    policy_scope: Option<ScopeHandle>,
    variable_scope: Option<ScopeHandle>,
    propagate: Vec<String>,
}

impl Block {
    fn close(self, interp: &mut Interpreter) {
        if let Some(scope) = self.variable_scope {
            interp.raise_variables(&self.propagate);
            interp.pop_scope(scope);
        }
        if let Some(scope) = self.policy_scope {
            interp.pop_policy_scope(scope);
        }
    }
}

impl FunctionBlocker for Block {
    fn start_command_name(&self) -> &str {
        "block"
    }

    fn end_command_name(&self) -> &str {
        "endblock"
    }

    fn end_command_supports_arguments(&self) -> bool {
        false
    }

    fn arguments_match(&self, end: &ListFileFunction, _interp: &mut Interpreter) -> bool {
        end.arguments().is_empty()
    }

    fn replay(self: Box<Self>, body: BlockBody, status: &mut ExecutionStatus, interp: &mut Interpreter) -> bool {
        for function in &body.functions {
            let mut inner = ExecutionStatus::new();
            interp.execute_command(function, &mut inner);
            if inner.return_invoked() {
                interp.raise_variables(inner.return_variables());
            }
            if super::forward_control(&inner, status) || interp.fatal_error_occurred() {
                break;
            }
        }
        self.close(interp);
        true
    }

    fn unwind(self: Box<Self>, interp: &mut Interpreter) {
        self.close(interp);
    }
}

fn block_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let mut scope_for: Option<Vec<&str>> = None;
    let mut propagate = Vec::new();
    let mut keyword = None;
    for arg in args {
        match arg.as_str() {
            "SCOPE_FOR" => {
                scope_for.get_or_insert_with(Vec::new);
                keyword = Some("SCOPE_FOR");
            }
            "PROPAGATE" => keyword = Some("PROPAGATE"),
            value => match keyword {
                Some("SCOPE_FOR") => scope_for.get_or_insert_with(Vec::new).push(value),
                Some(_) => propagate.push(value.to_string()),
                None => {
                    status.set_error(format!("called with unsupported argument \"{value}\""));
                    interp.set_fatal_error();
                    return false;
                }
            },
        }
    }

    let (mut variables, mut policies) = (true, true);
    if let Some(scopes) = scope_for {
        if scopes.is_empty() {
            return super::fatal_error(interp, "Keyword SCOPE_FOR must be followed by a value.");
        }
        variables = false;
        policies = false;
        for scope in scopes {
            match scope {
                "VARIABLES" => variables = true,
                "POLICIES" => policies = true,
                other => {
                    status.set_error(format!("SCOPE_FOR unsupported scope \"{other}\""));
                    interp.set_fatal_error();
                    return false;
                }
            }
        }
    }
    if !variables && !propagate.is_empty() {
        status.set_error("PROPAGATE cannot be specified without a new scope for VARIABLES");
        interp.set_fatal_error();
        return false;
    }

    let policy_scope = policies.then(|| interp.push_policy_scope());
    let variable_scope = variables.then(|| interp.push_scope());
    interp.add_function_blocker(Box::new(Block {
        policy_scope,
        variable_scope,
        propagate,
    }));
    true
}
