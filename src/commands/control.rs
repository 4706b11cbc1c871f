use super::{escape_for_cmake, forward_control, parse_leading_int, same_arguments};
use crate::language::{
    ast::{Backtrace, ListFileArgument, ListFileContext, ListFileFunction},
    expand::split_list_keep_empty,
};
use crate::runtime::{
    blocker::{BlockBody, FunctionBlocker},
    condition::{describe_arguments, ConditionEvaluator},
    interpreter::{ExpandedArgument, Interpreter},
    messenger::MessageType,
    policies::{PolicyId, PolicyStatus},
    registry::CommandRegistry,
    status::ExecutionStatus,
};

pub fn register(registry: &mut CommandRegistry) {
    registry.add_flow_control_raw("if", if_command);
    registry.add_flow_control_raw("while", while_command);
    registry.add_flow_control("foreach", foreach_command);
    registry.add_flow_control("break", break_command);
    registry.add_flow_control("continue", continue_command);
    registry.add_flow_control("return", return_command);

    registry.add_unexpected(
        "else",
        "An ELSE command was found outside of a proper IF ENDIF structure. Or its arguments did not match the opening IF command.",
    );
    registry.add_unexpected(
        "elseif",
        "An ELSEIF command was found outside of a proper IF ENDIF structure.",
    );
    registry.add_unexpected(
        "endif",
        "An ENDIF command was found outside of a proper IF ENDIF structure. Or its arguments did not match the opening IF command.",
    );
    registry.add_unexpected(
        "endwhile",
        "An ENDWHILE command was found outside of a proper WHILE ENDWHILE structure. Or its arguments did not match the opening WHILE command.",
    );
    registry.add_unexpected(
        "endforeach",
        "An ENDFOREACH command was found outside of a proper FOREACH ENDFOREACH structure. Or its arguments did not match the opening FOREACH command.",
    );
}

fn evaluate(
    interp: &mut Interpreter,
    args: &[ExpandedArgument],
    backtrace: Backtrace,
) -> Result<bool, crate::runtime::condition::ConditionError> {
    ConditionEvaluator::new(interp, backtrace).is_true(args)
}

// if / elseif / else / endif

struct IfBlocker {
    args: Vec<ListFileArgument>,
    is_blocking: bool,
    has_run: bool,
    else_seen: bool,
}

impl FunctionBlocker for IfBlocker {
    fn start_command_name(&self) -> &str {
        "if"
    }

    fn end_command_name(&self) -> &str {
        "endif"
    }

    fn arguments_match(&self, end: &ListFileFunction, _interp: &mut Interpreter) -> bool {
        end.arguments().is_empty() || same_arguments(end.arguments(), &self.args)
    }

    fn replay(mut self: Box<Self>, body: BlockBody, status: &mut ExecutionStatus, interp: &mut Interpreter) -> bool {
        let mut depth = 0i64;
        for function in &body.functions {
            let name = function.lower_name();
            match name {
                "if" => depth += 1,
                "endif" => depth -= 1,
                _ => {}
            }
            if depth == 0 && (name == "else" || name == "elseif") {
                let backtrace = interp.backtrace().with_top(ListFileContext::new(
                    function.original_name(),
                    body.starting_context.file_path.clone(),
                    function.line(),
                ));
                if name == "else" {
                    if self.else_seen {
                        interp.issue_message_at(
                            MessageType::FatalError,
                            "A duplicate ELSE command was found inside an IF block.",
                            &backtrace,
                        );
                        interp.set_fatal_error();
                        return true;
                    }
                    self.is_blocking = self.has_run;
                    self.has_run = true;
                    self.else_seen = true;
                    continue;
                }
                if self.else_seen {
                    interp.issue_message_at(
                        MessageType::FatalError,
                        "An ELSEIF command was found after an ELSE command.",
                        &backtrace,
                    );
                    interp.set_fatal_error();
                    return true;
                }
                if self.has_run {
                    self.is_blocking = true;
                    continue;
                }
                let Some(expanded) = interp.expand_arguments_with_quotes(function.arguments()) else {
                    return true;
                };
                match evaluate(interp, &expanded, backtrace.clone()) {
                    Ok(true) => {
                        self.is_blocking = false;
                        self.has_run = true;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        let text = format!("{}{}", describe_arguments(&expanded), err.message);
                        interp.issue_message_at(err.kind, text, &backtrace);
                        if err.kind == MessageType::FatalError {
                            interp.set_fatal_error();
                            return true;
                        }
                    }
                }
            } else if !self.is_blocking {
                let mut inner = ExecutionStatus::new();
                interp.execute_command(function, &mut inner);
                if forward_control(&inner, status) {
                    return true;
                }
            }
        }
        true
    }
}

fn if_command(interp: &mut Interpreter, args: &[ListFileArgument], _status: &mut ExecutionStatus) -> bool {
    let Some(expanded) = interp.expand_arguments_with_quotes(args) else {
        return true;
    };
    let backtrace = interp.backtrace().clone();
    let is_true = match evaluate(interp, &expanded, backtrace) {
        Ok(value) => value,
        Err(err) => {
            let text = format!("if {}{}", describe_arguments(&expanded), err.message);
            interp.issue_message(err.kind, text);
            if err.kind == MessageType::FatalError {
                interp.set_fatal_error();
                return true;
            }
            false
        }
    };
    interp.add_function_blocker(Box::new(IfBlocker {
        args: args.to_vec(),
        is_blocking: !is_true,
        has_run: is_true,
        else_seen: false,
    }));
    true
}

// while / endwhile

struct WhileBlocker {
    args: Vec<ListFileArgument>,
}

impl WhileBlocker {
    fn run(&self, body: &BlockBody, status: &mut ExecutionStatus, interp: &mut Interpreter) {
        let backtrace = interp.backtrace().with_top(body.starting_context.clone());
        loop {
            let Some(expanded) = interp.expand_arguments_with_quotes(&self.args) else {
                return;
            };
            match evaluate(interp, &expanded, backtrace.clone()) {
                Ok(true) => {}
                Ok(false) => return,
                Err(err) => {
                    let mut text = String::from("had incorrect arguments: ");
                    for arg in &expanded {
                        text.push(' ');
                        text.push_str(&escape_for_cmake(&arg.value));
                    }
                    text.push('\n');
                    text.push_str(&err.message);
                    interp.issue_message_at(err.kind, text, &backtrace);
                    if err.kind == MessageType::FatalError {
                        interp.set_fatal_error();
                    }
                    return;
                }
            }
            for function in &body.functions {
                let mut inner = ExecutionStatus::new();
                interp.execute_command(function, &mut inner);
                if inner.return_invoked() {
                    status.set_return_invoked_with(inner.return_variables().to_vec());
                    return;
                }
                if inner.break_invoked() {
                    return;
                }
                if inner.continue_invoked() {
                    break;
                }
                if let Some(code) = inner.exit_code() {
                    status.set_exit_code(code);
                    return;
                }
                if interp.fatal_error_occurred() {
                    return;
                }
            }
        }
    }
}

impl FunctionBlocker for WhileBlocker {
    fn start_command_name(&self) -> &str {
        "while"
    }

    fn end_command_name(&self) -> &str {
        "endwhile"
    }

    fn arguments_match(&self, end: &ListFileFunction, _interp: &mut Interpreter) -> bool {
        end.arguments().is_empty() || same_arguments(end.arguments(), &self.args)
    }

    fn replay(self: Box<Self>, body: BlockBody, status: &mut ExecutionStatus, interp: &mut Interpreter) -> bool {
        self.run(&body, status, interp);
        interp.pop_loop_block();
        true
    }

    fn unwind(self: Box<Self>, interp: &mut Interpreter) {
        interp.pop_loop_block();
    }
}

fn while_command(interp: &mut Interpreter, args: &[ListFileArgument], status: &mut ExecutionStatus) -> bool {
    if args.is_empty() {
        return status.fail("called with incorrect number of arguments");
    }
    interp.push_loop_block();
    interp.add_function_blocker(Box::new(WhileBlocker { args: args.to_vec() }));
    true
}

// foreach / endforeach

struct ForEachBlocker {
    /// Loop variables followed by the values to iterate.
    args: Vec<String>,
    variable_count: usize,
    zip_lists: bool,
}

enum Iteration {
    Next,
    Stop { restore: bool },
}

impl ForEachBlocker {
    fn saved_value(interp: &Interpreter, name: &str) -> Option<String> {
        let keep_unset = interp.policy_status(PolicyId::Cmp0124) == PolicyStatus::New;
        (!keep_unset || interp.is_normal_definition_set(name)).then(|| interp.safe_definition(name))
    }

    fn restore(interp: &mut Interpreter, name: &str, saved: Option<String>) {
        match saved {
            Some(value) => interp.add_definition(name, &value),
            None => interp.remove_definition(name),
        }
    }

    fn invoke(functions: &[ListFileFunction], status: &mut ExecutionStatus, interp: &mut Interpreter) -> Iteration {
        for function in functions {
            let mut inner = ExecutionStatus::new();
            interp.execute_command(function, &mut inner);
            if inner.return_invoked() {
                status.set_return_invoked_with(inner.return_variables().to_vec());
                return Iteration::Stop { restore: true };
            }
            if inner.break_invoked() {
                return Iteration::Stop { restore: true };
            }
            if inner.continue_invoked() {
                break;
            }
            if let Some(code) = inner.exit_code() {
                status.set_exit_code(code);
                return Iteration::Stop { restore: true };
            }
            if interp.fatal_error_occurred() {
                return Iteration::Stop { restore: false };
            }
        }
        Iteration::Next
    }

    fn replay_items(&self, body: &BlockBody, status: &mut ExecutionStatus, interp: &mut Interpreter) {
        let variable = &self.args[0];
        let saved = Self::saved_value(interp, variable);
        let mut restore = true;
        for value in &self.args[self.variable_count..] {
            interp.add_definition(variable, value);
            if let Iteration::Stop { restore: keep } = Self::invoke(&body.functions, status, interp) {
                restore = keep;
                break;
            }
        }
        if restore {
            Self::restore(interp, variable, saved);
        }
    }

    fn replay_zip_lists(&self, body: &BlockBody, status: &mut ExecutionStatus, interp: &mut Interpreter) {
        let lists: Vec<Vec<String>> = self.args[self.variable_count..]
            .iter()
            .map(|name| {
                let value = interp.safe_definition(name);
                if value.is_empty() {
                    Vec::new()
                } else {
                    split_list_keep_empty(&value)
                }
            })
            .collect();
        let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
        let variables: Vec<String> = if self.variable_count > 1 {
            self.args[..self.variable_count].to_vec()
        } else {
            (0..lists.len())
                .map(|idx| format!("{}_{idx}", self.args[0]))
                .collect()
        };
        let saved: Vec<Option<String>> = variables
            .iter()
            .map(|name| Self::saved_value(interp, name))
            .collect();

        let mut restore = true;
        for position in 0..longest {
            for (name, list) in variables.iter().zip(&lists) {
                match list.get(position) {
                    Some(value) => interp.add_definition(name, value),
                    None => interp.remove_definition(name),
                }
            }
            if let Iteration::Stop { restore: keep } = Self::invoke(&body.functions, status, interp) {
                restore = keep;
                break;
            }
        }
        if restore {
            for (name, value) in variables.iter().zip(saved) {
                Self::restore(interp, name, value);
            }
        }
    }
}

impl FunctionBlocker for ForEachBlocker {
    fn start_command_name(&self) -> &str {
        "foreach"
    }

    fn end_command_name(&self) -> &str {
        "endforeach"
    }

    fn arguments_match(&self, end: &ListFileFunction, interp: &mut Interpreter) -> bool {
        match interp.expand_arguments(end.arguments()) {
            Some(expanded) => expanded.first().map_or(true, |first| *first == self.args[0]),
            None => false,
        }
    }

    fn replay(self: Box<Self>, body: BlockBody, status: &mut ExecutionStatus, interp: &mut Interpreter) -> bool {
        if self.zip_lists {
            self.replay_zip_lists(&body, status, interp);
        } else {
            self.replay_items(&body, status, interp);
        }
        interp.pop_loop_block();
        true
    }

    fn unwind(self: Box<Self>, interp: &mut Interpreter) {
        interp.pop_loop_block();
    }
}

fn add_foreach_blocker(interp: &mut Interpreter, blocker: ForEachBlocker) {
    interp.push_loop_block();
    interp.add_function_blocker(Box::new(blocker));
}

fn parse_range_bound(text: &str, status: &mut ExecutionStatus, interp: &mut Interpreter) -> Option<i64> {
    match parse_leading_int(text) {
        Some(value) if i32::try_from(value).is_ok() => Some(value),
        Some(_) => {
            status.set_error(format!("Integer out of range: '{text}'"));
            interp.set_fatal_error();
            None
        }
        None => {
            status.set_error(format!("Invalid integer: '{text}'"));
            interp.set_fatal_error();
            None
        }
    }
}

fn foreach_range(args: &[String], interp: &mut Interpreter, status: &mut ExecutionStatus) -> Option<Vec<String>> {
    let bounds: Vec<i64> = args[2..]
        .iter()
        .take(3)
        .map(|text| parse_range_bound(text, status, interp))
        .collect::<Option<_>>()?;
    let (start, stop, mut step) = match (args.len(), bounds.as_slice()) {
        (3, [stop]) => (0, *stop, 0),
        (4, [start, stop]) => (*start, *stop, 0),
        (5, [start, stop, step]) => (*start, *stop, *step),
        _ => (0, 0, 0),
    };
    if step == 0 {
        step = if start > stop { -1 } else { 1 };
    }
    if (start > stop && step > 0) || (start < stop && step < 0) {
        status.set_error(format!(
            "called with incorrect range specification: start {start}, stop {stop}, step {step}"
        ));
        interp.set_fatal_error();
        return None;
    }
    let count = (stop - start) / step + 1;
    let mut values = vec![args[0].clone()];
    values.extend((0..count).map(|idx| (start + idx * step).to_string()));
    Some(values)
}

fn foreach_in(args: &[String], in_position: usize, interp: &mut Interpreter) -> bool {
    #[derive(PartialEq)]
    enum Doing {
        None,
        Lists,
        Items,
        ZipLists,
    }

    let mut blocker = ForEachBlocker {
        args: args[..in_position].to_vec(),
        variable_count: in_position,
        zip_lists: false,
    };
    let mut doing = Doing::None;
    for arg in &args[in_position + 1..] {
        match arg.as_str() {
            "LISTS" | "ITEMS" if doing == Doing::ZipLists => {
                return super::fatal_error(interp, "ZIP_LISTS can not be used with LISTS or ITEMS");
            }
            "LISTS" => doing = Doing::Lists,
            "ITEMS" => doing = Doing::Items,
            "ZIP_LISTS" => {
                if doing != Doing::None {
                    return super::fatal_error(interp, "ZIP_LISTS can not be used with LISTS or ITEMS");
                }
                doing = Doing::ZipLists;
                blocker.zip_lists = true;
            }
            _ if doing == Doing::Lists => {
                let value = interp.safe_definition(arg);
                if !value.is_empty() {
                    blocker.args.extend(split_list_keep_empty(&value));
                }
            }
            _ if doing == Doing::Items || doing == Doing::ZipLists => blocker.args.push(arg.clone()),
            _ => return super::fatal_error(interp, format!("Unknown argument:\n  {arg}\n")),
        }
    }

    if blocker.variable_count > 1 {
        if doing != Doing::ZipLists {
            return super::fatal_error(
                interp,
                "Multiple loop variables are only allowed with ZIP_LISTS",
            );
        }
        let lists = blocker.args.len() - blocker.variable_count;
        if lists != blocker.variable_count {
            return super::fatal_error(
                interp,
                format!(
                    "Expected {lists} list variables, but given {}",
                    blocker.variable_count
                ),
            );
        }
    }
    add_foreach_blocker(interp, blocker);
    true
}

fn foreach_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.is_empty() {
        return status.fail("called with incorrect number of arguments");
    }
    if let Some(position) = args.iter().position(|arg| arg == "IN") {
        return foreach_in(args, position, interp);
    }
    let values = if args.len() > 1 && args[1] == "RANGE" {
        match foreach_range(args, interp, status) {
            Some(values) => values,
            None => return false,
        }
    } else {
        args.to_vec()
    };
    add_foreach_blocker(
        interp,
        ForEachBlocker {
            args: values,
            variable_count: 1,
            zip_lists: false,
        },
    );
    true
}

// break / continue / return

/// Severity of a CMP0055 diagnostic, or `None` when it is not shown.
fn cmp0055_message(interp: &Interpreter, text: &str) -> Option<(MessageType, String)> {
    match interp.policy_status(PolicyId::Cmp0055) {
        PolicyStatus::Old => None,
        PolicyStatus::Warn => Some((
            MessageType::AuthorWarning,
            format!("{}\n{text}", PolicyId::Cmp0055.warning()),
        )),
        PolicyStatus::New => Some((MessageType::FatalError, text.to_string())),
    }
}

fn break_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if !interp.is_loop_block() {
        if let Some((kind, text)) = cmp0055_message(
            interp,
            "A BREAK command was found outside of a proper FOREACH or WHILE loop scope.",
        ) {
            interp.issue_message(kind, text);
            if kind == MessageType::FatalError {
                return false;
            }
        }
    }
    status.set_break_invoked();
    if !args.is_empty() {
        if let Some((kind, text)) =
            cmp0055_message(interp, "The BREAK command does not accept any arguments.")
        {
            interp.issue_message(kind, text);
            if kind == MessageType::FatalError {
                return false;
            }
        }
    }
    true
}

fn continue_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if !interp.is_loop_block() {
        return super::fatal_error(
            interp,
            "A CONTINUE command was found outside of a proper FOREACH or WHILE loop scope.",
        );
    }
    status.set_continue_invoked();
    if !args.is_empty() {
        return super::fatal_error(interp, "The CONTINUE command does not accept any arguments.");
    }
    true
}

fn return_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.is_empty() {
        status.set_return_invoked();
        return true;
    }
    match interp.policy_status(PolicyId::Cmp0140) {
        PolicyStatus::Warn => {
            interp.issue_message(
                MessageType::AuthorWarning,
                format!(
                    "{}\nreturn() checks its arguments when the policy is set to NEW. Since the policy is not set the OLD behavior will be used so the arguments will be ignored.",
                    PolicyId::Cmp0140.warning()
                ),
            );
            status.set_return_invoked();
            return true;
        }
        PolicyStatus::Old => {
            status.set_return_invoked();
            return true;
        }
        PolicyStatus::New => {}
    }
    if args[0] != "PROPAGATE" {
        status.set_error(format!("called with unsupported argument \"{}\"", args[0]));
        interp.set_fatal_error();
        return false;
    }
    status.set_return_invoked_with(args[1..].to_vec());
    true
}
