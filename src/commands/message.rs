use crate::language::expand::split_list;
use crate::runtime::{
    config::LogLevel, interpreter::Interpreter, messenger::MessageType, registry::CommandRegistry,
    status::ExecutionStatus,
};

pub fn register(registry: &mut CommandRegistry) {
    registry.add_builtin("message", message_command);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Check {
    Start,
    Pass,
    Fail,
}

impl Check {
    fn keyword(self) -> &'static str {
        match self {
            Check::Start => "CHECK_START",
            Check::Pass => "CHECK_PASS",
            Check::Fail => "CHECK_FAIL",
        }
    }
}

/// What a mode keyword resolved to.
struct Mode {
    kind: MessageType,
    level: LogLevel,
    fatal: bool,
    check: Option<Check>,
}

impl Mode {
    fn level(level: LogLevel) -> Self {
        Self {
            kind: MessageType::Log,
            level,
            fatal: false,
            check: None,
        }
    }

    fn diagnostic(kind: MessageType, level: LogLevel, fatal: bool) -> Self {
        Self {
            kind,
            level,
            fatal,
            check: None,
        }
    }

    fn check(check: Check) -> Self {
        Self {
            check: Some(check),
            ..Self::level(LogLevel::Status)
        }
    }
}

/// Resolves the leading mode keyword. `Ok(None)` means the message is
/// switched off by a variable; `Err` means `keyword` is message text.
fn parse_mode(interp: &Interpreter, keyword: &str) -> Result<Option<Mode>, ()> {
    let mode = match keyword {
        "SEND_ERROR" => Mode::diagnostic(MessageType::FatalError, LogLevel::Error, false),
        "FATAL_ERROR" => Mode::diagnostic(MessageType::FatalError, LogLevel::Error, true),
        "WARNING" => Mode::diagnostic(MessageType::Warning, LogLevel::Warning, false),
        "AUTHOR_WARNING" => {
            if interp.is_definition_set("CMAKE_SUPPRESS_DEVELOPER_ERRORS")
                && !interp.is_on("CMAKE_SUPPRESS_DEVELOPER_ERRORS")
            {
                Mode::diagnostic(MessageType::AuthorError, LogLevel::Error, true)
            } else if !interp.is_on("CMAKE_SUPPRESS_DEVELOPER_WARNINGS") {
                Mode::diagnostic(MessageType::AuthorWarning, LogLevel::Warning, false)
            } else {
                return Ok(None);
            }
        }
        "DEPRECATION" => {
            if interp.is_on("CMAKE_ERROR_DEPRECATED") {
                Mode::diagnostic(MessageType::DeprecationError, LogLevel::Error, true)
            } else if !interp.is_definition_set("CMAKE_WARN_DEPRECATED")
                || interp.is_on("CMAKE_WARN_DEPRECATED")
            {
                Mode::diagnostic(MessageType::DeprecationWarning, LogLevel::Warning, false)
            } else {
                return Ok(None);
            }
        }
        "CHECK_START" => Mode::check(Check::Start),
        "CHECK_PASS" => Mode::check(Check::Pass),
        "CHECK_FAIL" => Mode::check(Check::Fail),
        "STATUS" => Mode::level(LogLevel::Status),
        "VERBOSE" => Mode::level(LogLevel::Verbose),
        "DEBUG" => Mode::level(LogLevel::Debug),
        "TRACE" => Mode::level(LogLevel::Trace),
        "NOTICE" => Mode::level(LogLevel::Notice),
        _ => return Err(()),
    };
    Ok(Some(mode))
}

/// Prefixes every line with the joined `CMAKE_MESSAGE_INDENT` list.
fn indent_message(interp: &Interpreter, message: &str) -> String {
    let indent: String = split_list(&interp.safe_definition("CMAKE_MESSAGE_INDENT")).concat();
    if indent.is_empty() {
        return message.to_string();
    }
    format!("{indent}{}", message.replace('\n', &format!("\n{indent}")))
}

fn display_status(interp: &mut Interpreter, message: &str) {
    let text = indent_message(interp, message);
    interp.write_stdout(&format!("-- {text}\n"));
}

fn message_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(first) = args.first() else {
        return status.fail("called with incorrect number of arguments");
    };
    let (mode, rest) = match parse_mode(interp, first) {
        Ok(Some(mode)) => (mode, &args[1..]),
        Ok(None) => return true,
        Err(()) => (Mode::level(LogLevel::Notice), args),
    };
    if interp.log_level() < mode.level {
        return true;
    }

    let message = rest.concat();
    match mode.level {
        LogLevel::Error | LogLevel::Warning => interp.display_message(mode.kind, &message),
        LogLevel::Notice => {
            let text = indent_message(interp, &message);
            interp.write_stderr(&format!("{text}\n"));
        }
        LogLevel::Status => match mode.check {
            Some(Check::Start) => {
                display_status(interp, &message);
                interp.check_stack_mut().push(message);
            }
            Some(check) => match interp.check_stack_mut().pop() {
                Some(started) => display_status(interp, &format!("{started} - {message}")),
                None => interp.display_message(
                    MessageType::AuthorWarning,
                    &format!("Ignored {} without CHECK_START", check.keyword()),
                ),
            },
            None => display_status(interp, &message),
        },
        LogLevel::Verbose | LogLevel::Debug | LogLevel::Trace => display_status(interp, &message),
    }
    if mode.fatal {
        interp.set_fatal_error();
    }
    true
}
