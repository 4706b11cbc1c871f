//! `string()` sub-commands.

use super::parse_leading_int;
use crate::language::expand::{is_off, ExpandOptions};
use crate::runtime::{interpreter::Interpreter, registry::CommandRegistry, status::ExecutionStatus};
use regex::Regex;
use std::cmp::Ordering;

pub fn register(registry: &mut CommandRegistry) {
    registry.add_builtin("string", string_command);
}

fn string_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(sub_command) = args.first() else {
        return status.fail("must be called with at least one argument.");
    };
    match sub_command.as_str() {
        "REGEX" => regex_command(interp, args, status),
        "APPEND" | "PREPEND" => {
            if args.len() < 2 {
                return status.fail(format!("sub-command {sub_command} requires at least one argument."));
            }
            if args.len() == 2 {
                return true;
            }
            let name = &args[1];
            let current = interp.safe_definition(name);
            let text = args[2..].concat();
            let value = if sub_command == "APPEND" {
                current + &text
            } else {
                text + &current
            };
            interp.add_definition(name, &value);
            true
        }
        "CONCAT" => {
            if args.len() < 2 {
                return status.fail("sub-command CONCAT requires at least one argument.");
            }
            interp.add_definition(&args[1], &args[2..].concat());
            true
        }
        "JOIN" => {
            if args.len() < 3 {
                return status.fail("sub-command JOIN requires at least two arguments.");
            }
            interp.add_definition(&args[2], &args[3..].join(&args[1]));
            true
        }
        "LENGTH" => {
            if args.len() != 3 {
                return status.fail("sub-command LENGTH requires two arguments.");
            }
            interp.add_definition(&args[2], &args[1].len().to_string());
            true
        }
        "TOUPPER" | "TOLOWER" => {
            if args.len() < 3 {
                return status.fail("no output variable specified");
            }
            let value = if sub_command == "TOUPPER" {
                args[1].to_ascii_uppercase()
            } else {
                args[1].to_ascii_lowercase()
            };
            interp.add_definition(&args[2], &value);
            true
        }
        "SUBSTRING" => substring(interp, args, status),
        "FIND" => find(interp, args, status),
        "REPLACE" => {
            if args.len() < 5 {
                return status.fail("sub-command REPLACE requires at least four arguments.");
            }
            let input = args[4..].concat();
            let value = if args[1].is_empty() {
                input
            } else {
                input.replace(&args[1], &args[2])
            };
            interp.add_definition(&args[3], &value);
            true
        }
        "STRIP" => {
            if args.len() != 3 {
                return status.fail("sub-command STRIP requires two arguments.");
            }
            let stripped = args[1].trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c'));
            interp.add_definition(&args[2], stripped);
            true
        }
        "COMPARE" => compare(interp, args, status),
        "CONFIGURE" => configure(interp, args, status),
        "REPEAT" => {
            if args.len() != 4 {
                return status.fail("sub-command REPEAT requires three arguments.");
            }
            let Ok(times) = args[2].trim_start().parse::<usize>() else {
                return status.fail("repeat count is not a positive number.");
            };
            interp.add_definition(&args[3], &args[1].repeat(times));
            true
        }
        other => status.fail(format!("does not recognize sub-command {other}")),
    }
}

fn substring(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() != 5 {
        return status.fail("sub-command SUBSTRING requires four arguments.");
    }
    let text = &args[1];
    let begin = parse_leading_int(&args[2]).unwrap_or(0);
    let end = parse_leading_int(&args[3]).unwrap_or(0);
    let len = text.len() as i64;
    if begin < 0 || begin > len {
        return status.fail(format!("begin index: {begin} is out of range 0 - {len}"));
    }
    if end < -1 {
        return status.fail(format!("end index: {end} should be -1 or greater"));
    }
    let begin = begin as usize;
    let stop = if end == -1 {
        text.len()
    } else {
        text.len().min(begin + end as usize)
    };
    let bytes = &text.as_bytes()[begin..stop];
    interp.add_definition(&args[4], &String::from_utf8_lossy(bytes));
    true
}

fn find(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 4 || args.len() > 5 {
        return status.fail("sub-command FIND requires 3 or 4 parameters.");
    }
    let reverse = match args.get(4).map(String::as_str) {
        None => false,
        Some("REVERSE") => true,
        Some(other) => {
            return status.fail(format!("sub-command FIND: unknown last parameter {other}"));
        }
    };
    let (haystack, needle) = (&args[1], &args[2]);
    let found = if reverse {
        haystack.rfind(needle.as_str())
    } else {
        haystack.find(needle.as_str())
    };
    let position = found.map_or(-1, |pos| pos as i64);
    interp.add_definition(&args[3], &position.to_string());
    true
}

fn compare(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(mode) = args.get(1) else {
        return status.fail("sub-command COMPARE requires a mode to be specified.");
    };
    let accept: fn(Ordering) -> bool = match mode.as_str() {
        "EQUAL" => Ordering::is_eq,
        "NOTEQUAL" => Ordering::is_ne,
        "LESS" => Ordering::is_lt,
        "LESS_EQUAL" => Ordering::is_le,
        "GREATER" => Ordering::is_gt,
        "GREATER_EQUAL" => Ordering::is_ge,
        other => {
            return status.fail(format!("sub-command COMPARE does not recognize mode {other}"));
        }
    };
    if args.len() < 5 {
        return status.fail(format!(
            "sub-command COMPARE, mode {mode} needs at least 5 arguments total to command."
        ));
    }
    let result = accept(args[2].cmp(&args[3]));
    interp.add_definition(&args[4], if result { "1" } else { "0" });
    true
}

/// Piece of a `REGEX REPLACE` replacement expression.
#[derive(Debug, PartialEq, Eq)]
enum Replacement {
    Literal(String),
    Group(usize),
}

fn parse_replacement(text: &str) -> Result<Vec<Replacement>, String> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            literal.push(c);
            continue;
        }
        match chars.next() {
            Some(digit @ '0'..='9') => {
                if !literal.is_empty() {
                    pieces.push(Replacement::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(Replacement::Group(digit as usize - '0' as usize));
            }
            Some('n') => literal.push('\n'),
            Some('\\') => literal.push('\\'),
            Some(other) => {
                return Err(format!("Unknown escape \"\\{other}\" in replace-expression."));
            }
            None => literal.push('\\'),
        }
    }
    if !literal.is_empty() {
        pieces.push(Replacement::Literal(literal));
    }
    Ok(pieces)
}

fn compile(pattern: &str, mode: &str, status: &mut ExecutionStatus) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(_) => {
            status.set_error(format!(
                "sub-command REGEX, mode {mode} failed to compile regex \"{pattern}\"."
            ));
            None
        }
    }
}

fn regex_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(mode) = args.get(1) else {
        return status.fail("sub-command REGEX requires a mode to be specified.");
    };
    match mode.as_str() {
        "MATCH" | "MATCHALL" => {
            if args.len() < 5 {
                return status.fail(format!(
                    "sub-command REGEX, mode {mode} needs at least 5 arguments total to command."
                ));
            }
            let Some(regex) = compile(&args[2], mode, status) else {
                return false;
            };
            let input = args[4..].concat();
            interp.clear_matches();
            let output = if mode == "MATCH" {
                match regex.captures(&input) {
                    Some(captures) => {
                        interp.store_matches(&captures);
                        captures.get(0).map(|m| m.as_str().to_string()).unwrap_or_default()
                    }
                    None => String::new(),
                }
            } else {
                let mut found = Vec::new();
                for captures in regex.captures_iter(&input) {
                    let Some(whole) = captures.get(0) else {
                        continue;
                    };
                    if whole.as_str().is_empty() {
                        return status.fail(format!(
                            "sub-command REGEX, mode MATCHALL regex \"{}\" matched an empty string.",
                            args[2]
                        ));
                    }
                    interp.store_matches(&captures);
                    found.push(whole.as_str().to_string());
                }
                found.join(";")
            };
            interp.add_definition(&args[3], &output);
            true
        }
        "REPLACE" => {
            if args.len() < 6 {
                return status.fail(
                    "sub-command REGEX, mode REPLACE needs at least 6 arguments total to command.",
                );
            }
            let pieces = match parse_replacement(&args[3]) {
                Ok(pieces) => pieces,
                Err(reason) => {
                    return status.fail(format!("sub-command REGEX, mode REPLACE: {reason}"));
                }
            };
            let Some(regex) = compile(&args[2], mode, status) else {
                return false;
            };
            let input = args[5..].concat();
            interp.clear_matches();
            let mut output = String::with_capacity(input.len());
            let mut base = 0;
            while base <= input.len() {
                let Some(captures) = regex.captures_at(&input, base) else {
                    break;
                };
                let Some(whole) = captures.get(0) else {
                    break;
                };
                if whole.start() == whole.end() {
                    return status.fail(format!(
                        "sub-command REGEX, mode REPLACE regex \"{}\" matched an empty string.",
                        args[2]
                    ));
                }
                output.push_str(&input[base..whole.start()]);
                for piece in &pieces {
                    match piece {
                        Replacement::Literal(text) => output.push_str(text),
                        Replacement::Group(idx) => {
                            output.push_str(captures.get(*idx).map_or("", |m| m.as_str()));
                        }
                    }
                }
                interp.store_matches(&captures);
                base = whole.end();
            }
            output.push_str(&input[base.min(input.len())..]);
            interp.add_definition(&args[4], &output);
            true
        }
        other => status.fail(format!("sub-command REGEX does not recognize mode {other}")),
    }
}

/// Rewrites `#cmakedefine` lines ahead of variable substitution.
fn configure_defines(interp: &Interpreter, input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        let (line, terminated) = match rest.find('\n') {
            Some(end) => (&rest[..end], true),
            None => (rest, false),
        };
        output.push_str(&configure_line(interp, line));
        if !terminated {
            break;
        }
        output.push('\n');
        rest = &rest[line.len() + 1..];
        if rest.is_empty() {
            break;
        }
    }
    output
}

fn configure_line(interp: &Interpreter, line: &str) -> String {
    let defined = |name: &str| interp.definition(name).is_some_and(|value| !is_off(value));
    for (hash, _) in line.match_indices('#') {
        let after = &line[hash + 1..];
        let directive = after.trim_start_matches([' ', '\t']);
        let indentation = &after[..after.len() - directive.len()];

        if let Some(tail) = directive.strip_prefix("cmakedefine01") {
            if let Some(name) = directive_name(tail) {
                let value = if defined(name) { "1" } else { "0" };
                return format!("#{indentation}define {name} {value}");
            }
        } else if let Some(tail) = directive.strip_prefix("cmakedefine") {
            if let Some(name) = directive_name(tail) {
                if defined(name) {
                    return line.replace(
                        &format!("#{indentation}cmakedefine"),
                        &format!("#{indentation}define"),
                    );
                }
                return format!("/* #{indentation}undef {name} */");
            }
        }
    }
    line.to_string()
}

/// Name after the blanks that follow a directive keyword.
fn directive_name(tail: &str) -> Option<&str> {
    let trimmed = tail.trim_start_matches([' ', '\t']);
    if trimmed.len() == tail.len() {
        return None;
    }
    let len = trimmed
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    Some(&trimmed[..len])
}

fn configure(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 2 {
        return status.fail("No input string specified.");
    }
    if args.len() < 3 {
        return status.fail("No output variable specified.");
    }
    let mut options = ExpandOptions {
        replace_at: true,
        no_escapes: true,
        ..ExpandOptions::default()
    };
    for arg in &args[3..] {
        match arg.as_str() {
            "@ONLY" => options.at_only = true,
            "ESCAPE_QUOTES" => options.escape_quotes = true,
            other => return status.fail(format!("Unrecognized argument \"{other}\"")),
        }
    }
    let defined = configure_defines(interp, &args[1]);
    let line = interp.execution_context().line;
    let Some(output) = interp.expand_variables_in_string(&defined, line, options) else {
        return true;
    };
    interp.add_definition(&args[2], &output);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_expressions() {
        assert_eq!(
            parse_replacement("<\\1>\\n"),
            Ok(vec![
                Replacement::Literal("<".into()),
                Replacement::Group(1),
                Replacement::Literal(">\n".into()),
            ])
        );
        assert_eq!(
            parse_replacement("\\q"),
            Err("Unknown escape \"\\q\" in replace-expression.".to_string())
        );
    }

    #[test]
    fn directive_names_need_a_blank() {
        assert_eq!(directive_name(" FOO bar"), Some("FOO"));
        assert_eq!(directive_name("\tA_1"), Some("A_1"));
        assert_eq!(directive_name("01 FOO"), None);
    }
}
