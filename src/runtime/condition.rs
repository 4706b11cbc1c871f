use crate::language::{
    ast::Backtrace,
    expand::{is_off, is_on, split_list_keep_empty},
};
use crate::runtime::{
    interpreter::{ExpandedArgument, Interpreter},
    messenger::MessageType,
    policies::{compare_versions, PolicyId, PolicyStatus},
};
use regex::Regex;
use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionError {
    pub kind: MessageType,
    pub message: String,
}

impl ConditionError {
    fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: MessageType::FatalError,
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy)]
enum Comparison {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Less => ordering == Ordering::Less,
            Comparison::LessEqual => ordering != Ordering::Greater,
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::GreaterEqual => ordering != Ordering::Less,
            Comparison::Equal => ordering == Ordering::Equal,
        }
    }
}

#[derive(Clone, Copy)]
enum BinaryOp {
    Numeric(Comparison),
    Text(Comparison),
    Version(Comparison),
    PathEqual,
    InList,
}

const BINARY_OPERATORS: [(&str, BinaryOp); 17] = [
    ("LESS", BinaryOp::Numeric(Comparison::Less)),
    ("LESS_EQUAL", BinaryOp::Numeric(Comparison::LessEqual)),
    ("GREATER", BinaryOp::Numeric(Comparison::Greater)),
    ("GREATER_EQUAL", BinaryOp::Numeric(Comparison::GreaterEqual)),
    ("EQUAL", BinaryOp::Numeric(Comparison::Equal)),
    ("STRLESS", BinaryOp::Text(Comparison::Less)),
    ("STRLESS_EQUAL", BinaryOp::Text(Comparison::LessEqual)),
    ("STRGREATER", BinaryOp::Text(Comparison::Greater)),
    ("STRGREATER_EQUAL", BinaryOp::Text(Comparison::GreaterEqual)),
    ("STREQUAL", BinaryOp::Text(Comparison::Equal)),
    ("VERSION_LESS", BinaryOp::Version(Comparison::Less)),
    ("VERSION_LESS_EQUAL", BinaryOp::Version(Comparison::LessEqual)),
    ("VERSION_GREATER", BinaryOp::Version(Comparison::Greater)),
    ("VERSION_GREATER_EQUAL", BinaryOp::Version(Comparison::GreaterEqual)),
    ("VERSION_EQUAL", BinaryOp::Version(Comparison::Equal)),
    ("PATH_EQUAL", BinaryOp::PathEqual),
    ("IN_LIST", BinaryOp::InList),
];

fn token(value: bool) -> ExpandedArgument {
    ExpandedArgument::new(if value { "1" } else { "0" }, true)
}

/// Reduces `if()`/`while()` argument lists to a single truth value.
///
/// Reduction runs in fixed levels: parentheses, unary predicates, binary
/// operators, `NOT`, then `AND`/`OR` (equal precedence, left to right).
pub struct ConditionEvaluator<'a> {
    interp: &'a mut Interpreter,
    backtrace: Backtrace,
    policy54: PolicyStatus,
    policy57: PolicyStatus,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(interp: &'a mut Interpreter, backtrace: Backtrace) -> Self {
        let policy54 = interp.policy_status(PolicyId::Cmp0054);
        let policy57 = interp.policy_status(PolicyId::Cmp0057);
        Self {
            interp,
            backtrace,
            policy54,
            policy57,
        }
    }

    pub fn is_true(&mut self, args: &[ExpandedArgument]) -> Result<bool, ConditionError> {
        if args.is_empty() {
            return Ok(false);
        }
        let mut list = args.to_vec();
        self.reduce_parentheses(&mut list)?;
        self.reduce_unary(&mut list);
        self.reduce_binary(&mut list)?;
        self.reduce_not(&mut list);
        self.reduce_logical(&mut list);
        match list.as_slice() {
            [only] => Ok(self.boolean_value(only)),
            _ => Err(ConditionError::fatal("Unknown arguments specified")),
        }
    }

    fn warn_cmp0054(&mut self, detail: String) {
        let context = self.backtrace.top().cloned().unwrap_or_default();
        if self.interp.note_cmp0054_report(&context) {
            self.interp.issue_message_at(
                MessageType::AuthorWarning,
                format!("{}\n{detail}", PolicyId::Cmp0054.warning()),
                &self.backtrace,
            );
        }
    }

    fn is_keyword(&mut self, keyword: &str, arg: &ExpandedArgument) -> bool {
        if arg.quoted && self.policy54 == PolicyStatus::New {
            return false;
        }
        let matched = arg.value == keyword;
        if matched && arg.quoted && self.policy54 == PolicyStatus::Warn {
            self.warn_cmp0054(format!(
                "Quoted keywords like \"{keyword}\" will no longer be interpreted as keywords when the policy is set to NEW.  Since the policy is not set the OLD behavior will be used."
            ));
        }
        matched
    }

    fn definition_if_unquoted(&mut self, arg: &ExpandedArgument) -> Option<String> {
        if arg.quoted && self.policy54 == PolicyStatus::New {
            return None;
        }
        let definition = self.interp.definition(&arg.value).map(str::to_string);
        if definition.is_some() && arg.quoted && self.policy54 == PolicyStatus::Warn {
            self.warn_cmp0054(format!(
                "Quoted variables like \"{}\" will no longer be dereferenced when the policy is set to NEW.  Since the policy is not set the OLD behavior will be used.",
                arg.value
            ));
        }
        definition
    }

    fn variable_or_string(&mut self, arg: &ExpandedArgument) -> String {
        self.definition_if_unquoted(arg)
            .unwrap_or_else(|| arg.value.clone())
    }

    fn boolean_value(&mut self, arg: &ExpandedArgument) -> bool {
        if is_on(&arg.value) {
            return true;
        }
        if is_off(&arg.value) {
            return false;
        }
        if let Some(number) = whole_number(&arg.value) {
            return number != 0.0;
        }
        self.definition_if_unquoted(arg)
            .is_some_and(|value| !is_off(&value))
    }

    fn reduce_parentheses(&mut self, list: &mut Vec<ExpandedArgument>) -> Result<(), ConditionError> {
        let mut idx = 0;
        while idx < list.len() {
            if self.is_keyword("(", &list[idx]) {
                let mut depth = 1;
                let mut close = idx + 1;
                while close < list.len() {
                    if self.is_keyword("(", &list[close]) {
                        depth += 1;
                    } else if self.is_keyword(")", &list[close]) {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    close += 1;
                }
                if depth != 0 {
                    return Err(ConditionError::fatal("mismatched parenthesis in condition"));
                }
                let inner = list[idx + 1..close].to_vec();
                let value = self.is_true(&inner)?;
                list.splice(idx..=close, [token(value)]);
            }
            idx += 1;
        }
        Ok(())
    }

    fn reduce_unary(&mut self, list: &mut Vec<ExpandedArgument>) {
        let mut idx = 0;
        while idx + 1 < list.len() {
            let operand = list[idx + 1].value.clone();
            let head = list[idx].clone();
            let result = if self.is_keyword("EXISTS", &head) {
                Some(!operand.is_empty() && self.interp.platform().fs_exists(&operand))
            } else if self.is_keyword("IS_DIRECTORY", &head) {
                Some(self.interp.platform().fs_is_dir(&operand))
            } else if self.is_keyword("IS_SYMLINK", &head) {
                Some(self.interp.platform().fs_is_symlink(&operand))
            } else if self.is_keyword("IS_ABSOLUTE", &head) {
                Some(operand.starts_with('/') || operand.starts_with('~'))
            } else if self.is_keyword("COMMAND", &head) {
                Some(self.interp.state().commands.contains(&operand))
            } else if self.is_keyword("POLICY", &head) {
                Some(PolicyId::parse(&operand).is_some())
            } else if self.is_keyword("TARGET", &head) {
                Some(self.interp.targets().contains(&operand))
            } else if self.is_keyword("DEFINED", &head) {
                Some(self.is_defined(&operand))
            } else {
                None
            };
            if let Some(value) = result {
                list.splice(idx..idx + 2, [token(value)]);
            }
            idx += 1;
        }
    }

    fn is_defined(&self, name: &str) -> bool {
        if let Some(env) = special_variable(name, "ENV") {
            return self.interp.platform().env_get(env).is_some();
        }
        if let Some(cache) = special_variable(name, "CACHE") {
            return self.interp.state().cache.contains(cache);
        }
        self.interp.is_definition_set(name)
    }

    fn binary_operator(&mut self, arg: &ExpandedArgument) -> Option<BinaryOp> {
        for (name, op) in BINARY_OPERATORS {
            if self.is_keyword(name, arg) {
                return Some(op);
            }
        }
        None
    }

    fn reduce_binary(&mut self, list: &mut Vec<ExpandedArgument>) -> Result<(), ConditionError> {
        loop {
            let mut reduced = false;
            let mut idx = 0;
            while idx < list.len() {
                let has_two = idx + 2 < list.len();
                if has_two && self.is_keyword("MATCHES", &list[idx + 1]) {
                    let value = self.matches(&list[idx], &list[idx + 2].value)?;
                    list.splice(idx..idx + 3, [token(value)]);
                    reduced = true;
                } else if idx + 1 < list.len() && self.is_keyword("MATCHES", &list[idx]) {
                    list.splice(idx..idx + 2, [token(false)]);
                    reduced = true;
                } else if has_two {
                    if let Some(op) = self.binary_operator(&list[idx + 1]) {
                        let lhs = list[idx].clone();
                        let rhs = list[idx + 2].clone();
                        if let Some(value) = self.compare(op, &lhs, &rhs) {
                            list.splice(idx..idx + 3, [token(value)]);
                            reduced = true;
                        }
                    }
                }
                idx += 1;
            }
            if !reduced {
                return Ok(());
            }
        }
    }

    fn matches(&mut self, subject: &ExpandedArgument, pattern: &str) -> Result<bool, ConditionError> {
        let text = self.variable_or_string(subject);
        self.interp.clear_matches();
        let regex = Regex::new(pattern).map_err(|_| {
            ConditionError::fatal(format!("Regular expression \"{pattern}\" cannot compile"))
        })?;
        match regex.captures(&text) {
            Some(captures) => {
                self.interp.store_matches(&captures);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn compare(&mut self, op: BinaryOp, lhs: &ExpandedArgument, rhs: &ExpandedArgument) -> Option<bool> {
        match op {
            BinaryOp::Numeric(cmp) => {
                let left = self.variable_or_string(lhs);
                let right = self.variable_or_string(rhs);
                Some(match (scan_double(&left), scan_double(&right)) {
                    (Some((a, _)), Some((b, _))) => {
                        a.partial_cmp(&b).is_some_and(|ordering| cmp.holds(ordering))
                    }
                    _ => false,
                })
            }
            BinaryOp::Text(cmp) => {
                let left = self.variable_or_string(lhs);
                let right = self.variable_or_string(rhs);
                Some(cmp.holds(left.cmp(&right)))
            }
            BinaryOp::Version(cmp) => {
                let left = self.variable_or_string(lhs);
                let right = self.variable_or_string(rhs);
                Some(cmp.holds(compare_versions(&left, &right)))
            }
            BinaryOp::PathEqual => {
                let left = self.variable_or_string(lhs);
                let right = self.variable_or_string(rhs);
                Some(path_components(&left) == path_components(&right))
            }
            BinaryOp::InList => match self.policy57 {
                PolicyStatus::New => {
                    let needle = self.variable_or_string(lhs);
                    let list = self.interp.definition(&rhs.value).map(split_list_keep_empty);
                    Some(list.is_some_and(|items| items.contains(&needle)))
                }
                PolicyStatus::Warn => {
                    self.interp.issue_message_at(
                        MessageType::AuthorWarning,
                        format!(
                            "{}\nIN_LIST will be interpreted as an operator when the policy is set to NEW.  Since the policy is not set the OLD behavior will be used.",
                            PolicyId::Cmp0057.warning()
                        ),
                        &self.backtrace,
                    );
                    None
                }
                PolicyStatus::Old => None,
            },
        }
    }

    fn reduce_not(&mut self, list: &mut Vec<ExpandedArgument>) {
        let mut idx = list.len();
        while idx > 0 {
            idx -= 1;
            if idx + 1 < list.len() && self.is_keyword("NOT", &list[idx]) {
                let operand = list[idx + 1].clone();
                let value = !self.boolean_value(&operand);
                list.splice(idx..idx + 2, [token(value)]);
            }
        }
    }

    fn reduce_logical(&mut self, list: &mut Vec<ExpandedArgument>) {
        loop {
            let mut reduced = false;
            let mut idx = 0;
            while idx + 2 < list.len() {
                let op = list[idx + 1].clone();
                let is_and = self.is_keyword("AND", &op);
                if is_and || self.is_keyword("OR", &op) {
                    let lhs = list[idx].clone();
                    let rhs = list[idx + 2].clone();
                    let left = self.boolean_value(&lhs);
                    let right = self.boolean_value(&rhs);
                    let value = if is_and { left && right } else { left || right };
                    list.splice(idx..idx + 3, [token(value)]);
                    reduced = true;
                }
                idx += 1;
            }
            if !reduced {
                return;
            }
        }
    }
}

/// Renders expanded arguments for diagnostics, quoted and escaped.
pub fn describe_arguments(args: &[ExpandedArgument]) -> String {
    let mut out = String::from("given arguments:\n ");
    for arg in args {
        out.push_str(" \"");
        for c in arg.value.chars() {
            if matches!(c, '\\' | '"' | '$') {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    }
    out.push('\n');
    out
}

/// Inner name of `PREFIX{name}`.
fn special_variable<'n>(name: &'n str, prefix: &str) -> Option<&'n str> {
    let inner = name.strip_prefix(prefix)?.strip_prefix('{')?.strip_suffix('}')?;
    (!inner.is_empty()).then_some(inner)
}

fn path_components(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = Vec::new();
    if path.starts_with('/') {
        parts.push("/");
    }
    let trimmed = path.trim_start_matches('/');
    let mut segments = trimmed.split('/').peekable();
    while let Some(segment) = segments.next() {
        if !segment.is_empty() || segments.peek().is_none() {
            parts.push(segment);
        }
    }
    parts
}

/// Reads the longest numeric prefix, skipping leading whitespace.
fn scan_double(text: &str) -> Option<(f64, usize)> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx += 1;
    }
    let start = idx;
    if idx < bytes.len() && matches!(bytes[idx], b'+' | b'-') {
        idx += 1;
    }
    let rest = text[idx..].to_ascii_lowercase();
    for word in ["infinity", "inf", "nan"] {
        if rest.starts_with(word) {
            let end = idx + word.len();
            return text[start..end].parse().ok().map(|value| (value, end));
        }
    }
    let mut mantissa = 0;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
        mantissa += 1;
    }
    if idx < bytes.len() && bytes[idx] == b'.' {
        idx += 1;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
            mantissa += 1;
        }
    }
    if mantissa == 0 {
        return None;
    }
    if idx < bytes.len() && matches!(bytes[idx], b'e' | b'E') {
        let mut exp = idx + 1;
        if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
            exp += 1;
        }
        let digits = exp;
        while exp < bytes.len() && bytes[exp].is_ascii_digit() {
            exp += 1;
        }
        if exp > digits {
            idx = exp;
        }
    }
    let literal = text[start..idx].trim_end_matches('.');
    literal.parse().ok().map(|value| (value, idx))
}

fn whole_number(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    scan_double(text)
        .filter(|(_, end)| *end == text.len())
        .map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::config::EngineOptions;

    fn unquoted(values: &[&str]) -> Vec<ExpandedArgument> {
        values
            .iter()
            .map(|value| ExpandedArgument::new(*value, false))
            .collect()
    }

    fn evaluate(interp: &mut Interpreter, values: &[&str]) -> Result<bool, ConditionError> {
        let backtrace = interp.backtrace().clone();
        ConditionEvaluator::new(interp, backtrace).is_true(&unquoted(values))
    }

    fn engine() -> Interpreter {
        let mut interp = Interpreter::new(EngineOptions::script());
        interp.set_policy_version("3.28", None);
        interp
    }

    #[test]
    fn constants_numbers_and_variables() {
        let mut interp = engine();
        assert_eq!(evaluate(&mut interp, &["ON"]), Ok(true));
        assert_eq!(evaluate(&mut interp, &["FOO-NOTFOUND"]), Ok(false));
        assert_eq!(evaluate(&mut interp, &["2"]), Ok(true));
        assert_eq!(evaluate(&mut interp, &["0.0"]), Ok(false));
        assert_eq!(evaluate(&mut interp, &["UNDEFINED_VAR"]), Ok(false));
        interp.add_definition("FLAG", "yes");
        assert_eq!(evaluate(&mut interp, &["FLAG"]), Ok(true));
        interp.add_definition("FLAG", "off");
        assert_eq!(evaluate(&mut interp, &["FLAG"]), Ok(false));
    }

    #[test]
    fn operator_levels() {
        let mut interp = engine();
        interp.add_definition("A", "1");
        assert_eq!(evaluate(&mut interp, &["NOT", "A"]), Ok(false));
        assert_eq!(evaluate(&mut interp, &["NOT", "NOT", "A"]), Ok(true));
        assert_eq!(evaluate(&mut interp, &["A", "AND", "0", "OR", "1"]), Ok(true));
        assert_eq!(evaluate(&mut interp, &["A", "AND", "(", "0", "OR", "0", ")"]), Ok(false));
        assert_eq!(evaluate(&mut interp, &["10", "GREATER", "9"]), Ok(true));
        assert_eq!(evaluate(&mut interp, &["abc", "STRLESS", "abd"]), Ok(true));
        assert_eq!(evaluate(&mut interp, &["1.10", "VERSION_GREATER", "1.9"]), Ok(true));
        assert_eq!(evaluate(&mut interp, &["DEFINED", "A"]), Ok(true));
        assert_eq!(evaluate(&mut interp, &["COMMAND", "message"]), Ok(true));
    }

    #[test]
    fn quoted_arguments_are_not_dereferenced() {
        let mut interp = engine();
        interp.add_definition("X", "hello");
        let args = vec![
            ExpandedArgument::new("X", true),
            ExpandedArgument::new("STREQUAL", false),
            ExpandedArgument::new("X", true),
        ];
        let backtrace = interp.backtrace().clone();
        let result = ConditionEvaluator::new(&mut interp, backtrace).is_true(&args);
        assert_eq!(result, Ok(true));
        let args = vec![
            ExpandedArgument::new("X", false),
            ExpandedArgument::new("STREQUAL", false),
            ExpandedArgument::new("hello", true),
        ];
        let backtrace = interp.backtrace().clone();
        let result = ConditionEvaluator::new(&mut interp, backtrace).is_true(&args);
        assert_eq!(result, Ok(true));
    }

    #[test]
    fn matches_stores_groups() {
        let mut interp = engine();
        assert_eq!(evaluate(&mut interp, &["abc123", "MATCHES", "([a-z]+)([0-9]+)"]), Ok(true));
        assert_eq!(interp.definition("CMAKE_MATCH_1"), Some("abc"));
        assert_eq!(interp.definition("CMAKE_MATCH_2"), Some("123"));
        assert_eq!(interp.definition("CMAKE_MATCH_COUNT"), Some("2"));
    }

    #[test]
    fn in_list_and_errors() {
        let mut interp = engine();
        interp.add_definition("L", "a;b;c");
        assert_eq!(evaluate(&mut interp, &["b", "IN_LIST", "L"]), Ok(true));
        assert_eq!(evaluate(&mut interp, &["d", "IN_LIST", "L"]), Ok(false));
        let err = evaluate(&mut interp, &["a", "b"]).expect_err("two values");
        assert_eq!(err.message, "Unknown arguments specified");
        let err = evaluate(&mut interp, &["(", "a"]).expect_err("unbalanced");
        assert_eq!(err.message, "mismatched parenthesis in condition");
    }

    #[test]
    fn numeric_prefix_scanning() {
        assert_eq!(scan_double(" 12abc").map(|(v, _)| v), Some(12.0));
        assert_eq!(scan_double("1e3").map(|(v, _)| v), Some(1000.0));
        assert_eq!(scan_double("abc"), None);
        assert_eq!(whole_number("12abc"), None);
        assert_eq!(whole_number("-2.5"), Some(-2.5));
    }

    #[test]
    fn describes_arguments_escaped() {
        let args = vec![
            ExpandedArgument::new("a\"b", false),
            ExpandedArgument::new("$x", true),
        ];
        assert_eq!(describe_arguments(&args), "given arguments:\n  \"a\\\"b\" \"\\$x\"\n");
    }
}
