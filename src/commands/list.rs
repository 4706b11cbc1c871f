//! `list()` sub-commands over `;`-separated variables.

use crate::language::expand::{join_list, split_list_keep_empty};
use crate::runtime::{interpreter::Interpreter, registry::CommandRegistry, status::ExecutionStatus};
use std::cmp::Ordering;

pub fn register(registry: &mut CommandRegistry) {
    registry.add_builtin("list", list_command);
}

/// The elements of variable `name`, keeping empty ones. `None` when the
/// variable is not defined.
fn get_list(interp: &Interpreter, name: &str) -> Option<Vec<String>> {
    let value = interp.definition(name)?;
    if value.is_empty() {
        return Some(Vec::new());
    }
    Some(split_list_keep_empty(value))
}

fn parse_index(text: &str) -> Option<i64> {
    text.trim_start().parse().ok()
}

fn invalid_index(status: &mut ExecutionStatus, text: &str) -> bool {
    status.fail(format!("index: {text} is not a valid index"))
}

/// Resolves a possibly negative element index against `len`.
fn element_index(index: i64, len: usize) -> Result<usize, String> {
    let size = len as i64;
    let in_range = if index >= 0 { index < size } else { -index <= size };
    if !in_range {
        return Err(format!("index: {index} out of range (-{size}, {})", size - 1));
    }
    Ok(if index < 0 { (size + index) as usize } else { index as usize })
}

/// Like [`element_index`] but one past the end is also valid.
fn insert_index(index: i64, len: usize) -> Result<usize, String> {
    let size = len as i64;
    let in_range = if index >= 0 { index <= size } else { -index <= size };
    if !in_range {
        return Err(format!("index: {index} out of range (-{size}, {size})"));
    }
    Ok(if index < 0 { (size + index) as usize } else { index as usize })
}

fn list_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 2 {
        return status.fail("must be called with at least two arguments.");
    }
    match args[0].as_str() {
        "LENGTH" => length(interp, args, status),
        "GET" => get(interp, args, status),
        "APPEND" => append(interp, args, false),
        "PREPEND" => append(interp, args, true),
        "POP_BACK" => pop(interp, args, true),
        "POP_FRONT" => pop(interp, args, false),
        "FIND" => find(interp, args, status),
        "INSERT" => insert(interp, args, status),
        "JOIN" => join(interp, args, status),
        "REMOVE_AT" => remove_at(interp, args, status),
        "REMOVE_ITEM" => remove_item(interp, args, status),
        "REMOVE_DUPLICATES" => reorder(interp, args, status, "REMOVE_DUPLICATES", |list| {
            let mut seen = std::collections::HashSet::new();
            list.retain(|item| seen.insert(item.clone()));
        }),
        "REVERSE" => reorder(interp, args, status, "REVERSE", |list| list.reverse()),
        "SORT" => sort(interp, args, status),
        "SUBLIST" => sublist(interp, args, status),
        other => status.fail(format!("does not recognize sub-command {other}")),
    }
}

fn length(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() != 3 {
        return status.fail("sub-command LENGTH requires two arguments.");
    }
    let len = get_list(interp, &args[1]).map_or(0, |list| list.len());
    interp.add_definition(&args[2], &len.to_string());
    true
}

fn get(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 4 {
        return status.fail("sub-command GET requires at least three arguments.");
    }
    let output = &args[args.len() - 1];
    let Some(list) = get_list(interp, &args[1]) else {
        interp.add_definition(output, "NOTFOUND");
        return true;
    };
    if list.is_empty() {
        return status.fail("GET given empty list");
    }
    let mut values = Vec::new();
    for text in &args[2..args.len() - 1] {
        let Some(index) = parse_index(text) else {
            return invalid_index(status, text);
        };
        match element_index(index, list.len()) {
            Ok(idx) => values.push(list[idx].as_str()),
            Err(message) => return status.fail(message),
        }
    }
    interp.add_definition(output, &join_list(&values));
    true
}

fn append(interp: &mut Interpreter, args: &[String], prepend: bool) -> bool {
    if args.len() < 3 {
        return true;
    }
    let name = &args[1];
    let current = interp.safe_definition(name);
    let items = join_list(&args[2..]);
    let value = if current.is_empty() {
        items
    } else if prepend {
        format!("{items};{current}")
    } else {
        format!("{current};{items}")
    };
    interp.add_definition(name, &value);
    true
}

fn pop(interp: &mut Interpreter, args: &[String], back: bool) -> bool {
    let name = &args[1];
    let outputs = &args[2..];
    let Some(mut list) = get_list(interp, name) else {
        for output in outputs {
            interp.remove_definition(output);
        }
        return true;
    };
    if list.is_empty() {
        for output in outputs {
            interp.remove_definition(output);
        }
        return true;
    }

    let take = |list: &mut Vec<String>| if back { list.pop() } else { Some(list.remove(0)) };
    if outputs.is_empty() {
        take(&mut list);
    } else {
        for output in outputs {
            match (!list.is_empty()).then(|| take(&mut list)).flatten() {
                Some(item) => interp.add_definition(output, &item),
                None => interp.remove_definition(output),
            }
        }
    }
    interp.add_definition(name, &join_list(&list));
    true
}

fn find(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() != 4 {
        return status.fail("sub-command FIND requires three arguments.");
    }
    let index = get_list(interp, &args[1])
        .and_then(|list| list.iter().position(|item| *item == args[2]))
        .map_or(-1, |idx| idx as i64);
    interp.add_definition(&args[3], &index.to_string());
    true
}

fn insert(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 4 {
        return status.fail("sub-command INSERT requires at least three arguments.");
    }
    let name = &args[1];
    let Some(index) = parse_index(&args[2]) else {
        return invalid_index(status, &args[2]);
    };
    let mut list = get_list(interp, name).unwrap_or_default();
    let position = if list.is_empty() {
        if index != 0 && index != -1 {
            return status.fail(format!("index: {index} out of range (0, 0)"));
        }
        0
    } else {
        match insert_index(index, list.len()) {
            Ok(position) => position,
            Err(message) => return status.fail(message),
        }
    };
    let tail = list.split_off(position);
    list.extend(args[3..].iter().cloned());
    list.extend(tail);
    interp.add_definition(name, &join_list(&list));
    true
}

fn join(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() != 4 {
        return status.fail(format!(
            "sub-command JOIN requires three arguments ({} found).",
            args.len() - 1
        ));
    }
    let joined = get_list(interp, &args[1])
        .map(|list| list.join(&args[2]))
        .unwrap_or_default();
    interp.add_definition(&args[3], &joined);
    true
}

fn remove_at(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 3 {
        return status.fail("sub-command REMOVE_AT requires at least two arguments.");
    }
    let name = &args[1];
    let Some(list) = get_list(interp, name) else {
        return status.fail(format!("index: {} out of range (0, 0)", args[2]));
    };
    let mut removed = Vec::new();
    for text in &args[2..] {
        let Some(index) = parse_index(text) else {
            return invalid_index(status, text);
        };
        match element_index(index, list.len()) {
            Ok(idx) => removed.push(idx),
            Err(message) => return status.fail(message),
        }
    }
    let kept: Vec<&String> = list
        .iter()
        .enumerate()
        .filter(|(idx, _)| !removed.contains(idx))
        .map(|(_, item)| item)
        .collect();
    interp.add_definition(name, &join_list(&kept));
    true
}

fn remove_item(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() < 3 {
        return status.fail("sub-command REMOVE_ITEM requires two or more arguments.");
    }
    let name = &args[1];
    let Some(mut list) = get_list(interp, name) else {
        return true;
    };
    list.retain(|item| !args[2..].contains(item));
    interp.add_definition(name, &join_list(&list));
    true
}

fn reorder(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus, sub_command: &str, apply: impl FnOnce(&mut Vec<String>)) -> bool {
    if args.len() != 2 {
        return status.fail(format!("sub-command {sub_command} only takes one argument."));
    }
    let name = &args[1];
    let Some(mut list) = get_list(interp, name) else {
        return true;
    };
    apply(&mut list);
    interp.add_definition(name, &join_list(&list));
    true
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SortCompare {
    String,
    FileBasename,
    Natural,
}

/// Compares digit runs by value and everything else bytewise.
fn natural_cmp(lhs: &str, rhs: &str) -> Ordering {
    let (mut a, mut b) = (lhs.as_bytes(), rhs.as_bytes());
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let a_len = a.iter().take_while(|c| c.is_ascii_digit()).count();
                let b_len = b.iter().take_while(|c| c.is_ascii_digit()).count();
                let a_digits = trim_zeros(&a[..a_len]);
                let b_digits = trim_zeros(&b[..b_len]);
                let ordering = a_digits
                    .len()
                    .cmp(&b_digits.len())
                    .then_with(|| a_digits.cmp(b_digits));
                if ordering != Ordering::Equal {
                    return ordering;
                }
                a = &a[a_len..];
                b = &b[b_len..];
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let zeros = digits.iter().take_while(|c| **c == b'0').count();
    &digits[zeros..]
}

fn sort(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let mut compare: Option<SortCompare> = None;
    let mut case_insensitive: Option<bool> = None;
    let mut descending: Option<bool> = None;

    let mut idx = 2;
    while idx < args.len() {
        let option = args[idx].as_str();
        idx += 1;
        if !matches!(option, "COMPARE" | "CASE" | "ORDER") {
            return status.fail(format!("sub-command SORT option \"{option}\" is unknown."));
        }
        let already = match option {
            "COMPARE" => compare.is_some(),
            "CASE" => case_insensitive.is_some(),
            _ => descending.is_some(),
        };
        if already {
            return status.fail(format!(
                "sub-command SORT option \"{option}\" has been specified multiple times."
            ));
        }
        let Some(value) = args.get(idx) else {
            return status.fail(format!(
                "sub-command SORT missing argument for option \"{option}\"."
            ));
        };
        idx += 1;
        let valid = match (option, value.as_str()) {
            ("COMPARE", "STRING") => compare.replace(SortCompare::String).is_none(),
            ("COMPARE", "FILE_BASENAME") => compare.replace(SortCompare::FileBasename).is_none(),
            ("COMPARE", "NATURAL") => compare.replace(SortCompare::Natural).is_none(),
            ("CASE", "SENSITIVE") => case_insensitive.replace(false).is_none(),
            ("CASE", "INSENSITIVE") => case_insensitive.replace(true).is_none(),
            ("ORDER", "ASCENDING") => descending.replace(false).is_none(),
            ("ORDER", "DESCENDING") => descending.replace(true).is_none(),
            _ => false,
        };
        if !valid {
            return status.fail(format!(
                "sub-command SORT value \"{value}\" for option \"{option}\" is invalid."
            ));
        }
    }

    let name = &args[1];
    let Some(mut list) = get_list(interp, name) else {
        return true;
    };
    let compare = compare.unwrap_or(SortCompare::String);
    let case_insensitive = case_insensitive.unwrap_or(false);
    let key = |item: &String| -> String {
        let text = match compare {
            SortCompare::FileBasename => item.rsplit('/').next().unwrap_or(item).to_string(),
            _ => item.clone(),
        };
        if case_insensitive {
            text.to_ascii_lowercase()
        } else {
            text
        }
    };
    list.sort_by(|lhs, rhs| {
        let (lhs, rhs) = (key(lhs), key(rhs));
        match compare {
            SortCompare::Natural => natural_cmp(&lhs, &rhs),
            _ => lhs.cmp(&rhs),
        }
    });
    if descending.unwrap_or(false) {
        list.reverse();
    }
    interp.add_definition(name, &join_list(&list));
    true
}

fn sublist(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    if args.len() != 5 {
        return status.fail(format!(
            "sub-command SUBLIST requires four arguments ({} found).",
            args.len() - 1
        ));
    }
    let output = &args[4];
    let list = match get_list(interp, &args[1]) {
        Some(list) if !list.is_empty() => list,
        _ => {
            interp.add_definition(output, "");
            return true;
        }
    };
    let Some(start) = parse_index(&args[2]) else {
        return invalid_index(status, &args[2]);
    };
    let Some(length) = parse_index(&args[3]) else {
        return invalid_index(status, &args[3]);
    };
    if start < 0 || start as usize >= list.len() {
        return status.fail(format!(
            "begin index: {start} is out of range 0 - {}",
            list.len() - 1
        ));
    }
    if length < -1 {
        return status.fail(format!("length: {length} should be -1 or greater"));
    }
    let start = start as usize;
    let end = if length == -1 {
        list.len()
    } else {
        list.len().min(start.saturating_add(length as usize))
    };
    interp.add_definition(output, &join_list(&list[start..end]));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indexes_count_from_the_end() {
        assert_eq!(element_index(-1, 3), Ok(2));
        assert_eq!(element_index(2, 3), Ok(2));
        assert_eq!(
            element_index(3, 3),
            Err("index: 3 out of range (-3, 2)".to_string())
        );
        assert_eq!(insert_index(3, 3), Ok(3));
        assert_eq!(insert_index(-4, 3), Err("index: -4 out of range (-3, 3)".to_string()));
    }

    #[test]
    fn natural_order_compares_numbers_by_value() {
        let mut items = vec!["a10", "a2", "a1", "b"];
        items.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(items, ["a1", "a2", "a10", "b"]);
        assert_eq!(natural_cmp("x007", "x7"), Ordering::Equal);
    }

    #[test]
    fn index_parsing_is_strict() {
        assert_eq!(parse_index("-2"), Some(-2));
        assert_eq!(parse_index(" 4"), Some(4));
        assert_eq!(parse_index("4x"), None);
    }
}
