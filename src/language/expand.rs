//! Variable reference expansion and `;`-list handling for argument text.

/// Where `${}`, `$ENV{}` and `$CACHE{}` references are resolved.
pub trait VariableSource {
    fn variable(&self, name: &str) -> Option<String>;
    fn cache_variable(&self, name: &str) -> Option<String>;
    fn env_variable(&self, name: &str) -> Option<String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ExpandOptions {
    /// Only `@VAR@` references are replaced.
    pub at_only: bool,
    /// `@VAR@` references are replaced alongside `${VAR}`.
    pub replace_at: bool,
    /// Backslash sequences are left untouched.
    pub no_escapes: bool,
    /// Double quotes in substituted values are backslash-escaped.
    pub escape_quotes: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReferenceKind {
    Normal,
    Environment,
    Cache,
}

struct OpenReference {
    kind: ReferenceKind,
    start: usize,
}

pub fn is_variable_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'/' | b'_' | b'.' | b'+' | b'-')
}

/// Expands variable references and escape sequences in `source`.
///
/// Errors carry the bare reason; callers add the location.
pub fn expand_variables(
    source: &str,
    vars: &dyn VariableSource,
    options: ExpandOptions,
) -> Result<String, String> {
    let bytes = source.as_bytes();
    let mut open: Vec<OpenReference> = Vec::new();
    let mut result = String::with_capacity(source.len());
    let mut last = 0usize;
    let mut idx = 0usize;

    while idx < bytes.len() {
        let c = bytes[idx];
        match c {
            b'}' if !open.is_empty() => {
                result.push_str(&source[last..idx]);
                if let Some(reference) = open.pop() {
                    let name = result.split_off(reference.start);
                    let value = match reference.kind {
                        ReferenceKind::Normal => vars.variable(&name),
                        ReferenceKind::Environment => vars.env_variable(&name),
                        ReferenceKind::Cache => vars.cache_variable(&name),
                    };
                    if let Some(value) = value {
                        push_value(&mut result, &value, options.escape_quotes && open.is_empty());
                    }
                }
                last = idx + 1;
            }
            b'$' if !options.at_only => {
                let rest = &source[idx..];
                let opening = if rest.starts_with("${") {
                    Some((ReferenceKind::Normal, 2))
                } else if rest.starts_with("$ENV{") {
                    Some((ReferenceKind::Environment, 5))
                } else if rest.starts_with("$CACHE{") {
                    Some((ReferenceKind::Cache, 7))
                } else {
                    None
                };
                if let Some((kind, skip)) = opening {
                    result.push_str(&source[last..idx]);
                    open.push(OpenReference {
                        kind,
                        start: result.len(),
                    });
                    idx += skip;
                    last = idx;
                    continue;
                }
                if !open.is_empty() {
                    return Err(invalid_name_char(c, &result, open.last(), &source[last..idx]));
                }
            }
            b'\\' if !options.no_escapes => {
                let next = bytes.get(idx + 1).copied();
                match next {
                    Some(b't') | Some(b'n') | Some(b'r') => {
                        result.push_str(&source[last..idx]);
                        result.push(match next {
                            Some(b't') => '\t',
                            Some(b'n') => '\n',
                            _ => '\r',
                        });
                        last = idx + 2;
                    }
                    Some(b';') if open.is_empty() => {}
                    Some(other) if other.is_ascii_alphanumeric() => {
                        return Err(format!("Invalid character escape '\\{}'.", other as char));
                    }
                    None => return Err("Invalid character escape '\\'.".into()),
                    Some(_) => {
                        result.push_str(&source[last..idx]);
                        last = idx + 1;
                    }
                }
                idx += 2;
                continue;
            }
            b'@' if (options.replace_at || options.at_only) && open.is_empty() => {
                let rest = &bytes[idx + 1..];
                let name_len = rest.iter().take_while(|b| is_variable_name_char(**b)).count();
                if name_len > 0 && rest.get(name_len) == Some(&b'@') {
                    result.push_str(&source[last..idx]);
                    let name = &source[idx + 1..idx + 1 + name_len];
                    if let Some(value) = vars.variable(name) {
                        push_value(&mut result, &value, options.escape_quotes);
                    }
                    idx += name_len + 2;
                    last = idx;
                    continue;
                }
            }
            _ if !open.is_empty() && c < 0x80 && !is_variable_name_char(c) => {
                return Err(invalid_name_char(c, &result, open.last(), &source[last..idx]));
            }
            _ => {}
        }
        idx += 1;
    }

    if !open.is_empty() {
        return Err("There is an unterminated variable reference.".into());
    }
    result.push_str(&source[last.min(source.len())..]);
    Ok(result)
}

fn push_value(result: &mut String, value: &str, escape_quotes: bool) {
    if escape_quotes {
        result.push_str(&value.replace('"', "\\\""));
    } else {
        result.push_str(value);
    }
}

fn invalid_name_char(c: u8, result: &str, open: Option<&OpenReference>, pending: &str) -> String {
    let mut name = open
        .map(|reference| result[reference.start..].to_string())
        .unwrap_or_default();
    name.push_str(pending);
    format!(
        "Invalid character ('{}') in a variable name: '{}'",
        c as char, name
    )
}

/// Splits a `;`-list into elements, honoring `\;` escapes and `[...]`
/// nesting. Empty elements are kept only when `keep_empty` is set.
pub fn expand_list(value: &str, out: &mut Vec<String>, keep_empty: bool) {
    if value.is_empty() {
        if keep_empty {
            out.push(String::new());
        }
        return;
    }
    if !value.contains(|c| matches!(c, ';' | '[' | ']' | '\\')) {
        out.push(value.to_string());
        return;
    }
    let mut element = String::new();
    let mut square = 0usize;
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                match chars.next() {
                    Some(';') => element.push(';'),
                    Some(other) => {
                        element.push('\\');
                        element.push(other);
                    }
                    None => element.push('\\'),
                }
            }
            '[' => {
                square += 1;
                element.push(c);
            }
            ']' => {
                square = square.saturating_sub(1);
                element.push(c);
            }
            ';' if square == 0 => {
                if keep_empty || !element.is_empty() {
                    out.push(std::mem::take(&mut element));
                }
            }
            _ => element.push(c),
        }
    }
    if keep_empty || !element.is_empty() {
        out.push(element);
    }
}

pub fn split_list(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    expand_list(value, &mut out, false);
    out
}

pub fn split_list_keep_empty(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    expand_list(value, &mut out, true);
    out
}

pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| item.as_ref())
        .collect::<Vec<_>>()
        .join(";")
}

/// True for the constants the language treats as boolean false.
pub fn is_off(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let upper = value.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "0" | "OFF" | "NO" | "FALSE" | "N" | "IGNORE" | "NOTFOUND"
    ) || upper.ends_with("-NOTFOUND")
}

/// True only for the explicit boolean-true constants.
pub fn is_on(value: &str) -> bool {
    let upper = value.to_ascii_uppercase();
    matches!(upper.as_str(), "1" | "ON" | "YES" | "TRUE" | "Y")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Vars {
        normal: HashMap<String, String>,
        env: HashMap<String, String>,
    }

    impl VariableSource for Vars {
        fn variable(&self, name: &str) -> Option<String> {
            self.normal.get(name).cloned()
        }

        fn cache_variable(&self, _name: &str) -> Option<String> {
            None
        }

        fn env_variable(&self, name: &str) -> Option<String> {
            self.env.get(name).cloned()
        }
    }

    fn vars() -> Vars {
        let mut vars = Vars::default();
        vars.normal.insert("A".into(), "alpha".into());
        vars.normal.insert("NAME".into(), "A".into());
        vars.env.insert("HOME".into(), "/home/me".into());
        vars
    }

    fn expand(source: &str) -> Result<String, String> {
        expand_variables(source, &vars(), ExpandOptions::default())
    }

    #[test]
    fn expands_nested_references() {
        assert_eq!(expand("x${A}y").expect("expand"), "xalphay");
        assert_eq!(expand("${${NAME}}").expect("expand"), "alpha");
        assert_eq!(expand("$ENV{HOME}/x").expect("expand"), "/home/me/x");
        assert_eq!(expand("${MISSING}").expect("expand"), "");
        assert_eq!(expand("cost $5").expect("expand"), "cost $5");
    }

    #[test]
    fn processes_escapes() {
        assert_eq!(expand("a\\tb").expect("expand"), "a\tb");
        assert_eq!(expand("a\\;b").expect("expand"), "a\\;b");
        assert_eq!(expand("a\\\"b\\$").expect("expand"), "a\"b$");
        assert!(expand("\\q").is_err());
    }

    #[test]
    fn reports_malformed_references() {
        assert_eq!(
            expand("${A").expect_err("unterminated"),
            "There is an unterminated variable reference."
        );
        let err = expand("${A B}").expect_err("bad char");
        assert!(err.contains("Invalid character (' ')"));
    }

    #[test]
    fn replaces_at_references_when_asked() {
        let options = ExpandOptions {
            at_only: true,
            ..ExpandOptions::default()
        };
        assert_eq!(
            expand_variables("@A@ ${A} a@b", &vars(), options).expect("expand"),
            "alpha ${A} a@b"
        );
    }

    #[test]
    fn escapes_quotes_in_substituted_values() {
        let mut vars = vars();
        vars.normal.insert("Q".into(), "say \"hi\"".into());
        let options = ExpandOptions {
            replace_at: true,
            no_escapes: true,
            escape_quotes: true,
            ..ExpandOptions::default()
        };
        assert_eq!(
            expand_variables("${Q}|@Q@|\"", &vars, options).expect("expand"),
            "say \\\"hi\\\"|say \\\"hi\\\"|\""
        );
    }

    #[test]
    fn splits_lists() {
        assert_eq!(split_list("a;;b"), vec!["a", "b"]);
        assert_eq!(split_list_keep_empty("a;;b"), vec!["a", "", "b"]);
        assert_eq!(split_list("a\\;b;[c;d]"), vec!["a;b", "[c;d]"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn boolean_constants() {
        assert!(is_off("FOO-NOTFOUND"));
        assert!(is_off(""));
        assert!(is_on("yes"));
        assert!(!is_on("2"));
        assert!(!is_on("maybe"));
    }
}
