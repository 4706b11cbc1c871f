use crate::language::{
    ast::{Delimiter, ListFile, ListFileArgument, ListFileFunction},
    errors::SyntaxError,
    span::Span,
};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, line_ending, satisfy},
    combinator::recognize,
    multi::many0_count,
    sequence::{delimited, pair},
};

pub fn parse_list_file(path: &str, source: &str) -> Result<ListFile, SyntaxError> {
    let parser = ListFileParser::new(source);
    let functions = parser.run()?;
    Ok(ListFile {
        path: path.to_string(),
        functions,
    })
}

fn spaces(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c == ' ' || c == '\t')(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn bracket_open(input: &str) -> IResult<&str, usize> {
    delimited(char('['), many0_count(char('=')), char('['))(input)
}

fn newline(input: &str) -> IResult<&str, &str> {
    alt((line_ending, tag("\r")))(input)
}

fn split_bracket_body(input: &str, level: usize) -> Option<(&str, &str)> {
    let close = format!("]{}]", "=".repeat(level));
    let pos = input.find(&close)?;
    Some((&input[..pos], &input[pos + close.len()..]))
}

struct ListFileParser<'a> {
    source: &'a str,
    rest: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> ListFileParser<'a> {
    fn new(source: &'a str) -> Self {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .char_indices()
                .filter(|(_, c)| *c == '\n')
                .map(|(idx, _)| idx + 1),
        );
        Self {
            source,
            rest: source,
            line_starts,
        }
    }

    fn run(mut self) -> Result<Vec<ListFileFunction>, SyntaxError> {
        let mut functions = Vec::new();
        loop {
            self.skip_separation(true)?;
            if self.rest.is_empty() {
                break;
            }
            functions.push(self.parse_command()?);
            self.expect_line_end()?;
        }
        Ok(functions)
    }

    fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    fn line_at(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    fn error_at(&self, message: impl Into<String>, start: usize, end: usize) -> SyntaxError {
        let end = end.max(start).min(self.source.len());
        SyntaxError::new(message, Span::new(start, end), self.line_at(start))
    }

    fn skip_separation(&mut self, newlines: bool) -> Result<(), SyntaxError> {
        loop {
            if let Ok((rest, _)) = spaces(self.rest) {
                self.rest = rest;
                continue;
            }
            if newlines {
                if let Ok((rest, _)) = newline(self.rest) {
                    self.rest = rest;
                    continue;
                }
            }
            if self.rest.starts_with('#') {
                self.skip_comment()?;
                continue;
            }
            return Ok(());
        }
    }

    fn skip_comment(&mut self) -> Result<(), SyntaxError> {
        let start = self.offset();
        let body = &self.rest[1..];
        if let Ok((after_open, level)) = bracket_open(body) {
            match split_bracket_body(after_open, level) {
                Some((_, rest)) => self.rest = rest,
                None => {
                    return Err(self
                        .error_at(
                            "Parse error.  Unterminated bracket comment.",
                            start,
                            self.source.len(),
                        )
                        .with_label("comment starts here"));
                }
            }
            return Ok(());
        }
        let end = body.find(|c| c == '\n' || c == '\r').unwrap_or(body.len());
        self.rest = &body[end..];
        Ok(())
    }

    fn describe_token(&self) -> String {
        let rest = self.rest;
        let word_end = rest
            .find(|c: char| c.is_whitespace() || c == '(' || c == ')')
            .unwrap_or(rest.len());
        match rest.chars().next() {
            None => "end of file".into(),
            Some('(') => "left paren with text \"(\"".into(),
            Some(')') => "right paren with text \")\"".into(),
            Some('\n') | Some('\r') => "newline".into(),
            Some('"') => "quoted argument".into(),
            Some('[') if bracket_open(rest).is_ok() => "bracket argument".into(),
            Some(_) => {
                let text_end = if word_end == 0 {
                    rest.chars().next().map(char::len_utf8).unwrap_or(0)
                } else {
                    word_end
                };
                let text = &rest[..text_end];
                if identifier(text).map(|(r, _)| r.is_empty()).unwrap_or(false) {
                    format!("identifier with text \"{text}\"")
                } else {
                    format!("unquoted argument with text \"{text}\"")
                }
            }
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let start = self.offset();
        self.error_at(
            format!("Parse error.  {expected}, got {}.", self.describe_token()),
            start,
            start + 1,
        )
    }

    fn parse_command(&mut self) -> Result<ListFileFunction, SyntaxError> {
        let start = self.offset();
        let line = self.line_at(start);
        let Ok((rest, name)) = identifier(self.rest) else {
            return Err(self
                .unexpected("Expected a command name")
                .with_help("each command must be written as `name(arguments)`"));
        };
        self.rest = rest;
        if let Ok((rest, _)) = spaces(self.rest) {
            self.rest = rest;
        }
        match char::<&str, nom::error::Error<&str>>('(')(self.rest) {
            Ok((rest, _)) => self.rest = rest,
            Err(_) => {
                return Err(self
                    .unexpected(&format!("Expected \"(\" after command \"{name}\""))
                    .with_label("missing argument list"));
            }
        }
        let arguments = self.parse_arguments(start)?;
        let line_end = self.line_at(self.offset().saturating_sub(1));
        Ok(ListFileFunction::new(name, line, line_end, arguments))
    }

    fn parse_arguments(&mut self, command_start: usize) -> Result<Vec<ListFileArgument>, SyntaxError> {
        let mut arguments = Vec::new();
        let mut depth = 0usize;
        loop {
            self.skip_separation(true)?;
            let line = self.line_at(self.offset());
            let Some(ch) = self.rest.chars().next() else {
                return Err(self
                    .error_at(
                        "Parse error.  Function missing ending \")\".  End of file reached.",
                        command_start,
                        self.source.len(),
                    )
                    .with_label("command starts here"));
            };
            match ch {
                ')' => {
                    self.rest = &self.rest[1..];
                    if depth == 0 {
                        return Ok(arguments);
                    }
                    depth -= 1;
                    arguments.push(ListFileArgument::unquoted(")", line));
                }
                '(' => {
                    self.rest = &self.rest[1..];
                    depth += 1;
                    arguments.push(ListFileArgument::unquoted("(", line));
                }
                '"' => arguments.push(self.parse_quoted(line)?),
                '[' if bracket_open(self.rest).is_ok() => arguments.push(self.parse_bracket(line)?),
                _ => arguments.push(self.parse_unquoted(line)?),
            }
        }
    }

    fn unterminated(&self, start: usize, what: &str) -> SyntaxError {
        let text: String = self.source[start..].chars().take(40).collect();
        self.error_at(
            format!(
                "Parse error.  Function missing ending \")\".  Instead found unterminated {what} with text \"{text}\"."
            ),
            start,
            self.source.len(),
        )
        .with_label(format!("{what} starts here"))
    }

    fn parse_quoted(&mut self, line: usize) -> Result<ListFileArgument, SyntaxError> {
        let start = self.offset();
        let body = &self.rest[1..];
        let mut value = String::new();
        let mut chars = body.char_indices().peekable();
        while let Some((idx, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.rest = &body[idx + 1..];
                    return Ok(ListFileArgument::new(value, Delimiter::Quoted, line));
                }
                '\\' => match chars.next() {
                    // escaped newline continues the line
                    Some((_, '\n')) => {}
                    Some((_, '\r')) => {
                        if matches!(chars.peek(), Some((_, '\n'))) {
                            chars.next();
                        }
                    }
                    Some((_, escaped)) => {
                        value.push('\\');
                        value.push(escaped);
                    }
                    None => break,
                },
                _ => value.push(ch),
            }
        }
        Err(self.unterminated(start, "string"))
    }

    fn parse_unquoted(&mut self, line: usize) -> Result<ListFileArgument, SyntaxError> {
        let start = self.offset();
        let input = self.rest;
        let mut value = String::new();
        let mut end = input.len();
        let mut chars = input.char_indices().peekable();
        while let Some(&(idx, ch)) = chars.peek() {
            match ch {
                c if c.is_whitespace() || c == '(' || c == ')' || c == '#' => {
                    end = idx;
                    break;
                }
                '\\' => {
                    chars.next();
                    value.push('\\');
                    if let Some((_, escaped)) = chars.next() {
                        value.push(escaped);
                    }
                }
                '"' => {
                    // legacy unquoted arguments may embed a quoted span
                    chars.next();
                    value.push('"');
                    loop {
                        match chars.next() {
                            Some((_, '"')) => {
                                value.push('"');
                                break;
                            }
                            Some((_, '\\')) => {
                                value.push('\\');
                                if let Some((_, escaped)) = chars.next() {
                                    value.push(escaped);
                                }
                            }
                            Some((_, c)) => value.push(c),
                            None => return Err(self.unterminated(start, "string")),
                        }
                    }
                }
                _ => {
                    chars.next();
                    value.push(ch);
                }
            }
        }
        self.rest = &input[end..];
        Ok(ListFileArgument::new(value, Delimiter::Unquoted, line))
    }

    fn parse_bracket(&mut self, line: usize) -> Result<ListFileArgument, SyntaxError> {
        let start = self.offset();
        let Ok((after_open, level)) = bracket_open(self.rest) else {
            return Err(self.unexpected("Expected a bracket argument"));
        };
        let Some((content, rest)) = split_bracket_body(after_open, level) else {
            return Err(self.unterminated(start, "bracket"));
        };
        let content = content
            .strip_prefix("\r\n")
            .or_else(|| content.strip_prefix('\n'))
            .unwrap_or(content);
        self.rest = rest;
        Ok(ListFileArgument::new(content, Delimiter::Bracket, line))
    }

    fn expect_line_end(&mut self) -> Result<(), SyntaxError> {
        self.skip_separation(false)?;
        if self.rest.is_empty() {
            return Ok(());
        }
        if let Ok((rest, _)) = newline(self.rest) {
            self.rest = rest;
            return Ok(());
        }
        Err(self.unexpected("Expected a newline"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<ListFileFunction> {
        parse_list_file("test.cmake", source).expect("parse").functions
    }

    fn values(function: &ListFileFunction) -> Vec<&str> {
        function.arguments().iter().map(|arg| arg.value.as_str()).collect()
    }

    #[test]
    fn parses_commands_with_lines() {
        let functions = parse("set(A 1)\n\n  message(STATUS \"hi\")\n");
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].lower_name(), "set");
        assert_eq!(values(&functions[0]), vec!["A", "1"]);
        assert_eq!(functions[1].line(), 3);
        assert_eq!(functions[1].arguments()[1].delim, Delimiter::Quoted);
    }

    #[test]
    fn keeps_escapes_raw_and_joins_continued_lines() {
        let functions = parse("f(a\\;b \"x\\\ny\" \"q\\\"r\")");
        assert_eq!(values(&functions[0]), vec!["a\\;b", "xy", "q\\\"r"]);
    }

    #[test]
    fn bracket_arguments_drop_leading_newline() {
        let functions = parse("f([==[\nkeep ]] this]==] after)");
        let args = functions[0].arguments();
        assert_eq!(args[0].value, "keep ]] this");
        assert_eq!(args[0].delim, Delimiter::Bracket);
        assert_eq!(args[1].value, "after");
    }

    #[test]
    fn nested_parentheses_become_arguments() {
        let functions = parse("if((A AND B) OR C)\nendif()");
        assert_eq!(
            values(&functions[0]),
            vec!["(", "A", "AND", "B", ")", "OR", "C"]
        );
        assert_eq!(functions[1].lower_name(), "endif");
    }

    #[test]
    fn comments_are_skipped() {
        let functions = parse("# line\n#[[ block\ncomment ]] f(x # inside\n y)\n");
        assert_eq!(functions.len(), 1);
        assert_eq!(values(&functions[0]), vec!["x", "y"]);
        assert_eq!(functions[0].line(), 3);
        assert_eq!(functions[0].line_end(), 4);
    }

    #[test]
    fn legacy_unquoted_argument_keeps_quotes() {
        let functions = parse("f(-Da=\"b c\")");
        assert_eq!(values(&functions[0]), vec!["-Da=\"b c\""]);
    }

    #[test]
    fn missing_paren_reports_end_of_file() {
        let err = parse_list_file("t", "f(a b\n").expect_err("should fail");
        assert!(err.message.contains("missing ending"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn commands_must_end_their_line() {
        let err = parse_list_file("t", "f() g()").expect_err("should fail");
        assert!(err.message.contains("Expected a newline"));
    }

    #[test]
    fn command_name_must_be_an_identifier() {
        let err = parse_list_file("t", "\"oops\"()").expect_err("should fail");
        assert!(err.message.contains("Expected a command name"));
    }
}
