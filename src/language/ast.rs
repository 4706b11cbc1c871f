use std::fmt;
use std::path::Path;

/// How an argument was written in the source file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delimiter {
    Unquoted,
    Quoted,
    Bracket,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListFileArgument {
    pub value: String,
    pub delim: Delimiter,
    pub line: usize,
}

impl ListFileArgument {
    pub fn new(value: impl Into<String>, delim: Delimiter, line: usize) -> Self {
        Self {
            value: value.into(),
            delim,
            line,
        }
    }

    pub fn unquoted(value: impl Into<String>, line: usize) -> Self {
        Self::new(value, Delimiter::Unquoted, line)
    }

    pub fn quoted(value: impl Into<String>, line: usize) -> Self {
        Self::new(value, Delimiter::Quoted, line)
    }
}

/// One command invocation as parsed from a list file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListFileFunction {
    original_name: String,
    lower_name: String,
    line: usize,
    line_end: usize,
    arguments: Vec<ListFileArgument>,
}

impl ListFileFunction {
    pub fn new(
        name: impl Into<String>,
        line: usize,
        line_end: usize,
        arguments: Vec<ListFileArgument>,
    ) -> Self {
        let original_name = name.into();
        let lower_name = original_name.to_ascii_lowercase();
        Self {
            original_name,
            lower_name,
            line,
            line_end,
            arguments,
        }
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn lower_name(&self) -> &str {
        &self.lower_name
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn line_end(&self) -> usize {
        self.line_end
    }

    pub fn arguments(&self) -> &[ListFileArgument] {
        &self.arguments
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFile {
    pub path: String,
    pub functions: Vec<ListFileFunction>,
}

/// Marks a context frame that stands for deferred execution of a file.
pub const DEFERRED_LINE: usize = usize::MAX;

/// A location in a list file, attached to every frame of the call stack.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFileContext {
    pub name: String,
    pub file_path: String,
    pub line: usize,
}

impl ListFileContext {
    pub fn new(name: impl Into<String>, file_path: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            file_path: file_path.into(),
            line,
        }
    }

    /// Frame for a whole file without a specific command.
    pub fn file(file_path: impl Into<String>) -> Self {
        Self::new("", file_path, 0)
    }

    pub fn deferred(file_path: impl Into<String>) -> Self {
        Self::new("", file_path, DEFERRED_LINE)
    }

    pub fn from_function(function: &ListFileFunction, file_path: impl Into<String>) -> Self {
        Self::new(function.original_name(), file_path, function.line())
    }

    pub fn is_deferred(&self) -> bool {
        self.line == DEFERRED_LINE
    }

    /// Renders the context with its path shown relative to `top` when possible.
    pub fn display_relative(&self, top: Option<&Path>) -> String {
        let path = relative_path(&self.file_path, top);
        let mut out = path;
        if self.is_deferred() {
            out.push_str(":DEFERRED");
        } else if self.line > 0 {
            out.push_str(&format!(":{}", self.line));
        }
        if !self.name.is_empty() {
            out.push_str(&format!(" ({})", self.name));
        }
        out
    }
}

impl fmt::Display for ListFileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_relative(None))
    }
}

fn relative_path(path: &str, top: Option<&Path>) -> String {
    if let Some(top) = top {
        if let Ok(relative) = Path::new(path).strip_prefix(top) {
            return relative.to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

/// Stack of contexts, innermost last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Backtrace {
    frames: Vec<ListFileContext>,
}

impl Backtrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: ListFileContext) {
        self.frames.push(context);
    }

    pub fn pop(&mut self) -> Option<ListFileContext> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&ListFileContext> {
        self.frames.last()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Frames from innermost to outermost.
    pub fn frames(&self) -> impl Iterator<Item = &ListFileContext> {
        self.frames.iter().rev()
    }

    pub fn with_top(&self, context: ListFileContext) -> Self {
        let mut copy = self.clone();
        copy.push(context);
        copy
    }

    /// Callers of the innermost frame, skipping bare file frames that repeat
    /// the file of the frame below them.
    pub fn call_stack(&self, top: Option<&Path>) -> Vec<String> {
        let mut lines = Vec::new();
        let mut frames = self.frames();
        let Some(first) = frames.next() else {
            return lines;
        };
        let mut previous_file = first.file_path.as_str();
        for frame in frames {
            if frame.name.is_empty() && !frame.is_deferred() && frame.file_path == previous_file {
                continue;
            }
            previous_file = frame.file_path.as_str();
            lines.push(frame.display_relative(top));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_names_are_lowercased_for_lookup() {
        let function = ListFileFunction::new("Message", 3, 3, Vec::new());
        assert_eq!(function.original_name(), "Message");
        assert_eq!(function.lower_name(), "message");
    }

    #[test]
    fn context_renders_line_and_name() {
        let context = ListFileContext::new("set", "/src/CMakeLists.txt", 7);
        assert_eq!(context.to_string(), "/src/CMakeLists.txt:7 (set)");
        assert_eq!(
            context.display_relative(Some(Path::new("/src"))),
            "CMakeLists.txt:7 (set)"
        );
        assert_eq!(
            ListFileContext::deferred("/src/a.cmake").to_string(),
            "/src/a.cmake:DEFERRED"
        );
    }

    #[test]
    fn call_stack_skips_repeated_file_frames() {
        let mut backtrace = Backtrace::new();
        backtrace.push(ListFileContext::file("/src/CMakeLists.txt"));
        backtrace.push(ListFileContext::new("f", "/src/CMakeLists.txt", 9));
        backtrace.push(ListFileContext::new("message", "/src/CMakeLists.txt", 2));
        let stack = backtrace.call_stack(None);
        assert_eq!(stack, vec!["/src/CMakeLists.txt:9 (f)".to_string()]);
    }
}
