use crate::language::ast::Backtrace;
use crate::runtime::config::WarningOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    AuthorWarning,
    AuthorError,
    FatalError,
    InternalError,
    Warning,
    Log,
    DeprecationError,
    DeprecationWarning,
}

impl MessageType {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            MessageType::FatalError
                | MessageType::InternalError
                | MessageType::DeprecationError
                | MessageType::AuthorError
        )
    }

    fn title(self) -> &'static str {
        match self {
            MessageType::FatalError => "CMake Error",
            MessageType::InternalError => "CMake Internal Error (please report a bug)",
            MessageType::Log => "CMake Debug Log",
            MessageType::DeprecationError => "CMake Deprecation Error",
            MessageType::DeprecationWarning => "CMake Deprecation Warning",
            MessageType::AuthorWarning => "CMake Warning (dev)",
            MessageType::AuthorError => "CMake Error (dev)",
            MessageType::Warning => "CMake Warning",
        }
    }
}

/// Destination of everything a script prints.
pub trait OutputSink: Send {
    fn stdout(&mut self, text: &str);
    fn stderr(&mut self, text: &str);
}

pub struct ConsoleSink;

/// Writes and flushes `text`. A failure is logged, never raised.
fn write_console(mut stream: impl Write, text: &str, name: &str) -> bool {
    match stream.write_all(text.as_bytes()).and_then(|()| stream.flush()) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(stream = name, error = %err, "console write failed");
            false
        }
    }
}

impl OutputSink for ConsoleSink {
    fn stdout(&mut self, text: &str) {
        write_console(std::io::stdout().lock(), text, "stdout");
    }

    fn stderr(&mut self, text: &str) {
        write_console(std::io::stderr().lock(), text, "stderr");
    }
}

#[derive(Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

/// Records output in memory. Clones share one buffer.
#[derive(Clone, Default)]
pub struct CaptureSink {
    inner: Arc<Mutex<Captured>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn captured(&self) -> MutexGuard<'_, Captured> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stdout_text(&self) -> String {
        self.captured().stdout.clone()
    }

    pub fn stderr_text(&self) -> String {
        self.captured().stderr.clone()
    }
}

impl OutputSink for CaptureSink {
    fn stdout(&mut self, text: &str) {
        self.captured().stdout.push_str(text);
    }

    fn stderr(&mut self, text: &str) {
        self.captured().stderr.push_str(text);
    }
}

/// Formats diagnostics and routes them, with all other output, to a sink.
pub struct Messenger {
    sink: Box<dyn OutputSink>,
    top_source: Option<PathBuf>,
}

impl Messenger {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            top_source: None,
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn OutputSink>) {
        self.sink = sink;
    }

    /// Paths under this directory are printed relative to it.
    pub fn set_top_source(&mut self, top: Option<PathBuf>) {
        self.top_source = top;
    }

    pub fn convert(kind: MessageType, warnings: &WarningOptions) -> MessageType {
        match kind {
            MessageType::AuthorWarning if warnings.dev_as_errors => MessageType::AuthorError,
            MessageType::AuthorError if !warnings.dev_as_errors => MessageType::AuthorWarning,
            MessageType::DeprecationWarning if warnings.deprecated_as_errors => {
                MessageType::DeprecationError
            }
            MessageType::DeprecationError if !warnings.deprecated_as_errors => {
                MessageType::DeprecationWarning
            }
            other => other,
        }
    }

    pub fn is_visible(kind: MessageType, warnings: &WarningOptions) -> bool {
        match kind {
            MessageType::DeprecationError => warnings.deprecated_as_errors,
            MessageType::DeprecationWarning => !warnings.suppress_deprecated,
            MessageType::AuthorWarning => !warnings.suppress_dev,
            _ => true,
        }
    }

    /// Issues a diagnostic. Returns the type actually displayed, if any.
    pub fn issue(
        &mut self,
        kind: MessageType,
        text: &str,
        backtrace: &Backtrace,
        warnings: &WarningOptions,
    ) -> Option<MessageType> {
        let converted = Self::convert(kind, warnings);
        let forced = converted != kind;
        if !forced && !Self::is_visible(converted, warnings) {
            return None;
        }
        let formatted = self.format(converted, text, backtrace);
        self.sink.stderr(&formatted);
        Some(converted)
    }

    pub fn format(&self, kind: MessageType, text: &str, backtrace: &Backtrace) -> String {
        let top = self.top_source.as_deref();
        let mut out = String::from(kind.title());
        if let Some(context) = backtrace.top() {
            out.push_str(" at ");
            out.push_str(&context.display_relative(top));
        }
        out.push_str(":\n");
        out.push_str(&indent(text));
        let stack = backtrace.call_stack(top);
        if !stack.is_empty() {
            out.push_str("Call Stack (most recent call first):\n");
            for line in stack {
                out.push_str("  ");
                out.push_str(&line);
                out.push('\n');
            }
        }
        match kind {
            MessageType::AuthorWarning => out.push_str(
                "This warning is for project developers.  Use -Wno-dev to suppress it.\n",
            ),
            MessageType::AuthorError => out.push_str(
                "This error is for project developers. Use -Wno-error=dev to suppress it.\n",
            ),
            _ => {}
        }
        out.push('\n');
        out
    }

    pub fn write_stdout(&mut self, text: &str) {
        self.sink.stdout(text);
    }

    pub fn write_stderr(&mut self, text: &str) {
        self.sink.stderr(text);
    }
}

fn indent(text: &str) -> String {
    let mut out = String::new();
    for line in text.trim_end_matches('\n').split('\n') {
        if !line.is_empty() {
            out.push_str("  ");
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ast::ListFileContext;

    fn messenger() -> (Messenger, CaptureSink) {
        let sink = CaptureSink::new();
        (Messenger::new(Box::new(sink.clone())), sink)
    }

    #[test]
    fn formats_error_with_call_stack() {
        let (mut messenger, sink) = messenger();
        let mut backtrace = Backtrace::new();
        backtrace.push(ListFileContext::new("f", "/p/CMakeLists.txt", 5));
        backtrace.push(ListFileContext::new("message", "/p/CMakeLists.txt", 2));
        messenger.set_top_source(Some(PathBuf::from("/p")));
        let shown = messenger.issue(
            MessageType::FatalError,
            "boom\nsecond",
            &backtrace,
            &WarningOptions::default(),
        );
        assert_eq!(shown, Some(MessageType::FatalError));
        assert_eq!(
            sink.stderr_text(),
            "CMake Error at CMakeLists.txt:2 (message):\n  boom\n  second\nCall Stack (most recent call first):\n  CMakeLists.txt:5 (f)\n\n"
        );
    }

    #[test]
    fn author_warnings_carry_suppression_note() {
        let (mut messenger, sink) = messenger();
        messenger.issue(
            MessageType::AuthorWarning,
            "careful",
            &Backtrace::new(),
            &WarningOptions::default(),
        );
        assert_eq!(
            sink.stderr_text(),
            "CMake Warning (dev):\n  careful\nThis warning is for project developers.  Use -Wno-dev to suppress it.\n\n"
        );
    }

    #[test]
    fn warning_options_convert_and_hide() {
        let (mut messenger, sink) = messenger();
        let errors = WarningOptions {
            dev_as_errors: true,
            ..WarningOptions::default()
        };
        assert_eq!(
            messenger.issue(MessageType::AuthorWarning, "x", &Backtrace::new(), &errors),
            Some(MessageType::AuthorError)
        );
        let quiet = WarningOptions {
            suppress_dev: true,
            ..WarningOptions::default()
        };
        sink.captured().stderr.clear();
        assert_eq!(
            messenger.issue(MessageType::AuthorWarning, "x", &Backtrace::new(), &quiet),
            None
        );
        assert!(sink.stderr_text().is_empty());
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn console_write_failures_are_reported_not_raised() {
        assert!(!write_console(ClosedPipe, "lost", "stdout"));
        assert!(write_console(Vec::new(), "kept", "stdout"));
    }
}
