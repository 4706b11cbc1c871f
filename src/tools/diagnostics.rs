use crate::{language::errors::SyntaxError, runtime::error::RuntimeError};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource, err: SyntaxError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: format!("{} (line {})", err.message, err.line),
            label: err.label,
        }
    }
}

/// Renders every syntax error of one list file.
pub fn render_syntax_errors(path: &str, source: &str, errors: &[SyntaxError]) -> Vec<String> {
    errors
        .iter()
        .map(|err| {
            let src = NamedSource::new(path, source.to_string());
            let diagnostic = SyntaxDiagnostic::from_error(src, err.clone());
            format!("{:?}", Report::new(diagnostic))
        })
        .collect()
}

pub fn report_runtime_error(error: &RuntimeError) {
    match error {
        RuntimeError::Syntax {
            path,
            source_text,
            errors,
        } => {
            for rendered in render_syntax_errors(path, source_text, errors) {
                eprintln!("{rendered}");
            }
        }
        other => eprintln!("CMake Error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::span::Span;

    #[test]
    fn renders_message_and_line() {
        let err = SyntaxError::new("Parse error.  Expected a command name", Span::new(0, 3), 1);
        let rendered = render_syntax_errors("CMakeLists.txt", "(((", &[err]);
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].contains("Expected a command name (line 1)"));
    }
}
