//! End-to-end runs of whole scripts and source trees.

mod commands;
mod configure;
mod scopes;

use crate::runtime::{config::EngineOptions, interpreter::Interpreter, messenger::CaptureSink};

pub(crate) struct Outcome {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl Outcome {
    /// `message(STATUS)` lines without their `-- ` prefix.
    pub fn status_lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .filter_map(|line| line.strip_prefix("-- "))
            .collect()
    }
}

pub(crate) fn run_with(options: EngineOptions, source: &str) -> Outcome {
    let sink = CaptureSink::new();
    let mut interp = Interpreter::new(options).with_sink(Box::new(sink.clone()));
    let code = interp
        .run_script_source("/virtual/script.cmake", source)
        .expect("script parses");
    Outcome {
        stdout: sink.stdout_text(),
        stderr: sink.stderr_text(),
        code,
    }
}

pub(crate) fn run_script(source: &str) -> Outcome {
    run_with(EngineOptions::script(), source)
}
