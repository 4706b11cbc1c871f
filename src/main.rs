use clap::Parser;
use listscript::runtime::{EngineOptions, Interpreter, LogLevel, RuntimeResult};
use listscript::tools::diagnostics::report_runtime_error;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "listscript", version, about = "Runs CMake list files")]
struct Cli {
    /// Process the given script file and exit.
    #[arg(short = 'P', value_name = "FILE", conflicts_with_all = ["source", "path"])]
    script: Option<PathBuf>,

    /// Source directory to configure.
    #[arg(short = 'S', value_name = "DIR")]
    source: Option<PathBuf>,

    /// Build directory; defaults to the working directory.
    #[arg(short = 'B', value_name = "DIR")]
    binary: Option<PathBuf>,

    /// Seeds a cache entry: NAME=VALUE or NAME:TYPE=VALUE.
    #[arg(short = 'D', value_name = "ENTRY")]
    defines: Vec<String>,

    /// Warning controls such as dev, no-dev, error=deprecated.
    #[arg(short = 'W', value_name = "FLAG")]
    warnings: Vec<String>,

    /// Print every command before it runs.
    #[arg(long)]
    trace: bool,

    /// Lowest message() level that is printed.
    #[arg(long, value_name = "LEVEL", value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Source directory, when -S is not given.
    path: Option<PathBuf>,
}

fn parse_log_level(text: &str) -> Result<LogLevel, String> {
    LogLevel::parse(text).ok_or_else(|| format!("invalid log level `{text}`"))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
}

fn run(cli: Cli) -> RuntimeResult<i32> {
    let mut options = if cli.script.is_some() {
        EngineOptions::script()
    } else {
        EngineOptions::default()
    };
    options.trace = cli.trace;
    options.log_level = cli.log_level;
    options.cache_entries = cli.defines;
    for flag in &cli.warnings {
        if !options.apply_warning_flag(&format!("-W{flag}")) {
            eprintln!("CMake Warning: ignoring unknown warning flag -W{flag}");
        }
    }

    let mut interp = Interpreter::new(options);
    if let Some(script) = cli.script {
        return interp.run_script(&script);
    }
    let source = cli
        .source
        .or(cli.path)
        .unwrap_or_else(|| PathBuf::from("."));
    let binary = cli.binary.unwrap_or_else(|| PathBuf::from("."));
    interp.configure(&source, &binary)
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code & 0xff).unwrap_or(1)),
        Err(err) => {
            report_runtime_error(&err);
            ExitCode::FAILURE
        }
    }
}
