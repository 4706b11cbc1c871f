/// How the engine was started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkingMode {
    /// Configuring a source tree rooted at a `CMakeLists.txt`.
    #[default]
    Normal,
    /// Running a single script with `-P`.
    Script,
}

/// Verbosity threshold for `message()`, most severe first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warning,
    Notice,
    #[default]
    Status,
    Verbose,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_uppercase().as_str() {
            "ERROR" => Some(LogLevel::Error),
            "WARNING" => Some(LogLevel::Warning),
            "NOTICE" => Some(LogLevel::Notice),
            "STATUS" => Some(LogLevel::Status),
            "VERBOSE" => Some(LogLevel::Verbose),
            "DEBUG" => Some(LogLevel::Debug),
            "TRACE" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Notice => "NOTICE",
            LogLevel::Status => "STATUS",
            LogLevel::Verbose => "VERBOSE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WarningOptions {
    pub suppress_dev: bool,
    pub dev_as_errors: bool,
    pub suppress_deprecated: bool,
    pub deprecated_as_errors: bool,
}

#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub recursion_limit: usize,
    pub mode: WorkingMode,
    pub trace: bool,
    /// `--log-level`; overrides `CMAKE_MESSAGE_LOG_LEVEL` when set.
    pub log_level: Option<LogLevel>,
    pub warnings: WarningOptions,
    /// `NAME=VALUE` or `NAME:TYPE=VALUE` cache entries seeded before running.
    pub cache_entries: Vec<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            recursion_limit: 1000,
            mode: WorkingMode::Normal,
            trace: false,
            log_level: None,
            warnings: WarningOptions::default(),
            cache_entries: Vec::new(),
        }
    }
}

impl EngineOptions {
    pub fn script() -> Self {
        Self {
            mode: WorkingMode::Script,
            ..Self::default()
        }
    }

    /// Applies a `-W` style flag. Returns false for flags it does not know.
    pub fn apply_warning_flag(&mut self, flag: &str) -> bool {
        match flag {
            "-Wdev" => self.warnings.suppress_dev = false,
            "-Wno-dev" => self.warnings.suppress_dev = true,
            "-Werror=dev" => {
                self.warnings.suppress_dev = false;
                self.warnings.dev_as_errors = true;
            }
            "-Wno-error=dev" => self.warnings.dev_as_errors = false,
            "-Wdeprecated" => self.warnings.suppress_deprecated = false,
            "-Wno-deprecated" => self.warnings.suppress_deprecated = true,
            "-Werror=deprecated" => {
                self.warnings.suppress_deprecated = false;
                self.warnings.deprecated_as_errors = true;
            }
            "-Wno-error=deprecated" => self.warnings.deprecated_as_errors = false,
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let options = EngineOptions::default();
        assert_eq!(options.recursion_limit, 1000);
        assert_eq!(options.mode, WorkingMode::Normal);
        assert_eq!(EngineOptions::script().mode, WorkingMode::Script);
    }

    #[test]
    fn warning_flags_toggle_options() {
        let mut options = EngineOptions::default();
        assert!(options.apply_warning_flag("-Werror=dev"));
        assert!(options.warnings.dev_as_errors);
        assert!(options.apply_warning_flag("-Wno-deprecated"));
        assert!(options.warnings.suppress_deprecated);
        assert!(!options.apply_warning_flag("-Wbogus"));
    }

    #[test]
    fn log_levels_order_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Status);
        assert!(LogLevel::Trace > LogLevel::Debug);
        assert_eq!(LogLevel::parse("verbose"), Some(LogLevel::Verbose));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogLevel::default().as_str(), "STATUS");
    }
}
