use crate::commands;
use crate::language::{
    ast::{Backtrace, Delimiter, ListFile, ListFileArgument, ListFileContext, ListFileFunction},
    expand::{expand_list, expand_variables, is_on, ExpandOptions, VariableSource},
    parser::parse_list_file,
};
use crate::runtime::{
    blocker::{BlockerStack, FunctionBlocker, Interception},
    cache::CacheEntryType,
    config::{EngineOptions, LogLevel, WarningOptions, WorkingMode},
    error::{RuntimeError, RuntimeResult},
    messenger::{ConsoleSink, MessageType, Messenger, OutputSink},
    platform::{collapse_full_path, parent_dir, Platform, StdPlatform},
    policies::{PolicyId, PolicyMap, PolicyStatus, Version, ENGINE_VERSION},
    state::{SnapshotId, State},
    status::ExecutionStatus,
};
use crate::target::TargetRegistry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// An argument after expansion, remembering whether it was quoted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpandedArgument {
    pub value: String,
    pub quoted: bool,
}

impl ExpandedArgument {
    pub fn new(value: impl Into<String>, quoted: bool) -> Self {
        Self {
            value: value.into(),
            quoted,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeferCommand {
    pub id: String,
    pub file_path: String,
    pub function: ListFileFunction,
}

struct Makefile {
    snapshot: SnapshotId,
    defer: Option<Vec<DeferCommand>>,
}

/// Handle for a pushed snapshot, handed back to the matching pop.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeHandle(Option<SnapshotId>);

/// Deeply nested function calls and includes recurse on the native stack,
/// so every run gets a thread with room for the full recursion limit.
const ENGINE_STACK_SIZE: usize = 256 * 1024 * 1024;

/// The execution engine: owns all state of one configure or script run.
pub struct Interpreter {
    state: State,
    options: EngineOptions,
    platform: Box<dyn Platform>,
    messenger: Messenger,
    makefiles: Vec<Makefile>,
    current: usize,
    backtrace: Backtrace,
    recursion_depth: usize,
    blockers: BlockerStack,
    loop_blocks: Vec<usize>,
    nested_errors: Vec<bool>,
    targets: TargetRegistry,
    check_stack: Vec<String>,
    cmp0054_reported: HashSet<String>,
    fatal_error: bool,
    error_occurred: bool,
    exit_code: Option<i32>,
}

impl VariableSource for Interpreter {
    fn variable(&self, name: &str) -> Option<String> {
        self.definition(name).map(str::to_string)
    }

    fn cache_variable(&self, name: &str) -> Option<String> {
        self.state.cache.value(name).map(str::to_string)
    }

    fn env_variable(&self, name: &str) -> Option<String> {
        self.platform.env_get(name)
    }
}

impl Interpreter {
    pub fn new(options: EngineOptions) -> Self {
        let mut state = State::new();
        commands::register_builtins(&mut state.commands, options.mode);
        let snapshot = state.create_base_snapshot();
        let mut interp = Self {
            state,
            options,
            platform: Box::new(StdPlatform::new()),
            messenger: Messenger::new(Box::new(ConsoleSink)),
            makefiles: vec![Makefile {
                snapshot,
                defer: None,
            }],
            current: 0,
            backtrace: Backtrace::new(),
            recursion_depth: 0,
            blockers: BlockerStack::new(),
            loop_blocks: vec![0],
            nested_errors: Vec::new(),
            targets: TargetRegistry::default(),
            check_stack: Vec::new(),
            cmp0054_reported: HashSet::new(),
            fatal_error: false,
            error_occurred: false,
            exit_code: None,
        };
        interp.seed_cache();
        interp
    }

    pub fn with_sink(mut self, sink: Box<dyn OutputSink>) -> Self {
        self.messenger.set_sink(sink);
        self
    }

    pub fn with_platform(mut self, platform: Box<dyn Platform>) -> Self {
        self.platform = platform;
        self
    }

    fn seed_cache(&mut self) {
        let warnings = self.options.warnings.clone();
        let seeded = [
            (warnings.suppress_dev, "CMAKE_SUPPRESS_DEVELOPER_WARNINGS", "TRUE"),
            (warnings.dev_as_errors, "CMAKE_SUPPRESS_DEVELOPER_ERRORS", "FALSE"),
            (warnings.suppress_deprecated, "CMAKE_WARN_DEPRECATED", "FALSE"),
            (warnings.deprecated_as_errors, "CMAKE_ERROR_DEPRECATED", "TRUE"),
        ];
        for (enabled, name, value) in seeded {
            if enabled {
                self.state
                    .cache
                    .add_entry(name, value, "", CacheEntryType::Internal);
            }
        }
        for entry in self.options.cache_entries.clone() {
            match parse_cache_entry(&entry) {
                Some((name, kind, value)) => self.state.cache.add_entry(
                    &name,
                    &value,
                    "No help, variable specified on the command line.",
                    kind,
                ),
                None => {
                    self.messenger.write_stderr(&format!(
                        "CMake Error: Parse error in command line argument: {entry}\nShould be: VAR:type=value\n"
                    ));
                    self.error_occurred = true;
                }
            }
        }
    }

    // Entry points

    /// Runs a single script file, as `-P` does.
    #[tracing::instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn run_script(&mut self, path: &Path) -> RuntimeResult<i32> {
        let cwd = self.platform.current_dir();
        let full = collapse_full_path(&path.to_string_lossy(), &cwd);
        let source = self
            .platform
            .fs_read(&full)
            .map_err(|message| RuntimeError::Io {
                path: full.clone(),
                message,
            })?;
        self.run_script_source(&full, &source)
    }

    /// Runs `source` as if it were the script file at `path`.
    pub fn run_script_source(&mut self, path: &str, source: &str) -> RuntimeResult<i32> {
        self.on_engine_stack(|interp| interp.run_script_text(path, source))
    }

    fn run_script_text(&mut self, path: &str, source: &str) -> RuntimeResult<i32> {
        let list_file = parse_list_file(path, source).map_err(|err| RuntimeError::Syntax {
            path: path.to_string(),
            source_text: source.to_string(),
            errors: vec![err],
        })?;
        let cwd = self.platform.current_dir();
        let snapshot = self.current_snapshot();
        self.state.set_directory_locations(snapshot, &cwd, &cwd);
        self.add_definition("CMAKE_SOURCE_DIR", &cwd);
        self.add_definition("CMAKE_BINARY_DIR", &cwd);
        if self.options.mode == WorkingMode::Script {
            self.add_definition("CMAKE_SCRIPT_MODE_FILE", path);
        }
        self.messenger.set_top_source(Some(PathBuf::from(&cwd)));

        self.makefiles[self.current].defer = Some(Vec::new());
        self.backtrace.push(ListFileContext::file(path));
        let scope = self.push_snapshot(|state, origin| {
            state.create_inline_list_file_snapshot(origin, path)
        });
        self.blockers.push_barrier();
        self.run_list_file(&list_file, path, true);
        let report = !self.fatal_error;
        self.pop_function_blocker_barrier(report);
        self.pop_snapshot(scope, report);
        self.backtrace.pop();
        self.makefiles[self.current].defer = None;
        Ok(self.final_exit_code())
    }

    /// Configures the source tree rooted at `source_dir`.
    #[tracing::instrument(level = "debug", skip(self), fields(source = %source_dir.display()))]
    pub fn configure(&mut self, source_dir: &Path, binary_dir: &Path) -> RuntimeResult<i32> {
        self.on_engine_stack(|interp| interp.configure_tree(source_dir, binary_dir))
    }

    fn configure_tree(&mut self, source_dir: &Path, binary_dir: &Path) -> RuntimeResult<i32> {
        let cwd = self.platform.current_dir();
        let source = collapse_full_path(&source_dir.to_string_lossy(), &cwd);
        let binary = collapse_full_path(&binary_dir.to_string_lossy(), &cwd);
        let list_path = format!("{source}/CMakeLists.txt");
        let text = self
            .platform
            .fs_read(&list_path)
            .map_err(|message| RuntimeError::Io {
                path: list_path.clone(),
                message,
            })?;
        let list_file = parse_list_file(&list_path, &text).map_err(|err| RuntimeError::Syntax {
            path: list_path.clone(),
            source_text: text.clone(),
            errors: vec![err],
        })?;
        let snapshot = self.current_snapshot();
        self.state.set_directory_locations(snapshot, &source, &binary);
        self.add_definition("CMAKE_SOURCE_DIR", &source);
        self.add_definition("CMAKE_BINARY_DIR", &binary);
        self.messenger.set_top_source(Some(PathBuf::from(&source)));
        self.configure_directory(&list_file, &list_path);
        Ok(self.final_exit_code())
    }

    /// Runs `run` on a scoped thread with [`ENGINE_STACK_SIZE`] of stack.
    /// A panic on that thread resumes on the caller's.
    fn on_engine_stack<T: Send>(&mut self, run: impl FnOnce(&mut Self) -> RuntimeResult<T> + Send) -> RuntimeResult<T> {
        std::thread::scope(|scope| {
            let worker = std::thread::Builder::new()
                .name("listscript-engine".into())
                .stack_size(ENGINE_STACK_SIZE)
                .spawn_scoped(scope, move || run(self))
                .map_err(|err| RuntimeError::Configure {
                    message: format!("could not start the interpreter thread: {err}"),
                })?;
            match worker.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            }
        })
    }

    fn configure_directory(&mut self, list_file: &ListFile, path: &str) {
        debug!(path, "configure directory");
        self.backtrace.push(ListFileContext::file(path));
        let snapshot = self.current_snapshot();
        self.state.set_list_file(snapshot, path);
        self.add_definition("CMAKE_PARENT_LIST_FILE", path);
        let scope = self.push_snapshot(|state, origin| state.create_policy_scope_snapshot(origin));
        self.blockers.push_barrier();
        self.makefiles[self.current].defer = Some(Vec::new());
        self.run_list_file(list_file, path, true);
        self.makefiles[self.current].defer = None;
        let report = !self.fatal_error;
        self.pop_function_blocker_barrier(report);
        self.pop_snapshot(scope, report);
        self.backtrace.pop();
    }

    pub fn exit_code(&self) -> i32 {
        self.final_exit_code()
    }

    fn final_exit_code(&self) -> i32 {
        match self.exit_code {
            Some(code) => code,
            None if self.error_occurred || self.fatal_error => 1,
            None => 0,
        }
    }

    // Accessors

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn platform_mut(&mut self) -> &mut dyn Platform {
        self.platform.as_mut()
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut TargetRegistry {
        &mut self.targets
    }

    pub fn check_stack_mut(&mut self) -> &mut Vec<String> {
        &mut self.check_stack
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn execution_context(&self) -> ListFileContext {
        self.backtrace.top().cloned().unwrap_or_default()
    }

    pub fn current_snapshot(&self) -> SnapshotId {
        self.makefiles[self.current].snapshot
    }

    fn set_current_snapshot(&mut self, snapshot: SnapshotId) {
        self.makefiles[self.current].snapshot = snapshot;
    }

    pub fn execution_list_file(&self) -> &str {
        self.state.execution_list_file(self.current_snapshot())
    }

    pub fn current_source_dir(&self) -> String {
        self.state
            .directory(self.current_snapshot())
            .map(|dir| dir.location.clone())
            .unwrap_or_default()
    }

    pub fn current_binary_dir(&self) -> String {
        self.state
            .directory(self.current_snapshot())
            .map(|dir| dir.output_location.clone())
            .unwrap_or_default()
    }

    /// Current scope of every directory whose source location is `path`.
    pub fn directory_snapshot(&self, path: &str) -> Option<SnapshotId> {
        self.makefiles.iter().find_map(|makefile| {
            let dir = self.state.directory(makefile.snapshot)?;
            (dir.location == path).then_some(dir.current_scope)
        })
    }

    // Messages

    pub fn issue_message(&mut self, kind: MessageType, text: impl Into<String>) {
        let backtrace = self.backtrace.clone();
        self.issue_message_at(kind, text, &backtrace);
    }

    pub fn issue_message_at(&mut self, kind: MessageType, text: impl Into<String>, backtrace: &Backtrace) {
        let mut text = text.into();
        if matches!(kind, MessageType::FatalError | MessageType::InternalError) {
            if let Some(flag) = self.nested_errors.last_mut() {
                *flag = true;
            }
        }
        if kind == MessageType::InternalError {
            text.push_str(&format!(
                "\nNative backtrace:\n{}",
                std::backtrace::Backtrace::force_capture()
            ));
        }
        let warnings = self.warning_options();
        if let Some(shown) = self.messenger.issue(kind, &text, backtrace, &warnings) {
            if shown.is_error() {
                self.error_occurred = true;
            }
        }
    }

    fn warning_options(&self) -> WarningOptions {
        let flag = |name: &str| self.definition(name);
        WarningOptions {
            suppress_dev: flag("CMAKE_SUPPRESS_DEVELOPER_WARNINGS").is_some_and(is_on),
            dev_as_errors: flag("CMAKE_SUPPRESS_DEVELOPER_ERRORS")
                .is_some_and(crate::language::expand::is_off),
            suppress_deprecated: flag("CMAKE_WARN_DEPRECATED")
                .is_some_and(crate::language::expand::is_off),
            deprecated_as_errors: flag("CMAKE_ERROR_DEPRECATED").is_some_and(is_on),
        }
    }

    fn internal_error(&mut self, err: RuntimeError) {
        self.issue_message(MessageType::InternalError, err.to_string());
        self.set_fatal_error();
    }

    /// Records that the quoted-argument warning was shown for `context`.
    /// Returns false when it was already shown there.
    pub fn note_cmp0054_report(&mut self, context: &ListFileContext) -> bool {
        self.cmp0054_reported
            .insert(format!("{}:{}", context.file_path, context.line))
    }

    /// Prints a diagnostic as-is, without warning-option conversion and
    /// without marking the running command as failed.
    pub fn display_message(&mut self, kind: MessageType, text: &str) {
        let formatted = self.messenger.format(kind, text, &self.backtrace);
        self.messenger.write_stderr(&formatted);
        if kind.is_error() {
            self.error_occurred = true;
        }
    }

    /// Effective `message()` threshold: the command line wins over
    /// `CMAKE_MESSAGE_LOG_LEVEL`.
    pub fn log_level(&self) -> LogLevel {
        if let Some(level) = self.options.log_level {
            return level;
        }
        self.definition("CMAKE_MESSAGE_LOG_LEVEL")
            .and_then(LogLevel::parse)
            .unwrap_or_default()
    }

    pub fn write_stdout(&mut self, text: &str) {
        self.messenger.write_stdout(text);
    }

    pub fn write_stderr(&mut self, text: &str) {
        self.messenger.write_stderr(text);
    }

    pub fn set_fatal_error(&mut self) {
        self.fatal_error = true;
        self.error_occurred = true;
    }

    pub fn fatal_error_occurred(&self) -> bool {
        self.fatal_error
    }

    pub fn set_error_occurred(&mut self) {
        self.error_occurred = true;
    }

    pub fn error_occurred(&self) -> bool {
        self.error_occurred
    }

    pub fn set_exit_code(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    // Variables

    /// Normal variable, falling back to the cache.
    pub fn definition(&self, name: &str) -> Option<&str> {
        self.state
            .definition(self.current_snapshot(), name)
            .or_else(|| self.state.cache.value(name))
    }

    pub fn safe_definition(&self, name: &str) -> String {
        self.definition(name).unwrap_or_default().to_string()
    }

    pub fn is_definition_set(&self, name: &str) -> bool {
        self.definition(name).is_some()
    }

    pub fn is_normal_definition_set(&self, name: &str) -> bool {
        self.state
            .definition(self.current_snapshot(), name)
            .is_some()
    }

    pub fn is_on(&self, name: &str) -> bool {
        self.definition(name).is_some_and(is_on)
    }

    pub fn add_definition(&mut self, name: &str, value: &str) {
        let snapshot = self.current_snapshot();
        self.state.set_definition(snapshot, name, value);
    }

    pub fn add_definition_bool(&mut self, name: &str, value: bool) {
        self.add_definition(name, if value { "ON" } else { "OFF" });
    }

    pub fn remove_definition(&mut self, name: &str) {
        let snapshot = self.current_snapshot();
        self.state.remove_definition(snapshot, name);
    }

    pub fn add_cache_definition(&mut self, name: &str, value: &str, help: &str, kind: CacheEntryType, force: bool) {
        let mut value = value.to_string();
        if let Some(existing) = self.state.cache.entry(name) {
            if existing.kind == CacheEntryType::Uninitialized && !force {
                value = existing.value.clone();
            }
        }
        self.state.cache.add_entry(name, &value, help, kind);
        match self.policy_status(PolicyId::Cmp0126) {
            PolicyStatus::Warn => {
                if self.is_on("CMAKE_POLICY_WARNING_CMP0126") && self.is_normal_definition_set(name) {
                    self.issue_message(
                        MessageType::AuthorWarning,
                        format!(
                            "{}\nFor compatibility with older versions of CMake, normal variable \"{name}\" will be removed from the current scope.",
                            PolicyId::Cmp0126.warning()
                        ),
                    );
                }
                self.remove_definition(name);
            }
            PolicyStatus::Old => self.remove_definition(name),
            PolicyStatus::New => {}
        }
    }

    /// Sets `name` in the enclosing scope, warning when there is none.
    pub fn raise_scope(&mut self, name: &str, value: Option<&str>) {
        if name.is_empty() {
            return;
        }
        let snapshot = self.current_snapshot();
        if !self.state.raise_scope(snapshot, name, value) {
            self.issue_message(
                MessageType::AuthorWarning,
                format!("Cannot set \"{name}\": current scope has no parent."),
            );
        }
    }

    pub fn raise_variables(&mut self, names: &[String]) {
        let snapshot = self.current_snapshot();
        for name in names {
            let value = self
                .state
                .definition(snapshot, name)
                .map(str::to_string);
            self.raise_scope(name, value.as_deref());
        }
    }

    pub fn clear_matches(&mut self) {
        let Some(count) = self
            .definition("CMAKE_MATCH_COUNT")
            .map(|count| count.parse::<usize>().unwrap_or(0))
        else {
            return;
        };
        for idx in 0..=count.min(9) {
            let name = format!("CMAKE_MATCH_{idx}");
            if self.definition(&name).is_some_and(|value| !value.is_empty()) {
                self.add_definition(&name, "");
            }
        }
        self.add_definition("CMAKE_MATCH_COUNT", "0");
    }

    pub fn store_matches(&mut self, captures: &regex::Captures<'_>) {
        let mut highest = 0;
        for idx in 0..10 {
            if let Some(found) = captures.get(idx) {
                if !found.as_str().is_empty() {
                    self.add_definition(&format!("CMAKE_MATCH_{idx}"), found.as_str());
                    highest = idx;
                }
            }
        }
        self.add_definition("CMAKE_MATCH_COUNT", &highest.to_string());
    }

    // Expansion

    pub fn expand_variables_in_string(&mut self, source: &str, line: usize, options: ExpandOptions) -> Option<String> {
        match expand_variables(source, &*self, options) {
            Ok(value) => Some(value),
            Err(reason) => {
                let file = self.execution_list_file().to_string();
                self.issue_message(
                    MessageType::FatalError,
                    format!(
                        "Syntax error in cmake code at\n  {file}:{line}\nwhen parsing string\n  {source}\n{reason}"
                    ),
                );
                self.set_fatal_error();
                None
            }
        }
    }

    /// Expands arguments into plain strings. Returns `None` after a fatal error.
    pub fn expand_arguments(&mut self, args: &[ListFileArgument]) -> Option<Vec<String>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg.delim {
                Delimiter::Bracket => out.push(arg.value.clone()),
                Delimiter::Quoted => {
                    if let Some(value) =
                        self.expand_variables_in_string(&arg.value, arg.line, ExpandOptions::default())
                    {
                        out.push(value);
                    }
                }
                Delimiter::Unquoted => {
                    if let Some(value) =
                        self.expand_variables_in_string(&arg.value, arg.line, ExpandOptions::default())
                    {
                        expand_list(&value, &mut out, false);
                    }
                }
            }
        }
        (!self.fatal_error).then_some(out)
    }

    /// Like [`Interpreter::expand_arguments`] but keeps quoting information.
    pub fn expand_arguments_with_quotes(&mut self, args: &[ListFileArgument]) -> Option<Vec<ExpandedArgument>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg.delim {
                Delimiter::Bracket => out.push(ExpandedArgument::new(arg.value.clone(), true)),
                Delimiter::Quoted => {
                    if let Some(value) =
                        self.expand_variables_in_string(&arg.value, arg.line, ExpandOptions::default())
                    {
                        out.push(ExpandedArgument::new(value, true));
                    }
                }
                Delimiter::Unquoted => {
                    if let Some(value) =
                        self.expand_variables_in_string(&arg.value, arg.line, ExpandOptions::default())
                    {
                        let mut items = Vec::new();
                        expand_list(&value, &mut items, false);
                        out.extend(items.into_iter().map(|item| ExpandedArgument::new(item, false)));
                    }
                }
            }
        }
        (!self.fatal_error).then_some(out)
    }

    // Policies

    pub fn policy_status(&self, id: PolicyId) -> PolicyStatus {
        self.state.policy(self.current_snapshot(), id)
    }

    pub fn set_policy(&mut self, id: PolicyId, status: PolicyStatus) {
        let snapshot = self.current_snapshot();
        self.state.set_policy(snapshot, id, status);
    }

    /// Sets a policy by name. Unknown ids are reported and rejected.
    pub fn set_policy_by_name(&mut self, name: &str, status: PolicyStatus) -> bool {
        match PolicyId::parse(name) {
            Some(id) => {
                self.set_policy(id, status);
                true
            }
            None => {
                self.issue_message(
                    MessageType::FatalError,
                    format!("Policy \"{name}\" is not known to this version of CMake."),
                );
                false
            }
        }
    }

    /// Sets every known policy according to a `min[...max]` version range.
    pub fn set_policy_version(&mut self, min: &str, max: Option<&str>) -> bool {
        let Some(min_version) = Version::parse(min) else {
            self.issue_message(
                MessageType::FatalError,
                format!(
                    "Invalid policy version value \"{min}\".  A numeric major.minor[.patch[.tweak]] must be given."
                ),
            );
            return false;
        };
        if min_version < Version::new(2, 4, 0) {
            self.issue_message(
                MessageType::FatalError,
                "Compatibility with CMake < 2.4 is not supported by CMake >= 3.0.  For compatibility with older versions please use any CMake 2.8.x release or lower.",
            );
            self.set_fatal_error();
            return false;
        }
        if min_version > ENGINE_VERSION {
            self.issue_message(
                MessageType::FatalError,
                format!(
                    "An attempt was made to set the policy version of CMake to \"{min}\" which is greater than this version of CMake.  This is not allowed because the greater version may have new policies not known to this CMake.  You may need a newer CMake version to build this project."
                ),
            );
            self.set_fatal_error();
            return false;
        }
        let mut effective = min_version;
        if let Some(max) = max {
            match Version::parse(max) {
                Some(max_version) if max_version >= min_version => {
                    effective = max_version.min(ENGINE_VERSION);
                }
                _ => {
                    self.issue_message(
                        MessageType::FatalError,
                        format!(
                            "Invalid policy max version value \"{max}\".  A numeric major.minor[.patch[.tweak]] must be given that is at least the min value \"{min}\"."
                        ),
                    );
                    return false;
                }
            }
        }
        for id in PolicyId::ALL {
            let status = if id.introduced() <= effective {
                PolicyStatus::New
            } else {
                match self.definition(&format!("CMAKE_POLICY_DEFAULT_{}", id.name())) {
                    Some("NEW") => PolicyStatus::New,
                    Some("OLD") => PolicyStatus::Old,
                    _ => PolicyStatus::Warn,
                }
            };
            self.set_policy(id, status);
        }
        true
    }

    pub fn record_policies(&self) -> PolicyMap {
        self.state.record_policies(self.current_snapshot())
    }

    pub fn push_policy(&mut self, weak: bool, map: PolicyMap) {
        let snapshot = self.current_snapshot();
        if let Err(err) = self.state.push_policy(snapshot, map, weak) {
            self.internal_error(err);
        }
    }

    /// Pops a policy frame; reports an unmatched pop and returns false.
    pub fn pop_policy(&mut self) -> bool {
        let snapshot = self.current_snapshot();
        match self.state.pop_policy(snapshot) {
            Ok(true) => true,
            Ok(false) => {
                self.issue_message(MessageType::FatalError, "cmake_policy POP without matching PUSH");
                false
            }
            Err(err) => {
                self.internal_error(err);
                false
            }
        }
    }

    // Scopes

    fn push_snapshot(&mut self, create: impl FnOnce(&mut State, SnapshotId) -> RuntimeResult<SnapshotId>) -> ScopeHandle {
        let origin = self.current_snapshot();
        match create(&mut self.state, origin) {
            Ok(snapshot) => {
                debug!(snapshot = ?snapshot, kind = ?self.state.kind(snapshot), "push snapshot");
                self.set_current_snapshot(snapshot);
                ScopeHandle(Some(snapshot))
            }
            Err(err) => {
                self.internal_error(err);
                ScopeHandle(None)
            }
        }
    }

    fn pop_snapshot(&mut self, handle: ScopeHandle, report_error: bool) {
        let Some(expected) = handle.0 else {
            return;
        };
        let current = self.current_snapshot();
        if current != expected {
            self.internal_error(RuntimeError::SnapshotOrder {
                popped: expected.index(),
                current: current.index(),
            });
            return;
        }
        let mut report = report_error;
        while !self.state.can_pop_policy_scope(current) {
            if report {
                self.issue_message(MessageType::FatalError, "cmake_policy PUSH without matching POP");
                report = false;
            }
            match self.state.pop_policy(current) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    self.internal_error(err);
                    break;
                }
            }
        }
        match self.state.pop(current) {
            Ok(parent) => {
                debug!(snapshot = ?current, parent = ?parent, "pop snapshot");
                self.set_current_snapshot(parent);
            }
            Err(err) => self.internal_error(err),
        }
    }

    pub fn push_function_scope(&mut self, file_path: &str, policies: &PolicyMap) -> ScopeHandle {
        let scope = self.push_snapshot(|state, origin| {
            state.create_function_call_snapshot(origin, file_path)
        });
        self.push_loop_block_barrier();
        self.blockers.push_barrier();
        self.push_policy(true, policies.clone());
        scope
    }

    pub fn pop_function_scope(&mut self, scope: ScopeHandle, report_error: bool) {
        self.pop_policy();
        self.pop_function_blocker_barrier(report_error);
        self.pop_snapshot(scope, report_error);
        self.pop_loop_block_barrier();
    }

    pub fn push_macro_scope(&mut self, file_path: &str, policies: &PolicyMap) -> ScopeHandle {
        let scope = self.push_snapshot(|state, origin| {
            state.create_macro_call_snapshot(origin, file_path)
        });
        self.blockers.push_barrier();
        self.push_policy(true, policies.clone());
        scope
    }

    pub fn pop_macro_scope(&mut self, scope: ScopeHandle, report_error: bool) {
        self.pop_policy();
        self.pop_function_blocker_barrier(report_error);
        self.pop_snapshot(scope, report_error);
    }

    /// Opens a variable scope, as `block()` does.
    pub fn push_scope(&mut self) -> ScopeHandle {
        let scope = self.push_snapshot(|state, origin| state.create_variable_scope_snapshot(origin));
        self.push_loop_block_barrier();
        scope
    }

    pub fn pop_scope(&mut self, scope: ScopeHandle) {
        self.pop_loop_block_barrier();
        self.pop_snapshot(scope, true);
    }

    pub fn push_policy_scope(&mut self) -> ScopeHandle {
        let scope = self.push_snapshot(|state, origin| state.create_policy_scope_snapshot(origin));
        self.push_policy(false, PolicyMap::default());
        scope
    }

    pub fn pop_policy_scope(&mut self, scope: ScopeHandle) {
        self.pop_policy();
        self.pop_snapshot(scope, true);
    }

    pub fn push_loop_block(&mut self) {
        if let Some(count) = self.loop_blocks.last_mut() {
            *count += 1;
        }
    }

    pub fn pop_loop_block(&mut self) {
        if let Some(count) = self.loop_blocks.last_mut() {
            *count = count.saturating_sub(1);
        }
    }

    pub fn is_loop_block(&self) -> bool {
        self.loop_blocks.last().is_some_and(|count| *count > 0)
    }

    fn push_loop_block_barrier(&mut self) {
        self.loop_blocks.push(0);
    }

    fn pop_loop_block_barrier(&mut self) {
        if self.loop_blocks.len() > 1 {
            self.loop_blocks.pop();
        }
    }

    // Function blockers

    pub fn add_function_blocker(&mut self, blocker: Box<dyn FunctionBlocker>) {
        let context = self.execution_context();
        self.blockers.push(blocker, context);
    }

    fn pop_function_blocker_barrier(&mut self, report_error: bool) {
        let mut report = report_error;
        for frame in self.blockers.pop_barrier() {
            if report && !self.fatal_error {
                self.issue_message(
                    MessageType::FatalError,
                    format!(
                        "A logical block opening on the line\n  {}\nis not closed.",
                        frame.starting_context
                    ),
                );
                report = false;
            }
            frame.blocker.unwind(self);
        }
    }

    fn is_function_blocked(&mut self, function: &ListFileFunction, status: &mut ExecutionStatus) -> bool {
        let frame = match self.blockers.intercept(function) {
            Interception::NotBlocked => return false,
            Interception::Buffered => return true,
            Interception::Closed(frame) => frame,
        };
        let (blocker, body) = frame.into_body();
        let closing = ListFileContext::new(
            function.original_name(),
            body.starting_context.file_path.clone(),
            function.line(),
        );
        let mut at = self.backtrace.clone();
        at.push(ListFileContext::from_function(function, self.execution_list_file()));
        if blocker.end_command_supports_arguments() {
            if !blocker.arguments_match(function, self) {
                self.issue_message_at(
                    MessageType::AuthorWarning,
                    format!(
                        "A logical block opening on the line\n  {}\ncloses on the line\n  {}\nwith mis-matching arguments.",
                        body.starting_context, closing
                    ),
                    &at,
                );
            }
        } else if !function.arguments().is_empty() {
            self.issue_message_at(
                MessageType::AuthorWarning,
                format!("A logical block closing on the line\n  {closing}\nhas unexpected arguments."),
                &at,
            );
        }
        blocker.replay(body, status, self)
    }

    // Execution

    /// Dispatches one command invocation. Returns false when it failed.
    pub fn execute_command(&mut self, function: &ListFileFunction, status: &mut ExecutionStatus) -> bool {
        if self.is_function_blocked(function, status) {
            return true;
        }
        let context = ListFileContext::from_function(function, self.execution_list_file());
        self.backtrace.push(context);
        self.recursion_depth += 1;
        self.nested_errors.push(false);
        let result = self.invoke(function, status);
        self.nested_errors.pop();
        self.recursion_depth -= 1;
        self.backtrace.pop();
        result
    }

    fn recursion_limit(&self) -> usize {
        self.definition("CMAKE_MAXIMUM_RECURSION_DEPTH")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(self.options.recursion_limit)
    }

    fn invoke(&mut self, function: &ListFileFunction, status: &mut ExecutionStatus) -> bool {
        let limit = self.recursion_limit();
        if self.recursion_depth > limit {
            self.issue_message(
                MessageType::FatalError,
                format!("Maximum recursion depth of {limit} exceeded"),
            );
            self.set_fatal_error();
            return false;
        }
        let Some(command) = self.state.commands.get(function.lower_name()) else {
            if !self.fatal_error {
                self.issue_message(
                    MessageType::FatalError,
                    format!("Unknown CMake command \"{}\".", function.original_name()),
                );
                self.set_fatal_error();
                return false;
            }
            return true;
        };
        if self.fatal_error {
            return true;
        }
        if self.options.trace {
            self.print_command_trace(function);
        }
        trace!(command = function.original_name(), line = function.line(), "dispatch");
        let succeeded = command(self, function.arguments(), status);
        if self.nested_errors.last().copied().unwrap_or(false) {
            status.set_nested_error();
        }
        if self.options.mode == WorkingMode::Script {
            if let Some(code) = self.exit_code {
                status.set_exit_code(code);
            }
        }
        let nested = status.nested_error();
        if !succeeded || nested {
            if !nested {
                self.issue_message(
                    MessageType::FatalError,
                    format!("{} {}", function.original_name(), status.error()),
                );
            }
            if self.options.mode != WorkingMode::Normal {
                self.set_fatal_error();
            }
            return false;
        }
        true
    }

    fn print_command_trace(&mut self, function: &ListFileFunction) {
        let mut line = format!(
            "{}({}):  {}(",
            self.execution_list_file(),
            function.line(),
            function.original_name()
        );
        for arg in function.arguments() {
            line.push_str(&arg.value);
            line.push(' ');
        }
        line.push_str(")\n");
        self.messenger.write_stderr(&line);
    }

    /// Executes the commands of a parsed file in the current scope.
    #[tracing::instrument(level = "debug", skip(self, list_file))]
    fn run_list_file(&mut self, list_file: &ListFile, path: &str, run_deferred: bool) {
        let saved_parent = self.definition("CMAKE_PARENT_LIST_FILE").map(str::to_string);
        let saved_file = self.definition("CMAKE_CURRENT_LIST_FILE").map(str::to_string);
        let saved_dir = self.definition("CMAKE_CURRENT_LIST_DIR").map(str::to_string);
        self.add_definition("CMAKE_CURRENT_LIST_FILE", path);
        self.add_definition("CMAKE_CURRENT_LIST_DIR", &parent_dir(path));

        for function in &list_file.functions {
            let mut status = ExecutionStatus::new();
            self.execute_command(function, &mut status);
            if self.fatal_error {
                break;
            }
            if status.return_invoked() {
                self.raise_variables(status.return_variables());
                break;
            }
            if let Some(code) = status.exit_code() {
                self.exit_code = Some(code);
                break;
            }
        }

        if run_deferred && self.exit_code.is_none() {
            self.run_deferred_calls(path);
        }

        for (name, saved) in [
            ("CMAKE_PARENT_LIST_FILE", saved_parent),
            ("CMAKE_CURRENT_LIST_FILE", saved_file),
            ("CMAKE_CURRENT_LIST_DIR", saved_dir),
        ] {
            match saved {
                Some(value) => self.add_definition(name, &value),
                None => self.remove_definition(name),
            }
        }
    }

    fn run_deferred_calls(&mut self, path: &str) {
        self.backtrace.push(ListFileContext::deferred(path));
        let mut idx = 0;
        loop {
            let next = self.makefiles[self.current]
                .defer
                .as_mut()
                .and_then(|queue| queue.get_mut(idx))
                .map(|command| (std::mem::take(&mut command.id), command.clone()));
            let Some((id, command)) = next else {
                break;
            };
            idx += 1;
            if id.is_empty() {
                continue;
            }
            debug!(id, "run deferred call");
            let scope = self.push_snapshot(|state, origin| {
                state.create_defer_call_snapshot(origin, &command.file_path)
            });
            let mut status = ExecutionStatus::new();
            self.execute_command(&command.function, &mut status);
            self.pop_snapshot(scope, true);
            if self.fatal_error {
                break;
            }
        }
        self.backtrace.pop();
    }

    fn load_list_file(&mut self, path: &str) -> Option<ListFile> {
        debug!(path, "read list file");
        let text = match self.platform.fs_read(path) {
            Ok(text) => text,
            Err(message) => {
                self.issue_message(
                    MessageType::FatalError,
                    format!("Error reading file \"{path}\": {message}"),
                );
                self.set_fatal_error();
                return None;
            }
        };
        self.parse_or_report(path, &text)
    }

    fn parse_or_report(&mut self, path: &str, text: &str) -> Option<ListFile> {
        match parse_list_file(path, text) {
            Ok(list_file) => Some(list_file),
            Err(err) => {
                let backtrace = self
                    .backtrace
                    .with_top(ListFileContext::new("", path, err.line));
                self.issue_message_at(MessageType::FatalError, err.message, &backtrace);
                self.set_fatal_error();
                None
            }
        }
    }

    /// Runs another file in a nested include scope.
    /// Missing files and directories are rejected silently.
    pub fn read_dependent_file(&mut self, file: &str, no_policy_scope: bool) -> bool {
        let path = collapse_full_path(file, &self.current_source_dir());
        if !self.platform.fs_exists(&path) || self.platform.fs_is_dir(&path) {
            return false;
        }
        if let Some(current) = self.definition("CMAKE_CURRENT_LIST_FILE").map(str::to_string) {
            self.add_definition("CMAKE_PARENT_LIST_FILE", &current);
        }
        self.backtrace.push(ListFileContext::file(&path));
        self.blockers.push_barrier();
        let scope = self.push_snapshot(|state, origin| {
            state.create_include_file_snapshot(origin, &path)
        });
        let policy_scope =
            !no_policy_scope && self.policy_status(PolicyId::Cmp0011) == PolicyStatus::New;
        if policy_scope {
            self.push_policy(false, PolicyMap::default());
        }

        let mut report = true;
        let loaded = match self.load_list_file(&path) {
            Some(list_file) => {
                self.run_list_file(&list_file, &path, false);
                true
            }
            None => false,
        };
        if !loaded || self.fatal_error {
            report = false;
        }

        if policy_scope {
            self.pop_policy();
        }
        self.pop_function_blocker_barrier(report);
        self.pop_snapshot(scope, report);
        self.backtrace.pop();
        loaded
    }

    /// Runs `content` as an inline file named `virtual_path`.
    pub fn read_list_file_as_string(&mut self, content: &str, virtual_path: &str) -> bool {
        let path = collapse_full_path(virtual_path, &self.current_source_dir());
        self.backtrace.push(ListFileContext::file(&path));
        let scope = self.push_snapshot(|state, origin| {
            state.create_inline_list_file_snapshot(origin, &path)
        });
        self.blockers.push_barrier();
        let loaded = match self.parse_or_report(virtual_path, content) {
            Some(list_file) => {
                self.run_list_file(&list_file, &path, false);
                true
            }
            None => false,
        };
        let report = loaded && !self.fatal_error;
        self.pop_function_blocker_barrier(report);
        self.pop_snapshot(scope, report);
        self.backtrace.pop();
        loaded
    }

    /// Configures `source` as a child directory of the current one.
    pub fn add_subdirectory(&mut self, source: &str, binary: &str, exclude_from_all: bool, system: bool) {
        let origin = self.current_snapshot();
        let snapshot = match self.state.create_buildsystem_directory_snapshot(origin) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.internal_error(err);
                return;
            }
        };
        self.state.set_directory_locations(snapshot, source, binary);
        if let Some(dir) = self.state.directory_mut(snapshot) {
            if exclude_from_all {
                dir.properties.set("EXCLUDE_FROM_ALL", "TRUE");
            }
            if system {
                dir.properties.set("SYSTEM", "TRUE");
            }
        }
        let list_path = format!("{source}/CMakeLists.txt");
        if !self.platform.fs_exists(&list_path) {
            self.issue_message(
                MessageType::FatalError,
                format!("The source directory\n  {source}\ndoes not contain a CMakeLists.txt file."),
            );
            return;
        }

        let saved_backtrace = std::mem::take(&mut self.backtrace);
        let saved_current = self.current;
        self.makefiles.push(Makefile {
            snapshot,
            defer: None,
        });
        self.current = self.makefiles.len() - 1;
        self.loop_blocks.push(0);
        self.backtrace.push(ListFileContext::file(&list_path));
        if let Some(list_file) = self.load_list_file(&list_path) {
            self.backtrace.pop();
            self.configure_directory(&list_file, &list_path);
        }
        self.loop_blocks.pop();
        self.current = saved_current;
        self.backtrace = saved_backtrace;
    }

    // Deferred calls

    fn defer_target(&self, directory: Option<&str>) -> Result<usize, String> {
        let Some(dir) = directory else {
            return Ok(self.current);
        };
        let path = collapse_full_path(dir, &self.current_source_dir());
        let found = self.makefiles.iter().position(|makefile| {
            self.state
                .directory(makefile.snapshot)
                .is_some_and(|state| state.location == path)
        });
        match found {
            Some(idx) if self.makefiles[idx].defer.is_some() => Ok(idx),
            Some(_) => Err(format!(
                "DEFER CALL may not be scheduled in directory:\n  {path}\nat this time."
            )),
            None => Err(format!(
                "DEFER DIRECTORY:\n  {path}\nis not known.  It may not have been processed yet."
            )),
        }
    }

    /// Queues `function` to run when the directory finishes. Returns the id.
    pub fn defer_call(&mut self, directory: Option<&str>, id: Option<String>, function: ListFileFunction) -> Result<String, String> {
        let target = self.defer_target(directory)?;
        let file_path = self.execution_list_file().to_string();
        let Some(queue) = self.makefiles[target].defer.as_mut() else {
            return Err("DEFER CALL may not be scheduled at this time.".into());
        };
        let id = id.unwrap_or_else(|| format!("__{}", queue.len()));
        queue.push(DeferCommand {
            id: id.clone(),
            file_path,
            function,
        });
        Ok(id)
    }

    pub fn defer_cancel(&mut self, directory: Option<&str>, ids: &[String]) -> Result<(), String> {
        let target = self.defer_target(directory)?;
        if let Some(queue) = self.makefiles[target].defer.as_mut() {
            for command in queue.iter_mut() {
                if ids.contains(&command.id) {
                    command.id.clear();
                }
            }
        }
        Ok(())
    }

    pub fn defer_ids(&self, directory: Option<&str>) -> Result<Vec<String>, String> {
        let target = self.defer_target(directory)?;
        Ok(self.makefiles[target]
            .defer
            .iter()
            .flatten()
            .filter(|command| !command.id.is_empty())
            .map(|command| command.id.clone())
            .collect())
    }

    pub fn defer_get_call(&self, directory: Option<&str>, id: &str) -> Result<Option<DeferCommand>, String> {
        let target = self.defer_target(directory)?;
        Ok(self.makefiles[target]
            .defer
            .iter()
            .flatten()
            .find(|command| !id.is_empty() && command.id == id)
            .cloned())
    }
}

/// Parses a `-D` entry: `NAME=VALUE` or `NAME:TYPE=VALUE`.
fn parse_cache_entry(entry: &str) -> Option<(String, CacheEntryType, String)> {
    let (key, value) = entry.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    match key.split_once(':') {
        Some((name, kind)) => {
            let kind = CacheEntryType::parse(&kind.to_ascii_uppercase())?;
            Some((name.to_string(), kind, value.to_string()))
        }
        None => Some((key.to_string(), CacheEntryType::Uninitialized, value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_line_cache_entries() {
        assert_eq!(
            parse_cache_entry("A=1"),
            Some(("A".into(), CacheEntryType::Uninitialized, "1".into()))
        );
        assert_eq!(
            parse_cache_entry("B:bool=ON"),
            Some(("B".into(), CacheEntryType::Bool, "ON".into()))
        );
        assert_eq!(parse_cache_entry("=x"), None);
        assert_eq!(parse_cache_entry("C:WEIRD=1"), None);
    }

    #[test]
    fn definitions_fall_back_to_cache() {
        let mut options = EngineOptions::script();
        options.cache_entries.push("FROM_CACHE=yes".into());
        let mut interp = Interpreter::new(options);
        assert_eq!(interp.definition("FROM_CACHE"), Some("yes"));
        interp.add_definition("FROM_CACHE", "normal");
        assert_eq!(interp.definition("FROM_CACHE"), Some("normal"));
        interp.remove_definition("FROM_CACHE");
        assert_eq!(interp.definition("FROM_CACHE"), Some("yes"));
    }

    #[test]
    fn arguments_expand_by_delimiter() {
        let mut interp = Interpreter::new(EngineOptions::script());
        interp.add_definition("L", "a;b");
        let args = vec![
            ListFileArgument::unquoted("${L}", 1),
            ListFileArgument::quoted("${L}", 1),
            ListFileArgument::new("${L}", Delimiter::Bracket, 1),
        ];
        let expanded = interp.expand_arguments(&args).expect("expand");
        assert_eq!(expanded, vec!["a", "b", "a;b", "${L}"]);
        let quoted = interp.expand_arguments_with_quotes(&args).expect("expand");
        assert!(!quoted[0].quoted);
        assert!(quoted[2].quoted);
    }
}
