use crate::runtime::{
    cache::Cache,
    environment::{Environment, FrameId},
    error::{RuntimeError, RuntimeResult},
    policies::{PolicyEntry, PolicyFrameId, PolicyId, PolicyMap, PolicyStack, PolicyStatus, ENGINE_VERSION},
    properties::{PropertyDefinitions, PropertyMap},
    registry::CommandRegistry,
    tree::{LinkedTree, NodeId},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotKind {
    Base,
    BuildsystemDirectory,
    FunctionCall,
    MacroCall,
    IncludeFile,
    InlineListFile,
    VariableScope,
    PolicyScope,
    DeferCall,
}

/// Directory-level property logs whose visible range is tracked per snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    IncludeDirectories,
    CompileDefinitions,
    CompileOptions,
    LinkOptions,
    LinkDirectories,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        ContentKind::IncludeDirectories,
        ContentKind::CompileDefinitions,
        ContentKind::CompileOptions,
        ContentKind::LinkOptions,
        ContentKind::LinkDirectories,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn property_name(self) -> &'static str {
        match self {
            ContentKind::IncludeDirectories => "INCLUDE_DIRECTORIES",
            ContentKind::CompileDefinitions => "COMPILE_DEFINITIONS",
            ContentKind::CompileOptions => "COMPILE_OPTIONS",
            ContentKind::LinkOptions => "LINK_OPTIONS",
            ContentKind::LinkDirectories => "LINK_DIRECTORIES",
        }
    }

    pub fn from_property(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.property_name() == name)
    }
}

/// Append-only log where `None` marks a reset; the visible entries are those
/// after the last reset before a snapshot's end position.
#[derive(Clone, Debug, Default)]
pub struct ContentLog {
    entries: Vec<Option<String>>,
}

impl ContentLog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn visible(&self, end: usize) -> Vec<String> {
        let end = end.min(self.entries.len());
        let start = self.entries[..end]
            .iter()
            .rposition(Option::is_none)
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.entries[start..end].iter().flatten().cloned().collect()
    }
}

pub type SnapshotId = NodeId<Position>;
pub type DirectoryId = NodeId<DirectoryState>;
pub type ListFileId = NodeId<String>;

#[derive(Clone, Debug)]
pub struct DirectoryState {
    pub location: String,
    pub output_location: String,
    pub current_scope: SnapshotId,
    pub children: Vec<SnapshotId>,
    pub properties: PropertyMap,
    pub target_names: Vec<String>,
    pub project_name: String,
    contents: [ContentLog; 5],
}

impl DirectoryState {
    fn new() -> Self {
        Self {
            location: String::new(),
            output_location: String::new(),
            current_scope: NodeId::ROOT,
            children: Vec::new(),
            properties: PropertyMap::default(),
            target_names: Vec::new(),
            project_name: String::new(),
            contents: Default::default(),
        }
    }

    fn content_sizes(&self) -> [usize; 5] {
        let mut sizes = [0; 5];
        for kind in ContentKind::ALL {
            sizes[kind.index()] = self.contents[kind.index()].len();
        }
        sizes
    }
}

/// One node of the snapshot tree.
#[derive(Clone, Debug)]
pub struct Position {
    pub kind: SnapshotKind,
    pub keep: bool,
    pub scope_parent: SnapshotId,
    pub directory_parent: SnapshotId,
    pub directory: DirectoryId,
    pub execution_list_file: ListFileId,
    pub vars: FrameId,
    pub parent_vars: FrameId,
    pub root_vars: FrameId,
    pub policies: PolicyFrameId,
    pub policy_root: PolicyFrameId,
    pub policy_scope: PolicyFrameId,
    content_positions: [usize; 5],
}

/// Every tree of a configure run plus the data shared across directories.
pub struct State {
    snapshots: LinkedTree<Position>,
    environment: Environment,
    policies: PolicyStack,
    list_files: LinkedTree<String>,
    directories: LinkedTree<DirectoryState>,
    pub commands: CommandRegistry,
    pub cache: Cache,
    pub global_properties: PropertyMap,
    pub property_definitions: PropertyDefinitions,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        Self {
            snapshots: LinkedTree::new(),
            environment: Environment::new(),
            policies: PolicyStack::new(),
            list_files: LinkedTree::new(),
            directories: LinkedTree::new(),
            commands: CommandRegistry::new(),
            cache: Cache::new(),
            global_properties: PropertyMap::default(),
            property_definitions: PropertyDefinitions::default(),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn policy_stack(&self) -> &PolicyStack {
        &self.policies
    }

    pub fn position(&self, snapshot: SnapshotId) -> RuntimeResult<&Position> {
        self.snapshots
            .get(snapshot)
            .ok_or(RuntimeError::InvalidSnapshot {
                index: snapshot.index(),
            })
    }

    fn position_mut(&mut self, snapshot: SnapshotId) -> RuntimeResult<&mut Position> {
        self.snapshots
            .get_mut(snapshot)
            .ok_or(RuntimeError::InvalidSnapshot {
                index: snapshot.index(),
            })
    }

    pub fn is_valid(&self, snapshot: SnapshotId) -> bool {
        self.snapshots.contains(snapshot)
    }

    pub fn kind(&self, snapshot: SnapshotId) -> Option<SnapshotKind> {
        self.snapshots.get(snapshot).map(|pos| pos.kind)
    }

    pub fn create_base_snapshot(&mut self) -> SnapshotId {
        let directory = self.directories.push(NodeId::ROOT, DirectoryState::new());
        let list_file = self.list_files.push(NodeId::ROOT, String::new());
        let vars = self.environment.push(NodeId::ROOT);
        let policies = self.policies.push(NodeId::ROOT, PolicyEntry::default());
        let position = Position {
            kind: SnapshotKind::Base,
            keep: true,
            scope_parent: NodeId::ROOT,
            directory_parent: NodeId::ROOT,
            directory,
            execution_list_file: list_file,
            vars,
            parent_vars: NodeId::ROOT,
            root_vars: NodeId::ROOT,
            policies,
            policy_root: policies,
            policy_scope: policies,
            content_positions: [0; 5],
        };
        let snapshot = self.snapshots.push(NodeId::ROOT, position);
        if let Some(dir) = self.directories.get_mut(directory) {
            dir.current_scope = snapshot;
        }
        self.set_default_definitions(snapshot);
        snapshot
    }

    pub fn create_buildsystem_directory_snapshot(&mut self, origin: SnapshotId) -> RuntimeResult<SnapshotId> {
        let parent = self.position(origin)?.clone();
        let directory = self.directories.push(parent.directory, DirectoryState::new());
        let list_file = self.list_files.push(parent.execution_list_file, String::new());
        let vars = self.environment.push(parent.vars);
        let policies = self.policies.push(parent.policies, PolicyEntry::default());
        let position = Position {
            kind: SnapshotKind::BuildsystemDirectory,
            keep: true,
            scope_parent: origin,
            directory_parent: origin,
            directory,
            execution_list_file: list_file,
            vars,
            parent_vars: parent.vars,
            root_vars: parent.vars,
            policies,
            policy_root: policies,
            policy_scope: policies,
            content_positions: [0; 5],
        };
        let snapshot = self.snapshots.push(origin, position);

        let closure = self.environment.closure(parent.vars, parent.root_vars);
        self.environment.replace(vars, closure);

        let mut inherited: [ContentLog; 5] = Default::default();
        let mut sizes = [0; 5];
        if let Some(parent_dir) = self.directories.get(parent.directory) {
            for kind in ContentKind::ALL {
                let visible = parent_dir.contents[kind.index()]
                    .visible(parent.content_positions[kind.index()]);
                sizes[kind.index()] = visible.len();
                inherited[kind.index()].entries = visible.into_iter().map(Some).collect();
            }
        }
        if let Some(dir) = self.directories.get_mut(directory) {
            dir.current_scope = snapshot;
            dir.contents = inherited;
        }
        self.position_mut(snapshot)?.content_positions = sizes;
        if let Some(parent_dir) = self.directories.get_mut(parent.directory) {
            parent_dir.children.push(snapshot);
        }
        self.set_default_definitions(snapshot);
        Ok(snapshot)
    }

    pub fn create_function_call_snapshot(&mut self, origin: SnapshotId, file_path: &str) -> RuntimeResult<SnapshotId> {
        self.create_nested(origin, SnapshotKind::FunctionCall, false, Some(file_path), true)
    }

    pub fn create_macro_call_snapshot(&mut self, origin: SnapshotId, file_path: &str) -> RuntimeResult<SnapshotId> {
        self.create_nested(origin, SnapshotKind::MacroCall, false, Some(file_path), false)
    }

    pub fn create_include_file_snapshot(&mut self, origin: SnapshotId, file_path: &str) -> RuntimeResult<SnapshotId> {
        self.create_nested(origin, SnapshotKind::IncludeFile, true, Some(file_path), false)
    }

    pub fn create_inline_list_file_snapshot(&mut self, origin: SnapshotId, file_path: &str) -> RuntimeResult<SnapshotId> {
        self.create_nested(origin, SnapshotKind::InlineListFile, true, Some(file_path), false)
    }

    pub fn create_defer_call_snapshot(&mut self, origin: SnapshotId, file_path: &str) -> RuntimeResult<SnapshotId> {
        self.create_nested(origin, SnapshotKind::DeferCall, false, Some(file_path), false)
    }

    pub fn create_variable_scope_snapshot(&mut self, origin: SnapshotId) -> RuntimeResult<SnapshotId> {
        self.create_nested(origin, SnapshotKind::VariableScope, false, None, true)
    }

    pub fn create_policy_scope_snapshot(&mut self, origin: SnapshotId) -> RuntimeResult<SnapshotId> {
        self.create_nested(origin, SnapshotKind::PolicyScope, false, None, false)
    }

    fn create_nested(
        &mut self,
        origin: SnapshotId,
        kind: SnapshotKind,
        keep: bool,
        file_path: Option<&str>,
        new_vars: bool,
    ) -> RuntimeResult<SnapshotId> {
        let mut position = self.position(origin)?.clone();
        position.kind = kind;
        position.keep = keep;
        position.policy_scope = position.policies;
        if let Some(path) = file_path {
            position.execution_list_file = self
                .list_files
                .push(position.execution_list_file, path.to_string());
        }
        if new_vars {
            position.scope_parent = origin;
            position.parent_vars = position.vars;
            position.vars = self.environment.push(position.vars);
        }
        let directory = position.directory;
        let snapshot = self.snapshots.push(origin, position);
        if let Some(dir) = self.directories.get_mut(directory) {
            dir.current_scope = snapshot;
        }
        Ok(snapshot)
    }

    /// Closes `snapshot`, returning the snapshot that becomes current.
    ///
    /// Only the innermost open snapshot of its directory may be popped.
    pub fn pop(&mut self, snapshot: SnapshotId) -> RuntimeResult<SnapshotId> {
        let position = self.position(snapshot)?.clone();
        let current = self
            .directories
            .get(position.directory)
            .map(|dir| dir.current_scope);
        if current != Some(snapshot) {
            return Err(RuntimeError::SnapshotOrder {
                popped: snapshot.index(),
                current: current.map(NodeId::index).unwrap_or(0),
            });
        }
        let parent = self.snapshots.parent(snapshot);
        let previous = self.position(parent)?.clone();
        let sizes = self
            .directories
            .get(previous.directory)
            .map(DirectoryState::content_sizes)
            .unwrap_or([0; 5]);
        self.position_mut(parent)?.content_positions = sizes;
        if let Some(dir) = self.directories.get_mut(previous.directory) {
            dir.current_scope = parent;
        }

        if !position.keep && self.snapshots.is_last(snapshot) {
            if position.vars != previous.vars && self.environment.is_last(position.vars) {
                self.environment.pop(position.vars);
            }
            if position.execution_list_file != previous.execution_list_file
                && self.list_files.is_last(position.execution_list_file)
            {
                self.list_files.pop(position.execution_list_file);
            }
            self.snapshots.pop(snapshot);
        }
        Ok(parent)
    }

    // Variables

    /// Value of `name` visible in `snapshot`, confined to its directory.
    pub fn definition(&self, snapshot: SnapshotId, name: &str) -> Option<&str> {
        let position = self.snapshots.get(snapshot)?;
        self.environment
            .lookup_within(position.vars, position.root_vars, name)
    }

    pub fn set_definition(&mut self, snapshot: SnapshotId, name: &str, value: impl Into<String>) {
        if let Some(position) = self.snapshots.get(snapshot) {
            self.environment.define(position.vars, name, value);
        }
    }

    pub fn remove_definition(&mut self, snapshot: SnapshotId, name: &str) {
        if let Some(position) = self.snapshots.get(snapshot) {
            self.environment.unset(position.vars, name);
        }
    }

    pub fn closure_keys(&self, snapshot: SnapshotId) -> Vec<String> {
        match self.snapshots.get(snapshot) {
            Some(position) => self
                .environment
                .closure_keys(position.vars, position.root_vars),
            None => Vec::new(),
        }
    }

    /// Writes `name` into the enclosing scope. Returns false when the
    /// snapshot has no enclosing scope to write to.
    pub fn raise_scope(&mut self, snapshot: SnapshotId, name: &str, value: Option<&str>) -> bool {
        let Some(position) = self.snapshots.get(snapshot).cloned() else {
            return false;
        };
        if position.scope_parent == position.directory_parent {
            let Some(parent_dir) = self.buildsystem_directory_parent(snapshot) else {
                return false;
            };
            match value {
                Some(value) => self.set_definition(parent_dir, name, value),
                None => self.remove_definition(parent_dir, name),
            }
            return true;
        }
        self.environment
            .localize_within(position.vars, position.root_vars, name);
        match value {
            Some(value) => self.environment.define(position.parent_vars, name, value),
            None => self.environment.unset(position.parent_vars, name),
        }
        true
    }

    // Policies

    pub fn policy(&self, snapshot: SnapshotId, id: PolicyId) -> PolicyStatus {
        self.snapshots
            .get(snapshot)
            .and_then(|position| self.policies.get(position.policies, id))
            .unwrap_or(PolicyStatus::Warn)
    }

    pub fn set_policy(&mut self, snapshot: SnapshotId, id: PolicyId, status: PolicyStatus) {
        if let Some(position) = self.snapshots.get(snapshot) {
            self.policies.set(position.policies, id, status);
        }
    }

    pub fn record_policies(&self, snapshot: SnapshotId) -> PolicyMap {
        self.snapshots
            .get(snapshot)
            .map(|position| self.policies.record(position.policies))
            .unwrap_or_default()
    }

    pub fn push_policy(&mut self, snapshot: SnapshotId, map: PolicyMap, weak: bool) -> RuntimeResult<()> {
        let parent = self.position(snapshot)?.policies;
        let frame = self.policies.push(parent, PolicyEntry { map, weak });
        self.position_mut(snapshot)?.policies = frame;
        Ok(())
    }

    /// Pops the innermost policy frame. Returns false at the snapshot's
    /// policy scope boundary.
    pub fn pop_policy(&mut self, snapshot: SnapshotId) -> RuntimeResult<bool> {
        let position = self.position(snapshot)?;
        if position.policies == position.policy_scope {
            return Ok(false);
        }
        let frame = position.policies;
        let parent = self.policies.pop(frame);
        self.position_mut(snapshot)?.policies = parent;
        Ok(true)
    }

    pub fn can_pop_policy_scope(&self, snapshot: SnapshotId) -> bool {
        self.snapshots
            .get(snapshot)
            .map(|position| position.policies == position.policy_scope)
            .unwrap_or(true)
    }

    /// Marks the current policy frame as the boundary `pop_policy` stops at.
    pub fn mark_policy_scope(&mut self, snapshot: SnapshotId) -> RuntimeResult<()> {
        let position = self.position_mut(snapshot)?;
        position.policy_scope = position.policies;
        Ok(())
    }

    // Directories

    pub fn directory(&self, snapshot: SnapshotId) -> Option<&DirectoryState> {
        let position = self.snapshots.get(snapshot)?;
        self.directories.get(position.directory)
    }

    pub fn directory_mut(&mut self, snapshot: SnapshotId) -> Option<&mut DirectoryState> {
        let directory = self.snapshots.get(snapshot)?.directory;
        self.directories.get_mut(directory)
    }

    /// The current scope of the directory that created `snapshot`'s directory.
    pub fn buildsystem_directory_parent(&self, snapshot: SnapshotId) -> Option<SnapshotId> {
        let position = self.snapshots.get(snapshot)?;
        if position.directory_parent.is_root() {
            return None;
        }
        self.directory(position.directory_parent)
            .map(|dir| dir.current_scope)
    }

    pub fn set_list_file(&mut self, snapshot: SnapshotId, path: &str) {
        if let Some(position) = self.snapshots.get(snapshot) {
            if let Some(file) = self.list_files.get_mut(position.execution_list_file) {
                *file = path.to_string();
            }
        }
    }

    pub fn execution_list_file(&self, snapshot: SnapshotId) -> &str {
        self.snapshots
            .get(snapshot)
            .and_then(|position| self.list_files.get(position.execution_list_file))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Files of the current include chain, outermost first.
    pub fn list_file_stack(&self, snapshot: SnapshotId) -> Vec<String> {
        let Some(position) = self.snapshots.get(snapshot) else {
            return Vec::new();
        };
        let mut files: Vec<String> = self
            .list_files
            .ancestors(position.execution_list_file)
            .map(|(_, file)| file.clone())
            .filter(|file| !file.is_empty())
            .collect();
        files.reverse();
        files
    }

    pub fn set_directory_locations(&mut self, snapshot: SnapshotId, source: &str, binary: &str) {
        if let Some(dir) = self.directory_mut(snapshot) {
            dir.location = source.to_string();
            dir.output_location = binary.to_string();
        }
        self.set_definition(snapshot, "CMAKE_CURRENT_SOURCE_DIR", source);
        self.set_definition(snapshot, "CMAKE_CURRENT_BINARY_DIR", binary);
    }

    fn set_default_definitions(&mut self, snapshot: SnapshotId) {
        if cfg!(windows) {
            self.set_definition(snapshot, "WIN32", "1");
            self.set_definition(snapshot, "CMAKE_HOST_WIN32", "1");
        } else {
            self.set_definition(snapshot, "UNIX", "1");
            self.set_definition(snapshot, "CMAKE_HOST_UNIX", "1");
        }
        if cfg!(target_os = "macos") {
            self.set_definition(snapshot, "APPLE", "1");
            self.set_definition(snapshot, "CMAKE_HOST_APPLE", "1");
        }
        if cfg!(target_os = "linux") {
            self.set_definition(snapshot, "CMAKE_HOST_LINUX", "1");
        }
        self.set_definition(snapshot, "CMAKE_MAJOR_VERSION", ENGINE_VERSION.major.to_string());
        self.set_definition(snapshot, "CMAKE_MINOR_VERSION", ENGINE_VERSION.minor.to_string());
        self.set_definition(snapshot, "CMAKE_PATCH_VERSION", ENGINE_VERSION.patch.to_string());
        self.set_definition(snapshot, "CMAKE_VERSION", ENGINE_VERSION.to_string());
        self.set_definition(snapshot, "CMAKE_FILES_DIRECTORY", "/CMakeFiles");
    }

    // Directory content logs

    pub fn content(&self, snapshot: SnapshotId, kind: ContentKind) -> Vec<String> {
        let Some(position) = self.snapshots.get(snapshot) else {
            return Vec::new();
        };
        self.directories
            .get(position.directory)
            .map(|dir| dir.contents[kind.index()].visible(position.content_positions[kind.index()]))
            .unwrap_or_default()
    }

    pub fn append_content(&mut self, snapshot: SnapshotId, kind: ContentKind, value: &str) {
        if value.is_empty() {
            return;
        }
        self.edit_content(snapshot, kind, |log| log.entries.push(Some(value.to_string())));
    }

    pub fn set_content(&mut self, snapshot: SnapshotId, kind: ContentKind, value: &str) {
        self.edit_content(snapshot, kind, |log| {
            log.entries.push(None);
            if !value.is_empty() {
                log.entries.push(Some(value.to_string()));
            }
        });
    }

    pub fn clear_content(&mut self, snapshot: SnapshotId, kind: ContentKind) {
        self.edit_content(snapshot, kind, |log| log.entries.push(None));
    }

    fn edit_content(&mut self, snapshot: SnapshotId, kind: ContentKind, edit: impl FnOnce(&mut ContentLog)) {
        let Some(directory) = self.snapshots.get(snapshot).map(|pos| pos.directory) else {
            return;
        };
        let Some(dir) = self.directories.get_mut(directory) else {
            return;
        };
        let log = &mut dir.contents[kind.index()];
        edit(log);
        let len = log.len();
        if let Some(position) = self.snapshots.get_mut(snapshot) {
            position.content_positions[kind.index()] = len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_scope_isolates_writes() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        state.set_definition(base, "X", "1");
        let call = state
            .create_function_call_snapshot(base, "f.cmake")
            .expect("push");
        state.set_definition(call, "X", "2");
        assert_eq!(state.definition(base, "X"), Some("1"));
        assert_eq!(state.definition(call, "X"), Some("2"));
        assert_eq!(state.pop(call).expect("pop"), base);
        assert_eq!(state.definition(base, "X"), Some("1"));
    }

    #[test]
    fn macro_scope_shares_variables() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        let call = state
            .create_macro_call_snapshot(base, "m.cmake")
            .expect("push");
        state.set_definition(call, "X", "leak");
        state.pop(call).expect("pop");
        assert_eq!(state.definition(base, "X"), Some("leak"));
    }

    #[test]
    fn raise_from_function_writes_caller() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        let call = state
            .create_function_call_snapshot(base, "f.cmake")
            .expect("push");
        assert!(state.raise_scope(call, "R", Some("v")));
        state.pop(call).expect("pop");
        assert_eq!(state.definition(base, "R"), Some("v"));
    }

    #[test]
    fn raise_at_top_level_has_no_parent() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        assert!(!state.raise_scope(base, "R", Some("v")));
    }

    #[test]
    fn raise_from_subdirectory_writes_parent_directory() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        let sub = state
            .create_buildsystem_directory_snapshot(base)
            .expect("push");
        assert!(state.raise_scope(sub, "FROM_SUB", Some("yes")));
        assert_eq!(state.definition(base, "FROM_SUB"), Some("yes"));
    }

    #[test]
    fn directory_starts_from_parent_closure() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        state.set_definition(base, "SHARED", "1");
        let sub = state
            .create_buildsystem_directory_snapshot(base)
            .expect("push");
        state.set_definition(base, "LATER", "1");
        assert_eq!(state.definition(sub, "SHARED"), Some("1"));
        assert_eq!(state.definition(sub, "LATER"), None);
        assert_eq!(state.buildsystem_directory_parent(sub), Some(base));
    }

    #[test]
    fn out_of_order_pop_is_rejected() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        let outer = state
            .create_variable_scope_snapshot(base)
            .expect("push");
        let inner = state
            .create_variable_scope_snapshot(outer)
            .expect("push");
        assert!(matches!(
            state.pop(outer),
            Err(RuntimeError::SnapshotOrder { .. })
        ));
        assert_eq!(state.pop(inner).expect("pop"), outer);
        assert_eq!(state.pop(outer).expect("pop"), base);
    }

    #[test]
    fn push_pop_restores_frames() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        let before = state.position(base).expect("base").clone();
        let call = state
            .create_function_call_snapshot(base, "f.cmake")
            .expect("push");
        state
            .push_policy(call, PolicyMap::default(), true)
            .expect("policy");
        assert!(state.pop_policy(call).expect("pop policy"));
        state.pop(call).expect("pop");
        let after = state.position(base).expect("base");
        assert_eq!(after.vars, before.vars);
        assert_eq!(after.policies, before.policies);
        assert_eq!(after.execution_list_file, before.execution_list_file);
        assert!(!state.is_valid(call));
    }

    #[test]
    fn content_reset_hides_earlier_entries() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        state.append_content(base, ContentKind::IncludeDirectories, "a");
        state.append_content(base, ContentKind::IncludeDirectories, "b");
        state.set_content(base, ContentKind::IncludeDirectories, "c");
        assert_eq!(
            state.content(base, ContentKind::IncludeDirectories),
            vec!["c".to_string()]
        );
        let sub = state
            .create_buildsystem_directory_snapshot(base)
            .expect("push");
        state.append_content(sub, ContentKind::IncludeDirectories, "d");
        assert_eq!(
            state.content(sub, ContentKind::IncludeDirectories),
            vec!["c".to_string(), "d".to_string()]
        );
    }

    #[test]
    fn policies_follow_strong_frames() {
        let mut state = State::new();
        let base = state.create_base_snapshot();
        state.set_policy(base, PolicyId::Cmp0054, PolicyStatus::New);
        let scope = state.create_policy_scope_snapshot(base).expect("push");
        state
            .push_policy(scope, PolicyMap::default(), false)
            .expect("policy");
        state.set_policy(scope, PolicyId::Cmp0054, PolicyStatus::Old);
        assert_eq!(state.policy(scope, PolicyId::Cmp0054), PolicyStatus::Old);
        assert!(state.pop_policy(scope).expect("pop policy"));
        assert_eq!(state.policy(scope, PolicyId::Cmp0054), PolicyStatus::New);
        assert_eq!(state.policy(base, PolicyId::Cmp0140), PolicyStatus::Warn);
    }
}
