use crate::runtime::tree::{LinkedTree, NodeId};
use std::collections::{BTreeSet, HashMap};

/// Bindings local to one variable frame. `None` records an explicit unset
/// that hides any ancestor binding of the same name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    values: HashMap<String, Option<String>>,
}

impl Bindings {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get(&self, name: &str) -> Option<&Option<String>> {
        self.values.get(name)
    }
}

pub type FrameId = NodeId<Bindings>;

/// Variable frames shared by every snapshot of a configure run.
#[derive(Default)]
pub struct Environment {
    frames: LinkedTree<Bindings>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, parent: FrameId) -> FrameId {
        self.frames.push(parent, Bindings::default())
    }

    pub fn pop(&mut self, frame: FrameId) -> FrameId {
        self.frames.pop(frame)
    }

    pub fn is_last(&self, frame: FrameId) -> bool {
        self.frames.is_last(frame)
    }

    pub fn parent(&self, frame: FrameId) -> FrameId {
        self.frames.parent(frame)
    }

    pub fn bindings(&self, frame: FrameId) -> Option<&Bindings> {
        self.frames.get(frame)
    }

    pub fn define(&mut self, frame: FrameId, name: &str, value: impl Into<String>) {
        if let Some(bindings) = self.frames.get_mut(frame) {
            bindings.values.insert(name.to_string(), Some(value.into()));
        }
    }

    /// Records that `name` is unset in `frame`, hiding ancestor values.
    pub fn unset(&mut self, frame: FrameId, name: &str) {
        if let Some(bindings) = self.frames.get_mut(frame) {
            bindings.values.insert(name.to_string(), None);
        }
    }

    /// Drops the local binding so lookups see the nearest ancestor again.
    pub fn undefine(&mut self, frame: FrameId, name: &str) {
        if let Some(bindings) = self.frames.get_mut(frame) {
            bindings.values.remove(name);
        }
    }

    pub fn lookup(&self, frame: FrameId, name: &str) -> Option<&str> {
        self.lookup_within(frame, NodeId::ROOT, name)
    }

    /// Looks `name` up from `frame` towards `root`, excluding `root` itself.
    pub fn lookup_within(&self, frame: FrameId, root: FrameId, name: &str) -> Option<&str> {
        self.binding_within(frame, root, name)
            .and_then(|binding| binding.as_deref())
    }

    pub fn has_local(&self, frame: FrameId, name: &str) -> bool {
        self.frames
            .get(frame)
            .is_some_and(|bindings| bindings.values.contains_key(name))
    }

    fn binding_within(&self, frame: FrameId, root: FrameId, name: &str) -> Option<&Option<String>> {
        for (id, bindings) in self.frames.ancestors(frame) {
            if id == root {
                break;
            }
            if let Some(binding) = bindings.get(name) {
                return Some(binding);
            }
        }
        None
    }

    /// Copies the value visible in `frame` into `frame` itself, so writes to
    /// ancestors no longer show through.
    pub fn localize_within(&mut self, frame: FrameId, root: FrameId, name: &str) {
        if self.has_local(frame, name) {
            return;
        }
        let binding = self
            .binding_within(frame, root, name)
            .cloned()
            .unwrap_or(None);
        if let Some(bindings) = self.frames.get_mut(frame) {
            bindings.values.insert(name.to_string(), binding);
        }
    }

    /// Pins the child's view of `name` and writes the same value into `parent`.
    pub fn raise(&mut self, child: FrameId, parent: FrameId, name: &str) {
        self.raise_within(child, parent, NodeId::ROOT, name);
    }

    pub fn raise_within(&mut self, child: FrameId, parent: FrameId, root: FrameId, name: &str) {
        self.localize_within(child, root, name);
        let value = self
            .lookup_within(child, root, name)
            .map(str::to_string);
        match value {
            Some(value) => self.define(parent, name, value),
            None => self.unset(parent, name),
        }
    }

    /// Flattens every binding visible from `frame` down to `root` into a single
    /// frame. Unset names are dropped.
    pub fn closure(&self, frame: FrameId, root: FrameId) -> Bindings {
        let mut closure = Bindings::default();
        let mut seen = BTreeSet::new();
        for (id, bindings) in self.frames.ancestors(frame) {
            if id == root {
                break;
            }
            for (name, value) in &bindings.values {
                if !seen.insert(name.clone()) {
                    continue;
                }
                if let Some(value) = value {
                    closure.values.insert(name.clone(), Some(value.clone()));
                }
            }
        }
        closure
    }

    pub fn replace(&mut self, frame: FrameId, bindings: Bindings) {
        if let Some(slot) = self.frames.get_mut(frame) {
            *slot = bindings;
        }
    }

    /// Sorted names with a value visible from `frame`.
    pub fn closure_keys(&self, frame: FrameId, root: FrameId) -> Vec<String> {
        let mut keys: Vec<String> = self.closure(frame, root).values.into_keys().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> (Environment, FrameId) {
        let mut env = Environment::new();
        let base = env.push(NodeId::ROOT);
        (env, base)
    }

    #[test]
    fn child_writes_stay_in_child() {
        let (mut env, parent) = base();
        env.define(parent, "X", "1");
        let child = env.push(parent);
        env.define(child, "X", "2");
        assert_eq!(env.lookup(parent, "X"), Some("1"));
        assert_eq!(env.lookup(child, "X"), Some("2"));
    }

    #[test]
    fn undefine_reveals_ancestor() {
        let (mut env, parent) = base();
        env.define(parent, "X", "a");
        let child = env.push(parent);
        env.define(child, "X", "b");
        env.undefine(child, "X");
        assert_eq!(env.lookup(child, "X"), Some("a"));
    }

    #[test]
    fn unset_hides_ancestor() {
        let (mut env, parent) = base();
        env.define(parent, "X", "a");
        let child = env.push(parent);
        env.unset(child, "X");
        assert_eq!(env.lookup(child, "X"), None);
        assert_eq!(env.lookup(parent, "X"), Some("a"));
    }

    #[test]
    fn raise_writes_parent_and_pins_child() {
        let (mut env, parent) = base();
        env.define(parent, "X", "old");
        let child = env.push(parent);
        env.define(child, "X", "v");
        env.raise(child, parent, "X");
        assert_eq!(env.lookup(parent, "X"), Some("v"));
        assert_eq!(env.lookup(child, "X"), Some("v"));

        env.define(parent, "Y", "p");
        env.raise(child, parent, "Y");
        env.define(parent, "Y", "later");
        assert_eq!(env.lookup(child, "Y"), Some("p"));
    }

    #[test]
    fn raise_of_missing_name_unsets_parent() {
        let (mut env, parent) = base();
        env.define(parent, "Z", "1");
        let child = env.push(parent);
        env.unset(child, "Z");
        env.raise(child, parent, "Z");
        assert_eq!(env.lookup(parent, "Z"), None);
    }

    #[test]
    fn bounded_lookup_stops_at_root_frame() {
        let (mut env, outer) = base();
        env.define(outer, "A", "outer");
        let inner = env.push(outer);
        assert_eq!(env.lookup_within(inner, outer, "A"), None);
        assert_eq!(env.lookup(inner, "A"), Some("outer"));
    }

    #[test]
    fn closure_flattens_visible_bindings() {
        let (mut env, parent) = base();
        env.define(parent, "A", "1");
        env.define(parent, "B", "2");
        let child = env.push(parent);
        env.define(child, "A", "3");
        env.unset(child, "B");
        let closure = env.closure(child, NodeId::ROOT);
        assert_eq!(closure.len(), 1);
        assert_eq!(env.closure_keys(child, NodeId::ROOT), vec!["A".to_string()]);
    }
}
