use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyMap {
    values: BTreeMap<String, String>,
}

impl PropertyMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) {
        self.values.remove(name);
    }

    /// Appends `value` as a list element, or as raw text when `as_string` is set.
    pub fn append(&mut self, name: &str, value: &str, as_string: bool) {
        if value.is_empty() {
            return;
        }
        let entry = self.values.entry(name.to_string()).or_default();
        if !entry.is_empty() && !as_string {
            entry.push(';');
        }
        entry.push_str(value);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyScope {
    Global,
    Directory,
    Target,
    Source,
    Test,
    Variable,
    Cache,
}

impl PropertyScope {
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "GLOBAL" => Some(PropertyScope::Global),
            "DIRECTORY" => Some(PropertyScope::Directory),
            "TARGET" => Some(PropertyScope::Target),
            "SOURCE" => Some(PropertyScope::Source),
            "TEST" => Some(PropertyScope::Test),
            "VARIABLE" => Some(PropertyScope::Variable),
            "CACHED_VARIABLE" | "CACHE" => Some(PropertyScope::Cache),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyScope::Global => "GLOBAL",
            PropertyScope::Directory => "DIRECTORY",
            PropertyScope::Target => "TARGET",
            PropertyScope::Source => "SOURCE",
            PropertyScope::Test => "TEST",
            PropertyScope::Variable => "VARIABLE",
            PropertyScope::Cache => "CACHED_VARIABLE",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub brief: String,
    pub full: String,
    pub inherited: bool,
    pub initialize_from_variable: Option<String>,
}

#[derive(Default)]
pub struct PropertyDefinitions {
    definitions: BTreeMap<(PropertyScope, String), PropertyDefinition>,
}

impl PropertyDefinitions {
    pub fn define(&mut self, scope: PropertyScope, name: &str, definition: PropertyDefinition) {
        self.definitions
            .entry((scope, name.to_string()))
            .or_insert(definition);
    }

    pub fn get(&self, scope: PropertyScope, name: &str) -> Option<&PropertyDefinition> {
        self.definitions.get(&(scope, name.to_string()))
    }

    pub fn is_inherited(&self, scope: PropertyScope, name: &str) -> bool {
        self.get(scope, name).is_some_and(|def| def.inherited)
    }

    /// `(property, variable)` pairs declared with `INITIALIZE_FROM_VARIABLE`.
    pub fn initializers(&self, scope: PropertyScope) -> impl Iterator<Item = (&str, &str)> {
        self.definitions
            .iter()
            .filter(move |((def_scope, _), _)| *def_scope == scope)
            .filter_map(|((_, name), def)| {
                def.initialize_from_variable
                    .as_deref()
                    .map(|variable| (name.as_str(), variable))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_builds_lists_or_strings() {
        let mut props = PropertyMap::default();
        props.append("L", "a", false);
        props.append("L", "b", false);
        props.append("S", "a", true);
        props.append("S", "b", true);
        props.append("L", "", false);
        assert_eq!(props.get("L"), Some("a;b"));
        assert_eq!(props.get("S"), Some("ab"));
    }

    #[test]
    fn first_definition_wins() {
        let mut defs = PropertyDefinitions::default();
        defs.define(
            PropertyScope::Directory,
            "P",
            PropertyDefinition {
                inherited: true,
                ..PropertyDefinition::default()
            },
        );
        defs.define(PropertyScope::Directory, "P", PropertyDefinition::default());
        assert!(defs.is_inherited(PropertyScope::Directory, "P"));
    }
}
