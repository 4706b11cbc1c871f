use crate::runtime::properties::PropertyMap;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheEntryType {
    Bool,
    Path,
    FilePath,
    String,
    Internal,
    Static,
    Uninitialized,
}

impl CacheEntryType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "BOOL" => Some(CacheEntryType::Bool),
            "PATH" => Some(CacheEntryType::Path),
            "FILEPATH" => Some(CacheEntryType::FilePath),
            "STRING" => Some(CacheEntryType::String),
            "INTERNAL" => Some(CacheEntryType::Internal),
            "STATIC" => Some(CacheEntryType::Static),
            "UNINITIALIZED" => Some(CacheEntryType::Uninitialized),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheEntryType::Bool => "BOOL",
            CacheEntryType::Path => "PATH",
            CacheEntryType::FilePath => "FILEPATH",
            CacheEntryType::String => "STRING",
            CacheEntryType::Internal => "INTERNAL",
            CacheEntryType::Static => "STATIC",
            CacheEntryType::Uninitialized => "UNINITIALIZED",
        }
    }
}

impl fmt::Display for CacheEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: String,
    pub kind: CacheEntryType,
    pub properties: PropertyMap,
}

/// Persistent variables that outlive every scope of a run.
#[derive(Default)]
pub struct Cache {
    entries: BTreeMap<String, CacheEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, name: &str) -> Option<&CacheEntry> {
        self.entries.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn add_entry(&mut self, name: &str, value: &str, help: &str, kind: CacheEntryType) {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| CacheEntry {
                value: String::new(),
                kind,
                properties: PropertyMap::default(),
            });
        entry.value = value.to_string();
        entry.kind = kind;
        if !help.is_empty() {
            entry.properties.set("HELPSTRING", help);
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.remove(name);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn property(&self, name: &str, property: &str) -> Option<String> {
        let entry = self.entries.get(name)?;
        match property {
            "TYPE" => Some(entry.kind.as_str().to_string()),
            "VALUE" => Some(entry.value.clone()),
            _ => entry.properties.get(property).map(str::to_string),
        }
    }

    pub fn set_property(&mut self, name: &str, property: &str, value: &str, append: bool) -> bool {
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        match property {
            "TYPE" => {
                if let Some(kind) = CacheEntryType::parse(value) {
                    entry.kind = kind;
                }
            }
            "VALUE" if append => entry.value = append_list(&entry.value, value),
            "VALUE" => entry.value = value.to_string(),
            _ if append => entry.properties.append(property, value, false),
            _ => entry.properties.set(property, value),
        }
        true
    }
}

fn append_list(current: &str, value: &str) -> String {
    match (current.is_empty(), value.is_empty()) {
        (true, _) => value.to_string(),
        (_, true) => current.to_string(),
        _ => format!("{current};{value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_type_and_help() {
        let mut cache = Cache::new();
        cache.add_entry("OPT", "ON", "an option", CacheEntryType::Bool);
        assert_eq!(cache.value("OPT"), Some("ON"));
        assert_eq!(cache.property("OPT", "TYPE").as_deref(), Some("BOOL"));
        assert_eq!(
            cache.property("OPT", "HELPSTRING").as_deref(),
            Some("an option")
        );
        assert!(cache.set_property("OPT", "VALUE", "x", true));
        assert_eq!(cache.value("OPT"), Some("ON;x"));
        assert!(!cache.set_property("MISSING", "VALUE", "x", false));
    }
}
