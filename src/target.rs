use crate::runtime::properties::PropertyMap;
use std::collections::BTreeMap;

/// Kind of build target a script declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetType {
    Executable,
    StaticLibrary,
    SharedLibrary,
    ModuleLibrary,
    ObjectLibrary,
    InterfaceLibrary,
    UnknownLibrary,
    Utility,
}

impl TargetType {
    /// Library type keyword accepted by `add_library`.
    pub fn from_library_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "STATIC" => Some(TargetType::StaticLibrary),
            "SHARED" => Some(TargetType::SharedLibrary),
            "MODULE" => Some(TargetType::ModuleLibrary),
            "OBJECT" => Some(TargetType::ObjectLibrary),
            "INTERFACE" => Some(TargetType::InterfaceLibrary),
            "UNKNOWN" => Some(TargetType::UnknownLibrary),
            _ => None,
        }
    }

    /// Value of the `TYPE` property.
    pub fn as_property(self) -> &'static str {
        match self {
            TargetType::Executable => "EXECUTABLE",
            TargetType::StaticLibrary => "STATIC_LIBRARY",
            TargetType::SharedLibrary => "SHARED_LIBRARY",
            TargetType::ModuleLibrary => "MODULE_LIBRARY",
            TargetType::ObjectLibrary => "OBJECT_LIBRARY",
            TargetType::InterfaceLibrary => "INTERFACE_LIBRARY",
            TargetType::UnknownLibrary => "UNKNOWN_LIBRARY",
            TargetType::Utility => "UTILITY",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            TargetType::Executable => "an executable",
            TargetType::StaticLibrary => "a static library",
            TargetType::SharedLibrary => "a shared library",
            TargetType::ModuleLibrary => "a module library",
            TargetType::ObjectLibrary => "an object library",
            TargetType::InterfaceLibrary => "an interface library",
            TargetType::UnknownLibrary => "an unknown library",
            TargetType::Utility => "a custom target",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Target {
    pub name: String,
    pub kind: TargetType,
    pub directory: String,
    pub imported: bool,
    pub properties: PropertyMap,
}

impl Target {
    pub fn new(name: impl Into<String>, kind: TargetType, directory: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            directory: directory.into(),
            imported: false,
            properties: PropertyMap::default(),
        }
    }

    /// Reads a property, including the read-only ones derived from the target itself.
    pub fn property(&self, name: &str) -> Option<String> {
        match name {
            "NAME" => Some(self.name.clone()),
            "TYPE" => Some(self.kind.as_property().to_string()),
            "SOURCE_DIR" => Some(self.directory.clone()),
            "IMPORTED" => Some(if self.imported { "TRUE" } else { "FALSE" }.to_string()),
            _ => self.properties.get(name).map(str::to_string),
        }
    }

    pub fn is_read_only(name: &str) -> bool {
        matches!(name, "NAME" | "TYPE" | "SOURCE_DIR" | "IMPORTED" | "ALIASED_TARGET")
    }
}

/// Every target declared during a run, plus aliases.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Target>,
    aliases: BTreeMap<String, String>,
}

impl TargetRegistry {
    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name) || self.aliases.contains_key(name)
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    pub fn aliased_target(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    fn resolve<'n>(&'n self, name: &'n str) -> &'n str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(self.resolve(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Target> {
        let resolved = self.resolve(name).to_string();
        self.targets.get_mut(&resolved)
    }

    /// Adds a target. Fails with a description of the clashing target.
    pub fn add(&mut self, target: Target) -> Result<(), String> {
        if let Some(existing) = self.get(&target.name) {
            return Err(format!(
                "another target with the same name already exists.  The existing target is {} created in source directory \"{}\".",
                existing.kind.describe(),
                existing.directory
            ));
        }
        self.targets.insert(target.name.clone(), target);
        Ok(())
    }

    pub fn add_alias(&mut self, alias: &str, target: &str) -> Result<(), String> {
        if self.contains(alias) {
            return Err("another target with the same name already exists.".into());
        }
        if self.is_alias(target) {
            return Err(format!("target \"{target}\" is itself an ALIAS."));
        }
        if !self.targets.contains_key(target) {
            return Err(format!("target \"{target}\" does not already exist."));
        }
        self.aliases.insert(alias.to_string(), target.to_string());
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = TargetRegistry::default();
        registry
            .add(Target::new("app", TargetType::Executable, "/src"))
            .expect("first");
        let err = registry
            .add(Target::new("app", TargetType::StaticLibrary, "/src/lib"))
            .expect_err("duplicate");
        assert!(err.contains("an executable created in source directory \"/src\""));
    }

    #[test]
    fn aliases_resolve_to_their_target() {
        let mut registry = TargetRegistry::default();
        registry
            .add(Target::new("core", TargetType::StaticLibrary, "/src"))
            .expect("add");
        registry.add_alias("ns::core", "core").expect("alias");
        assert!(registry.contains("ns::core"));
        assert_eq!(
            registry.get("ns::core").map(|t| t.kind),
            Some(TargetType::StaticLibrary)
        );
        assert!(registry.add_alias("other", "ns::core").is_err());
        assert!(registry.add_alias("x", "missing").is_err());
    }

    #[test]
    fn derived_properties() {
        let target = Target::new("tool", TargetType::Utility, "/src");
        assert_eq!(target.property("TYPE").as_deref(), Some("UTILITY"));
        assert_eq!(target.property("NAME").as_deref(), Some("tool"));
        assert_eq!(target.property("SOURCES"), None);
    }
}
