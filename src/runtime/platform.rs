use std::collections::HashMap;
use std::path::Path;

/// File system and environment access used by commands. The environment is
/// an overlay: writes stay inside this value and reads fall back to the
/// process environment.
pub trait Platform: Send + Sync {
    fn fs_exists(&self, path: &str) -> bool;
    fn fs_is_dir(&self, path: &str) -> bool;
    fn fs_is_symlink(&self, path: &str) -> bool;
    fn fs_read(&self, path: &str) -> Result<String, String>;
    fn current_dir(&self) -> String;
    fn env_get(&self, name: &str) -> Option<String>;
    fn env_set(&mut self, name: &str, value: &str);
    fn env_unset(&mut self, name: &str);
}

#[derive(Default)]
pub struct StdPlatform {
    env_overlay: HashMap<String, Option<String>>,
}

impl StdPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Platform for StdPlatform {
    fn fs_exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn fs_is_dir(&self, path: &str) -> bool {
        Path::new(path).is_dir()
    }

    fn fs_is_symlink(&self, path: &str) -> bool {
        Path::new(path).is_symlink()
    }

    fn fs_read(&self, path: &str) -> Result<String, String> {
        std::fs::read_to_string(path).map_err(|err| err.to_string())
    }

    fn current_dir(&self) -> String {
        std::env::current_dir()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_else(|_| ".".into())
    }

    fn env_get(&self, name: &str) -> Option<String> {
        match self.env_overlay.get(name) {
            Some(value) => value.clone(),
            None => std::env::var(name).ok(),
        }
    }

    fn env_set(&mut self, name: &str, value: &str) {
        self.env_overlay
            .insert(name.to_string(), Some(value.to_string()));
    }

    fn env_unset(&mut self, name: &str) {
        self.env_overlay.insert(name.to_string(), None);
    }
}

/// Joins `path` onto `base` unless it is already absolute, then removes
/// `.` and `..` components lexically.
pub fn collapse_full_path(path: &str, base: &str) -> String {
    let joined = if Path::new(path).is_absolute() || base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    };
    let absolute = joined.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }
    let body = parts.join("/");
    if absolute {
        format!("/{body}")
    } else if body.is_empty() {
        ".".into()
    } else {
        body
    }
}

pub fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".into(),
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overlay_shadows_process_environment() {
        let mut platform = StdPlatform::new();
        platform.env_set("LISTSCRIPT_TEST_VAR", "1");
        assert_eq!(platform.env_get("LISTSCRIPT_TEST_VAR").as_deref(), Some("1"));
        platform.env_unset("LISTSCRIPT_TEST_VAR");
        assert_eq!(platform.env_get("LISTSCRIPT_TEST_VAR"), None);
        assert!(std::env::var("LISTSCRIPT_TEST_VAR").is_err());
    }

    #[test]
    fn collapses_relative_paths() {
        assert_eq!(collapse_full_path("sub/../a.cmake", "/src"), "/src/a.cmake");
        assert_eq!(collapse_full_path("/abs/./x", "/src"), "/abs/x");
        assert_eq!(parent_dir("/src/CMakeLists.txt"), "/src");
        assert_eq!(parent_dir("/x"), "/");
    }
}
