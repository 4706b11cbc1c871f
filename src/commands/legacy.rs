//! Commands kept only to tell old scripts they are gone.

use crate::runtime::{
    cache::CacheEntryType, interpreter::Interpreter, policies::PolicyId, registry::CommandRegistry,
    status::ExecutionStatus,
};

pub fn register(registry: &mut CommandRegistry) {
    registry.add_disallowed(
        "build_name",
        build_name_command,
        PolicyId::Cmp0036,
        "The build_name command should not be called; see CMP0036.",
    );
    registry.add_removed(
        "export_library_dependencies",
        "The export_library_dependencies command should not be called; see CMP0033.",
    );
    registry.add_removed(
        "load_command",
        "The load_command command should not be called; see CMP0031.",
    );
}

fn sanitize_build_name(name: &str) -> String {
    name.replace(['/', '(', ')'], "_")
}

/// Stores `<os>-<arch>-<compiler>` in the named cache entry, or cleans up
/// a name the script already set.
fn build_name_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(variable) = args.first() else {
        return status.fail("called with incorrect number of arguments");
    };
    if let Some(existing) = interp.definition(variable) {
        if existing.contains(['/', '(', ')']) {
            let cleaned = sanitize_build_name(existing);
            interp.add_cache_definition(variable, &cleaned, "Name of build.", CacheEntryType::String, false);
        }
        return true;
    }

    let mut name = if interp.is_definition_set("UNIX") {
        format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
    } else {
        "WinNT".to_string()
    };
    let compiler = interp.safe_definition("CMAKE_CXX_COMPILER");
    let compiler = compiler.rsplit(['/', '\\']).next().unwrap_or_default();
    name.push('-');
    name.push_str(compiler);
    let name = sanitize_build_name(&name);
    interp.add_cache_definition(variable, &name, "Name of build.", CacheEntryType::String, false);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_names_avoid_path_characters() {
        assert_eq!(sanitize_build_name("Linux-x86(64)/gcc"), "Linux-x86_64__gcc");
    }
}
