use crate::language::ast::ListFileArgument;
use crate::runtime::{
    interpreter::Interpreter,
    messenger::MessageType,
    policies::{PolicyId, PolicyStatus},
    status::ExecutionStatus,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A callable command. Receives the unexpanded arguments of the invocation.
pub type Command = Arc<dyn Fn(&mut Interpreter, &[ListFileArgument], &mut ExecutionStatus) -> bool + Send + Sync>;

/// A native command that operates on already expanded arguments.
pub type BuiltinCommand = fn(&mut Interpreter, &[String], &mut ExecutionStatus) -> bool;

/// A native command that expands its own arguments.
pub type RawCommand = fn(&mut Interpreter, &[ListFileArgument], &mut ExecutionStatus) -> bool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptedKind {
    Function,
    Macro,
}

#[derive(Clone)]
struct ScriptedEntry {
    command: Command,
    kind: Option<ScriptedKind>,
}

#[derive(Default)]
pub struct CommandRegistry {
    builtins: HashMap<String, Command>,
    scripted: HashMap<String, ScriptedEntry>,
    flow_control: BTreeSet<String>,
}

fn with_expanded_arguments(builtin: BuiltinCommand) -> Command {
    Arc::new(move |interp: &mut Interpreter, args: &[ListFileArgument], status: &mut ExecutionStatus| {
        match interp.expand_arguments(args) {
            Some(expanded) => builtin(interp, &expanded, status),
            // expansion already reported the error
            None => true,
        }
    })
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Command> {
        let lower = name.to_ascii_lowercase();
        self.scripted
            .get(&lower)
            .map(|entry| entry.command.clone())
            .or_else(|| self.builtins.get(&lower).cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn add_builtin(&mut self, name: &str, command: BuiltinCommand) {
        self.builtins
            .insert(name.to_ascii_lowercase(), with_expanded_arguments(command));
    }

    pub fn add_builtin_raw(&mut self, name: &str, command: RawCommand) {
        self.builtins
            .insert(name.to_ascii_lowercase(), Arc::new(command));
    }

    pub fn add_flow_control(&mut self, name: &str, command: BuiltinCommand) {
        self.flow_control.insert(name.to_ascii_lowercase());
        self.add_builtin(name, command);
    }

    pub fn add_flow_control_raw(&mut self, name: &str, command: RawCommand) {
        self.flow_control.insert(name.to_ascii_lowercase());
        self.add_builtin_raw(name, command);
    }

    /// Registers a command gated by `policy`: OLD runs it silently, unset
    /// runs it with a warning, NEW rejects it with `message`.
    pub fn add_disallowed(&mut self, name: &str, command: BuiltinCommand, policy: PolicyId, message: &'static str) {
        let command: Command = Arc::new(move |interp: &mut Interpreter, args: &[ListFileArgument], status: &mut ExecutionStatus| {
            match interp.policy_status(policy) {
                PolicyStatus::Warn => {
                    interp.issue_message(MessageType::AuthorWarning, policy.warning());
                }
                PolicyStatus::Old => {}
                PolicyStatus::New => {
                    interp.issue_message(MessageType::FatalError, message);
                    return true;
                }
            }
            match interp.expand_arguments(args) {
                Some(expanded) => command(interp, &expanded, status),
                None => true,
            }
        });
        self.builtins.insert(name.to_ascii_lowercase(), command);
    }

    /// Registers a command that always fails with `message`.
    pub fn add_removed(&mut self, name: &str, message: impl Into<String>) {
        let message: String = message.into();
        let command: Command = Arc::new(move |interp: &mut Interpreter, _args: &[ListFileArgument], _status: &mut ExecutionStatus| {
            interp.issue_message(MessageType::FatalError, message.clone());
            true
        });
        self.builtins.insert(name.to_ascii_lowercase(), command);
    }

    /// Registers a block terminator that is only valid inside its block.
    pub fn add_unexpected(&mut self, name: &str, error: &'static str) {
        let lower = name.to_ascii_lowercase();
        let is_endif = lower == "endif";
        let command: Command = Arc::new(move |interp: &mut Interpreter, _args: &[ListFileArgument], status: &mut ExecutionStatus| {
            if is_endif {
                let tolerated = match interp.definition("CMAKE_MINIMUM_REQUIRED_VERSION") {
                    None => true,
                    Some(version) => leading_number(version) <= 1.4,
                };
                if tolerated {
                    return true;
                }
            }
            status.fail(error)
        });
        self.flow_control.insert(lower.clone());
        self.builtins.insert(lower, command);
    }

    /// Installs a user-defined command. An existing command of the same name
    /// stays reachable as `_<name>`.
    pub fn add_scripted(&mut self, name: &str, command: Command, kind: ScriptedKind) -> Result<(), String> {
        let lower = name.to_ascii_lowercase();
        if self.flow_control.contains(&lower) {
            return Err(format!(
                "Built-in flow control command \"{lower}\" cannot be overridden."
            ));
        }
        if let Some(previous) = self.scripted.get(&lower).cloned() {
            self.scripted.insert(format!("_{lower}"), previous);
        } else if let Some(previous) = self.builtins.get(&lower).cloned() {
            self.scripted.insert(
                format!("_{lower}"),
                ScriptedEntry {
                    command: previous,
                    kind: None,
                },
            );
        }
        self.scripted.insert(
            lower,
            ScriptedEntry {
                command,
                kind: Some(kind),
            },
        );
        Ok(())
    }

    pub fn command_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.builtins.keys().chain(self.scripted.keys()).collect();
        names.into_iter().cloned().collect()
    }

    pub fn macro_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scripted
            .iter()
            .filter(|(_, entry)| entry.kind == Some(ScriptedKind::Macro))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Numeric prefix of a version string, as `atof` would read it.
fn leading_number(text: &str) -> f64 {
    let end = text
        .char_indices()
        .scan(false, |seen_dot, (idx, c)| {
            if c.is_ascii_digit() {
                Some(idx + 1)
            } else if c == '.' && !*seen_dot {
                *seen_dot = true;
                Some(idx + 1)
            } else {
                None
            }
        })
        .last()
        .unwrap_or(0);
    text[..end].trim_end_matches('.').parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Interpreter, _: &[String], _: &mut ExecutionStatus) -> bool {
        true
    }

    fn scripted() -> Command {
        Arc::new(|_: &mut Interpreter, _: &[ListFileArgument], _: &mut ExecutionStatus| true)
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = CommandRegistry::new();
        registry.add_builtin("Message", noop);
        assert!(registry.contains("MESSAGE"));
        assert!(registry.contains("message"));
        assert!(!registry.contains("other"));
    }

    #[test]
    fn scripted_commands_shadow_and_keep_previous() {
        let mut registry = CommandRegistry::new();
        registry.add_builtin("message", noop);
        registry
            .add_scripted("message", scripted(), ScriptedKind::Function)
            .expect("define");
        assert!(registry.contains("_message"));
        registry
            .add_scripted("Message", scripted(), ScriptedKind::Macro)
            .expect("redefine");
        assert!(registry.contains("_message"));
        assert_eq!(registry.macro_names(), vec!["message".to_string()]);
    }

    #[test]
    fn flow_control_cannot_be_overridden() {
        let mut registry = CommandRegistry::new();
        registry.add_flow_control("if", noop);
        let err = registry
            .add_scripted("IF", scripted(), ScriptedKind::Function)
            .expect_err("protected");
        assert_eq!(
            err,
            "Built-in flow control command \"if\" cannot be overridden."
        );
    }

    #[test]
    fn reads_leading_version_number() {
        assert_eq!(leading_number("1.4"), 1.4);
        assert_eq!(leading_number("3.10.2"), 3.1);
        assert_eq!(leading_number("x"), 0.0);
    }
}
