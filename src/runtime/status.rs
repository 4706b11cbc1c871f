/// Outcome record threaded through every command invocation.
#[derive(Clone, Debug)]
pub struct ExecutionStatus {
    error: String,
    return_invoked: bool,
    return_variables: Vec<String>,
    break_invoked: bool,
    continue_invoked: bool,
    nested_error: bool,
    exit_code: Option<i32>,
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self {
            error: "unknown error".into(),
            return_invoked: false,
            return_variables: Vec::new(),
            break_invoked: false,
            continue_invoked: false,
            nested_error: false,
            exit_code: None,
        }
    }
}

/// Control transfer requested by a nested command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlFlow {
    Return(Vec<String>),
    Break,
    Continue,
    Exit(i32),
}

impl ExecutionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = message.into();
    }

    /// Convenience for command bodies: records `message` and reports failure.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        self.set_error(message);
        false
    }

    pub fn set_return_invoked(&mut self) {
        self.return_variables.clear();
        self.return_invoked = true;
    }

    pub fn set_return_invoked_with(&mut self, variables: Vec<String>) {
        self.return_variables = variables;
        self.return_invoked = true;
    }

    pub fn return_invoked(&self) -> bool {
        self.return_invoked
    }

    pub fn return_variables(&self) -> &[String] {
        &self.return_variables
    }

    pub fn set_break_invoked(&mut self) {
        self.break_invoked = true;
    }

    pub fn break_invoked(&self) -> bool {
        self.break_invoked
    }

    pub fn set_continue_invoked(&mut self) {
        self.continue_invoked = true;
    }

    pub fn continue_invoked(&self) -> bool {
        self.continue_invoked
    }

    pub fn set_nested_error(&mut self) {
        self.nested_error = true;
    }

    pub fn nested_error(&self) -> bool {
        self.nested_error
    }

    pub fn set_exit_code(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn has_exit_code(&self) -> bool {
        self.exit_code.is_some()
    }

    /// The first pending control transfer, checked in return, break,
    /// continue, exit order.
    pub fn control_flow(&self) -> Option<ControlFlow> {
        if self.return_invoked {
            Some(ControlFlow::Return(self.return_variables.clone()))
        } else if self.break_invoked {
            Some(ControlFlow::Break)
        } else if self.continue_invoked {
            Some(ControlFlow::Continue)
        } else {
            self.exit_code.map(ControlFlow::Exit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_unknown_error() {
        let status = ExecutionStatus::new();
        assert_eq!(status.error(), "unknown error");
        assert_eq!(status.control_flow(), None);
        assert!(!status.has_exit_code());
    }

    #[test]
    fn reports_pending_control_flow() {
        let mut status = ExecutionStatus::new();
        status.set_return_invoked_with(vec!["X".into()]);
        assert_eq!(
            status.control_flow(),
            Some(ControlFlow::Return(vec!["X".into()]))
        );
        let mut status = ExecutionStatus::new();
        status.set_exit_code(3);
        assert_eq!(status.control_flow(), Some(ControlFlow::Exit(3)));
    }
}
