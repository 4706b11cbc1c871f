use crate::language::ast::{ListFileContext, ListFileFunction};
use crate::runtime::{interpreter::Interpreter, status::ExecutionStatus};

/// A block construct that records commands until its terminator arrives.
///
/// The interpreter only consults the innermost blocker. Same-named openings
/// nest by depth, so `if()` inside a buffered `if()` block is recorded rather
/// than opening a second blocker.
pub trait FunctionBlocker: Send {
    fn start_command_name(&self) -> &str;
    fn end_command_name(&self) -> &str;

    fn end_command_supports_arguments(&self) -> bool {
        true
    }

    fn arguments_match(&self, _end: &ListFileFunction, _interp: &mut Interpreter) -> bool {
        true
    }

    /// Executes the recorded commands once the block is closed.
    fn replay(self: Box<Self>, body: BlockBody, status: &mut ExecutionStatus, interp: &mut Interpreter) -> bool;

    /// Releases whatever the blocker acquired when it is dropped unclosed.
    fn unwind(self: Box<Self>, _interp: &mut Interpreter) {}
}

pub struct BlockBody {
    pub functions: Vec<ListFileFunction>,
    pub starting_context: ListFileContext,
}

pub struct BlockerFrame {
    pub blocker: Box<dyn FunctionBlocker>,
    pub starting_context: ListFileContext,
    depth: usize,
    functions: Vec<ListFileFunction>,
}

impl BlockerFrame {
    pub fn into_body(self) -> (Box<dyn FunctionBlocker>, BlockBody) {
        (
            self.blocker,
            BlockBody {
                functions: self.functions,
                starting_context: self.starting_context,
            },
        )
    }
}

pub enum Interception {
    NotBlocked,
    Buffered,
    Closed(BlockerFrame),
}

#[derive(Default)]
pub struct BlockerStack {
    frames: Vec<BlockerFrame>,
    barriers: Vec<usize>,
}

impl BlockerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, blocker: Box<dyn FunctionBlocker>, starting_context: ListFileContext) {
        self.frames.push(BlockerFrame {
            blocker,
            starting_context,
            depth: 1,
            functions: Vec::new(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Offers `function` to the innermost blocker.
    pub fn intercept(&mut self, function: &ListFileFunction) -> Interception {
        let Some(top) = self.frames.last_mut() else {
            return Interception::NotBlocked;
        };
        let name = function.lower_name();
        let mut closed = false;
        if name == top.blocker.start_command_name() {
            top.depth += 1;
        } else if name == top.blocker.end_command_name() {
            top.depth -= 1;
            closed = top.depth == 0;
        }
        if !closed {
            top.functions.push(function.clone());
            return Interception::Buffered;
        }
        match self.frames.pop() {
            Some(frame) => Interception::Closed(frame),
            None => Interception::NotBlocked,
        }
    }

    pub fn push_barrier(&mut self) {
        self.barriers.push(self.frames.len());
    }

    /// Removes the latest barrier and returns the blockers opened since it,
    /// innermost first.
    pub fn pop_barrier(&mut self) -> Vec<BlockerFrame> {
        let barrier = self.barriers.pop().unwrap_or(0);
        let mut unclosed = Vec::new();
        while self.frames.len() > barrier {
            if let Some(frame) = self.frames.pop() {
                unclosed.push(frame);
            }
        }
        unclosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ast::ListFileArgument;

    struct Recording;

    impl FunctionBlocker for Recording {
        fn start_command_name(&self) -> &str {
            "if"
        }

        fn end_command_name(&self) -> &str {
            "endif"
        }

        fn replay(self: Box<Self>, _body: BlockBody, _status: &mut ExecutionStatus, _interp: &mut Interpreter) -> bool {
            true
        }
    }

    fn call(name: &str, arg: &str) -> ListFileFunction {
        let arguments = if arg.is_empty() {
            Vec::new()
        } else {
            vec![ListFileArgument::unquoted(arg, 1)]
        };
        ListFileFunction::new(name, 1, 1, arguments)
    }

    #[test]
    fn nested_blocks_are_buffered_until_outer_end() {
        let mut stack = BlockerStack::new();
        stack.push(Box::new(Recording), ListFileContext::new("if", "t", 1));
        assert!(matches!(stack.intercept(&call("if", "B")), Interception::Buffered));
        assert!(matches!(stack.intercept(&call("endif", "")), Interception::Buffered));
        match stack.intercept(&call("endif", "")) {
            Interception::Closed(frame) => {
                let (_, body) = frame.into_body();
                let names: Vec<&str> = body.functions.iter().map(|f| f.lower_name()).collect();
                assert_eq!(names, vec!["if", "endif"]);
            }
            _ => panic!("outer endif should close the block"),
        }
        assert!(stack.is_empty());
        assert!(matches!(stack.intercept(&call("set", "x")), Interception::NotBlocked));
    }

    #[test]
    fn barrier_returns_unclosed_blockers() {
        let mut stack = BlockerStack::new();
        stack.push(Box::new(Recording), ListFileContext::new("if", "outer", 1));
        stack.push_barrier();
        stack.push(Box::new(Recording), ListFileContext::new("if", "inner", 2));
        let unclosed = stack.pop_barrier();
        assert_eq!(unclosed.len(), 1);
        assert_eq!(unclosed[0].starting_context.file_path, "inner");
        assert_eq!(stack.len(), 1);
    }
}
