pub mod blocker;
pub mod cache;
pub mod condition;
pub mod config;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod messenger;
pub mod platform;
pub mod policies;
pub mod properties;
pub mod registry;
pub mod state;
pub mod status;
pub mod tree;

pub use config::{EngineOptions, LogLevel, WorkingMode};
pub use error::{RuntimeError, RuntimeResult};
pub use interpreter::Interpreter;
