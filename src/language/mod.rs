pub mod ast;
pub mod errors;
pub mod expand;
pub mod parser;
pub mod span;
