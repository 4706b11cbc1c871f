//! An embeddable interpreter for the CMake list-file language: the
//! variable and policy scopes, the command registry and the built-in
//! commands, driven either as `-P` scripts or as a directory configure.

#![allow(clippy::collapsible_if)]

pub mod commands;
pub mod language;
pub mod runtime;
pub mod target;
pub mod tools;

#[cfg(test)]
mod tests;
