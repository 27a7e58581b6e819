//! TinyFugue's expression language as a standalone library.
//!
//! [`script`] holds the compiler and bytecode evaluator, [`session`] an
//! in-memory host that runs them without a surrounding client.

pub mod cli;
pub mod config;
pub mod pattern;
pub mod script;
pub mod session;
pub mod tfstr;
