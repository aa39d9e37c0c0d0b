//! External tool abstractions.
//!
//! Provides the process-execution abstraction every CLI-backed adapter
//! (`bd`, `git`, `gh`) is built on, so call sites can swap in a fake
//! executor under test.

pub mod command;

pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
