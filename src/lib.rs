//! A small interactive shell with pipelines.
//!
//! A line is split into words (double quotes and backslash escapes keep
//! whitespace and `|` literal), parsed into a chain of [`Command`]s joined by
//! pipes and handed to the [`Executor`]. A lone command whose name is a
//! registered builtin runs in-process; everything else is spawned as external
//! processes wired stdout to stdin.
//!
//! [`Interpreter`] ties this together with a line editor, persistent
//! [`History`] and a configurable prompt.

pub mod builtin;
pub mod command;
mod completion;
pub mod env;
pub mod executor;
mod external;
pub mod history;
mod interpreter;
mod io_adapters;
mod lexer;
mod ls;
pub mod parser;
pub mod theme;

#[cfg(test)]
mod test_support;

pub use builtin::BuiltinRegistry;
pub use command::Builtin;
pub use env::Environment;
pub use executor::{ExecutionError, Executor};
pub use history::History;
pub use interpreter::{DEFAULT_PROMPT, Interpreter, LineError};
pub use parser::{Command, ParseError, parse};
