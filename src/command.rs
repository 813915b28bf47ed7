use crate::env::Environment;
use anyhow::Result;
use std::io::{Read, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Abstraction over a readable input stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// Implementors typically wrap standard input or a file. A blanket implementation
/// exists for any type that implements `Read` and `Into<Stdio>` (e.g. `File`).
pub trait Stdin: Read {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Read + Into<Stdio>> Stdin for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Abstraction over a writable output stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any type that implements `Write` and `Into<Stdio>`.
pub trait Stdout: Write {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Write + Into<Stdio>> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// A command implemented inside the shell process.
///
/// Handlers are registered once at startup and shared read-only afterwards,
/// hence the `Send + Sync` bound and the `&self` receiver.
pub trait Builtin: Send + Sync {
    /// Run the command with the given arguments.
    ///
    /// Output goes to `stdout`; failures are reported through the returned
    /// error and are shown to the user verbatim.
    fn execute(&self, args: &[String], stdout: &mut dyn Write, env: &mut Environment)
    -> Result<()>;

    /// Human readable usage text.
    fn help(&self) -> String;
}
