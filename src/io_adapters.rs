use std::io::{self, Read, Result as IoResult, Write};
use std::process::Stdio;

/// The interpreter's own standard input.
///
/// Reads go straight to the process stdin; external commands inherit it.
pub struct InheritedStdin(io::Stdin);

impl InheritedStdin {
    pub fn new() -> Self {
        Self(io::stdin())
    }
}

impl Default for InheritedStdin {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.0.read(buf)
    }
}

impl crate::command::Stdin for InheritedStdin {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// The interpreter's own standard output.
///
/// Builtins write through it; the terminus of a pipeline inherits it.
pub struct InheritedStdout(io::Stdout);

impl InheritedStdout {
    pub fn new() -> Self {
        Self(io::stdout())
    }
}

impl Default for InheritedStdout {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for InheritedStdout {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.0.write(data)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.0.flush()
    }
}

impl crate::command::Stdout for InheritedStdout {
    fn stdio(mut self: Box<Self>) -> Stdio {
        // Builtin output may still sit in the buffer; the child writes to the fd directly.
        if let Err(err) = self.0.flush() {
            log::warn!("failed to flush stdout before running a command: {}", err);
        }
        Stdio::inherit()
    }
}
