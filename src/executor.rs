use crate::builtin::BuiltinRegistry;
use crate::command::{Stdin, Stdout};
use crate::env::Environment;
use crate::external;
use crate::io_adapters::{InheritedStdin, InheritedStdout};
use crate::parser::Command;
use std::io::{self, Write};
use thiserror::Error;

/// Errors surfaced while running a parsed pipeline.
///
/// None of them is fatal to the interpreter: the REPL prints the error and
/// moves on to the next line.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The external program could not be started (e.g. it does not exist).
    #[error("{name}: {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: io::Error,
    },
    /// The external program ran and exited unsuccessfully.
    #[error("{name}: exited with status {code}")]
    NonZeroExit { name: String, code: i32 },
    /// The output of a stage could not be connected to the next one.
    #[error("{name}: failed to connect output to the next stage")]
    StreamWireFailed { name: String },
    /// Waiting for a started process failed.
    #[error("{name}: failed to wait for process: {source}")]
    WaitFailed {
        name: String,
        #[source]
        source: io::Error,
    },
    /// A builtin reported a failure of its own.
    #[error(transparent)]
    Builtin(#[from] anyhow::Error),
}

/// Runs parsed pipelines against a fixed set of builtins.
///
/// A single command whose name is registered runs in-process. Anything else,
/// and every stage of a multi-stage pipeline, runs as an external process.
/// Builtins cannot take part in OS pipes: `cd /tmp | cat` runs an external
/// `cd` program, if one exists.
pub struct Executor {
    builtins: BuiltinRegistry,
}

impl Executor {
    pub fn new(builtins: BuiltinRegistry) -> Self {
        Self { builtins }
    }

    /// Every registered builtin, for completion and help listings.
    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    /// Execute `pipeline` using the interpreter's own standard streams.
    pub fn execute(&self, pipeline: &Command, env: &mut Environment) -> Result<(), ExecutionError> {
        self.execute_with_io(
            pipeline,
            env,
            Box::new(InheritedStdin::new()),
            Box::new(InheritedStdout::new()),
        )
    }

    /// Execute `pipeline` reading from `stdin` and writing its final output to `stdout`.
    pub fn execute_with_io(
        &self,
        pipeline: &Command,
        env: &mut Environment,
        stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
    ) -> Result<(), ExecutionError> {
        if !pipeline.is_pipeline() {
            if let Some(builtin) = self.builtins.get(pipeline.name()) {
                log::debug!("running builtin `{}`", pipeline.name());
                let result = builtin.execute(pipeline.args(), &mut stdout, env);
                stdout.flush().map_err(anyhow::Error::from)?;
                return result.map_err(ExecutionError::Builtin);
            }
        }

        let stages: Vec<&Command> = pipeline.stages().collect();
        if stages.len() > 1 {
            for stage in &stages {
                if self.builtins.contains(stage.name()) {
                    log::warn!(
                        "builtin `{}` cannot be used in a pipeline, running it as an external program",
                        stage.name()
                    );
                }
            }
        }

        let started = external::start_pipeline(&stages, env, stdin, stdout);
        // Reap everything that started before reporting anything.
        let outcomes = external::wait_all(started.stages);
        if let Some(error) = started.error {
            return Err(error);
        }
        outcomes.into_iter().collect()
    }
}
