use crate::command::{ExitCode, Stdin, Stdout};
use crate::env::Environment;
use crate::executor::ExecutionError;
use crate::parser::Command;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};

/// A pipeline stage that has been spawned and not yet waited on.
pub(crate) struct RunningStage {
    name: String,
    child: Child,
}

/// Result of starting every stage of a pipeline.
///
/// `stages` holds the processes that did start; `error` is set when a stage
/// could not be spawned or wired, in which case no later stage was started.
pub(crate) struct StartedPipeline {
    pub(crate) stages: Vec<RunningStage>,
    pub(crate) error: Option<ExecutionError>,
}

/// Spawn one child per stage, connecting stage i's stdout to stage i+1's stdin.
///
/// The first stage reads from `stdin`, the last stage writes to `stdout`, and
/// every stage inherits the interpreter's stderr.
pub(crate) fn start_pipeline(
    stages: &[&Command],
    env: &Environment,
    stdin: Box<dyn Stdin>,
    stdout: Box<dyn Stdout>,
) -> StartedPipeline {
    let last = stages.len().saturating_sub(1);
    let mut running = Vec::with_capacity(stages.len());
    let mut input = stdin.stdio();
    let mut terminus = Some(stdout.stdio());

    for (i, stage) in stages.iter().enumerate() {
        let stage_input = std::mem::replace(&mut input, Stdio::null());
        let stage_output = if i == last {
            terminus.take().unwrap_or_else(Stdio::inherit)
        } else {
            Stdio::piped()
        };

        let mut child = match spawn(stage, env, stage_input, stage_output) {
            Ok(child) => child,
            Err(error) => {
                // Dropping the pending pipe end lets the previous stage see EOF/EPIPE.
                return StartedPipeline {
                    stages: running,
                    error: Some(error),
                };
            }
        };
        log::debug!("started `{}` (pid {})", stage.name(), child.id());

        if i != last {
            match child.stdout.take() {
                Some(pipe) => input = Stdio::from(pipe),
                None => {
                    running.push(RunningStage {
                        name: stage.name().to_string(),
                        child,
                    });
                    return StartedPipeline {
                        stages: running,
                        error: Some(ExecutionError::StreamWireFailed {
                            name: stage.name().to_string(),
                        }),
                    };
                }
            }
        }

        running.push(RunningStage {
            name: stage.name().to_string(),
            child,
        });
    }

    StartedPipeline {
        stages: running,
        error: None,
    }
}

/// Wait for every started stage, in order, exactly once.
///
/// Returns one outcome per stage; a failing stage never prevents the others
/// from being reaped.
pub(crate) fn wait_all(stages: Vec<RunningStage>) -> Vec<Result<(), ExecutionError>> {
    stages
        .into_iter()
        .map(|RunningStage { name, mut child }| match child.wait() {
            Ok(status) => {
                let code = exit_code(status);
                log::debug!("`{}` exited with status {}", name, code);
                if code == 0 {
                    Ok(())
                } else {
                    Err(ExecutionError::NonZeroExit { name, code })
                }
            }
            Err(source) => Err(ExecutionError::WaitFailed { name, source }),
        })
        .collect()
}

fn spawn(
    stage: &Command,
    env: &Environment,
    stdin: Stdio,
    stdout: Stdio,
) -> Result<Child, ExecutionError> {
    let name = stage.name();
    let search_paths = env.get_var("PATH").unwrap_or_default();
    let executable = find_command_path(OsStr::new(&search_paths), Path::new(name)).ok_or_else(
        || ExecutionError::SpawnFailed {
            name: name.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "command not found"),
        },
    )?;

    std::process::Command::new(executable.as_ref())
        .args(stage.args())
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::inherit())
        .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&env.current_dir)
        .spawn()
        .map_err(|source| ExecutionError::SpawnFailed {
            name: name.to_string(),
            source,
        })
}

/// Shell-style exit code: the process code, or 128 + signal number when killed.
pub(crate) fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it exists.
/// - `./foo` on Unix or any `./`-prefixed path on other platforms: returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, None) => None,
        // Single component -> search in PATH
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        // Multiple components -> relative to the current dir
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|path| path.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
