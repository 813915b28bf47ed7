use crate::builtin::BuiltinRegistry;
use crate::completion::ShellHelper;
use crate::env::Environment;
use crate::executor::{ExecutionError, Executor};
use crate::parser::{self, ParseError};
use crate::theme::Theme;
use anyhow::Result;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use std::fs;
use thiserror::Error;

/// Prompt used when none is configured.
pub const DEFAULT_PROMPT: &str = "${user}@${hostname}:${pwd}$ ";

/// Why a single line could not be run.
#[derive(Debug, Error)]
pub enum LineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// An interactive shell: reads lines, parses them into pipelines and runs them.
///
/// Example
/// ```no_run
/// use shell_pipeline::{BuiltinRegistry, Environment, Interpreter};
/// let mut sh = Interpreter::new(Environment::new(), BuiltinRegistry::with_defaults());
/// sh.run_line("ls -l | grep Cargo").unwrap();
/// ```
pub struct Interpreter {
    env: Environment,
    executor: Executor,
    prompt: String,
    theme: Theme,
}

impl Interpreter {
    pub fn new(env: Environment, builtins: BuiltinRegistry) -> Self {
        let theme = Theme::new(env.use_color());
        Self {
            env,
            executor: Executor::new(builtins),
            prompt: DEFAULT_PROMPT.to_string(),
            theme,
        }
    }

    /// Use `format` for the prompt; `${user}`, `${hostname}` and `${pwd}` are substituted.
    pub fn with_prompt(mut self, format: impl Into<String>) -> Self {
        self.prompt = format.into();
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Parse and execute one line using the interpreter's standard streams.
    pub fn run_line(&mut self, line: &str) -> Result<(), LineError> {
        let pipeline = parser::parse(line)?;
        self.executor.execute(&pipeline, &mut self.env)?;
        Ok(())
    }

    /// Render the prompt for the current state of the environment.
    pub fn build_prompt(&self) -> String {
        let user = self.env.get_var("USER").unwrap_or_else(|| "user".to_string());
        let pwd = self.env.current_dir.display().to_string();
        self.prompt
            .replace("${user}", &self.theme.user_host(&user))
            .replace("${hostname}", &self.theme.user_host(&hostname(&self.env)))
            .replace("${pwd}", &self.theme.path(&pwd))
    }

    /// Read-eval-print loop. Returns on `exit`, end of input or an editor failure.
    pub fn repl(&mut self) -> Result<()> {
        let mut editor: Editor<ShellHelper, DefaultHistory> = Editor::new()?;
        let names = self.executor.builtins().names().map(String::from);
        editor.set_helper(Some(ShellHelper::new(names, self.theme)));
        for entry in self.env.history.entries() {
            editor.add_history_entry(entry.as_str())?;
        }
        log::info!("shell started");

        loop {
            let line = match editor.readline(&self.build_prompt()) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    self.save_history();
                    return Err(err.into());
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            editor.add_history_entry(line.as_str())?;
            if let Err(err) = self.env.history.add(&line) {
                log::warn!("failed to record history: {:#}", err);
            }

            let clears_before = self.env.history.clear_count();
            if let Err(err) = self.run_line(&line) {
                eprintln!("{}", err);
            }
            if self.env.history.clear_count() != clears_before {
                editor.clear_history()?;
            }

            if self.env.should_exit {
                break;
            }
        }

        self.save_history();
        log::info!("shell stopped");
        Ok(())
    }

    fn save_history(&self) {
        if let Err(err) = self.env.history.save() {
            log::warn!("failed to save history: {:#}", err);
        }
    }
}

impl Default for Interpreter {
    /// An interpreter over the current process environment with every builtin.
    fn default() -> Self {
        Self::new(Environment::new(), BuiltinRegistry::with_defaults())
    }
}

fn hostname(env: &Environment) -> String {
    env.get_var("HOSTNAME")
        .filter(|h| !h.is_empty())
        .or_else(|| {
            fs::read_to_string("/proc/sys/kernel/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn plain_env() -> Environment {
        let mut vars = HashMap::new();
        vars.insert("USER".to_string(), "alice".to_string());
        vars.insert("HOSTNAME".to_string(), "box".to_string());
        vars.insert("NO_COLOR".to_string(), "1".to_string());
        Environment {
            vars,
            current_dir: PathBuf::from("/tmp/work"),
            should_exit: false,
            history: History::in_memory(),
            no_color: false,
        }
    }

    #[test]
    fn test_default_prompt() {
        let sh = Interpreter::new(plain_env(), BuiltinRegistry::new());
        assert_eq!(sh.build_prompt(), "alice@box:/tmp/work$ ");
    }

    #[test]
    fn test_custom_prompt() {
        let sh = Interpreter::new(plain_env(), BuiltinRegistry::new()).with_prompt("[${pwd}] > ");
        assert_eq!(sh.build_prompt(), "[/tmp/work] > ");
    }

    #[test]
    fn test_colored_prompt_strips_to_plain() {
        let mut env = plain_env();
        env.vars.remove("NO_COLOR");
        let sh = Interpreter::new(env, BuiltinRegistry::new());
        let prompt = sh.build_prompt();
        assert_ne!(prompt, "alice@box:/tmp/work$ ");
        assert_eq!(crate::theme::strip_ansi(&prompt), "alice@box:/tmp/work$ ");
    }

    #[test]
    fn test_empty_line_is_a_parse_error() {
        let mut sh = Interpreter::new(plain_env(), BuiltinRegistry::with_defaults());
        let err = sh.run_line("   ").unwrap_err();
        assert!(matches!(err, LineError::Parse(ParseError::EmptyInput)));
    }

    #[test]
    fn test_exit_sets_flag() {
        let mut sh = Interpreter::new(plain_env(), BuiltinRegistry::with_defaults());
        sh.run_line("exit").unwrap();
        assert!(sh.env().should_exit);
    }

    #[test]
    fn test_no_color_flag_gives_plain_prompt() {
        let mut env = plain_env();
        env.vars.remove("NO_COLOR");
        env.no_color = true;
        let sh = Interpreter::new(env, BuiltinRegistry::new());
        assert_eq!(sh.build_prompt(), "alice@box:/tmp/work$ ");
        assert!(!sh.env().vars.contains_key("NO_COLOR"));
    }

    #[test]
    fn test_history_clear_is_visible_to_the_loop() {
        let mut sh = Interpreter::new(plain_env(), BuiltinRegistry::with_defaults());
        sh.env_mut().history.add("pwd").unwrap();
        let before = sh.env().history.clear_count();

        sh.run_line("history -c").unwrap();

        assert!(sh.env().history.entries().is_empty());
        assert_ne!(sh.env().history.clear_count(), before);
    }

    #[test]
    fn test_builtin_error_keeps_message() {
        let mut sh = Interpreter::new(plain_env(), BuiltinRegistry::with_defaults());
        let err = sh.run_line("help nope").unwrap_err();
        assert_eq!(err.to_string(), "unknown command: nope");
    }
}
