use crate::command::Builtin;
use crate::env::Environment;
use crate::ls::Ls;
use crate::parser::ParseError;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

/// Built-in commands whose arguments are described with [`argh`].
///
/// Such a command is registered through [`Factory`], which parses the raw
/// arguments, answers `--help` and turns argument errors into [`ParseError`]s.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "pwd" or "cd".
    fn name() -> &'static str;

    /// Executes the command with already parsed arguments.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()>;
}

/// Adapts an argh-described [`BuiltinCommand`] to the [`Builtin`] interface.
pub(crate) struct Factory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> Builtin for Factory<T> {
    fn execute(&self, args: &[String], stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        match parse_args::<T>(T::name(), args, stdout)? {
            Some(cmd) => cmd.execute(stdout, env),
            None => Ok(()),
        }
    }

    fn help(&self) -> String {
        usage::<T>(T::name())
    }
}

/// Parse `args` for the command `name`.
///
/// Returns `Ok(None)` when argh handled the invocation itself (e.g. `--help`),
/// after writing its output to `stdout`.
fn parse_args<T: FromArgs>(name: &str, args: &[String], stdout: &mut dyn Write) -> Result<Option<T>> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match T::from_args(&[name], &args) {
        Ok(cmd) => Ok(Some(cmd)),
        Err(EarlyExit {
            output,
            status: Ok(()),
        }) => {
            write!(stdout, "{}", output)?;
            Ok(None)
        }
        Err(EarlyExit {
            output,
            status: Err(()),
        }) => Err(argument_error(name, &output).into()),
    }
}

fn argument_error(name: &str, output: &str) -> ParseError {
    let message = output.trim();
    let first_line = message.lines().next().unwrap_or_default();
    match first_line.strip_prefix("Unrecognized argument: ") {
        Some(option) => ParseError::UnknownOption(format!("{}: {}", name, option.trim())),
        None => ParseError::InvalidArguments(format!("{}: {}", name, message)),
    }
}

/// Usage text argh generates for `--help`.
fn usage<T: FromArgs>(name: &str) -> String {
    match T::from_args(&[name], &["--help"]) {
        Err(EarlyExit { output, .. }) => output.trim_end().to_string(),
        Ok(_) => name.to_string(),
    }
}

/// A builtin registered under another name with a fixed argument prefix.
///
/// `ll` is `ls` with `-la` prepended to whatever the user typed.
pub struct Alias {
    target: Arc<dyn Builtin>,
    prefix: Vec<String>,
}

impl Alias {
    pub fn new(target: Arc<dyn Builtin>, prefix: &[&str]) -> Self {
        Self {
            target,
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Builtin for Alias {
    fn execute(&self, args: &[String], stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        let mut all_args = self.prefix.clone();
        all_args.extend_from_slice(args);
        self.target.execute(&all_args, stdout, env)
    }

    fn help(&self) -> String {
        self.target.help()
    }
}

/// Name to handler mapping consulted by the executor.
///
/// Filled once at startup and only read afterwards. Names are kept sorted so
/// listings are stable.
#[derive(Default, Clone)]
pub struct BuiltinRegistry {
    commands: BTreeMap<String, Arc<dyn Builtin>>,
}

impl BuiltinRegistry {
    /// An empty registry: every command runs as an external program.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by the interactive shell.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_command::<Cd>();
        registry.register_command::<Pwd>();
        registry.register_command::<Exit>();
        registry.register_command::<Ver>();
        registry.register_command::<Http>();
        registry.register_command::<Https>();
        registry.register_command::<HistoryCommand>();

        let ls: Arc<dyn Builtin> = Arc::new(Ls);
        registry.register_shared("ll", Arc::new(Alias::new(Arc::clone(&ls), &["-la"])));
        registry.register_shared("ls", ls);

        let help = Help::from_registry(&registry);
        registry.register("help", help);
        registry
    }

    /// Register `builtin` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, builtin: impl Builtin + 'static) {
        self.register_shared(name, Arc::new(builtin));
    }

    pub fn register_shared(&mut self, name: impl Into<String>, builtin: Arc<dyn Builtin>) {
        let name = name.into();
        if self.commands.insert(name.clone(), builtin).is_some() {
            log::warn!("builtin `{}` registered twice, keeping the last one", name);
        }
    }

    pub(crate) fn register_command<T: BuiltinCommand + 'static>(&mut self) {
        self.register(T::name(), Factory::<T>::default());
    }

    /// Register `name` as `target` with `prefix` prepended to its arguments.
    pub fn alias(&mut self, name: impl Into<String>, target: &str, prefix: &[&str]) -> Result<()> {
        let Some(target_handler) = self.commands.get(target) else {
            bail!("cannot alias unknown command: {}", target);
        };
        let alias = Alias::new(Arc::clone(target_handler), prefix);
        self.register(name, alias);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Builtin>> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Builtin>)> {
        self.commands.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// Without a target, changes to the directory named by the HOME environment variable.
/// A leading `~` in the target also stands for HOME.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl Cd {
    fn resolve_target(&self, env: &Environment) -> Result<PathBuf> {
        let target = match self.target.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => {
                return env
                    .home_dir()
                    .context("cd: no target and HOME not set");
            }
        };

        if let Some(rest) = target.strip_prefix('~') {
            if rest.is_empty() || rest.starts_with('/') {
                let home = env.home_dir().context("cd: HOME not set")?;
                return Ok(home.join(rest.trim_start_matches('/')));
            }
        }

        Ok(PathBuf::from(target))
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        let target = self.resolve_target(env)?;
        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        log::debug!("cd: now in {}", canonical.display());
        env.current_dir = canonical;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        env.should_exit = true;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Display version information for the shell.
pub struct Ver {}

impl BuiltinCommand for Ver {
    fn name() -> &'static str {
        "ver"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<()> {
        writeln!(
            stdout,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )?;
        writeln!(
            stdout,
            "Commit: {}",
            option_env!("SHELL_PIPELINE_COMMIT").unwrap_or("unknown")
        )?;
        writeln!(
            stdout,
            "Platform: {}/{}",
            env::consts::OS,
            env::consts::ARCH
        )?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Transfer data from a URL using HTTP.
/// If the scheme is omitted, `http://` is assumed.
pub struct Http {
    #[argh(positional)]
    /// the URL to fetch
    pub url: Option<String>,
}

impl BuiltinCommand for Http {
    fn name() -> &'static str {
        "http"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<()> {
        let Some(url) = self.url else {
            bail!("URL required");
        };
        fetch(&url, "http", stdout)
    }
}

#[derive(FromArgs)]
/// Transfer data from a URL using HTTPS.
/// If the scheme is omitted, `https://` is assumed.
pub struct Https {
    #[argh(positional)]
    /// the URL to fetch
    pub url: Option<String>,
}

impl BuiltinCommand for Https {
    fn name() -> &'static str {
        "https"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<()> {
        let Some(url) = self.url else {
            bail!("URL required");
        };
        fetch(&url, "https", stdout)
    }
}

/// Parse `raw`, prepending `default_scheme` when no scheme was given.
fn normalize_url(raw: &str, default_scheme: &str) -> Result<reqwest::Url> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("{}://{}", default_scheme, raw)
    };
    reqwest::Url::parse(&candidate).with_context(|| format!("invalid URL: {}", raw))
}

/// GET `raw_url` and stream the response body to `stdout`.
fn fetch(raw_url: &str, default_scheme: &str, stdout: &mut dyn Write) -> Result<()> {
    let url = normalize_url(raw_url, default_scheme)?;
    log::debug!("GET {}", url);
    let mut response =
        reqwest::blocking::get(url).context("failed to perform GET request")?;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        bail!("HTTP error: {}", status);
    }

    response
        .copy_to(stdout)
        .context("failed to write response body")?;
    Ok(())
}

#[derive(FromArgs)]
/// Show previously entered command lines.
pub struct HistoryCommand {
    #[argh(switch, short = 'c')]
    /// clear the history
    pub clear: bool,

    #[argh(option, short = 'n')]
    /// show only the last N entries
    pub count: Option<usize>,
}

impl BuiltinCommand for HistoryCommand {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<()> {
        if self.clear {
            return env.history.clear();
        }

        let entries = env.history.entries();
        let skip = self
            .count
            .map_or(0, |n| entries.len().saturating_sub(n));
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            writeln!(stdout, "{:>5}  {}", i + 1, entry)?;
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Display help for commands.
/// Without a command, lists every builtin.
pub struct HelpArgs {
    #[argh(positional)]
    /// the command to describe
    pub command: Option<String>,
}

/// `help`: lists builtins or prints the help of one of them.
///
/// Help texts are captured when the shell starts, so `help` sees exactly the
/// builtins that were registered before it.
pub struct Help {
    topics: BTreeMap<String, String>,
}

impl Help {
    pub fn from_registry(registry: &BuiltinRegistry) -> Self {
        let mut topics: BTreeMap<String, String> = registry
            .iter()
            .map(|(name, builtin)| (name.to_string(), builtin.help()))
            .collect();
        topics.insert("help".to_string(), usage::<HelpArgs>("help"));
        Self { topics }
    }
}

impl Builtin for Help {
    fn execute(&self, args: &[String], stdout: &mut dyn Write, _env: &mut Environment) -> Result<()> {
        let Some(parsed) = parse_args::<HelpArgs>("help", args, stdout)? else {
            return Ok(());
        };

        match parsed.command {
            None => {
                writeln!(stdout, "Available commands:")?;
                for name in self.topics.keys() {
                    writeln!(stdout, "  {}", name)?;
                }
            }
            Some(name) => match self.topics.get(&name) {
                Some(text) => writeln!(stdout, "{}", text)?,
                None => bail!("unknown command: {}", name),
            },
        }
        Ok(())
    }

    fn help(&self) -> String {
        usage::<HelpArgs>("help")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use crate::test_support::lock_current_dir;
    use std::collections::HashMap;
    use std::env as stdenv;
    use std::sync::Mutex;

    fn test_env() -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir: stdenv::current_dir().unwrap(),
            should_exit: false,
            history: History::in_memory(),
            no_color: false,
        }
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run(builtin: &dyn Builtin, list: &[&str], env: &mut Environment) -> (Result<()>, String) {
        let mut out = Vec::new();
        let res = builtin.execute(&args(list), &mut out, env);
        (res, String::from_utf8(out).unwrap())
    }

    /// Records the arguments of every call.
    struct Recorder {
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl Builtin for Recorder {
        fn execute(&self, args: &[String], _stdout: &mut dyn Write, _env: &mut Environment) -> Result<()> {
            self.seen.lock().unwrap().push(args.to_vec());
            Ok(())
        }

        fn help(&self) -> String {
            "recorder help".to_string()
        }
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let mut env = test_env();
        let (res, out) = run(&Factory::<Pwd>::default(), &[], &mut env);
        assert!(res.is_ok());
        assert_eq!(out, format!("{}\n", env.current_dir.to_string_lossy()));
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut env = test_env();
        let target = canonical_temp.to_string_lossy().to_string();
        let (res, _) = run(&Factory::<Cd>::default(), &[&target], &mut env);

        let new_cwd = fs::canonicalize(stdenv::current_dir().unwrap()).unwrap();
        stdenv::set_current_dir(orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(new_cwd, canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_parent_and_home() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().unwrap();
        let home = fs::canonicalize(temp.path()).unwrap();
        let child = home.join("child");
        fs::create_dir(&child).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut env = test_env();
        env.set_var("HOME", home.to_string_lossy().to_string());
        env.current_dir = child.clone();

        let (parent_res, _) = run(&Factory::<Cd>::default(), &[".."], &mut env);
        let after_parent = env.current_dir.clone();
        let (tilde_res, _) = run(&Factory::<Cd>::default(), &["~/child"], &mut env);
        let after_tilde = env.current_dir.clone();
        let (home_res, _) = run(&Factory::<Cd>::default(), &[], &mut env);

        stdenv::set_current_dir(orig).expect("failed to restore cwd");

        assert!(parent_res.is_ok() && tilde_res.is_ok() && home_res.is_ok());
        assert_eq!(after_parent, home);
        assert_eq!(after_tilde, child);
        assert_eq!(env.current_dir, home);
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let mut env = test_env();

        let name = format!("nonexistent_dir_for_shell_test_{}", std::process::id());
        let (res, _) = run(&Factory::<Cd>::default(), &[&name], &mut env);

        assert!(res.is_err());
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_unknown_flag_is_unknown_option() {
        let mut env = test_env();
        let (res, _) = run(&Factory::<Pwd>::default(), &["--bogus"], &mut env);
        let err = res.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_help_flag_prints_usage_and_succeeds() {
        let mut env = test_env();
        let (res, out) = run(&Factory::<Cd>::default(), &["--help"], &mut env);
        assert!(res.is_ok());
        assert!(out.contains("Usage: cd"));
        assert!(Factory::<Cd>::default().help().contains("Change the current working directory"));
    }

    #[test]
    fn test_exit_requests_shutdown() {
        let mut env = test_env();
        let (res, _) = run(&Factory::<Exit>::default(), &[], &mut env);
        assert!(res.is_ok());
        assert!(env.should_exit);
    }

    #[test]
    fn test_ver_prints_version() {
        let mut env = test_env();
        let (res, out) = run(&Factory::<Ver>::default(), &[], &mut env);
        assert!(res.is_ok());
        assert!(out.contains(env!("CARGO_PKG_VERSION")));
        assert!(out.contains(stdenv::consts::OS));
    }

    #[test]
    fn test_http_requires_url() {
        let mut env = test_env();
        for builtin in [
            &Factory::<Http>::default() as &dyn Builtin,
            &Factory::<Https>::default(),
        ] {
            let (res, _) = run(builtin, &[], &mut env);
            assert_eq!(res.unwrap_err().to_string(), "URL required");
        }
    }

    #[test]
    fn test_normalize_url_adds_default_scheme() {
        assert_eq!(
            normalize_url("example.com/path", "https").unwrap().as_str(),
            "https://example.com/path"
        );
        assert_eq!(
            normalize_url("http://example.com", "https").unwrap().as_str(),
            "http://example.com/"
        );
        assert!(normalize_url("http://", "http").is_err());
    }

    #[test]
    fn test_history_lists_and_limits() {
        let mut env = test_env();
        for line in ["ls", "pwd", "ver"] {
            env.history.add(line).unwrap();
        }

        let (res, out) = run(&Factory::<HistoryCommand>::default(), &[], &mut env);
        assert!(res.is_ok());
        assert_eq!(out, "    1  ls\n    2  pwd\n    3  ver\n");

        let (_, out) = run(&Factory::<HistoryCommand>::default(), &["-n", "1"], &mut env);
        assert_eq!(out, "    3  ver\n");

        let (res, _) = run(&Factory::<HistoryCommand>::default(), &["-c"], &mut env);
        assert!(res.is_ok());
        assert!(env.history.entries().is_empty());
    }

    #[test]
    fn test_alias_prepends_prefix() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let mut registry = BuiltinRegistry::new();
        registry.register_shared("rec", recorder.clone());
        registry.alias("r", "rec", &["-la"]).unwrap();

        let mut env = test_env();
        let alias = registry.get("r").unwrap();
        alias.execute(&args(&["/tmp"]), &mut Vec::<u8>::new(), &mut env).unwrap();

        assert_eq!(*recorder.seen.lock().unwrap(), vec![args(&["-la", "/tmp"])]);
        assert_eq!(alias.help(), "recorder help");
    }

    #[test]
    fn test_alias_to_unknown_command_fails() {
        let mut registry = BuiltinRegistry::new();
        assert!(registry.alias("ll", "ls", &["-la"]).is_err());
        assert!(!registry.contains("ll"));
    }

    #[test]
    fn test_default_registry_names() {
        let registry = BuiltinRegistry::with_defaults();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec!["cd", "exit", "help", "history", "http", "https", "ll", "ls", "pwd", "ver"]
        );
    }

    #[test]
    fn test_help_lists_and_describes_commands() {
        let registry = BuiltinRegistry::with_defaults();
        let help = registry.get("help").unwrap();
        let mut env = test_env();

        let (res, out) = run(help.as_ref(), &[], &mut env);
        assert!(res.is_ok());
        assert!(out.starts_with("Available commands:\n"));
        assert!(out.contains("  cd\n"));
        assert!(out.contains("  help\n"));

        let (res, out) = run(help.as_ref(), &["pwd"], &mut env);
        assert!(res.is_ok());
        assert!(out.contains("Print the current working directory"));

        let (res, _) = run(help.as_ref(), &["nope"], &mut env);
        assert_eq!(res.unwrap_err().to_string(), "unknown command: nope");
    }
}
