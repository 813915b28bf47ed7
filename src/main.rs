use anyhow::Result;
use argh::FromArgs;
use env_logger::Env;
use shell_pipeline::history::{DEFAULT_FILE_NAME, DEFAULT_MAX_ENTRIES};
use shell_pipeline::{BuiltinRegistry, DEFAULT_PROMPT, Environment, History, Interpreter};
use std::path::PathBuf;

#[derive(FromArgs)]
/// An interactive shell with pipelines.
struct Args {
    /// file the command history is kept in (default: ~/.shell_pipeline_history)
    #[argh(option)]
    history_file: Option<PathBuf>,

    /// maximum number of history entries to keep
    #[argh(option, default = "DEFAULT_MAX_ENTRIES")]
    history_size: usize,

    /// prompt format; ${user}, ${hostname} and ${pwd} are substituted
    #[argh(option)]
    prompt: Option<String>,

    /// disable colored output
    #[argh(switch)]
    no_color: bool,

    /// run a single line and exit
    #[argh(option, short = 'c')]
    command: Option<String>,
}

fn open_history(args: &Args, env: &Environment) -> History {
    let path = args
        .history_file
        .clone()
        .or_else(|| env.home_dir().map(|home| home.join(DEFAULT_FILE_NAME)));
    let Some(path) = path else {
        log::warn!("HOME is not set, history will not be saved");
        return History::in_memory();
    };

    match History::open(&path, args.history_size) {
        Ok(history) => history,
        Err(err) => {
            log::warn!("{:#}, history will not be saved", err);
            History::in_memory()
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args: Args = argh::from_env();

    let mut env = Environment::new();
    env.no_color = args.no_color;

    if let Some(line) = &args.command {
        let mut shell = Interpreter::new(env, BuiltinRegistry::with_defaults());
        if let Err(err) = shell.run_line(line) {
            eprintln!("{}", err);
            std::process::exit(1);
        }
        return Ok(());
    }

    env.history = open_history(&args, &env);
    let prompt = args.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string());
    Interpreter::new(env, BuiltinRegistry::with_defaults())
        .with_prompt(prompt)
        .repl()
}
