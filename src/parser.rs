use crate::lexer::{self, Token};
use thiserror::Error;

/// One stage of a pipeline: a command name, its arguments and an optional
/// link to the stage its standard output is piped into.
///
/// The link is an owning `Box`, so every chain is a simple forward list with a
/// single owner: the head command. Commands are immutable once parsed.
#[derive(Debug, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
    pipe: Option<Box<Command>>,
}

impl Command {
    /// Create a pipeline terminus (a command that is not piped anywhere).
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
            pipe: None,
        }
    }

    /// Create a command whose output is piped into `next`.
    ///
    /// Takes `next` by value, so a stage can never be shared by two chains.
    pub fn piped_into(name: impl Into<String>, args: Vec<String>, next: Command) -> Self {
        Self {
            name: name.into(),
            args,
            pipe: Some(Box::new(next)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The next stage of the pipeline, if any.
    pub fn pipe(&self) -> Option<&Command> {
        self.pipe.as_deref()
    }

    /// Iterate over all stages of the pipeline starting with `self`.
    pub fn stages(&self) -> Stages<'_> {
        Stages { next: Some(self) }
    }

    /// Number of stages in the pipeline headed by this command (always >= 1).
    pub fn stage_count(&self) -> usize {
        self.stages().count()
    }

    pub fn is_pipeline(&self) -> bool {
        self.pipe.is_some()
    }
}

/// Iterator over the stages of a pipeline in left-to-right order.
pub struct Stages<'a> {
    next: Option<&'a Command>,
}

impl<'a> Iterator for Stages<'a> {
    type Item = &'a Command;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.pipe();
        Some(current)
    }
}

/// Errors produced while turning input into commands.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line contained nothing to execute.
    #[error("empty input")]
    EmptyInput,
    /// A builtin received a flag it does not understand.
    #[error("unknown option: {0}")]
    UnknownOption(String),
    /// A builtin received arguments it cannot make sense of.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Parse one line of interactive input into a pipeline.
///
/// Stages are separated by unquoted, unescaped `|`. Empty stages (for example
/// the one after a trailing `|`) are dropped. A line consisting of `..` alone
/// is shorthand for `cd ..`.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    if trimmed == ".." {
        return Ok(Command::new("cd", vec!["..".to_string()]));
    }

    let tokens = lexer::split_into_tokens(line);
    let mut segments: Vec<Vec<String>> = vec![Vec::new()];
    for token in tokens {
        match token {
            Token::Word(word) => {
                if let Some(current) = segments.last_mut() {
                    current.push(word);
                }
            }
            Token::PipeOp => segments.push(Vec::new()),
        }
    }

    // Link stages back to front so each one takes ownership of its successor.
    let head = segments
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .rev()
        .fold(None, |next: Option<Command>, mut words| {
            let name = words.remove(0);
            Some(match next {
                Some(next) => Command::piped_into(name, words, next),
                None => Command::new(name, words),
            })
        });

    let head = head.ok_or(ParseError::EmptyInput)?;
    log::debug!("parsed pipeline with {} stage(s): {:?}", head.stage_count(), head);
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_word() {
        let cmd = parse("ls").unwrap();
        assert_eq!(cmd.name(), "ls");
        assert!(cmd.args().is_empty());
        assert!(cmd.pipe().is_none());
        assert_eq!(cmd.stage_count(), 1);
    }

    #[test]
    fn test_simple_command_with_args() {
        let cmd = parse("ls -l /tmp").unwrap();
        assert_eq!(cmd.name(), "ls");
        assert_eq!(cmd.args(), strings(&["-l", "/tmp"]).as_slice());
        assert!(!cmd.is_pipeline());
    }

    #[test]
    fn test_quoted_argument_is_one_token() {
        let cmd = parse(r#"echo "hello world""#).unwrap();
        assert_eq!(cmd.name(), "echo");
        assert_eq!(cmd.args(), strings(&["hello world"]).as_slice());
    }

    #[test]
    fn test_escaped_space_does_not_split() {
        let cmd = parse(r"echo hello\ world").unwrap();
        assert_eq!(cmd.name(), "echo");
        assert_eq!(cmd.args(), strings(&["hello world"]).as_slice());
    }

    #[test]
    fn test_two_stage_pipeline() {
        let cmd = parse("ls -l | grep foo").unwrap();
        assert_eq!(cmd.name(), "ls");
        assert_eq!(cmd.args(), strings(&["-l"]).as_slice());

        let next = cmd.pipe().expect("second stage");
        assert_eq!(next.name(), "grep");
        assert_eq!(next.args(), strings(&["foo"]).as_slice());
        assert!(next.pipe().is_none());

        let expected = Command::piped_into(
            "ls",
            strings(&["-l"]),
            Command::new("grep", strings(&["foo"])),
        );
        assert_eq!(cmd, expected);
    }

    #[test]
    fn test_stage_order_is_left_to_right() {
        let cmd = parse("a | b | c").unwrap();
        let names: Vec<&str> = cmd.stages().map(Command::name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert_eq!(parse(""), Err(ParseError::EmptyInput));
        assert_eq!(parse("   \t"), Err(ParseError::EmptyInput));
    }

    #[test]
    fn test_line_of_only_pipes_is_empty() {
        assert_eq!(parse("| |"), Err(ParseError::EmptyInput));
        assert_eq!(parse(r#""""#), Err(ParseError::EmptyInput));
    }

    #[test]
    fn test_dot_dot_means_cd_parent() {
        let cmd = parse("..").unwrap();
        assert_eq!(cmd, Command::new("cd", strings(&[".."])));
    }

    #[test]
    fn test_dot_dot_with_args_is_not_rewritten() {
        let cmd = parse(".. foo").unwrap();
        assert_eq!(cmd.name(), "..");
        assert_eq!(cmd.args(), strings(&["foo"]).as_slice());
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let cmd = parse("ls | | wc |").unwrap();
        let names: Vec<&str> = cmd.stages().map(Command::name).collect();
        assert_eq!(names, vec!["ls", "wc"]);

        let cmd = parse("| ls").unwrap();
        assert_eq!(cmd, Command::new("ls", Vec::new()));
    }

    #[test]
    fn test_quoted_pipe_does_not_split_pipeline() {
        let cmd = parse(r#"echo "a | b""#).unwrap();
        assert_eq!(cmd.stage_count(), 1);
        assert_eq!(cmd.args(), strings(&["a | b"]).as_slice());
    }

    #[test]
    fn test_unterminated_quote_is_not_an_error() {
        let cmd = parse(r#"echo "abc def"#).unwrap();
        assert_eq!(cmd.args(), strings(&["abc def"]).as_slice());
    }
}
