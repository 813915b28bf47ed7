//! Line editor helper: tab completion, history hints and hint highlighting.

use crate::theme::Theme;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;
use std::fs;
use std::path::Path;

/// Commands whose arguments are completed as file system paths.
const PATH_COMMANDS: &[&str] = &["cd", "ls", "ll"];

pub(crate) struct ShellHelper {
    builtins: Vec<String>,
    hinter: HistoryHinter,
    theme: Theme,
}

impl ShellHelper {
    pub(crate) fn new(builtins: impl IntoIterator<Item = String>, theme: Theme) -> Self {
        Self {
            builtins: builtins.into_iter().collect(),
            hinter: HistoryHinter::new(),
            theme,
        }
    }

    fn complete_command(&self, prefix: &str) -> Vec<Pair> {
        self.builtins
            .iter()
            .filter(|name| name.starts_with(prefix))
            .map(|name| Pair {
                display: name.clone(),
                replacement: format!("{} ", name),
            })
            .collect()
    }
}

/// Start offset of the word that ends at `pos`.
fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0)
}

/// Complete `word` against the entries of the directory it points into.
///
/// Directories are suggested with a trailing `/` so completion can continue
/// into them. Hidden entries only show up once the word starts with a dot.
fn complete_path(word: &str) -> Vec<Pair> {
    let (dir, prefix) = match word.rfind('/') {
        Some(i) => (&word[..=i], &word[i + 1..]),
        None => ("", word),
    };
    let search_dir = if dir.is_empty() { Path::new(".") } else { Path::new(dir) };

    let Ok(read_dir) = fs::read_dir(search_dir) else {
        return Vec::new();
    };

    let mut pairs: Vec<Pair> = read_dir
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(prefix) || (name.starts_with('.') && !prefix.starts_with('.')) {
                return None;
            }
            let is_dir = entry.path().is_dir();
            let display = if is_dir { format!("{}/", name) } else { name };
            Some(Pair {
                replacement: format!("{}{}", dir, display),
                display,
            })
        })
        .collect();
    pairs.sort_by(|a, b| a.display.cmp(&b.display));
    pairs
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = word_start(line, pos);
        let word = &line[start..pos];

        // Completion restarts after every pipe.
        let segment_start = line[..start]
            .char_indices()
            .rev()
            .find(|(_, c)| *c == '|')
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let before = line[segment_start..start].trim();

        if before.is_empty() {
            return Ok((start, self.complete_command(word)));
        }

        let command = before.split_whitespace().next().unwrap_or_default();
        if PATH_COMMANDS.contains(&command) {
            return Ok((start, complete_path(word)));
        }
        Ok((pos, Vec::new()))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for ShellHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        if self.theme.is_enabled() {
            Cow::Owned(self.theme.dim(hint))
        } else {
            Cow::Borrowed(hint)
        }
    }
}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

#[cfg(test)]
mod tests {
    use super::*;

    fn helper() -> ShellHelper {
        ShellHelper::new(
            ["cd", "exit", "help", "history", "ls", "ll"].map(String::from),
            Theme::plain(),
        )
    }

    fn displays(pairs: &[Pair]) -> Vec<&str> {
        pairs.iter().map(|p| p.display.as_str()).collect()
    }

    #[test]
    fn test_word_start() {
        assert_eq!(word_start("ls sr", 5), 3);
        assert_eq!(word_start("hel", 3), 0);
        assert_eq!(word_start("cd ", 3), 3);
    }

    #[test]
    fn test_word_start_after_wide_whitespace() {
        let line = "ls\u{3000}x";
        let start = word_start(line, line.len());
        assert_eq!(start, 5);
        assert_eq!(&line[start..], "x");

        let line = "cd\u{a0}src";
        assert_eq!(&line[word_start(line, line.len())..], "src");
    }

    #[test]
    fn test_completes_builtin_names() {
        let pairs = helper().complete_command("h");
        assert_eq!(displays(&pairs), vec!["help", "history"]);
        assert_eq!(pairs[0].replacement, "help ");
    }

    #[test]
    fn test_completes_paths_inside_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("setup.txt"), "").unwrap();
        fs::write(dir.path().join(".secret"), "").unwrap();
        fs::write(dir.path().join("other"), "").unwrap();

        let base = format!("{}/", dir.path().display());
        let pairs = complete_path(&format!("{}s", base));
        assert_eq!(displays(&pairs), vec!["setup.txt", "src/"]);
        assert_eq!(pairs[1].replacement, format!("{}src/", base));

        let hidden = complete_path(&format!("{}.", base));
        assert_eq!(displays(&hidden), vec![".secret"]);
    }

    #[test]
    fn test_missing_directory_completes_nothing() {
        assert!(complete_path("/definitely/not/here/x").is_empty());
    }

    #[test]
    fn test_hints_are_left_plain_without_color() {
        assert_eq!(helper().highlight_hint("abc"), "abc");
    }
}
