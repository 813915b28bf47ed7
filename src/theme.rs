use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*m").expect("valid ANSI escape pattern")
});

/// ANSI colors used for listings and the prompt. A disabled theme returns text unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    enabled: bool,
}

impl Theme {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }

    pub fn directory(&self, text: &str) -> String {
        self.paint("1;34", text)
    }

    pub fn executable(&self, text: &str) -> String {
        self.paint("1;32", text)
    }

    pub fn symlink(&self, text: &str) -> String {
        self.paint("36", text)
    }

    pub fn user_host(&self, text: &str) -> String {
        self.paint("1;32", text)
    }

    pub fn path(&self, text: &str) -> String {
        self.paint("1;34", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }
}

/// Remove color escape sequences, e.g. to measure the printed width of a string.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

/// Number of terminal cells `text` occupies once escapes are removed.
pub fn visible_width(text: &str) -> usize {
    strip_ansi(text).chars().count()
}
