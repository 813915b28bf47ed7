//! Lexical analysis of a single interactive input line.
//!
//! The lexer only knows about three special characters: the pipe operator `|`,
//! the double quote `"` and the backslash `\`. Everything else is either a
//! word character or whitespace separating words.

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A complete word with quotes and escapes already resolved.
    Word(String),
    /// The pipe operator, `|`.
    PipeOp,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    in_quotes: bool,
    escape_next: bool,
    buffer: String,
}

impl LexingFSM {
    /// Creates a new instance of the lexical analysis Finite State Machine.
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            in_quotes: false,
            escape_next: false,
            buffer: String::new(),
        }
    }

    /// Scans the whole input and returns the produced tokens.
    ///
    /// An unterminated quote or a dangling backslash at the end of the line is
    /// not an error: whatever has been accumulated so far becomes the last word.
    fn make_tokens(&mut self) -> Vec<Token> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            if self.escape_next {
                self.buffer.push(ch);
                self.escape_next = false;
                continue;
            }

            match ch {
                '\\' => self.escape_next = true,
                '"' => self.in_quotes = !self.in_quotes,
                '|' if !self.in_quotes => {
                    self.flush_word(&mut out);
                    out.push(Token::PipeOp);
                }
                c if c.is_whitespace() && !self.in_quotes => self.flush_word(&mut out),
                c => self.buffer.push(c),
            }
        }

        self.flush_word(&mut out);
        out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Emits the buffered characters as a word. Empty buffers produce nothing,
    /// so runs of delimiters never create empty words.
    fn flush_word(&mut self, out: &mut Vec<Token>) {
        if !self.buffer.is_empty() {
            out.push(Token::Word(std::mem::take(&mut self.buffer)));
        }
    }
}

/// The main entry point function to perform lexical analysis.
///
/// Creates and runs the finite state machine to tokenize the input line.
pub fn split_into_tokens(line: &str) -> Vec<Token> {
    LexingFSM::new(line).make_tokens()
}
