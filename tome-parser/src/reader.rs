//! A character reader that tracks source positions and keeps enough recent
//! input around to render diagnostics after the fact.

use std::io::BufRead;
use utf8_chars::BufReadCharsExt;

use crate::error::Context;
use crate::source::SourcePosition;

/// Number of lines preceding the highlighted text shown in diagnostics, unless
/// configured otherwise.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

// Enough to cover a peek followed by an unread.
const UNDO_DEPTH: usize = 4;

/// Represents an error that occurred while reading characters.
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The input is exhausted.
    #[error("end of input")]
    EndOfInput,

    /// A quoted string was not closed before a newline or the end of input.
    #[error("quotes not closed, expected a closing {quote}")]
    UnclosedQuotes {
        /// The opening quote character.
        quote: char,
        /// Whether the input ended inside the quotes.
        at_end: bool,
    },

    /// A braced expansion was not closed before a newline or the end of input.
    #[error("braces not closed, expected a closing '}}'")]
    UnclosedBraces {
        /// Whether the input ended inside the braces.
        at_end: bool,
    },

    /// An I/O error occurred while reading from the input stream, including
    /// input that is not valid UTF-8.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl ReadError {
    /// Returns true if the error could be resolved by supplying more input.
    pub const fn is_incomplete(&self) -> bool {
        matches!(
            self,
            Self::EndOfInput
                | Self::UnclosedQuotes { at_end: true, .. }
                | Self::UnclosedBraces { at_end: true }
        )
    }
}

/// Returns true for characters allowed in statement, directive and variable names.
pub const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '!' | '$')
}

/// Returns true for characters allowed in a bare path, such as a statement
/// name like `./build.sh` or a redirection target.
pub const fn is_path_char(c: char) -> bool {
    is_name_char(c) || matches!(c, '.' | '~' | '/' | '\\')
}

/// Returns true for the quoting characters.
pub const fn is_quote(c: char) -> bool {
    matches!(c, '\'' | '"' | '`')
}

/// Returns true for non-newline blank characters.
pub const fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\x0b')
}

/// Returns true for characters that a backslash turns into plain text
/// outside quotes. A backslash before any other character is kept.
pub const fn is_escapable(c: char) -> bool {
    is_blank(c)
        || is_quote(c)
        || matches!(
            c,
            '$' | ';' | '|' | '<' | '>' | '(' | ')' | '{' | '}' | '\\' | ':'
        )
}

/// A buffered reader over UTF-8 input that tracks offsets, lines and columns.
pub struct Reader<R> {
    inner: R,
    /// Characters pushed back or peeked; the last one is returned next.
    pending: Vec<char>,
    /// Recently read characters with the position each was read at.
    undo: Vec<(char, SourcePosition)>,
    position: SourcePosition,
    previous: SourcePosition,
    /// Text read since the log was last trimmed.
    log: String,
    /// Position of the first character in `log`.
    log_start: SourcePosition,
    /// Byte index into `log` where the highlighted segment begins.
    segment: usize,
    context_lines: usize,
}

impl<R: BufRead> Reader<R> {
    /// Returns a new reader.
    ///
    /// # Arguments
    ///
    /// * `inner` - The stream to read from.
    /// * `context_lines` - How many lines before the highlighted text to keep.
    pub fn new(inner: R, context_lines: usize) -> Self {
        Self {
            inner,
            pending: vec![],
            undo: vec![],
            position: SourcePosition::default(),
            previous: SourcePosition::default(),
            log: String::new(),
            log_start: SourcePosition::default(),
            segment: 0,
            context_lines,
        }
    }

    /// Returns the position of the next character to be read.
    pub const fn position(&self) -> SourcePosition {
        self.position
    }

    /// Returns the position of the most recently read character.
    pub const fn previous_position(&self) -> SourcePosition {
        self.previous
    }

    /// Returns the byte offset of the next character to be read.
    pub const fn offset(&self) -> usize {
        self.position.offset
    }

    /// Reads the next character.
    pub fn read(&mut self) -> Result<char, ReadError> {
        let c = match self.pending.pop() {
            Some(c) => c,
            None => self.inner.read_char()?.ok_or(ReadError::EndOfInput)?,
        };

        if self.undo.len() == UNDO_DEPTH {
            self.undo.remove(0);
        }
        self.undo.push((c, self.position));

        self.previous = self.position;
        self.position = self.position.advance(c);
        self.log.push(c);

        Ok(c)
    }

    /// Returns the next character without consuming it.
    pub fn peek(&mut self) -> Result<char, ReadError> {
        if let Some(c) = self.pending.last() {
            return Ok(*c);
        }

        let c = self.inner.read_char()?.ok_or(ReadError::EndOfInput)?;
        self.pending.push(c);
        Ok(c)
    }

    /// Pushes the most recently read character back onto the stream.
    pub fn unread(&mut self) {
        let Some((c, at)) = self.undo.pop() else {
            return;
        };

        self.pending.push(c);
        self.position = at;
        self.previous = self.undo.last().map_or(at, |(_, p)| *p);

        if at.offset >= self.log_start.offset && self.log.pop().is_some() {
            self.segment = self.segment.min(self.log.len());
        }
    }

    /// Consumes the longest run of characters matching `predicate`. The
    /// character that ends the run is left unread.
    pub fn read_while(&mut self, predicate: impl Fn(char) -> bool) -> Result<String, ReadError> {
        let mut out = String::new();
        loop {
            match self.read() {
                Ok(c) if predicate(c) => out.push(c),
                Ok(_) => {
                    self.unread();
                    return Ok(out);
                }
                Err(ReadError::EndOfInput) => return Ok(out),
                Err(err) => return Err(err),
            }
        }
    }

    /// Consumes characters until one of `delimiters` is reached. The delimiter
    /// is left unread.
    pub fn read_until(&mut self, delimiters: &[char]) -> Result<String, ReadError> {
        self.read_while(|c| !delimiters.contains(&c))
    }

    /// Consumes the contents of a quoted string whose opening `quote` has
    /// already been read, along with the closing quote.
    pub fn read_quoted(&mut self, quote: char) -> Result<String, ReadError> {
        let unclosed = |err: ReadError| match err {
            ReadError::EndOfInput => ReadError::UnclosedQuotes {
                quote,
                at_end: true,
            },
            other => other,
        };

        let mut out = String::new();
        loop {
            match self.read().map_err(unclosed)? {
                '\\' => match self.read().map_err(unclosed)? {
                    c if c == quote || c == '\\' || c == '\n' => out.push(c),
                    c => {
                        out.push('\\');
                        out.push(c);
                    }
                },
                c if c == quote => return Ok(out),
                '\n' => {
                    return Err(ReadError::UnclosedQuotes {
                        quote,
                        at_end: false,
                    });
                }
                c => out.push(c),
            }
        }
    }

    /// Consumes the contents of a braced expression whose opening `{` has
    /// already been read, up to and including the matching `}`. Nested braces
    /// and quoted text are passed through untouched.
    pub fn read_braced(&mut self) -> Result<String, ReadError> {
        let unclosed = |err: ReadError| match err {
            ReadError::EndOfInput => ReadError::UnclosedBraces { at_end: true },
            other => other,
        };

        let mut out = String::new();
        let mut depth = 1usize;
        let mut quote: Option<char> = None;

        loop {
            let c = self.read().map_err(unclosed)?;
            match c {
                '\n' => return Err(ReadError::UnclosedBraces { at_end: false }),
                '\\' => {
                    out.push(c);
                    out.push(self.read().map_err(unclosed)?);
                    continue;
                }
                c if quote == Some(c) => quote = None,
                c if quote.is_none() && is_quote(c) => quote = Some(c),
                '{' if quote.is_none() => depth += 1,
                '}' if quote.is_none() => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                }
                _ => (),
            }
            out.push(c);
        }
    }

    /// Marks the start of a new statement. Lines that can no longer appear in
    /// a diagnostic are dropped from the log.
    pub fn mark_context(&mut self) {
        let newlines: Vec<usize> = self.log.match_indices('\n').map(|(i, _)| i).collect();
        if newlines.len() > self.context_lines {
            let cut = newlines[newlines.len() - self.context_lines - 1] + 1;
            let dropped: String = self.log.drain(..cut).collect();
            for c in dropped.chars() {
                self.log_start = self.log_start.advance(c);
            }
        }
        self.segment = self.log.len();
    }

    /// Marks the start of the text to highlight in a diagnostic.
    pub fn mark_segment(&mut self) {
        self.segment = self.log.len();
    }

    /// Returns the context for a diagnostic, highlighting everything read
    /// since the last [`Reader::mark_segment`].
    pub fn context(&self) -> Context {
        self.context_split(self.segment)
    }

    /// Returns the context for a diagnostic, highlighting everything read
    /// from `offset` onwards.
    pub fn context_at(&self, offset: usize) -> Context {
        let split = offset
            .saturating_sub(self.log_start.offset)
            .min(self.log.len());
        self.context_split(split)
    }

    fn context_split(&self, split: usize) -> Context {
        let (before, highlighted) = self
            .log
            .split_at_checked(split)
            .unwrap_or((self.log.as_str(), ""));

        let lines: Vec<&str> = before.split('\n').collect();
        let kept = lines.len().min(self.context_lines + 1);
        let skipped = lines.len() - kept;

        let highlighted = highlighted.trim_end_matches('\n');
        let highlighted = if highlighted.trim().is_empty() {
            String::new()
        } else {
            highlighted.to_owned()
        };

        Context {
            first_line: self.log_start.line + skipped,
            surrounding_text: lines[skipped..].join("\n"),
            highlighted_text: highlighted,
        }
    }
}
