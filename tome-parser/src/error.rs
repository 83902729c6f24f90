use std::fmt::{Display, Write};

/// The category of a [`Diagnostic`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ErrorKind {
    /// The underlying stream failed for a reason other than ending.
    Reading,
    /// The input violates the grammar.
    Syntax,
    /// The input is well-formed but refers to something unknown, such as a
    /// modifier that does not exist.
    Validation,
    /// A variable expansion is malformed.
    Formatting,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading Error"),
            Self::Syntax => write!(f, "Syntax Error"),
            Self::Validation => write!(f, "Validation Error"),
            Self::Formatting => write!(f, "Formatting Error"),
        }
    }
}

/// The source text surrounding an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Context {
    /// The line number of the first line of `surrounding_text`.
    pub first_line: usize,
    /// Lines preceding the highlighted text. The last line is partial and is
    /// continued by `highlighted_text`.
    pub surrounding_text: String,
    /// The offending text; empty if there was nothing worth highlighting.
    pub highlighted_text: String,
}

/// One step of the chain of parsers an error passed through.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TraceFrame {
    /// The name of the source being parsed.
    pub source: String,
    /// The 1-based line number.
    pub line: usize,
    /// The 1-based column number.
    pub column: usize,
}

impl Display for TraceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

/// Something that can report the position it has reached, so that errors
/// raised by a nested parse can be traced back through their parents.
pub trait TraceSource {
    /// Returns the current position as a trace frame.
    fn frame(&self) -> TraceFrame;

    /// Returns the enclosing source, if any.
    fn parent(&self) -> Option<&dyn TraceSource>;
}

/// An error produced while parsing, with enough context to show the user
/// where it happened.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[error("({kind}) {message}")]
pub struct Diagnostic {
    /// The category of the error.
    pub kind: ErrorKind,
    /// A description of what went wrong.
    pub message: String,
    /// The source text around the error.
    pub context: Context,
    /// Where the error happened, innermost source first.
    pub trace: Vec<TraceFrame>,
    /// Whether the error was caused by the input ending too early.
    pub incomplete: bool,
}

impl Diagnostic {
    /// Returns a diagnostic without context or trace; the parser fills those
    /// in as the error propagates.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Context::default(),
            trace: vec![],
            incomplete: false,
        }
    }

    /// Returns true if the error could be resolved by supplying more input.
    pub const fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// Renders the diagnostic in a human-oriented, multi-line form.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_report(&mut out);
        out
    }

    fn write_report(&self, out: &mut impl Write) -> std::fmt::Result {
        writeln!(out, "[!] {}", self.kind)?;

        let mut frames = self.trace.iter();
        if let Some(frame) = frames.next() {
            writeln!(out, "    in {frame}")?;
        }
        for frame in frames {
            writeln!(out, "    └─ from {frame}")?;
        }

        writeln!(out)?;
        self.write_context(out)?;
        writeln!(out)?;

        writeln!(out, "[?] Details")?;
        write!(out, "    {}", self.message)
    }

    fn write_context(&self, out: &mut impl Write) -> std::fmt::Result {
        let ctx = &self.context;
        let lines: Vec<&str> = ctx.surrounding_text.split('\n').collect();
        let width = (ctx.first_line + lines.len()).to_string().len().max(5);

        let mut line_number = ctx.first_line;
        let mut last_len = 0;
        for (i, line) in lines.iter().enumerate() {
            if i != 0 {
                writeln!(out)?;
                line_number += 1;
            }
            write!(out, "{line_number:>width$} |  {line}")?;
            last_len = line.chars().count();
        }

        if ctx.highlighted_text.is_empty() {
            return writeln!(out, " <empty string>");
        }

        let mut highlighted = ctx.highlighted_text.split('\n');
        let first = highlighted.next().unwrap_or_default();
        writeln!(out, "{first}")?;
        writeln!(
            out,
            "{:width$}    {}{}",
            "",
            " ".repeat(last_len),
            "^".repeat(first.chars().count().max(1))
        )?;

        for line in highlighted {
            line_number += 1;
            writeln!(out, "{line_number:>width$} >  {line}")?;
        }

        Ok(())
    }
}

/// Signals that interrupt the parser's loops. Only `Failed` ever reaches a
/// caller; the rest end a loop at the appropriate level.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// The input ended at a statement boundary.
    EndOfInput,
    /// The input ended where the described token was required.
    UnexpectedEndOfInput(&'static str),
    /// A `}` closed the current block.
    EndOfBlock,
    /// The current argument list ended.
    EndOfArguments,
    /// A real error.
    Failed(Box<Diagnostic>),
}

impl From<Diagnostic> for Interrupt {
    fn from(diagnostic: Diagnostic) -> Self {
        Self::Failed(Box::new(diagnostic))
    }
}
