//! Defines the abstract syntax tree produced by the parser.

use std::collections::BTreeMap;
use std::fmt::{Display, Write};

use crate::interp::InterpString;
use crate::source::Span;

const DISPLAY_INDENT: &str = "    ";

/// Fieldless discriminant of [`Node`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NodeKind {
    /// A `#` comment.
    Comment,
    /// A `:name` directive.
    Directive,
    /// A command invocation.
    Exec,
    /// A call of a tome, written with a trailing `!`.
    Call,
    /// Two commands connected with `|`.
    Pipe,
    /// A command with redirected streams.
    Redirect,
    /// Single-quoted text.
    Literal,
    /// Interpolated text.
    String,
    /// A significant run of whitespace.
    Whitespace,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Comment => "comment",
            Self::Directive => "directive",
            Self::Exec => "exec",
            Self::Call => "call",
            Self::Pipe => "pipe",
            Self::Redirect => "redirect",
            Self::Literal => "literal",
            Self::String => "string",
            Self::Whitespace => "whitespace",
        };
        f.write_str(name)
    }
}

/// A node of the syntax tree.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Node {
    /// A comment.
    Comment(Comment),
    /// A directive, optionally followed by a block of statements.
    Directive(Directive),
    /// A command invocation.
    Exec(Command),
    /// A tome call; the trailing `!` is not part of the name.
    Call(Command),
    /// A pipe between two commands.
    Pipe(Pipe),
    /// A command whose streams are redirected.
    Redirect(Redirect),
    /// Text that is never interpolated.
    Literal(Literal),
    /// Text that may reference variables.
    String(InterpString),
    /// Whitespace kept in an argument list.
    Whitespace(Whitespace),
}

impl Node {
    /// Returns the fieldless kind of this node.
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Comment(_) => NodeKind::Comment,
            Self::Directive(_) => NodeKind::Directive,
            Self::Exec(_) => NodeKind::Exec,
            Self::Call(_) => NodeKind::Call,
            Self::Pipe(_) => NodeKind::Pipe,
            Self::Redirect(_) => NodeKind::Redirect,
            Self::Literal(_) => NodeKind::Literal,
            Self::String(_) => NodeKind::String,
            Self::Whitespace(_) => NodeKind::Whitespace,
        }
    }

    /// Returns the span of input this node was parsed from.
    pub const fn span(&self) -> Span {
        match self {
            Self::Comment(n) => n.span,
            Self::Directive(n) => n.span,
            Self::Exec(n) | Self::Call(n) => n.span,
            Self::Pipe(n) => n.span,
            Self::Redirect(n) => n.span,
            Self::Literal(n) => n.span,
            Self::String(n) => n.span,
            Self::Whitespace(n) => n.span,
        }
    }

    /// Renders the node back into source form.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Returns the registration name if this node is a `:tome` directive.
    pub fn tome_name(&self) -> Option<String> {
        match self {
            Self::Directive(directive) => directive.tome_name(),
            _ => None,
        }
    }

    /// Returns the text of this node if it is an argument with no variables.
    pub fn as_plain_text(&self) -> Option<String> {
        match self {
            Self::Literal(literal) => Some(literal.text.clone()),
            Self::String(string) => string.as_plain_text(),
            _ => None,
        }
    }

    /// Returns true for nodes that are commands and so must be wrapped in
    /// `$( )` when used as an argument.
    const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::Exec(_) | Self::Call(_) | Self::Pipe(_) | Self::Redirect(_)
        )
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Comment(n) => write!(f, "{n}"),
            Self::Directive(n) => write!(f, "{n}"),
            Self::Exec(n) => write!(f, "{n}"),
            Self::Call(n) => {
                write!(f, "{}!", n.name)?;
                fmt_args(f, &n.args)
            }
            Self::Pipe(n) => write!(f, "{n}"),
            Self::Redirect(n) => write!(f, "{n}"),
            Self::Literal(n) => write!(f, "{n}"),
            Self::String(n) => write!(f, "{n}"),
            Self::Whitespace(n) => write!(f, "{n}"),
        }
    }
}

fn fmt_args(f: &mut std::fmt::Formatter<'_>, args: &[Node]) -> std::fmt::Result {
    for arg in args {
        match arg {
            Node::Whitespace(Whitespace {
                is_line_continuation: false,
                ..
            }) => (),
            arg if arg.is_command() => write!(f, " $({arg})")?,
            arg => write!(f, " {arg}")?,
        }
    }
    Ok(())
}

/// A comment, running from `#` to the end of the line.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Comment {
    /// The comment text, without the leading `#`.
    pub text: String,
    /// Location in the input.
    pub span: Span,
}

impl Display for Comment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.text)
    }
}

/// A directive such as `:include "file.tome"` or `:section name { ... }`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Directive {
    /// The directive name, without the leading `:`.
    pub name: String,
    /// The arguments.
    pub args: Vec<Node>,
    /// Statements of the attached block; empty when there is none.
    pub children: Vec<Node>,
    /// Location in the input.
    pub span: Span,
}

impl Directive {
    /// Returns the name this directive registers under, if it is a `:tome`
    /// directive whose first argument is plain text.
    pub fn tome_name(&self) -> Option<String> {
        if self.name != "tome" {
            return None;
        }
        self.args.first().and_then(Node::as_plain_text)
    }
}

impl Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ":{}", self.name)?;
        fmt_args(f, &self.args)?;

        if self.children.is_empty() {
            return Ok(());
        }

        writeln!(f, " {{")?;
        for child in &self.children {
            writeln!(indenter::indented(f).with_str(DISPLAY_INDENT), "{child}")?;
        }
        write!(f, "}}")
    }
}

/// A command invocation: a name followed by arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Command {
    /// The command name.
    pub name: String,
    /// The arguments.
    pub args: Vec<Node>,
    /// Location in the input.
    pub span: Span,
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        fmt_args(f, &self.args)
    }
}

/// Two commands connected with `|`. Chains lean right: `a | b | c` is
/// `a | (b | c)`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Pipe {
    /// The command whose output is piped.
    pub source: Box<Node>,
    /// The command receiving the output.
    pub dest: Box<Node>,
    /// Location in the input.
    pub span: Span,
}

impl Display for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} | {}", self.source, self.dest)
    }
}

/// How the standard input of a [`Redirect`] is supplied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum InputMode {
    /// `<`: read from a file.
    #[default]
    File,
    /// `<<`: a here-document.
    HereDoc,
    /// `<<<`: a here-string.
    HereString,
}

impl Display for InputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "<"),
            Self::HereDoc => write!(f, "<<"),
            Self::HereString => write!(f, "<<<"),
        }
    }
}

/// A command with redirected streams. The source is the whole pipe chain
/// the redirections follow.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Redirect {
    /// The redirected command.
    pub source: Box<Node>,
    /// Standard input, set with `<`, `<<` or `<<<`.
    pub stdin: Option<InterpString>,
    /// Standard output, set with `>`.
    pub stdout: Option<InterpString>,
    /// Standard error, set with `>>`.
    pub stderr: Option<InterpString>,
    /// Which operator supplied `stdin`.
    pub input_mode: InputMode,
    /// Location in the input.
    pub span: Span,
}

impl Display for Redirect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)?;
        if let Some(stdin) = &self.stdin {
            write!(f, " {} {stdin}", self.input_mode)?;
        }
        if let Some(stdout) = &self.stdout {
            write!(f, " > {stdout}")?;
        }
        if let Some(stderr) = &self.stderr {
            write!(f, " >> {stderr}")?;
        }
        Ok(())
    }
}

/// Single-quoted text.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Literal {
    /// The unquoted text.
    pub text: String,
    /// Location in the input, including the quotes.
    pub span: Span,
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('\'')?;
        for c in self.text.chars() {
            if matches!(c, '\'' | '\\' | '\n') {
                f.write_char('\\')?;
            }
            f.write_char(c)?;
        }
        f.write_char('\'')
    }
}

/// Whitespace kept in an argument list.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Whitespace {
    /// True for an escaped newline, false for one that ended the list.
    pub is_line_continuation: bool,
    /// Location in the input.
    pub span: Span,
}

impl Display for Whitespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_line_continuation {
            f.write_str("\\\n")
        } else {
            f.write_char('\n')
        }
    }
}

/// The result of parsing a complete input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Root {
    /// Top-level statements, in source order.
    pub children: Vec<Node>,
    /// `:tome` directives found at any depth, keyed by name.
    pub tomes: BTreeMap<String, Node>,
}

impl Display for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for child in &self.children {
            writeln!(f, "{child}")?;
        }
        Ok(())
    }
}
