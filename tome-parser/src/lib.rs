//! Implements a parser for tome scripts: statements, directive blocks, pipes,
//! redirections and `${name:modifier}` string interpolation.
//!
//! The entry point is [`Parser`], which reads from any [`std::io::BufRead`]
//! and produces a [`Root`]. Statement-level nodes pass through [`Hook`]s
//! before they are attached to the tree; errors are reported as
//! [`Diagnostic`]s carrying source context and a trace.

pub mod ast;
pub mod hooks;
pub mod interp;
pub mod modifiers;

mod error;
mod parser;
mod reader;
mod source;

pub use ast::{Node, NodeKind, Root};
pub use error::{Context, Diagnostic, ErrorKind, TraceFrame, TraceSource};
pub use hooks::{Discard, Hook, NoShebang};
pub use interp::{InterpString, Locals, Segment};
pub use modifiers::{Modifier, ModifierKind};
pub use parser::{Parser, ParserOptions, Streamed, parse_str};
pub use reader::DEFAULT_CONTEXT_LINES;
pub use source::{SourcePosition, Span};
