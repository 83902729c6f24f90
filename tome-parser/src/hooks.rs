//! Post-processing applied to every statement before it is attached to the
//! tree.

use crate::ast::{Node, NodeKind};
use crate::error::Diagnostic;

/// Transforms a statement-level node after it has been parsed.
///
/// Hooks run in registration order. Returning `Ok(None)` discards the node
/// and skips the remaining hooks; returning an error aborts parsing.
pub trait Hook {
    /// Processes a single node.
    fn process(&mut self, node: Node) -> Result<Option<Node>, Diagnostic>;
}

impl<F> Hook for F
where
    F: FnMut(Node) -> Result<Option<Node>, Diagnostic>,
{
    fn process(&mut self, node: Node) -> Result<Option<Node>, Diagnostic> {
        self(node)
    }
}

/// Discards every node of the given kind.
#[derive(Clone, Copy, Debug)]
pub struct Discard(pub NodeKind);

impl Hook for Discard {
    fn process(&mut self, node: Node) -> Result<Option<Node>, Diagnostic> {
        if node.kind() == self.0 {
            tracing::debug!(target: "hooks", "discarding {} at {}", self.0, node.span());
            return Ok(None);
        }
        Ok(Some(node))
    }
}

/// Discards shebang lines, i.e. comments whose text starts with `!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoShebang;

impl Hook for NoShebang {
    fn process(&mut self, node: Node) -> Result<Option<Node>, Diagnostic> {
        match node {
            Node::Comment(comment) if comment.text.starts_with('!') => Ok(None),
            node => Ok(Some(node)),
        }
    }
}
