//! Tests for the statement grammar, grouped by construct.

mod hooks;
mod streaming;

use crate::ast::{Node, Root};
use crate::error::Diagnostic;
use crate::parser::parse_str;

fn parse(input: &str) -> Result<Root, Diagnostic> {
    parse_str("test.tome", input)
}

/// Parses `input` and renders the resulting tree.
fn render(input: &str) -> anyhow::Result<String> {
    Ok(parse(input)?.to_string())
}

/// Parses `input`, which is expected to hold exactly one statement.
fn single(input: &str) -> anyhow::Result<Node> {
    let mut children = parse(input)?.children;
    anyhow::ensure!(
        children.len() == 1,
        "expected one statement, got {}",
        children.len()
    );
    Ok(children.remove(0))
}

fn parse_err(input: &str) -> anyhow::Result<Diagnostic> {
    match parse(input) {
        Ok(root) => anyhow::bail!("expected an error, got:\n{root}"),
        Err(diagnostic) => Ok(diagnostic),
    }
}

/// Returns the plain text of each argument, or `None` for arguments that
/// reference variables or are commands.
fn plain_args(args: &[Node]) -> Vec<Option<String>> {
    args.iter().map(Node::as_plain_text).collect()
}

fn texts(items: &[&str]) -> Vec<Option<String>> {
    items.iter().map(|item| Some((*item).to_owned())).collect()
}
