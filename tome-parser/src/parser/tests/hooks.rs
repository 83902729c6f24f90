use std::cell::RefCell;

use super::*;
use crate::ast::{Literal, NodeKind};
use crate::error::{ErrorKind, TraceFrame};
use crate::hooks::{Discard, NoShebang};
use crate::parser::{Parser, ParserOptions};
use crate::source::Span;
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

fn parser(input: &str) -> Parser<'_, &[u8]> {
    Parser::new(input.as_bytes(), "test.tome", &ParserOptions::default())
}

const TOME: &str = "\
:tome deploy {
    # push the image
    docker push app
}
";

#[test]
fn discarding_comments_keeps_tomes() -> anyhow::Result<()> {
    let root = parser(TOME).with_hook(Discard(NodeKind::Comment)).parse()?;
    assert_eq!(root.tomes.keys().collect::<Vec<_>>(), ["deploy"]);

    let Node::Directive(tome) = &root.children[0] else {
        anyhow::bail!("expected a directive");
    };
    assert_eq!(tome.children.len(), 1);
    assert_matches!(&tome.children[0], Node::Exec(_));
    Ok(())
}

#[test]
fn discarded_directives_are_not_registered() -> anyhow::Result<()> {
    let root = parser(TOME).with_hook(Discard(NodeKind::Directive)).parse()?;
    assert!(root.children.is_empty());
    assert!(root.tomes.is_empty());
    Ok(())
}

#[test]
fn tomes_register_under_their_parsed_name() -> anyhow::Result<()> {
    let rename = |node: Node| -> Result<Option<Node>, Diagnostic> {
        match node {
            Node::Directive(mut directive) => {
                directive.args = vec![Node::Literal(Literal {
                    text: "renamed".into(),
                    span: Span::default(),
                })];
                Ok(Some(Node::Directive(directive)))
            }
            other => Ok(Some(other)),
        }
    };

    let root = parser(TOME).with_hook(rename).parse()?;
    let registered = root.tomes.get("deploy");
    assert_eq!(
        registered.and_then(Node::tome_name).as_deref(),
        Some("renamed")
    );
    assert!(!root.tomes.contains_key("renamed"));
    Ok(())
}

#[test]
fn hook_errors_point_at_the_statement() -> anyhow::Result<()> {
    let deny = |node: Node| -> Result<Option<Node>, Diagnostic> {
        if matches!(&node, Node::Exec(command) if command.name == "rm") {
            return Err(Diagnostic::new(
                ErrorKind::Validation,
                "refusing to remove files",
            ));
        }
        Ok(Some(node))
    };

    let err = match parser("echo hi\nrm -rf /tmp/x\necho after").with_hook(deny).parse() {
        Ok(root) => anyhow::bail!("expected an error, got:\n{root}"),
        Err(err) => err,
    };

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.message, "refusing to remove files");
    assert_eq!(err.context.first_line, 1);
    assert_eq!(err.context.highlighted_text, "rm -rf /tmp/x");
    assert_eq!(
        err.trace,
        [TraceFrame {
            source: "test.tome".into(),
            line: 2,
            column: 13,
        }]
    );
    Ok(())
}

#[test]
fn hooks_run_in_order() -> anyhow::Result<()> {
    let calls = RefCell::new(vec![]);
    let first = |node: Node| -> Result<Option<Node>, Diagnostic> {
        calls.borrow_mut().push(format!("first {}", node.kind()));
        Ok(match node.kind() {
            NodeKind::Comment => None,
            _ => Some(node),
        })
    };
    let second = |node: Node| -> Result<Option<Node>, Diagnostic> {
        calls.borrow_mut().push(format!("second {}", node.kind()));
        Ok(Some(node))
    };

    let root = parser("# note\necho")
        .with_hook(first)
        .with_hook(second)
        .parse()?;
    assert_eq!(root.children.len(), 1);
    assert_eq!(
        calls.into_inner(),
        ["first comment", "first exec", "second exec"]
    );
    Ok(())
}

#[test]
fn shebang_is_dropped() -> anyhow::Result<()> {
    let root = parser("#!/usr/bin/env tome\n# keep\necho")
        .with_hook(NoShebang)
        .parse()?;
    assert_eq!(root.children.len(), 2);
    assert_matches!(&root.children[0], Node::Comment(comment) if comment.text == " keep");
    Ok(())
}
