use std::sync::mpsc;

use crate::ast::{Node, NodeKind};
use crate::hooks::Discard;
use crate::parser::{Parser, ParserOptions, Streamed};
use pretty_assertions::assert_eq;

const NESTED: &str = "\
:section outer {
    echo a
    :section inner {
        echo b
    }
}
# done
echo c
";

fn parser(input: &str) -> Parser<'_, &[u8]> {
    Parser::new(input.as_bytes(), "test.tome", &ParserOptions::default())
}

fn summary(streamed: impl IntoIterator<Item = Streamed>) -> Vec<(usize, NodeKind)> {
    streamed
        .into_iter()
        .map(|Streamed { depth, node }| (depth, node.kind()))
        .collect()
}

#[test]
fn nodes_stream_innermost_first() -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    let root = parser(NESTED).parse_streaming(tx)?;

    assert_eq!(
        summary(rx.try_iter()),
        [
            (1, NodeKind::Exec),
            (2, NodeKind::Exec),
            (1, NodeKind::Directive),
            (0, NodeKind::Directive),
            (0, NodeKind::Comment),
            (0, NodeKind::Exec),
        ]
    );
    assert_eq!(root.children.len(), 3);
    Ok(())
}

#[test]
fn streamed_nodes_match_the_tree() -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    let root = parser(NESTED).parse_streaming(tx)?;

    let top_level: Vec<Node> = rx
        .try_iter()
        .filter(|streamed| streamed.depth == 0)
        .map(|streamed| streamed.node)
        .collect();
    assert_eq!(top_level, root.children);
    Ok(())
}

#[test]
fn disconnected_receiver_still_parses() -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    drop(rx);
    let root = parser(NESTED).parse_streaming(tx)?;
    assert_eq!(root.children.len(), 3);
    Ok(())
}

#[test]
fn discarded_nodes_are_not_streamed() -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    parser(NESTED)
        .with_hook(Discard(NodeKind::Comment))
        .parse_streaming(tx)?;

    assert!(rx.try_iter().all(|streamed| streamed.node.kind() != NodeKind::Comment));
    Ok(())
}

#[test]
fn errors_end_the_stream() {
    let (tx, rx) = mpsc::channel();
    let result = parser("echo a\necho b\n}").parse_streaming(tx);

    assert!(result.is_err());
    assert_eq!(summary(rx.try_iter()), [(0, NodeKind::Exec), (0, NodeKind::Exec)]);
}
