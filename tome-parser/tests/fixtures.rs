//! Parses the scripts under `tests/fixtures` and checks their trees.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tome_parser::ast::{Command, InputMode, Redirect};
use tome_parser::{Locals, Node, ParserOptions, Root, Segment, parse_str};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn parse_fixture(name: &str) -> anyhow::Result<Root> {
    let reader = BufReader::new(File::open(fixture_path(name))?);
    Ok(tome_parser::Parser::new(reader, name, &ParserOptions::default()).parse()?)
}

/// Checks the canonical rendering, and that it parses back to itself.
fn assert_renders(root: &Root, expected: &str) -> anyhow::Result<()> {
    let rendered = root.to_string();
    assert_eq!(rendered, expected);
    assert_eq!(parse_str("rendered.tome", &rendered)?.to_string(), rendered);
    Ok(())
}

fn command(node: &Node) -> anyhow::Result<&Command> {
    match node {
        Node::Exec(command) | Node::Call(command) => Ok(command),
        other => anyhow::bail!("expected a command, got {other:?}"),
    }
}

fn plain(args: &[Node]) -> Vec<Option<String>> {
    args.iter().map(Node::as_plain_text).collect()
}

fn some(items: &[&str]) -> Vec<Option<String>> {
    items.iter().map(|item| Some((*item).to_owned())).collect()
}

#[test]
fn basic() -> anyhow::Result<()> {
    let root = parse_fixture("01_basic.tome")?;
    assert_matches!(
        &root.children[0],
        Node::Comment(comment) if comment.text == " Example program, привет мир 👨‍🚀!"
    );

    let echo = command(&root.children[2])?;
    assert_eq!(
        plain(&echo.args),
        some(&["Hello World!", "and another line", "and another."])
    );

    let Node::Directive(section) = &root.children[3] else {
        anyhow::bail!("expected a directive");
    };
    assert!(section.children.is_empty());
    assert_matches!(&section.args[..], [Node::Exec(echo)] if echo.name == "echo" && echo.args.is_empty());

    assert_renders(
        &root,
        "\
# Example program, привет мир 👨‍🚀!
:include @std
echo \"Hello World!\" \"and another line\" \"and another.\"
:section $(echo)
",
    )
}

#[test]
fn directive_body() -> anyhow::Result<()> {
    let root = parse_fixture("02_directive_body.tome")?;
    assert_eq!(root.children.len(), 2);

    let Node::Directive(section) = &root.children[1] else {
        anyhow::bail!("expected a directive");
    };
    assert_eq!(plain(&section.args), some(&["Hello World!"]));
    assert_matches!(&command(&section.children[0])?.args[..], [Node::Literal(_)]);
    assert_matches!(&command(&section.children[1])?.args[..], [Node::String(_)]);

    assert_renders(
        &root,
        "\
echo 1
:section \"Hello World!\" {
    echo '1.1'
    echo 1.2
}
",
    )
}

#[test]
fn directive_nested() -> anyhow::Result<()> {
    let root = parse_fixture("03_directive_nested.tome")?;
    assert_renders(
        &root,
        "\
echo 1
:section \"Hello World!\" {
    echo '1.1'
    echo 1.2
    :section Nested {
        # This is nested inside
        echo 2.1
        echo 2.2
    }
    echo 1.3
}
",
    )
}

#[test]
fn subcommand() -> anyhow::Result<()> {
    let root = parse_fixture("04_subcommand.tome")?;
    let Node::Call(call) = &root.children[0] else {
        anyhow::bail!("expected a call");
    };
    assert_eq!(call.name, "my_macro");
    assert_eq!(call.args.len(), 3);

    let readlink = command(&call.args[1])?;
    assert_eq!(readlink.name, "readlink");
    let Node::String(link) = &readlink.args[1] else {
        anyhow::bail!("expected a string");
    };
    assert_matches!(&link.segments[..], [Segment::Variable(v)] if v.name == "MY_LINK" && v.optional);

    let locals = Locals::from([("MY_LINK".to_owned(), "/Usr/Local".to_owned())]);
    assert_eq!(link.eval(&locals)?, "/usr/local");
    assert_eq!(link.eval(&Locals::new())?, "");

    assert_renders(
        &root,
        "my_macro! 123 $(readlink -p ${MY_LINK?:to_lower}) 456\n",
    )
}

#[test]
fn tomes() -> anyhow::Result<()> {
    let root = parse_fixture("05_tomes.tome")?;
    assert_eq!(root.children.len(), 3);
    assert_eq!(root.tomes.keys().collect::<Vec<_>>(), ["first", "second"]);

    let Some(Node::Directive(second)) = root.tomes.get("second") else {
        anyhow::bail!("expected the second tome");
    };
    assert_eq!(plain(&second.args), some(&["second", "With a description"]));
    assert_eq!(&root.children[2], &root.tomes["second"]);
    Ok(())
}

#[test]
fn semicolons() -> anyhow::Result<()> {
    let root = parse_fixture("06_semicolon.tome")?;
    let echoed = root
        .children
        .iter()
        .map(|node| -> anyhow::Result<_> { Ok(plain(&command(node)?.args)) })
        .collect::<anyhow::Result<Vec<_>>>()?;
    assert_eq!(echoed, [some(&["1"]), some(&["2"]), some(&["3"]), some(&["4"])]);
    Ok(())
}

#[test]
fn pipes() -> anyhow::Result<()> {
    let root = parse_fixture("07_pipes.tome")?;

    let Node::Pipe(first) = &root.children[0] else {
        anyhow::bail!("expected a pipe");
    };
    assert_eq!(plain(&command(&first.source)?.args), some(&["-e", r"Hello World!\n"]));
    assert_eq!(plain(&command(&first.dest)?.args), some(&["--lang", "html"]));

    let mut names = vec![];
    let mut node = &root.children[1];
    while let Node::Pipe(pipe) = node {
        names.push(command(&pipe.source)?.name.as_str());
        node = pipe.dest.as_ref();
    }
    names.push(command(node)?.name.as_str());
    assert_eq!(names, ["echo", "program2", "program3", "bat"]);

    assert_renders(
        &root,
        r#"echo -e "Hello World!\\n" | bat --lang html
echo 123 | program2 input | program3 input | bat
"#,
    )
}

#[test]
fn redirects() -> anyhow::Result<()> {
    let root = parse_fixture("08_redirects.tome")?;
    let Node::Redirect(Redirect {
        source,
        stdin,
        stdout,
        stderr,
        input_mode,
        ..
    }) = &root.children[0]
    else {
        anyhow::bail!("expected a redirect");
    };

    assert_matches!(source.as_ref(), Node::Pipe(_));
    assert_eq!(*input_mode, InputMode::File);
    let files = [stdin, stdout, stderr].map(|file| file.as_ref().and_then(|f| f.as_plain_text()));
    assert_eq!(
        files,
        [
            Some("stdin.txt".to_owned()),
            Some("stdout.txt".to_owned()),
            Some("stderr.txt".to_owned()),
        ]
    );

    assert_renders(&root, "echo | bat < stdin.txt > stdout.txt >> stderr.txt\n")
}
