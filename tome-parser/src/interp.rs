//! String interpolation: `$name` references and `${name?:modifier args}`
//! expansions, and their evaluation against a set of variables.

use std::collections::HashMap;
use std::fmt::{Display, Write};

use crate::error::ErrorKind;
use crate::modifiers::{Modifier, ModifierKind};
use crate::reader::{is_blank, is_escapable, is_name_char, is_quote};
use crate::source::Span;

/// Variables available when evaluating an [`InterpString`].
pub type Locals = HashMap<String, String>;

/// An error raised while evaluating an [`InterpString`].
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum EvalError {
    /// A required variable has no value.
    #[error("variable '{0}' is not set")]
    UnboundVariable(String),
}

/// An error raised while parsing an interpolated string.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum InterpError {
    /// The expansion does not follow the `${name?:modifier args}` form.
    #[error("{0}")]
    Malformed(String),

    /// The expansion names a modifier that does not exist.
    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),

    /// A modifier was given the wrong number of arguments.
    #[error("modifier '{modifier}' expects {expected} but got {found}")]
    Arity {
        /// The modifier name.
        modifier: &'static str,
        /// The accepted argument counts, in words.
        expected: String,
        /// The number of arguments given.
        found: usize,
    },
}

impl InterpError {
    /// Returns the diagnostic category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_) => ErrorKind::Formatting,
            Self::UnknownModifier(_) | Self::Arity { .. } => ErrorKind::Validation,
        }
    }
}

/// A piece of an [`InterpString`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Segment {
    /// Text used verbatim.
    Literal(String),
    /// A variable reference.
    Variable(Variable),
}

impl Segment {
    /// Returns a reference to a required variable with no modifiers.
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(Variable {
            name: name.into(),
            modifiers: vec![],
            optional: false,
        })
    }
}

/// A variable reference, with the modifiers applied to its value.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Variable {
    /// The variable name.
    pub name: String,
    /// Modifiers in application order; every `not` comes last.
    pub modifiers: Vec<Modifier>,
    /// Whether an unbound variable evaluates to the empty string.
    pub optional: bool,
}

impl Variable {
    /// Returns the value of the variable with all modifiers applied.
    pub fn eval(&self, locals: &Locals) -> Result<String, EvalError> {
        let value = match locals.get(&self.name) {
            Some(value) => value.clone(),
            None if self.optional => String::new(),
            None => return Err(EvalError::UnboundVariable(self.name.clone())),
        };

        self.modifiers
            .iter()
            .try_fold(value, |value, modifier| modifier.apply(locals, &value))
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${{{}", self.name)?;
        if self.optional {
            f.write_char('?')?;
        }
        for modifier in &self.modifiers {
            write!(f, ":{modifier}")?;
        }
        f.write_char('}')
    }
}

/// Text made of literal pieces and variable references.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InterpString {
    /// The pieces, in order. Adjacent literals are always merged.
    pub segments: Vec<Segment>,
    /// Location in the input.
    pub span: Span,
}

impl InterpString {
    /// Returns a new string from its segments.
    pub const fn new(segments: Vec<Segment>, span: Span) -> Self {
        Self { segments, span }
    }

    /// Returns a string holding a single literal segment.
    pub fn literal(text: impl Into<String>, span: Span) -> Self {
        Self {
            segments: vec![Segment::Literal(text.into())],
            span,
        }
    }

    /// Returns the text if the string references no variables.
    pub fn as_plain_text(&self) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(_) => return None,
            }
        }
        Some(out)
    }

    /// Evaluates the string against `locals`.
    pub fn eval(&self, locals: &Locals) -> Result<String, EvalError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(variable) => out.push_str(&variable.eval(locals)?),
            }
        }
        Ok(out)
    }
}

impl Display for InterpString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(text) = self.as_plain_text() {
            if !text.is_empty() && text.chars().all(|c| !is_escapable(c) && c != '\n') {
                return f.write_str(&text);
            }

            f.write_char('"')?;
            for c in text.chars() {
                if matches!(c, '"' | '\\' | '\n') {
                    f.write_char('\\')?;
                }
                f.write_char(c)?;
            }
            return f.write_char('"');
        }

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    for c in text.chars() {
                        if is_escapable(c) {
                            f.write_char('\\')?;
                        }
                        f.write_char(c)?;
                    }
                }
                Segment::Variable(variable) => write!(f, "{variable}")?,
            }
        }
        Ok(())
    }
}

/// Accumulates segments, merging adjacent literal text.
#[derive(Default)]
pub(crate) struct SegmentBuilder {
    segments: Vec<Segment>,
    text: String,
}

impl SegmentBuilder {
    pub fn push_char(&mut self, c: char) {
        self.text.push(c);
    }

    pub fn push(&mut self, segment: Segment) {
        match segment {
            Segment::Literal(text) => self.text.push_str(&text),
            variable @ Segment::Variable(_) => {
                self.flush();
                self.segments.push(variable);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.text.is_empty()
    }

    pub fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.segments
    }

    fn flush(&mut self) {
        if !self.text.is_empty() {
            self.segments
                .push(Segment::Literal(std::mem::take(&mut self.text)));
        }
    }
}

/// Parses unquoted text into segments. `$name` and `${...}` become variable
/// references; a backslash makes the following structural character plain
/// text.
pub fn parse(text: &str) -> Result<Vec<Segment>, InterpError> {
    parse_at(text, 0)
}

/// Like [`parse`], with spans of modifier arguments offset by `base`.
pub(crate) fn parse_at(text: &str, base: usize) -> Result<Vec<Segment>, InterpError> {
    let mut segments = SegmentBuilder::default();
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, next)) if is_escapable(next) => segments.push_char(next),
                Some((_, next)) => {
                    segments.push_char('\\');
                    segments.push_char(next);
                }
                None => segments.push_char('\\'),
            },
            '$' => match chars.peek().copied() {
                Some((i, '{')) => {
                    chars.next();
                    let mut content = String::new();
                    let mut depth = 1usize;
                    let mut quote = None;
                    let mut escaped = false;
                    loop {
                        let Some((_, c)) = chars.next() else {
                            return Err(InterpError::Malformed(
                                "braces not closed, expected a closing '}'".into(),
                            ));
                        };
                        if escaped {
                            escaped = false;
                        } else if c == '\\' {
                            escaped = true;
                        } else if quote == Some(c) {
                            quote = None;
                        } else if quote.is_none() && is_quote(c) {
                            quote = Some(c);
                        } else if quote.is_none() && c == '{' {
                            depth += 1;
                        } else if quote.is_none() && c == '}' {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        content.push(c);
                    }
                    segments.push(parse_expansion_at(&content, base + i + 1)?);
                }
                Some((_, next)) if is_name_char(next) => {
                    let mut name = String::new();
                    while let Some((_, c)) = chars.next_if(|(_, c)| is_name_char(*c)) {
                        name.push(c);
                    }
                    segments.push(Segment::variable(name));
                }
                _ => segments.push_char('$'),
            },
            c => segments.push_char(c),
        }
    }

    Ok(segments.finish())
}

/// Parses the content of a `${...}` expansion, without the braces.
///
/// The content is a variable name, optionally followed by `?`, then any
/// number of `:modifier arg...` groups. Arguments are separated by blanks and
/// may be quoted. Empty content yields the literal text `${}`.
pub fn parse_expansion(content: &str) -> Result<Segment, InterpError> {
    parse_expansion_at(content, 0)
}

pub(crate) fn parse_expansion_at(content: &str, base: usize) -> Result<Segment, InterpError> {
    if content.trim().is_empty() {
        return Ok(Segment::Literal(format!("${{{content}}}")));
    }

    let mut groups = split_top_level(content, |c| c == ':')?.into_iter();
    let head = groups.next().unwrap_or_default();
    let head = head.text.trim();

    let (name, optional) = match head.strip_suffix('?') {
        Some(name) => (name, true),
        None => (head, false),
    };
    if name.is_empty() || !name.chars().all(is_name_char) {
        return Err(InterpError::Malformed(format!(
            "invalid variable name '{head}' in expansion"
        )));
    }

    let mut modifiers = vec![];
    for group in groups {
        let mut tokens = split_top_level(&group.text, |c| is_blank(c) || c == '\n')?
            .into_iter()
            .filter(|token| !token.text.is_empty());

        let Some(modifier_name) = tokens.next() else {
            return Err(InterpError::Malformed(format!(
                "missing a modifier name after ':' in expansion of '{name}'"
            )));
        };

        let args = tokens
            .map(|token| parse_modifier_arg(&token, base + group.offset))
            .collect::<Result<Vec<_>, _>>()?;

        modifiers.push(Modifier::resolve(&modifier_name.text, args)?);
    }

    let (mut modifiers, nots): (Vec<_>, Vec<_>) = modifiers
        .into_iter()
        .partition(|modifier| modifier.kind != ModifierKind::Not);
    modifiers.extend(nots);

    tracing::debug!(
        target: "interp",
        "expansion '{content}' => {name} with {} modifier(s)",
        modifiers.len()
    );

    Ok(Segment::Variable(Variable {
        name: name.to_owned(),
        modifiers,
        optional,
    }))
}

#[derive(Default)]
struct Token {
    /// Byte offset of the token within the text it was split from.
    offset: usize,
    text: String,
}

/// Splits `text` at separators that are outside quotes and braces. Escapes
/// are kept in the token text.
fn split_top_level(text: &str, is_separator: impl Fn(char) -> bool) -> Result<Vec<Token>, InterpError> {
    let mut tokens = vec![];
    let mut current = Token::default();
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if quote == Some(c) {
            quote = None;
        } else if quote.is_none() && is_quote(c) {
            quote = Some(c);
        } else if quote.is_none() && c == '{' {
            depth += 1;
        } else if quote.is_none() && c == '}' {
            depth = depth.saturating_sub(1);
        } else if quote.is_none() && depth == 0 && is_separator(c) {
            let next = Token {
                offset: i + c.len_utf8(),
                text: String::new(),
            };
            tokens.push(std::mem::replace(&mut current, next));
            continue;
        }
        current.text.push(c);
    }

    if let Some(quote) = quote {
        return Err(InterpError::Malformed(format!(
            "quotes not closed, expected a closing {quote}"
        )));
    }

    tokens.push(current);
    Ok(tokens)
}

fn parse_modifier_arg(token: &Token, base: usize) -> Result<InterpString, InterpError> {
    let start = base + token.offset;
    let span = Span::new(start, start + token.text.len());

    let mut chars = token.text.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close)) if is_quote(open) && open == close => {
            Ok(InterpString::literal(unquote(chars.as_str(), open), span))
        }
        _ => Ok(InterpString::new(parse_at(&token.text, start)?, span)),
    }
}

fn unquote(text: &str, quote: char) -> String {
    let mut out = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next) if next == quote || next == '\\' || next == '\n' => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn locals(pairs: &[(&str, &str)]) -> Locals {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn eval(text: &str, locals: &Locals) -> anyhow::Result<String> {
        let string = InterpString::new(parse(text)?, Span::default());
        Ok(string.eval(locals)?)
    }

    #[test]
    fn parses_bare_variables() -> anyhow::Result<()> {
        let segments = parse("out/$name.txt")?;
        assert_eq!(
            segments,
            vec![
                Segment::Literal("out/".into()),
                Segment::variable("name"),
                Segment::Literal(".txt".into()),
            ]
        );
        Ok(())
    }

    #[test]
    fn lone_dollar_is_text() -> anyhow::Result<()> {
        assert_eq!(parse("cost: 5$")?, vec![Segment::Literal("cost: 5$".into())]);
        assert_eq!(parse(r"\$HOME")?, vec![Segment::Literal("$HOME".into())]);
        Ok(())
    }

    #[test]
    fn empty_expansion_is_text() -> anyhow::Result<()> {
        assert_eq!(parse("a${}b")?, vec![Segment::Literal("a${}b".into())]);
        Ok(())
    }

    #[test]
    fn optional_variable_defaults_to_empty() -> anyhow::Result<()> {
        assert_eq!(eval("[${missing?}]", &Locals::new())?, "[]");
        Ok(())
    }

    #[test]
    fn unbound_variable_fails() -> anyhow::Result<()> {
        let string = InterpString::new(parse("$missing")?, Span::default());
        assert_matches!(
            string.eval(&Locals::new()),
            Err(EvalError::UnboundVariable(name)) if name == "missing"
        );
        Ok(())
    }

    #[test]
    fn modifiers_chain_in_order() -> anyhow::Result<()> {
        let vars = locals(&[("name", "  Hello World!  ")]);
        assert_eq!(eval("${name:trim:to_snake}", &vars)?, "hello_world");
        assert_eq!(eval("${name:trim:to_upper:reverse}", &vars)?, "!DLROW OLLEH");
        Ok(())
    }

    #[test]
    fn not_runs_last() -> anyhow::Result<()> {
        let Segment::Variable(variable) = parse_expansion("flag:not:is_empty")? else {
            anyhow::bail!("expected a variable");
        };
        let names: Vec<_> = variable.modifiers.iter().map(Modifier::name).collect();
        assert_eq!(names, ["is_empty", "not"]);

        assert_eq!(eval("${flag:not:is_empty}", &locals(&[("flag", "")]))?, "0");
        assert_eq!(eval("${flag:not:is_empty}", &locals(&[("flag", "x")]))?, "1");
        Ok(())
    }

    #[test]
    fn modifier_arguments_are_interpolated() -> anyhow::Result<()> {
        let vars = locals(&[("file", "report.tar.gz"), ("ext", ".gz")]);
        assert_eq!(eval("${file:trim_suffix $ext}", &vars)?, "report.tar");
        assert_eq!(eval("${file:trim_suffix \".tar.gz\"}", &vars)?, "report");
        Ok(())
    }

    #[test]
    fn quoted_modifier_arguments_keep_separators() -> anyhow::Result<()> {
        let vars = locals(&[("s", "a:b c")]);
        assert_eq!(eval("${s:trim_prefix \"a:b \"}", &vars)?, "c");
        assert_eq!(eval("${s:to_delimited '+ '}", &vars)?, "a+b+c");
        Ok(())
    }

    #[test]
    fn unbound_modifier_argument_fails() -> anyhow::Result<()> {
        let string = InterpString::new(parse("${s:trim $cutset}")?, Span::default());
        assert_matches!(
            string.eval(&locals(&[("s", "x")])),
            Err(EvalError::UnboundVariable(_))
        );
        Ok(())
    }

    #[test]
    fn malformed_expansions() {
        assert_matches!(parse("${na me}"), Err(InterpError::Malformed(_)));
        assert_matches!(parse("${name:}"), Err(InterpError::Malformed(_)));
        assert_matches!(parse("${name"), Err(InterpError::Malformed(_)));
        assert_matches!(parse("${name:trim \"x}"), Err(InterpError::Malformed(_)));
    }

    #[test]
    fn invalid_modifiers() {
        let err = parse("${name:shout}");
        assert_matches!(err, Err(InterpError::UnknownModifier(ref name)) if name == "shout");
        assert_matches!(err.map_err(|e| e.kind()), Err(ErrorKind::Validation));

        assert_matches!(
            parse("${name:pad 1 2 3}"),
            Err(InterpError::Arity {
                modifier: "pad",
                found: 3,
                ..
            })
        );
        assert_matches!(parse("${name:to_upper x}"), Err(InterpError::Arity { .. }));
    }

    #[test]
    fn renders_canonically() -> anyhow::Result<()> {
        let string = InterpString::new(
            parse("${name?:pad 1 \"a b\":not:to_lower}/x y")?,
            Span::default(),
        );
        insta::assert_snapshot!(string, @r#"${name?:pad 1 "a b":to_lower:not}/x\ y"#);

        assert_eq!(InterpString::literal("", Span::default()).to_string(), "\"\"");
        assert_eq!(InterpString::literal("plain", Span::default()).to_string(), "plain");
        assert_eq!(
            InterpString::literal("say \"hi\"", Span::default()).to_string(),
            r#""say \"hi\"""#
        );
        Ok(())
    }
}
