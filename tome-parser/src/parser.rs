use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::mpsc::Sender;

use crate::ast::{Command, Comment, Directive, InputMode, Literal, Node, Pipe, Redirect, Root, Whitespace};
use crate::error::{Diagnostic, ErrorKind, Interrupt, TraceFrame, TraceSource};
use crate::hooks::Hook;
use crate::interp::{self, InterpError, InterpString, Segment, SegmentBuilder};
use crate::reader::{
    DEFAULT_CONTEXT_LINES, ReadError, Reader, is_blank, is_escapable, is_name_char, is_path_char,
    is_quote,
};
use crate::source::Span;

type ParseResult<T> = Result<T, Interrupt>;

/// Options used to control the behavior of the parser.
#[derive(Clone, Debug, bon::Builder)]
pub struct ParserOptions {
    /// How many lines preceding an error are included in its context.
    #[builder(default = DEFAULT_CONTEXT_LINES)]
    pub context_lines: usize,
    /// Whether to emit [`Node::Whitespace`] nodes for line continuations and
    /// newlines that end an argument list.
    #[builder(default)]
    pub keep_whitespace: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A statement-level node delivered while parsing in streaming mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Streamed {
    /// Block nesting depth of the node; 0 for top-level statements.
    pub depth: usize,
    /// The node, after hooks have been applied.
    pub node: Node,
}

/// Implements parsing for tome scripts.
pub struct Parser<'p, R> {
    reader: Reader<R>,
    name: String,
    options: ParserOptions,
    hooks: Vec<Box<dyn Hook + 'p>>,
    tomes: BTreeMap<String, Node>,
    parent: Option<&'p dyn TraceSource>,
    sink: Option<Sender<Streamed>>,
    depth: usize,
}

impl<'p, R: BufRead> Parser<'p, R> {
    /// Returns a new parser instance.
    ///
    /// # Arguments
    ///
    /// * `reader` - The reader to get input from.
    /// * `name` - The name of the source, used in diagnostic traces.
    /// * `options` - The options to use when parsing.
    pub fn new(reader: R, name: impl Into<String>, options: &ParserOptions) -> Self {
        Self {
            reader: Reader::new(reader, options.context_lines),
            name: name.into(),
            options: options.clone(),
            hooks: vec![],
            tomes: BTreeMap::new(),
            parent: None,
            sink: None,
            depth: 0,
        }
    }

    /// Appends a hook applied to every statement-level node.
    #[must_use]
    pub fn with_hook(mut self, hook: impl Hook + 'p) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Links this parser to the source that caused it to run, typically the
    /// parser of a file that includes this one. Diagnostics raised here will
    /// carry the parent's position in their trace.
    #[must_use]
    pub fn with_parent(mut self, parent: &'p dyn TraceSource) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Parses the entire input.
    pub fn parse(&mut self) -> Result<Root, Diagnostic> {
        tracing::debug!(target: "parse", "parsing {}", self.name);

        let mut children = vec![];
        loop {
            match self.next_statement(&mut children) {
                Ok(()) => (),
                Err(Interrupt::EndOfInput) => break,
                Err(interrupt) => {
                    let diagnostic = self.interrupt_diagnostic(interrupt);
                    tracing::debug!(target: "parse", "parse error: {diagnostic}");
                    return Err(diagnostic);
                }
            }
        }

        tracing::debug!(
            target: "parse",
            "parsed {} statement(s) and {} tome(s) from {}",
            children.len(),
            self.tomes.len(),
            self.name
        );

        Ok(Root {
            children,
            tomes: std::mem::take(&mut self.tomes),
        })
    }

    /// Parses the entire input, sending every statement-level node to `sink`
    /// as soon as it is complete. Nodes inside a block are sent before the
    /// directive that owns them. The complete tree is still returned; a
    /// disconnected receiver only stops the stream.
    pub fn parse_streaming(&mut self, sink: Sender<Streamed>) -> Result<Root, Diagnostic> {
        self.sink = Some(sink);
        let result = self.parse();
        self.sink = None;
        result
    }

    /// Parses one statement into `container`. Separators between statements
    /// are consumed one at a time.
    fn next_statement(&mut self, container: &mut Vec<Node>) -> ParseResult<()> {
        self.reader.mark_context();

        let c = self.peek()?;
        if is_blank(c) || c == '\n' || c == ';' {
            self.bump();
            return Ok(());
        }

        self.reader.mark_segment();
        let start = self.reader.offset();

        let node = match c {
            '}' => {
                self.bump();
                if self.depth == 0 {
                    return Err(self.fail(
                        ErrorKind::Syntax,
                        "unexpected '}' closing a non-existent block",
                    ));
                }
                return Err(Interrupt::EndOfBlock);
            }
            '#' => {
                self.bump();
                let text = self
                    .reader
                    .read_until(&['\n'])
                    .map_err(|err| self.read_failure(err))?;
                Node::Comment(Comment {
                    text,
                    span: Span::new(start, self.reader.offset()),
                })
            }
            ':' => self.parse_directive()?,
            c if is_path_char(c) => self.parse_statement(false)?,
            _ => {
                self.bump();
                return Err(self.fail(
                    ErrorKind::Syntax,
                    "unexpected character at the start of a statement",
                ));
            }
        };

        self.write(container, node, start)
    }

    /// Parses `:name args... [{ block }]`.
    fn parse_directive(&mut self) -> ParseResult<Node> {
        let start = self.reader.offset();
        self.bump();

        let name = self
            .reader
            .read_while(is_name_char)
            .map_err(|err| self.read_failure(err))?;
        if name.is_empty() {
            return Err(self.fail(ErrorKind::Syntax, "missing a directive name after ':'"));
        }

        self.reader.mark_segment();
        let args = self.parse_args(false)?;

        self.reader.mark_segment();
        let mut end = self.reader.offset();

        // The block may open on the line after the arguments.
        if matches!(self.reader.peek(), Ok('\n')) {
            self.bump();
            self.reader
                .read_while(is_blank)
                .map_err(|err| self.read_failure(err))?;
        }

        let children = match self.reader.peek() {
            Ok('{') => {
                self.bump();
                let children = self.parse_block()?;
                end = self.reader.offset();
                children
            }
            Ok(_) | Err(ReadError::EndOfInput) => vec![],
            Err(err) => return Err(self.read_failure(err)),
        };

        Ok(Node::Directive(Directive {
            name,
            args,
            children,
            span: Span::new(start, end),
        }))
    }

    /// Parses statements up to and including the `}` that closes the block
    /// whose `{` has already been consumed.
    fn parse_block(&mut self) -> ParseResult<Vec<Node>> {
        self.depth += 1;

        let mut children = vec![];
        let result = loop {
            match self.next_statement(&mut children) {
                Ok(()) => (),
                Err(Interrupt::EndOfBlock) => break Ok(children),
                Err(Interrupt::EndOfInput) => break Err(Interrupt::UnexpectedEndOfInput("'}'")),
                Err(err) => break Err(err),
            }
        };

        self.depth -= 1;
        result
    }

    /// Parses a pipe chain, optionally followed by redirections that apply to
    /// the whole chain. A nested statement is the body of a `$( )`
    /// subcommand.
    fn parse_statement(&mut self, nested: bool) -> ParseResult<Node> {
        let start = self.reader.offset();
        let pipeline = self.parse_pipeline(nested)?;

        match self.reader.peek() {
            Ok('<' | '>') => self.parse_redirection(pipeline, start, nested),
            _ => Ok(pipeline),
        }
    }

    fn parse_pipeline(&mut self, nested: bool) -> ParseResult<Node> {
        let start = self.reader.offset();
        let command = self.parse_command(nested)?;

        if !matches!(self.reader.peek(), Ok('|')) {
            return Ok(command);
        }

        self.bump();
        self.skip_blanks()?;
        let dest = self.parse_pipeline(nested)?;

        Ok(Node::Pipe(Pipe {
            span: Span::new(start, dest.span().end),
            source: Box::new(command),
            dest: Box::new(dest),
        }))
    }

    /// Parses `name args...`. A name ending in `!` is a call.
    fn parse_command(&mut self, nested: bool) -> ParseResult<Node> {
        let start = self.reader.offset();

        let charset: fn(char) -> bool = match self.reader.peek() {
            Ok(c) if !is_name_char(c) && is_path_char(c) => is_path_char,
            _ => is_name_char,
        };
        let name = self
            .reader
            .read_while(charset)
            .map_err(|err| self.read_failure(err))?;
        let name_end = self.reader.offset();

        if name.is_empty() {
            return match self.reader.peek() {
                Err(ReadError::EndOfInput) => Err(Interrupt::UnexpectedEndOfInput("a command name")),
                _ => {
                    self.bump();
                    Err(self.fail(ErrorKind::Syntax, "expected a command name"))
                }
            };
        }

        self.reader.mark_segment();
        let args = self.parse_args(nested)?;
        let span = Span::new(start, args.last().map_or(name_end, |arg| arg.span().end));

        tracing::trace!(target: "parse", "command '{name}' with {} argument(s)", args.len());

        match name.strip_suffix('!') {
            Some(called) if !called.is_empty() => Ok(Node::Call(Command {
                name: called.to_owned(),
                args,
                span,
            })),
            _ => Ok(Node::Exec(Command { name, args, span })),
        }
    }

    /// Parses arguments until the end of the argument list. The character
    /// that ended the list is left unread.
    fn parse_args(&mut self, nested: bool) -> ParseResult<Vec<Node>> {
        let mut args = vec![];
        let mut parens = 0usize;

        loop {
            match self.parse_arg(nested, &mut parens) {
                Ok(nodes) => args.extend(nodes),
                Err(Interrupt::EndOfArguments) => break,
                Err(err) => return Err(err),
            }
        }

        if self.options.keep_whitespace && matches!(self.reader.peek(), Ok('\n')) {
            let at = self.reader.offset();
            args.push(Node::Whitespace(Whitespace {
                is_line_continuation: false,
                span: Span::new(at, at + 1),
            }));
        }

        Ok(args)
    }

    /// Parses a single blank-separated argument. Quoted text and subcommands
    /// always stand as arguments of their own, so one call may yield several
    /// nodes.
    fn parse_arg(&mut self, nested: bool, parens: &mut usize) -> ParseResult<Vec<Node>> {
        loop {
            let at = self.reader.offset();
            match self.reader.peek() {
                Ok(c) if is_blank(c) => self.bump(),
                Ok('\\') => {
                    self.bump();
                    if !matches!(self.reader.peek(), Ok('\n')) {
                        self.reader.unread();
                        break;
                    }
                    self.bump();
                    if self.options.keep_whitespace {
                        return Ok(vec![Node::Whitespace(Whitespace {
                            is_line_continuation: true,
                            span: Span::new(at, self.reader.offset()),
                        })]);
                    }
                }
                Ok('\n' | ';' | '|' | '<' | '>' | '{') | Err(ReadError::EndOfInput) => {
                    return Err(Interrupt::EndOfArguments);
                }
                Ok('}') if self.depth > 0 => return Err(Interrupt::EndOfArguments),
                Ok(')') if nested && *parens == 0 => return Err(Interrupt::EndOfArguments),
                Ok(_) => break,
                Err(err) => return Err(self.read_failure(err)),
            }
        }

        self.reader.mark_segment();
        let mut nodes = vec![];
        let mut word = SegmentBuilder::default();
        let mut word_start = self.reader.offset();

        loop {
            let at = self.reader.offset();
            if word.is_empty() {
                word_start = at;
            }

            let c = match self.reader.peek() {
                Ok(c) => c,
                Err(ReadError::EndOfInput) => break,
                Err(err) => return Err(self.read_failure(err)),
            };

            match c {
                c if is_blank(c) => break,
                '\n' | ';' | '|' | '<' | '>' => break,
                ')' if nested && *parens == 0 => break,
                '(' => {
                    self.bump();
                    *parens += 1;
                    word.push_char(c);
                }
                ')' => {
                    self.bump();
                    *parens = parens.saturating_sub(1);
                    word.push_char(c);
                }
                '\\' => {
                    self.bump();
                    match self.reader.read() {
                        Ok('\n') => {
                            flush_word(&mut nodes, &mut word, word_start, at);
                            if self.options.keep_whitespace {
                                nodes.push(Node::Whitespace(Whitespace {
                                    is_line_continuation: true,
                                    span: Span::new(at, self.reader.offset()),
                                }));
                            }
                            break;
                        }
                        Ok(next) if is_escapable(next) => word.push_char(next),
                        Ok(next) => {
                            word.push_char('\\');
                            word.push_char(next);
                        }
                        Err(ReadError::EndOfInput) => word.push_char('\\'),
                        Err(err) => return Err(self.read_failure(err)),
                    }
                }
                '$' => {
                    self.bump();
                    match self.reader.peek() {
                        Ok('(') => {
                            self.bump();
                            flush_word(&mut nodes, &mut word, word_start, at);
                            nodes.push(self.parse_subcommand()?);
                        }
                        Ok('{') => {
                            self.bump();
                            let content_start = self.reader.offset();
                            let content = self
                                .reader
                                .read_braced()
                                .map_err(|err| self.read_failure(err))?;
                            let segment = interp::parse_expansion_at(&content, content_start)
                                .map_err(|err| self.interp_failure(&err))?;
                            word.push(segment);
                        }
                        Ok(next) if is_name_char(next) => {
                            let name = self
                                .reader
                                .read_while(is_name_char)
                                .map_err(|err| self.read_failure(err))?;
                            word.push(Segment::variable(name));
                        }
                        _ => word.push_char('$'),
                    }
                }
                q if is_quote(q) => {
                    flush_word(&mut nodes, &mut word, word_start, at);
                    self.bump();
                    let text = self
                        .reader
                        .read_quoted(q)
                        .map_err(|err| self.read_failure(err))?;
                    let span = Span::new(at, self.reader.offset());
                    nodes.push(if q == '\'' {
                        Node::Literal(Literal { text, span })
                    } else {
                        Node::String(InterpString::literal(text, span))
                    });
                }
                c => {
                    self.bump();
                    word.push_char(c);
                }
            }
        }

        let end = self.reader.offset();
        flush_word(&mut nodes, &mut word, word_start, end);
        Ok(nodes)
    }

    /// Parses the statement of a `$( )` subcommand whose opening `$(` has
    /// already been consumed, along with the closing `)`.
    fn parse_subcommand(&mut self) -> ParseResult<Node> {
        self.skip_blanks()?;
        let node = self.parse_statement(true)?;

        match self.reader.read() {
            Ok(')') => Ok(node),
            Ok(_) => Err(self.fail(ErrorKind::Syntax, "expected ')' to close the subcommand")),
            Err(ReadError::EndOfInput) => Err(Interrupt::UnexpectedEndOfInput("')'")),
            Err(err) => Err(self.read_failure(err)),
        }
    }

    /// Parses redirections following `source`; `<`, `<<` and `<<<` set the
    /// input, `>` the output and `>>` the error stream.
    fn parse_redirection(&mut self, source: Node, start: usize, nested: bool) -> ParseResult<Node> {
        let mut stdin = None;
        let mut stdout = None;
        let mut stderr = None;
        let mut input_mode = InputMode::File;

        loop {
            self.skip_blanks()?;
            self.reader.mark_segment();

            match self.reader.peek() {
                Ok('<') => {
                    self.bump();
                    let mut mode = InputMode::File;
                    if matches!(self.reader.peek(), Ok('<')) {
                        self.bump();
                        mode = InputMode::HereDoc;
                        if matches!(self.reader.peek(), Ok('<')) {
                            self.bump();
                            mode = InputMode::HereString;
                        }
                    }
                    if stdin.is_some() {
                        return Err(self.fail(ErrorKind::Syntax, "standard input is already redirected"));
                    }
                    stdin = Some(self.parse_filename()?);
                    input_mode = mode;
                }
                Ok('>') => {
                    self.bump();
                    if matches!(self.reader.peek(), Ok('>')) {
                        self.bump();
                        if stderr.is_some() {
                            return Err(self.fail(ErrorKind::Syntax, "standard error is already redirected"));
                        }
                        stderr = Some(self.parse_filename()?);
                    } else {
                        if stdout.is_some() {
                            return Err(self.fail(ErrorKind::Syntax, "standard output is already redirected"));
                        }
                        stdout = Some(self.parse_filename()?);
                    }
                }
                Ok('\n' | ';') | Err(ReadError::EndOfInput) => break,
                Ok(')') if nested => break,
                Ok('}') if self.depth > 0 => break,
                Ok(_) => {
                    self.bump();
                    return Err(self.fail(ErrorKind::Syntax, "unexpected character after a redirection"));
                }
                Err(err) => return Err(self.read_failure(err)),
            }
        }

        let end = [&stdin, &stdout, &stderr]
            .into_iter()
            .flatten()
            .map(|file| file.span.end)
            .max()
            .unwrap_or(start);

        Ok(Node::Redirect(Redirect {
            source: Box::new(source),
            stdin,
            stdout,
            stderr,
            input_mode,
            span: Span::new(start, end),
        }))
    }

    /// Parses the target of a redirection: a quoted string or a bare path,
    /// which may reference variables.
    fn parse_filename(&mut self) -> ParseResult<InterpString> {
        self.skip_blanks()?;
        let start = self.reader.offset();

        match self.reader.peek() {
            Ok(q) if is_quote(q) => {
                self.bump();
                let text = self
                    .reader
                    .read_quoted(q)
                    .map_err(|err| self.read_failure(err))?;
                return Ok(InterpString::literal(text, Span::new(start, self.reader.offset())));
            }
            Err(ReadError::EndOfInput) => return Err(Interrupt::UnexpectedEndOfInput("a file name")),
            _ => (),
        }

        let mut raw = String::new();
        loop {
            match self.reader.peek() {
                Ok('\\') => {
                    self.bump();
                    raw.push('\\');
                    match self.reader.read() {
                        Ok(c) => raw.push(c),
                        Err(ReadError::EndOfInput) => (),
                        Err(err) => return Err(self.read_failure(err)),
                    }
                }
                Ok('$') => {
                    self.bump();
                    raw.push('$');
                    if matches!(self.reader.peek(), Ok('{')) {
                        self.bump();
                        let content = self
                            .reader
                            .read_braced()
                            .map_err(|err| self.read_failure(err))?;
                        raw.push('{');
                        raw.push_str(&content);
                        raw.push('}');
                    }
                }
                Ok(c) if is_path_char(c) => {
                    self.bump();
                    raw.push(c);
                }
                Ok(_) | Err(ReadError::EndOfInput) => break,
                Err(err) => return Err(self.read_failure(err)),
            }
        }

        if raw.is_empty() {
            self.bump();
            return Err(self.fail(ErrorKind::Syntax, "unexpected character in file name"));
        }

        let segments = interp::parse_at(&raw, start).map_err(|err| self.interp_failure(&err))?;
        Ok(InterpString::new(segments, Span::new(start, self.reader.offset())))
    }

    /// Applies hooks to a finished statement-level node, registers tomes and
    /// appends the result to `container`.
    fn write(&mut self, container: &mut Vec<Node>, node: Node, start: usize) -> ParseResult<()> {
        let Some(node) = self.process(node, start)? else {
            return Ok(());
        };

        tracing::trace!(target: "parse", "{} at {} (depth {})", node.kind(), node.span(), self.depth);

        if let Some(sink) = &self.sink {
            let streamed = Streamed {
                depth: self.depth,
                node: node.clone(),
            };
            if sink.send(streamed).is_err() {
                tracing::debug!(target: "parse", "stream receiver disconnected; no longer streaming");
                self.sink = None;
            }
        }

        container.push(node);
        Ok(())
    }

    fn process(&mut self, node: Node, start: usize) -> ParseResult<Option<Node>> {
        // Hooks may rewrite or drop the directive; the name is taken first.
        let tome_name = node.tome_name();

        let result = self
            .hooks
            .iter_mut()
            .try_fold(Some(node), |node, hook| match node {
                Some(node) => hook.process(node),
                None => Ok(None),
            });

        let node = match result {
            Ok(Some(node)) => node,
            Ok(None) => {
                tracing::debug!(target: "hooks", "statement at offset {start} discarded by a hook");
                return Ok(None);
            }
            Err(mut diagnostic) => {
                diagnostic.context = self.reader.context_at(start);
                diagnostic.trace = self.trace();
                return Err(diagnostic.into());
            }
        };

        if let Some(name) = tome_name {
            tracing::debug!(target: "parse", "registering tome '{name}'");
            self.tomes.insert(name, node.clone());
        }

        Ok(Some(node))
    }

    fn skip_blanks(&mut self) -> ParseResult<()> {
        self.reader
            .read_while(is_blank)
            .map(|_| ())
            .map_err(|err| self.read_failure(err))
    }

    fn peek(&mut self) -> ParseResult<char> {
        self.reader.peek().map_err(|err| self.read_failure(err))
    }

    /// Consumes a character that has already been peeked.
    fn bump(&mut self) {
        let read = self.reader.read();
        debug_assert!(read.is_ok(), "bump follows a successful peek: {read:?}");
    }

    fn trace(&self) -> Vec<TraceFrame> {
        let mut trace = vec![self.frame()];
        let mut parent: Option<&dyn TraceSource> = self.parent;
        while let Some(source) = parent {
            trace.push(source.frame());
            parent = source.parent();
        }
        trace
    }

    fn diagnostic(&self, kind: ErrorKind, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            kind,
            message: message.into(),
            context: self.reader.context(),
            trace: self.trace(),
            incomplete: false,
        }
    }

    fn fail(&self, kind: ErrorKind, message: impl Into<String>) -> Interrupt {
        self.diagnostic(kind, message).into()
    }

    fn read_failure(&self, err: ReadError) -> Interrupt {
        match err {
            ReadError::EndOfInput => Interrupt::EndOfInput,
            ReadError::Io(err) => self.fail(ErrorKind::Reading, err.to_string()),
            err => {
                let mut diagnostic = self.diagnostic(ErrorKind::Syntax, err.to_string());
                diagnostic.incomplete = err.is_incomplete();
                diagnostic.into()
            }
        }
    }

    fn interp_failure(&self, err: &InterpError) -> Interrupt {
        self.fail(err.kind(), err.to_string())
    }

    fn interrupt_diagnostic(&self, interrupt: Interrupt) -> Diagnostic {
        match interrupt {
            Interrupt::Failed(diagnostic) => *diagnostic,
            Interrupt::UnexpectedEndOfInput(expected) => {
                let mut diagnostic = self.diagnostic(
                    ErrorKind::Syntax,
                    format!("unexpected end of input, expected {expected}"),
                );
                diagnostic.incomplete = true;
                diagnostic
            }
            Interrupt::EndOfBlock => {
                self.diagnostic(ErrorKind::Syntax, "unexpected '}' closing a non-existent block")
            }
            Interrupt::EndOfInput | Interrupt::EndOfArguments => {
                let mut diagnostic = self.diagnostic(ErrorKind::Syntax, "unexpected end of input");
                diagnostic.incomplete = true;
                diagnostic
            }
        }
    }
}

impl<R: BufRead> TraceSource for Parser<'_, R> {
    fn frame(&self) -> TraceFrame {
        let position = self.reader.previous_position();
        TraceFrame {
            source: self.name.clone(),
            line: position.line,
            column: position.column,
        }
    }

    fn parent(&self) -> Option<&dyn TraceSource> {
        self.parent
    }
}

fn flush_word(nodes: &mut Vec<Node>, word: &mut SegmentBuilder, start: usize, end: usize) {
    if word.is_empty() {
        return;
    }
    let segments = std::mem::take(word).finish();
    nodes.push(Node::String(InterpString::new(segments, Span::new(start, end))));
}

/// Parses an in-memory tome script with default options.
///
/// # Arguments
///
/// * `name` - The name of the source, used in diagnostic traces.
/// * `input` - The script text.
pub fn parse_str(name: &str, input: &str) -> Result<Root, Diagnostic> {
    Parser::new(input.as_bytes(), name, &ParserOptions::default()).parse()
}

#[cfg(test)]
mod tests;
