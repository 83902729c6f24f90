use std::fmt::Display;

/// Represents a position in source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SourcePosition {
    /// The 0-based byte offset into the input stream.
    pub offset: usize,
    /// The 1-based line number.
    pub line: usize,
    /// The 1-based column number.
    pub column: usize,
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl Display for SourcePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}:{}", self.line, self.column))
    }
}

impl SourcePosition {
    /// Returns the position that follows reading `c` at this position.
    #[must_use]
    pub const fn advance(&self, c: char) -> Self {
        if c == '\n' {
            Self {
                offset: self.offset + c.len_utf8(),
                line: self.line + 1,
                column: 1,
            }
        } else {
            Self {
                offset: self.offset + c.len_utf8(),
                line: self.line,
                column: self.column + 1,
            }
        }
    }
}

/// Represents a span of byte offsets within source text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Span {
    /// The offset of the first byte.
    pub start: usize,
    /// The offset one past the last byte (exclusive).
    pub end: usize,
}

impl Span {
    /// Creates a span covering `start..end`.
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the length of the span in bytes.
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the span covers no input.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the smallest span covering both `self` and `other`.
    #[must_use]
    pub fn to(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Returns the text covered by this span, if it lies within `source` on
    /// character boundaries.
    pub fn slice<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start..self.end)
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_tracks_lines_and_bytes() {
        let pos = SourcePosition::default().advance('a').advance('é');
        assert_eq!(pos.offset, 3);
        assert_eq!(pos.column, 3);

        let pos = pos.advance('\n');
        assert_eq!(pos.line, 2);
        assert_eq!(pos.column, 1);
        assert_eq!(pos.to_string(), "2:1");
    }

    #[test]
    fn spans_merge_and_slice() {
        let a = Span::new(2, 5);
        let b = Span::new(4, 9);
        assert_eq!(a.to(&b), Span::new(2, 9));
        assert_eq!(Span::new(0, 4).slice("echo hi"), Some("echo"));
        assert!(Span::new(3, 3).is_empty());
    }
}
