//! The catalog of modifiers that can be applied to a variable's value in an
//! expansion such as `${name:trim:to_snake}`.

use std::fmt::Display;
use std::path::Path;

use heck::{
    ToKebabCase, ToLowerCamelCase, ToShoutyKebabCase, ToShoutySnakeCase, ToSnakeCase,
    ToUpperCamelCase,
};

use crate::interp::{EvalError, InterpError, InterpString, Locals};

/// A modifier from the fixed catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ModifierKind {
    /// `"0"`, `"false"` and `"FALSE"` become `"1"`; anything else `"0"`.
    Not,
    /// Lowercases the value.
    ToLower,
    /// Uppercases the value.
    ToUpper,
    /// `Hello World` becomes `hello_world`.
    ToSnake,
    /// `Hello World` becomes `hello-world`.
    ToKebab,
    /// `Hello World` becomes `HELLO_WORLD`.
    ToScreamingSnake,
    /// `Hello World` becomes `HELLO-WORLD`.
    ToScreamingKebab,
    /// `Hello World` becomes `helloWorld`.
    ToCamel,
    /// `Hello World` becomes `HelloWorld`.
    ToPascal,
    /// Joins lowercased words with the first character of its argument;
    /// `to_delimited ::` behaves like `to_delimited :`.
    ToDelimited,
    /// Whether the value names an existing path.
    DoesExist,
    /// Whether the value is empty.
    IsEmpty,
    /// Whether the value names a regular file.
    IsFile,
    /// Whether the value names a directory.
    IsDir,
    /// Whether the value names a symbolic link.
    IsSymlink,
    /// The number of characters in the value.
    Length,
    /// The value as a quoted, escaped string.
    Quoted,
    /// Strips characters in each cutset from both ends, or whitespace if no
    /// cutset is given.
    Trim,
    /// Strips each prefix in turn.
    TrimPrefix,
    /// Strips each suffix in turn.
    TrimSuffix,
    /// Pads with spaces on both sides.
    Pad,
    /// Pads with spaces on the left.
    PadLeft,
    /// Pads with spaces on the right.
    PadRight,
    /// Whether the value starts with the argument.
    HasPrefix,
    /// Whether the value ends with the argument.
    HasSuffix,
    /// The characters between two indices; negative indices count from the
    /// end.
    Slice,
    /// Reverses the characters.
    Reverse,
    /// Swaps the case of each letter.
    Invert,
}

impl ModifierKind {
    /// Every modifier in the catalog.
    pub const ALL: &'static [Self] = &[
        Self::Not,
        Self::ToLower,
        Self::ToUpper,
        Self::ToSnake,
        Self::ToKebab,
        Self::ToScreamingSnake,
        Self::ToScreamingKebab,
        Self::ToCamel,
        Self::ToPascal,
        Self::ToDelimited,
        Self::DoesExist,
        Self::IsEmpty,
        Self::IsFile,
        Self::IsDir,
        Self::IsSymlink,
        Self::Length,
        Self::Quoted,
        Self::Trim,
        Self::TrimPrefix,
        Self::TrimSuffix,
        Self::Pad,
        Self::PadLeft,
        Self::PadRight,
        Self::HasPrefix,
        Self::HasSuffix,
        Self::Slice,
        Self::Reverse,
        Self::Invert,
    ];

    /// Looks up a modifier by the name used in expansions.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Returns the name used in expansions.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::ToLower => "to_lower",
            Self::ToUpper => "to_upper",
            Self::ToSnake => "to_snake",
            Self::ToKebab => "to_kebab",
            Self::ToScreamingSnake => "to_screaming_snake",
            Self::ToScreamingKebab => "to_screaming_kebab",
            Self::ToCamel => "to_camel",
            Self::ToPascal => "to_pascal",
            Self::ToDelimited => "to_delimited",
            Self::DoesExist => "does_exist",
            Self::IsEmpty => "is_empty",
            Self::IsFile => "is_file",
            Self::IsDir => "is_dir",
            Self::IsSymlink => "is_symlink",
            Self::Length => "length",
            Self::Quoted => "quoted",
            Self::Trim => "trim",
            Self::TrimPrefix => "trim_prefix",
            Self::TrimSuffix => "trim_suffix",
            Self::Pad => "pad",
            Self::PadLeft => "pad_left",
            Self::PadRight => "pad_right",
            Self::HasPrefix => "has_prefix",
            Self::HasSuffix => "has_suffix",
            Self::Slice => "slice",
            Self::Reverse => "reverse",
            Self::Invert => "invert",
        }
    }

    /// Returns the minimum and, if bounded, maximum number of arguments.
    pub const fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Trim => (0, None),
            Self::TrimPrefix | Self::TrimSuffix => (1, None),
            Self::Pad => (1, Some(2)),
            Self::Slice => (2, Some(2)),
            Self::ToDelimited
            | Self::PadLeft
            | Self::PadRight
            | Self::HasPrefix
            | Self::HasSuffix => (1, Some(1)),
            _ => (0, Some(0)),
        }
    }

    /// Applies the modifier to `input` with already evaluated arguments.
    ///
    /// Numeric arguments that do not parse leave the input unchanged.
    pub fn apply(self, input: &str, args: &[String]) -> String {
        match self {
            Self::Not => bool_str(matches!(input, "0" | "false" | "FALSE")),
            Self::ToLower => input.to_lowercase(),
            Self::ToUpper => input.to_uppercase(),
            Self::ToSnake => input.to_snake_case(),
            Self::ToKebab => input.to_kebab_case(),
            Self::ToScreamingSnake => input.to_shouty_snake_case(),
            Self::ToScreamingKebab => input.to_shouty_kebab_case(),
            Self::ToCamel => input.to_lower_camel_case(),
            Self::ToPascal => input.to_upper_camel_case(),
            Self::ToDelimited => match args.first().and_then(|arg| arg.chars().next()) {
                Some(delimiter) => delimited(input, delimiter),
                None => input.to_owned(),
            },
            Self::DoesExist => bool_str(Path::new(input).try_exists().is_ok_and(|exists| exists)),
            Self::IsEmpty => bool_str(input.is_empty()),
            Self::IsFile => bool_str(std::fs::metadata(input).is_ok_and(|m| m.is_file())),
            Self::IsDir => bool_str(std::fs::metadata(input).is_ok_and(|m| m.is_dir())),
            Self::IsSymlink => bool_str(
                std::fs::symlink_metadata(input).is_ok_and(|m| m.file_type().is_symlink()),
            ),
            Self::Length => input.chars().count().to_string(),
            Self::Quoted => format!("{input:?}"),
            Self::Trim => {
                if args.is_empty() {
                    return input.trim().to_owned();
                }
                args.iter().fold(input.to_owned(), |value, cutset| {
                    value.trim_matches(|c: char| cutset.contains(c)).to_owned()
                })
            }
            Self::TrimPrefix => args.iter().fold(input.to_owned(), |value, prefix| {
                match value.strip_prefix(prefix.as_str()) {
                    Some(rest) => rest.to_owned(),
                    None => value,
                }
            }),
            Self::TrimSuffix => args.iter().fold(input.to_owned(), |value, suffix| {
                match value.strip_suffix(suffix.as_str()) {
                    Some(rest) => rest.to_owned(),
                    None => value,
                }
            }),
            Self::Pad => {
                let left = number(args.first());
                let right = if args.len() > 1 {
                    number(args.get(1))
                } else {
                    left
                };
                match (left, right) {
                    (Some(left), Some(right)) => pad(input, left, right),
                    _ => input.to_owned(),
                }
            }
            Self::PadLeft => number(args.first()).map_or_else(|| input.to_owned(), |n| pad(input, n, 0)),
            Self::PadRight => number(args.first()).map_or_else(|| input.to_owned(), |n| pad(input, 0, n)),
            Self::HasPrefix => bool_str(args.first().is_some_and(|p| input.starts_with(p.as_str()))),
            Self::HasSuffix => bool_str(args.first().is_some_and(|s| input.ends_with(s.as_str()))),
            Self::Slice => match (number(args.first()), number(args.get(1))) {
                (Some(from), Some(to)) => slice(input, from, to),
                _ => input.to_owned(),
            },
            Self::Reverse => input.chars().rev().collect(),
            Self::Invert => {
                let mut out = String::with_capacity(input.len());
                for c in input.chars() {
                    if c.is_lowercase() {
                        out.extend(c.to_uppercase());
                    } else if c.is_uppercase() {
                        out.extend(c.to_lowercase());
                    } else {
                        out.push(c);
                    }
                }
                out
            }
        }
    }
}

impl Display for ModifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved modifier together with its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Modifier {
    /// Which catalog entry to apply.
    pub kind: ModifierKind,
    /// Arguments, evaluated each time the modifier is applied.
    pub args: Vec<InterpString>,
}

impl Modifier {
    /// Resolves `name` against the catalog and checks the argument count.
    pub fn resolve(name: &str, args: Vec<InterpString>) -> Result<Self, InterpError> {
        let kind = ModifierKind::from_name(name)
            .ok_or_else(|| InterpError::UnknownModifier(name.to_owned()))?;

        let (min, max) = kind.arity();
        let found = args.len();
        if found < min || max.is_some_and(|max| found > max) {
            let expected = match (min, max) {
                (0, Some(0)) => "no arguments".to_owned(),
                (min, Some(max)) if min == max => format!("exactly {min} argument(s)"),
                (min, Some(max)) => format!("{min} to {max} arguments"),
                (min, None) => format!("at least {min} argument(s)"),
            };
            return Err(InterpError::Arity {
                modifier: kind.name(),
                expected,
                found,
            });
        }

        Ok(Self { kind, args })
    }

    /// Returns the catalog name of the modifier.
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Evaluates the arguments against `locals` and applies the modifier.
    pub fn apply(&self, locals: &Locals, input: &str) -> Result<String, EvalError> {
        let args = self
            .args
            .iter()
            .map(|arg| arg.eval(locals))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.kind.apply(input, &args))
    }
}

impl Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn bool_str(value: bool) -> String {
    String::from(if value { "1" } else { "0" })
}

fn number(arg: Option<&String>) -> Option<i64> {
    let arg = arg?;
    let parsed = arg.parse().ok();
    if parsed.is_none() {
        tracing::debug!(target: "interp", "non-numeric modifier argument '{arg}'; value left unchanged");
    }
    parsed
}

/// Padding wider than this on either side leaves the value unchanged.
const MAX_PAD: usize = 1 << 16;

fn pad(input: &str, left: i64, right: i64) -> String {
    let width = |count: i64| usize::try_from(count).unwrap_or(0);
    let (left, right) = (width(left), width(right));
    if left > MAX_PAD || right > MAX_PAD {
        tracing::debug!(target: "interp", "padding of {left}/{right} exceeds {MAX_PAD}; value left unchanged");
        return input.to_owned();
    }
    format!("{}{input}{}", " ".repeat(left), " ".repeat(right))
}

fn slice(input: &str, from: i64, to: i64) -> String {
    let chars: Vec<char> = input.chars().collect();
    let len = i64::try_from(chars.len()).unwrap_or(i64::MAX);
    let resolve = |index: i64| {
        let index = if index < 0 { len + index } else { index };
        usize::try_from(index.clamp(0, len)).unwrap_or(0)
    };

    chars
        .get(resolve(from)..resolve(to))
        .map(|chars| chars.iter().collect())
        .unwrap_or_default()
}

/// Lowercased words, as split by snake casing, joined with `delimiter`.
fn delimited(input: &str, delimiter: char) -> String {
    input
        .to_snake_case()
        .split('_')
        .collect::<Vec<_>>()
        .join(delimiter.encode_utf8(&mut [0; 4]))
}
