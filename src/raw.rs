//! Verbatim value marker and flattening of nested value lists.
//!
//! Interpolated values are escaped by default. Wrapping a value with [`raw`]
//! (or building a [`RawValue::Raw`] / [`RawValue::RawList`] directly) tells the
//! formatters that the text is already safe for the target shell and must be
//! inserted unchanged.

/// A value interpolated into a command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Plain data; escaped by the formatter.
    Literal(String),
    /// Already shell-safe text; inserted verbatim.
    Raw(String),
    /// A verbatim-marked sequence. Every entry, at any depth, is inserted
    /// verbatim once flattened.
    RawList(Vec<RawValue>),
}

impl RawValue {
    /// Build a plain value that the formatter escapes.
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Mark `text` as verbatim.
    #[must_use]
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(text.into())
    }

    /// Mark every entry of `items` as verbatim.
    #[must_use]
    pub fn raw_list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Self>,
    {
        Self::RawList(items.into_iter().map(Into::into).collect())
    }

    /// Whether the value carries the verbatim marker.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_owned())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

impl From<&String> for RawValue {
    fn from(value: &String) -> Self {
        Self::Literal(value.clone())
    }
}

impl From<&camino::Utf8Path> for RawValue {
    fn from(value: &camino::Utf8Path) -> Self {
        Self::Literal(value.as_str().to_owned())
    }
}

/// Mark `value` as verbatim.
///
/// Strings become [`RawValue::Raw`]; lists become [`RawValue::RawList`] so that
/// each entry is inserted verbatim and joined with single spaces.
///
/// # Examples
///
/// ```
/// use shex::raw::{RawValue, raw};
///
/// assert_eq!(raw("a | b"), RawValue::Raw("a | b".to_owned()));
/// assert!(raw(vec!["-l", "-a"]).is_raw());
/// ```
#[must_use]
pub fn raw(value: impl Into<RawValue>) -> RawValue {
    match value.into() {
        RawValue::Literal(text) | RawValue::Raw(text) => RawValue::Raw(text),
        list @ RawValue::RawList(_) => list,
    }
}

impl<T: Into<Self>> From<Vec<T>> for RawValue {
    fn from(items: Vec<T>) -> Self {
        Self::raw_list(items)
    }
}

/// A flattened value: either plain data or verbatim text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flat<'a> {
    /// Plain data to be escaped.
    Literal(&'a str),
    /// Verbatim text.
    Raw(&'a str),
}

impl<'a> Flat<'a> {
    /// The text carried by the value, escaped or not.
    #[must_use]
    pub const fn text(self) -> &'a str {
        match self {
            Self::Literal(text) | Self::Raw(text) => text,
        }
    }
}

/// Unroll nested verbatim lists into a flat sequence.
///
/// Values are visited left to right; a [`RawValue::RawList`] is replaced in
/// place by its entries, marked verbatim, before any later value is visited.
///
/// # Examples
///
/// ```
/// use shex::raw::{Flat, RawValue, flatten};
///
/// let values = [
///     RawValue::literal("a b"),
///     RawValue::raw_list(["-x", "-y"]),
/// ];
/// assert_eq!(
///     flatten(&values),
///     [Flat::Literal("a b"), Flat::Raw("-x"), Flat::Raw("-y")]
/// );
/// ```
#[must_use]
pub fn flatten(values: &[RawValue]) -> Vec<Flat<'_>> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            RawValue::Literal(text) => out.push(Flat::Literal(text)),
            RawValue::Raw(text) => out.push(Flat::Raw(text)),
            RawValue::RawList(items) => flatten_verbatim(items, &mut out),
        }
    }
    out
}

fn flatten_verbatim<'a>(items: &'a [RawValue], out: &mut Vec<Flat<'a>>) {
    for item in items {
        match item {
            RawValue::Literal(text) | RawValue::Raw(text) => out.push(Flat::Raw(text)),
            RawValue::RawList(nested) => flatten_verbatim(nested, out),
        }
    }
}
