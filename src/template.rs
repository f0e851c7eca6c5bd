//! Command templates: literal fragments interleaved with interpolation slots.

use crate::{error::ShellError, raw::RawValue};

/// Placeholder recognised by [`Template::parse`].
pub const PLACEHOLDER: &str = "{}";

/// Zero or more values interpolated at one point of a template.
///
/// A bare value converts into a one-element slot; a `Vec` of values becomes a
/// slot whose entries are escaped individually and joined with spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot(Vec<RawValue>);

impl Slot {
    /// Build a slot from explicit values.
    #[must_use]
    pub const fn new(values: Vec<RawValue>) -> Self {
        Self(values)
    }

    /// Values held by the slot.
    #[must_use]
    pub fn values(&self) -> &[RawValue] {
        &self.0
    }
}

impl From<RawValue> for Slot {
    fn from(value: RawValue) -> Self {
        Self(vec![value])
    }
}

impl From<&str> for Slot {
    fn from(value: &str) -> Self {
        Self(vec![RawValue::from(value)])
    }
}

impl From<String> for Slot {
    fn from(value: String) -> Self {
        Self(vec![RawValue::from(value)])
    }
}

impl From<&String> for Slot {
    fn from(value: &String) -> Self {
        Self(vec![RawValue::from(value)])
    }
}

impl From<&camino::Utf8Path> for Slot {
    fn from(value: &camino::Utf8Path) -> Self {
        Self(vec![RawValue::from(value)])
    }
}

impl<T: Into<RawValue>> From<Vec<T>> for Slot {
    fn from(values: Vec<T>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<RawValue> + Clone> From<&[T]> for Slot {
    fn from(values: &[T]) -> Self {
        Self(values.iter().cloned().map(Into::into).collect())
    }
}

/// A command template.
///
/// Invariant: `slots.len() + 1 == fragments.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    fragments: Vec<String>,
    slots: Vec<Slot>,
}

impl Template {
    /// Build a template from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::TemplateArity`] when the number of slots is not
    /// one less than the number of fragments.
    pub fn from_parts(fragments: Vec<String>, slots: Vec<Slot>) -> Result<Self, ShellError> {
        if fragments.len() != slots.len() + 1 {
            return Err(ShellError::TemplateArity {
                fragments: fragments.len(),
                slots: slots.len(),
            });
        }
        Ok(Self { fragments, slots })
    }

    /// A template made of one literal fragment and no slots.
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            fragments: vec![text.into()],
            slots: Vec::new(),
        }
    }

    /// Split `format` on `{}` placeholders and fill them with `slots`.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::TemplateArity`] when the placeholder count does
    /// not match the number of slots.
    ///
    /// # Examples
    ///
    /// ```
    /// use shex::template::{Slot, Template};
    ///
    /// let template = Template::parse("ls {} {}", vec![Slot::from("a"), Slot::from("b")])?;
    /// assert_eq!(template.fragments(), ["ls ", " ", ""]);
    /// # Ok::<(), shex::ShellError>(())
    /// ```
    pub fn parse(format: &str, slots: Vec<Slot>) -> Result<Self, ShellError> {
        let fragments = format.split(PLACEHOLDER).map(ToOwned::to_owned).collect();
        Self::from_parts(fragments, slots)
    }

    /// Start building a template fragment by fragment.
    #[must_use]
    pub fn builder() -> TemplateBuilder {
        TemplateBuilder::default()
    }

    /// Literal fragments in order.
    #[must_use]
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Interpolation slots in order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Fragments paired with the slot that follows each of them; the last
    /// fragment has no slot.
    pub fn parts(&self) -> impl Iterator<Item = (&str, Option<&Slot>)> {
        self.fragments
            .iter()
            .enumerate()
            .map(|(index, fragment)| (fragment.as_str(), self.slots.get(index)))
    }
}

/// Incremental [`Template`] construction.
///
/// Consecutive `text` calls extend the current fragment; consecutive `value`
/// calls produce slots separated by empty fragments.
#[derive(Debug, Clone, Default)]
pub struct TemplateBuilder {
    fragments: Vec<String>,
    current: String,
    slots: Vec<Slot>,
}

impl TemplateBuilder {
    /// Append literal text.
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.current.push_str(text);
        self
    }

    /// Append an interpolated slot.
    #[must_use]
    pub fn value(mut self, slot: impl Into<Slot>) -> Self {
        self.fragments.push(std::mem::take(&mut self.current));
        self.slots.push(slot.into());
        self
    }

    /// Finish the template.
    #[must_use]
    pub fn build(mut self) -> Template {
        self.fragments.push(self.current);
        Template {
            fragments: self.fragments,
            slots: self.slots,
        }
    }
}

/// Build a [`Template`] from a `{}`-placeholder format string.
///
/// Evaluates to `Result<Template, ShellError>`.
///
/// # Examples
///
/// ```
/// use shex::{cmd, raw::raw};
///
/// let template = cmd!("grep {} {}", "needle in", raw("*.txt"))?;
/// assert_eq!(template.slots().len(), 2);
/// # Ok::<(), shex::ShellError>(())
/// ```
#[macro_export]
macro_rules! cmd {
    ($format:expr $(, $value:expr)* $(,)?) => {
        $crate::template::Template::parse(
            $format,
            ::std::vec![$($crate::template::Slot::from($value)),*],
        )
    };
}
