//! Predicates over accumulated server output.
//!
//! Nothing here parses IRC into records. A [`Marker`] is a substring or a
//! numeric in command position; a [`Predicate`] combines markers with the
//! two non-textual facts a capture carries: whether any bytes arrived and
//! whether the server hung up.

use std::fmt;

/// Everything one actor has captured so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub text: String,
    /// Server closed/reset the stream, or a write was refused.
    pub disconnected: bool,
}

impl Capture {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            disconnected: false,
        }
    }

    pub fn disconnected(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            disconnected: true,
        }
    }
}

/// Something to look for in captured text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Case-sensitive substring.
    Text(String),
    TextIgnoreCase(String),
    /// Three-digit reply code in the command slot of a line: the first
    /// token, or the second when the first is a `:prefix`.
    Numeric(String),
}

impl Marker {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn text_ci(s: impl Into<String>) -> Self {
        Self::TextIgnoreCase(s.into())
    }

    pub fn numeric(code: impl Into<String>) -> Self {
        Self::Numeric(code.into())
    }

    pub fn found_in(&self, text: &str) -> bool {
        match self {
            Self::Text(needle) => text.contains(needle.as_str()),
            _ => self.count_in(text) > 0,
        }
    }

    /// Non-overlapping occurrences. An empty needle counts once.
    pub fn count_in(&self, text: &str) -> usize {
        match self {
            Self::Text(needle) if needle.is_empty() => 1,
            Self::TextIgnoreCase(needle) if needle.is_empty() => 1,
            Self::Text(needle) => text.matches(needle.as_str()).count(),
            Self::TextIgnoreCase(needle) => text
                .to_lowercase()
                .matches(needle.to_lowercase().as_str())
                .count(),
            Self::Numeric(code) => text
                .split('\n')
                .filter(|line| command_of(line) == Some(code.as_str()))
                .count(),
        }
    }
}

fn command_of(line: &str) -> Option<&str> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    if first.starts_with(':') {
        tokens.next()
    } else {
        Some(first)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "text {s:?}"),
            Self::TextIgnoreCase(s) => write!(f, "text {s:?} (any case)"),
            Self::Numeric(code) => write!(f, "numeric {code}"),
        }
    }
}

/// A check over one actor's [`Capture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Has(Marker),
    Lacks(Marker),
    AtLeast(Marker, usize),
    /// Tolerant OR: servers may signal one condition with different,
    /// equally valid replies.
    AnyOf(Vec<Predicate>),
    AllOf(Vec<Predicate>),
    /// Zero bytes captured.
    Silent,
    Disconnected,
    Anything,
}

impl Predicate {
    pub fn numeric(code: &str) -> Self {
        Self::Has(Marker::numeric(code))
    }

    pub fn text(s: &str) -> Self {
        Self::Has(Marker::text(s))
    }

    pub fn text_ci(s: &str) -> Self {
        Self::Has(Marker::text_ci(s))
    }

    pub fn lacks_numeric(code: &str) -> Self {
        Self::Lacks(Marker::numeric(code))
    }

    pub fn at_least(marker: Marker, count: usize) -> Self {
        Self::AtLeast(marker, count)
    }

    /// Any of the given numerics.
    pub fn any_numeric(codes: &[&str]) -> Self {
        Self::AnyOf(codes.iter().map(|c| Self::numeric(c)).collect())
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::AllOf(mut all) => {
                all.push(other);
                Self::AllOf(all)
            }
            first => Self::AllOf(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::AnyOf(mut any) => {
                any.push(other);
                Self::AnyOf(any)
            }
            first => Self::AnyOf(vec![first, other]),
        }
    }

    pub fn holds(&self, capture: &Capture) -> bool {
        match self {
            Self::Has(marker) => marker.found_in(&capture.text),
            Self::Lacks(marker) => !marker.found_in(&capture.text),
            Self::AtLeast(marker, count) => marker.count_in(&capture.text) >= *count,
            Self::AnyOf(any) => any.iter().any(|p| p.holds(capture)),
            Self::AllOf(all) => all.iter().all(|p| p.holds(capture)),
            Self::Silent => capture.text.is_empty(),
            Self::Disconnected => capture.disconnected,
            Self::Anything => true,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Has(marker) => write!(f, "{marker}"),
            Self::Lacks(marker) => write!(f, "no {marker}"),
            Self::AtLeast(marker, count) => write!(f, "at least {count} of {marker}"),
            Self::AnyOf(any) => write_joined(f, any, " | ", true),
            Self::AllOf(all) => write_joined(f, all, " and ", false),
            Self::Silent => f.write_str("silence"),
            Self::Disconnected => f.write_str("disconnect"),
            Self::Anything => f.write_str("anything"),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    parts: &[Predicate],
    sep: &str,
    parens: bool,
) -> fmt::Result {
    if parens {
        f.write_str("(")?;
    }
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{p}")?;
    }
    if parens {
        f.write_str(")")?;
    }
    Ok(())
}
