//! Name and regex exclusion filters.
//!
//! An item is excluded when it equals any name exclusion or matches any
//! pattern exclusion in the set. Filtering is a pure predicate, so applying
//! the same set twice yields the same list.

use std::fmt;

use regex::Regex;

/// Prefix of collections reserved by the server.
pub const SYSTEM_PREFIX: &str = "system.";

/// A single exclusion: an exact name or a regex.
#[derive(Clone)]
pub enum Exclusion {
    /// Excludes items equal to the name.
    Name(String),
    /// Excludes items the regex matches anywhere.
    Pattern(Regex),
}

impl Exclusion {
    /// Check if `item` is excluded.
    pub fn matches(&self, item: &str) -> bool {
        match self {
            Self::Name(name) => name == item,
            Self::Pattern(pattern) => pattern.is_match(item),
        }
    }

    /// Parse the textual form used in config files and on the command line.
    ///
    /// `/regex/` (optionally followed by `i`, `m`, `s` or `x` flags) is a
    /// pattern; anything else is an exact name.
    pub fn parse(text: &str) -> Result<Self, regex::Error> {
        if let Some(body) = text.strip_prefix('/') {
            if let Some(end) = body.rfind('/') {
                let flags = &body[end + 1..];
                if flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x')) {
                    let pattern = &body[..end];
                    let source = if flags.is_empty() {
                        pattern.to_string()
                    } else {
                        format!("(?{flags}){pattern}")
                    };
                    return Regex::new(&source).map(Self::Pattern);
                }
            }
        }
        Ok(Self::Name(text.to_string()))
    }
}

impl fmt::Debug for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name:?}"),
            Self::Pattern(pattern) => write!(f, "/{}/", pattern.as_str()),
        }
    }
}

impl PartialEq for Exclusion {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Name(a), Self::Name(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl From<&str> for Exclusion {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Exclusion {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Regex> for Exclusion {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

/// A set of exclusions combined with OR semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exclusions(Vec<Exclusion>);

impl Exclusions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exclusion to the set.
    pub fn with(mut self, exclusion: impl Into<Exclusion>) -> Self {
        self.0.push(exclusion.into());
        self
    }

    /// Parse each entry with [`Exclusion::parse`].
    pub fn parse_all<I, S>(entries: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        entries
            .into_iter()
            .map(|entry| Exclusion::parse(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Check if any exclusion in the set matches `item`.
    pub fn excludes(&self, item: &str) -> bool {
        self.0.iter().any(|exclusion| exclusion.matches(item))
    }

    /// Keep only the items no exclusion matches, preserving order.
    pub fn apply(&self, items: Vec<String>) -> Vec<String> {
        if self.0.is_empty() {
            return items;
        }
        items.into_iter().filter(|item| !self.excludes(item)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Exclusion> for Exclusions {
    fn from(exclusion: Exclusion) -> Self {
        Self(vec![exclusion])
    }
}

impl From<&str> for Exclusions {
    fn from(name: &str) -> Self {
        Self(vec![name.into()])
    }
}

impl From<String> for Exclusions {
    fn from(name: String) -> Self {
        Self(vec![name.into()])
    }
}

impl From<Regex> for Exclusions {
    fn from(pattern: Regex) -> Self {
        Self(vec![pattern.into()])
    }
}

impl<T: Into<Exclusion>> From<Vec<T>> for Exclusions {
    fn from(exclusions: Vec<T>) -> Self {
        exclusions.into_iter().collect()
    }
}

impl<T: Into<Exclusion>, const N: usize> From<[T; N]> for Exclusions {
    fn from(exclusions: [T; N]) -> Self {
        exclusions.into_iter().collect()
    }
}

impl<T: Into<Exclusion>> FromIterator<T> for Exclusions {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Check if a collection name is reserved by the server.
pub fn is_system_collection(name: &str) -> bool {
    name.starts_with(SYSTEM_PREFIX)
}

/// Apply database exclusions.
pub fn filter_databases(databases: Vec<String>, exclude: Option<&Exclusions>) -> Vec<String> {
    match exclude {
        Some(exclusions) => exclusions.apply(databases),
        None => databases,
    }
}

/// Apply the system filter, then collection exclusions.
///
/// The two checks are independent: a collection is kept only if it passes
/// both.
pub fn filter_collections(
    collections: Vec<String>,
    exclude_system: bool,
    exclude: Option<&Exclusions>,
) -> Vec<String> {
    let collections = if exclude_system {
        collections
            .into_iter()
            .filter(|name| !is_system_collection(name))
            .collect()
    } else {
        collections
    };
    match exclude {
        Some(exclusions) => exclusions.apply(collections),
        None => collections,
    }
}
