//! Path types for addressing nodes inside a content tree.
//!
//! A [`Path`] is a sequence of [`Segment`]s, each either a map key or a list
//! index. Paths print as RFC 6901 JSON Pointers (`/blocks/3/text`) and can be
//! parsed back from that form. Stored patches serialize paths as JSON arrays
//! (`["blocks", 3, "text"]`) so map keys that happen to look like numbers keep
//! their kind.
//!
//! # Usage
//!
//! ```rust
//! use folio::content::{Path, Segment};
//! use std::str::FromStr;
//!
//! let path = Path::root().key("blocks").index(3).key("text");
//! assert_eq!(path.to_string(), "/blocks/3/text");
//!
//! let parsed = Path::from_str("/blocks/3/text")?;
//! assert_eq!(parsed, path);
//! assert_eq!(parsed.last(), Some(&Segment::Key("text".to_string())));
//! # Ok::<(), folio::content::PathError>(())
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for pointer parsing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// Non-empty pointers must start with '/'.
    #[error("Invalid pointer '{pointer}': must be empty or start with '/'")]
    MissingLeadingSlash { pointer: String },

    /// `~` must be followed by `0` or `1`.
    #[error("Invalid escape in pointer '{pointer}'")]
    InvalidEscape { pointer: String },
}

/// One step into a content tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    /// Position in a list.
    Index(usize),
    /// Key in a map.
    Key(String),
}

impl Segment {
    /// Interpret this segment as a list index.
    ///
    /// Keys are accepted when they spell a canonical decimal number, which is
    /// what a pointer parsed from text produces for `/items/0`.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(i) => Some(*i),
            Segment::Key(k) => parse_index(k),
        }
    }

    /// Interpret this segment as a map key.
    pub fn as_key(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Segment::Index(i) => std::borrow::Cow::Owned(i.to_string()),
            Segment::Key(k) => std::borrow::Cow::Borrowed(k),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(i) => write!(f, "{i}"),
            Segment::Key(k) => f.write_str(&k.replace('~', "~0").replace('/', "~1")),
        }
    }
}

impl From<usize> for Segment {
    fn from(i: usize) -> Self {
        Segment::Index(i)
    }
}

impl From<&str> for Segment {
    fn from(k: &str) -> Self {
        Segment::Key(k.to_string())
    }
}

impl From<String> for Segment {
    fn from(k: String) -> Self {
        Segment::Key(k)
    }
}

/// Canonical decimal only: "0", "17"; not "007" or "+1".
fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// An owned path into a content tree. The empty path addresses the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path, addressing the root node.
    pub fn root() -> Self {
        Self::default()
    }

    /// Append a map key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(Segment::Key(key.into()));
        self
    }

    /// Append a list index.
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    /// Return a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Returns the segments of the path.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the number of segments in the path.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if the path addresses the root.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the last segment, or `None` for the root.
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Split into (parent segments, last segment).
    pub fn split_last(&self) -> Option<(&Segment, &[Segment])> {
        self.segments.split_last()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(pointer: &str) -> Result<Self, Self::Err> {
        if pointer.is_empty() {
            return Ok(Path::root());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(PathError::MissingLeadingSlash {
                pointer: pointer.to_string(),
            });
        };

        let mut segments = Vec::new();
        for token in rest.split('/') {
            let unescaped = unescape(token).ok_or_else(|| PathError::InvalidEscape {
                pointer: pointer.to_string(),
            })?;
            segments.push(match parse_index(&unescaped) {
                Some(i) => Segment::Index(i),
                None => Segment::Key(unescaped),
            });
        }
        Ok(Path { segments })
    }
}

fn unescape(token: &str) -> Option<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl FromIterator<Segment> for Path {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}
