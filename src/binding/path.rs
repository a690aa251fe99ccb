//! Path segments for result lookups
//!
//! Segments are produced by the deferred expression parser (`a.b`, `a[0]`,
//! `a.0`, `a["key with spaces"]`) and applied here to JSON values.

use serde_json::Value;

/// A parsed path segment
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Object field access: .field
    Field(String),
    /// Array index access: [0]
    Index(usize),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Field(name) => write!(f, ".{}", name),
            Segment::Index(idx) => write!(f, "[{}]", idx),
        }
    }
}

/// Apply segments to a JSON value without cloning intermediate nodes
pub fn apply<'v>(value: &'v Value, segments: &[Segment]) -> Option<&'v Value> {
    segments.iter().try_fold(value, |current, segment| match segment {
        Segment::Field(name) => current.get(name.as_str()),
        Segment::Index(idx) => current.get(*idx),
    })
}
